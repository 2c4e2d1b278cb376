//! Async mesh generation: a bounded worker pool that turns chunk voxel snapshots into quad
//! indices off the simulation thread, shaped after [`crate::network::thread::NetworkThread`]'s
//! dedicated-thread-plus-command-queue pattern but specialized to a pool of CPU workers rather
//! than a single Tokio reactor, since mesh jobs are synchronous and embarrassingly parallel.

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use gv_schemas::coordinates::{ChunkPos, InChunkPos, CHUNK_DIM, CHUNK_DIM2Z, CHUNK_DIM3Z};
use gv_schemas::direction::{Direction, ALL_DIRECTIONS};
use gv_schemas::registry::{BlockId, BlockRegistry, RenderClass};
use gv_schemas::voxel::chunk::{CollisionMeshSnapshot, ModelInstanceLists};
use gv_schemas::voxel::island::{Island, IslandId};
use gv_schemas::voxel::mesh::{Quad, QuadIndex};

/// The 32x32 solidity mask of a neighbour chunk's face touching the chunk being meshed, or
/// `None` if there is no neighbour (island boundary, or the neighbour chunk is unloaded), in
/// which case faces toward it are always emitted per the chunk's full-remesh contract.
pub type NeighborFaceMask = Option<Box<[bool; CHUNK_DIM2Z]>>;

/// Everything a mesh worker needs to fully remesh one chunk, with no reference back into live
/// island state: a plain copy of the chunk's voxels plus each neighbour's boundary solidity.
pub struct ChunkSnapshot {
    /// XZY-ordered dense voxel copy, matching [`gv_schemas::voxel::chunk_storage::ArrayStorage`].
    pub voxels: Box<[BlockId; CHUNK_DIM3Z]>,
    /// Indexed by [`Direction::to_index`].
    pub neighbor_faces: [NeighborFaceMask; 6],
}

fn voxel_index(x: i32, y: i32, z: i32) -> usize {
    (x as usize) + (z as usize) * CHUNK_DIM as usize + (y as usize) * CHUNK_DIM as usize * CHUNK_DIM as usize
}

fn face_index(a: i32, b: i32) -> usize {
    (a as usize) + (b as usize) * CHUNK_DIM as usize
}

impl ChunkSnapshot {
    fn voxel_at(&self, x: i32, y: i32, z: i32) -> Option<BlockId> {
        if (0..CHUNK_DIM).contains(&x) && (0..CHUNK_DIM).contains(&y) && (0..CHUNK_DIM).contains(&z) {
            Some(self.voxels[voxel_index(x, y, z)])
        } else {
            None
        }
    }

    fn is_solid_across_boundary(&self, registry: &BlockRegistry, dir: Direction, a: i32, b: i32) -> bool {
        match &self.neighbor_faces[dir.to_index()] {
            None => false,
            Some(mask) => {
                // The mask records solidity, `is_solid_across_boundary` is asked "is it occluded".
                let _ = registry;
                mask[face_index(a, b)]
            }
        }
    }
}

/// Generates a fresh quad list for the given snapshot by scanning every voxel, per the chunk's
/// full-remesh contract: a quad is emitted for each face between a solid voxel and a non-solid
/// or absent neighbour.
pub fn generate_full_mesh(snapshot: &ChunkSnapshot, registry: &BlockRegistry) -> QuadIndex {
    let mut index = QuadIndex::new();
    for x in 0..CHUNK_DIM {
        for y in 0..CHUNK_DIM {
            for z in 0..CHUNK_DIM {
                let block = snapshot.voxels[voxel_index(x, y, z)];
                if !registry.is_solid(block) {
                    continue;
                }
                for dir in ALL_DIRECTIONS {
                    let delta = dir.to_ivec3();
                    let (nx, ny, nz) = (x + delta.x, y + delta.y, z + delta.z);
                    let occluded = match snapshot.voxel_at(nx, ny, nz) {
                        Some(neighbor) => registry.is_solid(neighbor),
                        None => {
                            let (a, b) = match dir {
                                Direction::XMinus | Direction::XPlus => (y, z),
                                Direction::YMinus | Direction::YPlus => (x, z),
                                Direction::ZMinus | Direction::ZPlus => (x, y),
                            };
                            snapshot.is_solid_across_boundary(registry, dir, a, b)
                        }
                    };
                    if !occluded {
                        let pos = gv_schemas::coordinates::InChunkPos::try_from_ivec3(bevy_math::IVec3::new(x, y, z))
                            .ok()
                            .expect("loop bounds stay inside the chunk");
                        index.insert(Quad {
                            position: pos,
                            direction: dir,
                            block,
                        });
                    }
                }
            }
        }
    }
    index
}

/// Copies the live voxel data and neighbour-boundary solidity for `chunk_coord` out of `island`
/// into a detached [`ChunkSnapshot`], or `None` if the chunk itself isn't loaded. Neighbour chunks
/// that aren't loaded are left as `None` masks, matching `generate_full_mesh`'s open-boundary rule.
pub fn build_chunk_snapshot(island: &Island, chunk_coord: ChunkPos, registry: &BlockRegistry) -> Option<ChunkSnapshot> {
    let neighborhood = island.neighborhood_around(chunk_coord)?;

    let mut voxels = Box::new([BlockId::AIR; CHUNK_DIM3Z]);
    neighborhood.center().read().voxels.copy_dense(&mut voxels);

    let mut neighbor_faces: [NeighborFaceMask; 6] = Default::default();
    for dir in ALL_DIRECTIONS {
        let Some(neighbor_chunk) = neighborhood.neighbor(dir) else {
            continue;
        };
        let axis_coord = if dir.is_positive() { 0 } else { CHUNK_DIM - 1 };
        let mut mask = Box::new([false; CHUNK_DIM2Z]);
        let neighbor = neighbor_chunk.read();
        for a in 0..CHUNK_DIM {
            for b in 0..CHUNK_DIM {
                let pos = neighbor_boundary_pos(dir, axis_coord, a, b);
                mask[face_index(a, b)] = registry.is_solid(neighbor.voxels.get(pos));
            }
        }
        neighbor_faces[dir.to_index()] = Some(mask);
    }

    Some(ChunkSnapshot { voxels, neighbor_faces })
}

/// The in-chunk position, inside the chunk on the far side of `dir`, that sits directly across the
/// boundary from in-chunk coordinate `(a, b)` on the plane orthogonal to `dir`'s axis.
fn neighbor_boundary_pos(dir: Direction, axis_coord: i32, a: i32, b: i32) -> InChunkPos {
    let (x, y, z) = match dir {
        Direction::XMinus | Direction::XPlus => (axis_coord, a, b),
        Direction::YMinus | Direction::YPlus => (a, axis_coord, b),
        Direction::ZMinus | Direction::ZPlus => (a, b, axis_coord),
    };
    InChunkPos::try_from_ivec3(bevy_math::IVec3::new(x, y, z)).expect("axis_coord and a/b stay inside the chunk")
}

/// Scans a snapshot's voxels once to derive the collision-mesh snapshot (every solid voxel's
/// position) and the per-block-type model instance lists (every instanced-mesh voxel's position,
/// grouped by block type), alongside the quad mesh itself.
pub fn generate_chunk_artifacts(
    snapshot: &ChunkSnapshot,
    registry: &BlockRegistry,
) -> (QuadIndex, CollisionMeshSnapshot, ModelInstanceLists) {
    let mesh = generate_full_mesh(snapshot, registry);

    let mut collision_mesh = CollisionMeshSnapshot::new();
    let mut model_instances = ModelInstanceLists::new();
    for x in 0..CHUNK_DIM {
        for y in 0..CHUNK_DIM {
            for z in 0..CHUNK_DIM {
                let block = snapshot.voxels[voxel_index(x, y, z)];
                if block.is_air() {
                    continue;
                }
                let pos = InChunkPos::try_from_ivec3(bevy_math::IVec3::new(x, y, z)).expect("loop bounds stay inside the chunk");
                if registry.is_solid(block) {
                    collision_mesh.push(pos);
                }
                if registry.get(block).is_some_and(|def| def.render_class == RenderClass::InstancedMesh) {
                    model_instances.entry(block).or_default().push(pos);
                }
            }
        }
    }

    (mesh, collision_mesh, model_instances)
}

/// One unit of work: remesh the chunk at `chunk_coord` in island `island_id` from `snapshot`.
pub struct MeshJob {
    /// The island the chunk belongs to.
    pub island_id: IslandId,
    /// The chunk's coordinate within its island.
    pub chunk_coord: ChunkPos,
    /// The voxel data to mesh, detached from live island state.
    pub snapshot: ChunkSnapshot,
}

/// The outcome of a completed mesh job.
pub struct MeshJobResult {
    /// The island the chunk belongs to.
    pub island_id: IslandId,
    /// The chunk's coordinate within its island.
    pub chunk_coord: ChunkPos,
    /// The freshly generated quad index, ready to swap onto the chunk.
    pub mesh: QuadIndex,
    /// The freshly generated collision-mesh snapshot, ready to swap onto the chunk.
    pub collision_mesh: CollisionMeshSnapshot,
    /// The freshly generated per-block-type model instance lists, ready to swap onto the chunk.
    pub model_instances: ModelInstanceLists,
}

/// A bounded pool of worker threads consuming [`MeshJob`]s. At most one job is ever in flight per
/// chunk; a job submitted for a chunk that already has one in flight is held as a follow-up and
/// resubmitted as soon as the in-flight job completes, collapsing any number of intervening edits
/// into a single extra remesh.
pub struct MeshPipeline {
    job_tx: Sender<MeshJob>,
    result_rx: Receiver<MeshJobResult>,
    workers: Vec<JoinHandle<()>>,
    in_flight: HashSet<(IslandId, ChunkPos)>,
    followups: HashMap<(IslandId, ChunkPos), ChunkSnapshot>,
}

/// `min(4, max(1, hw_threads - 2))`, leaving headroom for the simulation and network threads.
pub fn default_worker_count() -> usize {
    let hw = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    (hw.saturating_sub(2)).max(1).min(4)
}

impl MeshPipeline {
    /// Spawns a worker pool of `worker_count` threads sharing `registry` read-only.
    pub fn new(registry: Arc<BlockRegistry>, worker_count: usize) -> Self {
        let (job_tx, job_rx) = mpsc::channel::<MeshJob>();
        let (result_tx, result_rx) = mpsc::channel::<MeshJobResult>();
        let job_rx = Arc::new(std::sync::Mutex::new(job_rx));

        let mut workers = Vec::with_capacity(worker_count);
        for idx in 0..worker_count.max(1) {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let registry = Arc::clone(&registry);
            let handle = std::thread::Builder::new()
                .name(format!("Glasswing Mesh Worker {idx}"))
                .spawn(move || loop {
                    let job = {
                        let rx = job_rx.lock().expect("mesh job queue mutex poisoned");
                        rx.recv()
                    };
                    let Ok(job) = job else { break };
                    let (mesh, collision_mesh, model_instances) = generate_chunk_artifacts(&job.snapshot, &registry);
                    if result_tx
                        .send(MeshJobResult {
                            island_id: job.island_id,
                            chunk_coord: job.chunk_coord,
                            mesh,
                            collision_mesh,
                            model_instances,
                        })
                        .is_err()
                    {
                        break;
                    }
                })
                .expect("failed to spawn mesh worker thread");
            workers.push(handle);
        }

        Self {
            job_tx,
            result_rx,
            workers,
            in_flight: HashSet::new(),
            followups: HashMap::new(),
        }
    }

    /// Constructs a pipeline sized by [`default_worker_count`].
    pub fn with_default_worker_count(registry: Arc<BlockRegistry>) -> Self {
        Self::new(registry, default_worker_count())
    }

    /// Submits a remesh request for a chunk. If a job for this chunk is already in flight, the
    /// new snapshot replaces any previously queued follow-up rather than starting a second job.
    pub fn submit(&mut self, island_id: IslandId, chunk_coord: ChunkPos, snapshot: ChunkSnapshot) {
        let key = (island_id, chunk_coord);
        if self.in_flight.contains(&key) {
            self.followups.insert(key, snapshot);
            return;
        }
        self.in_flight.insert(key);
        let _ = self.job_tx.send(MeshJob {
            island_id,
            chunk_coord,
            snapshot,
        });
    }

    /// Drains every job that has finished since the last call, resubmitting any chunk that
    /// collected a follow-up snapshot while its first job was running.
    pub fn drain_completed(&mut self) -> Vec<MeshJobResult> {
        let mut completed = Vec::new();
        while let Ok(result) = self.result_rx.try_recv() {
            let key = (result.island_id, result.chunk_coord);
            self.in_flight.remove(&key);
            if let Some(followup) = self.followups.remove(&key) {
                self.submit(result.island_id, result.chunk_coord, followup);
            }
            completed.push(result);
        }
        completed
    }

    /// Number of worker threads in the pool.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

#[cfg(test)]
mod test {
    use gv_schemas::registry::{BlockDefinition, RegistryName};

    use super::*;

    fn stone_registry() -> BlockRegistry {
        let mut reg = BlockRegistry::new();
        reg.register(BlockDefinition {
            name: RegistryName::gv("stone"),
            render_class: RenderClass::VoxelCube,
            durability: 1,
        })
        .unwrap();
        reg
    }

    fn empty_snapshot() -> ChunkSnapshot {
        ChunkSnapshot {
            voxels: Box::new([BlockId::AIR; CHUNK_DIM3Z]),
            neighbor_faces: Default::default(),
        }
    }

    #[test]
    fn single_solid_voxel_with_no_neighbors_emits_six_quads() {
        let registry = stone_registry();
        let mut snapshot = empty_snapshot();
        snapshot.voxels[voxel_index(0, 0, 0)] = BlockId(1);
        let mesh = generate_full_mesh(&snapshot, &registry);
        assert_eq!(mesh.len(), 6);
    }

    #[test]
    fn two_adjacent_solid_voxels_cull_the_shared_face() {
        let registry = stone_registry();
        let mut snapshot = empty_snapshot();
        snapshot.voxels[voxel_index(0, 0, 0)] = BlockId(1);
        snapshot.voxels[voxel_index(1, 0, 0)] = BlockId(1);
        let mesh = generate_full_mesh(&snapshot, &registry);
        assert_eq!(mesh.len(), 10);
    }

    #[test]
    fn pipeline_runs_a_submitted_job_to_completion() {
        let registry = Arc::new(stone_registry());
        let mut pipeline = MeshPipeline::new(Arc::clone(&registry), 1);
        let mut snapshot = empty_snapshot();
        snapshot.voxels[voxel_index(5, 5, 5)] = BlockId(1);
        pipeline.submit(IslandId(1), ChunkPos::ZERO, snapshot);

        let mut results = Vec::new();
        for _ in 0..200 {
            results.extend(pipeline.drain_completed());
            if !results.is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].mesh.len(), 6);
    }

    #[test]
    fn generate_chunk_artifacts_populates_collision_mesh_and_instances() {
        let mut registry = stone_registry();
        registry
            .register(BlockDefinition {
                name: RegistryName::gv("lantern"),
                render_class: RenderClass::InstancedMesh,
                durability: 1,
            })
            .unwrap();
        let lantern = BlockId(2);

        let mut snapshot = empty_snapshot();
        snapshot.voxels[voxel_index(0, 0, 0)] = BlockId(1);
        snapshot.voxels[voxel_index(2, 0, 0)] = lantern;

        let (mesh, collision_mesh, model_instances) = generate_chunk_artifacts(&snapshot, &registry);
        assert_eq!(mesh.len(), 6);
        assert_eq!(collision_mesh, vec![InChunkPos::new(0, 0, 0)]);
        assert_eq!(model_instances.get(&lantern), Some(&vec![InChunkPos::new(2, 0, 0)]));
    }

    #[test]
    fn build_chunk_snapshot_reads_neighbor_solidity_across_the_boundary() {
        use gv_schemas::coordinates::BlockPos;
        use gv_schemas::voxel::island::{Island, IslandId, IslandTransform};

        let registry = stone_registry();
        let mut island = Island::create(IslandId(1), IslandTransform::default());
        island.set_voxel_server(BlockPos::new(CHUNK_DIM - 1, 0, 0), BlockId(1), &registry);
        island.set_voxel_server(BlockPos::new(CHUNK_DIM, 0, 0), BlockId(1), &registry);

        let snapshot = build_chunk_snapshot(&island, ChunkPos::ZERO, &registry).unwrap();
        assert_eq!(snapshot.voxels[voxel_index(CHUNK_DIM - 1, 0, 0)], BlockId(1));
        let mesh = generate_full_mesh(&snapshot, &registry);
        // The boundary face toward the occupied neighbour chunk must be culled, leaving 5 of the 6
        // faces for the lone solid voxel in this chunk.
        assert_eq!(mesh.len(), 5);
    }
}
