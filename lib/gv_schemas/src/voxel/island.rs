//! Islands: the unit a chunk table is local to. Each island is a rigid body with its own position
//! and orientation in world space; a voxel's world-space location is only meaningful once combined
//! with the island transform that places its chunk table in the world.

use bevy_math::{Mat4, Quat, Vec3};
use hashbrown::HashMap;

use crate::coordinates::{BlockPos, ChunkPos, InChunkPos, CHUNK_DIM};
use crate::direction::{Direction, ALL_DIRECTIONS};
use crate::mutwatcher::MutWatcher;
use crate::registry::{BlockId, BlockRegistry};
use crate::voxel::chunk::Chunk;
use crate::voxel::mesh::Quad;
use crate::voxel::neighborhood::ChunkNeighborhood;

/// A unique island identifier, stable for the island's lifetime (including across a structural
/// split, where the original id is kept by the larger fragment; see the connectivity analyzer).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct IslandId(pub u32);

/// The rigid-body placement of an island in world space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IslandTransform {
    /// World-space position of the island's local origin (block `(0,0,0)`).
    pub position: Vec3,
    /// World-space orientation of the island.
    pub rotation: Quat,
}

impl Default for IslandTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl IslandTransform {
    /// The 4x4 matrix carrying island-local coordinates into world space.
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    /// Converts a world-space point into this island's local coordinate space.
    pub fn world_to_local(&self, world: Vec3) -> Vec3 {
        self.rotation.inverse() * (world - self.position)
    }

    /// Converts an island-local point into world space.
    pub fn local_to_world(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * local
    }
}

/// A floating island: a chunk table addressed in the island's own local coordinate space, plus
/// the rigid-body transform placing it in the world.
pub struct Island {
    id: IslandId,
    /// This island's chunks, sparse: absent entries are implicitly all-air.
    pub chunks: HashMap<ChunkPos, MutWatcher<Chunk>>,
    /// Rigid-body placement in world space.
    pub transform: IslandTransform,
    /// Linear velocity, world space, meters/second.
    pub velocity: Vec3,
    /// Angular velocity, local space, radians/second per axis.
    pub angular_velocity: Vec3,
    /// Whether this island currently exposes a mesh surface on its chunks. Set once by whichever
    /// side (client) decides it needs to render this island; server-only islands never flip it.
    client_side: bool,
}

impl Island {
    /// Creates a new, empty island at the given transform.
    pub fn create(id: IslandId, transform: IslandTransform) -> Self {
        Self {
            id,
            chunks: HashMap::new(),
            transform,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            client_side: false,
        }
    }

    /// This island's stable identifier.
    pub fn id(&self) -> IslandId {
        self.id
    }

    /// Whether this island currently maintains mesh surfaces on its chunks.
    pub fn is_client_side(&self) -> bool {
        self.client_side
    }

    /// Flags this island as client-side, allocating mesh surfaces on every already-loaded chunk.
    /// Idempotent.
    pub fn mark_client_side(&mut self) {
        if self.client_side {
            return;
        }
        self.client_side = true;
        for chunk in self.chunks.values_mut() {
            chunk.mutate_without_revision().enable_mesh();
        }
    }

    /// Converts a world-space point into this island's local coordinate space.
    pub fn world_to_local(&self, world: Vec3) -> Vec3 {
        self.transform.world_to_local(world)
    }

    /// Converts an island-local point into world space.
    pub fn local_to_world(&self, local: Vec3) -> Vec3 {
        self.transform.local_to_world(local)
    }

    /// The island's placement as a 4x4 matrix.
    pub fn transform_matrix(&self) -> Mat4 {
        self.transform.to_matrix()
    }

    /// Inserts a chunk at the given coordinate, allocating its mesh surface if the island is
    /// already client-side. Overwrites any chunk already at that coordinate.
    pub fn add_chunk(&mut self, coord: ChunkPos, mut chunk: Chunk) {
        if self.client_side {
            chunk.enable_mesh();
        }
        self.chunks.insert(coord, MutWatcher::new(chunk));
    }

    /// Reads the voxel at an island-local block position. Unloaded chunks read as air.
    pub fn get_voxel(&self, pos: BlockPos) -> BlockId {
        let (chunk_coord, in_chunk) = pos.split_chunk_component();
        self.chunks.get(&chunk_coord).map(|c| c.read().voxels.get(in_chunk)).unwrap_or(BlockId::AIR)
    }

    /// Server-authoritative voxel write: advances the chunk's confirmed revision, then adds quads
    /// for newly exposed outward faces and removes quads for faces now occluded. Allocates the
    /// target chunk (as all-air) if it was not already loaded.
    pub fn set_voxel_server(&mut self, pos: BlockPos, voxel: BlockId, registry: &BlockRegistry) -> BlockId {
        let (chunk_coord, in_chunk) = pos.split_chunk_component();
        let client_side = self.client_side;
        let chunk = self.chunks.entry(chunk_coord).or_insert_with(|| {
            let mut c = Chunk::new(BlockId::AIR);
            if client_side {
                c.enable_mesh();
            }
            MutWatcher::new(c)
        });
        let previous = chunk.mutate_stored().voxels.put(in_chunk, voxel);
        chunk.mutate_without_revision().mark_mesh_dirty();
        self.sync_mesh_around(chunk_coord, in_chunk, registry);
        previous
    }

    /// Client-side predictive voxel write, advancing the chunk's predicted revision instead of
    /// its confirmed one, then incrementally updating the chunk's quad index the same way the
    /// server path does; the caller is responsible for reconciling against the server's eventual
    /// [`crate::wire::VoxelChangeUpdate`]. Unlike the server path, this never allocates an unloaded
    /// chunk: a client cannot predict into a chunk it has not received from the server.
    pub fn set_voxel_client_predicted(&mut self, pos: BlockPos, voxel: BlockId, registry: &BlockRegistry) -> Option<BlockId> {
        let (chunk_coord, in_chunk) = pos.split_chunk_component();
        let chunk = self.chunks.get_mut(&chunk_coord)?;
        let previous = chunk.mutate_predicted().voxels.put(in_chunk, voxel);
        chunk.mutate_without_revision().mark_mesh_dirty();
        self.sync_mesh_around(chunk_coord, in_chunk, registry);
        Some(previous)
    }

    /// Incrementally updates the quad index around a single voxel write: the written voxel's own
    /// six faces, and the matching face of each of its six neighbours (whose exposure toward the
    /// written voxel may have just changed). Neighbours that fall in a different chunk are reached
    /// directly through `self.chunks`, so this stays correct across chunk boundaries without any
    /// detached snapshot. A no-op for chunks that carry no mesh (server-only islands).
    fn sync_mesh_around(&mut self, chunk_coord: ChunkPos, in_chunk: InChunkPos, registry: &BlockRegistry) {
        let base = BlockPos::from_ivec3(chunk_coord.into_ivec3() * CHUNK_DIM + in_chunk.into_ivec3());
        let self_block = self.voxel_at(chunk_coord, in_chunk);
        let self_solid = registry.is_solid(self_block);

        if self.chunks.get(&chunk_coord).is_some_and(|c| c.read().has_mesh()) {
            for dir in ALL_DIRECTIONS {
                let (n_chunk, n_in_chunk) = BlockPos::from_ivec3(base.into_ivec3() + dir.to_ivec3()).split_chunk_component();
                let neighbor_solid = registry.is_solid(self.voxel_at(n_chunk, n_in_chunk));
                self.set_face(chunk_coord, in_chunk, dir, self_solid && !neighbor_solid, self_block);
            }
        }

        for dir in ALL_DIRECTIONS {
            let (n_chunk, n_in_chunk) = BlockPos::from_ivec3(base.into_ivec3() + dir.to_ivec3()).split_chunk_component();
            if !self.chunks.get(&n_chunk).is_some_and(|c| c.read().has_mesh()) {
                continue;
            }
            let neighbor_block = self.voxel_at(n_chunk, n_in_chunk);
            let neighbor_solid = registry.is_solid(neighbor_block);
            self.set_face(n_chunk, n_in_chunk, dir.opposite(), neighbor_solid && !self_solid, neighbor_block);
        }
    }

    /// Reads a voxel at an already-split chunk/in-chunk coordinate pair, treating an unloaded
    /// chunk as air.
    fn voxel_at(&self, chunk_coord: ChunkPos, in_chunk: InChunkPos) -> BlockId {
        self.chunks.get(&chunk_coord).map(|c| c.read().voxels.get(in_chunk)).unwrap_or(BlockId::AIR)
    }

    /// Inserts or removes a single quad face on a chunk's mesh, depending on whether it should
    /// currently be exposed. A no-op if the chunk is unloaded or carries no mesh.
    fn set_face(&mut self, chunk_coord: ChunkPos, position: InChunkPos, direction: Direction, exposed: bool, block: BlockId) {
        let Some(chunk) = self.chunks.get_mut(&chunk_coord) else {
            return;
        };
        let Some(mesh) = chunk.mutate_without_revision().mesh.as_mut() else {
            return;
        };
        if exposed {
            mesh.insert(Quad { position, direction, block });
        } else {
            mesh.remove(position, direction);
        }
    }

    /// A neighborhood view of the chunk at `coord` and its six face-adjacent chunks, for mesh
    /// generation and cross-chunk connectivity flood fill.
    pub fn neighborhood_around(&self, coord: ChunkPos) -> Option<ChunkNeighborhood<'_>> {
        ChunkNeighborhood::from_center(coord, |c| self.chunks.get(&c))
    }

    /// The island-local block position at the center of the island's currently loaded chunk
    /// bounding box, used as a stable anchor when extracting a structural fragment into its own
    /// island (see the connectivity analyzer).
    pub fn approximate_centroid(&self) -> Option<BlockPos> {
        let mut min = None;
        let mut max = None;
        for &coord in self.chunks.keys() {
            let v = coord.into_ivec3();
            min = Some(min.map_or(v, |m: bevy_math::IVec3| m.min(v)));
            max = Some(max.map_or(v, |m: bevy_math::IVec3| m.max(v)));
        }
        let (min, max) = (min?, max?);
        let center_chunk = (min + max) / 2;
        Some(BlockPos::from_ivec3(center_chunk * CHUNK_DIM + bevy_math::IVec3::splat(CHUNK_DIM / 2)))
    }
}

#[cfg(test)]
mod test {
    use crate::registry::{BlockDefinition, RegistryName, RenderClass};

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

    #[test]
    fn world_local_round_trip() {
        let transform = IslandTransform {
            position: Vec3::new(10.0, 0.0, -5.0),
            rotation: Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
        };
        let local = Vec3::new(3.0, 1.0, 2.0);
        let world = transform.local_to_world(local);
        let back = transform.world_to_local(world);
        assert!((back - local).length() < 1e-4);
    }

    #[test]
    fn server_write_allocates_chunk_and_reads_back() {
        let registry = stone_registry();
        let mut island = Island::create(IslandId(1), IslandTransform::default());
        let pos = BlockPos::new(5, 5, 5);
        assert_eq!(island.get_voxel(pos), BlockId::AIR);
        island.set_voxel_server(pos, BlockId(1), &registry);
        assert_eq!(island.get_voxel(pos), BlockId(1));
    }

    #[test]
    fn client_predicted_write_never_allocates_chunk() {
        let registry = stone_registry();
        let mut island = Island::create(IslandId(1), IslandTransform::default());
        let pos = BlockPos::new(5, 5, 5);
        assert!(island.set_voxel_client_predicted(pos, BlockId(1), &registry).is_none());
        assert!(island.chunks.is_empty());
    }

    #[test]
    fn marking_client_side_enables_mesh_on_existing_chunks() {
        let registry = stone_registry();
        let mut island = Island::create(IslandId(1), IslandTransform::default());
        island.set_voxel_server(BlockPos::new(0, 0, 0), BlockId(1), &registry);
        assert!(!island.chunks[&ChunkPos::ZERO].read().has_mesh());
        island.mark_client_side();
        assert!(island.chunks[&ChunkPos::ZERO].read().has_mesh());
    }

    #[test]
    fn incremental_write_matches_full_remesh() {
        use gv_schemas_mesh_pipeline_testing::generate_full_mesh_for_chunk;

        let registry = stone_registry();
        let mut island = Island::create(IslandId(1), IslandTransform::default());
        island.mark_client_side();

        // Build an L-shape of solid voxels through incremental writes only, including a write on
        // a chunk boundary so a neighbouring chunk's faces get updated too.
        let positions = [
            BlockPos::new(0, 0, 0),
            BlockPos::new(1, 0, 0),
            BlockPos::new(1, 1, 0),
            BlockPos::new(CHUNK_DIM - 1, 0, 0),
            BlockPos::new(CHUNK_DIM, 0, 0),
        ];
        for pos in positions {
            island.set_voxel_server(pos, BlockId(1), &registry);
        }

        for &chunk_coord in island.chunks.keys().collect::<Vec<_>>() {
            let incremental_len = island.chunks[&chunk_coord].read().mesh.as_ref().unwrap().len();
            let full = generate_full_mesh_for_chunk(&island, chunk_coord, &registry);
            assert_eq!(incremental_len, full.len(), "chunk {chunk_coord:?} mesh diverged from a full remesh");
            for quad in full.iter() {
                let incremental = island.chunks[&chunk_coord].read().mesh.as_ref().unwrap();
                assert_eq!(incremental.get(quad.position, quad.direction).copied(), Some(*quad));
            }
        }
    }
}
