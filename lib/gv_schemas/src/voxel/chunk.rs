//! A single 32^3 grid of voxel data, with an optional mesh surface.

use hashbrown::HashMap;

use crate::coordinates::InChunkPos;
use crate::registry::BlockId;
use crate::voxel::chunk_storage::ArrayStorage;
use crate::voxel::mesh::QuadIndex;

/// The positions a chunk's solid voxels occupy, snapshotted at the last mesh swap-in. Physics
/// queries island voxel storage directly and does not consume this; it exists because the spec's
/// chunk type carries a collision-mesh snapshot alongside the render mesh, produced by the same
/// pipeline pass and cleared/rebuilt in lockstep with it.
pub type CollisionMeshSnapshot = Vec<InChunkPos>;

/// Per-block-type placement lists for blocks rendered as individual model instances
/// (`RenderClass::InstancedMesh`) rather than as cube quads, e.g. foliage.
pub type ModelInstanceLists = HashMap<BlockId, Vec<InChunkPos>>;

/// A chunk's voxel data plus, when the owning island is client-side, the derived render/physics
/// state the async mesh pipeline keeps in sync with edits. Server-only islands never populate
/// `mesh`: the spec's server has no renderer to feed, so it would be dead bookkeeping on every
/// voxel write.
#[derive(Clone)]
pub struct Chunk {
    /// Dense voxel storage.
    pub voxels: ArrayStorage,
    /// The chunk's exposed-face index, present only on client-side islands.
    pub mesh: Option<QuadIndex>,
    /// Set whenever a voxel write invalidates the last mesh swap-in, cleared once the pipeline
    /// swaps a fresh one in. A chunk with no mesh (server-only) never needs to be dirty.
    pub mesh_dirty: bool,
    /// Solid-voxel positions as of the last pipeline swap-in, for collision broad-phase.
    pub collision_mesh: CollisionMeshSnapshot,
    /// Per-block-type instance placements as of the last pipeline swap-in.
    pub model_instances: ModelInstanceLists,
}

impl Chunk {
    /// Constructs a new chunk uniformly filled with `fill_block`, with no mesh surface.
    pub fn new(fill_block: BlockId) -> Self {
        Self {
            voxels: ArrayStorage::Singleton(fill_block),
            mesh: None,
            mesh_dirty: false,
            collision_mesh: CollisionMeshSnapshot::new(),
            model_instances: ModelInstanceLists::new(),
        }
    }

    /// Allocates an empty mesh surface for this chunk, as happens when its island is flagged
    /// client-side, and marks it dirty so the pipeline picks it up on the next tick. A no-op if a
    /// mesh is already present.
    pub fn enable_mesh(&mut self) {
        if self.mesh.is_none() {
            self.mesh = Some(QuadIndex::new());
            self.mesh_dirty = true;
        }
    }

    /// Drops the mesh surface and any derived collision/instance state, as happens when an island
    /// stops being client-side.
    pub fn disable_mesh(&mut self) {
        self.mesh = None;
        self.mesh_dirty = false;
        self.collision_mesh.clear();
        self.model_instances.clear();
    }

    /// Whether this chunk currently exposes a mesh surface.
    pub fn has_mesh(&self) -> bool {
        self.mesh.is_some()
    }

    /// Marks the chunk's mesh as needing a pipeline pass, if it has one at all.
    pub fn mark_mesh_dirty(&mut self) {
        if self.mesh.is_some() {
            self.mesh_dirty = true;
        }
    }

    /// Swaps in a freshly generated mesh and its derived collision/instance state in one go, and
    /// clears the dirty flag. The old mesh is never partially visible: every field lands together.
    pub fn swap_in_mesh(&mut self, mesh: QuadIndex, collision_mesh: CollisionMeshSnapshot, model_instances: ModelInstanceLists) {
        self.mesh = Some(mesh);
        self.collision_mesh = collision_mesh;
        self.model_instances = model_instances;
        self.mesh_dirty = false;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::coordinates::InChunkPos;

    #[test]
    fn new_chunk_has_no_mesh_until_enabled() {
        let mut chunk = Chunk::new(BlockId::AIR);
        assert!(!chunk.has_mesh());
        chunk.enable_mesh();
        assert!(chunk.has_mesh());
        chunk.disable_mesh();
        assert!(!chunk.has_mesh());
    }

    #[test]
    fn voxel_writes_are_independent_of_mesh_state() {
        let mut chunk = Chunk::new(BlockId::AIR);
        chunk.voxels.put(InChunkPos::ZERO, BlockId(4));
        assert_eq!(chunk.voxels.get(InChunkPos::ZERO), BlockId(4));
    }
}
