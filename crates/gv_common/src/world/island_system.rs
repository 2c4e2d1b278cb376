//! Island lifecycle operations: creating islands, loading chunks into them, and routing voxel
//! edits through the authoritative-vs-predicted write path depending on which side is asking.

use gv_schemas::coordinates::{BlockPos, ChunkPos};
use gv_schemas::registry::{BlockId, BlockRegistry};
use gv_schemas::voxel::chunk::Chunk;
use gv_schemas::voxel::island::{Island, IslandId, IslandTransform};

use crate::error::GameError;
use crate::world::World;

/// Creates a new, empty island at the given transform and registers it in `world`.
pub fn create_island(world: &mut World, transform: IslandTransform) -> IslandId {
    let id = world.allocate_island_id();
    world.insert_island(Island::create(id, transform));
    id
}

/// Loads a chunk into an existing island at the given chunk coordinate.
pub fn add_chunk_to_island(
    world: &mut World,
    island_id: IslandId,
    coord: ChunkPos,
    chunk: Chunk,
) -> Result<(), GameError> {
    let island = world
        .island_mut(island_id)
        .ok_or_else(|| GameError::invalid_argument(format!("no island {island_id:?}")))?;
    island.add_chunk(coord, chunk);
    Ok(())
}

/// Server-authoritative voxel write: always succeeds against a loaded island (allocating the
/// target chunk if necessary) and advances the chunk's confirmed revision.
pub fn set_voxel_in_island_server(
    world: &mut World,
    island_id: IslandId,
    pos: BlockPos,
    voxel: BlockId,
    registry: &BlockRegistry,
) -> Result<BlockId, GameError> {
    let island = world
        .island_mut(island_id)
        .ok_or_else(|| GameError::invalid_argument(format!("no island {island_id:?}")))?;
    Ok(island.set_voxel_server(pos, voxel, registry))
}

/// Client-side predictive voxel write: fails with [`GameError::PreconditionViolation`] if the
/// target chunk is not already loaded, since a client can only predict into data it has actually
/// received from the server.
pub fn set_voxel_in_island_client(
    world: &mut World,
    island_id: IslandId,
    pos: BlockPos,
    voxel: BlockId,
    registry: &BlockRegistry,
) -> Result<BlockId, GameError> {
    let island = world
        .island_mut(island_id)
        .ok_or_else(|| GameError::invalid_argument(format!("no island {island_id:?}")))?;
    island
        .set_voxel_client_predicted(pos, voxel, registry)
        .ok_or_else(|| GameError::precondition("voxel edit predicted into an unloaded chunk"))
}

#[cfg(test)]
mod test {
    use gv_schemas::registry::{BlockDefinition, RegistryName, RenderClass};
    use gv_schemas::voxel::chunk::Chunk;

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
    fn server_write_allocates_missing_chunk() {
        let registry = stone_registry();
        let mut world = World::new();
        let id = create_island(&mut world, IslandTransform::default());
        let pos = BlockPos::new(1, 1, 1);
        let prev = set_voxel_in_island_server(&mut world, id, pos, BlockId(1), &registry).unwrap();
        assert_eq!(prev, BlockId::AIR);
        assert_eq!(world.island(id).unwrap().get_voxel(pos), BlockId(1));
    }

    #[test]
    fn client_write_rejects_unloaded_chunk() {
        let registry = stone_registry();
        let mut world = World::new();
        let id = create_island(&mut world, IslandTransform::default());
        let pos = BlockPos::new(1, 1, 1);
        assert!(set_voxel_in_island_client(&mut world, id, pos, BlockId(1), &registry).is_err());
    }

    #[test]
    fn client_write_succeeds_once_chunk_is_loaded() {
        let registry = stone_registry();
        let mut world = World::new();
        let id = create_island(&mut world, IslandTransform::default());
        add_chunk_to_island(&mut world, id, ChunkPos::ZERO, Chunk::new(BlockId::AIR)).unwrap();
        let pos = BlockPos::new(1, 1, 1);
        assert!(set_voxel_in_island_client(&mut world, id, pos, BlockId(1), &registry).is_ok());
    }

    #[test]
    fn operations_on_unknown_island_are_invalid_argument() {
        let registry = stone_registry();
        let mut world = World::new();
        let bogus = IslandId(999);
        assert!(matches!(
            set_voxel_in_island_server(&mut world, bogus, BlockPos::ZERO, BlockId(1), &registry),
            Err(GameError::InvalidArgument(_))
        ));
    }
}
