//! Island blueprints and activation-by-proximity: an island starts out as an *unrealised*
//! lightweight descriptor (seed, position, radius, biome) and is only turned into real chunks
//! once a tracked player gets within [`ACTIVATION_RADIUS`] of it, following the same
//! positional-seeding idea as the terrain generator's per-position RNG, just keyed off the
//! blueprint's own seed rather than a voxel coordinate.

use bevy_math::Vec3;
use gv_schemas::coordinates::{BlockPos, ChunkPos, CHUNK_DIM};
use gv_schemas::registry::{BlockId, BlockRegistry};
use gv_schemas::voxel::chunk::Chunk;
use gv_schemas::voxel::island::IslandTransform;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

use crate::world::island_system::{add_chunk_to_island, create_island};
use crate::world::World;

/// Distance, in meters, within which an unrealised island blueprint is materialised.
pub const ACTIVATION_RADIUS: f32 = 500.0;

/// A biome tag influencing which block types a blueprint's generator chooses. The spec leaves
/// biome selection itself external (asset/terrain content); this enum only distinguishes the
/// handful of block choices the core simulation needs to make on activation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Biome {
    /// A rocky island with a plain stone core.
    Rock,
    /// A grassy island with a shallow dirt/grass cap over stone.
    Grassland,
    /// An island built around a standing body of water.
    Lagoon,
}

/// A not-yet-generated island: cheap enough that thousands can sit in the registry without
/// ever costing chunk memory until a player wanders close.
#[derive(Copy, Clone, Debug)]
pub struct IslandBlueprint {
    /// Deterministic seed for this blueprint's voxel shape.
    pub seed: u64,
    /// World-space center the island will be realised at.
    pub center: Vec3,
    /// Approximate radius, in blocks, of the generated island body.
    pub radius: f32,
    /// Biome tag steering block selection.
    pub biome: Biome,
}

/// Registry of blueprints not yet realised into islands, plus a marker for which have already
/// been processed so a blueprint in range is materialised at most once.
#[derive(Default)]
pub struct BlueprintRegistry {
    pending: Vec<IslandBlueprint>,
}

impl BlueprintRegistry {
    /// Constructs an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a blueprint for later activation.
    pub fn push(&mut self, blueprint: IslandBlueprint) {
        self.pending.push(blueprint);
    }

    /// Number of blueprints still waiting to be realised.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Materialises every pending blueprint within [`ACTIVATION_RADIUS`] of `player_pos`, removing
    /// each from the pending list so it is never processed twice, and returns the ids of the
    /// islands just created.
    pub fn activate_near(&mut self, world: &mut World, registry: &BlockRegistry, player_pos: Vec3) -> Vec<gv_schemas::voxel::island::IslandId> {
        let mut activated = Vec::new();
        let mut remaining = Vec::with_capacity(self.pending.len());
        for blueprint in self.pending.drain(..) {
            if blueprint.center.distance(player_pos) <= ACTIVATION_RADIUS {
                activated.push(realise_blueprint(world, registry, &blueprint));
            } else {
                remaining.push(blueprint);
            }
        }
        self.pending = remaining;
        activated
    }
}

/// Deterministically turns one blueprint into a fully chunked, voxelised island and registers it
/// in `world`. Voxel shape is a jittered sphere: solid inside `radius` with a thin noise-perturbed
/// surface, so adjacent seeds don't all produce visually identical islands.
pub fn realise_blueprint(world: &mut World, registry: &BlockRegistry, blueprint: &IslandBlueprint) -> gv_schemas::voxel::island::IslandId {
    let island_id = create_island(world, IslandTransform {
        position: blueprint.center,
        rotation: bevy_math::Quat::IDENTITY,
    });

    let surface_block = surface_block_for(registry, blueprint.biome);
    let core_block = registry.id_of(&gv_schemas::registry::RegistryName::gv("stone")).unwrap_or(BlockId::AIR);
    let water_block = registry.water_id();

    let radius_blocks = blueprint.radius.max(1.0);
    let extent = radius_blocks.ceil() as i32 + 1;
    let chunk_extent = (extent / CHUNK_DIM) + 1;

    for cx in -chunk_extent..=chunk_extent {
        for cy in -chunk_extent..=chunk_extent {
            for cz in -chunk_extent..=chunk_extent {
                let coord = ChunkPos::new(cx, cy, cz);
                let mut chunk = Chunk::new(BlockId::AIR);
                let mut any_solid = false;
                for lx in 0..CHUNK_DIM {
                    for ly in 0..CHUNK_DIM {
                        for lz in 0..CHUNK_DIM {
                            let local = BlockPos::new(cx * CHUNK_DIM + lx, cy * CHUNK_DIM + ly, cz * CHUNK_DIM + lz);
                            let v = local.into_ivec3();
                            let offset = Vec3::new(v.x as f32, v.y as f32, v.z as f32) + Vec3::splat(0.5);
                            let mut rng = seed_at(blueprint.seed, v);
                            let jitter = rng.gen_range(-0.75f32..=0.75f32);
                            let distance = offset.length();
                            if distance > radius_blocks + jitter {
                                continue;
                            }
                            let is_shell = distance >= radius_blocks + jitter - 1.5;
                            let block = if blueprint.biome == Biome::Lagoon && offset.y < 0.0 && is_shell {
                                water_block.unwrap_or(core_block)
                            } else if is_shell {
                                surface_block
                            } else {
                                core_block
                            };
                            if block.is_air() {
                                continue;
                            }
                            any_solid = true;
                            chunk.voxels.put(
                                gv_schemas::coordinates::InChunkPos::try_new(lx, ly, lz)
                                    .expect("lx, ly, lz are loop-bounded to 0..CHUNK_DIM"),
                                block,
                            );
                        }
                    }
                }
                if any_solid {
                    add_chunk_to_island(world, island_id, coord, chunk).expect("island was just created");
                }
            }
        }
    }
    island_id
}

fn surface_block_for(registry: &BlockRegistry, biome: Biome) -> BlockId {
    let name = match biome {
        Biome::Rock => "stone",
        Biome::Grassland => "grass",
        Biome::Lagoon => "sand",
    };
    registry
        .id_of(&gv_schemas::registry::RegistryName::gv(name))
        .or_else(|| registry.id_of(&gv_schemas::registry::RegistryName::gv("stone")))
        .unwrap_or(BlockId::AIR)
}

/// Seeds a small deterministic RNG from a blueprint seed and a block position, following the
/// generator's positional-seeding convention: the same `(seed, pos)` pair always yields the same
/// jitter, independent of generation order.
fn seed_at(seed: u64, pos: bevy_math::IVec3) -> Xoshiro256StarStar {
    let mixed = seed ^ (pos.x as u64).wrapping_mul(0x9E3779B97F4A7C15) ^ (pos.y as u64).wrapping_mul(0xC2B2AE3D27D4EB4F) ^ (pos.z as u64).wrapping_mul(0x165667B19E3779F9);
    Xoshiro256StarStar::seed_from_u64(mixed)
}

#[cfg(test)]
mod test {
    use gv_schemas::registry::{BlockDefinition, RegistryName, RenderClass};

    use super::*;

    fn registry_with_terrain_blocks() -> BlockRegistry {
        let mut reg = BlockRegistry::new();
        reg.register(BlockDefinition {
            name: RegistryName::gv("stone"),
            render_class: RenderClass::VoxelCube,
            durability: 3,
        })
        .unwrap();
        reg
    }

    #[test]
    fn blueprint_outside_radius_is_left_pending() {
        let registry = registry_with_terrain_blocks();
        let mut world = World::new();
        let mut blueprints = BlueprintRegistry::new();
        blueprints.push(IslandBlueprint {
            seed: 1,
            center: Vec3::new(10_000.0, 0.0, 0.0),
            radius: 8.0,
            biome: Biome::Rock,
        });
        let activated = blueprints.activate_near(&mut world, &registry, Vec3::ZERO);
        assert!(activated.is_empty());
        assert_eq!(blueprints.pending_count(), 1);
        assert_eq!(world.island_count(), 0);
    }

    #[test]
    fn blueprint_within_radius_is_realised_exactly_once() {
        let registry = registry_with_terrain_blocks();
        let mut world = World::new();
        let mut blueprints = BlueprintRegistry::new();
        blueprints.push(IslandBlueprint {
            seed: 42,
            center: Vec3::new(5.0, 0.0, 0.0),
            radius: 6.0,
            biome: Biome::Rock,
        });
        let activated = blueprints.activate_near(&mut world, &registry, Vec3::ZERO);
        assert_eq!(activated.len(), 1);
        assert_eq!(world.island_count(), 1);
        assert_eq!(blueprints.pending_count(), 0);

        // A second pass near the same spot does nothing: the blueprint was already consumed.
        let activated_again = blueprints.activate_near(&mut world, &registry, Vec3::ZERO);
        assert!(activated_again.is_empty());
        assert_eq!(world.island_count(), 1);
    }

    #[test]
    fn realised_island_has_a_solid_core() {
        let registry = registry_with_terrain_blocks();
        let mut world = World::new();
        let blueprint = IslandBlueprint {
            seed: 7,
            center: Vec3::ZERO,
            radius: 6.0,
            biome: Biome::Rock,
        };
        let id = realise_blueprint(&mut world, &registry, &blueprint);
        let island = world.island(id).unwrap();
        assert!(registry.is_solid(island.get_voxel(BlockPos::new(0, 0, 0))));
    }
}
