//! The fluid system: sleeping water voxels wake into active ECS particles when disturbed, path-
//! find downhill toward a resting spot, and settle back into a voxel once no lower neighbour
//! remains. Particles are ordinary `bevy_ecs` entities so the orchestrator can schedule fluid
//! ticks alongside every other system on the same `World`.

use bevy::ecs::component::Component;
use bevy::ecs::entity::Entity;
use bevy_math::Vec3;
use gv_schemas::coordinates::BlockPos;
use gv_schemas::direction::Direction;
use gv_schemas::registry::{BlockId, BlockRegistry};
use gv_schemas::voxel::island::IslandId;
use smallvec::SmallVec;

use crate::config::FluidConfig;
use crate::world::World as GameWorld;

/// A water cell's lifecycle stage once it has left the sleeping-voxel representation. `Sleeping`
/// is transient: it marks a particle that has committed to converting back into a voxel this tick
/// but has not yet had that write applied, mirroring the originating engine's three-stage model
/// even though gameplay-visible water is otherwise only ever a voxel or an `Active`/`Settling`
/// particle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FluidParticleState {
    /// Free-falling or flowing, not yet committed to a resting voxel.
    Active,
    /// Committed to a target voxel and moving toward it, re-checking for a lower neighbour.
    Settling,
    /// Committed to sleep this tick; the caller converts it back into a voxel and despawns it.
    Sleeping,
}

/// Caps how many times a wake can cascade into waking further neighbours in one call chain,
/// so breaking a block embedded in a large body of water can't recurse unboundedly.
const MAX_CHAIN_DEPTH: u8 = 16;
const PATHFIND_PROBE_DEPTH: i32 = 10;
const PATHFIND_DROP_THRESHOLD: f32 = 0.05;
const PATHFIND_FORCE_MAGNITUDE: f32 = 3.0;
const PATHFIND_ARRIVE_DISTANCE: f32 = 0.1;

/// An active or settling fluid particle. Position and watched voxels are island-local.
#[derive(Component, Debug)]
pub struct FluidParticle {
    /// The island this particle moves within; a particle never crosses islands.
    pub island_id: IslandId,
    /// Island-local position.
    pub position: Vec3,
    /// Island-local velocity.
    pub velocity: Vec3,
    /// Lifecycle stage.
    pub state: FluidParticleState,
    /// Island-local water-voxel positions collected at spawn within `tug_radius`, tugged awake
    /// once the particle has moved `tug_distance` away from them.
    pub watched: SmallVec<[BlockPos; 8]>,
    /// The voxel position this particle is pathfinding or settling toward.
    pub committed_target: Option<BlockPos>,
    /// The voxel position this particle originally woke from, kept for diagnostics.
    pub original_voxel_pos: BlockPos,
    /// How many wake-cascade hops produced this particle; caps further cascading.
    pub chain_depth: u8,
}

/// Owns the ECS world holding every fluid particle. Deliberately separate from [`GameWorld`]:
/// particles are not addressed by island-local voxel position, and giving them their own `World`
/// keeps fluid scheduling independent of island/chunk storage.
#[derive(Default)]
pub struct FluidSystem {
    ecs: bevy::ecs::world::World,
}

impl FluidSystem {
    /// Constructs an empty fluid system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of particles currently active or settling.
    pub fn particle_count(&mut self) -> usize {
        self.ecs.query::<&FluidParticle>().iter(&self.ecs).count()
    }

    /// Reads a particle's current state, if it still exists.
    pub fn particle(&self, entity: Entity) -> Option<&FluidParticle> {
        self.ecs.get::<FluidParticle>(entity)
    }

    fn collect_watched(island: &gv_schemas::voxel::island::Island, registry: &BlockRegistry, origin: BlockPos, tug_radius: i32) -> SmallVec<[BlockPos; 8]> {
        let water_id = registry.water_id();
        let mut watched = SmallVec::new();
        for dx in -tug_radius..=tug_radius {
            for dy in -tug_radius..=tug_radius {
                for dz in -tug_radius..=tug_radius {
                    let pos = BlockPos::new(origin.x + dx, origin.y + dy, origin.z + dz);
                    if Some(island.get_voxel(pos)) == water_id && watched.len() < watched.capacity() {
                        watched.push(pos);
                    }
                }
            }
        }
        watched
    }

    /// Wakes the water voxel at `voxel_pos` into a new active particle: clears the voxel, seeds
    /// the new particle's watched list from nearby water, and returns its entity. Returns `None`
    /// if the voxel was not water, or the chain depth budget is exhausted.
    pub fn wake_voxel(
        &mut self,
        world: &mut GameWorld,
        registry: &BlockRegistry,
        config: &FluidConfig,
        island_id: IslandId,
        voxel_pos: BlockPos,
        chain_depth: u8,
    ) -> Option<Entity> {
        if chain_depth >= MAX_CHAIN_DEPTH {
            return None;
        }
        let water_id = registry.water_id()?;
        let island = world.island_mut(island_id)?;
        if island.get_voxel(voxel_pos) != water_id {
            return None;
        }
        island.set_voxel_server(voxel_pos, BlockId::AIR, registry);
        let tug_radius = config.tug_radius.ceil() as i32;
        let watched = Self::collect_watched(island, registry, voxel_pos, tug_radius);
        let v = voxel_pos.into_ivec3();
        let position = Vec3::new(v.x as f32, v.y as f32, v.z as f32) + Vec3::splat(0.5);
        let entity = self
            .ecs
            .spawn(FluidParticle {
                island_id,
                position,
                velocity: Vec3::ZERO,
                state: FluidParticleState::Active,
                watched,
                committed_target: None,
                original_voxel_pos: voxel_pos,
                chain_depth,
            })
            .id();
        Some(entity)
    }

    /// Direct-removal activation: a non-water voxel was just broken; if any of its face-adjacent
    /// neighbours is still water, wakes the first one found.
    pub fn wake_adjacent_water(
        &mut self,
        world: &mut GameWorld,
        registry: &BlockRegistry,
        config: &FluidConfig,
        island_id: IslandId,
        removed_pos: BlockPos,
    ) -> Option<Entity> {
        let water_id = registry.water_id()?;
        let island = world.island(island_id)?;
        for dir in gv_schemas::direction::ALL_DIRECTIONS {
            let neighbor = BlockPos::from_ivec3(removed_pos.into_ivec3() + dir.to_ivec3());
            if island.get_voxel(neighbor) == water_id {
                return self.wake_voxel(world, registry, config, island_id, neighbor, 0);
            }
        }
        None
    }

    /// Runs one tug-activation pass: wakes every watched voxel any particle has drifted
    /// `tug_distance` away from, up to `max_particles_per_frame` wakings globally this tick.
    pub fn tick_tug_activation(&mut self, world: &mut GameWorld, registry: &BlockRegistry, config: &FluidConfig) {
        let mut budget = config.max_particles_per_frame;
        if budget == 0 {
            return;
        }
        let mut due = Vec::new();
        let mut query = self.ecs.query::<(Entity, &mut FluidParticle)>();
        for (entity, mut particle) in query.iter_mut(&mut self.ecs) {
            if budget == 0 {
                break;
            }
            let island_id = particle.island_id;
            let chain_depth = particle.chain_depth;
            let mut fired = None;
            for (idx, &watched_pos) in particle.watched.iter().enumerate() {
                let v = watched_pos.into_ivec3();
                let watched_world = Vec3::new(v.x as f32, v.y as f32, v.z as f32) + Vec3::splat(0.5);
                if particle.position.distance(watched_world) > config.tug_distance {
                    fired = Some((idx, watched_pos));
                    break;
                }
            }
            if let Some((idx, watched_pos)) = fired {
                particle.watched.remove(idx);
                due.push((island_id, watched_pos, chain_depth.saturating_add(1)));
                budget -= 1;
            }
        }
        for (island_id, watched_pos, chain_depth) in due {
            self.wake_voxel(world, registry, config, island_id, watched_pos, chain_depth);
        }
    }

    fn ground_height_below(world: &GameWorld, registry: &BlockRegistry, island_id: IslandId, column: BlockPos) -> Option<i32> {
        let island = world.island(island_id)?;
        for drop in 0..=PATHFIND_PROBE_DEPTH {
            let probe = BlockPos::new(column.x, column.y - drop, column.z);
            if registry.is_solid(island.get_voxel(probe)) {
                return Some(column.y - drop);
            }
        }
        None
    }

    /// Advances pathfinding/settling for every grounded particle by `dt`: picks (or keeps) a
    /// target voxel among strictly-lower horizontal neighbours, steers toward it, and switches a
    /// particle with no lower neighbour left into [`FluidParticleState::Sleeping`]. Returns the
    /// entities that committed to sleep this tick, for the caller to convert back into voxels.
    pub fn tick_pathfinding(&mut self, world: &GameWorld, registry: &BlockRegistry, dt: f32) -> Vec<Entity> {
        let mut ready_to_sleep = Vec::new();
        let mut query = self.ecs.query::<(Entity, &mut FluidParticle)>();
        for (entity, mut particle) in query.iter_mut(&mut self.ecs) {
            if matches!(particle.state, FluidParticleState::Sleeping) {
                continue;
            }
            let current_voxel = BlockPos::from_ivec3(particle.position.floor().as_ivec3());
            let current_ground = Self::ground_height_below(world, registry, particle.island_id, current_voxel);

            let mut best: Option<(BlockPos, i32)> = particle
                .committed_target
                .and_then(|t| Self::ground_height_below(world, registry, particle.island_id, t).map(|h| (t, h)));

            for dir in [Direction::XMinus, Direction::XPlus, Direction::ZMinus, Direction::ZPlus] {
                let neighbor = BlockPos::from_ivec3(current_voxel.into_ivec3() + dir.to_ivec3());
                let Some(neighbor_ground) = Self::ground_height_below(world, registry, particle.island_id, neighbor) else {
                    continue;
                };
                let strictly_lower_than_current = current_ground.is_none_or(|g| (g - neighbor_ground) as f32 > PATHFIND_DROP_THRESHOLD);
                if !strictly_lower_than_current {
                    continue;
                }
                // Once committed, a particle may only switch to a lower target still.
                let improves_commitment = best.is_none_or(|(_, best_height)| neighbor_ground < best_height);
                if improves_commitment {
                    best = Some((neighbor, neighbor_ground));
                }
            }

            let target = best.map(|(pos, _)| pos).unwrap_or(current_voxel);
            particle.committed_target = Some(target);

            let v = target.into_ivec3();
            let target_world = Vec3::new(v.x as f32, v.y as f32, v.z as f32) + Vec3::splat(0.5);
            let to_target = target_world - particle.position;
            let distance = to_target.length();
            if distance < PATHFIND_ARRIVE_DISTANCE {
                particle.velocity = Vec3::ZERO;
                if best.is_none() {
                    particle.state = FluidParticleState::Sleeping;
                    particle.committed_target = Some(current_voxel);
                    ready_to_sleep.push(entity);
                    continue;
                }
                particle.state = FluidParticleState::Settling;
            } else {
                particle.state = FluidParticleState::Active;
                particle.velocity = to_target.normalize_or_zero() * PATHFIND_FORCE_MAGNITUDE;
            }
            let velocity = particle.velocity;
            particle.position += velocity * dt;
        }
        ready_to_sleep
    }

    /// Converts a sleeping particle back into a voxel at its committed target, if the target is
    /// air; otherwise the particle is discarded without writing a voxel. Either way the particle
    /// entity is despawned. Returns `true` if a voxel was written.
    pub fn settle_to_voxel(&mut self, world: &mut GameWorld, registry: &BlockRegistry, entity: Entity) -> bool {
        let Some(particle) = self.ecs.get::<FluidParticle>(entity) else {
            return false;
        };
        let island_id = particle.island_id;
        let target = particle.committed_target.unwrap_or(particle.original_voxel_pos);
        let mut wrote = false;
        if let (Some(water_id), Some(island)) = (registry.water_id(), world.island_mut(island_id)) {
            if island.get_voxel(target) == BlockId::AIR {
                island.set_voxel_server(target, water_id, registry);
                wrote = true;
            }
        }
        self.ecs.despawn(entity);
        wrote
    }
}
