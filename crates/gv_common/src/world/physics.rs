//! Physics resolution against voxel geometry: capsule movement for players and large entities,
//! sphere movement for fluid particles, and ground detection for moving-platform coupling.
//!
//! Both primitives are tested in island-local space, one island at a time; the caller is
//! responsible for transforming a world-space primitive into every island it might overlap via
//! [`gv_schemas::voxel::island::IslandTransform::world_to_local`] and picking the best result.

use bevy_math::Vec3;
use gv_schemas::coordinates::BlockPos;
use gv_schemas::registry::BlockRegistry;
use gv_schemas::voxel::island::Island;

const MAX_SUBSTEPS: u32 = 4;
const STEP_EPSILON: f32 = 0.01;
const ANTI_STUCK_MAX_PUSH: f32 = 0.1;

/// Axis-aligned half-extents of a capsule, approximated as a box for voxel-face collision.
#[derive(Copy, Clone, Debug)]
struct BoxExtents {
    half_x: f32,
    half_y: f32,
    half_z: f32,
}

fn capsule_extents(radius: f32, height: f32) -> BoxExtents {
    BoxExtents {
        half_x: radius,
        half_y: height / 2.0,
        half_z: radius,
    }
}

/// Whether the box centered at `center` with `extents` overlaps any solid voxel in `island`.
fn box_overlaps_solid(island: &Island, registry: &BlockRegistry, center: Vec3, extents: BoxExtents) -> bool {
    let min = center - Vec3::new(extents.half_x, extents.half_y, extents.half_z);
    let max = center + Vec3::new(extents.half_x, extents.half_y, extents.half_z);
    let min_block = min.floor().as_ivec3();
    let max_block = (max - Vec3::splat(1e-4)).floor().as_ivec3();
    for x in min_block.x..=max_block.x {
        for y in min_block.y..=max_block.y {
            for z in min_block.z..=max_block.z {
                let pos = BlockPos::new(x, y, z);
                if registry.is_solid(island.get_voxel(pos)) {
                    return true;
                }
            }
        }
    }
    false
}

/// Minimum-penetration push direction and magnitude to free a box currently embedded in solid
/// voxels, or `None` if it is not embedded. Only the dominant axis of penetration is used, so the
/// push is a single-axis nudge rather than a diagonal escape.
fn minimum_penetration_push(island: &Island, registry: &BlockRegistry, center: Vec3, extents: BoxExtents) -> Option<Vec3> {
    if !box_overlaps_solid(island, registry, center, extents) {
        return None;
    }
    // Probe a small step in each of the six axis directions and keep whichever first escapes.
    let probes = [
        Vec3::X * extents.half_x,
        Vec3::NEG_X * extents.half_x,
        Vec3::Y * extents.half_y,
        Vec3::NEG_Y * extents.half_y,
        Vec3::Z * extents.half_z,
        Vec3::NEG_Z * extents.half_z,
    ];
    let mut best: Option<(f32, Vec3)> = None;
    for probe in probes {
        let step = probe.normalize_or_zero() * ANTI_STUCK_MAX_PUSH.min(probe.length().max(STEP_EPSILON));
        if step == Vec3::ZERO {
            continue;
        }
        if !box_overlaps_solid(island, registry, center + step, extents) {
            let cost = step.length();
            if best.is_none_or(|(best_cost, _)| cost < best_cost) {
                best = Some((cost, step));
            }
        }
    }
    best.map(|(_, step)| step).or(Some(Vec3::NEG_Y * ANTI_STUCK_MAX_PUSH))
}

/// Result of resolving a capsule's movement for one tick.
#[derive(Copy, Clone, Debug)]
pub struct CapsuleMovementResult {
    /// The capsule's feet-center position after resolution.
    pub position: Vec3,
    /// Velocity with any blocked-axis components zeroed.
    pub velocity: Vec3,
    /// Whether a step-up was performed this tick.
    pub stepped_up: bool,
}

/// Resolves a capsule's desired movement against `island`'s solid voxels. `position` and
/// `velocity` are island-local; `height` is measured from feet to head.
pub fn resolve_capsule_movement(
    island: &Island,
    registry: &BlockRegistry,
    position: Vec3,
    mut velocity: Vec3,
    dt: f32,
    radius: f32,
    height: f32,
    step_height_ratio: f32,
) -> CapsuleMovementResult {
    let extents = capsule_extents(radius, height);
    let mut pos = position;
    let mut stepped_up = false;

    if let Some(push) = minimum_penetration_push(island, registry, pos + Vec3::Y * extents.half_y, extents) {
        pos += push;
    }

    let desired = pos + velocity * dt;
    let mut remaining = desired - pos;

    for _ in 0..MAX_SUBSTEPS {
        if remaining.length_squared() < 1e-8 {
            break;
        }
        // Y, then X, then Z, matching the spec's stated axis priority.
        for axis in [1usize, 0, 2] {
            let mut step = Vec3::ZERO;
            step[axis] = remaining[axis];
            if step[axis].abs() < 1e-8 {
                continue;
            }
            let candidate_center = pos + step + Vec3::Y * extents.half_y;
            if !box_overlaps_solid(island, registry, candidate_center, extents) {
                pos += step;
                remaining[axis] = 0.0;
                continue;
            }
            if axis != 1 {
                let step_height = step_height_ratio * height;
                let raised = pos + Vec3::Y * step_height;
                let raised_head_clear = !box_overlaps_solid(
                    island,
                    registry,
                    raised + step + Vec3::Y * extents.half_y,
                    extents,
                );
                if raised_head_clear {
                    pos = raised + step;
                    remaining[axis] = 0.0;
                    stepped_up = true;
                    continue;
                }
            }
            velocity[axis] = 0.0;
            remaining[axis] = 0.0;
        }
    }

    CapsuleMovementResult {
        position: pos,
        velocity,
        stepped_up,
    }
}

/// Result of a ground-detection probe beneath a capsule.
#[derive(Copy, Clone, Debug)]
pub struct GroundContact {
    /// Whether a solid voxel face was found within range.
    pub grounded: bool,
    /// World-space-equivalent (island-local) point of contact, if grounded.
    pub contact_point: Vec3,
    /// The surface normal at the contact, always `+Y` for this axis-aligned resolver.
    pub contact_normal: Vec3,
    /// The island's linear velocity plus `angular_velocity x offset`, for platform coupling.
    pub ground_velocity: Vec3,
    /// Distance from the capsule's feet to the contact point.
    pub distance: f32,
}

/// Probes straight down from a capsule's feet for the nearest solid voxel face within
/// `radius + margin`, combining the island's linear and angular velocity into a single
/// moving-platform velocity the caller can add to its own.
pub fn detect_ground_capsule(island: &Island, registry: &BlockRegistry, feet_position: Vec3, radius: f32, margin: f32) -> GroundContact {
    let probe_extents = BoxExtents {
        half_x: radius,
        half_y: 0.0,
        half_z: radius,
    };
    let max_distance = radius + margin;
    let mut distance = 0.0f32;
    while distance <= max_distance {
        let probe_center = feet_position - Vec3::Y * distance;
        if box_overlaps_solid(island, registry, probe_center, probe_extents) {
            let offset = probe_center - island.approximate_centroid().map(BlockPos::into_ivec3).map(|v| Vec3::new(v.x as f32, v.y as f32, v.z as f32)).unwrap_or(Vec3::ZERO);
            let ground_velocity = island.velocity + island.angular_velocity.cross(offset);
            return GroundContact {
                grounded: true,
                contact_point: probe_center,
                contact_normal: Vec3::Y,
                ground_velocity,
                distance,
            };
        }
        distance += 0.05;
    }
    GroundContact {
        grounded: false,
        contact_point: feet_position,
        contact_normal: Vec3::Y,
        ground_velocity: Vec3::ZERO,
        distance: max_distance,
    }
}

#[cfg(test)]
mod test {
    use gv_schemas::registry::{BlockDefinition, BlockId, RegistryName, RenderClass};
    use gv_schemas::voxel::island::{IslandId, IslandTransform};

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

    fn flat_floor_island(registry: &BlockRegistry) -> Island {
        let mut island = Island::create(IslandId(1), IslandTransform::default());
        for x in -2..=2 {
            for z in -2..=2 {
                island.set_voxel_server(BlockPos::new(x, 0, z), BlockId(1), registry);
            }
        }
        island
    }

    #[test]
    fn falling_onto_floor_is_blocked_on_the_y_axis() {
        let registry = stone_registry();
        let island = flat_floor_island(&registry);
        let result = resolve_capsule_movement(&island, &registry, Vec3::new(0.0, 1.5, 0.0), Vec3::new(0.0, -10.0, 0.0), 0.1, 0.3, 1.8, 0.5);
        assert_eq!(result.velocity.y, 0.0);
        assert!(result.position.y >= 1.0);
    }

    #[test]
    fn unobstructed_horizontal_motion_is_unaffected_by_a_separate_axis_block() {
        let registry = stone_registry();
        let mut island = Island::create(IslandId(1), IslandTransform::default());
        island.set_voxel_server(BlockPos::new(3, 1, 0), BlockId(1), &registry);
        let blocked = resolve_capsule_movement(&island, &registry, Vec3::new(0.0, 2.0, 0.0), Vec3::new(10.0, 0.0, 0.0), 1.0, 0.3, 1.8, 0.5);
        assert_eq!(blocked.velocity.x, 0.0);
        let unblocked = resolve_capsule_movement(&island, &registry, Vec3::new(0.0, 2.0, 0.0), Vec3::new(0.0, 0.0, 10.0), 1.0, 0.3, 1.8, 0.5);
        assert_ne!(unblocked.velocity.z, 0.0);
    }

    #[test]
    fn detects_ground_beneath_a_floor() {
        let registry = stone_registry();
        let island = flat_floor_island(&registry);
        let contact = detect_ground_capsule(&island, &registry, Vec3::new(0.0, 1.0, 0.0), 0.3, 0.2);
        assert!(contact.grounded);
    }

    #[test]
    fn no_ground_over_open_air() {
        let registry = stone_registry();
        let island = Island::create(IslandId(1), IslandTransform::default());
        let contact = detect_ground_capsule(&island, &registry, Vec3::new(0.0, 10.0, 0.0), 0.3, 0.2);
        assert!(!contact.grounded);
    }
}
