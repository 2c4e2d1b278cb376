//! Structural connectivity: after a voxel is removed, some of an island's remaining solid voxels
//! may no longer be reachable from the island's anchor. This module finds those fragments with a
//! bounded-budget flood fill and extracts each one into its own island.

use std::collections::VecDeque;

use bevy_math::Vec3;
use gv_schemas::coordinates::BlockPos;
use gv_schemas::direction::ALL_DIRECTIONS;
use gv_schemas::registry::BlockRegistry;
use gv_schemas::voxel::island::{Island, IslandId, IslandTransform};
use hashbrown::HashSet;

use crate::world::World;

/// Caps how many voxels a single flood fill is allowed to visit before giving up. Keeps a
/// pathological worst case (a single edit on a huge, fully solid island) from stalling the tick
/// that triggered it; the analyzer degrades to "assume still connected" rather than block.
#[derive(Copy, Clone, Debug)]
pub struct ConnectivityBudget(pub usize);

impl Default for ConnectivityBudget {
    fn default() -> Self {
        Self(4096)
    }
}

/// The result of flooding outward from one starting voxel across solid, face-connected voxels.
pub struct FloodFillResult {
    /// Every solid voxel reached before the flood fill stopped.
    pub visited: HashSet<BlockPos>,
    /// Whether the fill stopped because it hit [`ConnectivityBudget`], not because it ran out of
    /// solid neighbors. A budget-exhausted fill must never be treated as a complete fragment.
    pub budget_exhausted: bool,
}

/// Flood-fills outward from `start` across solid, face-connected voxels, in FIFO (breadth-first)
/// order so a budget cutoff always yields the voxels nearest `start`.
pub fn flood_fill(island: &Island, registry: &BlockRegistry, start: BlockPos, budget: ConnectivityBudget) -> FloodFillResult {
    let mut visited = HashSet::new();
    let mut budget_exhausted = false;
    if !registry.is_solid(island.get_voxel(start)) {
        return FloodFillResult {
            visited,
            budget_exhausted,
        };
    }
    let mut queue = VecDeque::new();
    queue.push_back(start);
    visited.insert(start);
    while let Some(pos) = queue.pop_front() {
        if visited.len() >= budget.0 {
            budget_exhausted = true;
            break;
        }
        for dir in ALL_DIRECTIONS {
            let next = BlockPos::from_ivec3(pos.into_ivec3() + dir.to_ivec3());
            if visited.contains(&next) {
                continue;
            }
            if registry.is_solid(island.get_voxel(next)) {
                visited.insert(next);
                queue.push_back(next);
            }
        }
    }
    FloodFillResult {
        visited,
        budget_exhausted,
    }
}

/// Finds the solid voxels that ended up in a disconnected pocket after a voxel removal. Floods
/// outward from `anchor` and from every solid neighbor of `removed` not already claimed by an
/// earlier flood, collecting one component per disconnected pocket. The single largest component
/// (ties broken lexicographically by each component's smallest voxel position) is left attached to
/// the source island; every other component is returned as a fragment meant to become its own
/// island via [`extract_fragment`]. Keeping the largest piece with the original island, rather than
/// always favoring the anchor's side, avoids a big intact structure jumping to a new island id just
/// because the removed voxel happened to sit on its anchor side. Fragments produced by a
/// budget-exhausted flood fill are dropped (treated as still connected) rather than risk
/// incorrectly splitting a large, fully intact island.
pub fn fragments_after_removal(
    island: &Island,
    registry: &BlockRegistry,
    anchor: BlockPos,
    removed: BlockPos,
    budget: ConnectivityBudget,
) -> Vec<HashSet<BlockPos>> {
    let main = flood_fill(island, registry, anchor, budget);
    if main.budget_exhausted {
        return Vec::new();
    }

    let mut components = vec![main.visited];
    let mut claimed: HashSet<BlockPos> = components[0].clone();
    for dir in ALL_DIRECTIONS {
        let neighbor = BlockPos::from_ivec3(removed.into_ivec3() + dir.to_ivec3());
        if claimed.contains(&neighbor) || !registry.is_solid(island.get_voxel(neighbor)) {
            continue;
        }
        let result = flood_fill(island, registry, neighbor, budget);
        if result.budget_exhausted {
            continue;
        }
        claimed.extend(result.visited.iter().copied());
        components.push(result.visited);
    }

    if components.len() <= 1 {
        return Vec::new();
    }

    let kept = components
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.len().cmp(&b.len()).then_with(|| lex_min(b).cmp(&lex_min(a))))
        .map(|(i, _)| i)
        .expect("components is non-empty");

    components.into_iter().enumerate().filter(|(i, _)| *i != kept).map(|(_, c)| c).collect()
}

/// The lexicographically smallest `(x, y, z)` voxel position in `component`, used to deterministically
/// break size ties between disconnected components.
fn lex_min(component: &HashSet<BlockPos>) -> (i32, i32, i32) {
    component
        .iter()
        .map(|pos| {
            let v = pos.into_ivec3();
            (v.x, v.y, v.z)
        })
        .min()
        .expect("component is non-empty")
}

/// The voxel-weighted centroid of `fragment`, in the source island's local coordinate space,
/// rounded to the nearest voxel. Every voxel carries equal weight, so this is a plain average.
fn voxel_weighted_centroid(fragment: &HashSet<BlockPos>) -> BlockPos {
    let mut sum = bevy_math::IVec3::ZERO;
    for &pos in fragment {
        sum += pos.into_ivec3();
    }
    let n = fragment.len() as f32;
    BlockPos::from_ivec3(bevy_math::IVec3::new(
        (sum.x as f32 / n).round() as i32,
        (sum.y as f32 / n).round() as i32,
        (sum.z as f32 / n).round() as i32,
    ))
}

/// Moves every voxel in `fragment` out of `source_id`'s island (replacing it with air) and into a
/// freshly created island, returning the new island's id. The new island is placed at the
/// fragment's voxel-weighted centroid (in world space) with the source's orientation, and the
/// fragment's voxels are re-based to local coordinates relative to that centroid so they land at
/// the same world-space positions they occupied before the split.
pub fn extract_fragment(world: &mut World, registry: &BlockRegistry, source_id: IslandId, fragment: &HashSet<BlockPos>) -> Option<IslandId> {
    if fragment.is_empty() {
        return None;
    }
    let transform = world.island(source_id)?.transform;
    let centroid = voxel_weighted_centroid(fragment);
    let centroid_offset = {
        let v = centroid.into_ivec3();
        Vec3::new(v.x as f32, v.y as f32, v.z as f32)
    };
    let new_id = world.allocate_island_id();
    let mut new_island = Island::create(new_id, IslandTransform {
        position: transform.position + transform.rotation * centroid_offset,
        rotation: transform.rotation,
    });

    let source = world.island_mut(source_id)?;
    for &pos in fragment {
        let voxel = source.get_voxel(pos);
        source.set_voxel_server(pos, gv_schemas::registry::BlockId::AIR, registry);
        let local_pos = BlockPos::from_ivec3(pos.into_ivec3() - centroid.into_ivec3());
        new_island.set_voxel_server(local_pos, voxel, registry);
    }
    world.insert_island(new_island);
    Some(new_id)
}

#[cfg(test)]
mod test {
    use gv_schemas::registry::{BlockDefinition, RegistryName, RenderClass};
    use gv_schemas::voxel::island::IslandTransform;

    use super::*;
    use crate::world::island_system::{create_island, set_voxel_in_island_server};

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
    fn flood_fill_stops_at_budget() {
        let registry = stone_registry();
        let mut world = World::new();
        let id = create_island(&mut world, IslandTransform::default());
        for x in 0..10 {
            set_voxel_in_island_server(&mut world, id, BlockPos::new(x, 0, 0), gv_schemas::registry::BlockId(1), &registry).unwrap();
        }
        let island = world.island(id).unwrap();
        let result = flood_fill(island, &registry, BlockPos::new(0, 0, 0), ConnectivityBudget(3));
        assert!(result.budget_exhausted);
        assert_eq!(result.visited.len(), 3);
    }

    #[test]
    fn removing_a_bridge_voxel_splits_off_the_smaller_side_as_a_fragment() {
        let registry = stone_registry();
        let mut world = World::new();
        let id = create_island(&mut world, IslandTransform::default());
        // A 3-voxel bridge: anchor at x=0, bridge at x=1, fragment at x=2. The anchor side is a
        // single voxel and the far side is also a single voxel, so this is also a size tie,
        // broken lexicographically in favor of keeping the anchor's (smaller-position) side.
        for x in 0..3 {
            set_voxel_in_island_server(&mut world, id, BlockPos::new(x, 0, 0), gv_schemas::registry::BlockId(1), &registry).unwrap();
        }
        let anchor = BlockPos::new(0, 0, 0);
        let removed = BlockPos::new(1, 0, 0);
        {
            let island = world.island_mut(id).unwrap();
            island.set_voxel_server(removed, gv_schemas::registry::BlockId::AIR, &registry);
        }
        let island = world.island(id).unwrap();
        let fragments = fragments_after_removal(island, &registry, anchor, removed, ConnectivityBudget::default());
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].contains(&BlockPos::new(2, 0, 0)));
    }

    #[test]
    fn removing_a_bridge_voxel_keeps_the_larger_side_even_when_it_is_not_the_anchors_side() {
        let registry = stone_registry();
        let mut world = World::new();
        let id = create_island(&mut world, IslandTransform::default());
        // Anchor side is a single voxel at x=0; the far side is a 3-voxel run at x=2..=4. The
        // larger far side must be the one left attached to the source island, so the single
        // returned fragment is the anchor's voxel, not the far side.
        set_voxel_in_island_server(&mut world, id, BlockPos::new(0, 0, 0), gv_schemas::registry::BlockId(1), &registry).unwrap();
        set_voxel_in_island_server(&mut world, id, BlockPos::new(1, 0, 0), gv_schemas::registry::BlockId(1), &registry).unwrap();
        for x in 2..5 {
            set_voxel_in_island_server(&mut world, id, BlockPos::new(x, 0, 0), gv_schemas::registry::BlockId(1), &registry).unwrap();
        }
        let anchor = BlockPos::new(0, 0, 0);
        let removed = BlockPos::new(1, 0, 0);
        {
            let island = world.island_mut(id).unwrap();
            island.set_voxel_server(removed, gv_schemas::registry::BlockId::AIR, &registry);
        }
        let island = world.island(id).unwrap();
        let fragments = fragments_after_removal(island, &registry, anchor, removed, ConnectivityBudget::default());
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].len(), 1);
        assert!(fragments[0].contains(&BlockPos::new(0, 0, 0)));
    }

    #[test]
    fn extracting_a_fragment_creates_a_new_island_and_clears_the_source() {
        let registry = stone_registry();
        let mut world = World::new();
        let id = create_island(&mut world, IslandTransform::default());
        set_voxel_in_island_server(&mut world, id, BlockPos::new(5, 5, 5), gv_schemas::registry::BlockId(1), &registry).unwrap();
        let mut fragment = HashSet::new();
        fragment.insert(BlockPos::new(5, 5, 5));
        let new_id = extract_fragment(&mut world, &registry, id, &fragment).unwrap();
        assert_eq!(world.island(id).unwrap().get_voxel(BlockPos::new(5, 5, 5)), gv_schemas::registry::BlockId::AIR);
        // The single-voxel fragment's centroid is itself, so it becomes the new island's local
        // origin: the voxel lands at (0,0,0) local, and the island's world position shifts by
        // (5,5,5) to keep the voxel at the same point in world space.
        assert_eq!(
            world.island(new_id).unwrap().get_voxel(BlockPos::new(0, 0, 0)),
            gv_schemas::registry::BlockId(1)
        );
        assert_eq!(world.island(new_id).unwrap().transform.position, Vec3::new(5.0, 5.0, 5.0));
    }

    #[test]
    fn extracted_fragment_centroid_is_voxel_weighted() {
        let registry = stone_registry();
        let mut world = World::new();
        let id = create_island(&mut world, IslandTransform::default());
        set_voxel_in_island_server(&mut world, id, BlockPos::new(0, 0, 0), gv_schemas::registry::BlockId(1), &registry).unwrap();
        set_voxel_in_island_server(&mut world, id, BlockPos::new(2, 0, 0), gv_schemas::registry::BlockId(1), &registry).unwrap();
        let mut fragment = HashSet::new();
        fragment.insert(BlockPos::new(0, 0, 0));
        fragment.insert(BlockPos::new(2, 0, 0));
        let new_id = extract_fragment(&mut world, &registry, id, &fragment).unwrap();
        let new_island = world.island(new_id).unwrap();
        assert_eq!(new_island.transform.position, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(new_island.get_voxel(BlockPos::new(-1, 0, 0)), gv_schemas::registry::BlockId(1));
        assert_eq!(new_island.get_voxel(BlockPos::new(1, 0, 0)), gv_schemas::registry::BlockId(1));
    }
}
