//! Block damage accumulation: tracks partial progress toward breaking a voxel across multiple
//! hits, keyed by the voxel's island and island-local position so damage survives chunk reloads
//! within a session but is dropped once the target voxel itself changes underneath it.

use gv_schemas::coordinates::BlockPos;
use gv_schemas::registry::{BlockId, BlockRegistry};
use gv_schemas::voxel::island::IslandId;
use hashbrown::HashMap;

/// The outcome of applying a hit to a voxel.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DamageOutcome {
    /// The voxel absorbed the hit but has not yet accumulated enough damage to break.
    Damaged {
        /// Hits landed so far, including this one.
        hits: u8,
        /// Hits required before the voxel breaks.
        durability: u8,
    },
    /// This hit brought accumulated damage to or past the voxel's durability; the caller should
    /// replace the voxel with air and discard the tracker entry (done automatically by
    /// [`DamageTracker::apply_hit`]).
    Broken,
}

/// Per-voxel hit counters for every voxel currently mid-damage across every island.
#[derive(Default)]
pub struct DamageTracker {
    hits: HashMap<(IslandId, BlockPos), u8>,
}

impl DamageTracker {
    /// Constructs an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current accumulated hit count for a voxel, or `0` if it has taken no damage.
    pub fn hits(&self, island_id: IslandId, pos: BlockPos) -> u8 {
        self.hits.get(&(island_id, pos)).copied().unwrap_or(0)
    }

    /// Records one hit against the voxel at `pos`, looking up its durability from `registry`.
    /// A block with `durability == 0` always breaks on the first hit. Clears the tracker entry
    /// once the voxel breaks, so a later block placed at the same position starts undamaged.
    pub fn apply_hit(&mut self, registry: &BlockRegistry, island_id: IslandId, pos: BlockPos, voxel: BlockId) -> DamageOutcome {
        let durability = registry.get(voxel).map(|def| def.durability).unwrap_or(0);
        let hits = self.hits.entry((island_id, pos)).or_insert(0);
        *hits += 1;
        if *hits >= durability.max(1) || durability == 0 {
            self.hits.remove(&(island_id, pos));
            DamageOutcome::Broken
        } else {
            DamageOutcome::Damaged {
                hits: *hits,
                durability,
            }
        }
    }

    /// Clears any accumulated damage for a voxel, e.g. because it was replaced by a different
    /// block type out from under the damage that was being tracked against the old one.
    pub fn clear(&mut self, island_id: IslandId, pos: BlockPos) {
        self.hits.remove(&(island_id, pos));
    }

    /// Drops every tracked hit belonging to `island_id`, e.g. after the island was removed.
    pub fn clear_island(&mut self, island_id: IslandId) {
        self.hits.retain(|(id, _), _| *id != island_id);
    }
}

#[cfg(test)]
mod test {
    use gv_schemas::registry::{BlockDefinition, RegistryName, RenderClass};

    use super::*;

    fn registry_with_durable_stone() -> BlockRegistry {
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
    fn breaks_after_durability_hits() {
        let registry = registry_with_durable_stone();
        let mut tracker = DamageTracker::new();
        let island_id = IslandId(1);
        let pos = BlockPos::new(0, 0, 0);
        let stone = BlockId(1);
        assert_eq!(
            tracker.apply_hit(&registry, island_id, pos, stone),
            DamageOutcome::Damaged { hits: 1, durability: 3 }
        );
        assert_eq!(
            tracker.apply_hit(&registry, island_id, pos, stone),
            DamageOutcome::Damaged { hits: 2, durability: 3 }
        );
        assert_eq!(tracker.apply_hit(&registry, island_id, pos, stone), DamageOutcome::Broken);
        assert_eq!(tracker.hits(island_id, pos), 0);
    }

    #[test]
    fn zero_durability_breaks_on_first_hit() {
        let mut registry = BlockRegistry::new();
        let glass = registry
            .register(BlockDefinition {
                name: RegistryName::gv("glass"),
                render_class: RenderClass::VoxelCube,
                durability: 0,
            })
            .unwrap();
        let mut tracker = DamageTracker::new();
        assert_eq!(
            tracker.apply_hit(&registry, IslandId(1), BlockPos::new(0, 0, 0), glass),
            DamageOutcome::Broken
        );
    }

    #[test]
    fn clearing_island_drops_only_its_entries() {
        let registry = registry_with_durable_stone();
        let mut tracker = DamageTracker::new();
        let stone = BlockId(1);
        tracker.apply_hit(&registry, IslandId(1), BlockPos::new(0, 0, 0), stone);
        tracker.apply_hit(&registry, IslandId(2), BlockPos::new(0, 0, 0), stone);
        tracker.clear_island(IslandId(1));
        assert_eq!(tracker.hits(IslandId(1), BlockPos::new(0, 0, 0)), 0);
        assert_eq!(tracker.hits(IslandId(2), BlockPos::new(0, 0, 0)), 1);
    }
}
