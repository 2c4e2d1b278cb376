//! A chunk together with references to its six face-adjacent chunks, used by the mesh pipeline to
//! resolve face culling across a chunk boundary. The teacher's neighborhood type covers the full
//! 27-chunk cube (face, edge, and corner neighbors) for generic use; quad culling only ever tests
//! a voxel against the neighbor directly across its own face, so this is narrowed to the 6
//! face-adjacent chunks.

use crate::coordinates::ChunkPos;
use crate::direction::{Direction, ALL_DIRECTIONS};
use crate::mutwatcher::MutWatcher;
use crate::voxel::chunk::Chunk;

/// A chunk and (optionally, for chunks at the edge of a loaded region) each of its six
/// face-adjacent neighbors.
pub struct ChunkNeighborhood<'c> {
    center_coord: ChunkPos,
    center: &'c MutWatcher<Chunk>,
    /// Indexed by [`Direction::to_index`].
    neighbors: [Option<&'c MutWatcher<Chunk>>; 6],
}

impl<'c> ChunkNeighborhood<'c> {
    /// Builds a neighborhood around `center_coord` by asking `lookup` for each of the six
    /// face-adjacent chunk coordinates. `lookup(center_coord)` must return `Some`.
    pub fn from_center(
        center_coord: ChunkPos,
        lookup: impl Fn(ChunkPos) -> Option<&'c MutWatcher<Chunk>>,
    ) -> Option<Self> {
        let center = lookup(center_coord)?;
        let mut neighbors = [None; 6];
        for dir in ALL_DIRECTIONS {
            let coord = ChunkPos::from_ivec3(center_coord.into_ivec3() + dir.to_ivec3());
            neighbors[dir.to_index()] = lookup(coord);
        }
        Some(Self {
            center_coord,
            center,
            neighbors,
        })
    }

    /// The coordinate this neighborhood is centered on.
    pub fn center_coord(&self) -> ChunkPos {
        self.center_coord
    }

    /// The central chunk.
    pub fn center(&self) -> &'c MutWatcher<Chunk> {
        self.center
    }

    /// The chunk across the given face, if loaded.
    pub fn neighbor(&self, dir: Direction) -> Option<&'c MutWatcher<Chunk>> {
        self.neighbors[dir.to_index()]
    }
}

#[cfg(test)]
mod test {
    use hashbrown::HashMap;

    use super::*;
    use crate::registry::BlockId;

    #[test]
    fn missing_neighbors_are_none_but_center_is_required() {
        let mut chunks = HashMap::new();
        chunks.insert(ChunkPos::ZERO, MutWatcher::new(Chunk::new(BlockId::AIR)));
        let neighborhood = ChunkNeighborhood::from_center(ChunkPos::ZERO, |c| chunks.get(&c)).unwrap();
        assert!(neighborhood.neighbor(Direction::XPlus).is_none());
        assert!(ChunkNeighborhood::from_center(ChunkPos::new(9, 9, 9), |c| chunks.get(&c)).is_none());
    }

    #[test]
    fn present_neighbor_is_returned() {
        let mut chunks = HashMap::new();
        chunks.insert(ChunkPos::ZERO, MutWatcher::new(Chunk::new(BlockId::AIR)));
        chunks.insert(ChunkPos::new(1, 0, 0), MutWatcher::new(Chunk::new(BlockId(1))));
        let neighborhood = ChunkNeighborhood::from_center(ChunkPos::ZERO, |c| chunks.get(&c)).unwrap();
        assert!(neighborhood.neighbor(Direction::XPlus).is_some());
    }
}
