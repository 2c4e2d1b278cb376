//! Dense per-chunk voxel storage. The spec mandates "a dense array of S³ voxels" as the storage
//! contract: every in-bounds position is addressable in O(1) and reads never fail. [`ArrayStorage`]
//! honors that contract while keeping a cheap representation for the overwhelmingly common case of
//! a chunk that is entirely one block type (all-air, or a solid interior chunk) — the singleton
//! case is collapsed to one value and only allocates the full array on first divergent write.

use std::iter::repeat_n;

use crate::coordinates::{InChunkPos, InChunkRange, CHUNK_DIM3Z};
use crate::registry::BlockId;

/// Dense (logically) storage for one chunk's worth of voxel identifiers.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum ArrayStorage {
    /// Every voxel in the chunk currently holds this value.
    Singleton(BlockId),
    /// At least one voxel differs from the rest.
    Array(Box<[BlockId; CHUNK_DIM3Z]>),
}

impl Default for ArrayStorage {
    fn default() -> Self {
        Self::Singleton(BlockId::AIR)
    }
}

impl ArrayStorage {
    #[cold]
    fn upgrade(&mut self) -> &mut Box<[BlockId; CHUNK_DIM3Z]> {
        match self {
            Self::Array(arr) => arr,
            Self::Singleton(value) => {
                let new_arr: Box<[BlockId; CHUNK_DIM3Z]> =
                    Vec::from_iter(repeat_n(*value, CHUNK_DIM3Z)).into_boxed_slice().try_into().unwrap();
                *self = Self::Array(new_arr);
                let Self::Array(arr) = self else { unreachable!() };
                arr
            }
        }
    }

    /// Clones every element into a dense XZY-ordered array.
    pub fn copy_dense(&self, output: &mut [BlockId; CHUNK_DIM3Z]) {
        match self {
            Self::Singleton(value) => output.fill(*value),
            Self::Array(arr) => output.clone_from(arr),
        }
    }

    /// Reads the voxel at the given position. Never fails: every in-bounds position has a value.
    pub fn get(&self, position: InChunkPos) -> BlockId {
        match self {
            Self::Singleton(value) => *value,
            Self::Array(arr) => arr[position.as_index()],
        }
    }

    /// Writes a single voxel, returning the value that was there before.
    pub fn put(&mut self, position: InChunkPos, new_value: BlockId) -> BlockId {
        match self {
            Self::Singleton(value) => {
                if *value == new_value {
                    *value
                } else {
                    std::mem::replace(&mut self.upgrade()[position.as_index()], new_value)
                }
            }
            Self::Array(arr) => std::mem::replace(&mut arr[position.as_index()], new_value),
        }
    }

    /// Fills every voxel within `range` with `new_value`.
    pub fn fill(&mut self, range: InChunkRange, new_value: BlockId) {
        if range.is_everything() {
            *self = Self::Singleton(new_value);
            return;
        }
        let arr = match self {
            Self::Singleton(value) if *value == new_value => return,
            _ => self.upgrade(),
        };
        for coord in range.iter_xzy() {
            arr[coord.as_index()] = new_value;
        }
    }

    /// Whether every voxel in the chunk is air, the common case for a newly allocated chunk.
    pub fn is_all_air(&self) -> bool {
        matches!(self, Self::Singleton(id) if id.is_air())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn singleton_reads_return_the_fill_value_everywhere() {
        let storage = ArrayStorage::Singleton(BlockId(3));
        assert_eq!(storage.get(InChunkPos::ZERO), BlockId(3));
        assert_eq!(storage.get(InChunkPos::MAX), BlockId(3));
    }

    #[test]
    fn put_upgrades_singleton_only_on_divergent_write() {
        let mut storage = ArrayStorage::default();
        assert!(storage.is_all_air());
        let old = storage.put(InChunkPos::ZERO, BlockId(1));
        assert_eq!(old, BlockId::AIR);
        assert!(matches!(storage, ArrayStorage::Array(_)));
        assert_eq!(storage.get(InChunkPos::ZERO), BlockId(1));
        assert_eq!(storage.get(InChunkPos::new(1, 0, 0)), BlockId::AIR);
    }

    #[test]
    fn fill_everything_collapses_back_to_singleton() {
        let mut storage = ArrayStorage::default();
        storage.put(InChunkPos::ZERO, BlockId(1));
        storage.fill(InChunkRange::WHOLE_CHUNK, BlockId(2));
        assert!(matches!(storage, ArrayStorage::Singleton(BlockId(2))));
    }

    #[test]
    fn copy_dense_matches_pointwise_reads() {
        let mut storage = ArrayStorage::default();
        storage.put(InChunkPos::new(5, 5, 5), BlockId(9));
        let mut out = [BlockId::AIR; CHUNK_DIM3Z];
        storage.copy_dense(&mut out);
        assert_eq!(out[InChunkPos::new(5, 5, 5).as_index()], BlockId(9));
        assert_eq!(out[0], BlockId::AIR);
    }
}
