//! The quad index: a chunk's mesh state expressed as a set of outward-facing quads, one per
//! exposed voxel face, kept incrementally in sync with single-voxel edits so the async mesh
//! pipeline only has to upload a diff instead of rebuilding a chunk's mesh from scratch on every
//! change. A [`QuadIndex`] is meaningless without the `ArrayStorage` it was built from; it tracks
//! faces, not voxel identifiers.

use hashbrown::HashMap;

use crate::coordinates::InChunkPos;
use crate::direction::Direction;
use crate::registry::BlockId;

/// One exposed voxel face, ready to hand to the renderer. Sub-voxel quad placement offsets are
/// not normative here; only which face of which voxel is exposed and what block occupies it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Quad {
    /// The voxel this face belongs to.
    pub position: InChunkPos,
    /// Which face of the voxel is exposed.
    pub direction: Direction,
    /// The block occupying `position`, for texture/material lookup.
    pub block: BlockId,
}

/// A stable identifier for a quad within one [`QuadIndex`], valid until the quad is removed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct QuadId(usize);

/// A chunk's set of currently-exposed faces, keyed by `(position, direction)` so a single-voxel
/// edit can add or remove exactly the faces that changed instead of rebuilding the whole set.
#[derive(Clone, Debug, Default)]
pub struct QuadIndex {
    slots: Vec<Option<Quad>>,
    free_list: Vec<usize>,
    by_face: HashMap<(InChunkPos, Direction), QuadId>,
}

impl QuadIndex {
    /// An empty quad index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of faces currently exposed.
    pub fn len(&self) -> usize {
        self.by_face.len()
    }

    /// Whether no faces are currently exposed.
    pub fn is_empty(&self) -> bool {
        self.by_face.is_empty()
    }

    /// Looks up the quad at a given voxel face, if exposed.
    pub fn get(&self, position: InChunkPos, direction: Direction) -> Option<&Quad> {
        self.by_face.get(&(position, direction)).and_then(|id| self.slots[id.0].as_ref())
    }

    /// Marks a voxel face as exposed, inserting or overwriting its quad. Returns the previous
    /// quad at that face, if any (the block's identifier may have changed without the face
    /// becoming un-exposed, e.g. breaking stone into a different solid block).
    pub fn insert(&mut self, quad: Quad) -> Option<Quad> {
        let key = (quad.position, quad.direction);
        if let Some(&id) = self.by_face.get(&key) {
            return self.slots[id.0].replace(quad);
        }
        let id = match self.free_list.pop() {
            Some(id) => {
                self.slots[id] = Some(quad);
                id
            }
            None => {
                self.slots.push(Some(quad));
                self.slots.len() - 1
            }
        };
        self.by_face.insert(key, QuadId(id));
        None
    }

    /// Marks a voxel face as no longer exposed (the neighbor became solid, or the voxel itself
    /// was removed). Returns the quad that was there, if any.
    pub fn remove(&mut self, position: InChunkPos, direction: Direction) -> Option<Quad> {
        let id = self.by_face.remove(&(position, direction))?;
        self.free_list.push(id.0);
        self.slots[id.0].take()
    }

    /// Iterates over every currently exposed quad.
    pub fn iter(&self) -> impl Iterator<Item = &Quad> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Discards every quad, returning the index to empty. Used before a full remesh.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free_list.clear();
        self.by_face.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn quad(x: i32, dir: Direction) -> Quad {
        Quad {
            position: InChunkPos::new(x, 0, 0),
            direction: dir,
            block: BlockId(1),
        }
    }

    #[test]
    fn insert_then_remove_round_trips() {
        let mut idx = QuadIndex::new();
        assert!(idx.insert(quad(0, Direction::XPlus)).is_none());
        assert_eq!(idx.len(), 1);
        assert!(idx.get(InChunkPos::new(0, 0, 0), Direction::XPlus).is_some());
        let removed = idx.remove(InChunkPos::new(0, 0, 0), Direction::XPlus);
        assert_eq!(removed, Some(quad(0, Direction::XPlus)));
        assert!(idx.is_empty());
    }

    #[test]
    fn reinsert_reuses_freed_slot() {
        let mut idx = QuadIndex::new();
        idx.insert(quad(0, Direction::XPlus));
        idx.remove(InChunkPos::new(0, 0, 0), Direction::XPlus);
        idx.insert(quad(1, Direction::YPlus));
        assert_eq!(idx.iter().count(), 1);
    }

    #[test]
    fn insert_overwrites_existing_face() {
        let mut idx = QuadIndex::new();
        idx.insert(quad(0, Direction::XPlus));
        let prev = idx.insert(Quad {
            block: BlockId(5),
            ..quad(0, Direction::XPlus)
        });
        assert_eq!(prev, Some(quad(0, Direction::XPlus)));
        assert_eq!(idx.get(InChunkPos::new(0, 0, 0), Direction::XPlus).unwrap().block, BlockId(5));
    }
}
