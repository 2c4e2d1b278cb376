//! Data model for the voxel world engine: coordinate systems, the block-type registry, the wire
//! protocol, and the chunk/island storage types. This crate does no I/O of its own; it is the
//! shared vocabulary `gv_common`'s server and client logic are built out of.

#![warn(missing_docs)]

pub mod coordinates;
pub mod direction;
pub mod mutwatcher;
pub mod registry;
pub mod voxel;
pub mod wire;

/// Which side of the authority protocol is performing a mutation. Threaded through
/// [`mutwatcher::MutWatcher::mutate_sided`] so the same world-mutation code can run on both the
/// server (authoritative) and the client (predictive) without branching at every call site.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum GameSide {
    /// The dedicated server: mutations are authoritative and advance the confirmed revision.
    Server,
    /// A client: mutations are optimistic predictions, reconciled against server echoes.
    Client,
}

impl GameSide {
    /// Whether this side treats its own mutations as authoritative.
    pub fn is_authoritative(self) -> bool {
        matches!(self, GameSide::Server)
    }
}
