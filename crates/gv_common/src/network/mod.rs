//! The network-thread boundary: a [`Transport`] abstraction over framed byte buffers, the
//! `NetworkThread` that owns a Tokio runtime on its own OS thread, and the peer bookkeeping both
//! the server and client sides share.

pub mod thread;
pub mod transport;

pub use thread::{NetworkThread, NetworkThreadState};
pub use transport::{InProcessTransport, Transport, TransportError};

/// Identifies one peer on a [`Transport`]. Local (in-process) peers are numbered for test
/// determinism; a real network transport would key this off the remote socket address instead.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum PeerAddress {
    /// An in-process connection, numbered in creation order.
    Local(u32),
}
