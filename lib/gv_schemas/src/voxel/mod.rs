//! Chunk and island storage: the dense per-chunk voxel array, the chunk's quad mesh index, the
//! cross-chunk neighborhood view face culling needs at chunk borders, and the island aggregate
//! that owns a floating island's chunks and its rigid-body transform.

pub mod chunk;
pub mod chunk_storage;
pub mod island;
pub mod mesh;
pub mod neighborhood;

pub use chunk::Chunk;
pub use island::Island;
pub use mesh::{Quad, QuadIndex};
pub use neighborhood::ChunkNeighborhood;
