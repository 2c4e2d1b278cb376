//! Strongly typed newtype wrappers for the coordinate spaces used throughout the world model,
//! plus the constants every subsystem (chunk storage, physics, networking) derives chunk size from.

use std::fmt::{Display, Formatter};
use std::ops::{Add, Deref};

use bevy_math::{IVec3, UVec3};
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of a side of a block, in meters.
pub const BLOCK_DIM: f32 = 0.5;

/// Length of a side of a chunk, in blocks. Every subsystem (storage, meshing, networking,
/// collision) derives its sizing from this single constant.
pub const CHUNK_DIM: i32 = 32;
/// [`CHUNK_DIM`] as a `usize`.
pub const CHUNK_DIMZ: usize = CHUNK_DIM as usize;
/// Number of blocks on the face of a chunk.
pub const CHUNK_DIM2: i32 = CHUNK_DIM * CHUNK_DIM;
/// [`CHUNK_DIM2`] as a `usize`.
pub const CHUNK_DIM2Z: usize = (CHUNK_DIM * CHUNK_DIM) as usize;
/// Number of blocks in the volume of a chunk.
pub const CHUNK_DIM3: i32 = CHUNK_DIM * CHUNK_DIM * CHUNK_DIM;
/// [`CHUNK_DIM3`] as a `usize`.
pub const CHUNK_DIM3Z: usize = (CHUNK_DIM * CHUNK_DIM * CHUNK_DIM) as usize;
/// Chunk dimensions in blocks as a [`IVec3`] for convenience.
pub const CHUNK_DIM3V: IVec3 = IVec3::splat(CHUNK_DIM);
/// Maximum island-local block position allowed, to leave a safe margin against integer overflow.
pub const MAX_BLOCK_POS: i32 = 1 << 30;
/// [`MAX_BLOCK_POS`] converted to the unit of chunks.
pub const MAX_CHUNK_POS: i32 = MAX_BLOCK_POS / CHUNK_DIM;

/// Slower reference implementation of [`zpack_3d`], kept for benchmarking and as a test oracle.
pub fn zpack_3d_naive(vec: IVec3) -> u128 {
    let vec = vec.as_uvec3();
    let x = vec.x;
    let y = vec.y;
    let z = vec.z;
    let mut out = 0u128;
    for bit in 0..32 {
        let bit_mask = 1 << bit;
        let z_set = (z & bit_mask) != 0;
        let y_set = (y & bit_mask) != 0;
        let x_set = (x & bit_mask) != 0;
        if z_set {
            out |= 1u128 << (3 * bit);
        }
        if y_set {
            out |= 1u128 << (3 * bit + 1);
        }
        if x_set {
            out |= 1u128 << (3 * bit + 2);
        }
    }
    out
}

const fn bit_repeat(pattern: u128, len: u32) -> u128 {
    if len >= 128 || len == 0 {
        pattern
    } else {
        bit_repeat(pattern | (pattern << len), len * 2)
    }
}

/// Converts a 3d vector of ints to a XYZ Z-order curve packed 128-bit integer by interleaving the
/// bits. Provides spatial locality for sorted coordinates, used to give island chunk tables
/// (`BTreeMap`-backed) a cache-friendly iteration order.
/// See [Z-order curves](https://en.wikipedia.org/wiki/Z-order_curve).
#[inline]
pub fn zpack_3d(vec: IVec3) -> u128 {
    const BIT96: u128 = (1u128 << 97) - 1;
    let vec = vec.as_uvec3();
    let mut x = vec.x as u128;
    let mut y = vec.y as u128;
    let mut z = vec.z as u128;
    x = (x | x.wrapping_shl(32)) & 0x0000_0000_FFFF_0000_0000_FFFF;
    y = (y | y.wrapping_shl(32)) & 0x0000_0000_FFFF_0000_0000_FFFF;
    z = (z | z.wrapping_shl(32)) & 0x0000_0000_FFFF_0000_0000_FFFF;
    x = (x | x.wrapping_shl(16)) & const { BIT96 & bit_repeat(0x00_00_FF, 24) };
    y = (y | y.wrapping_shl(16)) & const { BIT96 & bit_repeat(0x00_00_FF, 24) };
    z = (z | z.wrapping_shl(16)) & const { BIT96 & bit_repeat(0x00_00_FF, 24) };
    x = (x | x.wrapping_shl(8)) & const { BIT96 & bit_repeat(0x00F, 12) };
    y = (y | y.wrapping_shl(8)) & const { BIT96 & bit_repeat(0x00F, 12) };
    z = (z | z.wrapping_shl(8)) & const { BIT96 & bit_repeat(0x00F, 12) };
    x = (x | x.wrapping_shl(4)) & const { BIT96 & bit_repeat(0b00_00_11, 6) };
    y = (y | y.wrapping_shl(4)) & const { BIT96 & bit_repeat(0b00_00_11, 6) };
    z = (z | z.wrapping_shl(4)) & const { BIT96 & bit_repeat(0b00_00_11, 6) };
    x = (x | x.wrapping_shl(2)) & const { BIT96 & bit_repeat(0b001, 3) };
    y = (y | y.wrapping_shl(2)) & const { BIT96 & bit_repeat(0b001, 3) };
    z = (z | z.wrapping_shl(2)) & const { BIT96 & bit_repeat(0b001, 3) };

    x.wrapping_shl(2) | y.wrapping_shl(1) | z
}

/// Restores a 3d vector of ints from a XYZ Z-order curve packed 128-bit integer. See [`zpack_3d`].
#[inline]
pub fn zunpack_3d(idx: u128) -> IVec3 {
    let [y, z, x] = zorder::coord_of(idx);
    UVec3::new(x, y, z).as_ivec3()
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
#[error("Given coordinates were outside of chunk boundaries: {0}")]
/// Error when the given coordinates are outside of the chunk boundary.
pub struct InChunkVecError(IVec3);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
#[error("Given index was outside of chunk boundaries: {0}")]
/// Error when the given block index is outside of the chunk boundary.
pub struct InChunkIndexError(usize);

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Pod, Zeroable, Serialize, Deserialize)]
#[repr(transparent)]
/// A block position inside of a chunk, limited to `0..CHUNK_DIM` on every axis.
pub struct InChunkPos(pub(crate) IVec3);

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
/// A range of block positions inside of a chunk (min&max are *inclusive*).
pub struct InChunkRange {
    pub(crate) min: InChunkPos,
    pub(crate) max: InChunkPos,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Pod, Zeroable, Serialize, Deserialize)]
#[repr(transparent)]
/// A chunk coordinate `(cx, cy, cz)` within a single island's chunk table. Islands have no shared
/// global chunk grid — each island's chunk coordinates are local to that island.
pub struct ChunkPos(pub(crate) IVec3);

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
/// A range of chunk positions within one island (min&max are *inclusive*).
pub struct ChunkPosRange {
    pub(crate) min: ChunkPos,
    pub(crate) max: ChunkPos,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Pod, Zeroable, Serialize, Deserialize)]
#[repr(transparent)]
/// A chunk position relative to another chunk position in the same island.
pub struct RelChunkPos(pub(crate) IVec3);

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Pod, Zeroable, Serialize, Deserialize)]
#[repr(transparent)]
/// A voxel position in island-local space (what the spec calls `localBlockPos`).
pub struct BlockPos(pub(crate) IVec3);

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Pod, Zeroable, Serialize, Deserialize)]
#[repr(transparent)]
/// A block position relative to another block position in the same island.
pub struct RelBlockPos(pub(crate) IVec3);

macro_rules! impl_simple_ivec3_newtype {
    ($T:ident) => {
        impl $T {
            /// (0, 0, 0)
            pub const ZERO: Self = Self(IVec3::ZERO);
            /// (1, 1, 1)
            pub const ONE: Self = Self(IVec3::ONE);
            /// (1, 0, 0)
            pub const X: Self = Self(IVec3::X);
            /// (0, 1, 0)
            pub const Y: Self = Self(IVec3::Y);
            /// (0, 0, 1)
            pub const Z: Self = Self(IVec3::Z);

            /// Const-friendly `from<IVec3>`.
            #[inline]
            pub const fn from_ivec3(value: IVec3) -> Self {
                Self(value)
            }

            /// Const-friendly `into<IVec3>`.
            #[inline]
            pub const fn into_ivec3(self) -> IVec3 {
                self.0
            }

            /// Constructs a new [`Self`] from the given coordinates.
            #[inline]
            pub const fn new(x: i32, y: i32, z: i32) -> Self {
                Self(IVec3::new(x, y, z))
            }

            /// Constructs a new [`Self`] from a given coordinate copied to all dimensions.
            #[inline]
            pub const fn splat(v: i32) -> Self {
                Self(IVec3::splat(v))
            }
        }

        impl From<IVec3> for $T {
            #[inline]
            fn from(value: IVec3) -> Self {
                Self::from_ivec3(value)
            }
        }
        impl From<$T> for IVec3 {
            #[inline]
            fn from(value: $T) -> IVec3 {
                value.into_ivec3()
            }
        }
        impl std::ops::Deref for $T {
            type Target = IVec3;

            #[inline]
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }
    };
}

macro_rules! impl_rel_abs_pair {
    ($Rel:ident, $Abs:ident) => {
        impl std::ops::Add<$Rel> for $Rel {
            type Output = $Rel;
            #[inline]
            fn add(self, rhs: Self) -> Self::Output {
                $Rel(self.0 + rhs.0)
            }
        }
        impl std::ops::Add<$Abs> for $Rel {
            type Output = $Abs;
            #[inline]
            fn add(self, rhs: $Abs) -> Self::Output {
                $Abs(self.0 + rhs.0)
            }
        }
        impl std::ops::Add<$Rel> for $Abs {
            type Output = $Abs;
            #[inline]
            fn add(self, rhs: $Rel) -> Self::Output {
                $Abs(self.0 + rhs.0)
            }
        }

        impl std::ops::Sub<$Rel> for $Rel {
            type Output = $Rel;
            #[inline]
            fn sub(self, rhs: Self) -> Self::Output {
                $Rel(self.0 - rhs.0)
            }
        }
        impl std::ops::Sub<$Abs> for $Rel {
            type Output = $Abs;
            #[inline]
            fn sub(self, rhs: $Abs) -> Self::Output {
                $Abs(self.0 - rhs.0)
            }
        }
        impl std::ops::Sub<$Rel> for $Abs {
            type Output = $Abs;
            #[inline]
            fn sub(self, rhs: $Rel) -> Self::Output {
                $Abs(self.0 - rhs.0)
            }
        }
        impl std::ops::Sub<$Abs> for $Abs {
            type Output = $Rel;
            #[inline]
            fn sub(self, rhs: $Abs) -> Self::Output {
                $Rel(self.0 - rhs.0)
            }
        }
    };
}

// === InChunkPos

impl TryFrom<IVec3> for InChunkPos {
    type Error = InChunkVecError;

    #[inline]
    fn try_from(value: IVec3) -> Result<Self, Self::Error> {
        Self::try_from_ivec3(value)
    }
}

impl From<InChunkPos> for IVec3 {
    #[inline]
    fn from(value: InChunkPos) -> IVec3 {
        value.0
    }
}

impl Deref for InChunkPos {
    type Target = IVec3;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl InChunkPos {
    /// (0, 0, 0)
    pub const ZERO: Self = Self(IVec3::ZERO);
    /// (31, 31, 31)
    pub const MAX: Self = Self(IVec3::splat(CHUNK_DIM - 1));

    /// Const-friendly `try_from<IVec3>`.
    #[inline]
    pub const fn try_from_ivec3(v: IVec3) -> Result<Self, InChunkVecError> {
        let IVec3 { x, y, z } = v;
        if (x < 0) || (x >= CHUNK_DIM) || (y < 0) || (y >= CHUNK_DIM) || (z < 0) || (z >= CHUNK_DIM) {
            Err(InChunkVecError(v))
        } else {
            Ok(Self(v))
        }
    }

    /// Constructs a new in-chunk position, or returns an error if it's outside of chunk bounds.
    #[inline]
    pub const fn try_new(x: i32, y: i32, z: i32) -> Result<Self, InChunkVecError> {
        Self::try_from_ivec3(IVec3::new(x, y, z))
    }

    /// Constructs a new in-chunk position, panicking if it's outside of chunk bounds.
    #[inline]
    #[track_caller]
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self::try_new(x, y, z).expect("coordinates outside of chunk boundaries")
    }

    /// Convert an XZY-strided index into a chunk storage array into coordinates.
    #[inline]
    pub const fn try_from_index(idx: usize) -> Result<Self, InChunkIndexError> {
        if idx >= CHUNK_DIM3Z {
            return Err(InChunkIndexError(idx));
        }
        let i: i32 = idx as i32;
        Ok(InChunkPos(IVec3::new(
            i % CHUNK_DIM,
            (i / CHUNK_DIM2) % CHUNK_DIM,
            (i / CHUNK_DIM) % CHUNK_DIM,
        )))
    }

    /// Converts the coordinates into an XZY-strided index into the chunk storage array.
    #[inline]
    pub const fn as_index(self) -> usize {
        (self.0.x + (CHUNK_DIM * self.0.z) + (CHUNK_DIM2 * self.0.y)) as usize
    }

    /// Const-friendly `into<IVec3>`.
    #[inline]
    pub const fn into_ivec3(self) -> IVec3 {
        self.0
    }

    /// The six axis-neighbouring in-chunk positions that stay within bounds, paired with the
    /// [`crate::direction::Direction`] leading to them.
    pub fn try_neighbor(self, dir: crate::direction::Direction) -> Option<InChunkPos> {
        Self::try_from_ivec3(self.0 + dir.to_ivec3()).ok()
    }
}

impl Add<InChunkPos> for InChunkPos {
    type Output = RelBlockPos;
    #[inline]
    fn add(self, rhs: InChunkPos) -> Self::Output {
        RelBlockPos(self.0 + rhs.0)
    }
}

// === InChunkRange
impl InChunkRange {
    /// One block range containing the block at (0,0,0).
    pub const BLOCK_AT_ZERO: Self = Self::from_corners(InChunkPos::ZERO, InChunkPos::ZERO);
    /// The whole chunk `[(0, 0, 0), (31, 31, 31)]`.
    pub const WHOLE_CHUNK: Self = Self::from_corners(InChunkPos::ZERO, InChunkPos::MAX);

    /// Constructs a new range from two (inclusive) corner positions.
    pub const fn from_corners(a: InChunkPos, b: InChunkPos) -> Self {
        let (min_x, max_x) = if a.0.x < b.0.x { (a.0.x, b.0.x) } else { (b.0.x, a.0.x) };
        let (min_y, max_y) = if a.0.y < b.0.y { (a.0.y, b.0.y) } else { (b.0.y, a.0.y) };
        let (min_z, max_z) = if a.0.z < b.0.z { (a.0.z, b.0.z) } else { (b.0.z, a.0.z) };
        Self {
            min: InChunkPos(IVec3::new(min_x, min_y, min_z)),
            max: InChunkPos(IVec3::new(max_x, max_y, max_z)),
        }
    }

    /// Checks if the range covers the entire chunk.
    #[inline]
    pub const fn is_everything(self) -> bool {
        self.min.0.x == 0
            && self.min.0.y == 0
            && self.min.0.z == 0
            && self.max.0.x == InChunkPos::MAX.0.x
            && self.max.0.y == InChunkPos::MAX.0.y
            && self.max.0.z == InChunkPos::MAX.0.z
    }

    /// Returns the corner with the smallest coordinates.
    #[inline]
    pub const fn min(self) -> InChunkPos {
        self.min
    }

    /// Returns the corner with the largest coordinates.
    #[inline]
    pub const fn max(self) -> InChunkPos {
        self.max
    }

    /// Returns an iterator over all the coordinates inside this range, in XZY order.
    pub fn iter_xzy(self) -> impl Iterator<Item = InChunkPos> {
        itertools::iproduct!(self.min.0.y..=self.max.0.y, self.min.0.z..=self.max.0.z, self.min.0.x..=self.max.0.x)
            .map(|(y, z, x)| InChunkPos(IVec3::new(x, y, z)))
    }
}

// === ChunkPos
impl_simple_ivec3_newtype!(ChunkPos);

impl From<BlockPos> for ChunkPos {
    fn from(value: BlockPos) -> Self {
        Self::new(
            value.x.div_euclid(CHUNK_DIM),
            value.y.div_euclid(CHUNK_DIM),
            value.z.div_euclid(CHUNK_DIM),
        )
    }
}

impl ChunkPos {
    /// Converts the chunk position to a Z-curve index. See [`zpack_3d`].
    #[inline]
    pub fn as_zpack(self) -> u128 {
        zpack_3d(self.0)
    }

    /// Converts the chunk position from a Z-curve index. See [`zunpack_3d`].
    #[inline]
    pub fn from_zpack(idx: u128) -> Self {
        Self(zunpack_3d(idx))
    }
}

impl Display for ChunkPos {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Chunk(x={}, y={}, z={})", self.x, self.y, self.z)
    }
}

impl PartialOrd for ChunkPos {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChunkPos {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_zpack().cmp(&other.as_zpack())
    }
}

// === ChunkPosRange
impl ChunkPosRange {
    /// Constructs a new range from two (inclusive) corner positions.
    pub const fn from_corners(a: ChunkPos, b: ChunkPos) -> Self {
        let (min_x, max_x) = if a.0.x < b.0.x { (a.0.x, b.0.x) } else { (b.0.x, a.0.x) };
        let (min_y, max_y) = if a.0.y < b.0.y { (a.0.y, b.0.y) } else { (b.0.y, a.0.y) };
        let (min_z, max_z) = if a.0.z < b.0.z { (a.0.z, b.0.z) } else { (b.0.z, a.0.z) };
        Self {
            min: ChunkPos(IVec3::new(min_x, min_y, min_z)),
            max: ChunkPos(IVec3::new(max_x, max_y, max_z)),
        }
    }

    /// Returns an iterator over all the coordinates inside this range, in XZY order.
    pub fn iter_xzy(self) -> impl Iterator<Item = ChunkPos> {
        itertools::iproduct!(self.min.0.y..=self.max.0.y, self.min.0.z..=self.max.0.z, self.min.0.x..=self.max.0.x)
            .map(|(y, z, x)| ChunkPos(IVec3::new(x, y, z)))
    }
}

// === RelChunkPos
impl_simple_ivec3_newtype!(RelChunkPos);
impl_rel_abs_pair!(RelChunkPos, ChunkPos);

impl Display for RelChunkPos {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Chunk Difference(x={}, y={}, z={})", self.x, self.y, self.z)
    }
}

// === BlockPos
impl_simple_ivec3_newtype!(BlockPos);

impl From<ChunkPos> for BlockPos {
    fn from(value: ChunkPos) -> Self {
        Self(value.0 * IVec3::splat(CHUNK_DIM))
    }
}

impl BlockPos {
    /// Splits the block position into the coordinate of the chunk and the coordinate of the
    /// block within that chunk. This is the `(cx,cy,cz) = floor(localPos / S)` resolution the
    /// island system performs on every voxel read/write.
    pub fn split_chunk_component(self) -> (ChunkPos, InChunkPos) {
        (
            ChunkPos::new(
                self.x.div_euclid(CHUNK_DIM),
                self.y.div_euclid(CHUNK_DIM),
                self.z.div_euclid(CHUNK_DIM),
            ),
            InChunkPos(IVec3::new(
                self.x.rem_euclid(CHUNK_DIM),
                self.y.rem_euclid(CHUNK_DIM),
                self.z.rem_euclid(CHUNK_DIM),
            )),
        )
    }

    /// Converts the block position to a Z-curve index. See [`zpack_3d`].
    #[inline]
    pub fn as_zpack(self) -> u128 {
        zpack_3d(self.0)
    }
}

impl Display for BlockPos {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Block(x={}, y={}, z={})", self.x, self.y, self.z)
    }
}

impl PartialOrd for BlockPos {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BlockPos {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_zpack().cmp(&other.as_zpack())
    }
}

// === RelBlockPos
impl_simple_ivec3_newtype!(RelBlockPos);
impl_rel_abs_pair!(RelBlockPos, BlockPos);

impl From<RelChunkPos> for RelBlockPos {
    fn from(value: RelChunkPos) -> Self {
        Self(value.0 * IVec3::splat(CHUNK_DIM))
    }
}

impl Display for RelBlockPos {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Block Difference(x={}, y={}, z={})", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bit_repeat() {
        fn check(line: u32, a: u128, b: u128) {
            assert_eq!(a, b, "[line {line}] \n{a:032x} != \n{b:032x}");
        }
        check(line!(), bit_repeat(0x0, 1), 0);
        check(line!(), bit_repeat(0x1, 1), u128::MAX);
        check(line!(), bit_repeat(0x0, 32), 0);
        check(line!(), bit_repeat(0x01, 32), 0x00000001_00000001_00000001_00000001);
    }

    #[test]
    fn test_zpack_3d() {
        use itertools::iproduct;
        let list = [
            0, 1, 2, 4, 8, 16, 32, 64, 128, 256, 512, 1024, 65536, 1 << 30, -1, -2, -4, -8, -16, -32, -64, -128, 7,
            321, -127, i32::MIN, i32::MAX,
        ];
        for (x, y, z) in iproduct!(list, list, list) {
            let v = IVec3::new(x, y, z);
            assert_eq!(zpack_3d_naive(v), zpack_3d(v), "zpack mismatch for {v}");
        }
    }

    #[test]
    fn in_chunk_index_round_trips() {
        for idx in 0..CHUNK_DIM3Z {
            let pos = InChunkPos::try_from_index(idx).unwrap();
            assert_eq!(pos.as_index(), idx);
        }
    }

    #[test]
    fn in_chunk_pos_rejects_out_of_range() {
        assert!(InChunkPos::try_new(-1, 0, 0).is_err());
        assert!(InChunkPos::try_new(CHUNK_DIM, 0, 0).is_err());
        assert!(InChunkPos::try_new(0, 0, CHUNK_DIM - 1).is_ok());
    }

    #[test]
    fn block_pos_splits_consistently() {
        let p = BlockPos::new(35, -3, 64);
        let (chunk, local) = p.split_chunk_component();
        let reconstructed = BlockPos::from(chunk).into_ivec3() + local.into_ivec3();
        assert_eq!(reconstructed, p.into_ivec3());
    }
}
