//! The six axis-aligned face directions used for quad culling, connectivity flood fill, and
//! physics face tests.

use bevy_math::{IVec3, Vec3A};

/// One of the six axis-aligned directions a voxel face can point.
#[repr(i32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Direction {
    /// -X
    XMinus = 0,
    /// +X
    XPlus,
    /// -Y
    YMinus,
    /// +Y
    YPlus,
    /// -Z
    ZMinus,
    /// +Z
    ZPlus,
}

/// All six directions, in [`Direction::to_index`] order.
pub static ALL_DIRECTIONS: [Direction; 6] = {
    use Direction::*;
    [XMinus, XPlus, YMinus, YPlus, ZMinus, ZPlus]
};

impl Direction {
    /// X-
    pub const LEFT: Direction = Direction::XMinus;
    /// X+
    pub const RIGHT: Direction = Direction::XPlus;
    /// Y-
    pub const DOWN: Direction = Direction::YMinus;
    /// Y+
    pub const UP: Direction = Direction::YPlus;
    /// Z-
    pub const BACK: Direction = Direction::ZMinus;
    /// Z+
    pub const FRONT: Direction = Direction::ZPlus;

    /// The direction with the sign flipped (X+ -> X- etc).
    pub fn opposite(self) -> Self {
        use Direction::*;
        match self {
            XMinus => XPlus,
            XPlus => XMinus,
            YMinus => YPlus,
            YPlus => YMinus,
            ZMinus => ZPlus,
            ZPlus => ZMinus,
        }
    }

    /// Tries to convert an integer vector into a direction, if it's precisely an axis-aligned
    /// unit vector.
    pub fn try_from_ivec3(v: IVec3) -> Option<Self> {
        match <[i32; 3]>::from(v) {
            [1, 0, 0] => Some(Direction::XPlus),
            [-1, 0, 0] => Some(Direction::XMinus),
            [0, 1, 0] => Some(Direction::YPlus),
            [0, -1, 0] => Some(Direction::YMinus),
            [0, 0, 1] => Some(Direction::ZPlus),
            [0, 0, -1] => Some(Direction::ZMinus),
            _ => None,
        }
    }

    /// Converts the direction into an axis-aligned integer unit vector.
    pub fn to_ivec3(self) -> IVec3 {
        use Direction::*;
        match self {
            XMinus => IVec3::new(-1, 0, 0),
            XPlus => IVec3::new(1, 0, 0),
            YMinus => IVec3::new(0, -1, 0),
            YPlus => IVec3::new(0, 1, 0),
            ZMinus => IVec3::new(0, 0, -1),
            ZPlus => IVec3::new(0, 0, 1),
        }
    }

    /// Converts the direction into an axis-aligned floating point unit vector.
    pub fn to_vec3a(self) -> Vec3A {
        let v = self.to_ivec3();
        Vec3A::new(v.x as f32, v.y as f32, v.z as f32)
    }

    /// Converts a direction index (from [`Self::to_index`]) back into a direction.
    pub fn try_from_index(idx: usize) -> Option<Self> {
        use Direction::*;
        match idx {
            0 => Some(XMinus),
            1 => Some(XPlus),
            2 => Some(YMinus),
            3 => Some(YPlus),
            4 => Some(ZMinus),
            5 => Some(ZPlus),
            _ => None,
        }
    }

    /// The index of the axis of the direction: 0 for X, 1 for Y, 2 for Z.
    pub fn to_axis_index(self) -> usize {
        use Direction::*;
        match self {
            XMinus | XPlus => 0,
            YMinus | YPlus => 1,
            ZMinus | ZPlus => 2,
        }
    }

    /// Converts the direction into a dense index: 0 for X-, 1 for X+, 2 for Y-, 3 for Y+, 4 for
    /// Z-, 5 for Z+. Used as the second half of the quad index key.
    pub fn to_index(self) -> usize {
        use Direction::*;
        match self {
            XMinus => 0,
            XPlus => 1,
            YMinus => 2,
            YPlus => 3,
            ZMinus => 4,
            ZPlus => 5,
        }
    }

    /// Whether the direction points along the positive half of its axis.
    pub fn is_positive(self) -> bool {
        use Direction::*;
        matches!(self, XPlus | YPlus | ZPlus)
    }

    /// Whether the direction points along the negative half of its axis.
    pub fn is_negative(self) -> bool {
        !self.is_positive()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn opposite_is_involution() {
        for d in ALL_DIRECTIONS {
            assert_eq!(d.opposite().opposite().to_index(), d.to_index());
        }
    }

    #[test]
    fn index_round_trips() {
        for d in ALL_DIRECTIONS {
            assert_eq!(Direction::try_from_index(d.to_index()).unwrap().to_index(), d.to_index());
        }
    }

    #[test]
    fn to_ivec3_round_trips_through_try_from() {
        for d in ALL_DIRECTIONS {
            assert_eq!(Direction::try_from_ivec3(d.to_ivec3()).unwrap().to_index(), d.to_index());
        }
    }

    #[test]
    fn opposite_vectors_are_negated() {
        for d in ALL_DIRECTIONS {
            assert_eq!(d.to_ivec3(), -d.opposite().to_ivec3());
        }
    }
}
