use serde::{Deserialize, Serialize};

use crate::DomainError;

/// Largest absolute X/Z coordinate an action may target.
pub const WORLD_MAX_XZ: f64 = 30_000.0;
/// Lowest buildable Y level.
pub const WORLD_MIN_Y: f64 = -64.0;
/// Highest buildable Y level.
pub const WORLD_MAX_Y: f64 = 320.0;

// =============================================================================
// Position
// =============================================================================

/// A point in the world, in blocks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Straight-line 3-D distance.
    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// The block containing this point.
    pub fn block(&self) -> BlockPos {
        BlockPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }

    /// Move `step` blocks toward `target`, never overshooting it.
    pub fn step_toward(&self, target: &Position, step: f64) -> Position {
        let distance = self.distance_to(target);
        if distance <= step || distance == 0.0 {
            return *target;
        }
        let ratio = step / distance;
        Position::new(
            self.x + (target.x - self.x) * ratio,
            self.y + (target.y - self.y) * ratio,
            self.z + (target.z - self.z) * ratio,
        )
    }

    /// Reject coordinates outside the playable world.
    pub fn validate_bounds(&self) -> Result<(), DomainError> {
        let finite = self.x.is_finite() && self.y.is_finite() && self.z.is_finite();
        if !finite
            || self.x.abs() > WORLD_MAX_XZ
            || self.z.abs() > WORLD_MAX_XZ
            || self.y < WORLD_MIN_Y
            || self.y > WORLD_MAX_Y
        {
            return Err(DomainError::OutOfBounds {
                x: self.x,
                y: self.y,
                z: self.z,
            });
        }
        Ok(())
    }

    /// Same block as `other` once both are floored.
    pub fn same_block(&self, other: &Position) -> bool {
        self.block() == other.block()
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

impl From<BlockPos> for Position {
    fn from(value: BlockPos) -> Self {
        Position::new(value.x as f64, value.y as f64, value.z as f64)
    }
}

// =============================================================================
// Block Position
// =============================================================================

/// Integer block coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The neighbouring block on the given face.
    pub fn offset(&self, face: Face) -> BlockPos {
        let (dx, dy, dz) = face.delta();
        BlockPos::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub fn validate_bounds(&self) -> Result<(), DomainError> {
        Position::from(*self).validate_bounds()
    }

    /// Centre of the block.
    pub fn centre(&self) -> Position {
        Position::new(
            self.x as f64 + 0.5,
            self.y as f64 + 0.5,
            self.z as f64 + 0.5,
        )
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

// =============================================================================
// Face
// =============================================================================

/// Block face used when placing against a reference block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Face {
    #[default]
    Top,
    Bottom,
    North,
    South,
    East,
    West,
}

impl Face {
    fn delta(&self) -> (i32, i32, i32) {
        match self {
            Face::Top => (0, 1, 0),
            Face::Bottom => (0, -1, 0),
            Face::North => (0, 0, -1),
            Face::South => (0, 0, 1),
            Face::East => (1, 0, 0),
            Face::West => (-1, 0, 0),
        }
    }
}

impl std::str::FromStr for Face {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top" | "up" => Ok(Face::Top),
            "bottom" | "down" => Ok(Face::Bottom),
            "north" => Ok(Face::North),
            "south" => Ok(Face::South),
            "east" => Ok(Face::East),
            "west" => Ok(Face::West),
            other => Err(DomainError::parse(format!("unknown block face: {other}"))),
        }
    }
}
