//! Common types shared between the route engine and its collaborators.

use crate::error::EnvError;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an operator (the person recording or replaying).
///
/// Uses UUID v4 for global uniqueness without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperatorId(pub Uuid);

impl OperatorId {
    /// Creates a new random OperatorId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic OperatorId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for OperatorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OperatorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// A position in a named world, with the operator's view orientation.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    /// Name of the world / coordinate space
    pub world: String,

    /// Position [x, y, z] in world units
    pub position: Vector3<f64>,

    /// Horizontal view angle in degrees
    pub yaw: f32,

    /// Vertical view angle in degrees
    pub pitch: f32,
}

impl Location {
    /// Creates a location with neutral orientation.
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            position: Vector3::new(x, y, z),
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    /// Creates a location from a position vector.
    pub fn at(world: impl Into<String>, position: Vector3<f64>) -> Self {
        Self {
            world: world.into(),
            position,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    /// Returns a copy with the given orientation.
    pub fn with_orientation(mut self, yaw: f32, pitch: f32) -> Self {
        self.yaw = yaw;
        self.pitch = pitch;
        self
    }

    pub fn x(&self) -> f64 {
        self.position.x
    }

    pub fn y(&self) -> f64 {
        self.position.y
    }

    pub fn z(&self) -> f64 {
        self.position.z
    }

    /// Returns true if both locations live in the same world.
    pub fn same_world(&self, other: &Location) -> bool {
        self.world == other.world
    }

    /// Serializes to the `world;x;y;z;yaw;pitch` record format.
    pub fn to_record(&self) -> String {
        format!(
            "{};{:?};{:?};{:?};{:?};{:?}",
            self.world, self.position.x, self.position.y, self.position.z, self.yaw, self.pitch
        )
    }

    /// Parses a `world;x;y;z;yaw;pitch` record.
    ///
    /// Fields are taken from the right, so a world name may itself contain
    /// `;`.
    ///
    /// # Returns
    /// * `Err(EnvError::MalformedRecord)` - too few fields, empty world,
    ///   unparsable or non-finite number
    pub fn from_record(record: &str) -> Result<Self, EnvError> {
        let mut parts: Vec<&str> = record.rsplitn(6, ';').collect();
        if parts.len() != 6 || parts[5].trim().is_empty() {
            return Err(EnvError::malformed(record));
        }
        parts.reverse();

        let coord = |s: &str| -> Result<f64, EnvError> {
            s.trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| EnvError::malformed(record))
        };
        let angle = |s: &str| -> Result<f32, EnvError> {
            s.trim()
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| EnvError::malformed(record))
        };

        Ok(Self {
            world: parts[0].to_string(),
            position: Vector3::new(coord(parts[1])?, coord(parts[2])?, coord(parts[3])?),
            yaw: angle(parts[4])?,
            pitch: angle(parts[5])?,
        })
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({:.1}, {:.1}, {:.1})",
            self.world, self.position.x, self.position.y, self.position.z
        )
    }
}

/// A route as handed to and from the persistence collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRoute {
    /// Route name (unique within a catalog)
    pub name: String,

    /// Effect identifier as stored (not yet validated)
    pub effect: String,

    /// Points in traversal order
    pub points: Vec<Location>,
}
