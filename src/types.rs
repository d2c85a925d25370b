//! Newtype wrappers for domain ids and positions.
//!
//! Agents, animals, zones and lineages are all addressed by stable string
//! ids that survive snapshot round-trips; wrapping them keeps the id spaces
//! from being mixed up at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable string id of an agent
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Stable string id of an animal (separate population from agents)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnimalId(pub String);

impl AnimalId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnimalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable string id of a zone
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneId(pub String);

impl ZoneId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ZoneId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Stable string id of a family lineage
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineageId(pub String);

impl LineageId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LineageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// World position in tile units (continuous; tiles are 1.0 x 1.0)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Squared distance to another position (cheap comparison form)
    #[inline(always)]
    pub fn distance_sq(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Euclidean distance to another position
    #[inline(always)]
    pub fn distance(&self, other: &Position) -> f32 {
        self.distance_sq(other).sqrt()
    }

    /// Integer tile containing this position
    #[inline(always)]
    pub fn tile(&self) -> (i32, i32) {
        (self.x.floor() as i32, self.y.floor() as i32)
    }

    /// Step from self toward `target` by at most `max_step`, returning the
    /// new position and whether the target was reached this step.
    pub fn step_toward(&self, target: &Position, max_step: f32) -> (Position, bool) {
        let dist = self.distance(target);
        if dist <= max_step || dist == 0.0 {
            return (*target, true);
        }
        let t = max_step / dist;
        (
            Position::new(
                self.x + (target.x - self.x) * t,
                self.y + (target.y - self.y) * t,
            ),
            false,
        )
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_distance() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(3.0, 4.0);
        assert_eq!(a.distance(&b), 5.0);
        assert_eq!(a.distance_sq(&b), 25.0);
    }

    #[test]
    fn test_step_toward_clamps_to_target() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(1.0, 0.0);

        // Big step overshoots: we land exactly on the target
        let (pos, arrived) = a.step_toward(&b, 5.0);
        assert!(arrived);
        assert_eq!(pos, b);

        // Small step makes partial progress
        let (pos, arrived) = a.step_toward(&b, 0.25);
        assert!(!arrived);
        assert!((pos.x - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_tile_floor() {
        assert_eq!(Position::new(1.9, -0.1).tile(), (1, -1));
        assert_eq!(Position::new(0.0, 0.0).tile(), (0, 0));
    }

    #[test]
    fn test_ids_are_distinct_types() {
        let agent = AgentId::from("agent-1");
        assert_eq!(agent.as_str(), "agent-1");
        assert_eq!(format!("{}", agent), "agent-1");
    }
}
