//! Zones and stockpiles.
//!
//! Zones are polygonal bounded regions with a type and optional production
//! metadata. A zone may hold stockpiles: typed resource pools with a shared
//! capacity.

use serde::{Deserialize, Serialize};

use crate::types::{Position, ZoneId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneType {
    Work,
    Food,
    Water,
    Storage,
    Market,
    Gathering,
    Housing,
    Wild,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneMetadata {
    /// Resource this zone yields when worked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_resource: Option<String>,
    /// Whether crafting stations may be placed here
    #[serde(default)]
    pub crafting: bool,
}

/// A typed resource pool shared among agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stockpile {
    pub resource: String,
    pub amount: f32,
    pub capacity: f32,
}

impl Stockpile {
    pub fn new<S: Into<String>>(resource: S, capacity: f32) -> Self {
        Self {
            resource: resource.into(),
            amount: 0.0,
            capacity: capacity.max(0.0),
        }
    }

    /// Add up to `amount`, returning how much actually fit
    pub fn add(&mut self, amount: f32) -> f32 {
        let space = (self.capacity - self.amount).max(0.0);
        let added = amount.max(0.0).min(space);
        self.amount += added;
        added
    }

    /// Remove up to `amount`, returning how much was actually removed
    pub fn remove(&mut self, amount: f32) -> f32 {
        let removed = amount.max(0.0).min(self.amount);
        self.amount -= removed;
        removed
    }

    pub fn is_full(&self) -> bool {
        self.amount >= self.capacity
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    pub zone_type: ZoneType,
    /// Polygon vertices in order; the closing edge is implicit
    pub polygon: Vec<Position>,
    #[serde(default)]
    pub metadata: ZoneMetadata,
    #[serde(default)]
    pub stockpiles: Vec<Stockpile>,
}

impl Zone {
    pub fn new<S: Into<String>>(
        id: ZoneId,
        name: S,
        zone_type: ZoneType,
        polygon: Vec<Position>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            zone_type,
            polygon,
            metadata: ZoneMetadata::default(),
            stockpiles: Vec::new(),
        }
    }

    /// Axis-aligned rectangle helper for the common case
    pub fn rect<S: Into<String>>(
        id: ZoneId,
        name: S,
        zone_type: ZoneType,
        min: Position,
        max: Position,
    ) -> Self {
        Self::new(
            id,
            name,
            zone_type,
            vec![
                min,
                Position::new(max.x, min.y),
                max,
                Position::new(min.x, max.y),
            ],
        )
    }

    /// Ray-cast point-in-polygon test
    pub fn contains(&self, point: Position) -> bool {
        let n = self.polygon.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let a = self.polygon[i];
            let b = self.polygon[j];
            let crosses = (a.y > point.y) != (b.y > point.y);
            if crosses {
                let slope_x = (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x;
                if point.x < slope_x {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// Mean of the polygon vertices; good enough as a movement target
    pub fn centroid(&self) -> Position {
        if self.polygon.is_empty() {
            return Position::ORIGIN;
        }
        let (sx, sy) = self
            .polygon
            .iter()
            .fold((0.0_f32, 0.0_f32), |(sx, sy), p| (sx + p.x, sy + p.y));
        let n = self.polygon.len() as f32;
        Position::new(sx / n, sy / n)
    }

    pub fn stockpile(&self, resource: &str) -> Option<&Stockpile> {
        self.stockpiles.iter().find(|pile| pile.resource == resource)
    }

    pub fn stockpile_mut(&mut self, resource: &str) -> Option<&mut Stockpile> {
        self.stockpiles
            .iter_mut()
            .find(|pile| pile.resource == resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_zone() -> Zone {
        Zone::rect(
            ZoneId::from("farm-1"),
            "North farm",
            ZoneType::Food,
            Position::new(0.0, 0.0),
            Position::new(10.0, 10.0),
        )
    }

    #[test]
    fn test_rect_contains() {
        let zone = test_zone();
        assert!(zone.contains(Position::new(5.0, 5.0)));
        assert!(!zone.contains(Position::new(15.0, 5.0)));
        assert!(!zone.contains(Position::new(-1.0, 5.0)));
    }

    #[test]
    fn test_centroid() {
        let zone = test_zone();
        let center = zone.centroid();
        assert!((center.x - 5.0).abs() < 1e-5);
        assert!((center.y - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_stockpile_add_respects_capacity() {
        let mut pile = Stockpile::new("wood", 10.0);
        assert_eq!(pile.add(6.0), 6.0);
        assert_eq!(pile.add(6.0), 4.0, "only the remaining space fits");
        assert!(pile.is_full());
        assert_eq!(pile.remove(3.0), 3.0);
        assert_eq!(pile.remove(100.0), 7.0);
        assert_eq!(pile.amount, 0.0);
    }

    #[test]
    fn test_triangle_polygon() {
        let zone = Zone::new(
            ZoneId::from("tri"),
            "Triangle",
            ZoneType::Wild,
            vec![
                Position::new(0.0, 0.0),
                Position::new(10.0, 0.0),
                Position::new(0.0, 10.0),
            ],
        );
        assert!(zone.contains(Position::new(2.0, 2.0)));
        assert!(!zone.contains(Position::new(8.0, 8.0)));
    }
}
