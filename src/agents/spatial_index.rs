//! Spatial grid index for fast agent lookups by location.
//!
//! Uniform-grid buckets keyed by cell coordinates enable O(k) radius queries
//! where k is the number of entries in the overlapped cells, instead of O(N)
//! scans through the whole population.
//!
//! The scheduler rebuilds this index at preTick from the committed store;
//! systems treat it as read-only for the rest of the tick.

use std::collections::HashMap;

use crate::types::{AgentId, Position};

/// An index entry: who and exactly where
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialEntry {
    pub id: AgentId,
    pub position: Position,
}

#[derive(Debug)]
pub struct SpatialIndex {
    cells: HashMap<(i32, i32), Vec<SpatialEntry>>,
    cell_size: f32,
}

impl SpatialIndex {
    /// `cell_size` should approximate the largest common interaction radius
    pub fn new(cell_size: f32) -> Self {
        Self {
            cells: HashMap::with_capacity(256),
            cell_size: cell_size.max(1.0),
        }
    }

    #[inline(always)]
    fn cell_of(&self, x: f32, y: f32) -> (i32, i32) {
        (
            (x / self.cell_size).floor() as i32,
            (y / self.cell_size).floor() as i32,
        )
    }

    /// Drop all entries, keeping allocated buckets for reuse
    pub fn clear(&mut self) {
        for bucket in self.cells.values_mut() {
            bucket.clear();
        }
    }

    pub fn insert(&mut self, id: AgentId, x: f32, y: f32) {
        let cell = self.cell_of(x, y);
        self.cells.entry(cell).or_default().push(SpatialEntry {
            id,
            position: Position::new(x, y),
        });
    }

    /// All entries within `radius` of `center`, filtered by squared distance.
    /// Scans only the cells overlapping the circle's bounding square.
    pub fn query_radius(&self, center: Position, radius: f32) -> Vec<SpatialEntry> {
        let radius = radius.max(0.0);
        let radius_sq = radius * radius;
        let min_cell = self.cell_of(center.x - radius, center.y - radius);
        let max_cell = self.cell_of(center.x + radius, center.y + radius);

        let mut results = Vec::new();
        for cx in min_cell.0..=max_cell.0 {
            for cy in min_cell.1..=max_cell.1 {
                if let Some(bucket) = self.cells.get(&(cx, cy)) {
                    for entry in bucket {
                        if entry.position.distance_sq(&center) <= radius_sq {
                            results.push(entry.clone());
                        }
                    }
                }
            }
        }
        results
    }

    pub fn total_entries(&self) -> usize {
        self.cells.values().map(|bucket| bucket.len()).sum()
    }

    /// Number of cells currently holding at least one entry
    pub fn occupied_cells(&self) -> usize {
        self.cells.values().filter(|bucket| !bucket.is_empty()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> AgentId {
        AgentId::from(s)
    }

    #[test]
    fn test_insert_and_radius_query() {
        let mut index = SpatialIndex::new(8.0);
        index.insert(id("a"), 1.0, 1.0);
        index.insert(id("b"), 3.0, 1.0);
        index.insert(id("c"), 40.0, 40.0);

        let near = index.query_radius(Position::new(0.0, 0.0), 5.0);
        let ids: Vec<&str> = near.iter().map(|e| e.id.as_str()).collect();
        assert!(ids.contains(&"a"));
        assert!(ids.contains(&"b"));
        assert!(!ids.contains(&"c"));
    }

    #[test]
    fn test_query_filters_by_exact_distance_not_cell() {
        let mut index = SpatialIndex::new(8.0);
        // Same cell as origin but outside a radius-2 circle
        index.insert(id("far-corner"), 6.0, 6.0);
        let near = index.query_radius(Position::new(0.0, 0.0), 2.0);
        assert!(near.is_empty());
    }

    #[test]
    fn test_entries_carry_positions() {
        let mut index = SpatialIndex::new(8.0);
        index.insert(id("a"), 2.5, -3.5);
        let found = index.query_radius(Position::new(2.5, -3.5), 0.1);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].position, Position::new(2.5, -3.5));
    }

    #[test]
    fn test_negative_coordinates() {
        let mut index = SpatialIndex::new(8.0);
        index.insert(id("west"), -20.0, -20.0);
        let found = index.query_radius(Position::new(-19.0, -19.0), 3.0);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_clear_empties_index() {
        let mut index = SpatialIndex::new(8.0);
        index.insert(id("a"), 0.0, 0.0);
        index.insert(id("b"), 100.0, 100.0);
        assert_eq!(index.total_entries(), 2);

        index.clear();
        assert_eq!(index.total_entries(), 0);
        assert!(index.query_radius(Position::ORIGIN, 1000.0).is_empty());
    }

    #[test]
    fn test_density_query() {
        let mut index = SpatialIndex::new(8.0);
        for i in 0..100 {
            let x = (i % 10) as f32 * 2.0;
            let y = (i / 10) as f32 * 2.0;
            index.insert(id(&format!("agent-{}", i)), x, y);
        }
        let near = index.query_radius(Position::new(9.0, 9.0), 4.0);
        assert!(!near.is_empty());
        for entry in &near {
            assert!(entry.position.distance(&Position::new(9.0, 9.0)) <= 4.0);
        }
    }
}
