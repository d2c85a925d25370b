//! Tiled world: chunked terrain plus zones and their stockpiles.

pub mod generator;
pub mod terrain;
pub mod zones;

pub use generator::WorldGenerator;
pub use terrain::{chunk_of_tile, local_in_chunk, Biome, Chunk, TerrainType, Tile, CHUNK_SIZE};
pub use zones::{Stockpile, Zone, ZoneMetadata, ZoneType};

use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use tracing::info;

use crate::errors::{Result, SimulatorError};
use crate::types::{Position, ZoneId};

/// Live world: generated chunks, zone registry, world bounds.
///
/// Chunks are generated on demand from the seeded generator; freshly
/// generated chunk coordinates are parked in `newly_rendered` until the
/// scheduler drains them and emits `chunk:rendered`.
pub struct WorldMap {
    generator: WorldGenerator,
    chunks: HashMap<(i32, i32), Chunk>,
    zones: BTreeMap<ZoneId, Zone>,
    half_extent: f32,
    newly_rendered: Vec<(i32, i32)>,
}

impl WorldMap {
    pub fn new(seed: u64, half_extent: f32) -> Self {
        Self {
            generator: WorldGenerator::new(seed),
            chunks: HashMap::new(),
            zones: BTreeMap::new(),
            half_extent: half_extent.max(16.0),
            newly_rendered: Vec::new(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.generator.seed()
    }

    pub fn half_extent(&self) -> f32 {
        self.half_extent
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    // ── Terrain access ───────────────────────────────────────────────────

    pub fn ensure_chunk(&mut self, cx: i32, cy: i32) -> &Chunk {
        match self.chunks.entry((cx, cy)) {
            std::collections::hash_map::Entry::Occupied(slot) => slot.into_mut(),
            std::collections::hash_map::Entry::Vacant(slot) => {
                self.newly_rendered.push((cx, cy));
                slot.insert(self.generator.generate_chunk(cx, cy))
            }
        }
    }

    /// Chunk coordinates generated since the last drain; the scheduler
    /// turns these into `chunk:rendered` events at preTick.
    pub fn drain_rendered(&mut self) -> Vec<(i32, i32)> {
        std::mem::take(&mut self.newly_rendered)
    }

    pub fn tile_at(&mut self, x: i32, y: i32) -> &Tile {
        let (cx, cy) = chunk_of_tile(x, y);
        let (lx, ly) = local_in_chunk(x, y);
        let chunk = self.ensure_chunk(cx, cy);
        // local_in_chunk stays inside CHUNK_SIZE, so the lookup cannot miss
        chunk
            .tile(lx, ly)
            .expect("chunk tiles cover every local coordinate")
    }

    pub fn is_walkable(&mut self, x: i32, y: i32) -> bool {
        if (x as f32).abs() > self.half_extent || (y as f32).abs() > self.half_extent {
            return false;
        }
        self.tile_at(x, y).walkable
    }

    /// Replace the terrain of one tile. The only sanctioned mutation of an
    /// emitted chunk; the caller emits `terrain:modified`.
    pub fn modify_tile(&mut self, x: i32, y: i32, terrain: TerrainType) -> Result<()> {
        let (cx, cy) = chunk_of_tile(x, y);
        self.ensure_chunk(cx, cy);
        let (lx, ly) = local_in_chunk(x, y);
        let tile = self
            .chunks
            .get_mut(&(cx, cy))
            .and_then(|chunk| chunk.tile_mut(lx, ly))
            .ok_or_else(|| SimulatorError::world(format!("no tile at ({}, {})", x, y)))?;
        tile.terrain = terrain;
        tile.walkable = terrain.is_walkable();
        Ok(())
    }

    /// Clamp a position into world bounds
    pub fn clamp_position(&self, position: Position) -> Position {
        Position::new(
            position.x.clamp(-self.half_extent, self.half_extent),
            position.y.clamp(-self.half_extent, self.half_extent),
        )
    }

    /// Random walkable tile near `center`, or None after `attempts` tries
    pub fn find_walkable_near<R: Rng>(
        &mut self,
        center: Position,
        spread: i32,
        attempts: usize,
        rng: &mut R,
    ) -> Option<Position> {
        let (cx, cy) = center.tile();
        for _ in 0..attempts {
            let x = cx + rng.gen_range(-spread..=spread);
            let y = cy + rng.gen_range(-spread..=spread);
            if self.is_walkable(x, y) {
                return Some(Position::new(x as f32 + 0.5, y as f32 + 0.5));
            }
        }
        None
    }

    // ── Zones ────────────────────────────────────────────────────────────

    pub fn add_zone(&mut self, zone: Zone) {
        info!("registered zone {} ({:?})", zone.id, zone.zone_type);
        self.zones.insert(zone.id.clone(), zone);
    }

    pub fn remove_zone(&mut self, id: &ZoneId) -> Option<Zone> {
        self.zones.remove(id)
    }

    pub fn zone(&self, id: &ZoneId) -> Option<&Zone> {
        self.zones.get(id)
    }

    pub fn zone_mut(&mut self, id: &ZoneId) -> Option<&mut Zone> {
        self.zones.get_mut(id)
    }

    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    pub fn zones_of_type(&self, zone_type: ZoneType) -> Vec<&Zone> {
        self.zones
            .values()
            .filter(|zone| zone.zone_type == zone_type)
            .collect()
    }

    pub fn zone_containing(&self, position: Position) -> Option<&Zone> {
        self.zones.values().find(|zone| zone.contains(position))
    }

    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    /// Replace the zone table wholesale (snapshot restore)
    pub fn replace_zones(&mut self, zones: Vec<Zone>) {
        self.zones = zones
            .into_iter()
            .map(|zone| (zone.id.clone(), zone))
            .collect();
    }

    /// Starter settlement layout around the origin: a food zone, a water
    /// zone, a storage yard and a market square.
    pub fn seed_default_zones(&mut self) {
        let mut farm = Zone::rect(
            ZoneId::from("zone-farm"),
            "Farm",
            ZoneType::Food,
            Position::new(4.0, 4.0),
            Position::new(14.0, 14.0),
        );
        farm.metadata.production_resource = Some("food".to_string());
        farm.stockpiles.push(Stockpile::new("food", 300.0));
        self.add_zone(farm);

        let mut well = Zone::rect(
            ZoneId::from("zone-well"),
            "Well",
            ZoneType::Water,
            Position::new(-12.0, 4.0),
            Position::new(-4.0, 12.0),
        );
        well.metadata.production_resource = Some("water".to_string());
        well.stockpiles.push(Stockpile::new("water", 500.0));
        self.add_zone(well);

        let mut yard = Zone::rect(
            ZoneId::from("zone-yard"),
            "Storage yard",
            ZoneType::Storage,
            Position::new(-12.0, -12.0),
            Position::new(-2.0, -4.0),
        );
        yard.stockpiles.push(Stockpile::new("wood", 400.0));
        yard.stockpiles.push(Stockpile::new("stone", 400.0));
        self.add_zone(yard);

        let mut market = Zone::rect(
            ZoneId::from("zone-market"),
            "Market square",
            ZoneType::Market,
            Position::new(4.0, -12.0),
            Position::new(14.0, -4.0),
        );
        market.metadata.crafting = true;
        self.add_zone(market);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_pcg::Pcg64;
    use rand::SeedableRng;

    #[test]
    fn test_chunk_generated_on_demand_once() {
        let mut map = WorldMap::new(9, 128.0);
        assert_eq!(map.chunk_count(), 0);
        map.tile_at(5, 5);
        assert_eq!(map.chunk_count(), 1);
        map.tile_at(6, 6);
        assert_eq!(map.chunk_count(), 1, "same chunk reused");
        assert_eq!(map.drain_rendered(), vec![(0, 0)]);
        assert!(map.drain_rendered().is_empty());
    }

    #[test]
    fn test_modify_tile_changes_walkability() {
        let mut map = WorldMap::new(9, 128.0);
        map.modify_tile(2, 2, TerrainType::DeepWater).unwrap();
        assert!(!map.is_walkable(2, 2));
        map.modify_tile(2, 2, TerrainType::Grass).unwrap();
        assert!(map.is_walkable(2, 2));
    }

    #[test]
    fn test_out_of_bounds_not_walkable() {
        let mut map = WorldMap::new(9, 32.0);
        assert!(!map.is_walkable(100, 0));
        let clamped = map.clamp_position(Position::new(500.0, -500.0));
        assert_eq!(clamped, Position::new(32.0, -32.0));
    }

    #[test]
    fn test_zone_lookup() {
        let mut map = WorldMap::new(9, 128.0);
        map.seed_default_zones();
        assert_eq!(map.zones_of_type(ZoneType::Food).len(), 1);
        let zone = map.zone_containing(Position::new(9.0, 9.0)).unwrap();
        assert_eq!(zone.id, ZoneId::from("zone-farm"));
        assert!(map.zone_containing(Position::new(200.0, 200.0)).is_none());
    }

    #[test]
    fn test_find_walkable_near() {
        let mut map = WorldMap::new(3, 128.0);
        let mut rng = Pcg64::seed_from_u64(1);
        // Force a known-walkable patch so the search has something to find
        for x in -1..=1 {
            for y in -1..=1 {
                map.modify_tile(x, y, TerrainType::Grass).unwrap();
            }
        }
        let found = map.find_walkable_near(Position::new(0.5, 0.5), 4, 400, &mut rng);
        assert!(found.is_some());
    }
}
