//! Terrain tiles and chunks.
//!
//! The world is a tiled 2D grid generated chunk by chunk. Chunks are
//! immutable once emitted except through `WorldMap::modify_tile`.

use serde::{Deserialize, Serialize};

pub const CHUNK_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerrainType {
    Grass,
    Dirt,
    Sand,
    Stone,
    Forest,
    Mountain,
    ShallowWater,
    DeepWater,
    Snow,
    Swamp,
    Desert,
}

impl TerrainType {
    pub fn is_walkable(&self) -> bool {
        !matches!(
            self,
            TerrainType::DeepWater | TerrainType::ShallowWater | TerrainType::Mountain
        )
    }

    /// Relative cost of crossing one tile of this terrain
    pub fn movement_cost(&self) -> f32 {
        match self {
            TerrainType::Grass | TerrainType::Dirt => 1.0,
            TerrainType::Sand | TerrainType::Desert => 1.3,
            TerrainType::Forest => 1.5,
            TerrainType::Stone => 1.2,
            TerrainType::Snow => 1.6,
            TerrainType::Swamp => 2.0,
            TerrainType::Mountain | TerrainType::ShallowWater | TerrainType::DeepWater => 1000.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TerrainType::Grass => "Grass",
            TerrainType::Dirt => "Dirt",
            TerrainType::Sand => "Sand",
            TerrainType::Stone => "Stone",
            TerrainType::Forest => "Forest",
            TerrainType::Mountain => "Mountain",
            TerrainType::ShallowWater => "ShallowWater",
            TerrainType::DeepWater => "DeepWater",
            TerrainType::Snow => "Snow",
            TerrainType::Swamp => "Swamp",
            TerrainType::Desert => "Desert",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Grass" => Some(TerrainType::Grass),
            "Dirt" => Some(TerrainType::Dirt),
            "Sand" => Some(TerrainType::Sand),
            "Stone" => Some(TerrainType::Stone),
            "Forest" => Some(TerrainType::Forest),
            "Mountain" => Some(TerrainType::Mountain),
            "ShallowWater" => Some(TerrainType::ShallowWater),
            "DeepWater" => Some(TerrainType::DeepWater),
            "Snow" => Some(TerrainType::Snow),
            "Swamp" => Some(TerrainType::Swamp),
            "Desert" => Some(TerrainType::Desert),
        _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Biome {
    Plains,
    Woodland,
    Desert,
    Tundra,
    Wetland,
    Coast,
    Highland,
    Ocean,
}

impl Biome {
    pub fn name(&self) -> &'static str {
        match self {
            Biome::Plains => "plains",
            Biome::Woodland => "woodland",
            Biome::Desert => "desert",
            Biome::Tundra => "tundra",
            Biome::Wetland => "wetland",
            Biome::Coast => "coast",
            Biome::Highland => "highland",
            Biome::Ocean => "ocean",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub terrain: TerrainType,
    pub biome: Biome,
    pub elevation: f32,
    pub moisture: f32,
    pub temperature: f32,
    pub walkable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub asset_tags: Vec<String>,
}

impl Tile {
    pub fn new(
        terrain: TerrainType,
        biome: Biome,
        elevation: f32,
        moisture: f32,
        temperature: f32,
    ) -> Self {
        Self {
            terrain,
            biome,
            elevation,
            moisture,
            temperature,
            walkable: terrain.is_walkable(),
            asset_tags: Vec::new(),
        }
    }
}

/// A CHUNK_SIZE x CHUNK_SIZE block of tiles, row-major
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub coord: (i32, i32),
    pub tiles: Vec<Tile>,
}

impl Chunk {
    pub fn new(coord: (i32, i32), tiles: Vec<Tile>) -> Self {
        debug_assert_eq!(tiles.len(), CHUNK_SIZE * CHUNK_SIZE);
        Self { coord, tiles }
    }

    pub fn tile(&self, local_x: usize, local_y: usize) -> Option<&Tile> {
        if local_x >= CHUNK_SIZE || local_y >= CHUNK_SIZE {
            return None;
        }
        self.tiles.get(local_y * CHUNK_SIZE + local_x)
    }

    pub fn tile_mut(&mut self, local_x: usize, local_y: usize) -> Option<&mut Tile> {
        if local_x >= CHUNK_SIZE || local_y >= CHUNK_SIZE {
            return None;
        }
        self.tiles.get_mut(local_y * CHUNK_SIZE + local_x)
    }

    /// Fraction of walkable tiles, used when picking spawn chunks
    pub fn walkable_fraction(&self) -> f32 {
        if self.tiles.is_empty() {
            return 0.0;
        }
        let walkable = self.tiles.iter().filter(|tile| tile.walkable).count();
        walkable as f32 / self.tiles.len() as f32
    }
}

/// Chunk coordinate containing a world tile
pub fn chunk_of_tile(x: i32, y: i32) -> (i32, i32) {
    (
        x.div_euclid(CHUNK_SIZE as i32),
        y.div_euclid(CHUNK_SIZE as i32),
    )
}

/// Local tile coordinates within its chunk
pub fn local_in_chunk(x: i32, y: i32) -> (usize, usize) {
    (
        x.rem_euclid(CHUNK_SIZE as i32) as usize,
        y.rem_euclid(CHUNK_SIZE as i32) as usize,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walkability() {
        assert!(TerrainType::Grass.is_walkable());
        assert!(!TerrainType::DeepWater.is_walkable());
        assert!(!TerrainType::Mountain.is_walkable());
    }

    #[test]
    fn test_chunk_coordinates() {
        assert_eq!(chunk_of_tile(0, 0), (0, 0));
        assert_eq!(chunk_of_tile(15, 15), (0, 0));
        assert_eq!(chunk_of_tile(16, 16), (1, 1));
        assert_eq!(chunk_of_tile(-1, -1), (-1, -1));
        assert_eq!(local_in_chunk(-1, -1), (15, 15));
        assert_eq!(local_in_chunk(17, 2), (1, 2));
    }

    #[test]
    fn test_terrain_name_roundtrip() {
        for terrain in [
            TerrainType::Grass,
            TerrainType::Swamp,
            TerrainType::DeepWater,
        ] {
            assert_eq!(TerrainType::from_name(terrain.name()), Some(terrain));
        }
        assert_eq!(TerrainType::from_name("Lava"), None);
    }
}
