//! Seeded procedural terrain generation.
//!
//! Elevation comes from fractal Perlin noise; moisture and temperature from
//! two independent Perlin fields. Threshold bands turn the three fields into
//! terrain and biome per tile. Generation is pure: the same seed and chunk
//! coordinate always produce the same chunk.

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};

use super::terrain::{Biome, Chunk, Tile, TerrainType, CHUNK_SIZE};

const ELEVATION_SCALE: f64 = 0.015;
const MOISTURE_SCALE: f64 = 0.02;
const TEMPERATURE_SCALE: f64 = 0.008;

pub struct WorldGenerator {
    seed: u64,
    elevation: Fbm<Perlin>,
    moisture: Perlin,
    temperature: Perlin,
}

impl WorldGenerator {
    pub fn new(seed: u64) -> Self {
        let base = seed as u32;
        Self {
            seed,
            elevation: Fbm::<Perlin>::new(base).set_octaves(4).set_persistence(0.5),
            moisture: Perlin::new(base.wrapping_add(101)),
            temperature: Perlin::new(base.wrapping_add(223)),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generate the chunk at chunk coordinates `(cx, cy)`
    pub fn generate_chunk(&self, cx: i32, cy: i32) -> Chunk {
        let mut tiles = Vec::with_capacity(CHUNK_SIZE * CHUNK_SIZE);
        for local_y in 0..CHUNK_SIZE {
            for local_x in 0..CHUNK_SIZE {
                let world_x = cx * CHUNK_SIZE as i32 + local_x as i32;
                let world_y = cy * CHUNK_SIZE as i32 + local_y as i32;
                tiles.push(self.generate_tile(world_x, world_y));
            }
        }
        Chunk::new((cx, cy), tiles)
    }

    fn generate_tile(&self, x: i32, y: i32) -> Tile {
        let fx = x as f64;
        let fy = y as f64;

        let elevation = self
            .elevation
            .get([fx * ELEVATION_SCALE, fy * ELEVATION_SCALE]) as f32;
        let moisture = self.moisture.get([fx * MOISTURE_SCALE, fy * MOISTURE_SCALE]) as f32;
        let temperature = self
            .temperature
            .get([fx * TEMPERATURE_SCALE, fy * TEMPERATURE_SCALE]) as f32;

        let terrain = classify_terrain(elevation, moisture, temperature);
        let biome = classify_biome(terrain, moisture, temperature);
        Tile::new(terrain, biome, elevation, moisture, temperature)
    }
}

fn classify_terrain(elevation: f32, moisture: f32, temperature: f32) -> TerrainType {
    if elevation < -0.35 {
        return TerrainType::DeepWater;
    }
    if elevation < -0.2 {
        return TerrainType::ShallowWater;
    }
    if elevation < -0.12 {
        return TerrainType::Sand;
    }
    if elevation > 0.6 {
        return TerrainType::Mountain;
    }
    if elevation > 0.45 {
        return if temperature < -0.3 {
            TerrainType::Snow
        } else {
            TerrainType::Stone
        };
    }
    if temperature < -0.55 {
        return TerrainType::Snow;
    }
    if temperature > 0.5 && moisture < -0.2 {
        return TerrainType::Desert;
    }
    if moisture > 0.55 && elevation < 0.05 {
        return TerrainType::Swamp;
    }
    if moisture > 0.25 {
        return TerrainType::Forest;
    }
    if moisture < -0.35 {
        return TerrainType::Dirt;
    }
    TerrainType::Grass
}

fn classify_biome(terrain: TerrainType, moisture: f32, temperature: f32) -> Biome {
    match terrain {
        TerrainType::DeepWater => Biome::Ocean,
        TerrainType::ShallowWater | TerrainType::Sand => Biome::Coast,
        TerrainType::Mountain | TerrainType::Stone => Biome::Highland,
        TerrainType::Snow => Biome::Tundra,
        TerrainType::Swamp => Biome::Wetland,
        TerrainType::Desert => Biome::Desert,
        TerrainType::Forest => Biome::Woodland,
        TerrainType::Grass | TerrainType::Dirt => {
            if temperature < -0.4 {
                Biome::Tundra
            } else if moisture > 0.4 {
                Biome::Wetland
            } else {
                Biome::Plains
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_deterministic() {
        let a = WorldGenerator::new(42);
        let b = WorldGenerator::new(42);
        let chunk_a = a.generate_chunk(3, -2);
        let chunk_b = b.generate_chunk(3, -2);
        assert_eq!(chunk_a.tiles.len(), chunk_b.tiles.len());
        for (ta, tb) in chunk_a.tiles.iter().zip(chunk_b.tiles.iter()) {
            assert_eq!(ta, tb);
        }
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = WorldGenerator::new(1).generate_chunk(0, 0);
        let b = WorldGenerator::new(2).generate_chunk(0, 0);
        assert!(
            a.tiles.iter().zip(b.tiles.iter()).any(|(ta, tb)| ta != tb),
            "seeds should produce different terrain"
        );
    }

    #[test]
    fn test_tile_walkability_matches_terrain() {
        let chunk = WorldGenerator::new(7).generate_chunk(0, 0);
        for tile in &chunk.tiles {
            assert_eq!(tile.walkable, tile.terrain.is_walkable());
        }
    }
}
