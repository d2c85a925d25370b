//! Animal population: an independent set of creatures with their own store,
//! spatial grid and state machine.
//!
//! The FSM is priority-ordered: fleeing predators beats fleeing humans,
//! which beats critical hunger (hunt or forage), then critical thirst, then
//! the reproductive urge, then idle wandering. Deaths emit `animal:died`
//! with a cause; hunts by agents additionally emit `animal:hunted` and drop
//! meat and hide to the hunter.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::errors::Result;
use crate::events::{AnimalDeathCause, SimulationEvent};
use crate::ports::{AnimalsPort, HandlerResult, SystemRegistry};
use crate::simulation::scheduler::SimSystem;
use crate::simulation::state::WorldState;
use crate::types::{AgentId, AnimalId, Position};
use crate::world::TerrainType;

/// Distance at which a hunt or a meal resolves
const CONTACT_RANGE: f32 = 1.2;
/// Needs level below which an animal starts looking for food or water
const NEED_CRITICAL: f32 = 30.0;
/// Needs level above which an animal considers reproduction
const NEED_COMFORT: f32 = 60.0;
/// How far an animal scans terrain for water, in tiles
const WATER_SCAN_RADIUS: i32 = 8;

// ============================================================================
// SPECIES & GENES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Species {
    Rabbit,
    Deer,
    Boar,
    Fox,
    Wolf,
    Bear,
}

impl Species {
    pub const ALL: [Species; 6] = [
        Species::Rabbit,
        Species::Deer,
        Species::Boar,
        Species::Fox,
        Species::Wolf,
        Species::Bear,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Species::Rabbit => "rabbit",
            Species::Deer => "deer",
            Species::Boar => "boar",
            Species::Fox => "fox",
            Species::Wolf => "wolf",
            Species::Bear => "bear",
        }
    }

    pub fn is_predator(&self) -> bool {
        matches!(self, Species::Fox | Species::Wolf | Species::Bear)
    }

    pub fn max_health(&self) -> f32 {
        match self {
            Species::Rabbit => 15.0,
            Species::Fox => 30.0,
            Species::Deer => 45.0,
            Species::Boar => 55.0,
            Species::Wolf => 60.0,
            Species::Bear => 120.0,
        }
    }

    pub fn base_speed(&self) -> f32 {
        match self {
            Species::Rabbit => 4.5,
            Species::Fox => 4.0,
            Species::Deer => 4.2,
            Species::Boar => 3.0,
            Species::Wolf => 4.4,
            Species::Bear => 3.2,
        }
    }

    /// Hunger restored to whoever eats this animal
    pub fn nutrition(&self) -> f32 {
        match self {
            Species::Rabbit => 20.0,
            Species::Fox => 25.0,
            Species::Deer => 45.0,
            Species::Boar => 50.0,
            Species::Wolf => 35.0,
            Species::Bear => 70.0,
        }
    }

    /// Relative spawn weight
    fn spawn_weight(&self) -> u32 {
        match self {
            Species::Rabbit => 40,
            Species::Deer => 25,
            Species::Boar => 15,
            Species::Fox => 10,
            Species::Wolf => 7,
            Species::Bear => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genes {
    pub speed: f32,
    pub size: f32,
    pub aggression: f32,
}

impl Genes {
    fn random<R: Rng>(rng: &mut R) -> Self {
        Self {
            speed: rng.gen_range(0.8..1.2),
            size: rng.gen_range(0.8..1.2),
            aggression: rng.gen_range(0.0..1.0),
        }
    }

    fn offspring<R: Rng>(a: &Genes, b: &Genes, rng: &mut R) -> Self {
        let blend = |x: f32, y: f32, rng: &mut R| {
            ((x + y) / 2.0 + rng.gen_range(-0.1..0.1)).clamp(0.5, 1.5)
        };
        Self {
            speed: blend(a.speed, b.speed, rng),
            size: blend(a.size, b.size, rng),
            aggression: ((a.aggression + b.aggression) / 2.0 + rng.gen_range(-0.1..0.1))
                .clamp(0.0, 1.0),
        }
    }
}

// ============================================================================
// ANIMAL RECORD & STORE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimalState {
    Idle,
    Wandering,
    Fleeing,
    Hunting,
    SeekingFood,
    SeekingWater,
    Eating,
    Drinking,
    Mating,
    Dead,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Animal {
    pub id: AnimalId,
    pub species: Species,
    pub position: Position,
    pub genes: Genes,
    pub health: f32,
    pub hunger: f32,
    pub thirst: f32,
    pub age_years: f32,
    pub state: AnimalState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_target: Option<Position>,
    pub last_reproduced_at: u64,
}

/// Animal records plus their own uniform grid, independent of the agent
/// spatial index.
#[derive(Debug)]
pub struct AnimalStore {
    animals: BTreeMap<AnimalId, Animal>,
    grid: HashMap<(i32, i32), Vec<AnimalId>>,
    cell_size: f32,
}

impl AnimalStore {
    pub fn new(cell_size: f32) -> Self {
        Self {
            animals: BTreeMap::new(),
            grid: HashMap::new(),
            cell_size: cell_size.max(1.0),
        }
    }

    fn cell_of(&self, position: Position) -> (i32, i32) {
        (
            (position.x / self.cell_size).floor() as i32,
            (position.y / self.cell_size).floor() as i32,
        )
    }

    pub fn insert(&mut self, animal: Animal) {
        let cell = self.cell_of(animal.position);
        self.grid.entry(cell).or_default().push(animal.id.clone());
        self.animals.insert(animal.id.clone(), animal);
    }

    pub fn remove(&mut self, id: &AnimalId) -> Option<Animal> {
        let animal = self.animals.remove(id)?;
        let cell = self.cell_of(animal.position);
        if let Some(bucket) = self.grid.get_mut(&cell) {
            bucket.retain(|other| other != id);
        }
        Some(animal)
    }

    pub fn get(&self, id: &AnimalId) -> Option<&Animal> {
        self.animals.get(id)
    }

    pub fn count(&self) -> usize {
        self.animals.len()
    }

    pub fn ids(&self) -> Vec<AnimalId> {
        self.animals.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Animal> {
        self.animals.values()
    }

    /// Replace an animal record, keeping the grid in sync with its position
    pub fn commit(&mut self, animal: Animal) {
        if let Some(previous) = self.animals.get(&animal.id) {
            let old_cell = self.cell_of(previous.position);
            let new_cell = self.cell_of(animal.position);
            if old_cell != new_cell {
                if let Some(bucket) = self.grid.get_mut(&old_cell) {
                    bucket.retain(|other| other != &animal.id);
                }
                self.grid.entry(new_cell).or_default().push(animal.id.clone());
            }
        }
        self.animals.insert(animal.id.clone(), animal);
    }

    pub fn query_radius(&self, center: Position, radius: f32) -> Vec<AnimalId> {
        let radius_sq = radius * radius;
        let min = self.cell_of(Position::new(center.x - radius, center.y - radius));
        let max = self.cell_of(Position::new(center.x + radius, center.y + radius));
        let mut found = Vec::new();
        for cx in min.0..=max.0 {
            for cy in min.1..=max.1 {
                if let Some(bucket) = self.grid.get(&(cx, cy)) {
                    for id in bucket {
                        if let Some(animal) = self.animals.get(id) {
                            if animal.position.distance_sq(&center) <= radius_sq {
                                found.push(id.clone());
                            }
                        }
                    }
                }
            }
        }
        found
    }

    pub fn nearest_in_radius(&self, center: Position, radius: f32) -> Option<(AnimalId, Position)> {
        self.query_radius(center, radius)
            .into_iter()
            .filter_map(|id| self.animals.get(&id).map(|a| (id, a.position)))
            .min_by(|(_, a), (_, b)| {
                a.distance_sq(&center)
                    .partial_cmp(&b.distance_sq(&center))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    pub fn export(&self) -> Vec<Animal> {
        self.animals.values().cloned().collect()
    }

    pub fn import(&mut self, animals: Vec<Animal>) {
        self.animals.clear();
        self.grid.clear();
        for animal in animals {
            self.insert(animal);
        }
    }
}

// ============================================================================
// DAMAGE FROM AGENTS
// ============================================================================

/// Apply hunter damage. On a kill: emit `animal:died` (hunted) and
/// `animal:hunted`, and drop meat and hide to the hunter (best effort).
pub fn damage_animal(
    world: &mut WorldState,
    animal_id: &AnimalId,
    attacker: &AgentId,
    damage: f32,
) -> HandlerResult {
    let now = world.now();
    let Some(animal) = world.animals.get(animal_id).cloned() else {
        return HandlerResult::failed("animals", format!("unknown animal {}", animal_id));
    };
    if animal.state == AnimalState::Dead {
        return HandlerResult::completed("animals")
            .with_data(serde_json::json!({ "fatal": false }));
    }

    let mut animal = animal;
    animal.health -= damage;
    let fatal = animal.health <= 0.0;

    if fatal {
        let species = animal.species;
        animal.state = AnimalState::Dead;
        world.animals.commit(animal);
        world.animals.remove(animal_id);

        world.events.emit(SimulationEvent::AnimalDied {
            animal_id: animal_id.clone(),
            species: species.name().to_string(),
            cause: AnimalDeathCause::Hunted,
            timestamp: now,
        });
        world.events.emit(SimulationEvent::AnimalHunted {
            animal_id: animal_id.clone(),
            hunter: attacker.clone(),
            species: species.name().to_string(),
            timestamp: now,
        });

        let meat = (species.nutrition() / 10.0).ceil() as u32;
        let _ = crate::systems::inventory::add_resource(world, attacker, "meat", meat);
        let _ = crate::systems::inventory::add_resource(world, attacker, "hide", 1);
        debug!("{} hunted a {}", attacker, species.name());
    } else {
        // Wounded animals bolt away from the attacker
        animal.state = AnimalState::Fleeing;
        if let Some(hunter_pos) = world.store.transform(attacker).map(|t| t.position) {
            let away = Position::new(
                animal.position.x + (animal.position.x - hunter_pos.x),
                animal.position.y + (animal.position.y - hunter_pos.y),
            );
            animal.move_target = Some(world.map.clamp_position(away));
        }
        world.animals.commit(animal);
    }
    HandlerResult::completed("animals").with_data(serde_json::json!({ "fatal": fatal }))
}

pub struct AnimalsPortImpl;

impl AnimalsPort for AnimalsPortImpl {
    fn damage_animal(
        &self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        animal_id: &AnimalId,
        attacker: &AgentId,
        damage: f32,
    ) -> HandlerResult {
        damage_animal(world, animal_id, attacker, damage)
    }

    fn animal_position(&self, world: &WorldState, animal_id: &AnimalId) -> Option<Position> {
        world.animals.get(animal_id).map(|animal| animal.position)
    }
}

// ============================================================================
// SYSTEM
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LookupKind {
    Predator,
    Human,
    Prey,
    Water,
}

/// Short-TTL cache of nearest-entity lookups per animal
#[derive(Default)]
struct LookupCache {
    entries: HashMap<(AnimalId, LookupKind), (u64, Option<Position>)>,
}

impl LookupCache {
    fn get(&self, id: &AnimalId, kind: LookupKind, now: u64, ttl: u64) -> Option<Option<Position>> {
        self.entries
            .get(&(id.clone(), kind))
            .filter(|(at, _)| now.saturating_sub(*at) <= ttl)
            .map(|(_, value)| *value)
    }

    fn put(&mut self, id: &AnimalId, kind: LookupKind, now: u64, value: Option<Position>) {
        self.entries.insert((id.clone(), kind), (now, value));
    }

    fn forget(&mut self, id: &AnimalId) {
        self.entries.retain(|(entry_id, _), _| entry_id != id);
    }
}

pub struct AnimalSystem {
    cache: LookupCache,
}

impl AnimalSystem {
    pub fn new() -> Self {
        Self {
            cache: LookupCache::default(),
        }
    }

    /// Pick a species by spawn weight
    fn roll_species(world: &mut WorldState) -> Species {
        let total: u32 = Species::ALL.iter().map(|s| s.spawn_weight()).sum();
        let mut roll = world.rng.gen_range(0..total);
        for species in Species::ALL {
            let weight = species.spawn_weight();
            if roll < weight {
                return species;
            }
            roll -= weight;
        }
        Species::Rabbit
    }

    pub fn spawn_animal(world: &mut WorldState, species: Species, position: Position) -> AnimalId {
        let id = world.next_animal_id();
        let genes = Genes::random(&mut world.rng);
        let animal = Animal {
            id: id.clone(),
            species,
            position,
            health: species.max_health() * genes.size,
            genes,
            hunger: 100.0,
            thirst: 100.0,
            age_years: 0.0,
            state: AnimalState::Idle,
            move_target: None,
            last_reproduced_at: 0,
        };
        world.animals.insert(animal);
        id
    }

    fn nearest_water(world: &mut WorldState, from: Position) -> Option<Position> {
        let (cx, cy) = from.tile();
        let mut best: Option<(f32, Position)> = None;
        for dx in -WATER_SCAN_RADIUS..=WATER_SCAN_RADIUS {
            for dy in -WATER_SCAN_RADIUS..=WATER_SCAN_RADIUS {
                let (tx, ty) = (cx + dx, cy + dy);
                let tile = world.map.tile_at(tx, ty);
                if matches!(tile.terrain, TerrainType::ShallowWater | TerrainType::DeepWater) {
                    let point = Position::new(tx as f32 + 0.5, ty as f32 + 0.5);
                    let distance = from.distance_sq(&point);
                    if best.map(|(d, _)| distance < d).unwrap_or(true) {
                        best = Some((distance, point));
                    }
                }
            }
        }
        best.map(|(_, point)| point)
    }

    fn step(animal: &mut Animal, target: Position, dt_secs: f32) {
        let speed = animal.species.base_speed() * animal.genes.speed;
        let (next, _) = animal.position.step_toward(&target, speed * dt_secs);
        animal.position = next;
    }

    fn decide(
        &mut self,
        world: &mut WorldState,
        id: &AnimalId,
        dt_secs: f32,
        now: u64,
    ) -> Option<(AnimalId, AnimalDeathCause)> {
        let config = world.config.animals.clone();
        let mut animal = world.animals.get(id)?.clone();

        animal.hunger = (animal.hunger - config.hunger_decay * dt_secs).max(0.0);
        animal.thirst = (animal.thirst - config.thirst_decay * dt_secs).max(0.0);
        animal.age_years += dt_secs / config.seconds_per_year;

        if animal.hunger <= 0.0 {
            return Some((animal.id.clone(), AnimalDeathCause::Starvation));
        }
        if animal.thirst <= 0.0 {
            return Some((animal.id.clone(), AnimalDeathCause::Dehydration));
        }
        if animal.age_years >= config.max_age_years {
            return Some((animal.id.clone(), AnimalDeathCause::OldAge));
        }

        let ttl = config.lookup_cache_ttl_ms;
        let position = animal.position;

        // 1. Flee predators
        if !animal.species.is_predator() {
            let predator = match self.cache.get(id, LookupKind::Predator, now, ttl) {
                Some(cached) => cached,
                None => {
                    let found = world
                        .animals
                        .query_radius(position, config.flee_radius)
                        .into_iter()
                        .filter_map(|other| world.animals.get(&other))
                        .find(|other| other.species.is_predator())
                        .map(|other| other.position);
                    self.cache.put(id, LookupKind::Predator, now, found);
                    found
                }
            };
            if let Some(threat) = predator {
                animal.state = AnimalState::Fleeing;
                let away = Position::new(
                    position.x + (position.x - threat.x),
                    position.y + (position.y - threat.y),
                );
                let away = world.map.clamp_position(away);
                Self::step(&mut animal, away, dt_secs);
                world.animals.commit(animal);
                return None;
            }

            // 2. Flee humans
            let human = match self.cache.get(id, LookupKind::Human, now, ttl) {
                Some(cached) => cached,
                None => {
                    let found = world
                        .spatial
                        .query_radius(position, config.flee_radius)
                        .first()
                        .map(|entry| entry.position);
                    self.cache.put(id, LookupKind::Human, now, found);
                    found
                }
            };
            if let Some(threat) = human {
                animal.state = AnimalState::Fleeing;
                let away = world.map.clamp_position(Position::new(
                    position.x + (position.x - threat.x),
                    position.y + (position.y - threat.y),
                ));
                Self::step(&mut animal, away, dt_secs);
                world.animals.commit(animal);
                return None;
            }
        }

        // 3. Critical hunger: hunt or forage
        if animal.hunger < NEED_CRITICAL {
            if animal.species.is_predator() {
                let prey = match self.cache.get(id, LookupKind::Prey, now, ttl) {
                    Some(cached) => cached,
                    None => {
                        let found = world
                            .animals
                            .query_radius(position, config.hunt_radius)
                            .into_iter()
                            .filter_map(|other| world.animals.get(&other))
                            .filter(|other| !other.species.is_predator())
                            .map(|other| (other.id.clone(), other.position))
                            .min_by(|(_, a), (_, b)| {
                                a.distance_sq(&position)
                                    .partial_cmp(&b.distance_sq(&position))
                                    .unwrap_or(std::cmp::Ordering::Equal)
                            });
                        self.cache
                            .put(id, LookupKind::Prey, now, found.as_ref().map(|(_, p)| *p));
                        found.map(|(_, p)| p)
                    }
                };
                if let Some(prey_pos) = prey {
                    animal.state = AnimalState::Hunting;
                    if position.distance(&prey_pos) <= CONTACT_RANGE {
                        // Catch: nearest non-predator at the prey position
                        if let Some((prey_id, _)) = world
                            .animals
                            .nearest_in_radius(prey_pos, CONTACT_RANGE)
                            .filter(|(prey_id, _)| prey_id != id)
                        {
                            let (nutrition, prey_species) = world
                                .animals
                                .get(&prey_id)
                                .map(|p| (p.species.nutrition(), p.species.name()))
                                .unwrap_or((20.0, "unknown"));
                            world.animals.remove(&prey_id);
                            self.cache.forget(&prey_id);
                            world.events.emit(SimulationEvent::AnimalDied {
                                animal_id: prey_id,
                                species: prey_species.to_string(),
                                cause: AnimalDeathCause::Hunted,
                                timestamp: now,
                            });
                            animal.hunger = (animal.hunger + nutrition).min(100.0);
                            animal.state = AnimalState::Eating;
                        }
                    } else {
                        Self::step(&mut animal, prey_pos, dt_secs);
                    }
                    world.animals.commit(animal);
                    return None;
                }
            } else {
                // Herbivores graze where they stand if the tile allows it
                let (tx, ty) = position.tile();
                let edible = matches!(
                    world.map.tile_at(tx, ty).terrain,
                    TerrainType::Grass | TerrainType::Forest | TerrainType::Swamp
                );
                if edible {
                    animal.state = AnimalState::Eating;
                    animal.hunger = (animal.hunger + 20.0 * dt_secs).min(100.0);
                } else {
                    animal.state = AnimalState::SeekingFood;
                    let target = animal.move_target.unwrap_or_else(|| {
                        world.map.clamp_position(Position::new(
                            position.x + world.rng.gen_range(-6.0..6.0),
                            position.y + world.rng.gen_range(-6.0..6.0),
                        ))
                    });
                    animal.move_target = Some(target);
                    Self::step(&mut animal, target, dt_secs);
                    if animal.position.distance(&target) <= CONTACT_RANGE {
                        animal.move_target = None;
                    }
                }
                world.animals.commit(animal);
                return None;
            }
        }

        // 4. Critical thirst
        if animal.thirst < NEED_CRITICAL {
            let water = match self.cache.get(id, LookupKind::Water, now, ttl) {
                Some(cached) => cached,
                None => {
                    let found = Self::nearest_water(world, position);
                    self.cache.put(id, LookupKind::Water, now, found);
                    found
                }
            };
            if let Some(water_pos) = water {
                if position.distance(&water_pos) <= CONTACT_RANGE + 0.5 {
                    animal.state = AnimalState::Drinking;
                    animal.thirst = (animal.thirst + 30.0 * dt_secs).min(100.0);
                } else {
                    animal.state = AnimalState::SeekingWater;
                    Self::step(&mut animal, water_pos, dt_secs);
                }
                world.animals.commit(animal);
                return None;
            }
        }

        // 5. Reproduction
        let cooldown_ms = (config.reproduction_cooldown_secs * 1000.0) as u64;
        if animal.hunger > NEED_COMFORT
            && animal.thirst > NEED_COMFORT
            && now.saturating_sub(animal.last_reproduced_at) >= cooldown_ms
            && world.animals.count() < config.max_animals
        {
            let mate = world
                .animals
                .query_radius(position, 4.0)
                .into_iter()
                .filter(|other| other != id)
                .filter_map(|other| world.animals.get(&other))
                .find(|other| {
                    other.species == animal.species
                        && now.saturating_sub(other.last_reproduced_at) >= cooldown_ms
                })
                .map(|other| (other.id.clone(), other.genes.clone()));
            if let Some((mate_id, mate_genes)) = mate {
                animal.state = AnimalState::Mating;
                animal.last_reproduced_at = now;
                let genes = Genes::offspring(&animal.genes, &mate_genes, &mut world.rng);
                let species = animal.species;
                let birth_pos = animal.position;
                world.animals.commit(animal);

                if let Some(mut mate) = world.animals.get(&mate_id).cloned() {
                    mate.last_reproduced_at = now;
                    world.animals.commit(mate);
                }

                let child_id = world.next_animal_id();
                world.animals.insert(Animal {
                    id: child_id,
                    species,
                    position: birth_pos,
                    health: species.max_health() * genes.size,
                    genes,
                    hunger: 80.0,
                    thirst: 80.0,
                    age_years: 0.0,
                    state: AnimalState::Idle,
                    move_target: None,
                    last_reproduced_at: now,
                });
                return None;
            }
        }

        // 6. Wander
        let target = match animal.move_target {
            Some(target) if position.distance(&target) > CONTACT_RANGE => target,
            _ => {
                let fresh = world.map.clamp_position(Position::new(
                    position.x + world.rng.gen_range(-8.0..8.0),
                    position.y + world.rng.gen_range(-8.0..8.0),
                ));
                animal.move_target = Some(fresh);
                fresh
            }
        };
        animal.state = AnimalState::Wandering;
        Self::step(&mut animal, target, dt_secs);
        world.animals.commit(animal);
        None
    }
}

impl Default for AnimalSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SimSystem for AnimalSystem {
    fn name(&self) -> &'static str {
        "animals"
    }

    fn update(
        &mut self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        dt_secs: f32,
    ) -> Result<()> {
        let now = world.now();
        let mut deaths = Vec::new();
        for id in world.animals.ids() {
            if let Some(death) = self.decide(world, &id, dt_secs, now) {
                deaths.push(death);
            }
        }
        for (id, cause) in deaths {
            let species = world
                .animals
                .get(&id)
                .map(|animal| animal.species.name().to_string())
                .unwrap_or_default();
            world.animals.remove(&id);
            self.cache.forget(&id);
            world.events.emit(SimulationEvent::AnimalDied {
                animal_id: id,
                species,
                cause,
                timestamp: now,
            });
        }
        Ok(())
    }

    fn on_events(
        &mut self,
        events: &[SimulationEvent],
        world: &mut WorldState,
        _registry: &SystemRegistry,
    ) {
        for event in events {
            if let SimulationEvent::ChunkRendered { chunk_x, chunk_y, .. } = event {
                let config = world.config.animals.clone();
                for _ in 0..config.spawn_per_chunk {
                    if world.animals.count() >= config.max_animals {
                        break;
                    }
                    let base = Position::new(
                        (*chunk_x * crate::world::CHUNK_SIZE as i32) as f32 + 8.0,
                        (*chunk_y * crate::world::CHUNK_SIZE as i32) as f32 + 8.0,
                    );
                    let spot = world.map.find_walkable_near(base, 7, 20, &mut world.rng);
                    if let Some(position) = spot {
                        let species = Self::roll_species(world);
                        Self::spawn_animal(world, species, position);
                    }
                }
            }
        }
    }
}
