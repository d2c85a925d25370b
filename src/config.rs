//! Runtime configuration.
//!
//! Environment variables select ports, log level and the numerical knobs;
//! every knob also lives in a plain struct with a `Default` so tests can pin
//! exactly the values they depend on. Recognized variables:
//!
//! - `TICK_FAST_MS`, `TICK_MEDIUM_MS`, `TICK_SLOW_MS` (positive integers)
//! - `WORLD_SEED` (string or integer)
//! - `MAX_POPULATION`, `MAX_ANIMALS`
//! - `LOG_LEVEL` in {debug, info, warn, error}
//! - `CODEC` in {json, msgpack}
//! - `SOCIETY_SIM_HTTP_PORT`, `SOCIETY_SIM_WS_PORT`

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub const DEFAULT_HTTP_PORT: u16 = 54330;
pub const DEFAULT_WS_PORT: u16 = 54331;

pub const DEFAULT_TICK_FAST_MS: u64 = 50;
pub const DEFAULT_TICK_MEDIUM_MS: u64 = 250;
pub const DEFAULT_TICK_SLOW_MS: u64 = 1000;

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

pub fn resolve_http_port() -> u16 {
    std::env::var("SOCIETY_SIM_HTTP_PORT")
        .or_else(|_| std::env::var("SOCIETY_SIM_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .filter(|port| *port != 0)
        .unwrap_or(DEFAULT_HTTP_PORT)
}

pub fn resolve_ws_port() -> u16 {
    std::env::var("SOCIETY_SIM_WS_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .filter(|port| *port != 0)
        .unwrap_or(DEFAULT_WS_PORT)
}

pub fn resolve_log_level() -> String {
    std::env::var("LOG_LEVEL")
        .ok()
        .filter(|level| matches!(level.as_str(), "debug" | "info" | "warn" | "error"))
        .unwrap_or_else(|| "info".to_string())
}

/// `WORLD_SEED` accepts either an integer or an arbitrary string (hashed)
pub fn resolve_world_seed() -> u64 {
    match std::env::var("WORLD_SEED") {
        Ok(value) => match value.parse::<u64>() {
            Ok(seed) => seed,
            Err(_) => {
                let mut hasher = DefaultHasher::new();
                value.hash(&mut hasher);
                hasher.finish()
            }
        },
        Err(_) => 0x51D3_CAFE,
    }
}

/// Wire codec selection for the WebSocket stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    Json,
    Msgpack,
}

pub fn resolve_codec() -> CodecKind {
    match std::env::var("CODEC").as_deref() {
        Ok("msgpack") => CodecKind::Msgpack,
        _ => CodecKind::Json,
    }
}

// ============================================================================
// TICK RATES
// ============================================================================

/// Target periods for the three scheduler rates, in milliseconds
#[derive(Debug, Clone, Copy)]
pub struct TickRates {
    pub fast_ms: u64,
    pub medium_ms: u64,
    pub slow_ms: u64,
}

impl Default for TickRates {
    fn default() -> Self {
        Self {
            fast_ms: DEFAULT_TICK_FAST_MS,
            medium_ms: DEFAULT_TICK_MEDIUM_MS,
            slow_ms: DEFAULT_TICK_SLOW_MS,
        }
    }
}

impl TickRates {
    pub fn from_env() -> Self {
        Self {
            fast_ms: env_u64("TICK_FAST_MS", DEFAULT_TICK_FAST_MS),
            medium_ms: env_u64("TICK_MEDIUM_MS", DEFAULT_TICK_MEDIUM_MS),
            slow_ms: env_u64("TICK_SLOW_MS", DEFAULT_TICK_SLOW_MS),
        }
    }
}

// ============================================================================
// SUBSYSTEM KNOBS
// ============================================================================

/// Needs decay tuning. Rates are points per second; needs live in [0, 100]
/// with 100 = fully sated.
#[derive(Debug, Clone)]
pub struct NeedsConfig {
    pub hunger_decay: f32,
    pub thirst_decay: f32,
    pub energy_decay: f32,
    pub hygiene_decay: f32,
    pub social_decay: f32,
    pub fun_decay: f32,
    pub mental_decay: f32,
    /// Below this value a need is critical
    pub critical_threshold: f32,
    /// Above this value a critical need counts as recovered
    pub warning_threshold: f32,
    /// Extra decay multiplier for children and elders
    pub child_factor: f32,
    pub elder_factor: f32,
}

impl Default for NeedsConfig {
    fn default() -> Self {
        Self {
            hunger_decay: 0.35,
            thirst_decay: 0.5,
            energy_decay: 0.25,
            hygiene_decay: 0.15,
            social_decay: 0.12,
            fun_decay: 0.1,
            mental_decay: 0.08,
            critical_threshold: 20.0,
            warning_threshold: 35.0,
            child_factor: 1.25,
            elder_factor: 1.15,
        }
    }
}

/// Movement tuning
#[derive(Debug, Clone)]
pub struct MovementConfig {
    pub base_speed: f32,
    /// Distance at which a waypoint counts as reached
    pub arrival_radius: f32,
    /// Fatigue gained per second while moving
    pub fatigue_gain: f32,
    /// Fatigue lost per second while resting
    pub fatigue_decay: f32,
    /// Fraction of speed lost at full fatigue
    pub fatigue_penalty: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            base_speed: 3.0,
            arrival_radius: 0.5,
            fatigue_gain: 0.02,
            fatigue_decay: 0.05,
            fatigue_penalty: 0.5,
        }
    }
}

/// Combat tuning
#[derive(Debug, Clone)]
pub struct CombatConfig {
    /// Engagement radius when no weapon is equipped
    pub unarmed_radius: f32,
    pub base_cooldown_ms: u64,
    /// Random damage jitter amplitude (0 disables jitter)
    pub damage_jitter: f32,
    pub crit_chance: f32,
    pub crit_multiplier: f32,
    /// damage scale = 0.5 + aggression * aggression_damage_scale
    pub aggression_damage_scale: f32,
    /// Affinity at or below which a neighbor counts as hostile
    pub hostility_affinity: f32,
    /// Aggression trait at or above which unprovoked attacks may happen
    pub aggression_threshold: f32,
    /// Chance gate for unprovoked attacks once over the threshold
    pub unprovoked_chance: f32,
    pub combat_log_capacity: usize,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            unarmed_radius: 1.5,
            base_cooldown_ms: 1200,
            damage_jitter: 0.2,
            crit_chance: 0.08,
            crit_multiplier: 1.8,
            aggression_damage_scale: 0.5,
            hostility_affinity: -0.55,
            aggression_threshold: 0.8,
            unprovoked_chance: 0.04,
            combat_log_capacity: 200,
        }
    }
}

/// Social graph tuning. Edges live in [-1, 1].
#[derive(Debug, Clone)]
pub struct SocialConfig {
    pub proximity_radius: f32,
    pub reinforcement_per_second: f32,
    pub decay_per_second: f32,
    /// Affinity at or above which two agents are group candidates
    pub group_threshold: f32,
    /// Seconds the threshold must hold before a group forms
    pub group_window_secs: f32,
    pub min_group_size: usize,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            proximity_radius: 4.0,
            reinforcement_per_second: 0.02,
            decay_per_second: 0.002,
            group_threshold: 0.6,
            group_window_secs: 30.0,
            min_group_size: 3,
        }
    }
}

/// Lifecycle tuning
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub seconds_per_year: f32,
    pub adult_age: f32,
    pub elder_age: f32,
    pub max_age: f32,
    /// Bounded mutation applied to inherited traits
    pub trait_mutation: f32,
    pub max_population: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            seconds_per_year: 30.0,
            adult_age: 16.0,
            elder_age: 60.0,
            max_age: 80.0,
            trait_mutation: 0.1,
            max_population: env_usize("MAX_POPULATION", 500),
        }
    }
}

/// Animal population tuning
#[derive(Debug, Clone)]
pub struct AnimalConfig {
    pub max_animals: usize,
    /// Cell size of the animal spatial grid, in tiles
    pub grid_cell_size: f32,
    /// TTL of the nearest-entity lookup cache, ms
    pub lookup_cache_ttl_ms: u64,
    pub flee_radius: f32,
    pub hunt_radius: f32,
    pub hunger_decay: f32,
    pub thirst_decay: f32,
    pub seconds_per_year: f32,
    pub max_age_years: f32,
    pub reproduction_cooldown_secs: f32,
    pub spawn_per_chunk: usize,
}

impl Default for AnimalConfig {
    fn default() -> Self {
        Self {
            max_animals: env_usize("MAX_ANIMALS", 300),
            grid_cell_size: 16.0,
            lookup_cache_ttl_ms: 500,
            flee_radius: 8.0,
            hunt_radius: 10.0,
            hunger_decay: 0.4,
            thirst_decay: 0.55,
            seconds_per_year: 20.0,
            max_age_years: 12.0,
            reproduction_cooldown_secs: 60.0,
            spawn_per_chunk: 2,
        }
    }
}

/// Economy / production tuning
#[derive(Debug, Clone)]
pub struct EconomyConfig {
    pub base_yield: f32,
    pub max_workers_per_zone: usize,
    pub team_bonus_per_worker: f32,
    /// Stock thresholds for the scarcity factor, as multiples of base stock
    pub scarcity_low_stock: f32,
    pub scarcity_high_stock: f32,
    pub scarcity_low_factor: f32,
    pub scarcity_high_factor: f32,
    pub starting_money: f32,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            base_yield: 2.0,
            max_workers_per_zone: 4,
            team_bonus_per_worker: 0.1,
            scarcity_low_stock: 25.0,
            scarcity_high_stock: 200.0,
            scarcity_low_factor: 1.6,
            scarcity_high_factor: 0.7,
            starting_money: 50.0,
        }
    }
}

/// Building proposal caps
#[derive(Debug, Clone)]
pub struct BuildingConfig {
    pub max_houses: usize,
    pub max_mines: usize,
    pub max_workbenches: usize,
    pub build_time_secs: f32,
}

impl Default for BuildingConfig {
    fn default() -> Self {
        Self {
            max_houses: 12,
            max_mines: 4,
            max_workbenches: 6,
            build_time_secs: 45.0,
        }
    }
}

/// Divine favor tuning
#[derive(Debug, Clone)]
pub struct DivineConfig {
    /// Favor points regenerated per second, gated by stored offerings
    pub power_regen_per_second: f32,
    pub max_power: f32,
    pub blessing_cost: f32,
    pub blessing_duration_secs: f32,
    /// Needs decay multiplier while a lineage is blessed
    pub blessed_decay_modifier: f32,
}

impl Default for DivineConfig {
    fn default() -> Self {
        Self {
            power_regen_per_second: 0.5,
            max_power: 100.0,
            blessing_cost: 40.0,
            blessing_duration_secs: 120.0,
            blessed_decay_modifier: 0.6,
        }
    }
}

/// Task queue tuning
#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub max_tasks_per_agent: usize,
    /// Active-task timeout in ms; 0 disables timeouts
    pub task_timeout_ms: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_tasks_per_agent: 8,
            task_timeout_ms: 30_000,
        }
    }
}

// ============================================================================
// TOP-LEVEL CONFIG
// ============================================================================

/// All simulation knobs in one place
#[derive(Debug, Clone, Default)]
pub struct SimConfig {
    pub rates: TickRates,
    pub needs: NeedsConfig,
    pub movement: MovementConfig,
    pub combat: CombatConfig,
    pub social: SocialConfig,
    pub lifecycle: LifecycleConfig,
    pub animals: AnimalConfig,
    pub economy: EconomyConfig,
    pub building: BuildingConfig,
    pub divine: DivineConfig,
    pub tasks: TaskConfig,
    pub world_seed: u64,
}

impl SimConfig {
    /// Resolve the full config from the environment
    pub fn from_env() -> Self {
        Self {
            rates: TickRates::from_env(),
            world_seed: resolve_world_seed(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rates() {
        let rates = TickRates::default();
        assert_eq!(rates.fast_ms, 50);
        assert_eq!(rates.medium_ms, 250);
        assert_eq!(rates.slow_ms, 1000);
    }

    #[test]
    fn test_thresholds_ordered() {
        let needs = NeedsConfig::default();
        assert!(needs.critical_threshold < needs.warning_threshold);
    }
}
