//! Simulation assembly: world state + port registry + scheduler + metrics.
//!
//! `Simulation::new` wires every subsystem into the scheduler at its rate
//! and registers every port implementation. The embedding runtime drives
//! `tick` from three interval loops serialized behind one mutex; `start` is
//! idempotent and `stop` halts ticking without tearing anything down.

pub mod clock;
pub mod scheduler;
pub mod state;

pub use clock::FrameClock;
pub use scheduler::{Scheduler, SimSystem, SystemConfig, TickRate};
pub use state::WorldState;

use serde::Deserialize;
use tracing::info;

use crate::agents::{Task, TaskTarget, TaskType};
use crate::config::SimConfig;
use crate::errors::{Result, SimulatorError};
use crate::metrics::MetricsCollector;
use crate::ports::{SpawnSpec, SystemRegistry};
use crate::snapshot::{self, WorldSnapshot};
use crate::types::{AgentId, Position, ZoneId};

/// Priority used for externally issued orders
const ORDER_PRIORITY: i32 = 80;

/// An externally issued agent order, as received by the admin surface
#[derive(Debug, Clone, Deserialize)]
pub struct OrderSpec {
    pub task: String,
    #[serde(default)]
    pub x: Option<f32>,
    #[serde(default)]
    pub y: Option<f32>,
    #[serde(default)]
    pub zone_id: Option<String>,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub item: Option<String>,
}

pub struct Simulation {
    pub world: WorldState,
    pub registry: SystemRegistry,
    pub scheduler: Scheduler,
    pub metrics: MetricsCollector,
    running: bool,
}

impl Simulation {
    pub fn new(config: SimConfig) -> Self {
        Self::assemble(WorldState::new(config))
    }

    /// Deterministic simulation for tests: manual clock, fixed seed
    pub fn for_tests(config: SimConfig) -> Self {
        Self::assemble(WorldState::for_tests(config))
    }

    fn assemble(world: WorldState) -> Self {
        let periods = [
            world.config.rates.fast_ms,
            world.config.rates.medium_ms,
            world.config.rates.slow_ms,
        ];
        let mut registry = SystemRegistry::new();
        registry.register_movement(Box::new(
            crate::systems::movement::MovementPortImpl::default(),
        ));
        registry.register_needs(Box::new(crate::systems::needs::NeedsPortImpl));
        registry.register_inventory(Box::new(crate::systems::inventory::InventoryPortImpl));
        registry.register_combat(Box::new(crate::systems::combat::CombatPortImpl));
        registry.register_social(Box::new(crate::systems::social::SocialPortImpl));
        registry.register_lifecycle(Box::new(crate::systems::lifecycle::LifecyclePortImpl));
        registry.register_crafting(Box::new(crate::systems::recipes::CraftingPortImpl));
        registry.register_building(Box::new(crate::systems::building::BuildingPortImpl));
        registry.register_trade(Box::new(crate::systems::economy::TradePortImpl));
        registry.register_animals(Box::new(crate::systems::animals::AnimalsPortImpl));
        registry.register_divine(Box::new(crate::systems::divine::DivinePortImpl));
        registry.register_equipment(Box::new(crate::systems::equipment::EquipmentPortImpl));

        let mut scheduler = Scheduler::new(periods);
        let default = SystemConfig::default;

        // FAST: the hot paths
        scheduler.register(
            TickRate::Fast,
            default(),
            Box::new(crate::systems::movement::MovementSystem),
        );

        // MEDIUM: behavior and interaction
        scheduler.register(
            TickRate::Medium,
            default(),
            Box::new(crate::systems::needs::NeedsSystem::new()),
        );
        scheduler.register(
            TickRate::Medium,
            default(),
            Box::new(crate::systems::decision::DecisionSystem),
        );
        scheduler.register(
            TickRate::Medium,
            SystemConfig {
                enabled: true,
                min_entities: 2,
            },
            Box::new(crate::systems::combat::CombatSystem),
        );
        scheduler.register(
            TickRate::Medium,
            SystemConfig {
                enabled: true,
                min_entities: 2,
            },
            Box::new(crate::systems::social::SocialSystem),
        );
        scheduler.register(
            TickRate::Medium,
            default(),
            Box::new(crate::systems::animals::AnimalSystem::new()),
        );

        // SLOW: population, economy and everything emergent
        scheduler.register(
            TickRate::Slow,
            default(),
            Box::new(crate::systems::lifecycle::LifecycleSystem),
        );
        scheduler.register(
            TickRate::Slow,
            default(),
            Box::new(crate::systems::production::ProductionSystem::new()),
        );
        scheduler.register(
            TickRate::Slow,
            default(),
            Box::new(crate::systems::economy::EconomySystem::new()),
        );
        scheduler.register(
            TickRate::Slow,
            default(),
            Box::new(crate::systems::economy::MarketSystem::new()),
        );
        scheduler.register(
            TickRate::Slow,
            default(),
            Box::new(crate::systems::building::BuildingSystem),
        );
        scheduler.register(
            TickRate::Slow,
            default(),
            Box::new(crate::systems::equipment::EquipmentSystem),
        );
        scheduler.register(
            TickRate::Slow,
            default(),
            Box::new(crate::systems::recipes::RecipeDiscoverySystem),
        );
        scheduler.register(
            TickRate::Slow,
            SystemConfig {
                enabled: true,
                min_entities: 3,
            },
            Box::new(crate::systems::emergence::EmergenceSystem),
        );
        scheduler.register(
            TickRate::Slow,
            default(),
            Box::new(crate::systems::governance::GovernanceSystem),
        );
        scheduler.register(
            TickRate::Slow,
            default(),
            Box::new(crate::systems::divine::DivineFavorSystem),
        );
        scheduler.register(
            TickRate::Slow,
            default(),
            Box::new(crate::systems::conflict::ConflictResolutionSystem::new()),
        );
        scheduler.register(
            TickRate::Slow,
            default(),
            Box::new(crate::systems::genealogy::GenealogySystem),
        );
        scheduler.register(
            TickRate::Slow,
            default(),
            Box::new(crate::systems::inventory::InventorySystem),
        );

        Self {
            world,
            registry,
            scheduler,
            metrics: MetricsCollector::new(),
            running: false,
        }
    }

    // ── Control ──────────────────────────────────────────────────────────

    pub fn start(&mut self) {
        if !self.running {
            info!("simulation started");
        }
        self.running = true;
    }

    pub fn stop(&mut self) {
        if self.running {
            info!("simulation stopped");
        }
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Run one tick of a rate. Used by the interval loops and by manual
    /// stepping; stepping works even while stopped.
    pub fn tick(&mut self, rate: TickRate) {
        self.scheduler.tick(rate, &mut self.world, &self.registry);
        self.metrics.maybe_sample(&mut self.world, &self.scheduler);
    }

    /// One tick of every rate, fast to slow
    pub fn step(&mut self) {
        for rate in TickRate::ALL {
            self.tick(rate);
        }
    }

    // ── Bootstrap ────────────────────────────────────────────────────────

    /// Starter settlement: default zones, a tool pool, and `population`
    /// adult agents around the origin.
    pub fn seed_world(&mut self, population: usize) -> Result<()> {
        self.world.map.seed_default_zones();
        self.world.equipment.add_tools("hoe", 4);
        self.world.equipment.add_tools("axe", 4);
        self.world.equipment.add_tools("spear", 2);

        for _ in 0..population {
            let age_years = 18.0 + self.world.rng_range_f32(0.0..30.0);
            self.spawn_agent(SpawnSpec {
                age_years,
                ..SpawnSpec::default()
            })?;
        }
        info!("seeded world with {} agents", population);
        Ok(())
    }

    // ── Admin surface ────────────────────────────────────────────────────

    pub fn spawn_agent(&mut self, spec: SpawnSpec) -> Result<AgentId> {
        let lifecycle = self
            .registry
            .lifecycle()
            .ok_or_else(|| SimulatorError::system("lifecycle capability unavailable"))?;
        lifecycle.spawn_agent(&mut self.world, &self.registry, spec)
    }

    pub fn remove_agent(&mut self, agent_id: &AgentId, reason: &str) -> Result<()> {
        let lifecycle = self
            .registry
            .lifecycle()
            .ok_or_else(|| SimulatorError::system("lifecycle capability unavailable"))?;
        let result = lifecycle.remove_agent(&mut self.world, &self.registry, agent_id, reason);
        if result.is_failure() {
            return Err(SimulatorError::not_found(
                result.message.unwrap_or_else(|| "removal failed".to_string()),
            ));
        }
        Ok(())
    }

    pub fn issue_order(&mut self, agent_id: &AgentId, order: &OrderSpec) -> Result<String> {
        let now = self.world.now();
        let (task_type, target) = match order.task.as_str() {
            "move_to" => {
                let (x, y) = match (order.x, order.y) {
                    (Some(x), Some(y)) => (x, y),
                    _ => {
                        return Err(SimulatorError::invariant("move_to order needs x and y"));
                    }
                };
                (TaskType::MoveTo, Some(TaskTarget::Position(Position::new(x, y))))
            }
            "eat" => (TaskType::Eat, None),
            "drink" => (TaskType::Drink, None),
            "rest" => (TaskType::Rest, None),
            "work" => (TaskType::Work, None),
            "wander" => (TaskType::Wander, None),
            "socialize" => (TaskType::Socialize, None),
            "deliver" => (TaskType::Deliver, None),
            "craft" => {
                let item = order
                    .item
                    .clone()
                    .ok_or_else(|| SimulatorError::invariant("craft order needs an item"))?;
                (TaskType::Craft, Some(TaskTarget::Item(item)))
            }
            "attack" => {
                let target = order
                    .target_id
                    .clone()
                    .ok_or_else(|| SimulatorError::invariant("attack order needs target_id"))?;
                (TaskType::Attack, Some(TaskTarget::Agent(AgentId::new(target))))
            }
            "build" => {
                let zone = order
                    .zone_id
                    .clone()
                    .ok_or_else(|| SimulatorError::invariant("build order needs zone_id"))?;
                (TaskType::Build, Some(TaskTarget::Zone(ZoneId::new(zone))))
            }
            other => {
                return Err(SimulatorError::invariant(format!("unknown order '{}'", other)));
            }
        };

        let task = Task::new(task_type, target, now);
        let task_id = self
            .world
            .enqueue_task(agent_id, task, ORDER_PRIORITY)?
            .ok_or_else(|| SimulatorError::task("order dropped: task queue full"))?;
        Ok(task_id)
    }

    // ── Snapshots ────────────────────────────────────────────────────────

    pub fn export_snapshot(&self, name: &str) -> WorldSnapshot {
        snapshot::export_snapshot(&self.world, name)
    }

    pub fn import_snapshot(&mut self, data: &WorldSnapshot) -> Result<()> {
        snapshot::import_snapshot(&mut self.world, data)
    }

    /// Stats payload for `GET /world/stats`
    pub fn stats_json(&self) -> serde_json::Value {
        serde_json::json!({
            "running": self.running,
            "metrics": self.metrics.latest(),
        })
    }
}

impl WorldState {
    /// Small convenience used during seeding
    fn rng_range_f32(&mut self, range: std::ops::Range<f32>) -> f32 {
        use rand::Rng;
        self.rng.gen_range(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_simulation_ticks_cleanly() {
        let mut sim = Simulation::for_tests(SimConfig::default());
        sim.seed_world(5).unwrap();
        assert_eq!(sim.world.store.agent_count(), 5);

        for _ in 0..20 {
            sim.world.clock.advance(250);
            sim.step();
        }
        assert_eq!(sim.world.events.queue_size(), 0, "queue drained every tick");
        assert_eq!(sim.world.store.agent_count(), 5);
    }

    #[test]
    fn test_start_stop_idempotent() {
        let mut sim = Simulation::for_tests(SimConfig::default());
        assert!(!sim.is_running());
        sim.start();
        sim.start();
        assert!(sim.is_running());
        sim.stop();
        sim.stop();
        assert!(!sim.is_running());
    }

    #[test]
    fn test_issue_order_enqueues() {
        let mut sim = Simulation::for_tests(SimConfig::default());
        sim.seed_world(1).unwrap();
        let agent = sim.world.store.all_agent_ids()[0].clone();

        let order = OrderSpec {
            task: "move_to".to_string(),
            x: Some(10.0),
            y: Some(5.0),
            zone_id: None,
            target_id: None,
            item: None,
        };
        let task_id = sim.issue_order(&agent, &order).unwrap();
        assert!(task_id.starts_with("task-"));
        assert!(sim.world.tasks.has_task_of_type(&agent, TaskType::MoveTo));

        let bad = OrderSpec {
            task: "fly".to_string(),
            x: None,
            y: None,
            zone_id: None,
            target_id: None,
            item: None,
        };
        assert!(sim.issue_order(&agent, &bad).is_err());
    }

    #[test]
    fn test_remove_agent_via_facade() {
        let mut sim = Simulation::for_tests(SimConfig::default());
        sim.seed_world(2).unwrap();
        let agent = sim.world.store.all_agent_ids()[0].clone();

        sim.remove_agent(&agent, "admin").unwrap();
        assert!(!sim.world.store.has_agent(&agent));
        assert!(sim.remove_agent(&agent, "admin").is_err());
    }

    #[test]
    fn test_snapshot_through_facade() {
        let mut sim = Simulation::for_tests(SimConfig::default());
        sim.seed_world(3).unwrap();
        let snapshot = sim.export_snapshot("facade");

        let mut other = Simulation::for_tests(SimConfig::default());
        other.import_snapshot(&snapshot).unwrap();
        assert_eq!(other.world.store.agent_count(), 3);
    }
}
