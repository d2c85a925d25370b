//! Multi-rate tick scheduler.
//!
//! Systems register once with a rate, an enabled flag and an optional
//! minimum-population gate. Each tick of a rate runs preTick (frame clock
//! refresh + spatial index rebuild + chunk:rendered emission), the systems
//! due at that rate in registration order, then postTick (event flush fanned
//! out to subsystem consumers, metrics hook). A failing system is logged and
//! contained; the remaining systems still run.
//!
//! The scheduler itself is synchronous. The embedding runtime drives it from
//! three interval loops serialized behind one mutex; `Simulation::start` is
//! idempotent and `stop` cancels all three loops.

use serde::Serialize;
use std::time::Instant;
use tracing::{debug, error, warn};

use crate::events::SimulationEvent;
use crate::ports::SystemRegistry;
use crate::simulation::state::WorldState;

/// Entity-count cache granularity, ms
const ENTITY_COUNT_TTL_MS: u64 = 500;
/// Fraction of the rate period after which a tick is reported slow
const SLOW_TICK_FRACTION: f64 = 0.8;
/// Bound on flush passes per postTick; consumers emitting at each other
/// indefinitely would otherwise spin forever
const MAX_FLUSH_PASSES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickRate {
    Fast,
    Medium,
    Slow,
}

impl TickRate {
    pub const ALL: [TickRate; 3] = [TickRate::Fast, TickRate::Medium, TickRate::Slow];

    pub fn index(&self) -> usize {
        match self {
            TickRate::Fast => 0,
            TickRate::Medium => 1,
            TickRate::Slow => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TickRate::Fast => "fast",
            TickRate::Medium => "medium",
            TickRate::Slow => "slow",
        }
    }
}

/// One registered subsystem
pub trait SimSystem: Send {
    fn name(&self) -> &'static str;

    fn update(
        &mut self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        dt_secs: f32,
    ) -> crate::errors::Result<()>;

    /// Delivered after every postTick flush, in registration order, with the
    /// store fully committed. Default: ignore.
    fn on_events(
        &mut self,
        _events: &[SimulationEvent],
        _world: &mut WorldState,
        _registry: &SystemRegistry,
    ) {
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SystemConfig {
    pub enabled: bool,
    /// Skip the update while the agent population is below this
    pub min_entities: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_entities: 0,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SystemStats {
    pub runs: u64,
    pub skips: u64,
    pub errors: u64,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RateStats {
    pub ticks: u64,
    pub total_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
    pub slow_ticks: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemOverview {
    pub name: &'static str,
    pub rate: TickRate,
    pub enabled: bool,
    pub min_entities: usize,
    pub stats: SystemStats,
}

struct RegisteredSystem {
    rate: TickRate,
    config: SystemConfig,
    system: Box<dyn SimSystem>,
    stats: SystemStats,
}

pub struct Scheduler {
    systems: Vec<RegisteredSystem>,
    periods_ms: [u64; 3],
    last_tick_at: [Option<u64>; 3],
    rate_stats: [RateStats; 3],
    entity_count: usize,
    entity_count_sampled_at: Option<u64>,
}

impl Scheduler {
    pub fn new(periods_ms: [u64; 3]) -> Self {
        Self {
            systems: Vec::new(),
            periods_ms,
            last_tick_at: [None; 3],
            rate_stats: Default::default(),
            entity_count: 0,
            entity_count_sampled_at: None,
        }
    }

    pub fn period_ms(&self, rate: TickRate) -> u64 {
        self.periods_ms[rate.index()]
    }

    /// Register a system at a rate. Execution follows registration order.
    pub fn register(&mut self, rate: TickRate, config: SystemConfig, system: Box<dyn SimSystem>) {
        debug!(
            "registered system '{}' at {} rate (enabled: {}, min_entities: {})",
            system.name(),
            rate.label(),
            config.enabled,
            config.min_entities
        );
        self.systems.push(RegisteredSystem {
            rate,
            config,
            system,
            stats: SystemStats::default(),
        });
    }

    /// Toggle any registered system by name. Returns false if unknown.
    pub fn set_system_enabled(&mut self, name: &str, enabled: bool) -> bool {
        for entry in &mut self.systems {
            if entry.system.name() == name {
                entry.config.enabled = enabled;
                return true;
            }
        }
        false
    }

    pub fn rate_stats(&self, rate: TickRate) -> &RateStats {
        &self.rate_stats[rate.index()]
    }

    pub fn systems_overview(&self) -> Vec<SystemOverview> {
        self.systems
            .iter()
            .map(|entry| SystemOverview {
                name: entry.system.name(),
                rate: entry.rate,
                enabled: entry.config.enabled,
                min_entities: entry.config.min_entities,
                stats: entry.stats.clone(),
            })
            .collect()
    }

    /// Run one tick of the given rate
    pub fn tick(&mut self, rate: TickRate, world: &mut WorldState, registry: &SystemRegistry) {
        let started = Instant::now();
        let period = self.periods_ms[rate.index()];

        // ── preTick ──────────────────────────────────────────────────────
        world.clock.update_frame_time();
        let now = world.now();

        let dt_secs = {
            let previous = self.last_tick_at[rate.index()];
            self.last_tick_at[rate.index()] = Some(now);
            let raw_ms = previous.map(|prev| now.saturating_sub(prev)).unwrap_or(period);
            // Cap runaway deltas after long stalls
            (raw_ms.min(period * 5) as f32) / 1000.0
        };

        world.rebuild_spatial_index();
        for (cx, cy) in world.map.drain_rendered() {
            world.events.emit(SimulationEvent::ChunkRendered {
                chunk_x: cx,
                chunk_y: cy,
                timestamp: now,
            });
        }

        let stale = self
            .entity_count_sampled_at
            .map(|at| now.saturating_sub(at) > ENTITY_COUNT_TTL_MS)
            .unwrap_or(true);
        if stale {
            self.entity_count = world.store.agent_count();
            self.entity_count_sampled_at = Some(now);
        }

        // ── Systems at this rate, registration order ─────────────────────
        for entry in &mut self.systems {
            if entry.rate != rate {
                continue;
            }
            if !entry.config.enabled {
                continue;
            }
            if self.entity_count < entry.config.min_entities {
                entry.stats.skips += 1;
                continue;
            }
            entry.stats.runs += 1;
            if let Err(err) = entry.system.update(world, registry, dt_secs) {
                entry.stats.errors += 1;
                error!(
                    "system '{}' failed during {} tick: {}",
                    entry.system.name(),
                    rate.label(),
                    err
                );
            }
        }

        // ── postTick ─────────────────────────────────────────────────────
        self.flush_and_fan_out(world, registry);

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let stats = &mut self.rate_stats[rate.index()];
        stats.ticks += 1;
        stats.total_ms += elapsed_ms;
        stats.avg_ms = stats.total_ms / stats.ticks as f64;
        if elapsed_ms > stats.max_ms {
            stats.max_ms = elapsed_ms;
        }
        if elapsed_ms > period as f64 * SLOW_TICK_FRACTION {
            stats.slow_ticks += 1;
            warn!(
                "slow {} tick: {:.2}ms (period {}ms)",
                rate.label(),
                elapsed_ms,
                period
            );
        }
    }

    /// Flush the event queue and hand each batch to every system, repeating
    /// while consumers emit follow-up events (bounded).
    fn flush_and_fan_out(&mut self, world: &mut WorldState, registry: &SystemRegistry) {
        for pass in 0..MAX_FLUSH_PASSES {
            let batch = world.events.flush_events();
            if batch.is_empty() {
                break;
            }
            for entry in &mut self.systems {
                entry.system.on_events(&batch, world, registry);
            }
            if pass + 1 == MAX_FLUSH_PASSES && world.events.queue_size() > 0 {
                warn!(
                    "event flush stopped after {} passes with {} events still queued",
                    MAX_FLUSH_PASSES,
                    world.events.queue_size()
                );
                world.events.clear_queue();
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{Component, Health};
    use crate::config::SimConfig;
    use crate::errors::SimulatorError;
    use crate::types::AgentId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSystem {
        name: &'static str,
        runs: Arc<AtomicUsize>,
        fail: bool,
    }

    impl SimSystem for CountingSystem {
        fn name(&self) -> &'static str {
            self.name
        }

        fn update(
            &mut self,
            _world: &mut WorldState,
            _registry: &SystemRegistry,
            _dt: f32,
        ) -> crate::errors::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SimulatorError::system("intentional"));
            }
            Ok(())
        }
    }

    fn world() -> (WorldState, SystemRegistry) {
        (WorldState::for_tests(SimConfig::default()), SystemRegistry::new())
    }

    fn counting(name: &'static str) -> (CountingSystem, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        (
            CountingSystem {
                name,
                runs: runs.clone(),
                fail: false,
            },
            runs,
        )
    }

    #[test]
    fn test_only_matching_rate_runs() {
        let (mut world, registry) = world();
        let mut scheduler = Scheduler::new([50, 250, 1000]);
        let (fast, fast_runs) = counting("fast-system");
        let (slow, slow_runs) = counting("slow-system");
        scheduler.register(TickRate::Fast, SystemConfig::default(), Box::new(fast));
        scheduler.register(TickRate::Slow, SystemConfig::default(), Box::new(slow));

        scheduler.tick(TickRate::Fast, &mut world, &registry);
        assert_eq!(fast_runs.load(Ordering::SeqCst), 1);
        assert_eq!(slow_runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_min_entities_gate() {
        let (mut world, registry) = world();
        let mut scheduler = Scheduler::new([50, 250, 1000]);
        let (gated, gated_runs) = counting("gated");
        scheduler.register(
            TickRate::Fast,
            SystemConfig {
                enabled: true,
                min_entities: 2,
            },
            Box::new(gated),
        );

        scheduler.tick(TickRate::Fast, &mut world, &registry);
        assert_eq!(gated_runs.load(Ordering::SeqCst), 0, "below gate: skipped");

        for i in 0..2 {
            world
                .store
                .register_agent(
                    AgentId::new(format!("agent-{}", i)),
                    vec![Component::Health(Health::new(10.0))],
                )
                .unwrap();
        }
        // Force the entity-count cache to refresh
        world.clock.advance(600);
        scheduler.tick(TickRate::Fast, &mut world, &registry);
        assert_eq!(gated_runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disabled_system_skipped() {
        let (mut world, registry) = world();
        let mut scheduler = Scheduler::new([50, 250, 1000]);
        let (system, runs) = counting("toggle-me");
        scheduler.register(TickRate::Medium, SystemConfig::default(), Box::new(system));

        assert!(scheduler.set_system_enabled("toggle-me", false));
        scheduler.tick(TickRate::Medium, &mut world, &registry);
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        assert!(scheduler.set_system_enabled("toggle-me", true));
        scheduler.tick(TickRate::Medium, &mut world, &registry);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        assert!(!scheduler.set_system_enabled("no-such-system", true));
    }

    #[test]
    fn test_failing_system_does_not_stop_later_systems() {
        let (mut world, registry) = world();
        let mut scheduler = Scheduler::new([50, 250, 1000]);
        let bad_runs = Arc::new(AtomicUsize::new(0));
        scheduler.register(
            TickRate::Fast,
            SystemConfig::default(),
            Box::new(CountingSystem {
                name: "bad",
                runs: bad_runs.clone(),
                fail: true,
            }),
        );
        let (good, good_runs) = counting("good");
        scheduler.register(TickRate::Fast, SystemConfig::default(), Box::new(good));

        scheduler.tick(TickRate::Fast, &mut world, &registry);
        assert_eq!(bad_runs.load(Ordering::SeqCst), 1);
        assert_eq!(good_runs.load(Ordering::SeqCst), 1, "good system still ran");

        let overview = scheduler.systems_overview();
        let bad = overview.iter().find(|s| s.name == "bad").unwrap();
        assert_eq!(bad.stats.errors, 1);
    }

    #[test]
    fn test_event_queue_empty_after_tick() {
        let (mut world, registry) = world();
        let mut scheduler = Scheduler::new([50, 250, 1000]);

        world.events.emit(SimulationEvent::ChunkRendered {
            chunk_x: 0,
            chunk_y: 0,
            timestamp: 0,
        });
        scheduler.tick(TickRate::Fast, &mut world, &registry);
        assert_eq!(world.events.queue_size(), 0);
    }

    #[test]
    fn test_stats_accumulate() {
        let (mut world, registry) = world();
        let mut scheduler = Scheduler::new([50, 250, 1000]);
        for _ in 0..3 {
            world.clock.advance(50);
            scheduler.tick(TickRate::Fast, &mut world, &registry);
        }
        let stats = scheduler.rate_stats(TickRate::Fast);
        assert_eq!(stats.ticks, 3);
        assert!(stats.avg_ms >= 0.0);
    }
}
