//! Metrics collector: periodic aggregate sampling.
//!
//! Polled after ticks at a low cadence. Strictly an observer: it reads the
//! world and the scheduler, never mutates either. The latest sample backs
//! `GET /world/stats`.

use serde::Serialize;
use tracing::info;

use crate::simulation::scheduler::{RateStats, Scheduler, SystemOverview, TickRate};
use crate::simulation::state::WorldState;

/// Default sampling cadence, ms
const SAMPLE_INTERVAL_MS: u64 = 5_000;

#[derive(Debug, Clone, Serialize)]
pub struct RateSample {
    pub rate: TickRate,
    pub period_ms: u64,
    pub stats: RateStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSample {
    pub timestamp: u64,
    pub agents: usize,
    pub alive_agents: usize,
    pub animals: usize,
    pub zones: usize,
    pub chunks: usize,
    pub lineages: usize,
    pub groups: usize,
    pub total_events: u64,
    pub active_tasks: usize,
    pub total_inventory_items: u64,
    pub combat_log_entries: usize,
    pub rates: Vec<RateSample>,
    pub systems: Vec<SystemOverview>,
}

pub struct MetricsCollector {
    interval_ms: u64,
    last_sample_at: Option<u64>,
    latest: Option<MetricsSample>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            interval_ms: SAMPLE_INTERVAL_MS,
            last_sample_at: None,
            latest: None,
        }
    }

    pub fn latest(&self) -> Option<&MetricsSample> {
        self.latest.as_ref()
    }

    /// Take a sample if the interval elapsed. Returns true when sampled.
    pub fn maybe_sample(&mut self, world: &mut WorldState, scheduler: &Scheduler) -> bool {
        let now = world.now();
        let due = self
            .last_sample_at
            .map(|at| now.saturating_sub(at) >= self.interval_ms)
            .unwrap_or(true);
        if !due {
            return false;
        }
        self.last_sample_at = Some(now);
        self.latest = Some(Self::sample(world, scheduler, now));

        if let Some(sample) = &self.latest {
            info!(
                "metrics: {} agents ({} alive), {} animals, {} events, fast avg {:.2}ms",
                sample.agents,
                sample.alive_agents,
                sample.animals,
                sample.total_events,
                sample
                    .rates
                    .first()
                    .map(|rate| rate.stats.avg_ms)
                    .unwrap_or(0.0)
            );
        }
        true
    }

    fn sample(world: &mut WorldState, scheduler: &Scheduler, now: u64) -> MetricsSample {
        let total_inventory_items: u64 = world
            .store
            .all_agent_ids()
            .iter()
            .filter_map(|id| world.store.inventory(id))
            .flat_map(|inventory| inventory.items.values())
            .map(|stack| stack.quantity as u64)
            .sum();

        MetricsSample {
            timestamp: now,
            agents: world.store.agent_count(),
            alive_agents: world.store.alive_agents().len(),
            animals: world.animals.count(),
            zones: world.map.zone_count(),
            chunks: world.map.chunk_count(),
            lineages: world.genealogy.lineage_count(),
            groups: world.groups.group_count(),
            total_events: world.events.total_events(),
            active_tasks: world.tasks.total_active(),
            total_inventory_items,
            combat_log_entries: world.combat_log.len(),
            rates: TickRate::ALL
                .iter()
                .map(|rate| RateSample {
                    rate: *rate,
                    period_ms: scheduler.period_ms(*rate),
                    stats: scheduler.rate_stats(*rate).clone(),
                })
                .collect(),
            systems: scheduler.systems_overview(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::ports::SystemRegistry;

    #[test]
    fn test_sampling_respects_interval() {
        let mut world = WorldState::for_tests(SimConfig::default());
        let scheduler = Scheduler::new([50, 250, 1000]);
        let mut metrics = MetricsCollector::new();

        assert!(metrics.maybe_sample(&mut world, &scheduler), "first sample is immediate");
        assert!(!metrics.maybe_sample(&mut world, &scheduler), "too soon");

        world.clock.advance(SAMPLE_INTERVAL_MS + 1);
        assert!(metrics.maybe_sample(&mut world, &scheduler));
        assert!(metrics.latest().is_some());
    }

    #[test]
    fn test_sample_is_pure_observation() {
        let mut world = WorldState::for_tests(SimConfig::default());
        let mut scheduler = Scheduler::new([50, 250, 1000]);
        let registry = SystemRegistry::new();
        scheduler.tick(TickRate::Fast, &mut world, &registry);
        let events_before = world.events.total_events();
        let agents_before = world.store.agent_count();

        let mut metrics = MetricsCollector::new();
        metrics.maybe_sample(&mut world, &scheduler);

        assert_eq!(world.events.total_events(), events_before);
        assert_eq!(world.store.agent_count(), agents_before);
        let sample = metrics.latest().unwrap();
        assert_eq!(sample.agents, 0);
        assert_eq!(sample.rates.len(), 3);
    }
}
