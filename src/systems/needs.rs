//! Needs decay and satisfaction.
//!
//! Every alive agent's needs decay each MEDIUM tick, scaled by life stage
//! and by the divine modifier of its lineage. Crossing below the critical
//! threshold emits `needs:critical` exactly once until the need recovers
//! above the warning threshold, which emits `needs:recovered`. Hunger or
//! thirst hitting zero marks the agent for death; Lifecycle removes it.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::agents::{LifeStage, NeedKind};
use crate::errors::Result;
use crate::events::SimulationEvent;
use crate::ports::{HandlerResult, NeedsPort, SystemRegistry};
use crate::simulation::scheduler::SimSystem;
use crate::simulation::state::WorldState;
use crate::types::AgentId;

/// Needs below this level start dragging other needs down
const CROSS_EFFECT_THRESHOLD: f32 = 25.0;
/// Seconds a need must stay low before cross-effects kick in
const CROSS_EFFECT_DELAY_SECS: f32 = 10.0;
/// Extra decay applied by an active cross-effect, points per second
const CROSS_EFFECT_RATE: f32 = 0.2;

/// Raise a need by `amount` (clamped). The edge-triggered recovery event is
/// emitted by the next needs tick once the value crosses the warning line.
pub fn satisfy_need(
    world: &mut WorldState,
    agent_id: &AgentId,
    kind: NeedKind,
    amount: f32,
) -> Result<()> {
    let mut needs = world
        .store
        .needs(agent_id)
        .cloned()
        .ok_or_else(|| crate::errors::SimulatorError::not_found(format!("no needs for {}", agent_id)))?;
    needs.change(kind, amount);
    world.store.set_needs(agent_id, needs)?;
    Ok(())
}

pub struct NeedsSystem {
    /// Needs currently flagged critical, per agent (edge triggering)
    critical: HashMap<AgentId, HashSet<NeedKind>>,
    /// Seconds each agent's energy / hygiene has stayed low
    low_energy_secs: HashMap<AgentId, f32>,
    low_hygiene_secs: HashMap<AgentId, f32>,
}

impl NeedsSystem {
    pub fn new() -> Self {
        Self {
            critical: HashMap::new(),
            low_energy_secs: HashMap::new(),
            low_hygiene_secs: HashMap::new(),
        }
    }

    fn decay_rate(world: &WorldState, kind: NeedKind) -> f32 {
        let needs = &world.config.needs;
        match kind {
            NeedKind::Hunger => needs.hunger_decay,
            NeedKind::Thirst => needs.thirst_decay,
            NeedKind::Energy => needs.energy_decay,
            NeedKind::Hygiene => needs.hygiene_decay,
            NeedKind::Social => needs.social_decay,
            NeedKind::Fun => needs.fun_decay,
            NeedKind::MentalHealth => needs.mental_decay,
        }
    }
}

impl Default for NeedsSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SimSystem for NeedsSystem {
    fn name(&self) -> &'static str {
        "needs"
    }

    fn update(
        &mut self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        dt_secs: f32,
    ) -> Result<()> {
        let now = world.now();
        let critical_line = world.config.needs.critical_threshold;
        let warning_line = world.config.needs.warning_threshold;

        for agent_id in world.store.alive_agents() {
            let Some(needs) = world.store.needs(&agent_id) else {
                continue;
            };
            let mut needs = needs.clone();

            let (stage_factor, immortal, lineage) = match world.store.profile(&agent_id) {
                Some(profile) => {
                    let factor = match profile.life_stage {
                        LifeStage::Child => world.config.needs.child_factor,
                        LifeStage::Adult => 1.0,
                        LifeStage::Elder => world.config.needs.elder_factor,
                    };
                    let lineage = world
                        .store
                        .social(&agent_id)
                        .and_then(|social| social.family_id.clone());
                    (factor, profile.immortal, lineage)
                }
                None => (1.0, false, None),
            };

            let divine_modifier = registry
                .divine()
                .map(|port| port.need_decay_modifier(world, lineage.as_ref()))
                .unwrap_or(1.0);

            for kind in NeedKind::ALL {
                let rate = Self::decay_rate(world, kind);
                needs.change(kind, -(rate * dt_secs * stage_factor * divine_modifier));
            }

            // Cross-effects: sustained exhaustion erodes social, fun and
            // mental health; sustained poor hygiene erodes mental health.
            let energy_low = needs.energy < CROSS_EFFECT_THRESHOLD;
            let energy_secs = self.low_energy_secs.entry(agent_id.clone()).or_insert(0.0);
            *energy_secs = if energy_low { *energy_secs + dt_secs } else { 0.0 };
            if *energy_secs > CROSS_EFFECT_DELAY_SECS {
                let drag = CROSS_EFFECT_RATE * dt_secs;
                needs.change(NeedKind::Social, -drag);
                needs.change(NeedKind::Fun, -drag);
                needs.change(NeedKind::MentalHealth, -drag);
            }

            let hygiene_low = needs.hygiene < CROSS_EFFECT_THRESHOLD;
            let hygiene_secs = self.low_hygiene_secs.entry(agent_id.clone()).or_insert(0.0);
            *hygiene_secs = if hygiene_low { *hygiene_secs + dt_secs } else { 0.0 };
            if *hygiene_secs > CROSS_EFFECT_DELAY_SECS {
                needs.change(NeedKind::MentalHealth, -(CROSS_EFFECT_RATE * dt_secs));
            }

            // Edge-triggered critical / recovered events
            let flags = self.critical.entry(agent_id.clone()).or_default();
            for kind in NeedKind::ALL {
                let value = needs.get(kind);
                if value < critical_line && !flags.contains(&kind) {
                    flags.insert(kind);
                    world.events.emit(SimulationEvent::NeedsCritical {
                        agent_id: agent_id.clone(),
                        need_type: kind.name().to_string(),
                        value,
                        timestamp: now,
                    });
                } else if value > warning_line && flags.contains(&kind) {
                    flags.remove(&kind);
                    world.events.emit(SimulationEvent::NeedsRecovered {
                        agent_id: agent_id.clone(),
                        need_type: kind.name().to_string(),
                        value,
                        timestamp: now,
                    });
                }
            }

            let starved = needs.hunger <= 0.0 || needs.thirst <= 0.0;
            world.store.set_needs(&agent_id, needs)?;

            if starved && !immortal {
                if let Some(health) = world.store.health(&agent_id) {
                    if !health.is_dead {
                        debug!("agent {} starved, marking for death", agent_id);
                        let mut health = health.clone();
                        health.apply_damage(health.max, now);
                        world.store.set_health(&agent_id, health)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn on_events(
        &mut self,
        events: &[SimulationEvent],
        _world: &mut WorldState,
        _registry: &SystemRegistry,
    ) {
        for event in events {
            if let SimulationEvent::AgentRemoved { agent_id, .. } = event {
                self.critical.remove(agent_id);
                self.low_energy_secs.remove(agent_id);
                self.low_hygiene_secs.remove(agent_id);
            }
        }
    }
}

// ============================================================================
// PORT
// ============================================================================

pub struct NeedsPortImpl;

impl NeedsPort for NeedsPortImpl {
    fn satisfy_need(
        &self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        agent_id: &AgentId,
        kind: NeedKind,
        amount: f32,
    ) -> HandlerResult {
        match satisfy_need(world, agent_id, kind, amount) {
            Ok(()) => HandlerResult::completed("needs"),
            Err(err) => HandlerResult::failed("needs", err.to_string()),
        }
    }

    fn need_level(&self, world: &WorldState, agent_id: &AgentId, kind: NeedKind) -> Option<f32> {
        world.store.needs(agent_id).map(|needs| needs.get(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{Component, Health, Needs, Profile, Sex, TraitSet, Transform};
    use crate::config::SimConfig;
    use crate::types::Position;

    fn spawn_test_agent(world: &mut WorldState, id: &str, hunger: f32) {
        let mut needs = Needs::default();
        needs.set(NeedKind::Hunger, hunger);
        world
            .store
            .register_agent(
                AgentId::from(id),
                vec![
                    Component::Profile(Profile {
                        name: id.to_string(),
                        sex: Sex::Female,
                        age_years: 25.0,
                        life_stage: LifeStage::Adult,
                        generation: 0,
                        immortal: false,
                        dead: false,
                        traits: TraitSet::default(),
                        appearance: None,
                        parents: None,
                    }),
                    Component::Health(Health::new(100.0)),
                    Component::Needs(needs),
                    Component::Transform(Transform::at(Position::ORIGIN)),
                ],
            )
            .unwrap();
    }

    fn critical_events(world: &mut WorldState) -> Vec<(String, String)> {
        world
            .events
            .flush_events()
            .into_iter()
            .filter_map(|event| match event {
                SimulationEvent::NeedsCritical { agent_id, need_type, .. } => {
                    Some((agent_id.0, need_type))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_needs_decay_and_stay_in_bounds() {
        let mut world = WorldState::for_tests(SimConfig::default());
        let registry = SystemRegistry::new();
        spawn_test_agent(&mut world, "a", 100.0);
        let mut system = NeedsSystem::new();

        system.update(&mut world, &registry, 10.0).unwrap();
        let needs = world.store.needs(&AgentId::from("a")).unwrap();
        assert!(needs.hunger < 100.0);
        for kind in NeedKind::ALL {
            let value = needs.get(kind);
            assert!((0.0..=100.0).contains(&value), "{:?} out of bounds", kind);
        }
    }

    #[test]
    fn test_critical_emitted_exactly_once() {
        let mut world = WorldState::for_tests(SimConfig::default());
        let registry = SystemRegistry::new();
        spawn_test_agent(&mut world, "a", 25.0);
        let mut system = NeedsSystem::new();

        // Decay hunger below 20 across several ticks
        let mut seen = Vec::new();
        for _ in 0..60 {
            system.update(&mut world, &registry, 1.0).unwrap();
            seen.extend(critical_events(&mut world));
        }
        let hunger_events: Vec<_> = seen.iter().filter(|(_, need)| need == "hunger").collect();
        assert_eq!(hunger_events.len(), 1, "exactly one needs:critical for hunger");
    }

    #[test]
    fn test_recovered_after_satisfying() {
        let mut world = WorldState::for_tests(SimConfig::default());
        let registry = SystemRegistry::new();
        spawn_test_agent(&mut world, "a", 21.0);
        let mut system = NeedsSystem::new();

        // Cross below critical
        for _ in 0..10 {
            system.update(&mut world, &registry, 1.0).unwrap();
        }
        world.events.flush_events();

        satisfy_need(&mut world, &AgentId::from("a"), NeedKind::Hunger, 80.0).unwrap();
        system.update(&mut world, &registry, 0.1).unwrap();

        let recovered = world
            .events
            .flush_events()
            .into_iter()
            .any(|event| matches!(event, SimulationEvent::NeedsRecovered { need_type, .. } if need_type == "hunger"));
        assert!(recovered);
    }

    #[test]
    fn test_starvation_marks_death() {
        let mut world = WorldState::for_tests(SimConfig::default());
        let registry = SystemRegistry::new();
        spawn_test_agent(&mut world, "a", 0.5);
        let mut system = NeedsSystem::new();

        for _ in 0..10 {
            system.update(&mut world, &registry, 1.0).unwrap();
        }
        let health = world.store.health(&AgentId::from("a")).unwrap();
        assert!(health.is_dead);
    }

    #[test]
    fn test_dead_agents_skip_decay() {
        let mut world = WorldState::for_tests(SimConfig::default());
        let registry = SystemRegistry::new();
        spawn_test_agent(&mut world, "a", 90.0);
        let agent = AgentId::from("a");
        let mut health = world.store.health(&agent).unwrap().clone();
        health.apply_damage(1000.0, 0);
        world.store.set_health(&agent, health).unwrap();

        let before = world.store.needs(&agent).unwrap().clone();
        let mut system = NeedsSystem::new();
        system.update(&mut world, &registry, 5.0).unwrap();
        assert_eq!(world.store.needs(&agent).unwrap(), &before);
    }
}
