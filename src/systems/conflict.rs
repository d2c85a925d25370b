//! Conflict resolution: negotiation cards opened by severe hits.
//!
//! A hit above the severity line opens one card per attacker/defender pair.
//! After a short cooling period the card resolves by the pair's cooperation:
//! truce (both disengage, affinity restored a little), apologize (attacker
//! disengages), or continue (the card is simply dropped).

use tracing::{debug, info};

use crate::errors::Result;
use crate::events::{CombatTarget, SimulationEvent};
use crate::ports::SystemRegistry;
use crate::simulation::scheduler::SimSystem;
use crate::simulation::state::WorldState;
use crate::types::AgentId;

/// Damage at or above which a hit is severe enough to open a card
const SEVERE_DAMAGE: f32 = 25.0;
/// Cooling period before a card resolves, ms
const RESOLVE_AFTER_MS: u64 = 5_000;

const TRUCE_COOPERATION: f32 = 1.1;
const APOLOGY_COOPERATION: f32 = 0.7;

#[derive(Debug, Clone, PartialEq)]
pub struct Negotiation {
    pub attacker: AgentId,
    pub defender: AgentId,
    pub opened_at: u64,
    pub severity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Truce,
    Apologize,
    Continue,
}

pub struct ConflictResolutionSystem {
    negotiations: Vec<Negotiation>,
}

impl ConflictResolutionSystem {
    pub fn new() -> Self {
        Self {
            negotiations: Vec::new(),
        }
    }

    pub fn open_count(&self) -> usize {
        self.negotiations.len()
    }

    fn has_card(&self, attacker: &AgentId, defender: &AgentId) -> bool {
        self.negotiations.iter().any(|negotiation| {
            (&negotiation.attacker, &negotiation.defender) == (attacker, defender)
                || (&negotiation.attacker, &negotiation.defender) == (defender, attacker)
        })
    }

    fn disengage(world: &mut WorldState, agent: &AgentId) {
        if let Some(combat) = world.store.combat(agent) {
            if combat.is_in_combat {
                let mut combat = combat.clone();
                combat.is_in_combat = false;
                combat.current_target = None;
                let _ = world.store.set_combat(agent, combat);
            }
        }
    }

    fn resolve(world: &mut WorldState, negotiation: &Negotiation) -> Outcome {
        let cooperation_of = |id: &AgentId, world: &WorldState| {
            world
                .store
                .profile(id)
                .map(|profile| profile.traits.cooperation)
                .unwrap_or(0.0)
        };
        let combined =
            cooperation_of(&negotiation.attacker, world) + cooperation_of(&negotiation.defender, world);

        let now = world.now();
        let threshold = world.config.social.group_threshold;
        if combined >= TRUCE_COOPERATION {
            Self::disengage(world, &negotiation.attacker);
            Self::disengage(world, &negotiation.defender);
            world.social_graph.add_edge(
                &negotiation.attacker,
                &negotiation.defender,
                0.2,
                now,
                threshold,
            );
            Outcome::Truce
        } else if combined >= APOLOGY_COOPERATION {
            Self::disengage(world, &negotiation.attacker);
            world.social_graph.add_edge(
                &negotiation.attacker,
                &negotiation.defender,
                0.1,
                now,
                threshold,
            );
            Outcome::Apologize
        } else {
            Outcome::Continue
        }
    }
}

impl Default for ConflictResolutionSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SimSystem for ConflictResolutionSystem {
    fn name(&self) -> &'static str {
        "conflict_resolution"
    }

    fn update(
        &mut self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        _dt_secs: f32,
    ) -> Result<()> {
        let now = world.now();
        let (due, waiting): (Vec<_>, Vec<_>) = self
            .negotiations
            .drain(..)
            .partition(|negotiation| now.saturating_sub(negotiation.opened_at) >= RESOLVE_AFTER_MS);
        self.negotiations = waiting;

        for negotiation in due {
            let outcome = Self::resolve(world, &negotiation);
            info!(
                "negotiation between {} and {} resolved: {:?}",
                negotiation.attacker, negotiation.defender, outcome
            );
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
            match event {
                SimulationEvent::CombatHit {
                    attacker,
                    target: CombatTarget::Agent(defender),
                    damage,
                    timestamp,
                    ..
                } if *damage >= SEVERE_DAMAGE => {
                    if !self.has_card(attacker, defender) {
                        debug!(
                            "severe hit ({:.0}) opened negotiation {} vs {}",
                            damage, attacker, defender
                        );
                        self.negotiations.push(Negotiation {
                            attacker: attacker.clone(),
                            defender: defender.clone(),
                            opened_at: *timestamp,
                            severity: *damage,
                        });
                    }
                }
                SimulationEvent::AgentRemoved { agent_id, .. } => {
                    self.negotiations.retain(|negotiation| {
                        &negotiation.attacker != agent_id && &negotiation.defender != agent_id
                    });
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{Combat, Component, Health, LifeStage, Profile, Sex, TraitSet};
    use crate::config::SimConfig;

    fn agent(world: &mut WorldState, id: &str, cooperation: f32) -> AgentId {
        let agent = AgentId::from(id);
        world
            .store
            .register_agent(
                agent.clone(),
                vec![
                    Component::Profile(Profile {
                        name: id.to_string(),
                        sex: Sex::Male,
                        age_years: 30.0,
                        life_stage: LifeStage::Adult,
                        generation: 0,
                        immortal: false,
                        dead: false,
                        traits: TraitSet {
                            cooperation,
                            ..TraitSet::default()
                        },
                        appearance: None,
                        parents: None,
                    }),
                    Component::Health(Health::new(100.0)),
                    Component::Combat(Combat {
                        is_in_combat: true,
                        ..Combat::noncombatant(10.0, 1000)
                    }),
                ],
            )
            .unwrap();
        agent
    }

    fn severe_hit(attacker: &AgentId, defender: &AgentId, timestamp: u64) -> SimulationEvent {
        SimulationEvent::CombatHit {
            attacker: attacker.clone(),
            target: CombatTarget::Agent(defender.clone()),
            damage: 30.0,
            remaining_health: 20.0,
            critical: false,
            timestamp,
        }
    }

    #[test]
    fn test_severe_hit_opens_one_card() {
        let mut world = WorldState::for_tests(SimConfig::default());
        let registry = SystemRegistry::new();
        let a = agent(&mut world, "a", 0.6);
        let b = agent(&mut world, "b", 0.6);

        let mut system = ConflictResolutionSystem::new();
        system.on_events(&[severe_hit(&a, &b, 0)], &mut world, &registry);
        system.on_events(&[severe_hit(&a, &b, 100)], &mut world, &registry);
        system.on_events(&[severe_hit(&b, &a, 200)], &mut world, &registry);
        assert_eq!(system.open_count(), 1, "one card per pair");
    }

    #[test]
    fn test_weak_hit_opens_nothing() {
        let mut world = WorldState::for_tests(SimConfig::default());
        let registry = SystemRegistry::new();
        let a = agent(&mut world, "a", 0.6);
        let b = agent(&mut world, "b", 0.6);

        let mut system = ConflictResolutionSystem::new();
        system.on_events(
            &[SimulationEvent::CombatHit {
                attacker: a,
                target: CombatTarget::Agent(b),
                damage: 5.0,
                remaining_health: 95.0,
                critical: false,
                timestamp: 0,
            }],
            &mut world,
            &registry,
        );
        assert_eq!(system.open_count(), 0);
    }

    #[test]
    fn test_cooperative_pair_reaches_truce() {
        let mut world = WorldState::for_tests(SimConfig::default());
        let registry = SystemRegistry::new();
        let a = agent(&mut world, "a", 0.8);
        let b = agent(&mut world, "b", 0.8);

        let mut system = ConflictResolutionSystem::new();
        system.on_events(&[severe_hit(&a, &b, 0)], &mut world, &registry);

        world.clock.advance(RESOLVE_AFTER_MS + 1000);
        system.update(&mut world, &registry, 1.0).unwrap();

        assert_eq!(system.open_count(), 0);
        assert!(!world.store.combat(&a).unwrap().is_in_combat);
        assert!(!world.store.combat(&b).unwrap().is_in_combat);
        assert!(world.social_graph.affinity(&a, &b) > 0.0);
    }

    #[test]
    fn test_hostile_pair_continues() {
        let mut world = WorldState::for_tests(SimConfig::default());
        let registry = SystemRegistry::new();
        let a = agent(&mut world, "a", 0.1);
        let b = agent(&mut world, "b", 0.1);

        let mut system = ConflictResolutionSystem::new();
        system.on_events(&[severe_hit(&a, &b, 0)], &mut world, &registry);
        world.clock.advance(RESOLVE_AFTER_MS + 1000);
        system.update(&mut world, &registry, 1.0).unwrap();

        assert!(world.store.combat(&a).unwrap().is_in_combat, "fight goes on");
    }
}
