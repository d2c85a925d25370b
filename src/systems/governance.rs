//! Governance: leadership and work scheduling.
//!
//! Each group elects the member with the best cooperation + diligence score
//! as its leader. The slow pass also flips every agent's on-duty flag from
//! the simulated hour of day and grants a small efficiency bonus to members
//! working under a diligent leader.

use tracing::info;

use crate::agents::LifeStage;
use crate::errors::Result;
use crate::ports::SystemRegistry;
use crate::simulation::scheduler::SimSystem;
use crate::simulation::state::WorldState;
use crate::types::AgentId;

/// One simulated hour, in real seconds
pub const SECONDS_PER_HOUR: f32 = 10.0;

/// Simulated hour of day for a frame time
pub fn sim_hour(now_ms: u64) -> u8 {
    ((now_ms as f32 / 1000.0 / SECONDS_PER_HOUR) as u64 % 24) as u8
}

/// Efficiency granted to members led by a diligent leader
const LED_EFFICIENCY: f32 = 1.1;

pub struct GovernanceSystem;

impl GovernanceSystem {
    fn leadership_score(world: &WorldState, agent: &AgentId) -> f32 {
        world
            .store
            .profile(agent)
            .map(|profile| profile.traits.cooperation + profile.traits.diligence)
            .unwrap_or(0.0)
    }
}

impl SimSystem for GovernanceSystem {
    fn name(&self) -> &'static str {
        "governance"
    }

    fn update(
        &mut self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        _dt_secs: f32,
    ) -> Result<()> {
        let now = world.now();
        let hour = sim_hour(now);

        // Leader elections
        let group_ids: Vec<String> = world.groups.groups().map(|group| group.id.clone()).collect();
        for group_id in &group_ids {
            let (members, leader) = match world.groups.group(group_id) {
                Some(group) => (group.members.clone(), group.leader.clone()),
                None => continue,
            };
            let leader_valid = leader
                .as_ref()
                .map(|id| members.contains(id) && world.store.has_agent(id))
                .unwrap_or(false);
            if leader_valid {
                continue;
            }
            let elected = members
                .iter()
                .filter(|member| world.store.has_agent(member))
                .max_by(|a, b| {
                    Self::leadership_score(world, a)
                        .partial_cmp(&Self::leadership_score(world, b))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .cloned();
            if let Some(elected) = elected {
                info!("group {} elected {} as leader", group_id, elected);
                if let Some(group) = world.groups.group_mut(group_id) {
                    group.leader = Some(elected);
                }
            }
        }

        // Duty flags and leadership efficiency
        for agent_id in world.store.alive_agents() {
            let Some(role) = world.store.role(&agent_id) else {
                continue;
            };
            let adult = world
                .store
                .profile(&agent_id)
                .map(|profile| profile.life_stage != LifeStage::Child)
                .unwrap_or(false);
            let on_duty = adult && role.work_start_hour <= hour && hour < role.work_end_hour;

            let led_well = world
                .groups
                .group_of(&agent_id)
                .and_then(|group| group.leader.clone())
                .and_then(|leader| world.store.profile(&leader).map(|p| p.traits.diligence))
                .map(|diligence| diligence > 0.6)
                .unwrap_or(false);
            let efficiency = if led_well { LED_EFFICIENCY } else { 1.0 };

            if role.on_duty != on_duty || (role.efficiency - efficiency).abs() > f32::EPSILON {
                let mut role = role.clone();
                role.on_duty = on_duty;
                role.efficiency = efficiency;
                world.store.set_role(&agent_id, role)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{Component, Health, Profile, Role, Sex, TraitSet};
    use crate::config::SimConfig;
    use crate::systems::emergence::Group;

    fn agent_with_traits(world: &mut WorldState, id: &str, cooperation: f32, diligence: f32) {
        world
            .store
            .register_agent(
                AgentId::from(id),
                vec![
                    Component::Profile(Profile {
                        name: id.to_string(),
                        sex: Sex::Female,
                        age_years: 30.0,
                        life_stage: LifeStage::Adult,
                        generation: 0,
                        immortal: false,
                        dead: false,
                        traits: TraitSet {
                            cooperation,
                            diligence,
                            ..TraitSet::default()
                        },
                        appearance: None,
                        parents: None,
                    }),
                    Component::Health(Health::new(100.0)),
                    Component::Role(Role::default()),
                ],
            )
            .unwrap();
    }

    #[test]
    fn test_sim_hour_wraps() {
        assert_eq!(sim_hour(0), 0);
        assert_eq!(sim_hour((SECONDS_PER_HOUR * 1000.0) as u64), 1);
        assert_eq!(sim_hour((SECONDS_PER_HOUR * 1000.0 * 25.0) as u64), 1);
    }

    #[test]
    fn test_leader_election_picks_best_score() {
        let mut world = WorldState::for_tests(SimConfig::default());
        agent_with_traits(&mut world, "a", 0.9, 0.9);
        agent_with_traits(&mut world, "b", 0.2, 0.2);
        agent_with_traits(&mut world, "c", 0.5, 0.5);
        world.groups.insert(Group {
            id: "group-1".to_string(),
            members: vec![AgentId::from("a"), AgentId::from("b"), AgentId::from("c")],
            formed_at: 0,
            leader: None,
        });

        let registry = SystemRegistry::new();
        let mut system = GovernanceSystem;
        system.update(&mut world, &registry, 1.0).unwrap();

        assert_eq!(
            world.groups.group("group-1").unwrap().leader,
            Some(AgentId::from("a"))
        );
    }

    #[test]
    fn test_duty_flag_follows_work_hours() {
        let mut world = WorldState::for_tests(SimConfig::default());
        agent_with_traits(&mut world, "a", 0.5, 0.5);
        let registry = SystemRegistry::new();
        let mut system = GovernanceSystem;

        // Default hours are 8-18; hour 0 is off duty
        system.update(&mut world, &registry, 1.0).unwrap();
        assert!(!world.store.role(&AgentId::from("a")).unwrap().on_duty);

        // Jump the clock to hour 9
        world
            .clock
            .advance((9.0 * SECONDS_PER_HOUR * 1000.0) as u64);
        system.update(&mut world, &registry, 1.0).unwrap();
        assert!(world.store.role(&AgentId::from("a")).unwrap().on_duty);
    }

    #[test]
    fn test_diligent_leader_boosts_efficiency() {
        let mut world = WorldState::for_tests(SimConfig::default());
        agent_with_traits(&mut world, "leader", 0.9, 0.9);
        agent_with_traits(&mut world, "worker", 0.4, 0.4);
        world.groups.insert(Group {
            id: "group-1".to_string(),
            members: vec![AgentId::from("leader"), AgentId::from("worker")],
            formed_at: 0,
            leader: Some(AgentId::from("leader")),
        });

        let registry = SystemRegistry::new();
        let mut system = GovernanceSystem;
        system.update(&mut world, &registry, 1.0).unwrap();

        let role = world.store.role(&AgentId::from("worker")).unwrap();
        assert!(role.efficiency > 1.0);
    }
}
