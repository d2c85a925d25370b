//! Emergence: groups condensing out of the social graph.
//!
//! Edges that hold above the group threshold for the configured window make
//! their endpoints group candidates. Connected components of candidates that
//! are big enough and not already organized become a group, announced with
//! `social:group_formed`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::info;

use crate::errors::Result;
use crate::events::SimulationEvent;
use crate::ports::SystemRegistry;
use crate::simulation::scheduler::SimSystem;
use crate::simulation::state::WorldState;
use crate::types::AgentId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub members: Vec<AgentId>,
    pub formed_at: u64,
    pub leader: Option<AgentId>,
}

#[derive(Debug, Default)]
pub struct GroupLedger {
    groups: BTreeMap<String, Group>,
}

impl GroupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(&self, id: &str) -> Option<&Group> {
        self.groups.get(id)
    }

    pub fn group_mut(&mut self, id: &str) -> Option<&mut Group> {
        self.groups.get_mut(id)
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn insert(&mut self, group: Group) {
        self.groups.insert(group.id.clone(), group);
    }

    pub fn group_of(&self, agent: &AgentId) -> Option<&Group> {
        self.groups
            .values()
            .find(|group| group.members.contains(agent))
    }

    /// Drop an agent from every group; groups that fall under two members
    /// disband.
    pub fn remove_agent(&mut self, agent: &AgentId) {
        for group in self.groups.values_mut() {
            group.members.retain(|member| member != agent);
            if group.leader.as_ref() == Some(agent) {
                group.leader = None;
            }
        }
        self.groups.retain(|_, group| group.members.len() >= 2);
    }

    pub fn export(&self) -> Vec<Group> {
        self.groups.values().cloned().collect()
    }

    pub fn import(&mut self, groups: Vec<Group>) {
        self.groups = groups
            .into_iter()
            .map(|group| (group.id.clone(), group))
            .collect();
    }
}

// ============================================================================
// SYSTEM
// ============================================================================

pub struct EmergenceSystem;

impl SimSystem for EmergenceSystem {
    fn name(&self) -> &'static str {
        "emergence"
    }

    fn update(
        &mut self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        _dt_secs: f32,
    ) -> Result<()> {
        let now = world.now();
        let config = world.config.social.clone();
        let window_ms = (config.group_window_secs * 1000.0) as u64;

        // Candidate edges: sustained above the threshold for the window
        let mut adjacency: HashMap<AgentId, Vec<AgentId>> = HashMap::new();
        for ((a, b), edge) in world.social_graph.edges() {
            let sustained = edge
                .above_threshold_since
                .map(|since| now.saturating_sub(since) >= window_ms)
                .unwrap_or(false);
            if sustained {
                adjacency.entry(a.clone()).or_default().push(b.clone());
                adjacency.entry(b.clone()).or_default().push(a.clone());
            }
        }

        // Agents already organized stay out of new formations
        let organized: HashSet<AgentId> = world
            .groups
            .groups()
            .flat_map(|group| group.members.iter().cloned())
            .collect();

        // Connected components over the candidate graph
        let mut visited: HashSet<AgentId> = HashSet::new();
        let mut formed: Vec<Vec<AgentId>> = Vec::new();
        for start in adjacency.keys() {
            if visited.contains(start) || organized.contains(start) {
                continue;
            }
            let mut component = Vec::new();
            let mut stack = vec![start.clone()];
            while let Some(current) = stack.pop() {
                if !visited.insert(current.clone()) || organized.contains(&current) {
                    continue;
                }
                component.push(current.clone());
                if let Some(neighbors) = adjacency.get(&current) {
                    stack.extend(neighbors.iter().cloned());
                }
            }
            if component.len() >= config.min_group_size {
                component.sort();
                formed.push(component);
            }
        }

        for members in formed {
            let group_id = world.next_group_id();
            info!("group {} formed with {} members", group_id, members.len());
            world.groups.insert(Group {
                id: group_id.clone(),
                members: members.clone(),
                formed_at: now,
                leader: None,
            });
            world.events.emit(SimulationEvent::GroupFormed {
                group_id,
                members,
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
            if let SimulationEvent::AgentRemoved { agent_id, .. } = event {
                world.groups.remove_agent(agent_id);
            }
        }
    }
}
