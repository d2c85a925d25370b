//! Social graph: symmetric affinity edges between agents.
//!
//! The graph is the canonical store of affinity, with edges clamped to
//! [-1, 1] and kept symmetric by construction (one entry per unordered
//! pair). Proximity reinforces edges, time decays them toward zero, and
//! edges that stay above the group threshold long enough feed group
//! formation in the emergence system. The per-agent Social component keeps
//! a viewer-facing projection of the strongest edges.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::agents::{Relationship, RelationshipKind};
use crate::errors::Result;
use crate::events::SimulationEvent;
use crate::ports::{HandlerResult, SocialPort, SystemRegistry};
use crate::simulation::scheduler::SimSystem;
use crate::simulation::state::WorldState;
use crate::types::AgentId;

/// Minimum gap between `social:interaction` emissions for one pair, ms
const INTERACTION_EVENT_GAP_MS: u64 = 10_000;
/// |affinity| from which the component mirror records Friend / Rival
const NOTABLE_AFFINITY: f32 = 0.4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeState {
    pub affinity: f32,
    pub last_interaction: u64,
    /// Set while affinity holds at or above the group threshold
    pub above_threshold_since: Option<u64>,
}

/// Unordered pair key: the smaller id always comes first
fn pair_key(a: &AgentId, b: &AgentId) -> (AgentId, AgentId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

#[derive(Debug, Default)]
pub struct SocialGraph {
    edges: BTreeMap<(AgentId, AgentId), EdgeState>,
}

impl SocialGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn affinity(&self, a: &AgentId, b: &AgentId) -> f32 {
        self.edges
            .get(&pair_key(a, b))
            .map(|edge| edge.affinity)
            .unwrap_or(0.0)
    }

    pub fn edge(&self, a: &AgentId, b: &AgentId) -> Option<&EdgeState> {
        self.edges.get(&pair_key(a, b))
    }

    /// Force an edge to a value (clamped); used by tests and imports
    pub fn set_affinity(&mut self, a: &AgentId, b: &AgentId, affinity: f32) {
        let entry = self.edges.entry(pair_key(a, b)).or_insert(EdgeState {
            affinity: 0.0,
            last_interaction: 0,
            above_threshold_since: None,
        });
        entry.affinity = affinity.clamp(-1.0, 1.0);
    }

    /// Symmetric adjustment, returning the new affinity
    pub fn add_edge(
        &mut self,
        a: &AgentId,
        b: &AgentId,
        delta: f32,
        now: u64,
        group_threshold: f32,
    ) -> f32 {
        let entry = self.edges.entry(pair_key(a, b)).or_insert(EdgeState {
            affinity: 0.0,
            last_interaction: now,
            above_threshold_since: None,
        });
        entry.affinity = (entry.affinity + delta).clamp(-1.0, 1.0);
        if entry.affinity >= group_threshold {
            entry.above_threshold_since.get_or_insert(now);
        } else {
            entry.above_threshold_since = None;
        }
        entry.affinity
    }

    /// Pull every edge toward zero
    pub fn decay_all(&mut self, amount: f32, group_threshold: f32) {
        self.edges.retain(|_, edge| {
            if edge.affinity > 0.0 {
                edge.affinity = (edge.affinity - amount).max(0.0);
            } else if edge.affinity < 0.0 {
                edge.affinity = (edge.affinity + amount).min(0.0);
            }
            if edge.affinity < group_threshold {
                edge.above_threshold_since = None;
            }
            edge.affinity != 0.0 || edge.above_threshold_since.is_some()
        });
    }

    pub fn remove_agent(&mut self, id: &AgentId) {
        self.edges.retain(|(a, b), _| a != id && b != id);
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> impl Iterator<Item = (&(AgentId, AgentId), &EdgeState)> {
        self.edges.iter()
    }

    /// Partners of `id` whose edge satisfies `filter`
    pub fn partners_where<F: Fn(&EdgeState) -> bool>(
        &self,
        id: &AgentId,
        filter: F,
    ) -> Vec<AgentId> {
        self.edges
            .iter()
            .filter(|((a, b), edge)| (a == id || b == id) && filter(edge))
            .map(|((a, b), _)| if a == id { b.clone() } else { a.clone() })
            .collect()
    }

    pub fn export(&self) -> Vec<(AgentId, AgentId, EdgeState)> {
        self.edges
            .iter()
            .map(|((a, b), edge)| (a.clone(), b.clone(), edge.clone()))
            .collect()
    }

    pub fn import(&mut self, edges: Vec<(AgentId, AgentId, EdgeState)>) {
        self.edges = edges
            .into_iter()
            .map(|(a, b, edge)| (pair_key(&a, &b), edge))
            .collect();
    }
}

// ============================================================================
// SYSTEM
// ============================================================================

pub struct SocialSystem;

impl SocialSystem {
    /// Refresh the component-level mirror of one agent's notable edges
    fn refresh_mirror(world: &mut WorldState, id: &AgentId, now: u64) -> Result<()> {
        let Some(social) = world.store.social(id) else {
            return Ok(());
        };
        let mut social = social.clone();
        let partner = social.partner_id.clone();

        social.relationships.clear();
        for other in world
            .social_graph
            .partners_where(id, |edge| edge.affinity.abs() >= NOTABLE_AFFINITY)
        {
            let affinity = world.social_graph.affinity(id, &other);
            let kind = if partner.as_ref() == Some(&other) {
                RelationshipKind::Partner
            } else if affinity >= NOTABLE_AFFINITY {
                RelationshipKind::Friend
            } else {
                RelationshipKind::Rival
            };
            social.relationships.insert(
                other,
                Relationship {
                    kind,
                    affinity: (affinity * 100.0).clamp(-100.0, 100.0),
                    last_interaction: now,
                },
            );
        }
        world.store.set_social(id, social)?;
        Ok(())
    }
}

impl SimSystem for SocialSystem {
    fn name(&self) -> &'static str {
        "social"
    }

    fn update(
        &mut self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        dt_secs: f32,
    ) -> Result<()> {
        let config = world.config.social.clone();
        let now = world.now();

        world
            .social_graph
            .decay_all(config.decay_per_second * dt_secs, config.group_threshold);

        // Proximity reinforcement through the spatial index, not N^2
        let alive = world.store.alive_agents();
        let mut touched: Vec<AgentId> = Vec::new();
        for id in &alive {
            let Some(position) = world.store.transform(id).map(|t| t.position) else {
                continue;
            };
            let nearby = world.spatial.query_radius(position, config.proximity_radius);
            for entry in nearby {
                // Handle each unordered pair once
                if entry.id <= *id {
                    continue;
                }
                let reinforcement = config.reinforcement_per_second * dt_secs;
                world.social_graph.add_edge(
                    id,
                    &entry.id,
                    reinforcement,
                    now,
                    config.group_threshold,
                );

                let stale = world
                    .social_graph
                    .edge(id, &entry.id)
                    .map(|edge| now.saturating_sub(edge.last_interaction) >= INTERACTION_EVENT_GAP_MS)
                    .unwrap_or(true);
                if stale {
                    let affinity = world.social_graph.affinity(id, &entry.id);
                    world.events.emit(SimulationEvent::SocialInteraction {
                        agent_a: id.clone(),
                        agent_b: entry.id.clone(),
                        affinity,
                        timestamp: now,
                    });
                    if let Some(edge) = world.social_graph.edges.get_mut(&pair_key(id, &entry.id)) {
                        edge.last_interaction = now;
                    }
                    // A real interaction also feeds the social need
                    for participant in [id, &entry.id] {
                        if let Some(needs) = world.store.needs(participant) {
                            let mut needs = needs.clone();
                            needs.change(crate::agents::NeedKind::Social, 5.0);
                            world.store.set_needs(participant, needs)?;
                        }
                        if let Some(social) = world.store.social(participant) {
                            let mut social = social.clone();
                            social.last_social_interaction = now;
                            world.store.set_social(participant, social)?;
                        }
                    }
                }
                touched.push(id.clone());
                touched.push(entry.id.clone());
            }
        }

        touched.sort();
        touched.dedup();
        for id in touched {
            Self::refresh_mirror(world, &id, now)?;
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
                world.social_graph.remove_agent(agent_id);
            }
        }
    }
}

// ============================================================================
// PORT
// ============================================================================

pub struct SocialPortImpl;

impl SocialPort for SocialPortImpl {
    fn affinity(&self, world: &WorldState, a: &AgentId, b: &AgentId) -> f32 {
        world.social_graph.affinity(a, b)
    }

    fn add_edge(
        &self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        a: &AgentId,
        b: &AgentId,
        delta: f32,
    ) -> HandlerResult {
        if !world.store.has_agent(a) || !world.store.has_agent(b) {
            return HandlerResult::failed("social", "unknown agent in edge");
        }
        let now = world.now();
        let threshold = world.config.social.group_threshold;
        let affinity = world.social_graph.add_edge(a, b, delta, now, threshold);
        HandlerResult::completed("social").with_data(serde_json::json!({ "affinity": affinity }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{Component, Health, Needs, Social, Transform};
    use crate::config::SimConfig;
    use crate::types::Position;

    fn world_with_pair(distance: f32) -> WorldState {
        let mut world = WorldState::for_tests(SimConfig::default());
        for (id, x) in [("a", 0.0_f32), ("b", distance)] {
            world
                .store
                .register_agent(
                    AgentId::from(id),
                    vec![
                        Component::Health(Health::new(100.0)),
                        Component::Needs(Needs::default()),
                        Component::Transform(Transform::at(Position::new(x, 0.0))),
                        Component::Social(Social::default()),
                    ],
                )
                .unwrap();
        }
        world.rebuild_spatial_index();
        world
    }

    #[test]
    fn test_edges_symmetric_and_clamped() {
        let mut graph = SocialGraph::new();
        let a = AgentId::from("a");
        let b = AgentId::from("b");

        graph.add_edge(&a, &b, 0.3, 0, 0.6);
        assert_eq!(graph.affinity(&a, &b), graph.affinity(&b, &a));

        graph.add_edge(&b, &a, 5.0, 0, 0.6);
        assert_eq!(graph.affinity(&a, &b), 1.0);

        graph.add_edge(&a, &b, -10.0, 0, 0.6);
        assert_eq!(graph.affinity(&a, &b), -1.0);
    }

    #[test]
    fn test_proximity_reinforces() {
        let mut world = world_with_pair(1.0);
        let registry = SystemRegistry::new();
        let mut system = SocialSystem;

        for _ in 0..20 {
            world.clock.advance(250);
            system.update(&mut world, &registry, 0.25).unwrap();
        }
        let affinity = world
            .social_graph
            .affinity(&AgentId::from("a"), &AgentId::from("b"));
        assert!(affinity > 0.0, "nearby agents grow affinity, got {}", affinity);
    }

    #[test]
    fn test_distant_agents_decay() {
        let mut world = world_with_pair(100.0);
        world
            .social_graph
            .set_affinity(&AgentId::from("a"), &AgentId::from("b"), 0.5);
        let registry = SystemRegistry::new();
        let mut system = SocialSystem;

        for _ in 0..40 {
            world.clock.advance(250);
            system.update(&mut world, &registry, 0.25).unwrap();
        }
        let affinity = world
            .social_graph
            .affinity(&AgentId::from("a"), &AgentId::from("b"));
        assert!(affinity < 0.5, "edges decay without contact");
    }

    #[test]
    fn test_threshold_tracking() {
        let mut graph = SocialGraph::new();
        let a = AgentId::from("a");
        let b = AgentId::from("b");

        graph.add_edge(&a, &b, 0.7, 1000, 0.6);
        assert_eq!(graph.edge(&a, &b).unwrap().above_threshold_since, Some(1000));

        // Staying above keeps the original mark
        graph.add_edge(&a, &b, 0.1, 2000, 0.6);
        assert_eq!(graph.edge(&a, &b).unwrap().above_threshold_since, Some(1000));

        // Dropping below clears it
        graph.add_edge(&a, &b, -0.5, 3000, 0.6);
        assert_eq!(graph.edge(&a, &b).unwrap().above_threshold_since, None);
    }

    #[test]
    fn test_remove_agent_drops_edges() {
        let mut graph = SocialGraph::new();
        let a = AgentId::from("a");
        let b = AgentId::from("b");
        let c = AgentId::from("c");
        graph.set_affinity(&a, &b, 0.5);
        graph.set_affinity(&b, &c, 0.5);
        graph.remove_agent(&b);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_interaction_event_and_mirror() {
        let mut world = world_with_pair(1.0);
        let registry = SystemRegistry::new();
        let mut system = SocialSystem;

        world.clock.advance(INTERACTION_EVENT_GAP_MS + 1);
        system.update(&mut world, &registry, 0.25).unwrap();
        let interactions = world
            .events
            .flush_events()
            .iter()
            .filter(|event| matches!(event, SimulationEvent::SocialInteraction { .. }))
            .count();
        assert_eq!(interactions, 1);

        // Push the edge into notable range and check the component mirror
        world
            .social_graph
            .set_affinity(&AgentId::from("a"), &AgentId::from("b"), 0.8);
        world.clock.advance(250);
        system.update(&mut world, &registry, 0.25).unwrap();
        let social = world.store.social(&AgentId::from("a")).unwrap();
        let relationship = social.relationships.get(&AgentId::from("b")).unwrap();
        assert_eq!(relationship.kind, RelationshipKind::Friend);
        assert!(relationship.affinity > 40.0);
    }
}
