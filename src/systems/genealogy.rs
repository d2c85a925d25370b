//! Genealogy: family trees and lineages.
//!
//! Births are registered by Lifecycle at spawn time; deaths arrive through
//! `agent:removed`. A lineage is inherited from the first parent that has
//! one, otherwise the newborn founds a new lineage.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::agents::TraitSet;
use crate::errors::Result;
use crate::events::SimulationEvent;
use crate::ports::SystemRegistry;
use crate::simulation::scheduler::SimSystem;
use crate::simulation::state::WorldState;
use crate::types::{AgentId, LineageId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AncestorEntry {
    pub parents: Option<(AgentId, AgentId)>,
    pub children: Vec<AgentId>,
    pub lineage_id: LineageId,
    pub generation: u32,
    pub traits: TraitSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageEvent {
    pub timestamp: u64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lineage {
    pub id: LineageId,
    pub founder: AgentId,
    pub members: Vec<AgentId>,
    pub living_members: Vec<AgentId>,
    pub total_born: u32,
    pub total_died: u32,
    pub founded_at: u64,
    pub events: Vec<LineageEvent>,
}

#[derive(Debug, Default)]
pub struct GenealogyLedger {
    ancestors: BTreeMap<AgentId, AncestorEntry>,
    lineages: BTreeMap<LineageId, Lineage>,
    next_lineage_seq: u64,
}

impl GenealogyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ancestor(&self, id: &AgentId) -> Option<&AncestorEntry> {
        self.ancestors.get(id)
    }

    pub fn lineage(&self, id: &LineageId) -> Option<&Lineage> {
        self.lineages.get(id)
    }

    pub fn lineage_of(&self, agent: &AgentId) -> Option<&LineageId> {
        self.ancestors.get(agent).map(|entry| &entry.lineage_id)
    }

    pub fn lineages(&self) -> impl Iterator<Item = &Lineage> {
        self.lineages.values()
    }

    pub fn lineage_count(&self) -> usize {
        self.lineages.len()
    }

    /// Register a newborn and return its lineage id
    pub fn register_birth(
        &mut self,
        agent: &AgentId,
        parents: Option<(AgentId, AgentId)>,
        traits: TraitSet,
        generation: u32,
        now: u64,
    ) -> LineageId {
        let inherited = parents.as_ref().and_then(|(father, mother)| {
            self.lineage_of(father)
                .or_else(|| self.lineage_of(mother))
                .cloned()
        });

        let lineage_id = match inherited {
            Some(id) => id,
            None => {
                self.next_lineage_seq += 1;
                let id = LineageId::new(format!("lineage-{}", self.next_lineage_seq));
                self.lineages.insert(
                    id.clone(),
                    Lineage {
                        id: id.clone(),
                        founder: agent.clone(),
                        members: Vec::new(),
                        living_members: Vec::new(),
                        total_born: 0,
                        total_died: 0,
                        founded_at: now,
                        events: vec![LineageEvent {
                            timestamp: now,
                            description: format!("founded by {}", agent),
                        }],
                    },
                );
                id
            }
        };

        if let Some(lineage) = self.lineages.get_mut(&lineage_id) {
            lineage.members.push(agent.clone());
            lineage.living_members.push(agent.clone());
            lineage.total_born += 1;
            lineage.events.push(LineageEvent {
                timestamp: now,
                description: format!("{} born", agent),
            });
        }

        if let Some((father, mother)) = &parents {
            for parent in [father, mother] {
                if let Some(entry) = self.ancestors.get_mut(parent) {
                    entry.children.push(agent.clone());
                }
            }
        }

        self.ancestors.insert(
            agent.clone(),
            AncestorEntry {
                parents,
                children: Vec::new(),
                lineage_id: lineage_id.clone(),
                generation,
                traits,
            },
        );
        lineage_id
    }

    /// Remove an agent from the living roster of its lineage
    pub fn record_death(&mut self, agent: &AgentId, now: u64) {
        let Some(lineage_id) = self.lineage_of(agent).cloned() else {
            return;
        };
        if let Some(lineage) = self.lineages.get_mut(&lineage_id) {
            let before = lineage.living_members.len();
            lineage.living_members.retain(|member| member != agent);
            if lineage.living_members.len() < before {
                lineage.total_died += 1;
                lineage.events.push(LineageEvent {
                    timestamp: now,
                    description: format!("{} died", agent),
                });
            }
        }
    }

    pub fn export(&self) -> (Vec<(AgentId, AncestorEntry)>, Vec<Lineage>, u64) {
        (
            self.ancestors
                .iter()
                .map(|(id, entry)| (id.clone(), entry.clone()))
                .collect(),
            self.lineages.values().cloned().collect(),
            self.next_lineage_seq,
        )
    }

    pub fn import(
        &mut self,
        ancestors: Vec<(AgentId, AncestorEntry)>,
        lineages: Vec<Lineage>,
        next_seq: u64,
    ) {
        self.ancestors = ancestors.into_iter().collect();
        self.lineages = lineages
            .into_iter()
            .map(|lineage| (lineage.id.clone(), lineage))
            .collect();
        self.next_lineage_seq = next_seq;
    }
}

// ============================================================================
// SYSTEM
// ============================================================================

pub struct GenealogySystem;

impl SimSystem for GenealogySystem {
    fn name(&self) -> &'static str {
        "genealogy"
    }

    fn update(
        &mut self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        _dt_secs: f32,
    ) -> Result<()> {
        // Defensive sync: living rosters never list agents the store lost
        let known: std::collections::HashSet<AgentId> =
            world.store.all_agent_ids().into_iter().collect();
        for lineage_id in world
            .genealogy
            .lineages
            .keys()
            .cloned()
            .collect::<Vec<_>>()
        {
            if let Some(lineage) = world.genealogy.lineages.get_mut(&lineage_id) {
                lineage.living_members.retain(|member| known.contains(member));
            }
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
            if let SimulationEvent::AgentRemoved { agent_id, timestamp, .. } = event {
                world.genealogy.record_death(agent_id, *timestamp);
            }
        }
    }
}
