//! Recipe catalog and discovery.
//!
//! The catalog is static; what varies per agent is the set of known
//! recipes. Agents learn by inheritance at birth, by curious experimenting
//! near crafting stations, and by failed craft attempts that occasionally
//! click.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::errors::Result;
use crate::events::SimulationEvent;
use crate::ports::{CraftingPort, HandlerResult, SystemRegistry};
use crate::simulation::scheduler::SimSystem;
use crate::simulation::state::WorldState;
use crate::types::AgentId;

/// Chance per discovery roll, scaled by curiosity
const DISCOVERY_BASE_CHANCE: f64 = 0.15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    pub inputs: Vec<(String, u32)>,
    pub output: (String, u32),
}

#[derive(Debug, Default)]
pub struct RecipeBook {
    recipes: BTreeMap<String, Recipe>,
    known: BTreeMap<AgentId, BTreeSet<String>>,
}

impl RecipeBook {
    pub fn standard() -> Self {
        let mut book = Self::default();
        let mut define = |id: &str, name: &str, inputs: &[(&str, u32)], output: (&str, u32)| {
            book.recipes.insert(
                id.to_string(),
                Recipe {
                    id: id.to_string(),
                    name: name.to_string(),
                    inputs: inputs
                        .iter()
                        .map(|(item, quantity)| (item.to_string(), *quantity))
                        .collect(),
                    output: (output.0.to_string(), output.1),
                },
            );
        };
        define("craft_spear", "Craft spear", &[("wood", 2), ("fiber", 1)], ("spear", 1));
        define("craft_bow", "Craft bow", &[("wood", 2), ("fiber", 2)], ("bow", 1));
        define("craft_axe", "Craft axe", &[("wood", 2), ("stone", 1)], ("axe", 1));
        define(
            "craft_pickaxe",
            "Craft pickaxe",
            &[("wood", 2), ("stone", 2)],
            ("pickaxe", 1),
        );
        define("craft_hoe", "Craft hoe", &[("wood", 2), ("fiber", 1)], ("hoe", 1));
        define("cook_meal", "Cook meal", &[("meat", 1), ("water", 1)], ("food", 3));
        book
    }

    pub fn recipe(&self, id: &str) -> Option<&Recipe> {
        self.recipes.get(id)
    }

    pub fn recipe_ids(&self) -> Vec<String> {
        self.recipes.keys().cloned().collect()
    }

    pub fn knows(&self, agent: &AgentId, recipe_id: &str) -> bool {
        self.known
            .get(agent)
            .map(|set| set.contains(recipe_id))
            .unwrap_or(false)
    }

    pub fn teach(&mut self, agent: &AgentId, recipe_id: &str) -> bool {
        if !self.recipes.contains_key(recipe_id) {
            return false;
        }
        self.known
            .entry(agent.clone())
            .or_default()
            .insert(recipe_id.to_string())
    }

    pub fn known_by(&self, agent: &AgentId) -> Vec<String> {
        self.known
            .get(agent)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn unknown_to(&self, agent: &AgentId) -> Vec<String> {
        self.recipes
            .keys()
            .filter(|id| !self.knows(agent, id))
            .cloned()
            .collect()
    }

    /// Birth inheritance: the child knows everything either parent knows
    pub fn inherit_known(&mut self, child: &AgentId, parents: Option<&(AgentId, AgentId)>) {
        let Some((father, mother)) = parents else {
            return;
        };
        let mut inherited: BTreeSet<String> = BTreeSet::new();
        for parent in [father, mother] {
            if let Some(set) = self.known.get(parent) {
                inherited.extend(set.iter().cloned());
            }
        }
        if !inherited.is_empty() {
            self.known.entry(child.clone()).or_default().extend(inherited);
        }
    }

    pub fn forget_agent(&mut self, agent: &AgentId) {
        self.known.remove(agent);
    }

    pub fn export_known(&self) -> Vec<(AgentId, Vec<String>)> {
        self.known
            .iter()
            .map(|(agent, set)| (agent.clone(), set.iter().cloned().collect()))
            .collect()
    }

    pub fn import_known(&mut self, known: Vec<(AgentId, Vec<String>)>) {
        self.known = known
            .into_iter()
            .map(|(agent, list)| (agent, list.into_iter().collect()))
            .collect();
    }
}

// ============================================================================
// PORT
// ============================================================================

pub struct CraftingPortImpl;

impl CraftingPort for CraftingPortImpl {
    fn attempt_craft(
        &self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        agent_id: &AgentId,
        recipe_id: &str,
    ) -> HandlerResult {
        let Some(recipe) = world.recipes.recipe(recipe_id).cloned() else {
            return HandlerResult::failed("crafting", format!("unknown recipe {}", recipe_id));
        };

        if !world.recipes.knows(agent_id, recipe_id) {
            // A failed attempt can still click for a curious agent
            let curiosity = world
                .store
                .profile(agent_id)
                .map(|profile| profile.traits.curiosity)
                .unwrap_or(0.0) as f64;
            if world.rng.gen_bool((DISCOVERY_BASE_CHANCE * curiosity).clamp(0.0, 1.0)) {
                world.recipes.teach(agent_id, recipe_id);
                debug!("{} discovered {} by experimenting", agent_id, recipe_id);
            } else {
                return HandlerResult::failed(
                    "crafting",
                    format!("{} does not know {}", agent_id, recipe_id),
                );
            }
        }

        let Some(inventory_port) = registry.inventory() else {
            return HandlerResult::failed("crafting", "inventory capability unavailable");
        };
        let cost: BTreeMap<String, u32> = recipe.inputs.iter().cloned().collect();
        let consumed = inventory_port.consume_from_agent(world, registry, agent_id, &cost);
        if consumed.is_failure() {
            return HandlerResult::failed(
                "crafting",
                consumed
                    .message
                    .unwrap_or_else(|| "missing ingredients".to_string()),
            );
        }
        let (output, quantity) = recipe.output.clone();
        let added = inventory_port.add_resource(world, registry, agent_id, &output, quantity);
        if added.is_failure() {
            return HandlerResult::failed("crafting", "no room for crafted output");
        }
        HandlerResult::completed("crafting")
            .with_data(serde_json::json!({ "output": output, "quantity": quantity }))
    }

    fn knows_recipe(&self, world: &WorldState, agent_id: &AgentId, recipe_id: &str) -> bool {
        world.recipes.knows(agent_id, recipe_id)
    }
}

// ============================================================================
// SYSTEM
// ============================================================================

/// Slow discovery pass: curious agents idling near crafting stations pick up
/// recipes on their own.
pub struct RecipeDiscoverySystem;

impl SimSystem for RecipeDiscoverySystem {
    fn name(&self) -> &'static str {
        "recipe_discovery"
    }

    fn update(
        &mut self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        dt_secs: f32,
    ) -> Result<()> {
        let now = world.now();
        for agent_id in world.store.alive_agents() {
            let Some(transform) = world.store.transform(&agent_id) else {
                continue;
            };
            let crafting_zone = transform
                .zone_id
                .as_ref()
                .and_then(|zone_id| world.map.zone(zone_id))
                .map(|zone| zone.metadata.crafting)
                .unwrap_or(false);
            if !crafting_zone {
                continue;
            }
            let curiosity = world
                .store
                .profile(&agent_id)
                .map(|profile| profile.traits.curiosity)
                .unwrap_or(0.0);
            let chance =
                (DISCOVERY_BASE_CHANCE * curiosity as f64 * (dt_secs as f64 / 10.0)).clamp(0.0, 1.0);
            if !world.rng.gen_bool(chance) {
                continue;
            }
            let unknown = world.recipes.unknown_to(&agent_id);
            if unknown.is_empty() {
                continue;
            }
            let pick = unknown[world.rng.gen_range(0..unknown.len())].clone();
            world.recipes.teach(&agent_id, &pick);
            debug!("{} discovered {} at a crafting station ({})", agent_id, pick, now);
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
                world.recipes.forget_agent(agent_id);
            }
        }
    }
}
