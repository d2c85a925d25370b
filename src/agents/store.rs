//! Central component repository.
//!
//! Two structures back every lookup: the id registry (authoritative set of
//! known agents) and one index per component kind for O(1) typed access.
//! Setters take owned values, so a caller can never mutate committed state
//! through a retained reference; reads hand out shared references or clones.
//!
//! Cached queries (`agents_in_combat`, `agents_moving`, `alive_agents`) are
//! invalidated whenever their witness component is written. Dirty tracking
//! records which components changed per agent since the last clear; the
//! WebSocket diff stream drains it.

use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

use super::components::{
    AiState, Combat, Component, ComponentKind, Health, Inventory, Movement, Needs, Profile, Role,
    Social, Transform,
};
use crate::errors::{Result, SimulatorError};
use crate::types::{AgentId, Position, ZoneId};

#[derive(Default)]
pub struct AgentStore {
    ids: BTreeSet<AgentId>,

    profiles: HashMap<AgentId, Profile>,
    healths: HashMap<AgentId, Health>,
    needs: HashMap<AgentId, Needs>,
    transforms: HashMap<AgentId, Transform>,
    movements: HashMap<AgentId, Movement>,
    inventories: HashMap<AgentId, Inventory>,
    combats: HashMap<AgentId, Combat>,
    roles: HashMap<AgentId, Role>,
    socials: HashMap<AgentId, Social>,
    ai_states: HashMap<AgentId, AiState>,

    dirty: HashMap<AgentId, HashSet<ComponentKind>>,
    dirty_tracking: bool,

    combat_cache: Option<Vec<AgentId>>,
    moving_cache: Option<Vec<AgentId>>,
    alive_cache: Option<Vec<AgentId>>,
}

impl AgentStore {
    pub fn new() -> Self {
        Self {
            dirty_tracking: true,
            ..Self::default()
        }
    }

    // ── Registration ─────────────────────────────────────────────────────

    /// Register a new agent with its initial component bundle
    pub fn register_agent(&mut self, id: AgentId, components: Vec<Component>) -> Result<()> {
        if self.ids.contains(&id) {
            return Err(SimulatorError::store(format!(
                "agent {} already registered",
                id
            )));
        }
        self.ids.insert(id.clone());
        for component in components {
            self.store_component(&id, component);
        }
        self.invalidate_all_caches();
        debug!("registered agent {}", id);
        Ok(())
    }

    /// Remove an agent and every component it owns. Returns false if unknown.
    pub fn remove_agent(&mut self, id: &AgentId) -> bool {
        if !self.ids.remove(id) {
            return false;
        }
        self.profiles.remove(id);
        self.healths.remove(id);
        self.needs.remove(id);
        self.transforms.remove(id);
        self.movements.remove(id);
        self.inventories.remove(id);
        self.combats.remove(id);
        self.roles.remove(id);
        self.socials.remove(id);
        self.ai_states.remove(id);
        self.dirty.remove(id);
        self.invalidate_all_caches();
        debug!("removed agent {}", id);
        true
    }

    pub fn has_agent(&self, id: &AgentId) -> bool {
        self.ids.contains(id)
    }

    /// All known ids in stable (sorted) order
    pub fn all_agent_ids(&self) -> Vec<AgentId> {
        self.ids.iter().cloned().collect()
    }

    pub fn agent_count(&self) -> usize {
        self.ids.len()
    }

    // ── Generic component access ─────────────────────────────────────────

    pub fn get_component(&self, id: &AgentId, kind: ComponentKind) -> Option<Component> {
        match kind {
            ComponentKind::Profile => self.profiles.get(id).cloned().map(Component::Profile),
            ComponentKind::Health => self.healths.get(id).cloned().map(Component::Health),
            ComponentKind::Needs => self.needs.get(id).cloned().map(Component::Needs),
            ComponentKind::Transform => self.transforms.get(id).cloned().map(Component::Transform),
            ComponentKind::Movement => self.movements.get(id).cloned().map(Component::Movement),
            ComponentKind::Inventory => self.inventories.get(id).cloned().map(Component::Inventory),
            ComponentKind::Combat => self.combats.get(id).cloned().map(Component::Combat),
            ComponentKind::Role => self.roles.get(id).cloned().map(Component::Role),
            ComponentKind::Social => self.socials.get(id).cloned().map(Component::Social),
            ComponentKind::Ai => self.ai_states.get(id).cloned().map(Component::Ai),
        }
    }

    /// Replace one component. The agent must be registered.
    pub fn set_component(&mut self, id: &AgentId, component: Component) -> Result<()> {
        if !self.ids.contains(id) {
            return Err(SimulatorError::not_found(format!(
                "set_component on unknown agent {}",
                id
            )));
        }
        self.store_component(id, component);
        Ok(())
    }

    fn store_component(&mut self, id: &AgentId, component: Component) {
        let kind = component.kind();
        match component {
            Component::Profile(value) => {
                self.profiles.insert(id.clone(), value);
            }
            Component::Health(value) => {
                self.healths.insert(id.clone(), value);
                self.alive_cache = None;
            }
            Component::Needs(value) => {
                self.needs.insert(id.clone(), value);
            }
            Component::Transform(value) => {
                self.transforms.insert(id.clone(), value);
            }
            Component::Movement(value) => {
                self.movements.insert(id.clone(), value);
                self.moving_cache = None;
            }
            Component::Inventory(value) => {
                self.inventories.insert(id.clone(), value);
            }
            Component::Combat(value) => {
                self.combats.insert(id.clone(), value);
                self.combat_cache = None;
            }
            Component::Role(value) => {
                self.roles.insert(id.clone(), value);
            }
            Component::Social(value) => {
                self.socials.insert(id.clone(), value);
            }
            Component::Ai(value) => {
                self.ai_states.insert(id.clone(), value);
            }
        }
        if self.dirty_tracking {
            self.dirty.entry(id.clone()).or_default().insert(kind);
        }
    }

    /// Replace several components at once
    pub fn update_components(&mut self, id: &AgentId, components: Vec<Component>) -> Result<()> {
        if !self.ids.contains(id) {
            return Err(SimulatorError::not_found(format!(
                "update_components on unknown agent {}",
                id
            )));
        }
        for component in components {
            self.store_component(id, component);
        }
        Ok(())
    }

    /// Fetch several components at once; missing kinds are skipped
    pub fn get_components(&self, id: &AgentId, kinds: &[ComponentKind]) -> Vec<Component> {
        kinds
            .iter()
            .filter_map(|kind| self.get_component(id, *kind))
            .collect()
    }

    // ── Typed shortcuts ──────────────────────────────────────────────────

    pub fn profile(&self, id: &AgentId) -> Option<&Profile> {
        self.profiles.get(id)
    }

    pub fn set_profile(&mut self, id: &AgentId, value: Profile) -> Result<()> {
        self.set_component(id, Component::Profile(value))
    }

    pub fn health(&self, id: &AgentId) -> Option<&Health> {
        self.healths.get(id)
    }

    pub fn set_health(&mut self, id: &AgentId, value: Health) -> Result<()> {
        self.set_component(id, Component::Health(value))
    }

    pub fn needs(&self, id: &AgentId) -> Option<&Needs> {
        self.needs.get(id)
    }

    pub fn set_needs(&mut self, id: &AgentId, value: Needs) -> Result<()> {
        self.set_component(id, Component::Needs(value))
    }

    pub fn transform(&self, id: &AgentId) -> Option<&Transform> {
        self.transforms.get(id)
    }

    pub fn set_transform(&mut self, id: &AgentId, value: Transform) -> Result<()> {
        self.set_component(id, Component::Transform(value))
    }

    pub fn movement(&self, id: &AgentId) -> Option<&Movement> {
        self.movements.get(id)
    }

    pub fn set_movement(&mut self, id: &AgentId, value: Movement) -> Result<()> {
        self.set_component(id, Component::Movement(value))
    }

    pub fn inventory(&self, id: &AgentId) -> Option<&Inventory> {
        self.inventories.get(id)
    }

    pub fn set_inventory(&mut self, id: &AgentId, value: Inventory) -> Result<()> {
        self.set_component(id, Component::Inventory(value))
    }

    pub fn combat(&self, id: &AgentId) -> Option<&Combat> {
        self.combats.get(id)
    }

    pub fn set_combat(&mut self, id: &AgentId, value: Combat) -> Result<()> {
        self.set_component(id, Component::Combat(value))
    }

    pub fn role(&self, id: &AgentId) -> Option<&Role> {
        self.roles.get(id)
    }

    pub fn set_role(&mut self, id: &AgentId, value: Role) -> Result<()> {
        self.set_component(id, Component::Role(value))
    }

    pub fn social(&self, id: &AgentId) -> Option<&Social> {
        self.socials.get(id)
    }

    pub fn set_social(&mut self, id: &AgentId, value: Social) -> Result<()> {
        self.set_component(id, Component::Social(value))
    }

    pub fn ai_state(&self, id: &AgentId) -> Option<&AiState> {
        self.ai_states.get(id)
    }

    pub fn set_ai_state(&mut self, id: &AgentId, value: AiState) -> Result<()> {
        self.set_component(id, Component::Ai(value))
    }

    // ── Cached queries ───────────────────────────────────────────────────

    /// Agents whose combat component reports `is_in_combat`. Cached until
    /// the next combat write.
    pub fn agents_in_combat(&mut self) -> Vec<AgentId> {
        if self.combat_cache.is_none() {
            let mut found: Vec<AgentId> = self
                .combats
                .iter()
                .filter(|(_, combat)| combat.is_in_combat)
                .map(|(id, _)| id.clone())
                .collect();
            found.sort();
            self.combat_cache = Some(found);
        }
        self.combat_cache.clone().unwrap_or_default()
    }

    /// Agents whose movement component reports `is_moving`. Cached until
    /// the next movement write.
    pub fn agents_moving(&mut self) -> Vec<AgentId> {
        if self.moving_cache.is_none() {
            let mut found: Vec<AgentId> = self
                .movements
                .iter()
                .filter(|(_, movement)| movement.is_moving)
                .map(|(id, _)| id.clone())
                .collect();
            found.sort();
            self.moving_cache = Some(found);
        }
        self.moving_cache.clone().unwrap_or_default()
    }

    /// Agents whose health component reports them alive. Cached until the
    /// next health write.
    pub fn alive_agents(&mut self) -> Vec<AgentId> {
        if self.alive_cache.is_none() {
            let mut found: Vec<AgentId> = self
                .ids
                .iter()
                .filter(|id| {
                    self.healths
                        .get(id)
                        .map(|health| !health.is_dead)
                        .unwrap_or(false)
                })
                .cloned()
                .collect();
            found.sort();
            self.alive_cache = Some(found);
        }
        self.alive_cache.clone().unwrap_or_default()
    }

    /// Agents whose given need is at or below `threshold`
    pub fn agents_with_low_need(
        &self,
        kind: crate::agents::components::NeedKind,
        threshold: f32,
    ) -> Vec<AgentId> {
        let mut found: Vec<AgentId> = self
            .needs
            .iter()
            .filter(|(_, needs)| needs.get(kind) <= threshold)
            .map(|(id, _)| id.clone())
            .collect();
        found.sort();
        found
    }

    /// Agents within `radius` of `(x, y)` by transform scan. Prefer the
    /// spatial index inside ticks; this is the store-level fallback.
    pub fn agents_in_area(&self, x: f32, y: f32, radius: f32) -> Vec<AgentId> {
        let center = Position::new(x, y);
        let radius_sq = radius * radius;
        let mut found: Vec<AgentId> = self
            .transforms
            .iter()
            .filter(|(_, transform)| transform.position.distance_sq(&center) <= radius_sq)
            .map(|(id, _)| id.clone())
            .collect();
        found.sort();
        found
    }

    pub fn agents_in_zone(&self, zone_id: &ZoneId) -> Vec<AgentId> {
        let mut found: Vec<AgentId> = self
            .transforms
            .iter()
            .filter(|(_, transform)| transform.zone_id.as_ref() == Some(zone_id))
            .map(|(id, _)| id.clone())
            .collect();
        found.sort();
        found
    }

    pub fn agents_with_component(&self, kind: ComponentKind) -> Vec<AgentId> {
        let mut found: Vec<AgentId> = match kind {
            ComponentKind::Profile => self.profiles.keys().cloned().collect(),
            ComponentKind::Health => self.healths.keys().cloned().collect(),
            ComponentKind::Needs => self.needs.keys().cloned().collect(),
            ComponentKind::Transform => self.transforms.keys().cloned().collect(),
            ComponentKind::Movement => self.movements.keys().cloned().collect(),
            ComponentKind::Inventory => self.inventories.keys().cloned().collect(),
            ComponentKind::Combat => self.combats.keys().cloned().collect(),
            ComponentKind::Role => self.roles.keys().cloned().collect(),
            ComponentKind::Social => self.socials.keys().cloned().collect(),
            ComponentKind::Ai => self.ai_states.keys().cloned().collect(),
        };
        found.sort();
        found
    }

    fn invalidate_all_caches(&mut self) {
        self.combat_cache = None;
        self.moving_cache = None;
        self.alive_cache = None;
    }

    // ── Dirty tracking ───────────────────────────────────────────────────

    pub fn set_dirty_tracking(&mut self, enabled: bool) {
        self.dirty_tracking = enabled;
        if !enabled {
            self.dirty.clear();
        }
    }

    pub fn is_component_dirty(&self, id: &AgentId, kind: ComponentKind) -> bool {
        self.dirty
            .get(id)
            .map(|kinds| kinds.contains(&kind))
            .unwrap_or(false)
    }

    pub fn clear_dirty(&mut self, id: &AgentId) {
        self.dirty.remove(id);
    }

    pub fn clear_all_dirty(&mut self) {
        self.dirty.clear();
    }

    /// Drain the dirty map, returning every (agent, changed kinds) pair
    pub fn take_dirty(&mut self) -> Vec<(AgentId, Vec<ComponentKind>)> {
        let mut drained: Vec<(AgentId, Vec<ComponentKind>)> = self
            .dirty
            .drain()
            .map(|(id, kinds)| {
                let mut kinds: Vec<ComponentKind> = kinds.into_iter().collect();
                kinds.sort_by_key(|k| *k as usize);
                (id, kinds)
            })
            .collect();
        drained.sort_by(|a, b| a.0.cmp(&b.0));
        drained
    }

    // ── Serialization ────────────────────────────────────────────────────

    /// Full component dump in stable id order
    pub fn export_all(&self) -> Vec<(AgentId, Vec<Component>)> {
        self.ids
            .iter()
            .map(|id| {
                let components = ComponentKind::ALL
                    .iter()
                    .filter_map(|kind| self.get_component(id, *kind))
                    .collect();
                (id.clone(), components)
            })
            .collect()
    }

    /// Replace all live state with `data`
    pub fn import_all(&mut self, data: Vec<(AgentId, Vec<Component>)>) -> Result<()> {
        let mut fresh = AgentStore::new();
        fresh.dirty_tracking = self.dirty_tracking;
        for (id, components) in data {
            fresh.register_agent(id, components)?;
        }
        fresh.clear_all_dirty();
        *self = fresh;
        Ok(())
    }
}
