//! Port interfaces and the system registry.
//!
//! Subsystems never import each other: cross-system work goes through a
//! narrow port trait resolved from the registry at call time. Every port
//! verb that triggers work returns a `HandlerResult` so callers (usually the
//! decision layer) treat all delegations uniformly.
//!
//! Port implementations are small adapter values registered at construction;
//! they operate on `WorldState` (plus the registry itself, for verbs that
//! delegate further), which is what breaks dependency cycles like
//! combat -> inventory -> crafting -> combat.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::agents::NeedKind;
use crate::errors::Result;
use crate::simulation::state::WorldState;
use crate::types::{AgentId, AnimalId, LineageId, Position, ZoneId};

// ============================================================================
// HANDLER RESULT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerStatus {
    Delegated,
    Completed,
    Failed,
    InProgress,
}

/// Uniform return shape for port verbs
#[derive(Debug, Clone, Serialize)]
pub struct HandlerResult {
    pub status: HandlerStatus,
    pub system: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl HandlerResult {
    pub fn completed(system: &'static str) -> Self {
        Self {
            status: HandlerStatus::Completed,
            system,
            message: None,
            data: None,
        }
    }

    pub fn delegated(system: &'static str) -> Self {
        Self {
            status: HandlerStatus::Delegated,
            system,
            message: None,
            data: None,
        }
    }

    pub fn in_progress(system: &'static str) -> Self {
        Self {
            status: HandlerStatus::InProgress,
            system,
            message: None,
            data: None,
        }
    }

    pub fn failed<S: Into<String>>(system: &'static str, message: S) -> Self {
        Self {
            status: HandlerStatus::Failed,
            system,
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_failure(&self) -> bool {
        self.status == HandlerStatus::Failed
    }
}

// ============================================================================
// PORT TRAITS
// ============================================================================

/// Movement requests install targets; the movement system advances them
pub trait MovementPort: Send {
    fn request_move(
        &self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        agent_id: &AgentId,
        target: Position,
    ) -> HandlerResult;

    fn request_move_to_zone(
        &self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        agent_id: &AgentId,
        zone_id: &ZoneId,
    ) -> HandlerResult;

    fn request_move_to_entity(
        &self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        agent_id: &AgentId,
        entity_id: &AgentId,
    ) -> HandlerResult;

    fn stop_movement(
        &self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        agent_id: &AgentId,
    ) -> HandlerResult;
}

pub trait NeedsPort: Send {
    fn satisfy_need(
        &self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        agent_id: &AgentId,
        kind: NeedKind,
        amount: f32,
    ) -> HandlerResult;

    fn need_level(&self, world: &WorldState, agent_id: &AgentId, kind: NeedKind) -> Option<f32>;
}

pub trait InventoryPort: Send {
    /// Add `quantity` of `item` to an agent; fails if capacity is exceeded
    fn add_resource(
        &self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        agent_id: &AgentId,
        item: &str,
        quantity: u32,
    ) -> HandlerResult;

    /// Remove up to `quantity`, returning how many were actually removed
    fn remove_from_agent(
        &self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        agent_id: &AgentId,
        item: &str,
        quantity: u32,
    ) -> u32;

    /// All-or-nothing transfer of several stacks between two agents
    fn transfer_between_agents(
        &self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        from: &AgentId,
        to: &AgentId,
        items: &BTreeMap<String, u32>,
    ) -> HandlerResult;

    /// All-or-nothing consumption of several stacks
    fn consume_from_agent(
        &self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        agent_id: &AgentId,
        items: &BTreeMap<String, u32>,
    ) -> HandlerResult;

    /// Deposit into a zone stockpile, returning the amount that fit
    fn add_to_stockpile(
        &self,
        world: &mut WorldState,
        zone_id: &ZoneId,
        resource: &str,
        amount: f32,
    ) -> f32;

    /// Withdraw from a zone stockpile, returning the amount obtained
    fn take_from_stockpile(
        &self,
        world: &mut WorldState,
        zone_id: &ZoneId,
        resource: &str,
        amount: f32,
    ) -> f32;
}

pub trait CombatPort: Send {
    fn equip_weapon(
        &self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        agent_id: &AgentId,
        weapon: &str,
    ) -> HandlerResult;

    /// Craft a weapon, consuming its resource cost through the inventory port
    fn craft_weapon(
        &self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        agent_id: &AgentId,
        weapon: &str,
    ) -> HandlerResult;
}

pub trait SocialPort: Send {
    fn affinity(&self, world: &WorldState, a: &AgentId, b: &AgentId) -> f32;

    /// Symmetric edge adjustment, clamped to [-1, 1]
    fn add_edge(
        &self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        a: &AgentId,
        b: &AgentId,
        delta: f32,
    ) -> HandlerResult;
}

/// Parameters for spawning a new agent
#[derive(Debug, Clone, Default)]
pub struct SpawnSpec {
    pub name: Option<String>,
    pub sex: Option<crate::agents::Sex>,
    pub age_years: f32,
    pub position: Option<Position>,
    pub parents: Option<(AgentId, AgentId)>,
    pub immortal: bool,
}

pub trait LifecyclePort: Send {
    fn spawn_agent(
        &self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        spec: SpawnSpec,
    ) -> Result<AgentId>;

    /// Remove a dead or despawned agent, emitting `agent:removed`
    fn remove_agent(
        &self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        agent_id: &AgentId,
        reason: &str,
    ) -> HandlerResult;
}

pub trait CraftingPort: Send {
    fn attempt_craft(
        &self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        agent_id: &AgentId,
        recipe_id: &str,
    ) -> HandlerResult;

    fn knows_recipe(&self, world: &WorldState, agent_id: &AgentId, recipe_id: &str) -> bool;
}

pub trait BuildingPort: Send {
    fn request_construction(
        &self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        zone_id: &ZoneId,
        label: &str,
    ) -> HandlerResult;
}

pub trait TradePort: Send {
    fn buy_resource(
        &self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        buyer: &AgentId,
        item: &str,
        quantity: u32,
    ) -> HandlerResult;

    fn sell_resource(
        &self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        seller: &AgentId,
        item: &str,
        quantity: u32,
    ) -> HandlerResult;

    fn price_of(&self, world: &WorldState, item: &str) -> f32;
}

pub trait AnimalsPort: Send {
    /// Apply damage from a hunter; handles death, loot and events
    fn damage_animal(
        &self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        animal_id: &AnimalId,
        attacker: &AgentId,
        damage: f32,
    ) -> HandlerResult;

    fn animal_position(&self, world: &WorldState, animal_id: &AnimalId) -> Option<Position>;
}

pub trait DivinePort: Send {
    /// Needs-decay multiplier for an agent's lineage (1.0 when unblessed)
    fn need_decay_modifier(&self, world: &WorldState, lineage: Option<&LineageId>) -> f32;
}

pub trait EquipmentPort: Send {
    fn claim_tool(
        &self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        agent_id: &AgentId,
        tool: &str,
    ) -> HandlerResult;

    fn return_tool(
        &self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        agent_id: &AgentId,
        tool: &str,
    ) -> HandlerResult;
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Typed capability slots. Systems resolve each other exclusively through
/// this; a missing capability is an ordinary runtime condition, answered
/// with a failed `HandlerResult` by callers.
#[derive(Default)]
pub struct SystemRegistry {
    movement: Option<Box<dyn MovementPort>>,
    needs: Option<Box<dyn NeedsPort>>,
    inventory: Option<Box<dyn InventoryPort>>,
    combat: Option<Box<dyn CombatPort>>,
    social: Option<Box<dyn SocialPort>>,
    lifecycle: Option<Box<dyn LifecyclePort>>,
    crafting: Option<Box<dyn CraftingPort>>,
    building: Option<Box<dyn BuildingPort>>,
    trade: Option<Box<dyn TradePort>>,
    animals: Option<Box<dyn AnimalsPort>>,
    divine: Option<Box<dyn DivinePort>>,
    equipment: Option<Box<dyn EquipmentPort>>,
}

macro_rules! registry_slot {
    ($field:ident, $register:ident, $unregister:ident, $trait_ty:ty) => {
        pub fn $register(&mut self, port: Box<$trait_ty>) {
            self.$field = Some(port);
        }

        pub fn $field(&self) -> Option<&$trait_ty> {
            self.$field.as_deref()
        }

        pub fn $unregister(&mut self) -> bool {
            self.$field.take().is_some()
        }
    };
}

impl SystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    registry_slot!(movement, register_movement, unregister_movement, dyn MovementPort);
    registry_slot!(needs, register_needs, unregister_needs, dyn NeedsPort);
    registry_slot!(inventory, register_inventory, unregister_inventory, dyn InventoryPort);
    registry_slot!(combat, register_combat, unregister_combat, dyn CombatPort);
    registry_slot!(social, register_social, unregister_social, dyn SocialPort);
    registry_slot!(lifecycle, register_lifecycle, unregister_lifecycle, dyn LifecyclePort);
    registry_slot!(crafting, register_crafting, unregister_crafting, dyn CraftingPort);
    registry_slot!(building, register_building, unregister_building, dyn BuildingPort);
    registry_slot!(trade, register_trade, unregister_trade, dyn TradePort);
    registry_slot!(animals, register_animals, unregister_animals, dyn AnimalsPort);
    registry_slot!(divine, register_divine, unregister_divine, dyn DivinePort);
    registry_slot!(equipment, register_equipment, unregister_equipment, dyn EquipmentPort);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullDivine;

    impl DivinePort for NullDivine {
        fn need_decay_modifier(&self, _world: &WorldState, _lineage: Option<&LineageId>) -> f32 {
            1.0
        }
    }

    #[test]
    fn test_register_get_unregister() {
        let mut registry = SystemRegistry::new();
        assert!(registry.divine().is_none());

        registry.register_divine(Box::new(NullDivine));
        assert!(registry.divine().is_some());

        assert!(registry.unregister_divine());
        assert!(!registry.unregister_divine());
        assert!(registry.divine().is_none());
    }

    #[test]
    fn test_handler_result_helpers() {
        let ok = HandlerResult::completed("movement");
        assert_eq!(ok.status, HandlerStatus::Completed);
        assert!(!ok.is_failure());

        let bad = HandlerResult::failed("combat", "no target");
        assert!(bad.is_failure());
        assert_eq!(bad.message.as_deref(), Some("no target"));

        let with_data =
            HandlerResult::completed("lifecycle").with_data(serde_json::json!({"agent_id": "a"}));
        assert_eq!(with_data.data.unwrap()["agent_id"], "a");
    }
}
