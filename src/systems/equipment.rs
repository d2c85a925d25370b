//! Equipment: per-agent slots plus a shared tool pool.
//!
//! The pool hands out tools with claim/return semantics; the slow pass
//! makes sure on-duty workers hold the tool their role prefers and that
//! off-duty agents give theirs back.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::agents::RoleType;
use crate::errors::Result;
use crate::events::SimulationEvent;
use crate::ports::{EquipmentPort, HandlerResult, SystemRegistry};
use crate::simulation::scheduler::SimSystem;
use crate::simulation::state::WorldState;
use crate::types::AgentId;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EquipmentSlots {
    pub weapon: Option<String>,
    pub tool: Option<String>,
    pub clothing: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolPoolEntry {
    pub total: u32,
    pub available: u32,
}

#[derive(Debug, Default)]
pub struct EquipmentLedger {
    slots: BTreeMap<AgentId, EquipmentSlots>,
    pool: BTreeMap<String, ToolPoolEntry>,
}

/// The tool each role reaches for first
pub fn preferred_tool(role: RoleType) -> Option<&'static str> {
    match role {
        RoleType::Farmer => Some("hoe"),
        RoleType::Gatherer => Some("axe"),
        RoleType::Builder | RoleType::Crafter => Some("axe"),
        RoleType::Guard => Some("spear"),
        RoleType::Merchant | RoleType::Idle => None,
    }
}

impl EquipmentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_agent(&mut self, agent: &AgentId) {
        self.slots.entry(agent.clone()).or_default();
    }

    /// Return every claimed tool and drop the agent's slots
    pub fn release_agent(&mut self, agent: &AgentId) {
        if let Some(slots) = self.slots.remove(agent) {
            if let Some(tool) = slots.tool {
                if let Some(entry) = self.pool.get_mut(&tool) {
                    entry.available = (entry.available + 1).min(entry.total);
                }
            }
        }
    }

    pub fn slots(&self, agent: &AgentId) -> Option<&EquipmentSlots> {
        self.slots.get(agent)
    }

    /// Add tools to the shared pool
    pub fn add_tools(&mut self, tool: &str, count: u32) {
        let entry = self.pool.entry(tool.to_string()).or_default();
        entry.total += count;
        entry.available += count;
    }

    pub fn pool_entry(&self, tool: &str) -> Option<&ToolPoolEntry> {
        self.pool.get(tool)
    }

    pub fn claim_tool(&mut self, agent: &AgentId, tool: &str) -> std::result::Result<(), String> {
        let Some(slots) = self.slots.get_mut(agent) else {
            return Err(format!("unknown agent {}", agent));
        };
        if slots.tool.as_deref() == Some(tool) {
            return Ok(());
        }
        if slots.tool.is_some() {
            return Err(format!("{} already holds a tool", agent));
        }
        let Some(entry) = self.pool.get_mut(tool) else {
            return Err(format!("no {} in the pool", tool));
        };
        if entry.available == 0 {
            return Err(format!("all {}s are claimed", tool));
        }
        entry.available -= 1;
        slots.tool = Some(tool.to_string());
        Ok(())
    }

    pub fn return_tool(&mut self, agent: &AgentId, tool: &str) -> std::result::Result<(), String> {
        let Some(slots) = self.slots.get_mut(agent) else {
            return Err(format!("unknown agent {}", agent));
        };
        if slots.tool.as_deref() != Some(tool) {
            return Err(format!("{} does not hold a {}", agent, tool));
        }
        slots.tool = None;
        if let Some(entry) = self.pool.get_mut(tool) {
            entry.available = (entry.available + 1).min(entry.total);
        }
        Ok(())
    }

    pub fn export(&self) -> (Vec<(AgentId, EquipmentSlots)>, Vec<(String, ToolPoolEntry)>) {
        (
            self.slots
                .iter()
                .map(|(agent, slots)| (agent.clone(), slots.clone()))
                .collect(),
            self.pool
                .iter()
                .map(|(tool, entry)| (tool.clone(), entry.clone()))
                .collect(),
        )
    }

    pub fn import(
        &mut self,
        slots: Vec<(AgentId, EquipmentSlots)>,
        pool: Vec<(String, ToolPoolEntry)>,
    ) {
        self.slots = slots.into_iter().collect();
        self.pool = pool.into_iter().collect();
    }
}

// ============================================================================
// PORT
// ============================================================================

pub struct EquipmentPortImpl;

impl EquipmentPort for EquipmentPortImpl {
    fn claim_tool(
        &self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        agent_id: &AgentId,
        tool: &str,
    ) -> HandlerResult {
        match world.equipment.claim_tool(agent_id, tool) {
            Ok(()) => HandlerResult::completed("equipment"),
            Err(message) => HandlerResult::failed("equipment", message),
        }
    }

    fn return_tool(
        &self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        agent_id: &AgentId,
        tool: &str,
    ) -> HandlerResult {
        match world.equipment.return_tool(agent_id, tool) {
            Ok(()) => HandlerResult::completed("equipment"),
            Err(message) => HandlerResult::failed("equipment", message),
        }
    }
}

// ============================================================================
// SYSTEM
// ============================================================================

pub struct EquipmentSystem;

impl SimSystem for EquipmentSystem {
    fn name(&self) -> &'static str {
        "equipment"
    }

    fn update(
        &mut self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        _dt_secs: f32,
    ) -> Result<()> {
        // Role-priority pass: on-duty workers claim their preferred tool,
        // everyone else hands theirs back for the next shift.
        for agent_id in world.store.alive_agents() {
            let Some(role) = world.store.role(&agent_id).cloned() else {
                continue;
            };
            let wanted = preferred_tool(role.role_type);
            let held = world
                .equipment
                .slots(&agent_id)
                .and_then(|slots| slots.tool.clone());

            match (role.on_duty, wanted, held) {
                (true, Some(tool), None) => {
                    if world.equipment.claim_tool(&agent_id, tool).is_ok() {
                        debug!("{} claimed a {} for duty", agent_id, tool);
                    }
                }
                (true, Some(tool), Some(held_tool)) if held_tool != tool => {
                    let _ = world.equipment.return_tool(&agent_id, &held_tool);
                    let _ = world.equipment.claim_tool(&agent_id, tool);
                }
                (false, _, Some(held_tool)) => {
                    let _ = world.equipment.return_tool(&agent_id, &held_tool);
                }
                _ => {}
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
            match event {
                SimulationEvent::AgentRemoved { agent_id, .. } => {
                    world.equipment.release_agent(agent_id);
                }
                SimulationEvent::WeaponEquipped { agent_id, weapon, .. } => {
                    // Keep the weapon slot in sync with the combat component
                    world.equipment.register_agent(agent_id);
                    if let Some(slots) = world.equipment.slots.get_mut(agent_id) {
                        slots.weapon = Some(weapon.clone());
                    }
                }
                _ => {}
            }
        }
    }
}
