//! Inventory: per-agent item stacks plus per-zone stockpiles.
//!
//! All mutations are atomic at the API level: transfers and multi-item
//! consumption either apply completely or not at all, and every successful
//! mutation emits `inventory:changed`.

use std::collections::BTreeMap;
use tracing::debug;

use crate::agents::Inventory;
use crate::errors::{Result, SimulatorError};
use crate::events::SimulationEvent;
use crate::ports::{
    HandlerResult, InventoryPort, SystemRegistry,
};
use crate::simulation::scheduler::SimSystem;
use crate::simulation::state::WorldState;
use crate::types::{AgentId, ZoneId};
use crate::world::Stockpile;

// ============================================================================
// ITEM CATALOG
// ============================================================================

#[derive(Debug, Clone)]
pub struct ItemDef {
    pub weight: f32,
    pub base_price: f32,
}

/// Static item table: weights drive carry load, base prices feed the market
#[derive(Debug, Clone)]
pub struct ItemCatalog {
    items: BTreeMap<String, ItemDef>,
}

impl ItemCatalog {
    pub fn standard() -> Self {
        let mut items = BTreeMap::new();
        let mut define = |name: &str, weight: f32, base_price: f32| {
            items.insert(name.to_string(), ItemDef { weight, base_price });
        };
        define("food", 0.5, 2.0);
        define("water", 0.5, 1.0);
        define("meat", 1.0, 5.0);
        define("wood", 2.0, 3.0);
        define("stone", 3.0, 4.0);
        define("fiber", 0.3, 1.5);
        define("hide", 1.5, 6.0);
        define("spear", 2.0, 14.0);
        define("bow", 1.5, 20.0);
        define("sword", 3.0, 35.0);
        define("axe", 2.5, 12.0);
        define("pickaxe", 3.0, 12.0);
        define("hoe", 2.0, 10.0);
        Self { items }
    }

    pub fn weight_of(&self, item: &str) -> f32 {
        self.items.get(item).map(|def| def.weight).unwrap_or(1.0)
    }

    pub fn base_price_of(&self, item: &str) -> f32 {
        self.items.get(item).map(|def| def.base_price).unwrap_or(1.0)
    }
}

// ============================================================================
// CORE OPERATIONS
// ============================================================================

fn load_of(catalog: &ItemCatalog, inventory: &Inventory) -> f32 {
    inventory
        .items
        .iter()
        .map(|(item, stack)| stack.quantity as f32 * catalog.weight_of(item))
        .sum()
}

fn emit_change(world: &mut WorldState, agent_id: &AgentId, item: &str, delta: i64) {
    let now = world.now();
    world.events.emit(SimulationEvent::InventoryChanged {
        agent_id: agent_id.clone(),
        item: item.to_string(),
        delta,
        timestamp: now,
    });
}

/// Add `quantity` of `item` to an agent. Fails without side effects when the
/// added weight would exceed capacity.
pub fn add_resource(
    world: &mut WorldState,
    agent_id: &AgentId,
    item: &str,
    quantity: u32,
) -> Result<()> {
    if quantity == 0 {
        return Ok(());
    }
    let mut inventory = world
        .store
        .inventory(agent_id)
        .cloned()
        .ok_or_else(|| SimulatorError::not_found(format!("no inventory for {}", agent_id)))?;

    let added_weight = quantity as f32 * world.catalog.weight_of(item);
    if inventory.current_load + added_weight > inventory.capacity {
        return Err(SimulatorError::invariant(format!(
            "inventory of {} over capacity: {:.1} + {:.1} > {:.1}",
            agent_id, inventory.current_load, added_weight, inventory.capacity
        )));
    }

    let stack = inventory.items.entry(item.to_string()).or_insert_with(|| {
        crate::agents::ItemStack {
            quantity: 0,
            metadata: None,
        }
    });
    stack.quantity += quantity;
    inventory.current_load = load_of(&world.catalog, &inventory);
    world.store.set_inventory(agent_id, inventory)?;
    emit_change(world, agent_id, item, quantity as i64);
    Ok(())
}

/// Remove up to `quantity` of `item`, returning the amount actually removed
pub fn remove_from_agent(
    world: &mut WorldState,
    agent_id: &AgentId,
    item: &str,
    quantity: u32,
) -> u32 {
    let Some(mut inventory) = world.store.inventory(agent_id).cloned() else {
        return 0;
    };
    let have = inventory.quantity(item);
    let removed = have.min(quantity);
    if removed == 0 {
        return 0;
    }
    if removed == have {
        inventory.items.remove(item);
    } else if let Some(stack) = inventory.items.get_mut(item) {
        stack.quantity -= removed;
    }
    inventory.current_load = load_of(&world.catalog, &inventory);
    if world.store.set_inventory(agent_id, inventory).is_ok() {
        emit_change(world, agent_id, item, -(removed as i64));
        removed
    } else {
        0
    }
}

/// Transactional transfer: either every stack moves or nothing does
pub fn transfer_between_agents(
    world: &mut WorldState,
    from: &AgentId,
    to: &AgentId,
    items: &BTreeMap<String, u32>,
) -> Result<()> {
    let source = world
        .store
        .inventory(from)
        .cloned()
        .ok_or_else(|| SimulatorError::not_found(format!("no inventory for {}", from)))?;
    let mut dest = world
        .store
        .inventory(to)
        .cloned()
        .ok_or_else(|| SimulatorError::not_found(format!("no inventory for {}", to)))?;

    // Validate both sides before touching anything
    let mut moved_weight = 0.0;
    for (item, quantity) in items {
        if source.quantity(item) < *quantity {
            return Err(SimulatorError::invariant(format!(
                "{} holds {} x{}, cannot transfer x{}",
                from,
                item,
                source.quantity(item),
                quantity
            )));
        }
        moved_weight += *quantity as f32 * world.catalog.weight_of(item);
    }
    if dest.current_load + moved_weight > dest.capacity {
        return Err(SimulatorError::invariant(format!(
            "transfer would overflow {} ({:.1} + {:.1} > {:.1})",
            to, dest.current_load, moved_weight, dest.capacity
        )));
    }

    let mut source = source;
    for (item, quantity) in items {
        if *quantity == 0 {
            continue;
        }
        let have = source.quantity(item);
        if have == *quantity {
            source.items.remove(item);
        } else if let Some(stack) = source.items.get_mut(item) {
            stack.quantity -= quantity;
        }
        let stack = dest.items.entry(item.clone()).or_insert_with(|| {
            crate::agents::ItemStack {
                quantity: 0,
                metadata: None,
            }
        });
        stack.quantity += quantity;
    }
    source.current_load = load_of(&world.catalog, &source);
    dest.current_load = load_of(&world.catalog, &dest);
    world.store.set_inventory(from, source)?;
    world.store.set_inventory(to, dest)?;

    for (item, quantity) in items {
        if *quantity == 0 {
            continue;
        }
        emit_change(world, from, item, -(*quantity as i64));
        emit_change(world, to, item, *quantity as i64);
    }
    Ok(())
}

/// Transactional consume: validates every stack first
pub fn consume_from_agent(
    world: &mut WorldState,
    agent_id: &AgentId,
    items: &BTreeMap<String, u32>,
) -> Result<()> {
    let inventory = world
        .store
        .inventory(agent_id)
        .cloned()
        .ok_or_else(|| SimulatorError::not_found(format!("no inventory for {}", agent_id)))?;
    for (item, quantity) in items {
        if inventory.quantity(item) < *quantity {
            return Err(SimulatorError::invariant(format!(
                "{} holds {} x{}, cannot consume x{}",
                agent_id,
                item,
                inventory.quantity(item),
                quantity
            )));
        }
    }
    for (item, quantity) in items {
        remove_from_agent(world, agent_id, item, *quantity);
    }
    Ok(())
}

// ── Stockpiles ───────────────────────────────────────────────────────────

pub fn create_stockpile(
    world: &mut WorldState,
    zone_id: &ZoneId,
    resource: &str,
    capacity: f32,
) -> Result<()> {
    let zone = world
        .map
        .zone_mut(zone_id)
        .ok_or_else(|| SimulatorError::not_found(format!("no zone {}", zone_id)))?;
    if zone.stockpile(resource).is_some() {
        return Err(SimulatorError::invariant(format!(
            "zone {} already has a {} stockpile",
            zone_id, resource
        )));
    }
    zone.stockpiles.push(Stockpile::new(resource, capacity));
    debug!("created {} stockpile in {}", resource, zone_id);
    Ok(())
}

/// Deposit into a zone stockpile, returning how much fit
pub fn add_to_stockpile(
    world: &mut WorldState,
    zone_id: &ZoneId,
    resource: &str,
    amount: f32,
) -> f32 {
    world
        .map
        .zone_mut(zone_id)
        .and_then(|zone| zone.stockpile_mut(resource))
        .map(|pile| pile.add(amount))
        .unwrap_or(0.0)
}

/// Withdraw from a zone stockpile, returning how much was obtained
pub fn take_from_stockpile(
    world: &mut WorldState,
    zone_id: &ZoneId,
    resource: &str,
    amount: f32,
) -> f32 {
    world
        .map
        .zone_mut(zone_id)
        .and_then(|zone| zone.stockpile_mut(resource))
        .map(|pile| pile.remove(amount))
        .unwrap_or(0.0)
}

pub fn stockpiles_in_zone(world: &WorldState, zone_id: &ZoneId) -> Vec<Stockpile> {
    world
        .map
        .zone(zone_id)
        .map(|zone| zone.stockpiles.clone())
        .unwrap_or_default()
}

/// Total stock of a resource across every zone stockpile
pub fn total_stock(world: &WorldState, resource: &str) -> f32 {
    world
        .map
        .zones()
        .filter_map(|zone| zone.stockpile(resource))
        .map(|pile| pile.amount)
        .sum()
}

// ============================================================================
// PORT
// ============================================================================

pub struct InventoryPortImpl;

impl InventoryPort for InventoryPortImpl {
    fn add_resource(
        &self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        agent_id: &AgentId,
        item: &str,
        quantity: u32,
    ) -> HandlerResult {
        match add_resource(world, agent_id, item, quantity) {
            Ok(()) => HandlerResult::completed("inventory"),
            Err(err) => HandlerResult::failed("inventory", err.to_string()),
        }
    }

    fn remove_from_agent(
        &self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        agent_id: &AgentId,
        item: &str,
        quantity: u32,
    ) -> u32 {
        remove_from_agent(world, agent_id, item, quantity)
    }

    fn transfer_between_agents(
        &self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        from: &AgentId,
        to: &AgentId,
        items: &BTreeMap<String, u32>,
    ) -> HandlerResult {
        match transfer_between_agents(world, from, to, items) {
            Ok(()) => HandlerResult::completed("inventory"),
            Err(err) => HandlerResult::failed("inventory", err.to_string()),
        }
    }

    fn consume_from_agent(
        &self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        agent_id: &AgentId,
        items: &BTreeMap<String, u32>,
    ) -> HandlerResult {
        match consume_from_agent(world, agent_id, items) {
            Ok(()) => HandlerResult::completed("inventory"),
            Err(err) => HandlerResult::failed("inventory", err.to_string()),
        }
    }

    fn add_to_stockpile(
        &self,
        world: &mut WorldState,
        zone_id: &ZoneId,
        resource: &str,
        amount: f32,
    ) -> f32 {
        add_to_stockpile(world, zone_id, resource, amount)
    }

    fn take_from_stockpile(
        &self,
        world: &mut WorldState,
        zone_id: &ZoneId,
        resource: &str,
        amount: f32,
    ) -> f32 {
        take_from_stockpile(world, zone_id, resource, amount)
    }
}

// ============================================================================
// SYSTEM
// ============================================================================

/// Slow audit pass: recomputes carry loads so drift from any missed update
/// is corrected instead of compounding.
pub struct InventorySystem;

impl SimSystem for InventorySystem {
    fn name(&self) -> &'static str {
        "inventory"
    }

    fn update(
        &mut self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        _dt_secs: f32,
    ) -> Result<()> {
        for agent_id in world.store.all_agent_ids() {
            let Some(inventory) = world.store.inventory(&agent_id) else {
                continue;
            };
            let expected = load_of(&world.catalog, inventory);
            if (expected - inventory.current_load).abs() > f32::EPSILON {
                let mut fixed = inventory.clone();
                fixed.current_load = expected;
                world.store.set_inventory(&agent_id, fixed)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{Component, Health, Inventory};
    use crate::config::SimConfig;
    use crate::world::{Zone, ZoneType};
    use crate::types::Position;

    fn world_with_agents(capacities: &[(&str, f32)]) -> WorldState {
        let mut world = WorldState::for_tests(SimConfig::default());
        for (id, capacity) in capacities {
            world
                .store
                .register_agent(
                    AgentId::from(*id),
                    vec![
                        Component::Health(Health::new(100.0)),
                        Component::Inventory(Inventory::with_capacity(*capacity, 10.0)),
                    ],
                )
                .unwrap();
        }
        world
    }

    #[test]
    fn test_add_then_remove_is_identity() {
        let mut world = world_with_agents(&[("a", 100.0)]);
        let agent = AgentId::from("a");

        add_resource(&mut world, &agent, "wood", 5).unwrap();
        assert_eq!(world.store.inventory(&agent).unwrap().quantity("wood"), 5);
        assert_eq!(world.store.inventory(&agent).unwrap().current_load, 10.0);

        let removed = remove_from_agent(&mut world, &agent, "wood", 5);
        assert_eq!(removed, 5);
        let inventory = world.store.inventory(&agent).unwrap();
        assert_eq!(inventory.quantity("wood"), 0);
        assert_eq!(inventory.current_load, 0.0);
    }

    #[test]
    fn test_add_over_capacity_rejected_without_side_effects() {
        let mut world = world_with_agents(&[("a", 5.0)]);
        let agent = AgentId::from("a");

        // 3 stone x 3.0 weight = 9.0 > 5.0 capacity
        assert!(add_resource(&mut world, &agent, "stone", 3).is_err());
        assert_eq!(world.store.inventory(&agent).unwrap().quantity("stone"), 0);
    }

    #[test]
    fn test_transfer_atomicity_on_capacity_failure() {
        let mut world = world_with_agents(&[("a", 100.0), ("b", 3.0)]);
        let a = AgentId::from("a");
        let b = AgentId::from("b");
        add_resource(&mut world, &a, "wood", 5).unwrap();

        let mut wanted = BTreeMap::new();
        wanted.insert("wood".to_string(), 5);
        let result = transfer_between_agents(&mut world, &a, &b, &wanted);
        assert!(result.is_err(), "transfer must fail on capacity");

        assert_eq!(world.store.inventory(&a).unwrap().quantity("wood"), 5);
        assert_eq!(world.store.inventory(&b).unwrap().quantity("wood"), 0);
    }

    #[test]
    fn test_transfer_preserves_total() {
        let mut world = world_with_agents(&[("a", 100.0), ("b", 100.0)]);
        let a = AgentId::from("a");
        let b = AgentId::from("b");
        add_resource(&mut world, &a, "food", 8).unwrap();

        let mut moved = BTreeMap::new();
        moved.insert("food".to_string(), 3);
        transfer_between_agents(&mut world, &a, &b, &moved).unwrap();

        let total = world.store.inventory(&a).unwrap().quantity("food")
            + world.store.inventory(&b).unwrap().quantity("food");
        assert_eq!(total, 8);
        assert_eq!(world.store.inventory(&b).unwrap().quantity("food"), 3);
    }

    #[test]
    fn test_consume_is_all_or_nothing() {
        let mut world = world_with_agents(&[("a", 100.0)]);
        let agent = AgentId::from("a");
        add_resource(&mut world, &agent, "wood", 2).unwrap();
        add_resource(&mut world, &agent, "fiber", 1).unwrap();

        let mut wanted = BTreeMap::new();
        wanted.insert("wood".to_string(), 2);
        wanted.insert("fiber".to_string(), 3);
        assert!(consume_from_agent(&mut world, &agent, &wanted).is_err());
        assert_eq!(world.store.inventory(&agent).unwrap().quantity("wood"), 2);

        wanted.insert("fiber".to_string(), 1);
        consume_from_agent(&mut world, &agent, &wanted).unwrap();
        assert_eq!(world.store.inventory(&agent).unwrap().quantity("wood"), 0);
        assert_eq!(world.store.inventory(&agent).unwrap().quantity("fiber"), 0);
    }

    #[test]
    fn test_mutations_emit_inventory_changed() {
        let mut world = world_with_agents(&[("a", 100.0)]);
        let agent = AgentId::from("a");
        add_resource(&mut world, &agent, "wood", 2).unwrap();
        remove_from_agent(&mut world, &agent, "wood", 1);

        let flushed = world.events.flush_events();
        let deltas: Vec<i64> = flushed
            .iter()
            .filter_map(|event| match event {
                SimulationEvent::InventoryChanged { delta, .. } => Some(*delta),
                _ => None,
            })
            .collect();
        assert_eq!(deltas, vec![2, -1]);
    }

    #[test]
    fn test_stockpile_roundtrip() {
        let mut world = world_with_agents(&[]);
        let zone_id = ZoneId::from("z");
        world.map.add_zone(Zone::rect(
            zone_id.clone(),
            "Test",
            ZoneType::Storage,
            Position::new(0.0, 0.0),
            Position::new(4.0, 4.0),
        ));

        create_stockpile(&mut world, &zone_id, "wood", 10.0).unwrap();
        assert!(create_stockpile(&mut world, &zone_id, "wood", 10.0).is_err());

        assert_eq!(add_to_stockpile(&mut world, &zone_id, "wood", 6.0), 6.0);
        assert_eq!(add_to_stockpile(&mut world, &zone_id, "wood", 6.0), 4.0);
        assert_eq!(take_from_stockpile(&mut world, &zone_id, "wood", 3.0), 3.0);
        assert_eq!(total_stock(&world, "wood"), 7.0);
        assert_eq!(stockpiles_in_zone(&world, &zone_id).len(), 1);
    }
}
