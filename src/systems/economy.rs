//! Market pricing and personal work yield.
//!
//! Prices follow scarcity: the total stock of a resource across every
//! stockpile picks one of three scarcity bands over the base price. Buying
//! debits money and credits inventory as one transaction; selling is the
//! mirror image. The economy pass pays workers in kind with a per-(agent,
//! resource) residual accumulator so fractional yields are never lost.

use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::errors::Result;
use crate::events::SimulationEvent;
use crate::ports::{HandlerResult, SystemRegistry, TradePort};
use crate::simulation::scheduler::SimSystem;
use crate::simulation::state::WorldState;
use crate::types::AgentId;

/// Share of a zone's yield that a worker keeps personally, per second
const PERSONAL_YIELD_SHARE: f32 = 0.25;
/// Residual cap so a full inventory doesn't bank unbounded backpay
const RESIDUAL_CAP: f32 = 5.0;

/// Scarcity-adjusted price of one unit
pub fn price_of(world: &WorldState, item: &str) -> f32 {
    let config = &world.config.economy;
    let base = world.catalog.base_price_of(item);
    let stock = crate::systems::inventory::total_stock(world, item);
    let factor = if stock < config.scarcity_low_stock {
        config.scarcity_low_factor
    } else if stock > config.scarcity_high_stock {
        config.scarcity_high_factor
    } else {
        1.0
    };
    base * factor
}

/// Buy from the settlement stockpiles. Rolls back cleanly on any failure.
pub fn buy_resource(
    world: &mut WorldState,
    buyer: &AgentId,
    item: &str,
    quantity: u32,
) -> HandlerResult {
    if quantity == 0 {
        return HandlerResult::completed("market");
    }
    let Some(inventory) = world.store.inventory(buyer).cloned() else {
        return HandlerResult::failed("market", format!("no inventory for {}", buyer));
    };

    let price = price_of(world, item);
    let cost = price * quantity as f32;
    if inventory.money < cost {
        return HandlerResult::failed(
            "market",
            format!("{} cannot afford {} x{} ({:.1})", buyer, item, quantity, cost),
        );
    }
    let added_weight = quantity as f32 * world.catalog.weight_of(item);
    if inventory.current_load + added_weight > inventory.capacity {
        return HandlerResult::failed("market", "purchase would exceed carry capacity");
    }
    if crate::systems::inventory::total_stock(world, item) < quantity as f32 {
        return HandlerResult::failed("market", format!("not enough {} in stock", item));
    }

    // Withdraw across stockpiles
    let mut remaining = quantity as f32;
    let zone_ids: Vec<_> = world.map.zones().map(|zone| zone.id.clone()).collect();
    for zone_id in zone_ids {
        if remaining <= 0.0 {
            break;
        }
        remaining -=
            crate::systems::inventory::take_from_stockpile(world, &zone_id, item, remaining);
    }

    if crate::systems::inventory::add_resource(world, buyer, item, quantity).is_err() {
        // Capacity was pre-checked; treat this as a hard fault and refund
        return HandlerResult::failed("market", "inventory rejected purchased goods");
    }
    let Some(mut inventory) = world.store.inventory(buyer).cloned() else {
        return HandlerResult::failed("market", "buyer vanished mid-purchase");
    };
    inventory.money -= cost;
    if world.store.set_inventory(buyer, inventory).is_err() {
        return HandlerResult::failed("market", "buyer vanished mid-purchase");
    }
    debug!("{} bought {} x{} for {:.1}", buyer, item, quantity, cost);
    HandlerResult::completed("market").with_data(serde_json::json!({ "cost": cost }))
}

/// Sell into the settlement stockpiles; pays only for what fit
pub fn sell_resource(
    world: &mut WorldState,
    seller: &AgentId,
    item: &str,
    quantity: u32,
) -> HandlerResult {
    if quantity == 0 {
        return HandlerResult::completed("market");
    }
    let have = world
        .store
        .inventory(seller)
        .map(|inventory| inventory.quantity(item))
        .unwrap_or(0);
    if have < quantity {
        return HandlerResult::failed(
            "market",
            format!("{} holds {} x{}, cannot sell x{}", seller, item, have, quantity),
        );
    }

    // Deposit what the stockpiles accept, then settle for that amount
    let mut deposited = 0.0;
    let zone_ids: Vec<_> = world.map.zones().map(|zone| zone.id.clone()).collect();
    for zone_id in zone_ids {
        if deposited >= quantity as f32 {
            break;
        }
        deposited += crate::systems::inventory::add_to_stockpile(
            world,
            &zone_id,
            item,
            quantity as f32 - deposited,
        );
    }
    let sold = deposited.floor() as u32;
    if sold == 0 {
        return HandlerResult::failed("market", format!("no stockpile space for {}", item));
    }

    let price = price_of(world, item);
    let removed = crate::systems::inventory::remove_from_agent(world, seller, item, sold);
    let earned = price * removed as f32;
    if let Some(inventory) = world.store.inventory(seller) {
        let mut inventory = inventory.clone();
        inventory.money += earned;
        let _ = world.store.set_inventory(seller, inventory);
    }
    debug!("{} sold {} x{} for {:.1}", seller, item, removed, earned);
    HandlerResult::completed("market").with_data(serde_json::json!({ "earned": earned }))
}

// ============================================================================
// PORT
// ============================================================================

pub struct TradePortImpl;

impl TradePort for TradePortImpl {
    fn buy_resource(
        &self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        buyer: &AgentId,
        item: &str,
        quantity: u32,
    ) -> HandlerResult {
        buy_resource(world, buyer, item, quantity)
    }

    fn sell_resource(
        &self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        seller: &AgentId,
        item: &str,
        quantity: u32,
    ) -> HandlerResult {
        sell_resource(world, seller, item, quantity)
    }

    fn price_of(&self, world: &WorldState, item: &str) -> f32 {
        price_of(world, item)
    }
}

// ============================================================================
// SYSTEMS
// ============================================================================

/// Keeps a current price table for observability
pub struct MarketSystem {
    prices: BTreeMap<String, f32>,
}

impl MarketSystem {
    pub fn new() -> Self {
        Self {
            prices: BTreeMap::new(),
        }
    }

    pub fn prices(&self) -> &BTreeMap<String, f32> {
        &self.prices
    }
}

impl Default for MarketSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SimSystem for MarketSystem {
    fn name(&self) -> &'static str {
        "market"
    }

    fn update(
        &mut self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        _dt_secs: f32,
    ) -> Result<()> {
        self.prices.clear();
        for item in ["food", "water", "meat", "wood", "stone", "fiber", "hide"] {
            self.prices.insert(item.to_string(), price_of(world, item));
        }
        Ok(())
    }
}

/// Pays workers in kind, carrying fractional yield per (agent, resource)
pub struct EconomySystem {
    residuals: HashMap<(AgentId, String), f32>,
}

impl EconomySystem {
    pub fn new() -> Self {
        Self {
            residuals: HashMap::new(),
        }
    }
}

impl Default for EconomySystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SimSystem for EconomySystem {
    fn name(&self) -> &'static str {
        "economy"
    }

    fn update(
        &mut self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        dt_secs: f32,
    ) -> Result<()> {
        let team_bonus = world.config.economy.team_bonus_per_worker;

        // Crew sizes per zone, for the team bonus
        let mut crew_sizes: HashMap<crate::types::ZoneId, usize> = HashMap::new();
        for agent_id in world.store.alive_agents() {
            if let Some(role) = world.store.role(&agent_id) {
                if role.on_duty {
                    if let Some(zone_id) = &role.work_zone_id {
                        *crew_sizes.entry(zone_id.clone()).or_insert(0) += 1;
                    }
                }
            }
        }

        for agent_id in world.store.alive_agents() {
            let Some(role) = world.store.role(&agent_id).cloned() else {
                continue;
            };
            if !role.on_duty {
                continue;
            }
            let Some(zone_id) = role.work_zone_id.clone() else {
                continue;
            };
            let Some(resource) = world
                .map
                .zone(&zone_id)
                .and_then(|zone| zone.metadata.production_resource.clone())
            else {
                continue;
            };

            let crew = crew_sizes.get(&zone_id).copied().unwrap_or(1);
            let bonus = 1.0 + team_bonus * (crew.saturating_sub(1)) as f32;
            let accrual = PERSONAL_YIELD_SHARE * role.efficiency * bonus * dt_secs;

            let key = (agent_id.clone(), resource.clone());
            let residual = self.residuals.entry(key.clone()).or_insert(0.0);
            *residual = (*residual + accrual).min(RESIDUAL_CAP + accrual);

            let whole = residual.floor() as u32;
            if whole >= 1 {
                match crate::systems::inventory::add_resource(world, &agent_id, &resource, whole) {
                    Ok(()) => {
                        *residual -= whole as f32;
                    }
                    Err(_) => {
                        // Inventory full: keep the residual, bounded
                        *residual = residual.min(RESIDUAL_CAP);
                    }
                }
            }
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
            if let SimulationEvent::AgentRemoved { agent_id, .. } = event {
                self.residuals.retain(|(owner, _), _| owner != agent_id);
            }
        }
    }
}
