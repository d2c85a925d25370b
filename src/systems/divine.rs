//! Divine favor: per-lineage favor, a shared power pool, and time-limited
//! blessings.
//!
//! Power regenerates only while the settlement keeps offerings (food stock)
//! on hand. Lineages accrue favor from cooperative living members; when a
//! lineage's favor and the power pool both suffice, it receives a blessing
//! that softens needs decay until it expires.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::errors::Result;
use crate::events::SimulationEvent;
use crate::ports::{DivinePort, SystemRegistry};
use crate::simulation::scheduler::SimSystem;
use crate::simulation::state::WorldState;
use crate::types::LineageId;

/// Favor a lineage must reach before a blessing is considered
const BLESSING_FAVOR_THRESHOLD: f32 = 25.0;
/// Favor spent when a blessing lands
const BLESSING_FAVOR_COST: f32 = 20.0;
/// Favor gained per cooperative member per second
const FAVOR_RATE: f32 = 0.02;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blessing {
    pub name: String,
    pub granted_at: u64,
    pub expires_at: u64,
    /// Needs-decay multiplier while active (< 1.0 is beneficial)
    pub modifier: f32,
}

#[derive(Debug, Default)]
pub struct FavorLedger {
    favor: BTreeMap<LineageId, f32>,
    blessings: BTreeMap<LineageId, Vec<Blessing>>,
    power: f32,
}

impl FavorLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn favor_of(&self, lineage: &LineageId) -> f32 {
        self.favor.get(lineage).copied().unwrap_or(0.0)
    }

    pub fn power(&self) -> f32 {
        self.power
    }

    pub fn add_favor(&mut self, lineage: &LineageId, amount: f32) {
        *self.favor.entry(lineage.clone()).or_insert(0.0) += amount;
    }

    pub fn set_power(&mut self, power: f32) {
        self.power = power.max(0.0);
    }

    /// The strongest active blessing modifier for a lineage, if any
    pub fn active_modifier(&self, lineage: &LineageId, now: u64) -> Option<f32> {
        self.blessings.get(lineage).and_then(|blessings| {
            blessings
                .iter()
                .filter(|blessing| blessing.expires_at > now)
                .map(|blessing| blessing.modifier)
                .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        })
    }

    pub fn active_blessings(&self, lineage: &LineageId, now: u64) -> Vec<Blessing> {
        self.blessings
            .get(lineage)
            .map(|blessings| {
                blessings
                    .iter()
                    .filter(|blessing| blessing.expires_at > now)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn grant(&mut self, lineage: &LineageId, blessing: Blessing) {
        self.blessings
            .entry(lineage.clone())
            .or_default()
            .push(blessing);
    }

    fn expire(&mut self, now: u64) {
        for blessings in self.blessings.values_mut() {
            blessings.retain(|blessing| blessing.expires_at > now);
        }
        self.blessings.retain(|_, blessings| !blessings.is_empty());
    }

    pub fn export(&self) -> (Vec<(LineageId, f32)>, Vec<(LineageId, Vec<Blessing>)>, f32) {
        (
            self.favor
                .iter()
                .map(|(lineage, favor)| (lineage.clone(), *favor))
                .collect(),
            self.blessings
                .iter()
                .map(|(lineage, blessings)| (lineage.clone(), blessings.clone()))
                .collect(),
            self.power,
        )
    }

    pub fn import(
        &mut self,
        favor: Vec<(LineageId, f32)>,
        blessings: Vec<(LineageId, Vec<Blessing>)>,
        power: f32,
    ) {
        self.favor = favor.into_iter().collect();
        self.blessings = blessings.into_iter().collect();
        self.power = power;
    }
}

// ============================================================================
// SYSTEM
// ============================================================================

pub struct DivineFavorSystem;

impl SimSystem for DivineFavorSystem {
    fn name(&self) -> &'static str {
        "divine_favor"
    }

    fn update(
        &mut self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        dt_secs: f32,
    ) -> Result<()> {
        let now = world.now();
        let config = world.config.divine.clone();

        // Power regen is resource-limited: no offerings in storage, no regen
        let offerings = crate::systems::inventory::total_stock(world, "food");
        if offerings > 0.0 {
            world.favor.power =
                (world.favor.power + config.power_regen_per_second * dt_secs).min(config.max_power);
        }

        // Favor accrual from cooperative living members
        let mut accruals: Vec<(LineageId, f32)> = Vec::new();
        for lineage in world.genealogy.lineages() {
            let mut cooperation_sum = 0.0;
            for member in &lineage.living_members {
                if let Some(profile) = world.store.profile(member) {
                    cooperation_sum += profile.traits.cooperation;
                }
            }
            if cooperation_sum > 0.0 {
                accruals.push((lineage.id.clone(), cooperation_sum * FAVOR_RATE * dt_secs));
            }
        }
        for (lineage, amount) in accruals {
            world.favor.add_favor(&lineage, amount);
        }

        // Grant blessings where favor and power both suffice
        let candidates: Vec<LineageId> = world
            .favor
            .favor
            .iter()
            .filter(|(_, favor)| **favor >= BLESSING_FAVOR_THRESHOLD)
            .map(|(lineage, _)| lineage.clone())
            .collect();
        for lineage in candidates {
            if world.favor.power < config.blessing_cost {
                break;
            }
            if world.favor.active_modifier(&lineage, now).is_some() {
                continue;
            }
            world.favor.power -= config.blessing_cost;
            *world.favor.favor.entry(lineage.clone()).or_insert(0.0) -= BLESSING_FAVOR_COST;
            let expires_at = now + (config.blessing_duration_secs * 1000.0) as u64;
            let blessing = Blessing {
                name: "hearth_blessing".to_string(),
                granted_at: now,
                expires_at,
                modifier: config.blessed_decay_modifier,
            };
            info!("lineage {} received {}", lineage, blessing.name);
            world.favor.grant(&lineage, blessing.clone());
            world.events.emit(SimulationEvent::BlessingGranted {
                lineage_id: lineage,
                blessing: blessing.name,
                expires_at,
                timestamp: now,
            });
        }

        world.favor.expire(now);
        Ok(())
    }
}

// ============================================================================
// PORT
// ============================================================================

pub struct DivinePortImpl;

impl DivinePort for DivinePortImpl {
    fn need_decay_modifier(&self, world: &WorldState, lineage: Option<&LineageId>) -> f32 {
        let Some(lineage) = lineage else {
            return 1.0;
        };
        world
            .favor
            .active_modifier(lineage, world.now())
            .unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blessing_modifier_and_expiry() {
        let mut ledger = FavorLedger::new();
        let lineage = LineageId::new("lineage-1");
        ledger.grant(
            &lineage,
            Blessing {
                name: "test".to_string(),
                granted_at: 0,
                expires_at: 1000,
                modifier: 0.6,
            },
        );

        assert_eq!(ledger.active_modifier(&lineage, 500), Some(0.6));
        assert_eq!(ledger.active_modifier(&lineage, 1000), None, "expiry is exclusive");

        ledger.expire(1000);
        assert!(ledger.active_blessings(&lineage, 500).is_empty());
    }

    #[test]
    fn test_strongest_blessing_wins() {
        let mut ledger = FavorLedger::new();
        let lineage = LineageId::new("lineage-1");
        ledger.grant(
            &lineage,
            Blessing {
                name: "weak".to_string(),
                granted_at: 0,
                expires_at: 1000,
                modifier: 0.9,
            },
        );
        ledger.grant(
            &lineage,
            Blessing {
                name: "strong".to_string(),
                granted_at: 0,
                expires_at: 1000,
                modifier: 0.5,
            },
        );
        assert_eq!(ledger.active_modifier(&lineage, 10), Some(0.5));
    }

    #[test]
    fn test_export_import_roundtrip() {
        let mut ledger = FavorLedger::new();
        let lineage = LineageId::new("lineage-1");
        ledger.add_favor(&lineage, 12.5);
        ledger.set_power(40.0);
        ledger.grant(
            &lineage,
            Blessing {
                name: "test".to_string(),
                granted_at: 0,
                expires_at: 99,
                modifier: 0.7,
            },
        );

        let (favor, blessings, power) = ledger.export();
        let mut restored = FavorLedger::new();
        restored.import(favor, blessings, power);
        assert_eq!(restored.favor_of(&lineage), 12.5);
        assert_eq!(restored.power(), 40.0);
        assert_eq!(restored.active_modifier(&lineage, 50), Some(0.7));
    }
}
