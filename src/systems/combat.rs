//! Combat: engagement scanning, attack resolution, weapons.
//!
//! Each MEDIUM tick every alive combatant scans the spatial index for
//! candidates inside its weapon range. `should_attack` decides hostility:
//! an animal target is always hostile, agents by low affinity or by high
//! aggression through a small random gate. Damage follows
//! `base x jitter x (0.5 + aggression x k) x crit`, hits on already-dead
//! targets are no-ops, and kills delegate removal to Lifecycle through its
//! port. A bounded ring buffer keeps the recent combat history.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use rand::Rng;
use tracing::debug;

use crate::errors::Result;
use crate::events::{CombatTarget, SimulationEvent};
use crate::ports::{CombatPort, HandlerResult, SystemRegistry};
use crate::simulation::scheduler::SimSystem;
use crate::simulation::state::WorldState;
use crate::types::{AgentId, AnimalId};

// ============================================================================
// WEAPONS
// ============================================================================

#[derive(Debug, Clone)]
pub struct WeaponDef {
    pub id: &'static str,
    pub range: f32,
    pub damage_multiplier: f32,
    pub cooldown_ms: u64,
    pub craft_cost: &'static [(&'static str, u32)],
}

pub const UNARMED: &str = "unarmed";

/// The fallback weapon: bare hands with a short reach
pub fn unarmed() -> WeaponDef {
    WeaponDef {
        id: UNARMED,
        range: 1.5,
        damage_multiplier: 1.0,
        cooldown_ms: 1200,
        craft_cost: &[],
    }
}

/// Closed weapon table. Unarmed is the implicit default with short range.
pub fn weapon_def(id: &str) -> Option<WeaponDef> {
    match id {
        UNARMED => Some(unarmed()),
        "spear" => Some(WeaponDef {
            id: "spear",
            range: 2.5,
            damage_multiplier: 1.5,
            cooldown_ms: 1400,
            craft_cost: &[("wood", 2), ("fiber", 1)],
        }),
        "bow" => Some(WeaponDef {
            id: "bow",
            range: 6.0,
            damage_multiplier: 1.2,
            cooldown_ms: 1800,
            craft_cost: &[("wood", 2), ("fiber", 2)],
        }),
        "sword" => Some(WeaponDef {
            id: "sword",
            range: 1.8,
            damage_multiplier: 2.0,
            cooldown_ms: 1000,
            craft_cost: &[("wood", 1), ("stone", 2)],
        }),
        _ => None,
    }
}

fn equipped_weapon(world: &WorldState, agent_id: &AgentId) -> WeaponDef {
    world
        .store
        .combat(agent_id)
        .and_then(|combat| combat.equipped_weapon.as_deref().and_then(weapon_def))
        .unwrap_or_else(unarmed)
}

// ============================================================================
// COMBAT LOG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatLogEntry {
    pub timestamp: u64,
    pub attacker: AgentId,
    pub target: CombatTarget,
    pub damage: f32,
    pub fatal: bool,
}

/// Bounded ring buffer of recent combat events
#[derive(Debug)]
pub struct CombatLog {
    entries: VecDeque<CombatLogEntry>,
    capacity: usize,
}

impl CombatLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, entry: CombatLogEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> Vec<CombatLogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn replace(&mut self, entries: Vec<CombatLogEntry>) {
        self.entries = entries
            .into_iter()
            .rev()
            .take(self.capacity)
            .rev()
            .collect();
    }
}

// ============================================================================
// RESOLUTION
// ============================================================================

/// Hostility check. True when the target is an animal, when affinity is at
/// or below the hostility threshold, or when the attacker's aggression
/// clears its threshold through a small random gate.
pub fn should_attack(world: &mut WorldState, attacker: &AgentId, target: &CombatTarget) -> bool {
    let target = match target {
        CombatTarget::Animal(_) => return true,
        CombatTarget::Agent(target) => target,
    };
    let config = &world.config.combat;
    let affinity = world.social_graph.affinity(attacker, target);
    if affinity <= config.hostility_affinity {
        return true;
    }
    let aggression = world
        .store
        .profile(attacker)
        .map(|profile| profile.traits.aggression)
        .unwrap_or(0.0);
    if aggression >= config.aggression_threshold {
        let gate = world.config.combat.unprovoked_chance;
        return gate > 0.0 && world.rng.gen::<f32>() < gate;
    }
    false
}

fn roll_damage(world: &mut WorldState, attacker: &AgentId, weapon: &WeaponDef) -> (f32, bool) {
    let config = world.config.combat.clone();
    let base = world
        .store
        .combat(attacker)
        .map(|combat| combat.base_damage)
        .unwrap_or(1.0);
    let aggression = world
        .store
        .profile(attacker)
        .map(|profile| profile.traits.aggression)
        .unwrap_or(0.5);

    let jitter = if config.damage_jitter > 0.0 {
        1.0 + world.rng.gen_range(-config.damage_jitter..config.damage_jitter)
    } else {
        1.0
    };
    let critical = config.crit_chance > 0.0 && world.rng.gen::<f32>() < config.crit_chance;
    let crit_mult = if critical { config.crit_multiplier } else { 1.0 };

    let damage = base
        * weapon.damage_multiplier
        * jitter
        * (0.5 + aggression * config.aggression_damage_scale)
        * crit_mult;
    (damage.max(0.0), critical)
}

/// The component cooldown tracks the equipped weapon (synced on equip)
fn off_cooldown(world: &WorldState, attacker: &AgentId, now: u64) -> bool {
    world
        .store
        .combat(attacker)
        .map(|combat| now.saturating_sub(combat.last_attack_at) >= combat.cooldown_ms.max(1))
        .unwrap_or(false)
}

/// Resolve one attack against another agent. A hit on an already-dead
/// target is a no-op.
fn attack_agent(
    world: &mut WorldState,
    registry: &SystemRegistry,
    attacker: &AgentId,
    target: &AgentId,
    weapon: &WeaponDef,
    now: u64,
) -> Result<()> {
    let Some(target_health) = world.store.health(target).cloned() else {
        return Ok(());
    };
    if target_health.is_dead {
        return Ok(());
    }

    let (damage, critical) = roll_damage(world, attacker, weapon);

    let mut attacker_combat = match world.store.combat(attacker).cloned() {
        Some(combat) => combat,
        None => return Ok(()),
    };
    attacker_combat.is_in_combat = true;
    attacker_combat.current_target = Some(crate::agents::ThreatTarget::Agent(target.clone()));
    attacker_combat.last_attack_at = now;
    world.store.set_combat(attacker, attacker_combat)?;

    let mut target_health = target_health;
    target_health.apply_damage(damage, now);
    let remaining = target_health.current;
    let fatal = target_health.is_dead;
    world.store.set_health(target, target_health)?;

    if let Some(mut target_combat) = world.store.combat(target).cloned() {
        target_combat.is_in_combat = true;
        *target_combat.threat.entry(attacker.clone()).or_insert(0.0) += damage;
        world.store.set_combat(target, target_combat)?;
    }

    world.events.emit(SimulationEvent::CombatEngaged {
        attacker: attacker.clone(),
        target: CombatTarget::Agent(target.clone()),
        timestamp: now,
    });
    world.events.emit(SimulationEvent::CombatHit {
        attacker: attacker.clone(),
        target: CombatTarget::Agent(target.clone()),
        damage,
        remaining_health: remaining,
        critical,
        timestamp: now,
    });
    world.combat_log.push(CombatLogEntry {
        timestamp: now,
        attacker: attacker.clone(),
        target: CombatTarget::Agent(target.clone()),
        damage,
        fatal,
    });

    if fatal {
        debug!("agent {} killed {}", attacker, target);
        if let Some(mut profile) = world.store.profile(target).cloned() {
            profile.dead = true;
            world.store.set_profile(target, profile)?;
        }
        world.events.emit(SimulationEvent::CombatKill {
            attacker: attacker.clone(),
            target: CombatTarget::Agent(target.clone()),
            timestamp: now,
        });
        if let Some(lifecycle) = registry.lifecycle() {
            lifecycle.remove_agent(world, registry, target, "killed in combat");
        }
    }
    Ok(())
}

fn attack_animal(
    world: &mut WorldState,
    registry: &SystemRegistry,
    attacker: &AgentId,
    animal_id: &AnimalId,
    weapon: &WeaponDef,
    now: u64,
) -> Result<()> {
    let (damage, _critical) = roll_damage(world, attacker, weapon);

    if let Some(mut combat) = world.store.combat(attacker).cloned() {
        combat.is_in_combat = true;
        combat.current_target = Some(crate::agents::ThreatTarget::Animal(animal_id.clone()));
        combat.last_attack_at = now;
        world.store.set_combat(attacker, combat)?;
    }

    world.events.emit(SimulationEvent::CombatEngaged {
        attacker: attacker.clone(),
        target: CombatTarget::Animal(animal_id.clone()),
        timestamp: now,
    });

    let fatal = registry
        .animals()
        .map(|port| {
            let result = port.damage_animal(world, registry, animal_id, attacker, damage);
            !result.is_failure()
                && result
                    .data
                    .as_ref()
                    .and_then(|data| data.get("fatal"))
                    .and_then(|value| value.as_bool())
                    .unwrap_or(false)
        })
        .unwrap_or(false);

    world.combat_log.push(CombatLogEntry {
        timestamp: now,
        attacker: attacker.clone(),
        target: CombatTarget::Animal(animal_id.clone()),
        damage,
        fatal,
    });
    Ok(())
}

// ============================================================================
// SYSTEM
// ============================================================================

pub struct CombatSystem;

impl SimSystem for CombatSystem {
    fn name(&self) -> &'static str {
        "combat"
    }

    fn update(
        &mut self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        _dt_secs: f32,
    ) -> Result<()> {
        let now = world.now();
        let alive = world.store.alive_agents();
        let alive_set: std::collections::HashSet<AgentId> = alive.iter().cloned().collect();

        for attacker in &alive {
            let Some(position) = world.store.transform(attacker).map(|t| t.position) else {
                continue;
            };
            if world.store.combat(attacker).is_none() {
                continue;
            }
            let weapon = equipped_weapon(world, attacker);
            if !off_cooldown(world, attacker, now) {
                continue;
            }

            // Prefer hostile agents in range
            let candidates = world.spatial.query_radius(position, weapon.range);
            let mut attacked = false;
            for entry in candidates {
                if &entry.id == attacker || !alive_set.contains(&entry.id) {
                    continue;
                }
                let target = CombatTarget::Agent(entry.id.clone());
                if should_attack(world, attacker, &target) {
                    attack_agent(world, registry, attacker, &entry.id, &weapon, now)?;
                    attacked = true;
                    break;
                }
            }
            if attacked {
                continue;
            }

            // Animals in range are unconditionally valid targets
            if let Some((animal_id, _)) = world.animals.nearest_in_radius(position, weapon.range) {
                let target = CombatTarget::Animal(animal_id.clone());
                if should_attack(world, attacker, &target) {
                    attack_animal(world, registry, attacker, &animal_id, &weapon, now)?;
                    continue;
                }
            }

            // Nothing in range: disengage
            if let Some(combat) = world.store.combat(attacker) {
                if combat.is_in_combat {
                    let mut combat = combat.clone();
                    combat.is_in_combat = false;
                    combat.current_target = None;
                    world.store.set_combat(attacker, combat)?;
                }
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
            if let SimulationEvent::AgentRemoved { agent_id, .. } = event {
                // Disengage anyone who was fighting the removed agent
                for other in world.store.all_agent_ids() {
                    let Some(combat) = world.store.combat(&other) else {
                        continue;
                    };
                    let targeting_removed = matches!(
                        &combat.current_target,
                        Some(crate::agents::ThreatTarget::Agent(target)) if target == agent_id
                    );
                    if targeting_removed || combat.threat.contains_key(agent_id) {
                        let mut combat = combat.clone();
                        if targeting_removed {
                            combat.current_target = None;
                            combat.is_in_combat = false;
                        }
                        combat.threat.remove(agent_id);
                        let _ = world.store.set_combat(&other, combat);
                    }
                }
            }
        }
    }
}

// ============================================================================
// PORT
// ============================================================================

pub fn equip_weapon(world: &mut WorldState, agent_id: &AgentId, weapon: &str) -> HandlerResult {
    let Some(def) = weapon_def(weapon) else {
        return HandlerResult::failed("combat", format!("unknown weapon {}", weapon));
    };
    let Some(mut combat) = world.store.combat(agent_id).cloned() else {
        return HandlerResult::failed("combat", format!("no combat component for {}", agent_id));
    };
    if def.id != UNARMED {
        let owned = world
            .store
            .inventory(agent_id)
            .map(|inventory| inventory.quantity(def.id) > 0)
            .unwrap_or(false);
        if !owned {
            return HandlerResult::failed("combat", format!("{} owns no {}", agent_id, weapon));
        }
    }
    combat.equipped_weapon = if def.id == UNARMED {
        None
    } else {
        Some(def.id.to_string())
    };
    combat.cooldown_ms = def.cooldown_ms;
    if world.store.set_combat(agent_id, combat).is_err() {
        return HandlerResult::failed("combat", "agent vanished mid-equip");
    }
    let now = world.now();
    world.events.emit(SimulationEvent::WeaponEquipped {
        agent_id: agent_id.clone(),
        weapon: weapon.to_string(),
        timestamp: now,
    });
    HandlerResult::completed("combat")
}

pub struct CombatPortImpl;

impl CombatPort for CombatPortImpl {
    fn equip_weapon(
        &self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        agent_id: &AgentId,
        weapon: &str,
    ) -> HandlerResult {
        equip_weapon(world, agent_id, weapon)
    }

    fn craft_weapon(
        &self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        agent_id: &AgentId,
        weapon: &str,
    ) -> HandlerResult {
        let Some(def) = weapon_def(weapon) else {
            return HandlerResult::failed("combat", format!("unknown weapon {}", weapon));
        };
        if def.id == UNARMED {
            return HandlerResult::failed("combat", "cannot craft bare hands");
        }
        let Some(inventory_port) = registry.inventory() else {
            return HandlerResult::failed("combat", "inventory capability unavailable");
        };

        let cost: std::collections::BTreeMap<String, u32> = def
            .craft_cost
            .iter()
            .map(|(item, quantity)| (item.to_string(), *quantity))
            .collect();
        let consumed = inventory_port.consume_from_agent(world, registry, agent_id, &cost);
        if consumed.is_failure() {
            return HandlerResult::failed(
                "combat",
                consumed
                    .message
                    .unwrap_or_else(|| "missing crafting resources".to_string()),
            );
        }
        let added = inventory_port.add_resource(world, registry, agent_id, def.id, 1);
        if added.is_failure() {
            return HandlerResult::failed("combat", "no room for crafted weapon");
        }

        let now = world.now();
        world.events.emit(SimulationEvent::WeaponCrafted {
            agent_id: agent_id.clone(),
            weapon: weapon.to_string(),
            timestamp: now,
        });
        equip_weapon(world, agent_id, weapon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{Combat, Component, Health, Inventory, LifeStage, Profile, Sex, TraitSet, Transform};
    use crate::config::SimConfig;
    use crate::types::Position;

    fn fighter(name: &str, aggression: f32, damage: f32, health: f32, x: f32) -> (AgentId, Vec<Component>) {
        (
            AgentId::from(name),
            vec![
                Component::Profile(Profile {
                    name: name.to_string(),
                    sex: Sex::Male,
                    age_years: 30.0,
                    life_stage: LifeStage::Adult,
                    generation: 0,
                    immortal: false,
                    dead: false,
                    traits: TraitSet {
                        aggression,
                        ..TraitSet::default()
                    },
                    appearance: None,
                    parents: None,
                }),
                Component::Health(Health::new(health)),
                Component::Transform(Transform::at(Position::new(x, 0.0))),
                Component::Combat(Combat::noncombatant(damage, 100)),
                Component::Inventory(Inventory::with_capacity(50.0, 0.0)),
            ],
        )
    }

    fn deterministic_config() -> SimConfig {
        let mut config = SimConfig::default();
        config.combat.damage_jitter = 0.0;
        config.combat.crit_chance = 0.0;
        config.combat.aggression_damage_scale = 0.5;
        config.combat.hostility_affinity = -0.5;
        config
    }

    fn world_with_fighters() -> WorldState {
        let mut world = WorldState::for_tests(deterministic_config());
        let (x_id, x_components) = fighter("attacker", 1.0, 40.0, 100.0, 0.0);
        let (y_id, mut y_components) = fighter("victim", 0.0, 5.0, 50.0, 1.0);
        // The victim is a pure target: no combat component, no retaliation
        y_components.retain(|component| !matches!(component, Component::Combat(_)));
        world.store.register_agent(x_id, x_components).unwrap();
        world.store.register_agent(y_id, y_components).unwrap();
        // Make them enemies
        world.social_graph.set_affinity(
            &AgentId::from("attacker"),
            &AgentId::from("victim"),
            -0.9,
        );
        world.rebuild_spatial_index();
        world
    }

    #[test]
    fn test_two_hits_kill() {
        let mut world = world_with_fighters();
        let registry = SystemRegistry::new();
        let mut system = CombatSystem;

        let mut kinds = Vec::new();
        for _ in 0..2 {
            world.clock.advance(250);
            system.update(&mut world, &registry, 0.25).unwrap();
            world.rebuild_spatial_index();
            for event in world.events.flush_events() {
                kinds.push(event.name());
            }
        }

        // attacker: damage 40 x (0.5 + 1.0 x 0.5) = 40 per hit; victim 50 hp
        assert_eq!(
            kinds,
            vec![
                "combat:engaged",
                "combat:hit",
                "combat:engaged",
                "combat:hit",
                "combat:kill"
            ]
        );
        let victim = AgentId::from("victim");
        assert!(world.store.health(&victim).unwrap().is_dead);
        assert!(!world.combat_log.is_empty());
    }

    #[test]
    fn test_hit_on_dead_target_is_noop() {
        let mut world = world_with_fighters();
        let registry = SystemRegistry::new();
        let victim = AgentId::from("victim");

        let mut health = world.store.health(&victim).unwrap().clone();
        health.apply_damage(1000.0, 0);
        world.store.set_health(&victim, health).unwrap();
        world.rebuild_spatial_index();

        let mut system = CombatSystem;
        world.clock.advance(250);
        system.update(&mut world, &registry, 0.25).unwrap();

        let hits = world
            .events
            .flush_events()
            .into_iter()
            .filter(|event| matches!(event, SimulationEvent::CombatHit { .. }))
            .count();
        assert_eq!(hits, 0, "no combat:hit against a dead target");
    }

    #[test]
    fn test_cooldown_blocks_attacks() {
        let mut world = world_with_fighters();
        let registry = SystemRegistry::new();
        let mut system = CombatSystem;

        world.clock.advance(250);
        system.update(&mut world, &registry, 0.25).unwrap();
        let first: usize = world
            .events
            .flush_events()
            .iter()
            .filter(|event| matches!(event, SimulationEvent::CombatHit { .. }))
            .count();
        assert_eq!(first, 1);

        // Same timestamp: still cooling down
        system.update(&mut world, &registry, 0.0).unwrap();
        let second = world
            .events
            .flush_events()
            .iter()
            .filter(|event| matches!(event, SimulationEvent::CombatHit { .. }))
            .count();
        assert_eq!(second, 0);
    }

    #[test]
    fn test_friendly_agents_do_not_fight() {
        let mut world = world_with_fighters();
        world.social_graph.set_affinity(
            &AgentId::from("attacker"),
            &AgentId::from("victim"),
            0.8,
        );
        // Drop aggression below the unprovoked threshold
        let attacker = AgentId::from("attacker");
        let mut profile = world.store.profile(&attacker).unwrap().clone();
        profile.traits.aggression = 0.2;
        world.store.set_profile(&attacker, profile).unwrap();

        let registry = SystemRegistry::new();
        let mut system = CombatSystem;
        world.clock.advance(250);
        system.update(&mut world, &registry, 0.25).unwrap();

        let hits = world
            .events
            .flush_events()
            .iter()
            .filter(|event| matches!(event, SimulationEvent::CombatHit { .. }))
            .count();
        assert_eq!(hits, 0);
    }

    #[test]
    fn test_animals_are_always_valid_targets() {
        // A sated, non-aggressive bystander still treats an animal in range
        // as hostile
        let mut world = WorldState::for_tests(deterministic_config());
        let (id, components) = fighter("bystander", 0.2, 40.0, 100.0, 0.0);
        world.store.register_agent(id.clone(), components).unwrap();
        let rabbit = crate::systems::animals::AnimalSystem::spawn_animal(
            &mut world,
            crate::systems::animals::Species::Rabbit,
            crate::types::Position::new(1.0, 0.0),
        );
        world.rebuild_spatial_index();

        assert!(should_attack(
            &mut world,
            &id,
            &CombatTarget::Animal(rabbit.clone())
        ));

        let mut registry = SystemRegistry::new();
        registry.register_animals(Box::new(crate::systems::animals::AnimalsPortImpl));
        let mut system = CombatSystem;
        world.clock.advance(250);
        system.update(&mut world, &registry, 0.25).unwrap();

        let engaged_animal = world.events.flush_events().into_iter().any(|event| {
            matches!(
                event,
                SimulationEvent::CombatEngaged {
                    target: CombatTarget::Animal(_),
                    ..
                }
            )
        });
        assert!(engaged_animal, "animal engaged without any hunger gate");
        assert!(!world.combat_log.is_empty());
    }

    #[test]
    fn test_craft_weapon_consumes_resources_and_equips() {
        let mut world = world_with_fighters();
        let mut registry = SystemRegistry::new();
        registry.register_inventory(Box::new(crate::systems::inventory::InventoryPortImpl));
        let agent = AgentId::from("attacker");
        crate::systems::inventory::add_resource(&mut world, &agent, "wood", 2).unwrap();
        crate::systems::inventory::add_resource(&mut world, &agent, "fiber", 1).unwrap();

        let port = CombatPortImpl;
        let result = port.craft_weapon(&mut world, &registry, &agent, "spear");
        assert!(!result.is_failure(), "{:?}", result.message);

        let combat = world.store.combat(&agent).unwrap();
        assert_eq!(combat.equipped_weapon.as_deref(), Some("spear"));
        assert_eq!(world.store.inventory(&agent).unwrap().quantity("wood"), 0);

        // Missing resources now: crafting fails
        let again = port.craft_weapon(&mut world, &registry, &agent, "spear");
        assert!(again.is_failure());
    }

    #[test]
    fn test_combat_log_bounded() {
        let mut log = CombatLog::new(3);
        for i in 0..5 {
            log.push(CombatLogEntry {
                timestamp: i,
                attacker: AgentId::from("a"),
                target: CombatTarget::Agent(AgentId::from("b")),
                damage: 1.0,
                fatal: false,
            });
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.entries()[0].timestamp, 2, "oldest entries evicted");
    }
}
