//! Lifecycle: the owner of the agent population.
//!
//! Spawning builds the full component set, registers the newborn with every
//! ledger that tracks per-agent state and emits `agent:born`. Each SLOW tick
//! ages agents, advances life stages one way (child -> adult -> elder),
//! regenerates health and removes the dead; removal emits `agent:removed`
//! and every subsystem with per-agent state cleans up on that signal.

use rand::Rng;
use tracing::{debug, info};

use crate::agents::{
    AiState, Combat, Component, Health, Inventory, LifeStage, Movement, Needs, Profile, Role, Sex,
    Social, Transform, TraitSet,
};
use crate::errors::{Result, SimulatorError};
use crate::events::SimulationEvent;
use crate::ports::{HandlerResult, LifecyclePort, SpawnSpec, SystemRegistry};
use crate::simulation::scheduler::SimSystem;
use crate::simulation::state::WorldState;
use crate::types::{AgentId, Position};

/// Seconds without damage before regeneration resumes
const REGEN_GRACE_MS: u64 = 10_000;

const GIVEN_NAMES: &[&str] = &[
    "Asha", "Bran", "Cora", "Dane", "Eira", "Finn", "Gale", "Hale", "Iris", "Joss", "Kara",
    "Lior", "Mara", "Nils", "Orin", "Pia", "Quin", "Rena", "Sten", "Tova", "Una", "Vero",
    "Wren", "Yara", "Zane",
];

fn stage_for_age(world: &WorldState, age_years: f32) -> LifeStage {
    let lifecycle = &world.config.lifecycle;
    if age_years < lifecycle.adult_age {
        LifeStage::Child
    } else if age_years < lifecycle.elder_age {
        LifeStage::Adult
    } else {
        LifeStage::Elder
    }
}

fn inherited_traits(world: &mut WorldState, parents: Option<&(AgentId, AgentId)>) -> TraitSet {
    let mutation = world.config.lifecycle.trait_mutation;
    let mut traits = match parents {
        Some((father, mother)) => {
            let of = |id: &AgentId, world: &WorldState| {
                world
                    .store
                    .profile(id)
                    .map(|profile| profile.traits.clone())
                    .or_else(|| world.genealogy.ancestor(id).map(|entry| entry.traits.clone()))
                    .unwrap_or_default()
            };
            TraitSet::blend(&of(father, world), &of(mother, world))
        }
        None => TraitSet {
            cooperation: world.rng.gen_range(0.2..0.8),
            aggression: world.rng.gen_range(0.1..0.7),
            diligence: world.rng.gen_range(0.2..0.8),
            curiosity: world.rng.gen_range(0.2..0.8),
        },
    };
    let amounts = [
        world.rng.gen_range(-mutation..=mutation),
        world.rng.gen_range(-mutation..=mutation),
        world.rng.gen_range(-mutation..=mutation),
        world.rng.gen_range(-mutation..=mutation),
    ];
    traits.mutate(amounts);
    traits
}

/// Construct and register a complete agent. Returns its id.
pub fn spawn_agent(
    world: &mut WorldState,
    _registry: &SystemRegistry,
    spec: SpawnSpec,
) -> Result<AgentId> {
    if world.store.agent_count() >= world.config.lifecycle.max_population {
        return Err(SimulatorError::invariant(format!(
            "population cap {} reached",
            world.config.lifecycle.max_population
        )));
    }

    let now = world.now();
    let id = world.next_agent_id();

    let name = spec.name.clone().unwrap_or_else(|| {
        let given = GIVEN_NAMES[world.rng.gen_range(0..GIVEN_NAMES.len())];
        format!("{} {}", given, id.as_str())
    });
    let sex = spec.sex.unwrap_or_else(|| {
        if world.rng.gen_bool(0.5) {
            Sex::Male
        } else {
            Sex::Female
        }
    });

    let position = match spec.position {
        Some(position) => world.map.clamp_position(position),
        None => world
            .map
            .find_walkable_near(Position::ORIGIN, 20, 60, &mut world.rng)
            .unwrap_or(Position::ORIGIN),
    };

    let generation = spec
        .parents
        .as_ref()
        .map(|(father, mother)| {
            let of = |id: &AgentId| {
                world
                    .genealogy
                    .ancestor(id)
                    .map(|entry| entry.generation)
                    .unwrap_or(0)
            };
            of(father).max(of(mother)) + 1
        })
        .unwrap_or(0);

    let traits = inherited_traits(world, spec.parents.as_ref());
    let base_speed = world.config.movement.base_speed;
    let base_damage = world.rng.gen_range(4.0..8.0);
    let cooldown = world.config.combat.base_cooldown_ms;
    let starting_money = world.config.economy.starting_money;

    let lineage_id = world.genealogy.register_birth(
        &id,
        spec.parents.clone(),
        traits.clone(),
        generation,
        now,
    );

    let profile = Profile {
        name: name.clone(),
        sex,
        age_years: spec.age_years.max(0.0),
        life_stage: stage_for_age(world, spec.age_years),
        generation,
        immortal: spec.immortal,
        dead: false,
        traits,
        appearance: None,
        parents: spec.parents.clone(),
    };
    let social = Social {
        family_id: Some(lineage_id.clone()),
        ..Social::default()
    };
    let mut transform = Transform::at(position);
    transform.zone_id = world
        .map
        .zone_containing(position)
        .map(|zone| zone.id.clone());

    world.store.register_agent(
        id.clone(),
        vec![
            Component::Profile(profile),
            Component::Health(Health::new(100.0)),
            Component::Needs(Needs::default()),
            Component::Transform(transform),
            Component::Movement(Movement::stationary(base_speed)),
            Component::Inventory(Inventory::with_capacity(30.0, starting_money)),
            Component::Combat(Combat::noncombatant(base_damage, cooldown)),
            Component::Role(Role::default()),
            Component::Social(social),
            Component::Ai(AiState::default()),
        ],
    )?;

    world.equipment.register_agent(&id);
    world
        .recipes
        .inherit_known(&id, spec.parents.as_ref());

    info!("spawned agent {} ({})", id, name);
    world.events.emit(SimulationEvent::AgentBorn {
        agent_id: id.clone(),
        name,
        lineage_id: Some(lineage_id),
        timestamp: now,
    });
    Ok(id)
}

/// Remove an agent from the world. Emits `agent:removed`; ledger cleanup
/// happens in each subsystem's event consumer.
pub fn remove_agent(
    world: &mut WorldState,
    agent_id: &AgentId,
    reason: &str,
) -> HandlerResult {
    if !world.store.has_agent(agent_id) {
        return HandlerResult::failed("lifecycle", format!("unknown agent {}", agent_id));
    }
    let now = world.now();
    world.tasks.clear_agent(agent_id);
    world.equipment.release_agent(agent_id);
    world.store.remove_agent(agent_id);
    debug!("removed agent {} ({})", agent_id, reason);
    world.events.emit(SimulationEvent::AgentRemoved {
        agent_id: agent_id.clone(),
        reason: reason.to_string(),
        timestamp: now,
    });
    HandlerResult::completed("lifecycle")
}

/// Snapshot import path: registers a restored agent bundle and rebuilds the
/// per-agent subsystem state that is not part of the snapshot.
pub fn import_agent(
    world: &mut WorldState,
    agent_id: AgentId,
    components: Vec<Component>,
) -> Result<()> {
    world.store.register_agent(agent_id.clone(), components)?;
    world.equipment.register_agent(&agent_id);
    Ok(())
}

// ============================================================================
// SYSTEM
// ============================================================================

pub struct LifecycleSystem;

impl SimSystem for LifecycleSystem {
    fn name(&self) -> &'static str {
        "lifecycle"
    }

    fn update(
        &mut self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        dt_secs: f32,
    ) -> Result<()> {
        let now = world.now();
        let years = dt_secs / world.config.lifecycle.seconds_per_year;
        let max_age = world.config.lifecycle.max_age;
        let mut doomed: Vec<(AgentId, &'static str)> = Vec::new();

        for agent_id in world.store.all_agent_ids() {
            // Death sweep: anything flagged dead leaves the world this tick
            if let Some(health) = world.store.health(&agent_id) {
                if health.is_dead {
                    doomed.push((agent_id, "died"));
                    continue;
                }
            }

            if let Some(profile) = world.store.profile(&agent_id) {
                let mut profile = profile.clone();
                profile.age_years += years;

                let next_stage = stage_for_age(world, profile.age_years);
                if next_stage != profile.life_stage {
                    // One-way progression only
                    let advances = matches!(
                        (profile.life_stage, next_stage),
                        (LifeStage::Child, LifeStage::Adult)
                            | (LifeStage::Child, LifeStage::Elder)
                            | (LifeStage::Adult, LifeStage::Elder)
                    );
                    if advances {
                        debug!(
                            "agent {} became {:?} at {:.1} years",
                            agent_id, next_stage, profile.age_years
                        );
                        profile.life_stage = next_stage;
                    }
                }

                if profile.age_years >= max_age && !profile.immortal {
                    profile.dead = true;
                    world.store.set_profile(&agent_id, profile)?;
                    if let Some(health) = world.store.health(&agent_id) {
                        let mut health = health.clone();
                        health.apply_damage(health.max, now);
                        world.store.set_health(&agent_id, health)?;
                    }
                    doomed.push((agent_id.clone(), "old age"));
                    continue;
                }
                world.store.set_profile(&agent_id, profile)?;
            }

            // Health regeneration after a grace period without damage
            if let Some(health) = world.store.health(&agent_id) {
                if !health.is_dead
                    && health.current < health.max
                    && now.saturating_sub(health.last_damage_at) >= REGEN_GRACE_MS
                {
                    let mut health = health.clone();
                    health.heal(health.regen_per_second * dt_secs);
                    world.store.set_health(&agent_id, health)?;
                }
            }
        }

        for (agent_id, reason) in doomed {
            remove_agent(world, &agent_id, reason);
        }
        Ok(())
    }
}

// ============================================================================
// PORT
// ============================================================================

pub struct LifecyclePortImpl;

impl LifecyclePort for LifecyclePortImpl {
    fn spawn_agent(
        &self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        spec: SpawnSpec,
    ) -> Result<AgentId> {
        spawn_agent(world, registry, spec)
    }

    fn remove_agent(
        &self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        agent_id: &AgentId,
        reason: &str,
    ) -> HandlerResult {
        remove_agent(world, agent_id, reason)
    }
}
