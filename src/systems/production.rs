//! Production: worker assignment and periodic zone yield.
//!
//! Zones with a production resource accept up to `max_workers_per_zone`
//! workers. Each SLOW tick the assigned crew's yield lands in the zone's
//! stockpile and `production:output_generated` announces it.

use std::collections::HashMap;
use tracing::debug;

use crate::agents::{LifeStage, RoleType};
use crate::errors::Result;
use crate::events::SimulationEvent;
use crate::ports::SystemRegistry;
use crate::simulation::scheduler::SimSystem;
use crate::simulation::state::WorldState;
use crate::types::{AgentId, ZoneId};

fn role_for_resource(resource: &str) -> RoleType {
    match resource {
        "food" => RoleType::Farmer,
        "water" => RoleType::Gatherer,
        "wood" | "stone" => RoleType::Gatherer,
        _ => RoleType::Gatherer,
    }
}

pub struct ProductionSystem {
    assignments: HashMap<ZoneId, Vec<AgentId>>,
}

impl ProductionSystem {
    pub fn new() -> Self {
        Self {
            assignments: HashMap::new(),
        }
    }

    pub fn workers_of(&self, zone_id: &ZoneId) -> &[AgentId] {
        self.assignments
            .get(zone_id)
            .map(|workers| workers.as_slice())
            .unwrap_or(&[])
    }

    fn production_zones(world: &WorldState) -> Vec<(ZoneId, String)> {
        world
            .map
            .zones()
            .filter_map(|zone| {
                zone.metadata
                    .production_resource
                    .as_ref()
                    .map(|resource| (zone.id.clone(), resource.clone()))
            })
            .collect()
    }

    fn prune_workers(&mut self, world: &mut WorldState) {
        for workers in self.assignments.values_mut() {
            workers.retain(|worker| {
                world.store.has_agent(worker)
                    && world
                        .store
                        .health(worker)
                        .map(|health| !health.is_dead)
                        .unwrap_or(false)
            });
        }
    }

    fn assign_idle_workers(&mut self, world: &mut WorldState, zone_id: &ZoneId, resource: &str) {
        let cap = world.config.economy.max_workers_per_zone;
        let assigned_anywhere: std::collections::HashSet<AgentId> = self
            .assignments
            .values()
            .flat_map(|workers| workers.iter().cloned())
            .collect();

        let workers = self.assignments.entry(zone_id.clone()).or_default();
        if workers.len() >= cap {
            return;
        }

        for candidate in world.store.alive_agents() {
            if workers.len() >= cap {
                break;
            }
            if assigned_anywhere.contains(&candidate) || workers.contains(&candidate) {
                continue;
            }
            let adult = world
                .store
                .profile(&candidate)
                .map(|profile| profile.life_stage != LifeStage::Child)
                .unwrap_or(false);
            if !adult {
                continue;
            }
            let Some(role) = world.store.role(&candidate) else {
                continue;
            };
            if role.role_type != RoleType::Idle {
                continue;
            }
            let mut role = role.clone();
            role.role_type = role_for_resource(resource);
            role.work_zone_id = Some(zone_id.clone());
            if world.store.set_role(&candidate, role).is_ok() {
                debug!("assigned {} to work {} in {}", candidate, resource, zone_id);
                workers.push(candidate);
            }
        }
    }
}

impl Default for ProductionSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SimSystem for ProductionSystem {
    fn name(&self) -> &'static str {
        "production"
    }

    fn update(
        &mut self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        dt_secs: f32,
    ) -> Result<()> {
        let now = world.now();
        let base_yield = world.config.economy.base_yield;
        self.prune_workers(world);

        for (zone_id, resource) in Self::production_zones(world) {
            self.assign_idle_workers(world, &zone_id, &resource);

            let crew = self.assignments.get(&zone_id).cloned().unwrap_or_default();
            if crew.is_empty() {
                continue;
            }
            let on_duty_efficiency: f32 = crew
                .iter()
                .filter_map(|worker| world.store.role(worker))
                .filter(|role| role.on_duty)
                .map(|role| role.efficiency)
                .sum();
            if on_duty_efficiency <= 0.0 {
                continue;
            }

            let produced = on_duty_efficiency * base_yield * dt_secs;
            let deposited =
                crate::systems::inventory::add_to_stockpile(world, &zone_id, &resource, produced);
            if deposited > 0.0 {
                world.events.emit(SimulationEvent::ProductionOutput {
                    zone_id: zone_id.clone(),
                    resource: resource.clone(),
                    amount: deposited,
                    timestamp: now,
                });
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
                for workers in self.assignments.values_mut() {
                    workers.retain(|worker| worker != agent_id);
                }
            }
        }
    }
}
