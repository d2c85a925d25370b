//! Building: construction jobs with timed completion.
//!
//! A job reserves its material cost from the stockpiles up front and
//! finalizes once `completes_at` passes, mutating world state (new zones,
//! crafting stations, a terrain footprint). The slow pass also proposes new
//! jobs on its own while material is plentiful and caps are not reached.

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::errors::Result;
use crate::events::SimulationEvent;
use crate::ports::{BuildingPort, HandlerResult, SystemRegistry};
use crate::simulation::scheduler::SimSystem;
use crate::simulation::state::WorldState;
use crate::types::{Position, ZoneId};
use crate::world::{TerrainType, Zone, ZoneType};

fn cost_of(label: &str) -> Option<&'static [(&'static str, f32)]> {
    match label {
        "house" => Some(&[("wood", 10.0)]),
        "mine" => Some(&[("wood", 5.0), ("stone", 5.0)]),
        "workbench" => Some(&[("wood", 6.0)]),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstructionJob {
    pub id: u64,
    pub zone_id: ZoneId,
    pub label: String,
    pub completes_at: u64,
}

/// Shared construction state: pending jobs and completion tallies
#[derive(Debug, Default)]
pub struct ConstructionLedger {
    jobs: Vec<ConstructionJob>,
    built: BTreeMap<String, usize>,
    next_job_id: u64,
}

impl ConstructionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_jobs(&self) -> &[ConstructionJob] {
        &self.jobs
    }

    pub fn built_count(&self, label: &str) -> usize {
        self.built.get(label).copied().unwrap_or(0)
    }

    pub fn in_flight(&self, label: &str) -> usize {
        self.jobs.iter().filter(|job| job.label == label).count()
    }
}

fn cap_for(world: &WorldState, label: &str) -> usize {
    match label {
        "house" => world.config.building.max_houses,
        "mine" => world.config.building.max_mines,
        "workbench" => world.config.building.max_workbenches,
        _ => 0,
    }
}

/// Reserve materials and schedule a construction job
pub fn schedule_construction(
    world: &mut WorldState,
    zone_id: &ZoneId,
    label: &str,
) -> HandlerResult {
    let Some(cost) = cost_of(label) else {
        return HandlerResult::failed("building", format!("unknown construction {}", label));
    };
    if world.map.zone(zone_id).is_none() {
        return HandlerResult::failed("building", format!("no zone {}", zone_id));
    }
    if world.construction.built_count(label) + world.construction.in_flight(label)
        >= cap_for(world, label)
    {
        return HandlerResult::failed("building", format!("{} cap reached", label));
    }
    for (item, amount) in cost {
        if crate::systems::inventory::total_stock(world, item) < *amount {
            return HandlerResult::failed(
                "building",
                format!("not enough {} for a {}", item, label),
            );
        }
    }

    // Reservation: withdraw the full cost now
    let zone_ids: Vec<ZoneId> = world.map.zones().map(|zone| zone.id.clone()).collect();
    for (item, amount) in cost {
        let mut remaining = *amount;
        for zone in &zone_ids {
            if remaining <= 0.0 {
                break;
            }
            remaining -= crate::systems::inventory::take_from_stockpile(world, zone, item, remaining);
        }
    }

    world.construction.next_job_id += 1;
    let now = world.now();
    let job = ConstructionJob {
        id: world.construction.next_job_id,
        zone_id: zone_id.clone(),
        label: label.to_string(),
        completes_at: now + (world.config.building.build_time_secs * 1000.0) as u64,
    };
    debug!("scheduled {} #{} in {}", label, job.id, zone_id);
    world.construction.jobs.push(job);
    HandlerResult::delegated("building")
}

fn finalize_job(world: &mut WorldState, job: ConstructionJob) -> Result<()> {
    let now = world.now();
    info!("finished {} #{} in {}", job.label, job.id, job.zone_id);
    *world.construction.built.entry(job.label.clone()).or_insert(0) += 1;

    let anchor = world
        .map
        .zone(&job.zone_id)
        .map(|zone| zone.centroid())
        .unwrap_or(Position::ORIGIN);
    let count = world.construction.built_count(&job.label);

    match job.label.as_str() {
        "house" => {
            let origin = Position::new(anchor.x + 12.0 + count as f32 * 6.0, anchor.y + 12.0);
            let zone_id = ZoneId::new(format!("zone-house-{}", count));
            world.map.add_zone(Zone::rect(
                zone_id,
                format!("House {}", count),
                ZoneType::Housing,
                origin,
                Position::new(origin.x + 4.0, origin.y + 4.0),
            ));
        }
        "mine" => {
            let origin = Position::new(anchor.x - 18.0 - count as f32 * 8.0, anchor.y + 14.0);
            let zone_id = ZoneId::new(format!("zone-mine-{}", count));
            let mut zone = Zone::rect(
                zone_id,
                format!("Mine {}", count),
                ZoneType::Work,
                origin,
                Position::new(origin.x + 6.0, origin.y + 6.0),
            );
            zone.metadata.production_resource = Some("stone".to_string());
            zone.stockpiles
                .push(crate::world::Stockpile::new("stone", 200.0));
            world.map.add_zone(zone);
        }
        "workbench" => {
            if let Some(zone) = world.map.zone_mut(&job.zone_id) {
                zone.metadata.crafting = true;
            }
        }
        _ => {}
    }

    // Construction leaves a footprint on the terrain
    let (tx, ty) = anchor.tile();
    if world.map.modify_tile(tx, ty, TerrainType::Dirt).is_ok() {
        world.events.emit(SimulationEvent::TerrainModified {
            x: tx,
            y: ty,
            terrain: TerrainType::Dirt.name().to_string(),
            timestamp: now,
        });
    }
    Ok(())
}

// ============================================================================
// SYSTEM
// ============================================================================

pub struct BuildingSystem;

impl SimSystem for BuildingSystem {
    fn name(&self) -> &'static str {
        "building"
    }

    fn update(
        &mut self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        _dt_secs: f32,
    ) -> Result<()> {
        let now = world.now();

        // Finalize due jobs
        let (due, waiting): (Vec<_>, Vec<_>) = world
            .construction
            .jobs
            .drain(..)
            .partition(|job| job.completes_at <= now);
        world.construction.jobs = waiting;
        for job in due {
            finalize_job(world, job)?;
        }

        // Propose new work while material is plentiful
        let storage_zone = world
            .map
            .zones_of_type(ZoneType::Storage)
            .first()
            .map(|zone| zone.id.clone());
        if let Some(zone_id) = storage_zone {
            let wood = crate::systems::inventory::total_stock(world, "wood");
            let stone = crate::systems::inventory::total_stock(world, "stone");
            if wood >= 30.0 {
                schedule_construction(world, &zone_id, "house");
            }
            if wood >= 20.0 && stone >= 10.0 {
                schedule_construction(world, &zone_id, "mine");
            }
        }
        Ok(())
    }
}

// ============================================================================
// PORT
// ============================================================================

pub struct BuildingPortImpl;

impl BuildingPort for BuildingPortImpl {
    fn request_construction(
        &self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        zone_id: &ZoneId,
        label: &str,
    ) -> HandlerResult {
        schedule_construction(world, zone_id, label)
    }
}
