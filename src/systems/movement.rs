//! Movement: waypoint following over walkable terrain.
//!
//! Requests install a target and a planned path on the Movement component;
//! the FAST update advances agents waypoint by waypoint, accumulating
//! fatigue while moving and shedding it at rest. Reaching the final waypoint
//! emits `movement:arrived`; an unplannable request emits `movement:failed`.

use tracing::debug;

use crate::agents::MoveTarget;
use crate::errors::Result;
use crate::events::SimulationEvent;
use crate::ports::{HandlerResult, MovementPort, SystemRegistry};
use crate::simulation::scheduler::SimSystem;
use crate::simulation::state::WorldState;
use crate::types::{AgentId, Position, ZoneId};

// ============================================================================
// PATHFINDING
// ============================================================================

/// Pluggable path planner. The default walks a straight line and fails when
/// any sampled tile is blocked.
pub trait Pathfinder: Send + Sync {
    fn find_path(&self, world: &mut WorldState, from: Position, to: Position)
        -> Option<Vec<Position>>;
}

pub struct StraightLinePathfinder;

impl Pathfinder for StraightLinePathfinder {
    fn find_path(
        &self,
        world: &mut WorldState,
        from: Position,
        to: Position,
    ) -> Option<Vec<Position>> {
        let to = world.map.clamp_position(to);
        let distance = from.distance(&to);
        let steps = distance.ceil().max(1.0) as usize;

        let mut waypoints = Vec::with_capacity(steps);
        for i in 1..=steps {
            let t = i as f32 / steps as f32;
            let point = Position::new(
                from.x + (to.x - from.x) * t,
                from.y + (to.y - from.y) * t,
            );
            let (tx, ty) = point.tile();
            if !world.map.is_walkable(tx, ty) {
                return None;
            }
            waypoints.push(point);
        }
        if waypoints.is_empty() {
            waypoints.push(to);
        }
        Some(waypoints)
    }
}

// ============================================================================
// REQUESTS
// ============================================================================

fn install_path(
    world: &mut WorldState,
    agent_id: &AgentId,
    target: MoveTarget,
    destination: Position,
    pathfinder: &dyn Pathfinder,
) -> HandlerResult {
    let Some(transform) = world.store.transform(agent_id).cloned() else {
        return HandlerResult::failed("movement", format!("no transform for {}", agent_id));
    };
    let Some(mut movement) = world.store.movement(agent_id).cloned() else {
        return HandlerResult::failed("movement", format!("no movement for {}", agent_id));
    };

    match pathfinder.find_path(world, transform.position, destination) {
        Some(waypoints) => {
            movement.target = Some(target);
            movement.waypoints = waypoints;
            movement.waypoint_index = 0;
            movement.is_moving = true;
            if world.store.set_movement(agent_id, movement).is_err() {
                return HandlerResult::failed("movement", "agent vanished mid-request");
            }
            HandlerResult::in_progress("movement")
        }
        None => {
            let now = world.now();
            world.events.emit(SimulationEvent::MovementFailed {
                agent_id: agent_id.clone(),
                reason: "unreachable target".to_string(),
                timestamp: now,
            });
            HandlerResult::failed("movement", "unreachable target")
        }
    }
}

pub fn request_move(
    world: &mut WorldState,
    agent_id: &AgentId,
    target: Position,
    pathfinder: &dyn Pathfinder,
) -> HandlerResult {
    let clamped = world.map.clamp_position(target);
    install_path(world, agent_id, MoveTarget::Point(clamped), clamped, pathfinder)
}

pub fn request_move_to_zone(
    world: &mut WorldState,
    agent_id: &AgentId,
    zone_id: &ZoneId,
    pathfinder: &dyn Pathfinder,
) -> HandlerResult {
    let Some(zone) = world.map.zone(zone_id) else {
        return HandlerResult::failed("movement", format!("no zone {}", zone_id));
    };
    let destination = zone.centroid();
    install_path(
        world,
        agent_id,
        MoveTarget::Zone(zone_id.clone()),
        destination,
        pathfinder,
    )
}

pub fn request_move_to_entity(
    world: &mut WorldState,
    agent_id: &AgentId,
    entity_id: &AgentId,
    pathfinder: &dyn Pathfinder,
) -> HandlerResult {
    let Some(target_transform) = world.store.transform(entity_id) else {
        return HandlerResult::failed("movement", format!("no transform for target {}", entity_id));
    };
    let destination = target_transform.position;
    install_path(
        world,
        agent_id,
        MoveTarget::Entity(entity_id.clone()),
        destination,
        pathfinder,
    )
}

pub fn stop_movement(world: &mut WorldState, agent_id: &AgentId) -> HandlerResult {
    let Some(mut movement) = world.store.movement(agent_id).cloned() else {
        return HandlerResult::failed("movement", format!("no movement for {}", agent_id));
    };
    movement.clear_target();
    match world.store.set_movement(agent_id, movement) {
        Ok(()) => HandlerResult::completed("movement"),
        Err(err) => HandlerResult::failed("movement", err.to_string()),
    }
}

// ============================================================================
// PORT
// ============================================================================

pub struct MovementPortImpl {
    pathfinder: Box<dyn Pathfinder>,
}

impl MovementPortImpl {
    pub fn new(pathfinder: Box<dyn Pathfinder>) -> Self {
        Self { pathfinder }
    }
}

impl Default for MovementPortImpl {
    fn default() -> Self {
        Self::new(Box::new(StraightLinePathfinder))
    }
}

impl MovementPort for MovementPortImpl {
    fn request_move(
        &self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        agent_id: &AgentId,
        target: Position,
    ) -> HandlerResult {
        request_move(world, agent_id, target, self.pathfinder.as_ref())
    }

    fn request_move_to_zone(
        &self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        agent_id: &AgentId,
        zone_id: &ZoneId,
    ) -> HandlerResult {
        request_move_to_zone(world, agent_id, zone_id, self.pathfinder.as_ref())
    }

    fn request_move_to_entity(
        &self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        agent_id: &AgentId,
        entity_id: &AgentId,
    ) -> HandlerResult {
        request_move_to_entity(world, agent_id, entity_id, self.pathfinder.as_ref())
    }

    fn stop_movement(
        &self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        agent_id: &AgentId,
    ) -> HandlerResult {
        stop_movement(world, agent_id)
    }
}

// ============================================================================
// SYSTEM
// ============================================================================

pub struct MovementSystem;

impl MovementSystem {
    fn advance_agent(
        world: &mut WorldState,
        agent_id: &AgentId,
        dt_secs: f32,
    ) -> Result<()> {
        let config = world.config.movement.clone();
        let Some(mut movement) = world.store.movement(agent_id).cloned() else {
            return Ok(());
        };
        let Some(mut transform) = world.store.transform(agent_id).cloned() else {
            return Ok(());
        };

        let Some(&waypoint) = movement.waypoints.get(movement.waypoint_index) else {
            movement.clear_target();
            world.store.set_movement(agent_id, movement)?;
            return Ok(());
        };

        let effective_speed =
            movement.speed * (1.0 - movement.fatigue * config.fatigue_penalty).max(0.1);
        let step = effective_speed * dt_secs;

        let (next, _) = transform.position.step_toward(&waypoint, step);
        transform.position = world.map.clamp_position(next);
        transform.rotation = (waypoint.y - transform.position.y)
            .atan2(waypoint.x - transform.position.x);

        movement.fatigue = (movement.fatigue + config.fatigue_gain * dt_secs).clamp(0.0, 1.0);

        let mut arrived_at_goal = false;
        if transform.position.distance(&waypoint) <= config.arrival_radius {
            movement.waypoint_index += 1;
            if movement.waypoint_index >= movement.waypoints.len() {
                arrived_at_goal = true;
            }
        }

        transform.zone_id = world
            .map
            .zone_containing(transform.position)
            .map(|zone| zone.id.clone());
        let (tx, ty) = transform.position.tile();
        transform.biome = Some(world.map.tile_at(tx, ty).biome.name().to_string());

        let final_position = transform.position;
        world.store.set_transform(agent_id, transform)?;

        if arrived_at_goal {
            debug!("agent {} arrived at {}", agent_id, final_position);
            movement.clear_target();
            let now = world.now();
            world.events.emit(SimulationEvent::MovementArrived {
                agent_id: agent_id.clone(),
                position: final_position,
                timestamp: now,
            });
        }
        world.store.set_movement(agent_id, movement)?;
        Ok(())
    }
}

impl SimSystem for MovementSystem {
    fn name(&self) -> &'static str {
        "movement"
    }

    fn update(
        &mut self,
        world: &mut WorldState,
        _registry: &SystemRegistry,
        dt_secs: f32,
    ) -> Result<()> {
        let moving = world.store.agents_moving();
        let alive: std::collections::HashSet<AgentId> =
            world.store.alive_agents().into_iter().collect();

        for agent_id in moving {
            if !alive.contains(&agent_id) {
                continue;
            }
            Self::advance_agent(world, &agent_id, dt_secs)?;
        }

        // Resting agents shed fatigue
        let fatigue_decay = world.config.movement.fatigue_decay;
        for agent_id in world.store.all_agent_ids() {
            let Some(movement) = world.store.movement(&agent_id) else {
                continue;
            };
            if !movement.is_moving && movement.fatigue > 0.0 {
                let mut movement = movement.clone();
                movement.fatigue = (movement.fatigue - fatigue_decay * dt_secs).max(0.0);
                world.store.set_movement(&agent_id, movement)?;
            }
        }
        Ok(())
    }
}
