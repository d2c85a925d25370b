//! Decision layer: turns needs and roles into tasks, and tasks into port
//! calls.
//!
//! Each MEDIUM tick every alive agent either advances its active task or,
//! when idle, plans a new one from its worst unsatisfied need (falling back
//! to work duty, then to wandering). Task execution is delegated through
//! ports and interpreted uniformly via `HandlerResult`; arrival and failure
//! events advance or fail the matching active task.

use tracing::debug;

use crate::agents::{NeedKind, Task, TaskTarget, TaskType};
use crate::errors::Result;
use crate::events::SimulationEvent;
use crate::ports::SystemRegistry;
use crate::simulation::scheduler::SimSystem;
use crate::simulation::state::WorldState;
use crate::types::AgentId;
use crate::world::ZoneType;

/// Minimum pause between planning decisions per agent, ms
const DECISION_INTERVAL_MS: u64 = 2_000;
/// Needs above this level are not worth acting on
const NEED_ACT_LEVEL: f32 = 60.0;
/// A need below this level plans with urgency
const NEED_URGENT_LEVEL: f32 = 20.0;
/// Energy / hygiene restored to this level count as done
const RESTORE_DONE: f32 = 90.0;
/// How long a work shift task lasts, ms
const WORK_SHIFT_MS: u64 = 15_000;

enum Progress {
    InProgress,
    Done,
    Failed(&'static str),
}

pub struct DecisionSystem;

impl DecisionSystem {
    fn next_task(world: &mut WorldState, agent_id: &AgentId) -> Option<Task> {
        world.next_task_for(agent_id)
    }

    fn complete(world: &mut WorldState, agent_id: &AgentId) {
        world.complete_active_task(agent_id);
    }

    fn fail(world: &mut WorldState, agent_id: &AgentId, reason: &str) {
        world.fail_active_task(agent_id, reason);
    }

    fn enqueue(
        world: &mut WorldState,
        agent_id: &AgentId,
        task: Task,
        priority: i32,
        urgent: bool,
    ) {
        let result = if urgent {
            world.enqueue_urgent_task(agent_id, task)
        } else {
            world.enqueue_task(agent_id, task, priority)
        };
        if let Err(err) = result {
            debug!("could not enqueue task for {}: {}", agent_id, err);
        }
    }

    /// Move toward a zone of the given type. Returns None when no such zone
    /// exists, otherwise whether the agent is already inside it.
    fn head_to_zone(
        world: &mut WorldState,
        registry: &SystemRegistry,
        agent_id: &AgentId,
        zone_type: ZoneType,
    ) -> Option<bool> {
        let position = world.store.transform(agent_id)?.position;
        let inside = world
            .map
            .zone_containing(position)
            .map(|zone| zone.zone_type == zone_type)
            .unwrap_or(false);
        if inside {
            return Some(true);
        }
        let target = world
            .map
            .zones_of_type(zone_type)
            .first()
            .map(|zone| zone.id.clone())?;
        let moving = world
            .store
            .movement(agent_id)
            .map(|movement| movement.is_moving)
            .unwrap_or(false);
        if !moving {
            if let Some(movement) = registry.movement() {
                let result = movement.request_move_to_zone(world, registry, agent_id, &target);
                if result.is_failure() {
                    return None;
                }
            }
        }
        Some(false)
    }

    fn consume_or_fetch(
        world: &mut WorldState,
        registry: &SystemRegistry,
        agent_id: &AgentId,
        item: &str,
        need: NeedKind,
        restore: f32,
        zone_type: ZoneType,
    ) -> Progress {
        // Pocket supply first
        let pocketed = world
            .store
            .inventory(agent_id)
            .map(|inventory| inventory.quantity(item) > 0)
            .unwrap_or(false);
        if pocketed {
            crate::systems::inventory::remove_from_agent(world, agent_id, item, 1);
            let _ = crate::systems::needs::satisfy_need(world, agent_id, need, restore);
            return Progress::Done;
        }

        // Then the zone stockpile, walking there if necessary
        match Self::head_to_zone(world, registry, agent_id, zone_type) {
            Some(true) => {
                let zone_id = world
                    .store
                    .transform(agent_id)
                    .map(|transform| transform.position)
                    .and_then(|position| world.map.zone_containing(position))
                    .map(|zone| zone.id.clone());
                if let Some(zone_id) = zone_id {
                    let taken =
                        crate::systems::inventory::take_from_stockpile(world, &zone_id, item, 1.0);
                    if taken >= 1.0 {
                        let _ = crate::systems::needs::satisfy_need(world, agent_id, need, restore);
                        return Progress::Done;
                    }
                }
                Progress::Failed("supply exhausted")
            }
            Some(false) => Progress::InProgress,
            None => Progress::Failed("no supply zone"),
        }
    }

    fn dispatch(
        &mut self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        agent_id: &AgentId,
        task: Task,
        dt_secs: f32,
    ) -> Result<()> {
        let now = world.now();
        let progress = match task.task_type {
            TaskType::MoveTo | TaskType::Wander => {
                // Arrival events complete these; here we only start them
                let moving = world
                    .store
                    .movement(agent_id)
                    .map(|movement| movement.is_moving)
                    .unwrap_or(false);
                if moving {
                    Progress::InProgress
                } else {
                    // A targetless wander picks its own destination
                    let target = match (&task.target, task.task_type) {
                        (None, TaskType::Wander) => Self::wander_target(world, agent_id),
                        (target, _) => target.clone(),
                    };
                    match (&target, registry.movement()) {
                        (Some(TaskTarget::Position(position)), Some(movement)) => {
                            let result =
                                movement.request_move(world, registry, agent_id, *position);
                            if result.is_failure() {
                                Progress::Failed("unreachable")
                            } else {
                                Progress::InProgress
                            }
                        }
                        (Some(TaskTarget::Zone(zone_id)), Some(movement)) => {
                            let zone_id = zone_id.clone();
                            let result =
                                movement.request_move_to_zone(world, registry, agent_id, &zone_id);
                            if result.is_failure() {
                                Progress::Failed("unreachable")
                            } else {
                                Progress::InProgress
                            }
                        }
                        (Some(TaskTarget::Agent(other)), Some(movement)) => {
                            let other = other.clone();
                            let result =
                                movement.request_move_to_entity(world, registry, agent_id, &other);
                            if result.is_failure() {
                                Progress::Failed("unreachable")
                            } else {
                                Progress::InProgress
                            }
                        }
                        _ => Progress::Failed("no movement target"),
                    }
                }
            }
            TaskType::Eat => Self::consume_or_fetch(
                world,
                registry,
                agent_id,
                "food",
                NeedKind::Hunger,
                35.0,
                ZoneType::Food,
            ),
            TaskType::Drink => Self::consume_or_fetch(
                world,
                registry,
                agent_id,
                "water",
                NeedKind::Thirst,
                40.0,
                ZoneType::Water,
            ),
            TaskType::Rest => {
                let _ = crate::systems::needs::satisfy_need(
                    world,
                    agent_id,
                    NeedKind::Energy,
                    12.0 * dt_secs,
                );
                let rested = world
                    .store
                    .needs(agent_id)
                    .map(|needs| needs.energy >= RESTORE_DONE)
                    .unwrap_or(true);
                if rested {
                    Progress::Done
                } else {
                    Progress::InProgress
                }
            }
            TaskType::Wash => {
                let _ = crate::systems::needs::satisfy_need(
                    world,
                    agent_id,
                    NeedKind::Hygiene,
                    15.0 * dt_secs,
                );
                let clean = world
                    .store
                    .needs(agent_id)
                    .map(|needs| needs.hygiene >= RESTORE_DONE)
                    .unwrap_or(true);
                if clean {
                    Progress::Done
                } else {
                    Progress::InProgress
                }
            }
            TaskType::Work => {
                let work_zone = world
                    .store
                    .role(agent_id)
                    .and_then(|role| role.work_zone_id.clone());
                match work_zone {
                    None => Progress::Failed("no work zone"),
                    Some(zone_id) => {
                        let here = world
                            .store
                            .transform(agent_id)
                            .and_then(|transform| transform.zone_id.clone())
                            .map(|current| current == zone_id)
                            .unwrap_or(false);
                        if here {
                            let shift_done = world
                                .tasks
                                .active_task(agent_id)
                                .map(|active| now.saturating_sub(active.started_at) >= WORK_SHIFT_MS)
                                .unwrap_or(true);
                            if shift_done {
                                Progress::Done
                            } else {
                                Progress::InProgress
                            }
                        } else {
                            let moving = world
                                .store
                                .movement(agent_id)
                                .map(|movement| movement.is_moving)
                                .unwrap_or(false);
                            if !moving {
                                if let Some(movement) = registry.movement() {
                                    let result = movement
                                        .request_move_to_zone(world, registry, agent_id, &zone_id);
                                    if result.is_failure() {
                                        Progress::Failed("work zone unreachable")
                                    } else {
                                        Progress::InProgress
                                    }
                                } else {
                                    Progress::Failed("movement capability unavailable")
                                }
                            } else {
                                Progress::InProgress
                            }
                        }
                    }
                }
            }
            TaskType::Craft => match &task.target {
                Some(TaskTarget::Item(recipe_id)) => {
                    let recipe_id = recipe_id.clone();
                    match registry.crafting() {
                        Some(crafting) => {
                            let result =
                                crafting.attempt_craft(world, registry, agent_id, &recipe_id);
                            if result.is_failure() {
                                Progress::Failed("craft failed")
                            } else {
                                Progress::Done
                            }
                        }
                        None => Progress::Failed("crafting capability unavailable"),
                    }
                }
                _ => Progress::Failed("no recipe target"),
            },
            TaskType::Attack => match &task.target {
                Some(TaskTarget::Agent(target)) => {
                    let target = target.clone();
                    let gone = world
                        .store
                        .health(&target)
                        .map(|health| health.is_dead)
                        .unwrap_or(true);
                    if gone {
                        Progress::Done
                    } else {
                        // Close the distance; the combat system lands hits
                        let moving = world
                            .store
                            .movement(agent_id)
                            .map(|movement| movement.is_moving)
                            .unwrap_or(false);
                        if !moving {
                            if let Some(movement) = registry.movement() {
                                movement.request_move_to_entity(world, registry, agent_id, &target);
                            }
                        }
                        Progress::InProgress
                    }
                }
                _ => Progress::Failed("no attack target"),
            },
            TaskType::Socialize => {
                let position = world
                    .store
                    .transform(agent_id)
                    .map(|transform| transform.position);
                match position {
                    None => Progress::Failed("no transform"),
                    Some(position) => {
                        let nearest = world
                            .spatial
                            .query_radius(position, 12.0)
                            .into_iter()
                            .filter(|entry| &entry.id != agent_id)
                            .min_by(|a, b| {
                                a.position
                                    .distance_sq(&position)
                                    .partial_cmp(&b.position.distance_sq(&position))
                                    .unwrap_or(std::cmp::Ordering::Equal)
                            });
                        match nearest {
                            None => Progress::Failed("nobody around"),
                            Some(entry) if entry.position.distance(&position) <= 2.0 => {
                                if let Some(social) = registry.social() {
                                    social.add_edge(world, registry, agent_id, &entry.id, 0.05);
                                }
                                let _ = crate::systems::needs::satisfy_need(
                                    world,
                                    agent_id,
                                    NeedKind::Social,
                                    15.0,
                                );
                                Progress::Done
                            }
                            Some(entry) => {
                                let moving = world
                                    .store
                                    .movement(agent_id)
                                    .map(|movement| movement.is_moving)
                                    .unwrap_or(false);
                                if !moving {
                                    if let Some(movement) = registry.movement() {
                                        movement.request_move_to_entity(
                                            world, registry, agent_id, &entry.id,
                                        );
                                    }
                                }
                                Progress::InProgress
                            }
                        }
                    }
                }
            }
            TaskType::Build => match (&task.target, registry.building()) {
                (Some(TaskTarget::Zone(zone_id)), Some(building)) => {
                    let zone_id = zone_id.clone();
                    let result = building.request_construction(world, registry, &zone_id, "house");
                    if result.is_failure() {
                        Progress::Failed("construction rejected")
                    } else {
                        Progress::Done
                    }
                }
                _ => Progress::Failed("no build target"),
            },
            TaskType::Deliver => match Self::head_to_zone(world, registry, agent_id, ZoneType::Storage)
            {
                Some(true) => {
                    let zone_id = world
                        .store
                        .transform(agent_id)
                        .map(|transform| transform.position)
                        .and_then(|position| world.map.zone_containing(position))
                        .map(|zone| zone.id.clone());
                    if let Some(zone_id) = zone_id {
                        for item in ["wood", "stone", "food"] {
                            let held = world
                                .store
                                .inventory(agent_id)
                                .map(|inventory| inventory.quantity(item))
                                .unwrap_or(0);
                            if held > 0 {
                                let removed = crate::systems::inventory::remove_from_agent(
                                    world, agent_id, item, held,
                                );
                                crate::systems::inventory::add_to_stockpile(
                                    world,
                                    &zone_id,
                                    item,
                                    removed as f32,
                                );
                            }
                        }
                    }
                    Progress::Done
                }
                Some(false) => Progress::InProgress,
                None => Progress::Failed("no storage zone"),
            },
        };

        match progress {
            Progress::InProgress => {}
            Progress::Done => Self::complete(world, agent_id),
            Progress::Failed(reason) => Self::fail(world, agent_id, reason),
        }
        Ok(())
    }

    fn plan(&mut self, world: &mut WorldState, agent_id: &AgentId) {
        let now = world.now();
        let Some(ai) = world.store.ai_state(agent_id) else {
            return;
        };
        if now.saturating_sub(ai.last_decision_at) < DECISION_INTERVAL_MS {
            return;
        }
        let mut ai = ai.clone();
        ai.last_decision_at = now;
        let _ = world.store.set_ai_state(agent_id, ai);

        let Some(needs) = world.store.needs(agent_id) else {
            return;
        };
        let (worst, value) = needs.worst();

        let (task_type, target) = if value < NEED_ACT_LEVEL {
            match worst {
                NeedKind::Hunger => (TaskType::Eat, None),
                NeedKind::Thirst => (TaskType::Drink, None),
                NeedKind::Energy => (TaskType::Rest, None),
                NeedKind::Hygiene => (TaskType::Wash, None),
                NeedKind::Social => (TaskType::Socialize, None),
                NeedKind::Fun | NeedKind::MentalHealth => (TaskType::Wander, Self::wander_target(world, agent_id)),
            }
        } else {
            let works = world
                .store
                .role(agent_id)
                .map(|role| role.on_duty && role.work_zone_id.is_some())
                .unwrap_or(false);
            if works {
                (TaskType::Work, None)
            } else {
                (TaskType::Wander, Self::wander_target(world, agent_id))
            }
        };

        let urgent = value < NEED_URGENT_LEVEL;
        let priority = if value < NEED_ACT_LEVEL {
            (100.0 - value).clamp(20.0, 95.0) as i32
        } else {
            10
        };
        let task = Task::new(task_type, target, now);
        Self::enqueue(world, agent_id, task, priority, urgent);
    }

    fn wander_target(world: &mut WorldState, agent_id: &AgentId) -> Option<TaskTarget> {
        let position = world.store.transform(agent_id)?.position;
        use rand::Rng;
        let target = world.map.clamp_position(crate::types::Position::new(
            position.x + world.rng.gen_range(-10.0..10.0),
            position.y + world.rng.gen_range(-10.0..10.0),
        ));
        Some(TaskTarget::Position(target))
    }
}

impl SimSystem for DecisionSystem {
    fn name(&self) -> &'static str {
        "decision"
    }

    fn update(
        &mut self,
        world: &mut WorldState,
        registry: &SystemRegistry,
        dt_secs: f32,
    ) -> Result<()> {
        for agent_id in world.store.alive_agents() {
            if world.store.ai_state(&agent_id).is_none() {
                continue;
            }
            match Self::next_task(world, &agent_id) {
                Some(task) => self.dispatch(world, registry, &agent_id, task, dt_secs)?,
                None => self.plan(world, &agent_id),
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
                SimulationEvent::MovementArrived { agent_id, .. } => {
                    let active = world
                        .tasks
                        .active_task(agent_id)
                        .map(|active| active.task.task_type);
                    match active {
                        Some(TaskType::MoveTo) => Self::complete(world, agent_id),
                        Some(TaskType::Wander) => {
                            let _ = crate::systems::needs::satisfy_need(
                                world,
                                agent_id,
                                NeedKind::Fun,
                                10.0,
                            );
                            Self::complete(world, agent_id);
                        }
                        _ => {}
                    }
                }
                SimulationEvent::MovementFailed { agent_id, .. } => {
                    let movement_task = world
                        .tasks
                        .active_task(agent_id)
                        .map(|active| {
                            matches!(active.task.task_type, TaskType::MoveTo | TaskType::Wander)
                        })
                        .unwrap_or(false);
                    if movement_task {
                        Self::fail(world, agent_id, "unreachable");
                    }
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{
        AiState, Component, Health, Inventory, Movement, Needs, Transform,
    };
    use crate::config::SimConfig;
    use crate::types::Position;

    fn idle_agent(world: &mut WorldState, id: &str, hunger: f32) -> AgentId {
        let agent = AgentId::from(id);
        let mut needs = Needs::default();
        needs.set(NeedKind::Hunger, hunger);
        world
            .store
            .register_agent(
                agent.clone(),
                vec![
                    Component::Health(Health::new(100.0)),
                    Component::Needs(needs),
                    Component::Transform(Transform::at(Position::new(9.0, 9.0))),
                    Component::Movement(Movement::stationary(3.0)),
                    Component::Inventory(Inventory::with_capacity(30.0, 10.0)),
                    Component::Ai(AiState::default()),
                ],
            )
            .unwrap();
        agent
    }

    fn decision_world() -> (WorldState, SystemRegistry) {
        let mut world = WorldState::for_tests(SimConfig::default());
        world.map.seed_default_zones();
        let mut registry = SystemRegistry::new();
        registry.register_movement(Box::new(
            crate::systems::movement::MovementPortImpl::default(),
        ));
        registry.register_inventory(Box::new(crate::systems::inventory::InventoryPortImpl));
        registry.register_needs(Box::new(crate::systems::needs::NeedsPortImpl));
        (world, registry)
    }

    #[test]
    fn test_hungry_agent_plans_eat() {
        let (mut world, registry) = decision_world();
        let agent = idle_agent(&mut world, "a", 30.0);
        world.clock.advance(DECISION_INTERVAL_MS + 1);

        let mut system = DecisionSystem;
        system.update(&mut world, &registry, 0.25).unwrap();
        assert!(world.tasks.has_task_of_type(&agent, TaskType::Eat));
    }

    #[test]
    fn test_eat_from_pocket_completes_and_restores() {
        let (mut world, registry) = decision_world();
        let agent = idle_agent(&mut world, "a", 30.0);
        crate::systems::inventory::add_resource(&mut world, &agent, "food", 2).unwrap();
        world.clock.advance(DECISION_INTERVAL_MS + 1);

        let mut system = DecisionSystem;
        // First pass plans, second dispatches the Eat task
        system.update(&mut world, &registry, 0.25).unwrap();
        system.update(&mut world, &registry, 0.25).unwrap();

        let needs = world.store.needs(&agent).unwrap();
        assert!(needs.hunger > 30.0, "hunger restored, got {}", needs.hunger);
        assert_eq!(world.store.inventory(&agent).unwrap().quantity("food"), 1);
        assert!(world.tasks.active_task(&agent).is_none(), "task completed");
    }

    #[test]
    fn test_sated_idle_agent_wanders() {
        let (mut world, registry) = decision_world();
        let agent = idle_agent(&mut world, "a", 100.0);
        // Top up the defaults that start below the act level
        let mut needs = world.store.needs(&agent).unwrap().clone();
        for kind in NeedKind::ALL {
            needs.set(kind, 100.0);
        }
        world.store.set_needs(&agent, needs).unwrap();
        world.clock.advance(DECISION_INTERVAL_MS + 1);

        let mut system = DecisionSystem;
        system.update(&mut world, &registry, 0.25).unwrap();
        assert!(world.tasks.has_task_of_type(&agent, TaskType::Wander));
    }

    #[test]
    fn test_arrival_completes_move_task() {
        let (mut world, registry) = decision_world();
        let agent = idle_agent(&mut world, "a", 100.0);
        let now = world.now();
        world
            .enqueue_task(
                &agent,
                Task::new(
                    TaskType::MoveTo,
                    Some(TaskTarget::Position(Position::new(5.0, 5.0))),
                    now,
                ),
                50,
            )
            .unwrap();
        world.next_task_for(&agent).unwrap();

        let mut system = DecisionSystem;
        system.on_events(
            &[SimulationEvent::MovementArrived {
                agent_id: agent.clone(),
                position: Position::new(5.0, 5.0),
                timestamp: now,
            }],
            &mut world,
            &registry,
        );
        assert!(world.tasks.active_task(&agent).is_none());
    }
}
