//! Movement arrival scenario: a FAST-rate walk across 100 tiles lands
//! within the arrival radius and fires `movement:arrived` exactly once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use society_simulator::config::SimConfig;
use society_simulator::events::{EventKind, SimulationEvent};
use society_simulator::ports::SpawnSpec;
use society_simulator::simulation::{Simulation, TickRate};
use society_simulator::types::Position;
use society_simulator::world::TerrainType;

#[test]
fn test_straight_run_arrives_once() {
    let mut sim = Simulation::for_tests(SimConfig::default());
    // Guarantee a walkable corridor from the origin to (100, 0)
    for x in -2..=104 {
        for y in -2..=2 {
            sim.world.map.modify_tile(x, y, TerrainType::Grass).unwrap();
        }
    }

    let agent = sim
        .spawn_agent(SpawnSpec {
            age_years: 25.0,
            position: Some(Position::new(0.0, 0.0)),
            ..SpawnSpec::default()
        })
        .unwrap();
    let mut movement = sim.world.store.movement(&agent).unwrap().clone();
    movement.speed = 10.0;
    movement.base_speed = 10.0;
    sim.world.store.set_movement(&agent, movement).unwrap();

    let arrivals = Arc::new(AtomicUsize::new(0));
    let counter = arrivals.clone();
    sim.world.events.on(EventKind::MovementArrived, move |event, _sink| {
        if matches!(event, SimulationEvent::MovementArrived { .. }) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    });

    let movement_port = sim.registry.movement().unwrap();
    let result = movement_port.request_move(
        &mut sim.world,
        &sim.registry,
        &agent,
        Position::new(100.0, 0.0),
    );
    assert!(!result.is_failure());
    assert!(sim.world.store.movement(&agent).unwrap().is_moving);

    // 100 tiles at speed 10 is ~10s of 50ms FAST ticks; fatigue stretches it
    for _ in 0..400 {
        sim.world.clock.advance(50);
        sim.tick(TickRate::Fast);
        if arrivals.load(Ordering::SeqCst) > 0 {
            break;
        }
    }
    // A few extra ticks to prove the event does not repeat
    for _ in 0..10 {
        sim.world.clock.advance(50);
        sim.tick(TickRate::Fast);
    }

    assert_eq!(arrivals.load(Ordering::SeqCst), 1, "arrived exactly once");

    let movement = sim.world.store.movement(&agent).unwrap();
    assert!(!movement.is_moving);
    assert!(movement.target.is_none());

    let position = sim.world.store.transform(&agent).unwrap().position;
    assert!(
        position.distance(&Position::new(100.0, 0.0))
            <= sim.world.config.movement.arrival_radius + 0.5,
        "final position {} is within the arrival radius",
        position
    );
}

#[test]
fn test_move_into_water_fails() {
    let mut sim = Simulation::for_tests(SimConfig::default());
    for x in -2..=10 {
        for y in -2..=2 {
            sim.world.map.modify_tile(x, y, TerrainType::Grass).unwrap();
        }
    }
    sim.world.map.modify_tile(5, 0, TerrainType::DeepWater).unwrap();

    let agent = sim
        .spawn_agent(SpawnSpec {
            age_years: 25.0,
            position: Some(Position::new(0.5, 0.5)),
            ..SpawnSpec::default()
        })
        .unwrap();

    let movement_port = sim.registry.movement().unwrap();
    let result = movement_port.request_move(
        &mut sim.world,
        &sim.registry,
        &agent,
        Position::new(5.5, 0.5),
    );
    assert!(result.is_failure());

    let failed = sim
        .world
        .events
        .flush_events()
        .into_iter()
        .any(|event| matches!(event, SimulationEvent::MovementFailed { .. }));
    assert!(failed, "unreachable request completes as movement:failed");
    assert!(!sim.world.store.movement(&agent).unwrap().is_moving);
}
