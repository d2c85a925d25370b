//! Spawn-and-age scenario: a newborn grows into an adult over simulated
//! years of SLOW ticks.

use society_simulator::agents::{LifeStage, Sex};
use society_simulator::config::SimConfig;
use society_simulator::ports::SpawnSpec;
use society_simulator::simulation::{Simulation, TickRate};
use society_simulator::types::Position;

#[test]
fn test_spawn_and_age_to_adult() {
    let mut sim = Simulation::for_tests(SimConfig::default());
    let agent = sim
        .spawn_agent(SpawnSpec {
            name: Some("A".to_string()),
            sex: Some(Sex::Male),
            age_years: 0.0,
            position: Some(Position::new(0.5, 0.5)),
            ..SpawnSpec::default()
        })
        .unwrap();

    assert_eq!(
        sim.world.store.profile(&agent).unwrap().life_stage,
        LifeStage::Child
    );

    // 900 simulated seconds at the default 30 s/year = 30 years
    for _ in 0..900 {
        sim.world.clock.advance(1000);
        sim.tick(TickRate::Slow);
    }

    let profile = sim.world.store.profile(&agent).unwrap();
    assert_eq!(profile.life_stage, LifeStage::Adult, "child became adult");
    assert!(
        (profile.age_years - 30.0).abs() < 1.0,
        "aged about 30 years, got {}",
        profile.age_years
    );
    assert!(
        sim.world.store.alive_agents().contains(&agent),
        "still among the living"
    );
}

#[test]
fn test_elder_transition_and_old_age_death() {
    let mut sim = Simulation::for_tests(SimConfig::default());
    let agent = sim
        .spawn_agent(SpawnSpec {
            age_years: 59.0,
            position: Some(Position::new(0.5, 0.5)),
            ..SpawnSpec::default()
        })
        .unwrap();

    // Cross the elder line
    for _ in 0..60 {
        sim.world.clock.advance(1000);
        sim.tick(TickRate::Slow);
    }
    assert_eq!(
        sim.world.store.profile(&agent).unwrap().life_stage,
        LifeStage::Elder
    );

    // Ride out to max age: the agent leaves the world entirely
    for _ in 0..700 {
        sim.world.clock.advance(1000);
        sim.tick(TickRate::Slow);
        if !sim.world.store.has_agent(&agent) {
            break;
        }
    }
    assert!(!sim.world.store.has_agent(&agent), "removed at max age");

    // Genealogy recorded the death
    let lineage = sim.world.genealogy.lineages().next().unwrap();
    assert_eq!(lineage.total_died, 1);
    assert!(lineage.living_members.is_empty());
}

#[test]
fn test_immortal_agents_never_age_out() {
    let mut sim = Simulation::for_tests(SimConfig::default());
    let agent = sim
        .spawn_agent(SpawnSpec {
            age_years: 79.0,
            immortal: true,
            position: Some(Position::new(0.5, 0.5)),
            ..SpawnSpec::default()
        })
        .unwrap();

    for _ in 0..120 {
        sim.world.clock.advance(1000);
        sim.tick(TickRate::Slow);
    }
    assert!(sim.world.store.has_agent(&agent));
}
