//! Combat kill scenario: two MEDIUM ticks past cooldown take an unarmed
//! victim from 50 health to a kill, with removal following.

use std::sync::{Arc, Mutex};

use society_simulator::config::SimConfig;
use society_simulator::events::{EventKind, SimulationEvent};
use society_simulator::ports::SpawnSpec;
use society_simulator::simulation::{Simulation, TickRate};
use society_simulator::types::{AgentId, Position};

fn deterministic_config() -> SimConfig {
    let mut config = SimConfig::default();
    config.combat.damage_jitter = 0.0;
    config.combat.crit_chance = 0.0;
    config.combat.aggression_damage_scale = 0.5;
    config.combat.hostility_affinity = -0.5;
    config
}

#[test]
fn test_combat_ends_in_kill_and_removal() {
    let mut sim = Simulation::for_tests(deterministic_config());
    let attacker = sim
        .spawn_agent(SpawnSpec {
            name: Some("X".to_string()),
            age_years: 30.0,
            position: Some(Position::new(0.5, 0.5)),
            ..SpawnSpec::default()
        })
        .unwrap();
    let victim = sim
        .spawn_agent(SpawnSpec {
            name: Some("Y".to_string()),
            age_years: 30.0,
            position: Some(Position::new(1.2, 0.5)),
            ..SpawnSpec::default()
        })
        .unwrap();

    // Pin the numbers the scenario depends on
    let mut profile = sim.world.store.profile(&attacker).unwrap().clone();
    profile.traits.aggression = 1.0;
    sim.world.store.set_profile(&attacker, profile).unwrap();
    let mut combat = sim.world.store.combat(&attacker).unwrap().clone();
    combat.base_damage = 40.0;
    sim.world.store.set_combat(&attacker, combat).unwrap();

    let mut health = sim.world.store.health(&victim).unwrap().clone();
    health.max = 50.0;
    health.current = 50.0;
    sim.world.store.set_health(&victim, health).unwrap();
    // The victim never fights back
    let mut victim_combat = sim.world.store.combat(&victim).unwrap().clone();
    victim_combat.base_damage = 0.0;
    victim_combat.cooldown_ms = u64::MAX;
    sim.world.store.set_combat(&victim, victim_combat).unwrap();

    sim.world
        .social_graph
        .set_affinity(&attacker, &victim, -0.9);
    sim.world.events.flush_events();

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    for kind in [
        EventKind::CombatEngaged,
        EventKind::CombatHit,
        EventKind::CombatKill,
        EventKind::AgentRemoved,
    ] {
        let seen = seen.clone();
        let attacker = attacker.clone();
        sim.world.events.on(kind, move |event, _sink| {
            let relevant = match event {
                SimulationEvent::CombatEngaged { attacker: a, .. } => a == &attacker,
                SimulationEvent::CombatHit { attacker: a, .. } => a == &attacker,
                SimulationEvent::CombatKill { .. } | SimulationEvent::AgentRemoved { .. } => true,
                _ => false,
            };
            if relevant {
                seen.lock().unwrap().push(event.name().to_string());
            }
            Ok(())
        });
    }

    // Two MEDIUM ticks, each comfortably past the attack cooldown
    let cooldown = sim.world.store.combat(&attacker).unwrap().cooldown_ms;
    for _ in 0..2 {
        sim.world.clock.advance(cooldown + 100);
        sim.tick(TickRate::Medium);
    }

    let events = seen.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "combat:engaged",
            "combat:hit",
            "combat:engaged",
            "combat:hit",
            "combat:kill",
            "agent:removed",
        ],
        "40 damage per hit kills 50 health in two hits"
    );
    assert!(!sim.world.store.has_agent(&victim), "victim removed");
    assert!(sim.world.store.has_agent(&attacker));
}

#[test]
fn test_no_hits_against_already_dead_target() {
    let mut sim = Simulation::for_tests(deterministic_config());
    let attacker = sim
        .spawn_agent(SpawnSpec {
            age_years: 30.0,
            position: Some(Position::new(0.5, 0.5)),
            ..SpawnSpec::default()
        })
        .unwrap();
    let corpse = sim
        .spawn_agent(SpawnSpec {
            age_years: 30.0,
            position: Some(Position::new(1.2, 0.5)),
            ..SpawnSpec::default()
        })
        .unwrap();

    sim.world.social_graph.set_affinity(&attacker, &corpse, -0.9);
    let mut health = sim.world.store.health(&corpse).unwrap().clone();
    health.apply_damage(1000.0, 0);
    sim.world.store.set_health(&corpse, health).unwrap();
    sim.world.events.flush_events();

    let hits: Arc<Mutex<Vec<AgentId>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = hits.clone();
    sim.world.events.on(EventKind::CombatHit, move |event, _sink| {
        if let SimulationEvent::CombatHit { attacker, .. } = event {
            sink.lock().unwrap().push(attacker.clone());
        }
        Ok(())
    });

    sim.world.clock.advance(2000);
    sim.tick(TickRate::Medium);
    assert!(hits.lock().unwrap().is_empty(), "dead targets draw no hits");
}
