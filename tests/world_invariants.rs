//! Universal invariants: hold after every postTick, across a mixed run.

use std::collections::HashSet;

use society_simulator::agents::{ComponentKind, NeedKind};
use society_simulator::config::SimConfig;
use society_simulator::simulation::{Simulation, TickRate};

fn assert_invariants(sim: &mut Simulation, step: usize) {
    // Event bus queue is empty immediately after postTick
    assert_eq!(
        sim.world.events.queue_size(),
        0,
        "step {}: event queue drained",
        step
    );

    let ids = sim.world.store.all_agent_ids();
    for id in &ids {
        if let Some(needs) = sim.world.store.needs(id) {
            for kind in NeedKind::ALL {
                let value = needs.get(kind);
                assert!(
                    (0.0..=100.0).contains(&value),
                    "step {}: {} {:?} = {} out of [0, 100]",
                    step,
                    id,
                    kind,
                    value
                );
            }
        }
        if let Some(health) = sim.world.store.health(id) {
            assert!(
                health.current >= 0.0 && health.current <= health.max,
                "step {}: {} health {} outside [0, {}]",
                step,
                id,
                health.current,
                health.max
            );
            assert_eq!(
                health.is_dead,
                health.current == 0.0,
                "step {}: {} dead flag does not match zero health",
                step,
                id
            );
        }
    }

    // Social edges stay in [-1, 1]; symmetry is structural (one entry per
    // unordered pair) so reading both directions must agree
    for ((a, b), edge) in sim.world.social_graph.edges() {
        assert!(
            (-1.0..=1.0).contains(&edge.affinity),
            "step {}: affinity({}, {}) = {}",
            step,
            a,
            b,
            edge.affinity
        );
        assert_eq!(
            sim.world.social_graph.affinity(a, b),
            sim.world.social_graph.affinity(b, a),
            "step {}: asymmetric edge",
            step
        );
    }

    // At most one active task per agent
    assert!(
        sim.world.tasks.total_active() <= sim.world.store.agent_count(),
        "step {}: more active tasks than agents",
        step
    );

    // Spatial index after a rebuild holds exactly the alive agents that
    // have a transform
    sim.world.rebuild_spatial_index();
    let alive_with_transform: HashSet<_> = sim
        .world
        .store
        .alive_agents()
        .into_iter()
        .filter(|id| sim.world.store.transform(id).is_some())
        .collect();
    assert_eq!(
        sim.world.spatial.total_entries(),
        alive_with_transform.len(),
        "step {}: spatial index matches alive population",
        step
    );

    // Cached queries agree with a fresh component scan
    let cached_combat: HashSet<_> = sim.world.store.agents_in_combat().into_iter().collect();
    let scanned_combat: HashSet<_> = ids
        .iter()
        .filter(|id| {
            matches!(
                sim.world.store.get_component(id, ComponentKind::Combat),
                Some(society_simulator::agents::Component::Combat(combat)) if combat.is_in_combat
            )
        })
        .cloned()
        .collect();
    assert_eq!(cached_combat, scanned_combat, "step {}: combat cache", step);

    let cached_moving: HashSet<_> = sim.world.store.agents_moving().into_iter().collect();
    let scanned_moving: HashSet<_> = ids
        .iter()
        .filter(|id| {
            matches!(
                sim.world.store.get_component(id, ComponentKind::Movement),
                Some(society_simulator::agents::Component::Movement(movement)) if movement.is_moving
            )
        })
        .cloned()
        .collect();
    assert_eq!(cached_moving, scanned_moving, "step {}: movement cache", step);
}

#[test]
fn test_invariants_hold_across_mixed_run() {
    let mut sim = Simulation::for_tests(SimConfig::default());
    sim.seed_world(8).unwrap();

    for step in 0..120 {
        sim.world.clock.advance(50);
        sim.tick(TickRate::Fast);
        if step % 5 == 0 {
            sim.tick(TickRate::Medium);
        }
        if step % 20 == 0 {
            sim.tick(TickRate::Slow);
        }
        assert_invariants(&mut sim, step);
    }
}

#[test]
fn test_invariants_hold_under_population_churn() {
    let mut sim = Simulation::for_tests(SimConfig::default());
    sim.seed_world(5).unwrap();

    for step in 0..40 {
        // Churn: spawn and remove along the way; the following tick
        // dispatches the resulting events to every consumer
        if step == 10 {
            sim.spawn_agent(society_simulator::ports::SpawnSpec {
                age_years: 20.0,
                ..Default::default()
            })
            .unwrap();
        }
        if step == 20 {
            let someone = sim.world.store.all_agent_ids()[0].clone();
            sim.remove_agent(&someone, "churn test").unwrap();
        }

        sim.world.clock.advance(250);
        sim.step();
        assert_invariants(&mut sim, step);
    }
}
