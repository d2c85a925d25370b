//! Snapshot serializer: deterministic dump and restore of the live world.
//!
//! The snapshot is versioned and self-describing; map-like containers are
//! stored as ordered arrays of entries so the format stays language
//! independent. Import validates everything before clearing live state: a
//! corrupt snapshot aborts and leaves the world untouched. Agents re-enter
//! through the lifecycle import path so subsystem-local state (equipment
//! slots, spatial index) is rebuilt consistently.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use crate::agents::Component;
use crate::errors::{Result, SimulatorError};
use crate::simulation::state::WorldState;
use crate::systems::animals::Animal;
use crate::systems::combat::CombatLogEntry;
use crate::systems::divine::Blessing;
use crate::systems::emergence::Group;
use crate::systems::equipment::{EquipmentSlots, ToolPoolEntry};
use crate::systems::genealogy::{AncestorEntry, Lineage};
use crate::systems::social::EdgeState;
use crate::types::{AgentId, LineageId};
use crate::world::Zone;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub components: Vec<Component>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub schema_version: u32,
    pub name: String,
    pub created_at: String,
    pub frame_time: u64,
    pub world_seed: u64,
    pub agent_seq: u64,
    pub animal_seq: u64,
    pub group_seq: u64,
    pub agents: Vec<AgentSnapshot>,
    pub zones: Vec<Zone>,
    pub animals: Vec<Animal>,
    pub social_edges: Vec<(AgentId, AgentId, EdgeState)>,
    pub ancestors: Vec<(AgentId, AncestorEntry)>,
    pub lineages: Vec<Lineage>,
    pub lineage_seq: u64,
    pub known_recipes: Vec<(AgentId, Vec<String>)>,
    pub equipment_slots: Vec<(AgentId, EquipmentSlots)>,
    pub tool_pool: Vec<(String, ToolPoolEntry)>,
    pub favor: Vec<(LineageId, f32)>,
    pub blessings: Vec<(LineageId, Vec<Blessing>)>,
    pub divine_power: f32,
    pub groups: Vec<Group>,
    pub combat_log: Vec<CombatLogEntry>,
}

/// Dump the complete externally visible world state
pub fn export_snapshot(world: &WorldState, name: &str) -> WorldSnapshot {
    let (ancestors, lineages, lineage_seq) = world.genealogy.export();
    let (equipment_slots, tool_pool) = world.equipment.export();
    let (favor, blessings, divine_power) = world.favor.export();
    let (agent_seq, animal_seq, group_seq) = world.id_seqs();

    WorldSnapshot {
        schema_version: SCHEMA_VERSION,
        name: name.to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
        frame_time: world.now(),
        world_seed: world.map.seed(),
        agent_seq,
        animal_seq,
        group_seq,
        agents: world
            .store
            .export_all()
            .into_iter()
            .map(|(id, components)| AgentSnapshot { id, components })
            .collect(),
        zones: world.map.zones().cloned().collect(),
        animals: world.animals.export(),
        social_edges: world.social_graph.export(),
        ancestors,
        lineages,
        lineage_seq,
        known_recipes: world.recipes.export_known(),
        equipment_slots,
        tool_pool,
        favor,
        blessings,
        divine_power,
        groups: world.groups.export(),
        combat_log: world.combat_log.entries(),
    }
}

/// Restore a snapshot into the world, replacing all live state.
///
/// Validation happens before any mutation; on error the world is unchanged.
pub fn import_snapshot(world: &mut WorldState, snapshot: &WorldSnapshot) -> Result<()> {
    if snapshot.schema_version != SCHEMA_VERSION {
        return Err(SimulatorError::snapshot(format!(
            "unsupported schema version {} (expected {})",
            snapshot.schema_version, SCHEMA_VERSION
        )));
    }
    let mut seen: HashSet<&AgentId> = HashSet::new();
    for agent in &snapshot.agents {
        if !seen.insert(&agent.id) {
            return Err(SimulatorError::snapshot(format!(
                "duplicate agent {} in snapshot",
                agent.id
            )));
        }
        if agent.components.is_empty() {
            return Err(SimulatorError::snapshot(format!(
                "agent {} has no components",
                agent.id
            )));
        }
    }

    // Point of no return: clear and rebuild
    world.store.import_all(Vec::new())?;
    world.tasks.clear_all();
    world.events.clear_queue();
    world.equipment.import(Vec::new(), Vec::new());

    for agent in &snapshot.agents {
        crate::systems::lifecycle::import_agent(world, agent.id.clone(), agent.components.clone())?;
    }

    world.map.replace_zones(snapshot.zones.clone());
    world.animals.import(snapshot.animals.clone());
    world.social_graph.import(snapshot.social_edges.clone());
    world.genealogy.import(
        snapshot.ancestors.clone(),
        snapshot.lineages.clone(),
        snapshot.lineage_seq,
    );
    world.recipes.import_known(snapshot.known_recipes.clone());
    world
        .equipment
        .import(snapshot.equipment_slots.clone(), snapshot.tool_pool.clone());
    world.favor.import(
        snapshot.favor.clone(),
        snapshot.blessings.clone(),
        snapshot.divine_power,
    );
    world.groups.import(snapshot.groups.clone());
    world.combat_log.replace(snapshot.combat_log.clone());
    world.restore_id_seqs(snapshot.agent_seq, snapshot.animal_seq, snapshot.group_seq);
    world.clock.set_frame_time(snapshot.frame_time);
    world.rebuild_spatial_index();

    info!(
        "imported snapshot '{}' ({} agents, {} animals)",
        snapshot.name,
        snapshot.agents.len(),
        snapshot.animals.len()
    );
    Ok(())
}

/// Write a snapshot to `saves/<name>.ron`
pub fn save_to_file(snapshot: &WorldSnapshot, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let pretty = ron::ser::PrettyConfig::default();
    let text = ron::ser::to_string_pretty(snapshot, pretty)?;
    std::fs::write(path, text)?;
    info!("saved snapshot to {}", path.display());
    Ok(())
}

pub fn load_from_file(path: &Path) -> Result<WorldSnapshot> {
    let text = std::fs::read_to_string(path)?;
    let snapshot: WorldSnapshot = ron::from_str(&text)?;
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::ports::{SpawnSpec, SystemRegistry};
    use crate::systems::animals::{AnimalSystem, Species};
    use crate::types::Position;

    fn populated_world() -> WorldState {
        let mut world = WorldState::for_tests(SimConfig::default());
        world.map.seed_default_zones();
        let registry = SystemRegistry::new();
        for i in 0..3 {
            crate::systems::lifecycle::spawn_agent(
                &mut world,
                &registry,
                SpawnSpec {
                    name: Some(format!("agent {}", i)),
                    age_years: 20.0 + i as f32,
                    position: Some(Position::new(i as f32, 0.0)),
                    ..SpawnSpec::default()
                },
            )
            .unwrap();
        }
        AnimalSystem::spawn_animal(&mut world, Species::Deer, Position::new(5.0, 5.0));
        world.events.clear_queue();
        world
    }

    #[test]
    fn test_roundtrip_is_identity() {
        let world = populated_world();
        let snapshot = export_snapshot(&world, "test");

        let mut restored = WorldState::for_tests(SimConfig::default());
        import_snapshot(&mut restored, &snapshot).unwrap();

        let again = export_snapshot(&restored, "test");
        assert_eq!(snapshot.agents.len(), again.agents.len());
        for (a, b) in snapshot.agents.iter().zip(again.agents.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.components, b.components);
        }
        assert_eq!(snapshot.zones, again.zones);
        assert_eq!(snapshot.animals, again.animals);
        assert_eq!(snapshot.social_edges, again.social_edges);
        assert_eq!(snapshot.ancestors, again.ancestors);
        assert_eq!(snapshot.lineages, again.lineages);
        assert_eq!(snapshot.known_recipes, again.known_recipes);
        assert_eq!(snapshot.frame_time, again.frame_time);
        assert_eq!(snapshot.agent_seq, again.agent_seq);
    }

    #[test]
    fn test_import_rebuilds_spatial_index() {
        let world = populated_world();
        let snapshot = export_snapshot(&world, "test");

        let mut restored = WorldState::for_tests(SimConfig::default());
        import_snapshot(&mut restored, &snapshot).unwrap();
        assert_eq!(restored.spatial.total_entries(), 3);
    }

    #[test]
    fn test_bad_version_rejected_without_damage() {
        let world = populated_world();
        let mut snapshot = export_snapshot(&world, "test");
        snapshot.schema_version = 99;

        let mut target = populated_world();
        let before = target.store.agent_count();
        assert!(import_snapshot(&mut target, &snapshot).is_err());
        assert_eq!(target.store.agent_count(), before, "state untouched");
    }

    #[test]
    fn test_duplicate_agent_rejected() {
        let world = populated_world();
        let mut snapshot = export_snapshot(&world, "test");
        let first = snapshot.agents[0].clone();
        snapshot.agents.push(first);

        let mut target = WorldState::for_tests(SimConfig::default());
        assert!(import_snapshot(&mut target, &snapshot).is_err());
        assert_eq!(target.store.agent_count(), 0);
    }

    #[test]
    fn test_file_roundtrip() {
        let world = populated_world();
        let snapshot = export_snapshot(&world, "file-test");
        let dir = std::env::temp_dir().join("society-sim-test-saves");
        let path = dir.join("file-test.ron");

        save_to_file(&snapshot, &path).unwrap();
        let loaded = load_from_file(&path).unwrap();
        assert_eq!(loaded.agents.len(), snapshot.agents.len());
        assert_eq!(loaded.name, "file-test");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_restored_world_does_not_reuse_ids() {
        let world = populated_world();
        let snapshot = export_snapshot(&world, "test");

        let mut restored = WorldState::for_tests(SimConfig::default());
        import_snapshot(&mut restored, &snapshot).unwrap();

        let fresh = restored.next_agent_id();
        assert!(
            !restored.store.has_agent(&fresh),
            "id sequence continues past imported agents"
        );
    }
}
