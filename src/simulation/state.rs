//! The single mutable simulation state.
//!
//! Everything the subsystems read and write lives here: the component store,
//! the spatial index, the event bus, the task queues, the world map and the
//! domain ledgers. One `WorldState` exists per simulation and is guarded by
//! the owner's single-writer discipline; no subsystem touches it outside a
//! tick callback.

use rand::SeedableRng;
use rand_pcg::Pcg64;

use crate::agents::{AgentStore, SpatialIndex, Task, TaskQueue};
use crate::config::SimConfig;
use crate::errors::Result;
use crate::events::EventBus;
use crate::simulation::clock::FrameClock;
use crate::systems::animals::AnimalStore;
use crate::systems::building::ConstructionLedger;
use crate::systems::combat::CombatLog;
use crate::systems::divine::FavorLedger;
use crate::systems::emergence::GroupLedger;
use crate::systems::equipment::EquipmentLedger;
use crate::systems::genealogy::GenealogyLedger;
use crate::systems::inventory::ItemCatalog;
use crate::systems::recipes::RecipeBook;
use crate::systems::social::SocialGraph;
use crate::types::{AgentId, AnimalId};

const WORLD_HALF_EXTENT: f32 = 256.0;

pub struct WorldState {
    pub config: SimConfig,
    pub clock: FrameClock,
    pub rng: Pcg64,

    pub store: AgentStore,
    pub spatial: SpatialIndex,
    pub events: EventBus,
    pub tasks: TaskQueue,
    pub map: crate::world::WorldMap,

    pub animals: AnimalStore,
    pub social_graph: SocialGraph,
    pub genealogy: GenealogyLedger,
    pub favor: FavorLedger,
    pub recipes: RecipeBook,
    pub equipment: EquipmentLedger,
    pub combat_log: CombatLog,
    pub groups: GroupLedger,
    pub construction: ConstructionLedger,
    pub catalog: ItemCatalog,

    next_agent_seq: u64,
    next_animal_seq: u64,
    next_group_seq: u64,
}

impl WorldState {
    pub fn new(config: SimConfig) -> Self {
        Self::with_clock(config, FrameClock::new())
    }

    /// Deterministic state for tests: manual clock, fixed seed
    pub fn for_tests(config: SimConfig) -> Self {
        Self::with_clock(config, FrameClock::manual())
    }

    fn with_clock(config: SimConfig, clock: FrameClock) -> Self {
        let seed = config.world_seed;
        let cell_size = config.social.proximity_radius.max(config.animals.flee_radius);
        Self {
            rng: Pcg64::seed_from_u64(seed),
            map: crate::world::WorldMap::new(seed, WORLD_HALF_EXTENT),
            spatial: SpatialIndex::new(cell_size),
            store: AgentStore::new(),
            events: EventBus::new(),
            tasks: TaskQueue::new(&config.tasks),
            animals: AnimalStore::new(config.animals.grid_cell_size),
            social_graph: SocialGraph::new(),
            genealogy: GenealogyLedger::new(),
            favor: FavorLedger::new(),
            recipes: RecipeBook::standard(),
            equipment: EquipmentLedger::new(),
            combat_log: CombatLog::new(config.combat.combat_log_capacity),
            groups: GroupLedger::new(),
            construction: ConstructionLedger::new(),
            catalog: ItemCatalog::standard(),
            clock,
            config,
            next_agent_seq: 0,
            next_animal_seq: 0,
            next_group_seq: 0,
        }
    }

    /// Shared tick timestamp in ms
    pub fn now(&self) -> u64 {
        self.clock.frame_time()
    }

    pub fn next_agent_id(&mut self) -> AgentId {
        self.next_agent_seq += 1;
        AgentId::new(format!("agent-{}", self.next_agent_seq))
    }

    pub fn next_animal_id(&mut self) -> AnimalId {
        self.next_animal_seq += 1;
        AnimalId::new(format!("animal-{}", self.next_animal_seq))
    }

    pub fn next_group_id(&mut self) -> String {
        self.next_group_seq += 1;
        format!("group-{}", self.next_group_seq)
    }

    /// Highest id sequence counters, persisted so restored worlds never
    /// reuse ids.
    pub fn id_seqs(&self) -> (u64, u64, u64) {
        (self.next_agent_seq, self.next_animal_seq, self.next_group_seq)
    }

    pub fn restore_id_seqs(&mut self, agent: u64, animal: u64, group: u64) {
        self.next_agent_seq = agent;
        self.next_animal_seq = animal;
        self.next_group_seq = group;
    }

    // ── Task queue access ────────────────────────────────────────────────
    //
    // The queue needs the store (AI pointer upkeep) and the bus (lifecycle
    // events) alongside itself; these wrappers do the field splitting so
    // callers outside this crate can stay on the public surface.

    pub fn enqueue_task(
        &mut self,
        agent_id: &AgentId,
        task: Task,
        priority: i32,
    ) -> Result<Option<String>> {
        let now = self.clock.frame_time();
        self.tasks
            .enqueue(&self.store, &mut self.events, now, agent_id, task, priority)
    }

    pub fn enqueue_urgent_task(
        &mut self,
        agent_id: &AgentId,
        task: Task,
    ) -> Result<Option<String>> {
        let now = self.clock.frame_time();
        self.tasks
            .enqueue_urgent(&mut self.store, &mut self.events, now, agent_id, task)
    }

    /// The agent's current task: the still-valid active one, or the next
    /// pending task promoted to active
    pub fn next_task_for(&mut self, agent_id: &AgentId) -> Option<Task> {
        let now = self.clock.frame_time();
        self.tasks
            .next_task(&mut self.store, &mut self.events, now, agent_id)
    }

    pub fn complete_active_task(&mut self, agent_id: &AgentId) {
        let now = self.clock.frame_time();
        self.tasks
            .complete_task(&mut self.store, &mut self.events, now, agent_id);
    }

    pub fn fail_active_task(&mut self, agent_id: &AgentId, reason: &str) {
        let now = self.clock.frame_time();
        self.tasks
            .fail_task(&mut self.store, &mut self.events, now, agent_id, reason);
    }

    /// Rebuild the spatial index from every alive agent's transform.
    /// Called by the scheduler at preTick; the index is read-only after.
    pub fn rebuild_spatial_index(&mut self) {
        self.spatial.clear();
        for id in self.store.alive_agents() {
            if let Some(transform) = self.store.transform(&id) {
                let position = transform.position;
                self.spatial.insert(id, position.x, position.y);
            }
        }
    }
}
