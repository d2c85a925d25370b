//! Event-driven communication between subsystems.
//!
//! Every event is one variant of a closed tagged union: the event name
//! determines the payload shape, and dispatch goes through a table keyed by
//! that tag. Producers emit during a tick; the scheduler flushes the queue at
//! postTick so consumers always observe a fully committed store.
//!
//! Batching is on by default. `emit` appends to an in-tick FIFO queue;
//! `flush_events` dispatches every queued event in enqueue order and drains
//! to empty. Handlers receive an `EventSink` to emit follow-up events;
//! those land back on the queue and are dispatched in the same flush pass.
//! Handler errors are logged and never abort the flush.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{AgentId, AnimalId, LineageId, Position, ZoneId};

// ============================================================================
// EVENT TYPE DEFINITIONS
// ============================================================================

/// Cause of an animal death
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimalDeathCause {
    Starvation,
    Dehydration,
    OldAge,
    Hunted,
}

/// Either population can be on the receiving end of combat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatTarget {
    Agent(AgentId),
    Animal(AnimalId),
}

/// The closed set of simulation events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SimulationEvent {
    #[serde(rename = "movement:arrived")]
    MovementArrived {
        agent_id: AgentId,
        position: Position,
        timestamp: u64,
    },
    #[serde(rename = "movement:failed")]
    MovementFailed {
        agent_id: AgentId,
        reason: String,
        timestamp: u64,
    },
    #[serde(rename = "combat:engaged")]
    CombatEngaged {
        attacker: AgentId,
        target: CombatTarget,
        timestamp: u64,
    },
    #[serde(rename = "combat:hit")]
    CombatHit {
        attacker: AgentId,
        target: CombatTarget,
        damage: f32,
        remaining_health: f32,
        critical: bool,
        timestamp: u64,
    },
    #[serde(rename = "combat:kill")]
    CombatKill {
        attacker: AgentId,
        target: CombatTarget,
        timestamp: u64,
    },
    #[serde(rename = "combat:weapon_equipped")]
    WeaponEquipped {
        agent_id: AgentId,
        weapon: String,
        timestamp: u64,
    },
    #[serde(rename = "combat:weapon_crafted")]
    WeaponCrafted {
        agent_id: AgentId,
        weapon: String,
        timestamp: u64,
    },
    #[serde(rename = "needs:critical")]
    NeedsCritical {
        agent_id: AgentId,
        need_type: String,
        value: f32,
        timestamp: u64,
    },
    #[serde(rename = "needs:recovered")]
    NeedsRecovered {
        agent_id: AgentId,
        need_type: String,
        value: f32,
        timestamp: u64,
    },
    #[serde(rename = "inventory:changed")]
    InventoryChanged {
        agent_id: AgentId,
        item: String,
        delta: i64,
        timestamp: u64,
    },
    #[serde(rename = "social:interaction")]
    SocialInteraction {
        agent_a: AgentId,
        agent_b: AgentId,
        affinity: f32,
        timestamp: u64,
    },
    #[serde(rename = "social:group_formed")]
    GroupFormed {
        group_id: String,
        members: Vec<AgentId>,
        timestamp: u64,
    },
    #[serde(rename = "ai:task_started")]
    TaskStarted {
        agent_id: AgentId,
        task_type: String,
        task_id: String,
        priority: i32,
        timestamp: u64,
    },
    #[serde(rename = "ai:task_completed")]
    TaskCompleted {
        agent_id: AgentId,
        task_id: String,
        task_type: String,
        duration_ms: u64,
        timestamp: u64,
    },
    #[serde(rename = "ai:task_failed")]
    TaskFailed {
        agent_id: AgentId,
        task_id: String,
        task_type: String,
        reason: String,
        timestamp: u64,
    },
    #[serde(rename = "agent:born")]
    AgentBorn {
        agent_id: AgentId,
        name: String,
        lineage_id: Option<LineageId>,
        timestamp: u64,
    },
    #[serde(rename = "agent:removed")]
    AgentRemoved {
        agent_id: AgentId,
        reason: String,
        timestamp: u64,
    },
    #[serde(rename = "animal:died")]
    AnimalDied {
        animal_id: AnimalId,
        species: String,
        cause: AnimalDeathCause,
        timestamp: u64,
    },
    #[serde(rename = "animal:hunted")]
    AnimalHunted {
        animal_id: AnimalId,
        hunter: AgentId,
        species: String,
        timestamp: u64,
    },
    #[serde(rename = "production:output_generated")]
    ProductionOutput {
        zone_id: ZoneId,
        resource: String,
        amount: f32,
        timestamp: u64,
    },
    #[serde(rename = "terrain:modified")]
    TerrainModified {
        x: i32,
        y: i32,
        terrain: String,
        timestamp: u64,
    },
    #[serde(rename = "chunk:rendered")]
    ChunkRendered {
        chunk_x: i32,
        chunk_y: i32,
        timestamp: u64,
    },
    #[serde(rename = "divine:blessing_granted")]
    BlessingGranted {
        lineage_id: LineageId,
        blessing: String,
        expires_at: u64,
        timestamp: u64,
    },
}

/// Discriminant-only view of the event union, used as the dispatch table key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MovementArrived,
    MovementFailed,
    CombatEngaged,
    CombatHit,
    CombatKill,
    WeaponEquipped,
    WeaponCrafted,
    NeedsCritical,
    NeedsRecovered,
    InventoryChanged,
    SocialInteraction,
    GroupFormed,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    AgentBorn,
    AgentRemoved,
    AnimalDied,
    AnimalHunted,
    ProductionOutput,
    TerrainModified,
    ChunkRendered,
    BlessingGranted,
}

impl SimulationEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SimulationEvent::MovementArrived { .. } => EventKind::MovementArrived,
            SimulationEvent::MovementFailed { .. } => EventKind::MovementFailed,
            SimulationEvent::CombatEngaged { .. } => EventKind::CombatEngaged,
            SimulationEvent::CombatHit { .. } => EventKind::CombatHit,
            SimulationEvent::CombatKill { .. } => EventKind::CombatKill,
            SimulationEvent::WeaponEquipped { .. } => EventKind::WeaponEquipped,
            SimulationEvent::WeaponCrafted { .. } => EventKind::WeaponCrafted,
            SimulationEvent::NeedsCritical { .. } => EventKind::NeedsCritical,
            SimulationEvent::NeedsRecovered { .. } => EventKind::NeedsRecovered,
            SimulationEvent::InventoryChanged { .. } => EventKind::InventoryChanged,
            SimulationEvent::SocialInteraction { .. } => EventKind::SocialInteraction,
            SimulationEvent::GroupFormed { .. } => EventKind::GroupFormed,
            SimulationEvent::TaskStarted { .. } => EventKind::TaskStarted,
            SimulationEvent::TaskCompleted { .. } => EventKind::TaskCompleted,
            SimulationEvent::TaskFailed { .. } => EventKind::TaskFailed,
            SimulationEvent::AgentBorn { .. } => EventKind::AgentBorn,
            SimulationEvent::AgentRemoved { .. } => EventKind::AgentRemoved,
            SimulationEvent::AnimalDied { .. } => EventKind::AnimalDied,
            SimulationEvent::AnimalHunted { .. } => EventKind::AnimalHunted,
            SimulationEvent::ProductionOutput { .. } => EventKind::ProductionOutput,
            SimulationEvent::TerrainModified { .. } => EventKind::TerrainModified,
            SimulationEvent::ChunkRendered { .. } => EventKind::ChunkRendered,
            SimulationEvent::BlessingGranted { .. } => EventKind::BlessingGranted,
        }
    }

    /// Wire name of the event (the serde tag)
    pub fn name(&self) -> &'static str {
        match self.kind() {
            EventKind::MovementArrived => "movement:arrived",
            EventKind::MovementFailed => "movement:failed",
            EventKind::CombatEngaged => "combat:engaged",
            EventKind::CombatHit => "combat:hit",
            EventKind::CombatKill => "combat:kill",
            EventKind::WeaponEquipped => "combat:weapon_equipped",
            EventKind::WeaponCrafted => "combat:weapon_crafted",
            EventKind::NeedsCritical => "needs:critical",
            EventKind::NeedsRecovered => "needs:recovered",
            EventKind::InventoryChanged => "inventory:changed",
            EventKind::SocialInteraction => "social:interaction",
            EventKind::GroupFormed => "social:group_formed",
            EventKind::TaskStarted => "ai:task_started",
            EventKind::TaskCompleted => "ai:task_completed",
            EventKind::TaskFailed => "ai:task_failed",
            EventKind::AgentBorn => "agent:born",
            EventKind::AgentRemoved => "agent:removed",
            EventKind::AnimalDied => "animal:died",
            EventKind::AnimalHunted => "animal:hunted",
            EventKind::ProductionOutput => "production:output_generated",
            EventKind::TerrainModified => "terrain:modified",
            EventKind::ChunkRendered => "chunk:rendered",
            EventKind::BlessingGranted => "divine:blessing_granted",
        }
    }
}

// ============================================================================
// EVENT BUS
// ============================================================================

/// Handle returned by `on`/`once`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId(u64);

/// Outlet a handler emits follow-up events through. Sunk events re-enter
/// the bus after the handler returns: onto the queue when batching (picked
/// up by the flush pass in flight), dispatched immediately otherwise.
#[derive(Default)]
pub struct EventSink {
    pending: Vec<SimulationEvent>,
}

impl EventSink {
    pub fn emit(&mut self, event: SimulationEvent) {
        self.pending.push(event);
    }
}

type HandlerFn = Box<dyn FnMut(&SimulationEvent, &mut EventSink) -> Result<()> + Send>;

struct HandlerEntry {
    id: HandlerId,
    once: bool,
    func: HandlerFn,
}

/// Typed pub/sub with in-tick batching
pub struct EventBus {
    handlers: HashMap<EventKind, Vec<HandlerEntry>>,
    queue: VecDeque<SimulationEvent>,
    batching: bool,
    next_handler_id: u64,
    total_events: u64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            queue: VecDeque::new(),
            batching: true,
            next_handler_id: 0,
            total_events: 0,
        }
    }

    /// Subscribe to an event kind
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> HandlerId
    where
        F: FnMut(&SimulationEvent, &mut EventSink) -> Result<()> + Send + 'static,
    {
        self.subscribe(kind, Box::new(handler), false)
    }

    /// Subscribe for a single delivery
    pub fn once<F>(&mut self, kind: EventKind, handler: F) -> HandlerId
    where
        F: FnMut(&SimulationEvent, &mut EventSink) -> Result<()> + Send + 'static,
    {
        self.subscribe(kind, Box::new(handler), true)
    }

    fn subscribe(&mut self, kind: EventKind, func: HandlerFn, once: bool) -> HandlerId {
        let id = HandlerId(self.next_handler_id);
        self.next_handler_id += 1;
        self.handlers
            .entry(kind)
            .or_default()
            .push(HandlerEntry { id, once, func });
        id
    }

    /// Remove a previously registered handler. Returns true if it existed.
    pub fn off(&mut self, kind: EventKind, id: HandlerId) -> bool {
        if let Some(entries) = self.handlers.get_mut(&kind) {
            let before = entries.len();
            entries.retain(|entry| entry.id != id);
            return entries.len() < before;
        }
        false
    }

    /// Emit an event. Queued when batching is enabled (the default),
    /// dispatched synchronously otherwise.
    pub fn emit(&mut self, event: SimulationEvent) {
        self.total_events += 1;
        if self.batching {
            self.queue.push_back(event);
        } else {
            self.dispatch(&event);
        }
    }

    /// Dispatch every queued event in enqueue order, draining to empty:
    /// events handlers emit through their sink during the flush are
    /// dispatched in the same pass. Returns everything dispatched, in
    /// order, so the scheduler can fan the batch out to subsystem
    /// consumers.
    pub fn flush_events(&mut self) -> Vec<SimulationEvent> {
        let mut dispatched = Vec::new();
        while let Some(event) = self.queue.pop_front() {
            self.dispatch(&event);
            dispatched.push(event);
        }
        dispatched
    }

    fn dispatch(&mut self, event: &SimulationEvent) {
        let kind = event.kind();
        let Some(mut entries) = self.handlers.remove(&kind) else {
            return;
        };
        // Handlers run outside the map so they can re-subscribe; errors are
        // contained per handler.
        let mut sink = EventSink::default();
        let mut kept = Vec::with_capacity(entries.len());
        for mut entry in entries.drain(..) {
            if let Err(err) = (entry.func)(event, &mut sink) {
                warn!("event handler for {} failed: {}", event.name(), err);
            }
            if !entry.once {
                kept.push(entry);
            }
        }
        match self.handlers.entry(kind) {
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                // New subscriptions made during dispatch go after survivors
                let added = std::mem::take(slot.get_mut());
                kept.extend(added);
                *slot.get_mut() = kept;
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                if !kept.is_empty() {
                    slot.insert(kept);
                }
            }
        }

        // Follow-up emissions re-enter the bus: queued (and picked up by a
        // flush already draining) when batching, dispatched right away when
        // not.
        if !sink.pending.is_empty() {
            self.total_events += sink.pending.len() as u64;
            if self.batching {
                self.queue.extend(sink.pending);
            } else {
                for follow_up in sink.pending {
                    self.dispatch(&follow_up);
                }
            }
        }
    }

    /// Drop all queued events without dispatching
    pub fn clear_queue(&mut self) {
        if !self.queue.is_empty() {
            debug!("clearing {} queued events", self.queue.len());
        }
        self.queue.clear();
    }

    /// Toggle batching. Disabling implicitly flushes the queue.
    pub fn set_batching_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.flush_events();
        }
        self.batching = enabled;
    }

    pub fn batching_enabled(&self) -> bool {
        self.batching
    }

    pub fn queue_size(&self) -> usize {
        self.queue.len()
    }

    pub fn total_events(&self) -> u64 {
        self.total_events
    }
}
