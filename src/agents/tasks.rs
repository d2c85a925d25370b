//! Per-agent priority task queues.
//!
//! Each agent has a pending list kept in descending priority order and at
//! most one active task. Timeouts are checked lazily on `next_task`; there
//! is no preemption. Task lifecycle is one-way:
//! queued -> active -> completed | failed | timed_out.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use super::components::AiState;
use super::store::AgentStore;
use crate::config::TaskConfig;
use crate::errors::{Result, SimulatorError};
use crate::events::{EventBus, SimulationEvent};
use crate::types::{AgentId, AnimalId, Position, ZoneId};

/// Priority used by `enqueue_urgent`
pub const URGENT_PRIORITY: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    MoveTo,
    Eat,
    Drink,
    Rest,
    Wash,
    Work,
    Craft,
    Attack,
    Socialize,
    Build,
    Deliver,
    Wander,
}

impl TaskType {
    pub fn name(&self) -> &'static str {
        match self {
            TaskType::MoveTo => "move_to",
            TaskType::Eat => "eat",
            TaskType::Drink => "drink",
            TaskType::Rest => "rest",
            TaskType::Wash => "wash",
            TaskType::Work => "work",
            TaskType::Craft => "craft",
            TaskType::Attack => "attack",
            TaskType::Socialize => "socialize",
            TaskType::Build => "build",
            TaskType::Deliver => "deliver",
            TaskType::Wander => "wander",
        }
    }
}

/// What a task is aimed at, when it needs a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskTarget {
    Position(Position),
    Zone(ZoneId),
    Agent(AgentId),
    Animal(AnimalId),
    Item(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub task_type: TaskType,
    pub target: Option<TaskTarget>,
    pub created_at: u64,
}

impl Task {
    pub fn new(task_type: TaskType, target: Option<TaskTarget>, created_at: u64) -> Self {
        Self {
            id: String::new(), // assigned by the queue
            task_type,
            target,
            created_at,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingTask {
    task: Task,
    priority: i32,
}

#[derive(Debug, Clone)]
pub struct ActiveTask {
    pub task: Task,
    pub priority: i32,
    pub started_at: u64,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct TaskStats {
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub dropped: u64,
}

pub struct TaskQueue {
    pending: HashMap<AgentId, Vec<PendingTask>>,
    active: HashMap<AgentId, ActiveTask>,
    max_tasks_per_agent: usize,
    /// 0 disables timeouts
    task_timeout_ms: u64,
    next_task_seq: u64,
    pub stats: TaskStats,
}

impl TaskQueue {
    pub fn new(config: &TaskConfig) -> Self {
        Self {
            pending: HashMap::new(),
            active: HashMap::new(),
            max_tasks_per_agent: config.max_tasks_per_agent.max(1),
            task_timeout_ms: config.task_timeout_ms,
            next_task_seq: 0,
            stats: TaskStats::default(),
        }
    }

    fn next_task_id(&mut self) -> String {
        self.next_task_seq += 1;
        format!("task-{}", self.next_task_seq)
    }

    /// Queue a task for an agent. Inserts in descending priority order; when
    /// the queue is full the lowest-priority entry is replaced only if the
    /// new priority is strictly greater, otherwise the new task is dropped.
    /// Returns the assigned task id, or `None` when dropped.
    pub fn enqueue(
        &mut self,
        store: &AgentStore,
        events: &mut EventBus,
        now: u64,
        agent_id: &AgentId,
        mut task: Task,
        priority: i32,
    ) -> Result<Option<String>> {
        if !store.has_agent(agent_id) {
            return Err(SimulatorError::not_found(format!(
                "enqueue for unknown agent {}",
                agent_id
            )));
        }

        let queue = self.pending.entry(agent_id.clone()).or_default();
        if queue.len() >= self.max_tasks_per_agent {
            // Queue full: the tail is the lowest priority by construction
            let lowest = queue
                .last()
                .map(|entry| entry.priority)
                .unwrap_or(i32::MIN);
            if priority > lowest {
                let evicted = queue.pop();
                if let Some(evicted) = evicted {
                    debug!(
                        "agent {} task queue full, evicting {} (priority {})",
                        agent_id,
                        evicted.task.id,
                        evicted.priority
                    );
                }
            } else {
                self.stats.dropped += 1;
                return Ok(None);
            }
        }

        self.next_task_seq += 1;
        let task_id = format!("task-{}", self.next_task_seq);
        task.id = task_id.clone();

        // Descending order, FIFO among equal priorities
        let index = queue
            .iter()
            .position(|entry| entry.priority < priority)
            .unwrap_or(queue.len());
        let task_type = task.task_type;
        queue.insert(index, PendingTask { task, priority });

        self.stats.enqueued += 1;
        events.emit(SimulationEvent::TaskStarted {
            agent_id: agent_id.clone(),
            task_type: task_type.name().to_string(),
            task_id: task_id.clone(),
            priority,
            timestamp: now,
        });
        Ok(Some(task_id))
    }

    /// Cancel whatever is active and queue `task` at urgent priority
    pub fn enqueue_urgent(
        &mut self,
        store: &mut AgentStore,
        events: &mut EventBus,
        now: u64,
        agent_id: &AgentId,
        task: Task,
    ) -> Result<Option<String>> {
        self.cancel_active(store, agent_id);
        self.enqueue(store, events, now, agent_id, task, URGENT_PRIORITY)
    }

    /// Current task for an agent: the still-valid active task, or the head
    /// of the pending queue promoted to active. A timed-out active task is
    /// failed (reason "timeout") before promotion. Timeout at exactly the
    /// boundary does not fail.
    pub fn next_task(
        &mut self,
        store: &mut AgentStore,
        events: &mut EventBus,
        now: u64,
        agent_id: &AgentId,
    ) -> Option<Task> {
        if let Some(active) = self.active.get(agent_id) {
            let timed_out = self.task_timeout_ms > 0
                && now.saturating_sub(active.started_at) > self.task_timeout_ms;
            if !timed_out {
                return Some(active.task.clone());
            }
            self.stats.timed_out += 1;
            self.fail_task(store, events, now, agent_id, "timeout");
        }

        let queue = self.pending.get_mut(agent_id)?;
        if queue.is_empty() {
            return None;
        }
        let entry = queue.remove(0);
        let active = ActiveTask {
            task: entry.task.clone(),
            priority: entry.priority,
            started_at: now,
        };
        self.active.insert(agent_id.clone(), active);
        self.point_ai_at(store, agent_id, Some(entry.task.id.clone()), now);
        Some(entry.task)
    }

    /// Mark the active task done and emit `ai:task_completed`
    pub fn complete_task(
        &mut self,
        store: &mut AgentStore,
        events: &mut EventBus,
        now: u64,
        agent_id: &AgentId,
    ) {
        let Some(active) = self.active.remove(agent_id) else {
            return;
        };
        self.stats.completed += 1;
        events.emit(SimulationEvent::TaskCompleted {
            agent_id: agent_id.clone(),
            task_id: active.task.id.clone(),
            task_type: active.task.task_type.name().to_string(),
            duration_ms: now.saturating_sub(active.started_at),
            timestamp: now,
        });
        self.point_ai_at(store, agent_id, None, now);
    }

    /// Mark the active task failed and emit `ai:task_failed`
    pub fn fail_task(
        &mut self,
        store: &mut AgentStore,
        events: &mut EventBus,
        now: u64,
        agent_id: &AgentId,
        reason: &str,
    ) {
        let Some(active) = self.active.remove(agent_id) else {
            return;
        };
        self.stats.failed += 1;
        warn!(
            "agent {} task {} failed: {}",
            agent_id, active.task.id, reason
        );
        events.emit(SimulationEvent::TaskFailed {
            agent_id: agent_id.clone(),
            task_id: active.task.id.clone(),
            task_type: active.task.task_type.name().to_string(),
            reason: reason.to_string(),
            timestamp: now,
        });
        self.point_ai_at(store, agent_id, None, now);
    }

    /// Drop the active task without any event
    pub fn cancel_active(&mut self, store: &mut AgentStore, agent_id: &AgentId) {
        if self.active.remove(agent_id).is_some() {
            self.point_ai_at(store, agent_id, None, 0);
        }
    }

    fn point_ai_at(
        &mut self,
        store: &mut AgentStore,
        agent_id: &AgentId,
        task_id: Option<String>,
        now: u64,
    ) {
        if let Some(ai) = store.ai_state(agent_id) {
            let mut ai = ai.clone();
            ai.task_started_at = if task_id.is_some() { now } else { ai.task_started_at };
            ai.current_task = task_id;
            let _ = store.set_ai_state(agent_id, ai);
        } else if store.has_agent(agent_id) {
            let ai = AiState {
                current_task: task_id,
                task_started_at: now,
                ..AiState::default()
            };
            let _ = store.set_ai_state(agent_id, ai);
        }
    }

    // ── Introspection ────────────────────────────────────────────────────

    pub fn has_tasks(&self, agent_id: &AgentId) -> bool {
        self.active.contains_key(agent_id)
            || self
                .pending
                .get(agent_id)
                .map(|queue| !queue.is_empty())
                .unwrap_or(false)
    }

    pub fn has_task_of_type(&self, agent_id: &AgentId, task_type: TaskType) -> bool {
        if let Some(active) = self.active.get(agent_id) {
            if active.task.task_type == task_type {
                return true;
            }
        }
        self.pending
            .get(agent_id)
            .map(|queue| queue.iter().any(|entry| entry.task.task_type == task_type))
            .unwrap_or(false)
    }

    pub fn pending_count(&self, agent_id: &AgentId) -> usize {
        self.pending
            .get(agent_id)
            .map(|queue| queue.len())
            .unwrap_or(0)
    }

    pub fn pending_tasks(&self, agent_id: &AgentId) -> Vec<Task> {
        self.pending
            .get(agent_id)
            .map(|queue| queue.iter().map(|entry| entry.task.clone()).collect())
            .unwrap_or_default()
    }

    pub fn active_task(&self, agent_id: &AgentId) -> Option<&ActiveTask> {
        self.active.get(agent_id)
    }

    pub fn total_active(&self) -> usize {
        self.active.len()
    }

    /// Forget every task belonging to an agent (removal cleanup)
    pub fn clear_agent(&mut self, agent_id: &AgentId) {
        self.pending.remove(agent_id);
        self.active.remove(agent_id);
    }

    pub fn clear_all(&mut self) {
        self.pending.clear();
        self.active.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::components::{Component, Health};

    fn setup() -> (AgentStore, EventBus, TaskQueue) {
        let mut store = AgentStore::new();
        store
            .register_agent(
                AgentId::from("a"),
                vec![Component::Health(Health::new(100.0))],
            )
            .unwrap();
        let bus = EventBus::new();
        let queue = TaskQueue::new(&TaskConfig {
            max_tasks_per_agent: 3,
            task_timeout_ms: 1000,
        });
        (store, bus, queue)
    }

    fn task(task_type: TaskType) -> Task {
        Task::new(task_type, None, 0)
    }

    #[test]
    fn test_priority_order() {
        let (mut store, mut bus, mut queue) = setup();
        let agent = AgentId::from("a");

        queue
            .enqueue(&store, &mut bus, 0, &agent, task(TaskType::Rest), 30)
            .unwrap();
        queue
            .enqueue(&store, &mut bus, 0, &agent, task(TaskType::Eat), 70)
            .unwrap();
        queue
            .enqueue(&store, &mut bus, 0, &agent, task(TaskType::Work), 50)
            .unwrap();

        let first = queue.next_task(&mut store, &mut bus, 0, &agent).unwrap();
        assert_eq!(first.task_type, TaskType::Eat);
        queue.complete_task(&mut store, &mut bus, 10, &agent);

        let second = queue.next_task(&mut store, &mut bus, 10, &agent).unwrap();
        assert_eq!(second.task_type, TaskType::Work);
        queue.complete_task(&mut store, &mut bus, 20, &agent);

        let third = queue.next_task(&mut store, &mut bus, 20, &agent).unwrap();
        assert_eq!(third.task_type, TaskType::Rest);
    }

    #[test]
    fn test_unknown_agent_rejected() {
        let (store, mut bus, mut queue) = setup();
        let result = queue.enqueue(
            &store,
            &mut bus,
            0,
            &AgentId::from("ghost"),
            task(TaskType::Rest),
            50,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_full_queue_replaces_lowest_only_when_strictly_greater() {
        let (mut store, mut bus, mut queue) = setup();
        let agent = AgentId::from("a");

        queue.enqueue(&store, &mut bus, 0, &agent, task(TaskType::Rest), 10).unwrap();
        queue.enqueue(&store, &mut bus, 0, &agent, task(TaskType::Eat), 20).unwrap();
        queue.enqueue(&store, &mut bus, 0, &agent, task(TaskType::Work), 30).unwrap();
        assert_eq!(queue.pending_count(&agent), 3);

        // Equal to the lowest: dropped
        let dropped = queue
            .enqueue(&store, &mut bus, 0, &agent, task(TaskType::Drink), 10)
            .unwrap();
        assert!(dropped.is_none());
        assert_eq!(queue.pending_count(&agent), 3);

        // Strictly greater than the lowest: evicts it
        let kept = queue
            .enqueue(&store, &mut bus, 0, &agent, task(TaskType::Drink), 15)
            .unwrap();
        assert!(kept.is_some());
        assert_eq!(queue.pending_count(&agent), 3);
        assert!(!queue.has_task_of_type(&agent, TaskType::Rest), "lowest evicted");
        let _ = store;
    }

    #[test]
    fn test_active_task_exclusivity() {
        let (mut store, mut bus, mut queue) = setup();
        let agent = AgentId::from("a");

        queue.enqueue(&store, &mut bus, 0, &agent, task(TaskType::Eat), 50).unwrap();
        queue.enqueue(&store, &mut bus, 0, &agent, task(TaskType::Rest), 40).unwrap();

        let first = queue.next_task(&mut store, &mut bus, 0, &agent).unwrap();
        // Until completion, next_task keeps returning the same active task
        let again = queue.next_task(&mut store, &mut bus, 100, &agent).unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(queue.total_active(), 1);
    }

    #[test]
    fn test_timeout_boundary_not_failed_at_deadline() {
        let (mut store, mut bus, mut queue) = setup();
        let agent = AgentId::from("a");

        queue.enqueue(&store, &mut bus, 0, &agent, task(TaskType::Eat), 50).unwrap();
        let first = queue.next_task(&mut store, &mut bus, 0, &agent).unwrap();

        // Exactly at the boundary: still active
        let at_deadline = queue.next_task(&mut store, &mut bus, 1000, &agent).unwrap();
        assert_eq!(first.id, at_deadline.id);

        // Past the boundary: failed with reason "timeout", nothing pending
        assert!(queue.next_task(&mut store, &mut bus, 1001, &agent).is_none());
        assert_eq!(queue.stats.timed_out, 1);

        bus.flush_events();
    }

    #[test]
    fn test_urgent_cancels_active() {
        let (mut store, mut bus, mut queue) = setup();
        let agent = AgentId::from("a");

        queue.enqueue(&store, &mut bus, 0, &agent, task(TaskType::Work), 50).unwrap();
        let active = queue.next_task(&mut store, &mut bus, 0, &agent).unwrap();
        assert_eq!(active.task_type, TaskType::Work);

        queue
            .enqueue_urgent(&mut store, &mut bus, 10, &agent, task(TaskType::Attack))
            .unwrap();

        let next = queue.next_task(&mut store, &mut bus, 10, &agent).unwrap();
        assert_eq!(next.task_type, TaskType::Attack, "urgent task surfaced");
    }

    #[test]
    fn test_complete_clears_ai_pointer_and_emits() {
        let (mut store, mut bus, mut queue) = setup();
        let agent = AgentId::from("a");

        queue.enqueue(&store, &mut bus, 0, &agent, task(TaskType::Eat), 50).unwrap();
        queue.next_task(&mut store, &mut bus, 0, &agent).unwrap();
        assert!(store.ai_state(&agent).unwrap().current_task.is_some());

        queue.complete_task(&mut store, &mut bus, 400, &agent);
        assert!(store.ai_state(&agent).unwrap().current_task.is_none());

        let flushed = bus.flush_events();
        let completed = flushed
            .iter()
            .find(|event| matches!(event, SimulationEvent::TaskCompleted { .. }))
            .unwrap();
        if let SimulationEvent::TaskCompleted { duration_ms, .. } = completed {
            assert_eq!(*duration_ms, 400);
        }
    }

    #[test]
    fn test_clear_agent_forgets_everything() {
        let (mut store, mut bus, mut queue) = setup();
        let agent = AgentId::from("a");

        queue.enqueue(&store, &mut bus, 0, &agent, task(TaskType::Eat), 50).unwrap();
        queue.enqueue(&store, &mut bus, 0, &agent, task(TaskType::Rest), 40).unwrap();
        queue.next_task(&mut store, &mut bus, 0, &agent).unwrap();

        queue.clear_agent(&agent);
        assert!(!queue.has_tasks(&agent));
        assert_eq!(queue.pending_count(&agent), 0);
    }
}
