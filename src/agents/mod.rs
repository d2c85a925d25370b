//! Agent state: components, the central store, the spatial index and the
//! per-agent task queues.

pub mod components;
pub mod spatial_index;
pub mod store;
pub mod tasks;

pub use components::{
    AiState, Combat, Component, ComponentKind, Health, Inventory, ItemStack, LifeStage, MoveTarget,
    Movement, NeedKind, Needs, Profile, Relationship, RelationshipKind, Role, RoleType, Sex,
    Social, ThreatTarget, Transform, TraitSet,
};
pub use spatial_index::{SpatialEntry, SpatialIndex};
pub use store::AgentStore;
pub use tasks::{ActiveTask, Task, TaskQueue, TaskStats, TaskTarget, TaskType, URGENT_PRIORITY};
