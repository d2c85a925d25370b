pub mod agents;
pub mod config;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod net;
pub mod ports;
pub mod simulation;
pub mod snapshot;
pub mod systems;
pub mod types;
pub mod world;

pub use config::SimConfig;
pub use errors::{Result, SimulatorError};
pub use events::{EventBus, EventKind, EventSink, SimulationEvent};
pub use ports::{HandlerResult, HandlerStatus, SpawnSpec, SystemRegistry};
pub use simulation::{OrderSpec, Simulation, TickRate, WorldState};
pub use snapshot::{export_snapshot, import_snapshot, WorldSnapshot};
pub use types::{AgentId, AnimalId, LineageId, Position, ZoneId};
