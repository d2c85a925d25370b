//! Simulation subsystems.
//!
//! Each subsystem is a struct with its own private state plus a `SimSystem`
//! impl, registered with the scheduler at one rate. Cross-system calls go
//! through the port registry; shared domain ledgers live in `WorldState`.

pub mod animals;
pub mod building;
pub mod combat;
pub mod conflict;
pub mod decision;
pub mod divine;
pub mod economy;
pub mod emergence;
pub mod equipment;
pub mod genealogy;
pub mod governance;
pub mod inventory;
pub mod lifecycle;
pub mod movement;
pub mod needs;
pub mod production;
pub mod recipes;
pub mod social;
