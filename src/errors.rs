//! Common error types for the society simulator.
//!
//! One crate-wide enum keeps error handling uniform across subsystems:
//! the scheduler and the event bus log these and keep going, the transport
//! layer maps them to protocol responses, and only initialization errors
//! terminate the process.

use std::fmt;

/// Core error type for the simulator
#[derive(Debug, Clone)]
pub enum SimulatorError {
    /// Unknown agent, zone, task or other id
    NotFound(String),

    /// A state invariant would be violated (over-capacity, negative need, ...)
    InvariantViolation(String),

    /// Agent store errors
    Store(String),

    /// Task queue errors
    Task(String),

    /// World / terrain errors
    World(String),

    /// Subsystem errors raised inside a tick
    System(String),

    /// Snapshot export/import errors
    Snapshot(String),

    /// Network / codec errors
    Network(String),

    /// Configuration errors
    Config(String),

    /// Generic error with custom message
    Generic(String),
}

impl fmt::Display for SimulatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulatorError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            SimulatorError::InvariantViolation(msg) => write!(f, "Invariant Violation: {}", msg),
            SimulatorError::Store(msg) => write!(f, "Store Error: {}", msg),
            SimulatorError::Task(msg) => write!(f, "Task Error: {}", msg),
            SimulatorError::World(msg) => write!(f, "World Error: {}", msg),
            SimulatorError::System(msg) => write!(f, "System Error: {}", msg),
            SimulatorError::Snapshot(msg) => write!(f, "Snapshot Error: {}", msg),
            SimulatorError::Network(msg) => write!(f, "Network Error: {}", msg),
            SimulatorError::Config(msg) => write!(f, "Configuration Error: {}", msg),
            SimulatorError::Generic(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for SimulatorError {}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, SimulatorError>;

impl SimulatorError {
    /// Create a not-found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invariant-violation error
    pub fn invariant<S: Into<String>>(msg: S) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Create a store error
    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }

    /// Create a task error
    pub fn task<S: Into<String>>(msg: S) -> Self {
        Self::Task(msg.into())
    }

    /// Create a world error
    pub fn world<S: Into<String>>(msg: S) -> Self {
        Self::World(msg.into())
    }

    /// Create a system error
    pub fn system<S: Into<String>>(msg: S) -> Self {
        Self::System(msg.into())
    }

    /// Create a snapshot error
    pub fn snapshot<S: Into<String>>(msg: S) -> Self {
        Self::Snapshot(msg.into())
    }

    /// Create a network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        Self::Generic(msg.into())
    }
}

impl From<std::io::Error> for SimulatorError {
    fn from(err: std::io::Error) -> Self {
        SimulatorError::network(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for SimulatorError {
    fn from(err: serde_json::Error) -> Self {
        SimulatorError::snapshot(format!("JSON serialization error: {}", err))
    }
}

impl From<ron::Error> for SimulatorError {
    fn from(err: ron::Error) -> Self {
        SimulatorError::snapshot(format!("RON serialization error: {}", err))
    }
}

impl From<ron::error::SpannedError> for SimulatorError {
    fn from(err: ron::error::SpannedError) -> Self {
        SimulatorError::snapshot(format!("RON parse error: {}", err))
    }
}
