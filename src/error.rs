// Error types for the driver core and the runtime around it

use crate::robot::RobotError;

/// A rejected request from an event handler or service
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Actuator reference {what}={value} outside [{min}, {max}]")]
    InvalidActuatorReference {
        what: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("LED payload must be {expected} bytes, got {got}")]
    InvalidLedPayload { expected: usize, got: usize },

    #[error("Unknown DC/DC mode {0} (expected 0, 1 or 2)")]
    InvalidDcdcMode(u8),

    #[error("Robot error: {0}")]
    Robot(#[from] RobotError),
}

/// Fatal error that ends the runtime
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Robot initialization failed: {0}")]
    Init(#[source] RobotError),

    #[error("Zenoh error: {0}")]
    Zenoh(zenoh::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<zenoh::Error> for RuntimeError {
    fn from(e: zenoh::Error) -> Self {
        RuntimeError::Zenoh(e)
    }
}
