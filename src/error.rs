use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid segment geometry: mass {mass} and length {length} must both be positive")]
    InvalidGeometry { mass: f32, length: f32 },

    #[error("invalid joint: {0}")]
    InvalidJoint(String),

    #[error("invalid body plan: {0}")]
    InvalidPlan(String),

    #[error("invalid command: expected {expected} joint values, got {actual}")]
    InvalidCommand { expected: usize, actual: usize },

    #[error("body has already been added to a physics world")]
    AlreadyInWorld,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
