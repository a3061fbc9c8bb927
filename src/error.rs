use thiserror::Error;

pub type SimResult<T> = Result<T, SimError>;

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Entity(#[from] EntityError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Errors raised by entity activation and disposal.
#[derive(Debug, Error)]
pub enum EntityError {
    #[error("Entity {serial} is already active in a simulation")]
    AlreadyActive { serial: u64 },

    #[error("Entity {serial} finished its script while still holding queues: {queues}")]
    DisposedWhileHoldingQueues { serial: u64, queues: String },
}

/// Errors raised by queue membership and admission.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Entity {serial} already occupies queue '{queue}'")]
    DuplicateMembership { queue: String, serial: u64 },

    #[error("Entity {serial} does not occupy queue '{queue}'")]
    NotAMember { queue: String, serial: u64 },

    #[error("Queue '{queue}' has no capacity for {units} unit(s) ({in_use} of {capacity} in use)")]
    CapacityExceeded {
        queue: String,
        units: usize,
        in_use: usize,
        capacity: usize,
    },

    #[error("Queue '{queue}' is already bound to a different simulation")]
    CrossSimulation { queue: String },
}

/// Errors related to internal engine invariants and invalid caller input.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}
