//! Error types for the coordinator, workers and configuration

use swarm_pso_core::traits::{CleanupError, EvaluationError, ParticleId};
use swarm_pso_net::protocol::RejectKind;
use thiserror::Error;

/// Top-level error for running a swarm
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
    #[error("worker task failed: {0}")]
    WorkerTask(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Invalid or unreadable configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Failure inside the coordinator
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Unknown particle, or a particle that was never issued
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Out-of-contract request; rejected and never retried
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Internal contradiction; the coordinator aborts
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("coordinator state lock poisoned")]
    LockPoisoned,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CoordinatorError {
    /// Wire classification of a rejected report
    pub fn reject_kind(&self) -> RejectKind {
        match self {
            CoordinatorError::InvalidRequest(_) => RejectKind::InvalidRequest,
            _ => RejectKind::ProtocolError,
        }
    }
}

impl From<swarm_pso_core::Error> for CoordinatorError {
    fn from(err: swarm_pso_core::Error) -> Self {
        use swarm_pso_core::Error as Core;
        match err {
            Core::UnknownParticle(_) | Core::NotAssigned(_) => {
                CoordinatorError::InvalidRequest(err.to_string())
            }
            Core::WrongWorker(_) => CoordinatorError::Protocol(err.to_string()),
            Core::InvalidConfig(msg) => CoordinatorError::Config(ConfigError::invalid(msg)),
            Core::DimensionMismatch { .. } | Core::InvariantViolation(_) => {
                CoordinatorError::InvariantViolation(err.to_string())
            }
        }
    }
}

/// Failure while a worker handles one work item
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Evaluation(EvaluationError),
    #[error(transparent)]
    Cleanup(CleanupError),
    /// Cleanup failed after a failed evaluation; the particle is abandoned
    #[error("particle {particle} abandoned: {evaluation}, then {cleanup}")]
    FatalParticle {
        particle: ParticleId,
        evaluation: EvaluationError,
        cleanup: CleanupError,
    },
    #[error("transport: {0}")]
    Transport(#[from] swarm_pso_net::Error),
}
