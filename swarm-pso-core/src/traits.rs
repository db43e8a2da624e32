//! Core traits for SwarmPSO
//!
//! The evaluator contract and the identifiers shared between coordinator and
//! workers.

use alloc::string::String;

use serde::{Deserialize, Serialize};

/// Fitness evaluation plugin supplied by the hosting application.
///
/// Lower scores are better. Each worker owns its own instance, so
/// implementations only need `Send`.
pub trait Evaluator: Send {
    /// Score one parameter vector.
    fn evaluate(&mut self, params: &[f64]) -> Result<f64, EvaluationError>;

    /// Release per-evaluation resources.
    ///
    /// Called after every `evaluate`, whether it succeeded or not. The default
    /// does nothing.
    fn cleanup(&mut self) -> Result<(), CleanupError> {
        Ok(())
    }
}

impl<E: Evaluator + ?Sized> Evaluator for alloc::boxed::Box<E> {
    fn evaluate(&mut self, params: &[f64]) -> Result<f64, EvaluationError> {
        (**self).evaluate(params)
    }

    fn cleanup(&mut self) -> Result<(), CleanupError> {
        (**self).cleanup()
    }
}

/// Failure raised by [`Evaluator::evaluate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    /// The evaluator reported a failure
    Failed(String),
    /// The evaluation did not finish inside its time bound
    TimedOut,
    /// The evaluator panicked
    Panicked(String),
}

impl EvaluationError {
    /// Build a `Failed` error from any message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

impl core::fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EvaluationError::Failed(msg) => write!(f, "evaluation failed: {msg}"),
            EvaluationError::TimedOut => write!(f, "evaluation timed out"),
            EvaluationError::Panicked(msg) => write!(f, "evaluator panicked: {msg}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EvaluationError {}

/// Failure raised by [`Evaluator::cleanup`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupError(pub String);

impl CleanupError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl core::fmt::Display for CleanupError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "cleanup failed: {}", self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CleanupError {}

/// Particle identifier: the particle's index in the swarm
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParticleId(pub u32);

impl ParticleId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl core::fmt::Display for ParticleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Opaque worker identifier, unique per client
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(String);

impl WorkerId {
    /// Create a new WorkerId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(f64);

    impl Evaluator for Constant {
        fn evaluate(&mut self, _params: &[f64]) -> Result<f64, EvaluationError> {
            Ok(self.0)
        }
    }

    #[test]
    fn cleanup_defaults_to_noop() {
        let mut ev = Constant(3.0);
        assert_eq!(ev.evaluate(&[1.0]), Ok(3.0));
        assert!(ev.cleanup().is_ok());
    }

    #[test]
    fn boxed_evaluator_forwards() {
        let mut ev: alloc::boxed::Box<dyn Evaluator> = alloc::boxed::Box::new(Constant(1.5));
        assert_eq!(ev.evaluate(&[]), Ok(1.5));
    }

    #[test]
    fn worker_id_display() {
        let id = WorkerId::new("node-7");
        assert_eq!(alloc::format!("{id}"), "node-7");
        assert_eq!(alloc::format!("{}", ParticleId(4)), "p4");
    }
}
