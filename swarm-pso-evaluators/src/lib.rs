//! # SwarmPSO Evaluators
//!
//! Reference fitness functions for SwarmPSO.
//!
//! This crate provides:
//! - Distance to a fixed target (the "find the gold" harness objective)
//! - Sphere and Rastrigin benchmark functions
//! - A closure adapter for ad hoc objectives
//!
//! All objectives are minimised.

#![forbid(unsafe_code)]

pub mod objectives;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::objectives::*;
    pub use swarm_pso_core::traits::{CleanupError, EvaluationError, Evaluator};
}
