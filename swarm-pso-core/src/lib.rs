//! # SwarmPSO Core
//!
//! Core data model and algorithms for distributed Particle Swarm Optimization.
//!
//! This crate is `no_std` compatible (it needs `alloc`) and provides:
//! - The PSO update engine (velocity/position update with clamping)
//! - Swarm state: particles, personal bests and the global best
//! - The per-iteration work queue with deadline-based reissue
//! - Convergence tracking
//! - The evaluator contract implemented by user-supplied fitness functions
//!
//! Nothing in here blocks or reads a clock. Time is passed in as
//! milliseconds by the caller, and randomness comes from any
//! [`rand_core::RngCore`].
//!
//! ## Feature Flags
//!
//! - `std` (default): Enable standard library support

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

pub mod algorithms;
pub mod convergence;
pub mod swarm;
pub mod traits;
pub mod work_queue;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::algorithms::*;
    pub use crate::convergence::*;
    pub use crate::swarm::*;
    pub use crate::traits::*;
    pub use crate::work_queue::*;
}

use crate::traits::ParticleId;

/// Result type for SwarmPSO core operations
pub type Result<T> = core::result::Result<T, Error>;

/// Error type for SwarmPSO core operations
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Configuration rejected before the swarm was built
    InvalidConfig(&'static str),
    /// Particle id outside the swarm
    UnknownParticle(ParticleId),
    /// Particle has no outstanding assignment in the current iteration
    NotAssigned(ParticleId),
    /// Reporter never held an assignment for this particle
    WrongWorker(ParticleId),
    /// Parameter vector length does not match the swarm dimensionality
    DimensionMismatch { expected: usize, found: usize },
    /// Internal contradiction in swarm or queue state
    InvariantViolation(&'static str),
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::InvalidConfig(reason) => write!(f, "invalid configuration: {reason}"),
            Error::UnknownParticle(id) => write!(f, "unknown particle {id}"),
            Error::NotAssigned(id) => write!(f, "particle {id} has no outstanding assignment"),
            Error::WrongWorker(id) => {
                write!(f, "reporter was never assigned particle {id}")
            }
            Error::DimensionMismatch { expected, found } => {
                write!(f, "dimension mismatch: expected {expected}, found {found}")
            }
            Error::InvariantViolation(what) => write!(f, "invariant violated: {what}"),
        }
    }
}
