//! # SwarmPSO
//!
//! **Distributed Particle Swarm Optimization with untrusted, pull-based workers.**
//!
//! A central [`Coordinator`] owns the swarm and drives the optimisation loop.
//! Workers poll it for work, score particles with a caller-supplied
//! [`Evaluator`], and report back. Workers may be slow, crash, or report
//! twice; the coordinator reissues work whose deadline passed and ignores
//! duplicate reports, so the global best only ever improves.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use swarm_pso::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> swarm_pso::Result<()> {
//!     let config = PsoConfig::builder()
//!         .particle_count(12)
//!         .bounds(vec![Bounds::new(-5.0, 5.0); 2])
//!         .coefficients(0.7, 1.5, 1.5)
//!         .iteration_cap(100)
//!         .build()?;
//!
//!     let report = run_local(config, |_| Sphere::new(2)).await?;
//!     println!("{}", report.render_text());
//!     Ok(())
//! }
//! ```
//!
//! ## Crate Structure
//!
//! - [`swarm_pso_core`]: swarm state, work queue and update engine (no_std compatible)
//! - [`swarm_pso_net`]: coordinator/worker message contract and transports
//! - [`swarm_pso_runtime`]: clock, sleep and backoff abstractions
//! - [`swarm_pso_evaluators`]: reference objective functions

#![forbid(unsafe_code)]

// Re-export sub-crates
pub use swarm_pso_core as core;
pub use swarm_pso_evaluators as evaluators;
pub use swarm_pso_net as net;
pub use swarm_pso_runtime as runtime;

pub use async_trait::async_trait;

// Re-export commonly used items at the top level
pub use swarm_pso_core::{
    algorithms::{Bounds, ParticleSwarmConfig},
    convergence::{ConvergencePolicy, Verdict},
    traits::{CleanupError, EvaluationError, Evaluator, ParticleId, WorkerId},
};

pub mod config;
pub mod coordinator;
pub mod error;
pub mod local;
pub mod report;
pub mod worker;

pub use config::{PsoConfig, PsoConfigBuilder};
pub use coordinator::{Coordinator, Phase, ReportOutcome, Snapshot, StopReason};
pub use error::{ConfigError, CoordinatorError, Error, Result, WorkerError};
pub use local::{run_local, LocalSwarm};
pub use report::{RunOutcome, RunReport};
pub use worker::{Worker, WorkerConfig, WorkerSummary};

/// Prelude module for convenient imports
///
/// ```rust,ignore
/// use swarm_pso::prelude::*;
/// ```
pub mod prelude {
    pub use crate::evaluators::prelude::*;
    pub use crate::net::prelude::*;
    pub use crate::runtime::{tokio_runtime::TokioRuntime, SwarmRuntime};

    pub use crate::{
        run_local, Bounds, Coordinator, LocalSwarm, Phase, PsoConfig, RunOutcome, RunReport,
        Worker, WorkerConfig, WorkerId,
    };
}
