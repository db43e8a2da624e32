//! Run configuration
//!
//! One [`PsoConfig`] describes a whole run: the swarm, the stopping rule and
//! the timing of the coordinator/worker protocol. It loads from JSON and any
//! missing field takes its default.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use swarm_pso_core::algorithms::{Bounds, ParticleSwarmConfig};
use swarm_pso_core::convergence::ConvergencePolicy;
use swarm_pso_runtime::BackoffPolicy;

use crate::error::ConfigError;

/// Configuration for a SwarmPSO run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsoConfig {
    pub particle_count: usize,
    /// Must equal `bounds.len()`
    pub dimensionality: usize,
    pub bounds: Vec<Bounds>,
    /// Inertia weight `w`
    pub inertia_weight: f64,
    /// Cognitive coefficient `c1`
    pub cognitive_coeff: f64,
    /// Social coefficient `c2`
    pub social_coeff: f64,
    pub velocity_max: f64,
    pub iteration_cap: u64,
    pub convergence_epsilon: f64,
    /// Consecutive stagnant iterations before the run converges
    pub convergence_patience: u32,
    pub worker_backoff_min_ms: u64,
    pub worker_backoff_max_ms: u64,
    /// Time after issue at which a work item may be reissued
    pub work_item_deadline_ms: u64,
    /// Seed for the coordinator's random source; entropy when absent
    pub random_seed: Option<u64>,
    /// Bound on a single `evaluate` call inside a worker
    pub evaluation_timeout_ms: u64,
    /// How long shutdown waits for outstanding reports
    pub drain_timeout_ms: u64,
    /// Extra attempts for a report that hit a transport error
    pub report_retries: u32,
    /// Workers started by the local runner
    pub worker_count: usize,
}

impl Default for PsoConfig {
    fn default() -> Self {
        let swarm = ParticleSwarmConfig::default();
        let convergence = ConvergencePolicy::default();
        Self {
            particle_count: swarm.num_particles,
            dimensionality: swarm.dimensions(),
            bounds: swarm.bounds,
            inertia_weight: swarm.inertia,
            cognitive_coeff: swarm.cognitive,
            social_coeff: swarm.social,
            velocity_max: swarm.max_velocity,
            iteration_cap: convergence.iteration_cap,
            convergence_epsilon: convergence.epsilon,
            convergence_patience: convergence.patience,
            worker_backoff_min_ms: 100,
            worker_backoff_max_ms: 5_000,
            work_item_deadline_ms: 30_000,
            random_seed: None,
            evaluation_timeout_ms: 10_000,
            drain_timeout_ms: 5_000,
            report_retries: 3,
            worker_count: 4,
        }
    }
}

impl PsoConfig {
    pub fn builder() -> PsoConfigBuilder {
        PsoConfigBuilder::new()
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn swarm_config(&self) -> ParticleSwarmConfig {
        ParticleSwarmConfig {
            num_particles: self.particle_count,
            bounds: self.bounds.clone(),
            inertia: self.inertia_weight,
            cognitive: self.cognitive_coeff,
            social: self.social_coeff,
            max_velocity: self.velocity_max,
        }
    }

    pub fn convergence_policy(&self) -> ConvergencePolicy {
        ConvergencePolicy {
            epsilon: self.convergence_epsilon,
            patience: self.convergence_patience,
            iteration_cap: self.iteration_cap,
        }
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.worker_backoff_min_ms),
            Duration::from_millis(self.worker_backoff_max_ms),
        )
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_millis(self.evaluation_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Reject configurations the coordinator cannot run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dimensionality != self.bounds.len() {
            return Err(ConfigError::invalid(format!(
                "dimensionality is {} but {} bounds were given",
                self.dimensionality,
                self.bounds.len()
            )));
        }
        self.swarm_config()
            .validate()
            .map_err(|e| ConfigError::invalid(e.to_string()))?;
        self.convergence_policy()
            .validate()
            .map_err(|e| ConfigError::invalid(e.to_string()))?;
        if self.worker_backoff_min_ms == 0 {
            return Err(ConfigError::invalid("worker backoff minimum must be positive"));
        }
        if self.worker_backoff_min_ms > self.worker_backoff_max_ms {
            return Err(ConfigError::invalid(
                "worker backoff minimum exceeds the maximum",
            ));
        }
        if self.work_item_deadline_ms == 0 {
            return Err(ConfigError::invalid("work item deadline must be positive"));
        }
        if self.evaluation_timeout_ms == 0 {
            return Err(ConfigError::invalid("evaluation timeout must be positive"));
        }
        Ok(())
    }
}

/// Builder for [`PsoConfig`]
#[derive(Debug, Default)]
pub struct PsoConfigBuilder {
    config: PsoConfig,
}

impl PsoConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn particle_count(mut self, count: usize) -> Self {
        self.config.particle_count = count;
        self
    }

    /// Set the search space; dimensionality follows the number of bounds
    pub fn bounds(mut self, bounds: Vec<Bounds>) -> Self {
        self.config.dimensionality = bounds.len();
        self.config.bounds = bounds;
        self
    }

    /// Set `w`, `c1` and `c2`
    pub fn coefficients(mut self, inertia: f64, cognitive: f64, social: f64) -> Self {
        self.config.inertia_weight = inertia;
        self.config.cognitive_coeff = cognitive;
        self.config.social_coeff = social;
        self
    }

    pub fn velocity_max(mut self, vmax: f64) -> Self {
        self.config.velocity_max = vmax;
        self
    }

    pub fn iteration_cap(mut self, cap: u64) -> Self {
        self.config.iteration_cap = cap;
        self
    }

    /// Converge after `patience` iterations improving by less than `epsilon`
    pub fn convergence(mut self, epsilon: f64, patience: u32) -> Self {
        self.config.convergence_epsilon = epsilon;
        self.config.convergence_patience = patience;
        self
    }

    pub fn worker_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.config.worker_backoff_min_ms = min.as_millis() as u64;
        self.config.worker_backoff_max_ms = max.as_millis() as u64;
        self
    }

    pub fn work_item_deadline(mut self, deadline: Duration) -> Self {
        self.config.work_item_deadline_ms = deadline.as_millis() as u64;
        self
    }

    pub fn random_seed(mut self, seed: u64) -> Self {
        self.config.random_seed = Some(seed);
        self
    }

    pub fn evaluation_timeout(mut self, timeout: Duration) -> Self {
        self.config.evaluation_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.config.drain_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn report_retries(mut self, retries: u32) -> Self {
        self.config.report_retries = retries;
        self
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> Result<PsoConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
