//! Convergence tracking
//!
//! A run ends when the global best improves by less than `epsilon` for
//! `patience` consecutive iterations, or when the iteration cap is hit.

use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Stopping rule for a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergencePolicy {
    /// Minimum improvement that resets the patience counter
    pub epsilon: f64,
    /// Consecutive stagnant iterations tolerated before converging
    pub patience: u32,
    /// Hard cap on completed iterations
    pub iteration_cap: u64,
}

impl Default for ConvergencePolicy {
    fn default() -> Self {
        Self {
            epsilon: 1e-6,
            patience: 10,
            iteration_cap: 200,
        }
    }
}

impl ConvergencePolicy {
    pub fn validate(&self) -> Result<()> {
        if !(self.epsilon.is_finite() && self.epsilon >= 0.0) {
            return Err(Error::InvalidConfig("epsilon must be non-negative and finite"));
        }
        if self.patience == 0 {
            return Err(Error::InvalidConfig("patience must be at least one iteration"));
        }
        if self.iteration_cap == 0 {
            return Err(Error::InvalidConfig("iteration cap must be at least one"));
        }
        Ok(())
    }
}

/// Outcome of observing a completed iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Continue,
    Converged,
    CapReached,
}

impl Verdict {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Verdict::Continue)
    }
}

/// Per-run convergence state
#[derive(Debug, Clone)]
pub struct ConvergenceTracker {
    policy: ConvergencePolicy,
    last_best: f64,
    stagnant: u32,
    history: Vec<f64>,
}

impl ConvergenceTracker {
    pub fn new(policy: ConvergencePolicy) -> Self {
        Self {
            policy,
            last_best: f64::INFINITY,
            stagnant: 0,
            history: Vec::new(),
        }
    }

    pub fn policy(&self) -> &ConvergencePolicy {
        &self.policy
    }

    /// Feed the global best after `completed` iterations.
    ///
    /// Convergence wins over the cap when both trigger together.
    pub fn observe(&mut self, completed: u64, global_best: f64) -> Verdict {
        // inf - inf is NaN, which counts as no improvement
        let improvement = self.last_best - global_best;
        if improvement >= self.policy.epsilon {
            self.stagnant = 0;
        } else {
            self.stagnant = self.stagnant.saturating_add(1);
        }
        self.last_best = global_best;
        self.history.push(global_best);

        if self.stagnant >= self.policy.patience {
            Verdict::Converged
        } else if completed >= self.policy.iteration_cap {
            Verdict::CapReached
        } else {
            Verdict::Continue
        }
    }

    /// Consecutive iterations without sufficient improvement
    pub fn stagnant_iterations(&self) -> u32 {
        self.stagnant
    }

    /// Global best after each completed iteration
    pub fn history(&self) -> &[f64] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(epsilon: f64, patience: u32, cap: u64) -> ConvergencePolicy {
        ConvergencePolicy {
            epsilon,
            patience,
            iteration_cap: cap,
        }
    }

    #[test]
    fn converges_after_patience_stagnant_iterations() {
        let mut t = ConvergenceTracker::new(policy(0.1, 2, 100));
        assert_eq!(t.observe(1, 10.0), Verdict::Continue);
        assert_eq!(t.observe(2, 9.95), Verdict::Continue);
        assert_eq!(t.observe(3, 9.95), Verdict::Converged);
        assert_eq!(t.history(), &[10.0, 9.95, 9.95]);
    }

    #[test]
    fn improvement_resets_patience() {
        let mut t = ConvergenceTracker::new(policy(0.1, 2, 100));
        t.observe(1, 10.0);
        t.observe(2, 10.0);
        assert_eq!(t.stagnant_iterations(), 1);
        assert_eq!(t.observe(3, 5.0), Verdict::Continue);
        assert_eq!(t.stagnant_iterations(), 0);
    }

    #[test]
    fn cap_reached_before_convergence() {
        let mut t = ConvergenceTracker::new(policy(0.0, 5, 3));
        assert_eq!(t.observe(1, 3.0), Verdict::Continue);
        assert_eq!(t.observe(2, 2.0), Verdict::Continue);
        assert_eq!(t.observe(3, 1.0), Verdict::CapReached);
    }

    #[test]
    fn convergence_wins_tie_with_cap() {
        let mut t = ConvergenceTracker::new(policy(1.0, 1, 2));
        t.observe(1, 4.0);
        assert_eq!(t.observe(2, 4.0), Verdict::Converged);
    }

    #[test]
    fn unscored_swarm_counts_as_stagnant() {
        let mut t = ConvergenceTracker::new(policy(0.1, 1, 10));
        assert_eq!(t.observe(1, f64::INFINITY), Verdict::Converged);
    }

    #[test]
    fn policy_validation() {
        assert!(ConvergencePolicy::default().validate().is_ok());
        assert!(policy(-1.0, 1, 1).validate().is_err());
        assert!(policy(0.1, 0, 1).validate().is_err());
        assert!(policy(0.1, 1, 0).validate().is_err());
    }
}
