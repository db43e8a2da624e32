//! Run report
//!
//! What a finished (or interrupted) run produced: the outcome, the best
//! point found, the per-iteration history of the global best and what every
//! worker did. Serialises to JSON; non-finite scores are written as `null`.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use swarm_pso_core::traits::ParticleId;

use crate::worker::WorkerSummary;

/// How the run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Converged,
    IterationCap,
    Shutdown,
    Aborted,
    /// Report taken while the run was still going
    Running,
}

impl core::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            RunOutcome::Converged => "converged",
            RunOutcome::IterationCap => "iteration cap reached",
            RunOutcome::Shutdown => "shut down",
            RunOutcome::Aborted => "aborted",
            RunOutcome::Running => "running",
        };
        f.write_str(s)
    }
}

/// Summary of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Completed iterations
    pub iterations: u64,
    /// `None` until some particle reported a finite score
    pub best_score: Option<f64>,
    pub best_position: Vec<f64>,
    pub best_particle: Option<ParticleId>,
    /// Global best after each completed iteration
    pub history: Vec<Option<f64>>,
    pub dispatched: u64,
    pub reissued: u64,
    pub duplicate_reports: u64,
    pub stale_reports: u64,
    pub rejected_reports: u64,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub workers: Vec<WorkerSummary>,
}

impl RunReport {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let json = self.to_json_pretty().map_err(io::Error::from)?;
        fs::write(path, json)
    }

    pub fn read_json(path: impl AsRef<Path>) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Multi-line human readable summary
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "outcome:     {}", self.outcome);
        let _ = writeln!(out, "iterations:  {}", self.iterations);
        match self.best_score {
            Some(score) => {
                let _ = writeln!(out, "best score:  {score:.6}");
                let _ = writeln!(out, "best point:  {:?}", self.best_position);
            }
            None => {
                let _ = writeln!(out, "best score:  none");
            }
        }
        let _ = writeln!(
            out,
            "work items:  {} dispatched, {} reissued",
            self.dispatched, self.reissued
        );
        let _ = writeln!(
            out,
            "reports:     {} duplicate, {} stale, {} rejected",
            self.duplicate_reports, self.stale_reports, self.rejected_reports
        );
        for w in &self.workers {
            let _ = writeln!(
                out,
                "  {}: {} evaluated, {} reported, {} failed, {} abandoned, {} retries",
                w.worker_id, w.evaluated, w.reported, w.failed, w.abandoned, w.transport_retries
            );
        }
        out
    }
}
