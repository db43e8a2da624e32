//! In-process swarm runner
//!
//! Starts a coordinator behind a channel transport and `worker_count`
//! workers as tokio tasks, each with its own evaluator from a factory.

use std::sync::Arc;

use swarm_pso_core::traits::{Evaluator, WorkerId};
use swarm_pso_net::channel::{channel, ServeStats};
use swarm_pso_runtime::tokio_runtime::TokioRuntime;
use swarm_pso_runtime::SwarmRuntime;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info};

use crate::config::PsoConfig;
use crate::coordinator::Coordinator;
use crate::error::{ConfigError, Error, Result};
use crate::report::RunReport;
use crate::worker::{Worker, WorkerConfig, WorkerSummary};

/// A running local swarm
pub struct LocalSwarm<R: SwarmRuntime> {
    coordinator: Arc<Coordinator<R>>,
    workers: JoinSet<WorkerSummary>,
    server: JoinHandle<ServeStats>,
}

impl<R: SwarmRuntime + Clone> LocalSwarm<R> {
    /// Start the coordinator and workers.
    ///
    /// `factory` is called once per worker with the worker's index.
    pub fn start<E, F>(config: PsoConfig, runtime: R, mut factory: F) -> Result<Self>
    where
        E: Evaluator + 'static,
        F: FnMut(usize) -> E,
    {
        if config.worker_count == 0 {
            return Err(ConfigError::invalid("local runner needs at least one worker").into());
        }
        let coordinator = Arc::new(Coordinator::new(config.clone(), runtime.clone())?);
        let (client, server) = channel(config.worker_count * 2);
        let server = tokio::spawn(server.serve(Arc::clone(&coordinator)));

        let mut workers = JoinSet::new();
        let worker_config = WorkerConfig::from_pso(&config);
        for index in 0..config.worker_count {
            let mut wc = worker_config;
            if let Some(seed) = config.random_seed {
                wc = wc.with_jitter_seed(seed.wrapping_add(index as u64 + 1));
            }
            let worker = Worker::new(
                WorkerId::new(format!("worker-{index}")),
                client.clone(),
                factory(index),
                runtime.clone(),
                wc,
            );
            workers.spawn(worker.run());
        }
        info!(workers = config.worker_count, "local swarm started");

        Ok(Self {
            coordinator,
            workers,
            server,
        })
    }

    /// Handle for snapshots and shutdown while the swarm runs
    pub fn coordinator(&self) -> &Arc<Coordinator<R>> {
        &self.coordinator
    }

    /// Wait for every worker to stop and build the final report
    pub async fn wait(mut self) -> Result<RunReport> {
        let mut summaries = Vec::new();
        while let Some(joined) = self.workers.join_next().await {
            summaries.push(joined.map_err(|e| Error::WorkerTask(e.to_string()))?);
        }
        // the last client handle went with the last worker
        let stats = self
            .server
            .await
            .map_err(|e| Error::WorkerTask(e.to_string()))?;
        debug!(handled = stats.handled, malformed = stats.malformed, "transport closed");

        summaries.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        let mut report = self.coordinator.report()?;
        report.workers = summaries;
        info!(
            outcome = %report.outcome,
            iterations = report.iterations,
            best_score = report.best_score,
            "local swarm finished"
        );
        Ok(report)
    }
}

/// Run a whole optimisation in-process on the tokio runtime
pub async fn run_local<E, F>(config: PsoConfig, factory: F) -> Result<RunReport>
where
    E: Evaluator + 'static,
    F: FnMut(usize) -> E,
{
    LocalSwarm::start(config, TokioRuntime::new(), factory)?
        .wait()
        .await
}
