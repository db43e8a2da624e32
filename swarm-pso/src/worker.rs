//! Worker loop
//!
//! A worker pulls work from the coordinator, scores it with its own
//! [`Evaluator`] and reports back. It backs off on `Wait` and on transport
//! errors, and only `Stop` (or a coordinator that is gone for good) ends the
//! loop. A failing particle never ends it.
//!
//! Each evaluation runs on the blocking pool under a timeout. `cleanup` runs
//! after every `evaluate`, including one that failed or panicked.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use swarm_pso_core::traits::{CleanupError, EvaluationError, Evaluator, ParticleId, WorkerId};
use swarm_pso_core::work_queue::WorkItem;
use swarm_pso_net::protocol::{ReportRequest, ReportResponse, WorkResponse};
use swarm_pso_net::traits::CoordinatorClient;
use swarm_pso_runtime::{Backoff, BackoffPolicy, SwarmRuntime};
use tracing::{debug, error, info, warn};

use crate::config::PsoConfig;
use crate::error::WorkerError;

/// Worker tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerConfig {
    pub backoff: BackoffPolicy,
    /// Bound on one `evaluate` call
    pub evaluation_timeout: Duration,
    /// Extra attempts for a report that hit a retryable transport error
    pub report_retries: u32,
    /// Seed for backoff jitter; entropy when absent
    pub jitter_seed: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from_pso(&PsoConfig::default())
    }
}

impl WorkerConfig {
    pub fn from_pso(config: &PsoConfig) -> Self {
        Self {
            backoff: config.backoff_policy(),
            evaluation_timeout: config.evaluation_timeout(),
            report_retries: config.report_retries,
            jitter_seed: None,
        }
    }

    pub fn with_jitter_seed(mut self, seed: u64) -> Self {
        self.jitter_seed = Some(seed);
        self
    }
}

/// What one worker did over its lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub worker_id: WorkerId,
    /// Successful evaluations
    pub evaluated: u64,
    /// Reports the coordinator acknowledged
    pub reported: u64,
    /// Reports the coordinator refused
    pub rejected: u64,
    /// Evaluations that failed or timed out
    pub failed: u64,
    /// Cleanups that failed after a successful evaluation
    pub cleanup_failures: u64,
    /// Particles given up after a failed evaluation and a failed cleanup
    pub abandoned: u64,
    pub transport_retries: u64,
    pub waits: u64,
    /// Loop ended because the coordinator went away rather than on `Stop`
    pub disconnected: bool,
}

impl WorkerSummary {
    pub fn new(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            evaluated: 0,
            reported: 0,
            rejected: 0,
            failed: 0,
            cleanup_failures: 0,
            abandoned: 0,
            transport_retries: 0,
            waits: 0,
            disconnected: false,
        }
    }
}

/// Result of `evaluate` plus `cleanup` on the blocking pool
struct Scoped {
    evaluated: Result<f64, EvaluationError>,
    cleaned: Result<(), CleanupError>,
}

/// A polling worker bound to one evaluator
pub struct Worker<C, E, R> {
    id: WorkerId,
    client: C,
    evaluator: Arc<Mutex<E>>,
    runtime: R,
    config: WorkerConfig,
    backoff: Backoff,
    summary: WorkerSummary,
}

impl<C, E, R> Worker<C, E, R>
where
    C: CoordinatorClient,
    E: Evaluator + 'static,
    R: SwarmRuntime,
{
    pub fn new(id: WorkerId, client: C, evaluator: E, runtime: R, config: WorkerConfig) -> Self {
        let backoff = match config.jitter_seed {
            Some(seed) => Backoff::with_seed(config.backoff, seed),
            None => Backoff::new(config.backoff),
        };
        Self {
            summary: WorkerSummary::new(id.clone()),
            id,
            client,
            evaluator: Arc::new(Mutex::new(evaluator)),
            runtime,
            config,
            backoff,
        }
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    /// Poll until `Stop`; the evaluator is dropped when this returns
    pub async fn run(mut self) -> WorkerSummary {
        info!(worker_id = %self.id, "worker started");
        loop {
            match self.client.get_work(&self.id).await {
                Ok(WorkResponse::Work(item)) => {
                    self.backoff.reset();
                    if let Err(e) = self.process(item).await {
                        self.summary.disconnected = true;
                        warn!(worker_id = %self.id, error = %e, "coordinator unreachable, stopping");
                        break;
                    }
                }
                Ok(wait @ WorkResponse::Wait { .. }) => {
                    self.summary.waits += 1;
                    let delay = self.backoff.next_delay(wait.backoff_hint());
                    debug!(worker_id = %self.id, delay_ms = delay.as_millis() as u64, "waiting");
                    self.runtime.sleep(delay).await;
                }
                Ok(WorkResponse::Stop) => break,
                Err(e) if e.is_retryable() => {
                    self.summary.transport_retries += 1;
                    let delay = self.backoff.next_delay(None);
                    warn!(
                        worker_id = %self.id,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "poll failed, retrying"
                    );
                    self.runtime.sleep(delay).await;
                }
                Err(e) => {
                    self.summary.disconnected = true;
                    warn!(worker_id = %self.id, error = %e, "coordinator unreachable, stopping");
                    break;
                }
            }
        }
        info!(
            worker_id = %self.id,
            evaluated = self.summary.evaluated,
            reported = self.summary.reported,
            failed = self.summary.failed,
            abandoned = self.summary.abandoned,
            "worker stopped"
        );
        self.summary
    }

    /// Evaluate and report one item. `Err` only for a transport failure that
    /// cannot be retried.
    async fn process(&mut self, item: WorkItem) -> Result<(), swarm_pso_net::Error> {
        let particle_id = item.particle_id;
        let score = match self.evaluate(particle_id, item.params).await {
            Ok(score) => score,
            Err(WorkerError::FatalParticle {
                particle,
                evaluation,
                cleanup,
            }) => {
                self.summary.abandoned += 1;
                error!(
                    worker_id = %self.id,
                    particle_id = %particle,
                    evaluation = %evaluation,
                    cleanup = %cleanup,
                    "double fault, abandoning particle"
                );
                return Ok(());
            }
            Err(e) => {
                self.summary.failed += 1;
                warn!(
                    worker_id = %self.id,
                    particle_id = %particle_id,
                    error = %e,
                    "evaluation failed, particle left for reissue"
                );
                return Ok(());
            }
        };
        self.summary.evaluated += 1;

        let report = ReportRequest {
            worker_id: self.id.clone(),
            particle_id,
            iteration: item.iteration,
            score,
        };
        self.report(&report).await
    }

    async fn report(&mut self, report: &ReportRequest) -> Result<(), swarm_pso_net::Error> {
        let mut attempt = 0;
        loop {
            match self.client.report_result(report).await {
                Ok(ReportResponse::Ack) => {
                    self.summary.reported += 1;
                    debug!(
                        worker_id = %self.id,
                        particle_id = %report.particle_id,
                        score = report.score,
                        "report acknowledged"
                    );
                    return Ok(());
                }
                Ok(ReportResponse::Rejected { kind, reason }) => {
                    self.summary.rejected += 1;
                    warn!(
                        worker_id = %self.id,
                        particle_id = %report.particle_id,
                        kind = %kind,
                        reason = %reason,
                        "report rejected"
                    );
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < self.config.report_retries => {
                    attempt += 1;
                    self.summary.transport_retries += 1;
                    let delay = self.backoff.next_delay(None);
                    warn!(
                        worker_id = %self.id,
                        particle_id = %report.particle_id,
                        error = %e,
                        attempt,
                        "report failed, retrying"
                    );
                    self.runtime.sleep(delay).await;
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        worker_id = %self.id,
                        particle_id = %report.particle_id,
                        error = %e,
                        "giving up on report, particle left for reissue"
                    );
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run `evaluate` then `cleanup` on the blocking pool under the
    /// evaluation timeout, and classify the outcome.
    ///
    /// A timed-out call cannot be cancelled, so the worker waits for it to
    /// finish before taking more work. Its score is discarded but its cleanup
    /// result still counts.
    async fn evaluate(&mut self, particle: ParticleId, params: Vec<f64>) -> Result<f64, WorkerError> {
        let evaluator = Arc::clone(&self.evaluator);
        let mut task = tokio::task::spawn_blocking(move || scoped_evaluate(&evaluator, &params));

        let joined = match tokio::time::timeout(self.config.evaluation_timeout, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(
                    worker_id = %self.id,
                    particle_id = %particle,
                    timeout_ms = self.config.evaluation_timeout.as_millis() as u64,
                    "evaluation timed out, waiting for it to release the evaluator"
                );
                task.await.map(|scoped| Scoped {
                    evaluated: Err(EvaluationError::TimedOut),
                    cleaned: scoped.cleaned,
                })
            }
        };
        let scoped = match joined {
            Ok(scoped) => scoped,
            Err(join) => {
                return Err(WorkerError::Evaluation(EvaluationError::Panicked(
                    join.to_string(),
                )))
            }
        };

        let score = match (scoped.evaluated, scoped.cleaned) {
            (Ok(score), Ok(())) => score,
            (Ok(score), Err(cleanup)) => {
                self.summary.cleanup_failures += 1;
                warn!(
                    worker_id = %self.id,
                    particle_id = %particle,
                    error = %cleanup,
                    "cleanup failed after a successful evaluation"
                );
                score
            }
            (Err(evaluation), Ok(())) => return Err(WorkerError::Evaluation(evaluation)),
            (Err(evaluation), Err(cleanup)) => {
                return Err(WorkerError::FatalParticle {
                    particle,
                    evaluation,
                    cleanup,
                })
            }
        };
        if score.is_nan() {
            return Err(WorkerError::Evaluation(EvaluationError::failed(
                "evaluator returned NaN",
            )));
        }
        Ok(score)
    }
}

fn scoped_evaluate<E: Evaluator>(evaluator: &Mutex<E>, params: &[f64]) -> Scoped {
    // a poisoned lock only means an earlier call panicked, which is already contained
    let mut guard = match evaluator.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let evaluated = catch_unwind(AssertUnwindSafe(|| guard.evaluate(params)))
        .unwrap_or_else(|payload| Err(EvaluationError::Panicked(panic_message(payload.as_ref()))));
    let cleaned = catch_unwind(AssertUnwindSafe(|| guard.cleanup())).unwrap_or_else(|payload| {
        Err(CleanupError::new(format!(
            "cleanup panicked: {}",
            panic_message(payload.as_ref())
        )))
    });
    Scoped { evaluated, cleaned }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
