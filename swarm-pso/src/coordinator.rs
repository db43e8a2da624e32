//! Coordinator
//!
//! Owns the canonical swarm, the per-iteration work queue and the
//! convergence tracker. Every `GetWork`/`ReportResult` takes the same state
//! lock, so dispatch and score recording are serialized. Neither call ever
//! waits on a worker: iteration completion is driven by the last report of
//! the iteration.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use swarm_pso_core::convergence::{ConvergenceTracker, Verdict};
use swarm_pso_core::swarm::{ParticleStatus, Swarm};
use swarm_pso_core::traits::WorkerId;
use swarm_pso_core::work_queue::{Completion, WorkQueue};
use swarm_pso_net::protocol::{GetWorkRequest, ReportRequest, ReportResponse, WorkResponse};
use swarm_pso_net::traits::CoordinatorService;
use swarm_pso_runtime::{BackoffPolicy, SwarmRuntime};
use tracing::{debug, error, info, warn};

use crate::config::PsoConfig;
use crate::error::CoordinatorError;
use crate::report::{RunOutcome, RunReport};

/// Poll interval while draining
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Why a run stopped without converging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    IterationCap,
    Shutdown,
    /// An internal invariant failed
    Aborted,
}

/// Coordinator state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Pending items remain in the current iteration
    Dispatching,
    /// Everything is handed out; waiting for the remaining reports
    Collecting,
    /// Running the update engine
    Updating,
    Converged,
    Stopped(StopReason),
}

impl Phase {
    /// `GetWork` returns `Stop` from every terminal phase
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Converged | Phase::Stopped(_))
    }
}

/// What an accepted report did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Score recorded; the iteration is still open
    Recorded { global_best_improved: bool },
    /// Score recorded and it closed the iteration
    IterationComplete {
        global_best_improved: bool,
        phase: Phase,
    },
    /// Particle already done this iteration
    Duplicate,
    /// Report for an iteration that has already finished
    Stale,
    /// Run is over; the score was not recorded
    Ignored,
}

/// Point-in-time view of the coordinator
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub phase: Phase,
    pub iteration: u64,
    pub global_best_score: f64,
    pub global_best_position: Vec<f64>,
    pub pending: usize,
    pub outstanding: usize,
    pub completed: usize,
    pub draining: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    dispatched: u64,
    reissued: u64,
    duplicates: u64,
    stale: u64,
    rejected: u64,
}

#[derive(Debug)]
struct State {
    swarm: Swarm,
    queue: WorkQueue,
    tracker: ConvergenceTracker,
    phase: Phase,
    rng: StdRng,
    draining: bool,
    counters: Counters,
}

/// Central owner of the swarm for one run
#[derive(Debug)]
pub struct Coordinator<R: SwarmRuntime> {
    runtime: R,
    config: PsoConfig,
    backoff: BackoffPolicy,
    started_ms: u64,
    state: Mutex<State>,
}

impl<R: SwarmRuntime> Coordinator<R> {
    /// Start a run with a randomly initialised swarm
    pub fn new(config: PsoConfig, runtime: R) -> Result<Self, CoordinatorError> {
        config.validate()?;
        let mut rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let swarm = Swarm::new(config.swarm_config(), &mut rng)?;
        Self::build(config, swarm, rng, runtime)
    }

    /// Start a run from an explicit swarm; its configuration must match
    pub fn with_swarm(config: PsoConfig, swarm: Swarm, runtime: R) -> Result<Self, CoordinatorError> {
        config.validate()?;
        if swarm.config() != &config.swarm_config() {
            return Err(CoordinatorError::Config(crate::error::ConfigError::invalid(
                "swarm does not match the run configuration",
            )));
        }
        let rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::build(config, swarm, rng, runtime)
    }

    fn build(config: PsoConfig, swarm: Swarm, rng: StdRng, runtime: R) -> Result<Self, CoordinatorError> {
        let mut queue = WorkQueue::new(config.work_item_deadline_ms);
        queue.populate(swarm.iteration(), swarm.len());
        let tracker = ConvergenceTracker::new(config.convergence_policy());
        info!(
            particles = swarm.len(),
            dimensions = swarm.config().dimensions(),
            iteration_cap = config.iteration_cap,
            "coordinator ready"
        );
        Ok(Self {
            started_ms: runtime.now(),
            backoff: config.backoff_policy(),
            runtime,
            config,
            state: Mutex::new(State {
                swarm,
                queue,
                tracker,
                phase: Phase::Dispatching,
                rng,
                draining: false,
                counters: Counters::default(),
            }),
        })
    }

    pub fn config(&self) -> &PsoConfig {
        &self.config
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, CoordinatorError> {
        self.state.lock().map_err(|_| CoordinatorError::LockPoisoned)
    }

    /// Hand out the next work item, a wait hint, or `Stop`.
    pub fn get_work(&self, worker_id: &WorkerId) -> WorkResponse {
        let now = self.runtime.now();
        let mut guard = match self.lock() {
            Ok(guard) => guard,
            Err(e) => {
                error!(error = %e, "refusing work");
                return WorkResponse::Stop;
            }
        };
        let state = &mut *guard;
        if state.phase.is_terminal() || state.draining {
            return WorkResponse::Stop;
        }

        let assignment = match state.queue.assign(&state.swarm, worker_id, now) {
            Ok(assignment) => assignment,
            Err(e) => {
                abort(state, &e.to_string());
                return WorkResponse::Stop;
            }
        };

        let Some(assignment) = assignment else {
            let hint = self.wait_hint(&state.queue, now);
            debug!(worker_id = %worker_id, backoff_ms = hint.as_millis() as u64, "nothing to dispatch");
            return WorkResponse::wait(hint);
        };

        let particle_id = assignment.item.particle_id;
        if let Err(e) = state.swarm.set_status(particle_id, ParticleStatus::Assigned) {
            abort(state, &e.to_string());
            return WorkResponse::Stop;
        }
        state.counters.dispatched += 1;
        match &assignment.reissued_from {
            Some(previous) => {
                state.counters.reissued += 1;
                info!(
                    worker_id = %worker_id,
                    previous = %previous,
                    particle_id = %particle_id,
                    iteration = assignment.item.iteration,
                    "reissuing expired work item"
                );
            }
            None => debug!(
                worker_id = %worker_id,
                particle_id = %particle_id,
                iteration = assignment.item.iteration,
                "dispatched work item"
            ),
        }
        state.phase = if state.queue.pending_len() == 0 {
            Phase::Collecting
        } else {
            Phase::Dispatching
        };
        WorkResponse::Work(assignment.item)
    }

    /// Time until the earliest outstanding deadline, within the backoff range
    fn wait_hint(&self, queue: &WorkQueue, now: u64) -> Duration {
        let until = queue
            .next_deadline()
            .map(|deadline| Duration::from_millis(deadline.saturating_sub(now)))
            .unwrap_or(self.backoff.min);
        until.max(self.backoff.min).min(self.backoff.max)
    }

    /// Record a score.
    ///
    /// Duplicates and reports for finished iterations are accepted as
    /// no-ops. An invariant violation aborts the run.
    pub fn report_result(&self, report: &ReportRequest) -> Result<ReportOutcome, CoordinatorError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let result = record(state, report);
        match &result {
            Err(CoordinatorError::InvariantViolation(what)) => abort(state, what),
            Err(e) => {
                state.counters.rejected += 1;
                warn!(
                    worker_id = %report.worker_id,
                    particle_id = %report.particle_id,
                    iteration = report.iteration,
                    error = %e,
                    "rejected report"
                );
            }
            Ok(ReportOutcome::Duplicate) => {
                state.counters.duplicates += 1;
                debug!(
                    worker_id = %report.worker_id,
                    particle_id = %report.particle_id,
                    "duplicate report ignored"
                );
            }
            Ok(ReportOutcome::Stale) => {
                state.counters.stale += 1;
                debug!(
                    worker_id = %report.worker_id,
                    particle_id = %report.particle_id,
                    iteration = report.iteration,
                    "stale report ignored"
                );
            }
            Ok(_) => {}
        }
        result
    }

    /// Stop dispatching, wait up to `drain` for outstanding reports, then
    /// stop. Returns the number of abandoned work items.
    pub async fn shutdown(&self, drain: Duration) -> Result<usize, CoordinatorError> {
        {
            let mut state = self.lock()?;
            if state.phase.is_terminal() {
                return Ok(0);
            }
            state.draining = true;
            info!(
                outstanding = state.queue.outstanding_len(),
                drain_ms = drain.as_millis() as u64,
                "draining"
            );
        }

        let deadline = self.runtime.now().saturating_add(drain.as_millis() as u64);
        loop {
            let now = self.runtime.now();
            {
                let state = self.lock()?;
                if state.phase.is_terminal() || state.queue.outstanding_len() == 0 || now >= deadline {
                    break;
                }
            }
            let remaining = Duration::from_millis(deadline - now);
            self.runtime.sleep(DRAIN_POLL.min(remaining)).await;
        }

        let mut state = self.lock()?;
        if state.phase.is_terminal() {
            return Ok(0);
        }
        let abandoned = state.queue.abandon();
        state.phase = Phase::Stopped(StopReason::Shutdown);
        if abandoned > 0 {
            warn!(abandoned, "shutdown abandoned outstanding work items");
        } else {
            info!("shutdown complete");
        }
        Ok(abandoned)
    }

    pub fn phase(&self) -> Result<Phase, CoordinatorError> {
        Ok(self.lock()?.phase)
    }

    /// True once `GetWork` answers `Stop` for good
    pub fn is_finished(&self) -> Result<bool, CoordinatorError> {
        Ok(self.phase()?.is_terminal())
    }

    pub fn snapshot(&self) -> Result<Snapshot, CoordinatorError> {
        let state = self.lock()?;
        let best = state.swarm.global_best();
        Ok(Snapshot {
            phase: state.phase,
            iteration: state.swarm.iteration(),
            global_best_score: best.score,
            global_best_position: best.position.clone(),
            pending: state.queue.pending_len(),
            outstanding: state.queue.outstanding_len(),
            completed: state.queue.completed_len(),
            draining: state.draining,
        })
    }

    /// Copy of the current swarm state
    pub fn swarm(&self) -> Result<Swarm, CoordinatorError> {
        Ok(self.lock()?.swarm.clone())
    }

    /// Summary of the run so far; worker summaries are left empty
    pub fn report(&self) -> Result<RunReport, CoordinatorError> {
        let state = self.lock()?;
        let best = state.swarm.global_best();
        let outcome = match state.phase {
            Phase::Converged => RunOutcome::Converged,
            Phase::Stopped(StopReason::IterationCap) => RunOutcome::IterationCap,
            Phase::Stopped(StopReason::Shutdown) => RunOutcome::Shutdown,
            Phase::Stopped(StopReason::Aborted) => RunOutcome::Aborted,
            Phase::Dispatching | Phase::Collecting | Phase::Updating => RunOutcome::Running,
        };
        Ok(RunReport {
            outcome,
            iterations: state.swarm.iteration(),
            best_score: finite(best.score),
            best_position: best.position.clone(),
            best_particle: best.particle,
            history: state.tracker.history().iter().copied().map(finite).collect(),
            dispatched: state.counters.dispatched,
            reissued: state.counters.reissued,
            duplicate_reports: state.counters.duplicates,
            stale_reports: state.counters.stale,
            rejected_reports: state.counters.rejected,
            elapsed_ms: self.runtime.now().saturating_sub(self.started_ms),
            workers: Vec::new(),
        })
    }
}

fn finite(score: f64) -> Option<f64> {
    score.is_finite().then_some(score)
}

fn abort(state: &mut State, what: &str) {
    error!(violation = what, "invariant violated, aborting run");
    state.queue.abandon();
    state.phase = Phase::Stopped(StopReason::Aborted);
}

fn record(state: &mut State, report: &ReportRequest) -> Result<ReportOutcome, CoordinatorError> {
    let particle_id = report.particle_id;
    if particle_id.index() >= state.swarm.len() {
        return Err(CoordinatorError::InvalidRequest(format!(
            "unknown particle {particle_id}"
        )));
    }
    if report.score.is_nan() {
        return Err(CoordinatorError::Protocol(format!(
            "score for particle {particle_id} is NaN"
        )));
    }
    if state.phase.is_terminal() {
        return Ok(ReportOutcome::Ignored);
    }

    let current = state.queue.iteration();
    if report.iteration < current {
        return Ok(ReportOutcome::Stale);
    }
    if report.iteration > current {
        return Err(CoordinatorError::Protocol(format!(
            "report for iteration {} while iteration {current} is running",
            report.iteration
        )));
    }

    if state.queue.complete(particle_id, &report.worker_id)? == Completion::Duplicate {
        return Ok(ReportOutcome::Duplicate);
    }
    let update = state.swarm.record_score(particle_id, report.score)?;
    if update.global_best {
        info!(
            worker_id = %report.worker_id,
            particle_id = %particle_id,
            iteration = current,
            score = report.score,
            "new global best"
        );
    } else {
        debug!(
            worker_id = %report.worker_id,
            particle_id = %particle_id,
            iteration = current,
            score = report.score,
            "recorded score"
        );
    }

    if !state.queue.is_complete() {
        return Ok(ReportOutcome::Recorded {
            global_best_improved: update.global_best,
        });
    }
    if state.draining {
        // shutdown is about to stop the run; no point moving the swarm
        return Ok(ReportOutcome::Recorded {
            global_best_improved: update.global_best,
        });
    }

    let phase = finish_iteration(state)?;
    Ok(ReportOutcome::IterationComplete {
        global_best_improved: update.global_best,
        phase,
    })
}

/// Move the swarm, then decide whether the run continues
fn finish_iteration(state: &mut State) -> Result<Phase, CoordinatorError> {
    state.phase = Phase::Updating;
    state.swarm.advance(&mut state.rng)?;
    state.swarm.check_invariants()?;

    let completed = state.swarm.iteration();
    let best = state.swarm.global_best().score;
    let verdict = state.tracker.observe(completed, best);
    info!(
        iteration = completed,
        global_best = best,
        stagnant = state.tracker.stagnant_iterations(),
        "iteration complete"
    );

    state.phase = match verdict {
        Verdict::Continue => {
            state.queue.populate(completed, state.swarm.len());
            Phase::Dispatching
        }
        Verdict::Converged => {
            info!(iterations = completed, global_best = best, "swarm converged");
            Phase::Converged
        }
        Verdict::CapReached => {
            info!(iterations = completed, global_best = best, "iteration cap reached");
            Phase::Stopped(StopReason::IterationCap)
        }
    };
    Ok(state.phase)
}

impl<R: SwarmRuntime> CoordinatorService for Coordinator<R> {
    fn get_work(&self, request: &GetWorkRequest) -> WorkResponse {
        Coordinator::get_work(self, &request.worker_id)
    }

    fn report_result(&self, request: &ReportRequest) -> ReportResponse {
        match Coordinator::report_result(self, request) {
            Ok(_) => ReportResponse::Ack,
            Err(e) => ReportResponse::rejected(e.reject_kind(), e.to_string()),
        }
    }
}
