//! End-to-end runs: workers, coordinator and evaluators together

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use swarm_pso::core::swarm::{Particle, Swarm};
use swarm_pso::coordinator::{Coordinator, Phase, ReportOutcome, StopReason};
use swarm_pso::evaluators::objectives::{DistanceToTarget, Sphere};
use swarm_pso::net::prelude::*;
use swarm_pso::runtime::mock_runtime::MockRuntime;
use swarm_pso::runtime::SwarmRuntime;
use swarm_pso::{
    run_local, Bounds, CleanupError, EvaluationError, Evaluator, LocalSwarm, ParticleId,
    PsoConfig, RunOutcome, Worker, WorkerConfig, WorkerId,
};

fn one_dim(particles: usize) -> swarm_pso::PsoConfigBuilder {
    PsoConfig::builder()
        .particle_count(particles)
        .bounds(vec![Bounds::new(-10.0, 10.0)])
        .coefficients(0.6, 1.2, 1.2)
        .velocity_max(2.0)
        .worker_backoff(Duration::from_millis(5), Duration::from_millis(50))
        .random_seed(2024)
}

/// Drive a coordinator to the end with a single in-line evaluator
fn drive<E: Evaluator>(coord: &Coordinator<MockRuntime>, evaluator: &mut E) {
    let worker = WorkerId::new("inline");
    loop {
        match coord.get_work(&worker) {
            WorkResponse::Work(item) => {
                let score = evaluator.evaluate(&item.params).unwrap();
                coord
                    .report_result(&ReportRequest {
                        worker_id: worker.clone(),
                        particle_id: item.particle_id,
                        iteration: item.iteration,
                        score,
                    })
                    .unwrap();
            }
            WorkResponse::Wait { .. } => panic!("single worker should never wait"),
            WorkResponse::Stop => return,
        }
    }
}

#[test]
fn distance_to_target_converges_near_zero() {
    let config = one_dim(6)
        .iteration_cap(200)
        .convergence(1e-12, 40)
        .build()
        .unwrap();
    // a lone particle at rest never moves: its personal and global best are
    // its own position, so both attraction terms vanish. Six particles spread
    // across the range give the swarm something to pull towards.
    let particles = [-8.0, -5.0, -1.0, 2.0, 6.0, 9.0]
        .iter()
        .map(|x| Particle::new(ParticleId(0), vec![*x], vec![0.0]))
        .collect();
    let swarm = Swarm::from_particles(config.swarm_config(), particles).unwrap();
    let coord = Coordinator::with_swarm(config, swarm, MockRuntime::new()).unwrap();

    drive(&coord, &mut DistanceToTarget::new(vec![3.0]));

    let report = coord.report().unwrap();
    let best = report.best_score.unwrap();
    assert!(best < 0.05, "global best {best} not near the target");
    assert!((report.best_position[0] - 3.0).abs() < 0.05);
    assert!(report.iterations > 1);
}

#[test]
fn global_best_never_increases() {
    let config = one_dim(5).iteration_cap(40).convergence(0.0, 40).build().unwrap();
    let coord = Coordinator::new(config, MockRuntime::new()).unwrap();
    drive(&coord, &mut Sphere::new(1));

    let history: Vec<f64> = coord
        .report()
        .unwrap()
        .history
        .into_iter()
        .map(|s| s.unwrap())
        .collect();
    assert_eq!(history.len(), 40);
    assert!(history.windows(2).all(|w| w[1] <= w[0]), "{history:?}");
    coord.swarm().unwrap().check_invariants().unwrap();
}

#[test]
fn cap_reached_stops_the_run() {
    // zero epsilon: a flat objective never counts as stagnant
    let config = one_dim(2).iteration_cap(3).convergence(0.0, 1).build().unwrap();
    let coord = Coordinator::new(config, MockRuntime::new()).unwrap();
    let worker = WorkerId::new("w");

    let mut last = None;
    for _ in 0..6 {
        let item = match coord.get_work(&worker) {
            WorkResponse::Work(item) => item,
            other => panic!("expected work, got {other:?}"),
        };
        last = Some(
            coord
                .report_result(&ReportRequest {
                    worker_id: worker.clone(),
                    particle_id: item.particle_id,
                    iteration: item.iteration,
                    score: 7.0,
                })
                .unwrap(),
        );
    }
    assert_eq!(
        last,
        Some(ReportOutcome::IterationComplete {
            global_best_improved: false,
            phase: Phase::Stopped(StopReason::IterationCap)
        })
    );
    for _ in 0..3 {
        assert_eq!(coord.get_work(&worker), WorkResponse::Stop);
        assert_eq!(coord.get_work(&WorkerId::new("late")), WorkResponse::Stop);
    }
    assert_eq!(coord.report().unwrap().outcome, RunOutcome::IterationCap);
    assert_eq!(coord.report().unwrap().iterations, 3);
}

/// Fails its first evaluation; counts cleanups
struct FailsOnce {
    calls: u32,
    cleanups: Arc<AtomicU32>,
}

impl Evaluator for FailsOnce {
    fn evaluate(&mut self, params: &[f64]) -> Result<f64, EvaluationError> {
        self.calls += 1;
        if self.calls == 1 {
            return Err(EvaluationError::failed("first run always fails"));
        }
        Ok(params[0].abs())
    }

    fn cleanup(&mut self) -> Result<(), CleanupError> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn failed_evaluation_is_cleaned_up_and_reissued() {
    let config = one_dim(1)
        .iteration_cap(1)
        .work_item_deadline(Duration::from_millis(100))
        .build()
        .unwrap();
    let runtime = MockRuntime::new();
    let coord = Arc::new(Coordinator::new(config.clone(), runtime.clone()).unwrap());
    let cleanups = Arc::new(AtomicU32::new(0));

    let worker = Worker::new(
        WorkerId::new("w"),
        LocalClient::new(Arc::clone(&coord)),
        FailsOnce {
            calls: 0,
            cleanups: Arc::clone(&cleanups),
        },
        runtime.clone(),
        WorkerConfig::from_pso(&config).with_jitter_seed(1),
    );
    let summary = worker.run().await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.reported, 1);
    assert!(summary.waits >= 1);
    assert_eq!(cleanups.load(Ordering::SeqCst), 2);
    // the waits pushed the mock clock past the deadline
    assert!(runtime.now() >= 100);

    let report = coord.report().unwrap();
    assert_eq!(report.reissued, 1);
    assert_eq!(report.outcome, RunOutcome::IterationCap);
}

#[tokio::test]
async fn silent_worker_item_goes_to_a_second_worker() {
    let config = one_dim(1)
        .iteration_cap(1)
        .work_item_deadline(Duration::from_millis(500))
        .build()
        .unwrap();
    let runtime = MockRuntime::new();
    let coord = Arc::new(Coordinator::new(config.clone(), runtime.clone()).unwrap());

    // takes the only item and never answers
    let silent = WorkerId::new("silent");
    let lost = match coord.get_work(&silent) {
        WorkResponse::Work(item) => item,
        other => panic!("expected work, got {other:?}"),
    };

    let summary = Worker::new(
        WorkerId::new("diligent"),
        LocalClient::new(Arc::clone(&coord)),
        Sphere::new(1),
        runtime.clone(),
        WorkerConfig::from_pso(&config).with_jitter_seed(3),
    )
    .run()
    .await;

    assert_eq!(summary.reported, 1);
    assert!(summary.waits >= 1);
    let swarm = coord.swarm().unwrap();
    assert_eq!(swarm.global_best().particle, Some(lost.particle_id));
    assert_eq!(coord.report().unwrap().reissued, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn local_swarm_minimises_sphere() {
    let config = PsoConfig::builder()
        .particle_count(12)
        .bounds(vec![Bounds::new(-5.0, 5.0); 2])
        .coefficients(0.6, 1.4, 1.4)
        .velocity_max(1.0)
        .iteration_cap(40)
        .convergence(1e-9, 40)
        .worker_backoff(Duration::from_millis(1), Duration::from_millis(5))
        .worker_count(3)
        .random_seed(5)
        .build()
        .unwrap();

    let report = run_local(config, |_| Sphere::new(2)).await.unwrap();

    assert!(matches!(
        report.outcome,
        RunOutcome::Converged | RunOutcome::IterationCap
    ));
    assert_eq!(report.workers.len(), 3);
    assert!(report.workers.iter().all(|w| !w.disconnected));
    let reported: u64 = report.workers.iter().map(|w| w.reported).sum();
    assert!(reported >= report.iterations * 12);
    let history: Vec<f64> = report.history.iter().map(|s| s.unwrap()).collect();
    assert!(history.windows(2).all(|w| w[1] <= w[0]));
    assert_eq!(report.best_score, history.last().copied());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn local_swarm_shuts_down_on_request() {
    let config = PsoConfig::builder()
        .particle_count(4)
        .bounds(vec![Bounds::new(-1.0, 1.0)])
        .iteration_cap(1_000_000)
        .convergence(0.0, 1_000)
        .worker_backoff(Duration::from_millis(1), Duration::from_millis(5))
        .worker_count(2)
        .build()
        .unwrap();

    let swarm = LocalSwarm::start(config, swarm_pso::runtime::tokio_runtime::TokioRuntime::new(), |_| {
        swarm_pso::evaluators::objectives::FnEvaluator::new(|p: &[f64]| {
            std::thread::sleep(Duration::from_millis(1));
            Ok(p[0] * p[0])
        })
    })
    .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let abandoned = swarm
        .coordinator()
        .shutdown(Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(abandoned, 0);

    let report = swarm.wait().await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Shutdown);
    assert!(report.iterations > 0);
    assert!(report.workers.iter().all(|w| !w.disconnected));
}
