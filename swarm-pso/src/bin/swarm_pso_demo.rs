//! Find the gold: a 2-D swarm hunts a randomly placed target.
//!
//! Usage: `swarm_pso_demo [config.json] [report.json]`

use std::path::PathBuf;
use std::process::ExitCode;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use swarm_pso::evaluators::objectives::DistanceToTarget;
use swarm_pso::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn usage() -> ExitCode {
    eprintln!("Usage: swarm_pso_demo [config.json] [report.json]");
    ExitCode::from(2)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().map(PathBuf::from);
    let report_path = args.next().map(PathBuf::from);
    if args.next().is_some() {
        return usage();
    }

    let config = match &config_path {
        Some(path) => match PsoConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!(path = %path.display(), error = %e, "cannot load configuration");
                return ExitCode::FAILURE;
            }
        },
        None => PsoConfig::default(),
    };

    let mut rng = match config.random_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let gold: Vec<f64> = config
        .bounds
        .iter()
        .map(|b| b.sample(rng.gen::<f64>()))
        .collect();
    info!(target_point = ?gold, "gold buried");

    let swarm = match LocalSwarm::start(config.clone(), TokioRuntime::new(), |_| {
        DistanceToTarget::new(gold.clone())
    }) {
        Ok(swarm) => swarm,
        Err(e) => {
            error!(error = %e, "cannot start swarm");
            return ExitCode::FAILURE;
        }
    };

    let coordinator = std::sync::Arc::clone(swarm.coordinator());
    let drain = config.drain_timeout();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, shutting down");
            if let Err(e) = coordinator.shutdown(drain).await {
                error!(error = %e, "shutdown failed");
            }
        }
    });

    let report = match swarm.wait().await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "run failed");
            return ExitCode::FAILURE;
        }
    };
    interrupt.abort();

    println!("gold at {gold:?}");
    print!("{}", report.render_text());

    if let Some(path) = report_path {
        if let Err(e) = report.write_json(&path) {
            error!(path = %path.display(), error = %e, "cannot write report");
            return ExitCode::FAILURE;
        }
        info!(path = %path.display(), "report written");
    }
    ExitCode::SUCCESS
}
