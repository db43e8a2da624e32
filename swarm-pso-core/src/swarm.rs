//! Swarm state
//!
//! The canonical model of every particle plus the global best. The
//! coordinator owns exactly one [`Swarm`] and is its only writer.

use alloc::vec::Vec;

use rand_core::RngCore;
use serde::{Deserialize, Serialize};

use crate::algorithms::{self, ParticleSwarmConfig};
use crate::traits::ParticleId;
use crate::{Error, Result};

/// Evaluation status of a particle within the current iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticleStatus {
    /// Waiting to be dispatched
    Pending,
    /// Handed to a worker, score not yet reported
    Assigned,
    /// Score recorded for this iteration
    Done,
}

/// Particle state in PSO
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub id: ParticleId,
    /// Current position (parameters)
    pub position: Vec<f64>,
    /// Current velocity
    pub velocity: Vec<f64>,
    /// Personal best position
    pub best_position: Vec<f64>,
    /// Personal best score (lower is better)
    pub best_score: f64,
    pub status: ParticleStatus,
}

impl Particle {
    /// A fresh particle whose personal best is its starting position
    pub fn new(id: ParticleId, position: Vec<f64>, velocity: Vec<f64>) -> Self {
        Self {
            id,
            best_position: position.clone(),
            position,
            velocity,
            best_score: f64::INFINITY,
            status: ParticleStatus::Pending,
        }
    }

    /// Record a score for the current position.
    ///
    /// Only a strictly lower score replaces the personal best; ties keep the
    /// earlier position.
    pub fn record(&mut self, score: f64) -> bool {
        if score < self.best_score {
            self.best_score = score;
            self.best_position.clone_from(&self.position);
            true
        } else {
            false
        }
    }
}

/// Best score seen across the whole swarm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalBest {
    pub position: Vec<f64>,
    pub score: f64,
    /// Particle that holds the best, `None` until a finite score arrives
    pub particle: Option<ParticleId>,
}

/// Which bests a recorded score improved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoreUpdate {
    pub personal_best: bool,
    pub global_best: bool,
}

/// Swarm of particles plus shared best information and coefficients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Swarm {
    config: ParticleSwarmConfig,
    particles: Vec<Particle>,
    global_best: GlobalBest,
    iteration: u64,
}

impl Swarm {
    /// Build a swarm with random positions and velocities inside the bounds
    pub fn new<R: RngCore + ?Sized>(config: ParticleSwarmConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;
        let particles = algorithms::initial_particles(&config, rng);
        Self::from_particles(config, particles)
    }

    /// Build a swarm from explicit starting particles.
    ///
    /// Ids are reassigned to match each particle's index; positions are
    /// clamped into the bounds and velocities into `±max_velocity`.
    pub fn from_particles(config: ParticleSwarmConfig, mut particles: Vec<Particle>) -> Result<Self> {
        config.validate()?;
        if particles.len() != config.num_particles {
            return Err(Error::InvalidConfig("particle count does not match configuration"));
        }
        let dim = config.dimensions();
        let vmax = config.max_velocity;
        for (i, p) in particles.iter_mut().enumerate() {
            for found in [p.position.len(), p.velocity.len(), p.best_position.len()] {
                if found != dim {
                    return Err(Error::DimensionMismatch {
                        expected: dim,
                        found,
                    });
                }
            }
            p.id = ParticleId(i as u32);
            p.status = ParticleStatus::Pending;
            for (x, b) in p.position.iter_mut().zip(&config.bounds) {
                *x = b.clamp(*x);
            }
            for v in p.velocity.iter_mut() {
                *v = v.clamp(-vmax, vmax);
            }
        }

        let global_best = GlobalBest {
            position: config.bounds.iter().map(|b| b.midpoint()).collect(),
            score: f64::INFINITY,
            particle: None,
        };

        Ok(Self {
            config,
            particles,
            global_best,
            iteration: 0,
        })
    }

    pub fn config(&self) -> &ParticleSwarmConfig {
        &self.config
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn global_best(&self) -> &GlobalBest {
        &self.global_best
    }

    /// Completed iterations so far
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn particle(&self, id: ParticleId) -> Result<&Particle> {
        self.particles
            .get(id.index())
            .ok_or(Error::UnknownParticle(id))
    }

    fn particle_mut(&mut self, id: ParticleId) -> Result<&mut Particle> {
        self.particles
            .get_mut(id.index())
            .ok_or(Error::UnknownParticle(id))
    }

    pub(crate) fn config_and_particles_mut(&mut self) -> (&ParticleSwarmConfig, &mut [Particle]) {
        (&self.config, &mut self.particles)
    }

    pub fn set_status(&mut self, id: ParticleId, status: ParticleStatus) -> Result<()> {
        self.particle_mut(id)?.status = status;
        Ok(())
    }

    /// Record a reported score, updating personal and global bests on strict
    /// improvement, and mark the particle `Done`.
    pub fn record_score(&mut self, id: ParticleId, score: f64) -> Result<ScoreUpdate> {
        let particle = self.particle_mut(id)?;
        particle.status = ParticleStatus::Done;
        if !particle.record(score) {
            return Ok(ScoreUpdate::default());
        }

        let mut update = ScoreUpdate {
            personal_best: true,
            global_best: false,
        };
        if score < self.global_best.score {
            let position = self.particle(id)?.best_position.clone();
            self.global_best.position = position;
            self.global_best.score = score;
            self.global_best.particle = Some(id);
            update.global_best = true;
        }
        Ok(update)
    }

    /// True once every particle has a score for this iteration
    pub fn all_done(&self) -> bool {
        self.particles
            .iter()
            .all(|p| p.status == ParticleStatus::Done)
    }

    /// Run the update engine, bump the iteration counter and reset every
    /// particle to `Pending`.
    pub fn advance<R: RngCore + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        if !self.all_done() {
            return Err(Error::InvariantViolation(
                "swarm advanced before every particle was scored",
            ));
        }
        algorithms::update_swarm(self, rng)?;
        self.iteration += 1;
        for p in self.particles.iter_mut() {
            p.status = ParticleStatus::Pending;
        }
        Ok(())
    }

    /// Verify the best-score and clamping invariants.
    pub fn check_invariants(&self) -> Result<()> {
        let vmax = self.config.max_velocity;
        let mut min_personal = f64::INFINITY;
        for p in &self.particles {
            if p.velocity.iter().any(|v| !(*v >= -vmax && *v <= vmax)) {
                return Err(Error::InvariantViolation("velocity outside ±max_velocity"));
            }
            if p
                .position
                .iter()
                .zip(&self.config.bounds)
                .any(|(x, b)| !b.contains(*x))
            {
                return Err(Error::InvariantViolation("position outside bounds"));
            }
            if p.best_score < min_personal {
                min_personal = p.best_score;
            }
        }
        if min_personal != self.global_best.score {
            return Err(Error::InvariantViolation(
                "global best differs from the minimum personal best",
            ));
        }
        Ok(())
    }
}
