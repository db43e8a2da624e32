//! Particle Swarm Optimization update engine
//!
//! Per particle `i` and dimension `d`, with fresh draws `r1, r2 ∈ [0, 1)`:
//!
//! ```text
//! v[i][d] = w·v[i][d] + c1·r1·(pbest[i][d] - x[i][d]) + c2·r2·(gbest[d] - x[i][d])
//! v[i][d] = clamp(v[i][d], -vmax, vmax)
//! x[i][d] = clamp(x[i][d] + v[i][d], min[d], max[d])
//! ```
//!
//! The position moves by the already clamped velocity. Given the same random
//! source and the same particle order the update is exactly replayable.

use alloc::vec;
use alloc::vec::Vec;

use rand_core::RngCore;
use serde::{Deserialize, Serialize};

use crate::swarm::{Particle, Swarm};
use crate::{Error, Result};

/// Closed search interval for one dimension
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Width of the interval
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn midpoint(&self) -> f64 {
        self.min + self.span() / 2.0
    }

    /// Clamp a coordinate into the interval
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Map `u ∈ [0, 1)` onto the interval
    pub fn sample(&self, u: f64) -> f64 {
        self.clamp(self.min + u * self.span())
    }

    fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }
}

/// Particle Swarm Optimization configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleSwarmConfig {
    /// Number of particles in the swarm
    pub num_particles: usize,
    /// Search interval per dimension; its length is the dimensionality
    pub bounds: Vec<Bounds>,
    /// Inertia weight (momentum)
    pub inertia: f64,
    /// Cognitive coefficient (attraction to personal best)
    pub cognitive: f64,
    /// Social coefficient (attraction to global best)
    pub social: f64,
    /// Maximum absolute velocity per dimension
    pub max_velocity: f64,
}

impl Default for ParticleSwarmConfig {
    fn default() -> Self {
        Self {
            num_particles: 10,
            bounds: vec![Bounds::new(0.0, 100.0); 2],
            inertia: 0.8,
            cognitive: 0.2,
            social: 0.6,
            max_velocity: 1.0,
        }
    }
}

impl ParticleSwarmConfig {
    /// Dimensionality of the search space
    pub fn dimensions(&self) -> usize {
        self.bounds.len()
    }

    /// Reject configurations the update engine cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.num_particles == 0 {
            return Err(Error::InvalidConfig("swarm needs at least one particle"));
        }
        if self.num_particles > u32::MAX as usize {
            return Err(Error::InvalidConfig("too many particles"));
        }
        if self.bounds.is_empty() {
            return Err(Error::InvalidConfig("search space needs at least one dimension"));
        }
        if !self.bounds.iter().all(Bounds::is_valid) {
            return Err(Error::InvalidConfig("bounds must be finite with min <= max"));
        }
        if !(self.max_velocity.is_finite() && self.max_velocity > 0.0) {
            return Err(Error::InvalidConfig("max velocity must be positive and finite"));
        }
        for coeff in [self.inertia, self.cognitive, self.social] {
            if !(coeff.is_finite() && coeff >= 0.0) {
                return Err(Error::InvalidConfig(
                    "coefficients must be non-negative and finite",
                ));
            }
        }
        Ok(())
    }
}

/// Uniform draw in `[0, 1)` from the top 53 bits of a `u64`
pub fn unit_interval<R: RngCore + ?Sized>(rng: &mut R) -> f64 {
    (rng.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
}

/// Advance one particle by a single PSO step.
///
/// Draws `r1` and `r2` independently for every dimension.
pub fn update_particle<R: RngCore + ?Sized>(
    particle: &mut Particle,
    global_best: &[f64],
    config: &ParticleSwarmConfig,
    rng: &mut R,
) -> Result<()> {
    let dim = config.dimensions();
    for found in [
        particle.position.len(),
        particle.velocity.len(),
        particle.best_position.len(),
        global_best.len(),
    ] {
        if found != dim {
            return Err(Error::DimensionMismatch {
                expected: dim,
                found,
            });
        }
    }

    let vmax = config.max_velocity;
    for (d, bounds) in config.bounds.iter().enumerate() {
        let r1 = unit_interval(rng);
        let r2 = unit_interval(rng);
        let x = particle.position[d];

        let v = config.inertia * particle.velocity[d]
            + config.cognitive * r1 * (particle.best_position[d] - x)
            + config.social * r2 * (global_best[d] - x);
        let v = v.clamp(-vmax, vmax);

        particle.velocity[d] = v;
        particle.position[d] = bounds.clamp(x + v);
    }
    Ok(())
}

/// Apply one PSO step to every particle in id order.
///
/// The global best is read once up front; it does not move during the update.
pub fn update_swarm<R: RngCore + ?Sized>(swarm: &mut Swarm, rng: &mut R) -> Result<()> {
    let global_best = swarm.global_best().position.clone();
    let (config, particles) = swarm.config_and_particles_mut();
    for particle in particles.iter_mut() {
        update_particle(particle, &global_best, config, rng)?;
    }
    Ok(())
}

/// Random initial positions and velocities for `config.num_particles` particles
pub fn initial_particles<R: RngCore + ?Sized>(
    config: &ParticleSwarmConfig,
    rng: &mut R,
) -> Vec<Particle> {
    let vmax = config.max_velocity;
    (0..config.num_particles)
        .map(|i| {
            let position: Vec<f64> = config
                .bounds
                .iter()
                .map(|b| b.sample(unit_interval(rng)))
                .collect();
            let velocity: Vec<f64> = config
                .bounds
                .iter()
                .map(|_| (unit_interval(rng) * 2.0 - 1.0) * vmax)
                .collect();
            Particle::new(crate::traits::ParticleId(i as u32), position, velocity)
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::traits::ParticleId;

    /// Every draw is exactly 0.5
    pub(crate) struct HalfRng;

    impl RngCore for HalfRng {
        fn next_u32(&mut self) -> u32 {
            1 << 31
        }

        fn next_u64(&mut self) -> u64 {
            1 << 63
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0x80);
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> core::result::Result<(), rand_core::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    fn one_dim(vmax: f64) -> ParticleSwarmConfig {
        ParticleSwarmConfig {
            num_particles: 1,
            bounds: vec![Bounds::new(-10.0, 10.0)],
            inertia: 0.5,
            cognitive: 1.0,
            social: 1.0,
            max_velocity: vmax,
        }
    }

    #[test]
    fn unit_interval_half() {
        assert_eq!(unit_interval(&mut HalfRng), 0.5);
    }

    #[test]
    fn velocity_update_matches_formula() {
        let config = one_dim(100.0);
        let mut p = Particle::new(ParticleId(0), vec![2.0], vec![1.0]);
        p.best_position = vec![4.0];

        update_particle(&mut p, &[6.0], &config, &mut HalfRng).unwrap();

        // 0.5*1 + 1*0.5*(4-2) + 1*0.5*(6-2) = 3.5
        assert!((p.velocity[0] - 3.5).abs() < 1e-12);
        assert!((p.position[0] - 5.5).abs() < 1e-12);
    }

    #[test]
    fn position_moves_by_clamped_velocity() {
        let config = one_dim(1.0);
        let mut p = Particle::new(ParticleId(0), vec![0.0], vec![0.0]);
        p.best_position = vec![8.0];

        update_particle(&mut p, &[8.0], &config, &mut HalfRng).unwrap();

        assert_eq!(p.velocity[0], 1.0);
        assert_eq!(p.position[0], 1.0);
    }

    #[test]
    fn position_clamped_to_bounds() {
        let config = one_dim(50.0);
        let mut p = Particle::new(ParticleId(0), vec![9.5], vec![20.0]);
        p.best_position = vec![9.5];

        update_particle(&mut p, &[9.5], &config, &mut HalfRng).unwrap();

        assert_eq!(p.velocity[0], 10.0);
        assert_eq!(p.position[0], 10.0);
    }

    #[test]
    fn stationary_particle_moves_toward_target() {
        let config = one_dim(5.0);
        let mut p = Particle::new(ParticleId(0), vec![-6.0], vec![0.0]);
        p.best_position = vec![-6.0];

        let before = (p.position[0] - 3.0_f64).abs();
        update_particle(&mut p, &[3.0], &config, &mut HalfRng).unwrap();
        let after = (p.position[0] - 3.0_f64).abs();

        assert!(after < before);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let config = one_dim(1.0);
        let mut p = Particle::new(ParticleId(0), vec![0.0, 0.0], vec![0.0, 0.0]);
        let err = update_particle(&mut p, &[0.0], &config, &mut HalfRng).unwrap_err();
        assert_eq!(
            err,
            Error::DimensionMismatch {
                expected: 1,
                found: 2
            }
        );
    }

    #[test]
    fn validate_rejects_bad_configs() {
        let mut config = ParticleSwarmConfig::default();
        assert!(config.validate().is_ok());

        config.num_particles = 0;
        assert!(config.validate().is_err());

        let mut config = ParticleSwarmConfig::default();
        config.bounds = vec![Bounds::new(5.0, 1.0)];
        assert!(config.validate().is_err());

        let mut config = ParticleSwarmConfig::default();
        config.max_velocity = 0.0;
        assert!(config.validate().is_err());

        let mut config = ParticleSwarmConfig::default();
        config.social = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn initial_particles_within_bounds() {
        use rand::SeedableRng;
        let config = ParticleSwarmConfig::default();
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let particles = initial_particles(&config, &mut rng);

        assert_eq!(particles.len(), config.num_particles);
        for p in &particles {
            assert_eq!(p.best_position, p.position);
            assert!(p.best_score.is_infinite());
            for (x, b) in p.position.iter().zip(&config.bounds) {
                assert!(b.contains(*x));
            }
            for v in &p.velocity {
                assert!(v.abs() <= config.max_velocity);
            }
        }
    }
}
