//! Reference objective functions
//!
//! Lower is better for every objective here. Each one rejects a parameter
//! vector of the wrong length instead of silently truncating it.

use serde::{Deserialize, Serialize};
use swarm_pso_core::traits::{EvaluationError, Evaluator};

fn check_len(expected: usize, params: &[f64]) -> Result<(), EvaluationError> {
    if params.len() != expected {
        return Err(EvaluationError::failed(format!(
            "expected {expected} parameters, got {}",
            params.len()
        )));
    }
    Ok(())
}

/// Euclidean distance from a fixed target point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceToTarget {
    pub target: Vec<f64>,
}

impl DistanceToTarget {
    pub fn new(target: Vec<f64>) -> Self {
        Self { target }
    }
}

impl Evaluator for DistanceToTarget {
    fn evaluate(&mut self, params: &[f64]) -> Result<f64, EvaluationError> {
        check_len(self.target.len(), params)?;
        let squared: f64 = params
            .iter()
            .zip(&self.target)
            .map(|(x, t)| (x - t) * (x - t))
            .sum();
        Ok(squared.sqrt())
    }
}

/// Sum of squares, minimum 0 at the origin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub dimensions: usize,
}

impl Sphere {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Evaluator for Sphere {
    fn evaluate(&mut self, params: &[f64]) -> Result<f64, EvaluationError> {
        check_len(self.dimensions, params)?;
        Ok(params.iter().map(|x| x * x).sum())
    }
}

/// Rastrigin function: `A·n + Σ (x² - A·cos(2πx))`, minimum 0 at the origin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rastrigin {
    pub dimensions: usize,
    pub a: f64,
}

impl Rastrigin {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions, a: 10.0 }
    }
}

impl Evaluator for Rastrigin {
    fn evaluate(&mut self, params: &[f64]) -> Result<f64, EvaluationError> {
        check_len(self.dimensions, params)?;
        let a = self.a;
        let sum: f64 = params
            .iter()
            .map(|x| x * x - a * (2.0 * std::f64::consts::PI * x).cos())
            .sum();
        Ok(a * self.dimensions as f64 + sum)
    }
}

/// Adapter turning a closure into an [`Evaluator`]
pub struct FnEvaluator<F> {
    f: F,
}

impl<F> FnEvaluator<F>
where
    F: FnMut(&[f64]) -> Result<f64, EvaluationError> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> core::fmt::Debug for FnEvaluator<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FnEvaluator").finish_non_exhaustive()
    }
}

impl<F> Evaluator for FnEvaluator<F>
where
    F: FnMut(&[f64]) -> Result<f64, EvaluationError> + Send,
{
    fn evaluate(&mut self, params: &[f64]) -> Result<f64, EvaluationError> {
        (self.f)(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_to_target() {
        let mut gold = DistanceToTarget::new(vec![3.0, 4.0]);
        assert_eq!(gold.evaluate(&[0.0, 0.0]), Ok(5.0));
        assert_eq!(gold.evaluate(&[3.0, 4.0]), Ok(0.0));
        assert!(gold.evaluate(&[1.0]).is_err());
    }

    #[test]
    fn sphere_and_rastrigin_minimum_at_origin() {
        assert_eq!(Sphere::new(3).evaluate(&[0.0; 3]), Ok(0.0));
        assert_eq!(Sphere::new(2).evaluate(&[1.0, -2.0]), Ok(5.0));

        let mut r = Rastrigin::new(2);
        assert!(r.evaluate(&[0.0, 0.0]).unwrap().abs() < 1e-12);
        assert!(r.evaluate(&[0.5, 0.5]).unwrap() > 1.0);
    }

    #[test]
    fn closure_keeps_state() {
        let mut calls = 0;
        let mut eval = FnEvaluator::new(move |p: &[f64]| {
            calls += 1;
            Ok(p[0] + calls as f64)
        });
        assert_eq!(eval.evaluate(&[1.0]), Ok(2.0));
        assert_eq!(eval.evaluate(&[1.0]), Ok(3.0));
        assert_eq!(eval.cleanup(), Ok(()));
    }

    #[test]
    fn distance_target_deserializes() {
        let gold: DistanceToTarget = serde_json::from_str(r#"{"target":[1.0,2.0]}"#).unwrap();
        assert_eq!(gold.target, vec![1.0, 2.0]);
    }
}
