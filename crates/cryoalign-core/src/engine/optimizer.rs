//! # Local Optimizer
//!
//! A Nelder-Mead downhill simplex minimizer over `nalgebra` vectors, and the
//! search bounds that alignment objectives enforce inside their scoring calls.
//!
//! ## Algorithm
//!
//! Standard coefficients are used: reflection 1, expansion 2, contraction ½ and
//! shrink ½. The search stops when the spread of the simplex values is within
//! `f_tolerance` *and* every vertex lies within `x_tolerance` of the best one, or
//! when `max_iterations` iterations have run. Non-finite objective values are
//! treated as `+∞`, so a vertex that produced NaN is always replaced first.

use super::config::OptimizerConfig;
use crate::core::geometry::transform::RigidTransform;
use nalgebra::DVector;

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub point: DVector<f64>,
    pub value: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub converged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NelderMead {
    pub max_iterations: usize,
    pub f_tolerance: f64,
    pub x_tolerance: f64,
}

impl From<&OptimizerConfig> for NelderMead {
    fn from(config: &OptimizerConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            f_tolerance: config.f_tolerance,
            x_tolerance: config.x_tolerance,
        }
    }
}

/// `[x0, x0 + steps[0]·e0, x0 + steps[1]·e1, …]`.
pub fn axis_simplex(x0: &DVector<f64>, steps: &[f64]) -> Vec<DVector<f64>> {
    let mut simplex = Vec::with_capacity(x0.len() + 1);
    simplex.push(x0.clone());
    for i in 0..x0.len() {
        let mut vertex = x0.clone();
        vertex[i] += steps.get(i).copied().unwrap_or(1.0);
        simplex.push(vertex);
    }
    simplex
}

struct Counted<F> {
    f: F,
    evaluations: usize,
}

impl<F: FnMut(&DVector<f64>) -> f64> Counted<F> {
    fn eval(&mut self, x: &DVector<f64>) -> f64 {
        self.evaluations += 1;
        let value = (self.f)(x);
        if value.is_finite() {
            value
        } else {
            f64::INFINITY
        }
    }
}

impl NelderMead {
    pub fn minimize<F>(&self, f: F, simplex: Vec<DVector<f64>>) -> Minimum
    where
        F: FnMut(&DVector<f64>) -> f64,
    {
        let mut objective = Counted { f, evaluations: 0 };
        let mut vertices: Vec<(DVector<f64>, f64)> = simplex
            .into_iter()
            .map(|x| {
                let value = objective.eval(&x);
                (x, value)
            })
            .collect();

        if vertices.len() < 2 {
            let (point, value) = vertices
                .pop()
                .unwrap_or_else(|| (DVector::zeros(0), f64::INFINITY));
            return Minimum {
                point,
                value,
                iterations: 0,
                evaluations: objective.evaluations,
                converged: true,
            };
        }

        let n = vertices.len() - 1;
        let mut iterations = 0;
        let mut converged = false;

        loop {
            vertices.sort_by(|a, b| a.1.total_cmp(&b.1));
            if self.has_converged(&vertices) {
                converged = true;
                break;
            }
            if iterations >= self.max_iterations {
                break;
            }
            iterations += 1;

            let centroid = vertices[..n]
                .iter()
                .fold(DVector::zeros(vertices[0].0.len()), |acc, (x, _)| acc + x)
                / n as f64;
            let (worst, f_worst) = vertices[n].clone();
            let f_best = vertices[0].1;
            let f_second_worst = vertices[n - 1].1;

            let reflected = &centroid + (&centroid - &worst) * REFLECTION;
            let f_reflected = objective.eval(&reflected);

            if f_reflected < f_best {
                let expanded = &centroid + (&reflected - &centroid) * EXPANSION;
                let f_expanded = objective.eval(&expanded);
                vertices[n] = if f_expanded < f_reflected {
                    (expanded, f_expanded)
                } else {
                    (reflected, f_reflected)
                };
                continue;
            }
            if f_reflected < f_second_worst {
                vertices[n] = (reflected, f_reflected);
                continue;
            }

            let contracted = if f_reflected < f_worst {
                let outside = &centroid + (&reflected - &centroid) * CONTRACTION;
                let f_outside = objective.eval(&outside);
                (f_outside <= f_reflected).then_some((outside, f_outside))
            } else {
                let inside = &centroid + (&worst - &centroid) * CONTRACTION;
                let f_inside = objective.eval(&inside);
                (f_inside < f_worst).then_some((inside, f_inside))
            };

            match contracted {
                Some(vertex) => vertices[n] = vertex,
                None => {
                    let best = vertices[0].0.clone();
                    for vertex in vertices.iter_mut().skip(1) {
                        let shrunk = &best + (&vertex.0 - &best) * SHRINK;
                        let value = objective.eval(&shrunk);
                        *vertex = (shrunk, value);
                    }
                }
            }
        }

        let (point, value) = vertices.swap_remove(0);
        Minimum {
            point,
            value,
            iterations,
            evaluations: objective.evaluations,
            converged,
        }
    }

    fn has_converged(&self, sorted: &[(DVector<f64>, f64)]) -> bool {
        let (best, f_best) = &sorted[0];
        let f_spread = sorted[1..]
            .iter()
            .map(|(_, f)| (f - f_best).abs())
            .fold(0.0, f64::max);
        let x_spread = sorted[1..]
            .iter()
            .map(|(x, _)| (x - best).amax())
            .fold(0.0, f64::max);
        f_spread <= self.f_tolerance && x_spread <= self.x_tolerance
    }
}

/// Hard limits checked inside an alignment objective.
///
/// With an `origin`, limits apply to the relative transform `origin⁻¹ ∘ candidate`;
/// without one, to the candidate itself. Both must be expressed in the same box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchBounds {
    pub max_shift: Option<f64>,
    pub max_angle: Option<f64>,
    pub origin: Option<RigidTransform>,
}

impl SearchBounds {
    pub fn unbounded() -> Self {
        Self {
            max_shift: None,
            max_angle: None,
            origin: None,
        }
    }

    pub fn admits(&self, candidate: &RigidTransform) -> bool {
        let relative = match &self.origin {
            Some(origin) => origin.inverse().compose(candidate),
            None => *candidate,
        };
        let shift_ok = self
            .max_shift
            .is_none_or(|limit| relative.translation().norm() <= limit);
        let angle_ok = match (self.max_angle, self.origin.is_some()) {
            (Some(limit), true) => relative.rotation_angle() <= limit,
            _ => true,
        };
        shift_ok && angle_ok
    }
}
