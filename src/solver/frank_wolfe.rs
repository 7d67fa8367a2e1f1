//! Bounded conditional-gradient (Frank-Wolfe) extraction.
//!
//! Approximates `min_{mu in M} D(mu || theta)` without solving the projection
//! exactly. Each round asks a linear oracle for the vertex of `M` minimising
//! `<grad, z>`, contracts it toward an interior point `u`, and steps toward it:
//!
//! ```text
//! s_t     = (1 - eps_t) * z_t + eps_t * u
//! mu_t+1  = mu_t + gamma_t * (s_t - mu_t),   gamma_t = min(alpha, 2 / (t + 2))
//! gap_t   = <grad_t, mu_t - s_t>
//! ```
//!
//! The contraction keeps iterates away from the boundary where the KL gradient
//! blows up. `eps_t` shrinks as the gap closes.

use tracing::{debug, instrument};

use super::bregman::{kl_divergence, kl_gradient};
use super::constraints::LinearConstraints;
use crate::config::ExtractionConfig;
use crate::error::SolverError;

/// Vertex of the feasible polytope minimising `<gradient, z>`.
///
/// When the constraints are disjoint unit-sum groups the polytope is a product
/// of simplices: each group picks its smallest-gradient coordinate, and an
/// ungrouped coordinate is 1 when its gradient is negative and 0 otherwise.
/// Any other system falls back to the standard basis vector at the global
/// minimum. Ties go to the lowest index. Empty input yields an empty vertex.
pub fn extraction_oracle(gradient: &[f64], constraints: &LinearConstraints) -> Vec<f64> {
    if gradient.is_empty() {
        return vec![];
    }

    match constraints.unit_sum_groups() {
        Some(groups) if constraints.dimension() == gradient.len() => {
            let mut vertex: Vec<f64> = gradient
                .iter()
                .map(|&g| if g < 0.0 { 1.0 } else { 0.0 })
                .collect();

            for group in &groups {
                for &i in group {
                    vertex[i] = 0.0;
                }
                if let Some(best) = argmin(group.iter().map(|&i| (i, gradient[i]))) {
                    vertex[best] = 1.0;
                }
            }

            vertex
        }
        _ => simplex_vertex(gradient),
    }
}

/// Standard basis vector at the smallest gradient entry.
pub fn simplex_vertex(gradient: &[f64]) -> Vec<f64> {
    let mut vertex = vec![0.0; gradient.len()];
    if let Some(best) = argmin(gradient.iter().copied().enumerate()) {
        vertex[best] = 1.0;
    }
    vertex
}

fn argmin(values: impl Iterator<Item = (usize, f64)>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, v) in values {
        match best {
            Some((_, current)) if v >= current => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Outcome of an extraction run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    /// Final iterate.
    pub mu: Vec<f64>,
    /// `D(mu || theta)` at the final iterate.
    pub divergence: f64,
    /// `D(u || theta)` at the interior starting point.
    pub initial_divergence: f64,
    /// Last Frank-Wolfe gap `<grad, mu - s>` against the contracted vertex.
    pub gap: f64,
    /// Rounds executed.
    pub iterations: usize,
    /// Whether the gap fell below the threshold.
    pub converged: bool,
    /// Contraction toward the interior point at exit.
    pub contraction: f64,
}

impl ExtractionResult {
    /// Share of the achievable divergence reduction obtained so far.
    ///
    /// `optimum` is the divergence at the exact projection. Clamped to `[0, 1]`;
    /// a start that is already optimal counts as fully extracted.
    pub fn progress(&self, optimum: f64) -> f64 {
        let achievable = self.initial_divergence - optimum;
        if achievable <= f64::EPSILON {
            return 1.0;
        }
        ((self.initial_divergence - self.divergence) / achievable).clamp(0.0, 1.0)
    }
}

/// Runs the bounded extraction loop.
#[derive(Debug, Clone, Default)]
pub struct ExtractionEngine {
    config: ExtractionConfig,
}

impl ExtractionEngine {
    /// Create an engine with the given configuration.
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// Return the current configuration.
    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Interior point: the average of the vertices maximising each coordinate.
    pub fn interior_point(&self, constraints: &LinearConstraints) -> Vec<f64> {
        let n = constraints.dimension();
        let mut u = vec![0.0; n];
        if n == 0 {
            return u;
        }

        for i in 0..n {
            let mut direction = vec![0.0; n];
            direction[i] = -1.0;
            for (acc, v) in u.iter_mut().zip(extraction_oracle(&direction, constraints)) {
                *acc += v;
            }
        }

        let scale = 1.0 / n as f64;
        u.iter_mut().for_each(|v| *v *= scale);
        u
    }

    /// Run the loop from the interior point.
    #[instrument(skip_all, fields(n = theta.len()))]
    pub fn run(
        &self,
        theta: &[f64],
        constraints: &LinearConstraints,
    ) -> Result<ExtractionResult, SolverError> {
        if constraints.dimension() != theta.len() {
            return Err(SolverError::DimensionMismatch {
                what: "constraint columns",
                expected: theta.len(),
                actual: constraints.dimension(),
            });
        }

        let eps = self.config.box_epsilon;
        let u = self.interior_point(constraints);
        let initial_divergence = kl_divergence(&u, theta, eps);

        let mut mu = u.clone();
        let mut contraction = self.config.initial_epsilon;
        let mut gap = 0.0;
        let mut iterations = 0;
        let mut converged = theta.is_empty();

        while !converged && iterations < self.config.max_iterations {
            let t = iterations;
            iterations += 1;

            let grad = kl_gradient(&mu, theta, eps);
            let z = extraction_oracle(&grad, constraints);

            gap = dot(&grad, &mu, &contract(&z, &u, contraction));
            if gap <= self.config.convergence_threshold {
                converged = true;
                break;
            }

            let toward_interior = dot(&grad, &u, &mu);
            if toward_interior < 0.0 {
                let bound = gap / (-4.0 * toward_interior);
                if bound < contraction {
                    contraction = bound.min(contraction / 2.0);
                }
            }

            let gamma = self.config.alpha.min(2.0 / (t as f64 + 2.0));
            let s = contract(&z, &u, contraction);
            for (m, si) in mu.iter_mut().zip(s) {
                *m += gamma * (si - *m);
            }
        }

        let divergence = kl_divergence(&mu, theta, eps);
        debug!(iterations, gap, converged, divergence, contraction, "Extraction finished");

        Ok(ExtractionResult {
            mu,
            divergence,
            initial_divergence,
            gap,
            iterations,
            converged,
            contraction,
        })
    }
}

/// `(1 - eps) * z + eps * u`.
fn contract(z: &[f64], u: &[f64], eps: f64) -> Vec<f64> {
    z.iter()
        .zip(u)
        .map(|(zi, ui)| (1.0 - eps) * zi + eps * ui)
        .collect()
}

/// `<grad, a - b>`.
fn dot(grad: &[f64], a: &[f64], b: &[f64]) -> f64 {
    grad.iter()
        .zip(a.iter().zip(b))
        .map(|(g, (x, y))| g * (x - y))
        .sum()
}
