//! Bregman (KL) projection onto arbitrage-free prices.
//!
//! For the Logarithmic Market Scoring Rule the Bregman divergence is the
//! Kullback-Leibler divergence:
//!
//! ```text
//! D(mu || theta) = sum_i mu_i * ln(mu_i / theta_i)
//! ```
//!
//! The projection `mu* = argmin D(mu || theta)` over `{A·mu = b, eps <= mu <= 1 - eps}`
//! is the closest consistent price vector to the observed prices `theta`.
//!
//! The solver works on the Lagrange dual. For multipliers `lambda` the
//! box-constrained primal minimiser is closed form,
//! `mu_i = clip(theta_i * exp(-1 - (A^T lambda)_i), eps, 1 - eps)`, and Newton
//! steps on `lambda` drive `A·mu - b` to zero.

use std::time::Instant;

use nalgebra::{DMatrix, DVector};
use tracing::{debug, instrument, warn};

use super::constraints::LinearConstraints;
use crate::config::ProjectorConfig;
use crate::error::SolverError;
use crate::metrics;

/// Backtracking halvings before a Newton step is abandoned.
const MAX_LINE_SEARCH_STEPS: usize = 60;

/// Armijo sufficient-increase constant.
const ARMIJO_C: f64 = 1e-4;

/// Relative change in the dual below which it cannot rank two points.
const DUAL_ROUNDOFF: f64 = 1e-13;

/// Clip into `[eps, 1 - eps]`; NaN maps to `eps`.
pub fn clip(x: f64, eps: f64) -> f64 {
    if x.is_nan() {
        eps
    } else {
        x.clamp(eps, 1.0 - eps)
    }
}

/// `D(mu || theta)` with both vectors clipped into `[eps, 1 - eps]`.
///
/// Always finite. Mismatched lengths only compare the common prefix.
pub fn kl_divergence(mu: &[f64], theta: &[f64], eps: f64) -> f64 {
    mu.iter()
        .zip(theta)
        .map(|(&m, &t)| {
            let m = clip(m, eps);
            let t = clip(t, eps);
            m * (m.ln() - t.ln())
        })
        .sum()
}

/// Gradient of `D(mu || theta)` in `mu`: `ln(mu_i / theta_i) + 1`, clipped.
pub fn kl_gradient(mu: &[f64], theta: &[f64], eps: f64) -> Vec<f64> {
    mu.iter()
        .zip(theta)
        .map(|(&m, &t)| clip(m, eps).ln() - clip(t, eps).ln() + 1.0)
        .collect()
}

/// Result of a projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// Best iterate found.
    pub mu: Vec<f64>,
    /// Whether `‖A·mu - b‖∞` reached the tolerance. When false, `mu` is not
    /// constraint-satisfying and must be retried or discarded.
    pub success: bool,
    /// Newton iterations used.
    pub iterations: usize,
    /// Final `‖A·mu - b‖∞`.
    pub residual: f64,
    /// `D(mu || theta)` at the returned iterate.
    pub divergence: f64,
}

impl Projection {
    /// `(vector, success)` view.
    pub fn into_parts(self) -> (Vec<f64>, bool) {
        (self.mu, self.success)
    }
}

/// KL projector onto a linear equality system intersected with a box.
#[derive(Debug, Clone, Default)]
pub struct BregmanProjector {
    config: ProjectorConfig,
}

impl BregmanProjector {
    /// Create a projector with the given configuration.
    pub fn new(config: ProjectorConfig) -> Self {
        Self { config }
    }

    /// Return the current configuration.
    pub fn config(&self) -> &ProjectorConfig {
        &self.config
    }

    /// Project `theta` onto `{A·mu = b, eps <= mu <= 1 - eps}`.
    ///
    /// `theta` is never modified. Only a shape mismatch between `theta` and the
    /// constraint system is an error; non-convergence is reported through
    /// [`Projection::success`] with the best iterate.
    #[instrument(skip_all, fields(n = theta.len(), rows = constraints.len()))]
    pub fn project(
        &self,
        theta: &[f64],
        constraints: &LinearConstraints,
    ) -> Result<Projection, SolverError> {
        let n = theta.len();
        if constraints.dimension() != n {
            return Err(SolverError::DimensionMismatch {
                what: "constraint columns",
                expected: n,
                actual: constraints.dimension(),
            });
        }

        if n == 0 {
            return Ok(Projection {
                mu: vec![],
                success: true,
                iterations: 0,
                residual: 0.0,
                divergence: 0.0,
            });
        }

        let started = Instant::now();
        let eps = self.config.epsilon;
        let theta_clipped = DVector::from_iterator(n, theta.iter().map(|&t| clip(t, eps)));

        // Initial iterate: theta clipped to the box.
        let mut best_mu = theta_clipped.clone();
        let mut best_residual = residual_norm(constraints, &best_mu);

        let a = constraints.matrix();
        let mut lambda = DVector::zeros(constraints.len());
        let mut iterations = 0;
        let mut success = false;
        // A multiplier shift beyond this moves every coordinate of its rows
        // from one box bound to the other.
        let max_step = 2.0 * (1.0 / eps).ln().max(1.0);

        loop {
            let (mu, free) = primal(a, &lambda, &theta_clipped, eps);
            let r = constraints.residual_vector(&mu);
            let residual = amax(&r);

            if residual <= self.config.tolerance {
                best_residual = residual;
                best_mu = mu;
                success = true;
                break;
            }

            if residual < best_residual {
                best_residual = residual;
                best_mu = mu.clone();
            }

            if iterations >= self.config.max_iterations {
                break;
            }
            iterations += 1;

            let direction = newton_direction(a, &mu, &free, &r, max_step);

            // Armijo backtracking on the concave dual g(lambda), whose gradient
            // is the residual. Once g stops resolving the step, fall back to
            // the residual norm.
            let value = dual_value(&mu, &theta_clipped, &lambda, &r);
            let slope = r.dot(&direction);
            let merit = r.norm_squared();
            let mut step = 1.0;
            let mut accepted = None;
            for _ in 0..MAX_LINE_SEARCH_STEPS {
                let candidate = &lambda + &direction * step;
                let (trial, _) = primal(a, &candidate, &theta_clipped, eps);
                let trial_r = constraints.residual_vector(&trial);
                let trial_value = dual_value(&trial, &theta_clipped, &candidate, &trial_r);

                let ascent = trial_value >= value + ARMIJO_C * step * slope;
                let unresolved = (trial_value - value).abs()
                    <= DUAL_ROUNDOFF * (1.0 + value.abs())
                    && trial_r.norm_squared() < merit;
                if ascent || unresolved {
                    accepted = Some(candidate);
                    break;
                }
                step *= 0.5;
            }

            match accepted {
                Some(next) => lambda = next,
                None => {
                    debug!(iterations, residual, "Line search stalled");
                    break;
                }
            }
        }

        let mu: Vec<f64> = best_mu.iter().copied().collect();
        let divergence = kl_divergence(&mu, theta, eps);

        metrics::record_projection(started, success);
        if success {
            debug!(iterations, residual = best_residual, divergence, "Projection converged");
        } else {
            warn!(
                iterations,
                residual = best_residual,
                tolerance = self.config.tolerance,
                "Projection did not converge"
            );
        }

        Ok(Projection {
            mu,
            success,
            iterations,
            residual: best_residual,
            divergence,
        })
    }
}

/// Project with a one-off projector.
pub fn bregman_projection(
    theta: &[f64],
    constraints: &LinearConstraints,
    config: ProjectorConfig,
) -> Result<Projection, SolverError> {
    BregmanProjector::new(config).project(theta, constraints)
}

/// Box-constrained primal minimiser for fixed multipliers.
///
/// Returns `mu` and a mask of coordinates strictly inside the box.
fn primal(
    a: &DMatrix<f64>,
    lambda: &DVector<f64>,
    theta: &DVector<f64>,
    eps: f64,
) -> (DVector<f64>, Vec<bool>) {
    let shift = a.tr_mul(lambda);
    let mut free = vec![true; theta.len()];
    let mu = DVector::from_iterator(
        theta.len(),
        theta.iter().zip(shift.iter()).enumerate().map(|(i, (&t, &s))| {
            let unconstrained = t * (-1.0 - s).exp();
            let clipped = clip(unconstrained, eps);
            free[i] = clipped == unconstrained;
            clipped
        }),
    );
    (mu, free)
}

/// Dual objective `g(lambda) = D(mu || theta) + lambdaᵀ(A·mu - b)` at the
/// primal minimiser `mu = mu(lambda)`, with `r = A·mu - b`.
fn dual_value(
    mu: &DVector<f64>,
    theta: &DVector<f64>,
    lambda: &DVector<f64>,
    r: &DVector<f64>,
) -> f64 {
    let divergence: f64 = mu
        .iter()
        .zip(theta.iter())
        .map(|(&m, &t)| m * (m.ln() - t.ln()))
        .sum();
    divergence + lambda.dot(r)
}

/// Solve `(A·diag(mu_free)·Aᵀ)·d = r` for the multiplier step.
///
/// Rows whose coordinates are all pinned at a bound have no curvature; each
/// component is clamped to `max_step`. If clamping destroys the ascent
/// property the clamped residual is used instead.
fn newton_direction(
    a: &DMatrix<f64>,
    mu: &DVector<f64>,
    free: &[bool],
    r: &DVector<f64>,
    max_step: f64,
) -> DVector<f64> {
    let weights = DVector::from_iterator(
        mu.len(),
        mu.iter()
            .zip(free)
            .map(|(&m, &is_free)| if is_free { m } else { 0.0 }),
    );
    let weighted = DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[(i, j)] * weights[j]);
    let mut hessian = &weighted * a.transpose();

    let scale = hessian.diagonal().amax().max(1.0);
    for i in 0..hessian.nrows() {
        hessian[(i, i)] += 1e-12 * scale;
    }

    let newton = match hessian.clone().cholesky() {
        Some(chol) => Some(chol.solve(r)),
        None => hessian.lu().solve(r),
    };

    let clamp = |d: DVector<f64>| {
        d.map(|x| {
            if x.is_finite() {
                x.clamp(-max_step, max_step)
            } else {
                0.0
            }
        })
    };
    match newton.map(&clamp) {
        Some(direction) if r.dot(&direction) > 0.0 => direction,
        _ => clamp(r.clone()),
    }
}

fn residual_norm(constraints: &LinearConstraints, mu: &DVector<f64>) -> f64 {
    if constraints.is_empty() {
        return 0.0;
    }
    amax(&constraints.residual_vector(mu))
}

fn amax(v: &DVector<f64>) -> f64 {
    if v.is_empty() {
        0.0
    } else {
        v.amax()
    }
}
