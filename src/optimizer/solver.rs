//! # Constrained Weight Solvers
//!
//! $$
//! \Delta = \{\mathbf{w} : \textstyle\sum_i w_i = 1,\ \ell \le w_i \le u\}
//! $$
//!
//! Pluggable solvers over the bounded simplex: a projected-gradient path for
//! the convex quadratic objectives and an argmin Nelder-Mead search for the
//! Sharpe objective.

use std::sync::Arc;
use std::sync::Mutex;

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::TerminationReason;
use argmin::core::TerminationStatus;
use argmin::solver::neldermead::NelderMead;
use nalgebra::DMatrix;

use crate::error::PortfolioError;
use crate::optimizer::observer::ProgressEvent;
use crate::optimizer::observer::ProgressSink;
use crate::optimizer::types::WeightBounds;

/// Portfolio volatility below this is treated as degenerate, never divided by.
pub(crate) const VOLATILITY_EPS: f64 = 1e-12;

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
  a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub(crate) fn quad_form(cov: &DMatrix<f64>, w: &[f64]) -> f64 {
  let n = w.len();
  let mut acc = 0.0;
  for i in 0..n {
    for j in 0..n {
      acc += w[i] * cov[(i, j)] * w[j];
    }
  }
  acc
}

fn mat_vec(cov: &DMatrix<f64>, w: &[f64]) -> Vec<f64> {
  let n = w.len();
  (0..n)
    .map(|i| (0..n).map(|j| cov[(i, j)] * w[j]).sum())
    .collect()
}

fn softmax(x: &[f64]) -> Vec<f64> {
  if x.is_empty() {
    return Vec::new();
  }

  let max_x = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
  let exps: Vec<f64> = x.iter().map(|&v| (v - max_x).exp()).collect();
  let sum: f64 = exps.iter().sum();

  if sum < 1e-15 {
    vec![1.0 / x.len() as f64; x.len()]
  } else {
    exps.iter().map(|&e| e / sum).collect()
  }
}

/// Euclidean projection onto `{ w : Σw = 1, lower ≤ w ≤ upper }`.
///
/// Bisects the shift `τ` in `w_i = clamp(v_i - τ)`; the clamped sum is
/// monotone in `τ`, so the bisection pins the fully-invested constraint to
/// machine precision. Bounds must be feasible (see [`ensure_feasible`]).
pub(crate) fn project_onto_bounded_simplex(v: &[f64], bounds: &WeightBounds) -> Vec<f64> {
  let n = v.len();
  if n == 0 {
    return Vec::new();
  }

  let clamped_sum = |tau: f64| -> f64 {
    v.iter()
      .map(|&vi| (vi - tau).clamp(bounds.lower, bounds.upper))
      .sum()
  };

  let mut lo = v.iter().cloned().fold(f64::INFINITY, f64::min) - bounds.upper;
  let mut hi = v.iter().cloned().fold(f64::NEG_INFINITY, f64::max) - bounds.lower;

  for _ in 0..100 {
    let mid = 0.5 * (lo + hi);
    if clamped_sum(mid) > 1.0 {
      lo = mid;
    } else {
      hi = mid;
    }
  }

  let tau = 0.5 * (lo + hi);
  v.iter()
    .map(|&vi| (vi - tau).clamp(bounds.lower, bounds.upper))
    .collect()
}

/// Reject bounds that cannot hold a fully-invested portfolio of `n` assets.
pub(crate) fn ensure_feasible(n: usize, bounds: &WeightBounds) -> Result<(), PortfolioError> {
  let lower_sum = bounds.lower * n as f64;
  let upper_sum = bounds.upper * n as f64;

  let invalid = bounds.lower < 0.0 || bounds.upper > 1.0 || bounds.lower > bounds.upper;
  if invalid || lower_sum > 1.0 + 1e-9 || upper_sum < 1.0 - 1e-9 {
    return Err(PortfolioError::InfeasibleBounds {
      lower_sum,
      upper_sum,
    });
  }

  Ok(())
}

/// Objective evaluated by the solvers.
#[derive(Clone, Copy, Debug)]
pub enum SolveObjective {
  /// Portfolio variance `wᵀΣw`.
  Variance,
  /// Variance with a soft penalty pulling the portfolio return to a target.
  TargetedVariance { target_return: f64, penalty: f64 },
  /// Negated Sharpe ratio `-(wᵀμ - r_f) / sqrt(wᵀΣw)`.
  NegativeSharpe,
}

/// Solve-time description of one constrained optimization problem: objective
/// kind, weight bounds and the fully-invested equality constraint.
#[derive(Clone, Copy, Debug)]
pub struct WeightProblem<'a> {
  pub objective: SolveObjective,
  pub mu: &'a [f64],
  pub cov: &'a DMatrix<f64>,
  pub risk_free: f64,
  pub bounds: WeightBounds,
}

impl WeightProblem<'_> {
  /// Objective value at `w`.
  ///
  /// A portfolio volatility at or below [`VOLATILITY_EPS`] makes the Sharpe
  /// ratio undefined and fails with
  /// [`PortfolioError::DegenerateCovariance`] instead of dividing.
  pub fn evaluate(&self, w: &[f64]) -> Result<f64, PortfolioError> {
    match self.objective {
      SolveObjective::Variance => Ok(quad_form(self.cov, w)),
      SolveObjective::TargetedVariance {
        target_return,
        penalty,
      } => {
        let shortfall = dot(w, self.mu) - target_return;
        Ok(quad_form(self.cov, w) + penalty * shortfall * shortfall)
      }
      SolveObjective::NegativeSharpe => {
        let vol = quad_form(self.cov, w).max(0.0).sqrt();
        if vol <= VOLATILITY_EPS {
          return Err(PortfolioError::DegenerateCovariance {
            reason: format!("portfolio volatility {vol:e} too small for a Sharpe ratio"),
          });
        }
        Ok(-(dot(w, self.mu) - self.risk_free) / vol)
      }
    }
  }

  /// Objective gradient at `w`, with the same degeneracy guard.
  pub fn gradient(&self, w: &[f64]) -> Result<Vec<f64>, PortfolioError> {
    let sigma_w = mat_vec(self.cov, w);

    match self.objective {
      SolveObjective::Variance => Ok(sigma_w.iter().map(|s| 2.0 * s).collect()),
      SolveObjective::TargetedVariance {
        target_return,
        penalty,
      } => {
        let shortfall = dot(w, self.mu) - target_return;
        Ok(
          sigma_w
            .iter()
            .zip(self.mu.iter())
            .map(|(s, m)| 2.0 * s + 2.0 * penalty * shortfall * m)
            .collect(),
        )
      }
      SolveObjective::NegativeSharpe => {
        let vol = quad_form(self.cov, w).max(0.0).sqrt();
        if vol <= VOLATILITY_EPS {
          return Err(PortfolioError::DegenerateCovariance {
            reason: format!("portfolio volatility {vol:e} too small for a Sharpe ratio"),
          });
        }
        let excess = dot(w, self.mu) - self.risk_free;
        Ok(
          self
            .mu
            .iter()
            .zip(sigma_w.iter())
            .map(|(m, s)| -m / vol + excess * s / (vol * vol * vol))
            .collect(),
        )
      }
    }
  }

  /// Infinity-norm curvature bound used to size gradient steps.
  pub fn curvature_bound(&self) -> f64 {
    let n = self.cov.nrows();
    let mut row_max = 0.0_f64;
    for i in 0..n {
      let row_sum: f64 = (0..n).map(|j| self.cov[(i, j)].abs()).sum();
      row_max = row_max.max(row_sum);
    }

    let base = 2.0 * row_max;
    match self.objective {
      SolveObjective::TargetedVariance { penalty, .. } => {
        let mu_max = self.mu.iter().cloned().fold(0.0_f64, |a, m| a.max(m.abs()));
        let mu_sum: f64 = self.mu.iter().map(|m| m.abs()).sum();
        base + 2.0 * penalty * mu_max * mu_sum
      }
      _ => base,
    }
  }
}

/// Single capability every solver implements: take a problem and an initial
/// guess, return feasible weights or a typed failure.
pub trait ConstrainedSolver {
  fn solve(
    &self,
    problem: &WeightProblem<'_>,
    initial: &[f64],
    sink: &mut dyn ProgressSink,
  ) -> Result<Vec<f64>, PortfolioError>;
}

/// Fixed-step projected gradient descent on the bounded simplex.
///
/// The minimum-variance objectives are convex quadratics, so the local
/// optimum this converges to is the global one.
#[derive(Clone, Copy, Debug)]
pub struct ProjectedGradientSolver {
  pub max_iters: u64,
  pub tolerance: f64,
}

impl ProjectedGradientSolver {
  pub fn new(max_iters: u64, tolerance: f64) -> Self {
    Self {
      max_iters,
      tolerance,
    }
  }
}

impl ConstrainedSolver for ProjectedGradientSolver {
  fn solve(
    &self,
    problem: &WeightProblem<'_>,
    initial: &[f64],
    sink: &mut dyn ProgressSink,
  ) -> Result<Vec<f64>, PortfolioError> {
    let step = 1.0 / problem.curvature_bound().max(1e-12);
    let mut w = project_onto_bounded_simplex(initial, &problem.bounds);

    for iter in 0..self.max_iters {
      let grad = problem.gradient(&w)?;
      let moved: Vec<f64> = w
        .iter()
        .zip(grad.iter())
        .map(|(wi, gi)| wi - step * gi)
        .collect();
      let next = project_onto_bounded_simplex(&moved, &problem.bounds);

      let delta = w
        .iter()
        .zip(next.iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0_f64, f64::max);

      sink.on_iteration(ProgressEvent {
        iteration: iter,
        objective: problem.evaluate(&next)?,
        constraint_residual: (next.iter().sum::<f64>() - 1.0).abs(),
      });

      w = next;
      if delta < self.tolerance {
        return Ok(w);
      }
    }

    Err(PortfolioError::OptimizationFailed {
      iterations: self.max_iters,
      constraint_residual: (w.iter().sum::<f64>() - 1.0).abs(),
      last_iterate: w,
    })
  }
}

/// Maps an unconstrained search point to feasible weights.
fn simplex_weights(x: &[f64], bounds: &WeightBounds) -> Vec<f64> {
  project_onto_bounded_simplex(&softmax(x), bounds)
}

struct SimplexSearchCost {
  objective: SolveObjective,
  mu: Vec<f64>,
  cov: DMatrix<f64>,
  risk_free: f64,
  bounds: WeightBounds,
  history: Arc<Mutex<Vec<ProgressEvent>>>,
  last_weights: Arc<Mutex<Vec<f64>>>,
}

impl CostFunction for SimplexSearchCost {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    let w = simplex_weights(x, &self.bounds);
    let problem = WeightProblem {
      objective: self.objective,
      mu: &self.mu,
      cov: &self.cov,
      risk_free: self.risk_free,
      bounds: self.bounds,
    };
    let value = problem.evaluate(&w)?;

    let mut history = self.history.lock().unwrap();
    let evaluation = history.len() as u64;
    history.push(ProgressEvent {
      iteration: evaluation,
      objective: value,
      constraint_residual: (w.iter().sum::<f64>() - 1.0).abs(),
    });
    *self.last_weights.lock().unwrap() = w;

    Ok(value)
  }
}

/// Nelder-Mead search over a softmax reparameterization of the weights.
///
/// Handles the non-convex Sharpe objective; the search point `x = 0` maps to
/// uniform weights, which is where the simplex is anchored. Events reach the
/// sink after the run (one per objective evaluation).
#[derive(Clone, Copy, Debug)]
pub struct NelderMeadSolver {
  pub max_iters: u64,
  pub sd_tolerance: f64,
}

impl NelderMeadSolver {
  pub fn new(max_iters: u64, sd_tolerance: f64) -> Self {
    Self {
      max_iters,
      sd_tolerance,
    }
  }
}

impl ConstrainedSolver for NelderMeadSolver {
  fn solve(
    &self,
    problem: &WeightProblem<'_>,
    initial: &[f64],
    sink: &mut dyn ProgressSink,
  ) -> Result<Vec<f64>, PortfolioError> {
    let n = initial.len();
    let x0: Vec<f64> = initial.iter().map(|w| w.max(1e-12).ln()).collect();

    let mut simplex = Vec::with_capacity(n + 1);
    simplex.push(x0.clone());
    for i in 0..n {
      let mut point = x0.clone();
      point[i] += 1.0;
      simplex.push(point);
    }

    let history = Arc::new(Mutex::new(Vec::new()));
    let last_weights = Arc::new(Mutex::new(initial.to_vec()));
    let cost = SimplexSearchCost {
      objective: problem.objective,
      mu: problem.mu.to_vec(),
      cov: problem.cov.clone(),
      risk_free: problem.risk_free,
      bounds: problem.bounds,
      history: Arc::clone(&history),
      last_weights: Arc::clone(&last_weights),
    };

    let solver = match NelderMead::new(simplex).with_sd_tolerance(self.sd_tolerance) {
      Ok(solver) => solver,
      Err(_) => {
        return Err(PortfolioError::OptimizationFailed {
          iterations: 0,
          constraint_residual: 0.0,
          last_iterate: initial.to_vec(),
        })
      }
    };

    let run = Executor::new(cost, solver)
      .configure(|state| state.max_iters(self.max_iters))
      .run();

    let drained: Vec<ProgressEvent> = std::mem::take(&mut *history.lock().unwrap());
    let last_seen = drained.last().copied();
    for event in drained {
      sink.on_iteration(event);
    }

    match run {
      Ok(res) => {
        let best_x = res.state.best_param.clone().unwrap_or(x0);
        let w = simplex_weights(&best_x, &problem.bounds);

        if matches!(
          res.state.termination_status,
          TerminationStatus::Terminated(TerminationReason::MaxItersReached)
        ) {
          return Err(PortfolioError::OptimizationFailed {
            iterations: res.state.iter,
            constraint_residual: (w.iter().sum::<f64>() - 1.0).abs(),
            last_iterate: w,
          });
        }

        Ok(w)
      }
      Err(err) => match err.downcast::<PortfolioError>() {
        Ok(inner) => Err(inner),
        Err(_) => {
          let last = last_weights.lock().unwrap().clone();
          Err(PortfolioError::OptimizationFailed {
            iterations: last_seen.map(|e| e.iteration).unwrap_or(0),
            constraint_residual: (last.iter().sum::<f64>() - 1.0).abs(),
            last_iterate: last,
          })
        }
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;
  use crate::optimizer::observer::NullProgress;

  fn bounds(lower: f64, upper: f64) -> WeightBounds {
    WeightBounds { lower, upper }
  }

  #[test]
  fn projection_hits_the_simplex() {
    let w = project_onto_bounded_simplex(&[0.8, 0.8], &bounds(0.0, 1.0));
    assert_abs_diff_eq!(w[0], 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(w[1], 0.5, epsilon = 1e-12);

    let w = project_onto_bounded_simplex(&[2.0, 0.0], &bounds(0.0, 1.0));
    assert_abs_diff_eq!(w[0], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(w[1], 0.0, epsilon = 1e-12);
  }

  #[test]
  fn projection_respects_caps() {
    let w = project_onto_bounded_simplex(&[5.0, 0.1, 0.1], &bounds(0.1, 0.6));

    assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    assert!(w.iter().all(|&v| v >= 0.1 - 1e-12 && v <= 0.6 + 1e-12));
    assert_abs_diff_eq!(w[0], 0.6, epsilon = 1e-9);
  }

  #[test]
  fn infeasible_bounds_are_rejected() {
    assert!(matches!(
      ensure_feasible(2, &bounds(0.6, 1.0)),
      Err(PortfolioError::InfeasibleBounds { .. })
    ));
    assert!(matches!(
      ensure_feasible(2, &bounds(0.0, 0.4)),
      Err(PortfolioError::InfeasibleBounds { .. })
    ));
    assert!(ensure_feasible(2, &bounds(0.0, 1.0)).is_ok());
  }

  #[test]
  fn projected_gradient_finds_the_analytic_minimum_variance() {
    let cov = DMatrix::from_row_slice(2, 2, &[0.04, 0.0, 0.0, 0.09]);
    let mu = [0.1, 0.2];
    let problem = WeightProblem {
      objective: SolveObjective::Variance,
      mu: &mu,
      cov: &cov,
      risk_free: 0.0,
      bounds: bounds(0.0, 1.0),
    };

    let solver = ProjectedGradientSolver::new(5000, 1e-10);
    let w = solver
      .solve(&problem, &[0.5, 0.5], &mut NullProgress)
      .unwrap();

    assert_abs_diff_eq!(w[0], 0.09 / 0.13, epsilon = 1e-6);
    assert_abs_diff_eq!(w[1], 0.04 / 0.13, epsilon = 1e-6);
  }

  #[test]
  fn projected_gradient_honors_an_active_upper_bound() {
    let cov = DMatrix::from_row_slice(2, 2, &[0.01, 0.0, 0.0, 1.0]);
    let mu = [0.1, 0.1];
    let problem = WeightProblem {
      objective: SolveObjective::Variance,
      mu: &mu,
      cov: &cov,
      risk_free: 0.0,
      bounds: bounds(0.0, 0.6),
    };

    let solver = ProjectedGradientSolver::new(5000, 1e-10);
    let w = solver
      .solve(&problem, &[0.5, 0.5], &mut NullProgress)
      .unwrap();

    assert_abs_diff_eq!(w[0], 0.6, epsilon = 1e-6);
    assert_abs_diff_eq!(w[1], 0.4, epsilon = 1e-6);
  }

  #[test]
  fn exhausted_budget_reports_the_last_iterate() {
    let cov = DMatrix::from_row_slice(2, 2, &[0.04, 0.0, 0.0, 0.09]);
    let mu = [0.1, 0.2];
    let problem = WeightProblem {
      objective: SolveObjective::Variance,
      mu: &mu,
      cov: &cov,
      risk_free: 0.0,
      bounds: bounds(0.0, 1.0),
    };

    let solver = ProjectedGradientSolver::new(1, 1e-12);
    let err = solver
      .solve(&problem, &[0.5, 0.5], &mut NullProgress)
      .unwrap_err();

    match err {
      PortfolioError::OptimizationFailed {
        iterations,
        constraint_residual,
        last_iterate,
      } => {
        assert_eq!(iterations, 1);
        assert_eq!(last_iterate.len(), 2);
        assert!(constraint_residual < 1e-9);
      }
      other => panic!("expected OptimizationFailed, got {other:?}"),
    }
  }

  #[test]
  fn sharpe_evaluation_rejects_vanishing_volatility() {
    let cov = DMatrix::zeros(2, 2);
    let mu = [0.1, 0.2];
    let problem = WeightProblem {
      objective: SolveObjective::NegativeSharpe,
      mu: &mu,
      cov: &cov,
      risk_free: 0.0,
      bounds: bounds(0.0, 1.0),
    };

    let err = problem.evaluate(&[0.5, 0.5]).unwrap_err();
    assert!(matches!(err, PortfolioError::DegenerateCovariance { .. }));
  }

  #[test]
  fn nelder_mead_improves_on_the_uniform_sharpe() {
    let cov = DMatrix::from_row_slice(2, 2, &[0.04, 0.0, 0.0, 0.04]);
    let mu = [0.05, 0.15];
    let problem = WeightProblem {
      objective: SolveObjective::NegativeSharpe,
      mu: &mu,
      cov: &cov,
      risk_free: 0.0,
      bounds: bounds(0.0, 1.0),
    };

    let solver = NelderMeadSolver::new(5000, 1e-10);
    let w = solver
      .solve(&problem, &[0.5, 0.5], &mut NullProgress)
      .unwrap();

    let uniform = problem.evaluate(&[0.5, 0.5]).unwrap();
    let found = problem.evaluate(&w).unwrap();
    assert!(found <= uniform);
    assert!(w[1] > w[0]);
  }
}
