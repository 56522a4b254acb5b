//! # Portfolio Optimizer
//!
//! $$
//! \mathbf{w}^\* = \operatorname{Optimize}(\mu, \Sigma)
//! $$
//!
//! Validation, solver dispatch and post-processing for single-shot solves.

use nalgebra::DMatrix;

use crate::error::PortfolioError;
use crate::estimator::EstimatorConfig;
use crate::estimator::ReturnEstimates;
use crate::estimator::ReturnEstimator;
use crate::optimizer::observer::NullProgress;
use crate::optimizer::observer::ProgressSink;
use crate::optimizer::solver::dot;
use crate::optimizer::solver::ensure_feasible;
use crate::optimizer::solver::project_onto_bounded_simplex;
use crate::optimizer::solver::quad_form;
use crate::optimizer::solver::ConstrainedSolver;
use crate::optimizer::solver::NelderMeadSolver;
use crate::optimizer::solver::ProjectedGradientSolver;
use crate::optimizer::solver::SolveObjective;
use crate::optimizer::solver::WeightProblem;
use crate::optimizer::solver::VOLATILITY_EPS;
use crate::optimizer::types::Allocation;
use crate::optimizer::types::Objective;
use crate::optimizer::types::OptimizerConfig;
use crate::optimizer::types::WeightBounds;
use crate::series::AssetSeries;

/// Tolerance on the fully-invested constraint of returned weights.
const WEIGHT_SUM_TOL: f64 = 1e-6;

/// Single-shot constrained optimizer over a [`ReturnEstimates`] model.
///
/// Stateless between calls; every invocation validates its inputs, runs one
/// solve and returns, retaining nothing.
#[derive(Clone, Debug, Default)]
pub struct PortfolioOptimizer {
  config: OptimizerConfig,
}

impl PortfolioOptimizer {
  /// Construct an optimizer with explicit configuration.
  pub fn new(config: OptimizerConfig) -> Self {
    Self { config }
  }

  /// Borrow optimizer configuration.
  pub fn config(&self) -> &OptimizerConfig {
    &self.config
  }

  /// Solve for portfolio weights under the configured objective.
  pub fn optimize(&self, estimates: &ReturnEstimates) -> Result<Allocation, PortfolioError> {
    self.optimize_with_sink(estimates, &mut NullProgress)
  }

  /// Solve, reporting per-iteration progress to `sink`.
  pub fn optimize_with_sink(
    &self,
    estimates: &ReturnEstimates,
    sink: &mut dyn ProgressSink,
  ) -> Result<Allocation, PortfolioError> {
    let n = validate_estimates(estimates)?;

    if n == 1 {
      // single asset: the feasible set is the point [1.0], no solve needed
      return Ok(build_allocation(estimates, vec![1.0], self.config.risk_free));
    }

    validate_covariance(&estimates.covariance)?;
    ensure_feasible(n, &self.config.bounds)?;

    let objective = match self.config.objective {
      Objective::MinVariance => SolveObjective::Variance,
      Objective::MaxSharpe => SolveObjective::NegativeSharpe,
    };
    let problem = WeightProblem {
      objective,
      mu: &estimates.mean_returns,
      cov: &estimates.covariance,
      risk_free: self.config.risk_free,
      bounds: self.config.bounds,
    };

    let solver: Box<dyn ConstrainedSolver> = match self.config.objective {
      Objective::MinVariance => Box::new(ProjectedGradientSolver::new(
        self.config.max_iters,
        self.config.tolerance,
      )),
      Objective::MaxSharpe => Box::new(NelderMeadSolver::new(
        self.config.max_iters,
        self.config.tolerance,
      )),
    };

    let initial = vec![1.0 / n as f64; n];
    let raw = solver.solve(&problem, &initial, sink)?;
    let weights = finalize_weights(raw, &self.config.bounds, self.config.max_iters)?;

    Ok(build_allocation(estimates, weights, self.config.risk_free))
  }
}

/// One-shot pipeline: estimate statistics from series, then optimize.
pub fn allocate(
  series: &[AssetSeries],
  estimator: &EstimatorConfig,
  optimizer: &OptimizerConfig,
) -> Result<Allocation, PortfolioError> {
  let estimates = ReturnEstimator::new(*estimator).estimate(series)?;
  PortfolioOptimizer::new(*optimizer).optimize(&estimates)
}

/// Shape and finiteness checks shared by the optimizer and the frontier.
pub(crate) fn validate_estimates(estimates: &ReturnEstimates) -> Result<usize, PortfolioError> {
  let n = estimates.assets.len();
  if estimates.mean_returns.len() != n
    || estimates.covariance.nrows() != n
    || estimates.covariance.ncols() != n
  {
    return Err(PortfolioError::DimensionMismatch {
      returns: estimates.mean_returns.len(),
      covariance: estimates.covariance.nrows(),
    });
  }

  if n == 0 {
    return Err(PortfolioError::InsufficientData {
      required: 1,
      available: 0,
    });
  }

  for (i, m) in estimates.mean_returns.iter().enumerate() {
    if !m.is_finite() {
      return Err(PortfolioError::NonFiniteValue {
        asset: estimates.assets[i].clone(),
        index: i,
      });
    }
  }
  if estimates.covariance.iter().any(|v| !v.is_finite()) {
    return Err(PortfolioError::DegenerateCovariance {
      reason: "covariance contains a non-finite entry".to_string(),
    });
  }

  Ok(n)
}

/// Symmetry, non-negative variance and positive definiteness checks.
///
/// All-zero, perfectly collinear and under-observed covariance matrices are
/// singular and fail here, before any solver can return NaN weights.
pub(crate) fn validate_covariance(cov: &DMatrix<f64>) -> Result<(), PortfolioError> {
  let n = cov.nrows();

  for i in 0..n {
    if cov[(i, i)] < 0.0 {
      return Err(PortfolioError::DegenerateCovariance {
        reason: format!("negative variance on the diagonal at index {i}"),
      });
    }
    for j in (i + 1)..n {
      let a = cov[(i, j)];
      let b = cov[(j, i)];
      if (a - b).abs() > 1e-9 * a.abs().max(b.abs()).max(1.0) {
        return Err(PortfolioError::DegenerateCovariance {
          reason: "matrix is not symmetric".to_string(),
        });
      }
    }
  }

  if cov.clone().cholesky().is_none() {
    return Err(PortfolioError::DegenerateCovariance {
      reason: "matrix is not positive definite".to_string(),
    });
  }

  Ok(())
}

/// Post-processing: one more projection clamps solver drift back onto the
/// feasible set, then the weight invariants are verified rather than assumed.
pub(crate) fn finalize_weights(
  raw: Vec<f64>,
  bounds: &WeightBounds,
  budget: u64,
) -> Result<Vec<f64>, PortfolioError> {
  let weights = project_onto_bounded_simplex(&raw, bounds);

  let residual = (weights.iter().sum::<f64>() - 1.0).abs();
  let within_bounds = weights
    .iter()
    .all(|&w| w >= bounds.lower - WEIGHT_SUM_TOL && w <= bounds.upper + WEIGHT_SUM_TOL);

  if residual > WEIGHT_SUM_TOL || !within_bounds {
    return Err(PortfolioError::OptimizationFailed {
      iterations: budget,
      constraint_residual: residual,
      last_iterate: weights,
    });
  }

  Ok(weights)
}

pub(crate) fn build_allocation(
  estimates: &ReturnEstimates,
  weights: Vec<f64>,
  risk_free: f64,
) -> Allocation {
  let expected_return = dot(&weights, &estimates.mean_returns);
  let volatility = quad_form(&estimates.covariance, &weights).max(0.0).sqrt();
  let sharpe = if volatility > VOLATILITY_EPS {
    (expected_return - risk_free) / volatility
  } else {
    0.0
  };

  Allocation {
    assets: estimates.assets.clone(),
    weights,
    expected_return,
    volatility,
    sharpe,
  }
}
