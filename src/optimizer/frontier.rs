//! # Efficient Frontier
//!
//! $$
//! \min_{\mathbf{w}} \ \mathbf{w}^\top \Sigma \mathbf{w} + \lambda(\mu^\top\mathbf{w} - r^\*)^2
//! $$
//!
//! Parallel sweep of target-return-penalized minimum-variance solves.

use rayon::prelude::*;

use crate::error::PortfolioError;
use crate::estimator::ReturnEstimates;
use crate::optimizer::engine::build_allocation;
use crate::optimizer::engine::finalize_weights;
use crate::optimizer::engine::validate_covariance;
use crate::optimizer::engine::validate_estimates;
use crate::optimizer::observer::NullProgress;
use crate::optimizer::solver::ensure_feasible;
use crate::optimizer::solver::ConstrainedSolver;
use crate::optimizer::solver::ProjectedGradientSolver;
use crate::optimizer::solver::SolveObjective;
use crate::optimizer::solver::WeightProblem;
use crate::optimizer::types::OptimizerConfig;

/// Weight of the soft return-target penalty in the frontier objective.
const TARGET_PENALTY: f64 = 10.0;

/// One solved point on the efficient frontier.
#[derive(Clone, Debug)]
pub struct FrontierPoint {
  /// Return level the penalty pulled the portfolio toward.
  pub target_return: f64,
  /// Optimized weights in input asset order.
  pub weights: Vec<f64>,
  /// Realized model expected return of the optimized portfolio.
  pub expected_return: f64,
  /// Realized model volatility.
  pub volatility: f64,
  /// Sharpe ratio at the configured risk-free rate.
  pub sharpe: f64,
}

/// Sweep evenly spaced return targets between the lowest and highest expected
/// asset return, solving one targeted minimum-variance problem per point.
///
/// The sweeps are independent and run in parallel; each solve owns its own
/// state, and results come back in target order. `config.objective` is
/// ignored here because every point uses the targeted-variance form; the
/// penalty is soft, so realized returns approach rather than pin the target.
pub fn efficient_frontier(
  estimates: &ReturnEstimates,
  config: &OptimizerConfig,
  points: usize,
) -> Result<Vec<FrontierPoint>, PortfolioError> {
  let n = validate_estimates(estimates)?;
  validate_covariance(&estimates.covariance)?;
  ensure_feasible(n, &config.bounds)?;

  if points == 0 {
    return Ok(Vec::new());
  }

  let low = estimates
    .mean_returns
    .iter()
    .cloned()
    .fold(f64::INFINITY, f64::min);
  let high = estimates
    .mean_returns
    .iter()
    .cloned()
    .fold(f64::NEG_INFINITY, f64::max);

  let targets: Vec<f64> = if points == 1 {
    vec![0.5 * (low + high)]
  } else {
    (0..points)
      .map(|i| low + (high - low) * i as f64 / (points - 1) as f64)
      .collect()
  };

  let initial = vec![1.0 / n as f64; n];
  let solver = ProjectedGradientSolver::new(config.max_iters, config.tolerance);

  targets
    .par_iter()
    .map(|&target_return| {
      let problem = WeightProblem {
        objective: SolveObjective::TargetedVariance {
          target_return,
          penalty: TARGET_PENALTY,
        },
        mu: &estimates.mean_returns,
        cov: &estimates.covariance,
        risk_free: config.risk_free,
        bounds: config.bounds,
      };

      let raw = solver.solve(&problem, &initial, &mut NullProgress)?;
      let weights = finalize_weights(raw, &config.bounds, config.max_iters)?;
      let allocation = build_allocation(estimates, weights, config.risk_free);

      Ok(FrontierPoint {
        target_return,
        weights: allocation.weights,
        expected_return: allocation.expected_return,
        volatility: allocation.volatility,
        sharpe: allocation.sharpe,
      })
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use nalgebra::DMatrix;

  use super::*;

  fn estimates() -> ReturnEstimates {
    ReturnEstimates {
      assets: vec!["AAA".to_string(), "BBB".to_string(), "CCC".to_string()],
      mean_returns: vec![0.05, 0.10, 0.20],
      covariance: DMatrix::from_row_slice(
        3,
        3,
        &[0.04, 0.0, 0.0, 0.0, 0.05, 0.0, 0.0, 0.0, 0.09],
      ),
      observations: 64,
    }
  }

  #[test]
  fn frontier_points_are_feasible_and_ordered() {
    let frontier = efficient_frontier(&estimates(), &OptimizerConfig::default(), 5).unwrap();

    assert_eq!(frontier.len(), 5);
    for pair in frontier.windows(2) {
      assert!(pair[0].target_return < pair[1].target_return);
    }
    for point in &frontier {
      assert_abs_diff_eq!(point.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-6);
      assert!(point.weights.iter().all(|&w| (-1e-6..=1.0 + 1e-6).contains(&w)));
      assert!(point.volatility > 0.0);
    }
  }

  #[test]
  fn higher_targets_earn_higher_expected_returns() {
    let frontier = efficient_frontier(&estimates(), &OptimizerConfig::default(), 4).unwrap();

    let first = frontier.first().unwrap().expected_return;
    let last = frontier.last().unwrap().expected_return;
    assert!(last > first + 0.01);
  }

  #[test]
  fn sweep_is_deterministic_despite_parallelism() {
    let a = efficient_frontier(&estimates(), &OptimizerConfig::default(), 6).unwrap();
    let b = efficient_frontier(&estimates(), &OptimizerConfig::default(), 6).unwrap();

    for (x, y) in a.iter().zip(b.iter()) {
      assert_eq!(x.weights, y.weights);
    }
  }

  #[test]
  fn zero_points_yield_an_empty_frontier() {
    let frontier = efficient_frontier(&estimates(), &OptimizerConfig::default(), 0).unwrap();
    assert!(frontier.is_empty());
  }

  #[test]
  fn degenerate_covariance_fails_the_sweep() {
    let est = ReturnEstimates {
      assets: vec!["AAA".to_string(), "BBB".to_string()],
      mean_returns: vec![0.1, 0.2],
      covariance: DMatrix::zeros(2, 2),
      observations: 64,
    };

    let err = efficient_frontier(&est, &OptimizerConfig::default(), 3).unwrap_err();
    assert!(matches!(err, PortfolioError::DegenerateCovariance { .. }));
  }
}
