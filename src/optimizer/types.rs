//! # Optimizer Types
//!
//! $$
//! \mathbf{w}^\* = \arg\max_{\mathbf{w}} \frac{\mathbb{E}[R_p] - r_f}{\sigma_p}
//! $$
//!
//! Objectives, constraint configuration and allocation results.

/// Supported optimization objectives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Objective {
  /// Minimize portfolio variance `wᵀΣw`.
  #[default]
  MinVariance,
  /// Maximize the Sharpe ratio `(wᵀμ - r_f) / sqrt(wᵀΣw)`.
  ///
  /// Not convex under bounds; the solve is a local search and the result is
  /// not guaranteed to be the global optimum.
  MaxSharpe,
}

/// Per-asset weight bounds, identical for every asset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightBounds {
  pub lower: f64,
  pub upper: f64,
}

impl Default for WeightBounds {
  /// Long-only, no leverage.
  fn default() -> Self {
    Self {
      lower: 0.0,
      upper: 1.0,
    }
  }
}

/// Runtime configuration for [`PortfolioOptimizer`](crate::optimizer::PortfolioOptimizer).
#[derive(Clone, Copy, Debug)]
pub struct OptimizerConfig {
  /// Objective to optimize.
  pub objective: Objective,
  /// Risk-free rate used by the Sharpe objective and reported metrics.
  pub risk_free: f64,
  /// Per-asset weight bounds.
  pub bounds: WeightBounds,
  /// Solver iteration budget; exhausting it fails the solve.
  pub max_iters: u64,
  /// Solver convergence tolerance.
  pub tolerance: f64,
}

impl Default for OptimizerConfig {
  fn default() -> Self {
    Self {
      objective: Objective::MinVariance,
      risk_free: 0.0,
      bounds: WeightBounds::default(),
      max_iters: 5000,
      tolerance: 1e-8,
    }
  }
}

/// Output of a successful optimization run.
///
/// `weights` follow the asset order of the inputs, each within bounds, and
/// sum to 1 within 1e-6.
#[derive(Clone, Debug, Default)]
pub struct Allocation {
  /// Asset identifiers in input order.
  pub assets: Vec<String>,
  /// Final portfolio weights.
  pub weights: Vec<f64>,
  /// Model expected portfolio return (annualized if inputs are annualized).
  pub expected_return: f64,
  /// Model portfolio volatility.
  pub volatility: f64,
  /// Sharpe ratio computed as `(expected_return - risk_free) / volatility`.
  pub sharpe: f64,
}

impl Allocation {
  /// Weight assigned to one asset, if present.
  pub fn weight(&self, asset: &str) -> Option<f64> {
    let i = self.assets.iter().position(|a| a == asset)?;
    self.weights.get(i).copied()
  }
}
