//! # Errors
//!
//! Typed failure conditions raised by the estimator and the optimizer.

use thiserror::Error;

/// Errors surfaced by return estimation and portfolio optimization.
///
/// Every condition is raised to the immediate caller; nothing inside the
/// crate falls back to default weights or masks a failed solve.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PortfolioError {
  /// Too few overlapping observations to estimate statistics.
  #[error("insufficient data: {required} overlapping observations required, {available} available")]
  InsufficientData { required: usize, available: usize },

  /// Zero price encountered while deriving percentage returns.
  #[error("zero price for asset {asset} at index {index}: percentage return undefined")]
  DivideByZero { asset: String, index: usize },

  /// NaN or infinite input value.
  #[error("non-finite value for asset {asset} at index {index}")]
  NonFiniteValue { asset: String, index: usize },

  /// Duplicate or decreasing timestamps within one series.
  #[error("timestamps for asset {asset} must be strictly increasing (violation at index {index})")]
  UnorderedTimestamps { asset: String, index: usize },

  /// The same asset identifier was supplied more than once.
  #[error("asset {asset} supplied more than once")]
  DuplicateAsset { asset: String },

  /// Return vector and covariance matrix disagree on asset dimensions.
  #[error("dimension mismatch: {returns} expected returns vs {covariance} covariance rows")]
  DimensionMismatch { returns: usize, covariance: usize },

  /// Weight bounds incompatible with the fully-invested constraint.
  #[error("infeasible bounds: lower weights sum to {lower_sum}, upper weights sum to {upper_sum}")]
  InfeasibleBounds { lower_sum: f64, upper_sum: f64 },

  /// Covariance matrix unusable for optimization.
  #[error("degenerate covariance matrix: {reason}")]
  DegenerateCovariance { reason: String },

  /// Solver exhausted its iteration budget without converging.
  ///
  /// Carries the last iterate and the equality-constraint residual so the
  /// caller can retry with a different guess or a relaxed tolerance.
  #[error("optimization did not converge within {iterations} iterations (constraint residual {constraint_residual:e})")]
  OptimizationFailed {
    iterations: u64,
    constraint_residual: f64,
    last_iterate: Vec<f64>,
  },
}
