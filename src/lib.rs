//! # markowitz-rs
//!
//! $$
//! \min_{\mathbf{w}\in\Delta} \ \mathbf{w}^\top \Sigma \mathbf{w}
//! \qquad
//! \max_{\mathbf{w}\in\Delta} \ \frac{\mu^\top\mathbf{w} - r_f}{\sqrt{\mathbf{w}^\top \Sigma \mathbf{w}}}
//! $$
//!
//! Return statistics estimation and long-only, fully-invested portfolio
//! optimization. Per-asset price or return series go in; an annualized
//! risk-return model and optimized weights come out.
//!
//! ```rust,ignore
//! use markowitz_rs::{allocate, EstimatorConfig, Objective, OptimizerConfig};
//!
//! let config = OptimizerConfig {
//!   objective: Objective::MaxSharpe,
//!   ..OptimizerConfig::default()
//! };
//! let allocation = allocate(&series, &EstimatorConfig::default(), &config)?;
//! ```

pub mod error;
pub mod estimator;
pub mod optimizer;
pub mod series;

pub use error::PortfolioError;
pub use estimator::EstimatorConfig;
pub use estimator::ReturnEstimates;
pub use estimator::ReturnEstimator;
pub use optimizer::allocate;
pub use optimizer::efficient_frontier;
pub use optimizer::Allocation;
pub use optimizer::Objective;
pub use optimizer::OptimizerConfig;
pub use optimizer::PortfolioOptimizer;
pub use series::AssetSeries;
pub use series::SeriesKind;
