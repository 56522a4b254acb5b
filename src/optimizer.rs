//! # Portfolio Optimization
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Constrained weight solvers, the single-shot optimizer and the efficient
//! frontier sweep.

pub mod engine;
pub mod frontier;
pub mod observer;
pub mod solver;
pub mod types;

pub use engine::allocate;
pub use engine::PortfolioOptimizer;
pub use frontier::efficient_frontier;
pub use frontier::FrontierPoint;
pub use observer::NullProgress;
pub use observer::ProgressEvent;
pub use observer::ProgressSink;
pub use observer::RecordingProgress;
pub use solver::ConstrainedSolver;
pub use solver::NelderMeadSolver;
pub use solver::ProjectedGradientSolver;
pub use solver::SolveObjective;
pub use solver::WeightProblem;
pub use types::Allocation;
pub use types::Objective;
pub use types::OptimizerConfig;
pub use types::WeightBounds;
