//! # Return Statistics Estimator
//!
//! $$
//! \hat{\Sigma}_{ij} = \frac{A}{T-1}\sum_{t=1}^{T}(r_{t,i}-\bar r_i)(r_{t,j}-\bar r_j)
//! $$
//!
//! Annualized mean-return vector and sample covariance matrix from
//! per-asset series.

use std::collections::HashSet;

use nalgebra::DMatrix;

use crate::error::PortfolioError;
use crate::series::align_series;
use crate::series::AssetSeries;
use crate::series::SeriesKind;

/// Estimator configuration.
#[derive(Clone, Copy, Debug)]
pub struct EstimatorConfig {
  /// Whether input series carry price levels or pre-computed returns.
  pub series_kind: SeriesKind,
  /// Multiplier from per-period to annual statistics (252 for daily data).
  pub annualization_factor: u32,
}

impl Default for EstimatorConfig {
  fn default() -> Self {
    Self {
      series_kind: SeriesKind::Price,
      annualization_factor: 252,
    }
  }
}

/// Annualized risk-return model for a fixed set of assets.
///
/// `mean_returns` and `covariance` share the ordering of `assets`; the
/// covariance is symmetric with a non-negative diagonal by construction.
#[derive(Clone, Debug)]
pub struct ReturnEstimates {
  /// Asset identifiers in input order.
  pub assets: Vec<String>,
  /// Annualized expected return per asset.
  pub mean_returns: Vec<f64>,
  /// Annualized sample covariance of per-period returns.
  pub covariance: DMatrix<f64>,
  /// Number of overlapping observations the statistics were estimated from.
  pub observations: usize,
}

impl ReturnEstimates {
  /// Number of assets in the model.
  pub fn asset_count(&self) -> usize {
    self.assets.len()
  }

  /// Annualized expected return for one asset, if present.
  pub fn expected_return(&self, asset: &str) -> Option<f64> {
    let i = self.assets.iter().position(|a| a == asset)?;
    self.mean_returns.get(i).copied()
  }

  /// Annualized return variance for one asset, if present.
  pub fn variance(&self, asset: &str) -> Option<f64> {
    let i = self.assets.iter().position(|a| a == asset)?;
    Some(self.covariance[(i, i)])
  }
}

/// Converts raw per-asset series into a consistent [`ReturnEstimates`].
///
/// Pure function of its inputs; no state is retained across calls.
#[derive(Clone, Debug, Default)]
pub struct ReturnEstimator {
  config: EstimatorConfig,
}

impl ReturnEstimator {
  /// Construct an estimator with explicit configuration.
  pub fn new(config: EstimatorConfig) -> Self {
    Self { config }
  }

  /// Borrow estimator configuration.
  pub fn config(&self) -> &EstimatorConfig {
    &self.config
  }

  /// Estimate annualized mean returns and covariance from per-asset series.
  ///
  /// Price series are converted to percentage returns first; all series are
  /// then inner-joined on common timestamps. Fewer than 2 overlapping
  /// observations fail with [`PortfolioError::InsufficientData`].
  pub fn estimate(&self, series: &[AssetSeries]) -> Result<ReturnEstimates, PortfolioError> {
    if series.is_empty() {
      return Err(PortfolioError::InsufficientData {
        required: 1,
        available: 0,
      });
    }

    let mut seen = HashSet::new();
    for s in series {
      if !seen.insert(s.id()) {
        return Err(PortfolioError::DuplicateAsset {
          asset: s.id().to_string(),
        });
      }
    }

    let returns: Vec<AssetSeries> = match self.config.series_kind {
      SeriesKind::Price => series
        .iter()
        .map(|s| s.pct_change())
        .collect::<Result<_, _>>()?,
      SeriesKind::Return => series.to_vec(),
    };

    let (dates, rows) = align_series(&returns);
    let t = dates.len();
    if t < 2 {
      return Err(PortfolioError::InsufficientData {
        required: 2,
        available: t,
      });
    }

    let n = series.len();
    let factor = f64::from(self.config.annualization_factor);

    let period_means: Vec<f64> = rows
      .iter()
      .map(|r| r.iter().sum::<f64>() / t as f64)
      .collect();

    let mut covariance = DMatrix::zeros(n, n);
    for i in 0..n {
      for j in i..n {
        let mut acc = 0.0;
        for k in 0..t {
          acc += (rows[i][k] - period_means[i]) * (rows[j][k] - period_means[j]);
        }
        let c = acc / (t - 1) as f64 * factor;
        covariance[(i, j)] = c;
        covariance[(j, i)] = c;
      }
      // rounding can leave a tiny negative variance on the diagonal
      covariance[(i, i)] = covariance[(i, i)].max(0.0);
    }

    Ok(ReturnEstimates {
      assets: series.iter().map(|s| s.id().to_string()).collect(),
      mean_returns: period_means.iter().map(|m| m * factor).collect(),
      covariance,
      observations: t,
    })
  }
}
