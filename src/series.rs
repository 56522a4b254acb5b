//! # Asset Series
//!
//! $$
//! r_t = \frac{p_t - p_{t-1}}{p_{t-1}}
//! $$
//!
//! Validated per-asset time series, return derivation and alignment.

use chrono::NaiveDate;

use crate::error::PortfolioError;

/// Interpretation of the values carried by an [`AssetSeries`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SeriesKind {
  /// Values are price levels; per-period returns are derived before use.
  #[default]
  Price,
  /// Values are pre-computed period returns, used as-is.
  Return,
}

/// Ordered `(timestamp, value)` observations for a single asset.
///
/// Construction rejects non-finite values and duplicate or decreasing
/// timestamps, so downstream code never sees NaN gaps or unordered data.
#[derive(Clone, Debug)]
pub struct AssetSeries {
  id: String,
  points: Vec<(NaiveDate, f64)>,
}

impl AssetSeries {
  /// Build a validated series for one asset.
  pub fn new(
    id: impl Into<String>,
    points: Vec<(NaiveDate, f64)>,
  ) -> Result<Self, PortfolioError> {
    let id = id.into();

    for (i, (date, value)) in points.iter().enumerate() {
      if !value.is_finite() {
        return Err(PortfolioError::NonFiniteValue {
          asset: id,
          index: i,
        });
      }
      if i > 0 && *date <= points[i - 1].0 {
        return Err(PortfolioError::UnorderedTimestamps {
          asset: id,
          index: i,
        });
      }
    }

    Ok(Self { id, points })
  }

  /// Asset identifier.
  pub fn id(&self) -> &str {
    &self.id
  }

  /// Number of observations.
  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  /// Borrow the `(timestamp, value)` observations.
  pub fn points(&self) -> &[(NaiveDate, f64)] {
    &self.points
  }

  /// Period-over-period percentage change, timestamped at the later period.
  ///
  /// A zero price makes the next return undefined and fails with
  /// [`PortfolioError::DivideByZero`] instead of producing Inf/NaN.
  pub fn pct_change(&self) -> Result<AssetSeries, PortfolioError> {
    let mut out = Vec::with_capacity(self.points.len().saturating_sub(1));

    for i in 1..self.points.len() {
      let prev = self.points[i - 1].1;
      if prev == 0.0 {
        return Err(PortfolioError::DivideByZero {
          asset: self.id.clone(),
          index: i - 1,
        });
      }

      let r = (self.points[i].1 - prev) / prev;
      if !r.is_finite() {
        return Err(PortfolioError::NonFiniteValue {
          asset: self.id.clone(),
          index: i,
        });
      }
      out.push((self.points[i].0, r));
    }

    Ok(AssetSeries {
      id: self.id.clone(),
      points: out,
    })
  }

  /// Trailing rolling mean; rows before a full window are dropped.
  pub fn rolling_mean(&self, window: usize) -> AssetSeries {
    let mut out = Vec::new();

    if window >= 1 && window <= self.points.len() {
      for i in (window - 1)..self.points.len() {
        let slice = &self.points[i + 1 - window..=i];
        let mean = slice.iter().map(|(_, v)| v).sum::<f64>() / window as f64;
        out.push((self.points[i].0, mean));
      }
    }

    AssetSeries {
      id: self.id.clone(),
      points: out,
    }
  }

  /// Trailing rolling sample standard deviation; needs a window of at least 2.
  pub fn rolling_std(&self, window: usize) -> AssetSeries {
    let mut out = Vec::new();

    if window >= 2 && window <= self.points.len() {
      for i in (window - 1)..self.points.len() {
        let slice = &self.points[i + 1 - window..=i];
        let mean = slice.iter().map(|(_, v)| v).sum::<f64>() / window as f64;
        let var = slice
          .iter()
          .map(|(_, v)| {
            let d = v - mean;
            d * d
          })
          .sum::<f64>()
          / (window - 1) as f64;
        out.push((self.points[i].0, var.sqrt()));
      }
    }

    AssetSeries {
      id: self.id.clone(),
      points: out,
    }
  }
}

/// Inner join of multiple series on their common timestamps.
///
/// Returns the sorted common dates and, per input series, the values on
/// those dates in the same order. Series without overlap yield empty rows.
pub fn align_series(series: &[AssetSeries]) -> (Vec<NaiveDate>, Vec<Vec<f64>>) {
  if series.is_empty() {
    return (Vec::new(), Vec::new());
  }

  let mut common: Vec<NaiveDate> = series[0].points.iter().map(|(d, _)| *d).collect();
  for s in &series[1..] {
    let dates: std::collections::BTreeSet<NaiveDate> =
      s.points.iter().map(|(d, _)| *d).collect();
    common.retain(|d| dates.contains(d));
  }

  let rows = series
    .iter()
    .map(|s| {
      let by_date: std::collections::BTreeMap<NaiveDate, f64> =
        s.points.iter().copied().collect();
      common.iter().map(|d| by_date[d]).collect()
    })
    .collect();

  (common, rows)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
  }

  #[test]
  fn construction_rejects_non_finite_values() {
    let err = AssetSeries::new("AAA", vec![(d(2024, 1, 2), 100.0), (d(2024, 1, 3), f64::NAN)])
      .unwrap_err();

    assert!(matches!(
      err,
      PortfolioError::NonFiniteValue { ref asset, index: 1 } if asset == "AAA"
    ));
  }

  #[test]
  fn construction_rejects_duplicate_and_decreasing_timestamps() {
    let dup = AssetSeries::new(
      "AAA",
      vec![(d(2024, 1, 2), 100.0), (d(2024, 1, 2), 101.0)],
    );
    let dec = AssetSeries::new(
      "AAA",
      vec![(d(2024, 1, 3), 100.0), (d(2024, 1, 2), 101.0)],
    );

    assert!(matches!(dup, Err(PortfolioError::UnorderedTimestamps { index: 1, .. })));
    assert!(matches!(dec, Err(PortfolioError::UnorderedTimestamps { index: 1, .. })));
  }

  #[test]
  fn pct_change_matches_hand_computed_returns() {
    let s = AssetSeries::new(
      "AAA",
      vec![
        (d(2024, 1, 2), 100.0),
        (d(2024, 1, 3), 110.0),
        (d(2024, 1, 4), 99.0),
      ],
    )
    .unwrap();

    let r = s.pct_change().unwrap();
    assert_eq!(r.len(), 2);
    assert!((r.points()[0].1 - 0.1).abs() < 1e-12);
    assert!((r.points()[1].1 + 0.1).abs() < 1e-12);
    assert_eq!(r.points()[0].0, d(2024, 1, 3));
  }

  #[test]
  fn pct_change_rejects_zero_price() {
    let s = AssetSeries::new(
      "AAA",
      vec![
        (d(2024, 1, 2), 100.0),
        (d(2024, 1, 3), 0.0),
        (d(2024, 1, 4), 99.0),
      ],
    )
    .unwrap();

    let err = s.pct_change().unwrap_err();
    assert!(matches!(
      err,
      PortfolioError::DivideByZero { ref asset, index: 1 } if asset == "AAA"
    ));
  }

  #[test]
  fn alignment_keeps_only_common_dates() {
    let a = AssetSeries::new(
      "AAA",
      vec![
        (d(2024, 1, 2), 0.01),
        (d(2024, 1, 3), 0.02),
        (d(2024, 1, 4), 0.03),
      ],
    )
    .unwrap();
    let b = AssetSeries::new(
      "BBB",
      vec![(d(2024, 1, 3), 0.05), (d(2024, 1, 4), 0.06), (d(2024, 1, 5), 0.07)],
    )
    .unwrap();

    let (dates, rows) = align_series(&[a, b]);
    assert_eq!(dates, vec![d(2024, 1, 3), d(2024, 1, 4)]);
    assert_eq!(rows[0], vec![0.02, 0.03]);
    assert_eq!(rows[1], vec![0.05, 0.06]);
  }

  #[test]
  fn alignment_with_disjoint_dates_is_empty() {
    let a = AssetSeries::new("AAA", vec![(d(2024, 1, 2), 0.01)]).unwrap();
    let b = AssetSeries::new("BBB", vec![(d(2024, 1, 3), 0.05)]).unwrap();

    let (dates, rows) = align_series(&[a, b]);
    assert!(dates.is_empty());
    assert!(rows.iter().all(|r| r.is_empty()));
  }

  #[test]
  fn rolling_mean_drops_partial_windows() {
    let s = AssetSeries::new(
      "AAA",
      vec![
        (d(2024, 1, 2), 1.0),
        (d(2024, 1, 3), 2.0),
        (d(2024, 1, 4), 3.0),
        (d(2024, 1, 5), 6.0),
      ],
    )
    .unwrap();

    let m = s.rolling_mean(3);
    assert_eq!(m.len(), 2);
    assert_eq!(m.points()[0].0, d(2024, 1, 4));
    assert!((m.points()[0].1 - 2.0).abs() < 1e-12);
    assert!((m.points()[1].1 - 11.0 / 3.0).abs() < 1e-12);
  }

  #[test]
  fn rolling_std_uses_sample_variance() {
    let s = AssetSeries::new(
      "AAA",
      vec![(d(2024, 1, 2), 1.0), (d(2024, 1, 3), 3.0)],
    )
    .unwrap();

    let v = s.rolling_std(2);
    assert_eq!(v.len(), 1);
    assert!((v.points()[0].1 - 2.0_f64.sqrt()).abs() < 1e-12);
  }

  #[test]
  fn rolling_window_larger_than_series_is_empty() {
    let s = AssetSeries::new("AAA", vec![(d(2024, 1, 2), 1.0)]).unwrap();

    assert!(s.rolling_mean(5).is_empty());
    assert!(s.rolling_std(5).is_empty());
  }
}
