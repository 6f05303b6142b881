//! Distribution summaries for derived metric series
//!
//! Every named metric is reduced to a [`MetricStatBlock`]: min, max, mean,
//! sample standard deviation and the 1σ/2σ/3σ bands around the mean.
//!
//! Input series may contain `None` (no predecessor bar, no successor bar) and
//! non-finite values (division by a zero open or previous close). Both are
//! dropped before aggregation. An empty series yields [`MetricStatBlock::ZERO`].

use serde::{Deserialize, Serialize};

use crate::Metric;

/// Multipliers of the standard deviation used for the bands
pub const SIGMA_LEVELS: [f64; 3] = [1.0, 2.0, 3.0];

/// `mean - k*std ..= mean + k*std`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SigmaBand {
    pub lower: f64,
    pub upper: f64,
}

impl SigmaBand {
    pub const ZERO: Self = Self {
        lower: 0.0,
        upper: 0.0,
    };

    #[inline]
    const fn collapsed(mean: f64) -> Self {
        Self {
            lower: mean,
            upper: mean,
        }
    }
}

/// Aggregate statistics of one metric series
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricStatBlock {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Sample standard deviation (n - 1). Zero for fewer than two values.
    pub std: f64,
    pub sigma_1: SigmaBand,
    pub sigma_2: SigmaBand,
    pub sigma_3: SigmaBand,
    /// Number of finite values the block was computed from
    pub count: usize,
}

impl MetricStatBlock {
    /// Block reported for an empty series
    pub const ZERO: Self = Self {
        min: 0.0,
        max: 0.0,
        mean: 0.0,
        std: 0.0,
        sigma_1: SigmaBand::ZERO,
        sigma_2: SigmaBand::ZERO,
        sigma_3: SigmaBand::ZERO,
        count: 0,
    };

    #[inline]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Band for `k` standard deviations, `k` in 1..=3
    pub fn band(&self, k: usize) -> Option<SigmaBand> {
        match k {
            1 => Some(self.sigma_1),
            2 => Some(self.sigma_2),
            3 => Some(self.sigma_3),
            _ => None,
        }
    }

    #[inline]
    pub fn bands(&self) -> [SigmaBand; 3] {
        [self.sigma_1, self.sigma_2, self.sigma_3]
    }

    /// `(suffix, value)` pairs in export order
    pub fn flat_entries(&self) -> [(&'static str, f64); 10] {
        [
            ("min", self.min),
            ("max", self.max),
            ("avg", self.mean),
            ("std", self.std),
            ("1std_lower", self.sigma_1.lower),
            ("1std_upper", self.sigma_1.upper),
            ("2std_lower", self.sigma_2.lower),
            ("2std_upper", self.sigma_2.upper),
            ("3std_lower", self.sigma_3.lower),
            ("3std_upper", self.sigma_3.upper),
        ]
    }
}

/// Summarize a series, dropping `None` and non-finite entries.
///
/// With `always_nonnegative`, band lower bounds below zero are clamped to zero.
/// Upper bounds are never clamped.
pub fn summarize<I>(values: I, always_nonnegative: bool) -> MetricStatBlock
where
    I: IntoIterator<Item = Option<f64>>,
{
    let clean: Vec<f64> = values
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .collect();

    if clean.is_empty() {
        return MetricStatBlock::ZERO;
    }

    let n = clean.len();
    let (min, max, sum) = clean.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY, 0.0),
        |(lo, hi, s), &v| (lo.min(v), hi.max(v), s + v),
    );
    let mean = sum / n as f64;

    let std = if n < 2 {
        0.0
    } else {
        let ss: f64 = clean.iter().map(|v| (v - mean) * (v - mean)).sum();
        (ss / (n - 1) as f64).sqrt()
    };
    // Overflowed variance is treated like an undefined one
    let std = if std.is_finite() { std } else { 0.0 };

    let band = |k: f64| {
        if std == 0.0 {
            return SigmaBand::collapsed(mean);
        }
        let lower = mean - k * std;
        SigmaBand {
            lower: if always_nonnegative && lower < 0.0 {
                0.0
            } else {
                lower
            },
            upper: mean + k * std,
        }
    };

    MetricStatBlock {
        min,
        max,
        mean,
        std,
        sigma_1: band(SIGMA_LEVELS[0]),
        sigma_2: band(SIGMA_LEVELS[1]),
        sigma_3: band(SIGMA_LEVELS[2]),
        count: n,
    }
}

/// Summarize a series with the clamping rule of `metric`
#[inline]
pub fn summarize_metric<I>(metric: Metric, values: I) -> MetricStatBlock
where
    I: IntoIterator<Item = Option<f64>>,
{
    summarize(values, metric.always_nonnegative())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn test_empty_series_is_zero_block() {
        let block = summarize(Vec::new(), true);
        assert!(block.is_zero());
        assert_eq!(block, MetricStatBlock::ZERO);
    }

    #[test]
    fn test_only_missing_and_infinite_is_zero_block() {
        let block = summarize(
            vec![None, Some(f64::INFINITY), Some(f64::NEG_INFINITY), Some(f64::NAN)],
            false,
        );
        assert!(block.is_zero());
    }

    #[test]
    fn test_single_value_collapses_bands() {
        let block = summarize(some(&[4.5]), false);
        assert_eq!(block.min, 4.5);
        assert_eq!(block.max, 4.5);
        assert_eq!(block.mean, 4.5);
        assert_eq!(block.std, 0.0);
        for band in block.bands() {
            assert_eq!(band, SigmaBand { lower: 4.5, upper: 4.5 });
        }
        assert_eq!(block.count, 1);
    }

    #[test]
    fn test_identical_values_collapse_bands() {
        let block = summarize(some(&[2.0, 2.0, 2.0]), true);
        assert_eq!(block.std, 0.0);
        assert_eq!(block.sigma_3, SigmaBand { lower: 2.0, upper: 2.0 });
    }

    #[test]
    fn test_sample_standard_deviation() {
        // mean 5, squared deviations sum 32, n - 1 = 7
        let block = summarize(some(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), false);
        assert_eq!(block.mean, 5.0);
        assert!((block.std - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert!((block.sigma_1.lower - (5.0 - block.std)).abs() < 1e-12);
        assert!((block.sigma_2.upper - (5.0 + 2.0 * block.std)).abs() < 1e-12);
    }

    #[test]
    fn test_nonnegative_clamps_lower_only() {
        let block = summarize(some(&[0.1, 0.2, 10.0]), true);
        assert_eq!(block.sigma_1.lower, 0.0);
        assert_eq!(block.sigma_3.lower, 0.0);
        assert!(block.sigma_3.upper > block.mean);

        let signed = summarize(some(&[0.1, 0.2, 10.0]), false);
        assert!(signed.sigma_1.lower < 0.0);
        assert_eq!(signed.sigma_1.upper, block.sigma_1.upper);
    }

    #[test]
    fn test_non_finite_entries_dropped() {
        let block = summarize(vec![Some(1.0), Some(f64::INFINITY), None, Some(3.0)], false);
        assert_eq!(block.count, 2);
        assert_eq!(block.mean, 2.0);
        assert_eq!(block.max, 3.0);
    }

    #[test]
    fn test_band_lookup() {
        let block = summarize(some(&[1.0, 3.0]), false);
        assert_eq!(block.band(1), Some(block.sigma_1));
        assert_eq!(block.band(3), Some(block.sigma_3));
        assert_eq!(block.band(0), None);
        assert_eq!(block.band(4), None);
        assert!(block.sigma_1.lower < block.mean && block.mean < block.sigma_1.upper);
        assert!(block.sigma_2.lower < block.sigma_1.lower);
    }

    #[test]
    fn test_metric_clamping_rule() {
        let values = some(&[0.5, 1.0, 9.0]);
        let range = summarize_metric(Metric::RangePoints, values.clone());
        let net = summarize_metric(Metric::NetChangePoints, values);
        assert_eq!(range.sigma_1.lower, 0.0);
        assert!(net.sigma_1.lower < 0.0);
    }
}
