//! What the next bar does after a large move
//!
//! A bar qualifies when its body (or full range) as a percent of its open
//! reaches the threshold. For a qualifying green bar the observation is
//! `next.low - close`; for a red bar it is `next.high - close`. Negative
//! values after a green bar are pullbacks, positive values after a red bar
//! are bounces. The last bar qualifies but has no successor, so it is counted
//! without producing an observation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::partition::meets_threshold;
use crate::{CandleDirection, DerivedBar, Metric, PullbackConfig};

/// One qualifying bar and how far the next bar's extreme reached from its close
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PullbackObservation {
    pub date: NaiveDate,
    pub direction: CandleDirection,
    pub points: f64,
    /// `points / close * 100`
    pub pct: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullbackCounts {
    pub green_threshold_count: usize,
    pub red_threshold_count: usize,
    pub green_pullback_count: usize,
    pub red_pullback_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullbackAnalysis {
    pub green: Vec<PullbackObservation>,
    pub red: Vec<PullbackObservation>,
    pub green_threshold_count: usize,
    pub red_threshold_count: usize,
}

impl PullbackAnalysis {
    pub fn counts(&self) -> PullbackCounts {
        let finite = |obs: &[PullbackObservation]| {
            obs.iter().filter(|o| o.points.is_finite()).count()
        };
        PullbackCounts {
            green_threshold_count: self.green_threshold_count,
            red_threshold_count: self.red_threshold_count,
            green_pullback_count: finite(&self.green),
            red_pullback_count: finite(&self.red),
        }
    }

    /// Series for a pullback metric, `None` when it has no observations
    /// or the metric is not a pullback metric.
    pub fn series(&self, metric: Metric) -> Option<Vec<Option<f64>>> {
        let (observations, pick): (&[PullbackObservation], fn(&PullbackObservation) -> f64) =
            match metric {
                Metric::GreenPullbackPoints => (self.green.as_slice(), |o| o.points),
                Metric::GreenPullbackPct => (self.green.as_slice(), |o| o.pct),
                Metric::RedPullbackPoints => (self.red.as_slice(), |o| o.points),
                Metric::RedPullbackPct => (self.red.as_slice(), |o| o.pct),
                _ => return None,
            };
        if observations.is_empty() {
            return None;
        }
        Some(observations.iter().map(|o| Some(pick(o))).collect())
    }
}

/// Run the pullback analysis over analyzed rows in chronological order
pub fn analyze(rows: &[DerivedBar], config: PullbackConfig) -> PullbackAnalysis {
    let mut out = PullbackAnalysis::default();

    for (i, row) in rows.iter().enumerate() {
        if !meets_threshold(row, config.threshold, config.mode) {
            continue;
        }
        let next = rows.get(i + 1);
        let (extreme, observations, qualifying) = match row.direction() {
            CandleDirection::Green => (
                next.map(|n| n.bar.low),
                &mut out.green,
                &mut out.green_threshold_count,
            ),
            CandleDirection::Red => (
                next.map(|n| n.bar.high),
                &mut out.red,
                &mut out.red_threshold_count,
            ),
            // Flat bars can qualify on range but belong to neither side
            CandleDirection::Flat => continue,
        };

        *qualifying += 1;
        if let Some(extreme) = extreme {
            let close = row.bar.close;
            let points = extreme - close;
            observations.push(PullbackObservation {
                date: row.date(),
                direction: row.direction(),
                points,
                pct: points / close * 100.0,
            });
        }
    }

    debug!(
        threshold = config.threshold.get(),
        mode = %config.mode,
        green = out.green_threshold_count,
        red = out.red_threshold_count,
        "pullback analysis"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::derive;
    use crate::{Bar, Threshold, ThresholdMode};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn config(threshold: f64, mode: ThresholdMode) -> PullbackConfig {
        PullbackConfig {
            threshold: Threshold::new(threshold).unwrap(),
            mode,
        }
    }

    #[test]
    fn test_green_pullback_observation() {
        // body 3 on open 100 = 3%, next low 101.5 -> -1.5
        let rows = derive(&[
            Bar::new(date(4), 100.0, 103.5, 99.5, 103.0, 1.0),
            Bar::new(date(5), 103.0, 104.0, 101.5, 102.0, 1.0),
        ]);
        let analysis = analyze(&rows, config(2.0, ThresholdMode::Body));

        assert_eq!(analysis.green_threshold_count, 1);
        assert_eq!(analysis.red_threshold_count, 0);
        assert_eq!(analysis.green.len(), 1);
        let obs = analysis.green[0];
        assert_eq!(obs.points, -1.5);
        assert!((obs.pct - (-1.5 / 103.0 * 100.0)).abs() < 1e-12);
        assert_eq!(obs.date, date(4));
    }

    #[test]
    fn test_red_bounce_uses_next_high() {
        let rows = derive(&[
            Bar::new(date(4), 100.0, 100.5, 94.0, 95.0, 1.0),
            Bar::new(date(5), 95.0, 97.0, 94.5, 96.0, 1.0),
        ]);
        let analysis = analyze(&rows, config(2.0, ThresholdMode::Body));
        assert_eq!(analysis.red_threshold_count, 1);
        assert_eq!(analysis.red[0].points, 2.0);
    }

    #[test]
    fn test_last_bar_counted_without_observation() {
        let rows = derive(&[Bar::new(date(4), 100.0, 106.0, 99.0, 105.0, 1.0)]);
        let analysis = analyze(&rows, config(2.0, ThresholdMode::Body));
        assert_eq!(analysis.green_threshold_count, 1);
        assert!(analysis.green.is_empty());

        let counts = analysis.counts();
        assert_eq!(counts.green_pullback_count, 0);
        assert_eq!(analysis.series(Metric::GreenPullbackPoints), None);
    }

    #[test]
    fn test_candle_mode_uses_range() {
        // body 0.5%, range 4%
        let rows = derive(&[
            Bar::new(date(4), 100.0, 102.0, 98.0, 100.5, 1.0),
            Bar::new(date(5), 100.5, 101.0, 99.0, 100.0, 1.0),
        ]);
        assert_eq!(analyze(&rows, config(2.0, ThresholdMode::Body)).green_threshold_count, 0);
        let candle = analyze(&rows, config(2.0, ThresholdMode::Candle));
        assert_eq!(candle.green_threshold_count, 1);
        assert_eq!(candle.green[0].points, -1.5);
    }

    #[test]
    fn test_series_selection() {
        let rows = derive(&[
            Bar::new(date(4), 100.0, 103.5, 99.5, 103.0, 1.0),
            Bar::new(date(5), 103.0, 104.0, 101.5, 102.0, 1.0),
        ]);
        let analysis = analyze(&rows, config(2.0, ThresholdMode::Body));
        assert_eq!(
            analysis.series(Metric::GreenPullbackPoints),
            Some(vec![Some(-1.5)])
        );
        assert_eq!(analysis.series(Metric::RedPullbackPct), None);
        assert_eq!(analysis.series(Metric::RangePoints), None);
    }
}
