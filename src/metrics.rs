//! Per-bar derived quantities
//!
//! Each bar gets its range, body and change from open. Quantities relative to
//! the previous close (gap, net change) need a predecessor and are `None` on
//! the first bar of a series. Percentages divide by the open or the previous
//! close; a zero denominator yields a non-finite value which the summarizer
//! drops.

use chrono::NaiveDate;
use serde::Serialize;

use crate::{Bar, CandleDirection, Metric, OHLCVExt};

#[inline]
fn pct(points: f64, base: f64) -> f64 {
    points / base * 100.0
}

/// Positive side of a signed quantity, zero otherwise
#[inline]
fn positive_part(x: f64) -> f64 {
    if x > 0.0 {
        x
    } else {
        0.0
    }
}

/// Magnitude of the negative side of a signed quantity, zero otherwise
#[inline]
fn negative_magnitude(x: f64) -> f64 {
    if x < 0.0 {
        x.abs()
    } else {
        0.0
    }
}

/// A bar with the quantities derived from it and its predecessor
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedBar {
    pub bar: Bar,
    pub range_points: f64,
    pub range_pct: f64,
    pub body_points: f64,
    pub body_pct: f64,
    pub prev_close: Option<f64>,
    /// `open - prev_close`
    pub gap_points: Option<f64>,
    pub gap_pct: Option<f64>,
    /// `close - prev_close`
    pub change_from_prev_close_points: Option<f64>,
    pub change_from_prev_close_pct: Option<f64>,
    /// `close - open`
    pub change_from_open_points: f64,
    pub change_from_open_pct: f64,
}

impl DerivedBar {
    pub fn new(bar: Bar, prev: Option<&Bar>) -> Self {
        let open = bar.open;
        let change_from_open = bar.change_from_open();
        let prev_close = prev.map(|p| p.close);
        let gap_points = prev_close.map(|pc| bar.open - pc);
        let change_points = prev_close.map(|pc| bar.close - pc);

        Self {
            bar,
            range_points: bar.range(),
            range_pct: pct(bar.range(), open),
            body_points: bar.body(),
            body_pct: pct(bar.body(), open),
            prev_close,
            gap_points,
            gap_pct: gap_points.zip(prev_close).map(|(g, pc)| pct(g, pc)),
            change_from_prev_close_points: change_points,
            change_from_prev_close_pct: change_points.zip(prev_close).map(|(c, pc)| pct(c, pc)),
            change_from_open_points: change_from_open,
            change_from_open_pct: pct(change_from_open, open),
        }
    }

    #[inline]
    pub fn date(&self) -> NaiveDate {
        self.bar.date
    }

    /// Green/red/flat by close versus own open
    #[inline]
    pub fn direction(&self) -> CandleDirection {
        CandleDirection::from_change(self.change_from_open_points)
    }

    /// Value this bar contributes to `metric`'s series.
    ///
    /// Directional metrics report the positive side (up moves) or the
    /// magnitude of the negative side (down moves), zero otherwise. Which bars
    /// actually enter a directional series is decided by the partition.
    /// Pullback metrics are not per-bar and always return `None`.
    pub fn value(&self, metric: Metric) -> Option<f64> {
        let gap = self.gap_points;
        let gap_pct = self.gap_pct;
        let prev = self.change_from_prev_close_points;
        let prev_pct = self.change_from_prev_close_pct;

        match metric {
            Metric::RangePoints => Some(self.range_points),
            Metric::RangePct => Some(self.range_pct),
            Metric::BodyPoints => Some(self.body_points),
            Metric::BodyPct => Some(self.body_pct),
            Metric::NetChangePoints => prev,
            Metric::NetChangePct => prev_pct,
            Metric::GapUpPoints => gap.map(positive_part),
            Metric::GapUpPct => gap_pct.map(positive_part),
            Metric::GapDownPoints => gap.map(negative_magnitude),
            Metric::GapDownPct => gap_pct.map(negative_magnitude),
            Metric::GreenPrevPoints => prev.map(positive_part),
            Metric::GreenPrevPct => prev_pct.map(positive_part),
            Metric::RedPrevPoints => prev.map(negative_magnitude),
            Metric::RedPrevPct => prev_pct.map(negative_magnitude),
            Metric::GreenOpenPoints => Some(positive_part(self.change_from_open_points)),
            Metric::GreenOpenPct => Some(positive_part(self.change_from_open_pct)),
            Metric::RedOpenPoints => Some(negative_magnitude(self.change_from_open_points)),
            Metric::RedOpenPct => Some(negative_magnitude(self.change_from_open_pct)),
            Metric::GreenPullbackPoints
            | Metric::GreenPullbackPct
            | Metric::RedPullbackPoints
            | Metric::RedPullbackPct => None,
        }
    }
}

/// Derive every bar of a chronologically ordered series
pub fn derive(bars: &[Bar]) -> Vec<DerivedBar> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let prev = i.checked_sub(1).and_then(|j| bars.get(j));
            DerivedBar::new(*bar, prev)
        })
        .collect()
}

/// Drop rows dated before `start`; they only served as predecessors
pub fn discard_before(rows: &mut Vec<DerivedBar>, start: NaiveDate) {
    rows.retain(|row| row.date() >= start);
}
