//! Sign-based subsets of the analyzed bars
//!
//! Membership uses strict comparisons: a zero gap or zero change belongs to
//! neither side. A bar without a predecessor belongs to no gap or
//! previous-close partition.

use serde::Serialize;

use crate::{DerivedBar, Threshold, ThresholdMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionKind {
    /// `gap_points > 0`
    GapUp,
    /// `gap_points < 0`
    GapDown,
    /// `close > prev_close`
    GreenFromPrevClose,
    /// `close < prev_close`
    RedFromPrevClose,
    /// `close > open`
    GreenFromOpen,
    /// `close < open`
    RedFromOpen,
}

impl PartitionKind {
    pub const ALL: [PartitionKind; 6] = [
        PartitionKind::GapUp,
        PartitionKind::GapDown,
        PartitionKind::GreenFromPrevClose,
        PartitionKind::RedFromPrevClose,
        PartitionKind::GreenFromOpen,
        PartitionKind::RedFromOpen,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            PartitionKind::GapUp => "gap_up",
            PartitionKind::GapDown => "gap_down",
            PartitionKind::GreenFromPrevClose => "green_from_prev_close",
            PartitionKind::RedFromPrevClose => "red_from_prev_close",
            PartitionKind::GreenFromOpen => "green_from_open",
            PartitionKind::RedFromOpen => "red_from_open",
        }
    }

    pub fn contains(self, row: &DerivedBar) -> bool {
        let positive = |v: Option<f64>| v.is_some_and(|x| x > 0.0);
        let negative = |v: Option<f64>| v.is_some_and(|x| x < 0.0);
        match self {
            PartitionKind::GapUp => positive(row.gap_points),
            PartitionKind::GapDown => negative(row.gap_points),
            PartitionKind::GreenFromPrevClose => positive(row.change_from_prev_close_points),
            PartitionKind::RedFromPrevClose => negative(row.change_from_prev_close_points),
            PartitionKind::GreenFromOpen => row.change_from_open_points > 0.0,
            PartitionKind::RedFromOpen => row.change_from_open_points < 0.0,
        }
    }

    #[inline]
    const fn index(self) -> usize {
        self as usize
    }
}

/// All analyzed bars plus each sign partition, borrowing the rows
#[derive(Debug, Clone)]
pub struct Partitions<'a> {
    all: Vec<&'a DerivedBar>,
    parts: [Vec<&'a DerivedBar>; 6],
}

impl<'a> Partitions<'a> {
    pub fn build(rows: &'a [DerivedBar]) -> Self {
        let all: Vec<&DerivedBar> = rows.iter().collect();
        let parts = PartitionKind::ALL
            .map(|kind| all.iter().copied().filter(|row| kind.contains(row)).collect());
        Self { all, parts }
    }

    #[inline]
    pub fn all(&self) -> &[&'a DerivedBar] {
        &self.all
    }

    #[inline]
    pub fn get(&self, kind: PartitionKind) -> &[&'a DerivedBar] {
        &self.parts[kind.index()]
    }

    /// Rows for a metric's partition; `None` selects every row
    #[inline]
    pub fn rows_for(&self, kind: Option<PartitionKind>) -> &[&'a DerivedBar] {
        match kind {
            Some(kind) => self.get(kind),
            None => self.all(),
        }
    }

    #[inline]
    pub fn total(&self) -> usize {
        self.all.len()
    }

    /// Bars with `close == open`
    pub fn flat_count(&self) -> usize {
        self.total()
            - self.get(PartitionKind::GreenFromOpen).len()
            - self.get(PartitionKind::RedFromOpen).len()
    }
}

/// Whether a bar's body or full range, as a percent of its open, reaches `threshold`
pub fn meets_threshold(row: &DerivedBar, threshold: Threshold, mode: ThresholdMode) -> bool {
    let measured = match mode {
        ThresholdMode::Body => row.body_pct,
        ThresholdMode::Candle => row.range_pct,
    };
    measured >= threshold.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::derive;
    use crate::Bar;
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn rows() -> Vec<DerivedBar> {
        derive(&[
            Bar::new(date(4), 100.0, 105.0, 98.0, 102.0, 1.0),
            Bar::new(date(5), 103.0, 104.0, 101.0, 101.0, 1.0),
            // zero gap, flat candle, unchanged close
            Bar::new(date(6), 101.0, 102.0, 100.0, 101.0, 1.0),
            Bar::new(date(7), 99.0, 100.0, 97.0, 98.0, 1.0),
        ])
    }

    #[test]
    fn test_partition_membership() {
        let rows = rows();
        let parts = Partitions::build(&rows);

        assert_eq!(parts.total(), 4);
        assert_eq!(parts.get(PartitionKind::GapUp).len(), 1);
        assert_eq!(parts.get(PartitionKind::GapDown).len(), 1);
        assert_eq!(parts.get(PartitionKind::GreenFromPrevClose).len(), 0);
        assert_eq!(parts.get(PartitionKind::RedFromPrevClose).len(), 2);
        assert_eq!(parts.get(PartitionKind::GreenFromOpen).len(), 1);
        assert_eq!(parts.get(PartitionKind::RedFromOpen).len(), 2);
        assert_eq!(parts.flat_count(), 1);
    }

    #[test]
    fn test_first_bar_in_no_predecessor_partition() {
        let rows = rows();
        let parts = Partitions::build(&rows);
        for kind in [
            PartitionKind::GapUp,
            PartitionKind::GapDown,
            PartitionKind::GreenFromPrevClose,
            PartitionKind::RedFromPrevClose,
        ] {
            assert!(parts.get(kind).iter().all(|r| r.date() != date(4)));
        }
    }

    #[test]
    fn test_rows_for() {
        let rows = rows();
        let parts = Partitions::build(&rows);
        assert_eq!(parts.rows_for(None).len(), 4);
        assert_eq!(parts.rows_for(Some(PartitionKind::GapUp))[0].date(), date(5));
    }

    #[test]
    fn test_meets_threshold() {
        let rows = rows();
        let t = Threshold::new(2.0).unwrap();
        // body 2%, range 7%
        assert!(meets_threshold(&rows[0], t, ThresholdMode::Body));
        assert!(meets_threshold(&rows[0], Threshold::new(7.0).unwrap(), ThresholdMode::Candle));
        // body 2/103 < 2%
        assert!(!meets_threshold(&rows[1], t, ThresholdMode::Body));
        assert!(meets_threshold(&rows[1], t, ThresholdMode::Candle));
    }
}
