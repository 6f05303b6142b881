//! Assembled output of one pipeline run

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{Metric, MetricStatBlock, PartitionKind, Partitions, PullbackCounts};

/// Bar tallies over the analyzed window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CandleCounts {
    pub total_candles: usize,
    pub green_candles_count: usize,
    pub red_candles_count: usize,
    pub flat_candles_count: usize,
    pub gap_up_candles: usize,
    pub gap_down_candles: usize,
    /// Zero gap or no previous close
    pub no_gap_candles: usize,
}

impl CandleCounts {
    pub fn tally(partitions: &Partitions<'_>) -> Self {
        let total = partitions.total();
        let gap_up = partitions.get(PartitionKind::GapUp).len();
        let gap_down = partitions.get(PartitionKind::GapDown).len();
        Self {
            total_candles: total,
            green_candles_count: partitions.get(PartitionKind::GreenFromOpen).len(),
            red_candles_count: partitions.get(PartitionKind::RedFromOpen).len(),
            flat_candles_count: partitions.flat_count(),
            gap_up_candles: gap_up,
            gap_down_candles: gap_down,
            no_gap_candles: total - gap_up - gap_down,
        }
    }

    /// Share of green bars in percent, zero for an empty window
    pub fn green_percentage(&self) -> f64 {
        if self.total_candles == 0 {
            return 0.0;
        }
        self.green_candles_count as f64 / self.total_candles as f64 * 100.0
    }
}

/// Statistics for one analysis run. Immutable once assembled.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatisticsResult {
    metrics: BTreeMap<Metric, MetricStatBlock>,
    counts: CandleCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pullback: Option<PullbackCounts>,
}

impl StatisticsResult {
    pub(crate) fn new(
        metrics: BTreeMap<Metric, MetricStatBlock>,
        counts: CandleCounts,
        pullback: Option<PullbackCounts>,
    ) -> Self {
        Self {
            metrics,
            counts,
            pullback,
        }
    }

    /// Result for an empty window: no metrics, all counts zero
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty() && self.counts.total_candles == 0
    }

    /// Block for `metric`; `None` if it was not computed (pullback disabled)
    #[inline]
    pub fn get(&self, metric: Metric) -> Option<&MetricStatBlock> {
        self.metrics.get(&metric)
    }

    /// Computed metrics in declaration order
    pub fn metrics(&self) -> impl Iterator<Item = (Metric, &MetricStatBlock)> {
        self.metrics.iter().map(|(m, b)| (*m, b))
    }

    #[inline]
    pub fn counts(&self) -> &CandleCounts {
        &self.counts
    }

    #[inline]
    pub fn pullback_counts(&self) -> Option<&PullbackCounts> {
        self.pullback.as_ref()
    }

    /// Flat `"<metric>_<stat>"` / count mapping, e.g. `range_points_1std_lower`.
    ///
    /// Empty for an empty result.
    pub fn to_flat_map(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        if self.is_empty() {
            return map;
        }

        for (metric, block) in &self.metrics {
            for (suffix, value) in block.flat_entries() {
                map.insert(format!("{}_{}", metric.name(), suffix), value);
            }
        }

        let c = &self.counts;
        let counts = [
            ("total_candles", c.total_candles),
            ("green_candles_count", c.green_candles_count),
            ("red_candles_count", c.red_candles_count),
            ("flat_candles_count", c.flat_candles_count),
            ("gap_up_candles", c.gap_up_candles),
            ("gap_down_candles", c.gap_down_candles),
            ("no_gap_candles", c.no_gap_candles),
        ];
        for (key, n) in counts {
            map.insert(key.to_string(), n as f64);
        }
        map.insert("green_candles_percentage".to_string(), c.green_percentage());

        if let Some(p) = &self.pullback {
            let counts = [
                ("green_threshold_count", p.green_threshold_count),
                ("red_threshold_count", p.red_threshold_count),
                ("green_pullback_count", p.green_pullback_count),
                ("red_pullback_count", p.red_pullback_count),
            ];
            for (key, n) in counts {
                map.insert(key.to_string(), n as f64);
            }
        }
        map
    }
}
