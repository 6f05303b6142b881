//! # TickerStats - descriptive statistics for OHLCV bar series
//!
//! Derives distributions of intraday range, candle body, opening gaps and
//! directional moves from daily/weekly/monthly bars, plus a conditional
//! pullback/continuation analysis of the bar that follows a large move.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use tickerstats::prelude::*;
//!
//! let day = |d| NaiveDate::from_ymd_opt(2024, 3, d).unwrap();
//! let bars = vec![
//!     Bar::new(day(4), 100.0, 105.0, 98.0, 102.0, 1_000.0),
//!     Bar::new(day(5), 103.0, 104.0, 101.0, 101.0, 1_200.0),
//! ];
//!
//! // Pullback analysis on bodies of at least 2%
//! let engine = EngineBuilder::new()
//!     .pullback(Threshold::new(2.0).unwrap(), ThresholdMode::Body)
//!     .build()
//!     .unwrap();
//!
//! let stats = engine.analyze(&bars, None).unwrap();
//! assert_eq!(stats.counts().total_candles, 2);
//! assert_eq!(stats.get(Metric::RangePoints).unwrap().max, 7.0);
//! ```
//!
//! ## Pipeline
//!
//! 1. Optional resampling to weekly/monthly bars ([`resample`])
//! 2. Trimming to the analysis window, keeping one pre-window bar
//! 3. Per-bar derived metrics ([`metrics`])
//! 4. Sign/threshold partitions ([`partition`])
//! 5. One [`MetricStatBlock`] per metric ([`summary`]), fanned out with rayon
//! 6. Optional pullback analysis ([`pullback`])

pub mod metrics;
pub mod params;
pub mod partition;
pub mod pullback;
pub mod resample;
pub mod result;
pub mod source;
pub mod summary;

pub use metrics::DerivedBar;
pub use partition::{PartitionKind, Partitions};
pub use pullback::{PullbackAnalysis, PullbackCounts, PullbackObservation};
pub use result::{CandleCounts, StatisticsResult};
pub use source::{BarSource, BUFFER_DAYS};
pub use summary::{MetricStatBlock, SigmaBand};

pub mod prelude {
    pub use crate::{
        // Parallel
        analyze_parallel,
        // Entry point
        calculate_statistics,
        // Parameters
        params::{get_month_start_day, get_threshold, ParamMeta, ParamType},
        // Data source
        source::{analyze_symbol, load_buffered},
        sweep_thresholds,
        // Types
        Bar,
        BarSource,
        CandleCounts,
        CandleDirection,
        DateWindow,
        DerivedBar,
        // Engine
        EngineBuilder,
        Frequency,
        Metric,
        MetricStatBlock,
        MonthStartDay,
        OHLCVExt,
        PartitionKind,
        PullbackConfig,
        PullbackCounts,
        ResamplePeriod,
        // Errors
        Result,
        SigmaBand,
        StatisticsConfig,
        StatisticsResult,
        StatsEngine,
        StatsError,
        SymbolError,
        SymbolStatistics,
        Threshold,
        ThresholdMode,
        OHLCV,
    };
    pub use chrono::{NaiveDate, Weekday};
}

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, Weekday};
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::partition::PartitionKind as Part;

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, StatsError>;

/// Errors raised at the configuration and data boundary.
///
/// Empty input, degenerate distributions and zero denominators are not
/// errors; they degrade to zero-valued statistics.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StatsError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid bar at index {index}: {reason}")]
    InvalidBar { index: usize, reason: &'static str },

    #[error("Data source failed for {symbol}: {reason}")]
    Source { symbol: String, reason: String },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Pullback threshold percentage in (0, 50]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Threshold(f64);

impl Threshold {
    pub const MAX: f64 = 50.0;

    /// Create a new Threshold, validating the value is in (0, 50]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(StatsError::InvalidValue(
                "Threshold cannot be NaN or infinite",
            ));
        }
        if !(value > 0.0 && value <= Self::MAX) {
            return Err(StatsError::OutOfRange {
                field: "Threshold",
                value,
                min: 0.0,
                max: Self::MAX,
            });
        }
        Ok(Self(value))
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Threshold {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Threshold {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Threshold::new(value).map_err(serde::de::Error::custom)
    }
}

/// Day of month a monthly period is requested to start on (1..=28)
///
/// Monthly resampling always uses calendar months; any other day is accepted
/// and normalized to the 1st.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonthStartDay(u8);

impl MonthStartDay {
    pub const FIRST: Self = Self(1);

    pub fn new(day: u32) -> Result<Self> {
        if !(1..=28).contains(&day) {
            return Err(StatsError::OutOfRange {
                field: "MonthStartDay",
                value: day as f64,
                min: 1.0,
                max: 28.0,
            });
        }
        Ok(Self(day as u8))
    }

    #[inline]
    pub fn get(self) -> u32 {
        self.0 as u32
    }

    #[inline]
    pub fn is_calendar_start(self) -> bool {
        self.0 == 1
    }
}

impl Default for MonthStartDay {
    fn default() -> Self {
        Self::FIRST
    }
}

impl serde::Serialize for MonthStartDay {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for MonthStartDay {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = u32::deserialize(d)?;
        MonthStartDay::new(value).map_err(serde::de::Error::custom)
    }
}

/// Inclusive analysis window `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "DateWindowRepr")]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(serde::Deserialize)]
struct DateWindowRepr {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<DateWindowRepr> for DateWindow {
    type Error = StatsError;

    fn try_from(repr: DateWindowRepr) -> Result<Self> {
        DateWindow::new(repr.start, repr.end)
    }
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(StatsError::InvalidConfig(format!(
                "window start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// First date kept before derivation: one calendar day before `start`
    #[inline]
    pub fn buffered_start(&self) -> NaiveDate {
        self.start.pred_opt().unwrap_or(self.start)
    }

    #[inline]
    pub fn contains(&self, date: NaiveDate) -> bool {
        (self.start..=self.end).contains(&date)
    }

    #[inline]
    pub fn contains_buffered(&self, date: NaiveDate) -> bool {
        (self.buffered_start()..=self.end).contains(&date)
    }
}

// ============================================================
// CONFIGURATION
// ============================================================

/// Bar frequency as selected by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl FromStr for Frequency {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "d" => Ok(Frequency::Daily),
            "weekly" | "w" => Ok(Frequency::Weekly),
            "monthly" | "m" => Ok(Frequency::Monthly),
            _ => Err(StatsError::InvalidConfig(format!("unknown frequency: {s}"))),
        }
    }
}

impl Frequency {
    /// Resolve the frequency and its start-day anchor into a resample period.
    ///
    /// Weekly requires a weekday name; monthly takes an optional day number
    /// (default 1); daily ignores the anchor.
    pub fn resample_period(self, anchor: Option<&str>) -> Result<Option<ResamplePeriod>> {
        match self {
            Frequency::Daily => Ok(None),
            Frequency::Weekly => {
                let name = anchor.ok_or_else(|| {
                    StatsError::InvalidConfig("weekly frequency requires a weekday".into())
                })?;
                Ok(Some(ResamplePeriod::Weekly(parse_weekday(name)?)))
            }
            Frequency::Monthly => {
                let day = match anchor {
                    Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
                        StatsError::InvalidConfig(format!("invalid month start day: {raw}"))
                    })?,
                    None => 1,
                };
                Ok(Some(ResamplePeriod::Monthly(MonthStartDay::new(day)?)))
            }
        }
    }
}

/// Parse a weekday name ("Monday", "mon", case-insensitive)
pub fn parse_weekday(name: &str) -> Result<Weekday> {
    name.trim()
        .parse::<Weekday>()
        .map_err(|_| StatsError::InvalidConfig(format!("unknown weekday: {name}")))
}

/// Target period for resampling daily bars
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResamplePeriod {
    /// Weeks ending on (and including) the given weekday
    Weekly(Weekday),
    /// Calendar months
    Monthly(MonthStartDay),
}

/// What a bar is measured by when checked against the pullback threshold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMode {
    /// `|close - open| / open`
    #[default]
    Body,
    /// `(high - low) / open`
    Candle,
}

impl FromStr for ThresholdMode {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "body" => Ok(ThresholdMode::Body),
            "candle" | "range" => Ok(ThresholdMode::Candle),
            _ => Err(StatsError::InvalidConfig(format!(
                "unknown threshold mode: {s}"
            ))),
        }
    }
}

impl fmt::Display for ThresholdMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ThresholdMode::Body => "body",
            ThresholdMode::Candle => "candle",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PullbackConfig {
    pub threshold: Threshold,
    #[serde(default)]
    pub mode: ThresholdMode,
}

/// Full pipeline configuration
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    pub resample: Option<ResamplePeriod>,
    pub pullback: Option<PullbackConfig>,
    /// Reject malformed bars instead of analyzing them
    pub validate_data: bool,
    /// Summarize metrics on the rayon pool
    pub parallel: bool,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            resample: None,
            pullback: None,
            validate_data: false,
            parallel: true,
        }
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn date(&self) -> NaiveDate;
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn change_from_open(&self) -> f64 {
        self.close() - self.open()
    }

    #[inline]
    fn direction(&self) -> CandleDirection {
        CandleDirection::from_change(self.change_from_open())
    }

    #[inline]
    fn is_green(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_red(&self) -> bool {
        self.close() < self.open()
    }

    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        let prices = [self.open(), self.high(), self.low(), self.close()];
        if prices.iter().any(|p| p.is_nan()) {
            return Err(StatsError::InvalidBar {
                index: 0,
                reason: "NaN in OHLC",
            });
        }
        if prices.iter().any(|p| p.is_infinite()) {
            return Err(StatsError::InvalidBar {
                index: 0,
                reason: "Infinite value in OHLC",
            });
        }
        if self.high() < self.low() {
            return Err(StatsError::InvalidBar {
                index: 0,
                reason: "high < low",
            });
        }
        if self.open() < self.low() || self.open() > self.high() {
            return Err(StatsError::InvalidBar {
                index: 0,
                reason: "open outside [low, high]",
            });
        }
        if self.close() < self.low() || self.close() > self.high() {
            return Err(StatsError::InvalidBar {
                index: 0,
                reason: "close outside [low, high]",
            });
        }
        if self.volume().is_nan() || self.volume() < 0.0 {
            return Err(StatsError::InvalidBar {
                index: 0,
                reason: "negative or NaN volume",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

/// One OHLCV observation for a day, week or month
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    pub fn from_ohlcv<T: OHLCV + ?Sized>(bar: &T) -> Self {
        Self::new(
            bar.date(),
            bar.open(),
            bar.high(),
            bar.low(),
            bar.close(),
            bar.volume(),
        )
    }
}

impl OHLCV for Bar {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}

/// Candle color relative to its own open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandleDirection {
    Green,
    Red,
    Flat,
}

impl CandleDirection {
    /// Strict sign test: zero change is flat
    #[inline]
    pub fn from_change(change: f64) -> Self {
        if change > 0.0 {
            CandleDirection::Green
        } else if change < 0.0 {
            CandleDirection::Red
        } else {
            CandleDirection::Flat
        }
    }

    #[inline]
    pub fn is_green(self) -> bool {
        matches!(self, CandleDirection::Green)
    }

    #[inline]
    pub fn is_red(self) -> bool {
        matches!(self, CandleDirection::Red)
    }
}

// ============================================================
// METRIC IDENTIFIERS
// ============================================================

/// Named metric series summarized into a [`MetricStatBlock`]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    RangePoints,
    RangePct,
    BodyPoints,
    BodyPct,
    NetChangePoints,
    NetChangePct,
    GapUpPoints,
    GapUpPct,
    GapDownPoints,
    GapDownPct,
    GreenPrevPoints,
    GreenPrevPct,
    RedPrevPoints,
    RedPrevPct,
    GreenOpenPoints,
    GreenOpenPct,
    RedOpenPoints,
    RedOpenPct,
    GreenPullbackPoints,
    GreenPullbackPct,
    RedPullbackPoints,
    RedPullbackPct,
}

impl Metric {
    /// Metrics computed for every analysis
    pub const CORE: [Metric; 18] = [
        Metric::RangePoints,
        Metric::RangePct,
        Metric::BodyPoints,
        Metric::BodyPct,
        Metric::NetChangePoints,
        Metric::NetChangePct,
        Metric::GapUpPoints,
        Metric::GapUpPct,
        Metric::GapDownPoints,
        Metric::GapDownPct,
        Metric::GreenPrevPoints,
        Metric::GreenPrevPct,
        Metric::RedPrevPoints,
        Metric::RedPrevPct,
        Metric::GreenOpenPoints,
        Metric::GreenOpenPct,
        Metric::RedOpenPoints,
        Metric::RedOpenPct,
    ];

    /// Metrics computed only when pullback analysis is enabled
    pub const PULLBACK: [Metric; 4] = [
        Metric::GreenPullbackPoints,
        Metric::GreenPullbackPct,
        Metric::RedPullbackPoints,
        Metric::RedPullbackPct,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Metric::RangePoints => "range_points",
            Metric::RangePct => "range_pct",
            Metric::BodyPoints => "body_points",
            Metric::BodyPct => "body_pct",
            Metric::NetChangePoints => "net_change_points",
            Metric::NetChangePct => "net_change_pct",
            Metric::GapUpPoints => "gap_up_points",
            Metric::GapUpPct => "gap_up_pct",
            Metric::GapDownPoints => "gap_down_points",
            Metric::GapDownPct => "gap_down_pct",
            Metric::GreenPrevPoints => "green_prev_points",
            Metric::GreenPrevPct => "green_prev_pct",
            Metric::RedPrevPoints => "red_prev_points",
            Metric::RedPrevPct => "red_prev_pct",
            Metric::GreenOpenPoints => "green_open_points",
            Metric::GreenOpenPct => "green_open_pct",
            Metric::RedOpenPoints => "red_open_points",
            Metric::RedOpenPct => "red_open_pct",
            Metric::GreenPullbackPoints => "green_pullback_points",
            Metric::GreenPullbackPct => "green_pullback_pct",
            Metric::RedPullbackPoints => "red_pullback_points",
            Metric::RedPullbackPct => "red_pullback_pct",
        }
    }

    /// Ranges, bodies, gaps and directional magnitudes never go below zero,
    /// so their band lower bounds are clamped. Net change and pullbacks are signed.
    pub const fn always_nonnegative(self) -> bool {
        !matches!(
            self,
            Metric::NetChangePoints
                | Metric::NetChangePct
                | Metric::GreenPullbackPoints
                | Metric::GreenPullbackPct
                | Metric::RedPullbackPoints
                | Metric::RedPullbackPct
        )
    }

    /// Partition the metric is summarized over; `None` means every bar
    pub const fn partition(self) -> Option<PartitionKind> {
        match self {
            Metric::GapUpPoints | Metric::GapUpPct => Some(Part::GapUp),
            Metric::GapDownPoints | Metric::GapDownPct => Some(Part::GapDown),
            Metric::GreenPrevPoints | Metric::GreenPrevPct => Some(Part::GreenFromPrevClose),
            Metric::RedPrevPoints | Metric::RedPrevPct => Some(Part::RedFromPrevClose),
            Metric::GreenOpenPoints | Metric::GreenOpenPct => Some(Part::GreenFromOpen),
            Metric::RedOpenPoints | Metric::RedOpenPct => Some(Part::RedFromOpen),
            _ => None,
        }
    }

    #[inline]
    pub const fn is_pullback(self) -> bool {
        matches!(
            self,
            Metric::GreenPullbackPoints
                | Metric::GreenPullbackPct
                | Metric::RedPullbackPoints
                | Metric::RedPullbackPct
        )
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================
// STATISTICS ENGINE
// ============================================================

/// One unit of fan-out work: a metric and the series it summarizes.
/// `None` marks an empty partition, reported as the zero block directly.
struct MetricJob {
    metric: Metric,
    series: Option<Vec<Option<f64>>>,
}

impl MetricJob {
    fn run(self) -> (Metric, MetricStatBlock) {
        let block = match self.series {
            Some(series) => summary::summarize_metric(self.metric, series),
            None => MetricStatBlock::ZERO,
        };
        (self.metric, block)
    }
}

/// Statistics pipeline with a fixed configuration
#[derive(Debug, Clone, Default)]
pub struct StatsEngine {
    config: StatisticsConfig,
}

impl StatsEngine {
    pub fn new(config: StatisticsConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &StatisticsConfig {
        &self.config
    }

    /// Apply the configured resample period, or copy the bars as-is
    pub fn resample<T: OHLCV>(&self, bars: &[T]) -> Vec<Bar> {
        match self.config.resample {
            Some(period) => resample::resample(bars, period),
            None => bars.iter().map(Bar::from_ohlcv).collect(),
        }
    }

    /// Run the whole pipeline over `bars`.
    ///
    /// `bars` should reach at least one period before `window.start` so the
    /// first analyzed bar has a predecessor. Returns the empty result when no
    /// bars remain after trimming; errors only when bar validation is enabled
    /// and fails.
    pub fn analyze<T: OHLCV>(
        &self,
        bars: &[T],
        window: Option<DateWindow>,
    ) -> Result<StatisticsResult> {
        if self.config.validate_data {
            validate_bars(bars)?;
        }
        if bars.is_empty() {
            debug!("no input bars");
            return Ok(StatisticsResult::empty());
        }

        let resampled = self.resample(bars);
        let buffered: Vec<Bar> = match window {
            Some(w) => resampled
                .into_iter()
                .filter(|b| w.contains_buffered(b.date))
                .collect(),
            None => resampled,
        };
        debug!(
            input = bars.len(),
            buffered = buffered.len(),
            "trimmed bars to analysis window"
        );
        if buffered.is_empty() {
            return Ok(StatisticsResult::empty());
        }

        let mut rows = metrics::derive(&buffered);
        if let Some(w) = window {
            metrics::discard_before(&mut rows, w.start);
        }
        if rows.is_empty() {
            debug!("no bars left after dropping the pre-window buffer");
            return Ok(StatisticsResult::empty());
        }

        let partitions = Partitions::build(&rows);
        for kind in PartitionKind::ALL {
            trace!(partition = kind.name(), size = partitions.get(kind).len());
        }

        let pullback = self
            .config
            .pullback
            .map(|cfg| pullback::analyze(&rows, cfg));

        let mut jobs: Vec<MetricJob> = Metric::CORE
            .iter()
            .map(|&metric| {
                let members = partitions.rows_for(metric.partition());
                MetricJob {
                    metric,
                    series: (!members.is_empty())
                        .then(|| members.iter().map(|row| row.value(metric)).collect()),
                }
            })
            .collect();
        if let Some(analysis) = &pullback {
            jobs.extend(Metric::PULLBACK.iter().map(|&metric| MetricJob {
                metric,
                series: analysis.series(metric),
            }));
        }

        let blocks: BTreeMap<Metric, MetricStatBlock> = if self.config.parallel {
            jobs.into_par_iter().map(MetricJob::run).collect()
        } else {
            jobs.into_iter().map(MetricJob::run).collect()
        };

        let counts = CandleCounts::tally(&partitions);
        debug!(
            analyzed = counts.total_candles,
            metrics = blocks.len(),
            "statistics assembled"
        );

        Ok(StatisticsResult::new(
            blocks,
            counts,
            pullback.as_ref().map(PullbackAnalysis::counts),
        ))
    }
}

/// Single-call entry point: validate `config`, then run the pipeline
pub fn calculate_statistics<T: OHLCV>(
    bars: &[T],
    window: Option<DateWindow>,
    config: &StatisticsConfig,
) -> Result<StatisticsResult> {
    EngineBuilder::new()
        .config(*config)
        .build()?
        .analyze(bars, window)
}

fn validate_bars<T: OHLCV>(bars: &[T]) -> Result<()> {
    for (i, bar) in bars.iter().enumerate() {
        bar.validate().map_err(|e| match e {
            StatsError::InvalidBar { reason, .. } => StatsError::InvalidBar { index: i, reason },
            other => other,
        })?;
    }
    for (i, pair) in bars.windows(2).enumerate() {
        if pair[1].date() <= pair[0].date() {
            return Err(StatsError::InvalidBar {
                index: i + 1,
                reason: "dates not strictly increasing",
            });
        }
    }
    Ok(())
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating StatsEngine instances.
///
/// Name-based setters record the first parse failure and report it from
/// [`EngineBuilder::build`].
#[derive(Debug, Default)]
pub struct EngineBuilder {
    config: StatisticsConfig,
    error: Option<StatsError>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn defer<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.error.get_or_insert(e);
                None
            }
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: StatisticsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn resample(mut self, period: ResamplePeriod) -> Self {
        self.config.resample = Some(period);
        self
    }

    /// Weekly bars ending on `anchor`
    pub fn weekly(self, anchor: Weekday) -> Self {
        self.resample(ResamplePeriod::Weekly(anchor))
    }

    pub fn monthly(self, start_day: MonthStartDay) -> Self {
        self.resample(ResamplePeriod::Monthly(start_day))
    }

    /// Frequency and anchor by name, e.g. `("weekly", Some("Friday"))`
    pub fn frequency(mut self, name: &str, anchor: Option<&str>) -> Self {
        let period = name
            .parse::<Frequency>()
            .and_then(|f| f.resample_period(anchor));
        if let Some(period) = self.defer(period) {
            self.config.resample = period;
        }
        self
    }

    pub fn pullback(mut self, threshold: Threshold, mode: ThresholdMode) -> Self {
        self.config.pullback = Some(PullbackConfig { threshold, mode });
        self
    }

    /// Pullback analysis from a raw percentage, validated at build time
    pub fn pullback_percent(mut self, percent: f64, mode: ThresholdMode) -> Self {
        if let Some(threshold) = self.defer(Threshold::new(percent)) {
            self.config.pullback = Some(PullbackConfig { threshold, mode });
        }
        self
    }

    /// Enable/disable bar validation
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.config.validate_data = enable;
        self
    }

    /// Enable/disable the rayon fan-out
    pub fn parallel(mut self, enable: bool) -> Self {
        self.config.parallel = enable;
        self
    }

    /// Apply `pullback_threshold` / `month_start_day` from a parameter map
    pub fn with_params(mut self, values: &HashMap<&str, f64>) -> Self {
        let threshold_meta = &params::PULLBACK_THRESHOLD;
        if values.contains_key(threshold_meta.name) {
            let threshold = params::get_threshold(values, threshold_meta.name, threshold_meta.default);
            if let Some(threshold) = self.defer(threshold) {
                let mode = self.config.pullback.map(|p| p.mode).unwrap_or_default();
                self.config.pullback = Some(PullbackConfig { threshold, mode });
            }
        }

        let day_meta = &params::MONTH_START_DAY;
        if values.contains_key(day_meta.name) {
            let day = params::get_month_start_day(values, day_meta.name, 1);
            if let Some(day) = self.defer(day) {
                self.config.resample = Some(ResamplePeriod::Monthly(day));
            }
        }
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<StatsEngine> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(StatsEngine::new(self.config))
    }
}

// ============================================================
// PARALLEL ANALYSIS
// ============================================================

/// Result of analyzing a single instrument
#[derive(Debug)]
pub struct SymbolStatistics {
    pub symbol: String,
    pub statistics: StatisticsResult,
}

/// Error from analyzing a single instrument
#[derive(Debug)]
pub struct SymbolError {
    pub symbol: String,
    pub error: StatsError,
}

/// Analyze several independent instruments on the rayon pool
pub fn analyze_parallel<'a, T, I>(
    engine: &StatsEngine,
    instruments: I,
    window: Option<DateWindow>,
) -> (Vec<SymbolStatistics>, Vec<SymbolError>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, bars)| {
            engine
                .analyze(bars, window)
                .map(|statistics| SymbolStatistics {
                    symbol: symbol.to_string(),
                    statistics,
                })
                .map_err(|error| SymbolError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

/// Re-run the pipeline once per threshold, keeping the engine's other settings.
///
/// Output order follows `thresholds`.
pub fn sweep_thresholds<T: OHLCV + Sync>(
    engine: &StatsEngine,
    bars: &[T],
    window: Option<DateWindow>,
    mode: ThresholdMode,
    thresholds: &[Threshold],
) -> Result<Vec<(Threshold, StatisticsResult)>> {
    thresholds
        .par_iter()
        .map(|&threshold| {
            let config = StatisticsConfig {
                pullback: Some(PullbackConfig { threshold, mode }),
                ..engine.config
            };
            StatsEngine::new(config)
                .analyze(bars, window)
                .map(|stats| (threshold, stats))
        })
        .collect()
}

// ============================================================
// TESTS
// ============================================================
