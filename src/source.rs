//! Bar retrieval for a symbol and date window
//!
//! The pipeline itself never fetches data. Callers implement [`BarSource`]
//! for their provider; [`load_buffered`] widens the request so the first
//! analyzed bar has a predecessor even across weekends and holidays.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use tracing::{debug, warn};

use crate::{Bar, DateWindow, Result, StatisticsResult, StatsEngine};

/// Calendar days fetched ahead of the window start
pub const BUFFER_DAYS: u64 = 10;

/// Daily bar provider
pub trait BarSource {
    /// Bars for `symbol` dated within `[start, end]`, oldest first.
    ///
    /// `Ok(None)` means the symbol is unknown to the source; provider
    /// failures are reported as [`StatsError::Source`](crate::StatsError::Source).
    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Option<Vec<Bar>>>;
}

/// In-memory source keyed by symbol
impl BarSource for BTreeMap<String, Vec<Bar>> {
    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Option<Vec<Bar>>> {
        Ok(self.get(symbol).map(|bars| {
            bars.iter()
                .filter(|b| (start..=end).contains(&b.date))
                .copied()
                .collect()
        }))
    }
}

/// Fetch `window` plus [`BUFFER_DAYS`] of history.
///
/// Returns `None` when the source has nothing for the symbol in that range.
pub fn load_buffered<S: BarSource + ?Sized>(
    source: &S,
    symbol: &str,
    window: DateWindow,
) -> Result<Option<Vec<Bar>>> {
    let start = window
        .start
        .checked_sub_days(Days::new(BUFFER_DAYS))
        .unwrap_or(NaiveDate::MIN);
    debug!(symbol, %start, end = %window.end, "loading bars");

    match source.fetch(symbol, start, window.end)? {
        Some(bars) if !bars.is_empty() => Ok(Some(bars)),
        _ => {
            warn!(symbol, "no data returned");
            Ok(None)
        }
    }
}

/// Load, resample and analyze one symbol. Missing data yields the empty result.
pub fn analyze_symbol<S: BarSource + ?Sized>(
    engine: &StatsEngine,
    source: &S,
    symbol: &str,
    window: DateWindow,
) -> Result<StatisticsResult> {
    match load_buffered(source, symbol, window)? {
        Some(bars) => engine.analyze(&bars, Some(window)),
        None => Ok(StatisticsResult::empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EngineBuilder, Metric, StatsError};

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn source() -> BTreeMap<String, Vec<Bar>> {
        let bars = vec![
            Bar::new(date(2, 20), 90.0, 92.0, 89.0, 91.0, 1.0),
            Bar::new(date(3, 1), 100.0, 105.0, 98.0, 102.0, 1.0),
            Bar::new(date(3, 4), 103.0, 104.0, 101.0, 101.0, 1.0),
        ];
        let mut map = BTreeMap::new();
        map.insert("ACME".to_string(), bars);
        map
    }

    struct Failing;

    impl BarSource for Failing {
        fn fetch(&self, symbol: &str, _: NaiveDate, _: NaiveDate) -> Result<Option<Vec<Bar>>> {
            Err(StatsError::Source {
                symbol: symbol.to_string(),
                reason: "timeout".into(),
            })
        }
    }

    #[test]
    fn test_load_buffered_reaches_back() {
        // Window starts Monday; Friday's bar is within the buffer, 2/20 is not
        let window = DateWindow::new(date(3, 4), date(3, 8)).unwrap();
        let bars = load_buffered(&source(), "ACME", window).unwrap().unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, date(3, 1));
    }

    #[test]
    fn test_unknown_symbol_is_none() {
        let window = DateWindow::new(date(3, 4), date(3, 8)).unwrap();
        assert!(load_buffered(&source(), "NOPE", window).unwrap().is_none());

        let engine = EngineBuilder::new().build().unwrap();
        let stats = analyze_symbol(&engine, &source(), "NOPE", window).unwrap();
        assert!(stats.is_empty());
    }

    #[test]
    fn test_source_error_propagates() {
        let window = DateWindow::new(date(3, 4), date(3, 8)).unwrap();
        let err = load_buffered(&Failing, "ACME", window).unwrap_err();
        assert!(matches!(err, StatsError::Source { .. }));
    }

    #[test]
    fn test_analyze_symbol_over_weekend() {
        // The one-day pre-window trim misses Friday, so the Monday bar has no gap
        let window = DateWindow::new(date(3, 4), date(3, 8)).unwrap();
        let engine = EngineBuilder::new().build().unwrap();
        let stats = analyze_symbol(&engine, &source(), "ACME", window).unwrap();

        assert_eq!(stats.counts().total_candles, 1);
        assert_eq!(stats.counts().no_gap_candles, 1);
        assert_eq!(stats.get(Metric::GapUpPoints).unwrap().count, 0);
    }
}
