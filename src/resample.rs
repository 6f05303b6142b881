//! Aggregation of daily bars into weekly or monthly bars
//!
//! Bars are grouped by the period they fall into and each group becomes one
//! bar: first open, max high, min low, last close, summed volume. The bar is
//! dated with the period label. Periods without input bars produce nothing.
//!
//! Weekly periods end on the anchor weekday (inclusive) and are labeled with
//! that end date, so a Friday anchor turns Mon..Fri into one bar dated Friday.
//! Monthly periods are calendar months labeled with the 1st.

use chrono::{Datelike, Days, NaiveDate};
use tracing::{trace, warn};

use crate::{Bar, ResamplePeriod, OHLCV};

impl ResamplePeriod {
    /// Label of the period containing `date`
    pub fn period_label(self, date: NaiveDate) -> NaiveDate {
        match self {
            ResamplePeriod::Weekly(anchor) => {
                let ahead = (anchor.num_days_from_monday() + 7
                    - date.weekday().num_days_from_monday())
                    % 7;
                date.checked_add_days(Days::new(u64::from(ahead)))
                    .unwrap_or(NaiveDate::MAX)
            }
            ResamplePeriod::Monthly(_) => date.with_day(1).unwrap_or(date),
        }
    }
}

/// Aggregate chronologically ordered bars into `period` bars.
///
/// Output is ordered by period label. Resampling already-resampled bars with
/// the same period returns them unchanged.
pub fn resample<T: OHLCV>(bars: &[T], period: ResamplePeriod) -> Vec<Bar> {
    if let ResamplePeriod::Monthly(day) = period {
        if !day.is_calendar_start() {
            warn!(
                requested = day.get(),
                "month start day ignored; using calendar months"
            );
        }
    }

    let mut out: Vec<Bar> = Vec::new();
    for bar in bars {
        let label = period.period_label(bar.date());
        match out.last_mut() {
            Some(agg) if agg.date == label => {
                agg.high = agg.high.max(bar.high());
                agg.low = agg.low.min(bar.low());
                agg.close = bar.close();
                agg.volume += bar.volume();
            }
            _ => out.push(Bar::new(
                label,
                bar.open(),
                bar.high(),
                bar.low(),
                bar.close(),
                bar.volume(),
            )),
        }
    }

    trace!(input = bars.len(), output = out.len(), ?period, "resampled");
    out
}
