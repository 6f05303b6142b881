//! Parameter metadata for the statistics pipeline
//!
//! Numeric knobs are described here so callers can:
//! - Build parameter maps for [`EngineBuilder::with_params`](crate::EngineBuilder::with_params)
//! - Sweep the pullback threshold over a grid
//! - Render configuration forms with ranges and defaults
//!
//! # Example
//!
//! ```rust
//! use tickerstats::params::{self, ParamType};
//!
//! for param in params::param_meta() {
//!   println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//! assert_eq!(params::PULLBACK_THRESHOLD.param_type, ParamType::Percent);
//! ```

use std::collections::HashMap;

use crate::{MonthStartDay, Result, StatsError, Threshold};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Percentage of a price (threshold), fractional
  Percent,
  /// Calendar day number, integer
  Day,
}

/// Metadata for a single pipeline parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "pullback_threshold")
  pub name: &'static str,
  /// Parameter type (Percent or Day)
  pub param_type: ParamType,
  /// Default value
  pub default: f64,
  /// Range for sweeps: (min, max, step)
  pub range: (f64, f64, f64),
  /// Human-readable description
  pub description: &'static str,
}

impl ParamMeta {
  /// Create a new ParamMeta for a percentage parameter
  pub const fn percent(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Percent, default, range, description }
  }

  /// Create a new ParamMeta for a day-of-month parameter
  pub const fn day(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Day, default, range, description }
  }

  /// Generate all values for a sweep, inclusive of both ends
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    if step <= 0.0 || max < min {
      return vec![min];
    }
    // Index-based so accumulated rounding never skips or overshoots `max`
    let steps = ((max - min) / step + 1e-9).floor() as usize;
    (0..=steps).map(|i| (min + i as f64 * step).min(max)).collect()
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value.is_nan() {
      return Err(StatsError::InvalidValue("parameter cannot be NaN"));
    }
    if value < min || value > max {
      return Err(StatsError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Percent => Ok(()),
      ParamType::Day => {
        if value.fract() != 0.0 {
          return Err(StatsError::InvalidValue("day must be a whole number"));
        }
        Ok(())
      },
    }
  }
}

// ============================================================
// PIPELINE PARAMETERS
// ============================================================

pub const PULLBACK_THRESHOLD: ParamMeta = ParamMeta::percent(
  "pullback_threshold",
  2.0,
  (0.1, 50.0, 0.1),
  "Minimum body or range, in percent of the open, for a bar to enter pullback analysis",
);

pub const MONTH_START_DAY: ParamMeta = ParamMeta::day(
  "month_start_day",
  1.0,
  (1.0, 28.0, 1.0),
  "Requested first day of monthly periods; calendar months are always used",
);

static ALL_PARAMS: [ParamMeta; 2] = [PULLBACK_THRESHOLD, MONTH_START_DAY];

/// Metadata for every configurable parameter
pub fn param_meta() -> &'static [ParamMeta] {
  &ALL_PARAMS
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get a Threshold from params with default fallback.
/// `PULLBACK_THRESHOLD.range` only bounds the sweep grid.
pub fn get_threshold(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Threshold> {
  Threshold::new(params.get(key).copied().unwrap_or(default))
}

/// Helper to get a MonthStartDay from params with default fallback
pub fn get_month_start_day(
  params: &HashMap<&str, f64>,
  key: &str,
  default: u32,
) -> Result<MonthStartDay> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  MONTH_START_DAY.validate(value)?;
  MonthStartDay::new(value as u32)
}

/// Thresholds for a sweep over `meta`'s grid
pub fn threshold_grid(meta: &ParamMeta) -> Result<Vec<Threshold>> {
  meta.generate_grid().into_iter().map(Threshold::new).collect()
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_param_meta_percent() {
    let meta = ParamMeta::percent("test_pct", 2.0, (1.0, 3.0, 0.5), "Test percent parameter");

    assert_eq!(meta.name, "test_pct");
    assert_eq!(meta.param_type, ParamType::Percent);
    assert_eq!(meta.default, 2.0);
  }

  #[test]
  fn test_param_meta_day() {
    let meta = ParamMeta::day("test_day", 1.0, (1.0, 28.0, 1.0), "Test day parameter");

    assert_eq!(meta.name, "test_day");
    assert_eq!(meta.param_type, ParamType::Day);
  }

  #[test]
  fn test_generate_grid() {
    let meta = ParamMeta::percent("test", 0.5, (0.5, 1.5, 0.5), "Test");

    let grid = meta.generate_grid();
    assert_eq!(grid, vec![0.5, 1.0, 1.5]);
  }

  #[test]
  fn test_threshold_grid_covers_full_range() {
    let grid = threshold_grid(&PULLBACK_THRESHOLD).unwrap();
    assert_eq!(grid.len(), 500);
    assert!((grid[0].get() - 0.1).abs() < 1e-12);
    assert!(grid[499].get() <= Threshold::MAX);
    assert!((grid[499].get() - 50.0).abs() < 1e-9);
  }

  #[test]
  fn test_validate_percent() {
    assert!(PULLBACK_THRESHOLD.validate(2.0).is_ok());
    assert!(PULLBACK_THRESHOLD.validate(0.1).is_ok());
    assert!(PULLBACK_THRESHOLD.validate(50.0).is_ok());
    assert!(PULLBACK_THRESHOLD.validate(0.05).is_err());
    assert!(PULLBACK_THRESHOLD.validate(50.5).is_err());
    assert!(PULLBACK_THRESHOLD.validate(f64::NAN).is_err());
  }

  #[test]
  fn test_validate_day() {
    assert!(MONTH_START_DAY.validate(1.0).is_ok());
    assert!(MONTH_START_DAY.validate(28.0).is_ok());
    assert!(MONTH_START_DAY.validate(0.0).is_err());
    assert!(MONTH_START_DAY.validate(29.0).is_err());
    assert!(MONTH_START_DAY.validate(3.5).is_err());
  }

  #[test]
  fn test_get_threshold_helper() {
    let mut params = HashMap::new();
    params.insert("pullback_threshold", 3.5);

    assert_eq!(get_threshold(&params, "pullback_threshold", 2.0).unwrap().get(), 3.5);
    assert_eq!(get_threshold(&params, "missing", 2.0).unwrap().get(), 2.0);
    params.insert("pullback_threshold", 0.05);
    assert_eq!(get_threshold(&params, "pullback_threshold", 2.0).unwrap().get(), 0.05);
    params.insert("pullback_threshold", 0.0);
    assert!(get_threshold(&params, "pullback_threshold", 2.0).is_err());
    params.insert("pullback_threshold", 50.5);
    assert!(get_threshold(&params, "pullback_threshold", 2.0).is_err());
  }

  #[test]
  fn test_get_month_start_day_helper() {
    let mut params = HashMap::new();
    params.insert("month_start_day", 15.0);

    assert_eq!(get_month_start_day(&params, "month_start_day", 1).unwrap().get(), 15);
    assert_eq!(get_month_start_day(&params, "missing", 1).unwrap().get(), 1);
  }

  #[test]
  fn test_param_meta_listing() {
    let names: Vec<_> = param_meta().iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["pullback_threshold", "month_start_day"]);
  }
}
