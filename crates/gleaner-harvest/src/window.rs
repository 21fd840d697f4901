//! Date-window progression and the horizon reset rule
//!
//! A windowed source walks the progression `start, start + range,
//! start + 2·range, …`. When the next window would start beyond
//! `now + future_horizon`, the cursor is reset to the element of the same
//! progression closest to `now − lookback`, so recent history keeps being
//! re-harvested once the leading edge has caught up.
//!
//! The reset target is found by replaying the progression from `start`. If
//! `range` changes between runs, replayed elements no longer line up with
//! earlier window starts.

use crate::error::HarvestError;
use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// A calendar step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStep {
    /// Whole years
    Years(u32),
    /// Whole months
    Months(u32),
    /// Days
    Days(u32),
}

impl WindowStep {
    /// Whether the step moves at all
    pub fn is_zero(&self) -> bool {
        matches!(self, WindowStep::Years(0) | WindowStep::Months(0) | WindowStep::Days(0))
    }

    /// `date + times·self`
    pub fn add_times(&self, date: NaiveDate, times: u32) -> Option<NaiveDate> {
        match *self {
            WindowStep::Years(n) => date.checked_add_months(Months::new(n.checked_mul(12)?.checked_mul(times)?)),
            WindowStep::Months(n) => date.checked_add_months(Months::new(n.checked_mul(times)?)),
            WindowStep::Days(n) => date.checked_add_days(Days::new(u64::from(n) * u64::from(times))),
        }
    }

    /// `date + self`
    pub fn add_to(&self, date: NaiveDate) -> Option<NaiveDate> {
        self.add_times(date, 1)
    }

    /// `date − self`
    pub fn sub_from(&self, date: NaiveDate) -> Option<NaiveDate> {
        match *self {
            WindowStep::Years(n) => date.checked_sub_months(Months::new(n.checked_mul(12)?)),
            WindowStep::Months(n) => date.checked_sub_months(Months::new(n)),
            WindowStep::Days(n) => date.checked_sub_days(Days::new(u64::from(n))),
        }
    }
}

/// What happens to a window cursor after its window completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMove {
    /// Continue with the next window
    Advance(NaiveDate),
    /// Jump back into recent history; the run ends here
    Reset(NaiveDate),
}

impl WindowMove {
    /// Target date
    pub fn date(&self) -> NaiveDate {
        match *self {
            WindowMove::Advance(d) | WindowMove::Reset(d) => d,
        }
    }
}

/// Window progression of one source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowPlan {
    /// First window start
    pub start: NaiveDate,
    /// Window length and step
    pub range: WindowStep,
    /// How far before now a reset lands
    pub lookback: WindowStep,
    /// How far past now windows may start
    pub future_horizon: WindowStep,
}

impl WindowPlan {
    /// Validate the plan
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.range.is_zero() {
            return Err(HarvestError::Config("window range must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Last day of the window starting at `window_start`
    pub fn window_end(&self, window_start: NaiveDate) -> Result<NaiveDate, HarvestError> {
        self.range
            .add_to(window_start)
            .and_then(|d| d.pred_opt())
            .ok_or_else(|| overflow(window_start))
    }

    /// Move after completing the window starting at `current`
    pub fn next(&self, current: NaiveDate, today: NaiveDate) -> Result<WindowMove, HarvestError> {
        let next = self.range.add_to(current).ok_or_else(|| overflow(current))?;
        let horizon = self.future_horizon.add_to(today).ok_or_else(|| overflow(today))?;
        if next > horizon {
            Ok(WindowMove::Reset(self.reset_cursor(today)?))
        } else {
            Ok(WindowMove::Advance(next))
        }
    }

    /// Element of the progression closest to `today − lookback`
    ///
    /// Ties go to the earlier element. Targets before `start` map to `start`.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use gleaner_harvest::window::{WindowPlan, WindowStep};
    ///
    /// let plan = WindowPlan {
    ///     start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
    ///     range: WindowStep::Years(5),
    ///     lookback: WindowStep::Years(5),
    ///     future_horizon: WindowStep::Years(10),
    /// };
    /// let today = NaiveDate::from_ymd_opt(2028, 3, 1).unwrap();
    /// assert_eq!(plan.reset_cursor(today).unwrap(), NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    /// ```
    pub fn reset_cursor(&self, today: NaiveDate) -> Result<NaiveDate, HarvestError> {
        self.validate()?;
        let target = self.lookback.sub_from(today).ok_or_else(|| overflow(today))?;
        if target <= self.start {
            return Ok(self.start);
        }

        let mut below = self.start;
        for k in 1.. {
            let element = self.range.add_times(self.start, k).ok_or_else(|| overflow(self.start))?;
            if element > target {
                let to_below = (target - below).num_days();
                let to_above = (element - target).num_days();
                return Ok(if to_above < to_below { element } else { below });
            }
            below = element;
        }
        Err(overflow(self.start))
    }
}

fn overflow(date: NaiveDate) -> HarvestError {
    HarvestError::Config(format!("window arithmetic overflows near {}", date))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn plan() -> WindowPlan {
        WindowPlan {
            start: date(2020, 1, 1),
            range: WindowStep::Years(5),
            lookback: WindowStep::Years(5),
            future_horizon: WindowStep::Years(10),
        }
    }

    #[test]
    fn test_advance_within_horizon() {
        let today = date(2025, 6, 15);
        assert_eq!(plan().next(date(2025, 1, 1), today).unwrap(), WindowMove::Advance(date(2030, 1, 1)));
        assert_eq!(plan().next(date(2030, 1, 1), today).unwrap(), WindowMove::Advance(date(2035, 1, 1)));
    }

    #[test]
    fn test_reset_past_horizon_to_closest_element() {
        // Next start 2040 exceeds 2035-06-15; target 2020-06-15 is closest to 2020.
        let today = date(2025, 6, 15);
        assert_eq!(plan().next(date(2035, 1, 1), today).unwrap(), WindowMove::Reset(date(2020, 1, 1)));

        // Target 2023-03-01 is closer to 2025 than to 2020.
        let today = date(2028, 3, 1);
        assert_eq!(plan().next(date(2035, 1, 1), today).unwrap(), WindowMove::Reset(date(2025, 1, 1)));
    }

    #[test]
    fn test_reset_target_before_start_maps_to_start() {
        let plan = WindowPlan {
            start: date(2022, 1, 1),
            ..plan()
        };
        assert_eq!(plan.reset_cursor(date(2024, 1, 1)).unwrap(), date(2022, 1, 1));
    }

    #[test]
    fn test_reset_tie_goes_to_earlier_element() {
        let plan = WindowPlan {
            start: date(2024, 1, 1),
            range: WindowStep::Days(10),
            lookback: WindowStep::Days(0),
            future_horizon: WindowStep::Days(30),
        };
        // 2024-01-06 is 5 days from both 01-01 and 01-11.
        assert_eq!(plan.reset_cursor(date(2024, 1, 6)).unwrap(), date(2024, 1, 1));
        assert_eq!(plan.reset_cursor(date(2024, 1, 7)).unwrap(), date(2024, 1, 11));
    }

    #[test]
    fn test_window_end_is_inclusive_last_day() {
        assert_eq!(plan().window_end(date(2020, 1, 1)).unwrap(), date(2024, 12, 31));
        let monthly = WindowPlan {
            range: WindowStep::Months(1),
            ..plan()
        };
        assert_eq!(monthly.window_end(date(2024, 2, 1)).unwrap(), date(2024, 2, 29));
    }

    #[test]
    fn test_zero_range_rejected() {
        let plan = WindowPlan {
            range: WindowStep::Days(0),
            ..plan()
        };
        assert!(plan.validate().is_err());
        assert!(plan.reset_cursor(date(2030, 1, 1)).is_err());
    }

    #[test]
    fn test_step_deserializes_from_toml() {
        #[derive(Deserialize)]
        struct Holder {
            range: WindowStep,
        }
        let holder: Holder = toml::from_str("range = { years = 5 }").unwrap();
        assert_eq!(holder.range, WindowStep::Years(5));
    }
}
