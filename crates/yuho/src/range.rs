//! Inclusive calendar-day windows for list crawling.

use chrono::{Datelike, Days, NaiveDate};
use std::fmt;
use yuho_data::{DataError, Result};

/// Default look-back of the crawl window, in years.
pub const DEFAULT_YEARS_BACK: u32 = 3;

/// Date layouts accepted on the command line.
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Create a range.
    ///
    /// # Errors
    /// Returns `DataError::InvalidDateRange` when `start` is after `end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(DataError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// The window ending `today` and starting [`DEFAULT_YEARS_BACK`] years earlier.
    pub fn default_window(today: NaiveDate) -> Self {
        Self {
            start: years_back(today, DEFAULT_YEARS_BACK),
            end: today,
        }
    }

    /// Resolve optional bounds, defaulting each to its side of
    /// [`DateRange::default_window`] for `today`.
    ///
    /// # Errors
    /// Returns `DataError::InvalidDateRange` when the resolved start is after
    /// the resolved end, including an explicit `to` before the default start.
    pub fn resolve(from: Option<NaiveDate>, to: Option<NaiveDate>, today: NaiveDate) -> Result<Self> {
        let start = from.unwrap_or_else(|| years_back(today, DEFAULT_YEARS_BACK));
        Self::new(start, to.unwrap_or(today))
    }

    /// First day.
    pub const fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day (inclusive).
    pub const fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days in the range.
    pub fn len_days(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    /// Every day from start to end, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    /// Split into `[start, at)` and `[at, end]`. Either side is `None` when empty.
    pub fn split_at(&self, at: NaiveDate) -> (Option<Self>, Option<Self>) {
        let left = at
            .checked_sub_days(Days::new(1))
            .filter(|last| *last >= self.start)
            .map(|last| Self {
                start: self.start,
                end: last.min(self.end),
            });
        let right = (at <= self.end).then(|| Self {
            start: at.max(self.start),
            end: self.end,
        });
        (left, right)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// The same calendar day `years` earlier; Feb 29 maps to Feb 28.
pub fn years_back(date: NaiveDate, years: u32) -> NaiveDate {
    let year = date.year() - years as i32;
    NaiveDate::from_ymd_opt(year, date.month(), date.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, date.month(), 28))
        .unwrap_or(date)
}

/// Parse a `YYYY-MM-DD` or `YYYY/MM/DD` date.
pub fn parse_date_arg(value: &str) -> Result<NaiveDate> {
    let text = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .ok_or_else(|| {
            DataError::Parse(format!("invalid date {text:?} (use YYYY-MM-DD or YYYY/MM/DD)"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        assert!(matches!(
            DateRange::new(d(2024, 2, 1), d(2024, 1, 31)),
            Err(DataError::InvalidDateRange { .. })
        ));
        assert!(DateRange::new(d(2024, 1, 1), d(2024, 1, 1)).is_ok());
    }

    #[test]
    fn test_days_are_inclusive() {
        let range = DateRange::new(d(2024, 2, 27), d(2024, 3, 1)).unwrap();
        let days: Vec<_> = range.days().collect();
        assert_eq!(days, vec![d(2024, 2, 27), d(2024, 2, 28), d(2024, 2, 29), d(2024, 3, 1)]);
        assert_eq!(range.len_days(), 4);
    }

    #[test]
    fn test_default_window_handles_leap_day() {
        let window = DateRange::default_window(d(2024, 2, 29));
        assert_eq!(window.start(), d(2021, 2, 28));
        assert_eq!(window.end(), d(2024, 2, 29));

        let window = DateRange::default_window(d(2025, 6, 30));
        assert_eq!(window.start(), d(2022, 6, 30));
    }

    #[test]
    fn test_resolve_defaults_from_today() {
        let range = DateRange::resolve(None, Some(d(2024, 6, 30)), d(2025, 1, 1)).unwrap();
        assert_eq!(range.start(), d(2022, 1, 1));
        assert_eq!(range.end(), d(2024, 6, 30));

        let range = DateRange::resolve(None, None, d(2025, 1, 1)).unwrap();
        assert_eq!(range, DateRange::default_window(d(2025, 1, 1)));

        let range = DateRange::resolve(Some(d(2020, 1, 1)), None, d(2025, 1, 1)).unwrap();
        assert_eq!(range.start(), d(2020, 1, 1));
        assert_eq!(range.end(), d(2025, 1, 1));

        assert!(DateRange::resolve(Some(d(2025, 2, 1)), None, d(2025, 1, 1)).is_err());
        assert!(matches!(
            DateRange::resolve(None, Some(d(2021, 6, 30)), d(2025, 1, 1)),
            Err(DataError::InvalidDateRange { .. })
        ));
    }

    #[test]
    fn test_split_at() {
        let range = DateRange::new(d(2024, 1, 1), d(2024, 1, 10)).unwrap();

        let (left, right) = range.split_at(d(2024, 1, 5));
        assert_eq!(left.unwrap().end(), d(2024, 1, 4));
        assert_eq!(right.unwrap().start(), d(2024, 1, 5));
        assert_eq!(left.unwrap().len_days() + right.unwrap().len_days(), range.len_days());

        let (left, right) = range.split_at(d(2024, 1, 1));
        assert!(left.is_none());
        assert_eq!(right, Some(range));

        let (left, right) = range.split_at(d(2024, 2, 1));
        assert_eq!(left, Some(range));
        assert!(right.is_none());
    }

    #[test]
    fn test_parse_date_arg() {
        assert_eq!(parse_date_arg("2024-06-26").unwrap(), d(2024, 6, 26));
        assert_eq!(parse_date_arg("2024/06/26").unwrap(), d(2024, 6, 26));
        assert!(parse_date_arg("26.06.2024").is_err());
        assert!(parse_date_arg("2024-02-30").is_err());
    }
}
