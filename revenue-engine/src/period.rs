use crate::error::{RevenueError, RevenueResult};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

const MIN_YEAR: i32 = 1970;
const MAX_YEAR: i32 = 9999;

/// A calendar month used as the reporting window
///
/// Bounds are timezone-naive: the period starts at 00:00:00 on the first day
/// and ends at 23:59:59 on the last day, both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "PeriodParts", into = "PeriodParts")]
pub struct ReportPeriod {
    first_day: NaiveDate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct PeriodParts {
    year: i32,
    month: u32,
}

impl TryFrom<PeriodParts> for ReportPeriod {
    type Error = RevenueError;

    fn try_from(parts: PeriodParts) -> Result<Self, Self::Error> {
        ReportPeriod::new(parts.year, parts.month)
    }
}

impl From<ReportPeriod> for PeriodParts {
    fn from(period: ReportPeriod) -> Self {
        Self {
            year: period.year(),
            month: period.month(),
        }
    }
}

impl ReportPeriod {
    /// Create a period for `month` (1-12) of `year`
    pub fn new(year: i32, month: u32) -> RevenueResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(RevenueError::InvalidPeriod(format!(
                "month must be between 1 and 12, got {}",
                month
            )));
        }
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(RevenueError::InvalidPeriod(format!(
                "year must be between {} and {}, got {}",
                MIN_YEAR, MAX_YEAR, year
            )));
        }

        let first_day = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
            RevenueError::InvalidPeriod(format!("{}-{:02} is not a valid month", year, month))
        })?;

        Ok(Self { first_day })
    }

    /// The period containing `today`
    pub fn current(today: NaiveDate) -> RevenueResult<Self> {
        Self::new(today.year(), today.month())
    }

    pub fn year(&self) -> i32 {
        self.first_day.year()
    }

    pub fn month(&self) -> u32 {
        self.first_day.month()
    }

    pub fn first_day(&self) -> NaiveDate {
        self.first_day
    }

    pub fn last_day(&self) -> NaiveDate {
        self.first_day + Duration::days(i64::from(self.days_in_month()) - 1)
    }

    pub fn days_in_month(&self) -> u32 {
        match self.month() {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            _ if NaiveDate::from_ymd_opt(self.year(), 2, 29).is_some() => 29,
            _ => 28,
        }
    }

    /// First instant of the period
    pub fn start(&self) -> NaiveDateTime {
        self.first_day.and_time(NaiveTime::MIN)
    }

    /// Last instant of the period (23:59:59 on the last day)
    pub fn end_inclusive(&self) -> NaiveDateTime {
        self.last_day().and_time(end_of_day())
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.start() <= at && at <= self.end_inclusive()
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.first_day <= date && date <= self.last_day()
    }

    /// The month before this one, rolling the year back after January
    pub fn previous(&self) -> Option<Self> {
        let (year, month) = match self.month() {
            1 => (self.year() - 1, 12),
            m => (self.year(), m - 1),
        };
        Self::new(year, month).ok()
    }

    /// The month after this one, rolling the year forward after December
    pub fn next(&self) -> Option<Self> {
        let (year, month) = match self.month() {
            12 => (self.year() + 1, 1),
            m => (self.year(), m + 1),
        };
        Self::new(year, month).ok()
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year(), self.month())
    }
}
