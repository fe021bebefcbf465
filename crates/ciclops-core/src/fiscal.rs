//! Fiscal calendar resolver
//!
//! The fiscal year is made of 13 periods of four weeks. Weeks run from the
//! anchor weekday (Tuesday by default) to the day before it, so a period is
//! Tuesday through Monday. Fiscal year `Y` starts on the first anchor weekday
//! on or after January 1 of `Y`; dates before that belong to period 13 of
//! `Y - 1`.
//!
//! Periods 1-12 are exactly 28 days. Period 13 runs from day 337 to the day
//! before the next fiscal year starts, so it is 28 days in most years and 35
//! days when the year has a 53rd week.
//!
//! Everything here is pure and deterministic.

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Days in a regular period (four weeks)
pub const PERIOD_DAYS: i64 = 28;

/// Number of periods in a fiscal year
pub const PERIODS_PER_YEAR: u32 = 13;

/// One of the 13 periods of a fiscal year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FiscalPeriod {
    pub year: i32,
    pub period_number: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl FiscalPeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }

    /// Length of the period in days (28 or 35)
    pub fn days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    /// Compact key, e.g. `2025-P13`
    pub fn key(&self) -> String {
        format!("{}-P{}", self.year, self.period_number)
    }
}

impl fmt::Display for FiscalPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-P{}", self.year, self.period_number)
    }
}

/// Fiscal calendar with a configurable anchor weekday and supported year range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiscalCalendar {
    anchor: Weekday,
    min_year: i32,
    max_year: i32,
}

impl Default for FiscalCalendar {
    fn default() -> Self {
        Self {
            anchor: Weekday::Tue,
            min_year: 2000,
            max_year: 2099,
        }
    }
}

impl FiscalCalendar {
    pub fn new(anchor: Weekday, min_year: i32, max_year: i32) -> Self {
        Self {
            anchor,
            min_year,
            max_year,
        }
    }

    pub fn anchor(&self) -> Weekday {
        self.anchor
    }

    pub fn supported_years(&self) -> (i32, i32) {
        (self.min_year, self.max_year)
    }

    /// First day of fiscal year `year`
    pub fn year_start(&self, year: i32) -> Result<NaiveDate> {
        let jan1 = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(|| Error::InvalidDate {
            date: format!("{year}-01-01"),
        })?;
        let offset = (7 + self.anchor.num_days_from_monday()
            - jan1.weekday().num_days_from_monday())
            % 7;
        Ok(jan1 + Duration::days(offset as i64))
    }

    /// Fiscal year that contains `date`
    pub fn fiscal_year_of(&self, date: NaiveDate) -> Result<i32> {
        let mut year = date.year();
        if date < self.year_start(year)? {
            year -= 1;
        }
        self.check_year(year, || date.to_string())?;
        Ok(year)
    }

    /// Resolve the fiscal period containing `date`
    pub fn period_for(&self, date: NaiveDate) -> Result<FiscalPeriod> {
        let year = self.fiscal_year_of(date)?;
        let start = self.year_start(year)?;
        let index = (date - start).num_days() / PERIOD_DAYS;
        let period_number = (index as u32 + 1).min(PERIODS_PER_YEAR);
        self.period(year, period_number)
    }

    /// Start and end dates (inclusive) of period `period_number` in `year`
    pub fn date_range_for(&self, year: i32, period_number: u32) -> Result<(NaiveDate, NaiveDate)> {
        if !(1..=PERIODS_PER_YEAR).contains(&period_number) {
            return Err(Error::InvalidData(format!(
                "Period number must be between 1 and {}, got {}",
                PERIODS_PER_YEAR, period_number
            )));
        }
        self.check_year(year, || format!("FY{year}"))?;

        let year_start = self.year_start(year)?;
        let start = year_start + Duration::days(PERIOD_DAYS * (period_number as i64 - 1));
        let end = if period_number < PERIODS_PER_YEAR {
            start + Duration::days(PERIOD_DAYS - 1)
        } else {
            self.year_start(year + 1)? - Duration::days(1)
        };
        Ok((start, end))
    }

    /// Build a full `FiscalPeriod` value
    pub fn period(&self, year: i32, period_number: u32) -> Result<FiscalPeriod> {
        let (start_date, end_date) = self.date_range_for(year, period_number)?;
        Ok(FiscalPeriod {
            year,
            period_number,
            start_date,
            end_date,
        })
    }

    /// All 13 periods of a fiscal year
    pub fn periods_in_year(&self, year: i32) -> Result<Vec<FiscalPeriod>> {
        (1..=PERIODS_PER_YEAR)
            .map(|n| self.period(year, n))
            .collect()
    }

    /// Fiscal week (1-based, 52 or 53) and fiscal year of `date`
    pub fn week_of_year(&self, date: NaiveDate) -> Result<(i32, u32)> {
        let year = self.fiscal_year_of(date)?;
        let start = self.year_start(year)?;
        Ok((year, ((date - start).num_days() / 7) as u32 + 1))
    }

    /// Period immediately before `period`, crossing year boundaries
    pub fn previous(&self, period: &FiscalPeriod) -> Result<FiscalPeriod> {
        if period.period_number > 1 {
            self.period(period.year, period.period_number - 1)
        } else {
            self.period(period.year - 1, PERIODS_PER_YEAR)
        }
    }

    /// Period immediately after `period`, crossing year boundaries
    pub fn next(&self, period: &FiscalPeriod) -> Result<FiscalPeriod> {
        if period.period_number < PERIODS_PER_YEAR {
            self.period(period.year, period.period_number + 1)
        } else {
            self.period(period.year + 1, 1)
        }
    }

    /// Parse a period key such as `2025-P13` or `2025-13`
    pub fn parse_period(&self, key: &str) -> Result<FiscalPeriod> {
        let invalid = || Error::InvalidData(format!("Invalid fiscal period '{}'", key));
        let (year, number) = key.trim().split_once('-').ok_or_else(invalid)?;
        let number = number.trim_start_matches(['P', 'p']);
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let number: u32 = number.parse().map_err(|_| invalid())?;
        self.period(year, number)
    }

    fn check_year(&self, year: i32, date: impl FnOnce() -> String) -> Result<()> {
        if year < self.min_year || year > self.max_year {
            return Err(Error::InvalidDate { date: date() });
        }
        Ok(())
    }
}
