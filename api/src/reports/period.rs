//! Report windows and time buckets

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Inclusive `[start, end]` window a report aggregates over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportPeriod {
    /// Fill missing bounds: `end` defaults to `now`, `start` to `default_days` before `end`
    pub fn resolve(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        default_days: i64,
    ) -> Result<Self, DomainError> {
        let end = end.unwrap_or(now);
        let start = start.unwrap_or(end - Duration::days(default_days));
        if start > end {
            return Err(DomainError::Validation(format!(
                "Report start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }

    /// Whole days covered, never less than one
    pub fn days(&self) -> i64 {
        let seconds = (self.end - self.start).num_seconds();
        let days = seconds / 86_400 + i64::from(seconds % 86_400 != 0);
        days.max(1)
    }
}

/// Bucket width for time series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Day,
    Week,
    Month,
    Year,
}

impl std::str::FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "day" => Ok(Granularity::Day),
            "week" => Ok(Granularity::Week),
            "month" => Ok(Granularity::Month),
            "year" => Ok(Granularity::Year),
            _ => Err(format!("Unknown granularity: {}", s)),
        }
    }
}

impl Granularity {
    /// First day of the bucket holding `at`; weeks start on Monday
    pub fn bucket_start(&self, at: DateTime<Utc>) -> NaiveDate {
        let date = at.date_naive();
        match self {
            Granularity::Day => date,
            Granularity::Week => {
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            Granularity::Month => date.with_day(1).unwrap_or(date),
            Granularity::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
        }
    }

    /// Label of the bucket starting on `start`
    pub fn label(&self, start: NaiveDate) -> String {
        match self {
            Granularity::Day => start.format("%Y-%m-%d").to_string(),
            Granularity::Week => {
                let week = start.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            Granularity::Month => start.format("%Y-%m").to_string(),
            Granularity::Year => start.format("%Y").to_string(),
        }
    }
}
