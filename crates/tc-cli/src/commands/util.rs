//! Shared utilities for CLI commands.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Serialize;
use tc_core::{DateRange, ReportFilter};

use crate::FilterArgs;

/// Accepted wall-clock formats, tried in order.
const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse a local wall-clock timestamp.
///
/// Supports `2025-01-29T08:00`, `2025-01-29 08:00` and both with seconds.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, String> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s.trim(), format).ok())
        .ok_or_else(|| {
            format!("invalid timestamp: {s}. Use local time, e.g. 2025-01-29T08:00 or 2025-01-29 08:00")
        })
}

/// The given timestamp, or the current local time.
pub fn now_or(at: Option<NaiveDateTime>) -> NaiveDateTime {
    at.unwrap_or_else(|| Local::now().naive_local())
}

/// The given date, or today in local time.
pub fn today_or(date: Option<NaiveDate>) -> NaiveDate {
    date.unwrap_or_else(|| Local::now().date_naive())
}

pub fn date_range(from: NaiveDate, to: NaiveDate) -> Result<DateRange> {
    DateRange::new(from, to).with_context(|| format!("invalid period {from}..{to}"))
}

impl FilterArgs {
    /// Builds the core report filter, validating the date range.
    pub fn to_filter(&self) -> Result<ReportFilter> {
        Ok(ReportFilter {
            range: date_range(self.from, self.to)?,
            employee_id: self.employee.clone(),
            department: self.department.clone(),
            status: self.status,
        })
    }
}

/// Writes `value` as pretty-printed JSON followed by a newline.
pub fn write_json<W: Write, T: Serialize + ?Sized>(writer: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, value).context("failed to encode JSON")?;
    writeln!(writer)?;
    Ok(())
}

/// Formats an optional amount with two decimal places, or `-`.
pub fn amount_or_dash(value: Option<Decimal>) -> String {
    value.map_or_else(|| "-".to_string(), |value| format!("{value:.2}"))
}
