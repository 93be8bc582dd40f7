//! Core type definitions with validation.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest date range, in days, accepted by payroll and report requests.
pub const MAX_RANGE_DAYS: i64 = 365;

/// Validation errors for core types and request boundaries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A required field was not supplied.
    #[error("{field} is required")]
    Missing { field: &'static str },

    /// A monetary or hour value was negative.
    #[error("{field} cannot be negative, got {value}")]
    Negative { field: &'static str, value: Decimal },

    /// A fractional rate was outside `[0, 1]`.
    #[error("{field} must be between 0 and 1, got {value}")]
    RateOutOfRange { field: &'static str, value: Decimal },

    /// The overtime multiplier would pay overtime below the regular rate.
    #[error("overtime multiplier must be at least 1, got {value}")]
    MultiplierTooSmall { value: Decimal },

    /// The worker pool was configured with zero threads.
    #[error("payroll worker count must be at least 1")]
    NoWorkers,

    /// A date range ended before it started.
    #[error("start date {start} is after end date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },

    /// A date range exceeded [`MAX_RANGE_DAYS`].
    #[error("date range spans {days} days, the limit is {MAX_RANGE_DAYS}")]
    RangeTooLong { days: i64 },

    /// Invalid session status value.
    #[error("invalid session status: {value}")]
    InvalidStatus { value: String },

    /// Invalid attendance mark value.
    #[error("invalid attendance mark: {value}")]
    InvalidMark { value: String },

    /// A monetary value exceeded its upper limit.
    #[error("{field} cannot exceed {max}, got {value}")]
    TooLarge {
        field: &'static str,
        value: Decimal,
        max: Decimal,
    },

    /// A session can only be marked present or late.
    #[error("a session cannot be marked {mark}")]
    MarkNotAllowed { mark: AttendanceMark },

    /// The caller's role may not change this field.
    #[error("{role} callers cannot change {field}")]
    Forbidden { role: Role, field: &'static str },
}

/// Lifecycle state of an attendance session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Checked in, awaiting checkout.
    Open,
    /// Checked out. Terminal.
    Closed,
}

impl SessionStatus {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            _ => Err(ValidationError::InvalidStatus {
                value: s.to_string(),
            }),
        }
    }
}

/// How a working day is counted in attendance reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceMark {
    /// Checked in on time.
    Present,
    /// Checked in after the configured start plus grace period.
    Late,
    /// Recorded as absent with no session that day.
    Absent,
}

impl AttendanceMark {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Late => "late",
            Self::Absent => "absent",
        }
    }

    /// Whether the day counts towards `unitsPresent`.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        matches!(self, Self::Present | Self::Late)
    }
}

impl fmt::Display for AttendanceMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AttendanceMark {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(Self::Present),
            "late" => Ok(Self::Late),
            "absent" => Ok(Self::Absent),
            _ => Err(ValidationError::InvalidMark {
                value: s.to_string(),
            }),
        }
    }
}

/// Role of an already-authorized caller, used to scope typed patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Employee,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Employee => write!(f, "employee"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

define_string_id!(
    /// A validated employee identifier, supplied by the identity collaborator.
    EmployeeId, "employee ID"
);

define_string_id!(
    /// A validated attendance session identifier.
    SessionId, "session ID"
);

impl SessionId {
    /// Generates a fresh random session ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// An inclusive calendar date range, validated at construction.
///
/// Both pay periods and report filters use this type, so every request that
/// reaches a service has `start <= end` and spans at most [`MAX_RANGE_DAYS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvertedRange { start, end });
        }
        let days = (end - start).num_days();
        if days > MAX_RANGE_DAYS {
            return Err(ValidationError::RangeTooLong { days });
        }
        Ok(Self { start, end })
    }

    pub const fn start(&self) -> NaiveDate {
        self.start
    }

    pub const fn end(&self) -> NaiveDate {
        self.end
    }

    /// Whether `date` falls inside the range, both ends inclusive.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Stable key for the range, used as the payroll period ID.
    pub fn id(&self) -> String {
        format!("{}..{}", self.start, self.end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}
