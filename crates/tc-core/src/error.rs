//! Error taxonomy shared by the ledger, payroll and report services.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{EmployeeId, ValidationError};

/// Errors reported by a [`Store`](crate::Store) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An atomic conditional write lost: the row it required was not in the expected state.
    #[error("conditional write conflicted with existing data")]
    Conflict,

    /// The store could not be reached or is in an unusable state.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Any other backend failure.
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wraps a backend-specific error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// Errors returned by the core services.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or out-of-range input, rejected before touching the store.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The employee already has an open session on this date.
    #[error("employee {employee_id} is already checked in on {date}")]
    AlreadyCheckedIn {
        employee_id: EmployeeId,
        date: NaiveDate,
    },

    /// There is no open session to close on this date.
    #[error("employee {employee_id} has no open session on {date}")]
    NoOpenSession {
        employee_id: EmployeeId,
        date: NaiveDate,
    },

    /// A referenced employee or record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// An internal computation could not complete.
    #[error("computation failed: {0}")]
    Computation(String),

    /// The durable store failed. Safe for the caller to retry; the core never retries.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl Error {
    pub(crate) fn employee_not_found(id: &EmployeeId) -> Self {
        Self::NotFound {
            entity: "employee",
            id: id.to_string(),
        }
    }

    /// The taxonomy class this error belongs to.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::AlreadyCheckedIn { .. } | Self::NoOpenSession { .. } => ErrorKind::State,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Computation(_) => ErrorKind::Computation,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }
}

/// Coarse error classes, stable enough to report in batch results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    State,
    NotFound,
    Computation,
    Persistence,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::State => "state",
            Self::NotFound => "not_found",
            Self::Computation => "computation",
            Self::Persistence => "persistence",
        };
        f.write_str(name)
    }
}

/// Result alias for core service operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
