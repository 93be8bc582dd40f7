//! Core domain logic for timecard.
//!
//! This crate contains the fundamental types and logic for:
//! - Ledger: the check-in/check-out lifecycle, one open session per employee per day
//! - Valuation: converting session times into billable hours and wages
//! - Payroll: regular/overtime splits and deductions over a pay period
//! - Reports: daily/weekly/monthly summaries and attendance analytics
//!
//! Services hold an injected [`Store`]; [`MemoryStore`] is the in-process
//! implementation, the SQLite one lives in `tc-db`.

pub mod employee;
mod error;
pub mod ledger;
mod memory;
pub mod payroll;
pub mod report;
pub mod session;
mod store;
pub mod types;
pub mod valuation;

pub use employee::{Employee, EmployeeDirectory, EmployeePatch};
pub use error::{Error, ErrorKind, Result, StoreError};
pub use ledger::{AttendancePolicy, Ledger};
pub use memory::MemoryStore;
pub use payroll::{
    BulkFailure, BulkPayroll, Deductions, NamedAmount, PayPeriod, PayrollCalculation,
    PayrollCalculator, PayrollConfig,
};
pub use report::{
    Analytics, AttendanceSummary, DayRecord, DepartmentBreakdown, Granularity, ReportAggregator,
    ReportFilter, TrendPoint, Trends,
};
pub use session::{Absence, AttendanceSession, SessionClose, SessionPatch, SessionQuery, SessionState};
pub use store::Store;
pub use types::{
    AttendanceMark, DateRange, EmployeeId, Role, SessionId, SessionStatus, ValidationError,
};
