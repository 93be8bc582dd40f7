//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use tc_core::{AttendanceMark, EmployeeId, Granularity, SessionId};

use crate::commands::util::parse_timestamp;

/// Attendance and payroll tracker.
///
/// Records check-ins and check-outs, prices worked hours into payroll, and
/// summarizes attendance by day, week or month.
#[derive(Debug, Parser)]
#[command(name = "tc", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Open a session for an employee.
    CheckIn {
        employee: EmployeeId,

        /// Check-in time (e.g., 2025-01-29T08:00). Defaults to now.
        #[arg(long, value_parser = parse_timestamp)]
        at: Option<NaiveDateTime>,

        /// Day the session counts towards. Defaults to the date of `--at`.
        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long)]
        json: bool,
    },

    /// Close an employee's open session.
    CheckOut {
        employee: EmployeeId,

        /// Checkout time. Defaults to now.
        #[arg(long, value_parser = parse_timestamp)]
        at: Option<NaiveDateTime>,

        /// Day of the open session, for shifts that end after midnight.
        /// Defaults to the date of `--at`.
        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long)]
        json: bool,
    },

    /// Show an employee's session state for a day.
    Status {
        employee: EmployeeId,

        /// Day to inspect. Defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long)]
        json: bool,
    },

    /// Record an employee as absent for a day.
    Absent {
        employee: EmployeeId,

        /// Day of the absence. Defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long)]
        reason: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Change the notes or attendance mark of a session.
    Amend {
        session: SessionId,

        #[arg(long)]
        notes: Option<String>,

        /// New mark (present or late). Requires --admin.
        #[arg(long)]
        mark: Option<AttendanceMark>,

        /// Apply the change with admin rights.
        #[arg(long)]
        admin: bool,

        #[arg(long)]
        json: bool,
    },

    /// Manage employee profiles.
    #[command(subcommand)]
    Employee(EmployeeAction),

    /// Calculate payroll for a pay period.
    Payroll {
        /// Employees to include. Defaults to every known employee.
        employees: Vec<EmployeeId>,

        /// First day of the period.
        #[arg(long)]
        from: NaiveDate,

        /// Last day of the period, inclusive.
        #[arg(long)]
        to: NaiveDate,

        /// Save results under the period ID, replacing earlier runs.
        #[arg(long)]
        save: bool,

        #[arg(long)]
        json: bool,
    },

    /// Summarize attendance per employee and day, week or month.
    Report {
        #[arg(value_enum)]
        kind: ReportKind,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Show attendance rates, department breakdown and daily trend.
    Analytics {
        #[command(flatten)]
        filter: FilterArgs,
    },
}

/// Employee profile actions.
#[derive(Debug, Subcommand)]
pub enum EmployeeAction {
    /// Create or update an employee.
    Set {
        id: EmployeeId,

        #[arg(long)]
        name: Option<String>,

        #[arg(long, conflicts_with = "clear_department")]
        department: Option<String>,

        /// Remove the employee's department.
        #[arg(long)]
        clear_department: bool,

        /// Hourly rate. Required when creating an employee.
        #[arg(long)]
        rate: Option<Decimal>,

        #[arg(long)]
        json: bool,
    },

    /// List employees.
    List {
        #[arg(long)]
        json: bool,
    },
}

/// Report bucket size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportKind {
    Daily,
    Weekly,
    Monthly,
}

impl From<ReportKind> for Granularity {
    fn from(kind: ReportKind) -> Self {
        match kind {
            ReportKind::Daily => Self::Daily,
            ReportKind::Weekly => Self::Weekly,
            ReportKind::Monthly => Self::Monthly,
        }
    }
}

/// Filters shared by report commands.
#[derive(Debug, Clone, Args)]
pub struct FilterArgs {
    /// First day to include.
    #[arg(long)]
    pub from: NaiveDate,

    /// Last day to include.
    #[arg(long)]
    pub to: NaiveDate,

    #[arg(long)]
    pub employee: Option<EmployeeId>,

    #[arg(long)]
    pub department: Option<String>,

    /// Only include days with this mark (present, late or absent).
    #[arg(long)]
    pub status: Option<AttendanceMark>,

    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_kind_selects_granularity() {
        let cli = Cli::try_parse_from([
            "tc", "report", "weekly", "--from", "2025-01-01", "--to", "2025-01-31",
        ])
        .unwrap();
        let Some(Commands::Report { kind, filter }) = cli.command else {
            panic!("expected report command");
        };
        assert_eq!(Granularity::from(kind), Granularity::Weekly);
        assert_eq!(filter.from, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    }

    #[test]
    fn test_unknown_report_kind_is_rejected() {
        let err = Cli::try_parse_from([
            "tc", "report", "yearly", "--from", "2025-01-01", "--to", "2025-01-31",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
