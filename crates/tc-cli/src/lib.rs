//! Timecard CLI library.
//!
//! This crate provides the `tc` command-line interface over the attendance
//! ledger, payroll calculator and report aggregator.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands, EmployeeAction, FilterArgs, ReportKind};
pub use config::Config;
