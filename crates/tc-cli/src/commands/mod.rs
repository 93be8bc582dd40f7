//! CLI subcommand implementations.

pub mod attendance;
pub mod employee;
pub mod payroll;
pub mod report;
pub mod util;
