use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tc_cli::commands::util::{date_range, now_or, today_or};
use tc_cli::commands::{attendance, employee, payroll, report};
use tc_cli::{Cli, Commands, Config, EmployeeAction};
use tc_core::{EmployeeDirectory, Granularity, Ledger, PayrollCalculator, ReportAggregator};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(tc_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = tc_db::Database::open(&config.database_path).with_context(|| {
        format!("failed to open database {}", config.database_path.display())
    })?;
    Ok((db, config))
}

#[expect(
    clippy::too_many_lines,
    reason = "CLI command dispatch is inherently verbose"
)]
fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr so --json output stays parseable
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let Some(command) = cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let (db, config) = open_database(cli.config.as_deref())?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match command {
        Commands::CheckIn {
            employee,
            at,
            date,
            json,
        } => {
            let at = now_or(at);
            let ledger = Ledger::new(&db, config.attendance);
            let date = date.unwrap_or_else(|| at.date());
            attendance::check_in(&mut out, &ledger, &employee, date, at, json)?;
        }
        Commands::CheckOut {
            employee,
            at,
            date,
            json,
        } => {
            let at = now_or(at);
            let ledger = Ledger::new(&db, config.attendance);
            let date = date.unwrap_or_else(|| at.date());
            attendance::check_out(&mut out, &ledger, &employee, date, at, json)?;
        }
        Commands::Status {
            employee,
            date,
            json,
        } => {
            let ledger = Ledger::new(&db, config.attendance);
            attendance::status(&mut out, &ledger, &employee, today_or(date), json)?;
        }
        Commands::Absent {
            employee,
            date,
            reason,
            json,
        } => {
            let ledger = Ledger::new(&db, config.attendance);
            attendance::absent(&mut out, &ledger, &employee, today_or(date), reason, json)?;
        }
        Commands::Amend {
            session,
            notes,
            mark,
            admin,
            json,
        } => {
            let ledger = Ledger::new(&db, config.attendance);
            attendance::amend(&mut out, &ledger, &session, notes, mark, admin, json)?;
        }
        Commands::Employee(action) => {
            let directory = EmployeeDirectory::new(&db);
            match action {
                EmployeeAction::Set {
                    id,
                    name,
                    department,
                    clear_department,
                    rate,
                    json,
                } => employee::set(
                    &mut out,
                    &directory,
                    &id,
                    name,
                    department,
                    clear_department,
                    rate,
                    json,
                )?,
                EmployeeAction::List { json } => employee::list(&mut out, &directory, json)?,
            }
        }
        Commands::Payroll {
            employees,
            from,
            to,
            save,
            json,
        } => {
            let period = date_range(from, to)?;
            let calculator = PayrollCalculator::new(&db, config.payroll)
                .context("invalid payroll configuration")?;
            payroll::run(&mut out, &calculator, employees, &period, save, json)?;
        }
        Commands::Report { kind, filter } => {
            let aggregator = ReportAggregator::new(&db, config.attendance);
            report::summary(
                &mut out,
                &aggregator,
                Granularity::from(kind),
                &filter.to_filter()?,
                filter.json,
            )?;
        }
        Commands::Analytics { filter } => {
            let aggregator = ReportAggregator::new(&db, config.attendance);
            report::analytics(&mut out, &aggregator, &filter.to_filter()?, filter.json)?;
        }
    }

    out.flush()?;
    Ok(())
}
