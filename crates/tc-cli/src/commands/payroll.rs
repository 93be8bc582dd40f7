//! Payroll command.

use std::io::Write;

use anyhow::{Context, Result};
use tc_core::{BulkPayroll, EmployeeId, PayPeriod, PayrollCalculation, PayrollCalculator, Store};

use super::util::write_json;

/// Calculates payroll for `employees`, or for every known employee when empty.
///
/// With `save`, results are stored under the period ID and replace earlier runs.
pub fn run<W: Write, S: Store>(
    writer: &mut W,
    calculator: &PayrollCalculator<S>,
    employees: Vec<EmployeeId>,
    period: &PayPeriod,
    save: bool,
    json: bool,
) -> Result<()> {
    let employees = if employees.is_empty() {
        calculator
            .store()
            .list_employees()
            .context("failed to list employees")?
            .into_iter()
            .map(|employee| employee.id)
            .collect()
    } else {
        employees
    };

    let bulk = if save {
        calculator.run_payroll(&employees, period)?
    } else {
        calculator.calculate_bulk_payroll(&employees, period)?
    };

    if json {
        return write_json(writer, &bulk);
    }
    write_payroll(writer, period, &bulk)?;
    if save && !bulk.results.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "Saved under period {}.", period.id())?;
    }
    Ok(())
}

fn write_calculation<W: Write>(writer: &mut W, calc: &PayrollCalculation) -> Result<()> {
    writeln!(writer, "{}", calc.employee_id)?;
    writeln!(
        writer,
        "  Hours:       {:.2} (regular {:.2}, overtime {:.2})",
        calc.total_hours, calc.regular_hours, calc.overtime_hours
    )?;
    writeln!(
        writer,
        "  Gross:       {:.2} (regular {:.2}, overtime {:.2})",
        calc.gross_pay, calc.regular_pay, calc.overtime_pay
    )?;
    writeln!(writer, "  Deductions:  {:.2}", calc.total_deductions)?;
    writeln!(writer, "  Net:         {:.2}", calc.net_pay)?;
    Ok(())
}

fn write_payroll<W: Write>(writer: &mut W, period: &PayPeriod, bulk: &BulkPayroll) -> Result<()> {
    writeln!(writer, "PAYROLL: {period}")?;
    if bulk.results.is_empty() && bulk.failed.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "No employees.")?;
        return Ok(());
    }
    for calc in &bulk.results {
        writeln!(writer)?;
        write_calculation(writer, calc)?;
    }
    if !bulk.failed.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "FAILED")?;
        for failure in &bulk.failed {
            writeln!(
                writer,
                "  {} ({}): {}",
                failure.employee_id, failure.kind, failure.reason
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveDate;
    use insta::assert_snapshot;
    use rust_decimal_macros::dec;
    use tc_core::{
        AttendancePolicy, DateRange, EmployeeDirectory, EmployeePatch, Ledger, PayrollConfig,
    };
    use tc_db::Database;

    fn id(s: &str) -> EmployeeId {
        EmployeeId::new(s).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn january() -> DateRange {
        DateRange::new(day(1), day(31)).unwrap()
    }

    /// Ada works five 9-hour days at 20/h.
    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        EmployeeDirectory::new(&db)
            .apply_patch(
                &id("ada"),
                &EmployeePatch {
                    hourly_rate: Some(dec!(20)),
                    ..EmployeePatch::default()
                },
            )
            .unwrap();
        let ledger = Ledger::new(&db, AttendancePolicy::default());
        for d in 6..=10 {
            ledger
                .check_in(&id("ada"), day(d), day(d).and_hms_opt(8, 0, 0).unwrap())
                .unwrap();
            ledger
                .check_out(&id("ada"), day(d), day(d).and_hms_opt(17, 0, 0).unwrap())
                .unwrap();
        }
        db
    }

    #[test]
    fn test_payroll_output_with_failure() {
        let db = seeded();
        let calculator = PayrollCalculator::new(&db, PayrollConfig::default()).unwrap();
        let mut buf = Vec::new();
        run(
            &mut buf,
            &calculator,
            vec![id("ada"), id("ghost")],
            &january(),
            false,
            false,
        )
        .unwrap();
        assert_snapshot!(String::from_utf8(buf).unwrap(), @r"
        PAYROLL: 2025-01-01 to 2025-01-31

        ada
          Hours:       45.00 (regular 40.00, overtime 5.00)
          Gross:       950.00 (regular 800.00, overtime 150.00)
          Deductions:  215.18
          Net:         734.82

        FAILED
          ghost (not_found): employee not found: ghost
        ");
    }

    #[test]
    fn test_payroll_defaults_to_all_employees_and_saves() {
        let db = seeded();
        let calculator = PayrollCalculator::new(&db, PayrollConfig::default()).unwrap();
        let mut buf = Vec::new();
        run(
            &mut buf,
            &calculator,
            Vec::new(),
            &january(),
            true,
            true,
        )
        .unwrap();
        let bulk: BulkPayroll = serde_json::from_slice(&buf).unwrap();
        assert_eq!(bulk.results.len(), 1);
        assert_eq!(bulk.results[0].net_pay, dec!(734.82));
        assert_eq!(
            calculator.saved_payroll(&id("ada"), &january()).unwrap(),
            Some(bulk.results[0].clone())
        );
    }

    #[test]
    fn test_payroll_empty_directory() {
        let db = Database::open_in_memory().unwrap();
        let calculator = PayrollCalculator::new(&db, PayrollConfig::default()).unwrap();
        let mut buf = Vec::new();
        run(
            &mut buf,
            &calculator,
            Vec::new(),
            &january(),
            false,
            false,
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "PAYROLL: 2025-01-01 to 2025-01-31\n\nNo employees.\n"
        );
    }
}
