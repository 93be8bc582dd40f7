//! Employee profile commands.

use std::io::Write;

use anyhow::Result;
use rust_decimal::Decimal;
use tc_core::report::UNASSIGNED_DEPARTMENT;
use tc_core::{Employee, EmployeeDirectory, EmployeeId, EmployeePatch, Store};

use super::util::write_json;

fn write_employee<W: Write>(writer: &mut W, employee: &Employee) -> Result<()> {
    writeln!(
        writer,
        "{}  {}  [{}]  {:.2}/h",
        employee.id,
        employee.name,
        employee.department.as_deref().unwrap_or(UNASSIGNED_DEPARTMENT),
        employee.hourly_rate
    )?;
    Ok(())
}

/// Creates or updates an employee from command-line flags.
#[expect(
    clippy::too_many_arguments,
    reason = "mirrors the flags of `tc employee set`"
)]
pub fn set<W: Write, S: Store>(
    writer: &mut W,
    directory: &EmployeeDirectory<S>,
    id: &EmployeeId,
    name: Option<String>,
    department: Option<String>,
    clear_department: bool,
    hourly_rate: Option<Decimal>,
    json: bool,
) -> Result<()> {
    let department = if clear_department {
        Some(None)
    } else {
        department.map(Some)
    };
    let patch = EmployeePatch {
        name,
        department,
        hourly_rate,
    };
    let employee = directory.apply_patch(id, &patch)?;
    if json {
        return write_json(writer, &employee);
    }
    writeln!(writer, "Saved.")?;
    write_employee(writer, &employee)
}

pub fn list<W: Write, S: Store>(
    writer: &mut W,
    directory: &EmployeeDirectory<S>,
    json: bool,
) -> Result<()> {
    let employees = directory.list()?;
    if json {
        return write_json(writer, &employees);
    }
    if employees.is_empty() {
        writeln!(writer, "No employees.")?;
        writeln!(writer)?;
        writeln!(
            writer,
            "Hint: Run 'tc employee set <ID> --rate <RATE>' to add one."
        )?;
        return Ok(());
    }
    for employee in &employees {
        write_employee(writer, employee)?;
    }
    Ok(())
}
