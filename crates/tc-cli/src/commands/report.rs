//! Attendance report and analytics commands.
//!
//! Implements `tc report daily|weekly|monthly` and `tc analytics`, each with
//! human-readable and JSON output.

use std::io::Write;

use anyhow::Result;
use tc_core::report::UNASSIGNED_DEPARTMENT;
use tc_core::{Analytics, AttendanceSummary, Granularity, ReportAggregator, ReportFilter, Store};

use super::util::write_json;

fn title(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::Daily => "DAILY ATTENDANCE",
        Granularity::Weekly => "WEEKLY ATTENDANCE",
        Granularity::Monthly => "MONTHLY ATTENDANCE",
    }
}

/// Writes one bucket row as an indented block.
fn write_summary<W: Write>(writer: &mut W, row: &AttendanceSummary) -> Result<()> {
    writeln!(
        writer,
        "{}  {} [{}]",
        row.bucket,
        row.employee_id,
        row.department.as_deref().unwrap_or(UNASSIGNED_DEPARTMENT)
    )?;
    writeln!(
        writer,
        "  Days:     {} ({} present, {} late, {} absent)",
        row.total_working_units, row.units_present, row.units_late, row.units_absent
    )?;
    writeln!(
        writer,
        "  Hours:    {:.2} (overtime {:.2}, average {:.2})",
        row.total_hours, row.overtime_hours, row.average_hours_per_unit
    )?;
    writeln!(writer, "  Rate:     {:.2}%", row.attendance_rate)?;
    Ok(())
}

pub fn summary<W: Write, S: Store>(
    writer: &mut W,
    aggregator: &ReportAggregator<S>,
    granularity: Granularity,
    filter: &ReportFilter,
    json: bool,
) -> Result<()> {
    let rows = aggregator.generate_report(granularity, filter)?;
    if json {
        return write_json(writer, &rows);
    }

    writeln!(writer, "{}: {}", title(granularity), filter.range)?;
    if rows.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "No attendance recorded.")?;
        return Ok(());
    }
    for row in &rows {
        writeln!(writer)?;
        write_summary(writer, row)?;
    }
    Ok(())
}

fn write_analytics<W: Write>(writer: &mut W, analytics: &Analytics) -> Result<()> {
    writeln!(
        writer,
        "ANALYTICS: {} to {}",
        analytics.start_date, analytics.end_date
    )?;
    writeln!(writer)?;
    writeln!(writer, "Days recorded:  {}", analytics.total_working_units)?;
    writeln!(writer, "Total hours:    {:.2}", analytics.total_hours)?;
    writeln!(writer, "Overtime hours: {:.2}", analytics.overtime_hours)?;
    writeln!(writer, "Attendance:     {:.2}%", analytics.attendance_rate)?;
    writeln!(writer, "Punctuality:    {:.2}%", analytics.punctuality_rate)?;
    writeln!(writer, "Absenteeism:    {:.2}%", analytics.absenteeism_rate)?;

    if !analytics.department_breakdown.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "BY DEPARTMENT")?;
        for department in &analytics.department_breakdown {
            writeln!(
                writer,
                "  {}: {} employees, {} days, {:.2} hours, {:.2}% attendance",
                department.department,
                department.employees,
                department.total_working_units,
                department.total_hours,
                department.attendance_rate
            )?;
        }
    }

    if !analytics.trends.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "TREND")?;
        for point in &analytics.trends {
            writeln!(
                writer,
                "  {}  {:.2}% ({} present, {} absent)",
                point.date, point.attendance_rate, point.present_count, point.absent_count
            )?;
        }
    }
    Ok(())
}

pub fn analytics<W: Write, S: Store>(
    writer: &mut W,
    aggregator: &ReportAggregator<S>,
    filter: &ReportFilter,
    json: bool,
) -> Result<()> {
    let analytics = aggregator.analytics(filter)?;
    if json {
        return write_json(writer, &analytics);
    }
    write_analytics(writer, &analytics)
}
