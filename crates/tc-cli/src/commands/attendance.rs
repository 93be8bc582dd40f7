//! Check-in, check-out, status, absence and amend commands.

use std::io::Write;

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use tc_core::{
    Absence, AttendanceMark, AttendanceSession, EmployeeId, Ledger, Role, SessionId,
    SessionPatch, SessionState, Store,
};

use super::util::{amount_or_dash, write_json};

/// Writes a session as an indented block.
pub fn write_session<W: Write>(writer: &mut W, session: &AttendanceSession) -> Result<()> {
    writeln!(
        writer,
        "{} on {}: {} ({})",
        session.employee_id, session.date, session.status, session.mark
    )?;
    writeln!(writer, "  Session: {}", session.id)?;
    writeln!(writer, "  In:      {}", session.check_in_at)?;
    match session.check_out_at {
        Some(out) => writeln!(writer, "  Out:     {out}")?,
        None => writeln!(writer, "  Out:     -")?,
    }
    writeln!(writer, "  Hours:   {}", amount_or_dash(session.total_hours))?;
    writeln!(
        writer,
        "  Rate:    {}",
        amount_or_dash(session.hourly_rate_at_entry)
    )?;
    writeln!(writer, "  Wage:    {}", amount_or_dash(session.daily_wage))?;
    if let Some(notes) = &session.notes {
        writeln!(writer, "  Notes:   {notes}")?;
    }
    Ok(())
}

pub fn check_in<W: Write, S: Store>(
    writer: &mut W,
    ledger: &Ledger<S>,
    employee: &EmployeeId,
    date: NaiveDate,
    at: NaiveDateTime,
    json: bool,
) -> Result<()> {
    let session = ledger.check_in(employee, date, at)?;
    if json {
        return write_json(writer, &session);
    }
    writeln!(writer, "Checked in.")?;
    write_session(writer, &session)
}

pub fn check_out<W: Write, S: Store>(
    writer: &mut W,
    ledger: &Ledger<S>,
    employee: &EmployeeId,
    date: NaiveDate,
    at: NaiveDateTime,
    json: bool,
) -> Result<()> {
    let session = ledger.check_out(employee, date, at)?;
    if json {
        return write_json(writer, &session);
    }
    writeln!(writer, "Checked out.")?;
    write_session(writer, &session)
}

pub fn status<W: Write, S: Store>(
    writer: &mut W,
    ledger: &Ledger<S>,
    employee: &EmployeeId,
    date: NaiveDate,
    json: bool,
) -> Result<()> {
    let state = ledger.current_status(employee, date)?;
    if json {
        return write_json(writer, &state);
    }
    match state {
        SessionState::NotStarted => {
            writeln!(writer, "{employee} on {date}: not checked in")?;
            Ok(())
        }
        SessionState::Open(session) | SessionState::Closed(session) => {
            write_session(writer, &session)
        }
    }
}

pub fn absent<W: Write, S: Store>(
    writer: &mut W,
    ledger: &Ledger<S>,
    employee: &EmployeeId,
    date: NaiveDate,
    reason: Option<String>,
    json: bool,
) -> Result<()> {
    let absence = ledger.mark_absent(employee, date, reason)?;
    if json {
        return write_json(writer, &absence);
    }
    write_absence(writer, &absence)
}

fn write_absence<W: Write>(writer: &mut W, absence: &Absence) -> Result<()> {
    match &absence.reason {
        Some(reason) => writeln!(
            writer,
            "{} absent on {}: {reason}",
            absence.employee_id, absence.date
        )?,
        None => writeln!(writer, "{} absent on {}", absence.employee_id, absence.date)?,
    }
    Ok(())
}

pub fn amend<W: Write, S: Store>(
    writer: &mut W,
    ledger: &Ledger<S>,
    session: &SessionId,
    notes: Option<String>,
    mark: Option<AttendanceMark>,
    admin: bool,
    json: bool,
) -> Result<()> {
    let role = if admin { Role::Admin } else { Role::Employee };
    let patch = SessionPatch { notes, mark };
    let session = ledger.amend_session(session, &patch, role)?;
    if json {
        return write_json(writer, &session);
    }
    writeln!(writer, "Amended.")?;
    write_session(writer, &session)
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;
    use rust_decimal_macros::dec;
    use tc_core::{AttendancePolicy, EmployeeDirectory, EmployeePatch};
    use tc_db::Database;

    fn ledger() -> Ledger<Database> {
        let db = Database::open_in_memory().unwrap();
        EmployeeDirectory::new(&db)
            .apply_patch(
                &ada(),
                &EmployeePatch {
                    hourly_rate: Some(dec!(20)),
                    ..EmployeePatch::default()
                },
            )
            .unwrap();
        Ledger::new(db, AttendancePolicy::default())
    }

    fn ada() -> EmployeeId {
        EmployeeId::new("ada").unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 29).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        day().and_hms_opt(h, m, 0).unwrap()
    }

    fn output(bytes: Vec<u8>, session: &SessionId) -> String {
        String::from_utf8(bytes)
            .unwrap()
            .replace(session.as_str(), "[SESSION]")
    }

    #[test]
    fn test_check_in_then_out_output() {
        let ledger = ledger();
        let mut buf = Vec::new();
        check_in(&mut buf, &ledger, &ada(), day(), at(8, 0), false).unwrap();
        let SessionState::Open(session) = ledger.current_status(&ada(), day()).unwrap() else {
            panic!("expected open session");
        };
        assert_snapshot!(output(buf, &session.id), @r"
        Checked in.
        ada on 2025-01-29: open (present)
          Session: [SESSION]
          In:      2025-01-29 08:00:00
          Out:     -
          Hours:   -
          Rate:    20.00
          Wage:    -
        ");

        let mut buf = Vec::new();
        check_out(&mut buf, &ledger, &ada(), day(), at(17, 30), false).unwrap();
        assert_snapshot!(output(buf, &session.id), @r"
        Checked out.
        ada on 2025-01-29: closed (present)
          Session: [SESSION]
          In:      2025-01-29 08:00:00
          Out:     2025-01-29 17:30:00
          Hours:   9.50
          Rate:    20.00
          Wage:    190.00
        ");
    }

    #[test]
    fn test_status_before_check_in() {
        let mut buf = Vec::new();
        status(&mut buf, &ledger(), &ada(), day(), false).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "ada on 2025-01-29: not checked in\n"
        );
    }

    #[test]
    fn test_status_json_is_tagged() {
        let ledger = ledger();
        ledger.check_in(&ada(), day(), at(9, 30)).unwrap();
        let mut buf = Vec::new();
        status(&mut buf, &ledger, &ada(), day(), true).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["state"], "open");
        assert_eq!(value["session"]["mark"], "late");
        assert_eq!(value["session"]["hourly_rate_at_entry"], "20");
    }

    #[test]
    fn test_double_check_in_is_an_error() {
        let ledger = ledger();
        let mut buf = Vec::new();
        check_in(&mut buf, &ledger, &ada(), day(), at(8, 0), false).unwrap();
        let err = check_in(&mut buf, &ledger, &ada(), day(), at(8, 5), false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "employee ada is already checked in on 2025-01-29"
        );
    }

    #[test]
    fn test_absent_output() {
        let mut buf = Vec::new();
        absent(
            &mut buf,
            &ledger(),
            &ada(),
            day(),
            Some("sick".to_string()),
            false,
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "ada absent on 2025-01-29: sick\n"
        );
    }

    #[test]
    fn test_amend_requires_admin_for_mark() {
        let ledger = ledger();
        let session = ledger.check_in(&ada(), day(), at(9, 30)).unwrap();
        let mut buf = Vec::new();
        let err = amend(
            &mut buf,
            &ledger,
            &session.id,
            None,
            Some(AttendanceMark::Present),
            false,
            false,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "employee callers cannot change mark");

        amend(
            &mut buf,
            &ledger,
            &session.id,
            Some("bus strike".to_string()),
            Some(AttendanceMark::Present),
            true,
            false,
        )
        .unwrap();
        assert_snapshot!(output(buf, &session.id), @r"
        Amended.
        ada on 2025-01-29: open (present)
          Session: [SESSION]
          In:      2025-01-29 09:30:00
          Out:     -
          Hours:   -
          Rate:    20.00
          Wage:    -
          Notes:   bus strike
        ");
    }
}
