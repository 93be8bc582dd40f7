//! Attendance session records and the typed patches that may touch them.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{
    AttendanceMark, DateRange, EmployeeId, Role, SessionId, SessionStatus, ValidationError,
};

/// One check-in/check-out record for one employee on one calendar day.
///
/// Sessions created through the ledger also snapshot the employee's hourly
/// rate at check-in; `daily_wage` is derived from that snapshot at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceSession {
    pub id: SessionId,
    pub employee_id: EmployeeId,
    /// Calendar day the session is keyed on.
    pub date: NaiveDate,
    pub check_in_at: NaiveDateTime,
    pub check_out_at: Option<NaiveDateTime>,
    /// Set exactly once, at checkout.
    pub total_hours: Option<Decimal>,
    pub status: SessionStatus,
    pub mark: AttendanceMark,
    /// Rate in force at check-in. Never updated afterwards.
    pub hourly_rate_at_entry: Option<Decimal>,
    pub daily_wage: Option<Decimal>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AttendanceSession {
    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }

    /// Recorded hours, zero while the session is still open.
    pub fn hours(&self) -> Decimal {
        self.total_hours.unwrap_or(Decimal::ZERO)
    }
}

/// The single transition applied to an open session at checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClose {
    pub id: SessionId,
    pub check_out_at: NaiveDateTime,
    pub total_hours: Decimal,
    pub daily_wage: Option<Decimal>,
}

/// Selection of sessions or absences by date range and optional employee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionQuery {
    pub range: DateRange,
    pub employee_id: Option<EmployeeId>,
}

impl SessionQuery {
    pub const fn all(range: DateRange) -> Self {
        Self {
            range,
            employee_id: None,
        }
    }

    pub const fn for_employee(range: DateRange, employee_id: EmployeeId) -> Self {
        Self {
            range,
            employee_id: Some(employee_id),
        }
    }

    /// Whether a record for `employee_id` on `date` is selected.
    pub fn matches(&self, employee_id: &EmployeeId, date: NaiveDate) -> bool {
        self.range.contains(date) && self.employee_id.as_ref().is_none_or(|id| id == employee_id)
    }
}

/// An explicitly recorded absence for a day with no session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Absence {
    pub employee_id: EmployeeId,
    pub date: NaiveDate,
    pub reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Read-only projection of an employee's session state for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "session", rename_all = "snake_case")]
pub enum SessionState {
    /// No session has been opened on this day.
    NotStarted,
    /// Checked in, awaiting checkout.
    Open(AttendanceSession),
    /// The most recent session of the day has been closed.
    Closed(AttendanceSession),
}

impl SessionState {
    pub const fn session(&self) -> Option<&AttendanceSession> {
        match self {
            Self::NotStarted => None,
            Self::Open(session) | Self::Closed(session) => Some(session),
        }
    }
}

/// Fields a caller may change on an existing session.
///
/// Times, hours, the rate snapshot and the wage are deliberately absent:
/// they are written by the ledger only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPatch {
    pub notes: Option<String>,
    pub mark: Option<AttendanceMark>,
}

impl SessionPatch {
    /// Checks the patch against what `role` is allowed to modify.
    pub fn validate_for(&self, role: Role) -> Result<(), ValidationError> {
        if let Some(mark) = self.mark {
            if role != Role::Admin {
                return Err(ValidationError::Forbidden {
                    role,
                    field: "mark",
                });
            }
            if !mark.is_present() {
                return Err(ValidationError::MarkNotAllowed { mark });
            }
        }
        Ok(())
    }

    pub const fn is_empty(&self) -> bool {
        self.notes.is_none() && self.mark.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_employees_may_only_edit_notes() {
        let notes = SessionPatch {
            notes: Some("left early for dentist".to_string()),
            mark: None,
        };
        assert!(notes.validate_for(Role::Employee).is_ok());

        let mark = SessionPatch {
            notes: None,
            mark: Some(AttendanceMark::Present),
        };
        assert_eq!(
            mark.validate_for(Role::Employee),
            Err(ValidationError::Forbidden {
                role: Role::Employee,
                field: "mark",
            })
        );
        assert!(mark.validate_for(Role::Admin).is_ok());
    }

    #[test]
    fn test_sessions_cannot_be_marked_absent() {
        let patch = SessionPatch {
            notes: None,
            mark: Some(AttendanceMark::Absent),
        };
        assert_eq!(
            patch.validate_for(Role::Admin),
            Err(ValidationError::MarkNotAllowed {
                mark: AttendanceMark::Absent
            })
        );
    }

    #[test]
    fn test_query_matches_range_and_employee() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 7).unwrap(),
        )
        .unwrap();
        let alice = EmployeeId::new("alice").unwrap();
        let bob = EmployeeId::new("bob").unwrap();
        let inside = NaiveDate::from_ymd_opt(2025, 1, 3).unwrap();
        let outside = NaiveDate::from_ymd_opt(2025, 1, 8).unwrap();

        assert!(SessionQuery::all(range).matches(&bob, inside));
        assert!(!SessionQuery::all(range).matches(&bob, outside));
        let query = SessionQuery::for_employee(range, alice.clone());
        assert!(query.matches(&alice, inside));
        assert!(!query.matches(&bob, inside));
    }
}
