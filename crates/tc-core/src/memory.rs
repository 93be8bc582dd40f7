//! In-process [`Store`] implementation.
//!
//! All tables live behind a single mutex, so every trait method, including
//! the conditional session writes, runs as one critical section.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use thiserror::Error;

use crate::employee::Employee;
use crate::error::StoreError;
use crate::payroll::PayrollCalculation;
use crate::session::{Absence, AttendanceSession, SessionClose, SessionPatch, SessionQuery};
use crate::store::Store;
use crate::types::{EmployeeId, SessionId, SessionStatus};

/// A session insert reused an existing session ID.
#[derive(Debug, Error)]
#[error("session {0} already exists")]
struct DuplicateSessionId(SessionId);

#[derive(Debug, Default)]
struct Tables {
    sessions: Vec<AttendanceSession>,
    absences: BTreeMap<(NaiveDate, EmployeeId), Absence>,
    employees: BTreeMap<EmployeeId, Employee>,
    payroll: BTreeMap<(EmployeeId, String), PayrollCalculation>,
}

/// A [`Store`] held entirely in memory. Useful for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl Store for MemoryStore {
    fn insert_open_session(&self, session: &AttendanceSession) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let conflict = tables.sessions.iter().any(|existing| {
            existing.is_open()
                && existing.employee_id == session.employee_id
                && existing.date == session.date
        });
        if conflict {
            return Err(StoreError::Conflict);
        }
        if tables.sessions.iter().any(|existing| existing.id == session.id) {
            return Err(StoreError::backend(DuplicateSessionId(session.id.clone())));
        }
        tables.sessions.push(session.clone());
        Ok(())
    }

    fn find_open_session(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
    ) -> Result<Option<AttendanceSession>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .sessions
            .iter()
            .find(|s| s.is_open() && &s.employee_id == employee_id && s.date == date)
            .cloned())
    }

    fn close_session(&self, close: &SessionClose) -> Result<Option<AttendanceSession>, StoreError> {
        let mut tables = self.lock()?;
        let Some(session) = tables
            .sessions
            .iter_mut()
            .find(|s| s.id == close.id && s.is_open())
        else {
            return Ok(None);
        };
        session.check_out_at = Some(close.check_out_at);
        session.total_hours = Some(close.total_hours);
        session.daily_wage = close.daily_wage;
        session.status = SessionStatus::Closed;
        Ok(Some(session.clone()))
    }

    fn get_session(&self, id: &SessionId) -> Result<Option<AttendanceSession>, StoreError> {
        let tables = self.lock()?;
        Ok(tables.sessions.iter().find(|s| &s.id == id).cloned())
    }

    fn update_session(
        &self,
        id: &SessionId,
        patch: &SessionPatch,
    ) -> Result<Option<AttendanceSession>, StoreError> {
        let mut tables = self.lock()?;
        let Some(session) = tables.sessions.iter_mut().find(|s| &s.id == id) else {
            return Ok(None);
        };
        if let Some(notes) = &patch.notes {
            session.notes = Some(notes.clone());
        }
        if let Some(mark) = patch.mark {
            session.mark = mark;
        }
        Ok(Some(session.clone()))
    }

    fn list_sessions(&self, query: &SessionQuery) -> Result<Vec<AttendanceSession>, StoreError> {
        let tables = self.lock()?;
        let mut sessions: Vec<_> = tables
            .sessions
            .iter()
            .filter(|s| query.matches(&s.employee_id, s.date))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| {
            (a.date, &a.employee_id, a.check_in_at).cmp(&(b.date, &b.employee_id, b.check_in_at))
        });
        Ok(sessions)
    }

    fn insert_absence(&self, absence: &Absence) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        let has_session = tables.sessions.iter().any(|session| {
            session.employee_id == absence.employee_id && session.date == absence.date
        });
        if has_session {
            return Err(StoreError::Conflict);
        }
        let key = (absence.date, absence.employee_id.clone());
        if tables.absences.contains_key(&key) {
            return Ok(false);
        }
        tables.absences.insert(key, absence.clone());
        Ok(true)
    }

    fn list_absences(&self, query: &SessionQuery) -> Result<Vec<Absence>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .absences
            .values()
            .filter(|a| query.matches(&a.employee_id, a.date))
            .cloned()
            .collect())
    }

    fn get_employee(&self, id: &EmployeeId) -> Result<Option<Employee>, StoreError> {
        Ok(self.lock()?.employees.get(id).cloned())
    }

    fn list_employees(&self) -> Result<Vec<Employee>, StoreError> {
        Ok(self.lock()?.employees.values().cloned().collect())
    }

    fn upsert_employee(&self, employee: &Employee) -> Result<(), StoreError> {
        self.lock()?
            .employees
            .insert(employee.id.clone(), employee.clone());
        Ok(())
    }

    fn save_payroll(
        &self,
        period_id: &str,
        calculation: &PayrollCalculation,
    ) -> Result<(), StoreError> {
        self.lock()?.payroll.insert(
            (calculation.employee_id.clone(), period_id.to_string()),
            calculation.clone(),
        );
        Ok(())
    }

    fn get_payroll(
        &self,
        employee_id: &EmployeeId,
        period_id: &str,
    ) -> Result<Option<PayrollCalculation>, StoreError> {
        Ok(self
            .lock()?
            .payroll
            .get(&(employee_id.clone(), period_id.to_string()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttendanceMark;
    use chrono::Utc;

    fn id(s: &str) -> EmployeeId {
        EmployeeId::new(s).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn open_session(d: u32) -> AttendanceSession {
        AttendanceSession {
            id: SessionId::generate(),
            employee_id: id("ada"),
            date: day(d),
            check_in_at: day(d).and_hms_opt(8, 0, 0).unwrap(),
            check_out_at: None,
            total_hours: None,
            status: SessionStatus::Open,
            mark: AttendanceMark::Present,
            hourly_rate_at_entry: None,
            daily_wage: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_second_open_session_conflicts() {
        let store = MemoryStore::new();
        store.insert_open_session(&open_session(6)).unwrap();
        assert!(matches!(
            store.insert_open_session(&open_session(6)),
            Err(StoreError::Conflict)
        ));
    }

    #[test]
    fn test_reused_session_id_is_a_backend_error() {
        let store = MemoryStore::new();
        let first = open_session(6);
        store.insert_open_session(&first).unwrap();
        let reused = AttendanceSession {
            date: day(7),
            ..first
        };
        assert!(matches!(
            store.insert_open_session(&reused),
            Err(StoreError::Backend(_))
        ));
    }

    #[test]
    fn test_absence_conflicts_with_session_on_same_day() {
        let store = MemoryStore::new();
        store.insert_open_session(&open_session(6)).unwrap();
        let absence = |d| Absence {
            employee_id: id("ada"),
            date: day(d),
            reason: None,
            recorded_at: Utc::now(),
        };
        assert!(matches!(
            store.insert_absence(&absence(6)),
            Err(StoreError::Conflict)
        ));
        assert!(store.insert_absence(&absence(7)).unwrap());
        assert!(!store.insert_absence(&absence(7)).unwrap());
    }
}
