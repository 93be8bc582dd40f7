//! Attendance ledger: the check-in/check-out state machine.
//!
//! Each `(employee, date)` has at most one open session at a time. A session
//! moves `Open -> Closed` exactly once; after that a new check-in on the same
//! day starts a fresh session. Both transitions are delegated to the store's
//! atomic conditional writes, so the ledger never checks and then acts.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, StoreError};
use crate::session::{
    Absence, AttendanceSession, SessionClose, SessionPatch, SessionQuery, SessionState,
};
use crate::store::Store;
use crate::types::{AttendanceMark, DateRange, EmployeeId, Role, SessionId, SessionStatus};
use crate::valuation;

/// Workday rules used to classify check-ins and daily overtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendancePolicy {
    /// Expected start of the working day.
    /// Default: 09:00.
    pub work_start: NaiveTime,

    /// Minutes after `work_start` before a check-in counts as late.
    /// Default: 0.
    pub late_grace_minutes: u32,

    /// Daily reference used by reports to derive overtime hours.
    /// Default: 8.
    pub daily_overtime_hours: Decimal,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self {
            work_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            late_grace_minutes: 0,
            daily_overtime_hours: Decimal::from(8),
        }
    }
}

impl AttendancePolicy {
    /// Classifies a check-in time as present or late.
    pub fn mark_for(&self, check_in: NaiveTime) -> AttendanceMark {
        let cutoff = self.work_start + Duration::minutes(i64::from(self.late_grace_minutes));
        if check_in > cutoff {
            AttendanceMark::Late
        } else {
            AttendanceMark::Present
        }
    }
}

/// Records check-ins, check-outs and absences against a store.
pub struct Ledger<S> {
    store: S,
    policy: AttendancePolicy,
}

impl<S: Store> Ledger<S> {
    pub const fn new(store: S, policy: AttendancePolicy) -> Self {
        Self { store, policy }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Opens a session for the employee on `date`.
    ///
    /// The employee's current hourly rate, if a profile exists, is snapshotted
    /// onto the session and never changes afterwards.
    pub fn check_in(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
        at: NaiveDateTime,
    ) -> Result<AttendanceSession> {
        let hourly_rate_at_entry = self
            .store
            .get_employee(employee_id)?
            .map(|employee| employee.hourly_rate);

        let session = AttendanceSession {
            id: SessionId::generate(),
            employee_id: employee_id.clone(),
            date,
            check_in_at: at,
            check_out_at: None,
            total_hours: None,
            status: SessionStatus::Open,
            mark: self.policy.mark_for(at.time()),
            hourly_rate_at_entry,
            daily_wage: None,
            notes: None,
            created_at: Utc::now(),
        };

        match self.store.insert_open_session(&session) {
            Ok(()) => {}
            Err(StoreError::Conflict) => {
                tracing::debug!(employee_id = %employee_id, %date, "check-in rejected, session already open");
                return Err(Error::AlreadyCheckedIn {
                    employee_id: employee_id.clone(),
                    date,
                });
            }
            Err(err) => return Err(err.into()),
        }

        tracing::info!(
            employee_id = %employee_id,
            %date,
            session_id = %session.id,
            mark = %session.mark,
            "checked in"
        );
        Ok(session)
    }

    /// Closes the open session for the employee on `date`.
    ///
    /// Hours follow the overnight policy in [`valuation`]. A second checkout,
    /// or one that loses a race against another, gets `NoOpenSession`.
    pub fn check_out(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
        at: NaiveDateTime,
    ) -> Result<AttendanceSession> {
        let no_open_session = || Error::NoOpenSession {
            employee_id: employee_id.clone(),
            date,
        };

        let open = self
            .store
            .find_open_session(employee_id, date)?
            .ok_or_else(no_open_session)?;

        let total_hours = valuation::session_hours(open.check_in_at, at);
        let daily_wage = open
            .hourly_rate_at_entry
            .map(|rate| {
                valuation::wage(total_hours, rate).ok_or_else(|| {
                    Error::Computation(format!(
                        "wage for {total_hours}h at {rate}/h is out of range"
                    ))
                })
            })
            .transpose()?;
        let close = SessionClose {
            id: open.id.clone(),
            check_out_at: at,
            total_hours,
            daily_wage,
        };

        let closed = self.store.close_session(&close)?.ok_or_else(|| {
            tracing::debug!(employee_id = %employee_id, %date, "checkout lost race, session already closed");
            no_open_session()
        })?;

        tracing::info!(
            employee_id = %employee_id,
            %date,
            session_id = %closed.id,
            hours = %total_hours,
            "checked out"
        );
        Ok(closed)
    }

    /// Projects the employee's state for `date` without modifying anything.
    ///
    /// An open session takes precedence; otherwise the latest closed one is shown.
    pub fn current_status(&self, employee_id: &EmployeeId, date: NaiveDate) -> Result<SessionState> {
        if let Some(open) = self.store.find_open_session(employee_id, date)? {
            return Ok(SessionState::Open(open));
        }
        let day = DateRange::new(date, date)?;
        let latest = self
            .store
            .list_sessions(&SessionQuery::for_employee(day, employee_id.clone()))?
            .into_iter()
            .max_by_key(|session| session.check_in_at);
        Ok(latest.map_or(SessionState::NotStarted, SessionState::Closed))
    }

    /// Records the employee as absent on `date`.
    ///
    /// Repeating the call is harmless and keeps the first record. Days that
    /// already have a session cannot be marked absent; the store checks this
    /// in the same atomic write that records the absence.
    pub fn mark_absent(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
        reason: Option<String>,
    ) -> Result<Absence> {
        let absence = Absence {
            employee_id: employee_id.clone(),
            date,
            reason: reason.filter(|r| !r.trim().is_empty()),
            recorded_at: Utc::now(),
        };
        match self.store.insert_absence(&absence) {
            Ok(true) => {
                tracing::info!(employee_id = %employee_id, %date, "absence recorded");
                return Ok(absence);
            }
            Ok(false) => {}
            Err(StoreError::Conflict) => {
                tracing::debug!(employee_id = %employee_id, %date, "absence rejected, day has a session");
                return Err(Error::AlreadyCheckedIn {
                    employee_id: employee_id.clone(),
                    date,
                });
            }
            Err(err) => return Err(err.into()),
        }

        let day = DateRange::new(date, date)?;
        self.store
            .list_absences(&SessionQuery::for_employee(day, employee_id.clone()))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Computation(format!("absence for {employee_id} on {date} vanished")))
    }

    /// Applies a typed patch to a session on behalf of `role`.
    pub fn amend_session(
        &self,
        id: &SessionId,
        patch: &SessionPatch,
        role: Role,
    ) -> Result<AttendanceSession> {
        patch.validate_for(role)?;
        let not_found = || Error::NotFound {
            entity: "session",
            id: id.to_string(),
        };
        if patch.is_empty() {
            return self.store.get_session(id)?.ok_or_else(not_found);
        }
        let session = self.store.update_session(id, patch)?.ok_or_else(not_found)?;
        tracing::info!(session_id = %id, %role, "session amended");
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::employee::{Employee, EmployeeDirectory, EmployeePatch};
    use crate::{ErrorKind, MemoryStore};
    use rust_decimal_macros::dec;

    fn id(s: &str) -> EmployeeId {
        EmployeeId::new(s).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 29).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        day().and_hms_opt(h, m, 0).unwrap()
    }

    fn ledger_with_employee(rate: Decimal) -> Ledger<MemoryStore> {
        let store = MemoryStore::new();
        EmployeeDirectory::new(&store)
            .apply_patch(
                &id("ada"),
                &EmployeePatch {
                    hourly_rate: Some(rate),
                    ..EmployeePatch::default()
                },
            )
            .unwrap();
        Ledger::new(store, AttendancePolicy::default())
    }

    #[test]
    fn test_full_day_session_computes_hours_and_wage() {
        let ledger = ledger_with_employee(dec!(20));
        let open = ledger.check_in(&id("ada"), day(), at(8, 0)).unwrap();
        assert_eq!(open.status, SessionStatus::Open);
        assert_eq!(open.check_out_at, None);
        assert_eq!(open.total_hours, None);
        assert_eq!(open.hourly_rate_at_entry, Some(dec!(20)));

        let closed = ledger.check_out(&id("ada"), day(), at(17, 30)).unwrap();
        assert_eq!(closed.status, SessionStatus::Closed);
        assert_eq!(closed.total_hours, Some(dec!(9.5)));
        assert_eq!(closed.daily_wage, Some(dec!(190.00)));
    }

    #[test]
    fn test_overnight_checkout_on_same_date_wraps() {
        let ledger = ledger_with_employee(dec!(20));
        ledger.check_in(&id("ada"), day(), at(22, 0)).unwrap();
        let closed = ledger.check_out(&id("ada"), day(), at(6, 0)).unwrap();
        assert_eq!(closed.total_hours, Some(dec!(8.0)));
    }

    #[test]
    fn test_second_check_in_is_rejected_without_creating_a_session() {
        let ledger = ledger_with_employee(dec!(20));
        ledger.check_in(&id("ada"), day(), at(8, 0)).unwrap();
        let err = ledger.check_in(&id("ada"), day(), at(8, 5)).unwrap_err();
        assert!(matches!(err, Error::AlreadyCheckedIn { .. }));
        assert_eq!(err.kind(), ErrorKind::State);

        let range = DateRange::new(day(), day()).unwrap();
        let sessions = ledger.store().list_sessions(&SessionQuery::all(range)).unwrap();
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn test_checkout_without_check_in_fails() {
        let ledger = ledger_with_employee(dec!(20));
        let err = ledger.check_out(&id("ada"), day(), at(17, 0)).unwrap_err();
        assert!(matches!(err, Error::NoOpenSession { .. }));
    }

    #[test]
    fn test_second_checkout_fails_and_keeps_hours() {
        let ledger = ledger_with_employee(dec!(20));
        ledger.check_in(&id("ada"), day(), at(8, 0)).unwrap();
        ledger.check_out(&id("ada"), day(), at(12, 0)).unwrap();
        let err = ledger.check_out(&id("ada"), day(), at(18, 0)).unwrap_err();
        assert!(matches!(err, Error::NoOpenSession { .. }));

        let SessionState::Closed(session) = ledger.current_status(&id("ada"), day()).unwrap()
        else {
            panic!("expected closed session");
        };
        assert_eq!(session.total_hours, Some(dec!(4)));
    }

    #[test]
    fn test_new_session_may_open_after_close() {
        let ledger = ledger_with_employee(dec!(20));
        ledger.check_in(&id("ada"), day(), at(8, 0)).unwrap();
        ledger.check_out(&id("ada"), day(), at(12, 0)).unwrap();
        let reopened = ledger.check_in(&id("ada"), day(), at(13, 0)).unwrap();
        assert!(matches!(
            ledger.current_status(&id("ada"), day()).unwrap(),
            SessionState::Open(session) if session.id == reopened.id
        ));
    }

    #[test]
    fn test_status_is_not_started_without_sessions() {
        let ledger = ledger_with_employee(dec!(20));
        assert_eq!(
            ledger.current_status(&id("ada"), day()).unwrap(),
            SessionState::NotStarted
        );
    }

    #[test]
    fn test_rate_snapshot_survives_rate_change() {
        let ledger = ledger_with_employee(dec!(20));
        ledger.check_in(&id("ada"), day(), at(8, 0)).unwrap();
        EmployeeDirectory::new(ledger.store())
            .apply_patch(
                &id("ada"),
                &EmployeePatch {
                    hourly_rate: Some(dec!(30)),
                    ..EmployeePatch::default()
                },
            )
            .unwrap();
        let closed = ledger.check_out(&id("ada"), day(), at(10, 0)).unwrap();
        assert_eq!(closed.hourly_rate_at_entry, Some(dec!(20)));
        assert_eq!(closed.daily_wage, Some(dec!(40.00)));
    }

    #[test]
    fn test_unknown_employee_session_has_no_wage() {
        let ledger = Ledger::new(MemoryStore::new(), AttendancePolicy::default());
        ledger.check_in(&id("temp"), day(), at(9, 0)).unwrap();
        let closed = ledger.check_out(&id("temp"), day(), at(10, 0)).unwrap();
        assert_eq!(closed.total_hours, Some(dec!(1)));
        assert_eq!(closed.daily_wage, None);
    }

    #[test]
    fn test_oversized_wage_fails_checkout_and_keeps_session_open() {
        let store = MemoryStore::new();
        store
            .upsert_employee(&Employee {
                id: id("ada"),
                name: "Ada".to_string(),
                department: None,
                hourly_rate: Decimal::MAX / dec!(2),
                updated_at: Utc::now(),
            })
            .unwrap();
        let ledger = Ledger::new(store, AttendancePolicy::default());
        ledger.check_in(&id("ada"), day(), at(8, 0)).unwrap();

        let err = ledger.check_out(&id("ada"), day(), at(12, 0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Computation);
        assert!(matches!(
            ledger.current_status(&id("ada"), day()).unwrap(),
            SessionState::Open(_)
        ));
    }

    #[test]
    fn test_late_check_in_is_marked() {
        let policy = AttendancePolicy {
            late_grace_minutes: 10,
            ..AttendancePolicy::default()
        };
        let on_time = NaiveTime::from_hms_opt(9, 10, 0).unwrap();
        let late = NaiveTime::from_hms_opt(9, 11, 0).unwrap();
        assert_eq!(policy.mark_for(on_time), AttendanceMark::Present);
        assert_eq!(policy.mark_for(late), AttendanceMark::Late);

        let ledger = ledger_with_employee(dec!(20));
        let session = ledger.check_in(&id("ada"), day(), at(9, 30)).unwrap();
        assert_eq!(session.mark, AttendanceMark::Late);
    }

    #[test]
    fn test_absence_is_idempotent_and_blocked_by_sessions() {
        let ledger = ledger_with_employee(dec!(20));
        let first = ledger
            .mark_absent(&id("ada"), day(), Some("sick".to_string()))
            .unwrap();
        let again = ledger.mark_absent(&id("ada"), day(), None).unwrap();
        assert_eq!(first, again);

        let next_day = day().succ_opt().unwrap();
        ledger
            .check_in(&id("ada"), next_day, next_day.and_hms_opt(9, 0, 0).unwrap())
            .unwrap();
        let err = ledger.mark_absent(&id("ada"), next_day, None).unwrap_err();
        assert!(matches!(err, Error::AlreadyCheckedIn { .. }));
    }

    #[test]
    fn test_amend_respects_role() {
        let ledger = ledger_with_employee(dec!(20));
        let session = ledger.check_in(&id("ada"), day(), at(9, 30)).unwrap();

        let forbidden = SessionPatch {
            notes: None,
            mark: Some(AttendanceMark::Present),
        };
        let err = ledger
            .amend_session(&session.id, &forbidden, Role::Employee)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let amended = ledger
            .amend_session(&session.id, &forbidden, Role::Admin)
            .unwrap();
        assert_eq!(amended.mark, AttendanceMark::Present);
        assert_eq!(amended.check_in_at, session.check_in_at);

        let missing = SessionId::new("missing").unwrap();
        let err = ledger
            .amend_session(&missing, &SessionPatch::default(), Role::Admin)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_concurrent_check_ins_open_exactly_one_session() {
        let ledger = ledger_with_employee(dec!(20));
        let outcomes: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| ledger.check_in(&id("ada"), day(), at(8, 0))))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .filter_map(|o| o.as_ref().err())
            .all(|err| matches!(err, Error::AlreadyCheckedIn { .. })));
    }

    #[test]
    fn test_concurrent_check_outs_close_exactly_once() {
        let ledger = ledger_with_employee(dec!(20));
        ledger.check_in(&id("ada"), day(), at(8, 0)).unwrap();
        let outcomes: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| ledger.check_out(&id("ada"), day(), at(16, 0))))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .filter_map(|o| o.as_ref().err())
            .all(|err| matches!(err, Error::NoOpenSession { .. })));
    }
}
