//! The durable record store the services are built on.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::employee::Employee;
use crate::error::StoreError;
use crate::payroll::PayrollCalculation;
use crate::session::{Absence, AttendanceSession, SessionClose, SessionPatch, SessionQuery};
use crate::types::{EmployeeId, SessionId};

/// Storage operations consumed by the ledger, payroll and report services.
///
/// Implementations must make [`insert_open_session`](Store::insert_open_session),
/// [`close_session`](Store::close_session) and
/// [`insert_absence`](Store::insert_absence) single atomic conditional writes.
/// The at-most-one-open-session invariant holds across concurrent callers only
/// if they are; a check followed by a separate write does not qualify.
pub trait Store: Send + Sync {
    /// Inserts an open session, failing with [`StoreError::Conflict`] when the
    /// employee already has an open session on that date.
    fn insert_open_session(&self, session: &AttendanceSession) -> Result<(), StoreError>;

    /// Returns the open session for an employee and date, if any.
    fn find_open_session(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
    ) -> Result<Option<AttendanceSession>, StoreError>;

    /// Closes the session only if it is still open.
    ///
    /// Returns the closed session, or `None` when it was no longer open
    /// (another checkout won the race).
    fn close_session(&self, close: &SessionClose) -> Result<Option<AttendanceSession>, StoreError>;

    fn get_session(&self, id: &SessionId) -> Result<Option<AttendanceSession>, StoreError>;

    /// Applies a validated patch. Returns `None` when the session does not exist.
    fn update_session(
        &self,
        id: &SessionId,
        patch: &SessionPatch,
    ) -> Result<Option<AttendanceSession>, StoreError>;

    /// Lists sessions ordered by date, employee, then check-in time.
    fn list_sessions(&self, query: &SessionQuery) -> Result<Vec<AttendanceSession>, StoreError>;

    /// Records an absence unless the employee has any session that day.
    ///
    /// The session check and the insert are one atomic write. Fails with
    /// [`StoreError::Conflict`] when a session exists, and returns `false`
    /// when an absence was already recorded for that day.
    fn insert_absence(&self, absence: &Absence) -> Result<bool, StoreError>;

    /// Lists absences ordered by date then employee.
    fn list_absences(&self, query: &SessionQuery) -> Result<Vec<Absence>, StoreError>;

    fn get_employee(&self, id: &EmployeeId) -> Result<Option<Employee>, StoreError>;

    /// Lists employees ordered by ID.
    fn list_employees(&self) -> Result<Vec<Employee>, StoreError>;

    fn upsert_employee(&self, employee: &Employee) -> Result<(), StoreError>;

    /// Saves a calculation under `(employee_id, period_id)`, replacing any previous one.
    fn save_payroll(
        &self,
        period_id: &str,
        calculation: &PayrollCalculation,
    ) -> Result<(), StoreError>;

    fn get_payroll(
        &self,
        employee_id: &EmployeeId,
        period_id: &str,
    ) -> Result<Option<PayrollCalculation>, StoreError>;
}

macro_rules! forward_store {
    ($($ty:ty),*) => {$(
        impl<T: Store + ?Sized> Store for $ty {
            fn insert_open_session(&self, session: &AttendanceSession) -> Result<(), StoreError> {
                (**self).insert_open_session(session)
            }

            fn find_open_session(
                &self,
                employee_id: &EmployeeId,
                date: NaiveDate,
            ) -> Result<Option<AttendanceSession>, StoreError> {
                (**self).find_open_session(employee_id, date)
            }

            fn close_session(
                &self,
                close: &SessionClose,
            ) -> Result<Option<AttendanceSession>, StoreError> {
                (**self).close_session(close)
            }

            fn get_session(&self, id: &SessionId) -> Result<Option<AttendanceSession>, StoreError> {
                (**self).get_session(id)
            }

            fn update_session(
                &self,
                id: &SessionId,
                patch: &SessionPatch,
            ) -> Result<Option<AttendanceSession>, StoreError> {
                (**self).update_session(id, patch)
            }

            fn list_sessions(
                &self,
                query: &SessionQuery,
            ) -> Result<Vec<AttendanceSession>, StoreError> {
                (**self).list_sessions(query)
            }

            fn insert_absence(&self, absence: &Absence) -> Result<bool, StoreError> {
                (**self).insert_absence(absence)
            }

            fn list_absences(&self, query: &SessionQuery) -> Result<Vec<Absence>, StoreError> {
                (**self).list_absences(query)
            }

            fn get_employee(&self, id: &EmployeeId) -> Result<Option<Employee>, StoreError> {
                (**self).get_employee(id)
            }

            fn list_employees(&self) -> Result<Vec<Employee>, StoreError> {
                (**self).list_employees()
            }

            fn upsert_employee(&self, employee: &Employee) -> Result<(), StoreError> {
                (**self).upsert_employee(employee)
            }

            fn save_payroll(
                &self,
                period_id: &str,
                calculation: &PayrollCalculation,
            ) -> Result<(), StoreError> {
                (**self).save_payroll(period_id, calculation)
            }

            fn get_payroll(
                &self,
                employee_id: &EmployeeId,
                period_id: &str,
            ) -> Result<Option<PayrollCalculation>, StoreError> {
                (**self).get_payroll(employee_id, period_id)
            }
        }
    )*};
}

forward_store!(&T, Arc<T>);
