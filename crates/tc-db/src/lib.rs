//! SQLite storage layer for timecard.
//!
//! Implements [`tc_core::Store`] on top of `rusqlite`.
//!
//! # Thread Safety
//!
//! A `rusqlite::Connection` is `Send` but not `Sync`, so [`Database`] keeps it
//! behind a mutex and can be shared as `Arc<Database>` between worker threads.
//! Several processes (or several `Database` values) may also open the same
//! file; writers wait on SQLite's busy handler.
//!
//! # Atomicity
//!
//! The one-open-session rule is a partial unique index on
//! `sessions(employee_id, date_key) WHERE status = 'open'`, so concurrent
//! check-ins race on the index instead of on a read. Checkout is a single
//! `UPDATE ... WHERE status = 'open' RETURNING ...`; only one caller gets a row.
//! Absences are written in an `IMMEDIATE` transaction that first checks the
//! day has no session.
//!
//! # Schema
//!
//! ## Value Formats
//!
//! - Hours, rates and money are TEXT decimals (e.g. `9.50`), never floats.
//! - Calendar days are TEXT `YYYY-MM-DD`.
//! - Check-in and checkout times are local wall-clock TEXT
//!   `YYYY-MM-DDTHH:MM:SS[.fff]`; lexicographic order matches time order.
//! - Audit timestamps are RFC 3339 UTC.
//!
//! ## Payroll Storage
//!
//! `payroll_calculations.data` holds the calculation as JSON. `net_pay` and
//! `calculated_at` are duplicated into columns for ad-hoc queries.

use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::{
    Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior, ffi, params,
};
use rust_decimal::Decimal;
use tc_core::{
    Absence, AttendanceSession, Employee, EmployeeId, PayrollCalculation, SessionClose,
    SessionId, SessionPatch, SessionQuery, Store, StoreError,
};
use thiserror::Error;

/// How long a writer waits for another connection's lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const LOCAL_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

const SESSION_COLUMNS: &str = "id, employee_id, date_key, check_in_at, check_out_at, total_hours, \
     status, mark, hourly_rate_at_entry, daily_wage, notes, created_at";

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A conditional write found the row state it must not overwrite.
    #[error("write conflicts with an existing row")]
    Conflict,
    /// Another thread panicked while holding the connection.
    #[error("database connection lock poisoned")]
    LockPoisoned,
    /// A stored value could not be parsed back into its domain type.
    #[error("invalid {column} value {value:?}: {message}")]
    InvalidValue {
        column: &'static str,
        value: String,
        message: String,
    },
    /// Stored payroll JSON could not be encoded or decoded.
    #[error("invalid payroll data: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Conflict => Self::Conflict,
            DbError::LockPoisoned => {
                Self::Unavailable("database connection lock poisoned".to_string())
            }
            DbError::Sqlite(rusqlite::Error::SqliteFailure(failure, _))
                if matches!(
                    failure.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen
                ) =>
            {
                Self::Unavailable(failure.to_string())
            }
            other => Self::backend(other),
        }
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        tracing::debug!(path = %path.display(), "opened database");
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn()?.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS employees (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                department TEXT,
                hourly_rate TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_employees_department ON employees(department);

            -- Sessions: one row per check-in
            -- date_key: calendar day the session counts towards ('2025-01-29')
            -- status: 'open' until checkout, then 'closed' for good
            -- hourly_rate_at_entry: rate snapshot taken at check-in
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                employee_id TEXT NOT NULL,
                date_key TEXT NOT NULL,
                check_in_at TEXT NOT NULL,
                check_out_at TEXT,
                total_hours TEXT,
                status TEXT NOT NULL CHECK (status IN ('open', 'closed')),
                mark TEXT NOT NULL,
                hourly_rate_at_entry TEXT,
                daily_wage TEXT,
                notes TEXT,
                created_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_one_open
                ON sessions(employee_id, date_key) WHERE status = 'open';
            CREATE INDEX IF NOT EXISTS idx_sessions_date ON sessions(date_key, employee_id);

            CREATE TABLE IF NOT EXISTS absences (
                employee_id TEXT NOT NULL,
                date_key TEXT NOT NULL,
                reason TEXT,
                recorded_at TEXT NOT NULL,
                PRIMARY KEY (employee_id, date_key)
            );

            CREATE TABLE IF NOT EXISTS payroll_calculations (
                employee_id TEXT NOT NULL,
                period_id TEXT NOT NULL,
                net_pay TEXT NOT NULL,
                calculated_at TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (employee_id, period_id)
            );
            ",
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DbError>,
    ) -> Result<T, StoreError> {
        let conn = self.conn()?;
        Ok(f(&conn)?)
    }
}

impl Store for Database {
    fn insert_open_session(&self, session: &AttendanceSession) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                &format!(
                    "INSERT INTO sessions ({SESSION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    session.id.as_str(),
                    session.employee_id.as_str(),
                    session.date.to_string(),
                    format_local(session.check_in_at),
                    session.check_out_at.map(format_local),
                    session.total_hours.map(|h| h.to_string()),
                    session.status.as_str(),
                    session.mark.as_str(),
                    session.hourly_rate_at_entry.map(|r| r.to_string()),
                    session.daily_wage.map(|w| w.to_string()),
                    session.notes,
                    format_utc(session.created_at),
                ],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(failure, _))
                    if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    // The only UNIQUE constraint on sessions is idx_sessions_one_open;
                    // the primary key reports SQLITE_CONSTRAINT_PRIMARYKEY.
                    Err(DbError::Conflict)
                }
                Err(err) => Err(err.into()),
            }
        })
    }

    fn find_open_session(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
    ) -> Result<Option<AttendanceSession>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE employee_id = ?1 AND date_key = ?2 AND status = 'open'"
                ),
                params![employee_id.as_str(), date.to_string()],
                SessionRow::from_row,
            )
            .optional()?
            .map(SessionRow::into_session)
            .transpose()
        })
    }

    fn close_session(&self, close: &SessionClose) -> Result<Option<AttendanceSession>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "UPDATE sessions
                     SET check_out_at = ?2, total_hours = ?3, daily_wage = ?4, status = 'closed'
                     WHERE id = ?1 AND status = 'open'
                     RETURNING {SESSION_COLUMNS}"
                ),
                params![
                    close.id.as_str(),
                    format_local(close.check_out_at),
                    close.total_hours.to_string(),
                    close.daily_wage.map(|w| w.to_string()),
                ],
                SessionRow::from_row,
            )
            .optional()?
            .map(SessionRow::into_session)
            .transpose()
        })
    }

    fn get_session(&self, id: &SessionId) -> Result<Option<AttendanceSession>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                [id.as_str()],
                SessionRow::from_row,
            )
            .optional()?
            .map(SessionRow::into_session)
            .transpose()
        })
    }

    fn update_session(
        &self,
        id: &SessionId,
        patch: &SessionPatch,
    ) -> Result<Option<AttendanceSession>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "UPDATE sessions
                     SET notes = COALESCE(?2, notes), mark = COALESCE(?3, mark)
                     WHERE id = ?1
                     RETURNING {SESSION_COLUMNS}"
                ),
                params![
                    id.as_str(),
                    patch.notes,
                    patch.mark.map(|mark| mark.as_str()),
                ],
                SessionRow::from_row,
            )
            .optional()?
            .map(SessionRow::into_session)
            .transpose()
        })
    }

    fn list_sessions(&self, query: &SessionQuery) -> Result<Vec<AttendanceSession>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE date_key >= ?1 AND date_key <= ?2
                   AND (?3 IS NULL OR employee_id = ?3)
                 ORDER BY date_key ASC, employee_id ASC, check_in_at ASC"
            ))?;
            let rows = stmt.query_map(
                params![
                    query.range.start().to_string(),
                    query.range.end().to_string(),
                    query.employee_id.as_ref().map(EmployeeId::as_str),
                ],
                SessionRow::from_row,
            )?;
            let mut sessions = Vec::new();
            for row in rows {
                sessions.push(row?.into_session()?);
            }
            Ok(sessions)
        })
    }

    fn insert_absence(&self, absence: &Absence) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            // IMMEDIATE takes the write lock up front, so no check-in can land
            // between the session check and the insert.
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
            let has_session: bool = tx.query_row(
                "SELECT EXISTS (SELECT 1 FROM sessions WHERE employee_id = ?1 AND date_key = ?2)",
                params![absence.employee_id.as_str(), absence.date.to_string()],
                |row| row.get(0),
            )?;
            if has_session {
                return Err(DbError::Conflict);
            }
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO absences (employee_id, date_key, reason, recorded_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    absence.employee_id.as_str(),
                    absence.date.to_string(),
                    absence.reason,
                    format_utc(absence.recorded_at),
                ],
            )?;
            tx.commit()?;
            Ok(inserted == 1)
        })
    }

    fn list_absences(&self, query: &SessionQuery) -> Result<Vec<Absence>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT employee_id, date_key, reason, recorded_at FROM absences
                 WHERE date_key >= ?1 AND date_key <= ?2
                   AND (?3 IS NULL OR employee_id = ?3)
                 ORDER BY date_key ASC, employee_id ASC",
            )?;
            let rows = stmt.query_map(
                params![
                    query.range.start().to_string(),
                    query.range.end().to_string(),
                    query.employee_id.as_ref().map(EmployeeId::as_str),
                ],
                |row| {
                    Ok(AbsenceRow {
                        employee_id: row.get(0)?,
                        date_key: row.get(1)?,
                        reason: row.get(2)?,
                        recorded_at: row.get(3)?,
                    })
                },
            )?;
            let mut absences = Vec::new();
            for row in rows {
                let row = row?;
                absences.push(Absence {
                    employee_id: parse_column("employee_id", &row.employee_id)?,
                    date: parse_column("date_key", &row.date_key)?,
                    reason: row.reason,
                    recorded_at: parse_column("recorded_at", &row.recorded_at)?,
                });
            }
            Ok(absences)
        })
    }

    fn get_employee(&self, id: &EmployeeId) -> Result<Option<Employee>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, department, hourly_rate, updated_at FROM employees WHERE id = ?1",
                [id.as_str()],
                EmployeeRow::from_row,
            )
            .optional()?
            .map(EmployeeRow::into_employee)
            .transpose()
        })
    }

    fn list_employees(&self) -> Result<Vec<Employee>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, department, hourly_rate, updated_at FROM employees ORDER BY id ASC",
            )?;
            let rows = stmt.query_map([], EmployeeRow::from_row)?;
            let mut employees = Vec::new();
            for row in rows {
                employees.push(row?.into_employee()?);
            }
            Ok(employees)
        })
    }

    fn upsert_employee(&self, employee: &Employee) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO employees (id, name, department, hourly_rate, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     department = excluded.department,
                     hourly_rate = excluded.hourly_rate,
                     updated_at = excluded.updated_at",
                params![
                    employee.id.as_str(),
                    employee.name,
                    employee.department,
                    employee.hourly_rate.to_string(),
                    format_utc(employee.updated_at),
                ],
            )?;
            Ok(())
        })
    }

    fn save_payroll(
        &self,
        period_id: &str,
        calculation: &PayrollCalculation,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let data = serde_json::to_string(calculation)?;
            conn.execute(
                "INSERT INTO payroll_calculations (employee_id, period_id, net_pay, calculated_at, data)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(employee_id, period_id) DO UPDATE SET
                     net_pay = excluded.net_pay,
                     calculated_at = excluded.calculated_at,
                     data = excluded.data",
                params![
                    calculation.employee_id.as_str(),
                    period_id,
                    calculation.net_pay.to_string(),
                    format_utc(calculation.calculated_at),
                    data,
                ],
            )?;
            Ok(())
        })
    }

    fn get_payroll(
        &self,
        employee_id: &EmployeeId,
        period_id: &str,
    ) -> Result<Option<PayrollCalculation>, StoreError> {
        self.with_conn(|conn| {
            let data: Option<String> = conn
                .query_row(
                    "SELECT data FROM payroll_calculations WHERE employee_id = ?1 AND period_id = ?2",
                    params![employee_id.as_str(), period_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(data
                .map(|data| serde_json::from_str(&data))
                .transpose()?)
        })
    }
}

/// A `sessions` row as stored, before parsing.
struct SessionRow {
    id: String,
    employee_id: String,
    date_key: String,
    check_in_at: String,
    check_out_at: Option<String>,
    total_hours: Option<String>,
    status: String,
    mark: String,
    hourly_rate_at_entry: Option<String>,
    daily_wage: Option<String>,
    notes: Option<String>,
    created_at: String,
}

impl SessionRow {
    /// Reads the columns listed in [`SESSION_COLUMNS`], in order.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            employee_id: row.get(1)?,
            date_key: row.get(2)?,
            check_in_at: row.get(3)?,
            check_out_at: row.get(4)?,
            total_hours: row.get(5)?,
            status: row.get(6)?,
            mark: row.get(7)?,
            hourly_rate_at_entry: row.get(8)?,
            daily_wage: row.get(9)?,
            notes: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    fn into_session(self) -> Result<AttendanceSession, DbError> {
        Ok(AttendanceSession {
            id: parse_column("id", &self.id)?,
            employee_id: parse_column("employee_id", &self.employee_id)?,
            date: parse_column::<NaiveDate>("date_key", &self.date_key)?,
            check_in_at: parse_local("check_in_at", &self.check_in_at)?,
            check_out_at: self
                .check_out_at
                .as_deref()
                .map(|value| parse_local("check_out_at", value))
                .transpose()?,
            total_hours: parse_optional("total_hours", self.total_hours.as_deref())?,
            status: parse_column("status", &self.status)?,
            mark: parse_column("mark", &self.mark)?,
            hourly_rate_at_entry: parse_optional(
                "hourly_rate_at_entry",
                self.hourly_rate_at_entry.as_deref(),
            )?,
            daily_wage: parse_optional("daily_wage", self.daily_wage.as_deref())?,
            notes: self.notes,
            created_at: parse_column::<DateTime<Utc>>("created_at", &self.created_at)?,
        })
    }
}

/// An `absences` row as stored, before parsing.
struct AbsenceRow {
    employee_id: String,
    date_key: String,
    reason: Option<String>,
    recorded_at: String,
}

/// An `employees` row as stored, before parsing.
struct EmployeeRow {
    id: String,
    name: String,
    department: Option<String>,
    hourly_rate: String,
    updated_at: String,
}

impl EmployeeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            department: row.get(2)?,
            hourly_rate: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn into_employee(self) -> Result<Employee, DbError> {
        Ok(Employee {
            id: parse_column("id", &self.id)?,
            name: self.name,
            department: self.department,
            hourly_rate: parse_column::<Decimal>("hourly_rate", &self.hourly_rate)?,
            updated_at: parse_column("updated_at", &self.updated_at)?,
        })
    }
}

fn parse_column<T>(column: &'static str, value: &str) -> Result<T, DbError>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse().map_err(|err: T::Err| DbError::InvalidValue {
        column,
        value: value.to_string(),
        message: err.to_string(),
    })
}

fn parse_optional(column: &'static str, value: Option<&str>) -> Result<Option<Decimal>, DbError> {
    value.map(|value| parse_column(column, value)).transpose()
}

fn parse_local(column: &'static str, value: &str) -> Result<NaiveDateTime, DbError> {
    NaiveDateTime::parse_from_str(value, LOCAL_TIMESTAMP_FORMAT).map_err(|err| {
        DbError::InvalidValue {
            column,
            value: value.to_string(),
            message: err.to_string(),
        }
    })
}

fn format_local(timestamp: NaiveDateTime) -> String {
    timestamp.format(LOCAL_TIMESTAMP_FORMAT).to_string()
}

fn format_utc(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
