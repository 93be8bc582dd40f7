//! Employee pay profiles and the admin patch that maintains them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{EmployeeId, ValidationError};

/// Highest hourly rate a profile may carry.
pub const MAX_HOURLY_RATE: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// An employee's pay profile and directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub name: String,
    pub department: Option<String>,
    /// Current rate. Sessions snapshot it at check-in.
    pub hourly_rate: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Admin-only changes to an employee profile.
///
/// `department: Some(None)` clears the department.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeePatch {
    pub name: Option<String>,
    pub department: Option<Option<String>>,
    pub hourly_rate: Option<Decimal>,
}

impl EmployeePatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.as_ref().is_some_and(|name| name.trim().is_empty()) {
            return Err(ValidationError::Empty { field: "name" });
        }
        if matches!(&self.department, Some(Some(department)) if department.trim().is_empty()) {
            return Err(ValidationError::Empty {
                field: "department",
            });
        }
        match self.hourly_rate {
            Some(rate) if rate < Decimal::ZERO => Err(ValidationError::Negative {
                field: "hourly rate",
                value: rate,
            }),
            Some(rate) if rate > MAX_HOURLY_RATE => Err(ValidationError::TooLarge {
                field: "hourly rate",
                value: rate,
                max: MAX_HOURLY_RATE,
            }),
            _ => Ok(()),
        }
    }

    /// Produces the updated profile, creating one when `existing` is `None`.
    ///
    /// A new profile needs an hourly rate; its name defaults to the ID.
    pub fn apply(
        &self,
        id: &EmployeeId,
        existing: Option<Employee>,
        now: DateTime<Utc>,
    ) -> Result<Employee, ValidationError> {
        self.validate()?;
        let mut employee = match existing {
            Some(employee) => employee,
            None => Employee {
                id: id.clone(),
                name: id.to_string(),
                department: None,
                hourly_rate: self.hourly_rate.ok_or(ValidationError::Missing {
                    field: "hourly rate",
                })?,
                updated_at: now,
            },
        };
        if let Some(name) = &self.name {
            employee.name = name.trim().to_string();
        }
        if let Some(department) = &self.department {
            employee.department = department.as_ref().map(|d| d.trim().to_string());
        }
        if let Some(rate) = self.hourly_rate {
            employee.hourly_rate = rate;
        }
        employee.updated_at = now;
        Ok(employee)
    }
}

/// Maintains employee profiles in the store.
pub struct EmployeeDirectory<S> {
    store: S,
}

impl<S: Store> EmployeeDirectory<S> {
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Applies an admin patch, creating the employee if needed.
    ///
    /// A rate change only affects sessions checked in afterwards.
    pub fn apply_patch(&self, id: &EmployeeId, patch: &EmployeePatch) -> Result<Employee> {
        let existing = self.store.get_employee(id)?;
        let employee = patch.apply(id, existing, Utc::now())?;
        self.store.upsert_employee(&employee)?;
        tracing::info!(employee_id = %id, rate = %employee.hourly_rate, "employee profile saved");
        Ok(employee)
    }

    pub fn get(&self, id: &EmployeeId) -> Result<Employee> {
        self.store
            .get_employee(id)?
            .ok_or_else(|| Error::employee_not_found(id))
    }

    pub fn list(&self) -> Result<Vec<Employee>> {
        Ok(self.store.list_employees()?)
    }
}
