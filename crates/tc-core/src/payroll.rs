//! Payroll calculation over a pay period.
//!
//! # Algorithm Summary
//!
//! 1. Collect the employee's closed sessions inside the period, in check-in order
//! 2. Split the summed hours at `overtime_threshold` into regular and overtime
//! 3. Price regular hours at each session's rate snapshot (falling back to the
//!    profile rate) and overtime hours at that rate times `overtime_multiplier`,
//!    consuming regular hours chronologically
//! 4. Take percentage deductions from gross pay, then fixed deductions
//! 5. `net_pay = gross_pay - total_deductions`
//!
//! Every currency field is rounded to cents on its own, never only at the end.
//! The threshold applies to the period total, not per calendar week.

use std::panic::{self, AssertUnwindSafe};

use chrono::{DateTime, NaiveDate, Utc};
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::employee::Employee;
use crate::error::{Error, ErrorKind, Result};
use crate::session::{AttendanceSession, SessionQuery};
use crate::store::Store;
use crate::types::{DateRange, EmployeeId, ValidationError};
use crate::valuation::{round_cents, round_hours, split_at_threshold};

/// A caller-supplied pay period. Not necessarily aligned to calendar weeks.
pub type PayPeriod = DateRange;

/// A named fixed amount, used for extra deductions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedAmount {
    pub name: String,
    pub amount: Decimal,
}

/// Configuration for payroll calculation.
///
/// Tax rates are inputs, expressed as fractions of gross pay (`0.062` = 6.2%).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayrollConfig {
    /// Hours in a period paid at the regular rate.
    /// Default: 40.
    pub overtime_threshold: Decimal,

    /// Multiplier applied to the rate for hours beyond the threshold.
    /// Default: 1.5.
    pub overtime_multiplier: Decimal,

    pub federal_tax_rate: Decimal,
    pub state_tax_rate: Decimal,
    pub social_security_rate: Decimal,
    pub medicare_rate: Decimal,

    /// Fixed health insurance deduction per period.
    pub health_insurance: Decimal,

    /// Fixed retirement contribution per period.
    pub retirement: Decimal,

    /// Additional fixed deductions.
    pub other_deductions: Vec<NamedAmount>,

    /// Threads used by bulk payroll.
    /// Default: 4.
    pub workers: usize,
}

impl Default for PayrollConfig {
    fn default() -> Self {
        Self {
            overtime_threshold: Decimal::from(40),
            overtime_multiplier: Decimal::new(15, 1),
            federal_tax_rate: Decimal::new(10, 2),
            state_tax_rate: Decimal::new(5, 2),
            social_security_rate: Decimal::new(62, 3),
            medicare_rate: Decimal::new(145, 4),
            health_insurance: Decimal::ZERO,
            retirement: Decimal::ZERO,
            other_deductions: Vec::new(),
            workers: 4,
        }
    }
}

impl PayrollConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.overtime_threshold < Decimal::ZERO {
            return Err(ValidationError::Negative {
                field: "overtime threshold",
                value: self.overtime_threshold,
            });
        }
        if self.overtime_multiplier < Decimal::ONE {
            return Err(ValidationError::MultiplierTooSmall {
                value: self.overtime_multiplier,
            });
        }
        for (field, rate) in [
            ("federal tax rate", self.federal_tax_rate),
            ("state tax rate", self.state_tax_rate),
            ("social security rate", self.social_security_rate),
            ("medicare rate", self.medicare_rate),
        ] {
            if rate < Decimal::ZERO || rate > Decimal::ONE {
                return Err(ValidationError::RateOutOfRange { field, value: rate });
            }
        }
        let fixed = [
            ("health insurance", self.health_insurance),
            ("retirement", self.retirement),
        ];
        let others = self
            .other_deductions
            .iter()
            .map(|other| ("other deduction", other.amount));
        for (field, amount) in fixed.into_iter().chain(others) {
            if amount < Decimal::ZERO {
                return Err(ValidationError::Negative {
                    field,
                    value: amount,
                });
            }
        }
        if self.workers == 0 {
            return Err(ValidationError::NoWorkers);
        }
        Ok(())
    }
}

/// Itemized deductions, each already rounded to cents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deductions {
    pub federal: Decimal,
    pub state: Decimal,
    pub social_security: Decimal,
    pub medicare: Decimal,
    pub health_insurance: Decimal,
    pub retirement: Decimal,
    pub other: Vec<NamedAmount>,
}

impl Deductions {
    /// Takes percentage deductions from `gross` and adds the fixed ones.
    ///
    /// Fixed amounts apply whatever the gross, so a short period can end with
    /// negative net pay. `None` when an amount does not fit in a [`Decimal`].
    pub fn compute(gross: Decimal, config: &PayrollConfig) -> Option<Self> {
        let share = |rate: Decimal| gross.checked_mul(rate).map(round_cents);
        Some(Self {
            federal: share(config.federal_tax_rate)?,
            state: share(config.state_tax_rate)?,
            social_security: share(config.social_security_rate)?,
            medicare: share(config.medicare_rate)?,
            health_insurance: round_cents(config.health_insurance),
            retirement: round_cents(config.retirement),
            other: config
                .other_deductions
                .iter()
                .map(|other| NamedAmount {
                    name: other.name.clone(),
                    amount: round_cents(other.amount),
                })
                .collect(),
        })
    }

    /// Sum of every component, or `None` on overflow.
    pub fn total(&self) -> Option<Decimal> {
        [
            self.federal,
            self.state,
            self.social_security,
            self.medicare,
            self.health_insurance,
            self.retirement,
        ]
        .into_iter()
        .chain(self.other.iter().map(|other| other.amount))
        .try_fold(Decimal::ZERO, Decimal::checked_add)
        .map(round_cents)
    }
}

/// A full payroll result for one employee and period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollCalculation {
    pub employee_id: EmployeeId,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    /// Profile rate at calculation time, used for sessions without a snapshot.
    pub hourly_rate: Decimal,
    pub total_hours: Decimal,
    pub regular_hours: Decimal,
    pub overtime_hours: Decimal,
    pub regular_pay: Decimal,
    pub overtime_pay: Decimal,
    pub gross_pay: Decimal,
    pub deductions: Deductions,
    pub total_deductions: Decimal,
    pub net_pay: Decimal,
    pub calculated_at: DateTime<Utc>,
}

/// Computes payroll from an employee's sessions without touching any store.
///
/// Open sessions and sessions outside `period` are ignored. Amounts too large
/// for a [`Decimal`] fail with [`Error::Computation`].
pub fn compute_payroll(
    employee: &Employee,
    period: &PayPeriod,
    sessions: &[AttendanceSession],
    config: &PayrollConfig,
    calculated_at: DateTime<Utc>,
) -> Result<PayrollCalculation> {
    let mut worked: Vec<&AttendanceSession> = sessions
        .iter()
        .filter(|s| !s.is_open() && s.employee_id == employee.id && period.contains(s.date))
        .collect();
    worked.sort_by_key(|s| (s.date, s.check_in_at));

    let overflow = || {
        Error::Computation(format!(
            "payroll for {} over {period} is out of range",
            employee.id
        ))
    };

    let total_hours = worked
        .iter()
        .try_fold(Decimal::ZERO, |sum, s| sum.checked_add(s.hours()))
        .ok_or_else(overflow)?;
    let (regular_hours, overtime_hours) =
        split_at_threshold(total_hours, round_hours(config.overtime_threshold));

    let mut regular_left = regular_hours;
    let mut regular_amount = Decimal::ZERO;
    let mut overtime_amount = Decimal::ZERO;
    for session in &worked {
        let rate = session.hourly_rate_at_entry.unwrap_or(employee.hourly_rate);
        let hours = session.hours();
        let regular = hours.min(regular_left);
        regular_left -= regular;
        regular_amount = regular
            .checked_mul(rate)
            .and_then(|pay| regular_amount.checked_add(pay))
            .ok_or_else(overflow)?;
        overtime_amount = (hours - regular)
            .checked_mul(rate)
            .and_then(|pay| pay.checked_mul(config.overtime_multiplier))
            .and_then(|pay| overtime_amount.checked_add(pay))
            .ok_or_else(overflow)?;
    }

    let regular_pay = round_cents(regular_amount);
    let overtime_pay = round_cents(overtime_amount);
    let gross_pay = regular_pay.checked_add(overtime_pay).ok_or_else(overflow)?;
    let deductions = Deductions::compute(gross_pay, config).ok_or_else(overflow)?;
    let total_deductions = deductions.total().ok_or_else(overflow)?;
    let net_pay = gross_pay.checked_sub(total_deductions).ok_or_else(overflow)?;

    Ok(PayrollCalculation {
        employee_id: employee.id.clone(),
        period_start: period.start(),
        period_end: period.end(),
        hourly_rate: employee.hourly_rate,
        total_hours: round_hours(total_hours),
        regular_hours: round_hours(regular_hours),
        overtime_hours: round_hours(overtime_hours),
        regular_pay,
        overtime_pay,
        gross_pay,
        deductions,
        total_deductions,
        net_pay,
        calculated_at,
    })
}

/// One employee excluded from a bulk run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkFailure {
    pub employee_id: EmployeeId,
    pub kind: ErrorKind,
    pub reason: String,
}

/// Outcome of a bulk payroll run: successes and isolated failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkPayroll {
    pub results: Vec<PayrollCalculation>,
    pub failed: Vec<BulkFailure>,
}

/// Calculates payroll for one employee or a batch.
pub struct PayrollCalculator<S> {
    store: S,
    config: PayrollConfig,
}

impl<S: Store> PayrollCalculator<S> {
    pub fn new(store: S, config: PayrollConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn config(&self) -> &PayrollConfig {
        &self.config
    }

    /// Calculates payroll for one employee.
    ///
    /// A period without sessions yields a zero-hours calculation, not an error.
    pub fn calculate_employee_payroll(
        &self,
        employee_id: &EmployeeId,
        period: &PayPeriod,
    ) -> Result<PayrollCalculation> {
        let employee = self
            .store
            .get_employee(employee_id)?
            .ok_or_else(|| Error::employee_not_found(employee_id))?;
        if employee.hourly_rate < Decimal::ZERO {
            return Err(ValidationError::Negative {
                field: "hourly rate",
                value: employee.hourly_rate,
            }
            .into());
        }
        let sessions = self
            .store
            .list_sessions(&SessionQuery::for_employee(*period, employee_id.clone()))?;
        let calculation =
            compute_payroll(&employee, period, &sessions, &self.config, Utc::now())?;
        tracing::debug!(
            employee_id = %employee_id,
            period = %period,
            hours = %calculation.total_hours,
            net = %calculation.net_pay,
            "payroll calculated"
        );
        Ok(calculation)
    }

    /// Calculates payroll for each employee independently on a bounded pool.
    ///
    /// A failure, or a panic, for one employee is logged and reported in
    /// `failed`; it never aborts the others. The call itself fails only when
    /// every employee failed on the store, which indicates the store is down.
    pub fn calculate_bulk_payroll(
        &self,
        employee_ids: &[EmployeeId],
        period: &PayPeriod,
    ) -> Result<BulkPayroll> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|index| format!("payroll-{index}"))
            .build()
            .map_err(|err| Error::Computation(format!("failed to start payroll workers: {err}")))?;

        let outcomes: Vec<(EmployeeId, Result<PayrollCalculation>)> = pool.install(|| {
            employee_ids
                .par_iter()
                .map(|id| (id.clone(), self.calculate_isolated(id, period)))
                .collect()
        });

        let systemic = !outcomes.is_empty()
            && outcomes
                .iter()
                .all(|(_, outcome)| matches!(outcome, Err(Error::Persistence(_))));

        let mut bulk = BulkPayroll::default();
        for (employee_id, outcome) in outcomes {
            match outcome {
                Ok(calculation) => bulk.results.push(calculation),
                Err(err) if systemic => {
                    tracing::error!(error = %err, "bulk payroll aborted, store unavailable");
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(
                        employee_id = %employee_id,
                        kind = %err.kind(),
                        error = %err,
                        "excluding employee from bulk payroll"
                    );
                    bulk.failed.push(BulkFailure {
                        employee_id,
                        kind: err.kind(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            period = %period,
            succeeded = bulk.results.len(),
            failed = bulk.failed.len(),
            "bulk payroll finished"
        );
        Ok(bulk)
    }

    /// Runs bulk payroll and saves every success under `(employee, period.id())`.
    ///
    /// Re-running for the same period overwrites earlier results. A failed
    /// save moves that employee into `failed`.
    pub fn run_payroll(
        &self,
        employee_ids: &[EmployeeId],
        period: &PayPeriod,
    ) -> Result<BulkPayroll> {
        let calculated = self.calculate_bulk_payroll(employee_ids, period)?;
        let period_id = period.id();

        let mut bulk = BulkPayroll {
            results: Vec::with_capacity(calculated.results.len()),
            failed: calculated.failed,
        };
        for calculation in calculated.results {
            match self.store.save_payroll(&period_id, &calculation) {
                Ok(()) => bulk.results.push(calculation),
                Err(err) => {
                    let err = Error::from(err);
                    tracing::warn!(
                        employee_id = %calculation.employee_id,
                        error = %err,
                        "failed to save payroll calculation"
                    );
                    bulk.failed.push(BulkFailure {
                        employee_id: calculation.employee_id,
                        kind: err.kind(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(bulk)
    }

    /// Reads back a saved calculation.
    pub fn saved_payroll(
        &self,
        employee_id: &EmployeeId,
        period: &PayPeriod,
    ) -> Result<Option<PayrollCalculation>> {
        Ok(self.store.get_payroll(employee_id, &period.id())?)
    }

    fn calculate_isolated(
        &self,
        employee_id: &EmployeeId,
        period: &PayPeriod,
    ) -> Result<PayrollCalculation> {
        panic::catch_unwind(AssertUnwindSafe(|| {
            self.calculate_employee_payroll(employee_id, period)
        }))
        .unwrap_or_else(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(Error::Computation(format!("payroll worker panicked: {message}")))
        })
    }
}
