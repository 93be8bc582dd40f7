//! Attendance summaries and analytics.
//!
//! Raw sessions and absences are first flattened into one [`DayRecord`] per
//! employee and day; every summary is then a grouping and reduction over
//! those records. These functions take plain slices so they can be tested
//! without a store. [`ReportAggregator`] only loads the records.
//!
//! A day counts as present (or late) when it has at least one session, with
//! the mark of its earliest check-in. A day with only an absence record
//! counts as absent. Open sessions count as presence with zero hours.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ledger::AttendancePolicy;
use crate::session::{Absence, AttendanceSession, SessionQuery};
use crate::store::Store;
use crate::types::{AttendanceMark, DateRange, EmployeeId};
use crate::valuation::{round_half_up, round_hours};

/// Department label for employees without one.
pub const UNASSIGNED_DEPARTMENT: &str = "unassigned";

/// Filter shared by every report operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportFilter {
    pub range: DateRange,
    pub employee_id: Option<EmployeeId>,
    pub department: Option<String>,
    pub status: Option<AttendanceMark>,
}

impl ReportFilter {
    pub const fn new(range: DateRange) -> Self {
        Self {
            range,
            employee_id: None,
            department: None,
            status: None,
        }
    }

    fn matches(&self, record: &DayRecord) -> bool {
        self.department
            .as_deref()
            .is_none_or(|department| record.department.as_deref() == Some(department))
            && self.status.is_none_or(|status| record.mark == status)
    }
}

/// Report bucket size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
}

impl Granularity {
    /// First day of the bucket containing `date`. Weeks start on Monday.
    pub fn bucket_start(self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Daily => date,
            Self::Weekly => {
                date - chrono::Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            Self::Monthly => date.with_day(1).unwrap_or(date),
        }
    }

    /// Human-readable key for the bucket containing `date`.
    pub fn bucket_key(self, date: NaiveDate) -> String {
        match self {
            Self::Daily => date.to_string(),
            Self::Weekly => {
                let week = date.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            Self::Monthly => format!("{}-{:02}", date.year(), date.month()),
        }
    }
}

/// One employee's attendance on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayRecord {
    pub date: NaiveDate,
    pub employee_id: EmployeeId,
    pub department: Option<String>,
    pub mark: AttendanceMark,
    /// Closed session hours for the day.
    pub hours: Decimal,
}

/// Flattens sessions and absences into day records ordered by date, then employee.
pub fn day_records(
    sessions: &[AttendanceSession],
    absences: &[Absence],
    departments: &HashMap<EmployeeId, Option<String>>,
) -> Vec<DayRecord> {
    let mut days: BTreeMap<(NaiveDate, EmployeeId), DayRecord> = BTreeMap::new();
    let mut first_check_in = HashMap::new();

    for session in sessions {
        let key = (session.date, session.employee_id.clone());
        let record = days.entry(key.clone()).or_insert_with(|| DayRecord {
            date: session.date,
            employee_id: session.employee_id.clone(),
            department: departments.get(&session.employee_id).cloned().flatten(),
            mark: session.mark,
            hours: Decimal::ZERO,
        });
        record.hours += session.hours();
        let earliest = first_check_in.entry(key).or_insert(session.check_in_at);
        if session.check_in_at <= *earliest {
            *earliest = session.check_in_at;
            record.mark = session.mark;
        }
    }

    for absence in absences {
        days.entry((absence.date, absence.employee_id.clone()))
            .or_insert_with(|| DayRecord {
                date: absence.date,
                employee_id: absence.employee_id.clone(),
                department: departments.get(&absence.employee_id).cloned().flatten(),
                mark: AttendanceMark::Absent,
                hours: Decimal::ZERO,
            });
    }

    days.into_values().collect()
}

/// `numerator / denominator * 100`, rounded to two places and kept in `[0, 100]`.
///
/// A zero denominator yields zero.
pub fn percentage(numerator: u32, denominator: u32) -> Decimal {
    if denominator == 0 {
        return round_half_up(Decimal::ZERO, 2);
    }
    let rate = Decimal::from(numerator) * Decimal::ONE_HUNDRED / Decimal::from(denominator);
    round_half_up(rate.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED), 2)
}

/// Hours beyond the daily reference.
fn daily_overtime(hours: Decimal, reference: Decimal) -> Decimal {
    (hours - reference).max(Decimal::ZERO)
}

/// Attendance totals for one employee over one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceSummary {
    pub bucket: String,
    pub bucket_start: NaiveDate,
    pub employee_id: EmployeeId,
    pub department: Option<String>,
    pub total_working_units: u32,
    pub units_present: u32,
    pub units_absent: u32,
    pub units_late: u32,
    pub total_hours: Decimal,
    pub overtime_hours: Decimal,
    pub average_hours_per_unit: Decimal,
    pub attendance_rate: Decimal,
}

#[derive(Debug, Default)]
struct Tally {
    units: u32,
    present: u32,
    absent: u32,
    late: u32,
    hours: Decimal,
    overtime: Decimal,
}

impl Tally {
    fn add(&mut self, record: &DayRecord, overtime_reference: Decimal) {
        self.units += 1;
        match record.mark {
            AttendanceMark::Present => self.present += 1,
            AttendanceMark::Late => {
                self.present += 1;
                self.late += 1;
            }
            AttendanceMark::Absent => self.absent += 1,
        }
        self.hours += record.hours;
        self.overtime += daily_overtime(record.hours, overtime_reference);
    }

    fn average_hours(&self) -> Decimal {
        if self.present == 0 {
            return round_hours(Decimal::ZERO);
        }
        round_hours(self.hours / Decimal::from(self.present))
    }
}

/// Groups day records into one summary per bucket and employee.
///
/// Rows are ordered by bucket, then employee. Overtime is the sum of each
/// day's hours beyond `overtime_reference`.
pub fn summarize(
    records: &[DayRecord],
    granularity: Granularity,
    overtime_reference: Decimal,
) -> Vec<AttendanceSummary> {
    let mut buckets: BTreeMap<(NaiveDate, EmployeeId), (Option<String>, Tally)> = BTreeMap::new();
    for record in records {
        let start = granularity.bucket_start(record.date);
        let (_, tally) = buckets
            .entry((start, record.employee_id.clone()))
            .or_insert_with(|| (record.department.clone(), Tally::default()));
        tally.add(record, overtime_reference);
    }

    buckets
        .into_iter()
        .map(|((bucket_start, employee_id), (department, tally))| AttendanceSummary {
            bucket: granularity.bucket_key(bucket_start),
            bucket_start,
            employee_id,
            department,
            total_working_units: tally.units,
            units_present: tally.present,
            units_absent: tally.absent,
            units_late: tally.late,
            total_hours: round_hours(tally.hours),
            overtime_hours: round_hours(tally.overtime),
            average_hours_per_unit: tally.average_hours(),
            attendance_rate: percentage(tally.present, tally.units),
        })
        .collect()
}

/// Attendance for one day across all selected employees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub attendance_rate: Decimal,
    pub present_count: u32,
    pub absent_count: u32,
}

/// Day-ordered, lazily computed sequence of [`TrendPoint`]s.
///
/// Each point is reduced on demand from the records it was built with.
/// Requesting trends again rebuilds them from the store.
#[derive(Debug, Clone)]
pub struct Trends {
    records: Vec<DayRecord>,
    next: usize,
}

impl Trends {
    /// Builds trends from records in any order.
    pub fn new(mut records: Vec<DayRecord>) -> Self {
        records.sort_by(|a, b| (a.date, &a.employee_id).cmp(&(b.date, &b.employee_id)));
        Self { records, next: 0 }
    }
}

impl Iterator for Trends {
    type Item = TrendPoint;

    fn next(&mut self) -> Option<Self::Item> {
        let date = self.records.get(self.next)?.date;
        let mut present_count = 0;
        let mut total = 0;
        while let Some(record) = self.records.get(self.next).filter(|r| r.date == date) {
            total += 1;
            if record.mark.is_present() {
                present_count += 1;
            }
            self.next += 1;
        }
        Some(TrendPoint {
            date,
            attendance_rate: percentage(present_count, total),
            present_count,
            absent_count: total - present_count,
        })
    }
}

/// Attendance totals for one department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepartmentBreakdown {
    pub department: String,
    pub employees: u32,
    pub total_working_units: u32,
    pub units_present: u32,
    pub units_absent: u32,
    pub units_late: u32,
    pub total_hours: Decimal,
    pub attendance_rate: Decimal,
}

/// Cross-cutting attendance analytics for a filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Analytics {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_working_units: u32,
    pub total_hours: Decimal,
    pub overtime_hours: Decimal,
    pub attendance_rate: Decimal,
    /// On-time days as a share of present days.
    pub punctuality_rate: Decimal,
    /// Absent days as a share of all recorded days.
    pub absenteeism_rate: Decimal,
    pub department_breakdown: Vec<DepartmentBreakdown>,
    pub trends: Vec<TrendPoint>,
}

/// Derives analytics from day records.
pub fn analyze(
    records: Vec<DayRecord>,
    range: DateRange,
    overtime_reference: Decimal,
) -> Analytics {
    let mut overall = Tally::default();
    let mut departments: BTreeMap<String, (BTreeSet<EmployeeId>, Tally)> = BTreeMap::new();
    for record in &records {
        overall.add(record, overtime_reference);
        let name = record
            .department
            .clone()
            .unwrap_or_else(|| UNASSIGNED_DEPARTMENT.to_string());
        let (employees, tally) = departments.entry(name).or_default();
        employees.insert(record.employee_id.clone());
        tally.add(record, overtime_reference);
    }

    let department_breakdown = departments
        .into_iter()
        .map(|(department, (employees, tally))| DepartmentBreakdown {
            department,
            employees: u32::try_from(employees.len()).unwrap_or(u32::MAX),
            total_working_units: tally.units,
            units_present: tally.present,
            units_absent: tally.absent,
            units_late: tally.late,
            total_hours: round_hours(tally.hours),
            attendance_rate: percentage(tally.present, tally.units),
        })
        .collect();

    Analytics {
        start_date: range.start(),
        end_date: range.end(),
        total_working_units: overall.units,
        total_hours: round_hours(overall.hours),
        overtime_hours: round_hours(overall.overtime),
        attendance_rate: percentage(overall.present, overall.units),
        punctuality_rate: percentage(overall.present - overall.late, overall.present),
        absenteeism_rate: percentage(overall.absent, overall.units),
        department_breakdown,
        trends: Trends::new(records).collect(),
    }
}

/// Loads attendance records and produces summaries and analytics.
///
/// Read-only; it never mutates sessions.
pub struct ReportAggregator<S> {
    store: S,
    policy: AttendancePolicy,
}

impl<S: Store> ReportAggregator<S> {
    pub const fn new(store: S, policy: AttendancePolicy) -> Self {
        Self { store, policy }
    }

    /// Day records selected by `filter`, ordered by date then employee.
    pub fn records(&self, filter: &ReportFilter) -> Result<Vec<DayRecord>> {
        let query = SessionQuery {
            range: filter.range,
            employee_id: filter.employee_id.clone(),
        };
        let sessions = self.store.list_sessions(&query)?;
        let absences = self.store.list_absences(&query)?;
        let departments: HashMap<_, _> = self
            .store
            .list_employees()?
            .into_iter()
            .map(|employee| (employee.id, employee.department))
            .collect();

        let mut records = day_records(&sessions, &absences, &departments);
        records.retain(|record| filter.matches(record));
        tracing::debug!(range = %filter.range, records = records.len(), "loaded attendance records");
        Ok(records)
    }

    pub fn generate_report(
        &self,
        granularity: Granularity,
        filter: &ReportFilter,
    ) -> Result<Vec<AttendanceSummary>> {
        let records = self.records(filter)?;
        Ok(summarize(
            &records,
            granularity,
            self.policy.daily_overtime_hours,
        ))
    }

    /// One row per employee and day.
    pub fn daily_summary(&self, filter: &ReportFilter) -> Result<Vec<AttendanceSummary>> {
        self.generate_report(Granularity::Daily, filter)
    }

    /// One row per employee and ISO week (Monday to Sunday).
    pub fn weekly_summary(&self, filter: &ReportFilter) -> Result<Vec<AttendanceSummary>> {
        self.generate_report(Granularity::Weekly, filter)
    }

    /// One row per employee and calendar month.
    pub fn monthly_summary(&self, filter: &ReportFilter) -> Result<Vec<AttendanceSummary>> {
        self.generate_report(Granularity::Monthly, filter)
    }

    pub fn analytics(&self, filter: &ReportFilter) -> Result<Analytics> {
        let records = self.records(filter)?;
        Ok(analyze(
            records,
            filter.range,
            self.policy.daily_overtime_hours,
        ))
    }

    /// Day-ordered attendance trend, recomputed from the store on each call.
    pub fn trends(&self, filter: &ReportFilter) -> Result<Trends> {
        Ok(Trends::new(self.records(filter)?))
    }
}
