//! Persistence interface for the attendance and leave records.
//!
//! Every `update_*` / `transition_*` method is one atomic read-modify-write:
//! the closure sees the current row under lock and its result is written
//! back in the same transaction. Uniqueness races on write are reported as
//! the matching domain error.

use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::error::AppError;
use crate::model::attendance::{AttendanceDay, AttendanceStatus};
use crate::model::employee::{Employee, EmployeeFilter, NewAccount};
use crate::model::leave::{
    LeaveApplication, LeaveAttachment, LeaveBalance, LeaveComment, LeaveStatus, LeaveType,
    LedgerPosting,
};
use crate::model::schedule::{AttendancePolicy, EmployeeSchedule, Holiday, WorkSchedule};

#[cfg(test)]
pub mod memory;
pub mod mysql;

pub type StoreResult<T> = Result<T, AppError>;

/// 1-based page with a capped page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub per_page: u64,
}

impl PageRequest {
    pub fn new(page: Option<u64>, per_page: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(10).clamp(1, 100),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1) * self.per_page
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct AttendanceFilter {
    /// Filter by employee ID (HR only)
    pub employee_id: Option<u64>,
    /// First date, inclusive
    #[param(value_type = Option<String>, format = "date")]
    #[schema(value_type = Option<String>, format = "date")]
    pub start_date: Option<NaiveDate>,
    /// Last date, inclusive
    #[param(value_type = Option<String>, format = "date")]
    #[schema(value_type = Option<String>, format = "date")]
    pub end_date: Option<NaiveDate>,
    pub status: Option<AttendanceStatus>,
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct LeaveFilter {
    /// Filter by employee ID (HR only)
    pub employee_id: Option<u64>,
    pub status: Option<LeaveStatus>,
    pub leave_type_id: Option<u64>,
    /// Year of the start date
    pub year: Option<i32>,
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

/// A posting against the ledger row of (employee, leave type, year).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerEntry {
    pub employee_id: u64,
    pub leave_type_id: u64,
    pub year: i32,
    pub posting: LedgerPosting,
}

impl LedgerEntry {
    pub fn for_application(application: &LeaveApplication, posting: LedgerPosting) -> Self {
        Self {
            employee_id: application.employee_id,
            leave_type_id: application.leave_type_id,
            year: application.year(),
            posting,
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait AttendanceStore {
    async fn find_day(&self, employee_id: u64, date: NaiveDate) -> StoreResult<Option<AttendanceDay>>;

    async fn get_day(&self, id: u64) -> StoreResult<Option<AttendanceDay>>;

    /// Days without their break intervals, newest first.
    async fn list_days(
        &self,
        filter: &AttendanceFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<AttendanceDay>, i64)>;

    /// Creates or updates the (employee, date) record. `apply` receives the
    /// stored record, if any, and returns the record to persist. It may run
    /// again when a concurrent writer of the same day forces a retry.
    async fn upsert_day<F>(&self, employee_id: u64, date: NaiveDate, apply: F) -> StoreResult<AttendanceDay>
    where
        F: Fn(Option<AttendanceDay>) -> StoreResult<AttendanceDay>;

    async fn update_day<F>(&self, id: u64, apply: F) -> StoreResult<AttendanceDay>
    where
        F: FnOnce(AttendanceDay) -> StoreResult<AttendanceDay>;
}

#[allow(async_fn_in_trait)]
pub trait ScheduleStore {
    async fn create_schedule(&self, schedule: WorkSchedule) -> StoreResult<WorkSchedule>;

    async fn get_schedule(&self, id: u64) -> StoreResult<Option<WorkSchedule>>;

    async fn list_schedules(&self) -> StoreResult<Vec<WorkSchedule>>;

    async fn update_schedule<F>(&self, id: u64, apply: F) -> StoreResult<WorkSchedule>
    where
        F: FnOnce(&mut WorkSchedule) -> StoreResult<()>;

    /// Bindings for one employee, or all when `employee_id` is `None`,
    /// latest start date first.
    async fn list_bindings(&self, employee_id: Option<u64>) -> StoreResult<Vec<EmployeeSchedule>>;

    /// Inserts a binding after `check` has seen the employee's existing
    /// bindings under lock. A deactivated binding with the same start date
    /// is overwritten and keeps its id.
    async fn insert_binding<F>(&self, binding: EmployeeSchedule, check: F) -> StoreResult<EmployeeSchedule>
    where
        F: FnOnce(&[EmployeeSchedule]) -> StoreResult<()>;

    async fn deactivate_binding(&self, id: u64) -> StoreResult<EmployeeSchedule>;

    async fn create_policy(&self, policy: AttendancePolicy) -> StoreResult<AttendancePolicy>;

    async fn list_policies(&self) -> StoreResult<Vec<AttendancePolicy>>;

    async fn active_policy(&self) -> StoreResult<Option<AttendancePolicy>>;

    async fn create_holiday(&self, holiday: Holiday) -> StoreResult<Holiday>;

    async fn list_holidays(&self, year: Option<i32>) -> StoreResult<Vec<Holiday>>;

    async fn delete_holiday(&self, id: u64) -> StoreResult<bool>;

    async fn is_holiday(&self, date: NaiveDate) -> StoreResult<bool>;
}

#[allow(async_fn_in_trait)]
pub trait LeaveStore {
    async fn create_leave_type(&self, leave_type: LeaveType) -> StoreResult<LeaveType>;

    async fn get_leave_type(&self, id: u64) -> StoreResult<Option<LeaveType>>;

    async fn list_leave_types(&self, active_only: bool) -> StoreResult<Vec<LeaveType>>;

    async fn update_leave_type<F>(&self, id: u64, apply: F) -> StoreResult<LeaveType>
    where
        F: FnOnce(&mut LeaveType) -> StoreResult<()>;

    /// Stores a new application and its ledger postings in one transaction.
    async fn insert_application(
        &self,
        application: LeaveApplication,
        ledger: Vec<LedgerEntry>,
    ) -> StoreResult<LeaveApplication>;

    async fn get_application(&self, id: u64) -> StoreResult<Option<LeaveApplication>>;

    async fn list_applications(
        &self,
        filter: &LeaveFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<LeaveApplication>, i64)>;

    /// Mutates one application under lock; the returned postings are
    /// applied to the ledger in the same transaction.
    async fn transition_application<F>(&self, id: u64, apply: F) -> StoreResult<LeaveApplication>
    where
        F: FnOnce(&mut LeaveApplication) -> StoreResult<Vec<LedgerEntry>>;

    async fn list_balances(&self, employee_id: Option<u64>, year: i32) -> StoreResult<Vec<LeaveBalance>>;

    async fn has_approved_leave_on(&self, employee_id: u64, date: NaiveDate) -> StoreResult<bool>;

    async fn add_comment(&self, comment: LeaveComment) -> StoreResult<LeaveComment>;

    async fn list_comments(&self, application_id: u64) -> StoreResult<Vec<LeaveComment>>;

    async fn add_attachment(&self, attachment: LeaveAttachment) -> StoreResult<LeaveAttachment>;

    async fn list_attachments(&self, application_id: u64) -> StoreResult<Vec<LeaveAttachment>>;
}

/// Employee records and their login accounts.
#[allow(async_fn_in_trait)]
pub trait DirectoryStore {
    /// Inserts the employee and its linked account together. A taken
    /// username, email or employee code is a `Validation` error.
    async fn create_employee(&self, employee: Employee, account: NewAccount) -> StoreResult<Employee>;

    async fn get_employee(&self, id: u64) -> StoreResult<Option<Employee>>;

    async fn list_employees(
        &self,
        filter: &EmployeeFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Employee>, i64)>;

    async fn update_employee<F>(&self, id: u64, apply: F) -> StoreResult<Employee>
    where
        F: FnOnce(&mut Employee) -> StoreResult<()>;

    async fn employee_email(&self, employee_id: u64) -> StoreResult<Option<String>> {
        Ok(self.get_employee(employee_id).await?.map(|e| e.email))
    }

    async fn employee_exists(&self, employee_id: u64) -> StoreResult<bool> {
        Ok(self.get_employee(employee_id).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_clamps() {
        let page = PageRequest::new(Some(0), Some(500));
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, 100);
        assert_eq!(PageRequest::new(Some(3), Some(20)).offset(), 40);
        assert_eq!(PageRequest::default().per_page, 10);
    }
}
