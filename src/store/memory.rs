//! In-process store used by the service tests. A single mutex stands in for
//! the database transaction; every mutation works on copies and only
//! commits them when the whole operation succeeds.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{Datelike, NaiveDate};

use crate::error::AppError;
use crate::model::attendance::AttendanceDay;
use crate::model::employee::{Employee, EmployeeFilter, NewAccount};
use crate::model::leave::{
    LeaveApplication, LeaveAttachment, LeaveBalance, LeaveComment, LeaveStatus, LeaveType,
};
use crate::model::schedule::{AttendancePolicy, EmployeeSchedule, Holiday, WorkSchedule};
use crate::store::{
    AttendanceFilter, AttendanceStore, DirectoryStore, LeaveFilter, LeaveStore, LedgerEntry,
    PageRequest, ScheduleStore, StoreResult,
};

#[derive(Default)]
struct State {
    next_id: u64,
    days: BTreeMap<u64, AttendanceDay>,
    schedules: BTreeMap<u64, WorkSchedule>,
    bindings: BTreeMap<u64, EmployeeSchedule>,
    policies: BTreeMap<u64, AttendancePolicy>,
    holidays: BTreeMap<u64, Holiday>,
    leave_types: BTreeMap<u64, LeaveType>,
    applications: BTreeMap<u64, LeaveApplication>,
    balances: HashMap<(u64, u64, i32), LeaveBalance>,
    comments: Vec<LeaveComment>,
    attachments: Vec<LeaveAttachment>,
    employees: BTreeMap<u64, Employee>,
    usernames: Vec<String>,
}

impl State {
    fn id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Applies postings to copies of the touched ledger rows.
    fn post_all(&mut self, ledger: Vec<LedgerEntry>) -> StoreResult<Vec<LeaveBalance>> {
        let mut touched: Vec<LeaveBalance> = Vec::new();
        for entry in ledger {
            let key = (entry.employee_id, entry.leave_type_id, entry.year);
            let position = touched
                .iter()
                .position(|b| (b.employee_id, b.leave_type_id, b.year) == key);
            let mut balance = match position {
                Some(i) => touched.remove(i),
                None => match self.balances.get(&key) {
                    Some(existing) => existing.clone(),
                    None => {
                        let leave_type = self
                            .leave_types
                            .get(&entry.leave_type_id)
                            .ok_or(AppError::NotFound("Leave type"))?;
                        let mut opened = LeaveBalance::open(entry.employee_id, leave_type, entry.year);
                        opened.id = self.id();
                        opened
                    }
                },
            };
            balance.post(entry.posting)?;
            touched.push(balance);
        }
        Ok(touched)
    }

    fn commit_balances(&mut self, balances: Vec<LeaveBalance>) {
        for balance in balances {
            self.balances
                .insert((balance.employee_id, balance.leave_type_id, balance.year), balance);
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seeds a directory entry with a fixed id.
    pub fn add_employee(&self, employee_id: u64, email: &str) {
        let mut state = self.state();
        state.next_id = state.next_id.max(employee_id);
        state.employees.insert(
            employee_id,
            Employee {
                id: employee_id,
                employee_code: format!("EMP-{employee_id:03}"),
                first_name: format!("Employee{employee_id}"),
                last_name: String::new(),
                email: email.to_string(),
                phone: None,
                department_id: 1,
                position_id: 1,
                hire_date: NaiveDate::default(),
                status: "active".to_string(),
            },
        );
    }

    pub fn balances(&self) -> Vec<LeaveBalance> {
        self.state().balances.values().cloned().collect()
    }
}

fn page_of<T: Clone>(items: Vec<T>, page: PageRequest) -> (Vec<T>, i64) {
    let total = items.len() as i64;
    let slice = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.per_page as usize)
        .collect();
    (slice, total)
}

impl AttendanceStore for MemoryStore {
    async fn find_day(&self, employee_id: u64, date: NaiveDate) -> StoreResult<Option<AttendanceDay>> {
        Ok(self
            .state()
            .days
            .values()
            .find(|d| d.employee_id == employee_id && d.date == date)
            .cloned())
    }

    async fn get_day(&self, id: u64) -> StoreResult<Option<AttendanceDay>> {
        Ok(self.state().days.get(&id).cloned())
    }

    async fn list_days(
        &self,
        filter: &AttendanceFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<AttendanceDay>, i64)> {
        let mut days: Vec<AttendanceDay> = self
            .state()
            .days
            .values()
            .filter(|d| filter.employee_id.is_none_or(|e| d.employee_id == e))
            .filter(|d| filter.start_date.is_none_or(|s| d.date >= s))
            .filter(|d| filter.end_date.is_none_or(|e| d.date <= e))
            .filter(|d| filter.status.is_none_or(|s| d.status == s))
            .cloned()
            .map(|mut d| {
                d.breaks.clear();
                d
            })
            .collect();
        days.sort_by(|a, b| b.date.cmp(&a.date).then(b.check_in.cmp(&a.check_in)));
        Ok(page_of(days, page))
    }

    async fn upsert_day<F>(&self, employee_id: u64, date: NaiveDate, apply: F) -> StoreResult<AttendanceDay>
    where
        F: Fn(Option<AttendanceDay>) -> StoreResult<AttendanceDay>,
    {
        let mut state = self.state();
        let current = state
            .days
            .values()
            .find(|d| d.employee_id == employee_id && d.date == date)
            .cloned();

        let mut day = apply(current)?;
        if day.id == 0 {
            day.id = state.id();
        }
        for interval in day.breaks.iter_mut().filter(|b| b.id == 0) {
            interval.id = state.id();
        }
        state.days.insert(day.id, day.clone());
        Ok(day)
    }

    async fn update_day<F>(&self, id: u64, apply: F) -> StoreResult<AttendanceDay>
    where
        F: FnOnce(AttendanceDay) -> StoreResult<AttendanceDay>,
    {
        let mut state = self.state();
        let current = state
            .days
            .get(&id)
            .cloned()
            .ok_or(AppError::NotFound("Attendance record"))?;
        let day = apply(current)?;
        state.days.insert(id, day.clone());
        Ok(day)
    }
}

impl ScheduleStore for MemoryStore {
    async fn create_schedule(&self, mut schedule: WorkSchedule) -> StoreResult<WorkSchedule> {
        let mut state = self.state();
        if state.schedules.values().any(|s| s.name == schedule.name) {
            return Err(AppError::validation("Schedule with this name already exists"));
        }
        schedule.id = state.id();
        state.schedules.insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    async fn get_schedule(&self, id: u64) -> StoreResult<Option<WorkSchedule>> {
        Ok(self.state().schedules.get(&id).cloned())
    }

    async fn list_schedules(&self) -> StoreResult<Vec<WorkSchedule>> {
        let mut schedules: Vec<_> = self.state().schedules.values().cloned().collect();
        schedules.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(schedules)
    }

    async fn update_schedule<F>(&self, id: u64, apply: F) -> StoreResult<WorkSchedule>
    where
        F: FnOnce(&mut WorkSchedule) -> StoreResult<()>,
    {
        let mut state = self.state();
        let mut schedule = state
            .schedules
            .get(&id)
            .cloned()
            .ok_or(AppError::NotFound("Work schedule"))?;
        apply(&mut schedule)?;
        if state
            .schedules
            .values()
            .any(|s| s.id != id && s.name == schedule.name)
        {
            return Err(AppError::validation("Schedule with this name already exists"));
        }
        state.schedules.insert(id, schedule.clone());
        Ok(schedule)
    }

    async fn list_bindings(&self, employee_id: Option<u64>) -> StoreResult<Vec<EmployeeSchedule>> {
        let mut bindings: Vec<_> = self
            .state()
            .bindings
            .values()
            .filter(|b| employee_id.is_none_or(|e| b.employee_id == e))
            .cloned()
            .collect();
        bindings.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(bindings)
    }

    async fn insert_binding<F>(&self, mut binding: EmployeeSchedule, check: F) -> StoreResult<EmployeeSchedule>
    where
        F: FnOnce(&[EmployeeSchedule]) -> StoreResult<()>,
    {
        let mut state = self.state();
        let existing: Vec<_> = state
            .bindings
            .values()
            .filter(|b| b.employee_id == binding.employee_id)
            .cloned()
            .collect();
        check(&existing)?;
        binding.id = match existing.iter().find(|b| b.start_date == binding.start_date) {
            Some(previous) if previous.is_active => {
                return Err(AppError::ScheduleOverlap(binding.start_date));
            }
            Some(previous) => previous.id,
            None => state.id(),
        };
        state.bindings.insert(binding.id, binding.clone());
        Ok(binding)
    }

    async fn deactivate_binding(&self, id: u64) -> StoreResult<EmployeeSchedule> {
        let mut state = self.state();
        let binding = state
            .bindings
            .get_mut(&id)
            .ok_or(AppError::NotFound("Schedule binding"))?;
        binding.is_active = false;
        Ok(binding.clone())
    }

    async fn create_policy(&self, mut policy: AttendancePolicy) -> StoreResult<AttendancePolicy> {
        let mut state = self.state();
        if state.policies.values().any(|p| p.name == policy.name) {
            return Err(AppError::validation("Policy with this name already exists"));
        }
        policy.id = state.id();
        state.policies.insert(policy.id, policy.clone());
        Ok(policy)
    }

    async fn list_policies(&self) -> StoreResult<Vec<AttendancePolicy>> {
        let mut policies: Vec<_> = self.state().policies.values().cloned().collect();
        policies.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(policies)
    }

    async fn active_policy(&self) -> StoreResult<Option<AttendancePolicy>> {
        Ok(self
            .state()
            .policies
            .values()
            .rev()
            .find(|p| p.is_active)
            .cloned())
    }

    async fn create_holiday(&self, mut holiday: Holiday) -> StoreResult<Holiday> {
        let mut state = self.state();
        if state
            .holidays
            .values()
            .any(|h| h.date == holiday.date && h.name == holiday.name)
        {
            return Err(AppError::validation("Holiday already exists on this date"));
        }
        holiday.id = state.id();
        state.holidays.insert(holiday.id, holiday.clone());
        Ok(holiday)
    }

    async fn list_holidays(&self, year: Option<i32>) -> StoreResult<Vec<Holiday>> {
        let mut holidays: Vec<_> = self
            .state()
            .holidays
            .values()
            .filter(|h| year.is_none_or(|y| h.date.year() == y))
            .cloned()
            .collect();
        holidays.sort_by_key(|h| h.date);
        Ok(holidays)
    }

    async fn delete_holiday(&self, id: u64) -> StoreResult<bool> {
        Ok(self.state().holidays.remove(&id).is_some())
    }

    async fn is_holiday(&self, date: NaiveDate) -> StoreResult<bool> {
        Ok(self
            .state()
            .holidays
            .values()
            .any(|h| h.date == date && !h.is_optional))
    }
}

impl LeaveStore for MemoryStore {
    async fn create_leave_type(&self, mut leave_type: LeaveType) -> StoreResult<LeaveType> {
        let mut state = self.state();
        if state.leave_types.values().any(|t| t.name == leave_type.name) {
            return Err(AppError::validation("Leave type with this name already exists"));
        }
        leave_type.id = state.id();
        state.leave_types.insert(leave_type.id, leave_type.clone());
        Ok(leave_type)
    }

    async fn get_leave_type(&self, id: u64) -> StoreResult<Option<LeaveType>> {
        Ok(self.state().leave_types.get(&id).cloned())
    }

    async fn list_leave_types(&self, active_only: bool) -> StoreResult<Vec<LeaveType>> {
        let mut types: Vec<_> = self
            .state()
            .leave_types
            .values()
            .filter(|t| !active_only || t.is_active)
            .cloned()
            .collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(types)
    }

    async fn update_leave_type<F>(&self, id: u64, apply: F) -> StoreResult<LeaveType>
    where
        F: FnOnce(&mut LeaveType) -> StoreResult<()>,
    {
        let mut state = self.state();
        let mut leave_type = state
            .leave_types
            .get(&id)
            .cloned()
            .ok_or(AppError::NotFound("Leave type"))?;
        apply(&mut leave_type)?;
        if state
            .leave_types
            .values()
            .any(|t| t.id != id && t.name == leave_type.name)
        {
            return Err(AppError::validation("Leave type with this name already exists"));
        }
        state.leave_types.insert(id, leave_type.clone());
        Ok(leave_type)
    }

    async fn insert_application(
        &self,
        mut application: LeaveApplication,
        ledger: Vec<LedgerEntry>,
    ) -> StoreResult<LeaveApplication> {
        let mut state = self.state();
        let balances = state.post_all(ledger)?;
        application.id = state.id();
        state.commit_balances(balances);
        state.applications.insert(application.id, application.clone());
        Ok(application)
    }

    async fn get_application(&self, id: u64) -> StoreResult<Option<LeaveApplication>> {
        Ok(self.state().applications.get(&id).cloned())
    }

    async fn list_applications(
        &self,
        filter: &LeaveFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<LeaveApplication>, i64)> {
        let mut applications: Vec<_> = self
            .state()
            .applications
            .values()
            .filter(|a| filter.employee_id.is_none_or(|e| a.employee_id == e))
            .filter(|a| filter.status.is_none_or(|s| a.status == s))
            .filter(|a| filter.leave_type_id.is_none_or(|t| a.leave_type_id == t))
            .filter(|a| filter.year.is_none_or(|y| a.year() == y))
            .cloned()
            .collect();
        applications.sort_by(|a, b| b.applied_on.cmp(&a.applied_on).then(b.id.cmp(&a.id)));
        Ok(page_of(applications, page))
    }

    async fn transition_application<F>(&self, id: u64, apply: F) -> StoreResult<LeaveApplication>
    where
        F: FnOnce(&mut LeaveApplication) -> StoreResult<Vec<LedgerEntry>>,
    {
        let mut state = self.state();
        let mut application = state
            .applications
            .get(&id)
            .cloned()
            .ok_or(AppError::NotFound("Leave application"))?;
        let ledger = apply(&mut application)?;
        let balances = state.post_all(ledger)?;
        state.commit_balances(balances);
        state.applications.insert(id, application.clone());
        Ok(application)
    }

    async fn list_balances(&self, employee_id: Option<u64>, year: i32) -> StoreResult<Vec<LeaveBalance>> {
        let mut balances: Vec<_> = self
            .state()
            .balances
            .values()
            .filter(|b| b.year == year && employee_id.is_none_or(|e| b.employee_id == e))
            .cloned()
            .collect();
        balances.sort_by_key(|b| (b.employee_id, b.leave_type_id));
        Ok(balances)
    }

    async fn has_approved_leave_on(&self, employee_id: u64, date: NaiveDate) -> StoreResult<bool> {
        Ok(self.state().applications.values().any(|a| {
            a.employee_id == employee_id && a.status == LeaveStatus::Approved && a.covers(date)
        }))
    }

    async fn add_comment(&self, mut comment: LeaveComment) -> StoreResult<LeaveComment> {
        let mut state = self.state();
        comment.id = state.id();
        state.comments.push(comment.clone());
        Ok(comment)
    }

    async fn list_comments(&self, application_id: u64) -> StoreResult<Vec<LeaveComment>> {
        let mut comments: Vec<_> = self
            .state()
            .comments
            .iter()
            .filter(|c| c.application_id == application_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(comments)
    }

    async fn add_attachment(&self, mut attachment: LeaveAttachment) -> StoreResult<LeaveAttachment> {
        let mut state = self.state();
        attachment.id = state.id();
        state.attachments.push(attachment.clone());
        Ok(attachment)
    }

    async fn list_attachments(&self, application_id: u64) -> StoreResult<Vec<LeaveAttachment>> {
        Ok(self
            .state()
            .attachments
            .iter()
            .filter(|a| a.application_id == application_id)
            .cloned()
            .collect())
    }
}

fn directory_clash(state: &State, employee: &Employee) -> bool {
    state.employees.values().any(|e| {
        e.id != employee.id && (e.email == employee.email || e.employee_code == employee.employee_code)
    })
}

impl DirectoryStore for MemoryStore {
    async fn create_employee(&self, mut employee: Employee, account: NewAccount) -> StoreResult<Employee> {
        let mut state = self.state();
        if directory_clash(&state, &employee) {
            return Err(AppError::validation("Employee code or email already exists"));
        }
        if state.usernames.contains(&account.username) {
            return Err(AppError::validation("Username already exists"));
        }
        employee.id = state.id();
        state.usernames.push(account.username);
        state.employees.insert(employee.id, employee.clone());
        Ok(employee)
    }

    async fn get_employee(&self, id: u64) -> StoreResult<Option<Employee>> {
        Ok(self.state().employees.get(&id).cloned())
    }

    async fn list_employees(
        &self,
        filter: &EmployeeFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Employee>, i64)> {
        let employees: Vec<_> = self
            .state()
            .employees
            .values()
            .rev()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        Ok(page_of(employees, page))
    }

    async fn update_employee<F>(&self, id: u64, apply: F) -> StoreResult<Employee>
    where
        F: FnOnce(&mut Employee) -> StoreResult<()>,
    {
        let mut state = self.state();
        let mut employee = state
            .employees
            .get(&id)
            .cloned()
            .ok_or(AppError::NotFound("Employee"))?;
        apply(&mut employee)?;
        if directory_clash(&state, &employee) {
            return Err(AppError::validation("Employee code or email already exists"));
        }
        state.employees.insert(id, employee.clone());
        Ok(employee)
    }
}
