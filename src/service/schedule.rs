use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::error::AppError;
use crate::model::schedule::{
    AttendancePolicy, EmployeeSchedule, Holiday, MONDAY_TO_FRIDAY, WorkSchedule,
};
use crate::service::Services;
use crate::store::{DirectoryStore, ScheduleStore};

fn default_working_days() -> [bool; 7] {
    MONDAY_TO_FRIDAY
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ScheduleForm {
    #[schema(example = "Day shift")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[schema(example = "09:00:00", value_type = String, format = "time")]
    pub start_time: NaiveTime,
    #[schema(example = "17:00:00", value_type = String, format = "time")]
    pub end_time: NaiveTime,
    #[serde(default)]
    #[schema(example = 60)]
    pub break_duration_minutes: u32,
    #[serde(default)]
    #[schema(example = 2)]
    pub max_break_sessions: u32,
    #[serde(default)]
    #[schema(example = 15)]
    pub late_grace_minutes: u32,
    #[serde(default)]
    #[schema(example = 15)]
    pub early_departure_grace_minutes: u32,
    /// Monday first.
    #[serde(default = "default_working_days")]
    #[schema(value_type = Vec<bool>)]
    pub working_days: [bool; 7],
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl ScheduleForm {
    fn into_schedule(self) -> WorkSchedule {
        WorkSchedule {
            id: 0,
            name: self.name.trim().to_string(),
            description: self.description,
            start_time: self.start_time,
            end_time: self.end_time,
            break_duration_minutes: self.break_duration_minutes,
            max_break_sessions: self.max_break_sessions,
            late_grace_minutes: self.late_grace_minutes,
            early_departure_grace_minutes: self.early_departure_grace_minutes,
            working_days: self.working_days,
            is_active: self.is_active,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateSchedule {
    pub name: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Option<String>, format = "time")]
    pub start_time: Option<NaiveTime>,
    #[schema(value_type = Option<String>, format = "time")]
    pub end_time: Option<NaiveTime>,
    pub break_duration_minutes: Option<u32>,
    pub max_break_sessions: Option<u32>,
    pub late_grace_minutes: Option<u32>,
    pub early_departure_grace_minutes: Option<u32>,
    #[schema(value_type = Option<Vec<bool>>)]
    pub working_days: Option<[bool; 7]>,
    pub is_active: Option<bool>,
}

impl UpdateSchedule {
    fn apply(self, schedule: &mut WorkSchedule) {
        if let Some(name) = self.name {
            schedule.name = name.trim().to_string();
        }
        if let Some(description) = self.description {
            schedule.description = description;
        }
        if let Some(start) = self.start_time {
            schedule.start_time = start;
        }
        if let Some(end) = self.end_time {
            schedule.end_time = end;
        }
        if let Some(minutes) = self.break_duration_minutes {
            schedule.break_duration_minutes = minutes;
        }
        if let Some(sessions) = self.max_break_sessions {
            schedule.max_break_sessions = sessions;
        }
        if let Some(minutes) = self.late_grace_minutes {
            schedule.late_grace_minutes = minutes;
        }
        if let Some(minutes) = self.early_departure_grace_minutes {
            schedule.early_departure_grace_minutes = minutes;
        }
        if let Some(days) = self.working_days {
            schedule.working_days = days;
        }
        if let Some(active) = self.is_active {
            schedule.is_active = active;
        }
    }
}

fn validate_schedule(schedule: &WorkSchedule) -> Result<(), AppError> {
    if schedule.name.is_empty() {
        return Err(AppError::validation("Schedule name is required"));
    }
    if schedule.start_time == schedule.end_time {
        return Err(AppError::validation("Start and end time must differ"));
    }
    if schedule.work_duration_hours() <= 0.0 {
        return Err(AppError::validation("Break budget exceeds the shift length"));
    }
    if !schedule.working_days.iter().any(|d| *d) {
        return Err(AppError::validation("At least one working day is required"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AssignSchedule {
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = 1)]
    pub schedule_id: u64,
    #[schema(example = "2026-11-01", value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(value_type = Option<String>, format = "date")]
    pub end_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "time")]
    pub custom_start_time: Option<NaiveTime>,
    #[schema(value_type = Option<String>, format = "time")]
    pub custom_end_time: Option<NaiveTime>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct BindingQuery {
    /// Filter by employee ID (HR only)
    pub employee_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PolicyForm {
    #[schema(example = "Standard")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[schema(example = 8.0)]
    pub working_hours_per_day: f64,
    #[serde(default)]
    #[schema(example = 15)]
    pub late_threshold_minutes: u32,
    #[serde(default)]
    #[schema(example = 15)]
    pub early_departure_threshold_minutes: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct HolidayForm {
    #[schema(example = "New Year")]
    pub name: String,
    #[schema(example = "2027-01-01", value_type = String, format = "date")]
    pub date: NaiveDate,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_optional: bool,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct HolidayQuery {
    pub year: Option<i32>,
}

impl<S: ScheduleStore> Services<S> {
    pub async fn create_schedule(
        &self,
        caller: &AuthUser,
        form: ScheduleForm,
    ) -> Result<WorkSchedule, AppError> {
        caller.require_hr()?;
        let schedule = form.into_schedule();
        validate_schedule(&schedule)?;

        let schedule = self.store.create_schedule(schedule).await?;
        info!(schedule_id = schedule.id, name = %schedule.name, "Work schedule created");
        Ok(schedule)
    }

    pub async fn update_schedule(
        &self,
        caller: &AuthUser,
        id: u64,
        update: UpdateSchedule,
    ) -> Result<WorkSchedule, AppError> {
        caller.require_hr()?;
        let schedule = self
            .store
            .update_schedule(id, |schedule| {
                update.apply(schedule);
                validate_schedule(schedule)
            })
            .await?;
        info!(schedule_id = id, "Work schedule updated");
        Ok(schedule)
    }

    pub async fn list_schedules(&self) -> Result<Vec<WorkSchedule>, AppError> {
        Ok(self.store.list_schedules().await?)
    }

    pub async fn list_bindings(
        &self,
        caller: &AuthUser,
        query: BindingQuery,
    ) -> Result<Vec<EmployeeSchedule>, AppError> {
        let employee_id = caller.scope_employee(query.employee_id)?;
        Ok(self.store.list_bindings(employee_id).await?)
    }

    pub async fn deactivate_binding(
        &self,
        caller: &AuthUser,
        id: u64,
    ) -> Result<EmployeeSchedule, AppError> {
        caller.require_hr()?;
        let binding = self.store.deactivate_binding(id).await?;
        info!(binding_id = id, employee_id = binding.employee_id, "Schedule binding deactivated");
        Ok(binding)
    }

    pub async fn create_policy(
        &self,
        caller: &AuthUser,
        form: PolicyForm,
    ) -> Result<AttendancePolicy, AppError> {
        caller.require_hr()?;
        if form.name.trim().is_empty() {
            return Err(AppError::validation("Policy name is required"));
        }
        if !(0.0..=24.0).contains(&form.working_hours_per_day) || form.working_hours_per_day == 0.0 {
            return Err(AppError::validation("Working hours per day must be between 0 and 24"));
        }

        let policy = self
            .store
            .create_policy(AttendancePolicy {
                id: 0,
                name: form.name.trim().to_string(),
                description: form.description,
                working_hours_per_day: form.working_hours_per_day,
                late_threshold_minutes: form.late_threshold_minutes,
                early_departure_threshold_minutes: form.early_departure_threshold_minutes,
                is_active: form.is_active,
            })
            .await?;
        info!(policy_id = policy.id, "Attendance policy created");
        Ok(policy)
    }

    pub async fn list_policies(&self) -> Result<Vec<AttendancePolicy>, AppError> {
        Ok(self.store.list_policies().await?)
    }

    pub async fn create_holiday(
        &self,
        caller: &AuthUser,
        form: HolidayForm,
    ) -> Result<Holiday, AppError> {
        caller.require_hr()?;
        if form.name.trim().is_empty() {
            return Err(AppError::validation("Holiday name is required"));
        }

        let holiday = self
            .store
            .create_holiday(Holiday {
                id: 0,
                name: form.name.trim().to_string(),
                date: form.date,
                description: form.description,
                is_optional: form.is_optional,
            })
            .await?;
        info!(holiday_id = holiday.id, date = %holiday.date, "Holiday created");
        Ok(holiday)
    }

    pub async fn list_holidays(&self, query: HolidayQuery) -> Result<Vec<Holiday>, AppError> {
        Ok(self.store.list_holidays(query.year).await?)
    }

    pub async fn delete_holiday(&self, caller: &AuthUser, id: u64) -> Result<(), AppError> {
        caller.require_hr()?;
        if !self.store.delete_holiday(id).await? {
            return Err(AppError::NotFound("Holiday"));
        }
        info!(holiday_id = id, "Holiday deleted");
        Ok(())
    }
}

impl<S: ScheduleStore + DirectoryStore> Services<S> {
    /// Binds an employee to a schedule. Ranges of active bindings for the
    /// same employee may not intersect.
    pub async fn assign_schedule(
        &self,
        caller: &AuthUser,
        request: AssignSchedule,
    ) -> Result<EmployeeSchedule, AppError> {
        caller.require_hr()?;
        if request.end_date.is_some_and(|end| end < request.start_date) {
            return Err(AppError::InvalidDateRange(
                "End date cannot be before start date".into(),
            ));
        }
        match self.store.get_schedule(request.schedule_id).await? {
            Some(schedule) if schedule.is_active => {}
            Some(_) => return Err(AppError::validation("Schedule is not active")),
            None => return Err(AppError::NotFound("Work schedule")),
        }
        if !self.store.employee_exists(request.employee_id).await? {
            return Err(AppError::NotFound("Employee"));
        }

        let binding = EmployeeSchedule {
            id: 0,
            employee_id: request.employee_id,
            schedule_id: request.schedule_id,
            start_date: request.start_date,
            end_date: request.end_date,
            custom_start_time: request.custom_start_time,
            custom_end_time: request.custom_end_time,
            is_active: true,
        };
        let (start, end) = (binding.start_date, binding.end_date);

        let binding = self
            .store
            .insert_binding(binding, |existing| {
                match existing.iter().find(|b| b.overlaps(start, end)) {
                    Some(clash) => Err(AppError::ScheduleOverlap(clash.start_date)),
                    None => Ok(()),
                }
            })
            .await?;

        info!(
            binding_id = binding.id,
            employee_id = binding.employee_id,
            schedule_id = binding.schedule_id,
            "Schedule assigned"
        );
        Ok(binding)
    }
}
