use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::auth::auth::AuthUser;
use crate::error::AppError;
use crate::model::attendance::{
    AttendanceCorrection, AttendanceDay, AttendanceStatus, BreakType, recompute,
};
use crate::model::schedule::EffectiveSchedule;
use crate::service::{Page, Services};
use crate::store::{
    AttendanceFilter, AttendanceStore, DirectoryStore, LeaveStore, PageRequest, ScheduleStore,
};
use crate::utils::geo::{Coordinates, validate_position};

/// Body of a check-in or check-out. A free-text location wins over the
/// coordinates for the stored label.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ClockRequest {
    #[schema(example = "Head office")]
    pub location: Option<String>,
    #[schema(example = 23.8103)]
    pub latitude: Option<f64>,
    #[schema(example = 90.4125)]
    pub longitude: Option<f64>,
    pub notes: Option<String>,
}

impl ClockRequest {
    fn coordinates(&self) -> Result<Option<Coordinates>, AppError> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Ok(Some(Coordinates {
                latitude,
                longitude,
            })),
            (None, None) => Ok(None),
            _ => Err(AppError::InvalidLocation(
                "Latitude and longitude must be given together".into(),
            )),
        }
    }

    fn location_label(&self, coordinates: Option<&Coordinates>) -> String {
        self.location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .or_else(|| coordinates.map(Coordinates::label))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct BreakRequest {
    #[serde(default)]
    pub break_type: BreakType,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SeedDayRequest {
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = "2026-10-19", value_type = String, format = "date")]
    pub date: NaiveDate,
}

impl<S: AttendanceStore + ScheduleStore> Services<S> {
    /// Shift the employee is held to on `date`: the latest active binding
    /// covering the date, else the active policy, else the configured
    /// defaults.
    pub async fn resolve_schedule(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<EffectiveSchedule, AppError> {
        let bindings = self.store.list_bindings(Some(employee_id)).await?;
        let binding = bindings
            .iter()
            .filter(|b| b.is_active && b.covers(date))
            .max_by_key(|b| b.start_date);

        if let Some(binding) = binding {
            if let Some(schedule) = self.store.get_schedule(binding.schedule_id).await? {
                if schedule.is_active {
                    return Ok(EffectiveSchedule::from_binding(binding, &schedule));
                }
            }
        }

        if let Some(policy) = self.store.active_policy().await? {
            return Ok(EffectiveSchedule::from_policy(
                &policy,
                self.attendance.default_start,
                self.attendance.default_end,
            ));
        }

        Ok(self.attendance.fallback_schedule())
    }

    #[instrument(name = "attendance_check_in", skip(self, caller, request), fields(user_id = caller.user_id))]
    pub async fn check_in(
        &self,
        caller: &AuthUser,
        request: ClockRequest,
        now: NaiveDateTime,
    ) -> Result<AttendanceDay, AppError> {
        let employee_id = caller.require_employee()?;
        let coordinates = request.coordinates()?;
        validate_position(coordinates.as_ref(), self.attendance.geofence.as_ref())?;
        let location = request.location_label(coordinates.as_ref());

        let date = now.date();
        let schedule = self.resolve_schedule(employee_id, date).await?;

        let day = self
            .store
            .upsert_day(employee_id, date, |current| {
                let mut day = current.unwrap_or_else(|| {
                    AttendanceDay::new(employee_id, date, schedule.scheduled_hours)
                });
                day.check_in(now, location.clone(), request.notes.as_deref())?;
                recompute(&mut day, &schedule);
                Ok(day)
            })
            .await?;

        info!(
            employee_id,
            attendance_id = day.id,
            is_late = day.is_late,
            "Checked in"
        );
        Ok(day)
    }

    #[instrument(name = "attendance_check_out", skip(self, caller, request), fields(user_id = caller.user_id))]
    pub async fn check_out(
        &self,
        caller: &AuthUser,
        request: ClockRequest,
        now: NaiveDateTime,
    ) -> Result<AttendanceDay, AppError> {
        let employee_id = caller.require_employee()?;
        let coordinates = request.coordinates()?;
        if let Some(point) = &coordinates {
            point.validate()?;
        }
        let location = request.location_label(coordinates.as_ref());

        let date = now.date();
        let schedule = self.resolve_schedule(employee_id, date).await?;

        let day = self
            .store
            .upsert_day(employee_id, date, |current| {
                let mut day = current.ok_or(AppError::NotCheckedIn)?;
                day.check_out(now, location.clone(), request.notes.as_deref())?;
                recompute(&mut day, &schedule);
                Ok(day)
            })
            .await?;

        info!(
            employee_id,
            attendance_id = day.id,
            actual_hours = day.actual_hours,
            overtime_hours = day.overtime_hours,
            "Checked out"
        );
        Ok(day)
    }

    pub async fn start_break(
        &self,
        caller: &AuthUser,
        request: BreakRequest,
        now: NaiveDateTime,
    ) -> Result<AttendanceDay, AppError> {
        let employee_id = caller.require_employee()?;
        let date = now.date();
        let schedule = self.resolve_schedule(employee_id, date).await?;

        let day = self
            .store
            .upsert_day(employee_id, date, |current| {
                let mut day = current.ok_or(AppError::NotCheckedIn)?;
                day.start_break(now, request.break_type, request.notes.as_deref())?;
                recompute(&mut day, &schedule);
                Ok(day)
            })
            .await?;

        info!(employee_id, break_type = %request.break_type, "Break started");
        Ok(day)
    }

    pub async fn end_break(&self, caller: &AuthUser, now: NaiveDateTime) -> Result<AttendanceDay, AppError> {
        let employee_id = caller.require_employee()?;
        let date = now.date();
        let schedule = self.resolve_schedule(employee_id, date).await?;

        let day = self
            .store
            .upsert_day(employee_id, date, |current| {
                let mut day = current.ok_or(AppError::NotCheckedIn)?;
                day.end_break(now)?;
                recompute(&mut day, &schedule);
                Ok(day)
            })
            .await?;

        info!(
            employee_id,
            total_break_seconds = day.total_break_seconds,
            "Break ended"
        );
        Ok(day)
    }

    /// The caller's record for the current day, if one exists.
    pub async fn today(
        &self,
        caller: &AuthUser,
        today: NaiveDate,
    ) -> Result<Option<AttendanceDay>, AppError> {
        let employee_id = caller.require_employee()?;
        Ok(self.store.find_day(employee_id, today).await?)
    }

    pub async fn get_day(&self, caller: &AuthUser, id: u64) -> Result<AttendanceDay, AppError> {
        match self.store.get_day(id).await? {
            Some(day) if caller.can_access(day.employee_id) => Ok(day),
            _ => Err(AppError::NotFound("Attendance record")),
        }
    }

    pub async fn list_days(
        &self,
        caller: &AuthUser,
        mut filter: AttendanceFilter,
    ) -> Result<Page<AttendanceDay>, AppError> {
        filter.employee_id = caller.scope_employee(filter.employee_id)?;
        let page = PageRequest::new(filter.page, filter.per_page);
        let (days, total) = self.store.list_days(&filter, page).await?;
        Ok(Page::new(days, page, total))
    }

    /// HR soft correction; hours, status and punctuality are re-derived
    /// from the corrected inputs.
    #[instrument(name = "attendance_correct", skip(self, caller, correction), fields(user_id = caller.user_id))]
    pub async fn correct_day(
        &self,
        caller: &AuthUser,
        id: u64,
        correction: AttendanceCorrection,
    ) -> Result<AttendanceDay, AppError> {
        caller.require_hr()?;
        let existing = self
            .store
            .get_day(id)
            .await?
            .ok_or(AppError::NotFound("Attendance record"))?;
        let schedule = self
            .resolve_schedule(existing.employee_id, existing.date)
            .await?;

        let day = self
            .store
            .update_day(id, |mut day| {
                day.apply_correction(correction)?;
                recompute(&mut day, &schedule);
                Ok(day)
            })
            .await?;

        info!(attendance_id = id, employee_id = day.employee_id, "Attendance corrected");
        Ok(day)
    }
}

impl<S: AttendanceStore + ScheduleStore + LeaveStore + DirectoryStore> Services<S> {
    /// Creates the (employee, date) record ahead of any clock event:
    /// HOLIDAY on holidays and non-working days, ON_LEAVE under an approved
    /// leave, ABSENT otherwise. An existing record is returned untouched.
    pub async fn seed_day(
        &self,
        caller: &AuthUser,
        request: SeedDayRequest,
    ) -> Result<AttendanceDay, AppError> {
        caller.require_hr()?;
        let SeedDayRequest { employee_id, date } = request;
        if !self.store.employee_exists(employee_id).await? {
            return Err(AppError::NotFound("Employee"));
        }

        let schedule = self.resolve_schedule(employee_id, date).await?;
        let status = if self.store.is_holiday(date).await? || !schedule.is_working_day(date) {
            AttendanceStatus::Holiday
        } else if self.store.has_approved_leave_on(employee_id, date).await? {
            AttendanceStatus::OnLeave
        } else {
            AttendanceStatus::Absent
        };

        let day = self
            .store
            .upsert_day(employee_id, date, |current| {
                Ok(current.unwrap_or_else(|| {
                    AttendanceDay::seeded(employee_id, date, status, schedule.scheduled_hours)
                }))
            })
            .await?;

        info!(employee_id, %date, status = %day.status, "Attendance day seeded");
        Ok(day)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::*;
    use crate::model::leave::{LeaveApplication, LeaveRequestForm, LeaveType, LedgerMode, Priority};
    use crate::model::schedule::{
        AttendancePolicy, EmployeeSchedule, Holiday, MONDAY_TO_FRIDAY, WorkSchedule,
    };
    use crate::service::testing::{at, date, services};
    use crate::store::memory::MemoryStore;
    use crate::utils::geo::Geofence;

    const MONDAY: &str = "2026-10-19";

    fn employee() -> AuthUser {
        AuthUser::employee(10, 1)
    }

    fn here() -> ClockRequest {
        ClockRequest {
            location: Some("Office".into()),
            ..Default::default()
        }
    }

    async fn day_shift(services: &Services<MemoryStore>) -> u64 {
        services
            .store
            .create_schedule(WorkSchedule {
                id: 0,
                name: "Day".into(),
                description: String::new(),
                start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(17, 30, 0).unwrap(),
                break_duration_minutes: 30,
                max_break_sessions: 2,
                late_grace_minutes: 15,
                early_departure_grace_minutes: 15,
                working_days: MONDAY_TO_FRIDAY,
                is_active: true,
            })
            .await
            .unwrap()
            .id
    }

    async fn bind(services: &Services<MemoryStore>, employee_id: u64, schedule_id: u64) {
        services
            .store
            .insert_binding(
                EmployeeSchedule {
                    id: 0,
                    employee_id,
                    schedule_id,
                    start_date: date("2026-01-01"),
                    end_date: None,
                    custom_start_time: None,
                    custom_end_time: None,
                    is_active: true,
                },
                |_| Ok(()),
            )
            .await
            .unwrap();
    }

    #[actix_web::test]
    async fn full_day_with_lunch() {
        let (services, _) = services(LedgerMode::OnApproval);
        let me = employee();

        services.check_in(&me, here(), at(MONDAY, 9, 0)).await.unwrap();
        services
            .start_break(
                &me,
                BreakRequest {
                    break_type: BreakType::Lunch,
                    notes: None,
                },
                at(MONDAY, 12, 0),
            )
            .await
            .unwrap();
        services.end_break(&me, at(MONDAY, 12, 30)).await.unwrap();
        let day = services.check_out(&me, here(), at(MONDAY, 17, 0)).await.unwrap();

        assert_eq!(day.total_break_seconds, 1800);
        assert_eq!(day.break_sessions_count, 1);
        assert_eq!(day.scheduled_hours, 8.0);
        assert_eq!(day.actual_hours, 7.5);
        assert_eq!(day.overtime_hours, 0.0);
        assert_eq!(day.status, AttendanceStatus::Present);
        assert_eq!(day.check_in_location, "Office");
        assert_eq!(day.breaks.len(), 1);
        assert_ne!(day.breaks[0].id, 0);
    }

    #[actix_web::test]
    async fn second_check_in_is_rejected_and_record_kept() {
        let (services, _) = services(LedgerMode::OnApproval);
        let me = employee();

        let first = services.check_in(&me, here(), at(MONDAY, 9, 0)).await.unwrap();
        let err = services
            .check_in(&me, here(), at(MONDAY, 9, 30))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyCheckedIn));

        let today = services.today(&me, date(MONDAY)).await.unwrap().unwrap();
        assert_eq!(today.id, first.id);
        assert_eq!(today.check_in, Some(at(MONDAY, 9, 0)));
    }

    #[actix_web::test]
    async fn check_out_without_check_in() {
        let (services, _) = services(LedgerMode::OnApproval);
        let err = services
            .check_out(&employee(), here(), at(MONDAY, 17, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotCheckedIn));
        assert!(services.today(&employee(), date(MONDAY)).await.unwrap().is_none());
    }

    #[actix_web::test]
    async fn end_break_without_open_break_fails_and_changes_nothing() {
        let (services, _) = services(LedgerMode::OnApproval);
        let me = employee();
        services.check_in(&me, here(), at(MONDAY, 9, 0)).await.unwrap();

        for minute in [0, 5] {
            let err = services
                .end_break(&me, at(MONDAY, 10, minute))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::NoOpenBreak));
        }
        let day = services.today(&me, date(MONDAY)).await.unwrap().unwrap();
        assert!(day.breaks.is_empty());
        assert_eq!(day.total_break_seconds, 0);
    }

    #[actix_web::test]
    async fn lateness_follows_bound_schedule_grace() {
        let (services, _) = services(LedgerMode::OnApproval);
        let schedule_id = day_shift(&services).await;
        bind(&services, 1, schedule_id).await;
        bind(&services, 2, schedule_id).await;

        let on_time = services
            .check_in(&employee(), here(), at(MONDAY, 9, 5))
            .await
            .unwrap();
        assert!(!on_time.is_late);
        assert_eq!(on_time.scheduled_hours, 8.0);

        let late = services
            .check_in(&AuthUser::employee(11, 2), here(), at(MONDAY, 9, 20))
            .await
            .unwrap();
        assert!(late.is_late);
        // Status stays PRESENT on the clock path.
        assert_eq!(late.status, AttendanceStatus::Present);
    }

    #[actix_web::test]
    async fn policy_applies_without_binding() {
        let (services, _) = services(LedgerMode::OnApproval);
        services
            .store
            .create_policy(AttendancePolicy {
                id: 0,
                name: "Standard".into(),
                description: String::new(),
                working_hours_per_day: 7.0,
                late_threshold_minutes: 5,
                early_departure_threshold_minutes: 5,
                is_active: true,
            })
            .await
            .unwrap();

        let day = services
            .check_in(&employee(), here(), at(MONDAY, 9, 10))
            .await
            .unwrap();
        assert_eq!(day.scheduled_hours, 7.0);
        assert!(day.is_late);
    }

    #[actix_web::test]
    async fn geofence_rejects_far_check_in() {
        let (mut services, _) = services(LedgerMode::OnApproval);
        services.attendance.geofence = Some(Geofence {
            latitude: 23.8103,
            longitude: 90.4125,
            allowed_radius_meters: 100.0,
        });

        let far = ClockRequest {
            latitude: Some(23.9),
            longitude: Some(90.4125),
            ..Default::default()
        };
        let err = services
            .check_in(&employee(), far, at(MONDAY, 9, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidLocation(_)));

        let near = ClockRequest {
            latitude: Some(23.8104),
            longitude: Some(90.4125),
            ..Default::default()
        };
        let day = services
            .check_in(&employee(), near, at(MONDAY, 9, 0))
            .await
            .unwrap();
        assert_eq!(day.check_in_location, "23.8104, 90.4125");
    }

    #[actix_web::test]
    async fn check_out_validates_coordinate_range() {
        let (services, _) = services(LedgerMode::OnApproval);
        services.check_in(&employee(), here(), at(MONDAY, 9, 0)).await.unwrap();
        let bad = ClockRequest {
            latitude: Some(123.0),
            longitude: Some(0.0),
            ..Default::default()
        };
        let err = services
            .check_out(&employee(), bad, at(MONDAY, 17, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidLocation(_)));
    }

    #[actix_web::test]
    async fn unlinked_account_cannot_clock_in() {
        let (services, _) = services(LedgerMode::OnApproval);
        let err = services
            .check_in(&AuthUser::hr(1), here(), at(MONDAY, 9, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[actix_web::test]
    async fn employees_only_see_their_own_days() {
        let (services, _) = services(LedgerMode::OnApproval);
        let mine = services.check_in(&employee(), here(), at(MONDAY, 9, 0)).await.unwrap();
        let other = AuthUser::employee(11, 2);
        let theirs = services.check_in(&other, here(), at(MONDAY, 9, 0)).await.unwrap();

        let err = services.get_day(&employee(), theirs.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(services.get_day(&employee(), mine.id).await.unwrap().id, mine.id);

        let page = services
            .list_days(
                &employee(),
                AttendanceFilter {
                    employee_id: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].employee_id, 1);

        let all = services
            .list_days(&AuthUser::hr(1), AttendanceFilter::default())
            .await
            .unwrap();
        assert_eq!(all.total, 2);
    }

    #[actix_web::test]
    async fn hr_correction_recomputes() {
        let (services, _) = services(LedgerMode::OnApproval);
        let day = services.check_in(&employee(), here(), at(MONDAY, 9, 0)).await.unwrap();

        let err = services
            .correct_day(&employee(), day.id, AttendanceCorrection::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let corrected = services
            .correct_day(
                &AuthUser::hr(1),
                day.id,
                AttendanceCorrection {
                    check_in: Some(at(MONDAY, 9, 30)),
                    check_out: Some(at(MONDAY, 19, 0)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(corrected.actual_hours, 9.5);
        assert_eq!(corrected.overtime_hours, 1.5);
        assert!(corrected.is_late);
        assert!(!corrected.is_early_departure);
    }

    #[actix_web::test]
    async fn seeding_picks_holiday_leave_or_absent() {
        let (services, _) = services(LedgerMode::OnApproval);
        let hr = AuthUser::hr(1);
        services.store.add_employee(1, "one@company.com");

        services
            .store
            .create_holiday(Holiday {
                id: 0,
                name: "Founders Day".into(),
                date: date("2026-10-20"),
                description: String::new(),
                is_optional: false,
            })
            .await
            .unwrap();

        let annual = services
            .store
            .create_leave_type(LeaveType {
                id: 0,
                name: "Annual".into(),
                description: String::new(),
                max_days_per_year: 20,
                requires_approval: true,
                advance_notice_days: 0,
                is_active: true,
            })
            .await
            .unwrap();
        let mut application = LeaveApplication::submit(
            1,
            LeaveRequestForm {
                leave_type_id: annual.id,
                start_date: date("2026-10-21"),
                end_date: date("2026-10-21"),
                reason: "Errand".into(),
                priority: Priority::Low,
                contact_number: String::new(),
                emergency_contact: String::new(),
                is_half_day: false,
                replacement_employee_id: None,
            },
            &annual,
            at(MONDAY, 8, 0),
        )
        .unwrap();
        application.approve(1, at(MONDAY, 8, 5), None).unwrap();
        services
            .store
            .insert_application(application, Vec::new())
            .await
            .unwrap();

        let seed = |d: &str| SeedDayRequest {
            employee_id: 1,
            date: date(d),
        };
        let holiday = services.seed_day(&hr, seed("2026-10-20")).await.unwrap();
        assert_eq!(holiday.status, AttendanceStatus::Holiday);
        let weekend = services.seed_day(&hr, seed("2026-10-24")).await.unwrap();
        assert_eq!(weekend.status, AttendanceStatus::Holiday);
        let leave = services.seed_day(&hr, seed("2026-10-21")).await.unwrap();
        assert_eq!(leave.status, AttendanceStatus::OnLeave);
        let absent = services.seed_day(&hr, seed("2026-10-22")).await.unwrap();
        assert_eq!(absent.status, AttendanceStatus::Absent);

        // Seeding again keeps the existing record.
        let again = services.seed_day(&hr, seed("2026-10-22")).await.unwrap();
        assert_eq!(again.id, absent.id);

        // Checking in on a seeded day turns it into a present day.
        let present = services
            .check_in(&employee(), here(), at("2026-10-22", 9, 0))
            .await
            .unwrap();
        assert_eq!(present.id, absent.id);
        assert_eq!(present.status, AttendanceStatus::Present);
    }

    #[actix_web::test]
    async fn seeding_unknown_employee_is_not_found() {
        let (services, _) = services(LedgerMode::OnApproval);
        let err = services
            .seed_day(
                &AuthUser::hr(1),
                SeedDayRequest {
                    employee_id: 77,
                    date: date(MONDAY),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
