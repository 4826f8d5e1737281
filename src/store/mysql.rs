use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::mysql::MySqlDatabaseError;
use sqlx::{FromRow, MySqlConnection, MySqlPool};
use tracing::warn;

use crate::error::AppError;
use crate::model::attendance::{AttendanceDay, BreakInterval};
use crate::model::employee::{Employee, EmployeeFilter, NewAccount};
use crate::model::leave::{
    LeaveApplication, LeaveAttachment, LeaveBalance, LeaveComment, LeaveType,
};
use crate::model::schedule::{AttendancePolicy, EmployeeSchedule, Holiday, WorkSchedule};
use crate::store::{
    AttendanceFilter, AttendanceStore, DirectoryStore, LeaveFilter, LeaveStore, LedgerEntry,
    PageRequest, ScheduleStore, StoreResult,
};

/// MySQL-backed store. Mutations run in a transaction with the target row
/// locked `FOR UPDATE`.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// One locked read-modify-write of the (employee, date) row.
    async fn write_day<F>(
        &self,
        employee_id: u64,
        date: NaiveDate,
        apply: &F,
    ) -> Result<AttendanceDay, DayWriteError>
    where
        F: Fn(Option<AttendanceDay>) -> StoreResult<AttendanceDay>,
    {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, DayRow>(&format!(
            "SELECT {DAY_COLUMNS} FROM attendance_days WHERE employee_id = ? AND date = ? FOR UPDATE"
        ))
        .bind(employee_id)
        .bind(date)
        .fetch_optional(&mut *tx)
        .await?;
        let current = load_day(&mut tx, row).await?;
        let is_new = current.is_none();

        let mut day = apply(current)?;
        if is_new {
            insert_day(&mut tx, &mut day).await?;
        } else {
            update_day_row(&mut tx, &day).await?;
        }
        save_breaks(&mut tx, &mut day).await?;

        tx.commit().await?;
        Ok(day)
    }
}

/// Duplicate key on a UNIQUE index. Foreign key failures share SQLSTATE
/// 23000 with it and are not matched.
fn is_duplicate(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// ER_LOCK_DEADLOCK (1213, SQLSTATE 40001). Two first events for the same
/// day both take the gap lock of the missing row, then block each other on
/// INSERT.
fn is_deadlock(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("40001")
                || db_err
                    .try_downcast_ref::<MySqlDatabaseError>()
                    .is_some_and(|mysql| mysql.number() == 1213)
        }
        _ => false,
    }
}

/// Failure of one attendance day write.
enum DayWriteError {
    /// Lost to a concurrent writer of the same day; replaying the write reads
    /// the row that writer left.
    Contended(sqlx::Error),
    Failed(AppError),
}

impl From<sqlx::Error> for DayWriteError {
    fn from(e: sqlx::Error) -> Self {
        if is_duplicate(&e) || is_deadlock(&e) {
            DayWriteError::Contended(e)
        } else {
            DayWriteError::Failed(e.into())
        }
    }
}

impl From<AppError> for DayWriteError {
    fn from(e: AppError) -> Self {
        DayWriteError::Failed(e)
    }
}

impl From<DayWriteError> for AppError {
    fn from(e: DayWriteError) -> Self {
        match e {
            // Still racing after the replay: the other writer created the day.
            DayWriteError::Contended(e) if is_duplicate(&e) => AppError::AlreadyCheckedIn,
            DayWriteError::Contended(e) => e.into(),
            DayWriteError::Failed(e) => e,
        }
    }
}

fn parse_enum<T: FromStr>(raw: &str, what: &str) -> StoreResult<T> {
    raw.parse()
        .map_err(|_| AppError::Storage(format!("unknown {what} '{raw}' in storage")))
}

// Helper enum for typed SQLx binding
enum FilterValue {
    U64(u64),
    I32(i32),
    Str(String),
    Date(NaiveDate),
}

/* =========================
Attendance rows
========================= */

const DAY_COLUMNS: &str = "id, employee_id, date, check_in, check_out, total_break_seconds, \
     break_sessions_count, scheduled_hours, actual_hours, overtime_hours, status, is_late, \
     is_early_departure, check_in_location, check_out_location, notes";

#[derive(FromRow)]
struct DayRow {
    id: u64,
    employee_id: u64,
    date: NaiveDate,
    check_in: Option<NaiveDateTime>,
    check_out: Option<NaiveDateTime>,
    total_break_seconds: i64,
    break_sessions_count: u32,
    scheduled_hours: f64,
    actual_hours: f64,
    overtime_hours: f64,
    status: String,
    is_late: bool,
    is_early_departure: bool,
    check_in_location: String,
    check_out_location: String,
    notes: String,
}

impl DayRow {
    fn into_day(self, breaks: Vec<BreakInterval>) -> StoreResult<AttendanceDay> {
        Ok(AttendanceDay {
            id: self.id,
            employee_id: self.employee_id,
            date: self.date,
            check_in: self.check_in,
            check_out: self.check_out,
            breaks,
            total_break_seconds: self.total_break_seconds,
            break_sessions_count: self.break_sessions_count,
            scheduled_hours: self.scheduled_hours,
            actual_hours: self.actual_hours,
            overtime_hours: self.overtime_hours,
            status: parse_enum(&self.status, "attendance status")?,
            is_late: self.is_late,
            is_early_departure: self.is_early_departure,
            check_in_location: self.check_in_location,
            check_out_location: self.check_out_location,
            notes: self.notes,
        })
    }
}

#[derive(FromRow)]
struct BreakRow {
    id: u64,
    break_type: String,
    start_time: NaiveDateTime,
    end_time: Option<NaiveDateTime>,
    duration_seconds: Option<i64>,
    notes: String,
}

impl BreakRow {
    fn into_break(self) -> StoreResult<BreakInterval> {
        Ok(BreakInterval {
            id: self.id,
            break_type: parse_enum(&self.break_type, "break type")?,
            start_time: self.start_time,
            end_time: self.end_time,
            duration_seconds: self.duration_seconds,
            notes: self.notes,
        })
    }
}

async fn load_breaks(conn: &mut MySqlConnection, attendance_id: u64) -> StoreResult<Vec<BreakInterval>> {
    sqlx::query_as::<_, BreakRow>(
        r#"
        SELECT id, break_type, start_time, end_time, duration_seconds, notes
        FROM attendance_breaks
        WHERE attendance_id = ?
        ORDER BY start_time
        "#,
    )
    .bind(attendance_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(BreakRow::into_break)
    .collect()
}

async fn load_day(conn: &mut MySqlConnection, row: Option<DayRow>) -> StoreResult<Option<AttendanceDay>> {
    match row {
        Some(row) => {
            let breaks = load_breaks(conn, row.id).await?;
            Ok(Some(row.into_day(breaks)?))
        }
        None => Ok(None),
    }
}

async fn insert_day(conn: &mut MySqlConnection, day: &mut AttendanceDay) -> Result<(), sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO attendance_days
            (employee_id, date, check_in, check_out, total_break_seconds, break_sessions_count,
             scheduled_hours, actual_hours, overtime_hours, status, is_late, is_early_departure,
             check_in_location, check_out_location, notes)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(day.employee_id)
    .bind(day.date)
    .bind(day.check_in)
    .bind(day.check_out)
    .bind(day.total_break_seconds)
    .bind(day.break_sessions_count)
    .bind(day.scheduled_hours)
    .bind(day.actual_hours)
    .bind(day.overtime_hours)
    .bind(day.status.to_string())
    .bind(day.is_late)
    .bind(day.is_early_departure)
    .bind(&day.check_in_location)
    .bind(&day.check_out_location)
    .bind(&day.notes)
    .execute(&mut *conn)
    .await?;

    day.id = result.last_insert_id();
    Ok(())
}

async fn update_day_row(conn: &mut MySqlConnection, day: &AttendanceDay) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE attendance_days
        SET check_in = ?, check_out = ?, total_break_seconds = ?, break_sessions_count = ?,
            scheduled_hours = ?, actual_hours = ?, overtime_hours = ?, status = ?, is_late = ?,
            is_early_departure = ?, check_in_location = ?, check_out_location = ?, notes = ?
        WHERE id = ?
        "#,
    )
    .bind(day.check_in)
    .bind(day.check_out)
    .bind(day.total_break_seconds)
    .bind(day.break_sessions_count)
    .bind(day.scheduled_hours)
    .bind(day.actual_hours)
    .bind(day.overtime_hours)
    .bind(day.status.to_string())
    .bind(day.is_late)
    .bind(day.is_early_departure)
    .bind(&day.check_in_location)
    .bind(&day.check_out_location)
    .bind(&day.notes)
    .bind(day.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn save_breaks(conn: &mut MySqlConnection, day: &mut AttendanceDay) -> StoreResult<()> {
    for interval in day.breaks.iter_mut() {
        if interval.id == 0 {
            let result = sqlx::query(
                r#"
                INSERT INTO attendance_breaks
                    (attendance_id, break_type, start_time, end_time, duration_seconds, notes)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(day.id)
            .bind(interval.break_type.to_string())
            .bind(interval.start_time)
            .bind(interval.end_time)
            .bind(interval.duration_seconds)
            .bind(&interval.notes)
            .execute(&mut *conn)
            .await?;
            interval.id = result.last_insert_id();
        } else {
            sqlx::query(
                r#"
                UPDATE attendance_breaks
                SET end_time = ?, duration_seconds = ?, notes = ?
                WHERE id = ?
                "#,
            )
            .bind(interval.end_time)
            .bind(interval.duration_seconds)
            .bind(&interval.notes)
            .bind(interval.id)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

impl AttendanceStore for MySqlStore {
    async fn find_day(&self, employee_id: u64, date: NaiveDate) -> StoreResult<Option<AttendanceDay>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query_as::<_, DayRow>(&format!(
            "SELECT {DAY_COLUMNS} FROM attendance_days WHERE employee_id = ? AND date = ?"
        ))
        .bind(employee_id)
        .bind(date)
        .fetch_optional(&mut *conn)
        .await?;
        load_day(&mut conn, row).await
    }

    async fn get_day(&self, id: u64) -> StoreResult<Option<AttendanceDay>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query_as::<_, DayRow>(&format!(
            "SELECT {DAY_COLUMNS} FROM attendance_days WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
        load_day(&mut conn, row).await
    }

    async fn list_days(
        &self,
        filter: &AttendanceFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<AttendanceDay>, i64)> {
        let mut where_sql = String::from(" WHERE 1=1");
        let mut args: Vec<FilterValue> = Vec::new();

        if let Some(employee_id) = filter.employee_id {
            where_sql.push_str(" AND employee_id = ?");
            args.push(FilterValue::U64(employee_id));
        }
        if let Some(start) = filter.start_date {
            where_sql.push_str(" AND date >= ?");
            args.push(FilterValue::Date(start));
        }
        if let Some(end) = filter.end_date {
            where_sql.push_str(" AND date <= ?");
            args.push(FilterValue::Date(end));
        }
        if let Some(status) = filter.status {
            where_sql.push_str(" AND status = ?");
            args.push(FilterValue::Str(status.to_string()));
        }

        let count_sql = format!("SELECT COUNT(*) FROM attendance_days{}", where_sql);
        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
        for arg in &args {
            count_q = match arg {
                FilterValue::U64(v) => count_q.bind(*v),
                FilterValue::I32(v) => count_q.bind(*v),
                FilterValue::Str(s) => count_q.bind(s.as_str()),
                FilterValue::Date(d) => count_q.bind(*d),
            };
        }
        let total = count_q.fetch_one(&self.pool).await?;

        let data_sql = format!(
            "SELECT {DAY_COLUMNS} FROM attendance_days{} ORDER BY date DESC, check_in DESC LIMIT ? OFFSET ?",
            where_sql
        );
        let mut data_q = sqlx::query_as::<_, DayRow>(&data_sql);
        for arg in &args {
            data_q = match arg {
                FilterValue::U64(v) => data_q.bind(*v),
                FilterValue::I32(v) => data_q.bind(*v),
                FilterValue::Str(s) => data_q.bind(s.as_str()),
                FilterValue::Date(d) => data_q.bind(*d),
            };
        }
        let rows = data_q
            .bind(page.per_page)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let days = rows
            .into_iter()
            .map(|row| row.into_day(Vec::new()))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((days, total))
    }

    async fn upsert_day<F>(&self, employee_id: u64, date: NaiveDate, apply: F) -> StoreResult<AttendanceDay>
    where
        F: Fn(Option<AttendanceDay>) -> StoreResult<AttendanceDay>,
    {
        match self.write_day(employee_id, date, &apply).await {
            Err(DayWriteError::Contended(e)) => {
                warn!(employee_id, %date, error = %e, "Concurrent write to attendance day, retrying");
                Ok(self.write_day(employee_id, date, &apply).await?)
            }
            other => other.map_err(AppError::from),
        }
    }

    async fn update_day<F>(&self, id: u64, apply: F) -> StoreResult<AttendanceDay>
    where
        F: FnOnce(AttendanceDay) -> StoreResult<AttendanceDay>,
    {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, DayRow>(&format!(
            "SELECT {DAY_COLUMNS} FROM attendance_days WHERE id = ? FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let current = load_day(&mut tx, row)
            .await?
            .ok_or(AppError::NotFound("Attendance record"))?;

        let mut day = apply(current)?;
        update_day_row(&mut tx, &day).await?;
        save_breaks(&mut tx, &mut day).await?;

        tx.commit().await?;
        Ok(day)
    }
}

/* =========================
Schedule rows
========================= */

const SCHEDULE_COLUMNS: &str = "id, name, description, start_time, end_time, \
     break_duration_minutes, max_break_sessions, late_grace_minutes, \
     early_departure_grace_minutes, monday, tuesday, wednesday, thursday, friday, saturday, \
     sunday, is_active";

#[derive(FromRow)]
struct ScheduleRow {
    id: u64,
    name: String,
    description: String,
    start_time: NaiveTime,
    end_time: NaiveTime,
    break_duration_minutes: u32,
    max_break_sessions: u32,
    late_grace_minutes: u32,
    early_departure_grace_minutes: u32,
    monday: bool,
    tuesday: bool,
    wednesday: bool,
    thursday: bool,
    friday: bool,
    saturday: bool,
    sunday: bool,
    is_active: bool,
}

impl From<ScheduleRow> for WorkSchedule {
    fn from(row: ScheduleRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            start_time: row.start_time,
            end_time: row.end_time,
            break_duration_minutes: row.break_duration_minutes,
            max_break_sessions: row.max_break_sessions,
            late_grace_minutes: row.late_grace_minutes,
            early_departure_grace_minutes: row.early_departure_grace_minutes,
            working_days: [
                row.monday,
                row.tuesday,
                row.wednesday,
                row.thursday,
                row.friday,
                row.saturday,
                row.sunday,
            ],
            is_active: row.is_active,
        }
    }
}

#[derive(FromRow)]
struct BindingRow {
    id: u64,
    employee_id: u64,
    schedule_id: u64,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    custom_start_time: Option<NaiveTime>,
    custom_end_time: Option<NaiveTime>,
    is_active: bool,
}

impl From<BindingRow> for EmployeeSchedule {
    fn from(row: BindingRow) -> Self {
        Self {
            id: row.id,
            employee_id: row.employee_id,
            schedule_id: row.schedule_id,
            start_date: row.start_date,
            end_date: row.end_date,
            custom_start_time: row.custom_start_time,
            custom_end_time: row.custom_end_time,
            is_active: row.is_active,
        }
    }
}

const BINDING_COLUMNS: &str = "id, employee_id, schedule_id, start_date, end_date, \
     custom_start_time, custom_end_time, is_active";

#[derive(FromRow)]
struct PolicyRow {
    id: u64,
    name: String,
    description: String,
    working_hours_per_day: f64,
    late_threshold_minutes: u32,
    early_departure_threshold_minutes: u32,
    is_active: bool,
}

impl From<PolicyRow> for AttendancePolicy {
    fn from(row: PolicyRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            working_hours_per_day: row.working_hours_per_day,
            late_threshold_minutes: row.late_threshold_minutes,
            early_departure_threshold_minutes: row.early_departure_threshold_minutes,
            is_active: row.is_active,
        }
    }
}

const POLICY_COLUMNS: &str = "id, name, description, working_hours_per_day, \
     late_threshold_minutes, early_departure_threshold_minutes, is_active";

#[derive(FromRow)]
struct HolidayRow {
    id: u64,
    name: String,
    date: NaiveDate,
    description: String,
    is_optional: bool,
}

impl From<HolidayRow> for Holiday {
    fn from(row: HolidayRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            date: row.date,
            description: row.description,
            is_optional: row.is_optional,
        }
    }
}

fn name_taken(e: sqlx::Error, what: &str) -> AppError {
    if is_duplicate(&e) {
        AppError::validation(format!("{what} with this name already exists"))
    } else {
        e.into()
    }
}

async fn write_schedule(conn: &mut MySqlConnection, schedule: &WorkSchedule, insert: bool) -> StoreResult<u64> {
    let sql = if insert {
        r#"
        INSERT INTO work_schedules
            (name, description, start_time, end_time, break_duration_minutes, max_break_sessions,
             late_grace_minutes, early_departure_grace_minutes, monday, tuesday, wednesday,
             thursday, friday, saturday, sunday, is_active)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#
    } else {
        r#"
        UPDATE work_schedules
        SET name = ?, description = ?, start_time = ?, end_time = ?, break_duration_minutes = ?,
            max_break_sessions = ?, late_grace_minutes = ?, early_departure_grace_minutes = ?,
            monday = ?, tuesday = ?, wednesday = ?, thursday = ?, friday = ?, saturday = ?,
            sunday = ?, is_active = ?
        WHERE id = ?
        "#
    };

    let mut query = sqlx::query(sql)
        .bind(&schedule.name)
        .bind(&schedule.description)
        .bind(schedule.start_time)
        .bind(schedule.end_time)
        .bind(schedule.break_duration_minutes)
        .bind(schedule.max_break_sessions)
        .bind(schedule.late_grace_minutes)
        .bind(schedule.early_departure_grace_minutes);
    for flag in schedule.working_days {
        query = query.bind(flag);
    }
    query = query.bind(schedule.is_active);
    if !insert {
        query = query.bind(schedule.id);
    }

    let result = query
        .execute(&mut *conn)
        .await
        .map_err(|e| name_taken(e, "Schedule"))?;
    Ok(if insert { result.last_insert_id() } else { schedule.id })
}

impl ScheduleStore for MySqlStore {
    async fn create_schedule(&self, mut schedule: WorkSchedule) -> StoreResult<WorkSchedule> {
        let mut conn = self.pool.acquire().await?;
        schedule.id = write_schedule(&mut conn, &schedule, true).await?;
        Ok(schedule)
    }

    async fn get_schedule(&self, id: u64) -> StoreResult<Option<WorkSchedule>> {
        let row = sqlx::query_as::<_, ScheduleRow>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM work_schedules WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(WorkSchedule::from))
    }

    async fn list_schedules(&self) -> StoreResult<Vec<WorkSchedule>> {
        let rows = sqlx::query_as::<_, ScheduleRow>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM work_schedules ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(WorkSchedule::from).collect())
    }

    async fn update_schedule<F>(&self, id: u64, apply: F) -> StoreResult<WorkSchedule>
    where
        F: FnOnce(&mut WorkSchedule) -> StoreResult<()>,
    {
        let mut tx = self.pool.begin().await?;
        let mut schedule: WorkSchedule = sqlx::query_as::<_, ScheduleRow>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM work_schedules WHERE id = ? FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Work schedule"))?
        .into();

        apply(&mut schedule)?;
        write_schedule(&mut tx, &schedule, false).await?;
        tx.commit().await?;
        Ok(schedule)
    }

    async fn list_bindings(&self, employee_id: Option<u64>) -> StoreResult<Vec<EmployeeSchedule>> {
        let rows = match employee_id {
            Some(employee_id) => {
                sqlx::query_as::<_, BindingRow>(&format!(
                    "SELECT {BINDING_COLUMNS} FROM employee_schedules WHERE employee_id = ? ORDER BY start_date DESC"
                ))
                .bind(employee_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, BindingRow>(&format!(
                    "SELECT {BINDING_COLUMNS} FROM employee_schedules ORDER BY start_date DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.into_iter().map(EmployeeSchedule::from).collect())
    }

    async fn insert_binding<F>(&self, mut binding: EmployeeSchedule, check: F) -> StoreResult<EmployeeSchedule>
    where
        F: FnOnce(&[EmployeeSchedule]) -> StoreResult<()>,
    {
        let mut tx = self.pool.begin().await?;

        let existing: Vec<EmployeeSchedule> = sqlx::query_as::<_, BindingRow>(&format!(
            "SELECT {BINDING_COLUMNS} FROM employee_schedules WHERE employee_id = ? FOR UPDATE"
        ))
        .bind(binding.employee_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(EmployeeSchedule::from)
        .collect();

        check(&existing)?;

        // One row per (employee, start date): a deactivated binding on the
        // same start date is taken over instead of inserted beside.
        if let Some(previous) = existing.iter().find(|b| b.start_date == binding.start_date) {
            if previous.is_active {
                return Err(AppError::ScheduleOverlap(binding.start_date));
            }
            sqlx::query(
                r#"
                UPDATE employee_schedules
                SET schedule_id = ?, end_date = ?, custom_start_time = ?, custom_end_time = ?,
                    is_active = ?
                WHERE id = ?
                "#,
            )
            .bind(binding.schedule_id)
            .bind(binding.end_date)
            .bind(binding.custom_start_time)
            .bind(binding.custom_end_time)
            .bind(binding.is_active)
            .bind(previous.id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            binding.id = previous.id;
            return Ok(binding);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO employee_schedules
                (employee_id, schedule_id, start_date, end_date, custom_start_time,
                 custom_end_time, is_active)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(binding.employee_id)
        .bind(binding.schedule_id)
        .bind(binding.start_date)
        .bind(binding.end_date)
        .bind(binding.custom_start_time)
        .bind(binding.custom_end_time)
        .bind(binding.is_active)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_duplicate(&e) {
                AppError::ScheduleOverlap(binding.start_date)
            } else {
                e.into()
            }
        })?;

        tx.commit().await?;
        binding.id = result.last_insert_id();
        Ok(binding)
    }

    async fn deactivate_binding(&self, id: u64) -> StoreResult<EmployeeSchedule> {
        let mut tx = self.pool.begin().await?;
        let mut binding: EmployeeSchedule = sqlx::query_as::<_, BindingRow>(&format!(
            "SELECT {BINDING_COLUMNS} FROM employee_schedules WHERE id = ? FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Schedule binding"))?
        .into();

        sqlx::query("UPDATE employee_schedules SET is_active = FALSE WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        binding.is_active = false;
        Ok(binding)
    }

    async fn create_policy(&self, mut policy: AttendancePolicy) -> StoreResult<AttendancePolicy> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_policies
                (name, description, working_hours_per_day, late_threshold_minutes,
                 early_departure_threshold_minutes, is_active)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&policy.name)
        .bind(&policy.description)
        .bind(policy.working_hours_per_day)
        .bind(policy.late_threshold_minutes)
        .bind(policy.early_departure_threshold_minutes)
        .bind(policy.is_active)
        .execute(&self.pool)
        .await
        .map_err(|e| name_taken(e, "Policy"))?;

        policy.id = result.last_insert_id();
        Ok(policy)
    }

    async fn list_policies(&self) -> StoreResult<Vec<AttendancePolicy>> {
        let rows = sqlx::query_as::<_, PolicyRow>(&format!(
            "SELECT {POLICY_COLUMNS} FROM attendance_policies ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(AttendancePolicy::from).collect())
    }

    async fn active_policy(&self) -> StoreResult<Option<AttendancePolicy>> {
        let row = sqlx::query_as::<_, PolicyRow>(&format!(
            "SELECT {POLICY_COLUMNS} FROM attendance_policies WHERE is_active = TRUE ORDER BY id DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(AttendancePolicy::from))
    }

    async fn create_holiday(&self, mut holiday: Holiday) -> StoreResult<Holiday> {
        let result = sqlx::query(
            "INSERT INTO holidays (name, date, description, is_optional) VALUES (?, ?, ?, ?)",
        )
        .bind(&holiday.name)
        .bind(holiday.date)
        .bind(&holiday.description)
        .bind(holiday.is_optional)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_duplicate(&e) {
                AppError::validation("Holiday already exists on this date")
            } else {
                e.into()
            }
        })?;

        holiday.id = result.last_insert_id();
        Ok(holiday)
    }

    async fn list_holidays(&self, year: Option<i32>) -> StoreResult<Vec<Holiday>> {
        let rows = match year {
            Some(year) => {
                sqlx::query_as::<_, HolidayRow>(
                    "SELECT id, name, date, description, is_optional FROM holidays WHERE YEAR(date) = ? ORDER BY date",
                )
                .bind(year)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, HolidayRow>(
                    "SELECT id, name, date, description, is_optional FROM holidays ORDER BY date",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.into_iter().map(Holiday::from).collect())
    }

    async fn delete_holiday(&self, id: u64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM holidays WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn is_holiday(&self, date: NaiveDate) -> StoreResult<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM holidays WHERE date = ? AND is_optional = FALSE",
        )
        .bind(date)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }
}

/* =========================
Leave rows
========================= */

#[derive(FromRow)]
struct LeaveTypeRow {
    id: u64,
    name: String,
    description: String,
    max_days_per_year: u32,
    requires_approval: bool,
    advance_notice_days: u32,
    is_active: bool,
}

impl From<LeaveTypeRow> for LeaveType {
    fn from(row: LeaveTypeRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            max_days_per_year: row.max_days_per_year,
            requires_approval: row.requires_approval,
            advance_notice_days: row.advance_notice_days,
            is_active: row.is_active,
        }
    }
}

const LEAVE_TYPE_COLUMNS: &str =
    "id, name, description, max_days_per_year, requires_approval, advance_notice_days, is_active";

const APPLICATION_COLUMNS: &str = "id, employee_id, leave_type_id, start_date, end_date, \
     total_days, reason, priority, contact_number, emergency_contact, status, applied_on, \
     approved_by, approved_on, approval_comments, is_half_day, replacement_employee_id";

#[derive(FromRow)]
struct ApplicationRow {
    id: u64,
    employee_id: u64,
    leave_type_id: u64,
    start_date: NaiveDate,
    end_date: NaiveDate,
    total_days: f64,
    reason: String,
    priority: String,
    contact_number: String,
    emergency_contact: String,
    status: String,
    applied_on: NaiveDateTime,
    approved_by: Option<u64>,
    approved_on: Option<NaiveDateTime>,
    approval_comments: String,
    is_half_day: bool,
    replacement_employee_id: Option<u64>,
}

impl ApplicationRow {
    fn into_application(self) -> StoreResult<LeaveApplication> {
        Ok(LeaveApplication {
            id: self.id,
            employee_id: self.employee_id,
            leave_type_id: self.leave_type_id,
            start_date: self.start_date,
            end_date: self.end_date,
            total_days: self.total_days,
            reason: self.reason,
            priority: parse_enum(&self.priority, "leave priority")?,
            contact_number: self.contact_number,
            emergency_contact: self.emergency_contact,
            status: parse_enum(&self.status, "leave status")?,
            applied_on: self.applied_on,
            approved_by: self.approved_by,
            approved_on: self.approved_on,
            approval_comments: self.approval_comments,
            is_half_day: self.is_half_day,
            replacement_employee_id: self.replacement_employee_id,
        })
    }
}

#[derive(FromRow)]
struct BalanceRow {
    id: u64,
    employee_id: u64,
    leave_type_id: u64,
    year: i32,
    total_allocated: f64,
    used_days: f64,
    pending_days: f64,
}

impl From<BalanceRow> for LeaveBalance {
    fn from(row: BalanceRow) -> Self {
        Self {
            id: row.id,
            employee_id: row.employee_id,
            leave_type_id: row.leave_type_id,
            year: row.year,
            total_allocated: row.total_allocated,
            used_days: row.used_days,
            pending_days: row.pending_days,
        }
    }
}

const BALANCE_COLUMNS: &str =
    "id, employee_id, leave_type_id, year, total_allocated, used_days, pending_days";

#[derive(FromRow)]
struct CommentRow {
    id: u64,
    application_id: u64,
    author_id: u64,
    comment: String,
    is_internal: bool,
    created_at: NaiveDateTime,
}

impl From<CommentRow> for LeaveComment {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            application_id: row.application_id,
            author_id: row.author_id,
            comment: row.comment,
            is_internal: row.is_internal,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct AttachmentRow {
    id: u64,
    application_id: u64,
    file_name: String,
    file_path: String,
    file_size: u64,
    uploaded_by: u64,
    uploaded_at: NaiveDateTime,
}

impl From<AttachmentRow> for LeaveAttachment {
    fn from(row: AttachmentRow) -> Self {
        Self {
            id: row.id,
            application_id: row.application_id,
            file_name: row.file_name,
            file_path: row.file_path,
            file_size: row.file_size,
            uploaded_by: row.uploaded_by,
            uploaded_at: row.uploaded_at,
        }
    }
}

async fn write_leave_type(conn: &mut MySqlConnection, leave_type: &LeaveType, insert: bool) -> StoreResult<u64> {
    let sql = if insert {
        r#"
        INSERT INTO leave_types
            (name, description, max_days_per_year, requires_approval, advance_notice_days, is_active)
        VALUES (?, ?, ?, ?, ?, ?)
        "#
    } else {
        r#"
        UPDATE leave_types
        SET name = ?, description = ?, max_days_per_year = ?, requires_approval = ?,
            advance_notice_days = ?, is_active = ?
        WHERE id = ?
        "#
    };

    let mut query = sqlx::query(sql)
        .bind(&leave_type.name)
        .bind(&leave_type.description)
        .bind(leave_type.max_days_per_year)
        .bind(leave_type.requires_approval)
        .bind(leave_type.advance_notice_days)
        .bind(leave_type.is_active);
    if !insert {
        query = query.bind(leave_type.id);
    }

    let result = query
        .execute(&mut *conn)
        .await
        .map_err(|e| name_taken(e, "Leave type"))?;
    Ok(if insert { result.last_insert_id() } else { leave_type.id })
}

async fn write_application(conn: &mut MySqlConnection, app: &LeaveApplication, insert: bool) -> StoreResult<u64> {
    let sql = if insert {
        r#"
        INSERT INTO leave_applications
            (employee_id, leave_type_id, start_date, end_date, total_days, reason, priority,
             contact_number, emergency_contact, status, applied_on, approved_by, approved_on,
             approval_comments, is_half_day, replacement_employee_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#
    } else {
        r#"
        UPDATE leave_applications
        SET employee_id = ?, leave_type_id = ?, start_date = ?, end_date = ?, total_days = ?,
            reason = ?, priority = ?, contact_number = ?, emergency_contact = ?, status = ?,
            applied_on = ?, approved_by = ?, approved_on = ?, approval_comments = ?,
            is_half_day = ?, replacement_employee_id = ?
        WHERE id = ?
        "#
    };

    let mut query = sqlx::query(sql)
        .bind(app.employee_id)
        .bind(app.leave_type_id)
        .bind(app.start_date)
        .bind(app.end_date)
        .bind(app.total_days)
        .bind(&app.reason)
        .bind(app.priority.to_string())
        .bind(&app.contact_number)
        .bind(&app.emergency_contact)
        .bind(app.status.to_string())
        .bind(app.applied_on)
        .bind(app.approved_by)
        .bind(app.approved_on)
        .bind(&app.approval_comments)
        .bind(app.is_half_day)
        .bind(app.replacement_employee_id);
    if !insert {
        query = query.bind(app.id);
    }

    let result = query.execute(&mut *conn).await?;
    Ok(if insert { result.last_insert_id() } else { app.id })
}

/// Opens the ledger row on first touch, then applies the posting under lock.
async fn post_ledger(conn: &mut MySqlConnection, entry: LedgerEntry) -> StoreResult<LeaveBalance> {
    let leave_type: LeaveType = sqlx::query_as::<_, LeaveTypeRow>(&format!(
        "SELECT {LEAVE_TYPE_COLUMNS} FROM leave_types WHERE id = ?"
    ))
    .bind(entry.leave_type_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Leave type"))?
    .into();

    let opening = LeaveBalance::open(entry.employee_id, &leave_type, entry.year);
    sqlx::query(
        r#"
        INSERT INTO leave_balances
            (employee_id, leave_type_id, year, total_allocated, used_days, pending_days)
        VALUES (?, ?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE id = id
        "#,
    )
    .bind(opening.employee_id)
    .bind(opening.leave_type_id)
    .bind(opening.year)
    .bind(opening.total_allocated)
    .bind(opening.used_days)
    .bind(opening.pending_days)
    .execute(&mut *conn)
    .await?;

    let mut balance: LeaveBalance = sqlx::query_as::<_, BalanceRow>(&format!(
        "SELECT {BALANCE_COLUMNS} FROM leave_balances \
         WHERE employee_id = ? AND leave_type_id = ? AND year = ? FOR UPDATE"
    ))
    .bind(entry.employee_id)
    .bind(entry.leave_type_id)
    .bind(entry.year)
    .fetch_one(&mut *conn)
    .await?
    .into();

    balance.post(entry.posting)?;

    sqlx::query("UPDATE leave_balances SET used_days = ?, pending_days = ? WHERE id = ?")
        .bind(balance.used_days)
        .bind(balance.pending_days)
        .bind(balance.id)
        .execute(&mut *conn)
        .await?;

    Ok(balance)
}

impl LeaveStore for MySqlStore {
    async fn create_leave_type(&self, mut leave_type: LeaveType) -> StoreResult<LeaveType> {
        let mut conn = self.pool.acquire().await?;
        leave_type.id = write_leave_type(&mut conn, &leave_type, true).await?;
        Ok(leave_type)
    }

    async fn get_leave_type(&self, id: u64) -> StoreResult<Option<LeaveType>> {
        let row = sqlx::query_as::<_, LeaveTypeRow>(&format!(
            "SELECT {LEAVE_TYPE_COLUMNS} FROM leave_types WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(LeaveType::from))
    }

    async fn list_leave_types(&self, active_only: bool) -> StoreResult<Vec<LeaveType>> {
        let sql = if active_only {
            format!("SELECT {LEAVE_TYPE_COLUMNS} FROM leave_types WHERE is_active = TRUE ORDER BY name")
        } else {
            format!("SELECT {LEAVE_TYPE_COLUMNS} FROM leave_types ORDER BY name")
        };
        let rows = sqlx::query_as::<_, LeaveTypeRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(LeaveType::from).collect())
    }

    async fn update_leave_type<F>(&self, id: u64, apply: F) -> StoreResult<LeaveType>
    where
        F: FnOnce(&mut LeaveType) -> StoreResult<()>,
    {
        let mut tx = self.pool.begin().await?;
        let mut leave_type: LeaveType = sqlx::query_as::<_, LeaveTypeRow>(&format!(
            "SELECT {LEAVE_TYPE_COLUMNS} FROM leave_types WHERE id = ? FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Leave type"))?
        .into();

        apply(&mut leave_type)?;
        write_leave_type(&mut tx, &leave_type, false).await?;
        tx.commit().await?;
        Ok(leave_type)
    }

    async fn insert_application(
        &self,
        mut application: LeaveApplication,
        ledger: Vec<LedgerEntry>,
    ) -> StoreResult<LeaveApplication> {
        let mut tx = self.pool.begin().await?;
        application.id = write_application(&mut tx, &application, true).await?;
        for entry in ledger {
            post_ledger(&mut tx, entry).await?;
        }
        tx.commit().await?;
        Ok(application)
    }

    async fn get_application(&self, id: u64) -> StoreResult<Option<LeaveApplication>> {
        sqlx::query_as::<_, ApplicationRow>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM leave_applications WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(ApplicationRow::into_application)
        .transpose()
    }

    async fn list_applications(
        &self,
        filter: &LeaveFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<LeaveApplication>, i64)> {
        let mut where_sql = String::from(" WHERE 1=1");
        let mut args: Vec<FilterValue> = Vec::new();

        if let Some(employee_id) = filter.employee_id {
            where_sql.push_str(" AND employee_id = ?");
            args.push(FilterValue::U64(employee_id));
        }
        if let Some(status) = filter.status {
            where_sql.push_str(" AND status = ?");
            args.push(FilterValue::Str(status.to_string()));
        }
        if let Some(leave_type_id) = filter.leave_type_id {
            where_sql.push_str(" AND leave_type_id = ?");
            args.push(FilterValue::U64(leave_type_id));
        }
        if let Some(year) = filter.year {
            where_sql.push_str(" AND YEAR(start_date) = ?");
            args.push(FilterValue::I32(year));
        }

        let count_sql = format!("SELECT COUNT(*) FROM leave_applications{}", where_sql);
        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
        for arg in &args {
            count_q = match arg {
                FilterValue::U64(v) => count_q.bind(*v),
                FilterValue::I32(v) => count_q.bind(*v),
                FilterValue::Str(s) => count_q.bind(s.as_str()),
                FilterValue::Date(d) => count_q.bind(*d),
            };
        }
        let total = count_q.fetch_one(&self.pool).await?;

        let data_sql = format!(
            "SELECT {APPLICATION_COLUMNS} FROM leave_applications{} ORDER BY applied_on DESC LIMIT ? OFFSET ?",
            where_sql
        );
        let mut data_q = sqlx::query_as::<_, ApplicationRow>(&data_sql);
        for arg in &args {
            data_q = match arg {
                FilterValue::U64(v) => data_q.bind(*v),
                FilterValue::I32(v) => data_q.bind(*v),
                FilterValue::Str(s) => data_q.bind(s.as_str()),
                FilterValue::Date(d) => data_q.bind(*d),
            };
        }
        let applications = data_q
            .bind(page.per_page)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(ApplicationRow::into_application)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok((applications, total))
    }

    async fn transition_application<F>(&self, id: u64, apply: F) -> StoreResult<LeaveApplication>
    where
        F: FnOnce(&mut LeaveApplication) -> StoreResult<Vec<LedgerEntry>>,
    {
        let mut tx = self.pool.begin().await?;
        let mut application = sqlx::query_as::<_, ApplicationRow>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM leave_applications WHERE id = ? FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Leave application"))?
        .into_application()?;

        let ledger = apply(&mut application)?;
        write_application(&mut tx, &application, false).await?;
        for entry in ledger {
            post_ledger(&mut tx, entry).await?;
        }

        tx.commit().await?;
        Ok(application)
    }

    async fn list_balances(&self, employee_id: Option<u64>, year: i32) -> StoreResult<Vec<LeaveBalance>> {
        let rows = match employee_id {
            Some(employee_id) => {
                sqlx::query_as::<_, BalanceRow>(&format!(
                    "SELECT {BALANCE_COLUMNS} FROM leave_balances WHERE employee_id = ? AND year = ? ORDER BY leave_type_id"
                ))
                .bind(employee_id)
                .bind(year)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, BalanceRow>(&format!(
                    "SELECT {BALANCE_COLUMNS} FROM leave_balances WHERE year = ? ORDER BY employee_id, leave_type_id"
                ))
                .bind(year)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.into_iter().map(LeaveBalance::from).collect())
    }

    async fn has_approved_leave_on(&self, employee_id: u64, date: NaiveDate) -> StoreResult<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM leave_applications
            WHERE employee_id = ? AND status = 'APPROVED' AND start_date <= ? AND end_date >= ?
            "#,
        )
        .bind(employee_id)
        .bind(date)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn add_comment(&self, mut comment: LeaveComment) -> StoreResult<LeaveComment> {
        let result = sqlx::query(
            r#"
            INSERT INTO leave_comments (application_id, author_id, comment, is_internal, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(comment.application_id)
        .bind(comment.author_id)
        .bind(&comment.comment)
        .bind(comment.is_internal)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await?;

        comment.id = result.last_insert_id();
        Ok(comment)
    }

    async fn list_comments(&self, application_id: u64) -> StoreResult<Vec<LeaveComment>> {
        let rows = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT id, application_id, author_id, comment, is_internal, created_at
            FROM leave_comments
            WHERE application_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(application_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(LeaveComment::from).collect())
    }

    async fn add_attachment(&self, mut attachment: LeaveAttachment) -> StoreResult<LeaveAttachment> {
        let result = sqlx::query(
            r#"
            INSERT INTO leave_attachments
                (application_id, file_name, file_path, file_size, uploaded_by, uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(attachment.application_id)
        .bind(&attachment.file_name)
        .bind(&attachment.file_path)
        .bind(attachment.file_size)
        .bind(attachment.uploaded_by)
        .bind(attachment.uploaded_at)
        .execute(&self.pool)
        .await?;

        attachment.id = result.last_insert_id();
        Ok(attachment)
    }

    async fn list_attachments(&self, application_id: u64) -> StoreResult<Vec<LeaveAttachment>> {
        let rows = sqlx::query_as::<_, AttachmentRow>(
            r#"
            SELECT id, application_id, file_name, file_path, file_size, uploaded_by, uploaded_at
            FROM leave_attachments
            WHERE application_id = ?
            ORDER BY uploaded_at DESC
            "#,
        )
        .bind(application_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(LeaveAttachment::from).collect())
    }
}

/* =========================
Directory
========================= */

const EMPLOYEE_COLUMNS: &str = "id, employee_code, first_name, last_name, email, phone, \
     department_id, position_id, hire_date, status";

async fn write_employee(conn: &mut MySqlConnection, employee: &Employee, insert: bool) -> StoreResult<u64> {
    let sql = if insert {
        r#"
        INSERT INTO employees
            (employee_code, first_name, last_name, email, phone, department_id, position_id,
             hire_date, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#
    } else {
        r#"
        UPDATE employees
        SET employee_code = ?, first_name = ?, last_name = ?, email = ?, phone = ?,
            department_id = ?, position_id = ?, hire_date = ?, status = ?
        WHERE id = ?
        "#
    };

    let mut query = sqlx::query(sql)
        .bind(&employee.employee_code)
        .bind(&employee.first_name)
        .bind(&employee.last_name)
        .bind(&employee.email)
        .bind(&employee.phone)
        .bind(employee.department_id)
        .bind(employee.position_id)
        .bind(employee.hire_date)
        .bind(&employee.status);
    if !insert {
        query = query.bind(employee.id);
    }

    let result = query.execute(&mut *conn).await.map_err(|e| {
        if is_duplicate(&e) {
            AppError::validation("Employee code or email already exists")
        } else {
            e.into()
        }
    })?;
    Ok(if insert { result.last_insert_id() } else { employee.id })
}

impl DirectoryStore for MySqlStore {
    async fn create_employee(&self, mut employee: Employee, account: NewAccount) -> StoreResult<Employee> {
        let mut tx = self.pool.begin().await?;
        employee.id = write_employee(&mut tx, &employee, true).await?;

        sqlx::query(
            r#"
            INSERT INTO users (username, password, role_id, employee_id, must_change_password)
            VALUES (?, ?, ?, ?, TRUE)
            "#,
        )
        .bind(&account.username)
        .bind(&account.password_hash)
        .bind(account.role_id)
        .bind(employee.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_duplicate(&e) {
                AppError::validation("Username already exists")
            } else {
                e.into()
            }
        })?;

        tx.commit().await?;
        Ok(employee)
    }

    async fn get_employee(&self, id: u64) -> StoreResult<Option<Employee>> {
        let employee = sqlx::query_as::<_, Employee>(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(employee)
    }

    async fn list_employees(
        &self,
        filter: &EmployeeFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Employee>, i64)> {
        let mut where_sql = String::from(" WHERE 1=1");
        let mut args: Vec<FilterValue> = Vec::new();

        if let Some(department_id) = filter.department_id {
            where_sql.push_str(" AND department_id = ?");
            args.push(FilterValue::U64(department_id));
        }
        if let Some(position_id) = filter.position_id {
            where_sql.push_str(" AND position_id = ?");
            args.push(FilterValue::U64(position_id));
        }
        if let Some(status) = &filter.status {
            where_sql.push_str(" AND status = ?");
            args.push(FilterValue::Str(status.clone()));
        }
        if let Some(search) = &filter.search {
            where_sql.push_str(" AND (first_name LIKE ? OR last_name LIKE ? OR email LIKE ?)");
            let like = format!("%{}%", search);
            args.push(FilterValue::Str(like.clone()));
            args.push(FilterValue::Str(like.clone()));
            args.push(FilterValue::Str(like));
        }

        let count_sql = format!("SELECT COUNT(*) FROM employees{}", where_sql);
        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
        for arg in &args {
            count_q = match arg {
                FilterValue::U64(v) => count_q.bind(*v),
                FilterValue::I32(v) => count_q.bind(*v),
                FilterValue::Str(s) => count_q.bind(s.as_str()),
                FilterValue::Date(d) => count_q.bind(*d),
            };
        }
        let total = count_q.fetch_one(&self.pool).await?;

        let data_sql = format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees{} ORDER BY id DESC LIMIT ? OFFSET ?",
            where_sql
        );
        let mut data_q = sqlx::query_as::<_, Employee>(&data_sql);
        for arg in &args {
            data_q = match arg {
                FilterValue::U64(v) => data_q.bind(*v),
                FilterValue::I32(v) => data_q.bind(*v),
                FilterValue::Str(s) => data_q.bind(s.as_str()),
                FilterValue::Date(d) => data_q.bind(*d),
            };
        }
        let employees = data_q
            .bind(page.per_page)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok((employees, total))
    }

    async fn update_employee<F>(&self, id: u64, apply: F) -> StoreResult<Employee>
    where
        F: FnOnce(&mut Employee) -> StoreResult<()>,
    {
        let mut tx = self.pool.begin().await?;
        let mut employee = sqlx::query_as::<_, Employee>(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ? FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Employee"))?;

        apply(&mut employee)?;
        write_employee(&mut tx, &employee, false).await?;
        tx.commit().await?;
        Ok(employee)
    }

    async fn employee_email(&self, employee_id: u64) -> StoreResult<Option<String>> {
        let email = sqlx::query_scalar::<_, String>("SELECT email FROM employees WHERE id = ?")
            .bind(employee_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(email)
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    use sqlx::error::{DatabaseError, ErrorKind};

    use super::*;

    #[derive(Debug)]
    struct ServerError {
        sqlstate: &'static str,
        kind: ErrorKind,
    }

    impl fmt::Display for ServerError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "server error {}", self.sqlstate)
        }
    }

    impl StdError for ServerError {}

    impl DatabaseError for ServerError {
        fn message(&self) -> &str {
            "server error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.sqlstate))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            match &self.kind {
                ErrorKind::UniqueViolation => ErrorKind::UniqueViolation,
                ErrorKind::ForeignKeyViolation => ErrorKind::ForeignKeyViolation,
                _ => ErrorKind::Other,
            }
        }
    }

    fn server_error(sqlstate: &'static str, kind: ErrorKind) -> sqlx::Error {
        sqlx::Error::Database(Box::new(ServerError { sqlstate, kind }))
    }

    #[test]
    fn only_unique_violations_count_as_duplicates() {
        assert!(is_duplicate(&server_error("23000", ErrorKind::UniqueViolation)));
        assert!(!is_duplicate(&server_error("23000", ErrorKind::ForeignKeyViolation)));
        assert!(!is_duplicate(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn deadlocks_are_detected_by_sqlstate() {
        assert!(is_deadlock(&server_error("40001", ErrorKind::Other)));
        assert!(!is_deadlock(&server_error("23000", ErrorKind::UniqueViolation)));
        assert!(!is_deadlock(&sqlx::Error::PoolTimedOut));
    }

    #[test]
    fn racing_day_writes_are_replayed() {
        let deadlock = DayWriteError::from(server_error("40001", ErrorKind::Other));
        assert!(matches!(deadlock, DayWriteError::Contended(_)));

        let duplicate = DayWriteError::from(server_error("23000", ErrorKind::UniqueViolation));
        assert!(matches!(duplicate, DayWriteError::Contended(_)));

        let missing_employee = DayWriteError::from(server_error("23000", ErrorKind::ForeignKeyViolation));
        assert!(matches!(
            AppError::from(missing_employee),
            AppError::Storage(_)
        ));
    }

    #[test]
    fn duplicate_after_replay_means_already_checked_in() {
        let duplicate = DayWriteError::from(server_error("23000", ErrorKind::UniqueViolation));
        assert!(matches!(AppError::from(duplicate), AppError::AlreadyCheckedIn));

        let deadlock = DayWriteError::from(server_error("40001", ErrorKind::Other));
        assert!(matches!(AppError::from(deadlock), AppError::Storage(_)));
    }
}
