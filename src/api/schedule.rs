use actix_web::{HttpResponse, web};

use crate::api::AppServices;
use crate::auth::auth::AuthUser;
use crate::error::AppError;
use crate::service::schedule::{
    AssignSchedule, BindingQuery, HolidayForm, HolidayQuery, PolicyForm, ScheduleForm,
    UpdateSchedule,
};

#[utoipa::path(
    post,
    path = "/api/schedules",
    request_body = ScheduleForm,
    responses(
        (status = 201, description = "Schedule created", body = WorkSchedule),
        (status = 400, description = "Invalid schedule or name taken"),
        (status = 403, description = "HR only")
    ),
    security(("bearer_auth" = [])),
    tag = "Schedule"
)]
pub async fn create_schedule(
    auth: AuthUser,
    services: AppServices,
    payload: web::Json<ScheduleForm>,
) -> Result<HttpResponse, AppError> {
    let schedule = services.create_schedule(&auth, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(schedule))
}

#[utoipa::path(
    get,
    path = "/api/schedules",
    responses((status = 200, description = "All work schedules", body = Vec<WorkSchedule>)),
    security(("bearer_auth" = [])),
    tag = "Schedule"
)]
pub async fn list_schedules(_auth: AuthUser, services: AppServices) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(services.list_schedules().await?))
}

#[utoipa::path(
    put,
    path = "/api/schedules/{id}",
    params(("id" = u64, Path, description = "Schedule ID")),
    request_body = UpdateSchedule,
    responses(
        (status = 200, description = "Schedule updated", body = WorkSchedule),
        (status = 403, description = "HR only"),
        (status = 404, description = "Schedule not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Schedule"
)]
pub async fn update_schedule(
    auth: AuthUser,
    services: AppServices,
    path: web::Path<u64>,
    payload: web::Json<UpdateSchedule>,
) -> Result<HttpResponse, AppError> {
    let schedule = services
        .update_schedule(&auth, path.into_inner(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(schedule))
}

/// Bind an employee to a schedule for a date range
#[utoipa::path(
    post,
    path = "/api/schedules/assignments",
    request_body = AssignSchedule,
    responses(
        (status = 201, description = "Binding created", body = EmployeeSchedule),
        (status = 400, description = "End date before start date"),
        (status = 404, description = "Employee or schedule not found"),
        (status = 409, description = "Overlaps an active binding", body = Object, example = json!({
            "error": "ScheduleOverlap",
            "message": "Schedule binding overlaps an active binding from 2026-01-01"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Schedule"
)]
pub async fn assign_schedule(
    auth: AuthUser,
    services: AppServices,
    payload: web::Json<AssignSchedule>,
) -> Result<HttpResponse, AppError> {
    let binding = services.assign_schedule(&auth, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(binding))
}

#[utoipa::path(
    get,
    path = "/api/schedules/assignments",
    params(BindingQuery),
    responses((status = 200, description = "Schedule bindings, latest first", body = Vec<EmployeeSchedule>)),
    security(("bearer_auth" = [])),
    tag = "Schedule"
)]
pub async fn list_assignments(
    auth: AuthUser,
    services: AppServices,
    query: web::Query<BindingQuery>,
) -> Result<HttpResponse, AppError> {
    let bindings = services.list_bindings(&auth, query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(bindings))
}

#[utoipa::path(
    put,
    path = "/api/schedules/assignments/{id}/deactivate",
    params(("id" = u64, Path, description = "Binding ID")),
    responses(
        (status = 200, description = "Binding deactivated", body = EmployeeSchedule),
        (status = 404, description = "Binding not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Schedule"
)]
pub async fn deactivate_assignment(
    auth: AuthUser,
    services: AppServices,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    let binding = services.deactivate_binding(&auth, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(binding))
}

#[utoipa::path(
    post,
    path = "/api/policies",
    request_body = PolicyForm,
    responses(
        (status = 201, description = "Policy created", body = AttendancePolicy),
        (status = 403, description = "HR only")
    ),
    security(("bearer_auth" = [])),
    tag = "Schedule"
)]
pub async fn create_policy(
    auth: AuthUser,
    services: AppServices,
    payload: web::Json<PolicyForm>,
) -> Result<HttpResponse, AppError> {
    let policy = services.create_policy(&auth, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(policy))
}

#[utoipa::path(
    get,
    path = "/api/policies",
    responses((status = 200, description = "Attendance policies", body = Vec<AttendancePolicy>)),
    security(("bearer_auth" = [])),
    tag = "Schedule"
)]
pub async fn list_policies(_auth: AuthUser, services: AppServices) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(services.list_policies().await?))
}

#[utoipa::path(
    post,
    path = "/api/holidays",
    request_body = HolidayForm,
    responses(
        (status = 201, description = "Holiday created", body = Holiday),
        (status = 400, description = "Same holiday already on that date"),
        (status = 403, description = "HR only")
    ),
    security(("bearer_auth" = [])),
    tag = "Schedule"
)]
pub async fn create_holiday(
    auth: AuthUser,
    services: AppServices,
    payload: web::Json<HolidayForm>,
) -> Result<HttpResponse, AppError> {
    let holiday = services.create_holiday(&auth, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(holiday))
}

#[utoipa::path(
    get,
    path = "/api/holidays",
    params(HolidayQuery),
    responses((status = 200, description = "Holidays by date", body = Vec<Holiday>)),
    security(("bearer_auth" = [])),
    tag = "Schedule"
)]
pub async fn list_holidays(
    _auth: AuthUser,
    services: AppServices,
    query: web::Query<HolidayQuery>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(services.list_holidays(query.into_inner()).await?))
}

#[utoipa::path(
    delete,
    path = "/api/holidays/{id}",
    params(("id" = u64, Path, description = "Holiday ID")),
    responses(
        (status = 204, description = "Holiday deleted"),
        (status = 404, description = "Holiday not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Schedule"
)]
pub async fn delete_holiday(
    auth: AuthUser,
    services: AppServices,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    services.delete_holiday(&auth, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
