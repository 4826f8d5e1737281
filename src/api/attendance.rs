use actix_web::{HttpResponse, web};

use crate::api::{AppServices, now, optional_json};
use crate::auth::auth::AuthUser;
use crate::error::AppError;
use crate::model::attendance::AttendanceCorrection;
use crate::service::attendance::{BreakRequest, ClockRequest, SeedDayRequest};
use crate::store::AttendanceFilter;

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    request_body(content = ClockRequest, description = "Optional location and coordinates"),
    responses(
        (status = 200, description = "Checked in successfully", body = AttendanceDay),
        (status = 400, description = "Location outside the geofence", body = Object, example = json!({
            "error": "InvalidLocation",
            "message": "You are 420 meters away from the office. Must be within 100 meters."
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Account has no employee profile"),
        (status = 409, description = "Already checked in today", body = Object, example = json!({
            "error": "AlreadyCheckedIn",
            "message": "Already checked in today"
        })),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_in(
    auth: AuthUser,
    services: AppServices,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let request: ClockRequest = optional_json(&body)?;
    let day = services.check_in(&auth, request, now()).await?;
    Ok(HttpResponse::Ok().json(day))
}

/// Check-out endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-out",
    request_body(content = ClockRequest, description = "Optional location and coordinates"),
    responses(
        (status = 200, description = "Checked out, hours computed", body = AttendanceDay),
        (status = 400, description = "No active check-in found for today", body = Object, example = json!({
            "error": "NotCheckedIn",
            "message": "No active check-in found for today"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Already checked out today"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_out(
    auth: AuthUser,
    services: AppServices,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let request: ClockRequest = optional_json(&body)?;
    let day = services.check_out(&auth, request, now()).await?;
    Ok(HttpResponse::Ok().json(day))
}

#[utoipa::path(
    post,
    path = "/api/attendance/break/start",
    request_body = BreakRequest,
    responses(
        (status = 200, description = "Break opened", body = AttendanceDay),
        (status = 400, description = "Not checked in, or already checked out"),
        (status = 409, description = "A break is already open")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn start_break(
    auth: AuthUser,
    services: AppServices,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let request: BreakRequest = optional_json(&body)?;
    let day = services.start_break(&auth, request, now()).await?;
    Ok(HttpResponse::Ok().json(day))
}

#[utoipa::path(
    post,
    path = "/api/attendance/break/end",
    responses(
        (status = 200, description = "Break closed", body = AttendanceDay),
        (status = 400, description = "No ongoing break found", body = Object, example = json!({
            "error": "NoOpenBreak",
            "message": "No ongoing break found"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn end_break(auth: AuthUser, services: AppServices) -> Result<HttpResponse, AppError> {
    let day = services.end_break(&auth, now()).await?;
    Ok(HttpResponse::Ok().json(day))
}

/// Today's record of the caller, `null` before the first check-in.
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses(
        (status = 200, description = "Today's attendance, or null", body = AttendanceDay),
        (status = 403, description = "Account has no employee profile")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn today(auth: AuthUser, services: AppServices) -> Result<HttpResponse, AppError> {
    let day = services.today(&auth, now().date()).await?;
    Ok(HttpResponse::Ok().json(day))
}

#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceFilter),
    responses(
        (status = 200, description = "Paginated attendance records", body = AttendancePage),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn list_attendance(
    auth: AuthUser,
    services: AppServices,
    query: web::Query<AttendanceFilter>,
) -> Result<HttpResponse, AppError> {
    let page = services.list_days(&auth, query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/attendance/{id}",
    params(("id" = u64, Path, description = "Attendance record ID")),
    responses(
        (status = 200, description = "Attendance record", body = AttendanceDay),
        (status = 404, description = "Not found or not visible to the caller")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn get_attendance(
    auth: AuthUser,
    services: AppServices,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    let day = services.get_day(&auth, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(day))
}

/// HR correction of a recorded day
#[utoipa::path(
    put,
    path = "/api/attendance/{id}",
    params(("id" = u64, Path, description = "Attendance record ID")),
    request_body = AttendanceCorrection,
    responses(
        (status = 200, description = "Corrected and recomputed", body = AttendanceDay),
        (status = 400, description = "Check-out before check-in"),
        (status = 403, description = "HR only"),
        (status = 404, description = "Attendance record not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn correct_attendance(
    auth: AuthUser,
    services: AppServices,
    path: web::Path<u64>,
    payload: web::Json<AttendanceCorrection>,
) -> Result<HttpResponse, AppError> {
    let day = services
        .correct_day(&auth, path.into_inner(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(day))
}

/// Pre-seed a day as HOLIDAY, ON_LEAVE or ABSENT
#[utoipa::path(
    post,
    path = "/api/attendance/seed",
    request_body = SeedDayRequest,
    responses(
        (status = 200, description = "Seeded or existing record", body = AttendanceDay),
        (status = 403, description = "HR only"),
        (status = 404, description = "Employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn seed_attendance(
    auth: AuthUser,
    services: AppServices,
    payload: web::Json<SeedDayRequest>,
) -> Result<HttpResponse, AppError> {
    let day = services.seed_day(&auth, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(day))
}
