use actix_web::web;
use chrono::{Local, NaiveDateTime};
use serde::de::DeserializeOwned;

use crate::error::AppError;
use crate::service::Services;
use crate::store::mysql::MySqlStore;

pub mod attendance;
pub mod employee;
pub mod leave;
pub mod schedule;

pub type AppServices = web::Data<Services<MySqlStore>>;

/// Wall-clock time of the server, which is the time attendance is
/// recorded in.
pub(crate) fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Body of an endpoint whose payload may be left out. An empty body is the
/// default value; anything else must be valid JSON for `T`.
pub(crate) fn optional_json<T>(body: &web::Bytes) -> Result<T, AppError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::validation(format!("Invalid request body: {e}")))
}

#[cfg(test)]
mod tests {
    use actix_web::{App, HttpResponse, http::StatusCode, test};

    use super::*;
    use crate::model::attendance::BreakType;
    use crate::service::attendance::{BreakRequest, ClockRequest};

    async fn clock(body: web::Bytes) -> Result<HttpResponse, AppError> {
        let request: ClockRequest = optional_json(&body)?;
        Ok(HttpResponse::Ok().body(format!("{:?}", request.latitude)))
    }

    #[actix_web::test]
    async fn malformed_clock_body_is_a_bad_request() {
        let app = test::init_service(App::new().route("/clock", web::post().to(clock))).await;

        let req = test::TestRequest::post()
            .uri("/clock")
            .insert_header(("content-type", "application/json"))
            .set_payload(r#"{"latitude": 123.0, "longitude": "90.4"}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post().uri("/clock").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, "None");

        let req = test::TestRequest::post()
            .uri("/clock")
            .insert_header(("content-type", "application/json"))
            .set_payload(r#"{"latitude": 23.81, "longitude": 90.41}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(test::read_body(resp).await, "Some(23.81)");
    }

    #[::core::prelude::v1::test]
    fn unknown_break_type_is_rejected() {
        let body = web::Bytes::from_static(br#"{"break_type": "LUNCHH"}"#);
        assert!(matches!(
            optional_json::<BreakRequest>(&body),
            Err(AppError::Validation(_))
        ));

        let body = web::Bytes::from_static(br#"{"break_type": "LUNCH"}"#);
        assert_eq!(optional_json::<BreakRequest>(&body).unwrap().break_type, BreakType::Lunch);

        let empty = web::Bytes::from_static(b"  \n");
        assert_eq!(optional_json::<BreakRequest>(&empty).unwrap().break_type, BreakType::Other);
    }
}
