#![forbid(unsafe_code)]

use log::error;
use poem_openapi::{payload::Json, ApiResponse, Object};

use crate::utils::date_service::DateService;
use crate::utils::errors::{DateError, HttpResult};

pub mod extract_dates;
pub mod health;
pub mod upload_dates;
pub mod version;

// ***************************************************************************
//                       Shared Extraction Response
// ***************************************************************************
#[derive(Object, Debug)]
pub struct RespExtractDates
{
    result_code: String,
    result_msg: String,
    /// Date-shaped tokens in order of appearance.
    dates: Vec<String>,
    /// The tokens that are real dd.mm.yy dates, as YYYY-MM-DD, ascending.
    calendar_dates: Vec<String>,
}

impl RespExtractDates {
    fn new(dates: Vec<String>, calendar_dates: Vec<String>) -> Self {
        Self {result_code: "0".to_string(), result_msg: "success".to_string(),
              dates, calendar_dates}
    }
}

// ------------------- HTTP Status Codes -------------------
#[derive(Debug, ApiResponse)]
pub enum DatesResponse {
    #[oai(status = 200)]
    Http200(Json<RespExtractDates>),
    #[oai(status = 400)]
    Http400(Json<HttpResult>),
    #[oai(status = 404)]
    Http404(Json<HttpResult>),
    #[oai(status = 413)]
    Http413(Json<HttpResult>),
    #[oai(status = 500)]
    Http500(Json<HttpResult>),
    #[oai(status = 502)]
    Http502(Json<HttpResult>),
}

fn make_http_200(resp: RespExtractDates) -> DatesResponse {
    DatesResponse::Http200(Json(resp))
}

// ---------------------------------------------------------------------------
// make_http_error:
// ---------------------------------------------------------------------------
/** Log the failure and wrap it in the response variant for its status. */
fn make_http_error(e: DateError) -> DatesResponse {
    let code = e.status().as_u16();
    let msg = "ERROR: ".to_owned() + e.to_string().as_str();
    error!("{}", msg);
    let body = Json(HttpResult::new(code.to_string(), msg));
    match e {
        DateError::MalformedRequest(_) => DatesResponse::Http400(body),
        DateError::FileNotFound(_) => DatesResponse::Http404(body),
        DateError::PayloadTooLarge { .. } => DatesResponse::Http413(body),
        DateError::Ocr(_) => DatesResponse::Http502(body),
        DateError::Internal(_) => DatesResponse::Http500(body),
    }
}

// ---------------------------------------------------------------------------
// make_dates_response:
// ---------------------------------------------------------------------------
/** Build the v1 response for an extraction outcome. */
pub fn make_dates_response(service: &DateService, result: Result<Vec<String>, DateError>) -> DatesResponse {
    match result {
        Ok(dates) => {
            let calendar_dates = service.extractor()
                .to_calendar_dates(&dates)
                .iter()
                .map(|d| d.format("%Y-%m-%d").to_string())
                .collect();
            make_http_200(RespExtractDates::new(dates, calendar_dates))
        },
        Err(e) => make_http_error(e),
    }
}
