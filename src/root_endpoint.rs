#![forbid(unsafe_code)]

//! The `POST /` contract: `{"file_path": ...}` in, `{"dates": [...]}` or
//! `{"error": "..."}` out.
//!
//! The body is read raw so that malformed JSON still gets the `error` shape
//! instead of the framework's own rejection.

use std::sync::Arc;

use log::{error, info};
use poem::http::StatusCode;
use poem::web::{Data, Json};
use poem::{handler, IntoResponse, Request, Response};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::date_service::DateService;
use crate::utils::dates_utils::{debug_request, RequestDebug};
use crate::utils::errors::DateError;

// ***************************************************************************
//                                  State
// ***************************************************************************
#[derive(Clone)]
pub struct RootState {
    service: Arc<DateService>,
    strict_status_codes: bool,
}

impl RootState {
    pub fn new(service: Arc<DateService>, strict_status_codes: bool) -> Self {
        Self { service, strict_status_codes }
    }
}

// ***************************************************************************
//                           Request/Response Bodies
// ***************************************************************************
#[derive(Deserialize, Debug)]
struct ReqExtract {
    #[serde(default)]
    file_path: Option<String>,
}

impl RequestDebug for ReqExtract {
    type Req = ReqExtract;
    fn get_request_info(&self) -> String {
        format!("  Request body:\n    file_path: {:?}", self.file_path)
    }
}

#[derive(Serialize, Debug)]
struct RespDates {
    dates: Vec<String>,
}

#[derive(Serialize, Debug)]
struct RespError {
    error: String,
}

// ***************************************************************************
//                                 Endpoint
// ***************************************************************************
#[handler]
pub async fn extract_dates_root(http_req: &Request, body: Vec<u8>, state: Data<&RootState>) -> Response {
    let request_id = Uuid::new_v4();
    let result = match parse_request(&body) {
        Ok(req) => {
            debug_request(http_req, &req);
            state.service.extract_from_path(req.file_path).await
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(dates) => {
            info!("[{}] found {} date(s)", request_id, dates.len());
            Json(RespDates { dates }).into_response()
        },
        Err(e) => {
            error!("[{}] {}", request_id, e);
            let status = if state.strict_status_codes {e.status()} else {StatusCode::OK};
            Json(RespError { error: e.to_string() }).with_status(status).into_response()
        },
    }
}

fn parse_request(body: &[u8]) -> Result<ReqExtract, DateError> {
    serde_json::from_slice(body).map_err(|e| DateError::MalformedRequest(e.to_string()))
}
