#![forbid(unsafe_code)]

use std::sync::Arc;

use log::error;
use poem_openapi::{ OpenApi, payload::Json, Object, ApiResponse };

use crate::utils::date_service::DateService;
use crate::utils::dates_utils::timestamp_str;
use crate::utils::errors::HttpResult;

// ***************************************************************************
//                          Request/Response Definiions
// ***************************************************************************
pub struct HealthApi {
    service: Arc<DateService>,
}

impl HealthApi {
    pub fn new(service: Arc<DateService>) -> Self {
        Self { service }
    }
}

#[derive(Object, Debug)]
struct RespHealth
{
    result_code: String,
    result_msg: String,
    engine: String,
    engine_available: bool,
    engine_busy: bool,
    checked_at: String,
}

#[derive(Debug, ApiResponse)]
enum HealthResponse {
    #[oai(status = 200)]
    Http200(Json<RespHealth>),
    #[oai(status = 500)]
    Http500(Json<HttpResult>),
}

// ***************************************************************************
//                             OpenAPI Endpoint
// ***************************************************************************
#[OpenApi]
impl HealthApi {
    /// Report whether the OCR engine can be invoked.
    #[oai(path = "/dates/health", method = "get")]
    async fn get_health(&self) -> HealthResponse {
        match self.service.health().await {
            Ok(h) => {
                let msg = if h.available {"success"} else {"OCR engine unavailable"};
                HealthResponse::Http200(Json(RespHealth {
                    result_code: "0".to_string(),
                    result_msg: msg.to_string(),
                    engine: h.engine,
                    engine_available: h.available,
                    engine_busy: h.busy,
                    checked_at: timestamp_str(),
                }))
            },
            Err(e) => {
                let msg = "ERROR: ".to_owned() + e.to_string().as_str();
                error!("{}", msg);
                HealthResponse::Http500(Json(HttpResult::new(500.to_string(), msg)))
            }
        }
    }
}

// ***************************************************************************
//                                  Tests
// ***************************************************************************
#[cfg(test)]
mod tests {
    use super::*;
    use poem::test::TestClient;
    use poem::Route;
    use poem_openapi::OpenApiService;
    use serde_json::Value;

    use crate::utils::date_service::tests::service_with;
    use crate::utils::ocr::testing::FixedEngine;

    #[tokio::test]
    async fn reports_engine_state() {
        let api = HealthApi::new(Arc::new(service_with(FixedEngine::with_fragments(&[]))));
        let cli = TestClient::new(Route::new().nest("/v1", OpenApiService::new(api, "Dates Server", "test")));
        let resp = cli.get("/v1/dates/health").send().await;
        resp.assert_status_is_ok();
        let text = resp.0.into_body().into_string().await.unwrap();
        let body: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(body["engine"], "fixed");
        assert_eq!(body["engine_available"], true);
        assert_eq!(body["engine_busy"], false);
    }
}
