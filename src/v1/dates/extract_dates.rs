#![forbid(unsafe_code)]

use std::sync::Arc;

use log::info;
use poem::Request;
use poem_openapi::{ OpenApi, payload::Json, Object };

use crate::utils::date_service::DateService;
use crate::utils::dates_utils::{self, RequestDebug};
use crate::v1::dates::{make_dates_response, DatesResponse};

// ***************************************************************************
//                          Request/Response Definiions
// ***************************************************************************
pub struct ExtractDatesApi {
    service: Arc<DateService>,
}

impl ExtractDatesApi {
    pub fn new(service: Arc<DateService>) -> Self {
        Self { service }
    }
}

#[derive(Object, Debug)]
struct ReqExtractDates
{
    file_path: String,
}

// Implement the debug record trait for logging.
impl RequestDebug for ReqExtractDates {
    type Req = ReqExtractDates;
    fn get_request_info(&self) -> String {
        let mut s = String::with_capacity(255);
        s.push_str("  Request body:");
        s.push_str("\n    file_path: ");
        s.push_str(&self.file_path);
        s
    }
}

// ***************************************************************************
//                             OpenAPI Endpoint
// ***************************************************************************
#[OpenApi]
impl ExtractDatesApi {
    #[oai(path = "/dates/extract", method = "post")]
    async fn extract_dates_api(&self, http_req: &Request, req: Json<ReqExtractDates>) -> DatesResponse {
        // Conditional logging depending on log level.
        dates_utils::debug_request(http_req, &req.0);

        let result = self.service.extract_from_path(Some(req.0.file_path.clone())).await;
        if let Ok(dates) = &result {
            info!("Found {} date(s) in {}", dates.len(), req.0.file_path);
        }
        make_dates_response(&self.service, result)
    }
}

// ***************************************************************************
//                                  Tests
// ***************************************************************************
#[cfg(test)]
mod tests {
    use super::*;
    use poem::http::StatusCode;
    use poem::test::TestClient;
    use poem::Route;
    use poem_openapi::OpenApiService;
    use serde_json::{json, Value};

    use crate::utils::date_service::tests::{service_with, EXISTING_FILE};
    use crate::utils::ocr::testing::FixedEngine;

    fn app(engine: FixedEngine) -> Route {
        let api = ExtractDatesApi::new(Arc::new(service_with(engine)));
        Route::new().nest("/v1", OpenApiService::new(api, "Dates Server", "test"))
    }

    async fn post(app: Route, body: Value) -> (StatusCode, Value) {
        let cli = TestClient::new(app);
        let resp = cli.post("/v1/dates/extract").body_json(&body).send().await;
        let status = resp.0.status();
        let text = resp.0.into_body().into_string().await.unwrap();
        (status, serde_json::from_str(&text).unwrap())
    }

    #[tokio::test]
    async fn returns_tokens_and_calendar_dates() {
        let engine = FixedEngine::with_fragments(&["изготовлено 24.09.22", "годен до 15.09.22 99.99.99"]);
        let (status, body) = post(app(engine), json!({"file_path": EXISTING_FILE})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result_code"], "0");
        assert_eq!(body["dates"], json!(["24.09.22", "15.09.22", "99.99.99"]));
        assert_eq!(body["calendar_dates"], json!(["2022-09-15", "2022-09-24"]));
    }

    #[tokio::test]
    async fn missing_file_is_404() {
        let engine = FixedEngine::with_fragments(&[]);
        let (status, body) = post(app(engine), json!({"file_path": "/nonexistent/label.png"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["result_code"], "404");
        assert!(body["result_msg"].as_str().unwrap().contains("/nonexistent/label.png"));
    }

    #[tokio::test]
    async fn engine_failure_is_502() {
        let engine = FixedEngine::failing("no rus.traineddata");
        let (status, body) = post(app(engine), json!({"file_path": EXISTING_FILE})).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["result_code"], "502");
    }
}
