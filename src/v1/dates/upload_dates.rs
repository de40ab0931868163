#![forbid(unsafe_code)]

use std::sync::Arc;

use log::info;
use poem::http::header;
use poem::{Body, Request};
use poem_openapi::{ OpenApi, payload::Binary };
use tokio::io::AsyncReadExt;

use crate::utils::date_service::DateService;
use crate::utils::dates_utils::{self, RequestDebug};
use crate::utils::errors::DateError;
use crate::v1::dates::{make_dates_response, DatesResponse};

// ***************************************************************************
//                          Request/Response Definiions
// ***************************************************************************
pub struct UploadDatesApi {
    service: Arc<DateService>,
}

impl UploadDatesApi {
    pub fn new(service: Arc<DateService>) -> Self {
        Self { service }
    }
}

struct ReqUploadDates
{
    declared_size: Option<usize>,
}

impl RequestDebug for ReqUploadDates {
    type Req = ReqUploadDates;
    fn get_request_info(&self) -> String {
        match self.declared_size {
            Some(n) => format!("  Request body: {} bytes of image data", n),
            None => "  Request body: image data of undeclared length".to_string(),
        }
    }
}

// ***************************************************************************
//                             OpenAPI Endpoint
// ***************************************************************************
#[OpenApi]
impl UploadDatesApi {
    /// Detect dates in an image sent as the raw request body.
    #[oai(path = "/dates/upload", method = "post")]
    async fn upload_dates_api(&self, http_req: &Request, image: Binary<Body>) -> DatesResponse {
        let declared_size = content_length(http_req);
        dates_utils::debug_request(http_req, &ReqUploadDates { declared_size });

        let result = match read_image(declared_size, image.0, self.service.max_upload_bytes()).await {
            Ok(bytes) => {
                let size = bytes.len();
                let result = self.service.extract_from_bytes(bytes).await;
                if let Ok(dates) = &result {
                    info!("Found {} date(s) in {} byte upload", dates.len(), size);
                }
                result
            },
            Err(e) => Err(e),
        };
        make_dates_response(&self.service, result)
    }
}

// ***************************************************************************
//                          Private Functions
// ***************************************************************************
fn content_length(http_req: &Request) -> Option<usize> {
    http_req.headers().get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
}

// ---------------------------------------------------------------------------
// read_image:
// ---------------------------------------------------------------------------
/** Read at most limit bytes of the body.  A declared length over the limit
 * is refused without reading; an undeclared or understated body is cut off
 * one byte past the limit.
 */
async fn read_image(declared_size: Option<usize>, body: Body, limit: usize) -> Result<Vec<u8>, DateError> {
    if let Some(size) = declared_size {
        if size > limit {
            return Err(DateError::PayloadTooLarge { size, limit });
        }
    }

    let mut image = Vec::new();
    body.into_async_read()
        .take(limit as u64 + 1)
        .read_to_end(&mut image)
        .await
        .map_err(|e| DateError::MalformedRequest(format!("unable to read image body: {}", e)))?;
    if image.len() > limit {
        return Err(DateError::PayloadTooLarge { size: image.len(), limit });
    }
    Ok(image)
}
