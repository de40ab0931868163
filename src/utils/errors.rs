#![forbid(unsafe_code)]

use poem::http::StatusCode;
use poem_openapi::Object;
use thiserror::Error;

use crate::utils::ocr::OcrError;

/// Errors enumerates the startup errors returned by this application.
#[derive(Error, Debug)]
pub enum Errors {
    /// Input parameter logging.
    #[error("dates_server input parameters:\n{}", .0)]
    InputParms(String),

    /// Represents all other cases of `std::io::Error`.
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Inaccessible logger configuration file.
    #[error("Unable to access the Log4rs configuration file: {}", .0)]
    Log4rsInitialization(String),

    #[error("Reading application configuration file: {}", .0)]
    ReadingConfigFile(String),

    #[error("Unable to parse TOML file: {}", .0)]
    TOMLParseError(String),

    #[error("Data directory error: {}", .0)]
    DirectoryError(String),
}

/// DateError is the failure half of every date extraction request.
#[derive(Error, Debug)]
pub enum DateError {
    /// The request body was not valid JSON or lacked a usable file_path.
    #[error("malformed request: {}", .0)]
    MalformedRequest(String),

    #[error("file not found: {}", .0)]
    FileNotFound(String),

    #[error("payload of {} bytes exceeds the {} byte limit", .size, .limit)]
    PayloadTooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error("internal error: {}", .0)]
    Internal(String),
}

impl DateError {
    /// The HTTP status each failure kind maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            DateError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            DateError::FileNotFound(_) => StatusCode::NOT_FOUND,
            DateError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            DateError::Ocr(_) => StatusCode::BAD_GATEWAY,
            DateError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ---------------------------------------------------------------------------
// HttpResult:
// ---------------------------------------------------------------------------
/// Error body returned by the v1 endpoints.
#[derive(Object, Debug)]
pub struct HttpResult {
    pub result_code: String,
    pub result_msg: String,
}

impl HttpResult {
    pub fn new(result_code: String, result_msg: String) -> Self {
        Self { result_code, result_msg }
    }
}
