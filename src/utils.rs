pub mod config;
pub mod date_extract;
pub mod date_service;
pub mod dates_utils;
pub mod errors;
pub mod ocr;
