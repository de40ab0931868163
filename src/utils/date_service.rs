#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex, TryLockError};

use log::{debug, error};

use crate::utils::date_extract::DateExtractor;
use crate::utils::errors::DateError;
use crate::utils::ocr::{recognize_text, EngineStatus, OcrEngine, OcrSource};

// ***************************************************************************
//                               Date Service
// ***************************************************************************
/// The request pipeline shared by every endpoint: OCR the image, then pull
/// date-shaped tokens from the recognized text.
///
/// One engine instance serves the whole process.  Calls are serialized
/// through the mutex and run on tokio's blocking pool.  Health checks go
/// through the engine's status handle and never wait on the mutex.
pub struct DateService {
    engine: Arc<Mutex<Box<dyn OcrEngine>>>,
    status: Arc<dyn EngineStatus>,
    extractor: DateExtractor,
    max_upload_bytes: usize,
}

/// Snapshot of the engine's state for the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineHealth {
    pub engine: String,
    pub available: bool,
    /// A recognition is in progress.
    pub busy: bool,
}

impl DateService {
    pub fn new(engine: Box<dyn OcrEngine>, extractor: DateExtractor, max_upload_bytes: usize) -> Self {
        let status: Arc<dyn EngineStatus> = Arc::from(engine.status_handle());
        Self { engine: Arc::new(Mutex::new(engine)), status, extractor, max_upload_bytes }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub fn extractor(&self) -> &DateExtractor {
        &self.extractor
    }

    // -----------------------------------------------------------------------
    // extract_from_path:
    // -----------------------------------------------------------------------
    /** OCR the image at file_path and return its date-shaped tokens. */
    pub async fn extract_from_path(&self, file_path: Option<String>) -> Result<Vec<String>, DateError> {
        let file_path = match file_path {
            Some(p) if !p.trim().is_empty() => p,
            _ => return Err(DateError::MalformedRequest("file_path is required".to_string())),
        };

        let path = PathBuf::from(&file_path);
        if !path.is_file() {
            return Err(DateError::FileNotFound(file_path));
        }

        let engine = self.engine.clone();
        let text = run_blocking(move || {
            let mut guard = engine.lock()
                .map_err(|e| DateError::Internal(format!("OCR engine lock poisoned: {}", e)))?;
            Ok(recognize_text(&mut **guard, OcrSource::Path(&path))?)
        }).await?;

        Ok(self.find_dates(&text))
    }

    // -----------------------------------------------------------------------
    // extract_from_bytes:
    // -----------------------------------------------------------------------
    /** OCR an uploaded image held in memory. */
    pub async fn extract_from_bytes(&self, image: Vec<u8>) -> Result<Vec<String>, DateError> {
        if image.is_empty() {
            return Err(DateError::MalformedRequest("image body is empty".to_string()));
        }
        if image.len() > self.max_upload_bytes {
            return Err(DateError::PayloadTooLarge { size: image.len(), limit: self.max_upload_bytes });
        }

        let engine = self.engine.clone();
        let text = run_blocking(move || {
            let mut guard = engine.lock()
                .map_err(|e| DateError::Internal(format!("OCR engine lock poisoned: {}", e)))?;
            Ok(recognize_text(&mut **guard, OcrSource::Bytes(&image))?)
        }).await?;

        Ok(self.find_dates(&text))
    }

    // -----------------------------------------------------------------------
    // health:
    // -----------------------------------------------------------------------
    pub async fn health(&self) -> Result<EngineHealth, DateError> {
        let busy = match self.engine.try_lock() {
            Ok(_) => false,
            Err(TryLockError::WouldBlock) => true,
            Err(TryLockError::Poisoned(e)) => {
                return Err(DateError::Internal(format!("OCR engine lock poisoned: {}", e)));
            },
        };

        let status = self.status.clone();
        run_blocking(move || {
            Ok(EngineHealth { engine: status.name().to_string(), available: status.is_available(), busy })
        }).await
    }

    fn find_dates(&self, text: &str) -> Vec<String> {
        debug!("Recognized text: {}", text);
        self.extractor.find_all(text)
    }
}

// Run a blocking closure off the async executor.
async fn run_blocking<T, F>(f: F) -> Result<T, DateError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, DateError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(r) => r,
        Err(e) => {
            let msg = format!("OCR task failed: {}", e);
            error!("{}", msg);
            Err(DateError::Internal(msg))
        }
    }
}

// ***************************************************************************
//                                  Tests
// ***************************************************************************
#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::utils::ocr::testing::FixedEngine;
    use std::time::Duration;

    pub const EXISTING_FILE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml");

    pub fn service_with(engine: FixedEngine) -> DateService {
        DateService::new(Box::new(engine), DateExtractor::new().unwrap(), 16)
    }

    #[tokio::test]
    async fn extracts_dates_from_path() {
        let svc = service_with(FixedEngine::with_fragments(&["partiya", "12.05.24", "SROK 01,02,23", "end"]));
        let dates = svc.extract_from_path(Some(EXISTING_FILE.to_string())).await.unwrap();
        assert_eq!(dates, vec!["12.05.24", "01,02,23"]);
    }

    #[tokio::test]
    async fn repeated_requests_are_identical() {
        let svc = service_with(FixedEngine::with_fragments(&["годен до 15.09.22"]));
        let a = svc.extract_from_path(Some(EXISTING_FILE.to_string())).await.unwrap();
        let b = svc.extract_from_path(Some(EXISTING_FILE.to_string())).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn missing_file_path_is_malformed() {
        let svc = service_with(FixedEngine::with_fragments(&[]));
        let err = svc.extract_from_path(None).await.unwrap_err();
        assert!(matches!(err, DateError::MalformedRequest(_)));
        let err = svc.extract_from_path(Some("  ".to_string())).await.unwrap_err();
        assert!(matches!(err, DateError::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn nonexistent_file_is_not_found() {
        let svc = service_with(FixedEngine::with_fragments(&["12.05.24"]));
        let err = svc.extract_from_path(Some("/nonexistent/label.png".to_string())).await.unwrap_err();
        assert_eq!(err.to_string(), "file not found: /nonexistent/label.png");
    }

    #[tokio::test]
    async fn engine_failure_is_ocr_error() {
        let svc = service_with(FixedEngine::failing("unsupported image format"));
        let err = svc.extract_from_path(Some(EXISTING_FILE.to_string())).await.unwrap_err();
        assert!(matches!(err, DateError::Ocr(_)));
    }

    #[tokio::test]
    async fn upload_limits() {
        let svc = service_with(FixedEngine::with_fragments(&["01.01.25"]));
        assert!(matches!(svc.extract_from_bytes(vec![]).await, Err(DateError::MalformedRequest(_))));
        assert!(matches!(svc.extract_from_bytes(vec![0; 17]).await,
                         Err(DateError::PayloadTooLarge { size: 17, limit: 16 })));
        assert_eq!(svc.extract_from_bytes(vec![0; 16]).await.unwrap(), vec!["01.01.25"]);
    }

    #[tokio::test]
    async fn health_reports_engine() {
        let svc = service_with(FixedEngine::failing("down"));
        let h = svc.health().await.unwrap();
        assert_eq!(h, EngineHealth { engine: "fixed".to_string(), available: false, busy: false });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn health_answers_during_slow_recognition() {
        let engine = FixedEngine::with_fragments(&["01.01.25"]).with_delay(Duration::from_secs(3));
        let svc = Arc::new(service_with(engine));

        let worker = svc.clone();
        let ocr = tokio::spawn(async move { worker.extract_from_bytes(vec![1]).await });
        tokio::time::sleep(Duration::from_millis(300)).await;

        let h = tokio::time::timeout(Duration::from_secs(1), svc.health()).await
            .expect("health waited on the running recognition")
            .unwrap();
        assert!(h.available);
        assert!(h.busy);

        assert_eq!(ocr.await.unwrap().unwrap(), vec!["01.01.25"]);
    }
}
