#![forbid(unsafe_code)]

//! OCR engine abstraction.
//!
//! The service never implements recognition itself.  It drives an external
//! engine in text-only mode and works with the fragments it reports.

use std::path::{Path, PathBuf};
use std::process::Command;

use path_absolutize::Absolutize;

use log::{info, warn};
use thiserror::Error;

use crate::utils::dates_utils::{run_command, run_command_with_input};

// ***************************************************************************
//                                Constants
// ***************************************************************************
pub const DEFAULT_OCR_PROGRAM: &str = "tesseract";
pub const DEFAULT_OCR_LANGUAGE: &str = "rus";

// ***************************************************************************
//                              Errors and Types
// ***************************************************************************
/// Errors from OCR engines.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine not available: {0}")]
    NotAvailable(String),

    #[error("OCR failed: {0}")]
    Failed(String),
}

/// What the engine should read.
#[derive(Debug, Clone, Copy)]
pub enum OcrSource<'a> {
    Path(&'a Path),
    Bytes(&'a [u8]),
}

/// Availability check that works without the engine instance, so it can
/// answer while a recognition holds the engine.
pub trait EngineStatus: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the engine can currently be invoked.
    fn is_available(&self) -> bool;
}

/// An OCR engine that returns detected text fragments without geometry or
/// confidence scores.
pub trait OcrEngine: Send {
    fn status_handle(&self) -> Box<dyn EngineStatus>;

    /// Read every text fragment in detection order.
    fn read_fragments(&mut self, source: OcrSource<'_>) -> Result<Vec<String>, OcrError>;
}

// ---------------------------------------------------------------------------
// recognize_text:
// ---------------------------------------------------------------------------
/** Run the engine and produce the recognized text: all fragments joined by
 * single spaces, then lowercased.  Engine errors are passed through.
 */
pub fn recognize_text(engine: &mut dyn OcrEngine, source: OcrSource<'_>) -> Result<String, OcrError> {
    let fragments = engine.read_fragments(source)?;
    Ok(fragments.join(" ").to_lowercase())
}

// ***************************************************************************
//                             Tesseract Engine
// ***************************************************************************
/// Tesseract driven through its command line.  The program is started once
/// per call; the instance holds the validated configuration.
#[derive(Debug)]
pub struct TesseractEngine {
    program: String,
    languages: Vec<String>,
}

impl TesseractEngine {
    pub fn new(program: &str, languages: &[String]) -> Self {
        let languages = if languages.is_empty() {
            vec![DEFAULT_OCR_LANGUAGE.to_string()]
        } else {
            languages.to_vec()
        };
        Self { program: program.to_string(), languages }
    }

    /// The tesseract -l argument, e.g. "rus+eng".
    pub fn language_arg(&self) -> String {
        self.languages.join("+")
    }

    // -----------------------------------------------------------------------
    // list_languages:
    // -----------------------------------------------------------------------
    /** Verify that the program runs and that each configured language model
     * is installed.  Returns the missing languages; an empty vector means the
     * engine is ready.
     */
    pub fn list_languages(&self) -> Result<Vec<String>, OcrError> {
        let mut command = Command::new(&self.program);
        command.arg("--list-langs");
        let output = run_command(command, "tesseract --list-langs")
            .map_err(|e| to_ocr_error(&self.program, e))?;

        // Older releases print the list on stderr.
        let mut listing = String::from_utf8_lossy(&output.stdout).to_string();
        listing.push('\n');
        listing.push_str(&String::from_utf8_lossy(&output.stderr));
        let installed = parse_language_list(&listing);

        let missing: Vec<String> = self.languages.iter()
            .filter(|l| !installed.contains(l))
            .cloned()
            .collect();
        if missing.is_empty() {
            info!("OCR engine {} ready with languages {}", self.program, self.language_arg());
        } else {
            warn!("OCR engine {} is missing language models: {}", self.program, missing.join(", "));
        }
        Ok(missing)
    }
}

impl OcrEngine for TesseractEngine {
    fn status_handle(&self) -> Box<dyn EngineStatus> {
        Box::new(TesseractStatus { program: self.program.clone() })
    }

    fn read_fragments(&mut self, source: OcrSource<'_>) -> Result<Vec<String>, OcrError> {
        let mut command = Command::new(&self.program);
        let output = match source {
            OcrSource::Path(path) => {
                command.arg(image_arg(path)?).arg("stdout").arg("-l").arg(self.language_arg());
                run_command(command, "tesseract")
            },
            OcrSource::Bytes(bytes) => {
                command.arg("stdin").arg("stdout").arg("-l").arg(self.language_arg());
                run_command_with_input(command, bytes, "tesseract")
            },
        };

        let output = output.map_err(|e| to_ocr_error(&self.program, e))?;
        Ok(split_fragments(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Runs `tesseract --version` on demand.
#[derive(Debug)]
pub struct TesseractStatus {
    program: String,
}

impl EngineStatus for TesseractStatus {
    fn name(&self) -> &str {
        DEFAULT_OCR_PROGRAM
    }

    fn is_available(&self) -> bool {
        let mut command = Command::new(&self.program);
        command.arg("--version");
        run_command(command, "tesseract --version").is_ok()
    }
}

// ***************************************************************************
//                             Private Functions
// ***************************************************************************
// Tesseract treats a bare "stdin" as its input stream and a leading '-' as an
// option, so the image is always passed as an absolute path.
fn image_arg(path: &Path) -> Result<PathBuf, OcrError> {
    path.absolutize()
        .map(|p| p.into_owned())
        .map_err(|e| OcrError::Failed(format!("cannot resolve {}: {}", path.display(), e)))
}

// Each non-blank output line is one detected fragment.
fn split_fragments(text: &str) -> Vec<String> {
    text.lines()
        .map(|l| l.trim_matches(|c: char| c.is_whitespace() || c == '\u{c}'))
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

// The listing starts with a header line such as
// `List of available languages in "/usr/share/tessdata/" (3):`.
fn parse_language_list(listing: &str) -> Vec<String> {
    listing.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("List of available languages"))
        .map(str::to_string)
        .collect()
}

fn to_ocr_error(program: &str, e: anyhow::Error) -> OcrError {
    match e.downcast_ref::<std::io::Error>() {
        Some(io) if io.kind() == std::io::ErrorKind::NotFound => {
            OcrError::NotAvailable(format!("{} not found (install tesseract-ocr)", program))
        },
        _ => OcrError::Failed(format!("{:#}", e)),
    }
}

// ***************************************************************************
//                              Test Support
// ***************************************************************************
#[cfg(test)]
pub mod testing {
    use super::*;

    use std::time::Duration;

    /// Engine that replays canned fragments, or fails with a fixed message.
    pub struct FixedEngine {
        result: Result<Vec<String>, String>,
        delay: Option<Duration>,
        pub calls: usize,
    }

    impl FixedEngine {
        pub fn with_fragments(fragments: &[&str]) -> Self {
            Self { result: Ok(fragments.iter().map(|s| s.to_string()).collect()), delay: None, calls: 0 }
        }

        pub fn failing(msg: &str) -> Self {
            Self { result: Err(msg.to_string()), delay: None, calls: 0 }
        }

        /// Sleep this long inside every recognition.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    pub struct FixedStatus {
        available: bool,
    }

    impl EngineStatus for FixedStatus {
        fn name(&self) -> &str {
            "fixed"
        }

        fn is_available(&self) -> bool {
            self.available
        }
    }

    impl OcrEngine for FixedEngine {
        fn status_handle(&self) -> Box<dyn EngineStatus> {
            Box::new(FixedStatus { available: self.result.is_ok() })
        }

        fn read_fragments(&mut self, _source: OcrSource<'_>) -> Result<Vec<String>, OcrError> {
            self.calls += 1;
            if let Some(d) = self.delay {
                std::thread::sleep(d);
            }
            self.result.clone().map_err(OcrError::Failed)
        }
    }
}

// ***************************************************************************
//                                  Tests
// ***************************************************************************
#[cfg(test)]
mod tests {
    use super::*;
    use super::testing::FixedEngine;

    #[test]
    fn recognize_joins_and_lowercases() {
        let mut engine = FixedEngine::with_fragments(&["Партия", "12.05.24", "СРОК", "01,02,23"]);
        let text = recognize_text(&mut engine, OcrSource::Bytes(b"")).unwrap();
        assert_eq!(text, "партия 12.05.24 срок 01,02,23");
        assert_eq!(engine.calls, 1);
    }

    #[test]
    fn recognize_passes_errors_through() {
        let mut engine = FixedEngine::failing("unreadable image");
        let err = recognize_text(&mut engine, OcrSource::Path(Path::new("/x.png"))).unwrap_err();
        assert_eq!(err.to_string(), "OCR failed: unreadable image");
    }

    #[test]
    fn fragments_skip_blank_lines_and_form_feed() {
        let out = "Годен до\n\n  15.09.22  \n\u{c}";
        assert_eq!(split_fragments(out), vec!["Годен до", "15.09.22"]);
    }

    #[test]
    fn language_list_drops_header() {
        let listing = "List of available languages in \"/usr/share/tessdata/\" (3):\neng\nosd\nrus\n";
        assert_eq!(parse_language_list(listing), vec!["eng", "osd", "rus"]);
    }

    #[test]
    fn default_language_is_russian() {
        let engine = TesseractEngine::new(DEFAULT_OCR_PROGRAM, &[]);
        assert_eq!(engine.language_arg(), "rus");
        let engine = TesseractEngine::new(DEFAULT_OCR_PROGRAM, &["rus".to_string(), "eng".to_string()]);
        assert_eq!(engine.language_arg(), "rus+eng");
    }

    #[test]
    fn missing_program_is_not_available() {
        let mut engine = TesseractEngine::new("/nonexistent/tesseract", &[]);
        assert!(!engine.status_handle().is_available());
        assert_eq!(engine.status_handle().name(), "tesseract");
        let err = engine.read_fragments(OcrSource::Path(Path::new("/x.png"))).unwrap_err();
        assert!(matches!(err, OcrError::NotAvailable(_)));
        assert!(matches!(engine.list_languages(), Err(OcrError::NotAvailable(_))));
    }

    #[test]
    fn image_path_is_absolute() {
        for name in ["stdin", "-l", "--list-langs", "label.png"] {
            let arg = image_arg(Path::new(name)).unwrap();
            assert!(arg.is_absolute());
            assert!(arg.ends_with(name));
        }
        assert_eq!(image_arg(Path::new("/srv/img/label.png")).unwrap(), PathBuf::from("/srv/img/label.png"));
    }
}
