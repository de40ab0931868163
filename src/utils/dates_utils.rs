#![forbid(unsafe_code)]

use path_absolutize::Absolutize;
use std::ops::Deref;
use std::path::Path;
use std::process::{Command, ExitStatus, Output, Stdio};
use execute::Execute;
use chrono::{Utc, SecondsFormat};

use poem::Request;

use anyhow::{Context, Result, anyhow};
use log::{error, debug, LevelFilter};

// ***************************************************************************
// GENERAL PUBLIC FUNCTIONS
// ***************************************************************************
// ---------------------------------------------------------------------------
// get_absolute_path:
// ---------------------------------------------------------------------------
/** Replace tilde (~) and environment variable values in a path name and
 * then construct the absolute path name.  Unlike canonicalize, absolutize
 * does not care whether the file exists.
 *
 * On any expansion or conversion failure the original path is returned.
 */
pub fn get_absolute_path(path: &str) -> String {
    let s = match shellexpand::full(path) {
        Ok(x) => x,
        Err(_) => return path.to_owned(),
    };

    let p = Path::new(s.deref());
    let p1 = match p.absolutize() {
        Ok(x) => x,
        Err(_) => return path.to_owned(),
    };
    match p1.to_str() {
        Some(x) => x.to_owned(),
        None => path.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// timestamp_str:
// ---------------------------------------------------------------------------
/** Get the current UTC timestamp as a string in rfc3339 format, which looks
 * like this:  2022-09-13T14:14:42Z
 */
pub fn timestamp_str() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ---------------------------------------------------------------------------
// run_command:
// ---------------------------------------------------------------------------
/** Make an operating system call and return an Output object that contains
 * the result code and stdout/stderr as vectors.  If the command cannot be run
 * or if it runs and returns a non-zero exit code, this method writes the log
 * before returning an error.
 *
 * The task parameter prefixes any error message logged or returned by this
 * function.  When the command could not be started at all, the underlying
 * std::io::Error stays reachable through downcast_ref.
 *
 * The only way Ok is returned is when the command has a zero exit code.
 */
pub fn run_command(mut command: Command, task: &str) -> Result<Output> {
    capture_output(&mut command);
    let result = command.execute_output();
    check_output(command, result, task)
}

// ---------------------------------------------------------------------------
// run_command_with_input:
// ---------------------------------------------------------------------------
/** Same as run_command, but the data is written to the command's stdin. */
pub fn run_command_with_input(mut command: Command, input: &[u8], task: &str) -> Result<Output> {
    capture_output(&mut command);
    let result = command.execute_input_output(input);
    check_output(command, result, task)
}

// ***************************************************************************
//                                  Traits
// ***************************************************************************
pub trait RequestDebug {
    type Req;
    fn get_request_info(&self) -> String;
}

// ---------------------------------------------------------------------------
// debug_request:
// ---------------------------------------------------------------------------
// Dump http request information to the log.
pub fn debug_request(http_req: &Request, req: &impl RequestDebug) {
    // Check that debug or higher logging is in effect.
    let level = log::max_level();
    if level < LevelFilter::Debug {
        return;
    }

    // Accumulate the output.
    let mut s = "\n".to_string();

    // Restate the URI.
    let uri = http_req.uri();
    s += format!("  URI: {:?}\n", uri).as_str();

    // Accumulate the headers
    for v in http_req.headers().iter() {
         s += format!("  Header: {} = {:?} \n", v.0, v.1).as_str();
    };

    // Add the request's information.
    s += req.get_request_info().as_str();

    debug!("{}", s);
}

// ***************************************************************************
// PRIVATE FUNCTIONS
// ***************************************************************************
fn capture_output(command: &mut Command) {
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
}

// ---------------------------------------------------------------------------
// check_output:
// ---------------------------------------------------------------------------
/** Turn the raw execution result into an Ok only for zero exit codes.
 * Errors are logged before returning.
 */
fn check_output(command: Command, result: std::io::Result<Output>, task: &str) -> Result<Output> {
    match result {
        Ok(o) => {
            if o.status.success() {
                Ok(o)
            } else {
                let stderr = String::from_utf8_lossy(&o.stderr).trim().to_string();
                let detail = if stderr.is_empty() {run_command_emsg(&command, o.status)}
                             else {stderr};
                let msg = task.to_string() + ": " + &detail;
                error!("{}", msg);
                Err(anyhow!(msg))
            }
        },
        Err(e) => {
            error!("{}: {}", task, e);
            Err::<Output, _>(e).with_context(|| task.to_string())
        },
    }
}

// ---------------------------------------------------------------------------
// run_command_emsg:
// ---------------------------------------------------------------------------
/** Return a message for commands that return non-zero exit codes. */
fn run_command_emsg(command: &Command, status: ExitStatus) -> String {
    "Unknown error condition returned by command: ".to_owned() +
    command.get_program().to_str().unwrap_or("unknown") +
    " with exit status: " + &status.to_string()
}

// ***************************************************************************
//                                  Tests
// ***************************************************************************
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_path_expands_relative() {
        let p = get_absolute_path("some/relative/file.png");
        assert!(Path::new(&p).is_absolute());
        assert!(p.ends_with("some/relative/file.png"));
    }

    #[test]
    fn absolute_path_keeps_absolute() {
        assert_eq!(get_absolute_path("/var/tmp/label.png"), "/var/tmp/label.png");
    }

    #[test]
    fn run_command_success_and_failure() {
        let out = run_command(Command::new("true"), "run true").unwrap();
        assert!(out.status.success());

        let err = run_command(Command::new("false"), "run false").unwrap_err();
        assert!(err.to_string().starts_with("run false: "));
    }

    #[test]
    fn run_command_missing_program_keeps_io_error() {
        let err = run_command(Command::new("/nonexistent/dates-program"), "missing").unwrap_err();
        let io = err.downcast_ref::<std::io::Error>().unwrap();
        assert_eq!(io.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn run_command_with_input_pipes_stdin() {
        let out = run_command_with_input(Command::new("cat"), b"12.05.24", "cat").unwrap();
        assert_eq!(out.stdout, b"12.05.24");
    }
}
