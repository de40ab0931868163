#![forbid(unsafe_code)]

use anyhow::{Result, anyhow};
use clap::Parser;
use fs_mistrust::Mistrust;
use log::{info, error, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Root};
use log4rs::encode::pattern::PatternEncoder;
use serde::Deserialize;
use std::os::unix::fs::PermissionsExt;
use std::{env, fs, path::Path};

use crate::utils::{dates_utils::get_absolute_path, errors::Errors};
use crate::utils::ocr::{DEFAULT_OCR_LANGUAGE, DEFAULT_OCR_PROGRAM};

// ***************************************************************************
//                                Constants
// ***************************************************************************
// Directory and file locations. Unless otherwise noted, all files and directories
// are relative to the root directory.
const ENV_DATES_ROOT_DIR   : &str = "DATES_ROOT_DIR";
const ENV_PORT             : &str = "PORT";
const DEFAULT_ROOT_DIR     : &str = "~/.dates_server";
const CONFIG_DIR           : &str = "/config";
const LOGS_DIR             : &str = "/logs";
const LOG4RS_CONFIG_FILE   : &str = "/log4rs.yml";  // relative to config dir
const DATES_CONFIG_FILE    : &str = "/dates.toml";  // relative to config dir

// Networking.
const DEFAULT_HTTP_ADDR    : &str = "0.0.0.0";
pub const DEFAULT_HTTP_PORT: u16  = 6996;

// Uploads larger than this are refused.
const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024;

// Console pattern used when no log4rs.yml is installed.
const DEFAULT_LOG_PATTERN  : &str = "{d(%Y-%m-%dT%H:%M:%S%.3f)} {h({l})} {t} - {m}{n}";

// ***************************************************************************
//                             Directory Structs
// ***************************************************************************
#[derive(Debug, Clone)]
pub struct DatesDirs {
    pub root_dir: String,
    pub config_dir: String,
    pub logs_dir: String,
}

impl DatesDirs {
    pub fn summary(&self) -> String {
        format!("root={}, config={}, logs={}", self.root_dir, self.config_dir, self.logs_dir)
    }
}

// ***************************************************************************
//                               Config Structs
// ***************************************************************************
// ---------------------------------------------------------------------------
// DatesArgs:
// ---------------------------------------------------------------------------
#[derive(Debug, Parser, Default)]
#[command(name = "dates_server", about = "Command line arguments for the date extraction server.")]
pub struct DatesArgs {
    /// Specify the server's root data directory.
    ///
    /// This directory contains the config and logs subdirectories.
    #[arg(short, long)]
    pub root_dir: Option<String>,

    /// Create the data directories and then exit.
    ///
    /// The data directories will be rooted at a root directory calculated
    /// using the following priority order:
    ///
    ///   1. If set, the value of the DATES_ROOT_DIR environment,
    ///
    ///   2. Otherwise, if set, the value of the --root-dir command line argument,
    ///
    ///   3. Otherwise, ~/.dates_server
    #[arg(short, long)]
    pub create_dirs_only: bool,

    /// Listening port.  The PORT environment variable takes precedence.
    #[arg(short, long)]
    pub port: Option<u16>,
}

// ---------------------------------------------------------------------------
// Parms:
// ---------------------------------------------------------------------------
#[derive(Debug)]
pub struct Parms {
    pub config_file: String,
    pub config: Config,
}

// ---------------------------------------------------------------------------
// RuntimeCtx:
// ---------------------------------------------------------------------------
/// Everything read at startup.  Built once in main and handed to whatever
/// needs it; nothing here changes after startup.
#[derive(Debug)]
pub struct RuntimeCtx {
    pub parms: Parms,
    pub dates_args: DatesArgs,
    pub dates_dirs: DatesDirs,
}

impl RuntimeCtx {
    /// The port to listen on after applying the env and CLI overrides.
    pub fn http_port(&self) -> u16 {
        resolve_port(env::var(ENV_PORT).ok(), self.dates_args.port, self.parms.config.http_port)
    }
}

// ---------------------------------------------------------------------------
// Config:
// ---------------------------------------------------------------------------
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub title: String,
    pub http_addr: String,
    pub http_port: u16,
    pub ocr_program: String,
    pub ocr_languages: Vec<String>,
    pub max_upload_bytes: usize,
    /// Answer POST / failures with 400/404/413/500/502 instead of 200.
    pub strict_status_codes: bool,
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            title: "Dates Server".to_string(),
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            ocr_program: DEFAULT_OCR_PROGRAM.to_string(),
            ocr_languages: vec![DEFAULT_OCR_LANGUAGE.to_string()],
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            strict_status_codes: false,
        }
    }
}

// ***************************************************************************
//                            Directory Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// init_dates_args:
// ---------------------------------------------------------------------------
/** Get the command line arguments. */
pub fn init_dates_args() -> DatesArgs {
    DatesArgs::parse()
}

// ---------------------------------------------------------------------------
// init_dates_dirs:
// ---------------------------------------------------------------------------
/** Calculate the external data directories, creating any that are missing. */
pub fn init_dates_dirs(args: &DatesArgs) -> Result<DatesDirs> {
    let mistrust = get_mistrust()?;

    let root_dir = get_root_dir(args);
    check_dates_dir(&root_dir, "root directory", &mistrust)?;

    let config_dir = root_dir.clone() + CONFIG_DIR;
    check_dates_dir(&config_dir, "config directory", &mistrust)?;

    let logs_dir = root_dir.clone() + LOGS_DIR;
    check_dates_dir(&logs_dir, "logs directory", &mistrust)?;

    Ok(DatesDirs { root_dir, config_dir, logs_dir })
}

// ---------------------------------------------------------------------------
// check_dates_dir:
// ---------------------------------------------------------------------------
/** Check that the path is absolute and, if it exists, that it has the proper
 * permissions assigned.  If it doesn't exist, create it.  The mistrust package
 * creates directories with 0o700 permissions.
 */
fn check_dates_dir(dir: &str, msgname: &str, mistrust: &Mistrust) -> Result<()> {
    let path = Path::new(dir);
    if !path.is_absolute() {
        return Err(dir_error(format!("The {} path must be absolute: {}", msgname, dir)));
    }
    if path.exists() {
        if !path.is_dir() {
            return Err(dir_error(format!("The {} path must be a directory: {}", msgname, dir)));
        }

        // Make sure the directory has rwx for owner only.
        let meta = path.metadata()
            .map_err(|e| dir_error(format!("Unable to read metadata for {} {}: {}", msgname, dir, e)))?;
        if meta.permissions().mode() & 0o777 != 0o700 {
            return Err(dir_error(format!("The {} path must have 0o700 permissions: {}", msgname, dir)));
        }
    } else {
        mistrust.make_directory(path)
            .map_err(|e| dir_error(format!("Make directory error for {:?}: {}", path, e)))?;
    }
    Ok(())
}

fn dir_error(msg: String) -> anyhow::Error {
    anyhow!(Errors::DirectoryError(msg))
}

// ---------------------------------------------------------------------------
// get_mistrust:
// ---------------------------------------------------------------------------
/** Configure a new mistrust object for initial directory processing. */
fn get_mistrust() -> Result<Mistrust> {
    Mistrust::builder()
        .ignore_prefix(get_absolute_path("~"))
        .trust_group(0)
        .build()
        .map_err(|e| dir_error(format!("Mistrust configuration error: {}", e)))
}

// ---------------------------------------------------------------------------
// get_root_dir:
// ---------------------------------------------------------------------------
fn get_root_dir(args: &DatesArgs) -> String {
    // Order of precedence:
    //  1. Environment variable
    //  2. Command line --root-dir argument
    //  3. Default location
    let root_dir = env::var(ENV_DATES_ROOT_DIR).unwrap_or_else(
        |_| args.root_dir.clone().unwrap_or_else(|| DEFAULT_ROOT_DIR.to_string()));

    get_absolute_path(&root_dir)
}

// ---------------------------------------------------------------------------
// resolve_port:
// ---------------------------------------------------------------------------
/** Environment first, then the command line, then the config file.  An
 * unparsable environment value is logged and ignored.
 */
fn resolve_port(env_port: Option<String>, arg_port: Option<u16>, config_port: u16) -> u16 {
    if let Some(s) = env_port {
        match s.trim().parse::<u16>() {
            Ok(p) => return p,
            Err(e) => error!("Ignoring invalid {} value '{}': {}", ENV_PORT, s, e),
        }
    }
    arg_port.unwrap_or(config_port)
}

// ***************************************************************************
//                               Log Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// init_log:
// ---------------------------------------------------------------------------
/** Initialize log4rs from the config directory's log4rs.yml.  When that file
 * is not installed, log INFO and above to the console.
 */
pub fn init_log(dirs: &DatesDirs) -> Result<()> {
    let logconfig = dirs.config_dir.clone() + LOG4RS_CONFIG_FILE;
    if Path::new(&logconfig).exists() {
        log4rs::init_file(&logconfig, Default::default())
            .map_err(|e| anyhow!("{}: {}", Errors::Log4rsInitialization(logconfig.clone()), e))?;
        info!("Log4rs initialized using: {}", logconfig);
    } else {
        let stdout = ConsoleAppender::builder()
            .encoder(Box::new(PatternEncoder::new(DEFAULT_LOG_PATTERN)))
            .build();
        let config = log4rs::Config::builder()
            .appender(Appender::builder().build("stdout", Box::new(stdout)))
            .build(Root::builder().appender("stdout").build(LevelFilter::Info))
            .map_err(|e| anyhow!("{}: {}", Errors::Log4rsInitialization(logconfig.clone()), e))?;
        log4rs::init_config(config)
            .map_err(|e| anyhow!("{}: {}", Errors::Log4rsInitialization(logconfig.clone()), e))?;
        info!("No {} found, logging to the console.", logconfig);
    }
    Ok(())
}

// ***************************************************************************
//                             Parms Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// get_parms:
// ---------------------------------------------------------------------------
/** Read the application parameters from dates.toml in the config directory.
 * A missing file yields the default configuration; a malformed one is an
 * error.
 */
fn get_parms(dirs: &DatesDirs) -> Result<Parms> {
    let config_file = dirs.config_dir.clone() + DATES_CONFIG_FILE;
    info!("{}", Errors::ReadingConfigFile(config_file.clone()));
    let contents = match fs::read_to_string(&config_file) {
        Ok(c) => c,
        Err(_) => {
            info!("Unable to read configuration at {}. Using default values.", config_file);
            return Ok(Parms { config_file: Default::default(), config: Config::new() });
        }
    };

    let config = parse_config(&contents).map_err(|e| {
        let msg = format!("{}\n   {}", Errors::TOMLParseError(config_file.clone()), e);
        error!("{}", msg);
        anyhow!(msg)
    })?;

    Ok(Parms { config_file, config })
}

fn parse_config(contents: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(contents)
}

// ***************************************************************************
//                             Config Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// init_runtime_context:
// ---------------------------------------------------------------------------
pub fn init_runtime_context(dates_args: DatesArgs, dates_dirs: DatesDirs) -> Result<RuntimeCtx> {
    let parms = get_parms(&dates_dirs)?;
    Ok(RuntimeCtx { parms, dates_args, dates_dirs })
}
