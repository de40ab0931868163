#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};
use poem::{listener::TcpListener, post, EndpointExt, Route};
use poem_openapi::OpenApiService;

// Dates Utilities
use crate::root_endpoint::{extract_dates_root, RootState};
use crate::utils::config::{init_dates_args, init_dates_dirs, init_log, init_runtime_context, RuntimeCtx};
use crate::utils::date_extract::DateExtractor;
use crate::utils::date_service::DateService;
use crate::utils::errors::Errors;
use crate::utils::ocr::TesseractEngine;
use crate::v1::dates::extract_dates::ExtractDatesApi;
use crate::v1::dates::health::HealthApi;
use crate::v1::dates::upload_dates::UploadDatesApi;
use crate::v1::dates::version::VersionApi;

// Modules
mod root_endpoint;
mod utils;
mod v1;

// ***************************************************************************
//                                Constants
// ***************************************************************************
const SERVER_NAME : &str = "DatesServer"; // for poem logging

// ---------------------------------------------------------------------------
// main:
// ---------------------------------------------------------------------------
#[tokio::main]
async fn main() -> Result<()> {
    // --------------- Initialize Server --------------
    println!("Starting dates_server!");

    // Read args, create the data directories and configure logging.
    let args = init_dates_args();
    let dirs = init_dates_dirs(&args)?;
    if args.create_dirs_only {
        println!("Data directories created: {}", dirs.summary());
        return Ok(());
    }
    init_log(&dirs)?;

    let ctx = init_runtime_context(args, dirs)?;
    info!("{}", Errors::InputParms(format!("{:#?}", ctx)));
    info!("Data directories: {}", ctx.dates_dirs.summary());
    print_version_info();

    // --------------- Main Loop Set Up ---------------
    let service = Arc::new(init_date_service(&ctx)?);
    let app = build_app(&ctx, service);

    let addr = format!("{}:{}", ctx.parms.config.http_addr, ctx.http_port());
    info!("{} listening on {}", ctx.parms.config.title, addr);

    // ------------------ Main Loop -------------------
    poem::Server::new(TcpListener::bind(addr))
        .name(SERVER_NAME)
        .run(app)
        .await?;
    Ok(())
}

// ***************************************************************************
//                             Private Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// init_date_service:
// ---------------------------------------------------------------------------
/** Create the single OCR engine shared by all requests and check it.  A
 * missing engine or language model is logged but does not stop the server;
 * requests will fail with 502 and the health endpoint reports it.
 */
fn init_date_service(ctx: &RuntimeCtx) -> Result<DateService> {
    let config = &ctx.parms.config;
    let engine = TesseractEngine::new(&config.ocr_program, &config.ocr_languages);
    match engine.list_languages() {
        Ok(missing) if missing.is_empty() => (),
        Ok(missing) => warn!("Requests will fail until these languages are installed: {}", missing.join(", ")),
        Err(e) => warn!("OCR engine check failed: {}", e),
    }

    Ok(DateService::new(Box::new(engine), DateExtractor::new()?, config.max_upload_bytes))
}

// ---------------------------------------------------------------------------
// build_app:
// ---------------------------------------------------------------------------
/** Assemble the routes: the root extraction contract, the v1 OpenAPI
 * endpoints, and the generated spec and docs.
 */
fn build_app(ctx: &RuntimeCtx, service: Arc<DateService>) -> impl poem::Endpoint {
    let config = &ctx.parms.config;
    let server_url = format!("http://{}:{}/v1", config.http_addr, ctx.http_port());

    let endpoints = (
        ExtractDatesApi::new(service.clone()),
        UploadDatesApi::new(service.clone()),
        HealthApi::new(service.clone()),
        VersionApi,
    );
    let api_service = OpenApiService::new(endpoints, config.title.as_str(), env!("CARGO_PKG_VERSION"))
        .server(server_url);

    // Allow the generated openapi specs to be retrieved from the server.
    let spec = api_service.spec_endpoint();
    let spec_yaml = api_service.spec_endpoint_yaml();
    let ui = api_service.swagger_ui();

    Route::new()
        .at("/", post(extract_dates_root))
        .nest("/v1", api_service)
        .nest("/docs", ui)
        .at("/spec", spec)
        .at("/spec_yaml", spec_yaml)
        .data(RootState::new(service, config.strict_status_codes))
}

// ---------------------------------------------------------------------------
// print_version_info:
// ---------------------------------------------------------------------------
fn print_version_info() {
    info!("\n*** Running DATES={}, BRANCH={}, COMMIT={}, DIRTY={}, SRC_TS={}, RUSTC={}.",
          option_env!("CARGO_PKG_VERSION").unwrap_or("unknown"),
          option_env!("GIT_BRANCH").unwrap_or("unknown"),
          option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
          option_env!("GIT_DIRTY").unwrap_or("unknown"),
          option_env!("SOURCE_TIMESTAMP").unwrap_or("unknown"),
          option_env!("RUSTC_VERSION").unwrap_or("unknown"));
}
