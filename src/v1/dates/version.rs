#![forbid(unsafe_code)]

use poem_openapi::{ OpenApi, payload::Json, Object };

// From cargo.toml.
const DATES_VERSION: Option<&str> = option_env!("CARGO_PKG_VERSION");

// ***************************************************************************
//                          Request/Response Definiions
// ***************************************************************************
pub struct VersionApi;

#[derive(Object)]
struct RespVersion
{
    result_code: String,
    result_msg: String,
    dates_version: String,
    git_branch: String,
    git_commit: String,
    git_dirty: String,
    source_ts: String,
    rustc_version: String,
}

// ***************************************************************************
//                             OpenAPI Endpoint
// ***************************************************************************
#[OpenApi]
impl VersionApi {
    #[oai(path = "/dates/version", method = "get")]
    async fn get_version(&self) -> Json<RespVersion> {
        Json(RespVersion::process())
    }
}

// ***************************************************************************
//                          Request/Response Methods
// ***************************************************************************
impl RespVersion {
    fn process() -> RespVersion {
        Self {result_code: "0".to_string(),
              result_msg: "success".to_string(),
              dates_version: DATES_VERSION.unwrap_or("unknown").to_string(),
              git_branch: option_env!("GIT_BRANCH").unwrap_or("unknown").to_string(),
              git_commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown").to_string(),
              git_dirty: option_env!("GIT_DIRTY").unwrap_or("unknown").to_string(),
              source_ts: option_env!("SOURCE_TIMESTAMP").unwrap_or("unknown").to_string(),
              rustc_version: option_env!("RUSTC_VERSION").unwrap_or("unknown").to_string(),
        }
    }
}

// ***************************************************************************
//                                  Tests
// ***************************************************************************
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_matches_package() {
        let v = RespVersion::process();
        assert_eq!(v.dates_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(v.result_code, "0");
    }
}
