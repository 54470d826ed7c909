//! `GET /_dc2/metadata` (`spec.md` §6): a small JSON endpoint reporting
//! process identity and build provenance, independent of the EC2/AutoScaling
//! wire dialects the rest of the frontend speaks.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct BuildVersion {
    pub version: &'static str,
    pub commit: &'static str,
    pub commit_time: &'static str,
    pub dirty: bool,
    pub rustc_version: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub name: &'static str,
    pub build: BuildVersion,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            name: "dc2",
            build: BuildVersion {
                version: env!("CARGO_PKG_VERSION"),
                commit: option_env!("DC2_BUILD_COMMIT").unwrap_or("unknown"),
                commit_time: option_env!("DC2_BUILD_COMMIT_TIME").unwrap_or("unknown"),
                dirty: option_env!("DC2_BUILD_DIRTY").is_some(),
                rustc_version: option_env!("DC2_BUILD_RUSTC_VERSION").unwrap_or("unknown"),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct MetadataResponse {
    name: &'static str,
    region: String,
    build: BuildVersion,
}

pub async fn handler(State(state): State<AppState>) -> Json<MetadataResponse> {
    Json(MetadataResponse {
        name: state.build_info.name,
        region: state.region.clone(),
        build: state.build_info.build.clone(),
    })
}
