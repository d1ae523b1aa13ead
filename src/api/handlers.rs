// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::PathBuf;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::common::config::AppConfig;
use crate::config::{Credential, StorageConfig};
use crate::error::{Error, ErrorKind};
use crate::mount::{MountOutcome, UnmountOutcome};
use crate::network::{ConnectionReport, ScanOptions, ScanReport};
use crate::service::{AutoMountOutcome, ConnectionStatus, NetworkStorage};
use crate::storage::{MountRecord, StorageStats};
use crate::sync::SyncSummary;

/// Error body: `{"kind": ..., "message": ...}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidConfig | ErrorKind::InvalidRange => StatusCode::BAD_REQUEST,
        ErrorKind::CredentialUnavailable => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::NotMounted => StatusCode::CONFLICT,
        ErrorKind::PortUnreachable
        | ErrorKind::AuthOrEnumerationFailure
        | ErrorKind::MountRejected
        | ErrorKind::UnmountFailed => StatusCode::BAD_GATEWAY,
        ErrorKind::MountTimeout | ErrorKind::ScanTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::DirectoryCreateFailed
        | ErrorKind::ConfigIoFailure
        | ErrorKind::MountTableUnavailable
        | ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            tracing::warn!(kind = ?kind, error = %self.0, "request failed");
        }
        let body = ErrorBody {
            kind,
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize, Deserialize)]
pub struct Outcome<T> {
    pub outcome: T,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TestRequest {
    /// Settings to probe; the saved configuration when absent.
    pub config: Option<StorageConfig>,
    /// Password to try instead of the configured credential reference.
    pub password: Option<Credential>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MountBody {
    pub password: Option<Credential>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UnmountBody {
    /// Defaults to the configured mount point.
    pub mount_point: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub mount_point: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ScanBody {
    pub range: Option<String>,
    pub concurrency: Option<usize>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SyncBody {
    pub local_dir: Option<PathBuf>,
}

pub async fn get_config(State(storage): State<NetworkStorage>) -> Json<StorageConfig> {
    Json(storage.load_config())
}

pub async fn put_config(
    State(storage): State<NetworkStorage>,
    Json(config): Json<StorageConfig>,
) -> ApiResult<StorageConfig> {
    storage.save_config(&config)?;
    Ok(Json(storage.load_config()))
}

pub async fn test_connection(
    State(storage): State<NetworkStorage>,
    Json(request): Json<TestRequest>,
) -> ApiResult<ConnectionReport> {
    let config = request.config.unwrap_or_else(|| storage.load_config());
    Ok(Json(storage.test_connection(&config, request.password).await?))
}

pub async fn mount(
    State(storage): State<NetworkStorage>,
    Json(body): Json<MountBody>,
) -> ApiResult<Outcome<MountOutcome>> {
    let outcome = storage.mount_configured(body.password).await?;
    Ok(Json(Outcome { outcome }))
}

pub async fn unmount(
    State(storage): State<NetworkStorage>,
    Json(body): Json<UnmountBody>,
) -> ApiResult<Outcome<UnmountOutcome>> {
    let outcome = match body.mount_point {
        Some(path) => storage.manager().unmount(&path).await?,
        None => storage.unmount_configured().await?,
    };
    Ok(Json(Outcome { outcome }))
}

pub async fn status(State(storage): State<NetworkStorage>) -> Json<ConnectionStatus> {
    Json(storage.connection_status().await)
}

pub async fn shares(State(storage): State<NetworkStorage>) -> Json<Vec<MountRecord>> {
    Json(storage.list_mounted_shares().await)
}

pub async fn stats(
    State(storage): State<NetworkStorage>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<StorageStats> {
    storage
        .get_stats(&query.mount_point)
        .await
        .map(Json)
        .ok_or_else(|| Error::NotMounted(query.mount_point).into())
}

pub async fn scan(
    State(storage): State<NetworkStorage>,
    Json(body): Json<ScanBody>,
) -> ApiResult<ScanReport> {
    let range = body
        .range
        .unwrap_or_else(|| AppConfig::DEFAULT_SCAN_RANGE.to_string());
    let defaults = storage.scanner().options().clone();
    let options = ScanOptions {
        concurrency: body.concurrency.or(defaults.concurrency),
        timeout: body
            .timeout_seconds
            .map(std::time::Duration::from_secs)
            .unwrap_or(defaults.timeout),
        ..defaults
    };
    let scanner = storage.scanner().clone().with_options(options);
    Ok(Json(scanner.scan(&range).await?))
}

pub async fn auto_mount(State(storage): State<NetworkStorage>) -> Json<AutoMountOutcome> {
    Json(storage.auto_mount().await)
}

pub async fn sync(
    State(storage): State<NetworkStorage>,
    Json(body): Json<SyncBody>,
) -> ApiResult<SyncSummary> {
    let local_dir = body
        .local_dir
        .unwrap_or_else(|| PathBuf::from(AppConfig::DEFAULT_MEDIA_DIR));
    Ok(Json(storage.sync_media(&local_dir).await?))
}
