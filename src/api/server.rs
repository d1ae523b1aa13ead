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

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::{TcpListener, UnixListener};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::cli::ApiArgs;
use crate::service::NetworkStorage;

const DEFAULT_SOCKET_PATH: &str = "/tmp/pinas.sock";

/// All storage routes, with tracing and permissive CORS.
pub fn router(storage: NetworkStorage) -> Router {
    Router::new()
        .route("/config", get(handlers::get_config).put(handlers::put_config))
        .route("/test", post(handlers::test_connection))
        .route("/mount", post(handlers::mount))
        .route("/unmount", post(handlers::unmount))
        .route("/status", get(handlers::status))
        .route("/shares", get(handlers::shares))
        .route("/stats", get(handlers::stats))
        .route("/scan", post(handlers::scan))
        .route("/auto-mount", post(handlers::auto_mount))
        .route("/sync", post(handlers::sync))
        .with_state(storage)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Removes the socket file when the server stops.
struct SocketFile(PathBuf);

impl SocketFile {
    /// Bind a Unix listener at `path`, replacing a stale socket file and
    /// restricting access to the owner.
    fn bind(path: PathBuf) -> anyhow::Result<(UnixListener, Self)> {
        use std::os::unix::fs::PermissionsExt;

        match std::fs::remove_file(&path) {
            Ok(()) => tracing::info!(path = %path.display(), "removed stale socket file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove stale socket file"),
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create socket directory {}", parent.display()))?;
        }

        let listener = UnixListener::bind(&path)
            .with_context(|| format!("failed to bind Unix socket at {}", path.display()))?;
        if let Err(e) = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)) {
            tracing::warn!(error = %e, "failed to set socket permissions");
        }
        Ok((listener, Self(path)))
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for SocketFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.0) {
            Ok(()) => tracing::info!(path = %self.0.display(), "cleaned up socket file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(error = %e, "failed to remove socket file on shutdown"),
        }
    }
}

/// Serve the API on TCP, a Unix socket, or both, until Ctrl+C.
pub async fn run_api_mode(storage: NetworkStorage, args: &ApiArgs) -> anyhow::Result<()> {
    if args.auto_mount {
        let outcome = storage.auto_mount().await;
        tracing::info!(outcome = ?outcome, "startup auto-mount");
    }

    let app = router(storage);
    let socket_path = args.socket.as_ref().map(|s| {
        if s.is_empty() {
            PathBuf::from(DEFAULT_SOCKET_PATH)
        } else {
            PathBuf::from(s)
        }
    });

    let tcp = if args.port > 0 {
        let address = format!("{}:{}", args.bind, args.port);
        let listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("failed to bind TCP listener on {address}"))?;
        tracing::info!(address = %listener.local_addr()?, "API server listening on TCP");
        Some(listener)
    } else {
        None
    };

    let unix = match socket_path {
        Some(path) => {
            let (listener, guard) = SocketFile::bind(path)?;
            tracing::info!(path = %guard.path().display(), "API server listening on Unix socket");
            Some((listener, guard))
        }
        None => None,
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
        }
    };

    match (tcp, unix) {
        (Some(tcp), Some((unix, _guard))) => {
            tokio::select! {
                result = axum::serve(tcp, app.clone()) => result.context("TCP server error")?,
                result = axum::serve(unix, app) => result.context("Unix socket server error")?,
                _ = shutdown => tracing::info!("shutting down"),
            }
        }
        (Some(tcp), None) => {
            axum::serve(tcp, app)
                .with_graceful_shutdown(shutdown)
                .await
                .context("TCP server error")?;
        }
        (None, Some((unix, _guard))) => {
            axum::serve(unix, app)
                .with_graceful_shutdown(shutdown)
                .await
                .context("Unix socket server error")?;
        }
        (None, None) => bail!("no listeners configured, use --port or --socket"),
    }

    Ok(())
}
