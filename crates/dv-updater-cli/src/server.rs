//! HTTP API.
//!
//! Every JSON answer uses one envelope: `{"code", "message", "data"}` where
//! `code` mirrors the HTTP status and `data` is omitted on failures.

use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use dv_updater_config::config::HttpConfig;
use dv_updater_core::{
    error::{ErrorContext, UpdaterError},
    package_manager::Package,
    services::{validate_service_name, Services},
    UpdaterResult,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

fn ok_data<T: Serialize>(data: T) -> Response {
    Json(Envelope {
        code: StatusCode::OK.as_u16(),
        message: "OK".to_string(),
        data: Some(data),
    })
    .into_response()
}

fn ok_message(message: &str) -> Response {
    Json(Envelope::<()> {
        code: StatusCode::OK.as_u16(),
        message: message.to_string(),
        data: None,
    })
    .into_response()
}

fn fail(status: StatusCode, message: impl Into<String>) -> Response {
    let body = Envelope::<()> {
        code: status.as_u16(),
        message: message.into(),
        data: None,
    };
    (status, Json(body)).into_response()
}

#[derive(Clone)]
pub struct ApiState {
    pub services: Services,
    pub request_timeout: Duration,
}

impl ApiState {
    pub fn new(services: Services, http: &HttpConfig) -> Self {
        Self {
            services,
            request_timeout: http.request_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub name: String,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/api/v1/update", post(update_package))
        .route("/api/v1/version", get(updater_version))
        .route("/api/v1/version/{name}", get(package_version))
        .layer(middleware::from_fn_with_state(state.clone(), deadline))
        .with_state(state)
}

/// Bounds each request by the configured read and write timeouts.
///
/// Upgrades run on their own task, so a timed out request stops waiting
/// while the package manager finishes.
async fn deadline(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    match tokio::time::timeout(state.request_timeout, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            error!("request to {} timed out", path);
            fail(StatusCode::REQUEST_TIMEOUT, "request timed out")
        }
    }
}

async fn ping() -> &'static str {
    "pong"
}

async fn update_package(
    State(state): State<ApiState>,
    payload: Result<Json<UpdateRequest>, JsonRejection>,
) -> Response {
    let name = match payload {
        Ok(Json(request)) => request.name.trim().to_string(),
        Err(rejection) => return fail(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    if name.is_empty() {
        return fail(StatusCode::BAD_REQUEST, "name is empty");
    }

    let manager = state.services.package_manager.clone();
    let pkg = name.clone();
    let upgrade = tokio::spawn(async move {
        let result = manager.upgrade_package(&pkg).await;
        match &result {
            Ok(outcome) => debug!(pkg = %pkg, "upgrade finished: {:?}", outcome),
            Err(err) => error!(pkg = %pkg, "update failed: {}", err),
        }
        result
    });

    match upgrade.await {
        Ok(Ok(_)) => ok_message("Success update package"),
        Ok(Err(err)) => fail(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        Err(err) => {
            error!(pkg = %name, "update task failed: {}", err);
            fail(StatusCode::INTERNAL_SERVER_ERROR, "update task failed")
        }
    }
}

async fn package_version(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    if name.trim().is_empty() {
        return fail(StatusCode::BAD_REQUEST, "name is empty");
    }
    if validate_service_name(&name).is_err() {
        return fail(StatusCode::BAD_REQUEST, "name is invalid");
    }

    let manager = &state.services.package_manager;
    match manager.check_for_updates(&name).await {
        Ok(pkg) => ok_data(pkg),
        Err(UpdaterError::NothingToUpdate) => {
            let pkg = match manager.get_installed_package(&name).await {
                Ok(pkg) => pkg,
                Err(err) => {
                    debug!(pkg = %name, "installed version unavailable: {}", err);
                    Package {
                        name,
                        installed_version: String::new(),
                        available_version: String::new(),
                        need_for_update: false,
                    }
                }
            };
            ok_data(pkg)
        }
        Err(err) => {
            error!(pkg = %name, "update check failed: {}", err);
            fail(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

async fn updater_version(State(state): State<ApiState>) -> Response {
    ok_data(&state.services.system_info)
}

pub async fn bind(http: &HttpConfig) -> UpdaterResult<TcpListener> {
    let address = http.address();
    TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding HTTP listener on {address}"))
}

/// Serves the API until `cancel` fires, then drains open connections.
pub async fn serve(
    listener: TcpListener,
    state: ApiState,
    cancel: CancellationToken,
) -> UpdaterResult<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("HTTP API listening on http://{addr}");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .with_context(|| "serving HTTP API".to_string())?;

    info!("HTTP API stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        net::SocketAddr,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use async_trait::async_trait;
    use dv_updater_core::{
        package_manager::{Backend, PackageManager, UpgradeOutcome},
        services::SystemInfo,
    };
    use serde_json::Value;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpStream,
        task::JoinHandle,
    };

    use super::*;

    /// Manager with fixed answers: dv-merchant has an update, dv-processing
    /// is current, dv-updater is current and not installed.
    struct StubManager {
        upgrade_delay: Duration,
        upgraded: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PackageManager for StubManager {
        fn backend(&self) -> Backend {
            Backend::Apt
        }

        async fn get_installed_package(&self, name: &str) -> UpdaterResult<Package> {
            match name {
                "dv-processing" => Package::new(name, "2.0.0", ""),
                _ => Err(UpdaterError::PackageNotFound(name.to_string())),
            }
        }

        async fn check_for_updates(&self, name: &str) -> UpdaterResult<Package> {
            match name {
                "dv-merchant" => Package::new(name, "1.0.0", "1.1.0"),
                _ => Err(UpdaterError::NothingToUpdate),
            }
        }

        async fn upgrade_package(&self, name: &str) -> UpdaterResult<UpgradeOutcome> {
            tokio::time::sleep(self.upgrade_delay).await;
            self.upgraded.fetch_add(1, Ordering::SeqCst);
            match name {
                "broken" => {
                    Err(UpdaterError::ToolFailed {
                        tool: "apt".to_string(),
                        status: "exit status 100".to_string(),
                        output: "E: broken".to_string(),
                    })
                }
                _ => Ok(UpgradeOutcome::Upgraded),
            }
        }

        async fn update_repository(&self, _cancel: &CancellationToken) -> UpdaterResult<()> {
            Ok(())
        }
    }

    struct TestServer {
        addr: SocketAddr,
        upgraded: Arc<AtomicUsize>,
        cancel: CancellationToken,
        handle: JoinHandle<UpdaterResult<()>>,
    }

    impl TestServer {
        async fn start(upgrade_delay: Duration, request_timeout: Duration) -> Self {
            let upgraded = Arc::new(AtomicUsize::new(0));
            let services = Services {
                package_manager: Arc::new(StubManager {
                    upgrade_delay,
                    upgraded: upgraded.clone(),
                }),
                system_info: SystemInfo::new("1.4.2", "9f8e7d6"),
            };
            let state = ApiState {
                services,
                request_timeout,
            };
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let cancel = CancellationToken::new();
            let handle = tokio::spawn(serve(listener, state, cancel.clone()));
            Self {
                addr,
                upgraded,
                cancel,
                handle,
            }
        }

        async fn request(&self, method: &str, path: &str, body: &str) -> (u16, String) {
            let mut stream = TcpStream::connect(self.addr).await.unwrap();
            let request = format!(
                "{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\
                 Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(request.as_bytes()).await.unwrap();

            let mut raw = String::new();
            stream.read_to_string(&mut raw).await.unwrap();

            let status = raw
                .split_whitespace()
                .nth(1)
                .and_then(|code| code.parse::<u16>().ok())
                .unwrap();
            let body = raw
                .split_once("\r\n\r\n")
                .map(|(_, body)| body.to_string())
                .unwrap_or_default();
            (status, body)
        }

        async fn json(&self, method: &str, path: &str, body: &str) -> (u16, Value) {
            let (status, body) = self.request(method, path, body).await;
            (status, serde_json::from_str(&body).unwrap())
        }

        async fn stop(self) {
            self.cancel.cancel();
            self.handle.await.unwrap().unwrap();
        }
    }

    async fn server() -> TestServer {
        TestServer::start(Duration::ZERO, Duration::from_secs(20)).await
    }

    #[tokio::test]
    async fn test_ping() {
        let server = server().await;
        let (status, body) = server.request("GET", "/ping", "").await;
        assert_eq!(status, 200);
        assert_eq!(body, "pong");
        server.stop().await;
    }

    #[tokio::test]
    async fn test_updater_version() {
        let server = server().await;
        let (status, json) = server.json("GET", "/api/v1/version", "").await;
        assert_eq!(status, 200);
        assert_eq!(json["code"], 200);
        assert_eq!(json["data"]["app_version"], "1.4.2");
        assert_eq!(json["data"]["app_commit"], "9f8e7d6");
        server.stop().await;
    }

    #[tokio::test]
    async fn test_package_version() {
        let server = server().await;

        let (status, json) = server.json("GET", "/api/v1/version/dv-merchant", "").await;
        assert_eq!(status, 200);
        assert_eq!(json["data"]["installed_version"], "1.0.0");
        assert_eq!(json["data"]["available_version"], "1.1.0");
        assert_eq!(json["data"]["need_for_update"], true);

        // nothing to update falls back to the installed package
        let (status, json) = server.json("GET", "/api/v1/version/dv-processing", "").await;
        assert_eq!(status, 200);
        assert_eq!(json["data"]["installed_version"], "2.0.0");
        assert_eq!(json["data"]["need_for_update"], false);

        // or to a stub carrying only the name
        let (status, json) = server.json("GET", "/api/v1/version/dv-updater", "").await;
        assert_eq!(status, 200);
        assert_eq!(json["data"]["name"], "dv-updater");
        assert_eq!(json["data"]["installed_version"], "");

        server.stop().await;
    }

    #[tokio::test]
    async fn test_package_version_rejects_unknown_service() {
        let server = server().await;
        let (status, json) = server.json("GET", "/api/v1/version/nginx", "").await;
        assert_eq!(status, 400);
        assert_eq!(json["code"], 400);
        assert_eq!(json["message"], "name is invalid");
        assert!(json.get("data").is_none());
        server.stop().await;
    }

    #[tokio::test]
    async fn test_update_package() {
        let server = server().await;

        let (status, json) = server
            .json("POST", "/api/v1/update", r#"{"name":"dv-merchant"}"#)
            .await;
        assert_eq!(status, 200);
        assert_eq!(json["message"], "Success update package");

        let (status, json) = server.json("POST", "/api/v1/update", r#"{"name":""}"#).await;
        assert_eq!(status, 400);
        assert_eq!(json["message"], "name is empty");

        let (status, json) = server.json("POST", "/api/v1/update", "not json").await;
        assert_eq!(status, 400);
        assert_eq!(json["code"], 400);

        let (status, json) = server
            .json("POST", "/api/v1/update", r#"{"name":"broken"}"#)
            .await;
        assert_eq!(status, 500);
        assert_eq!(json["code"], 500);
        assert_eq!(
            json["message"],
            "apt command failed: exit status 100, output: E: broken"
        );

        server.stop().await;
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let server =
            TestServer::start(Duration::from_millis(400), Duration::from_millis(100)).await;

        let (status, json) = server
            .json("POST", "/api/v1/update", r#"{"name":"dv-merchant"}"#)
            .await;
        assert_eq!(status, 408);
        assert_eq!(json["message"], "request timed out");
        assert_eq!(server.upgraded.load(Ordering::SeqCst), 0);

        // the upgrade keeps running after the response went out
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(server.upgraded.load(Ordering::SeqCst), 1);

        server.stop().await;
    }
}
