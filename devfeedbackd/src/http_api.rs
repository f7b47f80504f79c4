//! HTTP and WebSocket API of the dev-feedback daemon.
//!
//! Provides:
//! - `POST /__timing_hmr_complete` - browser completion reports
//! - `GET /@devfeedback/client` - client bridge script (dev mode)
//! - `GET /__devfeedback/ws` - client events in, session events out
//! - `/__devfeedback/*` - lifecycle hooks for build-tool shims
//! - `/health` - basic daemon health check

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        DefaultBodyLimit, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use devfeedback_common::{DevFeedbackEvent, ReportOutcome};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::{Notify, broadcast, oneshot};
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::adapters::BuildResultPayload;
use crate::bridge::{
    CLIENT_MODULE_PATH, COMPLETION_PATH, ClientFormat, WS_PATH, client_script,
    inject_client_script,
};
use crate::session::{CompletionOutcome, CompletionReport, FeedbackSession};
use crate::test_run::VitestRun;

/// Build-result payloads of large projects exceed axum's 2 MB default.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

pub const CHANGE_PATH: &str = "/__devfeedback/change";
pub const CYCLE_START_PATH: &str = "/__devfeedback/cycle/start";
pub const CYCLE_END_PATH: &str = "/__devfeedback/cycle/end";
pub const TEST_RUN_PATH: &str = "/__devfeedback/test-run";
pub const HTML_PATH: &str = "/__devfeedback/html";
pub const PENDING_PATH: &str = "/__devfeedback/pending";
pub const SHUTDOWN_PATH: &str = "/__devfeedback/shutdown";

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub session: Arc<FeedbackSession>,
    /// Origin the browser uses to reach this server.
    pub base_url: String,
    pub version: &'static str,
    pub started_at: Instant,
    /// Signalled by `POST /__devfeedback/shutdown`.
    pub shutdown: Arc<Notify>,
}

impl HttpState {
    pub fn new(session: Arc<FeedbackSession>, base_url: impl Into<String>) -> Self {
        Self {
            session,
            base_url: base_url.into(),
            version: env!("CARGO_PKG_VERSION"),
            started_at: Instant::now(),
            shutdown: Arc::new(Notify::new()),
        }
    }
}

/// Create the router for all daemon endpoints.
pub fn create_router(state: HttpState) -> Router {
    Router::new()
        .route(COMPLETION_PATH, post(completion_handler))
        .route(CLIENT_MODULE_PATH, get(client_module_handler))
        .route(WS_PATH, get(ws_handler))
        .route(CHANGE_PATH, post(change_handler))
        .route(CYCLE_START_PATH, post(cycle_start_handler))
        .route(CYCLE_END_PATH, post(cycle_end_handler))
        .route(TEST_RUN_PATH, post(test_run_handler))
        .route(HTML_PATH, post(html_handler))
        .route(PENDING_PATH, get(pending_handler))
        .route(SHUTDOWN_PATH, post(shutdown_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

fn bad_request(error: impl ToString) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": error.to_string() })),
    )
        .into_response()
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(bad_request)
}

/// Like [`parse_body`], with an empty body meaning `T::default()`.
fn parse_optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    parse_body(body)
}

fn outcome_json(outcome: &ReportOutcome) -> Value {
    match outcome {
        ReportOutcome::Sent { endpoint } => json!({ "status": "sent", "endpoint": endpoint }),
        ReportOutcome::NotSent { endpoint, reason } => {
            json!({ "status": "not_sent", "endpoint": endpoint, "reason": reason })
        }
        ReportOutcome::Skipped => json!({ "status": "skipped" }),
    }
}

/// Handler for `POST /__timing_hmr_complete`.
///
/// 200 on match, 404 with the pending paths on no match, 500 when the body
/// is not a completion report.
async fn completion_handler(State(state): State<Arc<HttpState>>, body: Bytes) -> Response {
    let outcome = match CompletionReport::parse(&body) {
        Ok(report) => state.session.complete(&report).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(CompletionOutcome::Matched(_)) => Json(json!({ "success": true })).into_response(),
        Ok(CompletionOutcome::NoMatch {
            file,
            available_files,
        }) => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "reason": "No timing entry found for file",
                "file": file,
                "availableFiles": available_files,
            })),
        )
            .into_response(),
        Err(e) => {
            warn!("Rejected completion report: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Handler for `GET /@devfeedback/client[?format=runtime]`. 404 outside dev
/// mode.
async fn client_module_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<ClientQuery>,
) -> Response {
    if !state.session.mode().is_dev() {
        return StatusCode::NOT_FOUND.into_response();
    }
    let script = client_script(
        &state.base_url,
        state.session.tool(),
        state.session.cycle_started_at(),
        query.format,
    );
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        script,
    )
        .into_response()
}

/// Handler for `POST /__devfeedback/html`: returns the body with the client
/// script tag injected.
async fn html_handler(State(state): State<Arc<HttpState>>, body: String) -> Response {
    let html = inject_client_script(&body, &state.base_url, state.session.mode());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
        .into_response()
}

#[derive(Debug, Default, Deserialize)]
struct ChangeNotice {
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    files: Vec<String>,
}

/// Handler for `POST /__devfeedback/change` with `{file}` or `{files}`.
async fn change_handler(State(state): State<Arc<HttpState>>, body: Bytes) -> Response {
    let notice: ChangeNotice = match parse_body(&body) {
        Ok(notice) => notice,
        Err(response) => return response,
    };
    let raw: Vec<String> = notice.file.into_iter().chain(notice.files).collect();
    if raw.is_empty() {
        return bad_request("expected `file` or `files`");
    }

    let files: Vec<String> = raw
        .iter()
        .map(|path| state.session.on_change_detected(path))
        .collect();
    Json(json!({ "success": true, "files": files })).into_response()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CycleStart {
    #[serde(default)]
    modified_files: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ClientQuery {
    #[serde(default)]
    format: ClientFormat,
}

/// Handler for `POST /__devfeedback/cycle/start`. The body may be empty.
async fn cycle_start_handler(State(state): State<Arc<HttpState>>, body: Bytes) -> Response {
    let start: CycleStart = match parse_optional_body(&body) {
        Ok(start) => start,
        Err(response) => return response,
    };
    let started_at = state.session.on_cycle_start(&start.modified_files);
    Json(json!({ "success": true, "startedAt": started_at })).into_response()
}

/// Handler for `POST /__devfeedback/cycle/end` with a tagged build result.
async fn cycle_end_handler(State(state): State<Arc<HttpState>>, body: Bytes) -> Response {
    let payload: BuildResultPayload = match parse_body(&body) {
        Ok(payload) => payload,
        Err(response) => return response,
    };
    let outcome = state.session.on_cycle_end(&payload).await;
    Json(json!({ "success": true, "report": outcome_json(&outcome) })).into_response()
}

/// Handler for `POST /__devfeedback/test-run`.
async fn test_run_handler(State(state): State<Arc<HttpState>>, body: Bytes) -> Response {
    let run: VitestRun = match parse_body(&body) {
        Ok(run) => run,
        Err(response) => return response,
    };
    let outcome = state.session.report_test_run(run).await;
    Json(json!({ "success": true, "report": outcome_json(&outcome) })).into_response()
}

/// Handler for `GET /__devfeedback/pending`.
async fn pending_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let files = state.session.pending_files();
    Json(json!({ "count": files.len(), "files": files }))
}

/// Handler for `POST /__devfeedback/shutdown`.
async fn shutdown_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    info!("Shutdown requested over HTTP");
    state.shutdown.notify_one();
    Json(json!({ "success": true }))
}

/// Handler for `/health`.
async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": state.version,
        "pid": std::process::id(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "tool": state.session.tool(),
        "mode": state.session.mode(),
        "pending": state.session.pending_files().len(),
    }))
}

/// Handler for `GET /__devfeedback/ws`.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<HttpState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.session.clone()))
}

async fn handle_socket(socket: WebSocket, session: Arc<FeedbackSession>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = session.events().subscribe();
    debug!("WebSocket client connected");

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    ingest_client_frame(&session, text.as_str());
                }
                Some(Ok(Message::Binary(data))) => {
                    if let Ok(text) = std::str::from_utf8(&data) {
                        ingest_client_frame(&session, text);
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("WebSocket receive error: {}", e);
                    break;
                }
            },
            event = events.recv() => match event {
                Ok(payload) => {
                    if sender.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("WebSocket client lagged, {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    debug!("WebSocket client disconnected");
}

/// Append one client frame to the session buffer. Malformed frames are
/// logged and dropped.
pub fn ingest_client_frame(session: &FeedbackSession, text: &str) -> bool {
    match serde_json::from_str::<DevFeedbackEvent>(text) {
        Ok(event) => {
            info!(
                "[DevFeedback] Client event: {}, elapsedMs={}",
                event.kind, event.elapsed_ms
            );
            session.record_client_event(event);
            true
        }
        Err(e) => {
            warn!("[DevFeedback] Error parsing client message: {}", e);
            false
        }
    }
}

/// A bound, running server.
pub struct RunningServer {
    pub local_addr: SocketAddr,
    pub base_url: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<io::Result<()>>,
}

impl RunningServer {
    /// Stop accepting connections and wait for the server task.
    pub async fn shutdown(mut self) -> io::Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.handle.await.map_err(io::Error::other)?
    }
}

/// Browser-reachable origin for a bound address.
pub fn base_url_for(addr: SocketAddr) -> String {
    if addr.ip().is_unspecified() {
        format!("http://127.0.0.1:{}", addr.port())
    } else {
        format!("http://{}", addr)
    }
}

/// Bind `addr` and serve the daemon API until [`RunningServer::shutdown`].
pub async fn start_server(
    addr: SocketAddr,
    session: Arc<FeedbackSession>,
    shutdown: Arc<Notify>,
) -> io::Result<RunningServer> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    let base_url = base_url_for(local_addr);

    let mut state = HttpState::new(session, base_url.clone());
    state.shutdown = shutdown;
    let router = create_router(state);

    info!("[DevFeedback] server listening on {}", local_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    Ok(RunningServer {
        local_addr,
        base_url,
        shutdown_tx: Some(shutdown_tx),
        handle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Mode;
    use crate::events::EventBus;
    use crate::session::SessionSettings;
    use axum::body::Body;
    use axum::http::Request;
    use devfeedback_common::mock::{RecordingSink, StaticMetadata};
    use devfeedback_common::{EndpointTable, FallbackLog, ReportKind, Reporter};
    use tower::ServiceExt;

    const BASE: &str = "http://127.0.0.1:4000";

    struct TestApp {
        router: Router,
        session: Arc<FeedbackSession>,
        sink: Arc<RecordingSink>,
        shutdown: Arc<Notify>,
        _dir: tempfile::TempDir,
    }

    fn make_test_app(tool: ReportKind, mode: Mode) -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::accepting());
        let reporter = Reporter::new(
            sink.clone(),
            EndpointTable::fixed(
                Some("http://collector/webpack"),
                Some("http://collector/vite"),
                Some("http://collector/vitest"),
            ),
            FallbackLog::new(dir.path().join("devfeedback.log")),
        );
        let mut settings = SessionSettings::new("/test-root", tool);
        settings.mode = mode;
        let session = Arc::new(FeedbackSession::new(
            settings,
            reporter,
            Arc::new(StaticMetadata::default()),
            EventBus::default(),
        ));
        let state = HttpState::new(session.clone(), BASE);
        let shutdown = state.shutdown.clone();
        TestApp {
            router: create_router(state),
            session,
            sink,
            shutdown,
            _dir: dir,
        }
    }

    async fn send(router: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, Bytes) {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body)
    }

    async fn send_json(router: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
        let (status, bytes) = send(router, method, uri, body).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_completion_match_returns_success() {
        let app = make_test_app(ReportKind::Vite, Mode::Dev);
        app.session
            .on_change_detected_at("/test-root/src/test.js", 1000);

        let (status, json) = send_json(
            &app.router,
            "POST",
            COMPLETION_PATH,
            r#"{"file":"src/test.js","clientTimestamp":2000}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({ "success": true }));
        assert!(app.session.pending_files().is_empty());
        let deliveries = app.sink.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].1["timeTaken"], 1000.0);
        assert_eq!(deliveries[0].1["type"], "vitehmr");
    }

    #[tokio::test]
    async fn test_completion_without_entry_is_404_with_pending_files() {
        let app = make_test_app(ReportKind::Vite, Mode::Dev);
        app.session.on_change_detected_at("/test-root/a.js", 1000);

        let (status, json) = send_json(
            &app.router,
            "POST",
            COMPLETION_PATH,
            r#"{"file":"/missing.js","clientTimestamp":2000}"#,
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["success"], false);
        assert_eq!(json["reason"], "No timing entry found for file");
        assert_eq!(json["file"], "missing.js");
        assert_eq!(json["availableFiles"], json!(["a.js"]));
        assert!(app.sink.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_completion_is_500_and_registry_untouched() {
        let app = make_test_app(ReportKind::Vite, Mode::Dev);
        app.session.on_change_detected_at("/test-root/a.js", 1000);

        let (status, json) =
            send_json(&app.router, "POST", COMPLETION_PATH, "{\"file\": ").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["success"], false);
        assert!(json["error"].is_string());

        let (status, _) =
            send_json(&app.router, "POST", COMPLETION_PATH, r#"{"file":"a.js"}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(app.session.pending_files(), vec!["a.js"]);
    }

    #[tokio::test]
    async fn test_extreme_client_timestamp_is_500_and_entry_kept() {
        let app = make_test_app(ReportKind::Vite, Mode::Dev);
        app.session.on_change_detected_at("/test-root/a.js", 1000);

        let (status, json) = send_json(
            &app.router,
            "POST",
            COMPLETION_PATH,
            &format!(r#"{{"file":"a.js","clientTimestamp":{}}}"#, i64::MIN),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("out of range"));
        assert_eq!(app.session.pending_files(), vec!["a.js"]);
        assert!(app.sink.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_client_module_served_in_dev_mode() {
        let app = make_test_app(ReportKind::Vite, Mode::Dev);
        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(CLIENT_MODULE_PATH)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/javascript; charset=utf-8"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let script = String::from_utf8(body.to_vec()).unwrap();
        assert!(script.contains("vite:afterUpdate"));
        assert!(script.contains(BASE));
    }

    #[tokio::test]
    async fn test_client_module_runtime_form_for_bundlers() {
        let app = make_test_app(ReportKind::Webpack, Mode::Dev);

        let (status, body) = send(
            &app.router,
            "GET",
            &format!("{}?format=runtime", CLIENT_MODULE_PATH),
            "",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let script = String::from_utf8(body.to_vec()).unwrap();
        assert!(script.contains("module.hot"));
        assert!(!script.contains("import.meta"));

        let (_, body) = send(&app.router, "GET", CLIENT_MODULE_PATH, "").await;
        let script = String::from_utf8(body.to_vec()).unwrap();
        assert!(script.contains("import.meta.webpackHot"));

        let (status, _) = send(
            &app.router,
            "GET",
            &format!("{}?format=amd", CLIENT_MODULE_PATH),
            "",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_client_module_absent_in_build_mode() {
        let app = make_test_app(ReportKind::Vite, Mode::Build);
        let (status, _) = send(&app.router, "GET", CLIENT_MODULE_PATH, "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_html_injection_follows_mode() {
        let html = "<html><head></head><body></body></html>";

        let dev = make_test_app(ReportKind::Vite, Mode::Dev);
        let (_, body) = send(&dev.router, "POST", HTML_PATH, html).await;
        assert!(String::from_utf8_lossy(&body).contains("/@devfeedback/client"));

        let build = make_test_app(ReportKind::Vite, Mode::Build);
        let (_, body) = send(&build.router, "POST", HTML_PATH, html).await;
        assert_eq!(String::from_utf8_lossy(&body), html);
    }

    #[tokio::test]
    async fn test_change_endpoint_accepts_file_and_files() {
        let app = make_test_app(ReportKind::Webpack, Mode::Dev);

        let (status, json) = send_json(
            &app.router,
            "POST",
            CHANGE_PATH,
            r#"{"file":"C:\\proj\\src\\a.js"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["files"], json!(["C:/proj/src/a.js"]));

        let (_, json) = send_json(
            &app.router,
            "POST",
            CHANGE_PATH,
            r#"{"files":["/test-root/src/b.js","src/c.js"]}"#,
        )
        .await;
        assert_eq!(json["files"], json!(["src/b.js", "src/c.js"]));

        let (status, _) = send_json(&app.router, "POST", CHANGE_PATH, "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cycle_round_trip_reports_build() {
        let app = make_test_app(ReportKind::Webpack, Mode::Dev);
        app.session.on_change_detected_at("src/old.js", 1);

        let (status, json) = send_json(&app.router, "POST", CYCLE_START_PATH, "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["startedAt"].as_i64().unwrap() > 0);
        assert!(app.session.pending_files().is_empty());

        let (status, json) = send_json(
            &app.router,
            "POST",
            CYCLE_END_PATH,
            r#"{"tool":"webpack","time":321,"hash":"h1","modules":[{"built":true}]}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["report"]["status"], "sent");
        assert_eq!(json["report"]["endpoint"], "http://collector/webpack");

        let deliveries = app.sink.deliveries();
        assert_eq!(deliveries[0].1["nbrOfRebuiltModules"], 1);
        assert_eq!(deliveries[0].1["timeTaken"], 321.0);
    }

    #[tokio::test]
    async fn test_cycle_end_rejects_unknown_tool() {
        let app = make_test_app(ReportKind::Webpack, Mode::Dev);
        let (status, json) =
            send_json(&app.router, "POST", CYCLE_END_PATH, r#"{"tool":"gulp"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_test_run_endpoint() {
        let app = make_test_app(ReportKind::Vite, Mode::Build);
        let (status, json) = send_json(
            &app.router,
            "POST",
            TEST_RUN_PATH,
            r#"{"files":[{"name":"a.spec.ts","result":{"duration":8}}]}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["report"]["endpoint"], "http://collector/vitest");
    }

    #[tokio::test]
    async fn test_pending_and_health() {
        let app = make_test_app(ReportKind::Rsbuild, Mode::Dev);
        app.session.on_change_detected_at("src/z.ts", 5);
        app.session.on_change_detected_at("src/a.ts", 6);

        let (_, json) = send_json(&app.router, "GET", PENDING_PATH, "").await;
        assert_eq!(json, json!({ "count": 2, "files": ["src/a.ts", "src/z.ts"] }));

        let (status, json) = send_json(&app.router, "GET", "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["tool"], "rsbuild");
        assert_eq!(json["mode"], "dev");
        assert_eq!(json["pending"], 2);
    }

    #[tokio::test]
    async fn test_shutdown_endpoint_notifies() {
        let app = make_test_app(ReportKind::Vite, Mode::Dev);
        let (status, _) = send_json(&app.router, "POST", SHUTDOWN_PATH, "").await;
        assert_eq!(status, StatusCode::OK);

        tokio::time::timeout(std::time::Duration::from_millis(100), app.shutdown.notified())
            .await
            .expect("shutdown should be signalled");
    }

    #[tokio::test]
    async fn test_cors_preflight_allowed() {
        let app = make_test_app(ReportKind::Vite, Mode::Dev);
        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri(COMPLETION_PATH)
                    .header(header::ORIGIN, "http://localhost:5173")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response
                .headers()
                .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        );
    }

    #[test]
    fn test_client_frames_feed_buffer() {
        let app = make_test_app(ReportKind::Webpack, Mode::Dev);
        assert!(ingest_client_frame(
            &app.session,
            r#"{"type":"domUpdated","elapsedMs":88}"#
        ));
        assert!(!ingest_client_frame(&app.session, "not json"));
        assert_eq!(
            app.session.buffered_events(),
            vec![DevFeedbackEvent::new("domUpdated", 88)]
        );
    }

    #[test]
    fn test_base_url_for_unspecified_bind() {
        let addr: SocketAddr = "0.0.0.0:4100".parse().unwrap();
        assert_eq!(base_url_for(addr), "http://127.0.0.1:4100");
        let addr: SocketAddr = "127.0.0.1:4100".parse().unwrap();
        assert_eq!(base_url_for(addr), "http://127.0.0.1:4100");
    }
}
