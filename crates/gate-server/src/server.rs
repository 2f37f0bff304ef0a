//! `Gateway`: the HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{Extensions, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use gate_core::{ActionLookup, Dispatcher, GateError, LifecycleContext, Publisher, Server};
use gate_settings::WebSettings;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::cors::{CorsHeaders, cors_middleware};
use crate::errors::ServerError;
use crate::http::{error_response, handle_api};
use crate::router::RouteTable;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::broadcast::BroadcastEngine;
use crate::websocket::manager::ConnectionManager;
use crate::websocket::session::{WsContext, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Action dispatcher.
    pub dispatcher: Arc<Dispatcher>,
    /// Compiled HTTP routes.
    pub routes: Arc<RouteTable>,
    /// Prefix stripped before route matching.
    pub api_route: String,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// WebSocket session context.
    pub ws: WsContext,
    /// Prometheus handle for `/metrics`.
    pub metrics: Option<PrometheusHandle>,
}

struct Listening {
    addr: SocketAddr,
    serve: JoinHandle<std::io::Result<()>>,
}

/// The HTTP + WebSocket gateway.
///
/// Managed by the orchestrator as a [`Server`]: `initialize` compiles the
/// route table, `start` binds the listener, `stop` drains everything.
pub struct Gateway {
    settings: WebSettings,
    dispatcher: Arc<Dispatcher>,
    routes: Arc<RouteTable>,
    manager: Arc<ConnectionManager>,
    broadcast: Arc<BroadcastEngine>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    started: AtomicBool,
    listening: Mutex<Option<Listening>>,
}

impl Gateway {
    /// Create a gateway over `actions`.
    pub fn new(settings: WebSettings, actions: Arc<dyn ActionLookup>) -> Self {
        let dispatcher = Dispatcher::new(actions)
            .with_default_timeout(Duration::from_secs(settings.action_timeout_secs));
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let manager = Arc::new(ConnectionManager::new());
        let broadcast = Arc::new(BroadcastEngine::new(
            Arc::clone(&manager),
            settings.broadcast_queue_size,
            shutdown.token(),
        ));
        Self {
            settings,
            dispatcher: Arc::new(dispatcher),
            routes: Arc::new(RouteTable::new()),
            manager,
            broadcast,
            shutdown,
            metrics: None,
            started: AtomicBool::new(false),
            listening: Mutex::new(None),
        }
    }

    /// Serve `GET /metrics` from this handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Compile the route table from the current action list.
    pub fn build_routes(&self) -> Result<usize, ServerError> {
        self.routes.rebuild(&self.dispatcher.actions().actions())
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Result<Router, ServerError> {
        let cors = Arc::new(CorsHeaders::from_settings(&self.settings)?);
        let state = AppState {
            dispatcher: Arc::clone(&self.dispatcher),
            routes: Arc::clone(&self.routes),
            api_route: self.settings.api_route.clone(),
            max_body_bytes: self.settings.max_body_bytes,
            shutdown: Arc::clone(&self.shutdown),
            ws: WsContext {
                manager: Arc::clone(&self.manager),
                dispatcher: Arc::clone(&self.dispatcher),
                shutdown: self.shutdown.token(),
                tracker: self.shutdown.tracker(),
                queue_size: self.settings.outbound_queue_size,
                route: self.settings.ws_route.clone(),
            },
            metrics: self.metrics.clone(),
        };

        let mut router = Router::new().route(&self.settings.ws_route, get(ws_handler));
        if self.metrics.is_some() {
            router = router.route("/metrics", get(metrics_handler));
        }
        if self.settings.static_files_enabled {
            info!(
                route = %self.settings.static_files_route,
                directory = %self.settings.static_files_directory,
                "static files enabled"
            );
            router = router.nest_service(
                &self.settings.static_files_route,
                ServeDir::new(&self.settings.static_files_directory),
            );
        }

        Ok(router
            .fallback(handle_api)
            .layer(middleware::from_fn_with_state(cors, cors_middleware))
            .layer(TraceLayer::new_for_http())
            .with_state(state))
    }

    /// Bind the listener and start serving.
    ///
    /// Also starts the broadcast fan-out worker.
    pub async fn listen(&self) -> Result<SocketAddr, ServerError> {
        if self.shutdown.is_shutting_down() {
            return Err(ServerError::ShutDown);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyListening);
        }

        let router = match self.router() {
            Ok(router) => router,
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        let bind = self.settings.bind_address();
        let listener = match TcpListener::bind(&bind).await {
            Ok(listener) => listener,
            Err(source) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(ServerError::Bind { addr: bind, source });
            }
        };
        let addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: bind.clone(),
            source,
        })?;

        let _ = self.broadcast.start(&self.shutdown.tracker());

        let token = self.shutdown.token();
        let serve = tokio::spawn(async move {
            axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(token.cancelled_owned())
                .await
        });
        *self.listening.lock() = Some(Listening { addr, serve });

        info!(%addr, "gateway listening");
        Ok(addr)
    }

    /// Address the listener is bound to, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listening.lock().as_ref().map(|l| l.addr)
    }

    /// Stop accepting work and drain.
    ///
    /// 1. Cancel the shared shutdown token
    /// 2. Close every WebSocket session
    /// 3. Join all session workers and the fan-out worker
    /// 4. Wait for the listener to finish, bounded by the grace period
    pub async fn shutdown_gracefully(&self) {
        let grace = Duration::from_secs(self.settings.shutdown_grace_secs);

        self.shutdown.shutdown();
        let closing = self.manager.close_all();
        info!(sessions = closing, "closing websocket sessions");

        if !self.shutdown.graceful_shutdown(Some(grace)).await {
            warn!("some websocket workers did not finish in time");
        }

        let listening = self.listening.lock().take();
        if let Some(Listening { serve, .. }) = listening {
            let abort = serve.abort_handle();
            match tokio::time::timeout(grace, serve).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => error!(error = %e, "listener failed"),
                Ok(Err(e)) => error!(error = %e, "listener task panicked"),
                Err(_) => {
                    warn!("listener did not drain within {grace:?}, aborting");
                    abort.abort();
                }
            }
        }
        info!("gateway stopped");
    }

    /// Publishing capability for collaborators.
    pub fn publisher(&self) -> Arc<dyn Publisher> {
        Arc::clone(&self.broadcast) as Arc<dyn Publisher>
    }

    /// The broadcast engine.
    pub fn broadcast(&self) -> &Arc<BroadcastEngine> {
        &self.broadcast
    }

    /// The live WebSocket session table.
    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// The compiled route table.
    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The web settings this gateway was built from.
    pub fn settings(&self) -> &WebSettings {
        &self.settings
    }
}

#[async_trait]
impl Server for Gateway {
    fn name(&self) -> &str {
        "web"
    }

    async fn initialize(&self, _ctx: &LifecycleContext) -> anyhow::Result<()> {
        let count = self.build_routes()?;
        info!(routes = count, api_route = %self.settings.api_route, "web server initialized");
        Ok(())
    }

    async fn start(&self, ctx: &LifecycleContext) -> anyhow::Result<()> {
        self.shutdown.follow(ctx.shutdown_token());
        let _ = self.listen().await?;
        Ok(())
    }

    async fn stop(&self, _ctx: &LifecycleContext) -> anyhow::Result<()> {
        self.shutdown_gracefully().await;
        Ok(())
    }
}

/// GET <ws route>: upgrade to a WebSocket session.
async fn ws_handler(State(state): State<AppState>, extensions: Extensions, ws: WebSocketUpgrade) -> Response {
    if state.shutdown.is_shutting_down() {
        return error_response(&GateError::ShuttingDown);
    }
    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_owned(), |ConnectInfo(addr)| addr.to_string());
    let ctx = state.ws.clone();
    let tracker = ctx.tracker.clone();
    ws.on_upgrade(move |socket| tracker.track_future(run_ws_session(socket, peer, ctx)))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => (
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            crate::metrics::render(&handle),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use gate_core::{Action, ActionHandler, ActionRegistry, Connection, HttpMethod, InputField, Params};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    struct Status;

    #[async_trait]
    impl ActionHandler for Status {
        async fn run(&self, _conn: &Connection, _params: Params) -> Result<Value, GateError> {
            Ok(json!({"status": "ok"}))
        }
    }

    struct Echo;

    #[async_trait]
    impl ActionHandler for Echo {
        async fn run(&self, _conn: &Connection, params: Params) -> Result<Value, GateError> {
            Ok(json!({ "received": params }))
        }
    }

    struct Fails;

    #[async_trait]
    impl ActionHandler for Fails {
        async fn run(&self, _conn: &Connection, _params: Params) -> Result<Value, GateError> {
            Err(GateError::execution("nope"))
        }
    }

    fn make_gateway(settings: WebSettings) -> Gateway {
        let registry = ActionRegistry::from_actions([
            Action::new("status", Status).web(HttpMethod::Get, "/status"),
            Action::new("echo", Echo).web(HttpMethod::Get, "/echo/:message"),
            Action::new("create", Echo)
                .input(InputField::string("name").required())
                .input(InputField::integer("age"))
                .web(HttpMethod::Post, "/users/:id"),
            Action::new("fails", Fails).web(HttpMethod::Get, "/fails"),
        ])
        .unwrap();
        let gateway = Gateway::new(settings, Arc::new(registry));
        let _ = gateway.build_routes().unwrap();
        gateway
    }

    async fn call(gateway: &Gateway, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let resp = gateway.router().unwrap().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, headers, value)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn status_route_returns_success_envelope() {
        let gw = make_gateway(WebSettings::default());
        let (status, _, body) = call(&gw, get("/api/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "data": {"status": "ok"}}));
    }

    #[tokio::test]
    async fn unknown_route_is_route_not_found() {
        let gw = make_gateway(WebSettings::default());
        let (status, _, body) = call(&gw, get("/api/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "ROUTE_NOT_FOUND");
    }

    #[tokio::test]
    async fn paths_outside_prefix_do_not_match() {
        let gw = make_gateway(WebSettings::default());
        let (status, _, _) = call(&gw, get("/status")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = call(&gw, get("/apistatus")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn path_and_query_params_merge() {
        let gw = make_gateway(WebSettings::default());
        let (status, _, body) = call(&gw, get("/api/echo/hi?tag=a&tag=b&message=override")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["received"]["message"], "override");
        assert_eq!(body["data"]["received"]["tag"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn json_body_is_validated_and_coerced() {
        let gw = make_gateway(WebSettings::default());
        let req = Request::builder()
            .method("POST")
            .uri("/api/users/7?age=41")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"name":"Ann"}"#))
            .unwrap();
        let (status, _, body) = call(&gw, req).await;
        assert_eq!(status, StatusCode::OK);
        let received = &body["data"]["received"];
        assert_eq!(received["id"], "7");
        assert_eq!(received["name"], "Ann");
        assert_eq!(received["age"], 41);
    }

    #[tokio::test]
    async fn missing_required_param_is_reported() {
        let gw = make_gateway(WebSettings::default());
        let req = Request::builder()
            .method("POST")
            .uri("/api/users/7")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("age=3"))
            .unwrap();
        let (status, _, body) = call(&gw, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "PARAM_REQUIRED");
    }

    #[tokio::test]
    async fn malformed_json_is_invalid_request() {
        let gw = make_gateway(WebSettings::default());
        let req = Request::builder()
            .method("POST")
            .uri("/api/users/7")
            .header("content-type", "application/json")
            .body(Body::from("{nope"))
            .unwrap();
        let (status, _, body) = call(&gw, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn action_errors_use_envelope() {
        let gw = make_gateway(WebSettings::default());
        let (status, _, body) = call(&gw, get("/api/fails")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], json!({"code": "ACTION_ERROR", "message": "nope"}));
    }

    #[tokio::test]
    async fn cors_headers_on_every_response() {
        let gw = make_gateway(WebSettings::default());
        let (_, headers, _) = call(&gw, get("/api/nope")).await;
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers["access-control-allow-credentials"], "true");
        assert_eq!(headers["access-control-allow-headers"], "Content-Type,Authorization");
    }

    #[tokio::test]
    async fn options_short_circuits_with_empty_body() {
        let gw = make_gateway(WebSettings::default());
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/api/anything")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = call(&gw, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::Null);
        assert_eq!(headers["access-control-allow-methods"], "GET,POST,PUT,DELETE,PATCH,OPTIONS");
    }

    #[tokio::test]
    async fn custom_api_prefix() {
        let settings = WebSettings {
            api_route: "/v1".into(),
            ..WebSettings::default()
        };
        let gw = make_gateway(settings);
        let (status, _, _) = call(&gw, get("/v1/status")).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _, _) = call(&gw, get("/api/status")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_route_only_with_handle() {
        let gw = make_gateway(WebSettings::default());
        let (status, _, body) = call(&gw, get("/metrics")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "ROUTE_NOT_FOUND");

        let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle();
        let gw = make_gateway(WebSettings::default()).with_metrics(handle);
        let resp = gw.router().unwrap().oneshot(get("/metrics")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn static_files_are_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hi there").unwrap();
        let settings = WebSettings {
            static_files_enabled: true,
            static_files_directory: dir.path().to_string_lossy().into_owned(),
            ..WebSettings::default()
        };
        let gw = make_gateway(settings);
        let resp = gw.router().unwrap().oneshot(get("/public/hello.txt")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 1_000).await.unwrap();
        assert_eq!(&body[..], b"hi there");
    }

    #[tokio::test]
    async fn listen_twice_fails() {
        let settings = WebSettings {
            host: "127.0.0.1".into(),
            port: 0,
            ..WebSettings::default()
        };
        let gw = make_gateway(settings);
        let addr = gw.listen().await.unwrap();
        assert_eq!(gw.local_addr(), Some(addr));
        assert!(matches!(gw.listen().await, Err(ServerError::AlreadyListening)));

        gw.shutdown_gracefully().await;
        assert!(gw.local_addr().is_none());
        assert!(matches!(gw.listen().await, Err(ServerError::ShutDown)));
    }

    #[tokio::test]
    async fn publisher_rejects_after_shutdown() {
        let gw = make_gateway(WebSettings::default());
        gw.shutdown_gracefully().await;
        let err = gw.publisher().broadcast("c", json!(1)).unwrap_err();
        assert!(matches!(err, GateError::ShuttingDown));
    }
}
