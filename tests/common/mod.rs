#![allow(dead_code, clippy::unwrap_used)]

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use sessiongate::{
    client::{ApiClient, ClientConfig, Navigator},
    config::{Environment, RuntimeMode},
    credentials::{REFRESH_ROUTE, SET_TOKENS_ROUTE},
    gateway::{self, BackendConfig, GatewayConfig, RouteConfig},
    session::{MemoryStorage, SessionStorage},
};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::net::TcpListener;
use url::Url;

pub const EMAIL: &str = "ada@example.com";
pub const PASSWORD: &str = "correct horse";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshMode {
    Rotate,
    Reject,
    Malformed,
}

#[derive(Debug)]
struct Tokens {
    generation: usize,
    access: String,
    refresh: String,
}

/// In-process stand-in for the remote authorization backend.
#[derive(Debug)]
pub struct MockBackend {
    tokens: Mutex<Tokens>,
    mode: Mutex<RefreshMode>,
    refresh_delay: Mutex<Duration>,
    refresh_calls: AtomicUsize,
    protected_calls: AtomicUsize,
}

impl MockBackend {
    fn new() -> Self {
        Self {
            tokens: Mutex::new(Tokens {
                generation: 1,
                access: "a1".to_string(),
                refresh: "r1".to_string(),
            }),
            mode: Mutex::new(RefreshMode::Rotate),
            refresh_delay: Mutex::new(Duration::ZERO),
            refresh_calls: AtomicUsize::new(0),
            protected_calls: AtomicUsize::new(0),
        }
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Requests that reached `/protected`, rejected ones included.
    pub fn protected_calls(&self) -> usize {
        self.protected_calls.load(Ordering::SeqCst)
    }

    pub fn set_mode(&self, mode: RefreshMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }

    /// Invalidate the current access token so the next call answers 401.
    pub fn expire_access(&self) {
        self.tokens.lock().unwrap().access = "revoked".to_string();
    }

    fn accepts(&self, headers: &HeaderMap) -> Option<String> {
        let bearer = headers
            .get(AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")?
            .to_string();
        (bearer == self.tokens.lock().unwrap().access).then_some(bearer)
    }

    fn rotate(&self) -> serde_json::Value {
        let mut tokens = self.tokens.lock().unwrap();
        tokens.generation += 1;
        tokens.access = format!("a{}", tokens.generation);
        tokens.refresh = format!("r{}", tokens.generation);
        json!({
            "access_token": tokens.access,
            "refresh_token": tokens.refresh,
            "expires_in": 900,
            "token_type": "bearer",
        })
    }
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct RefreshBody {
    refresh_token: String,
}

async fn login(State(backend): State<Arc<MockBackend>>, Json(body): Json<LoginBody>) -> Response {
    if body.email != EMAIL || body.password != PASSWORD {
        return (StatusCode::UNAUTHORIZED, Json(json!({"detail": "bad credentials"})))
            .into_response();
    }
    let tokens = backend.tokens.lock().unwrap();
    Json(json!({
        "access_token": tokens.access,
        "refresh_token": tokens.refresh,
        "expires_in": 900,
        "token_type": "bearer",
    }))
    .into_response()
}

async fn me(State(backend): State<Arc<MockBackend>>, headers: HeaderMap) -> Response {
    if backend.accepts(&headers).is_none() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({"id": "u-1", "email": EMAIL, "name": "Ada"})).into_response()
}

async fn refresh(State(backend): State<Arc<MockBackend>>, Json(body): Json<RefreshBody>) -> Response {
    backend.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let delay = *backend.refresh_delay.lock().unwrap();
    tokio::time::sleep(delay).await;

    let mode = *backend.mode.lock().unwrap();
    match mode {
        RefreshMode::Reject => {
            (StatusCode::UNAUTHORIZED, Json(json!({"detail": "expired"}))).into_response()
        }
        RefreshMode::Malformed => Json(json!({"access_token": "partial"})).into_response(),
        RefreshMode::Rotate => {
            if body.refresh_token != backend.tokens.lock().unwrap().refresh {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            Json(backend.rotate()).into_response()
        }
    }
}

async fn protected(State(backend): State<Arc<MockBackend>>, headers: HeaderMap) -> Response {
    backend.protected_calls.fetch_add(1, Ordering::SeqCst);
    match backend.accepts(&headers) {
        Some(token) => Json(json!({"token": token})).into_response(),
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn always_unauthorized() -> StatusCode {
    StatusCode::UNAUTHORIZED
}

async fn serve(app: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });
    Url::parse(&format!("http://{addr}")).unwrap()
}

pub async fn spawn_backend() -> (Url, Arc<MockBackend>) {
    let backend = Arc::new(MockBackend::new());
    let app = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(|| async { StatusCode::NO_CONTENT }))
        .route("/protected", get(protected))
        .route("/always-401", get(always_unauthorized))
        .with_state(backend.clone());
    (serve(app).await, backend)
}

/// Broker calls that reached the gateway.
#[derive(Debug, Default)]
pub struct GatewayHits {
    set_tokens: AtomicUsize,
    refresh: AtomicUsize,
}

impl GatewayHits {
    pub fn set_tokens(&self) -> usize {
        self.set_tokens.load(Ordering::SeqCst)
    }

    pub fn refresh(&self) -> usize {
        self.refresh.load(Ordering::SeqCst)
    }
}

async fn count_hits(State(hits): State<Arc<GatewayHits>>, request: Request, next: Next) -> Response {
    match request.uri().path() {
        SET_TOKENS_ROUTE => hits.set_tokens.fetch_add(1, Ordering::SeqCst),
        REFRESH_ROUTE => hits.refresh.fetch_add(1, Ordering::SeqCst),
        _ => 0,
    };
    next.run(request).await
}

pub async fn spawn_gateway(backend_url: Url) -> (Url, Arc<GatewayHits>) {
    let config = GatewayConfig {
        backend: BackendConfig::new(backend_url),
        routes: RouteConfig::default(),
        environment: Environment::Development,
        mode: RuntimeMode::Normal,
    };
    let hits = Arc::new(GatewayHits::default());
    let app = gateway::app(&config)
        .unwrap()
        .layer(middleware::from_fn_with_state(hits.clone(), count_hits));
    (serve(app).await, hits)
}

/// Records every navigation instead of leaving the page.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visited: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        self.visited.lock().unwrap().push(path.to_string());
    }
}

pub struct Harness {
    pub client: ApiClient,
    pub backend: Arc<MockBackend>,
    pub navigator: Arc<RecordingNavigator>,
    pub storage: Arc<MemoryStorage>,
    pub gateway_hits: Arc<GatewayHits>,
    pub backend_url: Url,
    pub gateway_url: Url,
}

impl Harness {
    pub async fn start() -> Self {
        let (backend_url, backend) = spawn_backend().await;
        let (gateway_url, gateway_hits) = spawn_gateway(backend_url.clone()).await;
        let storage = Arc::new(MemoryStorage::new());
        let navigator = Arc::new(RecordingNavigator::default());
        let client = client(&backend_url, &gateway_url, storage.clone(), navigator.clone());

        Self {
            client,
            backend,
            navigator,
            storage,
            gateway_hits,
            backend_url,
            gateway_url,
        }
    }
}

pub fn client(
    backend_url: &Url,
    gateway_url: &Url,
    storage: Arc<dyn SessionStorage>,
    navigator: Arc<RecordingNavigator>,
) -> ApiClient {
    client_with(
        ClientConfig::new(backend_url.clone(), gateway_url.clone()),
        storage,
        navigator,
    )
}

pub fn client_with(
    config: ClientConfig,
    storage: Arc<dyn SessionStorage>,
    navigator: Arc<RecordingNavigator>,
) -> ApiClient {
    ApiClient::new(config, storage, navigator).unwrap()
}
