#![allow(dead_code)]

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pantry_client::ClientBuilder;
use pantry_client::api::ApiClient;
use pantry_client::config::Config;
use pantry_client::domain::notice::Notice;
use pantry_client::services::notifier::Redirector;
use pantry_client::services::refresh::provider::TokenRefresher;
use pantry_client::storage::{MemoryTokenPersistence, TokenPersistence};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::sync::{Barrier, broadcast};

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("pantry_client=debug".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().init();
    });
}

/// How `GET /items` answers.
#[derive(Clone, Debug)]
pub enum ItemsBehavior {
    /// 200 for the currently valid token, `TOKEN_EXPIRED` otherwise. Stale
    /// requests are held at the barrier until all of them have arrived.
    ExpireStale { hold: Option<Arc<Barrier>> },
    /// `TOKEN_EXPIRED` no matter what.
    AlwaysExpired,
    /// 401 with the given body.
    Reject(Value),
    /// Any other status with the given body.
    Fail(StatusCode, Value),
}

/// How `POST /auth/refresh` answers.
#[derive(Clone, Debug)]
pub enum RefreshBehavior {
    Issue(String),
    Malformed,
    Reject(Value),
}

#[derive(Debug)]
pub struct MockState {
    pub valid_token: Mutex<String>,
    pub items: Mutex<ItemsBehavior>,
    pub refresh: Mutex<RefreshBehavior>,
    pub refresh_delay: Duration,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub seen_auth: Mutex<Vec<Option<String>>>,
    pub seen_request_ids: Mutex<Vec<String>>,
    pub refresh_cookies: Mutex<Vec<Option<String>>>,
}

impl MockState {
    pub fn new(items: ItemsBehavior, refresh: RefreshBehavior) -> Arc<Self> {
        Arc::new(Self {
            valid_token: Mutex::new("valid-token".to_string()),
            items: Mutex::new(items),
            refresh: Mutex::new(refresh),
            refresh_delay: Duration::from_millis(150),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            seen_auth: Mutex::new(Vec::new()),
            seen_request_ids: Mutex::new(Vec::new()),
            refresh_cookies: Mutex::new(Vec::new()),
        })
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn seen_auth(&self) -> Vec<Option<String>> {
        self.seen_auth.lock().unwrap().clone()
    }

    fn record(&self, headers: &HeaderMap) {
        let auth = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()).map(str::to_string);
        self.seen_auth.lock().unwrap().push(auth);
        if let Some(id) = headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
            self.seen_request_ids.lock().unwrap().push(id.to_string());
        }
    }
}

async fn list_items(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.record(&headers);
    let behavior = state.items.lock().unwrap().clone();
    let auth = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()).map(str::to_string);

    match behavior {
        ItemsBehavior::ExpireStale { hold } => {
            let valid = format!("Bearer {}", state.valid_token.lock().unwrap());
            if auth.as_deref() == Some(valid.as_str()) {
                return Json(json!({ "items": [{ "name": "lentils", "quantity": 2 }] })).into_response();
            }
            if let Some(barrier) = hold {
                barrier.wait().await;
            }
            (StatusCode::UNAUTHORIZED, Json(json!({ "code": "TOKEN_EXPIRED", "message": "Token expired" })))
                .into_response()
        }
        ItemsBehavior::AlwaysExpired => {
            (StatusCode::UNAUTHORIZED, Json(json!({ "code": "TOKEN_EXPIRED" }))).into_response()
        }
        ItemsBehavior::Reject(body) => (StatusCode::UNAUTHORIZED, Json(body)).into_response(),
        ItemsBehavior::Fail(status, body) => (status, Json(body)).into_response(),
    }
}

async fn create_item(State(state): State<Arc<MockState>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.record(&headers);
    (StatusCode::CREATED, Json(json!({ "created": body }))).into_response()
}

async fn refresh(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let cookie = headers.get(header::COOKIE).and_then(|v| v.to_str().ok()).map(str::to_string);
    state.refresh_cookies.lock().unwrap().push(cookie);
    tokio::time::sleep(state.refresh_delay).await;

    let behavior = state.refresh.lock().unwrap().clone();
    match behavior {
        RefreshBehavior::Issue(token) => {
            *state.valid_token.lock().unwrap() = token.clone();
            Json(json!({ "data": { "accessToken": token } })).into_response()
        }
        RefreshBehavior::Malformed => Json(json!({ "data": {} })).into_response(),
        RefreshBehavior::Reject(body) => (StatusCode::UNAUTHORIZED, Json(body)).into_response(),
    }
}

async fn login(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    if body["password"] == "correct horse" {
        *state.valid_token.lock().unwrap() = "login-token".to_string();
        return (
            [(header::SET_COOKIE, "refresh_token=r1; HttpOnly; Path=/")],
            Json(json!({ "data": { "accessToken": "login-token" } })),
        )
            .into_response();
    }
    (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Invalid credentials" }))).into_response()
}

async fn logout(State(state): State<Arc<MockState>>, headers: HeaderMap) -> StatusCode {
    state.record(&headers);
    state.logout_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

/// Serves the mock API on an ephemeral port and returns its base URL.
pub async fn spawn_api(state: Arc<MockState>) -> String {
    setup_tracing();

    let app = Router::new()
        .route("/api/items", get(list_items).post(create_item))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}/api")
}

#[derive(Debug, Default)]
pub struct RecordingRedirector {
    targets: Mutex<Vec<String>>,
}

impl RecordingRedirector {
    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }
}

impl Redirector for RecordingRedirector {
    fn redirect(&self, target: &str) {
        self.targets.lock().unwrap().push(target.to_string());
    }
}

pub struct TestClient {
    pub client: ApiClient,
    pub api: Arc<MockState>,
    pub persistence: Arc<MemoryTokenPersistence>,
    pub redirector: Arc<RecordingRedirector>,
    pub notices: broadcast::Receiver<Notice>,
}

impl TestClient {
    pub async fn spawn(api: Arc<MockState>, token: Option<&str>) -> Self {
        let base_url = spawn_api(Arc::clone(&api)).await;
        Self::spawn_with_config(api, token, get_test_config(&base_url)).await
    }

    pub async fn spawn_with_config(api: Arc<MockState>, token: Option<&str>, config: Config) -> Self {
        Self::spawn_with(api, token, config, None).await
    }

    pub async fn spawn_with_refresher(
        api: Arc<MockState>,
        token: Option<&str>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        let base_url = spawn_api(Arc::clone(&api)).await;
        Self::spawn_with(api, token, get_test_config(&base_url), Some(refresher)).await
    }

    async fn spawn_with(
        api: Arc<MockState>,
        token: Option<&str>,
        config: Config,
        refresher: Option<Arc<dyn TokenRefresher>>,
    ) -> Self {
        let persistence = Arc::new(MemoryTokenPersistence::new(token.map(str::to_string)));
        let redirector = Arc::new(RecordingRedirector::default());

        let mut builder = ClientBuilder::new(config)
            .with_persistence(Arc::clone(&persistence) as Arc<dyn TokenPersistence>)
            .with_redirector(Arc::clone(&redirector) as Arc<dyn Redirector>);
        if let Some(refresher) = refresher {
            builder = builder.with_refresher(refresher);
        }
        let client = builder.build().await.expect("Failed to build client");
        let notices = client.subscribe_notices();

        Self { client, api, persistence, redirector, notices }
    }

    pub async fn persisted_token(&self) -> Option<String> {
        self.persistence.read().await.unwrap()
    }

    pub async fn next_notice(&mut self) -> Notice {
        tokio::time::timeout(Duration::from_secs(2), self.notices.recv())
            .await
            .expect("Timed out waiting for notice")
            .expect("Notice channel closed")
    }

    pub async fn wait_for_redirects(&self) -> Vec<String> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.redirector.targets()
    }
}

pub fn get_test_config(base_url: &str) -> Config {
    let mut config = Config::with_base_url(base_url);
    config.auth.redirect_delay_ms = 50;
    config.http.request_timeout_secs = 5;
    config
}
