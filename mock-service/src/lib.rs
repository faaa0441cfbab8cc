use axum::{
    debug_handler,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
#[allow(unused)]
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::{
    num::NonZeroU32,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::debug;

pub const UPLOAD_ROUTE: &str = "/api/karyawans/with-photo";
pub const RESOURCE_ROUTE: &str = "/api/karyawans";

const BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Behavior knobs for the mock employee API.
#[derive(Clone, Debug, Default)]
pub struct MockConfig {
    /// Added to every upload before it is answered.
    pub delay: Duration,
    /// Every Nth upload is answered with `"success": false`.
    pub fail_every: Option<u64>,
    /// Uploads above this rate get a 429.
    pub max_rps: Option<NonZeroU32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Employee {
    pub id: u64,
    pub nama: String,
    pub posisi: String,
    pub gaji: String,
    pub kantor_id: String,
    pub foto_bytes: usize,
}

pub struct MockState {
    config: MockConfig,
    limiter: Option<DefaultDirectRateLimiter>,
    uploads: AtomicU64,
    next_id: AtomicU64,
    employees: RwLock<BTreeMap<u64, Employee>>,
}

impl MockState {
    pub fn new(config: MockConfig) -> Self {
        Self {
            limiter: config.max_rps.map(rate_limiter),
            config,
            uploads: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
            employees: RwLock::new(BTreeMap::new()),
        }
    }

    /// Upload attempts received, including rejected ones.
    pub fn uploads(&self) -> u64 {
        self.uploads.load(Ordering::Relaxed)
    }

    /// Employees currently stored.
    pub async fn stored(&self) -> usize {
        self.employees.read().await.len()
    }

    pub async fn employees(&self) -> Vec<Employee> {
        self.employees.read().await.values().cloned().collect()
    }
}

pub fn router(state: Arc<MockState>) -> Router {
    Router::new()
        .route(UPLOAD_ROUTE, post(create))
        .route(RESOURCE_ROUTE, get(list))
        .route(&format!("{RESOURCE_ROUTE}/:id"), delete(remove))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(addr: SocketAddr, config: MockConfig) -> anyhow::Result<()> {
    let app = router(Arc::new(MockState::new(config)));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Serves on an ephemeral local port in the background.
pub async fn spawn(config: MockConfig) -> anyhow::Result<(SocketAddr, Arc<MockState>)> {
    let state = Arc::new(MockState::new(config));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let app = router(state.clone());
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!("Mock service stopped: {err}");
        }
    });

    Ok((addr, state))
}

#[debug_handler]
async fn create(
    State(state): State<Arc<MockState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let n = state.uploads.fetch_add(1, Ordering::Relaxed) + 1;
    counter!("mock_service_uploads").increment(1);

    if let Some(limiter) = &state.limiter {
        if limiter.check().is_err() {
            debug!("MOCK SERVER ___ THROTTLED");
            return Err(failure(StatusCode::TOO_MANY_REQUESTS, "Too many requests"));
        }
    }

    tokio::time::sleep(state.config.delay).await;

    let mut fields = BTreeMap::new();
    let mut foto_bytes = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| failure(StatusCode::BAD_REQUEST, &err.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "foto" {
            let bytes = field
                .bytes()
                .await
                .map_err(|err| failure(StatusCode::BAD_REQUEST, &err.to_string()))?;
            foto_bytes = Some(bytes.len());
        } else {
            let text = field
                .text()
                .await
                .map_err(|err| failure(StatusCode::BAD_REQUEST, &err.to_string()))?;
            fields.insert(name, text);
        }
    }

    let Some(foto_bytes) = foto_bytes else {
        return Err(failure(StatusCode::UNPROCESSABLE_ENTITY, "Foto wajib diisi"));
    };

    if state.config.fail_every.is_some_and(|every| every > 0 && n % every == 0) {
        return Ok(Json(json!({
            "success": false,
            "message": "Simulated validation failure"
        })));
    }

    let mut field = |name: &str| fields.remove(name).unwrap_or_default();
    let id = state.next_id.fetch_add(1, Ordering::Relaxed);
    let employee = Employee {
        id,
        nama: field("nama"),
        posisi: field("posisi"),
        gaji: field("gaji"),
        kantor_id: field("kantor_id"),
        foto_bytes,
    };
    state.employees.write().await.insert(id, employee.clone());

    Ok(Json(json!({ "success": true, "data": employee })))
}

#[debug_handler]
async fn list(State(state): State<Arc<MockState>>) -> Json<Value> {
    Json(json!({ "success": true, "data": state.employees().await }))
}

#[debug_handler]
async fn remove(
    State(state): State<Arc<MockState>>,
    Path(id): Path<u64>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    counter!("mock_service_deletes").increment(1);
    match state.employees.write().await.remove(&id) {
        Some(_) => Ok(Json(json!({ "success": true }))),
        None => Err(failure(StatusCode::NOT_FOUND, "Karyawan tidak ditemukan")),
    }
}

fn failure(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "success": false, "message": message })))
}

/** Utils **/

pub fn rate_limiter(rps: NonZeroU32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(rps))
}
