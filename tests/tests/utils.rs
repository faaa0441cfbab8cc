use metrics_exporter_prometheus::PrometheusBuilder;
use mock_service::{MockConfig, MockState, RESOURCE_ROUTE, UPLOAD_ROUTE};
use reqwest::Client;
use stampede::prelude::*;
use std::sync::{Arc, OnceLock};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[allow(unused)]
pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(
                "stampede=debug,mock_service=debug,axum::rejection=trace",
            ))
            .with_test_writer()
            .try_init();

        let _ = PrometheusBuilder::new().install_recorder();
    });
}

/// Mock employee API on an ephemeral port.
#[allow(unused)]
pub struct Target {
    pub base: String,
    pub state: Arc<MockState>,
    pub client: Client,
}

#[allow(unused)]
impl Target {
    pub async fn spawn(config: MockConfig) -> Self {
        init();
        let (addr, state) = mock_service::spawn(config).await.unwrap();
        Self {
            base: format!("http://{addr}"),
            state,
            client: Client::new(),
        }
    }

    pub fn upload(&self, payload: Payload) -> MultipartUpload {
        MultipartUpload::new(
            self.client.clone(),
            format!("{}{UPLOAD_ROUTE}", self.base),
            "foto",
            payload,
        )
        .field("nama", "Perf Test {i}")
        .field("posisi", "Tester")
        .field("gaji", "5000000")
        .field("kantor_id", "1")
    }

    pub fn deleter(&self) -> HttpDeleter {
        HttpDeleter::new(
            self.client.clone(),
            format!("{}{RESOURCE_ROUTE}", self.base),
            HttpContext::default(),
        )
    }
}

#[allow(unused)]
pub fn photo(size: usize) -> Payload {
    Payload::filled(size, "perf_test_{i}.jpg", "image/jpeg")
}
