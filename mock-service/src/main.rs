use metrics_exporter_prometheus::PrometheusBuilder;
use mock_service::MockConfig;
use std::env;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mock_service=debug,tower_http=info")),
        )
        .init();

    PrometheusBuilder::new()
        .with_http_listener(env_or("MOCK_METRICS_ADDR", "0.0.0.0:8002").parse::<SocketAddr>()?)
        .install()?;

    let config = MockConfig {
        delay: Duration::from_millis(env_or("MOCK_DELAY_MS", "0").parse()?),
        fail_every: env::var("MOCK_FAIL_EVERY").ok().map(|v| v.parse()).transpose()?,
        max_rps: env::var("MOCK_MAX_RPS")
            .ok()
            .map(|v| v.parse::<NonZeroU32>())
            .transpose()?,
    };

    let addr: SocketAddr = env_or("MOCK_ADDR", "0.0.0.0:3000").parse()?;
    info!("Mock employee API listening on {addr} with {config:?}");
    mock_service::run(addr, config).await
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
