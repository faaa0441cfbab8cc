//! Upload performance suite against an employee photo API.
//!
//! Targets `PHOTO_API_URL` when set, otherwise a local mock. `API_TOKEN` is sent as a bearer
//! token and `STRESS_SECS` shortens the stress phase.
use anyhow::{anyhow, bail, Result};
use mock_service::{MockConfig, RESOURCE_ROUTE, UPLOAD_ROUTE};
use reqwest::Client;
use stampede::prelude::*;
use std::env;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

const PROGRESS_EVERY: u64 = 10;
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter("stampede=info,photo_suite=info")
        .init();

    let base = match env::var("PHOTO_API_URL") {
        Ok(url) => url,
        Err(_) => {
            let (addr, _) = mock_service::spawn(MockConfig {
                delay: Duration::from_millis(15),
                ..MockConfig::default()
            })
            .await?;
            info!("PHOTO_API_URL not set; using mock at {addr}");
            format!("http://{addr}")
        }
    };
    let ctx = env::var("API_TOKEN")
        .map(HttpContext::bearer)
        .unwrap_or_default();
    let stress_secs = env::var("STRESS_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(30);

    let client = Client::new();
    preflight(&client, &base, &ctx).await?;

    let upload = MultipartUpload::new(
        client.clone(),
        format!("{base}{UPLOAD_ROUTE}"),
        "foto",
        photo(50 * 1024),
    )
    .field("nama", "Perf Test {i}")
    .field("posisi", "Tester")
    .field("gaji", "5000000")
    .field("kantor_id", "1");
    let deleter = HttpDeleter::new(client, format!("{base}{RESOURCE_ROUTE}"), ctx.clone());

    let mut reporter = Reporter::stdout();

    let sizes = [
        ("Small (10KB)".to_string(), photo(10 * 1024)),
        ("Medium (100KB)".to_string(), photo(100 * 1024)),
        ("Large (500KB)".to_string(), photo(500 * 1024)),
        ("X-Large (1MB)".to_string(), photo(1024 * 1024)),
    ];
    let sweep = payload_sweep(&upload, &ctx, &sizes, 5, UPLOAD_TIMEOUT, &deleter).await;
    reporter.payload_sweep(&sweep.results);
    reporter.cleanup(&sweep.cleanup);

    let load = LoadTest::new(
        upload.clone(),
        ctx.clone(),
        RunConfiguration::batch(25)
            .max_concurrency(5)
            .per_request_timeout(UPLOAD_TIMEOUT),
    )?
    .cleanup_with(deleter.clone());
    let printer = tokio::spawn(print_progress(load.progress()));
    let load = load.run().await;
    printer.await?;
    reporter.statistics("LOAD TEST RESULTS", load.statistics()?, &load.errors);
    reporter.cleanup(&load.cleanup);

    let stress = LoadTest::new(
        upload,
        ctx,
        RunConfiguration::timed(Duration::from_secs(stress_secs))
            .max_concurrency(10)
            .per_request_timeout(UPLOAD_TIMEOUT),
    )?
    .cleanup_with(deleter);
    let printer = tokio::spawn(print_progress(stress.progress()));
    let stress = stress.run().await;
    printer.await?;
    reporter.statistics("STRESS TEST RESULTS", stress.statistics()?, &stress.errors);
    reporter.cleanup(&stress.cleanup);

    let assessment = Assessment::grade(load.statistics()?, stress.statistics().ok());
    reporter.assessment(&assessment);

    Ok(())
}

/// Fails unless the employee list answers with a 2xx.
async fn preflight(client: &Client, base: &str, ctx: &HttpContext) -> Result<()> {
    let mut req = client
        .get(format!("{base}{RESOURCE_ROUTE}"))
        .timeout(Duration::from_secs(5));
    if let Some(token) = &ctx.token {
        req = req.bearer_auth(token);
    }

    let res = req
        .send()
        .await
        .map_err(|err| anyhow!("Server at {base} is not reachable: {err}"))?;
    if !res.status().is_success() {
        bail!("Server at {base} answered {}", res.status());
    }

    info!("Server at {base} is up.");
    Ok(())
}

fn photo(size: usize) -> Payload {
    Payload::filled(size, "perf_test_{i}.jpg", "image/jpeg")
}

async fn print_progress(mut progress: watch::Receiver<Progress>) {
    let mut reporter = Reporter::stdout();
    let mut next = PROGRESS_EVERY;

    while progress.changed().await.is_ok() {
        let snapshot = *progress.borrow_and_update();
        if snapshot.completed >= next {
            reporter.progress(&snapshot);
            next = (snapshot.completed / PROGRESS_EVERY + 1) * PROGRESS_EVERY;
        }
    }
}
