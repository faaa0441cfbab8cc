use anyhow::Result;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, SkewNormal};
use stampede::prelude::*;
use std::time::Duration;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter("stampede=debug")
        .init();

    let config = RunConfiguration::batch(200)
        .max_concurrency(16)
        .per_request_timeout(Duration::from_millis(250));

    let distr = SkewNormal::new(40f64, 20., 4.)?;
    let work = work_fn(move |i| async move {
        let mut rng = SmallRng::seed_from_u64(i);
        let ms = distr.sample(&mut rng).max(1.);
        tokio::time::sleep(Duration::from_secs_f64(ms / 1000.)).await;

        if i % 17 == 0 {
            Err(InvocationError::Status(503))
        } else {
            Ok(Completion::empty())
        }
    });

    let report = LoadTest::new(work, (), config)?.run().await;

    let mut reporter = Reporter::stdout();
    reporter.statistics("SIMULATED BATCH", report.statistics()?, &report.errors);
    Ok(())
}
