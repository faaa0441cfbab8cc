mod utils;
#[allow(unused)]
use utils::*;

mod tests {
    use super::*;

    use mock_service::{MockConfig, RESOURCE_ROUTE};
    use stampede::prelude::*;
    use std::num::NonZeroU32;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn batch_uploads_are_cleaned_up() {
        let target = Target::spawn(MockConfig::default()).await;

        let config = RunConfiguration::batch(25)
            .max_concurrency(5)
            .per_request_timeout(Duration::from_secs(10));
        let report = LoadTest::new(target.upload(photo(10 * 1024)), HttpContext::default(), config)
            .unwrap()
            .cleanup_with(target.deleter())
            .run()
            .await;

        let stats = report.statistics().unwrap();
        assert_eq!(stats.total, 25);
        assert_eq!(stats.succeeded, 25);
        assert_eq!(stats.success_rate, 100.);
        assert!(report.errors.is_empty());

        assert_eq!(report.cleanup.attempted, 25);
        assert_eq!(report.cleanup.succeeded, 25);
        assert_eq!(target.state.uploads(), 25);
        assert_eq!(target.state.stored().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn rejected_uploads_are_failures() {
        let target = Target::spawn(MockConfig {
            fail_every: Some(5),
            ..MockConfig::default()
        })
        .await;

        let config = RunConfiguration::batch(25).max_concurrency(5);
        let report = LoadTest::new(target.upload(photo(1024)), HttpContext::default(), config)
            .unwrap()
            .cleanup_with(target.deleter())
            .run()
            .await;

        let stats = report.statistics().unwrap();
        assert_eq!(stats.total, 25);
        assert_eq!(stats.succeeded, 20);
        assert_eq!(stats.success_rate, 80.);
        assert_eq!(report.errors.get("Simulated validation failure"), 5);

        assert_eq!(report.cleanup.attempted, 20);
        assert_eq!(target.state.stored().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn duration_mode_stress() {
        let target = Target::spawn(MockConfig {
            delay: Duration::from_millis(20),
            ..MockConfig::default()
        })
        .await;

        let config = RunConfiguration::timed(Duration::from_secs(1))
            .max_concurrency(10)
            .per_request_timeout(Duration::from_secs(2));
        let test = LoadTest::new(target.upload(photo(1024)), HttpContext::default(), config)
            .unwrap()
            .cleanup_with(target.deleter());
        let progress = test.progress();
        let report = test.run().await;

        let stats = report.statistics().unwrap();
        assert!(stats.total > 10);
        assert_eq!(stats.total, report.summary.dispatched);
        assert!(report.summary.wall_duration < Duration::from_millis(3_100));
        assert_eq!(progress.borrow().completed, stats.total);

        assert_eq!(report.cleanup.attempted as u64, stats.succeeded);
        assert_eq!(report.cleanup.failed, 0);
        assert_eq!(target.state.stored().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn throttled_target_reports_status() {
        let target = Target::spawn(MockConfig {
            max_rps: NonZeroU32::new(5),
            ..MockConfig::default()
        })
        .await;

        let config = RunConfiguration::batch(20).max_concurrency(10);
        let report = LoadTest::new(target.upload(photo(1024)), HttpContext::default(), config)
            .unwrap()
            .cleanup_with(target.deleter())
            .run()
            .await;

        let stats = report.statistics().unwrap();
        let throttled = report.errors.get("HTTP 429");
        assert!(throttled > 0);
        assert_eq!(stats.succeeded + throttled, 20);
        assert_eq!(target.state.stored().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn failed_deletes_are_reported() {
        let target = Target::spawn(MockConfig::default()).await;
        let wrong = HttpDeleter::new(
            target.client.clone(),
            format!("{}/api/missing", target.base),
            HttpContext::default(),
        );

        let report = LoadTest::new(
            target.upload(photo(1024)),
            HttpContext::default(),
            RunConfiguration::batch(3),
        )
        .unwrap()
        .cleanup_with(wrong)
        .run()
        .await;

        assert_eq!(report.cleanup.attempted, 3);
        assert_eq!(report.cleanup.failed, 3);
        assert_eq!(target.state.stored().await, 3);

        let listed: serde_json::Value = target
            .client
            .get(format!("{}{RESOURCE_ROUTE}", target.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listed["success"], true);
        assert_eq!(listed["data"].as_array().map(Vec::len), Some(3));
        assert_eq!(listed["data"][0]["posisi"], "Tester");
    }
}
