mod utils;
#[allow(unused)]
use utils::*;

mod tests {
    use super::*;

    use mock_service::MockConfig;
    use stampede::prelude::*;
    use std::time::Duration;

    const UPLOAD_TIMEOUT: Duration = Duration::from_secs(10);

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn sweep_reports_each_size() {
        let target = Target::spawn(MockConfig::default()).await;

        let sizes = [
            ("Small (10KB)".to_string(), photo(10 * 1024)),
            ("Large (1MB)".to_string(), photo(1024 * 1024)),
        ];
        let sweep = payload_sweep(
            &target.upload(photo(0)),
            &HttpContext::default(),
            &sizes,
            3,
            UPLOAD_TIMEOUT,
            &target.deleter(),
        )
        .await;

        assert_eq!(sweep.results.len(), 2);
        for (res, (description, payload)) in sweep.results.iter().zip(&sizes) {
            assert_eq!(&res.description, description);
            assert_eq!(res.size_bytes, payload.len());
            assert_eq!(res.succeeded, 3);
            assert_eq!(res.failed, 0);
            assert!(res.mean.is_some());
            assert!(res.throughput_kbps().unwrap() > 0.);
        }

        assert_eq!(sweep.cleanup.attempted, 6);
        assert_eq!(sweep.cleanup.succeeded, 6);
        assert_eq!(target.state.uploads(), 6);
        assert_eq!(target.state.stored().await, 0);
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn rejected_sizes_count_as_failures() {
        let target = Target::spawn(MockConfig {
            fail_every: Some(1),
            ..MockConfig::default()
        })
        .await;

        let sweep = payload_sweep(
            &target.upload(photo(0)),
            &HttpContext::default(),
            &[("Tiny".to_string(), photo(512))],
            2,
            UPLOAD_TIMEOUT,
            &target.deleter(),
        )
        .await;

        let res = &sweep.results[0];
        assert_eq!(res.succeeded, 0);
        assert_eq!(res.failed, 2);
        assert_eq!(res.mean, None);
        assert_eq!(res.throughput_kbps(), None);
        assert_eq!(sweep.cleanup.attempted, 0);
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn stalled_uploads_time_out() {
        let target = Target::spawn(MockConfig {
            delay: Duration::from_secs(2),
            ..MockConfig::default()
        })
        .await;

        let started = std::time::Instant::now();
        let sweep = payload_sweep(
            &target.upload(photo(0)),
            &HttpContext::default(),
            &[("Small".to_string(), photo(1024))],
            2,
            Duration::from_millis(100),
            &target.deleter(),
        )
        .await;

        let res = &sweep.results[0];
        assert_eq!(res.succeeded, 0);
        assert_eq!(res.failed, 2);
        assert_eq!(sweep.cleanup.attempted, 0);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn failed_sweep_deletes_are_counted() {
        let target = Target::spawn(MockConfig::default()).await;
        let wrong = HttpDeleter::new(
            target.client.clone(),
            format!("{}/api/missing", target.base),
            HttpContext::default(),
        );

        let sweep = payload_sweep(
            &target.upload(photo(0)),
            &HttpContext::default(),
            &[("Small".to_string(), photo(1024))],
            2,
            UPLOAD_TIMEOUT,
            &wrong,
        )
        .await;

        assert_eq!(sweep.results[0].succeeded, 2);
        assert_eq!(sweep.cleanup.attempted, 2);
        assert_eq!(sweep.cleanup.failed, 2);
        assert_eq!(target.state.stored().await, 2);
    }
}
