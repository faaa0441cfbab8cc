//! Human-readable rendering of run results. The only place in the crate that writes output.
use crate::assessment::{Assessment, PayloadSizeResult};
use crate::cleanup::CleanupReport;
use crate::executor::Progress;
use stampede_core::{AggregateStatistics, ErrorTally};
use std::io::{self, Write};
use std::time::Duration;
use tracing::warn;

const RULE_WIDTH: usize = 40;

/// Writes labeled result blocks to an output sink.
///
/// Write failures are logged and otherwise ignored.
pub struct Reporter<W: Write> {
    sink: W,
}

impl Reporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Reporter<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    /// Full statistics block followed by the error tally, if any errors were recorded.
    pub fn statistics(&mut self, title: &str, stats: &AggregateStatistics, errors: &ErrorTally) {
        self.emit(|w| {
            writeln!(w)?;
            writeln!(w, "{title}")?;
            writeln!(w, "{}", "=".repeat(RULE_WIDTH))?;
            writeln!(w, "Total Requests:      {}", stats.total)?;
            writeln!(
                w,
                "Successful:          {} ({:.1}%)",
                stats.succeeded, stats.success_rate
            )?;
            writeln!(w, "Failed:              {}", stats.failed)?;
            writeln!(w, "Average Response:    {}", secs(stats.mean))?;
            writeln!(w, "Min Response:        {}", secs(stats.min))?;
            writeln!(w, "Max Response:        {}", secs(stats.max))?;
            writeln!(w, "Median Response:     {}", secs(stats.median))?;
            writeln!(w, "95th Percentile:     {}", secs(stats.p95))?;
            writeln!(w, "99th Percentile:     {}", secs(stats.p99))?;
            writeln!(w, "Std Deviation:       {}", secs(stats.std_dev))?;
            writeln!(w, "Requests/sec:        {:.2}", stats.throughput)?;
            writeln!(
                w,
                "Total Duration:      {:.2}s",
                stats.wall_duration.as_secs_f64()
            )
        });
        self.errors(errors);
    }

    pub fn errors(&mut self, errors: &ErrorTally) {
        if errors.is_empty() {
            return;
        }

        self.emit(|w| {
            writeln!(w)?;
            writeln!(w, "ERRORS:")?;
            for (msg, count) in errors.sorted() {
                writeln!(w, "  {msg}: {count} times")?;
            }
            Ok(())
        });
    }

    pub fn progress(&mut self, progress: &Progress) {
        self.emit(|w| {
            writeln!(
                w,
                "Progress: {:.0}s elapsed, {} completed ({} ok, {} failed), {} in flight, {:.1} RPS",
                progress.elapsed.as_secs_f64(),
                progress.completed,
                progress.succeeded,
                progress.failed,
                progress.in_flight,
                progress.rate(),
            )
        });
    }

    pub fn cleanup(&mut self, report: &CleanupReport) {
        self.emit(|w| {
            writeln!(
                w,
                "Cleaned up {}/{} created resources",
                report.succeeded, report.attempted
            )?;
            if report.failed > 0 {
                writeln!(
                    w,
                    "Cleanup failures:    {} ({})",
                    report.failed,
                    report.failed_ids.join(", ")
                )?;
            }
            Ok(())
        });
    }

    pub fn assessment(&mut self, assessment: &Assessment) {
        self.emit(|w| {
            writeln!(w)?;
            writeln!(w, "PERFORMANCE ASSESSMENT")?;
            writeln!(w, "{}", "=".repeat(RULE_WIDTH))?;
            writeln!(w, "Load Test RPS:       {:.2}", assessment.load_rps)?;
            writeln!(w, "Stress Test RPS:     {:.2}", assessment.stress_rps)?;
            writeln!(
                w,
                "Load Success Rate:   {:.1}%",
                assessment.load_success_rate
            )?;
            if let Some(rate) = assessment.stress_success_rate {
                writeln!(w, "Stress Success Rate: {rate:.1}%")?;
            }
            writeln!(w)?;
            writeln!(w, "{}", assessment.rating)?;
            writeln!(w, "  {}", assessment.rating.advice())
        });
    }

    pub fn payload_sweep(&mut self, results: &[PayloadSizeResult]) {
        self.emit(|w| {
            writeln!(w)?;
            writeln!(w, "PAYLOAD SIZE SUMMARY")?;
            writeln!(w, "{}", "=".repeat(60))?;
            writeln!(
                w,
                "{:<25} {:<10} {:<10} {:<10} {:<5}",
                "Description", "Size (KB)", "Time (s)", "KB/s", "Fail"
            )?;
            writeln!(w, "{}", "-".repeat(60))?;
            for res in results {
                let time = res
                    .mean
                    .map_or("-".to_string(), |m| format!("{:.3}", m.as_secs_f64()));
                let kbps = res
                    .throughput_kbps()
                    .map_or("-".to_string(), |k| format!("{k:.1}"));
                writeln!(
                    w,
                    "{:<25} {:<10.1} {:<10} {:<10} {:<5}",
                    res.description,
                    res.size_bytes as f64 / 1024.,
                    time,
                    kbps,
                    res.failed
                )?;
            }
            Ok(())
        });
    }

    fn emit(&mut self, f: impl FnOnce(&mut W) -> io::Result<()>) {
        if let Err(err) = f(&mut self.sink).and_then(|_| self.sink.flush()) {
            warn!("Failed to write report: {err}");
        }
    }
}

fn secs(d: Duration) -> String {
    format!("{:.3}s", d.as_secs_f64())
}
