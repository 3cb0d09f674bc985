use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use rama::error::{ErrorContext as _, OpaqueError};
use serde::Serialize;

/// Highest trackable RTT: 60 seconds in microseconds.
const MAX_RTT_MICROS: u64 = 60_000_000;

/// Significant figures for histogram precision.
const SIGFIG: u8 = 3;

/// Round trip time recorder shared by all workers.
///
/// Every sample goes into a histogram that lives for the whole run
/// and feeds the final percentile summary. Next to it a running
/// sum/count window feeds the live average; only that window is
/// reset by the report loop.
#[derive(Debug)]
pub(crate) struct RttRecorder {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    histogram: Histogram<u64>,
    window_sum_ms: f64,
    window_count: u64,
}

/// Percentile summary of the recorded round trip times, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct RttSummary {
    pub(crate) avg_ms: f64,
    pub(crate) p50_ms: f64,
    pub(crate) p95_ms: f64,
    pub(crate) p99_ms: f64,
    pub(crate) p999_ms: f64,
    #[serde(rename = "totalCount")]
    pub(crate) total_count: u64,
}

impl RttRecorder {
    pub(crate) fn try_new() -> Result<Self, OpaqueError> {
        let histogram = Histogram::new_with_bounds(1, MAX_RTT_MICROS, SIGFIG)
            .context("create RTT histogram")?;
        Ok(Self {
            inner: Mutex::new(Inner {
                histogram,
                window_sum_ms: 0.,
                window_count: 0,
            }),
        })
    }

    pub(crate) fn record(&self, rtt: Duration) {
        self.record_ms(rtt.as_secs_f64() * 1000.);
    }

    /// Record a sample in (fractional) milliseconds.
    ///
    /// The histogram stores whole microseconds with a floor of 1,
    /// values that are not positive are ignored.
    pub(crate) fn record_ms(&self, value_ms: f64) {
        if value_ms.is_nan() || value_ms <= 0. {
            return;
        }
        let micros = ((value_ms * 1000.).floor() as u64).max(1);

        let mut inner = self.inner.lock();
        inner.histogram.saturating_record(micros);
        inner.window_sum_ms += value_ms;
        inner.window_count += 1;
    }

    /// Average of the samples recorded since the previous call,
    /// `None` if there were none. Resets the live window.
    pub(crate) fn take_window_average_ms(&self) -> Option<f64> {
        let mut inner = self.inner.lock();
        let sum = std::mem::take(&mut inner.window_sum_ms);
        let count = std::mem::take(&mut inner.window_count);
        (count > 0).then(|| sum / count as f64)
    }

    pub(crate) fn summary(&self) -> RttSummary {
        let inner = self.inner.lock();
        let h = &inner.histogram;
        let at = |p: f64| round3(h.value_at_percentile(p) as f64 / 1000.);
        RttSummary {
            avg_ms: round3(h.mean() / 1000.),
            p50_ms: at(50.),
            p95_ms: at(95.),
            p99_ms: at(99.),
            p999_ms: at(99.9),
            total_count: h.len(),
        }
    }
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.).round() / 100.
}

pub(crate) fn round3(v: f64) -> f64 {
    (v * 1000.).round() / 1000.
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_sub_microsecond_sample_records_as_one_micro() {
        let rtt = RttRecorder::try_new().unwrap();
        rtt.record_ms(0.0005);
        let summary = rtt.summary();
        assert_eq!(summary.total_count, 1);
        assert_eq!(summary.p50_ms, 0.001);
        assert_eq!(summary.p99_ms, 0.001);
    }

    #[test]
    fn test_non_positive_samples_are_ignored() {
        let rtt = RttRecorder::try_new().unwrap();
        rtt.record_ms(0.);
        rtt.record_ms(-3.);
        rtt.record_ms(f64::NAN);
        rtt.record(Duration::ZERO);
        assert_eq!(rtt.summary().total_count, 0);
        assert_eq!(rtt.take_window_average_ms(), None);
    }

    #[test]
    fn test_percentiles() {
        let rtt = RttRecorder::try_new().unwrap();
        for ms in 1..=100 {
            rtt.record_ms(ms as f64);
        }

        let summary = rtt.summary();
        assert_eq!(summary.total_count, 100);
        assert!((summary.avg_ms - 50.5).abs() < 0.1, "{summary:?}");
        assert!((summary.p50_ms - 50.).abs() < 0.1, "{summary:?}");
        assert!((summary.p95_ms - 95.).abs() < 0.1, "{summary:?}");
        assert!((summary.p99_ms - 99.).abs() < 0.1, "{summary:?}");
        assert!((summary.p999_ms - 100.).abs() < 0.1, "{summary:?}");
    }

    #[test]
    fn test_window_reset_keeps_histogram() {
        let rtt = RttRecorder::try_new().unwrap();
        rtt.record(Duration::from_millis(1));
        rtt.record(Duration::from_millis(3));

        assert_eq!(rtt.take_window_average_ms(), Some(2.));
        assert_eq!(rtt.take_window_average_ms(), None);
        assert_eq!(rtt.summary().total_count, 2);

        rtt.record_ms(10.);
        assert_eq!(rtt.take_window_average_ms(), Some(10.));
        assert_eq!(rtt.summary().total_count, 3);
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let rtt = Arc::new(RttRecorder::try_new().unwrap());
        std::thread::scope(|s| {
            for t in 0..8 {
                let rtt = rtt.clone();
                s.spawn(move || {
                    for i in 0..1000 {
                        rtt.record_ms(0.1 + (t * 1000 + i) as f64 / 1000.);
                    }
                });
            }
        });
        assert_eq!(rtt.summary().total_count, 8000);
        let avg = rtt.take_window_average_ms().unwrap();
        assert!(avg > 0.1);
        assert_eq!(rtt.take_window_average_ms(), None);
    }

    #[test]
    fn test_huge_sample_saturates() {
        let rtt = RttRecorder::try_new().unwrap();
        rtt.record(Duration::from_secs(3600));
        let summary = rtt.summary();
        assert_eq!(summary.total_count, 1);
        assert!(summary.p999_ms >= 59_999., "{summary:?}");
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round3(1.23456), 1.235);
        assert_eq!(round2(1.005_1), 1.01);
        assert_eq!(round3(0.0004), 0.);
    }
}
