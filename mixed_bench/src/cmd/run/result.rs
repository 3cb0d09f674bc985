use std::{path::Path, time::UNIX_EPOCH};

use rama::{
    error::{ErrorContext as _, OpaqueError},
    telemetry::tracing,
};
use serde::Serialize;

use super::{
    latency::{RttRecorder, RttSummary},
    reporter::{PerSecondStat, ReportOutcome},
};

const SEPARATOR: &str = "#################################################";

/// Static facts about the run that end up in the result artifact.
#[derive(Debug, Clone)]
pub(crate) struct RunMeta {
    pub(crate) addresses: Vec<String>,
    pub(crate) cluster: bool,
    pub(crate) message_cap: u64,
    pub(crate) rate_limit: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct BenchmarkResult {
    /// Milliseconds since the unix epoch.
    pub(crate) start_time: u64,
    /// Seconds.
    pub(crate) duration: f64,
    pub(crate) message_rate: f64,
    pub(crate) total_messages: u64,
    pub(crate) total_subscriptions: u64,
    pub(crate) messages_per_channel: u64,
    pub(crate) message_rate_ts: Vec<f64>,
    #[serde(rename = "OSSDistributedSlots")]
    pub(crate) oss_distributed_slots: bool,
    pub(crate) addresses: Vec<String>,
    pub(crate) per_second_stats: Vec<PerSecondStat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) rate_limit: Option<u64>,
    #[serde(rename = "RTTSummary", skip_serializing_if = "Option::is_none")]
    pub(crate) rtt_summary: Option<RttSummary>,
}

impl BenchmarkResult {
    pub(crate) fn new(
        report: ReportOutcome,
        total_messages: u64,
        meta: RunMeta,
        rtt: Option<&RttRecorder>,
    ) -> Self {
        let duration = report.duration.as_secs_f64();
        let message_rate = if duration > 0. {
            total_messages as f64 / duration
        } else {
            0.
        };
        let start_time = report
            .start_wall
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default();

        Self {
            start_time,
            duration,
            message_rate,
            total_messages,
            // the mixed workload does not subscribe to anything
            total_subscriptions: 0,
            messages_per_channel: meta.message_cap,
            message_rate_ts: report.message_rate_ts,
            oss_distributed_slots: meta.cluster,
            addresses: meta.addresses,
            per_second_stats: report.per_second,
            rate_limit: (meta.rate_limit > 0).then_some(meta.rate_limit),
            rtt_summary: rtt.map(RttRecorder::summary),
        }
    }

    pub(crate) fn print_summary(&self) {
        println!("{SEPARATOR}");
        println!("Total Duration: {:.6} Seconds", self.duration);
        println!("Message Rate: {:.6} msg/sec", self.message_rate);

        if let Some(rate_limit) = self.rate_limit {
            println!("Rate Limit: {rate_limit} ops/sec");
        }

        if let Some(rtt) = &self.rtt_summary {
            println!("Avg  RTT       {:.3} ms", rtt.avg_ms);
            println!("P50  RTT       {:.3} ms", rtt.p50_ms);
            println!("P95  RTT       {:.3} ms", rtt.p95_ms);
            println!("P99  RTT       {:.3} ms", rtt.p99_ms);
            println!("P999 RTT       {:.3} ms", rtt.p999_ms);
            println!(
                "Total Messages tracked latency      {} messages",
                rtt.total_count
            );
        }

        println!("{SEPARATOR}");
    }

    pub(crate) async fn write_json(&self, path: &Path) -> Result<(), OpaqueError> {
        let data = serde_json::to_vec_pretty(self).context("serialize benchmark result")?;
        tokio::fs::write(path, data)
            .await
            .with_context(|| format!("write benchmark result to {}", path.display()))?;
        tracing::info!(path = %path.display(), "results written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::cmd::run::reporter::StopReason;

    fn report(duration: Duration) -> ReportOutcome {
        ReportOutcome {
            start_wall: UNIX_EPOCH + Duration::from_millis(1_700_000_000_123),
            duration,
            per_second: vec![PerSecondStat {
                second: 0,
                messages: 100,
                message_rate: 100.,
                avg_rtt_ms: Some(0.25),
            }],
            message_rate_ts: vec![100.],
            reason: StopReason::MessageCap,
        }
    }

    fn meta(rate_limit: u64) -> RunMeta {
        RunMeta {
            addresses: vec!["127.0.0.1:6379".to_owned()],
            cluster: false,
            message_cap: 100,
            rate_limit,
        }
    }

    #[test]
    fn test_json_field_names() {
        let rtt = RttRecorder::try_new().unwrap();
        rtt.record_ms(0.25);

        let result = BenchmarkResult::new(report(Duration::from_secs(2)), 100, meta(50), Some(&rtt));
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["StartTime"], 1_700_000_000_123u64);
        assert_eq!(value["Duration"], 2.);
        assert_eq!(value["MessageRate"], 50.);
        assert_eq!(value["TotalMessages"], 100);
        assert_eq!(value["TotalSubscriptions"], 0);
        assert_eq!(value["MessagesPerChannel"], 100);
        assert_eq!(value["MessageRateTs"], serde_json::json!([100.]));
        assert_eq!(value["OSSDistributedSlots"], false);
        assert_eq!(value["Addresses"], serde_json::json!(["127.0.0.1:6379"]));
        assert_eq!(
            value["PerSecondStats"],
            serde_json::json!([{
                "second": 0,
                "messages": 100,
                "messageRate": 100.,
                "avgRttMs": 0.25,
            }])
        );
        assert_eq!(value["RateLimit"], 50);
        assert_eq!(value["RTTSummary"]["P50Ms"], 0.25);
        assert_eq!(value["RTTSummary"]["totalCount"], 1);
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let result = BenchmarkResult::new(report(Duration::ZERO), 100, meta(0), None);
        let value = serde_json::to_value(&result).unwrap();

        assert!(value.get("RateLimit").is_none());
        assert!(value.get("RTTSummary").is_none());
        // no time elapsed: no rate rather than infinity
        assert_eq!(value["MessageRate"], 0.);
    }

    #[tokio::test]
    async fn test_write_json() {
        let path = std::env::temp_dir().join(format!(
            "mixed-bench-result-{}-{}.json",
            std::process::id(),
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));

        let result = BenchmarkResult::new(report(Duration::from_secs(1)), 100, meta(0), None);
        result.write_json(&path).await.unwrap();

        let data = tokio::fs::read(&path).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&data).unwrap();
        assert_eq!(value["TotalMessages"], 100);
        assert!(String::from_utf8(data).unwrap().contains("\n  \"Duration\""));

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
