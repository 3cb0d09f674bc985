use std::{path::PathBuf, time::Duration};

use clap::ArgAction;
use rama::{
    error::{ErrorContext as _, OpaqueError},
    telemetry::tracing,
};

/// Sizing of the key space and the share of reads that hit.
#[derive(Debug, Clone, clap::Args)]
pub struct KeySpaceConfig {
    /// Number of keys to be used
    #[arg(long, value_name = "N", default_value_t = 16384, value_parser = clap::value_parser!(u64).range(1..))]
    pub keys_count: u64,

    /// Average hit rate (in percent) for GET and HGET.
    ///
    /// Values outside of [0, 100] fall back to 100.
    #[arg(long, value_name = "PERCENT", default_value_t = 100., allow_negative_numbers = true)]
    pub hit_rate: f64,

    /// Prefix for the keys used in the benchmark
    #[arg(long, default_value = "mixed-bench")]
    pub key_prefix: String,
}

/// Shape, pace and limits of the generated workload.
#[derive(Debug, Clone, clap::Args)]
pub struct WorkloadConfig {
    #[clap(flatten)]
    pub keyspace: KeySpaceConfig,

    /// Payload size in bytes
    #[arg(long, value_name = "BYTES", default_value_t = 300)]
    pub data_size: usize,

    /// Number of connections, each driven by its own worker
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub clients: usize,

    /// Max operations per second over all clients (0 for unlimited)
    #[arg(long, value_name = "OPS", default_value_t = 0)]
    pub rate_limit: u64,

    /// Seed of the random generator selecting operations and keys
    #[arg(long, default_value_t = 12345)]
    pub rand_seed: u64,

    /// Measure the round trip time of each operation
    #[arg(long, value_name = "BOOL", default_value_t = true, action = ArgAction::Set)]
    pub measure_rtt_latency: bool,

    /// Interval between two live statistics rows
    #[arg(long, value_name = "SECONDS", default_value_t = 1.)]
    pub client_update_tick: f64,

    /// Duration of the test, counted from the first operation (0 = until interrupted)
    #[arg(long, value_name = "SECONDS", default_value_t = 0.)]
    pub test_time: f64,

    /// Stop after this many operations (0 = unlimited)
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub messages: u64,

    /// Write the final results as JSON to this file
    #[arg(long, value_name = "PATH")]
    pub json_out_file: Option<PathBuf>,
}

impl WorkloadConfig {
    pub fn tick(&self) -> Result<Duration, OpaqueError> {
        let tick = Duration::try_from_secs_f64(self.client_update_tick)
            .context("invalid --client-update-tick")?;
        if tick.is_zero() {
            return Err(OpaqueError::from_display(
                "--client-update-tick has to be greater than zero",
            ));
        }
        Ok(tick)
    }

    /// `None` when the test is not bound in time.
    pub fn test_duration(&self) -> Option<Duration> {
        (self.test_time > 0.)
            .then(|| Duration::try_from_secs_f64(self.test_time).ok())
            .flatten()
    }

    pub fn log_banner(&self) {
        tracing::info!(rand_seed = self.rand_seed, "using random seed");
        if self.measure_rtt_latency {
            tracing::info!("RTT measurement enabled");
        }
        if self.rate_limit > 0 {
            tracing::info!(
                per_client = self.rate_limit.div_ceil(self.clients.max(1) as u64),
                "rate limiting enabled: {} ops/sec",
                self.rate_limit,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Debug, Parser)]
    struct Cli {
        #[clap(flatten)]
        workload: WorkloadConfig,
    }

    #[test]
    fn test_defaults() {
        let cfg = Cli::parse_from(["test"]).workload;
        assert_eq!(cfg.keyspace.keys_count, 16384);
        assert_eq!(cfg.keyspace.hit_rate, 100.);
        assert_eq!(cfg.keyspace.key_prefix, "mixed-bench");
        assert_eq!(cfg.data_size, 300);
        assert_eq!(cfg.clients, 1);
        assert_eq!(cfg.rand_seed, 12345);
        assert!(cfg.measure_rtt_latency);
        assert_eq!(cfg.tick().unwrap(), Duration::from_secs(1));
        assert_eq!(cfg.test_duration(), None);
        assert_eq!(cfg.messages, 0);
    }

    #[test]
    fn test_negative_hit_rate_is_accepted_by_the_parser() {
        let cfg = Cli::parse_from(["test", "--hit-rate", "-5"]).workload;
        assert_eq!(cfg.keyspace.hit_rate, -5.);
    }

    #[test]
    fn test_zero_keys_is_rejected() {
        assert!(Cli::try_parse_from(["test", "--keys-count", "0"]).is_err());
    }

    #[test]
    fn test_tick_and_duration() {
        let cfg = Cli::parse_from([
            "test",
            "--client-update-tick",
            "0.25",
            "--test-time",
            "2.5",
            "--measure-rtt-latency",
            "false",
        ])
        .workload;
        assert_eq!(cfg.tick().unwrap(), Duration::from_millis(250));
        assert_eq!(cfg.test_duration(), Some(Duration::from_millis(2500)));
        assert!(!cfg.measure_rtt_latency);

        let cfg = Cli::parse_from(["test", "--client-update-tick", "0"]).workload;
        assert!(cfg.tick().is_err());
    }
}
