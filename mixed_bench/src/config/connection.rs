use std::{path::PathBuf, time::Duration};

use clap::ArgAction;
use mixed_bench_lib::store::{RedisStoreConfig, TlsFiles};
use rama::telemetry::tracing;

/// Where and how to connect to the store under test.
#[derive(Debug, Clone, clap::Args)]
pub struct ConnectionConfig {
    /// Redis host
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Redis port
    #[arg(long, default_value_t = 6379)]
    pub port: u16,

    /// Password for Redis AUTH
    #[arg(short = 'a', long = "password", value_name = "PASSWORD")]
    pub password: Option<String>,

    /// ACL-style AUTH username
    #[arg(long, value_name = "USERNAME")]
    pub user: Option<String>,

    /// Connect timeout
    #[arg(long = "redis-timeout", value_name = "MILLISECONDS", default_value_t = 120_000)]
    pub timeout_ms: u64,

    /// Use the OSS cluster API, distributing keys over the cluster nodes
    #[arg(long = "oss-cluster-api-distribute-subscribers", default_value_t = false)]
    pub cluster: bool,

    /// Enable TLS/SSL connection
    #[arg(long, default_value_t = false)]
    pub tls: bool,

    /// Path to client private key file
    #[arg(long, value_name = "PATH")]
    pub tls_key: Option<PathBuf>,

    /// Path to client certificate file
    #[arg(long, value_name = "PATH")]
    pub tls_cert: Option<PathBuf>,

    /// Path to CA certificate file
    #[arg(long, value_name = "PATH")]
    pub tls_ca: Option<PathBuf>,

    /// Passphrase for encrypted private key file
    #[arg(long, value_name = "PASSPHRASE")]
    pub tls_key_passphrase: Option<String>,

    /// Reject unauthorized TLS/SSL certificates
    #[arg(long, value_name = "BOOL", default_value_t = true, action = ArgAction::Set)]
    pub reject_unauthorized: bool,

    /// Drive an in-process store instead of a server.
    ///
    /// Useful to measure the overhead of the benchmark itself.
    #[arg(long, default_value_t = false)]
    pub in_memory: bool,
}

impl ConnectionConfig {
    pub fn address(&self) -> String {
        if self.in_memory {
            "in-memory".to_owned()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn redis_store_config(&self) -> RedisStoreConfig {
        RedisStoreConfig {
            host: self.host.clone(),
            port: self.port,
            username: self.user.clone().filter(|s| !s.is_empty()),
            password: self.password.clone().filter(|s| !s.is_empty()),
            connect_timeout: self.timeout(),
            cluster: self.cluster,
            tls: self.tls.then(|| TlsFiles {
                ca: self.tls_ca.clone(),
                cert: self.tls_cert.clone(),
                key: self.tls_key.clone(),
                key_passphrase: self.tls_key_passphrase.clone().filter(|s| !s.is_empty()),
                insecure: !self.reject_unauthorized,
            }),
        }
    }

    /// Log the connection related startup banner.
    pub fn log_banner(&self) {
        if self.in_memory {
            tracing::info!("using the in-memory store, no server is contacted");
            return;
        }

        if self.tls {
            tracing::info!(
                ca = ?self.tls_ca,
                cert = ?self.tls_cert,
                key = ?self.tls_key,
                key_passphrase = self.tls_key_passphrase.is_some(),
                "TLS enabled"
            );
            if !self.reject_unauthorized {
                tracing::warn!("server certificate verification is disabled");
            }
        }

        tracing::info!(redis_timeout_ms = self.timeout_ms, "using redis timeout");
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Debug, Parser)]
    struct Cli {
        #[clap(flatten)]
        connection: ConnectionConfig,
    }

    #[test]
    fn test_defaults() {
        let cfg = Cli::parse_from(["test"]).connection;
        assert_eq!(cfg.address(), "127.0.0.1:6379");
        assert_eq!(cfg.timeout(), Duration::from_secs(120));
        assert!(cfg.reject_unauthorized);

        let store_cfg = cfg.redis_store_config();
        assert!(store_cfg.tls.is_none());
        assert!(store_cfg.password.is_none());
        assert!(!store_cfg.cluster);
    }

    #[test]
    fn test_tls_and_auth() {
        let cfg = Cli::parse_from([
            "test",
            "--tls",
            "--tls-ca",
            "/tmp/ca.pem",
            "--reject-unauthorized",
            "false",
            "-a",
            "secret",
            "--user",
            "",
        ])
        .connection;

        let store_cfg = cfg.redis_store_config();
        let tls = store_cfg.tls.unwrap();
        assert!(tls.insecure);
        assert_eq!(tls.ca, Some(PathBuf::from("/tmp/ca.pem")));
        assert_eq!(store_cfg.password.as_deref(), Some("secret"));
        // empty strings are treated as "not set"
        assert!(store_cfg.username.is_none());
    }
}
