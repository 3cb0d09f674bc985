use std::{fmt, time::Duration};

use ::redis::{
    Client, Cmd, FromRedisValue, IntoConnectionInfo as _, RedisResult,
    aio::MultiplexedConnection,
    cluster::{ClusterClient, ClusterClientBuilder},
    cluster_async::ClusterConnection,
};
use rama::{
    error::{ErrorContext as _, OpaqueError},
    telemetry::tracing,
};

use super::{Store, StoreConnection, TlsFiles};

/// Connection parameters for a Redis (compatible) server or OSS cluster.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout: Duration,
    /// use the OSS cluster API and route keys to their slot owners
    pub cluster: bool,
    /// connect over TLS (`rediss`) when defined
    pub tls: Option<TlsFiles>,
}

impl RedisStoreConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn url(&self) -> String {
        let scheme = if self.tls.is_some() { "rediss" } else { "redis" };
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let fragment = if self.tls.as_ref().is_some_and(|tls| tls.insecure) {
            "#insecure"
        } else {
            ""
        };
        format!("{scheme}://{host}:{}/{fragment}", self.port)
    }
}

#[derive(Clone)]
enum Backend {
    Standalone(Client),
    Cluster(ClusterClient),
}

/// [`Store`] backed by the `redis` crate.
#[derive(Clone)]
pub struct RedisStore {
    backend: Backend,
    address: String,
    connect_timeout: Duration,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("address", &self.address)
            .field(
                "cluster",
                &matches!(self.backend, Backend::Cluster(_)),
            )
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl RedisStore {
    pub async fn try_new(cfg: RedisStoreConfig) -> Result<Self, OpaqueError> {
        let mut info = cfg
            .url()
            .into_connection_info()
            .context("parse redis connection info")?;
        info.redis.username = cfg.username.clone();
        info.redis.password = cfg.password.clone();

        let certs = match &cfg.tls {
            Some(tls) if tls.has_certificates() => Some(tls.load_certificates().await?),
            _ => None,
        };

        let backend = if cfg.cluster {
            let mut builder = ClusterClientBuilder::new(vec![info]);
            if let Some(certs) = certs {
                // applied to every node discovered through the slot map
                builder = builder.certs(certs);
            }
            let client = builder.build().context("create redis cluster client")?;
            Backend::Cluster(client)
        } else {
            let client = match certs {
                Some(certs) => Client::build_with_tls(info, certs),
                None => Client::open(info),
            }
            .context("create redis client")?;
            Backend::Standalone(client)
        };

        tracing::debug!(
            address = %cfg.address(),
            cluster = cfg.cluster,
            tls = cfg.tls.is_some(),
            "redis store ready"
        );
        Ok(Self {
            backend,
            address: cfg.address(),
            connect_timeout: cfg.connect_timeout,
        })
    }
}

impl Store for RedisStore {
    type Connection = RedisConnection;

    async fn connect(&self) -> Result<Self::Connection, OpaqueError> {
        let connect = async {
            match &self.backend {
                Backend::Standalone(client) => client
                    .get_multiplexed_async_connection()
                    .await
                    .map(RedisConnection::Standalone),
                Backend::Cluster(client) => client
                    .get_async_connection()
                    .await
                    .map(RedisConnection::Cluster),
            }
        };

        tokio::time::timeout(self.connect_timeout, connect)
            .await
            .with_context(|| {
                format!(
                    "connect to '{}' timed out after {:?}",
                    self.address, self.connect_timeout
                )
            })?
            .with_context(|| format!("connect to '{}'", self.address))
    }
}

/// A multiplexed connection to a single server or to a cluster.
#[derive(Clone)]
pub enum RedisConnection {
    Standalone(MultiplexedConnection),
    Cluster(ClusterConnection),
}

impl fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standalone(_) => f.write_str("RedisConnection::Standalone"),
            Self::Cluster(_) => f.write_str("RedisConnection::Cluster"),
        }
    }
}

impl RedisConnection {
    async fn query<T: FromRedisValue>(&mut self, cmd: &Cmd) -> RedisResult<T> {
        match self {
            Self::Standalone(conn) => cmd.query_async(conn).await,
            Self::Cluster(conn) => cmd.query_async(conn).await,
        }
    }
}

impl StoreConnection for RedisConnection {
    async fn set(&mut self, key: &str, value: &[u8]) -> Result<(), OpaqueError> {
        let mut cmd = ::redis::cmd("SET");
        cmd.arg(key).arg(value);
        self.query::<()>(&cmd).await.context("redis SET")
    }

    async fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, OpaqueError> {
        let mut cmd = ::redis::cmd("GET");
        cmd.arg(key);
        self.query(&cmd).await.context("redis GET")
    }

    async fn hset(&mut self, key: &str, field: &str, value: &[u8]) -> Result<(), OpaqueError> {
        let mut cmd = ::redis::cmd("HSET");
        cmd.arg(key).arg(field).arg(value);
        self.query::<()>(&cmd).await.context("redis HSET")
    }

    async fn hget(&mut self, key: &str, field: &str) -> Result<Option<Vec<u8>>, OpaqueError> {
        let mut cmd = ::redis::cmd("HGET");
        cmd.arg(key).arg(field);
        self.query(&cmd).await.context("redis HGET")
    }

    async fn del(&mut self, key: &str) -> Result<(), OpaqueError> {
        let mut cmd = ::redis::cmd("DEL");
        cmd.arg(key);
        self.query::<()>(&cmd).await.context("redis DEL")
    }

    async fn hdel(&mut self, key: &str, field: &str) -> Result<(), OpaqueError> {
        let mut cmd = ::redis::cmd("HDEL");
        cmd.arg(key).arg(field);
        self.query::<()>(&cmd).await.context("redis HDEL")
    }

    async fn disconnect(mut self) -> Result<(), OpaqueError> {
        // the cluster connection closes its node connections when dropped
        if matches!(self, Self::Cluster(_)) {
            return Ok(());
        }
        let cmd = ::redis::cmd("QUIT");
        self.query::<()>(&cmd).await.context("redis QUIT")
    }
}
