use clap::Args;
use mixed_bench_lib::store::{MemoryStore, RedisStore, Store, StoreConnection as _};
use rama::{
    error::{ErrorContext as _, OpaqueError},
    graceful::ShutdownGuard,
    telemetry::tracing,
};

use crate::{
    cmd::run::keyspace::KeySpace,
    config::{ConnectionConfig, KeySpaceConfig},
};

#[derive(Debug, Clone, Args)]
/// only reset and pre-populate the keys used by `run`
pub struct PrepareCommand {
    #[clap(flatten)]
    connection: ConnectionConfig,

    #[clap(flatten)]
    keyspace: KeySpaceConfig,
}

pub async fn exec(guard: ShutdownGuard, args: PrepareCommand) -> Result<(), OpaqueError> {
    args.connection.log_banner();

    let keyspace = KeySpace::from_config(&args.keyspace);
    let task = async {
        if args.connection.in_memory {
            prepare(MemoryStore::new(), &keyspace).await
        } else {
            let store = RedisStore::try_new(args.connection.redis_store_config())
                .await
                .context("create redis store")?;
            prepare(store, &keyspace).await
        }
    };

    until_interrupted(task, guard.cancelled()).await
}

async fn until_interrupted(
    task: impl Future<Output = Result<(), OpaqueError>>,
    interrupt: impl Future<Output = ()>,
) -> Result<(), OpaqueError> {
    tokio::select! {
        biased;

        _ = interrupt => Err(OpaqueError::from_display(
            "preparation interrupted: keys might be left half-written",
        )),
        result = task => result,
    }
}

async fn prepare<S: Store>(store: S, keyspace: &KeySpace) -> Result<(), OpaqueError> {
    tracing::info!("preparing the server keys");
    let conn = store.connect().await.context("connect preparation client")?;
    keyspace
        .prepopulate(&conn)
        .await
        .context("prepare key space")?;
    tracing::info!(
        hit_keys = keyspace.write_count(),
        "preparation finished: hit keys written per type"
    );

    if let Err(err) = conn.disconnect().await {
        tracing::warn!("failed to close preparation connection: {err}");
    }
    Ok(())
}
