use std::sync::Arc;

use clap::Args;
use mixed_bench_lib::store::{MemoryStore, RedisStore, Store, StoreConnection};
use rama::{
    error::{ErrorContext as _, OpaqueError},
    graceful::ShutdownGuard,
    telemetry::tracing,
};
use rand::{RngExt as _, SeedableRng as _, rngs::StdRng};
use tokio::task::JoinSet;

use crate::config::{ConnectionConfig, WorkloadConfig};

pub(crate) mod keyspace;
pub(crate) mod stats;

mod latency;
mod rate_limiter;
mod reporter;
mod result;
mod state;
mod worker;


use self::{
    keyspace::KeySpace,
    latency::RttRecorder,
    rate_limiter::RateLimiter,
    reporter::{HumanReporter, JsonlReporter, ReportConfig, Reporter, StopReason},
    result::{BenchmarkResult, RunMeta},
    state::RunState,
    stats::CommandStats,
    worker::WorkerContext,
};

/// Byte repeated to fill the SET and HSET payloads.
const PAYLOAD_BYTE: u8 = b'A';

#[derive(Debug, Clone, Args)]
/// run the mixed SET/GET/HSET/HGET workload
pub struct RunCommand {
    #[clap(flatten)]
    connection: ConnectionConfig,

    #[clap(flatten)]
    workload: WorkloadConfig,

    /// report json lines instead of a human-friendly table
    #[arg(long, default_value_t = false)]
    json: bool,
}

pub async fn exec(guard: ShutdownGuard, args: RunCommand) -> Result<(), OpaqueError> {
    args.workload.log_banner();
    args.connection.log_banner();

    let reporter: Box<dyn Reporter> = if args.json {
        Box::new(JsonlReporter::new())
    } else {
        Box::new(HumanReporter::new())
    };

    let meta = RunMeta {
        addresses: vec![args.connection.address()],
        cluster: args.connection.cluster,
        message_cap: args.workload.messages,
        rate_limit: args.workload.rate_limit,
    };

    let interrupt = guard.clone_weak().into_cancelled();

    let outcome = if args.connection.in_memory {
        run_benchmark(MemoryStore::new(), &args.workload, meta, reporter, interrupt).await?
    } else {
        let store = RedisStore::try_new(args.connection.redis_store_config())
            .await
            .context("create redis store")?;
        run_benchmark(store, &args.workload, meta, reporter, interrupt).await?
    };

    tracing::info!(
        reason = %outcome.stop_reason,
        total_messages = outcome.result.total_messages,
        stats = ?outcome.stats,
        "benchmark finished",
    );
    Ok(())
}

#[derive(Debug)]
struct BenchmarkOutcome {
    result: BenchmarkResult,
    stats: CommandStats,
    stop_reason: StopReason,
}

/// Prepare the key space, drive one worker per client until the
/// report loop stops the run, then aggregate and report the results.
async fn run_benchmark<S: Store>(
    store: S,
    cfg: &WorkloadConfig,
    meta: RunMeta,
    mut reporter: Box<dyn Reporter>,
    interrupt: impl Future<Output = ()>,
) -> Result<BenchmarkOutcome, OpaqueError> {
    // one connection prepares the keys, the others drive the workload
    if cfg.clients == 0 {
        return Err(OpaqueError::from_display(
            "not enough clients: at least one is required next to the preparation client",
        ));
    }
    let tick = cfg.tick()?;

    let keyspace = Arc::new(KeySpace::from_config(&cfg.keyspace));

    tracing::info!("preparing the server keys");
    let prep_conn = store
        .connect()
        .await
        .context("connect preparation client")?;
    keyspace
        .prepopulate(&prep_conn)
        .await
        .context("prepare key space")?;
    if let Err(err) = prep_conn.disconnect().await {
        tracing::warn!("failed to close preparation connection: {err}");
    }
    tracing::info!("preparation finished");

    let state = Arc::new(RunState::new(cfg.messages));
    let rtt = if cfg.measure_rtt_latency {
        Some(Arc::new(RttRecorder::try_new()?))
    } else {
        None
    };

    let mut connections = Vec::with_capacity(cfg.clients);
    for id in 0..cfg.clients {
        let conn = store
            .connect()
            .await
            .with_context(|| format!("connect client #{id}"))?;
        state.record_connect();
        connections.push(conn);
    }

    let payload = vec![PAYLOAD_BYTE; cfg.data_size];
    let mut seed_rng = StdRng::seed_from_u64(cfg.rand_seed);

    let mut workers = JoinSet::new();
    for (id, conn) in connections.into_iter().enumerate() {
        let ctx = WorkerContext {
            id,
            state: state.clone(),
            keyspace: keyspace.clone(),
            rtt: rtt.clone(),
            rate_limiter: RateLimiter::per_worker(cfg.rate_limit, cfg.clients),
            payload: payload.clone(),
            rng: StdRng::seed_from_u64(seed_rng.random()),
        };
        workers.spawn(worker::command_loop(conn, ctx));
    }
    tracing::debug!(clients = cfg.clients, "workers started");

    let report = reporter::report_loop(
        ReportConfig {
            tick,
            test_time: cfg.test_duration(),
        },
        &state,
        rtt.as_deref(),
        reporter.as_mut(),
        interrupt,
    )
    .await;
    let stop_reason = report.reason;

    tracing::info!("waiting for all clients to shut down cleanly");
    let mut stats = CommandStats::default();
    let mut connections = Vec::with_capacity(cfg.clients);
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok((conn, worker_stats)) => {
                stats += worker_stats;
                connections.push(conn);
            }
            Err(err) => tracing::error!("worker task failed: {err}"),
        }
    }

    let total_messages = state.total_ops();
    let result = BenchmarkResult::new(report, total_messages, meta, rtt.as_deref());
    reporter.finish(&result, &stats);

    let written = match &cfg.json_out_file {
        Some(path) => result.write_json(path).await,
        None => Ok(()),
    };

    tracing::info!("shutting down store connections");
    disconnect_all(connections).await;

    written?;
    Ok(BenchmarkOutcome {
        result,
        stats,
        stop_reason,
    })
}

async fn disconnect_all<C: StoreConnection>(connections: Vec<C>) {
    let mut set = JoinSet::new();
    for (id, conn) in connections.into_iter().enumerate() {
        set.spawn(async move { (id, conn.disconnect().await) });
    }
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, Ok(()))) => (),
            Ok((id, Err(err))) => {
                tracing::warn!(client = id, "failed to close connection: {err}");
            }
            Err(err) => tracing::warn!("disconnect task failed: {err}"),
        }
    }
}
