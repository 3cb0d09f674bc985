use std::sync::Arc;

use mixed_bench_lib::store::StoreConnection;
use rama::telemetry::tracing;
use rand::rngs::StdRng;
use tokio::time::Instant;

use super::{
    keyspace::KeySpace,
    latency::RttRecorder,
    rate_limiter::RateLimiter,
    state::RunState,
    stats::{CommandStats, OpKind},
};

/// Everything a single worker needs next to its connection.
pub(crate) struct WorkerContext {
    pub(crate) id: usize,
    pub(crate) state: Arc<RunState>,
    pub(crate) keyspace: Arc<KeySpace>,
    pub(crate) rtt: Option<Arc<RttRecorder>>,
    pub(crate) rate_limiter: Option<RateLimiter>,
    pub(crate) payload: Vec<u8>,
    pub(crate) rng: StdRng,
}

/// Issue random operations until the run stops
/// (or the message budget is used up).
///
/// Returns the connection, so the coordinator can close it,
/// together with the tally of this worker.
pub(crate) async fn command_loop<C: StoreConnection>(
    mut conn: C,
    ctx: WorkerContext,
) -> (C, CommandStats) {
    let WorkerContext {
        id,
        state,
        keyspace,
        rtt,
        rate_limiter,
        payload,
        mut rng,
    } = ctx;

    let mut stats = CommandStats::default();
    let field = keyspace.hash_field();

    while state.is_running() {
        if let Some(limiter) = &rate_limiter {
            limiter.acquire().await;
            if !state.is_running() {
                break;
            }
        }

        if !state.try_reserve() {
            tracing::debug!(worker = id, "message budget used up: exit command loop");
            break;
        }

        let op = OpKind::random(&mut rng);
        let key = keyspace.key_for(op, &mut rng);

        let start = Instant::now();
        let result = match op {
            OpKind::Set => conn.set(key, &payload).await,
            OpKind::Get => conn.get(key).await.map(drop),
            OpKind::HSet => conn.hset(key, field, &payload).await,
            OpKind::HGet => conn.hget(key, field).await.map(drop),
        };
        let rtt_elapsed = start.elapsed();

        match result {
            Ok(()) => {
                if let Some(rtt) = &rtt
                    && !rtt_elapsed.is_zero()
                {
                    rtt.record(rtt_elapsed);
                }
                stats.record(op);
                state.record_op();
            }
            Err(err) => {
                state.release();
                tracing::error!(worker = id, %op, "error sending command: {err}");
            }
        }
    }

    tracing::debug!(worker = id, ops = stats.total(), "worker stopped");
    (conn, stats)
}

#[cfg(test)]
mod tests {
    use mixed_bench_lib::store::{MemoryStore, Store as _};
    use rama::telemetry::tracing;
    use rand::SeedableRng as _;
    use tracing_test::traced_test;

    use super::*;

    fn ctx(state: Arc<RunState>, keyspace: Arc<KeySpace>, rtt: Option<Arc<RttRecorder>>) -> WorkerContext {
        WorkerContext {
            id: 0,
            state,
            keyspace,
            rtt,
            rate_limiter: None,
            payload: vec![b'A'; 16],
            rng: StdRng::seed_from_u64(3),
        }
    }

    #[tokio::test]
    async fn test_stops_when_budget_is_used_up() {
        let store = MemoryStore::new();
        let conn = store.connect().await.unwrap();
        let state = Arc::new(RunState::new(500));
        let keyspace = Arc::new(KeySpace::new("w", 20, 50.));
        let rtt = Arc::new(RttRecorder::try_new().unwrap());

        let (_conn, stats) =
            command_loop(conn, ctx(state.clone(), keyspace, Some(rtt.clone()))).await;

        assert_eq!(stats.total(), 500);
        assert_eq!(state.total_ops(), 500);
        assert!(rtt.summary().total_count <= 500);
        for op in OpKind::ALL {
            assert!(stats.count(op) > 0, "{op} never issued");
        }
    }

    #[tokio::test]
    async fn test_stops_on_running_flag() {
        let store = MemoryStore::new();
        let conn = store.connect().await.unwrap();
        let state = Arc::new(RunState::new(0));
        let keyspace = Arc::new(KeySpace::new("w", 20, 100.));

        let handle = tokio::spawn(command_loop(conn, ctx(state.clone(), keyspace, None)));
        while state.total_ops() < 100 {
            tokio::task::yield_now().await;
        }
        assert!(state.stop());

        let (_conn, stats) = handle.await.unwrap();
        assert_eq!(stats.total(), state.total_ops());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_operation_after_stop_while_rate_limited() {
        let store = MemoryStore::new();
        let conn = store.connect().await.unwrap();
        let state = Arc::new(RunState::new(0));
        let keyspace = Arc::new(KeySpace::new("w", 20, 100.));

        let mut ctx = ctx(state.clone(), keyspace, None);
        // one token up front, the next one only after a second
        ctx.rate_limiter = Some(RateLimiter::new(1.));

        let handle = tokio::spawn(command_loop(conn, ctx));
        while state.total_ops() < 1 {
            tokio::task::yield_now().await;
        }
        // the worker is now waiting for its next token
        assert!(state.stop());

        let (_conn, stats) = handle.await.unwrap();
        assert_eq!(stats.total(), 1);
        assert_eq!(state.total_ops(), 1);
    }

    #[tokio::test]
    async fn test_writes_only_touch_the_hit_prefix() {
        let store = MemoryStore::new();
        let conn = store.connect().await.unwrap();
        let state = Arc::new(RunState::new(2000));
        let keyspace = Arc::new(KeySpace::new("w", 10, 30.));

        command_loop(conn, ctx(state, keyspace, None)).await;

        // 3 string and 3 hash keys at most, reads never create keys
        assert!(store.len() <= 6, "{}", store.len());
        assert!(!store.contains_key("w:string:3"));
        assert!(!store.contains_key("w:hash:9"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failures_are_logged_and_not_counted() {
        let store = MemoryStore::with_failure_every(4);
        let conn = store.connect().await.unwrap();
        let state = Arc::new(RunState::new(300));
        let keyspace = Arc::new(KeySpace::new("w", 10, 100.));

        let (_conn, stats) = command_loop(conn, ctx(state.clone(), keyspace, None)).await;

        assert_eq!(stats.total(), 300);
        assert_eq!(state.total_ops(), 300);
        assert!(logs_contain("error sending command"));
    }
}
