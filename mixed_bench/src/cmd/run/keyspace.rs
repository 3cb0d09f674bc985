use std::sync::Arc;

use mixed_bench_lib::store::StoreConnection;
use rama::{
    error::{ErrorContext as _, OpaqueError},
    telemetry::tracing,
};
use rand::{RngExt as _, rngs::StdRng};
use tokio::task::JoinSet;

use super::stats::OpKind;
use crate::config::KeySpaceConfig;

const PLACEHOLDER_VALUE: &[u8] = b"someValue";

/// The keys touched by the workload.
///
/// Reads target the full index range `[0, keys_count)`.
/// Writes target the prefix `[0, write_count)`, which is also the part
/// that gets pre-populated: reads of a key in that prefix hit,
/// reads of any other key miss.
#[derive(Debug)]
pub(crate) struct KeySpace {
    strings: Vec<Arc<str>>,
    hashes: Vec<Arc<str>>,
    write_count: usize,
    hash_field: Arc<str>,
    // write targets used when the hit rate leaves no key to write to
    spare_string: Arc<str>,
    spare_hash: Arc<str>,
}

impl KeySpace {
    pub(crate) fn new(prefix: &str, keys_count: usize, hit_rate: f64) -> Self {
        let hit_rate = clamp_hit_rate(hit_rate);
        let write_count = write_count(keys_count, hit_rate);

        let strings = (0..keys_count)
            .map(|i| Arc::from(format!("{prefix}:string:{i}")))
            .collect();
        let hashes = (0..keys_count)
            .map(|i| Arc::from(format!("{prefix}:hash:{i}")))
            .collect();

        tracing::debug!(%keys_count, %hit_rate, %write_count, "key space ready");

        Self {
            strings,
            hashes,
            write_count,
            hash_field: Arc::from(format!("{prefix}:field")),
            spare_string: Arc::from(format!("{prefix}:string:{keys_count}")),
            spare_hash: Arc::from(format!("{prefix}:hash:{keys_count}")),
        }
    }

    pub(crate) fn from_config(cfg: &KeySpaceConfig) -> Self {
        Self::new(
            &cfg.key_prefix,
            usize::try_from(cfg.keys_count).unwrap_or(usize::MAX),
            cfg.hit_rate,
        )
    }

    pub(crate) fn get_keys(&self) -> &[Arc<str>] {
        &self.strings
    }

    pub(crate) fn hget_keys(&self) -> &[Arc<str>] {
        &self.hashes
    }

    pub(crate) fn set_keys(&self) -> &[Arc<str>] {
        &self.strings[..self.write_count]
    }

    pub(crate) fn hset_keys(&self) -> &[Arc<str>] {
        &self.hashes[..self.write_count]
    }

    pub(crate) fn write_count(&self) -> usize {
        self.write_count
    }

    pub(crate) fn hash_field(&self) -> &str {
        &self.hash_field
    }

    /// Pick the target key of `op` uniformly from its key set.
    pub(crate) fn key_for(&self, op: OpKind, rng: &mut StdRng) -> &str {
        let keys = match op {
            OpKind::Set => self.set_keys(),
            OpKind::Get => self.get_keys(),
            OpKind::HSet => self.hset_keys(),
            OpKind::HGet => self.hget_keys(),
        };
        if keys.is_empty() {
            // only possible for writes with a 0% hit rate,
            // as the key count is at least one
            debug_assert!(op.is_write());
            return match op {
                OpKind::HSet | OpKind::HGet => &*self.spare_hash,
                OpKind::Set | OpKind::Get => &*self.spare_string,
            };
        }
        &*keys[rng.random_range(0..keys.len())]
    }

    /// Reset all keys and write the hit prefix.
    ///
    /// Both phases fire all their operations at once and wait for all of them.
    /// Any failure aborts the preparation as the hit rate would be meaningless.
    pub(crate) async fn prepopulate<C: StoreConnection>(&self, conn: &C) -> Result<(), OpaqueError> {
        let mut deletes = JoinSet::new();
        for (string_key, hash_key) in self.strings.iter().zip(&self.hashes) {
            let mut c = conn.clone();
            let key = string_key.clone();
            deletes.spawn(async move { c.del(&key).await });

            let mut c = conn.clone();
            let key = hash_key.clone();
            let field = self.hash_field.clone();
            deletes.spawn(async move { c.hdel(&key, &field).await });
        }
        join_all(deletes, "delete").await?;
        tracing::debug!(keys = self.strings.len(), "key space reset");

        let mut writes = JoinSet::new();
        for (string_key, hash_key) in self.set_keys().iter().zip(self.hset_keys()) {
            let mut c = conn.clone();
            let key = string_key.clone();
            writes.spawn(async move { c.set(&key, PLACEHOLDER_VALUE).await });

            let mut c = conn.clone();
            let key = hash_key.clone();
            let field = self.hash_field.clone();
            writes.spawn(async move { c.hset(&key, &field, PLACEHOLDER_VALUE).await });
        }
        join_all(writes, "write").await?;
        tracing::debug!(keys = self.write_count, "hit keys written");

        Ok(())
    }
}

async fn join_all(
    mut set: JoinSet<Result<(), OpaqueError>>,
    phase: &'static str,
) -> Result<(), OpaqueError> {
    while let Some(result) = set.join_next().await {
        result
            .with_context(|| format!("join prepare ({phase}) task"))?
            .with_context(|| format!("prepare ({phase}) key"))?;
    }
    Ok(())
}

/// Hit rates outside of `[0, 100]` fall back to 100.
pub(crate) fn clamp_hit_rate(hit_rate: f64) -> f64 {
    if (0.0..=100.0).contains(&hit_rate) {
        hit_rate
    } else {
        tracing::warn!(
            %hit_rate,
            "hit-rate can't be higher than 100 or lower than 0, setting it to 100"
        );
        100.
    }
}

/// `floor(keys_count * hit_rate / 100)`
pub(crate) fn write_count(keys_count: usize, hit_rate: f64) -> usize {
    // multiply first: `keys * (rate / 100)` loses the exact result for rates like 29
    let count = ((keys_count as f64 * hit_rate) / 100.).floor() as usize;
    count.min(keys_count)
}
