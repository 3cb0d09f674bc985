use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// State shared by the coordinator, the workers and the report loop
/// for the lifetime of a single benchmark run.
///
/// The running flag is written once (by whichever stop condition fires first)
/// and polled by every worker iteration. The counters are monotonic and only
/// read as snapshots.
#[derive(Debug)]
pub(crate) struct RunState {
    running: AtomicBool,
    total_ops: AtomicU64,
    total_connects: AtomicU64,
    budget: MessageBudget,
}

/// Shared allowance of operations when a message cap is configured.
///
/// A worker reserves a slot before issuing an operation and
/// returns it when the operation failed, so that exactly `cap`
/// successful operations are counted.
#[derive(Debug)]
struct MessageBudget {
    cap: u64,
    reserved: AtomicU64,
}

impl RunState {
    /// `message_cap == 0` means unlimited.
    pub(crate) fn new(message_cap: u64) -> Self {
        Self {
            running: AtomicBool::new(true),
            total_ops: AtomicU64::new(0),
            total_connects: AtomicU64::new(0),
            budget: MessageBudget {
                cap: message_cap,
                reserved: AtomicU64::new(0),
            },
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Flip the running flag to false.
    ///
    /// Returns `true` only for the caller that actually stopped the run.
    pub(crate) fn stop(&self) -> bool {
        self.running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn record_op(&self) {
        self.total_ops.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn total_ops(&self) -> u64 {
        self.total_ops.load(Ordering::Relaxed)
    }

    pub(crate) fn record_connect(&self) {
        self.total_connects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn total_connects(&self) -> u64 {
        self.total_connects.load(Ordering::Relaxed)
    }

    pub(crate) fn message_cap(&self) -> u64 {
        self.budget.cap
    }

    /// Reserve a slot for one operation.
    /// Always succeeds when no message cap is configured.
    pub(crate) fn try_reserve(&self) -> bool {
        let cap = self.budget.cap;
        if cap == 0 {
            return true;
        }
        self.budget
            .reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |reserved| {
                (reserved < cap).then_some(reserved + 1)
            })
            .is_ok()
    }

    /// Give back a slot reserved for an operation that failed.
    pub(crate) fn release(&self) {
        if self.budget.cap == 0 {
            return;
        }
        self.budget.reserved.fetch_sub(1, Ordering::AcqRel);
    }
}
