use std::{
    fmt,
    time::{Duration, SystemTime},
};

use rama::telemetry::tracing;
use serde::Serialize;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::{
    latency::{RttRecorder, round2, round3},
    result::BenchmarkResult,
    state::RunState,
    stats::CommandStats,
};

mod human;
mod json;

pub(crate) use self::{human::HumanReporter, json::JsonlReporter};

#[cfg(test)]
pub(crate) use self::json::CapturedOutput;

/// Sink for the live statistics produced by [`report_loop`].
pub(crate) trait Reporter: Send + 'static {
    fn on_start(&mut self, measure_rtt: bool);
    fn on_tick(&mut self, tick: &TickReport);
    fn on_stop(&mut self, reason: StopReason);
    /// Called once with the aggregated outcome, after all workers exited.
    fn finish(&mut self, result: &BenchmarkResult, stats: &CommandStats);
}

/// Snapshot taken on a single reporting tick.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TickReport {
    /// Whole seconds since the (re-based) start of the run.
    pub(crate) second: u64,
    pub(crate) total_messages: u64,
    pub(crate) message_rate: f64,
    pub(crate) connect_rate: f64,
    /// `None` when RTT is not measured or nothing was recorded this tick.
    pub(crate) avg_rtt_ms: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopReason {
    MessageCap,
    TestTime,
    Interrupt,
}

impl StopReason {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::MessageCap => "message_cap",
            Self::TestTime => "test_time",
            Self::Interrupt => "interrupt",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PerSecondStat {
    pub(crate) second: u64,
    pub(crate) messages: u64,
    pub(crate) message_rate: f64,
    pub(crate) avg_rtt_ms: Option<f64>,
}

impl From<&TickReport> for PerSecondStat {
    fn from(tick: &TickReport) -> Self {
        Self {
            second: tick.second,
            messages: tick.total_messages,
            message_rate: round2(tick.message_rate),
            avg_rtt_ms: tick.avg_rtt_ms.map(round3),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ReportConfig {
    pub(crate) tick: Duration,
    pub(crate) test_time: Option<Duration>,
}

#[derive(Debug)]
pub(crate) struct ReportOutcome {
    pub(crate) start_wall: SystemTime,
    pub(crate) duration: Duration,
    pub(crate) per_second: Vec<PerSecondStat>,
    pub(crate) message_rate_ts: Vec<f64>,
    pub(crate) reason: StopReason,
}

/// Tick until the message cap is reached, the test time elapsed
/// or `interrupt` resolves, whichever comes first.
///
/// The start of the run is moved to the first tick that observes
/// operations, so setup time is not accounted for.
/// The running flag of `state` is cleared before returning.
pub(crate) async fn report_loop(
    cfg: ReportConfig,
    state: &RunState,
    rtt: Option<&RttRecorder>,
    reporter: &mut dyn Reporter,
    interrupt: impl Future<Output = ()>,
) -> ReportOutcome {
    reporter.on_start(rtt.is_some());
    let message_cap = state.message_cap();

    let mut start = Instant::now();
    let mut start_wall = SystemTime::now();
    let mut prev_time = start;
    let mut prev_messages = 0;
    let mut prev_connects = 0;

    let mut per_second = Vec::new();
    let mut message_rate_ts = Vec::new();

    let mut ticker = time::interval_at(start + cfg.tick, cfg.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut interrupt = std::pin::pin!(interrupt);

    let reason = loop {
        tokio::select! {
            biased;

            _ = &mut interrupt => break StopReason::Interrupt,
            _ = ticker.tick() => (),
        }

        let now = Instant::now();
        let elapsed = now.duration_since(prev_time).as_secs_f64();
        let total_messages = state.total_ops();
        let total_connects = state.total_connects();

        let (message_rate, connect_rate) = if elapsed > 0. {
            (
                total_messages.saturating_sub(prev_messages) as f64 / elapsed,
                total_connects.saturating_sub(prev_connects) as f64 / elapsed,
            )
        } else {
            (0., 0.)
        };

        if prev_messages == 0 && total_messages != 0 {
            start = now;
            start_wall = SystemTime::now();
        }
        if total_messages != 0 {
            message_rate_ts.push(message_rate);
        }

        prev_time = now;
        prev_messages = total_messages;
        prev_connects = total_connects;

        let tick = TickReport {
            second: now.duration_since(start).as_secs(),
            total_messages,
            message_rate,
            connect_rate,
            avg_rtt_ms: rtt.and_then(RttRecorder::take_window_average_ms),
        };
        per_second.push(PerSecondStat::from(&tick));
        reporter.on_tick(&tick);

        if message_cap > 0 && total_messages >= message_cap {
            break StopReason::MessageCap;
        }
        if let Some(test_time) = cfg.test_time
            && total_messages != 0
            && now.duration_since(start) >= test_time
        {
            break StopReason::TestTime;
        }
    };

    let duration = Instant::now().duration_since(start);

    if state.stop() {
        tracing::debug!(%reason, "benchmark stopped");
        reporter.on_stop(reason);
    } else {
        tracing::debug!(%reason, "benchmark was already stopped");
    }

    ReportOutcome {
        start_wall,
        duration,
        per_second,
        message_rate_ts,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    struct Recorded {
        started: Option<bool>,
        ticks: Vec<TickReport>,
        stops: Vec<StopReason>,
    }

    #[derive(Debug, Clone, Default)]
    struct RecordingReporter(Arc<Mutex<Recorded>>);

    impl Reporter for RecordingReporter {
        fn on_start(&mut self, measure_rtt: bool) {
            self.0.lock().started = Some(measure_rtt);
        }

        fn on_tick(&mut self, tick: &TickReport) {
            self.0.lock().ticks.push(tick.clone());
        }

        fn on_stop(&mut self, reason: StopReason) {
            self.0.lock().stops.push(reason);
        }

        fn finish(&mut self, _result: &BenchmarkResult, _stats: &CommandStats) {}
    }

    fn cfg(test_time: Option<Duration>) -> ReportConfig {
        ReportConfig {
            tick: Duration::from_secs(1),
            test_time,
        }
    }

    fn record_ops(state: &RunState, n: u64) {
        for _ in 0..n {
            state.record_op();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_message_cap() {
        let state = RunState::new(1000);
        record_ops(&state, 1000);
        state.record_connect();

        let mut reporter = RecordingReporter::default();
        let outcome = report_loop(
            cfg(None),
            &state,
            None,
            &mut reporter,
            std::future::pending(),
        )
        .await;

        assert_eq!(outcome.reason, StopReason::MessageCap);
        assert!(!state.is_running());
        assert_eq!(outcome.message_rate_ts, vec![1000.]);
        assert_eq!(
            outcome.per_second,
            vec![PerSecondStat {
                second: 0,
                messages: 1000,
                message_rate: 1000.,
                avg_rtt_ms: None,
            }]
        );

        let recorded = reporter.0.lock();
        assert_eq!(recorded.started, Some(false));
        assert_eq!(recorded.ticks[0].connect_rate, 1.);
        assert_eq!(recorded.stops, vec![StopReason::MessageCap]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_test_time_counts_from_first_operation() {
        let state = Arc::new(RunState::new(0));

        let producer = tokio::spawn({
            let state = state.clone();
            async move {
                // idle for a while, as if the workers were still connecting
                time::sleep(Duration::from_millis(2500)).await;
                while state.is_running() {
                    state.record_op();
                    time::sleep(Duration::from_millis(100)).await;
                }
            }
        });

        let mut reporter = RecordingReporter::default();
        let outcome = report_loop(
            cfg(Some(Duration::from_secs(2))),
            &state,
            None,
            &mut reporter,
            std::future::pending(),
        )
        .await;
        producer.await.unwrap();

        assert_eq!(outcome.reason, StopReason::TestTime);
        // ticks at 1s and 2s see nothing, 3s re-bases the start, 5s stops
        let seconds: Vec<_> = outcome.per_second.iter().map(|s| s.second).collect();
        assert_eq!(seconds, vec![1, 2, 0, 1, 2]);
        assert_eq!(outcome.message_rate_ts.len(), 3);
        assert_eq!(outcome.duration, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_test_time_waits_for_operations() {
        let state = RunState::new(0);
        let mut reporter = RecordingReporter::default();

        let outcome = report_loop(
            cfg(Some(Duration::from_secs(1))),
            &state,
            None,
            &mut reporter,
            time::sleep(Duration::from_millis(4500)),
        )
        .await;

        assert_eq!(outcome.reason, StopReason::Interrupt);
        assert_eq!(outcome.per_second.len(), 4);
        assert!(outcome.message_rate_ts.is_empty());
        assert!(!state.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_resolves_once() {
        let state = RunState::new(10);
        record_ops(&state, 10);
        // an earlier path already stopped the run
        assert!(state.stop());

        let mut reporter = RecordingReporter::default();
        let outcome = report_loop(
            cfg(None),
            &state,
            None,
            &mut reporter,
            std::future::ready(()),
        )
        .await;

        assert_eq!(outcome.reason, StopReason::Interrupt);
        assert!(reporter.0.lock().stops.is_empty());
        assert!(!state.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rtt_window_is_drained_per_tick() {
        let state = RunState::new(0);
        let rtt = RttRecorder::try_new().unwrap();
        record_ops(&state, 2);
        rtt.record_ms(1.);
        rtt.record_ms(3.);

        let mut reporter = RecordingReporter::default();
        let outcome = report_loop(
            cfg(None),
            &state,
            Some(&rtt),
            &mut reporter,
            time::sleep(Duration::from_millis(2500)),
        )
        .await;

        assert_eq!(outcome.per_second[0].avg_rtt_ms, Some(2.));
        assert_eq!(outcome.per_second[1].avg_rtt_ms, None);
        assert_eq!(rtt.summary().total_count, 2);
        assert_eq!(reporter.0.lock().started, Some(true));
    }
}
