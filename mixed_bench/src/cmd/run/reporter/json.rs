use std::io::{self, Write};

use rama::telemetry::tracing;

use super::{BenchmarkResult, CommandStats, Reporter, StopReason, TickReport};
use crate::cmd::run::stats::OpKind;

/// Prints one JSON object per line for every event of the run.
pub(crate) struct JsonlReporter {
    out: Box<dyn Write + Send>,
    measure_rtt: bool,
}

impl JsonlReporter {
    pub(crate) fn new() -> Self {
        Self::with_writer(io::stdout())
    }

    pub(crate) fn with_writer(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Box::new(out),
            measure_rtt: false,
        }
    }

    fn emit(&mut self, line: &serde_json::Value) {
        if let Err(err) = writeln!(self.out, "{line}").and_then(|()| self.out.flush()) {
            tracing::warn!("failed to write json report line: {err}");
        }
    }

    pub(super) fn tick_line(tick: &TickReport, measure_rtt: bool) -> serde_json::Value {
        let mut line = serde_json::json!({
            "type": "tick",
            "second": tick.second,
            "total_messages": tick.total_messages,
            "message_rate": tick.message_rate,
            "connect_rate": tick.connect_rate,
        });
        if measure_rtt {
            line["avg_rtt_ms"] = serde_json::json!(tick.avg_rtt_ms);
        }
        line
    }

    fn summary_line(
        result: &BenchmarkResult,
        stats: &CommandStats,
    ) -> Result<serde_json::Value, serde_json::Error> {
        let commands: serde_json::Map<_, _> = OpKind::ALL
            .into_iter()
            .map(|op| (op.to_string(), serde_json::json!(stats.count(op))))
            .collect();
        Ok(serde_json::json!({
            "type": "summary",
            "commands": commands,
            "result": serde_json::to_value(result)?,
        }))
    }
}

impl Reporter for JsonlReporter {
    fn on_start(&mut self, measure_rtt: bool) {
        self.measure_rtt = measure_rtt;
        self.emit(&serde_json::json!({
            "type": "start",
            "measure_rtt": measure_rtt,
        }));
    }

    fn on_tick(&mut self, tick: &TickReport) {
        let line = Self::tick_line(tick, self.measure_rtt);
        self.emit(&line);
    }

    fn on_stop(&mut self, reason: StopReason) {
        self.emit(&serde_json::json!({
            "type": "stop",
            "reason": reason.as_str(),
        }));
    }

    fn finish(&mut self, result: &BenchmarkResult, stats: &CommandStats) {
        match Self::summary_line(result, stats) {
            Ok(line) => self.emit(&line),
            Err(err) => tracing::error!("failed to serialize benchmark summary: {err}"),
        }
    }
}

/// Cloneable in-memory sink, to inspect what a [`JsonlReporter`] wrote.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub(crate) struct CapturedOutput(std::sync::Arc<parking_lot::Mutex<Vec<u8>>>);

#[cfg(test)]
impl CapturedOutput {
    /// Every line parsed as JSON, panics on anything else.
    pub(crate) fn json_lines(&self) -> Vec<serde_json::Value> {
        let data = self.0.lock();
        std::str::from_utf8(&data)
            .unwrap()
            .lines()
            .map(|line| {
                serde_json::from_str(line).unwrap_or_else(|err| panic!("{err}: {line:?}"))
            })
            .collect()
    }
}

#[cfg(test)]
impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
