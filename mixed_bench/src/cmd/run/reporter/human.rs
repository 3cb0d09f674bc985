use super::{BenchmarkResult, CommandStats, Reporter, StopReason, TickReport};

const COLUMN_WIDTHS: [usize; 5] = [6, 15, 14, 14, 22];

/// Prints the live statistics as a fixed-width table.
#[derive(Debug, Default)]
pub(crate) struct HumanReporter {
    measure_rtt: bool,
}

impl HumanReporter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(super) fn format_row<S: AsRef<str>>(cells: &[S]) -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let width = COLUMN_WIDTHS.get(i).copied().unwrap_or(10);
                format!("{:<width$}", cell.as_ref())
            })
            .collect()
    }

    pub(super) fn tick_cells(tick: &TickReport, measure_rtt: bool) -> Vec<String> {
        let mut cells = vec![
            tick.second.to_string(),
            tick.total_messages.to_string(),
            format!("{:.2}", tick.message_rate),
            format!("{:.2}", tick.connect_rate),
        ];
        if measure_rtt {
            cells.push(match tick.avg_rtt_ms {
                Some(avg) => format!("{avg:.3}"),
                None => "--".to_owned(),
            });
        }
        cells
    }
}

impl Reporter for HumanReporter {
    fn on_start(&mut self, measure_rtt: bool) {
        self.measure_rtt = measure_rtt;

        println!("Starting benchmark...");
        let mut header = vec!["Time", "Total Messages", "Message Rate", "Connect Rate"];
        if measure_rtt {
            header.push("Avg RTT (ms)");
        }
        println!("{}", Self::format_row(&header));
    }

    fn on_tick(&mut self, tick: &TickReport) {
        println!(
            "{}",
            Self::format_row(&Self::tick_cells(tick, self.measure_rtt))
        );
    }

    fn on_stop(&mut self, reason: StopReason) {
        if reason == StopReason::Interrupt {
            println!("\nReceived Ctrl-C - shutting down");
        }
    }

    fn finish(&mut self, result: &BenchmarkResult, stats: &CommandStats) {
        stats.print_breakdown(result.total_messages);
        result.print_summary();
    }
}
