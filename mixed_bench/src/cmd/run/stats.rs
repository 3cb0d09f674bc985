use std::{fmt, ops::AddAssign};

use rand::{RngExt as _, rngs::StdRng};

/// The operations of the mixed workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum OpKind {
    Set,
    Get,
    HSet,
    HGet,
}

impl OpKind {
    pub(crate) const ALL: [OpKind; 4] = [OpKind::Set, OpKind::Get, OpKind::HSet, OpKind::HGet];

    /// Uniform choice, independent of the hit rate.
    pub(crate) fn random(rng: &mut StdRng) -> Self {
        Self::ALL[rng.random_range(0..Self::ALL.len())]
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            OpKind::Set => "SET",
            OpKind::Get => "GET",
            OpKind::HSet => "HSET",
            OpKind::HGet => "HGET",
        }
    }

    pub(crate) fn is_write(self) -> bool {
        matches!(self, OpKind::Set | OpKind::HSet)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per worker tally of successful operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CommandStats {
    pub(crate) set: u64,
    pub(crate) get: u64,
    pub(crate) hset: u64,
    pub(crate) hget: u64,
}

impl CommandStats {
    pub(crate) fn record(&mut self, op: OpKind) {
        *self.count_mut(op) += 1;
    }

    pub(crate) fn count(&self, op: OpKind) -> u64 {
        match op {
            OpKind::Set => self.set,
            OpKind::Get => self.get,
            OpKind::HSet => self.hset,
            OpKind::HGet => self.hget,
        }
    }

    fn count_mut(&mut self, op: OpKind) -> &mut u64 {
        match op {
            OpKind::Set => &mut self.set,
            OpKind::Get => &mut self.get,
            OpKind::HSet => &mut self.hset,
            OpKind::HGet => &mut self.hget,
        }
    }

    pub(crate) fn total(&self) -> u64 {
        self.set + self.get + self.hset + self.hget
    }

    /// Share of `op` in `total_messages`, in percent.
    pub(crate) fn percentage(&self, op: OpKind, total_messages: u64) -> f64 {
        if total_messages == 0 {
            return 0.;
        }
        self.count(op) as f64 / total_messages as f64 * 100.
    }

    pub(crate) fn print_breakdown(&self, total_messages: u64) {
        println!("\nTotal Command Statistics (all clients):");
        for op in OpKind::ALL {
            println!(
                "{op} commands: {} ({:.2}%)",
                self.count(op),
                self.percentage(op, total_messages)
            );
        }
        println!("Total commands: {total_messages}");
    }
}

impl AddAssign for CommandStats {
    fn add_assign(&mut self, rhs: Self) {
        self.set += rhs.set;
        self.get += rhs.get;
        self.hset += rhs.hset;
        self.hget += rhs.hget;
    }
}
