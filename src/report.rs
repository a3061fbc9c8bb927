use std::fmt;

use serde::Serialize;

use crate::{
    queue::Queue,
    sim::{SimStatus, Simulation, Time},
    tally::Tally,
};

/// Snapshot of a [`Tally`] for reporting layers.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TallySummary {
    pub count: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: f64,
    pub stdev: f64,
}

impl From<&Tally> for TallySummary {
    fn from(tally: &Tally) -> Self {
        Self {
            count: tally.count(),
            min: tally.min(),
            max: tally.max(),
            mean: tally.mean(),
            stdev: tally.stdev(),
        }
    }
}

/// Snapshot of a [`Queue`]'s statistics, keyed by the queue's name.
#[derive(Debug, Clone, Serialize)]
pub struct QueueReport {
    pub name: String,
    pub capacity: Option<usize>,
    pub units_in_use: usize,
    pub total_in: u64,
    pub gross_pop: TallySummary,
    pub net_pop: TallySummary,
    pub gross_dwell: TallySummary,
    pub net_dwell: TallySummary,
}

impl QueueReport {
    pub fn of(queue: &Queue) -> Self {
        Self {
            name: queue.name().to_string(),
            capacity: queue.capacity(),
            units_in_use: queue.units_in_use(),
            total_in: queue.total_in(),
            gross_pop: (&queue.gross_pop()).into(),
            net_pop: (&queue.net_pop()).into(),
            gross_dwell: (&queue.gross_dwell()).into(),
            net_dwell: (&queue.net_dwell()).into(),
        }
    }
}

/// Snapshot of a whole run: clock, state and every registered queue.
#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub clock: Time,
    pub status: SimStatus,
    pub queues: Vec<QueueReport>,
}

impl SimReport {
    pub fn of(sim: &Simulation) -> Self {
        Self {
            clock: sim.now(),
            status: sim.status(),
            queues: sim.queues().iter().map(QueueReport::of).collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for SimReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} at t = {}", self.status, self.clock)?;
        writeln!(
            f,
            "{:<16} {:>6} {:>8} {:>10} {:>10} {:>10}",
            "queue", "in", "total", "pop mean", "dwell avg", "dwell max"
        )?;
        for q in &self.queues {
            writeln!(
                f,
                "{:<16} {:>6} {:>8} {:>10.3} {:>10.3} {:>10.3}",
                q.name,
                q.units_in_use,
                q.total_in,
                q.gross_pop.mean,
                q.gross_dwell.mean,
                q.gross_dwell.max.unwrap_or(0.0),
            )?;
        }
        Ok(())
    }
}
