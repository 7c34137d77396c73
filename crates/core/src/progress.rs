//! Progress percentage, phase derivation and throughput statistics.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::import_job::{JobCounters, JobPhase};

/// Percentage reported while the source file is being decoded.
pub const PARSING_PERCENT: i16 = 5;

/// Percentage at which row processing starts.
pub const ROWS_START_PERCENT: i16 = 10;

/// Width of the row-processing band (10% to 90%).
pub const ROWS_SPAN_PERCENT: i16 = 80;

/// Percentage reported while artifacts are written.
pub const FINALIZING_PERCENT: i16 = 90;

/// Phase implied by a progress percentage.
pub fn phase_for_percent(percent: i16) -> JobPhase {
    match percent {
        p if p <= 0 => JobPhase::Initializing,
        p if p < 10 => JobPhase::Parsing,
        p if p < 50 => JobPhase::Validating,
        p if p < 90 => JobPhase::Importing,
        p if p < 100 => JobPhase::Finalizing,
        _ => JobPhase::Completed,
    }
}

/// Percentage while rows are being processed.
pub fn rows_percent(processed: i64, total: i64) -> i16 {
    if total <= 0 {
        return ROWS_START_PERCENT;
    }
    let done = processed.clamp(0, total) as f64 / total as f64;
    ROWS_START_PERCENT + (done * f64::from(ROWS_SPAN_PERCENT)).floor() as i16
}

/// Percentage and phase that only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressMark {
    percent: i16,
    phase: JobPhase,
}

impl Default for ProgressMark {
    fn default() -> Self {
        Self {
            percent: 0,
            phase: JobPhase::Initializing,
        }
    }
}

impl ProgressMark {
    pub fn percent(&self) -> i16 {
        self.percent
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    /// Move to `percent` if it is ahead. Returns `true` when anything changed.
    pub fn advance(&mut self, percent: i16) -> bool {
        let percent = percent.clamp(0, 100);
        if percent <= self.percent {
            return false;
        }
        self.percent = percent;
        self.phase = self.phase.max(phase_for_percent(percent));
        true
    }
}

/// Throughput figures reported with a job's status.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressStats {
    pub elapsed_seconds: f64,
    pub rows_per_second: f64,
    /// `None` while the rate is zero.
    pub eta_seconds: Option<f64>,
}

impl ProgressStats {
    pub fn compute(counters: &JobCounters, elapsed: Duration) -> Self {
        let elapsed_seconds = elapsed.as_secs_f64();
        let rows_per_second = if elapsed_seconds > 0.0 {
            counters.rows_processed.max(0) as f64 / elapsed_seconds
        } else {
            0.0
        };
        let eta_seconds =
            (rows_per_second > 0.0).then(|| counters.remaining() as f64 / rows_per_second);
        Self {
            elapsed_seconds,
            rows_per_second,
            eta_seconds,
        }
    }
}
