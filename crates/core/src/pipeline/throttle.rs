//! Write throttle: a delay between batches of catalog writes.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct WriteThrottle {
    batch_size: usize,
    /// Minimum wall time one full batch may take. `None` disables the delay.
    batch_floor: Option<Duration>,
    in_batch: usize,
    batch_started: Instant,
}

impl WriteThrottle {
    pub fn new(rows_per_second: u32, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        let batch_floor = (rows_per_second > 0)
            .then(|| Duration::from_secs_f64(batch_size as f64 / f64::from(rows_per_second)));
        Self {
            batch_size,
            batch_floor,
            in_batch: 0,
            batch_started: Instant::now(),
        }
    }

    pub fn unthrottled() -> Self {
        Self::new(0, 1)
    }

    /// Record one write; at a batch boundary, wait out the rest of the
    /// batch's time slot. Returns early if `cancel` fires.
    pub async fn after_write(&mut self, cancel: &CancellationToken) {
        self.in_batch += 1;
        if self.in_batch < self.batch_size {
            return;
        }
        if let Some(floor) = self.batch_floor {
            let elapsed = self.batch_started.elapsed();
            if elapsed < floor {
                tokio::select! {
                    _ = tokio::time::sleep(floor - elapsed) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }
        self.in_batch = 0;
        self.batch_started = Instant::now();
    }
}
