use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Fixed-interval throttle for write bursts against SKY.
///
/// Guarantees successive calls from one workflow are spaced at least
/// `1/max_per_second` apart. Calls are never dropped or reordered, only
/// delayed; concurrent callers queue on the internal lock in arrival
/// order.
pub struct Pacer {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(max_per_second: u32) -> Self {
        let per_second = max_per_second.max(1);
        Self {
            min_interval: Duration::from_secs(1) / per_second,
            last: Mutex::new(None),
        }
    }

    /// Wait until the next call is allowed, then claim the slot.
    pub async fn pace(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let next_allowed = prev + self.min_interval;
            let now = Instant::now();
            if now < next_allowed {
                tokio::time::sleep(next_allowed - now).await;
            }
        }
        *last = Some(Instant::now());
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}
