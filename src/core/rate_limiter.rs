use std::time::Duration;
use tokio::time::sleep;
use rand::Rng;

pub struct RateLimiter;

impl RateLimiter {
    /// Delay before the next request: `base` plus up to half of it again as jitter.
    pub fn delay(base: Duration) -> Duration {
        let base_ms = base.as_millis() as u64;
        if base_ms == 0 {
            return Duration::ZERO;
        }
        let jitter = {
            let mut rng = rand::thread_rng();
            rng.gen_range(0..=base_ms / 2)
        };
        Duration::from_millis(base_ms + jitter)
    }

    /// Wait between two consecutive chunk requests.
    pub async fn wait(base: Duration) {
        let delay = Self::delay(base);
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }
}
