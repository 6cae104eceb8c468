use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Token bucket guarding calls to the upstream extraction service:
/// at most `burst` calls back to back, then one more per `interval`.
pub struct RateLimiter {
    burst: u32,
    interval: Duration,
    bucket: Mutex<Bucket>,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(burst: u32, interval: Duration) -> Self {
        let burst = burst.max(1);
        Self {
            burst,
            interval,
            bucket: Mutex::new(Bucket { tokens: f64::from(burst), last_refill: Instant::now() }),
        }
    }

    /// One call per `interval`, no bursting.
    pub fn every(interval: Duration) -> Self {
        Self::new(1, interval)
    }

    /// Wait until a call may be made, then consume its token.
    pub async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                let earned =
                    now.duration_since(bucket.last_refill).as_secs_f64() / self.interval.as_secs_f64();
                bucket.tokens = (bucket.tokens + earned).min(f64::from(self.burst));
                bucket.last_refill = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                self.interval.mul_f64(1.0 - bucket.tokens)
            };
            tracing::debug!(wait_ms = wait.as_millis() as u64, "Rate limited, waiting");
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn spaces_calls_by_interval() {
        let limiter = RateLimiter::every(Duration::from_secs(2));
        let start = Instant::now();

        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(1));

        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(4));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_allows_back_to_back_calls() {
        let limiter = RateLimiter::new(3, Duration::from_secs(2));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(1));

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_time_refills_up_to_burst_only() {
        let limiter = RateLimiter::new(2, Duration::from_secs(1));
        limiter.acquire().await;
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(1));
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn zero_interval_never_waits() {
        let limiter = RateLimiter::every(Duration::ZERO);
        for _ in 0..100 {
            limiter.acquire().await;
        }
    }
}
