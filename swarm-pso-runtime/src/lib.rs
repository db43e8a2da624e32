//! # SwarmPSO Runtime
//!
//! Async runtime abstractions for SwarmPSO.
//!
//! The coordinator needs a monotonic clock for work-item deadlines and the
//! worker needs to sleep between polls. Both go through [`SwarmRuntime`] so
//! tests can swap in [`mock_runtime::MockRuntime`] and control time by hand.
//!
//! ## Feature Flags
//!
//! - `tokio` (default): Use Tokio runtime

#![forbid(unsafe_code)]

use std::future::Future;
use std::time::Duration;

pub mod backoff;

pub use backoff::{Backoff, BackoffPolicy};

/// Runtime trait for async operations
pub trait SwarmRuntime: Send + Sync + 'static {
    /// Milliseconds on a monotonic clock
    fn now(&self) -> u64;

    /// Sleep for the specified duration
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

#[cfg(feature = "tokio")]
pub mod tokio_runtime {
    //! Tokio-based runtime implementation

    use super::*;
    use tokio::time::Instant;

    /// Tokio runtime wrapper; the clock counts from construction
    #[derive(Debug, Clone, Copy)]
    pub struct TokioRuntime {
        origin: Instant,
    }

    impl TokioRuntime {
        /// Create a new Tokio runtime wrapper
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
            }
        }
    }

    impl Default for TokioRuntime {
        fn default() -> Self {
            Self::new()
        }
    }

    impl SwarmRuntime for TokioRuntime {
        fn now(&self) -> u64 {
            u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
        }

        async fn sleep(&self, duration: Duration) {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Mock runtime for testing
pub mod mock_runtime {
    use super::*;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};

    /// Mock runtime with a hand-driven clock.
    ///
    /// Clones share the same clock. Sleeping advances the clock by the
    /// requested duration and yields once to the executor.
    #[derive(Debug, Clone, Default)]
    pub struct MockRuntime {
        current_time_ms: Arc<AtomicU64>,
        slept_ms: Arc<AtomicU64>,
        sleeps: Arc<AtomicU64>,
    }

    impl MockRuntime {
        /// Create a new mock runtime
        pub fn new() -> Self {
            Self::default()
        }

        /// Advance the mock clock
        pub fn advance(&self, duration: Duration) {
            self.current_time_ms
                .fetch_add(duration_ms(duration), Ordering::SeqCst);
        }

        /// Total time spent in `sleep`
        pub fn total_slept(&self) -> Duration {
            Duration::from_millis(self.slept_ms.load(Ordering::SeqCst))
        }

        /// Number of `sleep` calls
        pub fn sleep_count(&self) -> u64 {
            self.sleeps.load(Ordering::SeqCst)
        }
    }

    impl SwarmRuntime for MockRuntime {
        fn now(&self) -> u64 {
            self.current_time_ms.load(Ordering::SeqCst)
        }

        async fn sleep(&self, duration: Duration) {
            let ms = duration_ms(duration);
            self.current_time_ms.fetch_add(ms, Ordering::SeqCst);
            self.slept_ms.fetch_add(ms, Ordering::SeqCst);
            self.sleeps.fetch_add(1, Ordering::SeqCst);
            YieldNow(false).await;
        }
    }

    fn duration_ms(duration: Duration) -> u64 {
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
    }

    /// Pending exactly once so other tasks get a turn
    struct YieldNow(bool);

    impl Future for YieldNow {
        type Output = ();

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            if self.0 {
                Poll::Ready(())
            } else {
                self.0 = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }
}

/// Get the default runtime based on features
#[cfg(feature = "tokio")]
pub fn default_runtime() -> tokio_runtime::TokioRuntime {
    tokio_runtime::TokioRuntime::new()
}

#[cfg(test)]
mod tests {
    use super::mock_runtime::MockRuntime;
    use super::*;

    #[tokio::test]
    async fn mock_clock_is_shared_and_advanced_by_sleep() {
        let rt = MockRuntime::new();
        let other = rt.clone();
        assert_eq!(rt.now(), 0);

        rt.advance(Duration::from_millis(250));
        assert_eq!(other.now(), 250);

        other.sleep(Duration::from_secs(1)).await;
        assert_eq!(rt.now(), 1_250);
        assert_eq!(rt.total_slept(), Duration::from_secs(1));
        assert_eq!(rt.sleep_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_follows_tokio_time() {
        let rt = default_runtime();
        assert_eq!(rt.now(), 0);
        rt.sleep(Duration::from_millis(40)).await;
        assert!(rt.now() >= 40);
    }
}
