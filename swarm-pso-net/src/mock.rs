//! Fault-injecting client for testing
//!
//! Wraps any [`CoordinatorClient`] and fails calls on demand, so worker retry
//! and shutdown paths can be driven without a real network.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use swarm_pso_core::traits::WorkerId;

use crate::protocol::{ReportRequest, ReportResponse, WorkResponse};
use crate::traits::CoordinatorClient;
use crate::{Error, Result};

/// Client wrapper that injects transport failures
#[derive(Debug)]
pub struct FlakyClient<C> {
    inner: C,
    fail_next: AtomicU64,
    disconnected: AtomicBool,
    calls: AtomicU64,
    injected: AtomicU64,
}

impl<C> FlakyClient<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            fail_next: AtomicU64::new(0),
            disconnected: AtomicBool::new(false),
            calls: AtomicU64::new(0),
            injected: AtomicU64::new(0),
        }
    }

    /// Make the next `n` calls fail with [`Error::Timeout`]
    pub fn fail_next(&self, n: u64) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Make every later call fail with [`Error::Disconnected`]
    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    /// Calls made through the wrapper, failed ones included
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls that failed because of injection
    pub fn injected_failures(&self) -> u64 {
        self.injected.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn gate(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.disconnected.load(Ordering::SeqCst) {
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Err(Error::Disconnected);
        }
        let armed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Err(Error::Timeout);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<C: CoordinatorClient> CoordinatorClient for FlakyClient<C> {
    async fn get_work(&self, worker_id: &WorkerId) -> Result<WorkResponse> {
        self.gate()?;
        self.inner.get_work(worker_id).await
    }

    async fn report_result(&self, report: &ReportRequest) -> Result<ReportResponse> {
        self.gate()?;
        self.inner.report_result(report).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalClient;
    use crate::protocol::GetWorkRequest;
    use crate::traits::CoordinatorService;

    struct AlwaysWait;

    impl CoordinatorService for AlwaysWait {
        fn get_work(&self, _request: &GetWorkRequest) -> WorkResponse {
            WorkResponse::wait(std::time::Duration::from_secs(1))
        }

        fn report_result(&self, _request: &ReportRequest) -> ReportResponse {
            ReportResponse::Ack
        }
    }

    #[tokio::test]
    async fn injected_failures_then_recovery() {
        let client = FlakyClient::new(LocalClient::new(std::sync::Arc::new(AlwaysWait)));
        let worker = WorkerId::new("w");
        client.fail_next(2);

        assert_eq!(client.get_work(&worker).await, Err(Error::Timeout));
        assert_eq!(client.get_work(&worker).await, Err(Error::Timeout));
        assert!(client.get_work(&worker).await.is_ok());
        assert_eq!(client.calls(), 3);
        assert_eq!(client.injected_failures(), 2);
    }

    #[tokio::test]
    async fn disconnect_is_permanent() {
        let client = FlakyClient::new(LocalClient::new(std::sync::Arc::new(AlwaysWait)));
        client.disconnect();
        for _ in 0..3 {
            assert_eq!(
                client.get_work(&WorkerId::new("w")).await,
                Err(Error::Disconnected)
            );
        }
    }
}
