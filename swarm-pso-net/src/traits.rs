//! Transport seams
//!
//! [`CoordinatorService`] is what a coordinator exposes to any transport;
//! [`CoordinatorClient`] is what a worker talks to. Transports sit between
//! the two.

use std::sync::Arc;

use swarm_pso_core::traits::WorkerId;

use crate::protocol::{GetWorkRequest, ReportRequest, ReportResponse, Request, Response, WorkResponse};
use crate::Result;

/// Coordinator side of the contract.
///
/// Both calls are non-blocking: they answer from current state and return.
pub trait CoordinatorService: Send + Sync {
    fn get_work(&self, request: &GetWorkRequest) -> WorkResponse;

    fn report_result(&self, request: &ReportRequest) -> ReportResponse;

    /// Dispatch a decoded request
    fn handle(&self, request: &Request) -> Response {
        match request {
            Request::GetWork(req) => Response::Work(self.get_work(req)),
            Request::ReportResult(req) => Response::Report(self.report_result(req)),
        }
    }
}

/// Worker side of the contract.
///
/// `Err` is always a transport failure; coordinator-level refusals arrive as
/// `Ok(ReportResponse::Rejected { .. })`.
#[async_trait::async_trait]
pub trait CoordinatorClient: Send + Sync {
    async fn get_work(&self, worker_id: &WorkerId) -> Result<WorkResponse>;

    async fn report_result(&self, report: &ReportRequest) -> Result<ReportResponse>;
}

#[async_trait::async_trait]
impl<C: CoordinatorClient + ?Sized> CoordinatorClient for Arc<C> {
    async fn get_work(&self, worker_id: &WorkerId) -> Result<WorkResponse> {
        (**self).get_work(worker_id).await
    }

    async fn report_result(&self, report: &ReportRequest) -> Result<ReportResponse> {
        (**self).report_result(report).await
    }
}
