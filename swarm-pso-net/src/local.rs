//! In-process client
//!
//! Calls the coordinator directly. Used when workers run as tasks next to
//! the coordinator.

use std::sync::Arc;

use swarm_pso_core::traits::WorkerId;

use crate::protocol::{GetWorkRequest, ReportRequest, ReportResponse, WorkResponse};
use crate::traits::{CoordinatorClient, CoordinatorService};
use crate::Result;

/// Client that calls a shared service without serialization
#[derive(Debug)]
pub struct LocalClient<S> {
    service: Arc<S>,
}

impl<S> LocalClient<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<S> {
        &self.service
    }
}

impl<S> Clone for LocalClient<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

#[async_trait::async_trait]
impl<S: CoordinatorService + 'static> CoordinatorClient for LocalClient<S> {
    async fn get_work(&self, worker_id: &WorkerId) -> Result<WorkResponse> {
        Ok(self.service.get_work(&GetWorkRequest {
            worker_id: worker_id.clone(),
        }))
    }

    async fn report_result(&self, report: &ReportRequest) -> Result<ReportResponse> {
        Ok(self.service.report_result(report))
    }
}
