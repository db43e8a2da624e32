//! Channel transport
//!
//! Workers send postcard-framed requests over a bounded tokio mpsc channel;
//! a single server task decodes them, calls the coordinator and answers on a
//! per-request oneshot. Because one task drains the channel, requests reach
//! the coordinator strictly one at a time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use swarm_pso_core::traits::WorkerId;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::protocol::{
    GetWorkRequest, MessageEnvelope, ReportRequest, ReportResponse, Request, Response,
    WorkResponse,
};
use crate::traits::{CoordinatorClient, CoordinatorService};
use crate::{Error, Result};

type Frame = (Vec<u8>, oneshot::Sender<Vec<u8>>);

/// Create a connected client/server pair
pub fn channel(capacity: usize) -> (ChannelClient, ChannelServer) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ChannelClient {
            tx,
            sequence: Arc::new(AtomicU64::new(0)),
        },
        ChannelServer { rx },
    )
}

/// Worker end of the channel; clones share the sequence counter
#[derive(Debug, Clone)]
pub struct ChannelClient {
    tx: mpsc::Sender<Frame>,
    sequence: Arc<AtomicU64>,
}

impl ChannelClient {
    async fn call(&self, request: Request) -> Result<Response> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let frame = MessageEnvelope::encode_request(sequence, &request)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((frame, reply_tx))
            .await
            .map_err(|_| Error::Disconnected)?;
        let reply = reply_rx.await.map_err(|_| Error::ReceiveFailed)?;
        MessageEnvelope::decode_response(&reply, sequence)
    }
}

#[async_trait::async_trait]
impl CoordinatorClient for ChannelClient {
    async fn get_work(&self, worker_id: &WorkerId) -> Result<WorkResponse> {
        let request = Request::GetWork(GetWorkRequest {
            worker_id: worker_id.clone(),
        });
        match self.call(request).await? {
            Response::Work(work) => Ok(work),
            Response::Report(_) => Err(Error::InvalidMessage),
        }
    }

    async fn report_result(&self, report: &ReportRequest) -> Result<ReportResponse> {
        match self.call(Request::ReportResult(report.clone())).await? {
            Response::Report(ack) => Ok(ack),
            Response::Work(_) => Err(Error::InvalidMessage),
        }
    }
}

/// Counters from a finished server loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeStats {
    pub handled: u64,
    pub malformed: u64,
}

/// Coordinator end of the channel
#[derive(Debug)]
pub struct ChannelServer {
    rx: mpsc::Receiver<Frame>,
}

impl ChannelServer {
    /// Answer requests until every client handle is dropped
    pub async fn serve<S: CoordinatorService + ?Sized>(mut self, service: Arc<S>) -> ServeStats {
        let mut stats = ServeStats::default();
        while let Some((frame, reply)) = self.rx.recv().await {
            let encoded = match MessageEnvelope::decode_request(&frame) {
                Ok((sequence, request)) => {
                    stats.handled += 1;
                    let response = service.handle(&request);
                    MessageEnvelope::encode_response(sequence, &response)
                }
                Err(e) => {
                    stats.malformed += 1;
                    warn!(error = %e, "rejecting malformed frame");
                    MessageEnvelope::encode_error(0, &e.to_string())
                }
            };
            match encoded {
                Ok(bytes) => {
                    if reply.send(bytes).is_err() {
                        debug!("client went away before the reply");
                    }
                }
                Err(e) => warn!(error = %e, "failed to encode reply"),
            }
        }
        debug!(handled = stats.handled, malformed = stats.malformed, "channel server finished");
        stats
    }
}
