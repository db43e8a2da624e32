//! Message protocol and framing
//!
//! Two calls make up the whole contract:
//! - `GetWork(worker_id)` answered by a work item, a wait hint or stop
//! - `ReportResult(worker_id, particle_id, iteration, score)` answered by an
//!   ack or a rejection
//!
//! Byte transports wrap them in a [`MessageEnvelope`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use swarm_pso_core::traits::{ParticleId, WorkerId};
use swarm_pso_core::work_queue::WorkItem;

use crate::{Error, Result};

/// Ask the coordinator for work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetWorkRequest {
    pub worker_id: WorkerId,
}

/// Coordinator answer to `GetWork`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkResponse {
    /// Evaluate this item
    Work(WorkItem),
    /// Nothing to hand out yet; poll again after roughly this long
    Wait { backoff_secs: f64 },
    /// The run is over; terminal for this worker
    Stop,
}

impl WorkResponse {
    pub fn wait(backoff: Duration) -> Self {
        WorkResponse::Wait {
            backoff_secs: backoff.as_secs_f64(),
        }
    }

    /// Suggested backoff of a `Wait`, if it is a usable duration
    pub fn backoff_hint(&self) -> Option<Duration> {
        match self {
            WorkResponse::Wait { backoff_secs } => Duration::try_from_secs_f64(*backoff_secs).ok(),
            _ => None,
        }
    }
}

/// Score for one evaluated particle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub worker_id: WorkerId,
    pub particle_id: ParticleId,
    /// Iteration of the work item being answered
    pub iteration: u64,
    pub score: f64,
}

/// Why a report was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectKind {
    /// Unknown particle, or a particle that was never issued
    InvalidRequest,
    /// Malformed or out-of-contract request
    ProtocolError,
}

impl core::fmt::Display for RejectKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RejectKind::InvalidRequest => write!(f, "invalid request"),
            RejectKind::ProtocolError => write!(f, "protocol error"),
        }
    }
}

/// Coordinator answer to `ReportResult`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportResponse {
    Ack,
    Rejected { kind: RejectKind, reason: String },
}

impl ReportResponse {
    pub fn rejected(kind: RejectKind, reason: impl Into<String>) -> Self {
        ReportResponse::Rejected {
            kind,
            reason: reason.into(),
        }
    }
}

/// Any request a worker can send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    GetWork(GetWorkRequest),
    ReportResult(ReportRequest),
}

impl Request {
    pub fn message_type(&self) -> MessageType {
        match self {
            Request::GetWork(_) => MessageType::GetWork,
            Request::ReportResult(_) => MessageType::ReportResult,
        }
    }
}

/// Any response the coordinator can send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Work(WorkResponse),
    Report(ReportResponse),
}

impl Response {
    pub fn message_type(&self) -> MessageType {
        match self {
            Response::Work(_) => MessageType::Work,
            Response::Report(_) => MessageType::ReportAck,
        }
    }
}

/// Message envelope for all coordinator/worker communications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Protocol version (major, minor)
    pub version: (u8, u8),
    /// Message type discriminator
    pub message_type: MessageType,
    /// Per-client sequence number, echoed in the reply
    pub sequence: u64,
    /// Payload bytes
    pub payload: Vec<u8>,
}

impl MessageEnvelope {
    /// Current protocol version
    pub const CURRENT_VERSION: (u8, u8) = (0, 1);

    /// Create a new message envelope
    pub fn new(message_type: MessageType, payload: Vec<u8>) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            message_type,
            sequence: 0,
            payload,
        }
    }

    /// Set the sequence number
    pub fn with_sequence(mut self, seq: u64) -> Self {
        self.sequence = seq;
        self
    }

    /// Serialize the envelope to bytes
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(postcard::to_allocvec(self)?)
    }

    /// Deserialize from bytes, rejecting other major versions
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let envelope: Self = postcard::from_bytes(bytes)?;
        if envelope.version.0 != Self::CURRENT_VERSION.0 {
            return Err(Error::VersionMismatch {
                expected: Self::CURRENT_VERSION,
                found: envelope.version,
            });
        }
        Ok(envelope)
    }

    /// Frame a request
    pub fn encode_request(sequence: u64, request: &Request) -> Result<Vec<u8>> {
        let payload = postcard::to_allocvec(request)?;
        Self::new(request.message_type(), payload)
            .with_sequence(sequence)
            .serialize()
    }

    /// Unframe a request, returning its sequence number
    pub fn decode_request(bytes: &[u8]) -> Result<(u64, Request)> {
        let envelope = Self::deserialize(bytes)?;
        let request: Request = postcard::from_bytes(&envelope.payload)?;
        if request.message_type() != envelope.message_type {
            return Err(Error::InvalidMessage);
        }
        Ok((envelope.sequence, request))
    }

    /// Frame a response
    pub fn encode_response(sequence: u64, response: &Response) -> Result<Vec<u8>> {
        let payload = postcard::to_allocvec(response)?;
        Self::new(response.message_type(), payload)
            .with_sequence(sequence)
            .serialize()
    }

    /// Frame a refusal to decode a request
    pub fn encode_error(sequence: u64, reason: &str) -> Result<Vec<u8>> {
        Self::new(MessageType::Error, reason.as_bytes().to_vec())
            .with_sequence(sequence)
            .serialize()
    }

    /// Unframe a response to the request sent with `sequence`
    pub fn decode_response(bytes: &[u8], sequence: u64) -> Result<Response> {
        let envelope = Self::deserialize(bytes)?;
        if envelope.message_type == MessageType::Error || envelope.sequence != sequence {
            return Err(Error::InvalidMessage);
        }
        let response: Response = postcard::from_bytes(&envelope.payload)?;
        if response.message_type() != envelope.message_type {
            return Err(Error::InvalidMessage);
        }
        Ok(response)
    }
}

/// Message type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Worker asks for work
    GetWork = 0x01,
    /// Coordinator answers a poll
    Work = 0x02,
    /// Worker reports a score
    ReportResult = 0x03,
    /// Coordinator answers a report
    ReportAck = 0x04,
    /// Error/rejection notification
    Error = 0xFF,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> Request {
        Request::ReportResult(ReportRequest {
            worker_id: WorkerId::new("w1"),
            particle_id: ParticleId(3),
            iteration: 2,
            score: 0.25,
        })
    }

    #[test]
    fn request_survives_framing() {
        let bytes = MessageEnvelope::encode_request(9, &report()).unwrap();
        let (seq, decoded) = MessageEnvelope::decode_request(&bytes).unwrap();
        assert_eq!(seq, 9);
        assert_eq!(decoded, report());
    }

    #[test]
    fn response_sequence_must_match() {
        let bytes =
            MessageEnvelope::encode_response(4, &Response::Work(WorkResponse::Stop)).unwrap();
        assert_eq!(
            MessageEnvelope::decode_response(&bytes, 4).unwrap(),
            Response::Work(WorkResponse::Stop)
        );
        assert_eq!(
            MessageEnvelope::decode_response(&bytes, 5),
            Err(Error::InvalidMessage)
        );
    }

    #[test]
    fn mislabelled_payload_is_rejected() {
        let payload = postcard::to_allocvec(&report()).unwrap();
        let bytes = MessageEnvelope::new(MessageType::GetWork, payload)
            .serialize()
            .unwrap();
        assert_eq!(
            MessageEnvelope::decode_request(&bytes),
            Err(Error::InvalidMessage)
        );
    }

    #[test]
    fn other_major_version_is_rejected() {
        let mut envelope = MessageEnvelope::new(MessageType::GetWork, Vec::new());
        envelope.version = (1, 0);
        let bytes = envelope.serialize().unwrap();
        assert!(matches!(
            MessageEnvelope::deserialize(&bytes),
            Err(Error::VersionMismatch { found: (1, 0), .. })
        ));
    }

    #[test]
    fn error_frame_decodes_as_invalid_message() {
        let bytes = MessageEnvelope::encode_error(1, "garbage").unwrap();
        assert_eq!(
            MessageEnvelope::decode_response(&bytes, 1),
            Err(Error::InvalidMessage)
        );
    }

    #[test]
    fn wait_hint_round_trips_through_seconds() {
        let wait = WorkResponse::wait(Duration::from_millis(1_500));
        assert_eq!(wait.backoff_hint(), Some(Duration::from_millis(1_500)));
        assert_eq!(
            WorkResponse::Wait { backoff_secs: -1.0 }.backoff_hint(),
            None
        );
        assert_eq!(WorkResponse::Stop.backoff_hint(), None);
    }
}
