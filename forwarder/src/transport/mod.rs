//! Stream transports for both sides of the forwarder
//!
//! Ingress and egress only see these traits. The gRPC implementations live in
//! [`grpc`]; tests substitute in-memory doubles.

pub mod grpc;

use crate::error::StreamError;
use crate::proto::definitions::Event;
use crate::proto::loggregator_v2::Envelope;
use async_trait::async_trait;

/// An open upstream event stream
#[async_trait]
pub trait EventStream: Send {
    /// Next event; `StreamError::Closed` when the peer ends the stream
    async fn recv(&mut self) -> Result<Event, StreamError>;
}

/// Opens upstream event streams
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Open a stream authorized with `token` for the given subscription
    async fn connect(
        &self,
        token: &str,
        subscription_id: &str,
    ) -> Result<Box<dyn EventStream>, StreamError>;
}

/// An open downstream envelope stream
#[async_trait]
pub trait EnvelopeSink: Send {
    async fn send(&mut self, envelope: &Envelope) -> Result<(), StreamError>;

    /// Half-close the stream and wait for the peer's acknowledgement
    async fn close_and_recv(&mut self) -> Result<(), StreamError>;
}

/// Opens downstream envelope streams
#[async_trait]
pub trait DownstreamConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn EnvelopeSink>, StreamError>;
}
