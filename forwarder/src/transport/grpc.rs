//! gRPC transports
//!
//! Upstream is the server-streaming `definitions.Egress/BoshMetrics` call with
//! the token attached as `authorization` metadata. Downstream is the
//! client-streaming `loggregator.v2.Ingress/Sender` call; envelopes are fed to
//! it through a channel while the call runs in its own task.

use super::{DownstreamConnector, EnvelopeSink, EventStream, UpstreamConnector};
use crate::config::GrpcEndpointConfig;
use crate::error::{ForwarderError, Result, StreamError};
use crate::proto::definitions::egress_client::EgressClient;
use crate::proto::definitions::{EgressRequest, Event};
use crate::proto::loggregator_v2::ingress_client::IngressClient;
use crate::proto::loggregator_v2::{Envelope, IngressResponse};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tonic::metadata::AsciiMetadataValue;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};
use tonic::{Request, Response, Status, Streaming};
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TCP_KEEPALIVE: Duration = Duration::from_secs(30);

/// Envelopes buffered between the sink and the running call
const SEND_BUFFER: usize = 1;

/// Build a lazily connecting channel for the endpoint
///
/// Must be called from within a tokio runtime.
pub fn channel(config: &GrpcEndpointConfig) -> Result<Channel> {
    let mut endpoint = Endpoint::from_shared(config.url.clone())
        .map_err(|e| ForwarderError::Config(format!("invalid endpoint URL {}: {e}", config.url)))?
        .connect_timeout(CONNECT_TIMEOUT)
        .tcp_keepalive(Some(TCP_KEEPALIVE));

    if config.tls_enabled() {
        endpoint = endpoint.tls_config(tls_config(config)?)?;
    }

    debug!(url = %config.url, tls = config.tls_enabled(), "gRPC channel configured");
    Ok(endpoint.connect_lazy())
}

fn tls_config(config: &GrpcEndpointConfig) -> Result<ClientTlsConfig> {
    let mut tls = ClientTlsConfig::new();

    if let Some(ca) = &config.ca {
        tls = tls.ca_certificate(Certificate::from_pem(read_pem(ca)?));
    }

    match (&config.cert, &config.key) {
        (Some(cert), Some(key)) => {
            tls = tls.identity(Identity::from_pem(read_pem(cert)?, read_pem(key)?));
        }
        (None, None) => {}
        _ => {
            return Err(ForwarderError::Tls(
                "client certificate and key must be provided together".to_string(),
            ))
        }
    }

    if let Some(name) = &config.server_name {
        tls = tls.domain_name(name.clone());
    }

    Ok(tls)
}

fn read_pem(path: &std::path::Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| ForwarderError::Tls(format!("reading {}: {e}", path.display())))
}

/// Connector for the metrics server
#[derive(Clone)]
pub struct GrpcUpstream {
    client: EgressClient<Channel>,
}

impl GrpcUpstream {
    pub fn new(config: &GrpcEndpointConfig) -> Result<Self> {
        Ok(Self::from_channel(channel(config)?))
    }

    pub fn from_channel(channel: Channel) -> Self {
        Self {
            client: EgressClient::new(channel),
        }
    }
}

#[async_trait]
impl UpstreamConnector for GrpcUpstream {
    async fn connect(
        &self,
        token: &str,
        subscription_id: &str,
    ) -> std::result::Result<Box<dyn EventStream>, StreamError> {
        let token: AsciiMetadataValue = token.parse().map_err(|_| {
            StreamError::Transport(Status::invalid_argument(
                "token is not valid request metadata",
            ))
        })?;

        let mut request = Request::new(EgressRequest {
            subscription_id: subscription_id.to_string(),
        });
        request.metadata_mut().insert("authorization", token);

        let response = self.client.clone().bosh_metrics(request).await?;
        Ok(Box::new(GrpcEventStream {
            inner: response.into_inner(),
        }))
    }
}

struct GrpcEventStream {
    inner: Streaming<Event>,
}

#[async_trait]
impl EventStream for GrpcEventStream {
    async fn recv(&mut self) -> std::result::Result<Event, StreamError> {
        match self.inner.message().await {
            Ok(Some(event)) => Ok(event),
            Ok(None) => Err(StreamError::Closed),
            Err(status) => Err(status.into()),
        }
    }
}

/// Connector for the ingestion agent
#[derive(Clone)]
pub struct GrpcDownstream {
    client: IngressClient<Channel>,
}

impl GrpcDownstream {
    pub fn new(config: &GrpcEndpointConfig) -> Result<Self> {
        Ok(Self::from_channel(channel(config)?))
    }

    pub fn from_channel(channel: Channel) -> Self {
        Self {
            client: IngressClient::new(channel),
        }
    }
}

#[async_trait]
impl DownstreamConnector for GrpcDownstream {
    async fn connect(&self) -> std::result::Result<Box<dyn EnvelopeSink>, StreamError> {
        let (tx, rx) = mpsc::channel(SEND_BUFFER);
        let mut client = self.client.clone();
        let call = tokio::spawn(async move { client.sender(ReceiverStream::new(rx)).await });

        Ok(Box::new(GrpcEnvelopeSink {
            tx: Some(tx),
            call: Some(call),
            failed: None,
        }))
    }
}

type SenderCall = JoinHandle<std::result::Result<Response<IngressResponse>, Status>>;

struct GrpcEnvelopeSink {
    tx: Option<mpsc::Sender<Envelope>>,
    call: Option<SenderCall>,
    failed: Option<StreamError>,
}

impl GrpcEnvelopeSink {
    /// End the request stream and collect the call's outcome
    async fn finish(&mut self) -> std::result::Result<(), StreamError> {
        self.tx.take();
        match self.call.take() {
            Some(call) => match call.await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(status)) => Err(status.into()),
                Err(_) => Err(StreamError::Closed),
            },
            None => Err(StreamError::Closed),
        }
    }
}

#[async_trait]
impl EnvelopeSink for GrpcEnvelopeSink {
    async fn send(&mut self, envelope: &Envelope) -> std::result::Result<(), StreamError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        let Some(tx) = &self.tx else {
            return Err(StreamError::Closed);
        };

        if tx.send(envelope.clone()).await.is_ok() {
            return Ok(());
        }

        // The call dropped its request stream, so it has already finished.
        let err = self.finish().await.err().unwrap_or(StreamError::Closed);
        self.failed = Some(err.clone());
        Err(err)
    }

    async fn close_and_recv(&mut self) -> std::result::Result<(), StreamError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        self.finish().await
    }
}

impl Drop for GrpcEnvelopeSink {
    fn drop(&mut self) {
        if let Some(call) = self.call.take() {
            call.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mapper::Mapper;
    use crate::proto::definitions::{event, Heartbeat};

    fn endpoint(url: &str) -> GrpcEndpointConfig {
        GrpcEndpointConfig {
            url: url.to_string(),
            ..Default::default()
        }
    }

    fn envelope() -> Envelope {
        let event = Event {
            timestamp: 1499293724,
            deployment: "loggregator".to_string(),
            message: Some(event::Message::Heartbeat(Heartbeat {
                job: "consul".to_string(),
                ..Default::default()
            })),
            ..Default::default()
        };
        Mapper::new().map(&event).unwrap()
    }

    #[tokio::test]
    async fn test_channel_rejects_invalid_url() {
        let result = channel(&endpoint("not a url"));
        assert!(matches!(result, Err(ForwarderError::Config(_))));
    }

    #[tokio::test]
    async fn test_channel_reports_missing_ca() {
        let config = GrpcEndpointConfig {
            url: "https://127.0.0.1:25595".to_string(),
            ca: Some("/nonexistent/ca.pem".into()),
            ..Default::default()
        };
        assert!(matches!(channel(&config), Err(ForwarderError::Tls(_))));
    }

    #[tokio::test]
    async fn test_channel_requires_key_with_cert() {
        let config = GrpcEndpointConfig {
            url: "https://127.0.0.1:3458".to_string(),
            cert: Some("/nonexistent/agent.crt".into()),
            ..Default::default()
        };
        assert!(matches!(channel(&config), Err(ForwarderError::Tls(_))));
    }

    #[tokio::test]
    async fn test_upstream_rejects_invalid_token_metadata() {
        let upstream = GrpcUpstream::new(&endpoint("http://127.0.0.1:1")).unwrap();
        let err = upstream
            .connect("bad\ntoken", "subscription")
            .await
            .err()
            .unwrap();
        match err {
            StreamError::Transport(status) => {
                assert_eq!(status.code(), tonic::Code::InvalidArgument)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upstream_connect_to_unavailable_server_fails() {
        let upstream = GrpcUpstream::new(&endpoint("http://127.0.0.1:1")).unwrap();
        let err = upstream.connect("token", "subscription").await.err().unwrap();
        assert!(!err.is_authorization_denied());
    }

    #[tokio::test]
    async fn test_downstream_close_reports_unavailable_agent() {
        let downstream = GrpcDownstream::new(&endpoint("http://127.0.0.1:1")).unwrap();
        let mut sink = downstream.connect().await.unwrap();

        // The first envelope may be buffered before the call fails.
        let _ = sink.send(&envelope()).await;
        assert!(sink.close_and_recv().await.is_err());
        // A failed stream stays failed.
        assert!(sink.send(&envelope()).await.is_err());
    }
}
