//! Configuration for the forwarder
//!
//! Everything is read from `FORWARDER_*` environment variables. Durations are
//! given in the unit named by the variable suffix.

use crate::error::{ForwarderError, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Subscription id used when none is configured
pub const DEFAULT_SUBSCRIPTION_ID: &str = "bosh-system-metrics-forwarder";

/// Main configuration for the forwarder
#[derive(Debug, Clone)]
pub struct Config {
    /// Director base URL, queried for `/info`
    pub director_url: String,

    /// CA used to verify the director and auth server
    pub director_ca: Option<PathBuf>,

    /// Client credentials exchanged for a token
    pub client_id: String,
    pub client_secret: String,

    /// Upstream metrics server
    pub metrics_server: GrpcEndpointConfig,

    /// Downstream ingestion agent
    pub agent: GrpcEndpointConfig,

    /// Subscription id sent with every upstream stream request
    pub subscription_id: String,

    /// Overrides the `ip` tag on forwarded envelopes
    pub ip_tag: Option<String>,

    /// Ingress tuning
    pub ingress: IngressConfig,

    /// Egress tuning
    pub egress: EgressConfig,

    /// Relay queue capacity (number of envelopes)
    pub queue_capacity: usize,

    /// Listener for `/metrics` and `/health`
    pub health_addr: SocketAddr,

    /// Log format (json or pretty)
    pub log_format: LogFormat,
}

/// Address and TLS material for one gRPC peer
#[derive(Debug, Clone, Default)]
pub struct GrpcEndpointConfig {
    /// Endpoint URL, e.g. `https://metrics-server:25595`
    pub url: String,
    /// CA certificate path
    pub ca: Option<PathBuf>,
    /// Client certificate path (mutual TLS)
    pub cert: Option<PathBuf>,
    /// Client key path (mutual TLS)
    pub key: Option<PathBuf>,
    /// Expected server name on the peer certificate
    pub server_name: Option<String>,
}

impl GrpcEndpointConfig {
    /// True when any TLS setting was provided
    pub fn tls_enabled(&self) -> bool {
        self.ca.is_some() || self.cert.is_some()
    }
}

/// Ingress loop tuning
#[derive(Debug, Clone)]
pub struct IngressConfig {
    /// Wait between reconnect attempts
    pub reconnect_wait: Duration,
    /// Upper bound on one stream's lifetime; `None` disables it
    pub stream_timeout: Option<Duration>,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            reconnect_wait: Duration::from_secs(1),
            stream_timeout: Some(Duration::from_secs(45)),
        }
    }
}

/// Egress loop tuning
#[derive(Debug, Clone)]
pub struct EgressConfig {
    /// Wait between reconnect attempts
    pub reconnect_wait: Duration,
    /// Attempts per envelope before the stream is abandoned
    pub max_send_attempts: u32,
    /// Wait between send attempts
    pub retry_delay: Duration,
    /// How long stop waits for the drain before cancelling the stream
    pub drain_timeout: Duration,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            reconnect_wait: Duration::from_millis(100),
            max_send_attempts: 3,
            retry_delay: Duration::from_millis(100),
            drain_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            director_url: String::new(),
            director_ca: None,
            client_id: String::new(),
            client_secret: String::new(),
            metrics_server: GrpcEndpointConfig::default(),
            agent: GrpcEndpointConfig {
                url: "http://127.0.0.1:3458".to_string(),
                server_name: Some("metron".to_string()),
                ..Default::default()
            },
            subscription_id: DEFAULT_SUBSCRIPTION_ID.to_string(),
            ip_tag: None,
            ingress: IngressConfig::default(),
            egress: EgressConfig::default(),
            queue_capacity: 1000,
            health_addr: SocketAddr::from(([127, 0, 0, 1], 19111)),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        config.director_url = required(&lookup, "FORWARDER_DIRECTOR_URL")?;
        config.director_ca = lookup("FORWARDER_DIRECTOR_CA").map(PathBuf::from);
        config.client_id = required(&lookup, "FORWARDER_AUTH_CLIENT_ID")?;
        config.client_secret = required(&lookup, "FORWARDER_AUTH_CLIENT_SECRET")?;

        config.metrics_server.url = required(&lookup, "FORWARDER_METRICS_SERVER_URL")?;
        config.metrics_server.ca = lookup("FORWARDER_METRICS_SERVER_CA").map(PathBuf::from);
        config.metrics_server.server_name = lookup("FORWARDER_METRICS_SERVER_CN");

        if let Some(url) = lookup("FORWARDER_AGENT_URL") {
            config.agent.url = url;
        }
        config.agent.ca = lookup("FORWARDER_AGENT_CA").map(PathBuf::from);
        config.agent.cert = lookup("FORWARDER_AGENT_CERT").map(PathBuf::from);
        config.agent.key = lookup("FORWARDER_AGENT_KEY").map(PathBuf::from);
        if let Some(cn) = lookup("FORWARDER_AGENT_CN") {
            config.agent.server_name = Some(cn);
        }
        if config.agent.cert.is_some() != config.agent.key.is_some() {
            return Err(ForwarderError::Config(
                "FORWARDER_AGENT_CERT and FORWARDER_AGENT_KEY must be set together".to_string(),
            ));
        }

        if let Some(id) = lookup("FORWARDER_SUBSCRIPTION_ID") {
            if id.is_empty() {
                return Err(ForwarderError::Config(
                    "FORWARDER_SUBSCRIPTION_ID must not be empty".to_string(),
                ));
            }
            config.subscription_id = id;
        }

        config.ip_tag = lookup("FORWARDER_IP_TAG").filter(|ip| !ip.is_empty());

        if let Some(ms) = parse::<u64, _>(&lookup, "FORWARDER_RECONNECT_WAIT_MS")? {
            config.ingress.reconnect_wait = Duration::from_millis(ms);
        }

        if let Some(secs) = parse::<u64, _>(&lookup, "FORWARDER_STREAM_TIMEOUT_SECS")? {
            config.ingress.stream_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(cap) = parse::<usize, _>(&lookup, "FORWARDER_QUEUE_CAPACITY")? {
            if cap == 0 {
                return Err(ForwarderError::Config(
                    "FORWARDER_QUEUE_CAPACITY must be greater than zero".to_string(),
                ));
            }
            config.queue_capacity = cap;
        }

        if let Some(attempts) = parse::<u32, _>(&lookup, "FORWARDER_SEND_ATTEMPTS")? {
            if attempts == 0 {
                return Err(ForwarderError::Config(
                    "FORWARDER_SEND_ATTEMPTS must be at least 1".to_string(),
                ));
            }
            config.egress.max_send_attempts = attempts;
        }

        if let Some(ms) = parse::<u64, _>(&lookup, "FORWARDER_SEND_RETRY_DELAY_MS")? {
            config.egress.retry_delay = Duration::from_millis(ms);
        }

        if let Some(secs) = parse::<u64, _>(&lookup, "FORWARDER_DRAIN_TIMEOUT_SECS")? {
            config.egress.drain_timeout = Duration::from_secs(secs);
        }

        if let Some(addr) = parse::<SocketAddr, _>(&lookup, "FORWARDER_HEALTH_ADDR")? {
            config.health_addr = addr;
        }

        if let Some(format) = lookup("FORWARDER_LOG_FORMAT") {
            config.log_format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(ForwarderError::Config(format!(
                        "invalid FORWARDER_LOG_FORMAT: {other} (expected 'json' or 'pretty')"
                    )))
                }
            };
        }

        Ok(config)
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ForwarderError::Config(format!("{key} is required")))
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| ForwarderError::Config(format!("invalid {key}: {e}")))
        })
        .transpose()
}
