//! BOSH system metrics forwarder
//!
//! Relays heartbeat metrics from the BOSH system metrics server stream into a
//! Loggregator v2 agent, reconnecting and re-authenticating on its own.
//!
//! # Architecture
//!
//! ```text
//! metrics server ──► Ingress ──► RelayQueue ──► Egress ──► Loggregator agent
//!                      │
//!                   Tokener (director /info + /oauth/token)
//! ```
//!
//! Ingress never blocks on the queue; egress retries each envelope a bounded
//! number of times before reconnecting.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod auth;
pub mod config;
pub mod egress;
pub mod error;
pub mod ingress;
pub mod mapper;
pub mod metrics;
pub mod metrics_server;
pub mod pipeline;
pub mod relay;
pub mod task;
pub mod transport;

// Generated protobuf and gRPC client code
pub mod proto {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::derive_partial_eq_without_eq)]

    pub mod definitions {
        include!("proto/definitions.rs");
    }

    pub mod loggregator_v2 {
        include!("proto/loggregator.v2.rs");
    }
}

pub use config::Config;
pub use error::{ForwarderError, Result};
pub use pipeline::{Components, Forwarder};
