//! Credential resolution for the upstream metrics server
//!
//! The auth server address is discovered from the director's `/info` endpoint
//! once and cached. Tokens are fetched on demand with client credentials; there
//! is no background refresh, callers ask for a new token when the old one is
//! rejected.

mod addresser;
mod token;

pub use addresser::AddressProvider;
pub use token::Auth;

use crate::error::AuthError;
use async_trait::async_trait;
use reqwest::{Certificate, Client};
use std::path::Path;
use std::time::Duration;

/// Request timeout for director and auth server calls
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolves the auth server base URL
#[async_trait]
pub trait Addresser: Send + Sync {
    async fn addr(&self) -> Result<String, AuthError>;
}

/// Produces a bearer token for the upstream stream
#[async_trait]
pub trait Tokener: Send + Sync {
    async fn token(&self) -> Result<String, AuthError>;
}

/// Build an HTTP client trusting the optional CA in addition to the system roots
pub fn http_client(ca: Option<&Path>) -> Result<Client, AuthError> {
    let mut builder = Client::builder().timeout(HTTP_TIMEOUT);

    if let Some(path) = ca {
        let pem = std::fs::read(path)
            .map_err(|e| AuthError::Client(format!("reading CA {}: {e}", path.display())))?;
        let cert = Certificate::from_pem(&pem)
            .map_err(|e| AuthError::Client(format!("parsing CA {}: {e}", path.display())))?;
        builder = builder.add_root_certificate(cert);
    }

    builder
        .build()
        .map_err(|e| AuthError::Client(format!("failed to build HTTP client: {e}")))
}
