//! Client credentials token exchange

use super::{http_client, Addresser, Tokener};
use crate::error::AuthError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Fetches tokens from the auth server found by an [`Addresser`]
pub struct Auth {
    client: Client,
    addresser: Arc<dyn Addresser>,
    client_id: String,
    client_secret: String,
}

impl Auth {
    pub fn new(
        addresser: Arc<dyn Addresser>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        ca: Option<&Path>,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            client: http_client(ca)?,
            addresser,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        })
    }
}

#[async_trait]
impl Tokener for Auth {
    async fn token(&self) -> Result<String, AuthError> {
        let addr = self.addresser.addr().await?;
        let url = format!("{}/oauth/token", addr.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
                ("response_type", "token"),
            ])
            .send()
            .await
            .map_err(|e| AuthError::AuthRequest(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(AuthError::AuthRequest(format!(
                "auth endpoint returned bad status code: {}",
                response.status().as_u16()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Decode(e.to_string()))?;

        debug!(client_id = %self.client_id, "obtained token");
        Ok(body.access_token)
    }
}
