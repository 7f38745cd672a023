//! Auth server discovery through the director info endpoint

use super::{http_client, Addresser};
use crate::error::AuthError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::path::Path;
use tokio::sync::OnceCell;
use tracing::debug;

#[derive(Deserialize)]
struct InfoResponse {
    user_authentication: UserAuthentication,
}

#[derive(Deserialize)]
struct UserAuthentication {
    options: AuthOptions,
}

#[derive(Deserialize)]
struct AuthOptions {
    url: String,
}

/// Looks up the auth server address once and remembers it
pub struct AddressProvider {
    client: Client,
    info_url: String,
    addr: OnceCell<String>,
}

impl AddressProvider {
    /// `director_url` is the base URL; `/info` is appended
    pub fn new(director_url: &str, ca: Option<&Path>) -> Result<Self, AuthError> {
        Ok(Self::with_client(director_url, http_client(ca)?))
    }

    pub fn with_client(director_url: &str, client: Client) -> Self {
        Self {
            client,
            info_url: format!("{}/info", director_url.trim_end_matches('/')),
            addr: OnceCell::new(),
        }
    }

    async fn fetch(&self) -> Result<String, AuthError> {
        let response = self
            .client
            .get(&self.info_url)
            .send()
            .await
            .map_err(|e| AuthError::Discovery(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(AuthError::Discovery(format!(
                "info endpoint returned bad status code: {}",
                response.status().as_u16()
            )));
        }

        let info: InfoResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Decode(e.to_string()))?;

        debug!(addr = %info.user_authentication.options.url, "discovered auth server");
        Ok(info.user_authentication.options.url)
    }
}

#[async_trait]
impl Addresser for AddressProvider {
    async fn addr(&self) -> Result<String, AuthError> {
        self.addr
            .get_or_try_init(|| self.fetch())
            .await
            .map(Clone::clone)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct MockDirector {
        requests: AtomicUsize,
        fail_first: bool,
    }

    async fn handle_info(State(state): State<Arc<MockDirector>>) -> (StatusCode, Json<Value>) {
        let n = state.requests.fetch_add(1, Ordering::SeqCst);
        if state.fail_first && n == 0 {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
        }
        (
            StatusCode::OK,
            Json(json!({
                "name": "bosh-lite",
                "user_authentication": {
                    "type": "uaa",
                    "options": { "url": "https://uaa.example.com:8443" }
                }
            })),
        )
    }

    async fn start_mock_director(fail_first: bool) -> (SocketAddr, Arc<MockDirector>) {
        let state = Arc::new(MockDirector {
            fail_first,
            ..Default::default()
        });
        let app = Router::new()
            .route("/info", get(handle_info))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (addr, state)
    }

    #[tokio::test]
    async fn test_addr_is_read_from_info() {
        let (addr, _state) = start_mock_director(false).await;
        let provider = AddressProvider::new(&format!("http://{addr}"), None).unwrap();

        assert_eq!(
            provider.addr().await.unwrap(),
            "https://uaa.example.com:8443"
        );
    }

    #[tokio::test]
    async fn test_addr_is_cached() {
        let (addr, state) = start_mock_director(false).await;
        let provider = AddressProvider::new(&format!("http://{addr}/"), None).unwrap();

        provider.addr().await.unwrap();
        provider.addr().await.unwrap();
        provider.addr().await.unwrap();

        assert_eq!(state.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bad_status_is_not_cached() {
        let (addr, state) = start_mock_director(true).await;
        let provider = AddressProvider::new(&format!("http://{addr}"), None).unwrap();

        let err = provider.addr().await.unwrap_err();
        assert!(matches!(err, AuthError::Discovery(msg) if msg.contains("500")));

        assert_eq!(
            provider.addr().await.unwrap(),
            "https://uaa.example.com:8443"
        );
        assert_eq!(state.requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_undecodable_body() {
        let app = Router::new().route("/info", get(|| async { "not json" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let provider = AddressProvider::new(&format!("http://{addr}"), None).unwrap();
        assert!(matches!(
            provider.addr().await,
            Err(AuthError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_director() {
        let provider = AddressProvider::new("http://127.0.0.1:1", None).unwrap();
        assert!(matches!(
            provider.addr().await,
            Err(AuthError::Discovery(_))
        ));
    }
}
