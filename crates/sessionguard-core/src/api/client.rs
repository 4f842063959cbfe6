//! REST implementation of `AuthGateway`.
//!
//! Endpoints, relative to the configured base URL:
//! - `POST /auth/login` with `{email, password}`, answering `{token, user}`
//! - `GET /auth/validate` with a bearer token; 2xx accepted, 401/403 rejected
//! - `POST /auth/logout` with a bearer token

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Serialize;
use tracing::{debug, warn};

use super::{AuthError, AuthGateway};
use crate::config::Config;
use crate::models::{Authenticated, Credentials};

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// HTTP client for the authentication service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpAuthGateway {
    client: Client,
    base_url: String,
}

impl HttpAuthGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AuthError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &Config) -> Result<Self, AuthError> {
        Self::new(config.api_base_url.clone(), config.request_timeout())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, AuthError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(AuthError::from_status(status, &body))
        }
    }
}

#[async_trait]
impl AuthGateway for HttpAuthGateway {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Authenticated, AuthError> {
        if let Err(message) = Credentials::new(email, password).validate() {
            return Err(AuthError::InvalidCredentials(message.to_string()));
        }

        let url = self.url("/auth/login");
        debug!(email = email, "Sending authentication request");

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let authenticated: Authenticated = response.json().await?;

        if authenticated.token.trim().is_empty() {
            return Err(AuthError::ServerError(
                "Authentication response carried no token".to_string(),
            ));
        }
        Ok(authenticated)
    }

    async fn validate_token(&self, token: &str) -> Result<bool, AuthError> {
        let url = self.url("/auth/validate");

        let response = self.client.get(&url).bearer_auth(token).send().await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!(status = %response.status(), "Token rejected by server");
                Ok(false)
            }
            _ => Self::check_response(response).await.map(|_| true),
        }
    }

    async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        let url = self.url("/auth/logout");

        let response = self.client.post(&url).bearer_auth(token).send().await?;

        if let Err(e) = Self::check_response(response).await {
            warn!(error = %e, "Token revocation failed");
            return Err(e);
        }
        Ok(())
    }
}
