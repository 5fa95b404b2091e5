//! Outbound adapter for the Auth Service used to provision driver accounts.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Registration payload the auth service expects, camelCased on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRegistration {
    pub full_name: String,
    pub email: String,
    pub username: String,
    pub role: String,
    pub password: String,
    pub confirm_password: String,
}

/// Outbound capability to provision a user account for a new driver.
#[async_trait]
pub trait AccountGateway: Send + Sync {
    async fn register(&self, registration: AccountRegistration)
        -> Result<(), AccountGatewayError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AccountGatewayError {
    #[error("auth service transport failure: {0}")]
    Transport(String),
    #[error("auth service rejected the registration with status {0}")]
    Rejected(u16),
}

/// Reqwest-backed gateway; base URL and timeout injected at construction.
pub struct HttpAccountGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAccountGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let mut base = base_url.into();
        while base.ends_with('/') {
            base.pop();
        }
        Ok(Self { client, base_url: base })
    }
}

#[async_trait]
impl AccountGateway for HttpAccountGateway {
    async fn register(
        &self,
        registration: AccountRegistration,
    ) -> Result<(), AccountGatewayError> {
        let response = self
            .client
            .post(format!("{}/auth/register", self.base_url))
            .json(&registration)
            .send()
            .await
            .map_err(|err| AccountGatewayError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AccountGatewayError::Rejected(status.as_u16()))
        }
    }
}
