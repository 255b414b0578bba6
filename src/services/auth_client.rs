use std::time::Duration;

use color_eyre::eyre::{Result, WrapErr, eyre};
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use crate::ports::auth::{AuthUser, AuthVerifier};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct HostedUser {
    id: String,
    email: Option<String>,
    #[serde(default)]
    user_metadata: HostedUserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct HostedUserMetadata {
    full_name: Option<String>,
    name: Option<String>,
}

impl From<HostedUser> for AuthUser {
    fn from(user: HostedUser) -> Self {
        let HostedUserMetadata { full_name, name } = user.user_metadata;
        Self {
            id: user.id,
            email: user.email,
            name: full_name.or(name).filter(|n| !n.trim().is_empty()),
        }
    }
}

/// Verifies access tokens by asking the hosted auth provider who they belong to.
pub struct HostedAuthClient {
    client: reqwest::Client,
    user_url: Url,
    api_key: String,
}

impl HostedAuthClient {
    pub fn new(base_url: &str, api_key: String) -> Result<Self> {
        let base = Url::parse(base_url).wrap_err("Invalid auth provider URL")?;
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .wrap_err("Failed to build auth http client")?,
            user_url: base
                .join("auth/v1/user")
                .wrap_err("Invalid auth provider URL")?,
            api_key,
        })
    }
}

#[async_trait::async_trait]
impl AuthVerifier for HostedAuthClient {
    async fn verify(&self, access_token: &str) -> Result<Option<AuthUser>> {
        let response = self
            .client
            .get(self.user_url.clone())
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .wrap_err("Failed to reach auth provider")?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Ok(None),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(eyre!("Auth provider responded with {status}: {body}"));
            }
            _ => {}
        }

        let user: HostedUser = response
            .json()
            .await
            .wrap_err("Failed to parse auth provider user")?;
        Ok(Some(user.into()))
    }
}
