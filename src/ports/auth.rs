use color_eyre::eyre::Result;

/// The identity behind a bearer token, as reported by the hosted auth provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    /// Name from the provider's user metadata, used to seed the profile.
    pub name: Option<String>,
}

/// Port trait wrapping the hosted auth provider's token lookup.
///
/// Implementations live in `services::auth_client` (production) or test mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AuthVerifier: Send + Sync {
    /// Returns `None` when the provider rejects the token.
    async fn verify(&self, access_token: &str) -> Result<Option<AuthUser>>;
}
