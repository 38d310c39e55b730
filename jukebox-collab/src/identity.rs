use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// A verified profile returned by the identity provider.
#[derive(Debug, Clone)]
pub struct IdentityProfile {
    /// The provider's stable subject id, used as the user's primary key
    pub subject: String,
    pub email: String,
    pub name: String,
    pub picture: String,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Credential could not be verified")]
    InvalidCredential,
    #[error("Identity provider did not respond: {0}")]
    Unavailable(String),
}

/// Represents a service that exchanges an opaque credential for a
/// verified profile.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    async fn verify(&self, credential: &str) -> Result<IdentityProfile, IdentityError>;
}

/// Verifies Google ID tokens against the tokeninfo endpoint.
pub struct GoogleIdentity {
    client: Client,
    client_id: String,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    sub: String,
    email: String,
    name: String,
    #[serde(default)]
    picture: String,
}

impl GoogleIdentity {
    pub fn new(client_id: String) -> Self {
        let client = Client::builder()
            .timeout(VERIFY_TIMEOUT)
            .build()
            .expect("http client is built");

        Self { client, client_id }
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentity {
    async fn verify(&self, credential: &str) -> Result<IdentityProfile, IdentityError> {
        let response = self
            .client
            .get(TOKENINFO_URL)
            .query(&[("id_token", credential)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    IdentityError::Unavailable(e.to_string())
                } else {
                    IdentityError::InvalidCredential
                }
            })?;

        if !response.status().is_success() {
            return Err(IdentityError::InvalidCredential);
        }

        let info: TokenInfo = response
            .json()
            .await
            .map_err(|_| IdentityError::InvalidCredential)?;

        // A token minted for another application is not ours to accept
        if info.aud != self.client_id {
            return Err(IdentityError::InvalidCredential);
        }

        Ok(IdentityProfile {
            subject: info.sub,
            email: info.email,
            name: info.name,
            picture: info.picture,
        })
    }
}
