use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::function::settings::Settings;
use crate::security::credential::{CredentialError, TokenCredential};
use crate::security::token::{to_resource, AccessToken};

const KIND: &str = "ManagedIdentityCredential";

pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";
const IMDS_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the platform exposes the identity token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySource {
    /// App Service / Functions: `IDENTITY_ENDPOINT` + `IDENTITY_HEADER`.
    AppService { endpoint: String, header: String },
    /// Instance Metadata Service on VMs and container hosts.
    Imds { endpoint: String },
}

#[derive(Debug, Deserialize)]
struct ManagedIdentityToken {
    access_token: String,
    expires_on: EpochSeconds,
}

/// Both endpoints send `expires_on` as epoch seconds, sometimes quoted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EpochSeconds {
    Number(i64),
    Text(String),
}

impl EpochSeconds {
    fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let secs = match self {
            EpochSeconds::Number(n) => *n,
            EpochSeconds::Text(s) => s.trim().parse().ok()?,
        };
        Utc.timestamp_opt(secs, 0).single()
    }
}

/// Platform-issued identity of the hosting environment.
#[derive(Debug, Clone)]
pub struct ManagedIdentityCredential {
    source: IdentitySource,
    /// Client id of a user-assigned identity; `None` selects the system-assigned one.
    client_id: Option<String>,
    http_client: Client,
}

impl ManagedIdentityCredential {
    pub fn from_settings(settings: &Settings, http_client: Client) -> Self {
        let source = match (settings.get("IDENTITY_ENDPOINT"), settings.get("IDENTITY_HEADER")) {
            (Some(endpoint), Some(header)) => IdentitySource::AppService { endpoint, header },
            _ => IdentitySource::Imds {
                endpoint: IMDS_ENDPOINT.to_string(),
            },
        };
        Self::new(source, settings.get("AZURE_CLIENT_ID"), http_client)
    }

    pub fn new(source: IdentitySource, client_id: Option<String>, http_client: Client) -> Self {
        Self {
            source,
            client_id,
            http_client,
        }
    }

    pub fn source(&self) -> &IdentitySource {
        &self.source
    }

    fn request(&self, resource: &str) -> reqwest::RequestBuilder {
        let mut query: Vec<(&str, &str)> = vec![("resource", resource)];
        if let Some(client_id) = self.client_id.as_deref() {
            query.push(("client_id", client_id));
        }

        match &self.source {
            IdentitySource::AppService { endpoint, header } => {
                query.push(("api-version", APP_SERVICE_API_VERSION));
                self.http_client
                    .get(endpoint)
                    .query(&query)
                    .header("X-IDENTITY-HEADER", header)
            }
            IdentitySource::Imds { endpoint } => {
                query.push(("api-version", IMDS_API_VERSION));
                self.http_client
                    .get(endpoint)
                    .query(&query)
                    .header("Metadata", "true")
                    .timeout(IMDS_TIMEOUT)
            }
        }
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    fn kind(&self) -> &'static str {
        KIND
    }

    async fn get_token(
        &self,
        scope: &str,
        _tenant: Option<&str>,
    ) -> Result<AccessToken, CredentialError> {
        // Managed identities are bound to their own tenant; the override does not apply.
        let resource = to_resource(scope);
        let imds = matches!(self.source, IdentitySource::Imds { .. });

        debug!(resource = %resource, imds, "requesting managed identity token");

        let response = self.request(resource).send().await.map_err(|e| {
            if imds {
                CredentialError::unavailable(KIND, format!("IMDS endpoint unreachable: {}", e))
            } else {
                CredentialError::authentication(KIND, format!("identity endpoint: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            // IMDS answers 400 when no identity is assigned to the host.
            if imds && status.as_u16() == 400 {
                return Err(CredentialError::unavailable(
                    KIND,
                    "no managed identity assigned to this host",
                ));
            }
            return Err(CredentialError::authentication(
                KIND,
                format!("identity endpoint returned status {}", status.as_u16()),
            ));
        }

        let body: ManagedIdentityToken = response
            .json()
            .await
            .map_err(|e| CredentialError::authentication(KIND, format!("parsing token: {}", e)))?;
        let expires_on = body.expires_on.to_datetime().ok_or_else(|| {
            CredentialError::authentication(KIND, "token carries an invalid expires_on")
        })?;

        Ok(AccessToken::new(body.access_token, expires_on))
    }
}
