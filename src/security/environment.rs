use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::function::settings::Settings;
use crate::security::credential::{
    CredentialError, OAuthErrorResponse, OAuthTokenResponse, TokenCredential,
};
use crate::security::token::{to_v2_scope, AccessToken};

const KIND: &str = "EnvironmentCredential";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

#[derive(Debug, Clone)]
struct ClientSecret {
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

/// Service principal client-secret flow configured through `AZURE_*` settings.
///
/// Settings:
/// - `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`
/// - `AZURE_AUTHORITY_HOST` (defaults to the public cloud)
#[derive(Debug, Clone)]
pub struct EnvironmentCredential {
    secret: Option<ClientSecret>,
    authority_host: String,
    http_client: Client,
}

impl EnvironmentCredential {
    pub fn from_settings(settings: &Settings, http_client: Client) -> Self {
        let secret = match (
            settings.get("AZURE_TENANT_ID"),
            settings.get("AZURE_CLIENT_ID"),
            settings.get("AZURE_CLIENT_SECRET"),
        ) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => Some(ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            }),
            _ => None,
        };
        let authority_host = settings
            .get("AZURE_AUTHORITY_HOST")
            .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string());

        Self {
            secret,
            authority_host: authority_host.trim_end_matches('/').to_string(),
            http_client,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }
}

#[async_trait]
impl TokenCredential for EnvironmentCredential {
    fn kind(&self) -> &'static str {
        KIND
    }

    async fn get_token(
        &self,
        scope: &str,
        tenant: Option<&str>,
    ) -> Result<AccessToken, CredentialError> {
        let secret = self.secret.as_ref().ok_or_else(|| {
            CredentialError::unavailable(
                KIND,
                "AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET are not all set",
            )
        })?;

        let tenant_id = tenant.unwrap_or(&secret.tenant_id);
        let url = format!("{}/{}/oauth2/v2.0/token", self.authority_host, tenant_id);
        let scope = to_v2_scope(scope);

        debug!(url = %url, scope = %scope, "requesting client credentials token");

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", secret.client_id.as_str()),
            ("client_secret", secret.client_secret.as_str()),
            ("scope", scope.as_str()),
        ];
        let response = self
            .http_client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| CredentialError::authentication(KIND, format!("token request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let reason = match response.json::<OAuthErrorResponse>().await {
                Ok(body) => body.summary(),
                Err(_) => "unreadable error body".to_string(),
            };
            return Err(CredentialError::authentication(
                KIND,
                format!("status {}: {}", status.as_u16(), reason),
            ));
        }

        let body: OAuthTokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::authentication(KIND, format!("parsing token: {}", e)))?;

        Ok(AccessToken::expiring_in(
            body.access_token,
            body.expires_in.unwrap_or(3600),
        ))
    }
}
