use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::function::config::CredentialMode;
use crate::function::settings::Settings;
use crate::security::azure_cli::AzureCliCredential;
use crate::security::credential::{CredentialError, TokenCredential};
use crate::security::environment::EnvironmentCredential;
use crate::security::managed_identity::ManagedIdentityCredential;
use crate::security::token::AccessToken;

const KIND: &str = "ChainedTokenCredential";

/// Tries each credential in order and returns the first token issued.
pub struct ChainedTokenCredential {
    sources: Vec<Arc<dyn TokenCredential>>,
}

impl ChainedTokenCredential {
    pub fn new(sources: Vec<Arc<dyn TokenCredential>>) -> Self {
        Self { sources }
    }

    /// Environment client secret, then managed identity, then the Azure CLI.
    pub fn default_chain(settings: &Settings, http_client: Client) -> Self {
        let mut sources: Vec<Arc<dyn TokenCredential>> = Vec::with_capacity(3);
        sources.push(Arc::new(EnvironmentCredential::from_settings(
            settings,
            http_client.clone(),
        )));
        sources.push(Arc::new(ManagedIdentityCredential::from_settings(
            settings,
            http_client,
        )));
        sources.push(Arc::new(AzureCliCredential::default()));
        Self::new(sources)
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.kind()).collect()
    }
}

#[async_trait]
impl TokenCredential for ChainedTokenCredential {
    fn kind(&self) -> &'static str {
        KIND
    }

    async fn get_token(
        &self,
        scope: &str,
        tenant: Option<&str>,
    ) -> Result<AccessToken, CredentialError> {
        let mut failures: Vec<CredentialError> = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            match source.get_token(scope, tenant).await {
                Ok(token) => {
                    debug!(credential = source.kind(), "credential issued token");
                    return Ok(token);
                }
                Err(err) => {
                    if err.is_unavailable() {
                        debug!(error = %err, "credential skipped");
                    } else {
                        warn!(error = %err, "credential failed, trying next");
                    }
                    failures.push(err);
                }
            }
        }

        let reason = if failures.is_empty() {
            "no credentials configured".to_string()
        } else {
            failures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        };

        if failures.iter().all(CredentialError::is_unavailable) {
            Err(CredentialError::unavailable(KIND, reason))
        } else {
            Err(CredentialError::authentication(KIND, reason))
        }
    }
}

/// Credential the function authenticates with, per the configured mode.
pub fn build_credential(
    mode: CredentialMode,
    settings: &Settings,
    http_client: Client,
) -> Arc<dyn TokenCredential> {
    match mode {
        CredentialMode::Default => {
            let chain = ChainedTokenCredential::default_chain(settings, http_client);
            debug!(sources = ?chain.kinds(), "using default credential chain");
            Arc::new(chain)
        }
        CredentialMode::ManagedIdentity => Arc::new(ManagedIdentityCredential::from_settings(
            settings,
            http_client,
        )),
    }
}
