use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use reqwest::Client;
use std::sync::Arc;
use tracing::{info, warn};

use crate::function::config::ForwarderConfig;
use crate::function::errors::ForwardError;
use crate::security::audit_log::AuditLogger;
use crate::security::credential::TokenCredential;
use crate::transport::apim::{ApimClient, UpstreamResponse};

/// Message and status returned to the original caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relay {
    pub status: StatusCode,
    pub message: String,
}

impl From<UpstreamResponse> for Relay {
    fn from(upstream: UpstreamResponse) -> Self {
        if upstream.status == 200 {
            Relay {
                status: StatusCode::OK,
                message: format!(
                    "Backend call successful with status code: {}. Response: {}",
                    upstream.status, upstream.body
                ),
            }
        } else {
            Relay {
                status: StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY),
                message: format!(
                    "Backend call failed with status code: {}. Response: {}",
                    upstream.status, upstream.body
                ),
            }
        }
    }
}

impl IntoResponse for Relay {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

/// Acquires a backend token and relays one call through API Management.
///
/// Holds no per-invocation state; tokens are requested fresh on every call.
#[derive(Clone)]
pub struct Forwarder {
    config: Arc<ForwarderConfig>,
    credential: Arc<dyn TokenCredential>,
    apim: ApimClient,
    audit: AuditLogger,
}

impl Forwarder {
    pub fn new(
        config: Arc<ForwarderConfig>,
        credential: Arc<dyn TokenCredential>,
        http_client: Client,
    ) -> Self {
        let apim = ApimClient::new(&config, http_client);
        Self {
            config,
            credential,
            apim,
            audit: AuditLogger::new(),
        }
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    pub fn credential(&self) -> &Arc<dyn TokenCredential> {
        &self.credential
    }

    pub async fn invoke(
        &self,
        invocation_id: &str,
        name: Option<&str>,
    ) -> Result<Relay, ForwardError> {
        info!(invocation_id, "frontend trigger processing request");

        let token = match self
            .credential
            .get_token(&self.config.backend_client_id, Some(self.config.tenant_id.as_str()))
            .await
        {
            Ok(token) => token,
            Err(err) => {
                self.audit
                    .token_failure(invocation_id, self.credential.kind(), &err.to_string());
                return Err(err.into());
            }
        };
        self.audit.token_acquired(
            invocation_id,
            self.credential.kind(),
            &token.expires_on().to_rfc3339(),
        );

        info!(invocation_id, url = %self.apim.target_url(), "forwarding to backend");
        let upstream = match self.apim.forward(&token, name).await {
            Ok(upstream) => upstream,
            Err(err) => {
                match &err {
                    ForwardError::InvalidHeader(what) => {
                        warn!(invocation_id, header = *what, "rejected inbound value")
                    }
                    other => self
                        .audit
                        .upstream_unreachable(invocation_id, &other.to_string()),
                }
                return Err(err);
            }
        };
        self.audit
            .upstream_response(invocation_id, upstream.status, upstream.body.len());

        Ok(Relay::from(upstream))
    }
}
