use async_trait::async_trait;

use crate::security::token::AccessToken;

/// Failure modes of a single credential source.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CredentialError {
    /// The source is not configured in this environment; a chain moves on.
    #[error("{credential} unavailable: {reason}")]
    Unavailable {
        credential: &'static str,
        reason: String,
    },
    /// The source is configured but the token request failed.
    #[error("{credential} authentication failed: {reason}")]
    Authentication {
        credential: &'static str,
        reason: String,
    },
}

impl CredentialError {
    pub fn unavailable(credential: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            credential,
            reason: reason.into(),
        }
    }

    pub fn authentication(credential: &'static str, reason: impl Into<String>) -> Self {
        Self::Authentication {
            credential,
            reason: reason.into(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// A source of bearer tokens.
///
/// `tenant` overrides the tenant the credential was configured with, when the
/// source supports it.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Short name used in logs and aggregated errors.
    fn kind(&self) -> &'static str;

    async fn get_token(
        &self,
        scope: &str,
        tenant: Option<&str>,
    ) -> Result<AccessToken, CredentialError>;
}

/// Issued-token payload shared by the AAD v2 endpoint.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct OAuthTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Body of an AAD error response; only used to build a reason string.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct OAuthErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_codes: Vec<u64>,
}

impl OAuthErrorResponse {
    /// Error code and AADSTS numbers, without the free-text description that may echo tenant ids.
    pub fn summary(&self) -> String {
        let codes = self
            .error_codes
            .iter()
            .map(|c| format!("AADSTS{}", c))
            .collect::<Vec<_>>()
            .join(",");
        match (&self.error, codes.is_empty()) {
            (Some(e), true) => e.clone(),
            (Some(e), false) => format!("{} ({})", e, codes),
            (None, false) => codes,
            (None, true) => "unknown error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CredentialError::unavailable("ManagedIdentityCredential", "no endpoint");
        assert!(err.is_unavailable());
        assert_eq!(err.to_string(), "ManagedIdentityCredential unavailable: no endpoint");

        let err = CredentialError::authentication("EnvironmentCredential", "invalid_client");
        assert!(!err.is_unavailable());
        assert_eq!(
            err.to_string(),
            "EnvironmentCredential authentication failed: invalid_client"
        );
    }

    #[test]
    fn test_oauth_error_summary() {
        let body: OAuthErrorResponse = serde_json::from_str(
            r#"{"error":"invalid_client","error_description":"AADSTS7000215: Invalid client secret. Tenant 'abc'","error_codes":[7000215]}"#,
        )
        .unwrap();
        assert_eq!(body.summary(), "invalid_client (AADSTS7000215)");

        let empty: OAuthErrorResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.summary(), "unknown error");
    }
}
