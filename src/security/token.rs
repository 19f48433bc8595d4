use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Bearer token issued for one invocation.
///
/// The token string is only reachable through [`AccessToken::secret`]; `Debug`
/// prints `[REDACTED]` so the value cannot slip into a log line.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    token: String,
    expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_on,
        }
    }

    /// Build a token from a relative `expires_in` lifetime in seconds.
    pub fn expiring_in(token: impl Into<String>, expires_in_secs: i64) -> Self {
        Self::new(token, Utc::now() + Duration::seconds(expires_in_secs))
    }

    pub fn secret(&self) -> &str {
        &self.token
    }

    pub fn expires_on(&self) -> DateTime<Utc> {
        self.expires_on
    }

    pub fn is_expired(&self) -> bool {
        self.expires_on <= Utc::now()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Append `/.default` to a bare resource identifier, as OAuth2 v2 endpoints expect.
pub fn to_v2_scope(scope: &str) -> String {
    if scope.ends_with("/.default") || scope.contains(' ') {
        scope.to_string()
    } else {
        format!("{}/.default", scope.trim_end_matches('/'))
    }
}

/// Resource form of a scope for endpoints that take `resource=` (IMDS, Azure CLI).
pub fn to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}
