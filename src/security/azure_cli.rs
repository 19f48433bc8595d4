use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::security::credential::{CredentialError, TokenCredential};
use crate::security::token::{to_resource, AccessToken};

const KIND: &str = "AzureCliCredential";
const CLI_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliToken {
    access_token: String,
    /// Local wall-clock time, e.g. `2024-01-01 10:00:00.000000`.
    #[serde(default)]
    expires_on: Option<String>,
    /// Epoch seconds; only emitted by CLI 2.54 and later.
    #[serde(default, rename = "expires_on")]
    expires_on_epoch: Option<i64>,
}

/// Developer fallback: token of the account signed in to the Azure CLI.
#[derive(Debug, Clone)]
pub struct AzureCliCredential {
    program: String,
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self::with_program("az")
    }
}

impl AzureCliCredential {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

fn valid_argument(value: &str, extra: &[char]) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || extra.contains(&c))
}

fn parse_cli_output(stdout: &[u8]) -> Result<AccessToken, CredentialError> {
    let parsed: CliToken = serde_json::from_slice(stdout)
        .map_err(|e| CredentialError::authentication(KIND, format!("parsing CLI output: {}", e)))?;

    let expires_on: Option<DateTime<Utc>> = match (parsed.expires_on_epoch, &parsed.expires_on) {
        (Some(epoch), _) => Utc.timestamp_opt(epoch, 0).single(),
        (None, Some(local)) => NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .and_then(|naive| Local.from_local_datetime(&naive).single())
            .map(|dt| dt.with_timezone(&Utc)),
        (None, None) => None,
    };
    let expires_on = expires_on
        .ok_or_else(|| CredentialError::authentication(KIND, "CLI token has no usable expiry"))?;

    Ok(AccessToken::new(parsed.access_token, expires_on))
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    fn kind(&self) -> &'static str {
        KIND
    }

    async fn get_token(
        &self,
        scope: &str,
        tenant: Option<&str>,
    ) -> Result<AccessToken, CredentialError> {
        let resource = to_resource(scope);
        if !valid_argument(resource, &['_', ':', '/']) {
            return Err(CredentialError::authentication(KIND, "scope contains invalid characters"));
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(["account", "get-access-token", "--output", "json", "--resource", resource]);
        if let Some(tenant) = tenant {
            if !valid_argument(tenant, &[]) {
                return Err(CredentialError::authentication(
                    KIND,
                    "tenant contains invalid characters",
                ));
            }
            cmd.args(["--tenant", tenant]);
        }
        cmd.kill_on_drop(true);

        debug!(program = %self.program, resource = %resource, "invoking Azure CLI");

        let output = match tokio::time::timeout(CLI_TIMEOUT, cmd.output()).await {
            Err(_) => {
                return Err(CredentialError::authentication(KIND, "Azure CLI timed out"));
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CredentialError::unavailable(KIND, "Azure CLI not installed"));
            }
            Ok(Err(e)) => {
                return Err(CredentialError::unavailable(
                    KIND,
                    format!("failed to start Azure CLI: {}", e),
                ));
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("az login") || stderr.contains("az account set") {
                return Err(CredentialError::unavailable(KIND, "not logged in, run `az login`"));
            }
            return Err(CredentialError::authentication(
                KIND,
                format!("Azure CLI exited with {}", output.status),
            ));
        }

        parse_cli_output(&output.stdout)
    }
}
