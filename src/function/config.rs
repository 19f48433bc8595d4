use anyhow::{anyhow, bail, Context, Result};
use std::str::FromStr;
use std::time::Duration;

use crate::function::settings::Settings;

/// Which credential the function authenticates with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialMode {
    /// Environment, managed identity, then Azure CLI.
    #[default]
    Default,
    /// Managed identity only, for deployments that mandate it.
    ManagedIdentity,
}

impl FromStr for CredentialMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" | "chain" => Ok(Self::Default),
            "managed_identity" | "managedidentity" | "msi" => Ok(Self::ManagedIdentity),
            other => Err(anyhow!("unknown credential mode '{}'", other)),
        }
    }
}

/// Authentication the hosting layer demands before the trigger runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthLevel {
    Anonymous,
    Function { key: String },
}

/// Application settings of the frontend function.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Token scope: the backend app registration's client id or application id URI.
    pub backend_client_id: String,
    pub tenant_id: String,
    pub apim_name: String,
    pub backend_name: String,
    pub subscription_key: String,
    /// Gateway origin; `https://{apim_name}.azure-api.net` unless overridden.
    pub apim_base_url: String,
    pub apim_timeout: Option<Duration>,
    pub credential_mode: CredentialMode,
    pub auth_level: AuthLevel,
}

/// What a backend token is requested for. Needs none of the gateway or
/// hosting settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTarget {
    pub backend_client_id: String,
    pub tenant_id: String,
    pub credential_mode: CredentialMode,
}

impl TokenTarget {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let missing: Vec<&str> = ["BACKEND_CLIENT_ID", "TENANT_ID"]
            .into_iter()
            .filter(|key| settings.get(key).is_none())
            .collect();
        if !missing.is_empty() {
            bail!("missing required settings: {}", missing.join(", "));
        }

        Ok(Self {
            backend_client_id: settings.get("BACKEND_CLIENT_ID").unwrap_or_default(),
            tenant_id: settings.get("TENANT_ID").unwrap_or_default(),
            credential_mode: credential_mode(settings)?,
        })
    }
}

fn credential_mode(settings: &Settings) -> Result<CredentialMode> {
    Ok(settings
        .get("AZURE_CREDENTIAL_MODE")
        .map(|v| v.parse::<CredentialMode>())
        .transpose()?
        .unwrap_or_default())
}

const REQUIRED: [&str; 5] = [
    "BACKEND_CLIENT_ID",
    "TENANT_ID",
    "APIM_NAME",
    "BACKEND_NAME",
    "APIM_SUBSCRIPTION_KEY",
];

impl ForwarderConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let missing: Vec<&str> = REQUIRED
            .iter()
            .copied()
            .filter(|key| settings.get(key).is_none())
            .collect();
        if !missing.is_empty() {
            bail!("missing required settings: {}", missing.join(", "));
        }
        let required = |key: &str| settings.get(key).unwrap_or_default();

        let apim_name = required("APIM_NAME");
        let apim_base_url = settings
            .get("APIM_BASE_URL")
            .unwrap_or_else(|| format!("https://{}.azure-api.net", apim_name))
            .trim_end_matches('/')
            .to_string();

        let apim_timeout = settings
            .get("APIM_TIMEOUT_SECS")
            .map(|v| v.parse::<u64>().context("parsing APIM_TIMEOUT_SECS"))
            .transpose()?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let credential_mode = credential_mode(settings)?;

        let auth_level = match settings
            .get("FUNCTION_AUTH_LEVEL")
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("function") => match settings.get("FUNCTION_KEY") {
                Some(key) => AuthLevel::Function { key },
                None => bail!("FUNCTION_AUTH_LEVEL is 'function' but FUNCTION_KEY is not set"),
            },
            Some("anonymous") => AuthLevel::Anonymous,
            Some(other) => bail!("unknown FUNCTION_AUTH_LEVEL '{}'", other),
        };

        Ok(Self {
            backend_client_id: required("BACKEND_CLIENT_ID"),
            tenant_id: required("TENANT_ID"),
            apim_name,
            backend_name: required("BACKEND_NAME"),
            subscription_key: required("APIM_SUBSCRIPTION_KEY"),
            apim_base_url,
            apim_timeout,
            credential_mode,
            auth_level,
        })
    }

    pub fn token_target(&self) -> TokenTarget {
        TokenTarget {
            backend_client_id: self.backend_client_id.clone(),
            tenant_id: self.tenant_id.clone(),
            credential_mode: self.credential_mode,
        }
    }

    /// `{base}/{backend}/{backend}_trigger`
    pub fn target_url(&self) -> String {
        format!(
            "{}/{}/{}_trigger",
            self.apim_base_url, self.backend_name, self.backend_name
        )
    }
}
