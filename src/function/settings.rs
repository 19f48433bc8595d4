use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Shape of an Azure Functions `local.settings.json`; only `Values` is read.
#[derive(Debug, Deserialize)]
struct LocalSettingsFile {
    #[serde(rename = "Values", default)]
    values: HashMap<String, serde_json::Value>,
}

/// Key/value lookup for application settings.
///
/// The process environment wins; values loaded from a settings file fill the gaps.
/// Empty strings count as unset.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    use_process_env: bool,
    values: HashMap<String, String>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            use_process_env: true,
            values: HashMap::new(),
        }
    }

    /// Environment first, then the `Values` of a `local.settings.json`.
    pub fn from_env_and_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut settings = Self::from_env();
        settings.values = read_local_settings(path.as_ref())?;
        Ok(settings)
    }

    /// Fixed values, isolated from the process environment.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            use_process_env: false,
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if self.use_process_env {
            if let Ok(v) = std::env::var(key) {
                if !v.is_empty() {
                    return Some(v);
                }
            }
        }
        self.values.get(key).filter(|v| !v.is_empty()).cloned()
    }
}

fn read_local_settings(path: &Path) -> Result<HashMap<String, String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading settings file {}", path.display()))?;
    let parsed: LocalSettingsFile = serde_json::from_str(&raw).context("parsing settings JSON")?;

    // The Functions host stringifies scalar values; do the same.
    Ok(parsed
        .values
        .into_iter()
        .filter_map(|(k, v)| match v {
            serde_json::Value::String(s) => Some((k, s)),
            serde_json::Value::Number(n) => Some((k, n.to_string())),
            serde_json::Value::Bool(b) => Some((k, b.to_string())),
            _ => None,
        })
        .collect())
}
