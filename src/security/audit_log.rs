use tracing::{error, info, warn};

/// Structured audit events. Carries identifiers and status codes only.
#[derive(Debug, Clone, Default)]
pub struct AuditLogger;

impl AuditLogger {
    pub fn new() -> Self {
        Self
    }

    pub fn token_acquired(&self, invocation_id: &str, credential: &str, expires_on: &str) {
        info!(target: "audit", event = "token_acquired", invocation_id, credential, expires_on);
    }

    pub fn token_failure(&self, invocation_id: &str, credential: &str, reason: &str) {
        error!(target: "audit", event = "token_failure", invocation_id, credential, reason);
    }

    pub fn upstream_response(&self, invocation_id: &str, status: u16, body_len: usize) {
        info!(target: "audit", event = "upstream_response", invocation_id, status, body_len);
    }

    pub fn upstream_unreachable(&self, invocation_id: &str, reason: &str) {
        error!(target: "audit", event = "upstream_unreachable", invocation_id, reason);
    }

    pub fn key_rejected(&self, invocation_id: &str, path: &str, reason: &str) {
        warn!(target: "audit", event = "key_rejected", invocation_id, path, reason);
    }
}
