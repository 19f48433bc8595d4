pub mod audit_log;
pub mod azure_cli;
pub mod chain;
pub mod credential;
pub mod environment;
pub mod function_key;
pub mod managed_identity;
pub mod token;

pub use credential::{CredentialError, TokenCredential};
pub use token::AccessToken;
