pub mod config;
pub mod errors;
pub mod handler;
pub mod settings;

/// Route the Functions host forwards the HTTP trigger to.
pub const TRIGGER_ROUTE: &str = "fa_adtest_frontend_trigger";
