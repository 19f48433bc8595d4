use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use frontend_forwarder::comms::http_trigger::{self, AppState};
use frontend_forwarder::function::config::TokenTarget;
use frontend_forwarder::function::settings::Settings;
use frontend_forwarder::security::chain::build_credential;
use frontend_forwarder::utils;

#[derive(Parser)]
#[command(name = "frontend-forwarder", version, about = "Frontend function forwarding to a backend through API Management")]
struct AppCli {
    /// Azure Functions local.settings.json used as a fallback for unset variables
    #[arg(short, long, global = true)]
    settings: Option<String>,

    /// Port the Functions host forwards trigger requests to
    #[arg(long, global = true, env = "FUNCTIONS_CUSTOMHANDLER_PORT", default_value_t = 8080)]
    port: u16,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the custom handler HTTP server (default)
    Serve,
    /// Acquire a backend token and report which credential issued it
    CheckToken,
}

fn load_settings(path: Option<&str>) -> Result<Settings> {
    match path {
        Some(p) => Settings::from_env_and_file(p),
        None => Ok(Settings::from_env()),
    }
}

async fn check_token(settings: &Settings) -> Result<()> {
    let target = TokenTarget::from_settings(settings)?;
    let credential = build_credential(target.credential_mode, settings, reqwest::Client::new());

    let token = credential
        .get_token(&target.backend_client_id, Some(target.tenant_id.as_str()))
        .await?;

    println!(
        "{} issued a token for {} (expires {})",
        credential.kind(),
        target.backend_client_id,
        token.expires_on().to_rfc3339()
    );
    Ok(())
}

async fn serve(settings: &Settings, port: u16) -> Result<()> {
    info!(version = frontend_forwarder::VERSION, "starting on port {port}");
    http_trigger::serve(AppState::from_settings(settings)?, port).await
}

#[tokio::main]
async fn main() -> Result<()> {
    utils::logging::init();

    let args = AppCli::parse();
    let settings = load_settings(args.settings.as_deref())?;

    match args.command {
        Some(Commands::CheckToken) => check_token(&settings).await?,
        // Bare invocation is how the Functions host starts a custom handler.
        Some(Commands::Serve) | None => serve(&settings, args.port).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_invocation_takes_port_flag() {
        let args = AppCli::try_parse_from(["frontend-forwarder", "--port", "9091"]).unwrap();
        assert!(args.command.is_none());
        assert_eq!(args.port, 9091);
    }

    #[test]
    fn test_serve_takes_port_flag() {
        let args = AppCli::try_parse_from(["frontend-forwarder", "serve", "--port", "9092"]).unwrap();
        assert!(matches!(args.command, Some(Commands::Serve)));
        assert_eq!(args.port, 9092);
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(AppCli::try_parse_from(["frontend-forwarder", "--port", "http"]).is_err());
        assert!(AppCli::try_parse_from(["frontend-forwarder", "serve", "--port", "70000"]).is_err());
    }

    #[test]
    fn test_check_token_parses() {
        let args =
            AppCli::try_parse_from(["frontend-forwarder", "check-token", "-s", "local.settings.json"])
                .unwrap();
        assert!(matches!(args.command, Some(Commands::CheckToken)));
        assert_eq!(args.settings.as_deref(), Some("local.settings.json"));
    }
}
