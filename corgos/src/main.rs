use std::path::PathBuf;

use corgos::logging::init_logging;
use corgos::services::ServiceContainer;
use corgos::settings::SettingsRegistry;
use tracing::info;

/// Settings file used when `CORGOS_SETTINGS` is unset.
const DEFAULT_SETTINGS_PATH: &str = "settings.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let log_dir = std::env::var_os("CORGOS_LOG_DIR").map(PathBuf::from);
    let _log_guard = init_logging(log_dir.as_deref())?;

    let settings_path = std::env::var("CORGOS_SETTINGS")
        .unwrap_or_else(|_| DEFAULT_SETTINGS_PATH.to_string());

    let registry = SettingsRegistry::new();
    let container = ServiceContainer::new(&registry, &settings_path).await?;
    container.start().await?;
    info!(settings = %settings_path, "corgos started");

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    container.shutdown().await?;
    Ok(())
}
