mod bootstrap;
mod commands;

use anyhow::Result;
use bill_core::settings::Settings;

use crate::commands::Context;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();
    let command = settings.subcommand();

    bootstrap::ensure_directories(&settings.data_dir())?;

    // Full-screen views own the terminal, so their logs go to a file.
    let log_file = settings
        .log_file
        .clone()
        .or_else(|| commands::is_interactive(&command).then(bootstrap::default_log_file));
    bootstrap::setup_logging(&settings.log_level, log_file.as_deref())?;

    tracing::info!("Bill Tracker v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        user = settings.user_id(),
        admin = settings.admin,
        view = %settings.view_mode(),
        "settings loaded"
    );

    let ctx = Context::open(settings)?;
    if let Err(e) = ctx.run(command).await {
        tracing::error!(error = %e, "command failed");
        eprintln!("エラー: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}
