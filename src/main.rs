use color_eyre::eyre::Result;
use hourglass_portal::{
    client,
    config,
    logging,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let config = config::parse_cli_args()?;
    let _log_guard = logging::init_tracing(&config.log_file)?;
    tracing::info!(backend = %config.backend_url, "starting hourglass portal");
    client::run_app(config).await
}
