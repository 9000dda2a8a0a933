use anyhow::{Context, Result};
use clap::Parser;
use common::cli::{
    CommonArgs, CommonCommands,
    utils::{handle_common_command, init_logging, load_config, validate_config},
};
use common::storage::{Storage, create_storage};
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(
    name = "tsgate",
    about = "Line-protocol ingestion and PromQL selector queries over a time-series store",
    version
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Option<CommonCommands>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.common);

    let config = load_config(cli.common.config.as_ref())?;

    let command = cli.command.unwrap_or_default();
    if handle_common_command(&command, &config)? {
        return Ok(());
    }

    validate_config(&config)?;

    let storage = create_storage(&config.storage).context("Failed to initialize storage")?;

    let app = tsgate::create_router(storage.clone(), &config);

    let listener = TcpListener::bind(&config.http.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.http.listen))?;
    log::info!("Starting tsgate on {}", listener.local_addr()?);

    tsgate::serve(listener, app, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for ctrl+c signal: {e}");
            std::future::pending::<()>().await;
        }
    })
    .await?;

    storage.close().await.context("Failed to close storage")?;
    log::info!("tsgate stopped");

    Ok(())
}
