mod args;
mod commands;

use args::{Cli, Commands};
use clap::Parser;
use nodekit::Node;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let node = Node::detect()?;
    debug!(family = ?node.family(), driver = ?node.driver_name(), "Node manager ready");
    let data_dir = cli.data_dir.as_deref();

    match cli.command {
        Commands::Install { network, force } => {
            commands::lifecycle::cmd_install(&node, data_dir, &network, force).await?
        }
        Commands::Uninstall { force } => {
            commands::lifecycle::cmd_uninstall(&node, data_dir, force).await?
        }
        Commands::Upgrade => commands::lifecycle::cmd_upgrade(&node).await?,
        Commands::Start => commands::lifecycle::cmd_start(&node, data_dir).await?,
        Commands::Stop => commands::lifecycle::cmd_stop(&node, data_dir).await?,
        Commands::Configure { command } => {
            commands::configure::cmd_configure(&node, data_dir, command).await?
        }
        Commands::Debug => commands::debug::cmd_debug(&node, data_dir).await?,
        Commands::Metrics { interval, count } => {
            commands::metrics::cmd_metrics(interval, count).await?
        }
        Commands::Hash {
            key,
            offline,
            network,
            link,
        } => {
            commands::hash::cmd_hash(key.as_deref(), offline.as_deref(), &network, link).await?
        }
    }

    Ok(())
}
