use std::path::Path;

use nodekit::node::config::{self, DaemonConfig};
use nodekit::settings::Settings;
use nodekit::Node;
use tracing::warn;

use super::with_progress;
use crate::args::ConfigureCommands;

pub(crate) async fn cmd_configure(
    node: &Node,
    data_dir: Option<&Path>,
    command: ConfigureCommands,
) -> anyhow::Result<()> {
    match command {
        ConfigureCommands::Network { network, force } => {
            cmd_network(node, data_dir, &network, force).await?
        }
        ConfigureCommands::Service => cmd_service(node, data_dir).await?,
        ConfigureCommands::P2p { enable, hybrid } => cmd_p2p(node, data_dir, enable, hybrid)?,
    }
    Ok(())
}

async fn cmd_network(
    node: &Node,
    data_dir: Option<&Path>,
    network: &str,
    force: bool,
) -> anyhow::Result<()> {
    let data_dir = node.install_data_dir(data_dir)?;
    with_progress(
        &format!("Configuring {} for {network}", data_dir.display()),
        "Network configured",
        node.set_network(&data_dir, network, force),
    )
    .await?;

    if node.is_running(&data_dir) {
        println!("Restart the node for the change to take effect");
    }
    Ok(())
}

async fn cmd_service(node: &Node, data_dir: Option<&Path>) -> anyhow::Result<()> {
    let data_dir = node.resolve_data_dir(data_dir)?;
    with_progress(
        &format!("Pointing service at {}", data_dir.display()),
        "Service updated",
        node.update_service(&data_dir),
    )
    .await?;
    Ok(())
}

fn cmd_p2p(
    node: &Node,
    data_dir: Option<&Path>,
    enable: Option<bool>,
    hybrid: Option<bool>,
) -> anyhow::Result<()> {
    let data_dir = node.resolve_data_dir(data_dir)?;
    let overrides = DaemonConfig {
        enable_p2p: enable,
        enable_p2p_hybrid_mode: hybrid,
    };

    let current = if overrides == DaemonConfig::default() {
        config::load_daemon_config(&data_dir)?
    } else {
        config::update_daemon_config(&data_dir, &overrides)?
    };
    println!("{}", serde_json::to_string_pretty(&current)?);

    let mut settings = Settings::load()?;
    if current.is_hybrid() {
        if !settings.dismissed_notices.hybrid_available {
            settings.dismissed_notices.hybrid_available = true;
            if let Err(e) = settings.save() {
                warn!(error = %e, "Could not save settings");
            }
        }
    } else if !settings.dismissed_notices.hybrid_available {
        println!("Hybrid mode is available: nodekit configure p2p --hybrid true");
    }
    Ok(())
}
