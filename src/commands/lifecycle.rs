use std::path::{Path, PathBuf};

use nodekit::Node;
use tracing::info;

use super::with_progress;

pub(crate) async fn cmd_install(
    node: &Node,
    data_dir: Option<&Path>,
    network: &str,
    force: bool,
) -> anyhow::Result<()> {
    let data_dir = node.install_data_dir(data_dir)?;
    info!(data_dir = %data_dir.display(), "Install target");
    with_progress(
        &format!("Installing node on {network}"),
        "Node installed successfully",
        node.install(&data_dir, network, force),
    )
    .await?;
    Ok(())
}

pub(crate) async fn cmd_uninstall(node: &Node, data_dir: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let data_dir = node.resolve_data_dir(data_dir)?;
    with_progress(
        "Uninstalling node",
        "Node uninstalled successfully",
        node.uninstall(&data_dir, force),
    )
    .await?;
    Ok(())
}

pub(crate) async fn cmd_upgrade(node: &Node) -> anyhow::Result<()> {
    with_progress("Upgrading node", "Node upgraded successfully", node.upgrade()).await?;
    Ok(())
}

pub(crate) async fn cmd_start(node: &Node, data_dir: Option<&Path>) -> anyhow::Result<()> {
    let data_dir = node.resolve_data_dir(data_dir)?;
    if node.is_running(&data_dir) {
        println!("Node is already running (pids: {:?})", node.pids(&data_dir));
        return Ok(());
    }
    with_progress("Starting node", "Node started", node.start(&data_dir)).await?;
    Ok(())
}

pub(crate) async fn cmd_stop(node: &Node, data_dir: Option<&Path>) -> anyhow::Result<()> {
    // Service-managed daemons stop through the service manager.
    let data_dir = match data_dir {
        Some(dir) => dir.to_path_buf(),
        None if node.is_service(Path::new("")).await? => PathBuf::new(),
        None => node.resolve_data_dir(None)?,
    };
    if !node.is_running(&data_dir) {
        println!("Node is not running");
        return Ok(());
    }
    with_progress("Stopping node", "Node stopped", node.stop(&data_dir)).await?;
    Ok(())
}
