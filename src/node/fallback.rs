//! Hosts without a supported package manager: the updater script installs
//! into a user directory and the daemon runs as a plain detached process.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::driver::{self, PlatformDriver};
use super::network::{self, Network};
use crate::clienv::{self, DAEMON_BINARY};
use crate::error::{NodeError, Result};
use crate::http::HttpFetch;
use crate::system::{probe, Host};

const UPDATER_SCRIPT: &str = "update.sh";
const CHANNEL: &str = "stable";

/// Sends SIGTERM to the pid recorded in `<data_dir>/algod.pid`.
pub(crate) fn stop_by_pid_file(host: &dyn Host, data_dir: &Path) -> Result<()> {
    if driver::is_blank(data_dir) {
        return Err(NodeError::validation("stop requires a data directory"));
    }
    let pid = probe::pid_from_data_dir(data_dir)?;
    info!(pid, data_dir = %data_dir.display(), "Stopping daemon");
    host.terminate(pid)
}

pub struct FallbackDriver {
    host: Arc<dyn Host>,
    http: Arc<dyn HttpFetch>,
    install_dir: PathBuf,
}

impl FallbackDriver {
    pub fn new(host: Arc<dyn Host>, http: Arc<dyn HttpFetch>) -> Self {
        Self::with_install_dir(host, http, clienv::install_dir())
    }

    pub fn with_install_dir(host: Arc<dyn Host>, http: Arc<dyn HttpFetch>, install_dir: PathBuf) -> Self {
        Self {
            host,
            http,
            install_dir,
        }
    }

    fn script(&self) -> PathBuf {
        self.install_dir.join(UPDATER_SCRIPT)
    }

    /// `data_dir`, else $ALGORAND_DATA, else `<install_dir>/data`.
    fn data_dir_or_default(&self, data_dir: &Path) -> PathBuf {
        if !driver::is_blank(data_dir) {
            return data_dir.to_path_buf();
        }
        clienv::algorand_data().unwrap_or_else(|| self.default_data_dir())
    }

    async fn download_script(&self) -> Result<PathBuf> {
        let url = clienv::updater_url();
        info!(url = %url, "Downloading updater script");
        let body = self.http.get(&url).await?;

        let script = self.script();
        std::fs::write(&script, body)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o744))?;
        }
        Ok(script)
    }

    async fn run_script(&self, script: &Path, data_dir: &Path, initial: bool) -> Result<()> {
        let mut args = vec![script.display().to_string()];
        if initial {
            args.push("-i".into());
        }
        args.extend([
            "-c".to_string(),
            CHANNEL.to_string(),
            "-p".to_string(),
            self.install_dir.display().to_string(),
            "-d".to_string(),
            data_dir.display().to_string(),
            "-n".to_string(),
        ]);
        self.host.run(&args).await.map(|_| ())
    }

    /// Removes the install directory. A `keep` directory nested inside it
    /// survives along with its ancestors.
    fn remove_install_dir(&self, keep: Option<&Path>) -> Result<()> {
        let install_dir = canonical(&self.install_dir);
        let keep = keep.map(canonical).filter(|k| k.starts_with(&install_dir));
        if keep.as_ref() == Some(&install_dir) {
            warn!(path = %self.install_dir.display(), "Install directory is the data directory, leaving it in place");
            return Ok(());
        }
        let Some(keep) = keep else {
            info!(path = %self.install_dir.display(), "Removing install directory");
            std::fs::remove_dir_all(&self.install_dir)?;
            return Ok(());
        };

        info!(path = %self.install_dir.display(), keep = %keep.display(), "Removing install directory contents");
        prune_except(&self.install_dir, &keep)
    }
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Deletes everything under `dir` that is neither `keep` nor on the way to it.
fn prune_except(dir: &Path, keep: &Path) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let resolved = canonical(&path);
        if resolved == keep {
            continue;
        }
        if keep.starts_with(&resolved) {
            prune_except(&path, keep)?;
        } else if path.is_dir() && !path.is_symlink() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[async_trait]
impl PlatformDriver for FallbackDriver {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn default_data_dir(&self) -> PathBuf {
        self.install_dir.join("data")
    }

    async fn install(&self, data_dir: &Path, network: &str, force: bool) -> Result<()> {
        network.parse::<Network>()?;
        let data_dir = self.data_dir_or_default(data_dir);
        info!(install_dir = %self.install_dir.display(), data_dir = %data_dir.display(), "Installing with updater script");

        network::ensure_dir(&self.install_dir)?;
        network::ensure_dir(&data_dir)?;
        let script = self.download_script().await?;
        network::set_network(self.http.as_ref(), &data_dir, network, force).await?;
        self.run_script(&script, &data_dir, true).await
    }

    async fn uninstall(&self, data_dir: &Path, force: bool) -> Result<()> {
        if driver::is_blank(data_dir) {
            return Err(NodeError::validation("uninstall requires a data directory"));
        }

        if self.host.is_cmd_running(DAEMON_BINARY) {
            match probe::pid_from_data_dir(data_dir) {
                Ok(pid) => self.host.terminate(pid)?,
                Err(e) => warn!(error = %e, "Daemon is running but has no pid file here"),
            }
        }

        if self.install_dir.exists() {
            let keep = (!force).then_some(data_dir);
            self.remove_install_dir(keep)?;
        }
        if force && data_dir.exists() {
            info!(path = %data_dir.display(), "Removing data directory");
            std::fs::remove_dir_all(data_dir)?;
        }
        Ok(())
    }

    async fn upgrade(&self) -> Result<()> {
        let script = self.script();
        if !script.is_file() {
            return Err(NodeError::not_found(format!(
                "updater script {}",
                script.display()
            )));
        }
        let data_dir = self.data_dir_or_default(Path::new(""));
        self.run_script(&script, &data_dir, false).await
    }

    async fn start(&self, data_dir: &Path) -> Result<()> {
        let data_dir = self.data_dir_or_default(data_dir);
        if !network::is_data_dir(&data_dir) {
            return Err(NodeError::validation(format!(
                "{} is not a valid data directory",
                data_dir.display()
            )));
        }
        let daemon = driver::resolve_daemon(self.host.as_ref())?;
        debug!(daemon = %daemon.display(), "Starting daemon");

        let args = ["-d".to_string(), data_dir.display().to_string()];
        self.host.spawn_detached(&daemon, &args)?;
        Ok(())
    }

    async fn stop(&self, data_dir: &Path) -> Result<()> {
        stop_by_pid_file(self.host.as_ref(), data_dir)
    }

    async fn is_service(&self, _data_dir: &Path) -> Result<bool> {
        Ok(false)
    }

    async fn update_service(&self, _data_dir: &Path) -> Result<()> {
        Err(NodeError::UnsupportedPlatform)
    }
}
