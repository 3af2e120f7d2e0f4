//! Node daemon lifecycle.
//!
//! [`Node`] owns the one [`PlatformDriver`] for this host and routes every
//! lifecycle call to it. Network, metrics and key utilities live alongside.

pub mod config;
pub mod driver;
pub mod fallback;
pub mod linux;
pub mod mac;
pub mod metrics;
pub mod network;
pub mod participation;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::clienv::DAEMON_BINARY;
use crate::error::{NodeError, Phase, Result};
use crate::http::{HttpFetch, ReqwestFetch};
use crate::system::{probe, Host, SystemHost};
pub use driver::{HostFamily, PlatformDriver};
pub use network::DataFolderInfo;

/// Read-only snapshot for bug reports.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub in_path: bool,
    pub is_running: bool,
    pub is_service: bool,
    pub is_installed: bool,
    /// Resolved daemon path, empty when not on PATH.
    pub algod: String,
    pub data: DataFolderInfo,
}

pub struct Node {
    family: HostFamily,
    host: Arc<dyn Host>,
    http: Arc<dyn HttpFetch>,
    driver: Option<Box<dyn PlatformDriver>>,
}

impl Node {
    /// Node manager for the running host.
    pub fn detect() -> Result<Self> {
        let http = ReqwestFetch::new()?;
        Ok(Self::for_host(
            HostFamily::detect(),
            Arc::new(SystemHost),
            Arc::new(http),
        ))
    }

    pub fn for_host(family: HostFamily, host: Arc<dyn Host>, http: Arc<dyn HttpFetch>) -> Self {
        let driver = driver::select_driver(family, host.clone(), http.clone());
        Self {
            family,
            host,
            http,
            driver,
        }
    }

    pub fn family(&self) -> HostFamily {
        self.family
    }

    /// Name of the selected driver, if any.
    pub fn driver_name(&self) -> Option<&'static str> {
        self.driver.as_ref().map(|d| d.name())
    }

    fn driver(&self) -> Result<&dyn PlatformDriver> {
        self.driver.as_deref().ok_or(NodeError::UnsupportedPlatform)
    }

    pub async fn install(&self, data_dir: &Path, network: &str, force: bool) -> Result<()> {
        let driver = self.driver()?;
        info!(driver = driver.name(), %network, force, "Installing node");
        driver
            .install(data_dir, network, force)
            .await
            .map_err(|e| e.in_phase(Phase::Install))
    }

    pub async fn uninstall(&self, data_dir: &Path, force: bool) -> Result<()> {
        let driver = self.driver()?;
        info!(driver = driver.name(), force, "Uninstalling node");
        driver
            .uninstall(data_dir, force)
            .await
            .map_err(|e| e.in_phase(Phase::Uninstall))
    }

    pub async fn upgrade(&self) -> Result<()> {
        let driver = self.driver()?;
        info!(driver = driver.name(), "Upgrading node");
        driver.upgrade().await.map_err(|e| e.in_phase(Phase::Upgrade))
    }

    pub async fn start(&self, data_dir: &Path) -> Result<()> {
        self.driver()?
            .start(data_dir)
            .await
            .map_err(|e| e.in_phase(Phase::Start))
    }

    pub async fn stop(&self, data_dir: &Path) -> Result<()> {
        self.driver()?
            .stop(data_dir)
            .await
            .map_err(|e| e.in_phase(Phase::Stop))
    }

    pub async fn is_service(&self, data_dir: &Path) -> Result<bool> {
        self.driver()?
            .is_service(data_dir)
            .await
            .map_err(|e| e.in_phase(Phase::Service))
    }

    pub async fn update_service(&self, data_dir: &Path) -> Result<()> {
        self.driver()?
            .update_service(data_dir)
            .await
            .map_err(|e| e.in_phase(Phase::Service))
    }

    pub async fn set_network(&self, data_dir: &Path, network: &str, force: bool) -> Result<()> {
        self.driver()?;
        network::set_network(self.http.as_ref(), data_dir, network, force)
            .await
            .map_err(|e| e.in_phase(Phase::Network))
    }

    /// `algod` on PATH, registered as a service, and `data_dir` valid.
    pub async fn is_installed(&self, data_dir: &Path) -> Result<bool> {
        let driver = self.driver()?;
        if !self.host.cmd_exists(DAEMON_BINARY) {
            return Ok(false);
        }
        let service = driver
            .is_service(data_dir)
            .await
            .map_err(|e| e.in_phase(Phase::Service))?;
        Ok(service && network::is_data_dir(data_dir))
    }

    /// A daemon is running for `data_dir`, judged by its pid file. A blank
    /// `data_dir` asks whether any daemon process is running.
    pub fn is_running(&self, data_dir: &Path) -> bool {
        if driver::is_blank(data_dir) {
            return self.host.is_cmd_running(DAEMON_BINARY);
        }
        self.recorded_pid(data_dir).is_some()
    }

    /// Pids of the daemon serving `data_dir`, or of every daemon process
    /// when `data_dir` is blank.
    pub fn pids(&self, data_dir: &Path) -> Vec<u32> {
        if driver::is_blank(data_dir) {
            return probe::cmd_pids(DAEMON_BINARY);
        }
        self.recorded_pid(data_dir).into_iter().collect()
    }

    fn recorded_pid(&self, data_dir: &Path) -> Option<u32> {
        match probe::pid_from_data_dir(data_dir) {
            Ok(pid) if self.host.is_process_alive(pid) => Some(pid),
            Ok(pid) => {
                debug!(pid, data_dir = %data_dir.display(), "Stale pid file");
                None
            }
            Err(e) => {
                debug!(error = %e, "No usable pid file");
                None
            }
        }
    }

    /// Existing data directory: explicit, $ALGORAND_DATA, then known paths.
    pub fn resolve_data_dir(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        self.driver()?;
        network::resolve_data_dir(explicit)
    }

    /// Target for a fresh install: explicit, $ALGORAND_DATA, then the
    /// driver's default.
    pub fn install_data_dir(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        let driver = self.driver()?;
        Ok(explicit
            .filter(|d| !driver::is_blank(d))
            .map(Path::to_path_buf)
            .or_else(crate::clienv::algorand_data)
            .unwrap_or_else(|| driver.default_data_dir()))
    }

    pub async fn debug_info(&self, data_dir: &Path) -> Result<DebugInfo> {
        let driver = self.driver()?;
        let algod = self
            .host
            .lookup_path(DAEMON_BINARY)
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let is_service = driver.is_service(data_dir).await.unwrap_or_else(|e| {
            debug!(error = %e, "Service probe failed");
            false
        });
        let data = DataFolderInfo::inspect(data_dir);
        let in_path = !algod.is_empty();

        Ok(DebugInfo {
            in_path,
            is_running: self.is_running(data_dir),
            is_service,
            is_installed: in_path && is_service && network::is_data_dir(data_dir),
            algod,
            data,
        })
    }
}
