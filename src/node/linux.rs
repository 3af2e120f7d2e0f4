//! systemd hosts with `apt-get` or `dnf`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::driver::{self, PlatformDriver};
use super::network;
use crate::error::{NodeError, Result};
use crate::http::HttpFetch;
use crate::system::{CommandList, Host};

const SERVICE_UNIT: &str = "algorand.service";
const SERVICE_NAME: &str = "algorand";
const DEFAULT_DATA_DIR: &str = "/var/lib/algorand";
const OVERRIDE_DIR: &str = "/etc/systemd/system/algorand.service.d";
const OVERRIDE_FILE: &str = "/etc/systemd/system/algorand.service.d/override.conf";

const APT_KEY_URL: &str = "https://releases.algorand.com/key.pub";
const RPM_KEY_URL: &str = "https://releases.algorand.com/rpm/rpm_algorand.pub";
const RPM_REPO_URL: &str = "https://releases.algorand.com/rpm/stable/algorand.repo";

/// Package manager in use. The first available one wins; they are never mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageTool {
    Apt,
    Dnf,
}

/// Debian architecture name for the running build.
fn deb_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "arm" => "armhf",
        other => other,
    }
}

impl PackageTool {
    pub fn detect(host: &dyn Host) -> Option<PackageTool> {
        [PackageTool::Apt, PackageTool::Dnf]
            .into_iter()
            .find(|tool| host.cmd_exists(tool.binary()))
    }

    pub fn binary(&self) -> &'static str {
        match self {
            Self::Apt => "apt-get",
            Self::Dnf => "dnf",
        }
    }

    /// `sudo` and `pgrep` for minimal root-only images.
    fn prerequisites(&self) -> CommandList {
        match self {
            Self::Apt => CommandList::new()
                .cmd(["apt-get", "update"])
                .cmd(["apt-get", "install", "-y", "sudo", "procps"]),
            Self::Dnf => CommandList::new().cmd(["dnf", "install", "-y", "sudo", "procps-ng"]),
        }
    }

    fn install(&self) -> CommandList {
        match self {
            Self::Apt => CommandList::new()
                .cmd(["sudo", "apt-get", "update"])
                .cmd([
                    "sudo",
                    "apt-get",
                    "install",
                    "-y",
                    "gnupg2",
                    "curl",
                    "software-properties-common",
                ])
                .cmd([
                    "sh".to_string(),
                    "-c".to_string(),
                    format!(
                        "curl -o - {APT_KEY_URL} | sudo tee /etc/apt/trusted.gpg.d/algorand.asc"
                    ),
                ])
                .cmd([
                    "sudo".to_string(),
                    "add-apt-repository".to_string(),
                    "-y".to_string(),
                    format!(
                        "deb [arch={}] https://releases.algorand.com/deb/ stable main",
                        deb_arch()
                    ),
                ])
                .cmd(["sudo", "apt-get", "update"])
                .cmd(["sudo", "apt-get", "install", "-y", "algorand"]),
            Self::Dnf => CommandList::new()
                .cmd(["curl", "-O", RPM_KEY_URL])
                .cmd(["sudo", "rpmkeys", "--import", "rpm_algorand.pub"])
                .cmd(["sudo", "dnf", "install", "-y", "dnf-command(config-manager)"])
                .cmd([
                    "sudo".to_string(),
                    "dnf".to_string(),
                    "config-manager".to_string(),
                    format!("--add-repo={RPM_REPO_URL}"),
                ])
                .cmd(["sudo", "dnf", "install", "-y", "algorand"])
                .cmd(["sudo", "systemctl", "enable", SERVICE_UNIT])
                .cmd(["sudo", "systemctl", "start", SERVICE_UNIT])
                .cmd(["rm", "-f", "rpm_algorand.pub"]),
        }
    }

    fn remove(&self) -> CommandList {
        match self {
            Self::Apt => CommandList::new().cmd(["sudo", "apt-get", "autoremove", "algorand", "-y"]),
            Self::Dnf => CommandList::new().cmd(["sudo", "dnf", "remove", "algorand", "-y"]),
        }
    }

    fn upgrade(&self) -> CommandList {
        match self {
            Self::Apt => CommandList::new()
                .cmd(["sudo", "apt-get", "update"])
                .cmd(["sudo", "apt-get", "install", "--only-upgrade", "-y", "algorand"]),
            Self::Dnf => {
                CommandList::new().cmd(["sudo", "dnf", "update", "-y", "--refresh", "algorand"])
            }
        }
    }
}

fn override_conf(daemon: &Path, data_dir: &Path) -> String {
    format!(
        "[Service]\nExecStart=\nExecStart={} -d {}\n",
        daemon.display(),
        data_dir.display()
    )
}

pub struct LinuxDriver {
    host: Arc<dyn Host>,
    http: Arc<dyn HttpFetch>,
}

impl LinuxDriver {
    pub fn new(host: Arc<dyn Host>, http: Arc<dyn HttpFetch>) -> Self {
        Self { host, http }
    }

    fn tool(&self) -> Result<PackageTool> {
        let tool = PackageTool::detect(self.host.as_ref()).ok_or(NodeError::PackageManagerNotFound)?;
        debug!(tool = tool.binary(), "Using package manager");
        Ok(tool)
    }

    /// Root on an image missing `sudo` or `pgrep`.
    fn needs_prerequisites(&self) -> bool {
        self.host.is_privileged() && !(self.host.cmd_exists("sudo") && self.host.cmd_exists("pgrep"))
    }

    async fn systemctl(&self, verb: &str) -> Result<()> {
        let list = CommandList::new().cmd(["sudo", "systemctl", verb, SERVICE_NAME]);
        self.host.run_all(&self.host.elevate(list)).await
    }

    async fn run(&self, list: CommandList) -> Result<()> {
        self.host.run_all(&self.host.elevate(list)).await
    }
}

#[async_trait]
impl PlatformDriver for LinuxDriver {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn default_data_dir(&self) -> PathBuf {
        PathBuf::from(DEFAULT_DATA_DIR)
    }

    async fn install(&self, data_dir: &Path, network: &str, force: bool) -> Result<()> {
        let tool = self.tool()?;
        info!(tool = tool.binary(), "Installing node package");

        let mut list = CommandList::new();
        if self.needs_prerequisites() {
            info!("Provisioning sudo and procps");
            list.extend(tool.prerequisites());
        }
        list.extend(tool.install());
        self.run(list).await?;

        network::set_network(self.http.as_ref(), data_dir, network, force).await
    }

    async fn uninstall(&self, data_dir: &Path, _force: bool) -> Result<()> {
        if driver::is_blank(data_dir) {
            return Err(NodeError::validation("uninstall requires a data directory"));
        }
        let tool = self.tool()?;
        info!(tool = tool.binary(), "Removing node package");

        let mut list = tool.remove();
        list.push(["sudo", "bash", "-c", "rm -rf /etc/systemd/system/algorand*"]);
        list.push(["sudo", "systemctl", "daemon-reload"]);
        self.run(list).await
    }

    async fn upgrade(&self) -> Result<()> {
        let tool = self.tool()?;
        info!(tool = tool.binary(), "Upgrading node package");
        self.run(tool.upgrade()).await
    }

    async fn start(&self, _data_dir: &Path) -> Result<()> {
        self.systemctl("start").await
    }

    async fn stop(&self, _data_dir: &Path) -> Result<()> {
        self.systemctl("stop").await
    }

    async fn is_service(&self, _data_dir: &Path) -> Result<bool> {
        let show = ["systemctl", "show", SERVICE_UNIT, "--property=LoadState"].map(String::from);
        match self.host.run(&show).await {
            Ok(out) => return Ok(out.lines().any(|l| l.trim() == "LoadState=loaded")),
            Err(e) => debug!(error = %e, "systemctl show failed, listing unit files"),
        }

        let list = self
            .host
            .elevate(CommandList::new().cmd(["sudo", "systemctl", "list-unit-files", "algorand*"]));
        for args in list.iter() {
            match self.host.run(args).await {
                Ok(out) => return Ok(out.contains(SERVICE_UNIT)),
                Err(e) => debug!(error = %e, "Listing unit files failed"),
            }
        }
        Ok(false)
    }

    async fn update_service(&self, data_dir: &Path) -> Result<()> {
        if driver::is_blank(data_dir) {
            return Err(NodeError::validation("service update requires a data directory"));
        }
        let daemon = driver::resolve_daemon(self.host.as_ref())?;
        info!(daemon = %daemon.display(), data_dir = %data_dir.display(), "Writing systemd override");

        self.run(CommandList::new().cmd(["sudo", "mkdir", "-p", OVERRIDE_DIR]))
            .await?;
        let staged = driver::stage_file("override.conf", &override_conf(&daemon, data_dir))?;
        driver::install_staged(self.host.as_ref(), &staged, OVERRIDE_FILE).await?;
        self.run(CommandList::new().cmd(["sudo", "systemctl", "daemon-reload"]))
            .await
    }
}
