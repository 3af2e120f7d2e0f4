//! macOS: Homebrew package plus a launchd daemon.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::driver::{self, PlatformDriver};
use super::fallback::stop_by_pid_file;
use super::network;
use crate::clienv::{self, DAEMON_BINARY};
use crate::error::{NodeError, Result};
use crate::http::HttpFetch;
use crate::system::{CommandList, Host};

const LABEL: &str = "com.algorand.algod";
const PLIST_PATH: &str = "/Library/LaunchDaemons/com.algorand.algod.plist";
const TAP: &str = "algorandfoundation/homebrew-node";
const FORMULA: &str = "algorand";

fn render_plist(daemon: &Path, data_dir: &Path) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{LABEL}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{daemon}</string>
        <string>-d</string>
        <string>{data}</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>StandardOutPath</key>
    <string>/tmp/algod.out</string>
    <key>StandardErrorPath</key>
    <string>/tmp/algod.err</string>
</dict>
</plist>
"#,
        daemon = daemon.display(),
        data = data_dir.display(),
    )
}

pub struct MacDriver {
    host: Arc<dyn Host>,
    http: Arc<dyn HttpFetch>,
    /// Homebrew refuses to run as root; under sudo, brew runs as this user.
    brew_user: Option<String>,
}

impl MacDriver {
    pub fn new(host: Arc<dyn Host>, http: Arc<dyn HttpFetch>) -> Self {
        Self {
            host,
            http,
            brew_user: clienv::sudo_user(),
        }
    }

    fn ensure_brew(&self) -> Result<()> {
        if self.host.cmd_exists("brew") {
            Ok(())
        } else {
            Err(NodeError::PackageManagerNotFound)
        }
    }

    fn brew(&self, list: CommandList) -> CommandList {
        match &self.brew_user {
            Some(user) if self.host.is_privileged() => list.su(user),
            _ => list,
        }
    }

    async fn sudo(&self, list: CommandList) -> Result<()> {
        self.host.run_all(&self.host.elevate(list)).await
    }

    /// Installs the formula. Needs no privileges.
    pub async fn install_package(&self) -> Result<()> {
        self.ensure_brew()?;
        info!(formula = FORMULA, "Installing with Homebrew");
        let list = CommandList::new()
            .cmd(["brew", "tap", TAP])
            .cmd(["brew", "install", FORMULA])
            .cmd(["brew", "--prefix", FORMULA, "--installed"]);
        self.host.run_all(&self.brew(list)).await
    }

    /// Writes the launchd plist for `data_dir`, loads it and lists it back.
    /// Needs root.
    pub async fn register_service(&self, data_dir: &Path) -> Result<()> {
        if driver::is_blank(data_dir) {
            return Err(NodeError::validation("service registration requires a data directory"));
        }
        let daemon = driver::resolve_daemon(self.host.as_ref())?;
        info!(daemon = %daemon.display(), data_dir = %data_dir.display(), "Registering launchd service");

        let staged = driver::stage_file("algod.plist", &render_plist(&daemon, data_dir))?;
        driver::install_staged(self.host.as_ref(), &staged, PLIST_PATH).await?;
        self.sudo(
            CommandList::new()
                .cmd(["sudo", "launchctl", "load", PLIST_PATH])
                .cmd(["sudo", "launchctl", "list", LABEL]),
        )
        .await
    }
}

#[async_trait]
impl PlatformDriver for MacDriver {
    fn name(&self) -> &'static str {
        "macos"
    }

    fn default_data_dir(&self) -> PathBuf {
        clienv::home_dir().join(".algorand")
    }

    async fn install(&self, data_dir: &Path, network: &str, force: bool) -> Result<()> {
        let data_dir = if driver::is_blank(data_dir) {
            self.default_data_dir()
        } else {
            data_dir.to_path_buf()
        };
        self.install_package().await?;
        network::set_network(self.http.as_ref(), &data_dir, network, force).await?;
        self.register_service(&data_dir).await?;

        if !self.is_service(&data_dir).await? {
            return Err(NodeError::validation(format!(
                "{LABEL} is not registered with launchd after install"
            )));
        }
        info!("Installed node with Homebrew");
        Ok(())
    }

    async fn uninstall(&self, data_dir: &Path, force: bool) -> Result<()> {
        if force && self.host.is_cmd_running(DAEMON_BINARY) {
            self.stop(data_dir).await?;
        }

        let mut list = CommandList::new();
        if self.is_service(data_dir).await? {
            list.push(["sudo", "launchctl", "unload", PLIST_PATH]);
        }
        if self.host.cmd_exists("brew") {
            list.extend(self.brew(CommandList::new().cmd(["brew", "uninstall", FORMULA])));
        } else if !force {
            return Err(NodeError::PackageManagerNotFound);
        }
        if force {
            for path in network::known_data_paths() {
                list.push(["sudo".to_string(), "rm".into(), "-rf".into(), path.display().to_string()]);
            }
            list.push(["sudo", "rm", "-rf", PLIST_PATH]);
        }
        self.sudo(list).await
    }

    async fn upgrade(&self) -> Result<()> {
        self.ensure_brew()?;
        let list = CommandList::new()
            .cmd(["brew", "--prefix", FORMULA, "--installed"])
            .cmd(["brew", "upgrade", FORMULA, "--formula"]);
        self.host.run_all(&self.brew(list)).await
    }

    async fn start(&self, _data_dir: &Path) -> Result<()> {
        debug!("Starting through launchd");
        self.sudo(CommandList::new().cmd(["sudo", "launchctl", "start", LABEL]))
            .await
    }

    async fn stop(&self, data_dir: &Path) -> Result<()> {
        if driver::is_blank(data_dir) {
            debug!("Stopping through launchd");
            return self
                .sudo(CommandList::new().cmd(["sudo", "launchctl", "stop", LABEL]))
                .await;
        }
        stop_by_pid_file(self.host.as_ref(), data_dir)
    }

    async fn is_service(&self, _data_dir: &Path) -> Result<bool> {
        let list = self
            .host
            .elevate(CommandList::new().cmd(["sudo", "launchctl", "list", LABEL]));
        Ok(self.host.run_all(&list).await.is_ok())
    }

    async fn update_service(&self, data_dir: &Path) -> Result<()> {
        self.register_service(data_dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::fake::FakeFetch;
    use crate::node::network::Network;
    use crate::system::fake::FakeHost;
    use crate::system::probe;

    fn driver(host: FakeHost) -> (MacDriver, Arc<FakeHost>) {
        let host = Arc::new(host);
        let http = FakeFetch::default()
            .serve(&Network::Mainnet.genesis_url(), br#"{"network":"mainnet"}"#);
        let mac = MacDriver {
            host: host.clone(),
            http: Arc::new(http),
            brew_user: None,
        };
        (mac, host)
    }

    #[tokio::test]
    async fn test_requires_homebrew() {
        let (mac, host) = driver(FakeHost::with_tools(&["algod"]));
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            mac.install(dir.path(), "mainnet", false).await,
            Err(NodeError::PackageManagerNotFound)
        ));
        assert!(matches!(
            mac.upgrade().await,
            Err(NodeError::PackageManagerNotFound)
        ));
        assert!(host.ran().is_empty());
    }

    #[tokio::test]
    async fn test_install_sequence() {
        let (mac, host) = driver(FakeHost::with_tools(&["brew", "algod"]));
        let dir = tempfile::tempdir().unwrap();

        mac.install(dir.path(), "mainnet", false).await.unwrap();

        let ran = host.ran();
        assert_eq!(&ran[..3], &[
            format!("brew tap {TAP}"),
            "brew install algorand".to_string(),
            "brew --prefix algorand --installed".to_string(),
        ]);
        assert!(ran[3].starts_with("sudo install -m 0644 "));
        assert!(ran[3].ends_with(PLIST_PATH));
        assert_eq!(ran[4], format!("sudo launchctl load {PLIST_PATH}"));
        assert_eq!(ran[5], format!("sudo launchctl list {LABEL}"));
        assert_eq!(ran.len(), 7);
        assert_eq!(network::current_network(dir.path()).unwrap(), "mainnet");
    }

    #[tokio::test]
    async fn test_install_fails_when_service_missing() {
        let (mac, _) = driver(
            FakeHost::with_tools(&["brew", "algod"]).fail_on("launchctl list"),
        );
        let dir = tempfile::tempdir().unwrap();

        let err = mac.install(dir.path(), "mainnet", false).await.unwrap_err();
        assert!(matches!(err, NodeError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn test_brew_runs_as_invoking_user_under_sudo() {
        let mut host = FakeHost::with_tools(&["brew"]);
        host.privileged = true;
        let (mut mac, host) = driver(host);
        mac.brew_user = Some("alice".into());

        mac.upgrade().await.unwrap();
        assert_eq!(
            host.ran(),
            vec![
                "sudo -u alice brew --prefix algorand --installed",
                "sudo -u alice brew upgrade algorand --formula",
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_with_data_dir_uses_pid_file() {
        let (mac, host) = driver(FakeHost::default());
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(probe::PID_FILE), "512").unwrap();

        mac.stop(dir.path()).await.unwrap();
        assert_eq!(*host.terminated.lock().unwrap(), vec![512]);

        mac.stop(Path::new("")).await.unwrap();
        assert_eq!(host.ran(), vec![format!("sudo launchctl stop {LABEL}")]);
    }

    #[tokio::test]
    async fn test_forced_uninstall_removes_plist() {
        let (mac, host) = driver(FakeHost::with_tools(&["brew"]));

        mac.uninstall(Path::new(""), true).await.unwrap();
        let ran = host.ran();
        assert_eq!(ran[0], format!("sudo launchctl list {LABEL}"));
        assert_eq!(ran[1], format!("sudo launchctl unload {PLIST_PATH}"));
        assert_eq!(ran[2], "brew uninstall algorand");
        assert_eq!(ran.last().unwrap(), &format!("sudo rm -rf {PLIST_PATH}"));
    }

    #[tokio::test]
    async fn test_uninstall_without_brew() {
        let (mac, _) = driver(FakeHost::default().fail_on("launchctl list"));
        assert!(matches!(
            mac.uninstall(Path::new(""), false).await,
            Err(NodeError::PackageManagerNotFound)
        ));
    }

    #[tokio::test]
    async fn test_uninstall_keeps_data_unless_forced() {
        let (mac, host) = driver(FakeHost::with_tools(&["brew"]));
        mac.uninstall(Path::new(""), false).await.unwrap();

        let ran = host.ran();
        assert!(ran.contains(&"brew uninstall algorand".to_string()));
        assert!(ran.iter().all(|line| !line.contains("rm -rf")));
        for path in network::known_data_paths() {
            assert!(ran.iter().all(|line| !line.contains(&path.display().to_string())));
        }

        let (mac, host) = driver(FakeHost::with_tools(&["brew"]));
        mac.uninstall(Path::new(""), true).await.unwrap();
        let ran = host.ran();
        for path in network::known_data_paths() {
            assert!(ran.contains(&format!("sudo rm -rf {}", path.display())));
        }
        assert!(ran.contains(&format!("sudo rm -rf {PLIST_PATH}")));
    }

    #[test]
    fn test_render_plist() {
        let plist = render_plist(Path::new("/opt/homebrew/bin/algod"), Path::new("/Users/a/.algorand"));
        assert!(plist.contains("<string>com.algorand.algod</string>"));
        assert!(plist.contains("<string>/opt/homebrew/bin/algod</string>"));
        assert!(plist.contains("<string>/Users/a/.algorand</string>"));
    }
}
