use std::path::{Path, PathBuf};
use std::io::Write;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::debug;

use super::fallback::FallbackDriver;
use super::linux::{LinuxDriver, PackageTool};
use super::mac::MacDriver;
use crate::clienv::DAEMON_BINARY;
use crate::error::{NodeError, Result};
use crate::http::HttpFetch;
use crate::system::{CommandList, Host};

/// Lifecycle of the node daemon on one class of host.
///
/// An empty `data_dir` means "not given"; each driver decides whether that
/// is acceptable for the operation.
#[async_trait]
pub trait PlatformDriver: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Where a fresh install keeps its data when no directory is given.
    fn default_data_dir(&self) -> PathBuf;

    async fn install(&self, data_dir: &Path, network: &str, force: bool) -> Result<()>;

    async fn uninstall(&self, data_dir: &Path, force: bool) -> Result<()>;

    async fn upgrade(&self) -> Result<()>;

    async fn start(&self, data_dir: &Path) -> Result<()>;

    async fn stop(&self, data_dir: &Path) -> Result<()>;

    /// Registered with the host service manager.
    async fn is_service(&self, data_dir: &Path) -> Result<bool>;

    /// Points the registered service at `data_dir`.
    async fn update_service(&self, data_dir: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFamily {
    Linux,
    MacOs,
    OtherUnix,
    Unsupported,
}

impl HostFamily {
    /// Family of the running host, computed once per process.
    pub fn detect() -> HostFamily {
        static FAMILY: OnceLock<HostFamily> = OnceLock::new();
        *FAMILY.get_or_init(|| {
            let family = Self::from_os(std::env::consts::OS);
            debug!(os = std::env::consts::OS, ?family, "Detected host family");
            family
        })
    }

    pub fn from_os(os: &str) -> HostFamily {
        match os {
            "linux" => HostFamily::Linux,
            "macos" => HostFamily::MacOs,
            "freebsd" | "openbsd" | "netbsd" | "dragonfly" | "illumos" | "solaris" => {
                HostFamily::OtherUnix
            }
            _ => HostFamily::Unsupported,
        }
    }
}

/// The driver for `family`, or `None` when the host is unsupported.
///
/// Linux hosts without a supported package manager use the fallback driver.
pub fn select_driver(
    family: HostFamily,
    host: Arc<dyn Host>,
    http: Arc<dyn HttpFetch>,
) -> Option<Box<dyn PlatformDriver>> {
    let driver: Box<dyn PlatformDriver> = match family {
        HostFamily::Linux if PackageTool::detect(host.as_ref()).is_some() => {
            Box::new(LinuxDriver::new(host, http))
        }
        HostFamily::Linux | HostFamily::OtherUnix => Box::new(FallbackDriver::new(host, http)),
        HostFamily::MacOs => Box::new(MacDriver::new(host, http)),
        HostFamily::Unsupported => return None,
    };
    debug!(?family, driver = driver.name(), "Selected platform driver");
    Some(driver)
}

/// Resolved path of the daemon executable.
pub(crate) fn resolve_daemon(host: &dyn Host) -> Result<PathBuf> {
    host.lookup_path(DAEMON_BINARY)
        .ok_or_else(|| NodeError::not_found(format!("{DAEMON_BINARY} on PATH")))
}

pub(crate) fn is_blank(path: &Path) -> bool {
    path.as_os_str().is_empty()
}

/// Writes `content` to a private temp file for a later `sudo install`.
///
/// The file is created exclusively with mode 0600 and removed when the
/// returned handle drops.
pub(crate) fn stage_file(name: &str, content: &str) -> Result<NamedTempFile> {
    let mut staged = tempfile::Builder::new()
        .prefix("nodekit-")
        .suffix(&format!("-{name}"))
        .tempfile()?;
    staged.write_all(content.as_bytes())?;
    staged.flush()?;
    debug!(path = %staged.path().display(), "Staged file");
    Ok(staged)
}

/// Copies a staged file into `target` as root with mode 0644.
pub(crate) async fn install_staged(host: &dyn Host, staged: &NamedTempFile, target: &str) -> Result<()> {
    let list = CommandList::new().cmd([
        "sudo".to_string(),
        "install".to_string(),
        "-m".to_string(),
        "0644".to_string(),
        staged.path().display().to_string(),
        target.to_string(),
    ]);
    host.run_all(&host.elevate(list)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::fake::FakeFetch;
    use crate::system::fake::FakeHost;

    fn pick(family: HostFamily, tools: &[&str]) -> Option<&'static str> {
        select_driver(
            family,
            Arc::new(FakeHost::with_tools(tools)),
            Arc::new(FakeFetch::default()),
        )
        .map(|d| d.name())
    }

    #[test]
    fn test_family_from_os() {
        assert_eq!(HostFamily::from_os("linux"), HostFamily::Linux);
        assert_eq!(HostFamily::from_os("macos"), HostFamily::MacOs);
        assert_eq!(HostFamily::from_os("freebsd"), HostFamily::OtherUnix);
        assert_eq!(HostFamily::from_os("windows"), HostFamily::Unsupported);
    }

    #[test]
    fn test_detect_is_stable() {
        assert_eq!(HostFamily::detect(), HostFamily::detect());
    }

    #[test]
    fn test_driver_selection() {
        assert_eq!(pick(HostFamily::Linux, &["apt-get"]), Some("linux"));
        assert_eq!(pick(HostFamily::Linux, &["dnf"]), Some("linux"));
        assert_eq!(pick(HostFamily::Linux, &["pacman"]), Some("fallback"));
        assert_eq!(pick(HostFamily::OtherUnix, &[]), Some("fallback"));
        assert_eq!(pick(HostFamily::MacOs, &[]), Some("macos"));
        assert_eq!(pick(HostFamily::Unsupported, &["apt-get"]), None);
    }

    #[tokio::test]
    async fn test_staged_file_is_private_and_cleaned_up() {
        let host = FakeHost::default();
        let staged = stage_file("override.conf", "[Service]\n").unwrap();
        let path = staged.path().to_path_buf();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[Service]\n");
        assert!(path.display().to_string().ends_with("-override.conf"));
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        install_staged(&host, &staged, "/etc/target.conf").await.unwrap();
        assert_eq!(
            host.ran(),
            vec![format!("sudo install -m 0644 {} /etc/target.conf", path.display())]
        );
        drop(staged);
        assert!(!path.exists());
    }

    #[test]
    fn test_staged_names_are_unique() {
        let a = stage_file("algod.plist", "a").unwrap();
        let b = stage_file("algod.plist", "b").unwrap();
        assert_ne!(a.path(), b.path());
    }
}
