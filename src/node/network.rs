use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::config::{self, DaemonConfig, CONFIG_FILE};
use crate::clienv;
use crate::error::{NodeError, Result};
use crate::http::HttpFetch;
use crate::system::probe;

pub const GENESIS_FILE: &str = "genesis.json";
pub const TOKEN_FILE: &str = "algod.token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
        }
    }

    pub fn genesis_url(&self) -> String {
        format!("{}/{}/{}", clienv::genesis_base_url(), self.as_str(), GENESIS_FILE)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            other => Err(NodeError::validation(format!(
                "unsupported network '{other}', expected mainnet or testnet"
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenesisLabel {
    network: String,
}

/// Network label recorded in `<data_dir>/genesis.json`.
pub fn current_network(data_dir: &Path) -> Result<String> {
    let path = data_dir.join(GENESIS_FILE);
    let content = std::fs::read(&path)
        .map_err(|_| NodeError::not_found(format!("genesis file {}", path.display())))?;
    let genesis: GenesisLabel = serde_json::from_slice(&content)
        .map_err(|_| NodeError::not_found(format!("network label in {}", path.display())))?;
    Ok(genesis.network)
}

/// The directory holds a readable genesis file with a network label.
pub fn is_data_dir(data_dir: &Path) -> bool {
    !data_dir.as_os_str().is_empty() && current_network(data_dir).is_ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkState {
    NoDataDir,
    InvalidOrForced,
    ValidMatching,
    ValidMismatched { existing: String },
}

pub fn classify(data_dir: &Path, network: Network, force: bool) -> NetworkState {
    if !data_dir.is_dir() {
        return NetworkState::NoDataDir;
    }
    if force {
        return NetworkState::InvalidOrForced;
    }
    match current_network(data_dir) {
        Ok(existing) if existing == network.as_str() => NetworkState::ValidMatching,
        Ok(existing) => NetworkState::ValidMismatched { existing },
        Err(_) => NetworkState::InvalidOrForced,
    }
}

/// Creates `dir` and its parents with mode 0755.
pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(dir)?;
    Ok(())
}

pub async fn fetch_genesis(http: &dyn HttpFetch, network: Network) -> Result<Vec<u8>> {
    let url = network.genesis_url();
    info!(%network, url = %url, "Downloading genesis file");
    http.get(&url).await
}

/// Downloads the genesis for `network` into `data_dir`, creating it if needed.
pub async fn write_genesis(http: &dyn HttpFetch, data_dir: &Path, network: Network) -> Result<()> {
    ensure_dir(data_dir)?;
    let genesis = fetch_genesis(http, network).await?;
    let path = data_dir.join(GENESIS_FILE);
    std::fs::write(&path, genesis)?;
    info!(path = %path.display(), "Genesis file written");
    Ok(())
}

/// Points `data_dir` at `network`.
///
/// A missing, invalid or forced directory gets a fresh genesis file. A valid
/// directory already on `network` is left alone. A valid directory on a
/// different network is refused unless forced.
pub async fn set_network(
    http: &dyn HttpFetch,
    data_dir: &Path,
    network: &str,
    force: bool,
) -> Result<()> {
    let network: Network = network.parse()?;
    if data_dir.as_os_str().is_empty() {
        return Err(NodeError::validation("data directory path is empty"));
    }

    let state = classify(data_dir, network, force);
    debug!(data_dir = %data_dir.display(), %network, force, ?state, "Setting network");

    match state {
        NetworkState::NoDataDir | NetworkState::InvalidOrForced => {
            write_genesis(http, data_dir, network).await
        }
        NetworkState::ValidMatching => Ok(()),
        NetworkState::ValidMismatched { existing } => Err(NodeError::validation(format!(
            "data directory {} is configured for {existing}, refusing to switch to {network} without force",
            data_dir.display()
        ))),
    }
}

/// Data directories the supported install methods use.
pub fn known_data_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/var/lib/algorand"),
        clienv::home_dir().join(".algorand"),
        clienv::install_dir().join("data"),
    ]
}

/// Every valid data directory under `root`.
pub fn find_data_dirs(root: &Path) -> Vec<PathBuf> {
    probe::find_path_to_file(root, GENESIS_FILE)
        .into_iter()
        .filter(|dir| is_data_dir(dir))
        .collect()
}

/// Explicit path, then $ALGORAND_DATA, then the first valid known path.
pub fn resolve_data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit.filter(|d| !d.as_os_str().is_empty()) {
        return Ok(dir.to_path_buf());
    }
    if let Some(dir) = clienv::algorand_data() {
        return Ok(dir);
    }
    known_data_paths()
        .into_iter()
        .find(|dir| is_data_dir(dir))
        .ok_or_else(|| NodeError::not_found("no data directory configured"))
}

/// Read-only description of a data directory for bug reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFolderInfo {
    pub path: PathBuf,
    pub network: Option<String>,
    pub pid: Option<u32>,
    /// The recorded pid belongs to a live process.
    pub pid_alive: bool,
    pub has_genesis: bool,
    pub has_config: bool,
    pub has_token: bool,
    pub config: DaemonConfig,
}

impl DataFolderInfo {
    /// Describes `data_dir`. A blank path describes nothing rather than the
    /// working directory.
    pub fn inspect(data_dir: &Path) -> Self {
        if data_dir.as_os_str().is_empty() {
            return Self::default();
        }
        let pid = probe::pid_from_data_dir(data_dir).ok();
        Self {
            path: data_dir.to_path_buf(),
            network: current_network(data_dir).ok(),
            pid,
            pid_alive: pid.is_some_and(probe::is_process_alive),
            has_genesis: data_dir.join(GENESIS_FILE).is_file(),
            has_config: data_dir.join(CONFIG_FILE).is_file(),
            has_token: data_dir.join(TOKEN_FILE).is_file(),
            config: config::load_daemon_config(data_dir).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::fake::FakeFetch;

    const MAINNET: &[u8] = br#"{"id":"v1.0","network":"mainnet"}"#;
    const TESTNET: &[u8] = br#"{"id":"v1.0","network":"testnet"}"#;

    fn fetcher() -> FakeFetch {
        FakeFetch::default()
            .serve(&Network::Mainnet.genesis_url(), MAINNET)
            .serve(&Network::Testnet.genesis_url(), TESTNET)
    }

    #[test]
    fn test_parse_network() {
        assert_eq!("mainnet".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!("testnet".parse::<Network>().unwrap(), Network::Testnet);
        assert!(matches!(
            "betanet".parse::<Network>(),
            Err(NodeError::Validation(_))
        ));
        assert!("Mainnet".parse::<Network>().is_err());
    }

    #[tokio::test]
    async fn test_invalid_network_fails_before_io() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("data");
        let http = fetcher();

        let err = set_network(&http, &target, "devnet", false).await.unwrap_err();
        assert!(matches!(err, NodeError::Validation(_)));
        assert!(!target.exists());
        assert!(http.gets().is_empty());
    }

    #[tokio::test]
    async fn test_creates_missing_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("data");
        let http = fetcher();

        set_network(&http, &target, "testnet", false).await.unwrap();
        assert_eq!(current_network(&target).unwrap(), "testnet");
        assert!(is_data_dir(&target));
    }

    #[tokio::test]
    async fn test_set_network_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let http = fetcher();

        set_network(&http, dir.path(), "mainnet", false).await.unwrap();
        let first = std::fs::read(dir.path().join(GENESIS_FILE)).unwrap();

        set_network(&http, dir.path(), "mainnet", false).await.unwrap();
        let second = std::fs::read(dir.path().join(GENESIS_FILE)).unwrap();

        assert_eq!(first, second);
        assert_eq!(http.gets().len(), 1);
    }

    #[tokio::test]
    async fn test_refuses_network_switch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(GENESIS_FILE), MAINNET).unwrap();
        let http = fetcher();

        let err = set_network(&http, dir.path(), "testnet", false)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Validation(_)));
        assert_eq!(std::fs::read(dir.path().join(GENESIS_FILE)).unwrap(), MAINNET);
        assert!(http.gets().is_empty());
    }

    #[tokio::test]
    async fn test_force_overwrites_network() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(GENESIS_FILE), MAINNET).unwrap();
        let http = fetcher();

        set_network(&http, dir.path(), "testnet", true).await.unwrap();
        assert_eq!(current_network(dir.path()).unwrap(), "testnet");
    }

    #[tokio::test]
    async fn test_invalid_genesis_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(GENESIS_FILE), "not json").unwrap();
        assert_eq!(
            classify(dir.path(), Network::Mainnet, false),
            NetworkState::InvalidOrForced
        );

        set_network(&fetcher(), dir.path(), "mainnet", false).await.unwrap();
        assert_eq!(current_network(dir.path()).unwrap(), "mainnet");
    }

    #[test]
    fn test_current_network_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            current_network(dir.path()),
            Err(NodeError::NotFound(_))
        ));
        assert!(!is_data_dir(Path::new("")));
    }

    #[test]
    fn test_find_data_dirs_skips_invalid() {
        let root = tempfile::tempdir().unwrap();
        let good = root.path().join("good");
        let bad = root.path().join("bad");
        std::fs::create_dir_all(&good).unwrap();
        std::fs::create_dir_all(&bad).unwrap();
        std::fs::write(good.join(GENESIS_FILE), TESTNET).unwrap();
        std::fs::write(bad.join(GENESIS_FILE), "{}").unwrap();

        assert_eq!(find_data_dirs(root.path()), vec![good]);
    }

    #[test]
    fn test_inspect_data_folder() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(GENESIS_FILE), MAINNET).unwrap();
        std::fs::write(
            dir.path().join(probe::PID_FILE),
            std::process::id().to_string(),
        )
        .unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), r#"{"EnableP2P":true}"#).unwrap();

        let info = DataFolderInfo::inspect(dir.path());
        assert_eq!(info.network.as_deref(), Some("mainnet"));
        assert_eq!(info.pid, Some(std::process::id()));
        assert_eq!(info.pid_alive, cfg!(unix));
        assert!(info.has_genesis && info.has_config && !info.has_token);
        assert_eq!(info.config.enable_p2p, Some(true));
    }

    #[test]
    fn test_inspect_blank_path_ignores_working_directory() {
        let info = DataFolderInfo::inspect(Path::new(""));
        assert_eq!(info, DataFolderInfo::default());
        assert!(info.network.is_none() && !info.has_genesis);
    }
}
