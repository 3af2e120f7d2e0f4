use std::path::PathBuf;

const NODEKIT_CONFIG_DIR: &str = "NODEKIT_CONFIG_DIR";
const NODEKIT_INSTALL_DIR: &str = "NODEKIT_INSTALL_DIR";
const NODEKIT_GENESIS_URL: &str = "NODEKIT_GENESIS_URL";
const NODEKIT_UPDATER_URL: &str = "NODEKIT_UPDATER_URL";
const NODEKIT_SHORTENER_URL: &str = "NODEKIT_SHORTENER_URL";
const ALGORAND_DATA: &str = "ALGORAND_DATA";
const ALGOD_URL: &str = "ALGOD_URL";
const ALGOD_TOKEN: &str = "ALGOD_TOKEN";
const SUDO_USER: &str = "SUDO_USER";

const FALLBACK_HOME: &str = "~";
const SETTINGS_FILE: &str = ".nodekit.toml";
const DEFAULT_GENESIS_URL: &str =
    "https://raw.githubusercontent.com/algorand/go-algorand/db7f1627e4919b05aef5392504e48b93a90a0146/installer/genesis";
const DEFAULT_UPDATER_URL: &str =
    "https://raw.githubusercontent.com/algorand/go-algorand/rel/stable/cmd/updater/update.sh";
const DEFAULT_SHORTENER_URL: &str = "https://api.nodely.io/api/v1/shortener";
const DEFAULT_ALGOD_URL: &str = "http://localhost:8080";

/// Name of the daemon executable on `PATH`.
pub const DAEMON_BINARY: &str = "algod";

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

pub fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(FALLBACK_HOME))
}

/// Settings file ($NODEKIT_CONFIG_DIR/settings.toml or ~/.nodekit.toml)
pub fn settings_path() -> PathBuf {
    let path = env_opt(NODEKIT_CONFIG_DIR)
        .map(|dir| PathBuf::from(dir).join("settings.toml"))
        .unwrap_or_else(|| home_dir().join(SETTINGS_FILE));
    tracing::trace!(path = %path.display(), "Resolved settings path");
    path
}

/// Data directory override ($ALGORAND_DATA)
pub fn algorand_data() -> Option<PathBuf> {
    let val = env_opt(ALGORAND_DATA).map(PathBuf::from);
    tracing::trace!(value = ?val, "ALGORAND_DATA env var");
    val
}

/// Install directory of the fallback path ($NODEKIT_INSTALL_DIR or ~/node)
pub fn install_dir() -> PathBuf {
    let dir = env_opt(NODEKIT_INSTALL_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|| home_dir().join("node"));
    tracing::trace!(dir = %dir.display(), "Resolved install directory");
    dir
}

/// Base URL holding `<network>/genesis.json` ($NODEKIT_GENESIS_URL or default)
pub fn genesis_base_url() -> String {
    let url = env_or(NODEKIT_GENESIS_URL, DEFAULT_GENESIS_URL);
    tracing::trace!(url = %url, "Genesis base URL");
    url
}

/// Updater script URL ($NODEKIT_UPDATER_URL or default)
pub fn updater_url() -> String {
    let url = env_or(NODEKIT_UPDATER_URL, DEFAULT_UPDATER_URL);
    tracing::trace!(url = %url, "Updater URL");
    url
}

/// Short-link service URL ($NODEKIT_SHORTENER_URL or default)
pub fn shortener_url() -> String {
    let url = env_or(NODEKIT_SHORTENER_URL, DEFAULT_SHORTENER_URL);
    tracing::trace!(url = %url, "Shortener URL");
    url
}

/// Management API endpoint ($ALGOD_URL or http://localhost:8080)
pub fn algod_url() -> String {
    env_or(ALGOD_URL, DEFAULT_ALGOD_URL)
}

/// Management API token ($ALGOD_TOKEN)
pub fn algod_token() -> Option<String> {
    env_opt(ALGOD_TOKEN)
}

/// Invoking user when running under sudo ($SUDO_USER)
pub fn sudo_user() -> Option<String> {
    env_opt(SUDO_USER).filter(|user| user != "root")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_opt_ignores_blank_values() {
        std::env::set_var("NODEKIT_TEST_BLANK", "   ");
        assert!(env_opt("NODEKIT_TEST_BLANK").is_none());
        assert_eq!(env_or("NODEKIT_TEST_BLANK", "fallback"), "fallback");
        std::env::remove_var("NODEKIT_TEST_BLANK");
    }

    #[test]
    fn test_genesis_url_default() {
        assert!(genesis_base_url().ends_with("/installer/genesis"));
    }
}
