use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "nodekit")]
#[command(version)]
#[command(about = "Install, configure and monitor a blockchain node daemon", long_about = None)]
pub(crate) struct Cli {
    /// Data directory (falls back to ALGORAND_DATA, then known locations)
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Verbose logging (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Install the node daemon and point it at a network
    Install {
        /// Network to join
        #[arg(short, long, default_value = "mainnet")]
        network: String,

        /// Overwrite an existing data directory configured for another network
        #[arg(short, long)]
        force: bool,
    },

    /// Remove the node daemon
    Uninstall {
        /// Stop a running daemon and delete data directories
        #[arg(short, long)]
        force: bool,
    },

    /// Upgrade the node daemon in place
    Upgrade,

    /// Start the node daemon
    Start,

    /// Stop the node daemon
    Stop,

    /// Change node configuration
    Configure {
        #[command(subcommand)]
        command: ConfigureCommands,
    },

    /// Print diagnostic information as JSON
    Debug,

    /// Poll the management API and print network rates
    Metrics {
        /// Seconds between polls
        #[arg(short, long, default_value = "5")]
        interval: u64,

        /// Number of polls (0 polls until interrupted)
        #[arg(short, long, default_value = "2")]
        count: u64,
    },

    /// Fingerprint a participation key
    Hash {
        /// Participation key JSON as returned by the management API
        #[arg(long, conflicts_with = "offline")]
        key: Option<PathBuf>,

        /// Account address to fingerprint an offline registration for
        #[arg(long)]
        offline: Option<String>,

        /// Network label the registration is for
        #[arg(short, long, default_value = "mainnet")]
        network: String,

        /// Also request a registration short link
        #[arg(long)]
        link: bool,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConfigureCommands {
    /// Point the data directory at a network
    Network {
        /// mainnet or testnet
        network: String,

        /// Replace a genesis file for another network
        #[arg(short, long)]
        force: bool,
    },

    /// Point the host service at the data directory
    Service,

    /// Peer-to-peer networking flags in the daemon config
    P2p {
        /// Enable or disable the p2p network
        #[arg(long, action = ArgAction::Set)]
        enable: Option<bool>,

        /// Enable or disable hybrid (relay + p2p) mode
        #[arg(long, action = ArgAction::Set)]
        hybrid: Option<bool>,
    },
}
