//! Host facilities used by the lifecycle drivers.
//!
//! Drivers never touch the process table or shell directly; they go through
//! [`Host`], so a whole install pipeline can be exercised against a fake.

pub mod cmds;
pub mod probe;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{NodeError, Result};
pub use cmds::CommandList;

#[async_trait]
pub trait Host: Send + Sync {
    fn lookup_path(&self, tool: &str) -> Option<PathBuf>;

    fn cmd_exists(&self, tool: &str) -> bool {
        self.lookup_path(tool).is_some()
    }

    fn is_privileged(&self) -> bool;

    fn is_cmd_running(&self, name: &str) -> bool;

    fn is_process_alive(&self, pid: u32) -> bool;

    /// Runs one command line, returning combined output.
    async fn run(&self, args: &[String]) -> Result<String>;

    /// Runs a batch in order, stopping at the first failure.
    async fn run_all(&self, list: &CommandList) -> Result<()> {
        for args in list.iter() {
            self.run(args).await?;
        }
        Ok(())
    }

    /// Starts `program` detached from this process; no handle is kept.
    fn spawn_detached(&self, program: &Path, args: &[String]) -> Result<u32>;

    /// Sends a graceful termination signal to `pid`.
    fn terminate(&self, pid: u32) -> Result<()>;

    /// `list` with `sudo` stripped when already privileged.
    fn elevate(&self, list: CommandList) -> CommandList {
        if self.is_privileged() {
            list.without_sudo()
        } else {
            list
        }
    }
}

/// The real operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

#[async_trait]
impl Host for SystemHost {
    fn lookup_path(&self, tool: &str) -> Option<PathBuf> {
        probe::lookup_path(tool)
    }

    fn is_privileged(&self) -> bool {
        probe::is_privileged()
    }

    fn is_cmd_running(&self, name: &str) -> bool {
        probe::is_cmd_running(name)
    }

    fn is_process_alive(&self, pid: u32) -> bool {
        probe::is_process_alive(pid)
    }

    async fn run(&self, args: &[String]) -> Result<String> {
        cmds::run(args).await
    }

    async fn run_all(&self, list: &CommandList) -> Result<()> {
        cmds::run_all(list).await
    }

    fn spawn_detached(&self, program: &Path, args: &[String]) -> Result<u32> {
        let mut cmd = std::process::Command::new(program);
        cmd.args(args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd.spawn().map_err(|e| NodeError::CommandFailed {
            command: format!("{} {}", program.display(), args.join(" ")),
            output: String::new(),
            source: e,
        })?;
        let pid = child.id();
        info!(pid, program = %program.display(), "Spawned detached process");
        Ok(pid)
    }

    fn terminate(&self, pid: u32) -> Result<()> {
        debug!(pid, "Sending SIGTERM");
        #[cfg(unix)]
        {
            let target = probe::to_pid_t(pid)
                .ok_or_else(|| NodeError::validation(format!("refusing to signal pid {pid}")))?;
            let rc = unsafe { libc::kill(target, libc::SIGTERM) };
            if rc != 0 {
                return Err(std::io::Error::last_os_error().into());
            }
            Ok(())
        }
        #[cfg(not(unix))]
        {
            let _ = pid;
            Err(NodeError::UnsupportedPlatform)
        }
    }
}
