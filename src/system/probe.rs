//! Host primitives: executable lookup, process discovery and PID records.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::error::{NodeError, Result};

/// File inside the data directory where the daemon records its PID.
pub const PID_FILE: &str = "algod.pid";

const SEARCH_WORKERS: usize = 4;

/// Resolves `tool` on `PATH`.
pub fn lookup_path(tool: &str) -> Option<PathBuf> {
    let found = which::which(tool).ok();
    trace!(tool, found = ?found, "PATH lookup");
    found
}

/// True when a process named `name` is running, according to `pgrep`.
pub fn is_cmd_running(name: &str) -> bool {
    Command::new("pgrep")
        .arg(name)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// PIDs of every process named `name`. Empty when none match or `pgrep` is missing.
pub fn cmd_pids(name: &str) -> Vec<u32> {
    let Ok(output) = Command::new("pgrep").arg(name).output() else {
        return Vec::new();
    };
    if !output.status.success() {
        return Vec::new();
    }
    parse_pids(&String::from_utf8_lossy(&output.stdout))
}

fn parse_pids(text: &str) -> Vec<u32> {
    text.lines()
        .map_while(|line| line.trim().parse().ok())
        .collect()
}

/// Effective user is root.
pub fn is_privileged() -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// A pid that names exactly one process: positive and within `pid_t`.
#[cfg(unix)]
pub(crate) fn to_pid_t(pid: u32) -> Option<libc::pid_t> {
    libc::pid_t::try_from(pid).ok().filter(|p| *p > 0)
}

pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        let Some(pid) = to_pid_t(pid) else {
            return false;
        };
        // Signal 0 only probes for existence and permission.
        let rc = unsafe { libc::kill(pid, 0) };
        rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

/// Reads the PID recorded in `<data_dir>/algod.pid`.
pub fn pid_from_data_dir(data_dir: &Path) -> Result<u32> {
    let path = data_dir.join(PID_FILE);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(NodeError::not_found(format!("pid file {}", path.display())));
        }
        Err(e) => return Err(e.into()),
    };

    let pid: u32 = content
        .trim()
        .parse()
        .map_err(|_| NodeError::validation(format!("malformed pid file {}", path.display())))?;

    if pid == 0 {
        return Err(NodeError::not_found(format!("no pid recorded in {}", path.display())));
    }
    if i32::try_from(pid).is_err() {
        return Err(NodeError::validation(format!(
            "pid {pid} in {} is out of range",
            path.display()
        )));
    }
    debug!(pid, path = %path.display(), "Read recorded pid");
    Ok(pid)
}

/// Directories under `start_dir` containing a file named `file_name`.
///
/// The tree is walked on the calling thread and candidate paths are checked
/// by a fixed pool of workers. Result order is unspecified.
pub fn find_path_to_file(start_dir: &Path, file_name: &str) -> Vec<PathBuf> {
    let found = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = mpsc::channel::<PathBuf>();
    let rx = Arc::new(Mutex::new(rx));

    let workers: Vec<_> = (0..SEARCH_WORKERS)
        .map(|_| {
            let rx = Arc::clone(&rx);
            let found = Arc::clone(&found);
            let target = file_name.to_string();
            thread::spawn(move || loop {
                let next = match rx.lock() {
                    Ok(guard) => guard.recv(),
                    Err(_) => return,
                };
                let Ok(path) = next else { return };

                let Ok(meta) = std::fs::metadata(&path) else { continue };
                if meta.is_file() && path.file_name().is_some_and(|n| n == target.as_str()) {
                    if let (Some(parent), Ok(mut found)) = (path.parent(), found.lock()) {
                        found.push(parent.to_path_buf());
                    }
                }
            })
        })
        .collect();

    // Unreadable entries (permissions, races) are skipped.
    for entry in WalkDir::new(start_dir).into_iter().filter_map(|e| e.ok()) {
        if tx.send(entry.into_path()).is_err() {
            break;
        }
    }
    drop(tx);

    for worker in workers {
        let _ = worker.join();
    }

    let found = found.lock().map(|v| v.clone()).unwrap_or_default();
    found
}
