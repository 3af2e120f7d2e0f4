use std::process::Output;

use tokio::process::Command;
use tracing::{debug, error};

use crate::error::{NodeError, Result};

/// An ordered batch of command lines. Runs strictly in sequence and stops at
/// the first failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandList(Vec<Vec<String>>);

impl CommandList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.push(args.into_iter().map(Into::into).collect());
    }

    /// Builder form of [`CommandList::push`].
    pub fn cmd<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(args);
        self
    }

    pub fn extend(&mut self, other: CommandList) {
        self.0.extend(other.0);
    }

    /// Prefixes every line not already starting with `sudo` with `sudo -u <user>`.
    pub fn su(self, user: &str) -> Self {
        Self(
            self.0
                .into_iter()
                .map(|args| {
                    if args.first().is_some_and(|a| a.starts_with("sudo")) {
                        args
                    } else {
                        let mut prefixed = vec!["sudo".to_string(), "-u".to_string(), user.to_string()];
                        prefixed.extend(args);
                        prefixed
                    }
                })
                .collect(),
        )
    }

    /// Drops a bare leading `sudo` from every line; used when already root.
    /// `sudo -u <user>` lines are kept.
    pub fn without_sudo(self) -> Self {
        Self(
            self.0
                .into_iter()
                .map(|args| match args.split_first() {
                    Some((first, rest))
                        if first == "sudo" && rest.first().is_some_and(|a| !a.starts_with('-')) =>
                    {
                        rest.to_vec()
                    }
                    _ => args,
                })
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vec<String>> {
        self.0.iter()
    }
}

fn combined(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

/// Runs one command line and returns its combined stdout and stderr.
pub async fn run(args: &[String]) -> Result<String> {
    let (program, rest) = args
        .split_first()
        .ok_or_else(|| NodeError::validation("empty command line"))?;
    let line = args.join(" ");

    let output = Command::new(program)
        .args(rest)
        .output()
        .await
        .map_err(|e| NodeError::CommandFailed {
            command: line.clone(),
            output: String::new(),
            source: e,
        })?;

    let text = combined(&output);
    debug!(command = %line, code = ?output.status.code(), "Command finished");

    if !output.status.success() {
        return Err(NodeError::CommandFailed {
            command: line,
            output: text,
            source: std::io::Error::other(output.status.to_string()),
        });
    }
    Ok(text)
}

/// Runs each line in order, aborting on the first failure.
pub async fn run_all(list: &CommandList) -> Result<()> {
    for args in list.iter() {
        debug!(command = %args.join(" "), "Running");
        if let Err(e) = run(args).await {
            error!(command = %args.join(" "), "Failed");
            return Err(e);
        }
    }
    Ok(())
}
