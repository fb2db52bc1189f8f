//! Execution contexts: the one place where "local" and "remote" differ.
//!
//! Stage logic is written once against [`ExecutionContext`]. A [`Connector`]
//! turns a host name into a context; [`SshConnector`] is the production one.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::defaults::SshDefaults;
use crate::error::{CommandFailedDetails, Error, Result, TargetDetails, TransferFailedDetails};
use crate::ssh::{execute_local_command, CommandOutput, SshClient};
use crate::utils::artifact;
use crate::utils::shell;

/// Where a command runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum Target {
    Local,
    Remote(String),
}

impl Target {
    /// `None` or an empty/blank host means the local machine.
    pub fn from_host(host: Option<&str>) -> Self {
        match host.map(str::trim) {
            Some(h) if !h.is_empty() => Target::Remote(h.to_string()),
            _ => Target::Local,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Target::Local => "local",
            Target::Remote(host) => host,
        }
    }

    fn details(&self) -> TargetDetails {
        TargetDetails {
            host: self.label().to_string(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Run/transfer capability for one machine.
pub trait ExecutionContext: Send + Sync {
    fn target(&self) -> &Target;

    /// Run a shell command, capturing its output. Never fails by itself.
    fn run(&self, command: &str) -> CommandOutput;

    /// Copy a local file to `remote_path` in this context.
    fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()>;

    /// Copy the single file at `remote_path` in this context to a local file.
    fn fetch(&self, remote_path: &str, local_path: &Path) -> Result<()>;

    /// Resolve `pattern` (relative to `dir`) to its newest match in this context.
    fn resolve_glob(&self, dir: &str, pattern: &str) -> Result<String>;

    /// Run a command with `dir` as its working directory.
    fn run_in(&self, dir: &str, command: &str) -> CommandOutput {
        self.run(&change_directory_scope(dir, command))
    }

    /// Run a command and turn a non-zero exit into an execution error.
    fn run_checked(&self, command: &str) -> Result<CommandOutput> {
        tracing::debug!(target_host = %self.target(), %command, "run");
        let output = self.run(command);
        if output.success {
            Ok(output)
        } else {
            Err(command_error(self.target(), command, output))
        }
    }

    fn run_checked_in(&self, dir: &str, command: &str) -> Result<CommandOutput> {
        self.run_checked(&change_directory_scope(dir, command))
    }

    /// `test -d`: exit 1 means absent, any other failure is an execution error.
    fn dir_exists(&self, path: &str) -> Result<bool> {
        let command = format!("test -d {}", shell::quote_path(path));
        let output = self.run(&command);
        match output.exit_code {
            0 if output.success => Ok(true),
            1 => Ok(false),
            _ => Err(command_error(self.target(), &command, output)),
        }
    }

    /// Download the newest file matching `dir/pattern` to `local_path`.
    fn download(&self, dir: &str, pattern: &str, local_path: &Path) -> Result<()> {
        let remote_path = self.resolve_glob(dir, pattern)?;
        self.fetch(&remote_path, local_path)
    }
}

/// Prefix a command so it runs inside `dir`.
pub fn change_directory_scope(dir: &str, command: &str) -> String {
    format!("cd {} && {}", shell::quote_path(dir), command)
}

/// ssh exits with 255 when the connection itself failed.
const SSH_CONNECTION_EXIT: i32 = 255;

fn command_error(target: &Target, command: &str, output: CommandOutput) -> Error {
    let connection_lost = matches!(target, Target::Remote(_)) && output.exit_code == SSH_CONNECTION_EXIT;
    let err = Error::command_failed(CommandFailedDetails {
        command: command.to_string(),
        exit_code: output.exit_code,
        stdout: output.stdout,
        stderr: output.stderr,
        target: target.details(),
    });
    if connection_lost {
        err.with_retryable(true)
    } else {
        err
    }
}

fn transfer_error(target: &Target, direction: &str, from: &str, to: &str, error: &str) -> Error {
    Error::transfer_failed(TransferFailedDetails {
        direction: direction.to_string(),
        source: from.to_string(),
        destination: to.to_string(),
        error: error.to_string(),
        target: target.details(),
    })
}

fn ensure_local_parent(target: &Target, local_path: &Path) -> Result<()> {
    if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            transfer_error(
                target,
                "download",
                "",
                &local_path.display().to_string(),
                &format!("cannot create {}: {}", parent.display(), e),
            )
        })?;
    }
    Ok(())
}

/// The machine cooly itself runs on.
pub struct LocalContext {
    target: Target,
}

impl LocalContext {
    pub fn new() -> Self {
        Self {
            target: Target::Local,
        }
    }
}

impl Default for LocalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext for LocalContext {
    fn target(&self) -> &Target {
        &self.target
    }

    fn run(&self, command: &str) -> CommandOutput {
        execute_local_command(command)
    }

    fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        std::fs::copy(local_path, remote_path)
            .map(|_| ())
            .map_err(|e| {
                transfer_error(
                    &self.target,
                    "upload",
                    &local_path.display().to_string(),
                    remote_path,
                    &e.to_string(),
                )
            })
    }

    fn fetch(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        ensure_local_parent(&self.target, local_path)?;
        std::fs::copy(remote_path, local_path)
            .map(|_| ())
            .map_err(|e| {
                transfer_error(
                    &self.target,
                    "download",
                    remote_path,
                    &local_path.display().to_string(),
                    &e.to_string(),
                )
            })
    }

    fn resolve_glob(&self, dir: &str, pattern: &str) -> Result<String> {
        let full = Path::new(dir).join(pattern);
        artifact::resolve_artifact_path(&full.to_string_lossy())
            .map(|path| path.to_string_lossy().to_string())
    }
}

/// A host reached over SSH.
pub struct RemoteContext {
    target: Target,
    client: SshClient,
}

impl RemoteContext {
    pub fn new(host: &str, client: SshClient) -> Self {
        Self {
            target: Target::Remote(host.to_string()),
            client,
        }
    }

    pub fn connect(host: &str, defaults: &SshDefaults) -> Result<Self> {
        let client = SshClient::from_host_spec(host, defaults)?;
        Ok(Self::new(host, client))
    }
}

impl ExecutionContext for RemoteContext {
    fn target(&self) -> &Target {
        &self.target
    }

    fn run(&self, command: &str) -> CommandOutput {
        self.client.execute(command)
    }

    fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        tracing::debug!(host = %self.target, local = %local_path.display(), remote_path, "upload");
        let output = self.client.upload_file(local_path, remote_path);
        if output.success {
            Ok(())
        } else {
            Err(transfer_error(
                &self.target,
                "upload",
                &local_path.display().to_string(),
                remote_path,
                output.error_text(),
            ))
        }
    }

    fn fetch(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        tracing::debug!(host = %self.target, remote_path, local = %local_path.display(), "download");
        ensure_local_parent(&self.target, local_path)?;
        let output = self.client.download_file(remote_path, local_path);
        if output.success {
            Ok(())
        } else {
            // Do not leave a truncated file behind.
            let _ = std::fs::remove_file(local_path);
            Err(transfer_error(
                &self.target,
                "download",
                remote_path,
                &local_path.display().to_string(),
                output.error_text(),
            ))
        }
    }

    fn resolve_glob(&self, dir: &str, pattern: &str) -> Result<String> {
        // The pattern stays unquoted so the remote shell expands it.
        let command = format!("ls -1td -- {}/{}", shell::quote_path(dir), pattern);
        let output = self.run(&command);
        let newest = output
            .stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty());

        match newest {
            Some(path) if output.success => Ok(path.to_string()),
            _ => Err(Error::artifact_not_found(
                format!("{}/{}", dir, pattern),
                Some(self.target.label().to_string()),
            )),
        }
    }
}

/// Opens an execution context for a target.
pub trait Connector: Sync {
    fn connect(&self, target: &Target) -> Result<Arc<dyn ExecutionContext>>;
}

/// Local targets run in-process; remote targets go through the system `ssh`.
pub struct SshConnector {
    pub ssh: SshDefaults,
}

impl SshConnector {
    pub fn new(ssh: SshDefaults) -> Self {
        Self { ssh }
    }
}

impl Connector for SshConnector {
    fn connect(&self, target: &Target) -> Result<Arc<dyn ExecutionContext>> {
        match target {
            Target::Local => Ok(Arc::new(LocalContext::new())),
            Target::Remote(host) => Ok(Arc::new(RemoteContext::connect(host, &self.ssh)?)),
        }
    }
}
