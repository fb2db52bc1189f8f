use crate::defaults::SshDefaults;
use crate::error::{Error, Result};
use crate::utils::shell;
use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};

pub struct SshClient {
    pub host: String,
    pub user: Option<String>,
    pub port: u16,
    pub identity_file: Option<String>,
    pub connect_timeout: u32,
    pub max_attempts: u32,
    /// When true, all commands run locally instead of over SSH.
    /// Set automatically when the host is localhost/127.0.0.1/::1.
    pub is_local: bool,
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl CommandOutput {
    fn failed(stderr: String) -> Self {
        Self {
            stdout: String::new(),
            stderr,
            success: false,
            exit_code: -1,
        }
    }

    fn from_output(out: std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            success: out.status.success(),
            exit_code: out.status.code().unwrap_or(-1),
        }
    }

    /// Prefers stderr, falls back to stdout if stderr is empty.
    pub fn error_text(&self) -> &str {
        if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        }
    }
}

/// Where a command's stdin comes from or its stdout goes to.
enum Stream<'a> {
    None,
    StdinFrom(&'a Path),
    StdoutTo(&'a Path),
}

impl SshClient {
    /// Build a client from a `[user@]host[:port]` spec.
    pub fn from_host_spec(spec: &str, defaults: &SshDefaults) -> Result<Self> {
        let (user, rest) = match spec.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
            Some(_) => return Err(Error::ssh_host_invalid(spec, "empty user before '@'")),
            None => (None, spec),
        };

        let (host, port) = split_port(rest, defaults.port)
            .map_err(|problem| Error::ssh_host_invalid(spec, problem))?;

        if host.is_empty() {
            return Err(Error::ssh_host_invalid(spec, "missing host name"));
        }

        let identity_file = match &defaults.identity_file {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).to_string();
                if !Path::new(&expanded).exists() {
                    return Err(Error::ssh_identity_file_not_found(spec, expanded));
                }
                Some(expanded)
            }
            _ => None,
        };

        let is_local = is_local_host(&host);
        if is_local {
            log_status!("ssh", "Host '{}' is localhost, running locally", spec);
        }

        Ok(Self {
            host,
            user,
            port,
            identity_file,
            connect_timeout: defaults.connect_timeout,
            max_attempts: defaults.max_attempts.max(1),
            is_local,
        })
    }

    fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }

    fn build_ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        if self.port != 22 {
            args.push("-p".to_string());
            args.push(self.port.to_string());
        }

        // Never prompt; drop a dead connection after ~45s.
        args.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-o".to_string(),
            "ServerAliveCountMax=3".to_string(),
        ]);

        args.push(self.destination());
        args.push(command.to_string());

        args
    }

    pub fn execute(&self, command: &str) -> CommandOutput {
        self.execute_with_retry(command, Stream::None)
    }

    /// Stream a local file into `remote_path` on the host.
    pub fn upload_file(&self, local_path: &Path, remote_path: &str) -> CommandOutput {
        let remote_command = format!("cat > {}", shell::quote_path(remote_path));
        self.execute_with_retry(&remote_command, Stream::StdinFrom(local_path))
    }

    /// Stream `remote_path` on the host into a local file.
    pub fn download_file(&self, remote_path: &str, local_path: &Path) -> CommandOutput {
        let remote_command = format!("cat {}", shell::quote_path(remote_path));
        self.execute_with_retry(&remote_command, Stream::StdoutTo(local_path))
    }

    fn execute_with_retry(&self, command: &str, stream: Stream<'_>) -> CommandOutput {
        let backoff_secs = [0, 2, 5]; // delays before retry 1, 2, 3

        let mut attempt = 0;
        loop {
            let result = self.execute_once(command, &stream);
            attempt += 1;

            // Only retry on transient connection errors, not command failures
            if result.success || attempt >= self.max_attempts || !is_transient_ssh_error(&result) {
                return result;
            }

            let delay = backoff_secs.get(attempt as usize).copied().unwrap_or(5);
            log_status!(
                "ssh",
                "Connection to {} failed (attempt {}/{}), retrying in {}s...",
                self.host,
                attempt,
                self.max_attempts,
                delay
            );
            tracing::warn!(host = %self.host, attempt, "transient ssh failure, retrying");
            std::thread::sleep(std::time::Duration::from_secs(delay));
        }
    }

    fn execute_once(&self, command: &str, stream: &Stream<'_>) -> CommandOutput {
        // Local execution: run command directly instead of over SSH
        let mut cmd = if self.is_local {
            shell_command(command)
        } else {
            let mut cmd = Command::new("ssh");
            cmd.args(self.build_ssh_args(command));
            cmd
        };

        match stream {
            Stream::None => {}
            Stream::StdinFrom(path) => match File::open(path) {
                Ok(file) => {
                    cmd.stdin(file);
                }
                Err(err) => {
                    return CommandOutput::failed(format!(
                        "Failed to open {}: {}",
                        path.display(),
                        err
                    ))
                }
            },
            Stream::StdoutTo(path) => match File::create(path) {
                Ok(file) => {
                    cmd.stdout(file);
                }
                Err(err) => {
                    return CommandOutput::failed(format!(
                        "Failed to create {}: {}",
                        path.display(),
                        err
                    ))
                }
            },
        }

        match cmd.output() {
            Ok(out) => CommandOutput::from_output(out),
            Err(e) => CommandOutput::failed(format!("SSH error: {}", e)),
        }
    }
}

fn split_port(rest: &str, default_port: u16) -> std::result::Result<(String, u16), String> {
    // Bracketed IPv6 with an explicit port: [::1]:2222
    if let Some(stripped) = rest.strip_prefix('[') {
        let (host, tail) = stripped
            .split_once(']')
            .ok_or_else(|| "unterminated '[' in host".to_string())?;
        let port = match tail.strip_prefix(':') {
            Some(port) => parse_port(port)?,
            None if tail.is_empty() => default_port,
            None => return Err(format!("unexpected '{}' after host", tail)),
        };
        return Ok((host.to_string(), port));
    }

    // Bare IPv6 addresses carry several colons and never a port.
    if rest.matches(':').count() > 1 {
        return Ok((rest.to_string(), default_port));
    }

    match rest.split_once(':') {
        Some((host, port)) => Ok((host.to_string(), parse_port(port)?)),
        None => Ok((rest.to_string(), default_port)),
    }
}

fn parse_port(port: &str) -> std::result::Result<u16, String> {
    port.parse::<u16>()
        .map_err(|_| format!("'{}' is not a valid port", port))
}

fn shell_command(command: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    }

    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    }
}

pub fn execute_local_command(command: &str) -> CommandOutput {
    let mut cmd = shell_command(command);
    cmd.stdin(Stdio::null());

    match cmd.output() {
        Ok(out) => CommandOutput::from_output(out),
        Err(e) => CommandOutput::failed(format!("Command error: {}", e)),
    }
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// Check if an SSH failure is a transient connection error worth retrying.
fn is_transient_ssh_error(output: &CommandOutput) -> bool {
    let stderr = output.stderr.to_lowercase();
    // SSH exit code 255 = connection error (not a remote command failure)
    let is_connection_exit = output.exit_code == 255;

    let transient_patterns = [
        "connection refused",
        "connection reset",
        "connection timed out",
        "no route to host",
        "network is unreachable",
        "temporary failure in name resolution",
        "broken pipe",
        "ssh_exchange_identification",
        "connection closed by remote host",
    ];

    is_connection_exit || transient_patterns.iter().any(|p| stderr.contains(p))
}
