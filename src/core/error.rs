use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingKey,
    ConfigInvalidValue,
    ConfigInvalidYaml,
    ConfigFileNotFound,

    ValidationMissingArgument,
    ValidationInvalidArgument,

    VersionNotFound,
    MetadataNotFound,
    ArtifactNotFound,

    SshHostInvalid,
    SshIdentityFileNotFound,

    CommandFailed,
    TransferFailed,

    ArchiveFailed,
    BuildFailed,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

/// Coarse grouping of error codes, matching how failures are reported to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    NotFound,
    Execution,
    Archive,
    Build,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",
            ErrorCode::ConfigInvalidYaml => "config.invalid_yaml",
            ErrorCode::ConfigFileNotFound => "config.file_not_found",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::VersionNotFound => "not_found.version",
            ErrorCode::MetadataNotFound => "not_found.metadata",
            ErrorCode::ArtifactNotFound => "not_found.artifact",

            ErrorCode::SshHostInvalid => "ssh.host_invalid",
            ErrorCode::SshIdentityFileNotFound => "ssh.identity_file_not_found",

            ErrorCode::CommandFailed => "exec.command_failed",
            ErrorCode::TransferFailed => "exec.transfer_failed",

            ErrorCode::ArchiveFailed => "archive.failed",
            ErrorCode::BuildFailed => "build.failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::ConfigMissingKey
            | ErrorCode::ConfigInvalidValue
            | ErrorCode::ConfigInvalidYaml
            | ErrorCode::ConfigFileNotFound
            | ErrorCode::ValidationMissingArgument
            | ErrorCode::ValidationInvalidArgument
            | ErrorCode::SshHostInvalid
            | ErrorCode::SshIdentityFileNotFound => ErrorCategory::Configuration,

            ErrorCode::VersionNotFound
            | ErrorCode::MetadataNotFound
            | ErrorCode::ArtifactNotFound => ErrorCategory::NotFound,

            ErrorCode::CommandFailed | ErrorCode::TransferFailed => ErrorCategory::Execution,

            ErrorCode::ArchiveFailed => ErrorCategory::Archive,
            ErrorCode::BuildFailed => ErrorCategory::Build,

            ErrorCode::InternalIoError
            | ErrorCode::InternalJsonError
            | ErrorCode::InternalUnexpected => ErrorCategory::Internal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMissingKeyDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidYamlDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingArgumentDetails {
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionNotFoundDetails {
    pub requested: String,
    pub search_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub available: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundDetails {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDetails {
    pub host: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFailedDetails {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub target: TargetDetails,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferFailedDetails {
    pub direction: String,
    pub source: String,
    pub destination: String,
    pub error: String,
    pub target: TargetDetails,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageFailedDetails {
    pub stage: String,
    pub cause_code: String,
    pub cause_message: String,
    pub cause: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        let message = format!("Missing required argument: {}", args.join(", "));
        Self::new(
            ErrorCode::ValidationMissingArgument,
            message,
            to_details(MissingArgumentDetails { args }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let problem = problem.into();
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.clone(),
            id,
            tried,
        });

        Self::new(ErrorCode::ValidationInvalidArgument, problem, details)
    }

    pub fn config_missing_key(key: impl Into<String>, path: Option<String>) -> Self {
        let details = to_details(ConfigMissingKeyDetails {
            key: key.into(),
            path,
        });

        Self::new(
            ErrorCode::ConfigMissingKey,
            "Missing required configuration key",
            details,
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let key = key.into();
        let problem = problem.into();
        let message = format!("Invalid value for '{}': {}", key, problem);
        let details = to_details(ConfigInvalidValueDetails {
            key,
            value,
            problem,
        });

        Self::new(ErrorCode::ConfigInvalidValue, message, details)
    }

    pub fn config_invalid_yaml(path: impl Into<String>, error: impl Into<String>) -> Self {
        let path = path.into();
        let error = error.into();
        let message = format!("Invalid configuration in {}: {}", path, error);
        let details = to_details(ConfigInvalidYamlDetails { path, error });

        Self::new(ErrorCode::ConfigInvalidYaml, message, details)
    }

    pub fn config_file_not_found(path: impl Into<String>) -> Self {
        let path = path.into();
        let message = format!("Could not find the configuration file '{}'", path);
        Self::new(
            ErrorCode::ConfigFileNotFound,
            message,
            serde_json::json!({ "path": path }),
        )
    }

    pub fn version_not_found(
        requested: impl Into<String>,
        search_path: impl Into<String>,
        host: Option<String>,
        available: Vec<String>,
    ) -> Self {
        let requested = requested.into();
        let search_path = search_path.into();
        let message = format!(
            "No version or alias named '{}' under {}",
            requested, search_path
        );
        let details = to_details(VersionNotFoundDetails {
            requested,
            search_path,
            host,
            available,
        });

        Self::new(ErrorCode::VersionNotFound, message, details)
            .with_hint("Run 'cooly list' to see installed versions and their aliases")
    }

    pub fn metadata_not_found(entry_point: impl Into<String>, path: impl Into<String>) -> Self {
        let entry_point = entry_point.into();
        let path = path.into();
        let message = format!("Project metadata entry point '{}' not found in {}", entry_point, path);
        let details = to_details(NotFoundDetails {
            id: entry_point,
            path: Some(path),
        });

        Self::new(ErrorCode::MetadataNotFound, message, details)
            .with_hint("Pass --name and --version explicitly to skip the metadata probe")
    }

    pub fn artifact_not_found(pattern: impl Into<String>, host: Option<String>) -> Self {
        let pattern = pattern.into();
        let message = format!("No artifact matches {}", pattern);
        let details = to_details(NotFoundDetails {
            id: pattern,
            path: host,
        });

        Self::new(ErrorCode::ArtifactNotFound, message, details)
    }

    pub fn ssh_host_invalid(host: impl Into<String>, problem: impl Into<String>) -> Self {
        let host = host.into();
        let problem = problem.into();
        let message = format!("Invalid host '{}': {}", host, problem);
        let details = to_details(InvalidArgumentDetails {
            field: "host".to_string(),
            problem,
            id: Some(host),
            tried: None,
        });

        Self::new(ErrorCode::SshHostInvalid, message, details)
    }

    pub fn ssh_identity_file_not_found(
        host: impl Into<String>,
        identity_file: impl Into<String>,
    ) -> Self {
        let details = serde_json::json!({
            "host": host.into(),
            "identityFile": identity_file.into(),
        });

        Self::new(
            ErrorCode::SshIdentityFileNotFound,
            "SSH identity file not found",
            details,
        )
    }

    pub fn command_failed(details: CommandFailedDetails) -> Self {
        let message = format!(
            "Command failed on {} (exit {}): {}",
            details.target.host, details.exit_code, details.command
        );

        Self::new(ErrorCode::CommandFailed, message, to_details(details))
    }

    pub fn transfer_failed(details: TransferFailedDetails) -> Self {
        let message = format!(
            "Failed to {} {} -> {} on {}: {}",
            details.direction, details.source, details.destination, details.target.host, details.error
        );

        Self::new(ErrorCode::TransferFailed, message, to_details(details))
    }

    /// Wrap a lower-level failure with the pipeline stage it happened in.
    pub fn stage_failed(code: ErrorCode, stage: &str, cause: Error) -> Self {
        let message = format!("{} stage failed: {}", stage, cause.message);
        let hints = cause.hints.clone();
        let details = to_details(StageFailedDetails {
            stage: stage.to_string(),
            cause_code: cause.code.as_str().to_string(),
            cause_message: cause.message,
            cause: cause.details,
        });

        let mut err = Self::new(code, message, details);
        err.hints = hints;
        err
    }

    pub fn archive_failed(cause: Error) -> Self {
        Self::stage_failed(ErrorCode::ArchiveFailed, "archive", cause)
    }

    pub fn build_failed(cause: Error) -> Self {
        Self::stage_failed(ErrorCode::BuildFailed, "build", cause)
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalIoErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalIoError, "IO error", details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalIoErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalJsonError, "JSON error", details)
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }
}
