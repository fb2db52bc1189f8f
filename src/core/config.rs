//! YAML configuration file and its merge with command-line values.
//!
//! ```yaml
//! archive:
//!   repo: local@/src/proj
//!   tree_ish: HEAD
//! build:
//!   toolbin: /opt/cooly/bin
//!   output: /tmp/dist
//! install:
//!   hosts: [web1, web2]
//!   path: /srv/proj
//!   max_versions: 5
//! defaults:
//!   scratch_root: /var/tmp
//! ```
//!
//! Every value is optional in the file. A command-line value (or its
//! `COOLY_*` environment variable) wins over the file, and the file wins over
//! the built-in defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::archive::ArchiveParams;
use crate::build::BuildParams;
use crate::defaults::Defaults;
use crate::error::{Error, Result};
use crate::hosts::HostPolicy;
use crate::install::InstallParams;
use crate::listing::ListParams;
use crate::rollback::RollbackParams;
use crate::utils::io;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub archive: ArchiveSection,
    pub build: BuildSection,
    pub install: InstallSection,
    pub defaults: Defaults,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveSection {
    pub repo: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub tree_ish: Option<String>,
    pub name_format: Option<String>,
    pub output: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSection {
    pub host: Option<String>,
    pub toolbin: Option<String>,
    pub output: Option<String>,
    pub requirements: Option<String>,
    pub pre_script: Option<String>,
    pub post_script: Option<String>,
}

/// Shared by `install`, `list` and `rollback`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallSection {
    pub hosts: Option<HostList>,
    pub path: Option<String>,
    pub pre_command: Option<String>,
    pub post_command: Option<String>,
    pub max_versions: Option<MaxVersions>,
    pub policy: Option<HostPolicy>,
}

/// A YAML sequence of host names, or one string separated by `,` or `;`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum HostList {
    List(Vec<String>),
    Joined(String),
}

impl HostList {
    pub fn hosts(&self) -> Vec<String> {
        match self {
            HostList::List(items) => split_hosts(items),
            HostList::Joined(joined) => split_hosts(std::slice::from_ref(joined)),
        }
    }
}

/// Split every entry on `,` and `;`, dropping blanks.
pub fn split_hosts(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split([',', ';']))
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect()
}

/// Retention count as written: a YAML integer, or text from the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaxVersions {
    Count(i64),
    Text(String),
}

impl MaxVersions {
    /// The requested count. Only decimal integers are accepted; the sign is checked later.
    pub fn requested(&self) -> Result<i64> {
        match self {
            MaxVersions::Count(n) => Ok(*n),
            MaxVersions::Text(raw) => raw.trim().parse::<i64>().map_err(|_| {
                Error::config_invalid_value(
                    "max_versions",
                    Some(raw.clone()),
                    "must be a positive integer",
                )
            }),
        }
    }
}

fn pick(cli: Option<String>, file: &Option<String>) -> Option<String> {
    let blank = |v: &String| v.trim().is_empty();
    cli.filter(|v| !blank(v))
        .or_else(|| file.clone().filter(|v| !blank(v)))
}

fn require(value: Option<String>, key: &str, missing: &mut Vec<String>) -> String {
    value.unwrap_or_else(|| {
        missing.push(key.to_string());
        String::new()
    })
}

fn finish<T>(value: T, missing: Vec<String>) -> Result<T> {
    if missing.is_empty() {
        Ok(value)
    } else {
        Err(Error::validation_missing_argument(missing))
    }
}

impl ArchiveSection {
    /// `self` holds command-line values; `file` fills whatever they leave unset.
    pub fn over(self, file: &ArchiveSection) -> ArchiveSection {
        ArchiveSection {
            repo: pick(self.repo, &file.repo),
            name: pick(self.name, &file.name),
            version: pick(self.version, &file.version),
            tree_ish: pick(self.tree_ish, &file.tree_ish),
            name_format: pick(self.name_format, &file.name_format),
            output: pick(self.output, &file.output),
        }
    }

    pub fn into_params(self, defaults: &Defaults, prefix: &str) -> Result<ArchiveParams> {
        let mut missing = Vec::new();
        let repo = require(self.repo, &format!("{}repo", prefix), &mut missing);
        finish(
            ArchiveParams {
                repo,
                name: self.name,
                version: self.version,
                tree_ish: self.tree_ish.unwrap_or_else(|| defaults.tree_ish.clone()),
                name_format: self.name_format.unwrap_or_else(|| defaults.name_format.clone()),
                output: self.output.unwrap_or_else(|| defaults.archive_output.clone()),
            },
            missing,
        )
    }
}

impl BuildSection {
    pub fn over(self, file: &BuildSection) -> BuildSection {
        BuildSection {
            host: pick(self.host, &file.host),
            toolbin: pick(self.toolbin, &file.toolbin),
            output: pick(self.output, &file.output),
            requirements: pick(self.requirements, &file.requirements),
            pre_script: pick(self.pre_script, &file.pre_script),
            post_script: pick(self.post_script, &file.post_script),
        }
    }

    /// `package` is left to the caller: it is an argument of `build` and an
    /// intermediate result of `deploy`.
    pub fn into_params(self, package: String, prefix: &str) -> Result<BuildParams> {
        let mut missing = Vec::new();
        let toolbin = require(self.toolbin, &format!("{}toolbin", prefix), &mut missing);
        let output = require(self.output, &format!("{}output", prefix), &mut missing);
        finish(
            BuildParams {
                package,
                host: self.host,
                toolbin,
                output,
                requirements: self.requirements,
                pre_script: self.pre_script,
                post_script: self.post_script,
            },
            missing,
        )
    }
}

impl InstallSection {
    pub fn over(self, file: &InstallSection) -> InstallSection {
        let hosts = match self.hosts {
            Some(cli) if !cli.hosts().is_empty() => Some(cli),
            _ => file.hosts.clone(),
        };
        let max_versions = match self.max_versions {
            Some(MaxVersions::Text(t)) if t.trim().is_empty() => file.max_versions.clone(),
            Some(cli) => Some(cli),
            None => file.max_versions.clone(),
        };

        InstallSection {
            hosts,
            path: pick(self.path, &file.path),
            pre_command: pick(self.pre_command, &file.pre_command),
            post_command: pick(self.post_command, &file.post_command),
            max_versions,
            policy: self.policy.or(file.policy),
        }
    }

    fn host_list(&self) -> Vec<String> {
        self.hosts.as_ref().map(HostList::hosts).unwrap_or_default()
    }

    fn requested_max_versions(&self) -> Result<Option<i64>> {
        self.max_versions.as_ref().map(MaxVersions::requested).transpose()
    }

    pub fn into_install_params(self, dist: String, prefix: &str) -> Result<InstallParams> {
        let mut missing = Vec::new();
        let hosts = self.host_list();
        if hosts.is_empty() {
            missing.push(format!("{}hosts", prefix));
        }
        let max_versions = self.requested_max_versions()?;
        let path = require(self.path, &format!("{}path", prefix), &mut missing);
        finish(
            InstallParams {
                dist,
                hosts,
                path,
                pre_command: self.pre_command,
                post_command: self.post_command,
                max_versions,
                policy: self.policy.unwrap_or_default(),
            },
            missing,
        )
    }

    pub fn into_list_params(self) -> Result<ListParams> {
        let mut missing = Vec::new();
        let hosts = self.host_list();
        let path = require(self.path, "path", &mut missing);
        finish(
            ListParams {
                hosts,
                path,
                policy: self.policy.unwrap_or_default(),
            },
            missing,
        )
    }

    pub fn into_rollback_params(self, version: String) -> Result<RollbackParams> {
        let mut missing = Vec::new();
        let hosts = self.host_list();
        let path = require(self.path, "path", &mut missing);
        finish(
            RollbackParams {
                hosts,
                path,
                post_command: self.post_command,
                version,
                policy: self.policy.unwrap_or_default(),
            },
            missing,
        )
    }
}

/// Parse configuration text. `origin` names the source in error messages.
pub fn parse(content: &str, origin: &str) -> Result<ConfigFile> {
    let value: serde_yml::Value = serde_yml::from_str(content)
        .map_err(|e| Error::config_invalid_yaml(origin, e.to_string()))?;

    match &value {
        serde_yml::Value::Null => {
            return Err(Error::config_invalid_yaml(
                origin,
                "the configuration file is empty",
            )
            .with_hint("Fill in at least one of the archive, build or install sections"));
        }
        serde_yml::Value::Mapping(_) => {}
        _ => {
            return Err(Error::config_invalid_yaml(
                origin,
                "the top level must be a mapping of sections",
            ));
        }
    }

    serde_yml::from_value(value).map_err(|e| Error::config_invalid_yaml(origin, e.to_string()))
}

/// Load a configuration file from disk.
pub fn load(path: &Path) -> Result<ConfigFile> {
    let display = path.display().to_string();
    if !path.is_file() {
        return Err(Error::config_file_not_found(display));
    }
    let content = io::read_file(path, "read configuration file")?;
    parse(&content, &display)
}

/// The file at `path`, or an empty configuration when no file was given.
pub fn load_optional(path: Option<&Path>) -> Result<ConfigFile> {
    match path {
        Some(path) => load(path),
        None => Ok(ConfigFile::default()),
    }
}
