//! Installed versions under an installation root, their aliases, and retention.
//!
//! Layout on every host:
//!
//! ```text
//! {install_root}/{version}/   one directory per installed distribution
//! {install_root}/current      symlink to the version being served
//! ```

use std::fmt;
use std::num::NonZeroUsize;

use serde::Serialize;

use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::utils::shell;

/// Name of the serving symlink. Never a version.
pub const CURRENT: &str = "current";

/// Alias marker for the newest version.
pub const LATEST: &str = "LATEST";

/// Entries directly under `install_root` except `current`, newest first by mtime.
///
/// The listing is a snapshot; the directory can change right after.
pub fn list_versions(ctx: &dyn ExecutionContext, install_root: &str) -> Result<Vec<String>> {
    // -1: one per line, -t: newest modification time first
    let command = format!("ls -1t {}", shell::quote_path(install_root));
    let output = ctx.run_checked(&command)?;
    Ok(parse_listing(&output.stdout))
}

fn parse_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != CURRENT && !name.starts_with('.'))
        .map(str::to_string)
        .collect()
}

/// Symbolic reference to an installed version: `LATEST` or `LATEST~N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionAlias {
    /// Zero-based position in the newest-first listing.
    pub offset: usize,
}

impl VersionAlias {
    pub fn parse(token: &str) -> Option<Self> {
        if token == LATEST {
            return Some(Self { offset: 0 });
        }

        let rest = token.strip_prefix(LATEST)?.strip_prefix('~')?;
        if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        rest.parse::<usize>().ok().map(|offset| Self { offset })
    }

    pub fn for_offset(offset: usize) -> Self {
        Self { offset }
    }
}

impl fmt::Display for VersionAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.offset == 0 {
            f.write_str(LATEST)
        } else {
            write!(f, "{}~{}", LATEST, self.offset)
        }
    }
}

/// Resolve an alias against a newest-first listing.
pub fn resolve_alias(alias: VersionAlias, versions: &[String], search_path: &str) -> Result<String> {
    versions.get(alias.offset).cloned().ok_or_else(|| {
        Error::version_not_found(alias.to_string(), search_path, None, versions.to_vec())
    })
}

/// How many installed versions to keep on a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Retention {
    /// Retention not requested: nothing is ever pruned.
    Unlimited,
    Keep(NonZeroUsize),
}

impl Retention {
    /// `None` means retention was not requested. Anything supplied must be a positive integer.
    pub fn from_requested(max_versions: Option<i64>) -> Result<Self> {
        match max_versions {
            None => Ok(Retention::Unlimited),
            Some(n) => usize::try_from(n)
                .ok()
                .and_then(NonZeroUsize::new)
                .map(Retention::Keep)
                .ok_or_else(|| {
                    Error::config_invalid_value(
                        "max_versions",
                        Some(n.to_string()),
                        "must be a positive integer",
                    )
                }),
        }
    }
}

/// Versions beyond the first `keep` entries of a newest-first listing.
pub fn obsolete_versions(versions: &[String], retention: Retention) -> Vec<String> {
    match retention {
        Retention::Unlimited => Vec::new(),
        Retention::Keep(keep) => versions
            .iter()
            .filter(|name| name.as_str() != CURRENT)
            .skip(keep.get())
            .cloned()
            .collect(),
    }
}

/// One line of a `list` report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AliasedVersion {
    pub alias: String,
    pub version: String,
}

/// Label every version with its alias, newest first.
pub fn alias_listing(versions: &[String]) -> Vec<AliasedVersion> {
    versions
        .iter()
        .enumerate()
        .map(|(offset, version)| AliasedVersion {
            alias: VersionAlias::for_offset(offset).to_string(),
            version: version.clone(),
        })
        .collect()
}
