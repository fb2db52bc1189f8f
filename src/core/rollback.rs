//! `rollback`: point `current` back at an installed version. Never deletes.

use serde::Serialize;

use crate::context::{Connector, ExecutionContext};
use crate::defaults::Defaults;
use crate::error::{Error, Result};
use crate::hosts::{self, HostPolicy, HostReport};
use crate::install::run_hook;
use crate::serving;
use crate::versions::{self, VersionAlias, CURRENT};

#[derive(Debug, Clone, Default)]
pub struct RollbackParams {
    /// Empty rolls back the local installation root.
    pub hosts: Vec<String>,
    pub path: String,
    pub post_command: Option<String>,
    /// A version directory name, `LATEST` or `LATEST~N`.
    pub version: String,
    pub policy: HostPolicy,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolledBack {
    pub requested: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
}

/// Tokens that can never name a version directory.
fn is_reserved(token: &str) -> bool {
    token == CURRENT || token.contains('/') || token.starts_with('.')
}

/// A literal directory name wins over alias interpretation.
///
/// Only a version that is genuinely absent is `not_found.version`; a host
/// that cannot be reached fails with the command that could not run.
pub fn resolve_version(ctx: &dyn ExecutionContext, root: &str, token: &str) -> Result<String> {
    if !is_reserved(token) && ctx.dir_exists(&serving::version_dir(root, token))? {
        return Ok(token.to_string());
    }

    let installed = if ctx.dir_exists(root)? {
        versions::list_versions(ctx, root)?
    } else {
        Vec::new()
    };
    let resolved = VersionAlias::parse(token)
        .and_then(|alias| versions::resolve_alias(alias, &installed, root).ok());

    if let Some(version) = resolved {
        if ctx.dir_exists(&serving::version_dir(root, &version))? {
            return Ok(version);
        }
    }
    Err(Error::version_not_found(
        token,
        root,
        Some(ctx.target().label().to_string()),
        installed,
    ))
}

pub fn run(
    params: &RollbackParams,
    connector: &dyn Connector,
    defaults: &Defaults,
) -> Result<HostReport<RolledBack>> {
    let token = params.version.trim();
    let mut missing = Vec::new();
    if params.path.trim().is_empty() {
        missing.push("path".to_string());
    }
    if token.is_empty() {
        missing.push("version".to_string());
    }
    if !missing.is_empty() {
        return Err(Error::validation_missing_argument(missing));
    }

    let root = params.path.trim_end_matches('/');
    let targets = hosts::targets_or_local(&params.hosts);

    hosts::run_on_hosts(
        "rollback",
        &targets,
        params.policy,
        connector,
        &defaults.scratch_root,
        |ctx, _| {
            let version = resolve_version(ctx.as_ref(), root, token)?;
            let previous = serving::read_current(ctx.as_ref(), root);

            serving::switch_current(ctx.as_ref(), root, &version)?;
            log_status!("rollback", "current -> {} on {}", version, ctx.target());

            run_hook(ctx.as_ref(), "post-rollback", params.post_command.as_deref())?;

            Ok(RolledBack {
                requested: token.to_string(),
                version,
                previous,
            })
        },
    )
}
