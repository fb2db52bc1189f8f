//! Install stage: unpack a distribution on every host and make it current.
//!
//! Per host, in order:
//!
//! 1. optional pre-command
//! 2. upload and extract the distribution in a scratchpad
//! 3. run the bundled installer into `{path}/{distribution stem}`
//! 4. switch `{path}/current` to it
//! 5. optional post-command
//! 6. prune versions beyond the retention limit

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::context::{Connector, ExecutionContext};
use crate::defaults::Defaults;
use crate::error::{Error, Result};
use crate::hosts::{self, HostPolicy, HostReport};
use crate::scratch::Scratchpads;
use crate::serving;
use crate::utils::{artifact, shell};
use crate::versions::{self, Retention};

#[derive(Debug, Clone, Default)]
pub struct InstallParams {
    pub dist: String,
    pub hosts: Vec<String>,
    pub path: String,
    pub pre_command: Option<String>,
    pub post_command: Option<String>,
    /// `None` keeps every version.
    pub max_versions: Option<i64>,
    pub policy: HostPolicy,
}

/// What one host ended up with.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledVersion {
    pub version: String,
    pub path: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pruned: Vec<String>,
}

/// Run a user-supplied hook command, if there is one.
pub(crate) fn run_hook(ctx: &dyn ExecutionContext, stage: &str, command: Option<&str>) -> Result<()> {
    let Some(command) = command.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(());
    };
    log_status!("hook", "{} on {}: {}", stage, ctx.target(), command);
    ctx.run_checked(command).map(|_| ())
}

/// Remove `obsolete` version directories under `install_root`.
fn prune(ctx: &dyn ExecutionContext, install_root: &str, obsolete: &[String]) -> Result<()> {
    if obsolete.is_empty() {
        return Ok(());
    }
    let names: Vec<String> = obsolete.iter().map(|v| shell::quote_path(v)).collect();
    ctx.run_checked_in(install_root, &format!("rm -rf -- {}", names.join(" ")))?;
    Ok(())
}

struct Plan<'a> {
    dist: &'a Path,
    dist_file: &'a str,
    version: &'a str,
    params: &'a InstallParams,
    retention: Retention,
    installer: &'a str,
}

fn install_on(plan: &Plan<'_>, ctx: &Arc<dyn ExecutionContext>, pads: &mut Scratchpads) -> Result<InstalledVersion> {
    let params = plan.params;
    let root = params.path.trim_end_matches('/');

    run_hook(ctx.as_ref(), "pre-install", params.pre_command.as_deref())?;

    let pad = pads.allocate("install", ctx)?;
    let remote_dist = format!("{}/{}", pad.path, plan.dist_file);

    log_status!("install", "Uploading {} to {}", plan.dist_file, ctx.target());
    ctx.upload(plan.dist, &remote_dist)?;
    // The archive always wraps its content in one top-level directory.
    ctx.run_checked_in(
        &pad.path,
        &format!("tar --strip-components=1 -xzf {}", shell::quote_path(plan.dist_file)),
    )?;

    let target_dir = serving::version_dir(root, plan.version);
    ctx.run_checked(&format!("mkdir -p {}", shell::quote_path(root)))?;
    log_status!("install", "Installing into {} on {}", target_dir, ctx.target());
    ctx.run_checked_in(
        &pad.path,
        &format!(
            "{} {}",
            shell::quote_path(&format!("./{}", plan.installer)),
            shell::quote_path(&target_dir)
        ),
    )?;

    serving::switch_current(ctx.as_ref(), root, plan.version)?;
    log_status!("install", "current -> {} on {}", plan.version, ctx.target());

    run_hook(ctx.as_ref(), "post-install", params.post_command.as_deref())?;

    let pruned = match plan.retention {
        Retention::Unlimited => Vec::new(),
        retention => {
            let installed = versions::list_versions(ctx.as_ref(), root)?;
            // The version just switched to is never pruned.
            let obsolete: Vec<String> = versions::obsolete_versions(&installed, retention)
                .into_iter()
                .filter(|v| v != plan.version)
                .collect();
            prune(ctx.as_ref(), root, &obsolete)?;
            if !obsolete.is_empty() {
                tracing::info!(host = %ctx.target(), pruned = ?obsolete, "obsolete versions removed");
            }
            obsolete
        }
    };

    pads.release(&pad)?;

    Ok(InstalledVersion {
        version: plan.version.to_string(),
        path: target_dir,
        pruned,
    })
}

/// Install `params.dist` on every host in `params.hosts`.
///
/// The retention limit is validated before any host is contacted, so an
/// invalid `max_versions` never deletes anything.
pub fn run(
    params: &InstallParams,
    connector: &dyn Connector,
    defaults: &Defaults,
) -> Result<HostReport<InstalledVersion>> {
    let targets = hosts::remote_targets(&params.hosts);

    let mut missing = Vec::new();
    if params.dist.trim().is_empty() {
        missing.push("dist".to_string());
    }
    if targets.is_empty() {
        missing.push("hosts".to_string());
    }
    if params.path.trim().is_empty() {
        missing.push("path".to_string());
    }
    if !missing.is_empty() {
        return Err(Error::validation_missing_argument(missing));
    }

    let retention = Retention::from_requested(params.max_versions)?;
    if defaults.installer.trim().is_empty() {
        return Err(Error::config_missing_key("installer", Some("defaults".to_string())));
    }
    let dist = artifact::resolve_artifact_path(&shellexpand::tilde(&params.dist))?;
    let dist_file = artifact::file_name(&dist)?;
    let version = artifact::archive_stem(&dist_file).to_string();

    let plan = Plan {
        dist: &dist,
        dist_file: &dist_file,
        version: &version,
        params,
        retention,
        installer: &defaults.installer,
    };

    tracing::info!(%version, hosts = targets.len(), policy = %params.policy, "install stage started");
    let report = hosts::run_on_hosts(
        "install",
        &targets,
        params.policy,
        connector,
        &defaults.scratch_root,
        |ctx, pads| install_on(&plan, ctx, pads),
    )?;

    log_status!("install", "Distribution {} installed", dist_file);
    Ok(report)
}
