//! Build stage: turn a package archive into an installable distribution.
//!
//! The package is shipped to the build host (or stays local when no host is
//! given), extracted in a scratchpad and handed to the build tool. The
//! newest `dist/*.tar.gz` it produces is fetched back into a local directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use serde::Serialize;

use crate::context::{Connector, ExecutionContext, Target};
use crate::defaults::Defaults;
use crate::error::{Error, ErrorCategory, Result};
use crate::scratch::{self, Scratchpads};
use crate::utils::{artifact, shell};

/// Where the build tool leaves its output, relative to the build directory.
pub const DIST_GLOB: &str = "dist/*.tar.gz";

#[derive(Debug, Clone, Default)]
pub struct BuildParams {
    pub package: String,
    /// Empty or unset builds on this machine.
    pub host: Option<String>,
    pub toolbin: String,
    pub output: String,
    pub requirements: Option<String>,
    pub pre_script: Option<String>,
    pub post_script: Option<String>,
}

/// The Build stage's output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionArtifact {
    pub path: String,
    pub package: String,
    pub host: String,
    pub built_at: String,
}

fn stage_error(err: Error) -> Error {
    if err.category() == ErrorCategory::Configuration {
        err
    } else {
        Error::build_failed(err)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// `{toolbin}/{tool} build [--requirements=..] [--prebuild-script=..] [--postbuild-script=..] .`
///
/// Optional flags are left out entirely when their value is not supplied.
pub fn tool_command(params: &BuildParams, tool: &str) -> String {
    let tool_path = format!("{}/{}", params.toolbin.trim_end_matches('/'), tool);
    let mut parts = vec![shell::quote_path(&tool_path), "build".to_string()];

    let flags = [
        ("--requirements", non_empty(&params.requirements)),
        ("--prebuild-script", non_empty(&params.pre_script)),
        ("--postbuild-script", non_empty(&params.post_script)),
    ];
    for (flag, value) in flags {
        if let Some(value) = value {
            parts.push(shell::quote_arg(&format!("{}={}", flag, value)));
        }
    }

    parts.push(".".to_string());
    parts.join(" ")
}

/// `{output}/{package stem}-{YYYYmmddHHMMSS}.tar.gz`
fn distribution_path(output: &str, package_file: &str) -> PathBuf {
    let stem = artifact::archive_stem(package_file);
    let stamp = Local::now().format("%Y%m%d%H%M%S");
    Path::new(shellexpand::tilde(output).as_ref()).join(format!("{}-{}.tar.gz", stem, stamp))
}

fn build_in(
    params: &BuildParams,
    tool: &str,
    package: &Path,
    ctx: &Arc<dyn ExecutionContext>,
    pads: &mut Scratchpads,
) -> Result<PathBuf> {
    let package_file = artifact::file_name(package)?;
    let pad = pads.allocate("build", ctx)?;
    let remote_package = format!("{}/{}", pad.path, package_file);

    log_status!("build", "Uploading {} to {}", package.display(), ctx.target());
    ctx.upload(package, &remote_package)?;
    ctx.run_checked_in(&pad.path, &format!("tar xzf {}", shell::quote_path(&package_file)))?;

    log_status!("build", "Running {} on {}", tool, ctx.target());
    ctx.run_checked_in(&pad.path, &tool_command(params, tool))?;

    let dist = distribution_path(&params.output, &package_file);
    ctx.download(&pad.path, DIST_GLOB, &dist)?;

    pads.release(&pad)?;
    Ok(dist)
}

fn build_on(
    params: &BuildParams,
    target: &Target,
    connector: &dyn Connector,
    defaults: &Defaults,
) -> Result<PathBuf> {
    let package = artifact::resolve_artifact_path(&shellexpand::tilde(&params.package))?;
    let ctx = connector.connect(target)?;
    scratch::scoped(&defaults.scratch_root, |pads| {
        build_in(params, &defaults.build_tool, &package, &ctx, pads)
    })
}

/// Build the distribution for `params.package`.
pub fn run(
    params: &BuildParams,
    connector: &dyn Connector,
    defaults: &Defaults,
) -> Result<DistributionArtifact> {
    let mut missing = Vec::new();
    if params.package.trim().is_empty() {
        missing.push("package".to_string());
    }
    if params.toolbin.trim().is_empty() {
        missing.push("toolbin".to_string());
    }
    if params.output.trim().is_empty() {
        missing.push("output".to_string());
    }
    if !missing.is_empty() {
        return Err(Error::validation_missing_argument(missing));
    }
    if defaults.build_tool.trim().is_empty() {
        return Err(Error::config_missing_key("build_tool", Some("defaults".to_string())));
    }

    let target = Target::from_host(params.host.as_deref());
    tracing::info!(package = %params.package, host = %target, "build stage started");

    let dist = build_on(params, &target, connector, defaults).map_err(stage_error)?;

    let path = dist.to_string_lossy().to_string();
    log_status!("build", "Distribution {} created", path);
    tracing::info!(%path, "build stage finished");

    Ok(DistributionArtifact {
        path,
        package: params.package.clone(),
        host: target.label().to_string(),
        built_at: Local::now().to_rfc3339(),
    })
}
