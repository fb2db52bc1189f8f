//! Deploy: archive, then build the package, then install the distribution.
//!
//! Pure sequencing. The first failing stage ends the run; hosts already
//! installed stay as they are.

use serde::Serialize;

use crate::archive::{self, ArchiveParams, PackageArtifact};
use crate::build::{self, BuildParams, DistributionArtifact};
use crate::context::Connector;
use crate::defaults::Defaults;
use crate::error::{Error, Result};
use crate::hosts::{self, HostReport};
use crate::install::{self, InstallParams, InstalledVersion};
use crate::versions::Retention;

/// Stage parameters. `build.package` and `install.dist` are filled in from
/// the previous stage's output.
#[derive(Debug, Clone)]
pub struct DeployParams {
    pub archive: ArchiveParams,
    pub build: BuildParams,
    pub install: InstallParams,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployReport {
    pub package: PackageArtifact,
    pub distribution: DistributionArtifact,
    pub install: HostReport<InstalledVersion>,
}

/// Everything a later stage needs that can be checked before the first one runs.
fn preflight(params: &DeployParams) -> Result<()> {
    let mut missing = Vec::new();
    let required = [
        ("archive_repo", params.archive.repo.as_str()),
        ("build_toolbin", params.build.toolbin.as_str()),
        ("build_output", params.build.output.as_str()),
        ("install_path", params.install.path.as_str()),
    ];
    for (key, value) in required {
        if value.trim().is_empty() {
            missing.push(key.to_string());
        }
    }
    if hosts::remote_targets(&params.install.hosts).is_empty() {
        missing.push("install_hosts".to_string());
    }
    if !missing.is_empty() {
        return Err(Error::validation_missing_argument(missing));
    }

    Retention::from_requested(params.install.max_versions)?;
    Ok(())
}

pub fn run(params: &DeployParams, connector: &dyn Connector, defaults: &Defaults) -> Result<DeployReport> {
    preflight(params)?;

    let package = archive::run(&params.archive, defaults)?;

    let build_params = BuildParams {
        package: package.path.clone(),
        ..params.build.clone()
    };
    let distribution = build::run(&build_params, connector, defaults)?;

    let install_params = InstallParams {
        dist: distribution.path.clone(),
        ..params.install.clone()
    };
    let install = install::run(&install_params, connector, defaults)?;

    Ok(DeployReport {
        package,
        distribution,
        install,
    })
}
