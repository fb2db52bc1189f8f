//! `list`: installed versions per host with their aliases. Read-only.

use serde::Serialize;

use crate::context::Connector;
use crate::defaults::Defaults;
use crate::error::{Error, Result};
use crate::hosts::{self, HostPolicy, HostReport};
use crate::serving;
use crate::versions::{self, AliasedVersion};

#[derive(Debug, Clone, Default)]
pub struct ListParams {
    /// Empty lists the local installation root.
    pub hosts: Vec<String>,
    pub path: String,
    pub policy: HostPolicy,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostVersions {
    /// Newest first.
    pub versions: Vec<AliasedVersion>,
    /// Where `current` points, if it exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
}

pub fn run(params: &ListParams, connector: &dyn Connector, defaults: &Defaults) -> Result<HostReport<HostVersions>> {
    if params.path.trim().is_empty() {
        return Err(Error::validation_missing_argument(vec!["path".to_string()]));
    }
    let root = params.path.trim_end_matches('/');
    let targets = hosts::targets_or_local(&params.hosts);

    hosts::run_on_hosts(
        "list",
        &targets,
        params.policy,
        connector,
        &defaults.scratch_root,
        |ctx, _| {
            let installed = versions::list_versions(ctx.as_ref(), root)?;
            Ok(HostVersions {
                versions: versions::alias_listing(&installed),
                current: serving::read_current(ctx.as_ref(), root),
            })
        },
    )
}
