use std::path::PathBuf;

use serde::Serialize;

use cooly::config::{self, ConfigFile, HostList, MaxVersions};
use cooly::{HostPolicy, HostReport, SshConnector};

pub type CmdResult<T> = cooly::Result<(T, i32)>;

/// Arguments shared by every subcommand.
pub(crate) struct GlobalArgs {
    pub config: Option<PathBuf>,
}

impl GlobalArgs {
    /// The configuration file named by `--config`, or an empty one.
    pub fn load_config(&self) -> cooly::Result<ConfigFile> {
        config::load_optional(self.config.as_deref())
    }
}

pub mod archive;
pub mod build;
pub mod deploy;
pub mod install;
pub mod list;
pub mod rollback;

pub(crate) fn connector(file: &ConfigFile) -> SshConnector {
    SshConnector::new(file.defaults.ssh.clone())
}

/// Exit code for a finished multi-host run.
pub(crate) fn report_exit_code<T: Serialize>(report: &HostReport<T>) -> i32 {
    if report.has_failures() {
        crate::output::PARTIAL_FAILURE_EXIT_CODE
    } else {
        0
    }
}

pub(crate) fn host_list(hosts: Vec<String>) -> Option<HostList> {
    if hosts.is_empty() {
        None
    } else {
        Some(HostList::List(hosts))
    }
}

pub(crate) fn max_versions(raw: Option<String>) -> Option<MaxVersions> {
    raw.map(MaxVersions::Text)
}

pub(crate) fn policy(raw: Option<String>) -> cooly::Result<Option<HostPolicy>> {
    raw.map(|p| p.parse::<HostPolicy>()).transpose()
}

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (cooly::Result<serde_json::Value>, i32) {
    match command {
        crate::Commands::Archive(args) => dispatch!(args, global, archive),
        crate::Commands::Build(args) => dispatch!(args, global, build),
        crate::Commands::Install(args) => dispatch!(args, global, install),
        crate::Commands::Deploy(args) => dispatch!(args, global, deploy),
        crate::Commands::List(args) => dispatch!(args, global, list),
        crate::Commands::Rollback(args) => dispatch!(args, global, rollback),
    }
}
