use clap::Args;
use cooly::config::InstallSection;
use cooly::install::{self, InstalledVersion};
use cooly::HostReport;

use super::{CmdResult, GlobalArgs};

#[derive(Args, Debug, Default)]
pub struct InstallArgs {
    /// Distribution produced by `cooly build` (a glob picks the newest match)
    pub dist: String,

    #[command(flatten)]
    pub target: InstallTargetArgs,

    /// Command run on each host before installing
    #[arg(long, env = "COOLY_INSTALL_PRE_COMMAND")]
    pub pre_command: Option<String>,

    /// Command run on each host after `current` is switched
    #[arg(long, env = "COOLY_INSTALL_POST_COMMAND")]
    pub post_command: Option<String>,

    /// Installed versions to keep per host (oldest are pruned)
    #[arg(long, env = "COOLY_INSTALL_MAX_VERSIONS")]
    pub max_versions: Option<String>,
}

/// Where versions live. Shared by `install`, `list` and `rollback`.
#[derive(Args, Debug, Default)]
pub struct InstallTargetArgs {
    /// Target host; repeat or separate with `,` / `;`
    #[arg(long = "hosts", env = "COOLY_INSTALL_HOSTS")]
    pub hosts: Vec<String>,

    /// Installation root holding one directory per version and `current`
    #[arg(long, env = "COOLY_INSTALL_PATH")]
    pub path: Option<String>,

    /// sequential-abort, sequential-continue or parallel
    #[arg(long, env = "COOLY_INSTALL_POLICY")]
    pub policy: Option<String>,
}

impl InstallTargetArgs {
    pub fn into_section(self) -> cooly::Result<InstallSection> {
        Ok(InstallSection {
            hosts: super::host_list(self.hosts),
            path: self.path,
            policy: super::policy(self.policy)?,
            ..Default::default()
        })
    }
}

pub fn run(args: InstallArgs, global: &GlobalArgs) -> CmdResult<HostReport<InstalledVersion>> {
    let file = global.load_config()?;
    let section = InstallSection {
        pre_command: args.pre_command,
        post_command: args.post_command,
        max_versions: super::max_versions(args.max_versions),
        ..args.target.into_section()?
    };
    let params = section.over(&file.install).into_install_params(args.dist, "")?;

    let report = install::run(&params, &super::connector(&file), &file.defaults)?;
    let exit_code = super::report_exit_code(&report);
    Ok((report, exit_code))
}
