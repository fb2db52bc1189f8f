use clap::Args;
use cooly::config::InstallSection;
use cooly::rollback::{self, RolledBack};
use cooly::HostReport;

use super::install::InstallTargetArgs;
use super::{CmdResult, GlobalArgs};

#[derive(Args, Debug, Default)]
pub struct RollbackArgs {
    /// Installed version directory, `LATEST` or `LATEST~N`
    pub version: String,

    #[command(flatten)]
    pub target: InstallTargetArgs,

    /// Command run on each host after `current` is switched
    #[arg(long, env = "COOLY_INSTALL_POST_COMMAND")]
    pub post_command: Option<String>,
}

pub fn run(args: RollbackArgs, global: &GlobalArgs) -> CmdResult<HostReport<RolledBack>> {
    let file = global.load_config()?;
    let section = InstallSection {
        post_command: args.post_command,
        ..args.target.into_section()?
    };
    let params = section.over(&file.install).into_rollback_params(args.version)?;

    let report = rollback::run(&params, &super::connector(&file), &file.defaults)?;
    let exit_code = super::report_exit_code(&report);
    Ok((report, exit_code))
}
