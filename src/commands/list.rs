use clap::Args;
use cooly::listing::{self, HostVersions};
use cooly::HostReport;

use super::install::InstallTargetArgs;
use super::{CmdResult, GlobalArgs};

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    #[command(flatten)]
    pub target: InstallTargetArgs,
}

pub fn run(args: ListArgs, global: &GlobalArgs) -> CmdResult<HostReport<HostVersions>> {
    let file = global.load_config()?;
    let params = args.target.into_section()?.over(&file.install).into_list_params()?;

    let report = listing::run(&params, &super::connector(&file), &file.defaults)?;
    let exit_code = super::report_exit_code(&report);
    Ok((report, exit_code))
}
