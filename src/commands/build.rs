use clap::Args;
use cooly::build::{self, DistributionArtifact};
use cooly::config::BuildSection;

use super::{CmdResult, GlobalArgs};

#[derive(Args, Debug, Default)]
pub struct BuildArgs {
    /// Package archive produced by `cooly archive`
    pub package: String,

    /// Build host (`[user@]host[:port]`); builds locally when omitted
    #[arg(long, env = "COOLY_BUILD_HOST")]
    pub host: Option<String>,

    /// Directory holding the build tool on the build host
    #[arg(long, env = "COOLY_BUILD_TOOLBIN")]
    pub toolbin: Option<String>,

    /// Local directory the distribution is downloaded into
    #[arg(long, env = "COOLY_BUILD_OUTPUT")]
    pub output: Option<String>,

    /// Requirements file passed to the build tool
    #[arg(long, env = "COOLY_BUILD_REQUIREMENTS")]
    pub requirements: Option<String>,

    /// Script the build tool runs before building
    #[arg(long, env = "COOLY_BUILD_PRE_SCRIPT")]
    pub pre_script: Option<String>,

    /// Script the build tool runs after building
    #[arg(long, env = "COOLY_BUILD_POST_SCRIPT")]
    pub post_script: Option<String>,
}

impl BuildArgs {
    pub fn into_section(self) -> (String, BuildSection) {
        let section = BuildSection {
            host: self.host,
            toolbin: self.toolbin,
            output: self.output,
            requirements: self.requirements,
            pre_script: self.pre_script,
            post_script: self.post_script,
        };
        (self.package, section)
    }
}

pub fn run(args: BuildArgs, global: &GlobalArgs) -> CmdResult<DistributionArtifact> {
    let file = global.load_config()?;
    let (package, section) = args.into_section();
    let params = section.over(&file.build).into_params(package, "")?;

    let distribution = build::run(&params, &super::connector(&file), &file.defaults)?;
    Ok((distribution, 0))
}
