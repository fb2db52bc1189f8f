use clap::Args;
use cooly::config::{ArchiveSection, BuildSection, InstallSection};
use cooly::deploy::{self, DeployParams, DeployReport};

use super::{CmdResult, GlobalArgs};

/// Every stage option, prefixed with its stage name.
#[derive(Args, Debug, Default)]
pub struct DeployArgs {
    #[arg(long, env = "COOLY_ARCHIVE_REPO")]
    pub archive_repo: Option<String>,
    #[arg(long, env = "COOLY_ARCHIVE_NAME")]
    pub archive_name: Option<String>,
    #[arg(long, env = "COOLY_ARCHIVE_VERSION")]
    pub archive_version: Option<String>,
    #[arg(long, env = "COOLY_ARCHIVE_TREE_ISH")]
    pub archive_tree_ish: Option<String>,
    #[arg(long, env = "COOLY_ARCHIVE_NAME_FORMAT")]
    pub archive_name_format: Option<String>,
    #[arg(long, env = "COOLY_ARCHIVE_OUTPUT")]
    pub archive_output: Option<String>,

    #[arg(long, env = "COOLY_BUILD_HOST")]
    pub build_host: Option<String>,
    #[arg(long, env = "COOLY_BUILD_TOOLBIN")]
    pub build_toolbin: Option<String>,
    #[arg(long, env = "COOLY_BUILD_OUTPUT")]
    pub build_output: Option<String>,
    #[arg(long, env = "COOLY_BUILD_REQUIREMENTS")]
    pub build_requirements: Option<String>,
    #[arg(long, env = "COOLY_BUILD_PRE_SCRIPT")]
    pub build_pre_script: Option<String>,
    #[arg(long, env = "COOLY_BUILD_POST_SCRIPT")]
    pub build_post_script: Option<String>,

    /// Target host; repeat or separate with `,` / `;`
    #[arg(long = "install-hosts", env = "COOLY_INSTALL_HOSTS")]
    pub install_hosts: Vec<String>,
    #[arg(long, env = "COOLY_INSTALL_PATH")]
    pub install_path: Option<String>,
    #[arg(long, env = "COOLY_INSTALL_PRE_COMMAND")]
    pub install_pre_command: Option<String>,
    #[arg(long, env = "COOLY_INSTALL_POST_COMMAND")]
    pub install_post_command: Option<String>,
    #[arg(long, env = "COOLY_INSTALL_MAX_VERSIONS")]
    pub install_max_versions: Option<String>,
    #[arg(long, env = "COOLY_INSTALL_POLICY")]
    pub install_policy: Option<String>,
}

impl DeployArgs {
    fn into_sections(self) -> cooly::Result<(ArchiveSection, BuildSection, InstallSection)> {
        let archive = ArchiveSection {
            repo: self.archive_repo,
            name: self.archive_name,
            version: self.archive_version,
            tree_ish: self.archive_tree_ish,
            name_format: self.archive_name_format,
            output: self.archive_output,
        };
        let build = BuildSection {
            host: self.build_host,
            toolbin: self.build_toolbin,
            output: self.build_output,
            requirements: self.build_requirements,
            pre_script: self.build_pre_script,
            post_script: self.build_post_script,
        };
        let install = InstallSection {
            hosts: super::host_list(self.install_hosts),
            path: self.install_path,
            pre_command: self.install_pre_command,
            post_command: self.install_post_command,
            max_versions: super::max_versions(self.install_max_versions),
            policy: super::policy(self.install_policy)?,
        };
        Ok((archive, build, install))
    }
}

/// Missing keys from every stage, reported in one error.
fn collect<A, B, C>(
    archive: cooly::Result<A>,
    build: cooly::Result<B>,
    install: cooly::Result<C>,
) -> cooly::Result<(A, B, C)> {
    match (archive, build, install) {
        (Ok(a), Ok(b), Ok(c)) => Ok((a, b, c)),
        (archive, build, install) => {
            let errors: Vec<cooly::Error> = [archive.err(), build.err(), install.err()]
                .into_iter()
                .flatten()
                .collect();
            if errors
                .iter()
                .all(|e| e.code == cooly::ErrorCode::ValidationMissingArgument)
            {
                let missing = errors
                    .iter()
                    .filter_map(|e| e.details["args"].as_array())
                    .flatten()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                return Err(cooly::Error::validation_missing_argument(missing));
            }
            let first = errors
                .into_iter()
                .find(|e| e.code != cooly::ErrorCode::ValidationMissingArgument);
            Err(first.unwrap_or_else(|| cooly::Error::internal_unexpected("stage parameters rejected")))
        }
    }
}

pub fn run(args: DeployArgs, global: &GlobalArgs) -> CmdResult<DeployReport> {
    let file = global.load_config()?;
    let (archive, build, install) = args.into_sections()?;

    let (archive, build, install) = collect(
        archive.over(&file.archive).into_params(&file.defaults, "archive_"),
        build.over(&file.build).into_params(String::new(), "build_"),
        install.over(&file.install).into_install_params(String::new(), "install_"),
    )?;

    let params = DeployParams {
        archive,
        build,
        install,
    };
    let report = deploy::run(&params, &super::connector(&file), &file.defaults)?;
    let exit_code = super::report_exit_code(&report.install);
    Ok((report, exit_code))
}
