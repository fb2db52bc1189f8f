use clap::Args;
use cooly::archive::{self, PackageArtifact};
use cooly::config::ArchiveSection;

use super::{CmdResult, GlobalArgs};

#[derive(Args, Debug, Default)]
pub struct ArchiveArgs {
    /// Source repository: `local@PATH`, `remote@URL`, or a bare VCS URL
    #[arg(long, env = "COOLY_ARCHIVE_REPO")]
    pub repo: Option<String>,

    /// Project name (probed from the source tree when omitted)
    #[arg(long, env = "COOLY_ARCHIVE_NAME")]
    pub name: Option<String>,

    /// Project version (probed from the source tree when omitted)
    #[arg(long = "version", env = "COOLY_ARCHIVE_VERSION")]
    pub project_version: Option<String>,

    /// Revision to archive
    #[arg(long, env = "COOLY_ARCHIVE_TREE_ISH")]
    pub tree_ish: Option<String>,

    /// Package file name template, e.g. `{name}-{version}-{datetime:%Y%m%d}`
    #[arg(long, env = "COOLY_ARCHIVE_NAME_FORMAT")]
    pub name_format: Option<String>,

    /// Directory the package is written to
    #[arg(long, env = "COOLY_ARCHIVE_OUTPUT")]
    pub output: Option<String>,
}

impl ArchiveArgs {
    pub fn into_section(self) -> ArchiveSection {
        ArchiveSection {
            repo: self.repo,
            name: self.name,
            version: self.project_version,
            tree_ish: self.tree_ish,
            name_format: self.name_format,
            output: self.output,
        }
    }
}

pub fn run(args: ArchiveArgs, global: &GlobalArgs) -> CmdResult<PackageArtifact> {
    let file = global.load_config()?;
    let params = args.into_section().over(&file.archive).into_params(&file.defaults, "")?;

    let package = archive::run(&params, &file.defaults)?;
    Ok((package, 0))
}
