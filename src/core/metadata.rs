//! Project name and version, read from the checked-out tree.

use serde::Serialize;

use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::utils::shell;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectMetadata {
    pub name: String,
    pub version: String,
}

/// Run `probe_command` inside `dir` and read the name and version from the
/// last two non-empty lines it prints.
///
/// `entry_point` must exist in `dir`, otherwise this is a not-found error.
pub fn probe(
    ctx: &dyn ExecutionContext,
    dir: &str,
    entry_point: &str,
    probe_command: &str,
) -> Result<ProjectMetadata> {
    let check = format!("test -f {}", shell::quote_path(entry_point));
    if !ctx.run_in(dir, &check).success {
        return Err(Error::metadata_not_found(entry_point, dir));
    }

    let output = ctx.run_checked_in(dir, probe_command)?;
    parse_probe_output(&output.stdout).ok_or_else(|| {
        Error::config_invalid_value(
            "metadata_probe",
            Some(probe_command.to_string()),
            "expected the project name and version on the last two lines of output",
        )
    })
}

fn parse_probe_output(stdout: &str) -> Option<ProjectMetadata> {
    let lines: Vec<&str> = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    match lines.as_slice() {
        [.., name, version] => Some(ProjectMetadata {
            name: name.to_string(),
            version: version.to_string(),
        }),
        _ => None,
    }
}
