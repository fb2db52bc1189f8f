//! The `current` serving symlink.

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::utils::shell;
use crate::versions::CURRENT;

pub fn version_dir(install_root: &str, version: &str) -> String {
    format!("{}/{}", install_root.trim_end_matches('/'), version)
}

pub fn current_link(install_root: &str) -> String {
    version_dir(install_root, CURRENT)
}

/// Point `{install_root}/current` at `{install_root}/{version}` in one rename.
///
/// A fresh symlink is created next to `current` and renamed over it, so the
/// link always resolves to either the old or the new target.
pub fn switch_current(ctx: &dyn ExecutionContext, install_root: &str, version: &str) -> Result<()> {
    let target = version_dir(install_root, version);
    let link = current_link(install_root);
    let staging = format!(
        "{}/.{}-{}",
        install_root.trim_end_matches('/'),
        CURRENT,
        uuid::Uuid::new_v4().simple()
    );

    let command = format!(
        "ln -s {target} {staging} && mv -Tf {staging} {link}",
        target = shell::quote_path(&target),
        staging = shell::quote_path(&staging),
        link = shell::quote_path(&link),
    );

    if let Err(err) = ctx.run_checked(&command) {
        let _ = ctx.run(&format!("rm -f {}", shell::quote_path(&staging)));
        return Err(err);
    }

    tracing::info!(host = %ctx.target(), %link, %target, "serving symlink switched");
    Ok(())
}

/// The version `current` points at right now, if anywhere.
pub fn read_current(ctx: &dyn ExecutionContext, install_root: &str) -> Option<String> {
    let output = ctx.run(&format!(
        "readlink {}",
        shell::quote_path(&current_link(install_root))
    ));
    let version = output.stdout.trim().trim_end_matches('/').rsplit('/').next()?;
    (output.success && !version.is_empty()).then(|| version.to_string())
}
