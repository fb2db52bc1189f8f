//! Archive stage: snapshot a source tree at a revision into a `.tar.gz`.
//!
//! Always runs on the local machine. Remote repositories are cloned into a
//! scratchpad first, since `git archive --remote` is rarely enabled.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use serde::Serialize;

use crate::context::{ExecutionContext, LocalContext};
use crate::defaults::Defaults;
use crate::error::{Error, ErrorCategory, Result};
use crate::metadata;
use crate::scratch::{self, Scratchpads};
use crate::utils::template::{self, NameVars};
use crate::utils::{shell, validation};

/// Where the source tree comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "location", rename_all = "camelCase")]
pub enum RepoSource {
    /// A path on this machine, used as-is.
    Local(String),
    /// A VCS URL, cloned before archiving.
    Remote(String),
}

impl RepoSource {
    /// `local@PATH`, `file://PATH`, `remote@URL`, or a bare URL (remote).
    pub fn parse(repo: &str) -> Result<Self> {
        let repo = validation::require_non_empty(repo, "repo", "Repository must not be empty")?;

        let (is_local, location) = if let Some(path) = repo.strip_prefix("local@") {
            (true, path)
        } else if let Some(path) = repo.strip_prefix("file://") {
            (true, path)
        } else if let Some(url) = repo.strip_prefix("remote@") {
            (false, url)
        } else {
            (false, repo)
        };

        if location.trim().is_empty() {
            return Err(Error::validation_invalid_argument(
                "repo",
                "Repository location is empty after its prefix",
                Some(repo.to_string()),
                None,
            ));
        }

        Ok(if is_local {
            RepoSource::Local(shellexpand::tilde(location).to_string())
        } else {
            RepoSource::Remote(location.to_string())
        })
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveParams {
    pub repo: String,
    /// Probed from the tree when not given.
    pub name: Option<String>,
    pub version: Option<String>,
    pub tree_ish: String,
    pub name_format: String,
    pub output: String,
}

/// The Archive stage's output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageArtifact {
    pub path: String,
    pub name: String,
    pub version: String,
    pub tree_ish: String,
    pub name_format: String,
    pub created_at: String,
}

/// Configuration errors surface as-is; everything else is an archive failure.
fn stage_error(err: Error) -> Error {
    if err.category() == ErrorCategory::Configuration {
        err
    } else {
        Error::archive_failed(err)
    }
}

fn absolute_dir(dir: &str) -> Result<PathBuf> {
    let expanded = PathBuf::from(shellexpand::tilde(dir).as_ref());
    if expanded.is_absolute() {
        return Ok(expanded);
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(expanded))
        .map_err(|e| Error::internal_io(e.to_string(), Some("resolve output directory".to_string())))
}

/// The single directory a clone produced inside `dir`.
fn single_top_level_dir(ctx: &dyn ExecutionContext, dir: &str) -> Result<String> {
    let output = ctx.run_checked(&format!("ls -1A {}", shell::quote_path(dir)))?;
    let entries: Vec<&str> = output
        .stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    match entries.as_slice() {
        [only] => Ok(format!("{}/{}", dir.trim_end_matches('/'), only)),
        _ => Err(Error::internal_unexpected(format!(
            "expected exactly one directory in {} after clone, found {}",
            dir,
            entries.len()
        ))),
    }
}

fn checkout(
    source: &RepoSource,
    ctx: &Arc<dyn ExecutionContext>,
    pads: &mut Scratchpads,
) -> Result<String> {
    match source {
        RepoSource::Local(path) => Ok(path.clone()),
        RepoSource::Remote(url) => {
            let pad = pads.allocate("archive", ctx)?;
            log_status!("archive", "Cloning {}", url);
            ctx.run_checked_in(&pad.path, &format!("git clone -- {}", shell::quote_arg(url)))?;
            single_top_level_dir(ctx.as_ref(), &pad.path)
        }
    }
}

fn archive_in(
    params: &ArchiveParams,
    defaults: &Defaults,
    source: &RepoSource,
    output_dir: &Path,
    ctx: &Arc<dyn ExecutionContext>,
    pads: &mut Scratchpads,
) -> Result<PackageArtifact> {
    let tree = checkout(source, ctx, pads)?;

    let (name, version) = match (&params.name, &params.version) {
        (Some(name), Some(version)) => (name.clone(), version.clone()),
        (name, version) => {
            let probed = metadata::probe(
                ctx.as_ref(),
                &tree,
                &defaults.metadata_entry_point,
                &defaults.metadata_probe,
            )?;
            (
                name.clone().unwrap_or(probed.name),
                version.clone().unwrap_or(probed.version),
            )
        }
    };

    let created_at = Local::now();
    let file_stem = template::render_name(
        &params.name_format,
        &NameVars {
            name: &name,
            version: &version,
            tree_ish: &params.tree_ish,
            datetime: created_at,
        },
    )?;
    let path = output_dir.join(format!("{}.tar.gz", file_stem));
    let path_str = path.to_string_lossy().to_string();

    // A literal `/` in the template nests the package below `output_dir`.
    let parent = path.parent().unwrap_or(output_dir);
    ctx.run_checked(&format!(
        "mkdir -p {}",
        shell::quote_path(&parent.to_string_lossy())
    ))?;
    ctx.run_checked_in(
        &tree,
        &format!(
            "git archive --format=tar.gz -o {} {}",
            shell::quote_path(&path_str),
            shell::quote_arg(&params.tree_ish)
        ),
    )?;

    Ok(PackageArtifact {
        path: path_str,
        name,
        version,
        tree_ish: params.tree_ish.clone(),
        name_format: params.name_format.clone(),
        created_at: created_at.to_rfc3339(),
    })
}

/// Produce the package archive described by `params`.
pub fn run(params: &ArchiveParams, defaults: &Defaults) -> Result<PackageArtifact> {
    let source = RepoSource::parse(&params.repo)?;
    let tree_ish = validation::require_non_empty(&params.tree_ish, "tree_ish", "Revision must not be empty")?;
    let params = ArchiveParams {
        tree_ish: tree_ish.to_string(),
        ..params.clone()
    };

    // Reject a bad template before cloning anything.
    template::render_name(
        &params.name_format,
        &NameVars {
            name: "name",
            version: "version",
            tree_ish: &params.tree_ish,
            datetime: Local::now(),
        },
    )?;

    let output_dir = absolute_dir(&params.output)?;
    let ctx: Arc<dyn ExecutionContext> = Arc::new(LocalContext::new());

    tracing::info!(repo = %params.repo, tree_ish = %params.tree_ish, "archive stage started");
    let artifact = scratch::scoped(&defaults.scratch_root, |pads| {
        archive_in(&params, defaults, &source, &output_dir, &ctx, pads)
    })
    .map_err(stage_error)?;

    log_status!("archive", "Package {} created", artifact.path);
    tracing::info!(path = %artifact.path, "archive stage finished");
    Ok(artifact)
}
