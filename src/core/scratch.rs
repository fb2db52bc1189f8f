//! Scratchpads: temporary working directories that are always cleaned up.
//!
//! A [`Scratchpads`] registry belongs to exactly one top-level operation.
//! Directories are removed newest-first by [`Scratchpads::release_all`], which
//! runs on every exit path (explicitly via [`scoped`], and again on drop as a
//! no-op safety net once the registry is empty).

use std::sync::Arc;

use serde::Serialize;

use crate::context::{ExecutionContext, Target};
use crate::error::Result;
use crate::utils::shell;

/// An allocated temporary directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scratchpad {
    pub path: String,
    pub target: Target,
    pub order: u64,
}

struct Entry {
    pad: Scratchpad,
    ctx: Arc<dyn ExecutionContext>,
}

/// Failure to remove one scratchpad during cleanup.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseFailure {
    pub path: String,
    pub host: String,
    pub error: String,
}

pub struct Scratchpads {
    root: String,
    next_order: u64,
    entries: Vec<Entry>,
}

impl Scratchpads {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            next_order: 0,
            entries: Vec::new(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Create a uniquely named directory under the scratch root in `ctx` and register it.
    pub fn allocate(&mut self, purpose: &str, ctx: &Arc<dyn ExecutionContext>) -> Result<Scratchpad> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let name = if purpose.is_empty() {
            format!("cooly-{}", id)
        } else {
            format!("cooly-{}-{}", purpose, id)
        };
        let path = format!("{}/{}", self.root.trim_end_matches('/'), name);

        // Plain `mkdir` on the leaf so an existing directory is never adopted.
        let command = format!(
            "mkdir -p {} && mkdir {}",
            shell::quote_path(&self.root),
            shell::quote_path(&path)
        );
        ctx.run_checked(&command)?;

        let pad = Scratchpad {
            path,
            target: ctx.target().clone(),
            order: self.next_order,
        };
        self.next_order += 1;

        tracing::debug!(path = %pad.path, host = %pad.target, order = pad.order, "scratchpad allocated");
        self.entries.push(Entry {
            pad: pad.clone(),
            ctx: Arc::clone(ctx),
        });

        Ok(pad)
    }

    /// Remove one scratchpad now (success path), dropping it from the registry.
    pub fn release(&mut self, pad: &Scratchpad) -> Result<()> {
        let Some(index) = self
            .entries
            .iter()
            .position(|e| e.pad.order == pad.order && e.pad.path == pad.path)
        else {
            return Ok(());
        };

        let entry = self.entries.remove(index);
        remove_dir(&entry)
    }

    /// Remove every registered scratchpad, most recently allocated first.
    ///
    /// Failures are logged and collected; they never stop the remaining removals.
    pub fn release_all(&mut self) -> Vec<ReleaseFailure> {
        let mut failures = Vec::new();

        while let Some(entry) = self.entries.pop() {
            if let Err(err) = remove_dir(&entry) {
                tracing::warn!(
                    path = %entry.pad.path,
                    host = %entry.pad.target,
                    error = %err,
                    "failed to remove scratchpad"
                );
                log_status!(
                    "cleanup",
                    "Could not remove {} on {}: {}",
                    entry.pad.path,
                    entry.pad.target,
                    err
                );
                failures.push(ReleaseFailure {
                    path: entry.pad.path.clone(),
                    host: entry.pad.target.label().to_string(),
                    error: err.message,
                });
            }
        }

        failures
    }

    pub fn active(&self) -> Vec<Scratchpad> {
        self.entries.iter().map(|e| e.pad.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Drop for Scratchpads {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            self.release_all();
        }
    }
}

fn remove_dir(entry: &Entry) -> Result<()> {
    tracing::debug!(path = %entry.pad.path, host = %entry.pad.target, "scratchpad released");
    entry
        .ctx
        .run_checked(&format!("rm -rf {}", shell::quote_path(&entry.pad.path)))
        .map(|_| ())
}

/// Run `f` with a fresh registry and release everything it allocated, whatever the outcome.
pub fn scoped<T>(root: &str, f: impl FnOnce(&mut Scratchpads) -> Result<T>) -> Result<T> {
    let mut pads = Scratchpads::new(root);
    let result = f(&mut pads);
    pads.release_all();
    result
}
