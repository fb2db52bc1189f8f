//! Run one unit of work per host.
//!
//! Hosts are visited in list order. Each host gets its own execution context
//! and its own scratchpad registry, released before the next host starts.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::{Connector, ExecutionContext, Target};
use crate::error::{Error, Result};
use crate::output::BulkResult;
use crate::scratch::{self, Scratchpads};

/// Per-host outcomes of a multi-host operation, in host-list order.
pub type HostReport<T> = BulkResult<T>;

/// What to do with the remaining hosts once one fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostPolicy {
    /// Stop at the first failure; later hosts are never touched.
    #[default]
    SequentialAbort,
    /// Record the failure and move on to the next host.
    SequentialContinue,
    /// All hosts at once, one thread each.
    Parallel,
}

impl HostPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostPolicy::SequentialAbort => "sequential-abort",
            HostPolicy::SequentialContinue => "sequential-continue",
            HostPolicy::Parallel => "parallel",
        }
    }
}

impl fmt::Display for HostPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "sequential-abort" => Ok(HostPolicy::SequentialAbort),
            "sequential-continue" => Ok(HostPolicy::SequentialContinue),
            "parallel" => Ok(HostPolicy::Parallel),
            other => Err(Error::config_invalid_value(
                "policy",
                Some(other.to_string()),
                "expected one of: sequential-abort, sequential-continue, parallel",
            )),
        }
    }
}

/// Remote targets for every host name. Blank entries are dropped.
pub fn remote_targets(hosts: &[String]) -> Vec<Target> {
    hosts
        .iter()
        .map(|h| Target::from_host(Some(h)))
        .filter(|t| *t != Target::Local)
        .collect()
}

/// Like [`remote_targets`], but an empty list means the local machine.
pub fn targets_or_local(hosts: &[String]) -> Vec<Target> {
    let targets = remote_targets(hosts);
    if targets.is_empty() {
        vec![Target::Local]
    } else {
        targets
    }
}

fn run_one<T, F>(target: &Target, connector: &dyn Connector, scratch_root: &str, unit: &F) -> Result<T>
where
    F: Fn(&Arc<dyn ExecutionContext>, &mut Scratchpads) -> Result<T>,
{
    tracing::info!(host = %target, "host started");
    let ctx = connector.connect(target)?;
    let result = scratch::scoped(scratch_root, |pads| unit(&ctx, pads));
    match &result {
        Ok(_) => tracing::info!(host = %target, "host finished"),
        Err(err) => tracing::warn!(host = %target, code = err.code.as_str(), error = %err, "host failed"),
    }
    result
}

fn abort_hint(failed: &Target, skipped: &[Target]) -> String {
    if skipped.is_empty() {
        format!("Failed on host '{}'", failed)
    } else {
        let names: Vec<&str> = skipped.iter().map(Target::label).collect();
        format!(
            "Failed on host '{}'; not attempted: {}",
            failed,
            names.join(", ")
        )
    }
}

/// Invoke `unit` once per target according to `policy`.
///
/// Under [`HostPolicy::SequentialAbort`] the first failure is returned as the
/// error. The other policies always return a report, with failures recorded
/// per host.
pub fn run_on_hosts<T, F>(
    action: &str,
    targets: &[Target],
    policy: HostPolicy,
    connector: &dyn Connector,
    scratch_root: &str,
    unit: F,
) -> Result<HostReport<T>>
where
    T: Serialize + Send,
    F: Fn(&Arc<dyn ExecutionContext>, &mut Scratchpads) -> Result<T> + Sync,
{
    let mut report = HostReport::new(action);

    match policy {
        HostPolicy::SequentialAbort => {
            for (index, target) in targets.iter().enumerate() {
                match run_one(target, connector, scratch_root, &unit) {
                    Ok(value) => report.record_success(target.label(), value),
                    Err(err) => {
                        let skipped = &targets[index + 1..];
                        return Err(err.with_hint(abort_hint(target, skipped)));
                    }
                }
            }
        }
        HostPolicy::SequentialContinue => {
            for target in targets {
                match run_one(target, connector, scratch_root, &unit) {
                    Ok(value) => report.record_success(target.label(), value),
                    Err(err) => report.record_error(target.label(), &err),
                }
            }
        }
        HostPolicy::Parallel => {
            let unit = &unit;
            let outcomes: Vec<Result<T>> = std::thread::scope(|scope| {
                let handles: Vec<_> = targets
                    .iter()
                    .map(|target| {
                        scope.spawn(move || run_one(target, connector, scratch_root, unit))
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|handle| {
                        handle.join().unwrap_or_else(|_| {
                            Err(Error::internal_unexpected("host worker thread panicked"))
                        })
                    })
                    .collect()
            });

            for (target, outcome) in targets.iter().zip(outcomes) {
                match outcome {
                    Ok(value) => report.record_success(target.label(), value),
                    Err(err) => report.record_error(target.label(), &err),
                }
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LocalContext;
    use crate::error::ErrorCode;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Hands out local contexts and remembers which targets were connected.
    struct LocalConnector {
        seen: Mutex<Vec<String>>,
    }

    impl LocalConnector {
        fn new() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Connector for LocalConnector {
        fn connect(&self, target: &Target) -> Result<Arc<dyn ExecutionContext>> {
            self.seen.lock().unwrap().push(target.label().to_string());
            Ok(Arc::new(LocalContext::new()))
        }
    }

    fn targets(names: &[&str]) -> Vec<Target> {
        names.iter().map(|n| Target::Remote(n.to_string())).collect()
    }

    /// Succeeds on every call except the second one.
    fn fail_second_call() -> impl Fn(&Arc<dyn ExecutionContext>, &mut Scratchpads) -> Result<String> + Sync {
        let calls = Mutex::new(0usize);
        move |ctx: &Arc<dyn ExecutionContext>, _: &mut Scratchpads| {
            let mut n = calls.lock().unwrap();
            *n += 1;
            if *n == 2 {
                ctx.run_checked("exit 7").map(|_| String::new())
            } else {
                Ok(format!("call {}", *n))
            }
        }
    }

    #[test]
    fn policy_parses_and_displays() {
        for policy in [
            HostPolicy::SequentialAbort,
            HostPolicy::SequentialContinue,
            HostPolicy::Parallel,
        ] {
            assert_eq!(policy.as_str().parse::<HostPolicy>().unwrap(), policy);
        }
        assert_eq!(HostPolicy::default(), HostPolicy::SequentialAbort);

        let err = "round-robin".parse::<HostPolicy>().unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalidValue);
    }

    #[test]
    fn empty_host_list_means_local_only_where_allowed() {
        assert!(remote_targets(&[]).is_empty());
        assert!(remote_targets(&["  ".to_string()]).is_empty());
        assert_eq!(targets_or_local(&[]), vec![Target::Local]);
        assert_eq!(
            targets_or_local(&["a".to_string()]),
            vec![Target::Remote("a".to_string())]
        );
    }

    #[test]
    fn sequential_abort_stops_at_first_failure() {
        let scratch = TempDir::new().unwrap();
        let connector = LocalConnector::new();

        let err = run_on_hosts(
            "install",
            &targets(&["a", "b", "c"]),
            HostPolicy::SequentialAbort,
            &connector,
            scratch.path().to_str().unwrap(),
            fail_second_call(),
        )
        .unwrap_err();

        assert_eq!(err.code, ErrorCode::CommandFailed);
        assert_eq!(*connector.seen.lock().unwrap(), vec!["a", "b"]);
        assert!(err.hints.iter().any(|h| h.message.contains("'b'") && h.message.contains("c")));
    }

    #[test]
    fn sequential_continue_records_every_host() {
        let scratch = TempDir::new().unwrap();
        let connector = LocalConnector::new();

        let report = run_on_hosts(
            "install",
            &targets(&["a", "b", "c"]),
            HostPolicy::SequentialContinue,
            &connector,
            scratch.path().to_str().unwrap(),
            fail_second_call(),
        )
        .unwrap();

        assert_eq!(*connector.seen.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(report.summary.succeeded, 2);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.results[1].id, "b");
        assert_eq!(report.results[1].code.as_deref(), Some("exec.command_failed"));
        assert!(report.has_failures());
    }

    #[test]
    fn parallel_reports_in_host_order() {
        let scratch = TempDir::new().unwrap();
        let connector = LocalConnector::new();

        let report = run_on_hosts(
            "list",
            &targets(&["a", "b", "c", "d"]),
            HostPolicy::Parallel,
            &connector,
            scratch.path().to_str().unwrap(),
            |ctx, _| ctx.run_checked("echo ok").map(|o| o.stdout.trim().to_string()),
        )
        .unwrap();

        let ids: Vec<&str> = report.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert_eq!(report.summary.succeeded, 4);
    }

    #[test]
    fn scratchpads_are_released_per_host_even_on_failure() {
        let scratch = TempDir::new().unwrap();
        let root = scratch.path().join("pads");
        let connector = LocalConnector::new();

        let result = run_on_hosts(
            "build",
            &targets(&["a"]),
            HostPolicy::SequentialAbort,
            &connector,
            root.to_str().unwrap(),
            |ctx, pads| -> Result<()> {
                pads.allocate("work", ctx)?;
                Err(Error::internal_unexpected("boom"))
            },
        );

        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    }
}
