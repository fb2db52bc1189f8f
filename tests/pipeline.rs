//! End-to-end runs of every stage against local directories.
//!
//! "Remote" hosts are served by [`LoopbackConnector`], which runs their
//! commands on this machine under the host's name.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

use cooly::archive::{self, ArchiveParams};
use cooly::build::{self, BuildParams};
use cooly::defaults::Defaults;
use cooly::install::{self, InstallParams};
use cooly::listing::{self, ListParams};
use cooly::rollback::{self, RollbackParams};
use cooly::ssh::CommandOutput;
use cooly::{
    Connector, Error, ErrorCategory, ErrorCode, ExecutionContext, HostPolicy, LocalContext, Target,
};
use tempfile::TempDir;

struct LoopbackContext {
    target: Target,
    inner: LocalContext,
}

impl ExecutionContext for LoopbackContext {
    fn target(&self) -> &Target {
        &self.target
    }

    fn run(&self, command: &str) -> CommandOutput {
        self.inner.run(command)
    }

    fn upload(&self, local_path: &Path, remote_path: &str) -> cooly::Result<()> {
        self.inner.upload(local_path, remote_path)
    }

    fn fetch(&self, remote_path: &str, local_path: &Path) -> cooly::Result<()> {
        self.inner.fetch(remote_path, local_path)
    }

    fn resolve_glob(&self, dir: &str, pattern: &str) -> cooly::Result<String> {
        self.inner.resolve_glob(dir, pattern)
    }
}

/// Runs every host locally; hosts listed in `down` refuse to connect.
#[derive(Default)]
struct LoopbackConnector {
    down: Vec<String>,
    contacted: Mutex<Vec<String>>,
}

impl LoopbackConnector {
    fn with_down(hosts: &[&str]) -> Self {
        Self {
            down: hosts.iter().map(|h| h.to_string()).collect(),
            ..Default::default()
        }
    }

    fn contacted(&self) -> Vec<String> {
        self.contacted.lock().unwrap().clone()
    }
}

impl Connector for LoopbackConnector {
    fn connect(&self, target: &Target) -> cooly::Result<Arc<dyn ExecutionContext>> {
        self.contacted.lock().unwrap().push(target.label().to_string());
        if self.down.iter().any(|h| h == target.label()) {
            return Err(Error::ssh_host_invalid(target.label(), "connection refused"));
        }
        Ok(Arc::new(LoopbackContext {
            target: target.clone(),
            inner: LocalContext::new(),
        }))
    }
}

fn sh(dir: &Path, script: &str) {
    let status = Command::new("sh")
        .arg("-c")
        .arg(script)
        .current_dir(dir)
        .status()
        .unwrap();
    assert!(status.success(), "`{}` failed", script);
}

fn write_executable(path: &Path, content: &str) {
    fs::write(path, content).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn as_str(path: &Path) -> String {
    path.to_str().unwrap().to_string()
}

fn defaults_with_scratch(scratch: &Path) -> Defaults {
    Defaults {
        scratch_root: as_str(scratch),
        ..Defaults::default()
    }
}

fn scratch_is_empty(scratch: &Path) -> bool {
    fs::read_dir(scratch).unwrap().next().is_none()
}

/// A distribution whose installer copies the bundle into its target directory.
fn make_dist(dir: &Path, stem: &str) -> PathBuf {
    let bundle = dir.join(stem);
    fs::create_dir_all(&bundle).unwrap();
    fs::write(bundle.join("app.txt"), stem).unwrap();
    write_executable(
        &bundle.join("install.sh"),
        "#!/bin/sh\nset -e\nmkdir -p \"$1\"\ncp app.txt \"$1/\"\n",
    );
    sh(dir, &format!("tar czf {stem}.tar.gz {stem}"));
    dir.join(format!("{}.tar.gz", stem))
}

/// Version directories with strictly increasing modification times, oldest first.
fn seed_versions(root: &Path, names: &[&str]) {
    for (i, name) in names.iter().enumerate() {
        fs::create_dir_all(root.join(name)).unwrap();
        sh(root, &format!("touch -d '2020-01-0{} 00:00:00' {}", i + 1, name));
    }
}

fn current_target(root: &Path) -> PathBuf {
    fs::read_link(root.join("current")).unwrap()
}

#[test]
fn archive_names_package_from_template() {
    if !git_available() {
        return;
    }
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let repo = work.path().join("proj");
    fs::create_dir(&repo).unwrap();
    fs::write(repo.join("setup.py"), "print('stub')\n").unwrap();
    fs::write(repo.join("README"), "hello\n").unwrap();
    sh(
        &repo,
        "git init -q . && git add . && git -c user.name=t -c user.email=t@example.com commit -q -m init",
    );

    let out = work.path().join("out");
    let params = ArchiveParams {
        repo: format!("local@{}", repo.display()),
        name: Some("proj".into()),
        version: Some("1.0".into()),
        tree_ish: "HEAD".into(),
        name_format: "{name}-{version}-{tree_ish}".into(),
        output: as_str(&out),
    };
    let package = archive::run(&params, &defaults_with_scratch(scratch.path())).unwrap();

    assert_eq!(package.path, as_str(&out.join("proj-1.0-HEAD.tar.gz")));
    assert!(out.join("proj-1.0-HEAD.tar.gz").is_file());
    assert!(scratch_is_empty(scratch.path()));
}

#[test]
fn archive_probes_metadata_when_not_given() {
    if !git_available() {
        return;
    }
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let repo = work.path().join("proj");
    fs::create_dir(&repo).unwrap();
    fs::write(repo.join("setup.py"), "").unwrap();
    sh(
        &repo,
        "git init -q . && git add . && git -c user.name=t -c user.email=t@example.com commit -q -m init",
    );

    let defaults = Defaults {
        metadata_probe: "printf 'warning: noise\\nprobed\\n2.5\\n'".into(),
        ..defaults_with_scratch(scratch.path())
    };
    let params = ArchiveParams {
        repo: format!("file://{}", repo.display()),
        name: None,
        version: None,
        tree_ish: "HEAD".into(),
        name_format: "{name}-{version}".into(),
        output: as_str(work.path()),
    };
    let package = archive::run(&params, &defaults).unwrap();

    assert_eq!(package.name, "probed");
    assert_eq!(package.version, "2.5");
    assert!(work.path().join("probed-2.5.tar.gz").is_file());
}

/// A committed repository at `dir/proj` with a `setup.py` and a README.
fn committed_repo(dir: &Path) -> PathBuf {
    let repo = dir.join("proj");
    fs::create_dir(&repo).unwrap();
    fs::write(repo.join("setup.py"), "").unwrap();
    fs::write(repo.join("README"), "hello\n").unwrap();
    sh(
        &repo,
        "git init -q . && git add . && git -c user.name=t -c user.email=t@example.com commit -q -m init",
    );
    repo
}

fn remote_params(repo: &Path, tree_ish: &str, out: &Path) -> ArchiveParams {
    ArchiveParams {
        repo: format!("remote@{}", repo.display()),
        name: Some("proj".into()),
        version: Some("1.0".into()),
        tree_ish: tree_ish.into(),
        name_format: "{name}-{version}".into(),
        output: as_str(out),
    }
}

#[test]
fn archive_clones_remote_source_into_scratch() {
    if !git_available() {
        return;
    }
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let repo = committed_repo(work.path());
    let out = work.path().join("out");

    let package = archive::run(
        &remote_params(&repo, "HEAD", &out),
        &defaults_with_scratch(scratch.path()),
    )
    .unwrap();

    assert_eq!(package.path, as_str(&out.join("proj-1.0.tar.gz")));
    assert!(out.join("proj-1.0.tar.gz").is_file());
    assert!(scratch_is_empty(scratch.path()));
}

#[test]
fn archive_failing_after_clone_releases_scratch() {
    if !git_available() {
        return;
    }
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let repo = committed_repo(work.path());
    let out = work.path().join("out");

    let err = archive::run(
        &remote_params(&repo, "no-such-revision", &out),
        &defaults_with_scratch(scratch.path()),
    )
    .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Archive);
    assert_eq!(err.details["causeCode"], "exec.command_failed");
    assert!(scratch_is_empty(scratch.path()));
}

#[test]
fn archive_branch_with_slash_stays_one_file() {
    if !git_available() {
        return;
    }
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let repo = committed_repo(work.path());
    sh(&repo, "git branch release/1.0");
    let out = work.path().join("out");

    let params = ArchiveParams {
        repo: format!("local@{}", repo.display()),
        name: Some("proj".into()),
        version: Some("1.0".into()),
        tree_ish: "release/1.0".into(),
        name_format: "{name}-{version}-{tree_ish}".into(),
        output: as_str(&out),
    };
    let package = archive::run(&params, &defaults_with_scratch(scratch.path())).unwrap();

    assert_eq!(package.path, as_str(&out.join("proj-1.0-release-1.0.tar.gz")));
    assert!(out.join("proj-1.0-release-1.0.tar.gz").is_file());
    assert_eq!(package.tree_ish, "release/1.0");
}

#[test]
fn build_fetches_newest_distribution_and_cleans_scratch() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();

    let src = work.path().join("src");
    fs::create_dir(&src).unwrap();
    fs::write(src.join("setup.py"), "").unwrap();
    sh(work.path(), "tar czf proj-1.0.tar.gz -C src .");

    let toolbin = work.path().join("bin");
    fs::create_dir(&toolbin).unwrap();
    write_executable(
        &toolbin.join("platter"),
        "#!/bin/sh\nset -e\nmkdir -p dist/proj-1.0\ncp setup.py dist/proj-1.0/\necho \"$@\" > dist/proj-1.0/args\ntar czf dist/proj-1.0.tar.gz -C dist proj-1.0\n",
    );

    let output = work.path().join("dist");
    let params = BuildParams {
        package: as_str(&work.path().join("proj-1.0.tar.gz")),
        host: None,
        toolbin: as_str(&toolbin),
        output: as_str(&output),
        requirements: Some("requirements.txt".into()),
        ..Default::default()
    };
    let dist = build::run(
        &params,
        &LoopbackConnector::default(),
        &defaults_with_scratch(scratch.path()),
    )
    .unwrap();

    let file = Path::new(&dist.path).file_name().unwrap().to_string_lossy().to_string();
    assert!(file.starts_with("proj-1.0-"), "{}", file);
    assert!(file.ends_with(".tar.gz"));
    assert!(Path::new(&dist.path).is_file());
    assert_eq!(dist.host, "local");
    assert!(scratch_is_empty(scratch.path()));
}

#[test]
fn failing_build_tool_is_a_build_error_and_cleans_scratch() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    fs::write(work.path().join("README"), "x").unwrap();
    sh(work.path(), "tar czf proj-1.0.tar.gz README");

    let toolbin = work.path().join("bin");
    fs::create_dir(&toolbin).unwrap();
    write_executable(&toolbin.join("platter"), "#!/bin/sh\necho broken >&2\nexit 7\n");

    let err = build::run(
        &BuildParams {
            package: as_str(&work.path().join("proj-1.0.tar.gz")),
            toolbin: as_str(&toolbin),
            output: as_str(&work.path().join("dist")),
            ..Default::default()
        },
        &LoopbackConnector::default(),
        &defaults_with_scratch(scratch.path()),
    )
    .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Build);
    assert_eq!(err.details["causeCode"], "exec.command_failed");
    assert_eq!(err.details["cause"]["exitCode"], 7);
    assert!(scratch_is_empty(scratch.path()));
}

#[test]
fn install_switches_current_and_prunes_oldest() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let root = work.path().join("srv");
    seed_versions(&root, &["v1", "v2", "v3"]);
    std::os::unix::fs::symlink(root.join("v3"), root.join("current")).unwrap();

    let dist = make_dist(work.path(), "app-2.0-20260101000000");
    let connector = LoopbackConnector::default();
    let report = install::run(
        &InstallParams {
            dist: as_str(&dist),
            hosts: vec!["a".into()],
            path: as_str(&root),
            max_versions: Some(2),
            ..Default::default()
        },
        &connector,
        &defaults_with_scratch(scratch.path()),
    )
    .unwrap();

    assert_eq!(report.summary.succeeded, 1);
    let installed = report.results[0].result.as_ref().unwrap();
    assert_eq!(installed.version, "app-2.0-20260101000000");
    assert_eq!(installed.pruned, vec!["v2".to_string(), "v1".to_string()]);

    assert_eq!(current_target(&root), root.join("app-2.0-20260101000000"));
    assert!(root.join("app-2.0-20260101000000/app.txt").is_file());
    assert!(root.join("v3").is_dir());
    assert!(!root.join("v2").exists());
    assert!(!root.join("v1").exists());
    assert!(scratch_is_empty(scratch.path()));
}

#[test]
fn install_aborts_at_first_failing_host() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let root = work.path().join("srv");
    let dist = make_dist(work.path(), "app-1.0");
    let connector = LoopbackConnector::with_down(&["b"]);

    let err = install::run(
        &InstallParams {
            dist: as_str(&dist),
            hosts: vec!["a".into(), "b".into(), "c".into()],
            path: as_str(&root),
            ..Default::default()
        },
        &connector,
        &defaults_with_scratch(scratch.path()),
    )
    .unwrap_err();

    assert_eq!(err.code, ErrorCode::SshHostInvalid);
    assert!(err.hints.iter().any(|h| h.message.contains("not attempted: c")));
    assert_eq!(connector.contacted(), vec!["a", "b"]);
    assert_eq!(current_target(&root), root.join("app-1.0"));
}

#[test]
fn install_can_continue_past_failing_hosts() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let dist = make_dist(work.path(), "app-1.0");
    let connector = LoopbackConnector::with_down(&["a"]);

    let report = install::run(
        &InstallParams {
            dist: as_str(&dist),
            hosts: vec!["a".into(), "b".into()],
            path: as_str(&work.path().join("srv")),
            policy: HostPolicy::SequentialContinue,
            ..Default::default()
        },
        &connector,
        &defaults_with_scratch(scratch.path()),
    )
    .unwrap();

    assert!(report.has_failures());
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.succeeded, 1);
    assert_eq!(report.results[0].id, "a");
    assert_eq!(report.results[0].code.as_deref(), Some("ssh.host_invalid"));
    assert_eq!(connector.contacted(), vec!["a", "b"]);
}

#[test]
fn invalid_retention_touches_nothing() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let root = work.path().join("srv");
    seed_versions(&root, &["v1", "v2"]);
    let dist = make_dist(work.path(), "app-1.0");
    let connector = LoopbackConnector::default();

    let err = install::run(
        &InstallParams {
            dist: as_str(&dist),
            hosts: vec!["a".into()],
            path: as_str(&root),
            max_versions: Some(0),
            ..Default::default()
        },
        &connector,
        &defaults_with_scratch(scratch.path()),
    )
    .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Configuration);
    assert!(connector.contacted().is_empty());
    assert!(root.join("v1").is_dir());
    assert!(!root.join("app-1.0").exists());
}

#[test]
fn failed_installer_leaves_current_and_cleans_scratch() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let root = work.path().join("srv");
    seed_versions(&root, &["v1"]);
    std::os::unix::fs::symlink(root.join("v1"), root.join("current")).unwrap();

    let bundle = work.path().join("bad-1.0");
    fs::create_dir(&bundle).unwrap();
    write_executable(&bundle.join("install.sh"), "#!/bin/sh\nexit 1\n");
    sh(work.path(), "tar czf bad-1.0.tar.gz bad-1.0");

    let err = install::run(
        &InstallParams {
            dist: as_str(&work.path().join("bad-1.0.tar.gz")),
            hosts: vec!["a".into()],
            path: as_str(&root),
            ..Default::default()
        },
        &LoopbackConnector::default(),
        &defaults_with_scratch(scratch.path()),
    )
    .unwrap_err();

    assert_eq!(err.code, ErrorCode::CommandFailed);
    assert_eq!(err.details["target"]["host"], "a");
    assert_eq!(current_target(&root), root.join("v1"));
    assert!(scratch_is_empty(scratch.path()));
}

#[test]
fn list_reports_aliases_and_current() {
    let work = TempDir::new().unwrap();
    let root = work.path().join("srv");
    seed_versions(&root, &["v1", "v2", "v3"]);
    std::os::unix::fs::symlink(root.join("v3"), root.join("current")).unwrap();

    let report = listing::run(
        &ListParams {
            hosts: vec!["a".into()],
            path: as_str(&root),
            ..Default::default()
        },
        &LoopbackConnector::default(),
        &Defaults::default(),
    )
    .unwrap();

    let host = report.results[0].result.as_ref().unwrap();
    let pairs: Vec<(&str, &str)> = host
        .versions
        .iter()
        .map(|v| (v.alias.as_str(), v.version.as_str()))
        .collect();
    assert_eq!(
        pairs,
        vec![("LATEST", "v3"), ("LATEST~1", "v2"), ("LATEST~2", "v1")]
    );
    assert_eq!(host.current.as_deref(), Some("v3"));
}

#[test]
fn list_without_hosts_reads_local_root() {
    let work = TempDir::new().unwrap();
    let root = work.path().join("srv");
    seed_versions(&root, &["v1"]);
    let connector = LoopbackConnector::default();

    let report = listing::run(
        &ListParams {
            path: as_str(&root),
            ..Default::default()
        },
        &connector,
        &Defaults::default(),
    )
    .unwrap();

    assert_eq!(report.results[0].id, "local");
    assert_eq!(connector.contacted(), vec!["local"]);
}

#[test]
fn rollback_to_previous_alias_keeps_every_version() {
    let work = TempDir::new().unwrap();
    let root = work.path().join("srv");
    seed_versions(&root, &["v1", "v2", "v3"]);
    std::os::unix::fs::symlink(root.join("v3"), root.join("current")).unwrap();

    let report = rollback::run(
        &RollbackParams {
            hosts: vec!["a".into()],
            path: as_str(&root),
            version: "LATEST~1".into(),
            ..Default::default()
        },
        &LoopbackConnector::default(),
        &Defaults::default(),
    )
    .unwrap();

    let rolled = report.results[0].result.as_ref().unwrap();
    assert_eq!(rolled.version, "v2");
    assert_eq!(rolled.previous.as_deref(), Some("v3"));
    assert_eq!(current_target(&root), root.join("v2"));
    for v in ["v1", "v2", "v3"] {
        assert!(root.join(v).is_dir());
    }
}

#[test]
fn rollback_runs_post_command_after_switch() {
    let work = TempDir::new().unwrap();
    let root = work.path().join("srv");
    seed_versions(&root, &["v1", "v2"]);
    let marker = work.path().join("marker");

    rollback::run(
        &RollbackParams {
            hosts: vec!["a".into()],
            path: as_str(&root),
            version: "v1".into(),
            post_command: Some(format!(
                "readlink '{}' > '{}'",
                root.join("current").display(),
                marker.display()
            )),
            ..Default::default()
        },
        &LoopbackConnector::default(),
        &Defaults::default(),
    )
    .unwrap();

    let recorded = fs::read_to_string(&marker).unwrap();
    assert_eq!(recorded.trim(), as_str(&root.join("v1")));
}

#[test]
fn rollback_to_unknown_version_leaves_current() {
    let work = TempDir::new().unwrap();
    let root = work.path().join("srv");
    seed_versions(&root, &["v1", "v2", "v3"]);
    std::os::unix::fs::symlink(root.join("v3"), root.join("current")).unwrap();

    for token in ["nonexistent", "LATEST~3", "current"] {
        let err = rollback::run(
            &RollbackParams {
                hosts: vec!["a".into()],
                path: as_str(&root),
                version: token.into(),
                ..Default::default()
            },
            &LoopbackConnector::default(),
            &Defaults::default(),
        )
        .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::NotFound, "{}", token);
        assert_eq!(err.details["requested"], token);
        assert_eq!(err.details["searchPath"], as_str(&root));
        assert_eq!(current_target(&root), root.join("v3"));
    }
}
