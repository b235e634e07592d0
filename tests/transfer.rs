#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use flowcell_intake::config::{RemoteConfig, ResolvedTransfer};
use flowcell_intake::domain::FlowcellId;
use flowcell_intake::error::IntakeError;
use flowcell_intake::layout::Layout;
use flowcell_intake::transfer::{FileTransferAgent, RsyncTransferAgent, TransferOutcome};

const PASSWORD_ENV: &str = "FC_INTAKE_TEST_SSH_PASSWORD";

struct Fixture {
    _temp: tempfile::TempDir,
    root: Utf8PathBuf,
    layout: Layout,
    flowcell: FlowcellId,
}

fn fixture() -> Fixture {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let layout = Layout::new(root.join("work"), root.join("cold"));
    fs::create_dir_all(root.join("bin")).unwrap();
    Fixture {
        _temp: temp,
        layout,
        flowcell: "250515_A00926_0879_BHTN75DMXY".parse().unwrap(),
        root,
    }
}

fn script(path: Utf8PathBuf, body: &str) -> PathBuf {
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path.into_std_path_buf()
}

/// Records its arguments one per line, then exits with `code`.
fn fake_rsync(root: &Utf8Path, code: i32) -> PathBuf {
    let log = root.join("rsync.args");
    script(
        root.join("bin/rsync"),
        &format!("for arg in \"$@\"; do echo \"$arg\" >> {log}; done\nexit {code}"),
    )
}

/// Records the password it was handed, then runs the wrapped command like `sshpass -e`.
fn fake_sshpass(root: &Utf8Path) -> PathBuf {
    let log = root.join("sshpass.env");
    script(
        root.join("bin/sshpass"),
        &format!("printf '%s' \"$SSHPASS\" > {log}\nshift\nexec \"$@\""),
    )
}

fn settings(source_roots: Vec<Utf8PathBuf>, remote: Option<RemoteConfig>) -> ResolvedTransfer {
    ResolvedTransfer {
        source_roots,
        suffix: "_fastq4".to_string(),
        remote,
    }
}

fn remote(password_env: &str) -> RemoteConfig {
    RemoteConfig {
        host: "seq01".to_string(),
        user: "intake".to_string(),
        root: "/data/FASTQS/".to_string(),
        password_env: password_env.to_string(),
    }
}

fn rsync_args(root: &Utf8Path) -> Vec<String> {
    fs::read_to_string(root.join("rsync.args"))
        .map(|content| content.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

#[test]
fn mounted_source_is_preferred_over_remote() {
    let fx = fixture();
    let source_root = fx.root.join("cephfs/FASTQS");
    fs::create_dir_all(source_root.join(format!("{}_fastq4", fx.flowcell))).unwrap();
    let agent = RsyncTransferAgent::with_tools(
        settings(vec![fx.root.join("empty"), source_root.clone()], Some(remote(PASSWORD_ENV))),
        Some(fake_rsync(&fx.root, 0)),
        Some(fake_sshpass(&fx.root)),
    );

    let outcome = agent.fetch_flowcell(&fx.flowcell, &fx.layout);

    assert_eq!(outcome, TransferOutcome::Transferred);
    assert_eq!(
        rsync_args(&fx.root),
        vec![
            "-r".to_string(),
            "--ignore-existing".to_string(),
            format!("{source_root}/{}_fastq4/", fx.flowcell),
            fx.layout.staging_dir(&fx.flowcell).to_string(),
        ]
    );
    assert!(!fx.root.join("sshpass.env").as_std_path().exists());
    assert!(fx.layout.staging_dir(&fx.flowcell).as_std_path().is_dir());
}

#[test]
fn remote_source_goes_through_sshpass() {
    let fx = fixture();
    // SAFETY: no other test in this binary reads or writes this variable.
    unsafe { std::env::set_var(PASSWORD_ENV, "s3cret") };
    let agent = RsyncTransferAgent::with_tools(
        settings(Vec::new(), Some(remote(PASSWORD_ENV))),
        Some(fake_rsync(&fx.root, 0)),
        Some(fake_sshpass(&fx.root)),
    );

    let outcome = agent.fetch_flowcell(&fx.flowcell, &fx.layout);

    assert_eq!(outcome, TransferOutcome::Transferred);
    assert_eq!(
        fs::read_to_string(fx.root.join("sshpass.env")).unwrap(),
        "s3cret"
    );
    let args = rsync_args(&fx.root);
    assert_eq!(
        args[2],
        format!("intake@seq01:/data/FASTQS/{}_fastq4/", fx.flowcell)
    );
    assert!(!args.iter().any(|arg| arg.contains("s3cret")));
}

#[test]
fn no_mounted_source_and_no_remote_fails() {
    let fx = fixture();
    let agent = RsyncTransferAgent::with_tools(
        settings(vec![fx.root.join("empty")], None),
        Some(fake_rsync(&fx.root, 0)),
        None,
    );

    let outcome = agent.fetch_flowcell(&fx.flowcell, &fx.layout);

    assert_matches!(outcome, TransferOutcome::Failed { reason } if reason.contains("no remote configured"));
    assert!(rsync_args(&fx.root).is_empty());
}

#[test]
fn unset_password_variable_fails_before_rsync() {
    let fx = fixture();
    let agent = RsyncTransferAgent::with_tools(
        settings(Vec::new(), Some(remote("FC_INTAKE_TEST_NEVER_SET"))),
        Some(fake_rsync(&fx.root, 0)),
        Some(fake_sshpass(&fx.root)),
    );

    let outcome = agent.fetch_flowcell(&fx.flowcell, &fx.layout);

    assert_matches!(outcome, TransferOutcome::Failed { reason } if reason.contains("FC_INTAKE_TEST_NEVER_SET"));
    assert!(rsync_args(&fx.root).is_empty());
}

#[test]
fn rsync_exit_code_is_a_failed_transfer() {
    let fx = fixture();
    let source_root = fx.root.join("cephfs");
    fs::create_dir_all(source_root.join(format!("{}_fastq4", fx.flowcell))).unwrap();
    let agent = RsyncTransferAgent::with_tools(
        settings(vec![source_root], None),
        Some(fake_rsync(&fx.root, 23)),
        None,
    );

    let outcome = agent.fetch_flowcell(&fx.flowcell, &fx.layout);

    assert_matches!(outcome, TransferOutcome::Failed { reason } if reason.contains("exited with 23"));
}

#[test]
fn missing_rsync_is_a_failed_transfer() {
    let fx = fixture();
    let source_root = fx.root.join("cephfs");
    fs::create_dir_all(source_root.join(format!("{}_fastq4", fx.flowcell))).unwrap();
    let agent = RsyncTransferAgent::with_tools(settings(vec![source_root], None), None, None);

    let outcome = agent.fetch_flowcell(&fx.flowcell, &fx.layout);

    assert_matches!(outcome, TransferOutcome::Failed { reason } if reason.contains("rsync"));
}

#[test]
fn staged_fastq_skips_rsync() {
    let fx = fixture();
    let staging = fx.layout.staging_dir(&fx.flowcell);
    fs::create_dir_all(&staging).unwrap();
    fs::write(staging.join("S1_S1_R1_001.fastq.gz"), "r1").unwrap();
    let agent = RsyncTransferAgent::with_tools(
        settings(Vec::new(), None),
        Some(fake_rsync(&fx.root, 0)),
        None,
    );

    assert_eq!(
        agent.fetch_flowcell(&fx.flowcell, &fx.layout),
        TransferOutcome::AlreadyStaged
    );
    assert!(rsync_args(&fx.root).is_empty());
}

#[test]
fn failed_sheet_sync_keeps_local_copy() {
    let fx = fixture();
    let local = fx.layout.sheet_path("results_parsing.csv");
    fs::create_dir_all(local.parent().unwrap()).unwrap();
    fs::write(&local, "Flowcell,Sample_ID\n").unwrap();
    let agent = RsyncTransferAgent::with_tools(
        settings(Vec::new(), None),
        Some(fake_rsync(&fx.root, 12)),
        None,
    );

    let err = agent
        .sync_sheet("ceph:/Parse_df/results_parsing.csv", &local)
        .unwrap_err();

    assert_matches!(err, IntakeError::Transfer(_));
    assert_eq!(fs::read_to_string(&local).unwrap(), "Flowcell,Sample_ID\n");
    assert_eq!(
        rsync_args(&fx.root),
        vec!["ceph:/Parse_df/results_parsing.csv".to_string(), local.to_string()]
    );
}
