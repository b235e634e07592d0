use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use flowcell_intake::config::ResolvedPipeline;
use flowcell_intake::domain::{FlowcellId, Organism, ReferenceGenome};
use flowcell_intake::layout::Layout;
use flowcell_intake::pipeline::{
    CancelToken, NextflowInvoker, PipelineInvoker, PipelineOutcome, PipelineRequest,
};

fn request(root: &Utf8Path) -> PipelineRequest {
    let layout = Layout::new(root.join("work"), root.join("cold"));
    let flowcell: FlowcellId = "FC1".parse().unwrap();
    let organism: Organism = "human".parse().unwrap();
    PipelineRequest::new(&layout, &flowcell, &organism, ReferenceGenome::GRCh38)
}

fn invoker(nextflow: String, timeout: Option<Duration>) -> NextflowInvoker {
    NextflowInvoker::new(
        ResolvedPipeline {
            nextflow,
            script: Utf8PathBuf::from("/soft/rnaseq/main.nf"),
            profile: "docker".to_string(),
            timeout,
        },
        Utf8PathBuf::from("/refs"),
    )
    .with_poll_interval(Duration::from_millis(20))
}

#[cfg(unix)]
fn fake_nextflow(root: &Utf8Path, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = root.join("nextflow");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string()
}

fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

#[cfg(unix)]
#[test]
fn clean_exit_completes_and_creates_run_dirs() {
    let (_temp, root) = temp_root();
    let request = request(&root);
    let outcome = invoker(fake_nextflow(&root, "exit 0"), None).run(&request, &CancelToken::new());

    assert_eq!(outcome, PipelineOutcome::Completed);
    assert!(request.work_dir.as_std_path().is_dir());
    assert!(request.cache_dir.as_std_path().is_dir());
}

#[cfg(unix)]
#[test]
fn nonzero_exit_is_a_failure() {
    let (_temp, root) = temp_root();
    let outcome = invoker(fake_nextflow(&root, "exit 3"), None)
        .run(&request(&root), &CancelToken::new());
    assert_matches!(outcome, PipelineOutcome::Failed { .. });
}

#[cfg(unix)]
#[test]
fn slow_run_times_out() {
    let (_temp, root) = temp_root();
    let outcome = invoker(
        fake_nextflow(&root, "sleep 30"),
        Some(Duration::from_millis(200)),
    )
    .run(&request(&root), &CancelToken::new());
    assert_matches!(outcome, PipelineOutcome::TimedOut { .. });
}

#[cfg(unix)]
#[test]
fn cancelled_token_stops_the_run() {
    let (_temp, root) = temp_root();
    let cancel = CancelToken::new();
    cancel.cancel();
    let outcome = invoker(fake_nextflow(&root, "sleep 30"), None).run(&request(&root), &cancel);
    assert_eq!(outcome, PipelineOutcome::Cancelled);
}

#[test]
fn missing_binary_is_reported() {
    let (_temp, root) = temp_root();
    let outcome = invoker(root.join("no-such-nextflow").to_string(), None)
        .run(&request(&root), &CancelToken::new());
    assert_matches!(outcome, PipelineOutcome::Failed { reason } if reason.contains("no-such-nextflow"));
}

#[cfg(unix)]
#[test]
fn console_output_is_kept_off_stdout() {
    let (_temp, root) = temp_root();
    let request = request(&root);
    let nextflow = fake_nextflow(&root, "echo N E X T F L O W progress\necho all done");
    let outcome = invoker(nextflow, None).run(&request, &CancelToken::new());

    assert_eq!(outcome, PipelineOutcome::Completed);
    let console = fs::read_to_string(&request.console_log).unwrap();
    assert_eq!(console, "N E X T F L O W progress\nall done\n");
}
