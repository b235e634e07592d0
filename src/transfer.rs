use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{RemoteConfig, ResolvedTransfer};
use crate::domain::FlowcellId;
use crate::error::IntakeError;
use crate::fs_util::{self, fs_err};
use crate::layout::Layout;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferOutcome {
    /// FASTQ files already sit in a per-organism split directory.
    AlreadySplit,
    /// FASTQ files already sit in the staging directory.
    AlreadyStaged,
    Transferred,
    Failed { reason: String },
}

impl TransferOutcome {
    pub fn needs_split(&self) -> bool {
        matches!(self, TransferOutcome::AlreadyStaged | TransferOutcome::Transferred)
    }
}

pub trait FileTransferAgent {
    /// Makes the raw data of `flowcell` available locally. Never errors: failures are
    /// reported as [`TransferOutcome::Failed`].
    fn fetch_flowcell(&self, flowcell: &FlowcellId, layout: &Layout) -> TransferOutcome;

    /// Copies the metadata sheet from `remote` to `local`.
    fn sync_sheet(&self, remote: &str, local: &Utf8Path) -> Result<(), IntakeError>;
}

pub fn is_read_fastq(name: &str) -> bool {
    name.ends_with(".fastq.gz") && (name.contains("_R1") || name.contains("_R2"))
}

/// Where a flowcell's FASTQ files currently live, final location first.
pub fn locate_existing(
    flowcell: &FlowcellId,
    layout: &Layout,
) -> Result<Option<TransferOutcome>, IntakeError> {
    for organism in layout.split_organisms(flowcell)? {
        let dir = layout.split_root().join(&organism).join(flowcell.as_str());
        if !fs_util::find_files(&dir, is_read_fastq)?.is_empty() {
            return Ok(Some(TransferOutcome::AlreadySplit));
        }
        warn!(%flowcell, %organism, "split directory holds no FASTQ files");
    }
    let staging = layout.staging_dir(flowcell);
    if !fs_util::find_files(&staging, is_read_fastq)?.is_empty() {
        return Ok(Some(TransferOutcome::AlreadyStaged));
    }
    Ok(None)
}

#[derive(Clone)]
pub struct RsyncTransferAgent {
    settings: ResolvedTransfer,
    rsync: Option<PathBuf>,
    sshpass: Option<PathBuf>,
}

impl RsyncTransferAgent {
    pub fn new(settings: ResolvedTransfer) -> Self {
        Self::with_tools(settings, find_in_path("rsync"), find_in_path("sshpass"))
    }

    pub fn with_tools(
        settings: ResolvedTransfer,
        rsync: Option<PathBuf>,
        sshpass: Option<PathBuf>,
    ) -> Self {
        Self {
            settings,
            rsync,
            sshpass,
        }
    }

    fn require_rsync(&self) -> Result<&PathBuf, IntakeError> {
        self.rsync
            .as_ref()
            .ok_or_else(|| IntakeError::MissingTool("rsync".to_string()))
    }

    fn local_source(&self, flowcell: &FlowcellId) -> Option<Utf8PathBuf> {
        let name = format!("{}{}", flowcell.as_str(), self.settings.suffix);
        self.settings
            .source_roots
            .iter()
            .map(|root| root.join(&name))
            .find(|path| path.as_std_path().is_dir())
    }

    fn remote_source(&self, remote: &RemoteConfig, flowcell: &FlowcellId) -> String {
        format!(
            "{}@{}:{}/{}{}/",
            remote.user,
            remote.host,
            remote.root.trim_end_matches('/'),
            flowcell.as_str(),
            self.settings.suffix
        )
    }

    fn transfer(&self, flowcell: &FlowcellId, destination: &Utf8Path) -> Result<(), IntakeError> {
        let rsync = self.require_rsync()?;
        let sync_args = |source: String| {
            vec![
                "-r".to_string(),
                "--ignore-existing".to_string(),
                source,
                destination.to_string(),
            ]
        };

        if let Some(source) = self.local_source(flowcell) {
            info!(%flowcell, %source, "syncing FASTQ from mounted store");
            return run_cmd(rsync, &sync_args(format!("{source}/")), &[]);
        }

        let remote = self.settings.remote.as_ref().ok_or_else(|| {
            IntakeError::Transfer(format!(
                "{flowcell}{} not found under any source root and no remote configured",
                self.settings.suffix
            ))
        })?;
        let sshpass = self
            .sshpass
            .as_ref()
            .ok_or_else(|| IntakeError::MissingTool("sshpass".to_string()))?;
        let password = std::env::var(&remote.password_env).map_err(|_| {
            IntakeError::Transfer(format!(
                "environment variable {} is not set",
                remote.password_env
            ))
        })?;

        let source = self.remote_source(remote, flowcell);
        info!(%flowcell, %source, "syncing FASTQ from remote host");
        let mut args = vec!["-e".to_string(), rsync.to_string_lossy().to_string()];
        args.extend(sync_args(source));
        run_cmd(sshpass, &args, &[("SSHPASS", password.as_str())])
    }
}

impl FileTransferAgent for RsyncTransferAgent {
    fn fetch_flowcell(&self, flowcell: &FlowcellId, layout: &Layout) -> TransferOutcome {
        match locate_existing(flowcell, layout) {
            Ok(Some(found)) => {
                info!(%flowcell, outcome = ?found, "FASTQ files already present, skipping rsync");
                return found;
            }
            Ok(None) => {}
            Err(err) => {
                return TransferOutcome::Failed {
                    reason: err.to_string(),
                };
            }
        }

        let destination = layout.staging_dir(flowcell);
        if let Err(err) = fs::create_dir_all(&destination) {
            return TransferOutcome::Failed {
                reason: fs_err(format!("create {destination}"), err).to_string(),
            };
        }
        match self.transfer(flowcell, &destination) {
            Ok(()) => {
                info!(%flowcell, %destination, "rsync complete");
                TransferOutcome::Transferred
            }
            Err(err) => TransferOutcome::Failed {
                reason: err.to_string(),
            },
        }
    }

    fn sync_sheet(&self, remote: &str, local: &Utf8Path) -> Result<(), IntakeError> {
        let rsync = self.require_rsync()?;
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).map_err(|err| fs_err(format!("create {parent}"), err))?;
        }
        run_cmd(rsync, &[remote.to_string(), local.to_string()], &[])
    }
}

fn run_cmd(program: &Path, args: &[String], envs: &[(&str, &str)]) -> Result<(), IntakeError> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    for (key, value) in envs {
        cmd.env(key, value);
    }
    let output = cmd
        .output()
        .map_err(|err| IntakeError::Transfer(err.to_string()))?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let code = output
        .status
        .code()
        .map(|code| code.to_string())
        .unwrap_or_else(|| "signal".to_string());
    let message = if stderr.is_empty() {
        format!("{} exited with {code}", program.display())
    } else {
        format!("{} exited with {code}: {stderr}", program.display())
    };
    Err(IntakeError::Transfer(message))
}

pub(crate) fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_fastq_names() {
        assert!(is_read_fastq("S1_S1_R1_001.fastq.gz"));
        assert!(is_read_fastq("S1_S1_L001_R2_001.fastq.gz"));
        assert!(!is_read_fastq("S1_S1_I1_001.fastq.gz"));
        assert!(!is_read_fastq("S1_S1_R1_001.fastq"));
    }
}
