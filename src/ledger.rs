use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{ErrorKind, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{FlowcellId, Organism, ProcessingStage};
use crate::error::IntakeError;
use crate::fs_util::{self, fs_err};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub flowcell: FlowcellId,
    /// `None` until the flowcell has been split into organism partitions.
    pub organism: Option<Organism>,
    pub stage: ProcessingStage,
    pub updated_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    records: Vec<StageRecord>,
}

/// Persisted last-known stage per (flowcell, organism). The filesystem stays authoritative;
/// every write replaces the file atomically.
#[derive(Debug)]
pub struct StageLedger {
    path: Utf8PathBuf,
    records: Vec<StageRecord>,
}

impl StageLedger {
    pub fn load(path: &Utf8Path) -> Result<Self, IntakeError> {
        let records = match fs::read_to_string(path) {
            Ok(content) => {
                serde_json::from_str::<LedgerFile>(&content)
                    .map_err(|err| IntakeError::Filesystem(format!("parse ledger {path}: {err}")))?
                    .records
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(fs_err(format!("read {path}"), err)),
        };
        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    pub fn get(&self, flowcell: &FlowcellId, organism: Option<&Organism>) -> Option<&StageRecord> {
        self.records
            .iter()
            .find(|record| &record.flowcell == flowcell && record.organism.as_ref() == organism)
    }

    pub fn records_for(&self, flowcell: &FlowcellId) -> Vec<&StageRecord> {
        self.records
            .iter()
            .filter(|record| &record.flowcell == flowcell)
            .collect()
    }

    /// Records `stage` and persists the ledger. Unchanged stages are not rewritten.
    pub fn record(
        &mut self,
        flowcell: &FlowcellId,
        organism: Option<&Organism>,
        stage: ProcessingStage,
    ) -> Result<(), IntakeError> {
        let updated_at = chrono::Utc::now().to_rfc3339();
        match self
            .records
            .iter_mut()
            .find(|record| &record.flowcell == flowcell && record.organism.as_ref() == organism)
        {
            Some(existing) if existing.stage == stage => return Ok(()),
            Some(existing) => {
                if stage < existing.stage {
                    warn!(
                        %flowcell,
                        from = %existing.stage,
                        to = %stage,
                        "stage moved backwards, filesystem wins"
                    );
                }
                existing.stage = stage;
                existing.updated_at = updated_at;
            }
            None => self.records.push(StageRecord {
                flowcell: flowcell.clone(),
                organism: organism.cloned(),
                stage,
                updated_at,
            }),
        }
        debug!(%flowcell, organism = ?organism.map(Organism::as_str), %stage, "stage recorded");
        self.save()
    }

    fn save(&self) -> Result<(), IntakeError> {
        let file = LedgerFile {
            records: self.records.clone(),
        };
        let content = serde_json::to_vec_pretty(&file)
            .map_err(|err| IntakeError::Filesystem(err.to_string()))?;
        fs_util::write_bytes_atomic(&self.path, &content)
    }
}

/// Exclusive advisory lock on a work directory. The OS drops it with the process, so a
/// killed run never blocks the next one. The lock file itself stays in place.
#[derive(Debug)]
pub struct RunLock {
    path: Utf8PathBuf,
    file: File,
}

impl RunLock {
    pub fn acquire(path: &Utf8Path) -> Result<Self, IntakeError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| fs_err(format!("create {parent}"), err))?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|err| fs_err(format!("open {path}"), err))?;
        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(IntakeError::LockHeld(path.as_std_path().to_path_buf()));
            }
            Err(TryLockError::Error(err)) => return Err(fs_err(format!("lock {path}"), err)),
        }
        file.set_len(0)
            .map_err(|err| fs_err(format!("truncate {path}"), err))?;
        writeln!(file, "{}", std::process::id())
            .map_err(|err| fs_err(format!("write {path}"), err))?;
        debug!(%path, "run lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            warn!(path = %self.path, error = %err, "failed to release run lock");
        }
    }
}
