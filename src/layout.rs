use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::ResolvedConfig;
use crate::domain::{FlowcellId, Organism};
use crate::error::IntakeError;
use crate::fs_util::{self, fs_err};

pub const STAGING_DIR: &str = "0.FASTQ";
pub const SPLIT_DIR: &str = "1.Data";
pub const RESULTS_DIR: &str = "2.Results";
pub const INFO_DIR: &str = "3.Info";
pub const SAMPLESHEET_NAME: &str = "samplesheet.csv";
pub const LEDGER_NAME: &str = "stages.json";
pub const LOCK_NAME: &str = ".intake.lock";

/// Relative to the per-flowcell results directory.
pub const COMPLETION_MARKER: [&str; 4] = ["results", "multiqc", "hisat2", "multiqc_report.html"];

/// Fixed directory layout under the work directory plus the cold-storage root.
#[derive(Debug, Clone)]
pub struct Layout {
    work_dir: Utf8PathBuf,
    archive_root: Utf8PathBuf,
}

impl Layout {
    pub fn new(work_dir: Utf8PathBuf, archive_root: Utf8PathBuf) -> Self {
        Self {
            work_dir,
            archive_root,
        }
    }

    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(config.work_dir.clone(), config.archive_root.clone())
    }

    pub fn work_dir(&self) -> &Utf8Path {
        &self.work_dir
    }

    pub fn archive_root(&self) -> &Utf8Path {
        &self.archive_root
    }

    pub fn staging_root(&self) -> Utf8PathBuf {
        self.work_dir.join(STAGING_DIR)
    }

    pub fn staging_dir(&self, flowcell: &FlowcellId) -> Utf8PathBuf {
        self.staging_root().join(flowcell.as_str())
    }

    pub fn split_root(&self) -> Utf8PathBuf {
        self.work_dir.join(SPLIT_DIR)
    }

    pub fn split_dir(&self, organism: &Organism, flowcell: &FlowcellId) -> Utf8PathBuf {
        self.split_root()
            .join(organism.as_str())
            .join(flowcell.as_str())
    }

    pub fn results_root(&self) -> Utf8PathBuf {
        self.work_dir.join(RESULTS_DIR)
    }

    pub fn results_dir(&self, organism: &Organism, flowcell: &FlowcellId) -> Utf8PathBuf {
        self.results_root()
            .join(organism.as_str())
            .join(flowcell.as_str())
    }

    pub fn pipeline_work_dir(&self, organism: &Organism, flowcell: &FlowcellId) -> Utf8PathBuf {
        self.results_dir(organism, flowcell).join("work")
    }

    pub fn pipeline_output_dir(&self, organism: &Organism, flowcell: &FlowcellId) -> Utf8PathBuf {
        self.results_dir(organism, flowcell).join("results")
    }

    pub fn pipeline_cache_dir(&self, organism: &Organism, flowcell: &FlowcellId) -> Utf8PathBuf {
        self.results_dir(organism, flowcell).join("cache")
    }

    pub fn pipeline_log(&self, organism: &Organism, flowcell: &FlowcellId) -> Utf8PathBuf {
        self.pipeline_output_dir(organism, flowcell)
            .join("process.log")
    }

    /// Nextflow console output; kept off stdout so `--json` reports stay parseable.
    pub fn pipeline_console_log(&self, organism: &Organism, flowcell: &FlowcellId) -> Utf8PathBuf {
        self.results_dir(organism, flowcell).join("nextflow.stdout.log")
    }

    pub fn samplesheet_path(&self, organism: &Organism, flowcell: &FlowcellId) -> Utf8PathBuf {
        self.results_dir(organism, flowcell).join(SAMPLESHEET_NAME)
    }

    pub fn completion_marker(&self, organism: &Organism, flowcell: &FlowcellId) -> Utf8PathBuf {
        COMPLETION_MARKER
            .iter()
            .fold(self.results_dir(organism, flowcell), |path, part| {
                path.join(part)
            })
    }

    pub fn info_dir(&self) -> Utf8PathBuf {
        self.work_dir.join(INFO_DIR)
    }

    pub fn sheet_path(&self, sheet_name: &str) -> Utf8PathBuf {
        self.info_dir().join(sheet_name)
    }

    pub fn ledger_path(&self) -> Utf8PathBuf {
        self.info_dir().join(LEDGER_NAME)
    }

    pub fn lock_path(&self) -> Utf8PathBuf {
        self.work_dir.join(LOCK_NAME)
    }

    pub fn archive_dir(&self, organism: &Organism, flowcell: &FlowcellId) -> Utf8PathBuf {
        self.archive_root
            .join(organism.as_str())
            .join(flowcell.as_str())
    }

    /// Organism directory names under `root` that contain a `flowcell` subdirectory.
    fn organisms_holding(
        root: &Utf8Path,
        flowcell: &FlowcellId,
    ) -> Result<Vec<String>, IntakeError> {
        Ok(fs_util::list_subdirs(root)?
            .into_iter()
            .filter(|dir| dir.join(flowcell.as_str()).as_std_path().is_dir())
            .filter_map(|dir| dir.file_name().map(str::to_string))
            .collect())
    }

    /// Raw organism directory names under the split root holding this flowcell.
    pub fn split_organisms(&self, flowcell: &FlowcellId) -> Result<Vec<String>, IntakeError> {
        Self::organisms_holding(&self.split_root(), flowcell)
    }

    pub fn archived_organisms(&self, flowcell: &FlowcellId) -> Result<Vec<String>, IntakeError> {
        Self::organisms_holding(&self.archive_root, flowcell)
    }

    pub fn is_split(&self, flowcell: &FlowcellId) -> Result<bool, IntakeError> {
        Ok(!self.split_organisms(flowcell)?.is_empty())
    }

    pub fn is_archived(&self, flowcell: &FlowcellId) -> Result<bool, IntakeError> {
        Ok(!self.archived_organisms(flowcell)?.is_empty())
    }

    pub fn ensure_work_dir(&self) -> Result<(), IntakeError> {
        for dir in [
            self.staging_root(),
            self.split_root(),
            self.results_root(),
            self.info_dir(),
        ] {
            fs::create_dir_all(&dir).map_err(|err| fs_err(format!("create {dir}"), err))?;
        }
        Ok(())
    }
}
