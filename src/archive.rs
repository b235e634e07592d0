use std::fs;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::domain::{FlowcellId, Organism};
use crate::error::IntakeError;
use crate::fs_util::{self, fs_err};
use crate::layout::Layout;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArchiveOutcome {
    SourceMissing,
    /// The whole results directory was relocated.
    Moved { raw_removed: bool },
    /// Destination existed; items were merged without overwriting.
    Merged {
        moved: usize,
        skipped: usize,
        source_removed: bool,
        raw_removed: bool,
    },
    Failed { reason: String },
}

/// Relocates finished results of one partition to cold storage.
pub struct ArchiveMover<'a> {
    layout: &'a Layout,
}

impl<'a> ArchiveMover<'a> {
    pub fn new(layout: &'a Layout) -> Self {
        Self { layout }
    }

    pub fn archive(
        &self,
        flowcell: &FlowcellId,
        organism: &Organism,
    ) -> Result<ArchiveOutcome, IntakeError> {
        let source = self.layout.results_dir(organism, flowcell);
        let target = self.layout.archive_dir(organism, flowcell);
        if !source.as_std_path().is_dir() {
            error!(%flowcell, %organism, %source, "results directory does not exist");
            return Ok(ArchiveOutcome::SourceMissing);
        }

        let work = self.layout.pipeline_work_dir(organism, flowcell);
        if work.as_std_path().exists() {
            info!(%flowcell, %organism, %work, "removing pipeline work directory");
            if let Err(err) = fs::remove_dir_all(&work) {
                return Ok(ArchiveOutcome::Failed {
                    reason: fs_err(format!("remove {work}"), err).to_string(),
                });
            }
        }

        let organism_dir = self.layout.archive_root().join(organism.as_str());
        fs::create_dir_all(&organism_dir)
            .map_err(|err| fs_err(format!("create {organism_dir}"), err))?;

        if !target.as_std_path().exists() {
            info!(%flowcell, %organism, %source, %target, "moving results to archive");
            if let Err(err) = fs_util::move_path(&source, &target) {
                return Ok(ArchiveOutcome::Failed {
                    reason: err.to_string(),
                });
            }
            let raw_removed = self.prune_raw(flowcell, organism)?;
            return Ok(ArchiveOutcome::Moved { raw_removed });
        }

        info!(%flowcell, %organism, %target, "archive exists, merging contents");
        let mut moved = 0usize;
        let mut skipped = 0usize;
        for item in fs_util::read_dir_sorted(&source)? {
            let Some(name) = item.file_name() else {
                continue;
            };
            let dest = target.join(name);
            if dest.as_std_path().exists() {
                info!(%dest, "item already archived, skipping");
                skipped += 1;
                continue;
            }
            if let Err(err) = fs_util::move_path(&item, &dest) {
                return Ok(ArchiveOutcome::Failed {
                    reason: err.to_string(),
                });
            }
            moved += 1;
        }

        let source_removed = fs_util::remove_empty_tree(&source)?;
        if !source_removed {
            warn!(%source, "results directory not removed because it is not empty");
        }
        let raw_removed = source_removed && self.prune_raw(flowcell, organism)?;
        Ok(ArchiveOutcome::Merged {
            moved,
            skipped,
            source_removed,
            raw_removed,
        })
    }

    fn prune_raw(&self, flowcell: &FlowcellId, organism: &Organism) -> Result<bool, IntakeError> {
        let raw = self.layout.split_dir(organism, flowcell);
        if !raw.as_std_path().exists() {
            return Ok(false);
        }
        let removed = fs_util::remove_empty_tree(&raw)?;
        if removed {
            info!(%raw, "raw partition directory removed");
        } else {
            warn!(%raw, "raw partition directory not removed because it is not empty");
        }
        Ok(removed)
    }
}
