use std::fs;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::catalog::MetadataCatalog;
use crate::domain::{FlowcellId, Organism};
use crate::error::IntakeError;
use crate::fs_util::{self, fs_err};
use crate::layout::Layout;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SplitOutcome {
    /// A split directory for this flowcell already exists; nothing was touched.
    AlreadySplit,
    /// The staging directory holds no sample FASTQ files.
    NoFastq,
    Split {
        moved: usize,
        expected: usize,
        organisms: Vec<Organism>,
        source_removed: bool,
    },
}

pub fn is_undetermined(name: &str) -> bool {
    name.contains("Undetermined")
}

/// Sample FASTQ in a staging directory: `<sample>_S<n>...fastq.gz`.
pub fn is_sample_fastq(name: &str) -> bool {
    name.ends_with(".fastq.gz") && name.contains("_S") && !is_undetermined(name)
}

fn belongs_to_sample(name: &str, sample_id: &str) -> bool {
    name.strip_prefix(sample_id)
        .map(|rest| rest.starts_with("_S") && rest.ends_with(".fastq.gz"))
        .unwrap_or(false)
}

pub struct OrganismSplitter<'a> {
    layout: &'a Layout,
}

impl<'a> OrganismSplitter<'a> {
    pub fn new(layout: &'a Layout) -> Self {
        Self { layout }
    }

    pub fn split(
        &self,
        catalog: &MetadataCatalog,
        flowcell: &FlowcellId,
        delete_original: bool,
    ) -> Result<SplitOutcome, IntakeError> {
        if self.layout.is_split(flowcell)? {
            info!(%flowcell, "flowcell already split");
            return Ok(SplitOutcome::AlreadySplit);
        }

        let samples = catalog.samples_by_organism(flowcell)?;
        let source = self.layout.staging_dir(flowcell);
        if !source.as_std_path().is_dir() {
            return Err(IntakeError::MissingInput(format!(
                "FASTQ directory not found: {source}"
            )));
        }

        let staged = fs_util::list_files(&source, is_sample_fastq)?;
        let expected = staged.len();
        if expected == 0 {
            warn!(%flowcell, %source, "no FASTQ files in staging directory");
            return Ok(SplitOutcome::NoFastq);
        }

        let organisms = samples.keys().cloned().collect::<Vec<_>>();
        info!(
            %flowcell,
            organisms = %organisms.iter().map(Organism::as_str).collect::<Vec<_>>().join(", "),
            expected,
            "splitting flowcell by organism"
        );

        let mut moved = 0usize;
        for (organism, sample_ids) in &samples {
            let target = self.layout.split_dir(organism, flowcell);
            fs::create_dir_all(&target).map_err(|err| fs_err(format!("create {target}"), err))?;

            for sample_id in sample_ids {
                for file in staged.iter().filter(|file| {
                    file.file_name()
                        .map(|name| belongs_to_sample(name, sample_id))
                        .unwrap_or(false)
                }) {
                    let Some(name) = file.file_name() else {
                        continue;
                    };
                    if !file.as_std_path().exists() {
                        continue;
                    }
                    match fs_util::move_path(file, &target.join(name)) {
                        Ok(()) => moved += 1,
                        Err(err) => error!(%flowcell, file = %file, error = %err, "failed to move FASTQ"),
                    }
                }
            }
        }

        let mut source_removed = false;
        if delete_original {
            if moved == expected {
                match fs::remove_dir_all(&source) {
                    Ok(()) => {
                        info!(%flowcell, %source, "staging directory deleted");
                        source_removed = true;
                    }
                    Err(err) => error!(%flowcell, %source, error = %err, "failed to delete staging directory"),
                }
            } else {
                warn!(
                    %flowcell,
                    moved,
                    expected,
                    %source,
                    "not all files were moved, staging directory kept"
                );
            }
        }

        Ok(SplitOutcome::Split {
            moved,
            expected,
            organisms,
            source_removed,
        })
    }
}
