use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::archive::{ArchiveMover, ArchiveOutcome};
use crate::catalog::MetadataCatalog;
use crate::domain::{FlowcellId, Organism, ProcessingStage};
use crate::error::IntakeError;
use crate::fs_util;
use crate::layout::Layout;
use crate::ledger::StageLedger;
use crate::pipeline::{CancelToken, PipelineInvoker, PipelineOutcome, PipelineRequest};
use crate::samplesheet::SamplesheetBuilder;
use crate::splitter::{OrganismSplitter, SplitOutcome};
use crate::transfer::{FileTransferAgent, TransferOutcome};

#[derive(Debug, Clone, Copy)]
pub struct ResolverOptions {
    /// Remove the staging directory once every expected file was split.
    pub delete_original: bool,
    /// Archive a partition even when its pipeline run did not produce the completion marker.
    pub archive_on_pipeline_failure: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            delete_original: true,
            archive_on_pipeline_failure: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowcellStatus {
    /// An archive already exists for this flowcell; nothing was done.
    Archived,
    TransferFailed { reason: String },
    /// No organism partition exists after transfer and split.
    NoPartitions,
    Processed,
    Error { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrganismOutcome {
    Skipped {
        reason: String,
    },
    Failed {
        stage: ProcessingStage,
        reason: String,
    },
    /// Pipeline ran (or was skipped) without producing the completion marker; not archived.
    PipelineIncomplete {
        pipeline: Option<PipelineOutcome>,
    },
    Archived {
        pipeline: Option<PipelineOutcome>,
        archive: ArchiveOutcome,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganismReport {
    pub organism: String,
    pub outcome: OrganismOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowcellOutcome {
    pub flowcell: FlowcellId,
    pub status: FlowcellStatus,
    pub transfer: Option<TransferOutcome>,
    pub split: Option<SplitOutcome>,
    pub organisms: Vec<OrganismReport>,
}

impl FlowcellOutcome {
    fn new(flowcell: &FlowcellId, status: FlowcellStatus) -> Self {
        Self {
            flowcell: flowcell.clone(),
            status,
            transfer: None,
            split: None,
            organisms: Vec::new(),
        }
    }

    pub fn error(flowcell: &FlowcellId, err: &IntakeError) -> Self {
        Self::new(
            flowcell,
            FlowcellStatus::Error {
                reason: err.to_string(),
            },
        )
    }
}

/// Derived stage of one partition, as seen on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionStage {
    pub organism: Option<String>,
    pub stage: ProcessingStage,
}

/// Works out where a flowcell stands from the filesystem and runs the next stages in order.
pub struct FlowcellStateResolver<T: FileTransferAgent, P: PipelineInvoker> {
    layout: Layout,
    transfer: T,
    pipeline: P,
    options: ResolverOptions,
    cancel: CancelToken,
}

impl<T: FileTransferAgent, P: PipelineInvoker> FlowcellStateResolver<T, P> {
    pub fn new(layout: Layout, transfer: T, pipeline: P, options: ResolverOptions) -> Self {
        Self {
            layout,
            transfer,
            pipeline,
            options,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn transfer(&self) -> &T {
        &self.transfer
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub fn resolve_and_advance(
        &self,
        flowcell: &FlowcellId,
        catalog: &MetadataCatalog,
        ledger: &mut StageLedger,
    ) -> Result<FlowcellOutcome, IntakeError> {
        if self.layout.is_archived(flowcell)? {
            info!(%flowcell, "flowcell already archived, skipping");
            ledger.record(flowcell, None, ProcessingStage::Archived)?;
            return Ok(FlowcellOutcome::new(flowcell, FlowcellStatus::Archived));
        }

        let mut outcome = FlowcellOutcome::new(flowcell, FlowcellStatus::Processed);

        if !self.layout.is_split(flowcell)? {
            let transfer = self.transfer.fetch_flowcell(flowcell, &self.layout);
            if let TransferOutcome::Failed { reason } = &transfer {
                error!(%flowcell, %reason, "FASTQ transfer failed, skipping flowcell");
                ledger.record(flowcell, None, ProcessingStage::NotFetched)?;
                outcome.status = FlowcellStatus::TransferFailed {
                    reason: reason.clone(),
                };
                outcome.transfer = Some(transfer);
                return Ok(outcome);
            }

            if transfer.needs_split() {
                ledger.record(flowcell, None, ProcessingStage::Fetched)?;
                let split = OrganismSplitter::new(&self.layout).split(
                    catalog,
                    flowcell,
                    self.options.delete_original,
                )?;
                outcome.split = Some(split);
            }
            outcome.transfer = Some(transfer);
        }

        let organisms = self.layout.split_organisms(flowcell)?;
        if organisms.is_empty() {
            warn!(%flowcell, "no organism directories found for flowcell");
            outcome.status = FlowcellStatus::NoPartitions;
            return Ok(outcome);
        }
        ledger.record(flowcell, None, ProcessingStage::Split)?;

        for name in organisms {
            if self.cancel.is_cancelled() {
                outcome.organisms.push(OrganismReport {
                    organism: name,
                    outcome: OrganismOutcome::Skipped {
                        reason: "cancelled".to_string(),
                    },
                });
                continue;
            }
            let organism_outcome = match self.partition_organism(&name) {
                Ok(organism) => self.advance_organism(flowcell, &organism, ledger)?,
                Err(reason) => {
                    warn!(%flowcell, organism = %name, %reason, "skipping organism");
                    OrganismOutcome::Skipped { reason }
                }
            };
            outcome.organisms.push(OrganismReport {
                organism: name,
                outcome: organism_outcome,
            });
        }

        Ok(outcome)
    }

    fn partition_organism(&self, name: &str) -> Result<Organism, String> {
        let organism = name.parse::<Organism>().map_err(|err| err.to_string())?;
        if organism.as_str() != name {
            return Err(format!("directory name is not a normalized organism ({organism})"));
        }
        organism.reference().map_err(|err| err.to_string())?;
        Ok(organism)
    }

    fn advance_organism(
        &self,
        flowcell: &FlowcellId,
        organism: &Organism,
        ledger: &mut StageLedger,
    ) -> Result<OrganismOutcome, IntakeError> {
        let reference = organism.reference()?;
        info!(%flowcell, %organism, %reference, "processing organism partition");
        ledger.record(
            flowcell,
            Some(organism),
            self.derive_stage(flowcell, organism),
        )?;

        let samplesheet = match SamplesheetBuilder::new(&self.layout).build(flowcell, organism) {
            Ok(samplesheet) => samplesheet,
            Err(err) => {
                error!(%flowcell, %organism, error = %err, "samplesheet generation failed");
                return Ok(OrganismOutcome::Failed {
                    stage: ProcessingStage::Split,
                    reason: err.to_string(),
                });
            }
        };

        let marker = self.layout.completion_marker(organism, flowcell);
        let pipeline = if marker.as_std_path().exists() {
            info!(%flowcell, %organism, %marker, "completion marker present, pipeline skipped");
            None
        } else {
            ledger.record(flowcell, Some(organism), ProcessingStage::PipelineRunning)?;
            let mut request = PipelineRequest::new(&self.layout, flowcell, organism, reference);
            request.samplesheet = samplesheet.path().to_path_buf();
            Some(self.pipeline.run(&request, &self.cancel))
        };

        if !marker.as_std_path().exists() {
            if matches!(pipeline, Some(PipelineOutcome::Completed)) {
                warn!(%flowcell, %organism, %marker, "pipeline exited cleanly without completion marker");
            }
            if !self.options.archive_on_pipeline_failure {
                warn!(%flowcell, %organism, "pipeline incomplete, partition not archived");
                return Ok(OrganismOutcome::PipelineIncomplete { pipeline });
            }
        } else {
            ledger.record(flowcell, Some(organism), ProcessingStage::PipelineDone)?;
        }

        let archive = match ArchiveMover::new(&self.layout).archive(flowcell, organism) {
            Ok(archive) => archive,
            Err(err) => {
                error!(%flowcell, %organism, error = %err, "archival failed");
                return Ok(OrganismOutcome::Failed {
                    stage: ProcessingStage::PipelineDone,
                    reason: err.to_string(),
                });
            }
        };
        if let ArchiveOutcome::Failed { reason } = &archive {
            error!(%flowcell, %organism, %reason, "archival failed");
        }
        ledger.record(
            flowcell,
            Some(organism),
            self.derive_stage(flowcell, organism),
        )?;
        Ok(OrganismOutcome::Archived { pipeline, archive })
    }

    pub fn derive_stage(&self, flowcell: &FlowcellId, organism: &Organism) -> ProcessingStage {
        derive_stage(&self.layout, flowcell, organism)
    }
}

/// Stage of a (flowcell, organism) partition, read from directory existence and the
/// completion marker.
pub fn derive_stage(layout: &Layout, flowcell: &FlowcellId, organism: &Organism) -> ProcessingStage {
    let results = layout.results_dir(organism, flowcell);
    if layout.archive_dir(organism, flowcell).as_std_path().is_dir()
        && !results.as_std_path().exists()
    {
        return ProcessingStage::Archived;
    }
    if layout.completion_marker(organism, flowcell).as_std_path().exists() {
        return ProcessingStage::PipelineDone;
    }
    if layout.pipeline_work_dir(organism, flowcell).as_std_path().is_dir() {
        return ProcessingStage::PipelineRunning;
    }
    if layout.split_dir(organism, flowcell).as_std_path().is_dir() {
        return ProcessingStage::Split;
    }
    if layout.staging_dir(flowcell).as_std_path().is_dir() {
        return ProcessingStage::Fetched;
    }
    ProcessingStage::NotFetched
}

/// Stages of every partition of `flowcell` found under the split, results or archive roots.
/// A flowcell without partitions is reported as a single flowcell-level stage.
pub fn flowcell_status(
    layout: &Layout,
    flowcell: &FlowcellId,
) -> Result<Vec<PartitionStage>, IntakeError> {
    let mut names = BTreeSet::new();
    names.extend(layout.split_organisms(flowcell)?);
    names.extend(layout.archived_organisms(flowcell)?);
    for dir in fs_util::list_subdirs(&layout.results_root())? {
        if dir.join(flowcell.as_str()).as_std_path().is_dir() {
            if let Some(name) = dir.file_name() {
                names.insert(name.to_string());
            }
        }
    }

    let stages = names
        .into_iter()
        .filter_map(|name| {
            let organism = name.parse::<Organism>().ok()?;
            Some(PartitionStage {
                stage: derive_stage(layout, flowcell, &organism),
                organism: Some(name),
            })
        })
        .collect::<Vec<_>>();
    if !stages.is_empty() {
        return Ok(stages);
    }

    let stage = if layout.staging_dir(flowcell).as_std_path().is_dir() {
        ProcessingStage::Fetched
    } else {
        ProcessingStage::NotFetched
    };
    Ok(vec![PartitionStage {
        organism: None,
        stage,
    }])
}
