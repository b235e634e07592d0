use serde::Serialize;
use tracing::{error, info, warn};

use crate::catalog::MetadataCatalog;
use crate::config::ResolvedConfig;
use crate::domain::{FlowcellId, Organism};
use crate::error::IntakeError;
use crate::layout::Layout;
use crate::ledger::{RunLock, StageLedger, StageRecord};
use crate::pipeline::{CancelToken, PipelineInvoker};
use crate::resolver::{
    FlowcellOutcome, FlowcellStateResolver, FlowcellStatus, PartitionStage, ResolverOptions,
    flowcell_status,
};
use crate::samplesheet::{SamplesheetBuilder, SamplesheetOutcome};
use crate::transfer::FileTransferAgent;

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub flowcells: Vec<FlowcellOutcome>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn count(&self, predicate: impl Fn(&FlowcellStatus) -> bool) -> usize {
        self.flowcells
            .iter()
            .filter(|outcome| predicate(&outcome.status))
            .count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub flowcells: Vec<FlowcellStatusEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowcellStatusEntry {
    pub flowcell: FlowcellId,
    pub partitions: Vec<PartitionStage>,
    pub recorded: Vec<StageRecord>,
}

pub struct App<T: FileTransferAgent, P: PipelineInvoker> {
    config: ResolvedConfig,
    resolver: FlowcellStateResolver<T, P>,
    cancel: CancelToken,
}

impl<T: FileTransferAgent, P: PipelineInvoker> App<T, P> {
    pub fn new(config: ResolvedConfig, transfer: T, pipeline: P) -> Self {
        let cancel = CancelToken::new();
        let options = ResolverOptions {
            delete_original: config.delete_original,
            archive_on_pipeline_failure: config.archive_on_pipeline_failure,
        };
        let resolver =
            FlowcellStateResolver::new(Layout::from_config(&config), transfer, pipeline, options)
                .with_cancel_token(cancel.clone());
        Self {
            config,
            resolver,
            cancel,
        }
    }

    pub fn layout(&self) -> &Layout {
        self.resolver.layout()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Refreshes the local metadata sheet (best effort) and loads it.
    pub fn load_catalog(&self, sync: bool) -> Result<MetadataCatalog, IntakeError> {
        let local = self.layout().sheet_path(&self.config.sheet_name);
        if sync {
            if let Some(remote) = &self.config.remote_sheet {
                match self.resolver.transfer().sync_sheet(remote, &local) {
                    Ok(()) => info!(%local, "metadata sheet synced"),
                    Err(err) => {
                        error!(%remote, error = %err, "metadata sheet sync failed, using local copy")
                    }
                }
            }
        }
        MetadataCatalog::load(&local, &self.config.assay_types)
    }

    /// Advances every catalog flowcell (or just `only`), newest first. A failing flowcell
    /// is logged and the run moves on.
    pub fn run(&self, only: Option<&FlowcellId>) -> Result<RunReport, IntakeError> {
        self.layout().ensure_work_dir()?;
        let _lock = RunLock::acquire(&self.layout().lock_path())?;
        let mut ledger = StageLedger::load(&self.layout().ledger_path())?;
        let catalog = self.load_catalog(true)?;

        let flowcells = match only {
            Some(flowcell) => {
                if !catalog.contains(flowcell) {
                    warn!(%flowcell, "flowcell not present in the metadata sheet");
                }
                vec![flowcell.clone()]
            }
            None => catalog.flowcells(),
        };
        info!(count = flowcells.len(), "flowcells to inspect");

        let mut report = RunReport {
            flowcells: Vec::with_capacity(flowcells.len()),
            cancelled: false,
        };
        for flowcell in &flowcells {
            if self.cancel.is_cancelled() {
                warn!("run cancelled, remaining flowcells left for the next run");
                report.cancelled = true;
                break;
            }
            info!(%flowcell, "inspecting flowcell");
            let outcome = self
                .resolver
                .resolve_and_advance(flowcell, &catalog, &mut ledger)
                .unwrap_or_else(|err| {
                    error!(%flowcell, error = %err, "flowcell processing failed");
                    FlowcellOutcome::error(flowcell, &err)
                });
            report.flowcells.push(outcome);
        }
        Ok(report)
    }

    /// Stages derived from disk next to the last recorded ones. Reads the local sheet only.
    pub fn status(&self, only: Option<&FlowcellId>) -> Result<StatusReport, IntakeError> {
        let ledger = StageLedger::load(&self.layout().ledger_path())?;
        let flowcells = match only {
            Some(flowcell) => vec![flowcell.clone()],
            None => self.load_catalog(false)?.flowcells(),
        };

        let mut entries = Vec::with_capacity(flowcells.len());
        for flowcell in flowcells {
            entries.push(FlowcellStatusEntry {
                partitions: flowcell_status(self.layout(), &flowcell)?,
                recorded: ledger.records_for(&flowcell).into_iter().cloned().collect(),
                flowcell,
            });
        }
        Ok(StatusReport { flowcells: entries })
    }

    pub fn samplesheet(
        &self,
        flowcell: &FlowcellId,
        organism: &Organism,
    ) -> Result<SamplesheetOutcome, IntakeError> {
        SamplesheetBuilder::new(self.layout()).build(flowcell, organism)
    }
}
