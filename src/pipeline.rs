use std::fs::{self, File};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::ResolvedPipeline;
use crate::domain::{FlowcellId, Organism, ReferenceGenome};
use crate::error::IntakeError;
use crate::fs_util::fs_err;
use crate::layout::Layout;

/// Shared flag checked by long-running jobs between polls.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Completed,
    Failed { reason: String },
    TimedOut { after_secs: u64 },
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub flowcell: FlowcellId,
    pub organism: Organism,
    pub reference: ReferenceGenome,
    pub samplesheet: Utf8PathBuf,
    pub work_dir: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub cache_dir: Utf8PathBuf,
    pub log_file: Utf8PathBuf,
    pub console_log: Utf8PathBuf,
}

impl PipelineRequest {
    pub fn new(
        layout: &Layout,
        flowcell: &FlowcellId,
        organism: &Organism,
        reference: ReferenceGenome,
    ) -> Self {
        Self {
            flowcell: flowcell.clone(),
            organism: organism.clone(),
            reference,
            samplesheet: layout.samplesheet_path(organism, flowcell),
            work_dir: layout.pipeline_work_dir(organism, flowcell),
            output_dir: layout.pipeline_output_dir(organism, flowcell),
            cache_dir: layout.pipeline_cache_dir(organism, flowcell),
            log_file: layout.pipeline_log(organism, flowcell),
            console_log: layout.pipeline_console_log(organism, flowcell),
        }
    }

    pub fn ensure_dirs(&self) -> Result<(), IntakeError> {
        for dir in [&self.work_dir, &self.output_dir, &self.cache_dir] {
            fs::create_dir_all(dir).map_err(|err| fs_err(format!("create {dir}"), err))?;
        }
        Ok(())
    }
}

pub trait PipelineInvoker {
    /// Runs the workflow for one organism partition and blocks until it exits, times out
    /// or is cancelled.
    fn run(&self, request: &PipelineRequest, cancel: &CancelToken) -> PipelineOutcome;
}

#[derive(Debug, Clone)]
pub struct NextflowInvoker {
    settings: ResolvedPipeline,
    reference_root: Utf8PathBuf,
    poll_interval: Duration,
}

impl NextflowInvoker {
    pub fn new(settings: ResolvedPipeline, reference_root: Utf8PathBuf) -> Self {
        Self {
            settings,
            reference_root,
            poll_interval: Duration::from_secs(5),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn reference_dir(&self, reference: ReferenceGenome) -> Utf8PathBuf {
        self.reference_root
            .join(format!("RNA_Pipeline_{}", reference.as_str()))
    }

    pub fn args(&self, request: &PipelineRequest) -> Vec<String> {
        let reference = self.reference_dir(request.reference);
        let mut args = vec![
            "-log".to_string(),
            request.log_file.to_string(),
            "run".to_string(),
            self.settings.script.to_string(),
            "-w".to_string(),
            request.work_dir.to_string(),
            "--input".to_string(),
            request.samplesheet.to_string(),
            "--outdir".to_string(),
            format!("{}/", request.output_dir),
            "-profile".to_string(),
            self.settings.profile.clone(),
            "--aligner".to_string(),
            "hisat2".to_string(),
            "--pseudo_aligner".to_string(),
            "salmon".to_string(),
        ];
        for (flag, relative) in [
            ("--fasta", "genome.fa"),
            ("--gtf", "genes.gtf"),
            ("--hisat2_index", "index/hisat2"),
            ("--salmon_index", "index/salmon"),
            ("--rsem_index", "rsem"),
            ("--gene_bed", "genes.bed"),
            ("--transcript_fasta", "genome.transcripts.fa"),
        ] {
            args.push(flag.to_string());
            args.push(reference.join(relative).to_string());
        }
        args.push("-resume".to_string());
        args
    }

    fn spawn(&self, request: &PipelineRequest) -> Result<Child, IntakeError> {
        request.ensure_dirs()?;
        let args = self.args(request);
        debug!(command = %format!("{} {}", self.settings.nextflow, args.join(" ")), "nextflow command");
        let console = File::create(&request.console_log)
            .map_err(|err| fs_err(format!("create {}", request.console_log), err))?;
        Command::new(&self.settings.nextflow)
            .args(&args)
            .current_dir(&request.cache_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(console))
            .spawn()
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    IntakeError::MissingTool(self.settings.nextflow.clone())
                } else {
                    IntakeError::Pipeline(err.to_string())
                }
            })
    }

    fn wait(&self, mut child: Child, cancel: &CancelToken) -> Result<PipelineOutcome, IntakeError> {
        let started = Instant::now();
        loop {
            if let Some(status) = child
                .try_wait()
                .map_err(|err| IntakeError::Pipeline(err.to_string()))?
            {
                if status.success() {
                    return Ok(PipelineOutcome::Completed);
                }
                return Ok(PipelineOutcome::Failed {
                    reason: format!("nextflow exited with {status}"),
                });
            }
            if cancel.is_cancelled() {
                stop(&mut child);
                return Ok(PipelineOutcome::Cancelled);
            }
            if let Some(limit) = self.settings.timeout {
                if started.elapsed() >= limit {
                    stop(&mut child);
                    return Ok(PipelineOutcome::TimedOut {
                        after_secs: limit.as_secs(),
                    });
                }
            }
            thread::sleep(self.poll_interval);
        }
    }
}

fn stop(child: &mut Child) {
    if let Err(err) = child.kill() {
        warn!(error = %err, "failed to kill nextflow");
    }
    if let Err(err) = child.wait() {
        warn!(error = %err, "failed to reap nextflow");
    }
}

impl PipelineInvoker for NextflowInvoker {
    fn run(&self, request: &PipelineRequest, cancel: &CancelToken) -> PipelineOutcome {
        info!(
            flowcell = %request.flowcell,
            organism = %request.organism,
            reference = %request.reference,
            "starting pipeline"
        );
        let outcome = self
            .spawn(request)
            .and_then(|child| self.wait(child, cancel))
            .unwrap_or_else(|err| PipelineOutcome::Failed {
                reason: err.to_string(),
            });
        match &outcome {
            PipelineOutcome::Completed => {
                info!(flowcell = %request.flowcell, organism = %request.organism, "pipeline completed")
            }
            other => {
                error!(flowcell = %request.flowcell, organism = %request.organism, outcome = ?other, "pipeline did not complete")
            }
        }
        outcome
    }
}
