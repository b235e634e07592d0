use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Serialize;
use tracing::info;

use crate::domain::{FlowcellId, Organism};
use crate::error::IntakeError;
use crate::fs_util;
use crate::layout::Layout;
use crate::splitter::is_undetermined;

pub const STRANDEDNESS: &str = "auto";

static READ_FASTQ: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_R[12]_.*\.fastq\.gz$").expect("valid read pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleRecord {
    pub sample: String,
    pub fastq_1: Utf8PathBuf,
    pub fastq_2: Utf8PathBuf,
    pub strandedness: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SamplesheetOutcome {
    Existing { path: Utf8PathBuf },
    Written { path: Utf8PathBuf, samples: usize },
}

impl SamplesheetOutcome {
    pub fn path(&self) -> &Utf8Path {
        match self {
            SamplesheetOutcome::Existing { path } | SamplesheetOutcome::Written { path, .. } => {
                path
            }
        }
    }
}

/// Sample name of a FASTQ file: everything before the first `_S`.
pub fn sample_name(file_name: &str) -> Option<&str> {
    file_name
        .split_once("_S")
        .map(|(prefix, _)| prefix)
        .filter(|prefix| !prefix.is_empty())
}

/// Pairs sorted read files two by two into sample records.
pub fn pair_reads(files: &[Utf8PathBuf]) -> Result<Vec<SampleRecord>, IntakeError> {
    if files.len() % 2 != 0 {
        return Err(IntakeError::Validation(format!(
            "odd number of FASTQ files ({}), are all pairs present?",
            files.len()
        )));
    }

    let mut records = Vec::with_capacity(files.len() / 2);
    for pair in files.chunks_exact(2) {
        let (first, second) = (&pair[0], &pair[1]);
        let first_name = first.file_name().unwrap_or_default();
        let second_name = second.file_name().unwrap_or_default();
        let sample = sample_name(first_name).ok_or_else(|| {
            IntakeError::Validation(format!("invalid FASTQ filename (missing '_S'): {first}"))
        })?;
        if !second_name.starts_with(sample) {
            return Err(IntakeError::Validation(format!(
                "mismatched FASTQ pair: {first} / {second}"
            )));
        }
        records.push(SampleRecord {
            sample: sample.to_string(),
            fastq_1: first.clone(),
            fastq_2: second.clone(),
            strandedness: STRANDEDNESS.to_string(),
        });
    }
    Ok(records)
}

pub fn render(records: &[SampleRecord]) -> Result<Vec<u8>, IntakeError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["sample", "fastq_1", "fastq_2", "strandedness"])
        .map_err(|err| IntakeError::Filesystem(err.to_string()))?;
    for record in records {
        writer
            .write_record([
                record.sample.as_str(),
                record.fastq_1.as_str(),
                record.fastq_2.as_str(),
                record.strandedness.as_str(),
            ])
            .map_err(|err| IntakeError::Filesystem(err.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|err| IntakeError::Filesystem(err.to_string()))
}

pub struct SamplesheetBuilder<'a> {
    layout: &'a Layout,
}

impl<'a> SamplesheetBuilder<'a> {
    pub fn new(layout: &'a Layout) -> Self {
        Self { layout }
    }

    pub fn build(
        &self,
        flowcell: &FlowcellId,
        organism: &Organism,
    ) -> Result<SamplesheetOutcome, IntakeError> {
        let path = self.layout.samplesheet_path(organism, flowcell);
        if path.as_std_path().exists() {
            info!(%flowcell, %organism, %path, "samplesheet already exists");
            return Ok(SamplesheetOutcome::Existing { path });
        }

        let data_dir = self.layout.split_dir(organism, flowcell);
        let files = fs_util::list_files(&data_dir, |name| {
            READ_FASTQ.is_match(name) && !is_undetermined(name)
        })?;
        if files.is_empty() {
            return Err(IntakeError::MissingInput(format!(
                "no FASTQ files found in {data_dir}"
            )));
        }

        let records = pair_reads(&files)?;
        fs_util::write_bytes_atomic(&path, &render(&records)?)?;
        info!(%flowcell, %organism, %path, samples = records.len(), "samplesheet created");
        Ok(SamplesheetOutcome::Written {
            path,
            samples: records.len(),
        })
    }
}
