use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;

use camino::Utf8Path;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::{FlowcellId, Organism};
use crate::error::IntakeError;

#[derive(Debug, Deserialize)]
struct SheetRow {
    #[serde(rename = "Flowcell")]
    flowcell: String,
    #[serde(rename = "Desct_TYPE")]
    assay_type: String,
    #[serde(rename = "Descr_ORG")]
    organism: String,
    #[serde(rename = "Sample_ID")]
    sample_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub flowcell: FlowcellId,
    pub organism: Organism,
    pub sample_id: String,
}

/// Sample metadata restricted to the configured assay types.
#[derive(Debug, Clone, Default)]
pub struct MetadataCatalog {
    entries: Vec<CatalogEntry>,
}

impl MetadataCatalog {
    pub fn load(path: &Utf8Path, assay_types: &[String]) -> Result<Self, IntakeError> {
        let file = std::fs::File::open(path).map_err(|err| {
            IntakeError::MissingInput(format!("metadata sheet {path}: {err}"))
        })?;
        Self::from_reader(file, assay_types)
    }

    pub fn from_reader<R: Read>(reader: R, assay_types: &[String]) -> Result<Self, IntakeError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut entries = Vec::new();
        let mut skipped = 0usize;
        for row in reader.deserialize::<SheetRow>() {
            let row = row.map_err(|err| IntakeError::CatalogParse(err.to_string()))?;
            if !assay_types.iter().any(|assay| *assay == row.assay_type) {
                continue;
            }
            let parsed = row
                .flowcell
                .parse::<FlowcellId>()
                .and_then(|flowcell| Ok((flowcell, row.organism.parse::<Organism>()?)));
            match parsed {
                Ok((flowcell, organism)) if !row.sample_id.is_empty() => {
                    entries.push(CatalogEntry {
                        flowcell,
                        organism,
                        sample_id: row.sample_id,
                    });
                }
                Ok(_) => skipped += 1,
                Err(err) => {
                    debug!(error = %err, "skipping metadata row");
                    skipped += 1;
                }
            }
        }
        if skipped > 0 {
            warn!(skipped, "metadata rows with unusable flowcell, organism or sample id");
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct flowcells, newest run first (run names start with the run date).
    pub fn flowcells(&self) -> Vec<FlowcellId> {
        let unique = self
            .entries
            .iter()
            .map(|entry| entry.flowcell.clone())
            .collect::<BTreeSet<_>>();
        unique.into_iter().rev().collect()
    }

    pub fn contains(&self, flowcell: &FlowcellId) -> bool {
        self.entries.iter().any(|entry| &entry.flowcell == flowcell)
    }

    /// Sample ids per organism for one flowcell, deduplicated.
    pub fn samples_by_organism(
        &self,
        flowcell: &FlowcellId,
    ) -> Result<BTreeMap<Organism, Vec<String>>, IntakeError> {
        let mut grouped: BTreeMap<Organism, BTreeSet<String>> = BTreeMap::new();
        for entry in self.entries.iter().filter(|entry| &entry.flowcell == flowcell) {
            grouped
                .entry(entry.organism.clone())
                .or_default()
                .insert(entry.sample_id.clone());
        }
        if grouped.is_empty() {
            return Err(IntakeError::FlowcellNotInCatalog(flowcell.to_string()));
        }
        Ok(grouped
            .into_iter()
            .map(|(organism, samples)| (organism, samples.into_iter().collect()))
            .collect())
    }
}
