use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::IntakeError;

pub const DEFAULT_ASSAY_TYPES: [&str; 4] =
    ["RNA_totalRNA", "RNA_PolyA", "RNA_BULK", "RNA_totalRNA_XP"];

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowcellId(String);

impl FlowcellId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlowcellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FlowcellId {
    type Err = IntakeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let is_valid = !normalized.is_empty()
            && normalized != "."
            && normalized != ".."
            && !normalized.contains(['/', '\\', '*']);
        if !is_valid {
            return Err(IntakeError::InvalidFlowcell(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Organism partition name, lowercased. `prototype` samples are processed as `human`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Organism(String);

impl Organism {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn reference(&self) -> Result<ReferenceGenome, IntakeError> {
        ReferenceGenome::for_organism(self)
    }
}

impl fmt::Display for Organism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Organism {
    type Err = IntakeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        let is_valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
        if !is_valid {
            return Err(IntakeError::InvalidOrganism(value.to_string()));
        }
        if normalized == "prototype" {
            return Ok(Self("human".to_string()));
        }
        Ok(Self(normalized))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceGenome {
    #[serde(rename = "GRCh38")]
    GRCh38,
    #[serde(rename = "MM10")]
    Mm10,
    #[serde(rename = "Mmul10")]
    Mmul10,
    #[serde(rename = "mCalJac1")]
    MCalJac1,
}

impl ReferenceGenome {
    pub fn for_organism(organism: &Organism) -> Result<Self, IntakeError> {
        match organism.as_str() {
            "human" | "prototype" => Ok(ReferenceGenome::GRCh38),
            "mouse" => Ok(ReferenceGenome::Mm10),
            "mulatta" => Ok(ReferenceGenome::Mmul10),
            "jacchus" => Ok(ReferenceGenome::MCalJac1),
            other => Err(IntakeError::UnknownOrganism(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceGenome::GRCh38 => "GRCh38",
            ReferenceGenome::Mm10 => "MM10",
            ReferenceGenome::Mmul10 => "Mmul10",
            ReferenceGenome::MCalJac1 => "mCalJac1",
        }
    }
}

impl fmt::Display for ReferenceGenome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing stage of one (flowcell, organism) partition, in pipeline order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    NotFetched,
    Fetched,
    Split,
    PipelineRunning,
    PipelineDone,
    Archived,
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProcessingStage::NotFetched => "not_fetched",
            ProcessingStage::Fetched => "fetched",
            ProcessingStage::Split => "split",
            ProcessingStage::PipelineRunning => "pipeline_running",
            ProcessingStage::PipelineDone => "pipeline_done",
            ProcessingStage::Archived => "archived",
        };
        f.write_str(label)
    }
}
