use std::io::{self, Write};

use serde::Serialize;

use crate::app::{RunReport, StatusReport};
use crate::resolver::{FlowcellStatus, OrganismOutcome};
use crate::samplesheet::SamplesheetOutcome;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(result: &RunReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_status(result: &StatusReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_samplesheet(result: &SamplesheetOutcome) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_run(result: &RunReport) {
        let green = "\x1b[32m";
        let yellow = "\x1b[33m";
        let red = "\x1b[31m";
        let cyan = "\x1b[36m";
        let reset = "\x1b[0m";

        println!("{cyan}flowcell intake summary{reset}");
        for flowcell in &result.flowcells {
            let (label, color) = match &flowcell.status {
                FlowcellStatus::Archived => ("already archived".to_string(), green),
                FlowcellStatus::Processed => ("processed".to_string(), green),
                FlowcellStatus::NoPartitions => ("no organism partitions".to_string(), yellow),
                FlowcellStatus::TransferFailed { reason } => {
                    (format!("transfer failed: {reason}"), red)
                }
                FlowcellStatus::Error { reason } => (format!("error: {reason}"), red),
            };
            println!("{color}{} {label}{reset}", flowcell.flowcell);
            for report in &flowcell.organisms {
                let (label, color) = match &report.outcome {
                    OrganismOutcome::Skipped { reason } => (format!("skipped ({reason})"), yellow),
                    OrganismOutcome::Failed { stage, reason } => {
                        (format!("failed after {stage}: {reason}"), red)
                    }
                    OrganismOutcome::PipelineIncomplete { .. } => {
                        ("pipeline incomplete, not archived".to_string(), red)
                    }
                    OrganismOutcome::Archived { .. } => ("archived".to_string(), green),
                };
                println!("{color}   {} {label}{reset}", report.organism);
            }
        }
        if result.cancelled {
            println!("{yellow}run cancelled before all flowcells were inspected{reset}");
        }
    }

    pub fn print_status(result: &StatusReport) {
        for entry in &result.flowcells {
            for partition in &entry.partitions {
                println!(
                    "{}\t{}\t{}",
                    entry.flowcell,
                    partition.organism.as_deref().unwrap_or("-"),
                    partition.stage
                );
            }
        }
    }
}
