use std::collections::BTreeSet;
use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use flowcell_intake::domain::{FlowcellId, Organism};
use flowcell_intake::error::IntakeError;
use flowcell_intake::layout::Layout;
use flowcell_intake::samplesheet::{SamplesheetBuilder, SamplesheetOutcome};

fn layout(temp: &tempfile::TempDir) -> Layout {
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    Layout::new(root.join("work"), root.join("cold"))
}

fn ids() -> (FlowcellId, Organism) {
    ("FC1".parse().unwrap(), "human".parse().unwrap())
}

fn stage_files(layout: &Layout, names: &[&str]) -> Utf8PathBuf {
    let (flowcell, organism) = ids();
    let dir = layout.split_dir(&organism, &flowcell);
    fs::create_dir_all(&dir).unwrap();
    for name in names {
        fs::write(dir.join(name), b"@r\nACGT\n+\nFFFF\n").unwrap();
    }
    dir
}

fn read_rows(path: &Utf8PathBuf) -> Vec<Vec<String>> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    assert_eq!(
        reader.headers().unwrap().iter().collect::<Vec<_>>(),
        vec!["sample", "fastq_1", "fastq_2", "strandedness"]
    );
    reader
        .records()
        .map(|record| record.unwrap().iter().map(str::to_string).collect())
        .collect()
}

#[test]
fn even_file_count_yields_one_row_per_pair() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout(&temp);
    stage_files(
        &layout,
        &[
            "A1_S1_R1_001.fastq.gz",
            "A1_S1_R2_001.fastq.gz",
            "B2_S2_R1_001.fastq.gz",
            "B2_S2_R2_001.fastq.gz",
            "C3_S3_R1_001.fastq.gz",
            "C3_S3_R2_001.fastq.gz",
            "Undetermined_S0_R1_001.fastq.gz",
            "Undetermined_S0_R2_001.fastq.gz",
        ],
    );
    let (flowcell, organism) = ids();

    let outcome = SamplesheetBuilder::new(&layout)
        .build(&flowcell, &organism)
        .unwrap();
    assert_matches!(outcome, SamplesheetOutcome::Written { samples: 3, .. });

    let rows = read_rows(&outcome.path().to_path_buf());
    assert_eq!(rows.len(), 3);
    let names = rows.iter().map(|row| row[0].clone()).collect::<BTreeSet<_>>();
    assert_eq!(names.len(), 3);
    assert!(rows.iter().all(|row| row[3] == "auto"));
    assert!(rows[0][1].ends_with("A1_S1_R1_001.fastq.gz"));
    assert!(rows[0][2].ends_with("A1_S1_R2_001.fastq.gz"));
}

#[test]
fn odd_file_count_fails_without_manifest() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout(&temp);
    stage_files(
        &layout,
        &[
            "A1_S1_R1_001.fastq.gz",
            "A1_S1_R2_001.fastq.gz",
            "B2_S2_R1_001.fastq.gz",
        ],
    );
    let (flowcell, organism) = ids();

    let err = SamplesheetBuilder::new(&layout)
        .build(&flowcell, &organism)
        .unwrap_err();
    assert_matches!(err, IntakeError::Validation(_));
    assert!(!layout.samplesheet_path(&organism, &flowcell).as_std_path().exists());
}

#[test]
fn mismatched_pair_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout(&temp);
    stage_files(&layout, &["A1_S1_R1_001.fastq.gz", "B2_S2_R1_001.fastq.gz"]);
    let (flowcell, organism) = ids();

    let err = SamplesheetBuilder::new(&layout)
        .build(&flowcell, &organism)
        .unwrap_err();
    assert_matches!(err, IntakeError::Validation(_));
}

#[test]
fn missing_fastq_is_missing_input() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout(&temp);
    stage_files(&layout, &["notes.txt"]);
    let (flowcell, organism) = ids();

    let err = SamplesheetBuilder::new(&layout)
        .build(&flowcell, &organism)
        .unwrap_err();
    assert_matches!(err, IntakeError::MissingInput(_));
}

#[test]
fn existing_manifest_is_never_regenerated() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout(&temp);
    stage_files(&layout, &["A1_S1_R1_001.fastq.gz", "A1_S1_R2_001.fastq.gz"]);
    let (flowcell, organism) = ids();
    let path = layout.samplesheet_path(&organism, &flowcell);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "sample,fastq_1,fastq_2,strandedness\n").unwrap();

    let outcome = SamplesheetBuilder::new(&layout)
        .build(&flowcell, &organism)
        .unwrap();
    assert_matches!(outcome, SamplesheetOutcome::Existing { .. });
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "sample,fastq_1,fastq_2,strandedness\n"
    );
}
