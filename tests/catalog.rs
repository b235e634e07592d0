use assert_matches::assert_matches;

use flowcell_intake::catalog::MetadataCatalog;
use flowcell_intake::domain::{DEFAULT_ASSAY_TYPES, FlowcellId, Organism};
use flowcell_intake::error::IntakeError;

const SHEET: &str = "\
Flowcell,Sample_ID,Desct_TYPE,Descr_ORG,Project
240101_A00926_0700_AHXXX,S1,RNA_PolyA,human,P1
240101_A00926_0700_AHXXX,S2,RNA_totalRNA,prototype,P1
240101_A00926_0700_AHXXX,M1,RNA_BULK,mouse,P2
240101_A00926_0700_AHXXX,D1,DNA_WGS,human,P3
250515_A00926_0879_BHTN,S9,RNA_totalRNA_XP,human,P4
250515_A00926_0879_BHTN,S9,RNA_totalRNA_XP,human,P4
231111_A00926_0600_AHYYY,X1,ATAC,human,P5
";

fn assays() -> Vec<String> {
    DEFAULT_ASSAY_TYPES.iter().map(|value| value.to_string()).collect()
}

#[test]
fn flowcells_are_filtered_and_newest_first() {
    let catalog = MetadataCatalog::from_reader(SHEET.as_bytes(), &assays()).unwrap();
    let flowcells = catalog
        .flowcells()
        .into_iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>();
    assert_eq!(
        flowcells,
        vec!["250515_A00926_0879_BHTN", "240101_A00926_0700_AHXXX"]
    );
}

#[test]
fn prototype_samples_join_human_partition() {
    let catalog = MetadataCatalog::from_reader(SHEET.as_bytes(), &assays()).unwrap();
    let flowcell: FlowcellId = "240101_A00926_0700_AHXXX".parse().unwrap();
    let grouped = catalog.samples_by_organism(&flowcell).unwrap();

    let human: Organism = "human".parse().unwrap();
    let mouse: Organism = "mouse".parse().unwrap();
    assert_eq!(grouped.len(), 2);
    assert_eq!(grouped[&human], vec!["S1".to_string(), "S2".to_string()]);
    assert_eq!(grouped[&mouse], vec!["M1".to_string()]);
}

#[test]
fn duplicate_rows_collapse() {
    let catalog = MetadataCatalog::from_reader(SHEET.as_bytes(), &assays()).unwrap();
    let flowcell: FlowcellId = "250515_A00926_0879_BHTN".parse().unwrap();
    let grouped = catalog.samples_by_organism(&flowcell).unwrap();
    assert_eq!(grouped.values().map(Vec::len).sum::<usize>(), 1);
}

#[test]
fn non_rna_flowcell_is_not_in_catalog() {
    let catalog = MetadataCatalog::from_reader(SHEET.as_bytes(), &assays()).unwrap();
    let flowcell: FlowcellId = "231111_A00926_0600_AHYYY".parse().unwrap();
    let err = catalog.samples_by_organism(&flowcell).unwrap_err();
    assert_matches!(err, IntakeError::FlowcellNotInCatalog(_));
    assert!(!catalog.contains(&flowcell));
}

#[test]
fn missing_required_column_is_a_parse_error() {
    let sheet = "Flowcell,Sample_ID,Desct_TYPE\nFC1,S1,RNA_PolyA\n";
    let err = MetadataCatalog::from_reader(sheet.as_bytes(), &assays()).unwrap_err();
    assert_matches!(err, IntakeError::CatalogParse(_));
}
