use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum IntakeError {
    #[error("invalid flowcell id: {0}")]
    InvalidFlowcell(String),

    #[error("invalid organism name: {0}")]
    InvalidOrganism(String),

    #[error("no reference genome for organism: {0}")]
    UnknownOrganism(String),

    #[error("missing config file flowcell-intake.json")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    #[error("failed to read metadata sheet: {0}")]
    CatalogParse(String),

    #[error("flowcell '{0}' not found in the metadata")]
    #[diagnostic(help("check the Flowcell and Desct_TYPE columns of the metadata sheet"))]
    FlowcellNotInCatalog(String),

    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("pipeline failed: {0}")]
    Pipeline(String),

    #[error("another run holds the lock at {0}")]
    #[diagnostic(help("wait for the other fc-intake run on this work directory to finish"))]
    LockHeld(PathBuf),
}
