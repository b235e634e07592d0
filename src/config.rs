use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::DEFAULT_ASSAY_TYPES;
use crate::error::IntakeError;

pub const CONFIG_FILE_NAME: &str = "flowcell-intake.json";

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub work_dir: String,
    pub archive_root: String,
    pub reference_root: String,
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub split: SplitConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// File name of the metadata sheet inside `3.Info`.
    #[serde(default)]
    pub sheet: Option<String>,
    #[serde(default)]
    pub remote_sheet: Option<String>,
    #[serde(default)]
    pub assay_types: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TransferConfig {
    #[serde(default)]
    pub source_roots: Vec<String>,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    pub host: String,
    pub user: String,
    pub root: String,
    /// Name of the environment variable holding the SSH password.
    pub password_env: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PipelineConfig {
    pub script: String,
    #[serde(default)]
    pub nextflow: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SplitConfig {
    #[serde(default)]
    pub delete_original: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ArchiveConfig {
    /// Archive a partition whose pipeline run left no completion marker. Defaults to `false`.
    /// Set `true` to archive every partition after its run, whatever the outcome.
    #[serde(default)]
    pub on_pipeline_failure: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub work_dir: Utf8PathBuf,
    pub archive_root: Utf8PathBuf,
    pub reference_root: Utf8PathBuf,
    pub sheet_name: String,
    pub remote_sheet: Option<String>,
    pub assay_types: Vec<String>,
    pub transfer: ResolvedTransfer,
    pub pipeline: ResolvedPipeline,
    pub delete_original: bool,
    pub archive_on_pipeline_failure: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedTransfer {
    pub source_roots: Vec<Utf8PathBuf>,
    pub suffix: String,
    pub remote: Option<RemoteConfig>,
}

#[derive(Debug, Clone)]
pub struct ResolvedPipeline {
    pub nextflow: String,
    pub script: Utf8PathBuf,
    pub profile: String,
    pub timeout: Option<Duration>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, IntakeError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => default_config_path().ok_or(IntakeError::MissingConfig)?,
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| IntakeError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| IntakeError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, IntakeError> {
        let work_dir = required_path("work_dir", &config.work_dir)?;
        let archive_root = required_path("archive_root", &config.archive_root)?;
        let reference_root = required_path("reference_root", &config.reference_root)?;
        let script = required_path("pipeline.script", &config.pipeline.script)?;

        let sheet_name = config
            .catalog
            .sheet
            .unwrap_or_else(|| "results_parsing.csv".to_string());
        if sheet_name.trim().is_empty() || sheet_name.contains('/') {
            return Err(IntakeError::ConfigInvalid(format!(
                "catalog.sheet must be a bare file name: {sheet_name:?}"
            )));
        }

        let assay_types = config.catalog.assay_types.unwrap_or_else(|| {
            DEFAULT_ASSAY_TYPES
                .iter()
                .map(|value| value.to_string())
                .collect()
        });
        if assay_types.is_empty() {
            return Err(IntakeError::ConfigInvalid(
                "catalog.assay_types must not be empty".to_string(),
            ));
        }

        if let Some(remote) = &config.transfer.remote {
            for (field, value) in [
                ("host", &remote.host),
                ("user", &remote.user),
                ("root", &remote.root),
                ("password_env", &remote.password_env),
            ] {
                if value.trim().is_empty() {
                    return Err(IntakeError::ConfigInvalid(format!(
                        "transfer.remote.{field} must not be empty"
                    )));
                }
            }
        }

        let timeout = match config.pipeline.timeout_secs {
            Some(0) => {
                return Err(IntakeError::ConfigInvalid(
                    "pipeline.timeout_secs must be greater than zero".to_string(),
                ));
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        let source_roots = config
            .transfer
            .source_roots
            .iter()
            .map(|root| required_path("transfer.source_roots", root))
            .collect::<Result<Vec<_>, IntakeError>>()?;

        Ok(ResolvedConfig {
            work_dir,
            archive_root,
            reference_root,
            sheet_name,
            remote_sheet: config.catalog.remote_sheet,
            assay_types,
            transfer: ResolvedTransfer {
                source_roots,
                suffix: config
                    .transfer
                    .suffix
                    .unwrap_or_else(|| "_fastq4".to_string()),
                remote: config.transfer.remote,
            },
            pipeline: ResolvedPipeline {
                nextflow: config
                    .pipeline
                    .nextflow
                    .unwrap_or_else(|| "nextflow".to_string()),
                script,
                profile: config
                    .pipeline
                    .profile
                    .unwrap_or_else(|| "docker".to_string()),
                timeout,
            },
            delete_original: config.split.delete_original.unwrap_or(true),
            archive_on_pipeline_failure: config.archive.on_pipeline_failure.unwrap_or(false),
        })
    }
}

fn required_path(field: &str, value: &str) -> Result<Utf8PathBuf, IntakeError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(IntakeError::ConfigInvalid(format!(
            "{field} must not be empty"
        )));
    }
    Ok(Utf8PathBuf::from(trimmed))
}

fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Some(local);
    }
    BaseDirs::new()
        .map(|dirs| {
            dirs.config_dir()
                .join("flowcell-intake")
                .join("config.json")
        })
        .filter(|path| path.exists())
}
