//! Versioned model registry
//!
//! Layout under the registry directory:
//!
//! ```text
//! <version>.json        model bytes as produced by the classifier
//! <version>.meta.json   sidecar: contract version, metrics, hash, trainer
//! ```
//!
//! Both files are staged as temp files in the registry directory and
//! renamed into place. The sidecar records the BLAKE3 of the model bytes,
//! and [`ModelRegistry::load`] refuses a pair whose hashes disagree.

use crate::errors::PersistenceError;
use crate::features::FeatureContract;
use crate::metrics::Metrics;
use crate::trainer::ScoringModel;
use chrono::{DateTime, Utc};
use gathr_gbdt::serialization::{blake3_hex, canonical_json_string};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

const MODEL_SUFFIX: &str = ".json";
const SIDECAR_SUFFIX: &str = ".meta.json";

/// Metadata persisted next to every model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSidecar {
    pub version: String,
    pub feature_contract_version: String,
    pub feature_names: Vec<String>,
    pub metrics: Metrics,
    pub trained_at: DateTime<Utc>,
    pub model_blake3: String,
    pub trainer: Value,
}

impl ModelSidecar {
    /// Whether `model_bytes` are the model this sidecar was written for
    pub fn describes(&self, model_bytes: &[u8]) -> bool {
        blake3_hex(model_bytes) == self.model_blake3
    }
}

/// Paths of a published model pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArtifact {
    pub version: String,
    pub model_path: PathBuf,
    pub sidecar_path: PathBuf,
    pub model_blake3: String,
}

/// A verified model pair read back from the registry
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedModel {
    pub bytes: Vec<u8>,
    pub sidecar: ModelSidecar,
}

/// Directory of versioned model artifacts
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    dir: PathBuf,
}

impl ModelRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Split a model output path such as `models/xgboost_v1.json` into the
    /// registry at `models/` and version `xgboost_v1`.
    pub fn from_output_path(path: &Path) -> Result<(Self, String), PersistenceError> {
        let version = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.strip_suffix(MODEL_SUFFIX).unwrap_or(name).to_string())
            .ok_or_else(|| PersistenceError::InvalidVersion {
                version: path.display().to_string(),
                reason: "path does not name a file".to_string(),
            })?;
        validate_version(&version)?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok((Self::new(dir), version))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self, version: &str) -> PathBuf {
        self.dir.join(format!("{version}{MODEL_SUFFIX}"))
    }

    pub fn sidecar_path(&self, version: &str) -> PathBuf {
        self.dir.join(format!("{version}{SIDECAR_SUFFIX}"))
    }

    /// Write `model` and its sidecar under `version`, replacing any pair
    /// already published under that version. Other versions are untouched.
    ///
    /// The model is renamed into place before the sidecar. Until the second
    /// rename lands, a reader opening `<version>.json` directly can see the
    /// new model next to the previous sidecar. Such readers must check the
    /// bytes against `model_blake3` ([`ModelSidecar::describes`]), as
    /// [`ModelRegistry::load`] does.
    pub fn publish<M: ScoringModel + ?Sized>(
        &self,
        model: &M,
        metrics: &Metrics,
        contract: &dyn FeatureContract,
        version: &str,
    ) -> Result<ModelArtifact, PersistenceError> {
        validate_version(version)?;
        let model_path = self.model_path(version);
        let sidecar_path = self.sidecar_path(version);

        let bytes = model
            .to_artifact_bytes()
            .map_err(|e| PersistenceError::Serialize {
                path: model_path.clone(),
                reason: e.to_string(),
            })?;
        let model_blake3 = blake3_hex(&bytes);

        let sidecar = ModelSidecar {
            version: version.to_string(),
            feature_contract_version: contract.version().to_string(),
            feature_names: contract
                .feature_names()
                .iter()
                .map(|name| name.to_string())
                .collect(),
            metrics: metrics.clone(),
            trained_at: Utc::now(),
            model_blake3: model_blake3.clone(),
            trainer: model.describe(),
        };
        let sidecar_json =
            canonical_json_string(&sidecar).map_err(|e| PersistenceError::Serialize {
                path: sidecar_path.clone(),
                reason: e.to_string(),
            })?;

        fs::create_dir_all(&self.dir).map_err(|e| PersistenceError::io(&self.dir, e))?;
        let staged_model = self.stage(&bytes, &model_path)?;
        let staged_sidecar = self.stage(sidecar_json.as_bytes(), &sidecar_path)?;

        persist(staged_model, &model_path)?;
        persist(staged_sidecar, &sidecar_path)?;

        info!(
            version,
            model = %model_path.display(),
            blake3 = %model_blake3,
            accuracy = metrics.accuracy,
            auc = metrics.auc,
            "published model"
        );
        Ok(ModelArtifact {
            version: version.to_string(),
            model_path,
            sidecar_path,
            model_blake3,
        })
    }

    pub fn load_sidecar(&self, version: &str) -> Result<ModelSidecar, PersistenceError> {
        validate_version(version)?;
        let path = self.sidecar_path(version);
        let raw = fs::read(&path).map_err(|e| PersistenceError::io(&path, e))?;
        serde_json::from_slice(&raw).map_err(|e| PersistenceError::Inconsistent {
            path,
            reason: format!("unreadable sidecar: {e}"),
        })
    }

    /// Read a model and its sidecar, verifying they belong together.
    pub fn load(&self, version: &str) -> Result<PublishedModel, PersistenceError> {
        let sidecar = self.load_sidecar(version)?;
        let model_path = self.model_path(version);
        let bytes = fs::read(&model_path).map_err(|e| PersistenceError::io(&model_path, e))?;

        if !sidecar.describes(&bytes) {
            return Err(PersistenceError::Inconsistent {
                path: model_path,
                reason: format!(
                    "model hash {} does not match sidecar hash {}",
                    blake3_hex(&bytes),
                    sidecar.model_blake3
                ),
            });
        }
        if sidecar.version != version {
            return Err(PersistenceError::Inconsistent {
                path: self.sidecar_path(version),
                reason: format!("sidecar names version '{}'", sidecar.version),
            });
        }
        Ok(PublishedModel { bytes, sidecar })
    }

    /// Published versions in lexicographic order. A missing registry
    /// directory has no versions.
    pub fn versions(&self) -> Result<Vec<String>, PersistenceError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistenceError::io(&self.dir, e)),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PersistenceError::io(&self.dir, e))?;
            let name = entry.file_name();
            let Some(version) = name.to_str().and_then(|n| n.strip_suffix(SIDECAR_SUFFIX)) else {
                continue;
            };
            if self.model_path(version).is_file() {
                versions.push(version.to_string());
            }
        }
        versions.sort();
        Ok(versions)
    }

    fn stage(&self, bytes: &[u8], target: &Path) -> Result<NamedTempFile, PersistenceError> {
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| PersistenceError::io(target, e))?;
        tmp.write_all(bytes)
            .map_err(|e| PersistenceError::io(target, e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| PersistenceError::io(target, e))?;
        Ok(tmp)
    }
}

fn persist(tmp: NamedTempFile, target: &Path) -> Result<(), PersistenceError> {
    tmp.persist(target)
        .map(|_| ())
        .map_err(|e| PersistenceError::Io {
            path: target.to_path_buf(),
            source: e.error,
        })
}

fn validate_version(version: &str) -> Result<(), PersistenceError> {
    let reason = if version.is_empty() {
        "must not be empty"
    } else if version.contains('/') || version.contains('\\') || version == "." || version == ".." {
        "must not contain path components"
    } else if version.ends_with(".meta") {
        "must not end with '.meta'"
    } else {
        return Ok(());
    };
    Err(PersistenceError::InvalidVersion {
        version: version.to_string(),
        reason: reason.to_string(),
    })
}
