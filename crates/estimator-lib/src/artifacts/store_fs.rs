//! Filesystem artifact store
//!
//! Reads one JSON file per city, `best_model_<city>.json`, holding the
//! appartement (`_a`) and maison (`_m`) models and scalers.

use super::{ArtifactStore, ModelBundle, RegressionModel, Scaler};
use crate::error::ArtifactError;
use crate::models::{City, PropertyType};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Parsed contents of a per-city artifact file
#[derive(Debug, Deserialize)]
struct ArtifactFile {
    model_a: Option<RegressionModel>,
    model_m: Option<RegressionModel>,
    #[serde(rename = "scaler_Xa")]
    scaler_xa: Option<Scaler>,
    scaler_ya: Option<Scaler>,
    #[serde(rename = "scaler_Xm")]
    scaler_xm: Option<Scaler>,
    scaler_ym: Option<Scaler>,
}

/// Artifact store backed by JSON files in a directory
pub struct JsonArtifactStore {
    dir: PathBuf,
    parsed: Mutex<HashMap<City, Arc<ArtifactFile>>>,
}

impl JsonArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            parsed: Mutex::new(HashMap::new()),
        }
    }

    /// Path of the artifact file for a city
    pub fn artifact_path(&self, city: City) -> PathBuf {
        self.dir.join(format!("best_model_{}.json", city.as_str()))
    }

    fn read_file(path: &Path) -> Result<ArtifactFile, ArtifactError> {
        let bytes = std::fs::read(path).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let digest = hex::encode(Sha256::digest(&bytes));
        info!(path = %path.display(), sha256 = %digest, size = bytes.len(), "Reading model artifact");

        serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn file_for(&self, city: City) -> Result<Arc<ArtifactFile>, ArtifactError> {
        let mut parsed = self.parsed.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(file) = parsed.get(&city) {
            debug!(city = %city, "Reusing parsed artifact file");
            return Ok(file.clone());
        }
        let file = Arc::new(Self::read_file(&self.artifact_path(city))?);
        parsed.insert(city, file.clone());
        Ok(file)
    }
}

fn require<T: Clone>(value: &Option<T>, path: &Path, entry: &str) -> Result<T, ArtifactError> {
    value.clone().ok_or_else(|| ArtifactError::MissingEntry {
        path: path.to_path_buf(),
        entry: entry.to_string(),
    })
}

impl ArtifactStore for JsonArtifactStore {
    fn load(&self, city: City, property_type: PropertyType) -> Result<ModelBundle, ArtifactError> {
        let file = self.file_for(city)?;
        let path = self.artifact_path(city);

        let (model, input_scaler, output_scaler) = match property_type {
            PropertyType::Appartement => (
                require(&file.model_a, &path, "model_a")?,
                require(&file.scaler_xa, &path, "scaler_Xa")?,
                require(&file.scaler_ya, &path, "scaler_ya")?,
            ),
            PropertyType::Maison => (
                require(&file.model_m, &path, "model_m")?,
                require(&file.scaler_xm, &path, "scaler_Xm")?,
                require(&file.scaler_ym, &path, "scaler_ym")?,
            ),
        };

        ModelBundle::new(model, input_scaler, output_scaler)
    }
}
