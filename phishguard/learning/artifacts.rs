use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::{evaluation::EvaluationRecord, models::TrainedModel, scaler::ScalerState};

/// Winning model state (compact JSON).
pub const MODEL_FILE: &str = "phishguard_model.pkl";
/// Scaler state (compact JSON).
pub const SCALER_FILE: &str = "feature_scaler.pkl";
/// JSON array of feature names.
pub const FEATURE_NAMES_FILE: &str = "feature_names.json";
/// JSON metadata record.
pub const METADATA_FILE: &str = "model_metadata.json";

/// Summary persisted next to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Winning model family name.
    pub model_type: String,
    /// Test accuracy.
    pub accuracy: f64,
    /// Test precision.
    pub precision: f64,
    /// Test recall.
    pub recall: f64,
    /// Test F1.
    pub f1_score: f64,
    /// Rows used for fitting.
    pub training_samples: usize,
    /// Rows used for evaluation.
    pub testing_samples: usize,
    /// Feature names in matrix column order.
    pub features: Vec<String>,
}

impl ModelMetadata {
    /// Folds the winner's scores and the split sizes into a metadata record.
    #[must_use]
    pub fn from_record(
        record: &EvaluationRecord,
        training_samples: usize,
        testing_samples: usize,
        features: &[String],
    ) -> Self {
        Self {
            model_type: record.model.name().to_string(),
            accuracy: record.accuracy,
            precision: record.precision,
            recall: record.recall,
            f1_score: record.f1,
            training_samples,
            testing_samples,
            features: features.to_vec(),
        }
    }
}

/// Locations of the four written artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    /// Winning model.
    pub model: PathBuf,
    /// Scaler state.
    pub scaler: PathBuf,
    /// Feature names.
    pub feature_names: PathBuf,
    /// Metadata.
    pub metadata: PathBuf,
}

impl ArtifactPaths {
    /// Standard file names inside `dir`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            model: dir.join(MODEL_FILE),
            scaler: dir.join(SCALER_FILE),
            feature_names: dir.join(FEATURE_NAMES_FILE),
            metadata: dir.join(METADATA_FILE),
        }
    }

    /// Paths in write order.
    #[must_use]
    pub fn all(&self) -> [&Path; 4] {
        [
            &self.model,
            &self.scaler,
            &self.feature_names,
            &self.metadata,
        ]
    }
}

/// Writes the training artifacts into one directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    /// Writer targeting `dir`; the directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Output directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes model, scaler, feature names and metadata, in that order. The
    /// scaler is always written, whichever model won.
    pub fn write(
        &self,
        model: &TrainedModel,
        scaler: &ScalerState,
        feature_names: &[String],
        metadata: &ModelMetadata,
    ) -> Result<ArtifactPaths, ArtifactError> {
        fs::create_dir_all(&self.dir)?;
        let paths = ArtifactPaths::in_dir(&self.dir);
        write_json(&paths.model, model, false)?;
        write_json(&paths.scaler, scaler, false)?;
        write_json(&paths.feature_names, &feature_names, false)?;
        write_json(&paths.metadata, metadata, true)?;
        Ok(paths)
    }
}

fn write_json<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    pretty: bool,
) -> Result<(), ArtifactError> {
    let mut writer = BufWriter::new(File::create(path)?);
    if pretty {
        serde_json::to_writer_pretty(&mut writer, value)?;
    } else {
        serde_json::to_writer(&mut writer, value)?;
    }
    writer.flush()?;
    Ok(())
}

/// Everything the training run persisted, read back from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactBundle {
    /// Winning model.
    pub model: TrainedModel,
    /// Scaler state.
    pub scaler: ScalerState,
    /// Feature names in column order.
    pub feature_names: Vec<String>,
    /// Metadata record.
    pub metadata: ModelMetadata,
}

impl ArtifactBundle {
    /// Loads the four artifacts from `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let paths = ArtifactPaths::in_dir(dir.as_ref());
        Ok(Self {
            model: read_json(&paths.model)?,
            scaler: read_json(&paths.scaler)?,
            feature_names: read_json(&paths.feature_names)?,
            metadata: read_json(&paths.metadata)?,
        })
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Errors raised while writing or reading artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// I/O error (filesystem).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON encoding or decoding failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
