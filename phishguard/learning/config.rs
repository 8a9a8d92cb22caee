use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{models::ModelSuite, split::SplitConfig};

/// Dataset location used when none is given.
pub const DEFAULT_DATASET_PATH: &str = "../phishing.csv";

/// Everything a training run needs. `Default` reproduces the fixed contract:
/// `../phishing.csv`, artifacts in the working directory, a 20% stratified
/// hold-out with seed 42, and the hardcoded model table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// CSV input.
    pub dataset_path: PathBuf,
    /// Directory receiving the four artifacts.
    pub output_dir: PathBuf,
    /// Hold-out parameters.
    pub split: SplitConfig,
    /// Model hyperparameters.
    pub models: ModelSuite,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from(DEFAULT_DATASET_PATH),
            output_dir: PathBuf::from("."),
            split: SplitConfig::default(),
            models: ModelSuite::default(),
        }
    }
}

impl PipelineConfig {
    /// Overrides the dataset path.
    #[must_use]
    pub fn with_dataset(mut self, path: impl Into<PathBuf>) -> Self {
        self.dataset_path = path.into();
        self
    }

    /// Overrides the artifact directory.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}
