use std::{fs::File, io::Read, path::Path};

use indexmap::IndexMap;
use ndarray::{Array2, ArrayView2};
use thiserror::Error;

/// Column holding the raw class label. The only required column.
pub const LABEL_COLUMN: &str = "class";
/// Optional row identifier column, dropped from the features when present.
pub const ID_COLUMN: &str = "Index";

/// Tabular phishing dataset split into named numeric features and raw labels.
#[derive(Debug, Clone)]
pub struct Dataset {
    feature_names: Vec<String>,
    features: Array2<f64>,
    raw_labels: Vec<String>,
    ids: Option<Vec<String>>,
    column_count: usize,
}

impl Dataset {
    /// Reads a CSV file with a header row.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(file)
    }

    /// Reads CSV content from any reader. The header row must contain
    /// [`LABEL_COLUMN`]; [`ID_COLUMN`] is dropped if present and every other
    /// column is parsed as a numeric feature.
    pub fn from_reader(reader: impl Read) -> Result<Self, DatasetError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = csv_reader.headers()?.clone();
        let label_idx = headers
            .iter()
            .position(|name| name == LABEL_COLUMN)
            .ok_or(DatasetError::MissingColumn(LABEL_COLUMN))?;
        let id_idx = headers.iter().position(|name| name == ID_COLUMN);

        let feature_cols: Vec<usize> = (0..headers.len())
            .filter(|idx| *idx != label_idx && Some(*idx) != id_idx)
            .collect();
        if feature_cols.is_empty() {
            return Err(DatasetError::NoFeatureColumns);
        }
        let feature_names = feature_cols
            .iter()
            .map(|idx| headers[*idx].to_string())
            .collect::<Vec<_>>();

        let mut values = Vec::new();
        let mut raw_labels = Vec::new();
        let mut ids = id_idx.map(|_| Vec::new());
        for (row, record) in csv_reader.records().enumerate() {
            let record = record?;
            for &col in &feature_cols {
                let cell = &record[col];
                let value = cell.parse::<f64>().map_err(|_| DatasetError::InvalidNumber {
                    row: row + 1,
                    column: headers[col].to_string(),
                    value: cell.to_string(),
                })?;
                values.push(value);
            }
            raw_labels.push(record[label_idx].to_string());
            if let (Some(ids), Some(idx)) = (ids.as_mut(), id_idx) {
                ids.push(record[idx].to_string());
            }
        }

        let features = Array2::from_shape_vec((raw_labels.len(), feature_cols.len()), values)
            .map_err(|err| DatasetError::Shape(err.to_string()))?;
        Ok(Self {
            feature_names,
            features,
            raw_labels,
            ids,
            column_count: headers.len(),
        })
    }

    /// Ordered feature column names (matrix column order).
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Feature matrix, one row per sample.
    #[must_use]
    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    /// Label cells exactly as read (trimmed).
    #[must_use]
    pub fn raw_labels(&self) -> &[String] {
        &self.raw_labels
    }

    /// Values of the identifier column, when the file had one.
    #[must_use]
    pub fn ids(&self) -> Option<&[String]> {
        self.ids.as_deref()
    }

    /// Number of data rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.raw_labels.len()
    }

    /// Number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// `(rows, columns)` of the table as read, identifier and label included.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows(), self.column_count)
    }

    /// Raw label value counts, most frequent first. Equal counts keep
    /// first-seen order.
    #[must_use]
    pub fn class_distribution(&self) -> IndexMap<String, usize> {
        let mut counts = IndexMap::new();
        for label in &self.raw_labels {
            *counts.entry(label.clone()).or_insert(0) += 1;
        }
        counts.sort_by(|_, a, _, b| b.cmp(a));
        counts
    }
}

/// Errors raised while loading the dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// I/O error (filesystem).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed CSV (bad quoting, ragged rows, invalid UTF-8).
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    /// A required column is absent from the header.
    #[error("required column `{0}` not found in header")]
    MissingColumn(&'static str),
    /// Only label/identifier columns were present.
    #[error("dataset has no feature columns")]
    NoFeatureColumns,
    /// A feature cell could not be parsed as a number.
    #[error("row {row}, column `{column}`: `{value}` is not a number")]
    InvalidNumber {
        /// 1-based data row.
        row: usize,
        /// Column header.
        column: String,
        /// Offending cell.
        value: String,
    },
    /// Feature buffer did not match the table shape.
    #[error("feature matrix shape error: {0}")]
    Shape(String),
}
