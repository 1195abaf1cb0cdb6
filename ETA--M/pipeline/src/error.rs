use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the pipeline.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised by the feature pipeline, the artifact store and the predictor.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed or missing required data, or a negative resolution time.
    #[error("data error: {0}")]
    Data(String),
    /// A timestamp field was present but could not be parsed.
    #[error("unparseable {field} timestamp {value:?}")]
    Timestamp {
        /// Field name as it appears in the data source.
        field: &'static str,
        /// Raw value received.
        value: String,
    },
    /// A persisted artifact is missing.
    #[error("{kind} artifact not found at {}", path.display())]
    ArtifactNotFound {
        /// Artifact kind (`schema`, `vectorizer`, `model`).
        kind: String,
        /// Expected location.
        path: PathBuf,
    },
    /// Assembled columns or artifact tags disagree with the trained schema.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    /// Categorical value outside the encoding table while sentinels are disabled.
    #[error("{field} value {value:?} is not in the encoding table")]
    Encoding {
        /// Categorical field name.
        field: &'static str,
        /// Raw value received.
        value: String,
    },
    /// I/O error (filesystem).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// CSV parsing failure.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl PipelineError {
    /// Stable category name used in structured error payloads.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Data(_) => "data_error",
            Self::Timestamp { .. } => "timestamp_error",
            Self::ArtifactNotFound { .. } => "artifact_not_found",
            Self::SchemaMismatch(_) => "schema_mismatch",
            Self::Encoding { .. } => "encoding_error",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Csv(_) => "csv_error",
        }
    }

    /// Whether the caller's input caused the failure.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Data(_) | Self::Timestamp { .. } | Self::Encoding { .. }
        )
    }
}
