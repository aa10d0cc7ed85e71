//! Error types for the tasm core library.

#[cfg(feature = "python")]
use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
#[cfg(feature = "python")]
use pyo3::PyErr;

/// Top-level error enum for the tasm core library.
///
/// Every variant except the wrapped library errors corresponds to a
/// condition that aborts an ingestion run.
#[derive(Debug, thiserror::Error)]
pub enum TasmError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Malformed header {header:?}: {reason}")]
    MalformedHeader { header: String, reason: String },

    #[error("Malformed record {record:?}: {reason}")]
    MalformedRecord { record: String, reason: String },

    #[error("Data gap in Locus_{locus_id}_Transcript_{transcript_id}: {reason}")]
    DataGap {
        locus_id: i64,
        transcript_id: i64,
        reason: String,
    },

    #[error("Alignment mismatch: {0}")]
    AlignmentMismatch(String),

    #[error("Invalid coverage: {0}")]
    InvalidCoverage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TasmError {
    pub(crate) fn malformed_header(header: &str, reason: impl Into<String>) -> Self {
        TasmError::MalformedHeader {
            header: header.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_record(record: &str, reason: impl Into<String>) -> Self {
        TasmError::MalformedRecord {
            record: record.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(feature = "python")]
impl From<TasmError> for PyErr {
    fn from(err: TasmError) -> PyErr {
        match &err {
            TasmError::Database(_) | TasmError::Sqlite(_) => PyRuntimeError::new_err(err.to_string()),
            TasmError::Io(_) => PyIOError::new_err(err.to_string()),
            TasmError::Configuration(_)
            | TasmError::MalformedHeader { .. }
            | TasmError::MalformedRecord { .. }
            | TasmError::DataGap { .. }
            | TasmError::AlignmentMismatch(_)
            | TasmError::InvalidCoverage(_)
            | TasmError::Csv(_)
            | TasmError::Json(_) => PyValueError::new_err(err.to_string()),
        }
    }
}

pub type TasmResult<T> = Result<T, TasmError>;
