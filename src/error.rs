use std::path::PathBuf;

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Sheet '{name}' not found (available: {})", available_sheets.join(", "))]
    SheetNotFound {
        name: String,
        available_sheets: Vec<String>,
    },

    #[error("Failed to load workbook {}: {reason}", path.display())]
    WorkbookLoad { path: PathBuf, reason: String },

    #[error("Failed to write workbook {}: {reason}", path.display())]
    WorkbookWrite { path: PathBuf, reason: String },

    #[error("Invalid cell reference: {0}")]
    InvalidCellRef(String),

    #[error("Unknown profile: {0}")]
    UnknownProfile(String),

    #[error("Mapping registry error: {0}")]
    Mapping(String),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Stable machine-readable kind, used as the `error` field of API responses
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Io(_) => "IoError",
            EngineError::MissingInput(_) => "MissingInputError",
            EngineError::InvalidInput(_) => "InvalidInputError",
            EngineError::SheetNotFound { .. } => "SheetNotFoundError",
            EngineError::WorkbookLoad { .. } => "WorkbookLoadError",
            EngineError::WorkbookWrite { .. } => "WorkbookWriteError",
            EngineError::InvalidCellRef(_) => "InvalidCellRefError",
            EngineError::UnknownProfile(_) => "UnknownProfileError",
            EngineError::Mapping(_) => "MappingError",
            EngineError::Serialization(_) => "SerializationError",
        }
    }

    /// Whether a failed persist may be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::WorkbookWrite { .. } | EngineError::Io(_))
    }
}
