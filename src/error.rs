//! Error types shared by the grid evaluator, history loading and rendering.

use thiserror::Error;

/// Which of the two comparison surfaces a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    GroundTruth,
    PriorMean,
}

impl std::fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceKind::GroundTruth => write!(f, "ground truth"),
            SurfaceKind::PriorMean => write!(f, "prior mean"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("Grid resolution must be at least 1, got {0}")]
    InvalidResolution(usize),

    #[error("Invalid range for {name}: [{min}, {max}]")]
    InvalidRange { name: String, min: f64, max: f64 },

    #[error("Scoring failed on {surface} surface at row {row}, col {col}: {message}")]
    Scoring {
        surface: SurfaceKind,
        row: usize,
        col: usize,
        message: String,
    },

    #[error("Non-finite score on {surface} surface at row {row}, col {col}")]
    NonFiniteScore {
        surface: SurfaceKind,
        row: usize,
        col: usize,
    },

    #[error("Prior mean model failed: {0}")]
    Model(String),

    #[error("Shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("History is missing key: {0}")]
    MissingKey(String),

    #[error("Record {index} of '{key}' has {actual} values, expected {expected}")]
    RecordShape {
        key: String,
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Series '{key}' has {actual} entries, expected {expected}")]
    LengthMismatch {
        key: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Drawing error: {0}")]
    Drawing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl<E> From<plotters::drawing::DrawingAreaErrorKind<E>> for PlotError
where
    E: std::error::Error + Send + Sync,
{
    fn from(err: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        PlotError::Drawing(err.to_string())
    }
}

/// Result type for plotting and grid operations
pub type Result<T> = std::result::Result<T, PlotError>;
