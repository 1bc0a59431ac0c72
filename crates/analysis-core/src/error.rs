use thiserror::Error;

/// Why a metric or a stage could not produce a value.
///
/// Metric functions themselves return `Option<f64>`; this enum is used where a
/// caller needs to report the reason (stage logs, input loading).
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),

    #[error("External source unavailable: {0}")]
    Unavailable(String),
}
