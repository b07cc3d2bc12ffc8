use thiserror::Error;

/// Failures raised by distributions, models and the training loop. Every
/// variant is returned to the immediate caller of the operation that detected
/// it; the EM trainer never swallows one of them inside an iteration.
#[derive(Debug, Error)]
pub enum Error {

    /// Dimension or length mismatch between an input and the object
    /// that received it (row width vs. distribution dimension, weights
    /// vs. samples, accumulators of different variants).
    #[error("Shape mismatch: expected {expected}, found {found}")]
    Shape { expected : usize, found : usize },

    /// An accumulator with zero total weight was finalized.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Invalid priors, transition rows, component counts or settings.
    #[error("Invalid model configuration: {0}")]
    ModelConfiguration(String),

    /// Empty sequences, negative weights, symbols where a real value is required.
    #[error("Invalid input: {0}")]
    Input(String),

    /// Malformed or unknown serialized record.
    #[error("Malformed record: {0}")]
    Schema(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error)

}

impl Error {

    pub(crate) fn shape(expected : usize, found : usize) -> Self {
        Error::Shape { expected, found }
    }

}

pub type Result<T> = std::result::Result<T, Error>;
