/// Error taxonomy shared by every estimator and the crate-wide Result alias.
pub mod error;

/// Numerically stable log-space arithmetic, special functions and weight helpers.
pub mod calc;

/// Data model (Datum, Row), the Distribution trait with its additive sufficient
/// statistics, leaf distributions and the Independent compositional distribution.
pub mod prob;

/// Expectation-Maximization over anything that implements Trainable, with
/// data-parallel accumulation of statistics and k-means initialization.
pub mod fit;

/// Serialized records and the models built on top of distributions: mixtures,
/// Bayes classifiers, Markov chains and hidden Markov models.
pub mod model;

pub use error::{Error, Result};
