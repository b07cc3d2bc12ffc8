use std::any::Any;
use std::borrow::Cow;
use std::fmt::{self, Debug, Display};
use rand::RngCore;
use serde::{Serialize, Deserialize};
use crate::error::{Error, Result};
use crate::model::Record;
use crate::calc;

mod normal;

pub use normal::*;

mod exponential;

pub use exponential::*;

mod lognormal;

pub use lognormal::*;

mod gamma;

pub use gamma::*;

mod beta;

pub use beta::*;

mod poisson;

pub use poisson::*;

mod uniform;

pub use uniform::*;

/// Categorical distribution over arbitrary symbols.
mod categorical;

pub use categorical::*;

/// Non-parametric density built from weighted points.
mod kernel;

pub use kernel::*;

mod multinormal;

pub use multinormal::*;

/// Conditional probability tables over discrete parents.
mod conditional;

pub use conditional::*;

/// Distributions combined over a partition of the feature columns.
mod independent;

pub use independent::*;

/// A single observed value. Continuous distributions read Real values; discrete
/// distributions key on Symbol values (or on the decimal rendering of a Real);
/// Missing values are ignored by univariate distributions, which score them
/// with log-probability zero and skip them while accumulating statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Datum {
    Real(f64),
    Symbol(String),
    Missing
}

/// One sample: a fixed-width record with one entry per dimension.
pub type Row = Vec<Datum>;

impl Datum {

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Datum::Real(x) => Some(*x),
            _ => None
        }
    }

    /// Returns the real value, failing for symbols. Missing values are
    /// reported as None.
    pub fn real(&self) -> Result<Option<f64>> {
        match self {
            Datum::Real(x) => Ok(Some(*x)),
            Datum::Missing => Ok(None),
            Datum::Symbol(s) => Err(Error::Input(format!("Expected a real value, found symbol '{}'", s)))
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Datum::Missing)
    }

    /// Key used by discrete distributions to index this value.
    pub fn key(&self) -> Option<Cow<'_, str>> {
        match self {
            Datum::Symbol(s) => Some(Cow::Borrowed(s.as_str())),
            Datum::Real(x) => Some(Cow::Owned(x.to_string())),
            Datum::Missing => None
        }
    }

}

impl From<f64> for Datum {

    fn from(x : f64) -> Self {
        Datum::Real(x)
    }

}

impl From<&str> for Datum {

    fn from(s : &str) -> Self {
        Datum::Symbol(s.to_string())
    }

}

impl From<String> for Datum {

    fn from(s : String) -> Self {
        Datum::Symbol(s)
    }

}

impl Display for Datum {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Real(x) => write!(f, "{}", x),
            Datum::Symbol(s) => write!(f, "{}", s),
            Datum::Missing => write!(f, "NA")
        }
    }

}

/// Arranges a slice of reals as a sequence of univariate rows.
pub fn column(values : &[f64]) -> Vec<Row> {
    values.iter().map(|x| vec![Datum::Real(*x)] ).collect()
}

/// Arranges a sequence of real vectors as rows.
pub fn matrix(values : &[Vec<f64>]) -> Vec<Row> {
    values.iter().map(|r| r.iter().map(|x| Datum::Real(*x) ).collect() ).collect()
}

/// Arranges a slice of symbols as a sequence of univariate rows.
pub fn symbols(values : &[&str]) -> Vec<Row> {
    values.iter().map(|s| vec![Datum::from(*s)] ).collect()
}

/// Atomic likelihood and statistics unit. Implementors evaluate log-probabilities
/// from their current parameters alone, and keep a private additive accumulator
/// of weighted sufficient statistics that summarize(.) feeds and from_summaries(.)
/// consumes. Compositional and sequence models hold their parts as
/// Box<dyn Distribution>, so user-defined distributions plug into any of them.
///
/// The accumulator contract: calling summarize(.) over disjoint batches and then
/// from_summaries(.) yields the same parameters (up to floating error) as a single
/// summarize(.) over the concatenated batches. merge_summaries(.) adds the
/// accumulator of a clone of the same variant into self, which is what the
/// data-parallel engine relies on.
pub trait Distribution
where
    Self : Debug + Send + Sync
{

    /// Variant tag, also used as the kind field of serialized records.
    fn kind(&self) -> &'static str;

    /// Number of columns of each sample.
    fn dim(&self) -> usize;

    /// Log-probability (or log-density) of a single sample under the current parameters.
    /// Values outside the support yield NEG_INFINITY rather than an error.
    fn log_probability(&self, x : &[Datum]) -> Result<f64>;

    fn probability(&self, x : &[Datum]) -> Result<f64> {
        Ok(self.log_probability(x)?.exp())
    }

    fn log_probability_many(&self, xs : &[Row]) -> Result<Vec<f64>> {
        xs.iter().map(|x| self.log_probability(x) ).collect()
    }

    fn probability_many(&self, xs : &[Row]) -> Result<Vec<f64>> {
        xs.iter().map(|x| self.probability(x) ).collect()
    }

    /// Draws one sample from the current parameters.
    fn sample(&self, rng : &mut dyn RngCore) -> Row;

    fn sample_n(&self, n : usize, rng : &mut dyn RngCore) -> Vec<Row> {
        (0..n).map(|_| self.sample(rng) ).collect()
    }

    /// Adds the weighted sufficient statistics of xs to the accumulator. Weights
    /// default to one per sample.
    fn summarize(&mut self, xs : &[Row], weights : Option<&[f64]>) -> Result<()>;

    /// Re-estimates the parameters from the accumulator, blending them with the
    /// previous values by inertia (new = inertia * old + (1 - inertia) * mle), then
    /// clears the accumulator. Fails with InsufficientData when the accumulator holds
    /// zero weight. Frozen distributions keep both parameters and accumulator.
    fn from_summaries(&mut self, inertia : f64) -> Result<()>;

    fn clear_summaries(&mut self);

    /// Adds the accumulator of other (which must be the same variant) into self.
    fn merge_summaries(&mut self, other : &dyn Distribution) -> Result<()>;

    /// Total weight currently held by the accumulator.
    fn summary_weight(&self) -> f64;

    fn fit(&mut self, xs : &[Row], weights : Option<&[f64]>, inertia : f64) -> Result<()> {
        if self.is_frozen() {
            return Ok(());
        }
        self.clear_summaries();
        self.summarize(xs, weights)?;
        self.from_summaries(inertia)
    }

    fn freeze(&mut self);

    fn thaw(&mut self);

    fn is_frozen(&self) -> bool;

    /// A zero-initialized instance with the same shape (dimension, kernel, number
    /// of parents, nested structure), used to bootstrap from_samples(.).
    fn blank(&self) -> Box<dyn Distribution>;

    fn boxed_clone(&self) -> Box<dyn Distribution>;

    /// Variant tag and parameters (never the accumulator).
    fn to_record(&self) -> Record;

    fn as_any(&self) -> &dyn Any;

}

impl Clone for Box<dyn Distribution> {

    fn clone(&self) -> Self {
        self.boxed_clone()
    }

}

/// Recovers the concrete accumulator owner from a peer handed to merge_summaries(.).
pub(crate) fn peer<'a, T>(this : &T, other : &'a dyn Distribution) -> Result<&'a T>
where
    T : Distribution + 'static
{
    other.as_any().downcast_ref::<T>().ok_or_else(|| {
        Error::ModelConfiguration(format!("Cannot merge {} statistics into {}", other.kind(), this.kind()))
    })
}

/// Validates the width of a sample against the distribution dimension.
pub(crate) fn check_dim(x : &[Datum], d : usize) -> Result<()> {
    if x.len() == d {
        Ok(())
    } else {
        Err(Error::shape(d, x.len()))
    }
}

/// Reads the single entry of a univariate sample.
pub(crate) fn univariate(x : &[Datum]) -> Result<&Datum> {
    check_dim(x, 1)?;
    Ok(&x[0])
}

/// Visits each (value, weight) pair of a univariate real-valued batch, skipping
/// missing values and zero weights. The visitor may reject values outside the
/// distribution support.
pub(crate) fn visit_reals<F>(xs : &[Row], weights : Option<&[f64]>, mut f : F) -> Result<()>
where
    F : FnMut(f64, f64) -> Result<()>
{
    let w = calc::resolve_weights(xs.len(), weights)?;
    for (x, w) in xs.iter().zip(w.iter()) {
        if let Some(v) = univariate(x)?.real()? {
            if *w > 0.0 {
                f(v, *w)?;
            }
        }
    }
    Ok(())
}

pub(crate) fn outside_support(kind : &str, x : f64) -> Error {
    Error::Input(format!("Value {} outside the support of {}", x, kind))
}

pub(crate) fn no_weight(kind : &str) -> Error {
    Error::InsufficientData(format!("{} accumulator holds zero weight", kind))
}

/// Why a part kept its previous parameters during update_jointly(.).
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Kept {

    /// The accumulator held no weight.
    Empty,

    /// from_summaries(.) reported InsufficientData.
    Insufficient(String)

}

/// Re-estimates every part from its accumulator as a single step. Parts whose
/// accumulator holds no weight keep their parameters, and so do parts failing
/// with InsufficientData when tolerate_insufficient is set; their indices are
/// returned. Any other failure leaves every part with its previous parameters,
/// and every accumulator cleared.
pub(crate) fn update_jointly(
    parts : &mut [&mut Box<dyn Distribution>],
    inertia : f64,
    tolerate_insufficient : bool
) -> Result<Vec<(usize, Kept)>> {
    let mut updated : Vec<Option<Box<dyn Distribution>>> = Vec::with_capacity(parts.len());
    let mut kept = Vec::new();
    let mut failure = None;
    for (ix, part) in parts.iter().enumerate() {
        if part.summary_weight() <= 0.0 {
            kept.push((ix, Kept::Empty));
            updated.push(None);
            continue;
        }
        let mut next = part.boxed_clone();
        match next.from_summaries(inertia) {
            Ok(()) => updated.push(Some(next)),
            Err(Error::InsufficientData(msg)) if tolerate_insufficient => {
                kept.push((ix, Kept::Insufficient(msg)));
                updated.push(None);
            },
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    if let Some(e) = failure {
        parts.iter_mut().for_each(|p| p.clear_summaries() );
        return Err(e);
    }
    for (part, next) in parts.iter_mut().zip(updated.into_iter()) {
        match next {
            Some(mut next) => {
                // Frozen parts return early with their accumulators intact.
                next.clear_summaries();
                **part = next;
            },
            None => part.clear_summaries()
        }
    }
    Ok(kept)
}

/// Reads the numeric parameter at position ix of a record.
pub(crate) fn record_f64(rec : &Record, ix : usize) -> Result<f64> {
    rec.parameters.get(ix)
        .and_then(|v| v.as_f64() )
        .ok_or_else(|| Error::Schema(format!("{} record lacks numeric parameter {}", rec.kind, ix)))
}

/// Reads the numeric array at position ix of a record.
pub(crate) fn record_vec(rec : &Record, ix : usize) -> Result<Vec<f64>> {
    let arr = rec.parameters.get(ix)
        .and_then(|v| v.as_array() )
        .ok_or_else(|| Error::Schema(format!("{} record lacks array parameter {}", rec.kind, ix)))?;
    arr.iter()
        .map(|v| v.as_f64().ok_or_else(|| Error::Schema(format!("Non-numeric entry in {} record", rec.kind))) )
        .collect()
}

/// Checks the kind tag and the parameter count of a record before decoding it.
pub(crate) fn expect_record(rec : &Record, kind : &str, n_params : usize) -> Result<()> {
    if rec.kind != kind {
        return Err(Error::Schema(format!("Expected {} record, found {}", kind, rec.kind)));
    }
    if rec.parameters.len() < n_params {
        return Err(Error::Schema(format!("{} record requires {} parameters", kind, n_params)));
    }
    Ok(())
}
