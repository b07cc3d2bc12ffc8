use std::any::Any;
use std::fmt::{self, Display};
use rand::RngCore;
use serde_json::json;
use crate::prob::*;
use crate::calc::{self, Extremes};
use crate::error::{Error, Result};
use crate::model::Record;

/// Continuous uniform over the closed interval [low, high]. The maximum-likelihood
/// interval is the sample range, so the accumulator keeps running extremes.
#[derive(Debug, Clone)]
pub struct Uniform {

    low : f64,

    high : f64,

    stats : Extremes,

    frozen : bool

}

impl Uniform {

    pub fn new(low : f64, high : f64) -> Result<Self> {
        if !(low <= high) {
            return Err(Error::ModelConfiguration(format!("Uniform bounds out of order: [{}, {}]", low, high)));
        }
        Ok(Self { low, high, stats : Extremes::default(), frozen : false })
    }

    pub fn blank() -> Self {
        Self { low : 0.0, high : 0.0, stats : Extremes::default(), frozen : false }
    }

    pub fn from_samples(xs : &[Row], weights : Option<&[f64]>) -> Result<Self> {
        let mut u = Self::blank();
        u.fit(xs, weights, 0.0)?;
        Ok(u)
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub(crate) fn from_record(rec : &Record) -> Result<Self> {
        expect_record(rec, "Uniform", 2)?;
        Self::new(record_f64(rec, 0)?, record_f64(rec, 1)?)
            .map_err(|e| Error::Schema(e.to_string()) )
    }

}

impl Distribution for Uniform {

    fn kind(&self) -> &'static str {
        "Uniform"
    }

    fn dim(&self) -> usize {
        1
    }

    fn log_probability(&self, x : &[Datum]) -> Result<f64> {
        let x = match univariate(x)?.real()? {
            Some(x) => x,
            None => return Ok(0.0)
        };
        if x < self.low || x > self.high {
            return Ok(f64::NEG_INFINITY);
        }
        if self.high == self.low {
            return Ok(0.0);
        }
        Ok(-(self.high - self.low).ln())
    }

    fn sample(&self, rng : &mut dyn RngCore) -> Row {
        use rand::Rng;
        let u : f64 = rng.gen();
        vec![Datum::Real(self.low + u * (self.high - self.low))]
    }

    fn summarize(&mut self, xs : &[Row], weights : Option<&[f64]>) -> Result<()> {
        let stats = &mut self.stats;
        visit_reals(xs, weights, |x, w| {
            if !x.is_finite() {
                return Err(outside_support("Uniform", x));
            }
            stats.add(x, w);
            Ok(())
        })
    }

    fn from_summaries(&mut self, inertia : f64) -> Result<()> {
        calc::check_inertia(inertia)?;
        if self.frozen {
            return Ok(());
        }
        if self.stats.weight <= 0.0 {
            return Err(no_weight(self.kind()));
        }
        self.low = calc::blend(inertia, self.low, self.stats.min);
        self.high = calc::blend(inertia, self.high, self.stats.max);
        self.clear_summaries();
        Ok(())
    }

    fn clear_summaries(&mut self) {
        self.stats.clear();
    }

    fn merge_summaries(&mut self, other : &dyn Distribution) -> Result<()> {
        let other = peer(self, other)?;
        self.stats.merge(&other.stats);
        Ok(())
    }

    fn summary_weight(&self) -> f64 {
        self.stats.weight
    }

    fn freeze(&mut self) {
        self.frozen = true;
    }

    fn thaw(&mut self) {
        self.frozen = false;
    }

    fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn blank(&self) -> Box<dyn Distribution> {
        Box::new(Uniform::blank())
    }

    fn boxed_clone(&self) -> Box<dyn Distribution> {
        Box::new(self.clone())
    }

    fn to_record(&self) -> Record {
        Record::new(self.kind(), 1, vec![json!(self.low), json!(self.high)])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

}

impl Display for Uniform {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uniform({}, {})", self.low, self.high)
    }

}

#[test]
fn uniform_fits_sample_range() {
    let u = Uniform::from_samples(&column(&[2.0, 5.0, 3.0, 4.0]), None).unwrap();
    assert_eq!((u.low(), u.high()), (2.0, 5.0));
    let lp = u.log_probability(&[Datum::Real(2.5)]).unwrap();
    assert!((lp + 3f64.ln()).abs() < 1E-12);
    assert_eq!(u.log_probability(&[Datum::Real(5.5)]).unwrap(), f64::NEG_INFINITY);
    assert!(Uniform::new(1.0, 0.0).is_err());
}
