use std::any::Any;
use std::fmt::{self, Display};
use rand::RngCore;
use tracing::warn;
use serde_json::json;
use crate::prob::*;
use crate::calc::{self, Moments};
use crate::error::Result;
use crate::model::Record;

/// Exponential distribution over the non-negative reals, parametrized by its rate.
#[derive(Debug, Clone)]
pub struct Exponential {

    rate : f64,

    log_rate : f64,

    /// [sum(w), sum(w x)]
    stats : Moments<2>,

    frozen : bool

}

impl Exponential {

    pub fn new(rate : f64) -> Self {
        Self { rate, log_rate : rate.ln(), stats : Moments::default(), frozen : false }
    }

    /// Zero rate: scores every value as impossible and samples Missing until estimated.
    pub fn blank() -> Self {
        Self::new(0.0)
    }

    pub fn from_samples(xs : &[Row], weights : Option<&[f64]>) -> Result<Self> {
        let mut e = Self::blank();
        e.fit(xs, weights, 0.0)?;
        Ok(e)
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub(crate) fn from_record(rec : &Record) -> Result<Self> {
        expect_record(rec, "Exponential", 1)?;
        Ok(Self::new(record_f64(rec, 0)?))
    }

}

impl Distribution for Exponential {

    fn kind(&self) -> &'static str {
        "Exponential"
    }

    fn dim(&self) -> usize {
        1
    }

    fn log_probability(&self, x : &[Datum]) -> Result<f64> {
        let x = match univariate(x)?.real()? {
            Some(x) => x,
            None => return Ok(0.0)
        };
        if x < 0.0 {
            return Ok(f64::NEG_INFINITY);
        }
        if self.rate <= 0.0 {
            return Ok(f64::NEG_INFINITY);
        }
        Ok(self.log_rate - self.rate * x)
    }

    fn sample(&self, rng : &mut dyn RngCore) -> Row {
        use rand::Rng;
        if !(self.rate > 0.0) || !self.rate.is_finite() {
            warn!(rate = self.rate, "Cannot sample Exponential without a positive rate");
            return vec![Datum::Missing];
        }
        // Inverse transform over (0, 1].
        let u : f64 = 1.0 - rng.gen::<f64>();
        vec![Datum::Real(-u.ln() / self.rate)]
    }

    fn summarize(&mut self, xs : &[Row], weights : Option<&[f64]>) -> Result<()> {
        let stats = &mut self.stats;
        visit_reals(xs, weights, |x, w| {
            if x < 0.0 {
                return Err(outside_support("Exponential", x));
            }
            stats.add([w, w * x]);
            Ok(())
        })
    }

    fn from_summaries(&mut self, inertia : f64) -> Result<()> {
        calc::check_inertia(inertia)?;
        if self.frozen {
            return Ok(());
        }
        let [w, sx] = self.stats.0;
        if w <= 0.0 {
            return Err(no_weight(self.kind()));
        }
        if sx <= 0.0 {
            return Err(crate::error::Error::InsufficientData(
                "Exponential rate is unbounded for all-zero samples".to_string()
            ));
        }
        self.rate = calc::blend(inertia, self.rate, w / sx);
        self.log_rate = self.rate.ln();
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
        self.stats.weight()
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
        Box::new(Exponential::blank())
    }

    fn boxed_clone(&self) -> Box<dyn Distribution> {
        Box::new(self.clone())
    }

    fn to_record(&self) -> Record {
        Record::new(self.kind(), 1, vec![json!(self.rate)])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

}

impl Display for Exponential {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Exponential({})", self.rate)
    }

}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn rate_is_inverse_mean() {
        let e = Exponential::from_samples(&column(&[0.5, 1.5, 1.0]), None).unwrap();
        assert!((e.rate() - 1.0).abs() < 1E-12);
        let lp = e.log_probability(&[Datum::Real(2.0)]).unwrap();
        assert!((lp + 2.0).abs() < 1E-12);
        assert_eq!(e.log_probability(&[Datum::Real(-1.0)]).unwrap(), f64::NEG_INFINITY);
    }

    #[test]
    fn negative_samples_are_rejected() {
        let mut e = Exponential::new(1.0);
        assert!(e.summarize(&column(&[-0.1]), None).is_err());
    }

    #[test]
    fn blank_samples_are_missing() {
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(4);
        assert_eq!(Exponential::blank().sample(&mut rng), vec![Datum::Missing]);
        assert!(Exponential::new(2.0).sample(&mut rng)[0].as_real().unwrap() >= 0.0);
    }

}
