use std::any::Any;
use std::fmt::{self, Display};
use rand::RngCore;
use tracing::warn;
use serde_json::json;
use crate::prob::*;
use crate::calc::{self, Moments};
use crate::error::Result;
use crate::model::Record;

/// Poisson distribution over the non-negative integers, represented as reals.
/// Non-integer or negative values have probability zero.
#[derive(Debug, Clone)]
pub struct Poisson {

    lambda : f64,

    log_lambda : f64,

    /// [sum(w), sum(w k)]
    stats : Moments<2>,

    frozen : bool

}

fn is_count(k : f64) -> bool {
    k >= 0.0 && k.fract() == 0.0 && k.is_finite()
}

impl Poisson {

    pub fn new(lambda : f64) -> Self {
        Self { lambda, log_lambda : lambda.ln(), stats : Moments::default(), frozen : false }
    }

    pub fn blank() -> Self {
        Self::new(0.0)
    }

    pub fn from_samples(xs : &[Row], weights : Option<&[f64]>) -> Result<Self> {
        let mut p = Self::blank();
        p.fit(xs, weights, 0.0)?;
        Ok(p)
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub(crate) fn from_record(rec : &Record) -> Result<Self> {
        expect_record(rec, "Poisson", 1)?;
        Ok(Self::new(record_f64(rec, 0)?))
    }

}

impl Distribution for Poisson {

    fn kind(&self) -> &'static str {
        "Poisson"
    }

    fn dim(&self) -> usize {
        1
    }

    fn log_probability(&self, x : &[Datum]) -> Result<f64> {
        let k = match univariate(x)?.real()? {
            Some(k) => k,
            None => return Ok(0.0)
        };
        if !is_count(k) {
            return Ok(f64::NEG_INFINITY);
        }
        if self.lambda <= 0.0 {
            // Point mass at zero.
            return Ok(if k == 0.0 { 0.0 } else { f64::NEG_INFINITY });
        }
        Ok(k * self.log_lambda - self.lambda - calc::ln_factorial(k))
    }

    fn sample(&self, rng : &mut dyn RngCore) -> Row {
        use rand::Rng;
        if self.lambda == 0.0 {
            return vec![Datum::Real(0.0)];
        }
        match rand_distr::Poisson::new(self.lambda) {
            Ok(p) => vec![Datum::Real(rng.sample(p))],
            Err(_) => {
                warn!(lambda = self.lambda, "Cannot sample Poisson with this rate");
                vec![Datum::Missing]
            }
        }
    }

    fn summarize(&mut self, xs : &[Row], weights : Option<&[f64]>) -> Result<()> {
        let stats = &mut self.stats;
        visit_reals(xs, weights, |k, w| {
            if !is_count(k) {
                return Err(outside_support("Poisson", k));
            }
            stats.add([w, w * k]);
            Ok(())
        })
    }

    fn from_summaries(&mut self, inertia : f64) -> Result<()> {
        calc::check_inertia(inertia)?;
        if self.frozen {
            return Ok(());
        }
        let [w, sk] = self.stats.0;
        if w <= 0.0 {
            return Err(no_weight(self.kind()));
        }
        self.lambda = calc::blend(inertia, self.lambda, sk / w);
        self.log_lambda = self.lambda.ln();
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
        Box::new(Poisson::blank())
    }

    fn boxed_clone(&self) -> Box<dyn Distribution> {
        Box::new(self.clone())
    }

    fn to_record(&self) -> Record {
        Record::new(self.kind(), 1, vec![json!(self.lambda)])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

}

impl Display for Poisson {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Poisson({})", self.lambda)
    }

}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn mass_function() {
        let p = Poisson::new(2.0);
        let lp = p.log_probability(&[Datum::Real(3.0)]).unwrap();
        let expected = 3. * 2f64.ln() - 2.0 - 6f64.ln();
        assert!((lp - expected).abs() < 1E-10);
        assert_eq!(p.log_probability(&[Datum::Real(1.5)]).unwrap(), f64::NEG_INFINITY);
        assert_eq!(p.log_probability(&[Datum::Real(-1.0)]).unwrap(), f64::NEG_INFINITY);
    }

    #[test]
    fn rate_is_weighted_mean() {
        let p = Poisson::from_samples(&column(&[0.0, 2.0, 4.0]), Some(&[1.0, 1.0, 2.0])).unwrap();
        assert!((p.lambda() - 2.5).abs() < 1E-12);
        let mut p = Poisson::new(1.0);
        assert!(p.summarize(&column(&[0.5]), None).is_err());
    }

}
