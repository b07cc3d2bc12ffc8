use std::any::Any;
use std::fmt::{self, Display};
use rand::RngCore;
use tracing::warn;
use serde_json::json;
use crate::prob::*;
use crate::calc::{self, Moments};
use crate::error::{Error, Result};
use crate::model::Record;

const NEWTON_ITER : usize = 100;

const NEWTON_TOL : f64 = 1E-12;

/// Gamma distribution over the positive reals, parametrized by shape (alpha)
/// and rate (beta). The shape has no closed-form maximum-likelihood estimate:
/// from_summaries(.) solves ln(alpha) - digamma(alpha) = ln(mean) - mean(ln x)
/// by Newton iterations started at the Minka approximation.
#[derive(Debug, Clone)]
pub struct Gamma {

    shape : f64,

    rate : f64,

    // alpha ln(beta) - ln Gamma(alpha)
    log_norm : f64,

    /// [sum(w), sum(w x), sum(w ln x)]
    stats : Moments<3>,

    frozen : bool

}

impl Gamma {

    pub fn new(shape : f64, rate : f64) -> Self {
        let mut g = Self { shape, rate, log_norm : 0.0, stats : Moments::default(), frozen : false };
        g.update_cache();
        g
    }

    /// Zero shape and rate: scores every value as impossible and samples
    /// Missing until estimated.
    pub fn blank() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn from_samples(xs : &[Row], weights : Option<&[f64]>) -> Result<Self> {
        let mut g = Self::blank();
        g.fit(xs, weights, 0.0)?;
        Ok(g)
    }

    pub fn shape(&self) -> f64 {
        self.shape
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    fn update_cache(&mut self) {
        if self.shape > 0.0 && self.rate > 0.0 {
            self.log_norm = self.shape * self.rate.ln() - calc::ln_gamma(self.shape);
        } else {
            self.log_norm = f64::NEG_INFINITY;
        }
    }

    pub(crate) fn from_record(rec : &Record) -> Result<Self> {
        expect_record(rec, "Gamma", 2)?;
        Ok(Self::new(record_f64(rec, 0)?, record_f64(rec, 1)?))
    }

}

/// Solves ln(a) - digamma(a) = s for a > 0 (s > 0).
fn shape_mle(s : f64) -> f64 {
    let mut a = (3. - s + ((s - 3.).powi(2) + 24. * s).sqrt()) / (12. * s);
    for _ in 0..NEWTON_ITER {
        let f = a.ln() - calc::digamma(a) - s;
        let df = 1. / a - calc::trigamma(a);
        let mut next = a - f / df;
        if next <= 0.0 || !next.is_finite() {
            next = a / 2.;
        }
        let done = (next - a).abs() <= NEWTON_TOL * a;
        a = next;
        if done {
            break;
        }
    }
    a
}

impl Distribution for Gamma {

    fn kind(&self) -> &'static str {
        "Gamma"
    }

    fn dim(&self) -> usize {
        1
    }

    fn log_probability(&self, x : &[Datum]) -> Result<f64> {
        let x = match univariate(x)?.real()? {
            Some(x) => x,
            None => return Ok(0.0)
        };
        if x <= 0.0 || self.log_norm == f64::NEG_INFINITY {
            return Ok(f64::NEG_INFINITY);
        }
        Ok(self.log_norm + (self.shape - 1.) * x.ln() - self.rate * x)
    }

    fn sample(&self, rng : &mut dyn RngCore) -> Row {
        use rand::Rng;
        match rand_distr::Gamma::new(self.shape, 1. / self.rate) {
            Ok(g) if self.rate > 0.0 => vec![Datum::Real(rng.sample(g))],
            _ => {
                warn!(shape = self.shape, rate = self.rate, "Cannot sample Gamma without positive parameters");
                vec![Datum::Missing]
            }
        }
    }

    fn summarize(&mut self, xs : &[Row], weights : Option<&[f64]>) -> Result<()> {
        let stats = &mut self.stats;
        visit_reals(xs, weights, |x, w| {
            if x <= 0.0 {
                return Err(outside_support("Gamma", x));
            }
            stats.add([w, w * x, w * x.ln()]);
            Ok(())
        })
    }

    fn from_summaries(&mut self, inertia : f64) -> Result<()> {
        calc::check_inertia(inertia)?;
        if self.frozen {
            return Ok(());
        }
        let [w, sx, sl] = self.stats.0;
        if w <= 0.0 {
            return Err(no_weight(self.kind()));
        }
        let mean = sx / w;
        let s = mean.ln() - sl / w;
        if !(s > 0.0) {
            return Err(Error::InsufficientData("Gamma shape is unbounded for constant samples".to_string()));
        }
        let shape = shape_mle(s);
        let rate = shape / mean;
        self.shape = calc::blend(inertia, self.shape, shape);
        self.rate = calc::blend(inertia, self.rate, rate);
        self.update_cache();
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
        Box::new(Gamma::blank())
    }

    fn boxed_clone(&self) -> Box<dyn Distribution> {
        Box::new(self.clone())
    }

    fn to_record(&self) -> Record {
        Record::new(self.kind(), 1, vec![json!(self.shape), json!(self.rate)])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

}

impl Display for Gamma {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gamma({}, {})", self.shape, self.rate)
    }

}

#[cfg(test)]
mod tests {

    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn exponential_density_is_unit_shape() {
        let g = Gamma::new(1.0, 2.0);
        let lp = g.log_probability(&[Datum::Real(0.5)]).unwrap();
        assert!((lp - (2f64.ln() - 1.0)).abs() < 1E-10);
    }

    #[test]
    fn newton_recovers_shape_and_rate() {
        let truth = Gamma::new(3.0, 2.0);
        let mut rng = StdRng::seed_from_u64(11);
        let xs = truth.sample_n(20_000, &mut rng);
        let g = Gamma::from_samples(&xs, None).unwrap();
        assert!((g.shape() - 3.0).abs() < 0.15, "shape = {}", g.shape());
        assert!((g.rate() - 2.0).abs() < 0.15, "rate = {}", g.rate());
    }

    #[test]
    fn blank_samples_are_missing() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(Gamma::blank().sample(&mut rng), vec![Datum::Missing]);
        let mut g = Gamma::blank();
        assert!(matches!(g.fit(&column(&[2.0, 2.0]), None, 0.0), Err(Error::InsufficientData(_))));
    }

    #[test]
    fn shape_solution_satisfies_equation() {
        for s in [0.01, 0.1, 0.5, 2.0].iter() {
            let a = shape_mle(*s);
            assert!((a.ln() - calc::digamma(a) - s).abs() < 1E-9);
        }
    }

}
