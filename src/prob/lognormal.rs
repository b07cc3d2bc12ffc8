use std::any::Any;
use std::f64::consts::PI;
use std::fmt::{self, Display};
use rand::RngCore;
use rand_distr::StandardNormal;
use serde_json::json;
use crate::prob::*;
use crate::calc::{self, Moments};
use crate::error::{Error, Result};
use crate::model::Record;

/// Distribution of a positive variate whose logarithm is normal with
/// location mu and scale sigma.
#[derive(Debug, Clone)]
pub struct LogNormal {

    mu : f64,

    sigma : f64,

    log_norm : f64,

    two_var : f64,

    /// [sum(w), sum(w ln x), sum(w ln^2 x)]
    stats : Moments<3>,

    frozen : bool

}

impl LogNormal {

    pub fn new(mu : f64, sigma : f64) -> Self {
        let mut l = Self { mu, sigma, log_norm : 0.0, two_var : 0.0, stats : Moments::default(), frozen : false };
        l.update_cache();
        l
    }

    pub fn blank() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn from_samples(xs : &[Row], weights : Option<&[f64]>) -> Result<Self> {
        let mut l = Self::blank();
        l.fit(xs, weights, 0.0)?;
        Ok(l)
    }

    pub fn mu(&self) -> f64 {
        self.mu
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    fn update_cache(&mut self) {
        self.log_norm = -(self.sigma * (2. * PI).sqrt()).ln();
        self.two_var = 2. * self.sigma * self.sigma;
    }

    pub(crate) fn from_record(rec : &Record) -> Result<Self> {
        expect_record(rec, "LogNormal", 2)?;
        Ok(Self::new(record_f64(rec, 0)?, record_f64(rec, 1)?))
    }

}

impl Distribution for LogNormal {

    fn kind(&self) -> &'static str {
        "LogNormal"
    }

    fn dim(&self) -> usize {
        1
    }

    fn log_probability(&self, x : &[Datum]) -> Result<f64> {
        let x = match univariate(x)?.real()? {
            Some(x) => x,
            None => return Ok(0.0)
        };
        if x <= 0.0 {
            return Ok(f64::NEG_INFINITY);
        }
        let lx = x.ln();
        if self.sigma <= 0.0 {
            return Ok(if lx == self.mu { 0.0 } else { f64::NEG_INFINITY });
        }
        Ok(self.log_norm - lx - (lx - self.mu).powi(2) / self.two_var)
    }

    fn sample(&self, rng : &mut dyn RngCore) -> Row {
        use rand::Rng;
        let z : f64 = rng.sample(StandardNormal);
        vec![Datum::Real((self.mu + self.sigma * z).exp())]
    }

    fn summarize(&mut self, xs : &[Row], weights : Option<&[f64]>) -> Result<()> {
        let stats = &mut self.stats;
        visit_reals(xs, weights, |x, w| {
            if x <= 0.0 {
                return Err(outside_support("LogNormal", x));
            }
            let lx = x.ln();
            stats.add([w, w * lx, w * lx * lx]);
            Ok(())
        })
    }

    fn from_summaries(&mut self, inertia : f64) -> Result<()> {
        calc::check_inertia(inertia)?;
        if self.frozen {
            return Ok(());
        }
        let [w, sl, sll] = self.stats.0;
        if w <= 0.0 {
            return Err(no_weight(self.kind()));
        }
        let mu = sl / w;
        let var = (sll / w - mu * mu).max(0.0);
        if var <= 1E3 * f64::EPSILON * mu * mu {
            return Err(Error::InsufficientData("LogNormal scale is zero for constant samples".to_string()));
        }
        let sigma = var.sqrt();
        self.mu = calc::blend(inertia, self.mu, mu);
        self.sigma = calc::blend(inertia, self.sigma, sigma);
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
        Box::new(LogNormal::blank())
    }

    fn boxed_clone(&self) -> Box<dyn Distribution> {
        Box::new(self.clone())
    }

    fn to_record(&self) -> Record {
        Record::new(self.kind(), 1, vec![json!(self.mu), json!(self.sigma)])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

}

impl Display for LogNormal {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogNormal({}, {})", self.mu, self.sigma)
    }

}

#[test]
fn lognormal_fits_log_moments() {
    let e = std::f64::consts::E;
    let l = LogNormal::from_samples(&column(&[1.0, e * e]), None).unwrap();
    assert!((l.mu() - 1.0).abs() < 1E-12);
    assert!((l.sigma() - 1.0).abs() < 1E-12);
    // density at x = e: -ln(sqrt(2 pi)) - 1
    let lp = l.log_probability(&[Datum::Real(e)]).unwrap();
    assert!((lp - (-(2. * PI).sqrt().ln() - 1.0)).abs() < 1E-12);
    assert_eq!(l.log_probability(&[Datum::Real(0.0)]).unwrap(), f64::NEG_INFINITY);
}

#[test]
fn lognormal_rejects_constant_values() {
    let mut l = LogNormal::new(0.0, 1.0);
    let res = l.fit(&column(&[3.0, 3.0]), None, 0.0);
    assert!(matches!(res, Err(Error::InsufficientData(_))));
    assert_eq!(l.sigma(), 1.0);
}
