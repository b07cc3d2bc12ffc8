use std::any::Any;
use std::fmt::{self, Display};
use rand::RngCore;
use tracing::warn;
use serde_json::json;
use crate::prob::*;
use crate::calc::{self, Moments};
use crate::error::Result;
use crate::model::Record;

const NEWTON_ITER : usize = 200;

/// Beta distribution over the open unit interval. Estimation starts from the
/// method-of-moments solution and refines it by Newton steps over the
/// (alpha, beta) log-likelihood, whose gradient and Hessian involve only the
/// digamma and trigamma functions of the parameters.
#[derive(Debug, Clone)]
pub struct Beta {

    alpha : f64,

    beta : f64,

    // ln B(alpha, beta)
    log_beta_fn : f64,

    /// [sum(w), sum(w ln x), sum(w ln(1-x)), sum(w x), sum(w x^2)]
    stats : Moments<5>,

    frozen : bool

}

impl Beta {

    pub fn new(alpha : f64, beta : f64) -> Self {
        let mut b = Self { alpha, beta, log_beta_fn : 0.0, stats : Moments::default(), frozen : false };
        b.update_cache();
        b
    }

    /// Zero parameters: scores every value as impossible and samples Missing
    /// until estimated.
    pub fn blank() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn from_samples(xs : &[Row], weights : Option<&[f64]>) -> Result<Self> {
        let mut b = Self::blank();
        b.fit(xs, weights, 0.0)?;
        Ok(b)
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    fn update_cache(&mut self) {
        self.log_beta_fn = if self.alpha > 0.0 && self.beta > 0.0 {
            calc::ln_gamma(self.alpha) + calc::ln_gamma(self.beta) - calc::ln_gamma(self.alpha + self.beta)
        } else {
            f64::INFINITY
        };
    }

    pub(crate) fn from_record(rec : &Record) -> Result<Self> {
        expect_record(rec, "Beta", 2)?;
        Ok(Self::new(record_f64(rec, 0)?, record_f64(rec, 1)?))
    }

}

/// Maximizes the Beta log-likelihood given the mean log-statistics, starting at (a, b).
fn newton_beta(mut a : f64, mut b : f64, mean_ln : f64, mean_ln1m : f64) -> (f64, f64) {
    for _ in 0..NEWTON_ITER {
        let dab = calc::digamma(a + b);
        let g1 = dab - calc::digamma(a) + mean_ln;
        let g2 = dab - calc::digamma(b) + mean_ln1m;
        let tab = calc::trigamma(a + b);
        let h11 = tab - calc::trigamma(a);
        let h22 = tab - calc::trigamma(b);
        let h12 = tab;
        let det = h11 * h22 - h12 * h12;
        if det == 0.0 || !det.is_finite() {
            break;
        }
        let da = (h22 * g1 - h12 * g2) / det;
        let db = (h11 * g2 - h12 * g1) / det;
        let mut step = 1.0;
        let (mut na, mut nb) = (a - da, b - db);
        while (na <= 0.0 || nb <= 0.0) && step > 1E-10 {
            step /= 2.;
            na = a - step * da;
            nb = b - step * db;
        }
        if na <= 0.0 || nb <= 0.0 {
            break;
        }
        let done = (na - a).abs() < 1E-12 * a && (nb - b).abs() < 1E-12 * b;
        a = na;
        b = nb;
        if done {
            break;
        }
    }
    (a, b)
}

impl Distribution for Beta {

    fn kind(&self) -> &'static str {
        "Beta"
    }

    fn dim(&self) -> usize {
        1
    }

    fn log_probability(&self, x : &[Datum]) -> Result<f64> {
        let x = match univariate(x)?.real()? {
            Some(x) => x,
            None => return Ok(0.0)
        };
        if x <= 0.0 || x >= 1.0 || !self.log_beta_fn.is_finite() {
            return Ok(f64::NEG_INFINITY);
        }
        Ok((self.alpha - 1.) * x.ln() + (self.beta - 1.) * (1. - x).ln() - self.log_beta_fn)
    }

    fn sample(&self, rng : &mut dyn RngCore) -> Row {
        use rand::Rng;
        match rand_distr::Beta::new(self.alpha, self.beta) {
            Ok(b) => vec![Datum::Real(rng.sample(b))],
            Err(_) => {
                warn!(alpha = self.alpha, beta = self.beta, "Cannot sample Beta without positive parameters");
                vec![Datum::Missing]
            }
        }
    }

    fn summarize(&mut self, xs : &[Row], weights : Option<&[f64]>) -> Result<()> {
        let stats = &mut self.stats;
        visit_reals(xs, weights, |x, w| {
            if x <= 0.0 || x >= 1.0 {
                return Err(outside_support("Beta", x));
            }
            stats.add([w, w * x.ln(), w * (1. - x).ln(), w * x, w * x * x]);
            Ok(())
        })
    }

    fn from_summaries(&mut self, inertia : f64) -> Result<()> {
        calc::check_inertia(inertia)?;
        if self.frozen {
            return Ok(());
        }
        let [w, sl, sl1m, sx, sxx] = self.stats.0;
        if w <= 0.0 {
            return Err(no_weight(self.kind()));
        }
        let m = sx / w;
        let v = sxx / w - m * m;
        let common = if v > 0.0 { m * (1. - m) / v - 1. } else { 0.0 };
        let (a0, b0) = if common > 0.0 { (m * common, (1. - m) * common) } else { (1.0, 1.0) };
        let (a, b) = newton_beta(a0, b0, sl / w, sl1m / w);
        self.alpha = calc::blend(inertia, self.alpha, a);
        self.beta = calc::blend(inertia, self.beta, b);
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
        Box::new(Beta::blank())
    }

    fn boxed_clone(&self) -> Box<dyn Distribution> {
        Box::new(self.clone())
    }

    fn to_record(&self) -> Record {
        Record::new(self.kind(), 1, vec![json!(self.alpha), json!(self.beta)])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

}

impl Display for Beta {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Beta({}, {})", self.alpha, self.beta)
    }

}
