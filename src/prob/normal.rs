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

/// Univariate normal, parametrized by mean and standard deviation. The
/// log-normalizer -ln(sigma*sqrt(2pi)) and the scale 2*sigma^2 are cached at
/// every parameter update, so log_probability(.) is a single multiply-add.
///
/// # Example
///
/// ```
/// use pomelo::prob::*;
///
/// let n = Normal::new(0.0, 1.0);
/// let lp = n.log_probability(&[Datum::Real(0.0)]).unwrap();
/// assert!((lp + 0.5 * (2.0 * std::f64::consts::PI).ln()).abs() < 1E-12);
/// ```
#[derive(Debug, Clone)]
pub struct Normal {

    mean : f64,

    std : f64,

    // -ln(sigma * sqrt(2 pi))
    log_norm : f64,

    // 2 sigma^2
    two_var : f64,

    /// [sum(w), sum(w x), sum(w x^2)]
    stats : Moments<3>,

    /// Floor applied to the estimated standard deviation.
    min_std : f64,

    frozen : bool

}

impl Normal {

    pub fn new(mean : f64, std : f64) -> Self {
        let mut n = Self {
            mean,
            std,
            log_norm : 0.0,
            two_var : 0.0,
            stats : Moments::default(),
            min_std : 0.0,
            frozen : false
        };
        n.update_cache();
        n
    }

    /// Zero-parameter instance used to bootstrap estimation.
    pub fn blank() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn from_samples(xs : &[Row], weights : Option<&[f64]>) -> Result<Self> {
        let mut n = Self::blank();
        n.fit(xs, weights, 0.0)?;
        Ok(n)
    }

    /// Sets a floor for the standard deviation estimated by from_summaries(.),
    /// avoiding components that collapse over a single repeated value. Without
    /// a floor, estimating from constant values fails with InsufficientData.
    pub fn with_min_std(mut self, min_std : f64) -> Self {
        self.min_std = min_std;
        self
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std(&self) -> f64 {
        self.std
    }

    fn update_cache(&mut self) {
        self.log_norm = -(self.std * (2. * PI).sqrt()).ln();
        self.two_var = 2. * self.std * self.std;
    }

    pub(crate) fn from_record(rec : &Record) -> Result<Self> {
        expect_record(rec, "Normal", 2)?;
        let mut n = Self::new(record_f64(rec, 0)?, record_f64(rec, 1)?);
        if let Some(min_std) = rec.parameters.get(2).and_then(|v| v.as_f64() ) {
            n.min_std = min_std;
        }
        Ok(n)
    }

}

impl Distribution for Normal {

    fn kind(&self) -> &'static str {
        "Normal"
    }

    fn dim(&self) -> usize {
        1
    }

    fn log_probability(&self, x : &[Datum]) -> Result<f64> {
        let x = match univariate(x)?.real()? {
            Some(x) => x,
            None => return Ok(0.0)
        };
        if self.std <= 0.0 {
            return Ok(if x == self.mean { 0.0 } else { f64::NEG_INFINITY });
        }
        Ok(self.log_norm - (x - self.mean).powi(2) / self.two_var)
    }

    fn sample(&self, rng : &mut dyn RngCore) -> Row {
        use rand::Rng;
        let z : f64 = rng.sample(StandardNormal);
        vec![Datum::Real(self.mean + self.std * z)]
    }

    fn summarize(&mut self, xs : &[Row], weights : Option<&[f64]>) -> Result<()> {
        let stats = &mut self.stats;
        visit_reals(xs, weights, |x, w| {
            stats.add([w, w * x, w * x * x]);
            Ok(())
        })
    }

    fn from_summaries(&mut self, inertia : f64) -> Result<()> {
        calc::check_inertia(inertia)?;
        if self.frozen {
            return Ok(());
        }
        let [w, sx, sxx] = self.stats.0;
        if w <= 0.0 {
            return Err(no_weight(self.kind()));
        }
        let mean = sx / w;
        let var = (sxx / w - mean * mean).max(0.0);
        if var <= 1E3 * f64::EPSILON * mean * mean && self.min_std <= 0.0 {
            return Err(Error::InsufficientData("Normal variance is zero for constant samples".to_string()));
        }
        let std = var.sqrt().max(self.min_std);
        self.mean = calc::blend(inertia, self.mean, mean);
        self.std = calc::blend(inertia, self.std, std);
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
        Box::new(Normal::blank().with_min_std(self.min_std))
    }

    fn boxed_clone(&self) -> Box<dyn Distribution> {
        Box::new(self.clone())
    }

    fn to_record(&self) -> Record {
        let mut params = vec![json!(self.mean), json!(self.std)];
        if self.min_std > 0.0 {
            params.push(json!(self.min_std));
        }
        Record::new(self.kind(), 1, params)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

}

impl Display for Normal {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Normal({}, {})", self.mean, self.std)
    }

}

#[cfg(test)]
mod tests {

    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn log_probability_matches_closed_form() {
        let n = Normal::new(0.0, 1.0);
        let lp = n.log_probability(&[Datum::Real(0.0)]).unwrap();
        assert!((lp - (-0.5 * (2. * PI).ln())).abs() < 1E-12);
        let n = Normal::new(1.5, 2.0);
        let x = 0.3;
        let expected = -(2.0 * (2. * PI).sqrt()).ln() - (x - 1.5f64).powi(2) / 8.0;
        assert!((n.log_probability(&[Datum::Real(x)]).unwrap() - expected).abs() < 1E-12);
    }

    #[test]
    fn weighted_fit_recovers_moments() {
        let xs = column(&[1.0, 2.0, 3.0]);
        let n = Normal::from_samples(&xs, Some(&[1.0, 0.0, 1.0])).unwrap();
        assert!((n.mean() - 2.0).abs() < 1E-12);
        assert!((n.std() - 1.0).abs() < 1E-12);
    }

    #[test]
    fn missing_values_are_skipped() {
        let xs = vec![vec![Datum::Real(1.0)], vec![Datum::Missing], vec![Datum::Real(3.0)]];
        let n = Normal::from_samples(&xs, None).unwrap();
        assert!((n.mean() - 2.0).abs() < 1E-12);
        assert_eq!(n.log_probability(&[Datum::Missing]).unwrap(), 0.0);
    }

    #[test]
    fn inertia_blends_parameters() {
        let mut n = Normal::new(10.0, 1.0);
        n.summarize(&column(&[0.0, 0.0, 2.0, 2.0]), None).unwrap();
        n.from_summaries(0.5).unwrap();
        assert!((n.mean() - 5.5).abs() < 1E-12);
        assert!((n.std() - 1.0).abs() < 1E-12);
        assert_eq!(n.summary_weight(), 0.0);
    }

    #[test]
    fn blank_is_usable_and_empty_fit_fails() {
        let mut n = Normal::blank();
        assert_eq!(n.log_probability(&[Datum::Real(0.0)]).unwrap(), 0.0);
        assert_eq!(n.log_probability(&[Datum::Real(1.0)]).unwrap(), f64::NEG_INFINITY);
        assert!(matches!(n.from_summaries(0.0), Err(crate::error::Error::InsufficientData(_))));
        assert!(matches!(n.log_probability(&[Datum::Real(0.0), Datum::Real(1.0)]), Err(crate::error::Error::Shape { .. })));
    }

    #[test]
    fn constant_values_need_a_floor() {
        let xs = column(&[2.0, 2.0, 2.0]);
        assert!(matches!(Normal::from_samples(&xs, None), Err(crate::error::Error::InsufficientData(_))));
        let mut n = Normal::blank().with_min_std(0.5);
        n.fit(&xs, None, 0.0).unwrap();
        assert_eq!(n.mean(), 2.0);
        assert_eq!(n.std(), 0.5);

        // Soft weights leave only rounding noise in the variance.
        let mut n = Normal::new(0.0, 1.0);
        assert!(n.fit(&column(&[0.1, 0.1, 0.1]), Some(&[0.3, 0.7, 0.1]), 0.0).is_err());
        assert_eq!(n.std(), 1.0);

        // Explicit zero scale stays a point mass.
        let p = Normal::new(2.0, 0.0);
        assert_eq!(p.log_probability(&[Datum::Real(2.0)]).unwrap(), 0.0);
        assert_eq!(p.log_probability(&[Datum::Real(2.1)]).unwrap(), f64::NEG_INFINITY);
    }

    #[test]
    fn sampling_is_reproducible_under_seed() {
        let n = Normal::new(3.0, 0.5);
        let a = n.sample_n(5, &mut StdRng::seed_from_u64(7));
        let b = n.sample_n(5, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

}
