use std::any::Any;
use std::f64::consts::PI;
use std::fmt::{self, Display};
use nalgebra::{DVector, DMatrix, Cholesky};
use rand::RngCore;
use rand_distr::StandardNormal;
use serde_json::json;
use crate::prob::*;
use crate::calc;
use crate::error::{Error, Result};
use crate::model::Record;

// Ridge first tried when the covariance estimate is not positive-definite; grows
// tenfold at each failed attempt.
const RIDGE : f64 = 1E-8;

const RIDGE_ATTEMPTS : usize = 12;

/// Multivariate normal with full covariance. The lower Cholesky factor of the
/// covariance and the log-normalizer -(d ln(2pi) + ln|S|)/2 are recomputed at
/// every parameter update, so scoring a sample costs one triangular solve.
/// Estimation accumulates sum(w), sum(w x) and sum(w x x^T).
#[derive(Debug, Clone)]
pub struct MultivariateGaussian {

    mean : DVector<f64>,

    cov : DMatrix<f64>,

    // Lower Cholesky factor of cov; None for degenerate (blank) parameters.
    low : Option<DMatrix<f64>>,

    log_norm : f64,

    w : f64,

    sx : DVector<f64>,

    sxx : DMatrix<f64>,

    frozen : bool

}

impl MultivariateGaussian {

    pub fn new(mean : DVector<f64>, cov : DMatrix<f64>) -> Result<Self> {
        let d = mean.nrows();
        if cov.nrows() != d || cov.ncols() != d {
            return Err(Error::shape(d, cov.nrows()));
        }
        let mut mvn = Self::blank(d);
        mvn.mean = mean;
        mvn.cov = cov;
        if !mvn.update_cache() {
            return Err(Error::ModelConfiguration("Covariance is not positive-definite".to_string()));
        }
        Ok(mvn)
    }

    /// Zero mean and zero covariance: a point mass at the origin until estimated.
    pub fn blank(d : usize) -> Self {
        Self {
            mean : DVector::zeros(d),
            cov : DMatrix::zeros(d, d),
            low : None,
            log_norm : 0.0,
            w : 0.0,
            sx : DVector::zeros(d),
            sxx : DMatrix::zeros(d, d),
            frozen : false
        }
    }

    pub fn from_samples(xs : &[Row], weights : Option<&[f64]>) -> Result<Self> {
        let d = xs.first().map(|x| x.len() ).ok_or_else(|| no_weight("MultivariateGaussian") )?;
        let mut mvn = Self::blank(d);
        mvn.fit(xs, weights, 0.0)?;
        Ok(mvn)
    }

    pub fn mean(&self) -> &DVector<f64> {
        &self.mean
    }

    pub fn cov(&self) -> &DMatrix<f64> {
        &self.cov
    }

    // Returns false when the covariance is not positive-definite.
    fn update_cache(&mut self) -> bool {
        match Cholesky::new(self.cov.clone()) {
            Some(chol) => {
                let low = chol.l();
                let log_det = 2. * low.diagonal().iter().map(|l| l.ln() ).sum::<f64>();
                self.log_norm = -0.5 * (self.mean.nrows() as f64 * (2. * PI).ln() + log_det);
                self.low = Some(low);
                true
            },
            None => {
                self.low = None;
                self.log_norm = 0.0;
                false
            }
        }
    }

    fn reals(&self, x : &[Datum]) -> Result<DVector<f64>> {
        check_dim(x, self.mean.nrows())?;
        let mut v = DVector::zeros(x.len());
        for (i, xi) in x.iter().enumerate() {
            v[i] = xi.real()?.ok_or_else(|| Error::Input("Missing value in multivariate sample".to_string()) )?;
        }
        Ok(v)
    }

    pub(crate) fn from_record(rec : &Record) -> Result<Self> {
        expect_record(rec, "MultivariateGaussian", 2)?;
        let mean = DVector::from_vec(record_vec(rec, 0)?);
        let d = mean.nrows();
        let rows = rec.parameters[1].as_array()
            .ok_or_else(|| Error::Schema("MultivariateGaussian record requires a covariance matrix".to_string()) )?;
        if rows.len() != d {
            return Err(Error::Schema(format!("Covariance with {} rows for dimension {}", rows.len(), d)));
        }
        let mut cov = DMatrix::zeros(d, d);
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_array()
                .filter(|r| r.len() == d )
                .ok_or_else(|| Error::Schema(format!("Covariance row {} is not a {}-array", i, d)) )?;
            for (j, v) in row.iter().enumerate() {
                cov[(i, j)] = v.as_f64().ok_or_else(|| Error::Schema("Non-numeric covariance entry".to_string()) )?;
            }
        }
        let mut mvn = Self::blank(d);
        mvn.mean = mean;
        mvn.cov = cov;
        mvn.update_cache();
        Ok(mvn)
    }

}

impl Distribution for MultivariateGaussian {

    fn kind(&self) -> &'static str {
        "MultivariateGaussian"
    }

    fn dim(&self) -> usize {
        self.mean.nrows()
    }

    fn log_probability(&self, x : &[Datum]) -> Result<f64> {
        let x = self.reals(x)?;
        let diff = x - &self.mean;
        match &self.low {
            Some(low) => {
                match low.solve_lower_triangular(&diff) {
                    Some(z) => Ok(self.log_norm - 0.5 * z.norm_squared()),
                    None => Ok(f64::NEG_INFINITY)
                }
            },
            None => Ok(if diff.iter().all(|d| *d == 0.0 ) { 0.0 } else { f64::NEG_INFINITY })
        }
    }

    fn sample(&self, rng : &mut dyn RngCore) -> Row {
        use rand::Rng;
        let d = self.mean.nrows();
        let x = match &self.low {
            Some(low) => {
                let z = DVector::from_iterator(d, (0..d).map(|_| rng.sample::<f64, _>(StandardNormal) ));
                &self.mean + low * z
            },
            None => self.mean.clone()
        };
        x.iter().map(|v| Datum::Real(*v) ).collect()
    }

    fn summarize(&mut self, xs : &[Row], weights : Option<&[f64]>) -> Result<()> {
        let ws = calc::resolve_weights(xs.len(), weights)?;
        for (x, w) in xs.iter().zip(ws.iter()) {
            if *w <= 0.0 {
                continue;
            }
            let v = self.reals(x)?;
            self.w += w;
            self.sx.axpy(*w, &v, 1.0);
            self.sxx.ger(*w, &v, &v, 1.0);
        }
        Ok(())
    }

    fn from_summaries(&mut self, inertia : f64) -> Result<()> {
        calc::check_inertia(inertia)?;
        if self.frozen {
            return Ok(());
        }
        if self.w <= 0.0 {
            return Err(no_weight(self.kind()));
        }
        let mean = &self.sx / self.w;
        let cov = &self.sxx / self.w - &mean * mean.transpose();
        if inertia > 0.0 {
            self.mean = &self.mean * inertia + mean * (1. - inertia);
            self.cov = &self.cov * inertia + cov * (1. - inertia);
        } else {
            self.mean = mean;
            self.cov = cov;
        }
        let d = self.mean.nrows();
        let mut ridge = RIDGE * (self.cov.trace() / d as f64).max(1.0);
        let mut attempts = 0;
        while !self.update_cache() {
            if attempts == RIDGE_ATTEMPTS {
                return Err(Error::InsufficientData(
                    "Covariance estimate is not positive-definite".to_string()
                ));
            }
            for i in 0..d {
                self.cov[(i, i)] += ridge;
            }
            ridge *= 10.;
            attempts += 1;
        }
        self.clear_summaries();
        Ok(())
    }

    fn clear_summaries(&mut self) {
        self.w = 0.0;
        self.sx.fill(0.0);
        self.sxx.fill(0.0);
    }

    fn merge_summaries(&mut self, other : &dyn Distribution) -> Result<()> {
        let other = peer(self, other)?;
        if other.sx.nrows() != self.sx.nrows() {
            return Err(Error::shape(self.sx.nrows(), other.sx.nrows()));
        }
        self.w += other.w;
        self.sx += &other.sx;
        self.sxx += &other.sxx;
        Ok(())
    }

    fn summary_weight(&self) -> f64 {
        self.w
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
        Box::new(MultivariateGaussian::blank(self.dim()))
    }

    fn boxed_clone(&self) -> Box<dyn Distribution> {
        Box::new(self.clone())
    }

    fn to_record(&self) -> Record {
        let rows : Vec<Vec<f64>> = self.cov.row_iter()
            .map(|r| r.iter().cloned().collect() )
            .collect();
        let mean : Vec<f64> = self.mean.iter().cloned().collect();
        Record::new(self.kind(), self.dim(), vec![json!(mean), json!(rows)])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

}

impl Display for MultivariateGaussian {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MultivariateGaussian(d = {}, mean = {:?})", self.dim(), self.mean.as_slice())
    }

}
