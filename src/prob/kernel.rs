use std::any::Any;
use std::f64::consts::PI;
use std::fmt::{self, Display};
use std::str::FromStr;
use rand::RngCore;
use rand_distr::StandardNormal;
use serde::{Serialize, Deserialize};
use serde_json::json;
use crate::prob::*;
use crate::calc;
use crate::error::{Error, Result};
use crate::model::Record;

/// Smoothing kernel placed over each point of a KernelDensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kernel {
    Gaussian,
    Uniform,
    Triangle
}

impl Kernel {

    // Log of the standardized kernel at z.
    fn log_value(&self, z : f64) -> f64 {
        match self {
            Kernel::Gaussian => -0.5 * z * z - 0.5 * (2. * PI).ln(),
            Kernel::Uniform => if z.abs() <= 1.0 { 0.5f64.ln() } else { f64::NEG_INFINITY },
            Kernel::Triangle => if z.abs() < 1.0 { (1. - z.abs()).ln() } else { f64::NEG_INFINITY }
        }
    }

    // Standardized kernel draw.
    fn draw(&self, rng : &mut dyn RngCore) -> f64 {
        use rand::Rng;
        match self {
            Kernel::Gaussian => rng.sample(StandardNormal),
            Kernel::Uniform => 2. * rng.gen::<f64>() - 1.,
            Kernel::Triangle => rng.gen::<f64>() + rng.gen::<f64>() - 1.
        }
    }

}

impl FromStr for Kernel {

    type Err = Error;

    fn from_str(s : &str) -> Result<Self> {
        match s {
            "Gaussian" => Ok(Kernel::Gaussian),
            "Uniform" => Ok(Kernel::Uniform),
            "Triangle" => Ok(Kernel::Triangle),
            other => Err(Error::Schema(format!("Unknown kernel '{}'", other)))
        }
    }

}

impl Display for Kernel {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kernel::Gaussian => "Gaussian",
            Kernel::Uniform => "Uniform",
            Kernel::Triangle => "Triangle"
        };
        write!(f, "{}", name)
    }

}

/// Univariate kernel density estimate: a weighted sum of kernels of a common
/// bandwidth centered at the stored points. Estimation replaces the points by
/// the accumulated ones; under inertia the previous points are kept with their
/// weights scaled by inertia and the new ones scaled by (1 - inertia).
#[derive(Debug, Clone)]
pub struct KernelDensity {

    kernel : Kernel,

    bandwidth : f64,

    points : Vec<f64>,

    // Normalized.
    weights : Vec<f64>,

    // Accumulated (point, weight) pairs, in summarize order.
    pending : Vec<(f64, f64)>,

    frozen : bool

}

impl KernelDensity {

    pub fn new(kernel : Kernel, points : Vec<f64>, weights : Option<Vec<f64>>, bandwidth : f64) -> Result<Self> {
        if !(bandwidth > 0.0) || !bandwidth.is_finite() {
            return Err(Error::ModelConfiguration(format!("Kernel bandwidth must be positive (found {})", bandwidth)));
        }
        let weights = match weights {
            Some(w) => {
                let w = calc::resolve_weights(points.len(), Some(&w[..]))?.into_owned();
                let total : f64 = w.iter().sum();
                if total <= 0.0 && !points.is_empty() {
                    return Err(Error::ModelConfiguration("Kernel weights sum to zero".to_string()));
                }
                if (total - 1.0).abs() < 1E-12 {
                    w
                } else {
                    w.iter().map(|w| w / total ).collect()
                }
            },
            None => vec![1. / points.len() as f64; points.len()]
        };
        Ok(Self { kernel, bandwidth, points, weights, pending : Vec::new(), frozen : false })
    }

    pub fn gaussian(points : Vec<f64>, bandwidth : f64) -> Result<Self> {
        Self::new(Kernel::Gaussian, points, None, bandwidth)
    }

    /// Density without points (scores NEG_INFINITY everywhere).
    pub fn blank_with(kernel : Kernel, bandwidth : f64) -> Self {
        Self { kernel, bandwidth, points : Vec::new(), weights : Vec::new(), pending : Vec::new(), frozen : false }
    }

    pub fn from_samples(kernel : Kernel, bandwidth : f64, xs : &[Row], weights : Option<&[f64]>) -> Result<Self> {
        let mut k = Self::new(kernel, Vec::new(), None, bandwidth)?;
        k.fit(xs, weights, 0.0)?;
        Ok(k)
    }

    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub(crate) fn from_record(rec : &Record) -> Result<Self> {
        expect_record(rec, "KernelDensity", 4)?;
        let kernel = rec.parameters[0].as_str()
            .ok_or_else(|| Error::Schema("KernelDensity record requires a kernel name".to_string()) )?
            .parse::<Kernel>()?;
        let bandwidth = record_f64(rec, 1)?;
        let points = record_vec(rec, 2)?;
        let weights = record_vec(rec, 3)?;
        Self::new(kernel, points, Some(weights), bandwidth)
            .map_err(|e| Error::Schema(e.to_string()) )
    }

}

impl Distribution for KernelDensity {

    fn kind(&self) -> &'static str {
        "KernelDensity"
    }

    fn dim(&self) -> usize {
        1
    }

    fn log_probability(&self, x : &[Datum]) -> Result<f64> {
        let x = match univariate(x)?.real()? {
            Some(x) => x,
            None => return Ok(0.0)
        };
        let log_h = self.bandwidth.ln();
        let terms : Vec<f64> = self.points.iter()
            .zip(self.weights.iter())
            .map(|(p, w)| w.ln() + self.kernel.log_value((x - p) / self.bandwidth) - log_h )
            .collect();
        Ok(calc::log_sum_exp(&terms))
    }

    fn sample(&self, rng : &mut dyn RngCore) -> Row {
        use rand::Rng;
        if self.points.is_empty() {
            return vec![Datum::Missing];
        }
        let u : f64 = rng.gen();
        let mut acc = 0.0;
        let mut center = self.points[self.points.len() - 1];
        for (p, w) in self.points.iter().zip(self.weights.iter()) {
            acc += w;
            if u < acc {
                center = *p;
                break;
            }
        }
        vec![Datum::Real(center + self.bandwidth * self.kernel.draw(rng))]
    }

    fn summarize(&mut self, xs : &[Row], weights : Option<&[f64]>) -> Result<()> {
        let pending = &mut self.pending;
        visit_reals(xs, weights, |x, w| {
            if !x.is_finite() {
                return Err(outside_support("KernelDensity", x));
            }
            pending.push((x, w));
            Ok(())
        })
    }

    fn from_summaries(&mut self, inertia : f64) -> Result<()> {
        calc::check_inertia(inertia)?;
        if self.frozen {
            return Ok(());
        }
        let total : f64 = self.pending.iter().map(|(_, w)| w ).sum();
        if total <= 0.0 {
            return Err(no_weight(self.kind()));
        }
        let mut points = Vec::new();
        let mut weights = Vec::new();
        if inertia > 0.0 {
            points.extend(self.points.iter().cloned());
            weights.extend(self.weights.iter().map(|w| inertia * w ));
        }
        let scale = if inertia > 0.0 && !self.points.is_empty() { 1. - inertia } else { 1.0 };
        for (p, w) in self.pending.iter() {
            points.push(*p);
            weights.push(scale * w / total);
        }
        self.points = points;
        self.weights = weights;
        self.clear_summaries();
        Ok(())
    }

    fn clear_summaries(&mut self) {
        self.pending.clear();
    }

    fn merge_summaries(&mut self, other : &dyn Distribution) -> Result<()> {
        let other = peer(self, other)?;
        self.pending.extend(other.pending.iter().cloned());
        Ok(())
    }

    fn summary_weight(&self) -> f64 {
        self.pending.iter().map(|(_, w)| w ).sum()
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
        Box::new(KernelDensity::blank_with(self.kernel, self.bandwidth))
    }

    fn boxed_clone(&self) -> Box<dyn Distribution> {
        Box::new(self.clone())
    }

    fn to_record(&self) -> Record {
        Record::new(self.kind(), 1, vec![
            json!(self.kernel.to_string()),
            json!(self.bandwidth),
            json!(self.points),
            json!(self.weights)
        ])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

}

impl Display for KernelDensity {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KernelDensity({}, h = {}, n = {})", self.kernel, self.bandwidth, self.points.len())
    }

}
