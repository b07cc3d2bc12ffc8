use std::ops::{Deref, DerefMut};
use rand::RngCore;
use serde_json::json;
use tracing::warn;
use crate::prob::*;
use crate::calc;
use crate::fit::{self, FitSettings, History, Trainable};
use crate::error::{Error, Result};
use crate::model::{self, Record};

/// A labeled sample, or an unlabeled one when the class is None.
pub type Labeled = (Row, Option<usize>);

/// Classifier with one arbitrary distribution per class and class priors:
/// P(class | x) is proportional to prior(class) p_class(x). Class distributions may be
/// any Distribution, including mixtures or independent blocks (see NaiveBayes).
#[derive(Debug, Clone)]
pub struct BayesClassifier {

    distributions : Vec<Box<dyn Distribution>>,

    priors : Vec<f64>,

    log_priors : Vec<f64>,

    // Per-class weight accumulated by the current statistics.
    mass : Vec<f64>

}

impl BayesClassifier {

    /// Builds the classifier from its class distributions and (unnormalized) priors,
    /// which default to uniform.
    pub fn new(distributions : Vec<Box<dyn Distribution>>, priors : Option<Vec<f64>>) -> Result<Self> {
        if distributions.is_empty() {
            return Err(Error::ModelConfiguration("Classifier requires at least one class".to_string()));
        }
        let d = distributions[0].dim();
        if distributions.iter().any(|c| c.dim() != d ) {
            return Err(Error::ModelConfiguration("Class distributions of different dimensions".to_string()));
        }
        let k = distributions.len();
        let priors = match priors {
            Some(p) if p.len() != k => {
                return Err(Error::ModelConfiguration(format!("{} priors for {} classes", p.len(), k)));
            },
            Some(p) => model::normalize(&p)?,
            None => vec![1. / k as f64; k]
        };
        let log_priors = priors.iter().map(|p| p.ln() ).collect();
        Ok(Self { distributions, priors, log_priors, mass : vec![0.0; k] })
    }

    /// Fits blank copies of the class templates (one per class) on labeled data.
    pub fn from_samples(
        templates : &[Box<dyn Distribution>],
        xs : &[Row],
        y : &[usize],
        weights : Option<&[f64]>
    ) -> Result<Self> {
        let mut bc = Self::new(templates.iter().map(|t| t.blank() ).collect(), None)?;
        bc.fit(xs, y, weights)?;
        Ok(bc)
    }

    pub fn n_classes(&self) -> usize {
        self.distributions.len()
    }

    pub fn distributions(&self) -> &[Box<dyn Distribution>] {
        &self.distributions
    }

    pub fn priors(&self) -> &[f64] {
        &self.priors
    }

    pub fn dim(&self) -> usize {
        self.distributions[0].dim()
    }

    /// Supervised estimation: each class distribution is fit on the rows of its
    /// class, and the priors are the class frequencies. A class without rows keeps
    /// its distribution and receives prior zero.
    pub fn fit(&mut self, xs : &[Row], y : &[usize], weights : Option<&[f64]>) -> Result<()> {
        if xs.len() != y.len() {
            return Err(Error::shape(xs.len(), y.len()));
        }
        let items : Vec<Labeled> = xs.iter().cloned().zip(y.iter().map(|c| Some(*c) )).collect();
        let w = calc::resolve_weights(xs.len(), weights)?;
        self.clear();
        self.accumulate(&items, &w)?;
        self.update(0.0)
    }

    /// Semi-supervised estimation: labeled rows contribute to their class only,
    /// while unlabeled rows are shared among classes by their posterior, iterated
    /// by EM. The labeled rows alone provide the starting point.
    pub fn fit_semisupervised(
        &mut self,
        xs : &[Row],
        y : &[Option<usize>],
        weights : Option<&[f64]>,
        settings : &FitSettings
    ) -> Result<History> {
        if xs.len() != y.len() {
            return Err(Error::shape(xs.len(), y.len()));
        }
        let w = calc::resolve_weights(xs.len(), weights)?;
        let labeled_w : Vec<f64> = w.iter().zip(y.iter()).map(|(w, c)| if c.is_some() { *w } else { 0.0 } ).collect();
        if labeled_w.iter().all(|w| *w == 0.0 ) {
            return Err(Error::Input("Semi-supervised fit requires labeled samples".to_string()));
        }
        let items : Vec<Labeled> = xs.iter().cloned().zip(y.iter().cloned()).collect();
        self.clear();
        self.accumulate(&items, &labeled_w)?;
        self.update(0.0)?;
        fit::train(self, &items, Some(&w[..]), settings, None)
    }

    pub fn log_probability(&self, x : &[Datum]) -> Result<f64> {
        Ok(model::log_posterior(&self.distributions, &self.log_priors, x)?.1)
    }

    pub fn predict_log_proba(&self, xs : &[Row]) -> Result<Vec<Vec<f64>>> {
        xs.iter().map(|x| {
            check_dim(x, self.dim())?;
            let (lp, total) = model::log_posterior(&self.distributions, &self.log_priors, x)?;
            if total == f64::NEG_INFINITY {
                Err(Error::Input("Sample has zero probability under every class".to_string()))
            } else {
                Ok(lp)
            }
        }).collect()
    }

    pub fn predict_proba(&self, xs : &[Row]) -> Result<Vec<Vec<f64>>> {
        Ok(self.predict_log_proba(xs)?
            .into_iter()
            .map(|lp| lp.iter().map(|l| l.exp() ).collect() )
            .collect())
    }

    pub fn predict(&self, xs : &[Row]) -> Result<Vec<usize>> {
        Ok(self.predict_log_proba(xs)?.iter().map(|lp| model::argmax(lp) ).collect())
    }

    /// Draws a class from the priors and a sample from its distribution.
    pub fn sample(&self, rng : &mut dyn RngCore) -> (Row, usize) {
        let c = model::draw_index(&self.priors, rng);
        (self.distributions[c].sample(rng), c)
    }

    fn clear(&mut self) {
        self.distributions.iter_mut().for_each(|d| d.clear_summaries() );
        self.mass.iter_mut().for_each(|m| *m = 0.0 );
    }

    // Labeled rows put their whole weight on their class; unlabeled rows are
    // split by the class posterior.
    fn accumulate(&mut self, items : &[Labeled], weights : &[f64]) -> Result<f64> {
        let k = self.distributions.len();
        let mut resp = vec![vec![0.0; items.len()]; k];
        let mut ll = 0.0;
        for (i, ((x, label), w)) in items.iter().zip(weights.iter()).enumerate() {
            if *w <= 0.0 {
                continue;
            }
            check_dim(x, self.dim())?;
            match label {
                Some(c) => {
                    if *c >= k {
                        return Err(Error::Input(format!("Class {} out of range for {} classes", c, k)));
                    }
                    resp[*c][i] = *w;
                    let lp = self.log_priors[*c] + self.distributions[*c].log_probability(x)?;
                    if lp > f64::NEG_INFINITY {
                        ll += w * lp;
                    }
                },
                None => {
                    let (lp, total) = model::log_posterior(&self.distributions, &self.log_priors, x)?;
                    if total == f64::NEG_INFINITY {
                        continue;
                    }
                    ll += w * total;
                    for c in 0..k {
                        resp[c][i] = w * lp[c].exp();
                    }
                }
            }
        }
        let rows : Vec<Row> = items.iter().map(|(x, _)| x.clone() ).collect();
        for (c, r) in resp.iter().enumerate() {
            self.distributions[c].summarize(&rows, Some(&r[..]))?;
            self.mass[c] += r.iter().sum::<f64>();
        }
        Ok(ll)
    }

    fn update(&mut self, inertia : f64) -> Result<()> {
        calc::check_inertia(inertia)?;
        let total : f64 = self.mass.iter().sum();
        if !(total > 0.0) {
            self.clear();
            return Err(Error::InsufficientData("Classifier accumulators hold zero weight".to_string()));
        }
        let mut dists : Vec<&mut Box<dyn Distribution>> = self.distributions.iter_mut().collect();
        let kept = match update_jointly(&mut dists, inertia, false) {
            Ok(kept) => kept,
            Err(e) => {
                self.mass.iter_mut().for_each(|m| *m = 0.0 );
                return Err(e);
            }
        };
        for (c, _) in kept {
            warn!(class = c, "Class without samples keeps its distribution");
        }
        for (p, m) in self.priors.iter_mut().zip(self.mass.iter()) {
            *p = calc::blend(inertia, *p, m / total);
        }
        self.log_priors = self.priors.iter().map(|p| p.ln() ).collect();
        self.mass.iter_mut().for_each(|m| *m = 0.0 );
        Ok(())
    }

    pub fn to_record(&self) -> Record {
        Record::new("BayesClassifier", self.dim(), vec![json!(self.priors)])
            .with_components(self.distributions.iter().map(|d| d.to_record() ).collect())
    }

    pub(crate) fn from_record(rec : &Record) -> Result<Self> {
        rec.expect_kind("BayesClassifier")?;
        Self::decode(rec)
    }

    fn decode(rec : &Record) -> Result<Self> {
        let priors = record_vec(rec, 0)?;
        let dists = rec.components.iter()
            .map(model::from_record)
            .collect::<Result<Vec<_>>>()?;
        Self::new(dists, Some(priors)).map_err(|e| Error::Schema(e.to_string()) )
    }

}

impl Trainable for BayesClassifier {

    type Item = Labeled;

    fn accumulator(&self) -> Self {
        let mut acc = self.clone();
        acc.clear();
        acc
    }

    fn expectation(&mut self, items : &[Labeled], weights : &[f64]) -> Result<f64> {
        self.accumulate(items, weights)
    }

    fn absorb(&mut self, other : Self) -> Result<()> {
        for (dst, src) in self.distributions.iter_mut().zip(other.distributions.iter()) {
            dst.merge_summaries(src.as_ref())?;
        }
        for (dst, src) in self.mass.iter_mut().zip(other.mass.iter()) {
            *dst += src;
        }
        Ok(())
    }

    fn maximization(&mut self, inertia : f64) -> Result<()> {
        self.update(inertia)
    }

    fn reset(&mut self) {
        self.clear();
    }

}

/// Bayes classifier whose class distributions factor over the features: each
/// class holds an Independent distribution with one univariate part per column.
#[derive(Debug, Clone)]
pub struct NaiveBayes {
    inner : BayesClassifier
}

impl NaiveBayes {

    pub fn new(classes : Vec<Independent>, priors : Option<Vec<f64>>) -> Result<Self> {
        let dists = classes.into_iter().map(|c| Box::new(c) as Box<dyn Distribution> ).collect();
        Ok(Self { inner : BayesClassifier::new(dists, priors)? })
    }

    /// Fits, for each of n_classes classes, blank copies of the feature templates
    /// (one univariate template per column).
    pub fn from_samples(
        features : &[Box<dyn Distribution>],
        n_classes : usize,
        xs : &[Row],
        y : &[usize],
        weights : Option<&[f64]>
    ) -> Result<Self> {
        if let Some(f) = features.iter().find(|f| f.dim() != 1 ) {
            return Err(Error::ModelConfiguration(format!("Naive Bayes features must be univariate (found {})", f.kind())));
        }
        let mut classes = Vec::with_capacity(n_classes);
        for _ in 0..n_classes {
            classes.push(Independent::univariate(features.iter().map(|f| f.blank() ).collect())?);
        }
        let mut nb = Self::new(classes, None)?;
        nb.inner.fit(xs, y, weights)?;
        Ok(nb)
    }

    pub fn to_record(&self) -> Record {
        let mut rec = self.inner.to_record();
        rec.kind = "NaiveBayes".to_string();
        rec
    }

    pub(crate) fn from_record(rec : &Record) -> Result<Self> {
        rec.expect_kind("NaiveBayes")?;
        let inner = BayesClassifier::decode(rec)?;
        if inner.distributions.iter().any(|d| d.as_any().downcast_ref::<Independent>().is_none() ) {
            return Err(Error::Schema("Naive Bayes classes must be Independent distributions".to_string()));
        }
        Ok(Self { inner })
    }

}

impl Deref for NaiveBayes {

    type Target = BayesClassifier;

    fn deref(&self) -> &BayesClassifier {
        &self.inner
    }

}

impl DerefMut for NaiveBayes {

    fn deref_mut(&mut self) -> &mut BayesClassifier {
        &mut self.inner
    }

}
