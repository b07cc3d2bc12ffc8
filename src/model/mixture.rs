use std::any::Any;
use std::fmt::{self, Display};
use rand::RngCore;
use serde_json::json;
use tracing::{debug, warn};
use crate::prob::*;
use crate::calc;
use crate::fit::{self, FitSettings, History, Init, Iteration, Trainable};
use crate::fit::cluster::{self, KMeans, KMeansSettings, Seeding};
use crate::error::{Error, Result};
use crate::model::{self, Record};

/// Finite mixture p(x) = sum_k w_k p_k(x) of arbitrary distributions of a common
/// dimension. The mixture is itself a Distribution: summarize(.) performs the
/// expectation step (components accumulate statistics weighted by their
/// responsibilities, and the mixture accumulates the responsibility mass of each
/// component), and from_summaries(.) the maximization step. This lets mixtures
/// nest inside classifiers, independent blocks or HMM states.
#[derive(Debug, Clone)]
pub struct GeneralMixtureModel {

    components : Vec<Box<dyn Distribution>>,

    weights : Vec<f64>,

    log_weights : Vec<f64>,

    // Responsibility mass accumulated by each component.
    mass : Vec<f64>,

    frozen : bool

}

impl GeneralMixtureModel {

    /// Builds the mixture from its components and (unnormalized) weights, which
    /// default to uniform.
    pub fn new(components : Vec<Box<dyn Distribution>>, weights : Option<Vec<f64>>) -> Result<Self> {
        if components.is_empty() {
            return Err(Error::ModelConfiguration("Mixture requires at least one component".to_string()));
        }
        let d = components[0].dim();
        if let Some(c) = components.iter().find(|c| c.dim() != d ) {
            return Err(Error::ModelConfiguration(format!(
                "Mixture components of different dimensions ({} and {})", d, c.dim()
            )));
        }
        let k = components.len();
        let weights = match weights {
            Some(w) => {
                if w.len() != k {
                    return Err(Error::ModelConfiguration(format!("{} weights for {} components", w.len(), k)));
                }
                model::normalize(&w)?
            },
            None => vec![1. / k as f64; k]
        };
        let log_weights = weights.iter().map(|w| w.ln() ).collect();
        Ok(Self { components, weights, log_weights, mass : vec![0.0; k], frozen : false })
    }

    /// Initializes k blank copies of template from the data (as set by settings.init)
    /// and trains the mixture by EM.
    pub fn from_samples(
        template : &dyn Distribution,
        k : usize,
        xs : &[Row],
        weights : Option<&[f64]>,
        settings : &FitSettings
    ) -> Result<(Self, History)> {
        settings.validate()?;
        if k == 0 {
            return Err(Error::ModelConfiguration("Mixture requires at least one component".to_string()));
        }
        let w = calc::resolve_weights(xs.len(), weights)?.into_owned();
        let resp = initial_responsibilities(k, xs, &w, settings)?;
        let total : f64 = w.iter().sum();
        let mut components = Vec::with_capacity(k);
        let mut mass = Vec::with_capacity(k);
        for (c, r) in resp.iter().enumerate() {
            components.push(model::seed_component(template, xs, r, &w, c)?);
            let m : f64 = r.iter().sum();
            mass.push(if m > 0.0 { m } else { total / k as f64 });
        }
        let mut gmm = Self::new(components, Some(mass))?;
        let hist = gmm.fit(xs, weights, settings)?;
        Ok((gmm, hist))
    }

    /// Trains the mixture by EM from its current parameters.
    pub fn fit(&mut self, xs : &[Row], weights : Option<&[f64]>, settings : &FitSettings) -> Result<History> {
        fit::train(self, xs, weights, settings, None)
    }

    /// As fit(.), reporting each iteration to the observer.
    pub fn fit_observed(
        &mut self,
        xs : &[Row],
        weights : Option<&[f64]>,
        settings : &FitSettings,
        observer : &mut dyn FnMut(&Iteration)
    ) -> Result<History> {
        fit::train(self, xs, weights, settings, Some(observer))
    }

    pub fn components(&self) -> &[Box<dyn Distribution>] {
        &self.components
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    /// Posterior log-probability of each component, for each sample.
    pub fn predict_log_proba(&self, xs : &[Row]) -> Result<Vec<Vec<f64>>> {
        xs.iter()
            .map(|x| self.responsibilities(x).map(|(lr, _)| lr ) )
            .collect()
    }

    pub fn predict_proba(&self, xs : &[Row]) -> Result<Vec<Vec<f64>>> {
        Ok(self.predict_log_proba(xs)?
            .into_iter()
            .map(|lr| lr.iter().map(|l| l.exp() ).collect() )
            .collect())
    }

    /// Most responsible component of each sample.
    pub fn predict(&self, xs : &[Row]) -> Result<Vec<usize>> {
        Ok(self.predict_log_proba(xs)?.iter().map(|lr| model::argmax(lr) ).collect())
    }

    fn responsibilities(&self, x : &[Datum]) -> Result<(Vec<f64>, f64)> {
        check_dim(x, self.dim())?;
        let (lr, total) = model::log_posterior(&self.components, &self.log_weights, x)?;
        if total == f64::NEG_INFINITY {
            return Err(Error::Input("Sample has zero probability under every component".to_string()));
        }
        Ok((lr, total))
    }

    // Expectation step over a batch: returns the weighted log-likelihood of the
    // supported rows. Rows no component supports are skipped.
    fn accumulate(&mut self, xs : &[Row], weights : &[f64]) -> Result<f64> {
        let k = self.components.len();
        let mut resp = vec![vec![0.0; xs.len()]; k];
        let mut ll = 0.0;
        let mut skipped = 0;
        for (i, (x, w)) in xs.iter().zip(weights.iter()).enumerate() {
            if *w <= 0.0 {
                continue;
            }
            check_dim(x, self.dim())?;
            let (lr, total) = model::log_posterior(&self.components, &self.log_weights, x)?;
            if total == f64::NEG_INFINITY {
                skipped += 1;
                continue;
            }
            ll += w * total;
            for c in 0..k {
                resp[c][i] = w * lr[c].exp();
            }
        }
        if skipped > 0 {
            warn!(skipped, "Samples with zero probability under every component were skipped");
        }
        for (c, r) in resp.iter().enumerate() {
            self.components[c].summarize(xs, Some(&r[..]))?;
            self.mass[c] += r.iter().sum::<f64>();
        }
        Ok(ll)
    }

    pub(crate) fn from_record(rec : &Record) -> Result<Self> {
        rec.expect_kind("GeneralMixtureModel")?;
        let weights = record_vec(rec, 0)?;
        let components = rec.components.iter()
            .map(model::from_record)
            .collect::<Result<Vec<_>>>()?;
        Self::new(components, Some(weights)).map_err(|e| Error::Schema(e.to_string()) )
    }

}

/// Responsibilities (already multiplied by the sample weights) of each component
/// before the first EM iteration.
fn initial_responsibilities(k : usize, xs : &[Row], w : &[f64], settings : &FitSettings) -> Result<Vec<Vec<f64>>> {
    let mut rng = settings.rng();
    match settings.init {
        Init::Random => {
            use rand::Rng;
            let mut resp = vec![vec![0.0; xs.len()]; k];
            for i in 0..xs.len() {
                let draws : Vec<f64> = (0..k).map(|_| rng.gen::<f64>() ).collect();
                let total : f64 = draws.iter().sum();
                for c in 0..k {
                    resp[c][i] = w[i] * draws[c] / total;
                }
            }
            Ok(resp)
        },
        Init::FirstK | Init::KMeans => {
            let seeding = if settings.init == Init::FirstK { Seeding::FirstK } else { Seeding::PlusPlus };
            let sample = cluster::real_rows(xs)?;
            let km = KMeans::estimate(&sample, w, &KMeansSettings { n_cluster : k, max_iter : 100, seeding }, &mut rng)?;
            debug!(iterations = km.iterations(), "k-means initialization");
            let mut resp = vec![vec![0.0; xs.len()]; k];
            for (i, c) in km.allocations().iter().enumerate() {
                resp[*c][i] = w[i];
            }
            Ok(resp)
        }
    }
}

impl Distribution for GeneralMixtureModel {

    fn kind(&self) -> &'static str {
        "GeneralMixtureModel"
    }

    fn dim(&self) -> usize {
        self.components[0].dim()
    }

    fn log_probability(&self, x : &[Datum]) -> Result<f64> {
        check_dim(x, self.dim())?;
        let mut lp = Vec::with_capacity(self.components.len());
        for (c, lw) in self.components.iter().zip(self.log_weights.iter()) {
            lp.push(lw + c.log_probability(x)?);
        }
        Ok(calc::log_sum_exp(&lp))
    }

    fn sample(&self, rng : &mut dyn RngCore) -> Row {
        let c = model::draw_index(&self.weights, rng);
        self.components[c].sample(rng)
    }

    fn summarize(&mut self, xs : &[Row], weights : Option<&[f64]>) -> Result<()> {
        let w = calc::resolve_weights(xs.len(), weights)?;
        self.accumulate(xs, &w)?;
        Ok(())
    }

    /// Updates every component from its responsibility-weighted statistics and
    /// the weights from the responsibility mass. A component whose mass collapsed
    /// keeps its parameters. Fails when no mass was accumulated at all, since the
    /// weights cannot be normalized. On failure neither the components nor the
    /// weights change, and the accumulators are cleared.
    fn from_summaries(&mut self, inertia : f64) -> Result<()> {
        calc::check_inertia(inertia)?;
        if self.frozen {
            return Ok(());
        }
        let total : f64 = self.mass.iter().sum();
        if !(total > 0.0) {
            self.clear_summaries();
            return Err(no_weight(self.kind()));
        }
        let mut parts : Vec<&mut Box<dyn Distribution>> = self.components.iter_mut().collect();
        let kept = match update_jointly(&mut parts, inertia, true) {
            Ok(kept) => kept,
            Err(e) => {
                self.mass.iter_mut().for_each(|m| *m = 0.0 );
                return Err(e);
            }
        };
        for (c, reason) in kept {
            match reason {
                Kept::Empty => warn!(component = c, "Mixture component collapsed; keeping its parameters"),
                Kept::Insufficient(msg) => warn!(component = c, "Mixture component kept its parameters: {}", msg)
            }
        }
        for (w, m) in self.weights.iter_mut().zip(self.mass.iter()) {
            *w = calc::blend(inertia, *w, m / total);
        }
        self.log_weights = self.weights.iter().map(|w| w.ln() ).collect();
        self.mass.iter_mut().for_each(|m| *m = 0.0 );
        Ok(())
    }

    fn clear_summaries(&mut self) {
        self.components.iter_mut().for_each(|c| c.clear_summaries() );
        self.mass.iter_mut().for_each(|m| *m = 0.0 );
    }

    fn merge_summaries(&mut self, other : &dyn Distribution) -> Result<()> {
        let other = peer(self, other)?;
        if other.components.len() != self.components.len() {
            return Err(Error::ModelConfiguration("Cannot merge mixtures with different numbers of components".to_string()));
        }
        for (dst, src) in self.components.iter_mut().zip(other.components.iter()) {
            dst.merge_summaries(src.as_ref())?;
        }
        for (dst, src) in self.mass.iter_mut().zip(other.mass.iter()) {
            *dst += src;
        }
        Ok(())
    }

    fn summary_weight(&self) -> f64 {
        self.mass.iter().sum()
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
        let k = self.components.len();
        Box::new(GeneralMixtureModel {
            components : self.components.iter().map(|c| c.blank() ).collect(),
            weights : vec![1. / k as f64; k],
            log_weights : vec![(1. / k as f64).ln(); k],
            mass : vec![0.0; k],
            frozen : false
        })
    }

    fn boxed_clone(&self) -> Box<dyn Distribution> {
        Box::new(self.clone())
    }

    fn to_record(&self) -> Record {
        Record::new(self.kind(), self.dim(), vec![json!(self.weights)])
            .with_components(self.components.iter().map(|c| c.to_record() ).collect())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

}

impl Trainable for GeneralMixtureModel {

    type Item = Row;

    fn accumulator(&self) -> Self {
        let mut acc = self.clone();
        acc.clear_summaries();
        acc
    }

    fn expectation(&mut self, items : &[Row], weights : &[f64]) -> Result<f64> {
        self.accumulate(items, weights)
    }

    fn absorb(&mut self, other : Self) -> Result<()> {
        self.merge_summaries(&other)
    }

    fn maximization(&mut self, inertia : f64) -> Result<()> {
        self.from_summaries(inertia)
    }

    fn reset(&mut self) {
        self.clear_summaries();
    }

}

impl Display for GeneralMixtureModel {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "GeneralMixtureModel(k = {})", self.components.len())?;
        for (c, w) in self.components.iter().zip(self.weights.iter()) {
            writeln!(f, "  {:.4} {:?}", w, c)?;
        }
        Ok(())
    }

}
