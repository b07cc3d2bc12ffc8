use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use tracing::warn;
use crate::prob::*;
use crate::calc;
use crate::error::{Error, Result};

/// Serialized form shared by distributions and models.
pub mod record;

pub use record::*;

/// Mixture of arbitrary distributions trained by EM.
pub mod mixture;

pub use mixture::*;

/// Bayes and naive Bayes classifiers.
pub mod bayes;

pub use bayes::*;

/// Markov chains of arbitrary order over discrete symbols.
pub mod markov;

pub use markov::*;

/// Hidden Markov models with arbitrary emissions.
pub mod hmm;

pub use hmm::*;

/// Rebuilds a distribution from its record, dispatching on the kind tag. Unknown
/// kinds and records whose dimension disagrees with the decoded parameters fail
/// with Schema.
pub fn from_record(rec : &Record) -> Result<Box<dyn Distribution>> {
    let dist : Box<dyn Distribution> = match &rec.kind[..] {
        "Normal" => Box::new(Normal::from_record(rec)?),
        "Exponential" => Box::new(Exponential::from_record(rec)?),
        "LogNormal" => Box::new(LogNormal::from_record(rec)?),
        "Gamma" => Box::new(Gamma::from_record(rec)?),
        "Beta" => Box::new(Beta::from_record(rec)?),
        "Poisson" => Box::new(Poisson::from_record(rec)?),
        "Uniform" => Box::new(Uniform::from_record(rec)?),
        "Discrete" => Box::new(Discrete::from_record(rec)?),
        "KernelDensity" => Box::new(KernelDensity::from_record(rec)?),
        "MultivariateGaussian" => Box::new(MultivariateGaussian::from_record(rec)?),
        "ConditionalTable" => Box::new(ConditionalTable::from_record(rec)?),
        "Independent" => Box::new(Independent::from_record(rec)?),
        "GeneralMixtureModel" => Box::new(GeneralMixtureModel::from_record(rec)?),
        other => return Err(Error::Schema(format!("Unknown distribution kind '{}'", other)))
    };
    if dist.dim() != rec.d {
        return Err(Error::Schema(format!("{} record declares d = {} but holds d = {}", rec.kind, rec.d, dist.dim())));
    }
    Ok(dist)
}

/// Posterior log-probabilities of each component (or class) for one sample,
/// together with the log of the marginal density, log(sum_k exp(log_w[k] + log p_k(x))).
/// The posterior vector is all NEG_INFINITY when no component supports x.
pub(crate) fn log_posterior(
    dists : &[Box<dyn Distribution>],
    log_weights : &[f64],
    x : &[Datum]
) -> Result<(Vec<f64>, f64)> {
    let mut lp = Vec::with_capacity(dists.len());
    for (d, lw) in dists.iter().zip(log_weights.iter()) {
        lp.push(if *lw == f64::NEG_INFINITY { f64::NEG_INFINITY } else { lw + d.log_probability(x)? });
    }
    let total = calc::log_sum_exp(&lp);
    if total == f64::NEG_INFINITY {
        return Ok((vec![f64::NEG_INFINITY; lp.len()], total));
    }
    lp.iter_mut().for_each(|l| *l -= total );
    Ok((lp, total))
}

/// Normalizes non-negative weights, failing when they cannot be normalized.
/// Weights already normalized up to rounding are kept as they are, so decoded
/// records reproduce their parameters exactly.
pub(crate) fn normalize(weights : &[f64]) -> Result<Vec<f64>> {
    if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0 ) {
        return Err(Error::ModelConfiguration(format!("Invalid weight {}", w)));
    }
    let total : f64 = weights.iter().sum();
    if !(total > 0.0) {
        return Err(Error::ModelConfiguration("Weights sum to zero".to_string()));
    }
    if (total - 1.0).abs() < 1E-12 {
        return Ok(weights.to_vec());
    }
    Ok(weights.iter().map(|w| w / total ).collect())
}

/// Fits a blank copy of template on the rows selected by resp (initial
/// responsibilities, already multiplied by the sample weights). When the
/// selected rows cannot support an estimate (an empty cluster, a single row,
/// tied values) the copy is fit on every row with the pooled weights instead.
pub(crate) fn seed_component(
    template : &dyn Distribution,
    xs : &[Row],
    resp : &[f64],
    pooled : &[f64],
    ix : usize
) -> Result<Box<dyn Distribution>> {
    if resp.iter().any(|r| *r > 0.0 ) {
        let mut dist = template.blank();
        match dist.fit(xs, Some(resp), 0.0) {
            Ok(()) => return Ok(dist),
            Err(Error::InsufficientData(msg)) => {
                warn!(component = ix, "Initial cluster cannot be estimated ({}); seeding from all samples", msg);
            },
            Err(e) => return Err(e)
        }
    } else {
        warn!(component = ix, "Initial cluster is empty; seeding from all samples");
    }
    let mut dist = template.blank();
    dist.fit(xs, Some(pooled), 0.0)?;
    Ok(dist)
}

pub(crate) fn argmax(values : &[f64]) -> usize {
    let mut best = 0;
    for (ix, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = ix;
        }
    }
    best
}

/// Index drawn with probability proportional to weights.
pub(crate) fn draw_index(weights : &[f64], rng : &mut dyn rand::RngCore) -> usize {
    use rand::Rng;
    let total : f64 = weights.iter().sum();
    let u = rng.gen::<f64>() * total;
    let mut acc = 0.0;
    for (ix, w) in weights.iter().enumerate() {
        acc += w;
        if u < acc {
            return ix;
        }
    }
    weights.iter().rposition(|w| *w > 0.0 ).unwrap_or(0)
}

/// Enumeration representing any probabilistic model read from the outside world
/// (e.g. JSON file), anchored by its top-level record. Distributions (including
/// mixtures nested as parts of other models) load as the Distribution variant;
/// top-level mixtures, classifiers and sequence models load as their own variants.
#[derive(Clone, Debug)]
pub enum Model {
    Distribution(Box<dyn Distribution>),
    Mixture(GeneralMixtureModel),
    Bayes(BayesClassifier),
    NaiveBayes(NaiveBayes),
    Markov(MarkovChain),
    Hmm(HiddenMarkovModel)
}

impl Model {

    pub fn from_record(rec : &Record) -> Result<Self> {
        match &rec.kind[..] {
            "GeneralMixtureModel" => Ok(Model::Mixture(GeneralMixtureModel::from_record(rec)?)),
            "BayesClassifier" => Ok(Model::Bayes(BayesClassifier::from_record(rec)?)),
            "NaiveBayes" => Ok(Model::NaiveBayes(NaiveBayes::from_record(rec)?)),
            "MarkovChain" => Ok(Model::Markov(MarkovChain::from_record(rec)?)),
            "HiddenMarkovModel" => Ok(Model::Hmm(HiddenMarkovModel::from_record(rec)?)),
            _ => Ok(Model::Distribution(from_record(rec)?))
        }
    }

    pub fn to_record(&self) -> Record {
        match self {
            Model::Distribution(d) => d.to_record(),
            Model::Mixture(m) => m.to_record(),
            Model::Bayes(b) => b.to_record(),
            Model::NaiveBayes(nb) => nb.to_record(),
            Model::Markov(m) => m.to_record(),
            Model::Hmm(h) => h.to_record()
        }
    }

    pub fn from_json(content : &str) -> Result<Self> {
        Self::from_record(&Record::from_json(content)?)
    }

    pub fn to_json(&self) -> Result<String> {
        self.to_record().to_json()
    }

    pub fn load_from_path<P>(path : P) -> Result<Self>
    where
        P : AsRef<Path>
    {
        let f = File::open(path)?;
        Self::load(f)
    }

    pub fn load<R>(mut reader : R) -> Result<Self>
    where
        R : Read
    {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;
        Self::from_json(&content[..])
    }

    pub fn save_to_path<P>(&self, path : P) -> Result<()>
    where
        P : AsRef<Path>
    {
        let file = OpenOptions::new().write(true).create(true).truncate(true).open(path)?;
        self.save(file)
    }

    pub fn save<W>(&self, mut writer : W) -> Result<()>
    where
        W : Write
    {
        let content = self.to_record().to_json_pretty()?;
        writer.write_all(content.as_bytes())?;
        Ok(())
    }

}

impl From<Box<dyn Distribution>> for Model {

    fn from(d : Box<dyn Distribution>) -> Self {
        Model::Distribution(d)
    }

}

impl From<GeneralMixtureModel> for Model {

    fn from(m : GeneralMixtureModel) -> Self {
        Model::Mixture(m)
    }

}

impl From<BayesClassifier> for Model {

    fn from(b : BayesClassifier) -> Self {
        Model::Bayes(b)
    }

}

impl From<NaiveBayes> for Model {

    fn from(nb : NaiveBayes) -> Self {
        Model::NaiveBayes(nb)
    }

}

impl From<MarkovChain> for Model {

    fn from(m : MarkovChain) -> Self {
        Model::Markov(m)
    }

}

impl From<HiddenMarkovModel> for Model {

    fn from(h : HiddenMarkovModel) -> Self {
        Model::Hmm(h)
    }

}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn unknown_kind_is_schema_error() {
        let rec = Record::new("Cauchy", 1, vec![serde_json::json!(0.0)]);
        assert!(matches!(from_record(&rec), Err(Error::Schema(_))));
        assert!(matches!(Model::from_record(&rec), Err(Error::Schema(_))));
    }

    #[test]
    fn dimension_is_checked() {
        let mut rec = Normal::new(0.0, 1.0).to_record();
        rec.d = 2;
        assert!(matches!(from_record(&rec), Err(Error::Schema(_))));
    }

    #[test]
    fn model_saves_and_loads() {
        let m = Model::from(Box::new(Normal::new(1.0, 2.0)) as Box<dyn Distribution>);
        let mut buf = Vec::new();
        m.save(&mut buf).unwrap();
        match Model::load(&buf[..]).unwrap() {
            Model::Distribution(d) => {
                let x = [Datum::Real(0.3)];
                assert_eq!(d.log_probability(&x).unwrap(), Normal::new(1.0, 2.0).log_probability(&x).unwrap());
            },
            other => panic!("Unexpected model {:?}", other)
        }
    }

    #[test]
    fn posterior_handles_impossible_samples() {
        let dists : Vec<Box<dyn Distribution>> = vec![Box::new(Exponential::new(1.0)), Box::new(Exponential::new(2.0))];
        let (lp, total) = log_posterior(&dists, &[0.5f64.ln(), 0.5f64.ln()], &[Datum::Real(-1.0)]).unwrap();
        assert_eq!(total, f64::NEG_INFINITY);
        assert!(lp.iter().all(|l| *l == f64::NEG_INFINITY ));
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), 1);
    }

}
