use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Serialize, Deserialize};
use tracing::{debug, warn};
use crate::calc;
use crate::error::{Error, Result};

/// Data-parallel accumulation of sufficient statistics over contiguous shards.
pub mod parallel;

/// K-means clustering, used to seed mixture components and HMM emissions.
pub mod cluster;

/// How mixture components (or HMM emissions) are initialized before EM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Init {

    /// The first k distinct rows seed a k-means pass.
    FirstK,

    /// k-means++ seeding followed by a k-means pass.
    KMeans,

    /// Random responsibilities over the components.
    Random

}

/// HMM training algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {

    /// Expected counts from the forward-backward posteriors.
    BaumWelch,

    /// Hard counts along the most likely state path.
    Viterbi

}

/// Configuration shared by every iterative estimator. Can be read from JSON, with
/// absent fields taking their default values:
///
/// ```
/// use pomelo::fit::FitSettings;
///
/// let s : FitSettings = serde_json::from_str(r#"{ "n_jobs" : 4, "seed" : 1 }"#).unwrap();
/// assert_eq!(s.max_iterations, 1000);
/// assert_eq!(s.n_jobs, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitSettings {

    pub max_iterations : usize,

    /// EM stops once an iteration improves the total log-likelihood by less than this.
    pub stop_threshold : f64,

    pub inertia : f64,

    /// Number of shards (and worker threads) of each expectation step.
    pub n_jobs : usize,

    pub init : Init,

    /// Seed of the random source used by initialization; entropy when absent.
    pub seed : Option<u64>,

    pub algorithm : Algorithm

}

impl Default for FitSettings {

    fn default() -> Self {
        Self {
            max_iterations : 1000,
            stop_threshold : 0.1,
            inertia : 0.0,
            n_jobs : 1,
            init : Init::KMeans,
            seed : None,
            algorithm : Algorithm::BaumWelch
        }
    }

}

impl FitSettings {

    pub fn max_iterations(mut self, max_iterations : usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn stop_threshold(mut self, stop_threshold : f64) -> Self {
        self.stop_threshold = stop_threshold;
        self
    }

    pub fn inertia(mut self, inertia : f64) -> Self {
        self.inertia = inertia;
        self
    }

    pub fn n_jobs(mut self, n_jobs : usize) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    pub fn init(mut self, init : Init) -> Self {
        self.init = init;
        self
    }

    pub fn seed(mut self, seed : u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn algorithm(mut self, algorithm : Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_jobs == 0 {
            return Err(Error::ModelConfiguration("n_jobs must be at least 1".to_string()));
        }
        if !(self.stop_threshold >= 0.0) {
            return Err(Error::ModelConfiguration(format!("Invalid stop threshold {}", self.stop_threshold)));
        }
        calc::check_inertia(self.inertia)
    }

    /// Random source for initialization.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy()
        }
    }

}

/// A model estimated by expectation-maximization over items of type Item
/// (rows, labeled rows, sequences). The trainer only talks to this interface:
/// expectation(.) adds the statistics of a batch into the model's accumulators
/// and returns the batch log-likelihood under the current parameters;
/// maximization(.) consumes the accumulators. Shards are processed by private
/// accumulator copies that are later absorbed in shard order.
pub trait Trainable
where
    Self : Sized + Send + Sync
{

    type Item : Sync;

    /// Copy of the model with cleared accumulators, owned by one shard.
    fn accumulator(&self) -> Self;

    fn expectation(&mut self, items : &[Self::Item], weights : &[f64]) -> Result<f64>;

    /// Adds the accumulators of a shard copy into self.
    fn absorb(&mut self, other : Self) -> Result<()>;

    fn maximization(&mut self, inertia : f64) -> Result<()>;

    /// Clears every accumulator.
    fn reset(&mut self);

}

/// Progress report handed to the training observer after each iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Iteration {
    pub iteration : usize,
    pub log_likelihood : f64,
    pub improvement : f64
}

/// Outcome of an EM run. Reaching max_iterations is not an error: converged
/// stays false and the last model is kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {

    /// Total log-likelihood before the first update and after each update.
    pub log_likelihoods : Vec<f64>,

    pub iterations : usize,

    pub improvement : f64,

    pub converged : bool

}

impl History {

    pub fn final_log_likelihood(&self) -> Option<f64> {
        self.log_likelihoods.last().cloned()
    }

}

/// Runs EM over the items until the improvement of an iteration falls below
/// settings.stop_threshold or max_iterations is reached. Each iteration performs
/// one maximization followed by one sharded expectation, whose total log-likelihood
/// evaluates the updated parameters.
pub fn train<M>(
    model : &mut M,
    items : &[M::Item],
    weights : Option<&[f64]>,
    settings : &FitSettings,
    mut observer : Option<&mut dyn FnMut(&Iteration)>
) -> Result<History>
where
    M : Trainable
{
    settings.validate()?;
    let weights = calc::resolve_weights(items.len(), weights)?;
    let pool = parallel::pool(settings.n_jobs)?;
    let mut history = History::default();
    let initial = parallel::accumulate(model, items, &weights, pool.as_ref())?;
    history.log_likelihoods.push(initial);
    let mut last = initial;
    for iteration in 1..=settings.max_iterations {
        model.maximization(settings.inertia)?;
        let ll = parallel::accumulate(model, items, &weights, pool.as_ref())?;
        let improvement = if ll == last { 0.0 } else { ll - last };
        debug!(iteration, log_likelihood = ll, improvement, "EM iteration");
        if improvement < -1E-8 * last.abs().max(1.0) {
            warn!(iteration, improvement, "Log-likelihood decreased between EM iterations");
        }
        history.log_likelihoods.push(ll);
        history.iterations = iteration;
        if let Some(obs) = observer.as_deref_mut() {
            obs(&Iteration { iteration, log_likelihood : ll, improvement });
        }
        last = ll;
        if !(improvement >= settings.stop_threshold) {
            history.converged = true;
            break;
        }
    }
    history.improvement = last - initial;
    model.reset();
    Ok(history)
}
