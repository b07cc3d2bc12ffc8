use std::any::Any;
use std::collections::HashMap;
use std::fmt::{self, Display};
use rand::RngCore;
use serde_json::json;
use crate::prob::*;
use crate::calc;
use crate::error::{Error, Result};
use crate::model::Record;

/// Categorical distribution over a finite set of symbols. Symbols absent from
/// the support have probability zero (log-probability NEG_INFINITY) instead of
/// failing. Symbols first seen during estimation join the support with their
/// estimated probability; under inertia they receive (1 - inertia) times it,
/// since their previous probability was zero.
///
/// # Example
///
/// ```
/// use pomelo::prob::*;
///
/// let d = Discrete::new(vec![("A", 0.1), ("C", 0.25), ("G", 0.5), ("T", 0.15)]).unwrap();
/// assert_eq!(d.probability(&[Datum::from("?")]).unwrap(), 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct Discrete {

    symbols : Vec<String>,

    index : HashMap<String, usize>,

    probs : Vec<f64>,

    log_probs : Vec<f64>,

    // Weighted counts, aligned with symbols.
    counts : Vec<f64>,

    frozen : bool

}

const PROB_TOL : f64 = 1E-6;

impl Discrete {

    /// Builds the distribution from (symbol, probability) pairs, which must be
    /// non-negative, unique and sum to one.
    pub fn new<S>(pairs : Vec<(S, f64)>) -> Result<Self>
    where
        S : Into<String>
    {
        let mut d = Self::blank();
        for (s, p) in pairs {
            let s : String = s.into();
            if !(p >= 0.0) || !p.is_finite() {
                return Err(Error::ModelConfiguration(format!("Invalid probability {} for symbol '{}'", p, s)));
            }
            if d.index.contains_key(&s) {
                return Err(Error::ModelConfiguration(format!("Repeated symbol '{}'", s)));
            }
            let ix = d.insert(s);
            d.probs[ix] = p;
        }
        let total : f64 = d.probs.iter().sum();
        if (total - 1.0).abs() > PROB_TOL {
            return Err(Error::ModelConfiguration(format!("Discrete probabilities sum to {}", total)));
        }
        d.update_cache();
        Ok(d)
    }

    /// Equal probability over the informed symbols.
    pub fn uniform<S>(symbols : Vec<S>) -> Result<Self>
    where
        S : Into<String>
    {
        let n = symbols.len() as f64;
        Self::new(symbols.into_iter().map(|s| (s, 1. / n) ).collect())
    }

    /// Empty support: every symbol has probability zero.
    pub fn blank() -> Self {
        Self {
            symbols : Vec::new(),
            index : HashMap::new(),
            probs : Vec::new(),
            log_probs : Vec::new(),
            counts : Vec::new(),
            frozen : false
        }
    }

    pub fn from_samples(xs : &[Row], weights : Option<&[f64]>) -> Result<Self> {
        let mut d = Self::blank();
        d.fit(xs, weights, 0.0)?;
        Ok(d)
    }

    /// Symbols in insertion order.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn probabilities(&self) -> &[f64] {
        &self.probs
    }

    /// Probability of a symbol (zero when outside the support).
    pub fn prob_of(&self, symbol : &str) -> f64 {
        self.index.get(symbol).map(|ix| self.probs[*ix] ).unwrap_or(0.0)
    }

    pub(crate) fn log_prob_of(&self, symbol : &str) -> f64 {
        self.index.get(symbol).map(|ix| self.log_probs[*ix] ).unwrap_or(f64::NEG_INFINITY)
    }

    // Adds a symbol with zero probability and zero count, returning its index.
    fn insert(&mut self, symbol : String) -> usize {
        if let Some(ix) = self.index.get(&symbol).copied() {
            return ix;
        }
        let ix = self.symbols.len();
        self.index.insert(symbol.clone(), ix);
        self.symbols.push(symbol);
        self.probs.push(0.0);
        self.log_probs.push(f64::NEG_INFINITY);
        self.counts.push(0.0);
        ix
    }

    fn update_cache(&mut self) {
        self.log_probs = self.probs.iter().map(|p| p.ln() ).collect();
    }

    pub(crate) fn add_count(&mut self, symbol : &str, w : f64) {
        let ix = match self.index.get(symbol).copied() {
            Some(ix) => ix,
            None => self.insert(symbol.to_string())
        };
        self.counts[ix] += w;
    }

    pub(crate) fn from_record(rec : &Record) -> Result<Self> {
        expect_record(rec, "Discrete", 1)?;
        let pairs = rec.parameters[0].as_array()
            .ok_or_else(|| Error::Schema("Discrete record requires an array of [symbol, probability] pairs".to_string()) )?;
        let mut decoded = Vec::new();
        for pair in pairs {
            match pair.as_array().map(|p| (p.get(0).and_then(|s| s.as_str() ), p.get(1).and_then(|p| p.as_f64() )) ) {
                Some((Some(s), Some(p))) => decoded.push((s.to_string(), p)),
                _ => return Err(Error::Schema(format!("Invalid Discrete entry: {}", pair)))
            }
        }
        if decoded.is_empty() {
            return Ok(Self::blank());
        }
        Self::new(decoded).map_err(|e| Error::Schema(e.to_string()) )
    }

}

impl Distribution for Discrete {

    fn kind(&self) -> &'static str {
        "Discrete"
    }

    fn dim(&self) -> usize {
        1
    }

    fn log_probability(&self, x : &[Datum]) -> Result<f64> {
        match univariate(x)?.key() {
            Some(k) => Ok(self.log_prob_of(&k)),
            None => Ok(0.0)
        }
    }

    fn sample(&self, rng : &mut dyn RngCore) -> Row {
        use rand::Rng;
        let u : f64 = rng.gen();
        let mut acc = 0.0;
        for (s, p) in self.symbols.iter().zip(self.probs.iter()) {
            acc += p;
            if u < acc {
                return vec![Datum::Symbol(s.clone())];
            }
        }
        // Rounding left u above the cumulative sum: take the last symbol with mass.
        match self.symbols.iter().zip(self.probs.iter()).rev().find(|(_, p)| **p > 0.0 ) {
            Some((s, _)) => vec![Datum::Symbol(s.clone())],
            None => vec![Datum::Missing]
        }
    }

    fn summarize(&mut self, xs : &[Row], weights : Option<&[f64]>) -> Result<()> {
        let w = calc::resolve_weights(xs.len(), weights)?;
        for (x, w) in xs.iter().zip(w.iter()) {
            if let Some(k) = univariate(x)?.key() {
                if *w > 0.0 {
                    self.add_count(&k, *w);
                }
            }
        }
        Ok(())
    }

    fn from_summaries(&mut self, inertia : f64) -> Result<()> {
        calc::check_inertia(inertia)?;
        if self.frozen {
            return Ok(());
        }
        let total : f64 = self.counts.iter().sum();
        if total <= 0.0 {
            return Err(no_weight(self.kind()));
        }
        for (p, c) in self.probs.iter_mut().zip(self.counts.iter()) {
            *p = calc::blend(inertia, *p, *c / total);
        }
        self.update_cache();
        self.clear_summaries();
        Ok(())
    }

    fn clear_summaries(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0.0 );
    }

    fn merge_summaries(&mut self, other : &dyn Distribution) -> Result<()> {
        let other = peer(self, other)?;
        for (s, c) in other.symbols.iter().zip(other.counts.iter()) {
            if *c > 0.0 {
                self.add_count(s, *c);
            }
        }
        Ok(())
    }

    fn summary_weight(&self) -> f64 {
        self.counts.iter().sum()
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
        Box::new(Discrete::blank())
    }

    fn boxed_clone(&self) -> Box<dyn Distribution> {
        Box::new(self.clone())
    }

    fn to_record(&self) -> Record {
        let pairs : Vec<_> = self.symbols.iter()
            .zip(self.probs.iter())
            .map(|(s, p)| json!([s, p]) )
            .collect();
        Record::new(self.kind(), 1, vec![json!(pairs)])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

}

impl Display for Discrete {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Discrete(")?;
        for (i, (s, p)) in self.symbols.iter().zip(self.probs.iter()).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", s, p)?;
        }
        write!(f, ")")
    }

}
