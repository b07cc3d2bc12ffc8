use std::any::Any;
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use rand::RngCore;
use serde_json::{json, Value};
use crate::prob::*;
use crate::calc;
use crate::error::{Error, Result};
use crate::model::Record;

type Table = BTreeMap<Vec<String>, BTreeMap<String, f64>>;

const PROB_TOL : f64 = 1E-6;

/// Discrete conditional distribution P(child | parents) over k discrete parents.
/// Samples are rows (parent_1, ..., parent_k, child), so the dimension is k + 1.
/// Each observed parent configuration holds its own normalized row; unseen
/// configurations or children score NEG_INFINITY.
#[derive(Debug, Clone)]
pub struct ConditionalTable {

    parents : usize,

    probs : Table,

    counts : Table,

    frozen : bool

}

fn keys(x : &[Datum]) -> Option<Vec<String>> {
    x.iter().map(|d| d.key().map(|k| k.into_owned() ) ).collect()
}

impl ConditionalTable {

    /// Builds the table from (parent configuration, child, probability) entries.
    /// Rows must sum to one within each parent configuration.
    pub fn new<S>(parents : usize, entries : Vec<(Vec<S>, S, f64)>) -> Result<Self>
    where
        S : Into<String>
    {
        let mut t = Self::blank(parents);
        for (cfg, child, p) in entries {
            if cfg.len() != parents {
                return Err(Error::shape(parents, cfg.len()));
            }
            if !(p >= 0.0) || !p.is_finite() {
                return Err(Error::ModelConfiguration(format!("Invalid conditional probability {}", p)));
            }
            let cfg : Vec<String> = cfg.into_iter().map(|s| s.into() ).collect();
            t.probs.entry(cfg).or_default().insert(child.into(), p);
        }
        for (cfg, row) in t.probs.iter() {
            let total : f64 = row.values().sum();
            if (total - 1.0).abs() > PROB_TOL {
                return Err(Error::ModelConfiguration(format!("Conditional row {:?} sums to {}", cfg, total)));
            }
        }
        Ok(t)
    }

    pub fn blank(parents : usize) -> Self {
        Self { parents, probs : Table::new(), counts : Table::new(), frozen : false }
    }

    pub fn from_samples(parents : usize, xs : &[Row], weights : Option<&[f64]>) -> Result<Self> {
        let mut t = Self::blank(parents);
        t.fit(xs, weights, 0.0)?;
        Ok(t)
    }

    pub fn parents(&self) -> usize {
        self.parents
    }

    /// Probability of child given a parent configuration (zero when unseen).
    pub fn prob_of(&self, parents : &[&str], child : &str) -> f64 {
        let cfg : Vec<String> = parents.iter().map(|s| s.to_string() ).collect();
        self.probs.get(&cfg).and_then(|row| row.get(child) ).cloned().unwrap_or(0.0)
    }

    /// Draws a child for the informed parent values, or None when the
    /// configuration was never observed.
    pub fn sample_child(&self, parents : &[Datum], rng : &mut dyn RngCore) -> Option<Datum> {
        use rand::Rng;
        let cfg = keys(parents)?;
        let row = self.probs.get(&cfg)?;
        let u : f64 = rng.gen();
        let mut acc = 0.0;
        let mut last = None;
        for (child, p) in row.iter() {
            if *p > 0.0 {
                last = Some(child);
            }
            acc += p;
            if u < acc {
                return Some(Datum::Symbol(child.clone()));
            }
        }
        last.map(|c| Datum::Symbol(c.clone()) )
    }

    pub(crate) fn from_record(rec : &Record) -> Result<Self> {
        expect_record(rec, "ConditionalTable", 2)?;
        let parents = rec.parameters[0].as_u64()
            .ok_or_else(|| Error::Schema("ConditionalTable record requires the number of parents".to_string()) )? as usize;
        let entries = rec.parameters[1].as_array()
            .ok_or_else(|| Error::Schema("ConditionalTable record requires an entry array".to_string()) )?;
        let mut decoded = Vec::new();
        for entry in entries {
            decoded.push(decode_entry(entry, parents)?);
        }
        Self::new(parents, decoded).map_err(|e| Error::Schema(e.to_string()) )
    }

}

fn decode_entry(entry : &Value, parents : usize) -> Result<(Vec<String>, String, f64)> {
    let invalid = || Error::Schema(format!("Invalid conditional table entry: {}", entry));
    let items = entry.as_array().filter(|a| a.len() == parents + 2 ).ok_or_else(invalid)?;
    let mut cfg = Vec::with_capacity(parents);
    for v in &items[..parents] {
        cfg.push(v.as_str().ok_or_else(invalid)?.to_string());
    }
    let child = items[parents].as_str().ok_or_else(invalid)?.to_string();
    let p = items[parents + 1].as_f64().ok_or_else(invalid)?;
    Ok((cfg, child, p))
}

impl Distribution for ConditionalTable {

    fn kind(&self) -> &'static str {
        "ConditionalTable"
    }

    fn dim(&self) -> usize {
        self.parents + 1
    }

    fn log_probability(&self, x : &[Datum]) -> Result<f64> {
        check_dim(x, self.dim())?;
        let mut ks = match keys(x) {
            Some(ks) => ks,
            None => return Ok(0.0)
        };
        let child = ks.pop().unwrap_or_default();
        Ok(self.probs.get(&ks)
            .and_then(|row| row.get(&child) )
            .map(|p| p.ln() )
            .unwrap_or(f64::NEG_INFINITY))
    }

    /// Draws a parent configuration uniformly among the known ones, then the child.
    fn sample(&self, rng : &mut dyn RngCore) -> Row {
        use rand::Rng;
        if self.probs.is_empty() {
            return vec![Datum::Missing; self.dim()];
        }
        let ix = rng.gen_range(0..self.probs.len());
        let cfg : Vec<Datum> = match self.probs.keys().nth(ix) {
            Some(cfg) => cfg.iter().map(|s| Datum::Symbol(s.clone()) ).collect(),
            None => return vec![Datum::Missing; self.dim()]
        };
        let child = self.sample_child(&cfg, rng).unwrap_or(Datum::Missing);
        let mut row = cfg;
        row.push(child);
        row
    }

    fn summarize(&mut self, xs : &[Row], weights : Option<&[f64]>) -> Result<()> {
        let ws = calc::resolve_weights(xs.len(), weights)?;
        for (x, w) in xs.iter().zip(ws.iter()) {
            check_dim(x, self.dim())?;
            if *w <= 0.0 {
                continue;
            }
            if let Some(mut ks) = keys(x) {
                let child = ks.pop().unwrap_or_default();
                *self.counts.entry(ks).or_default().entry(child).or_insert(0.0) += w;
            }
        }
        Ok(())
    }

    /// Re-estimates the rows of the parent configurations that received counts.
    /// Rows of configurations absent from the summaries keep their probabilities.
    fn from_summaries(&mut self, inertia : f64) -> Result<()> {
        calc::check_inertia(inertia)?;
        if self.frozen {
            return Ok(());
        }
        if self.summary_weight() <= 0.0 {
            return Err(no_weight(self.kind()));
        }
        let counts = std::mem::take(&mut self.counts);
        for (cfg, row) in counts {
            let total : f64 = row.values().sum();
            if total <= 0.0 {
                continue;
            }
            let probs = self.probs.entry(cfg).or_default();
            for p in probs.values_mut() {
                *p *= inertia;
            }
            for (child, c) in row {
                *probs.entry(child).or_insert(0.0) += (1. - inertia) * c / total;
            }
            // A configuration seen for the first time under inertia gets a proper row.
            let mass : f64 = probs.values().sum();
            if mass > 0.0 && (mass - 1.0).abs() > PROB_TOL {
                for p in probs.values_mut() {
                    *p /= mass;
                }
            }
        }
        Ok(())
    }

    fn clear_summaries(&mut self) {
        self.counts.clear();
    }

    fn merge_summaries(&mut self, other : &dyn Distribution) -> Result<()> {
        let other = peer(self, other)?;
        for (cfg, row) in other.counts.iter() {
            let dst = self.counts.entry(cfg.clone()).or_default();
            for (child, c) in row.iter() {
                *dst.entry(child.clone()).or_insert(0.0) += c;
            }
        }
        Ok(())
    }

    fn summary_weight(&self) -> f64 {
        self.counts.values().map(|row| row.values().sum::<f64>() ).sum()
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
        Box::new(ConditionalTable::blank(self.parents))
    }

    fn boxed_clone(&self) -> Box<dyn Distribution> {
        Box::new(self.clone())
    }

    fn to_record(&self) -> Record {
        let mut entries = Vec::new();
        for (cfg, row) in self.probs.iter() {
            for (child, p) in row.iter() {
                let mut e : Vec<Value> = cfg.iter().map(|s| json!(s) ).collect();
                e.push(json!(child));
                e.push(json!(p));
                entries.push(Value::Array(e));
            }
        }
        Record::new(self.kind(), self.dim(), vec![json!(self.parents), Value::Array(entries)])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

}

impl Display for ConditionalTable {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConditionalTable(parents = {}, configurations = {})", self.parents, self.probs.len())
    }

}

#[cfg(test)]
mod tests {

    use super::*;

    fn row(items : &[&str]) -> Row {
        items.iter().map(|s| Datum::from(*s) ).collect()
    }

    #[test]
    fn rows_are_normalized_per_configuration() {
        let xs = vec![row(&["a", "x"]), row(&["a", "y"]), row(&["a", "y"]), row(&["b", "x"])];
        let t = ConditionalTable::from_samples(1, &xs, None).unwrap();
        assert!((t.prob_of(&["a"], "y") - 2. / 3.).abs() < 1E-12);
        assert!((t.prob_of(&["b"], "x") - 1.0).abs() < 1E-12);
        assert_eq!(t.log_probability(&row(&["b", "y"])).unwrap(), f64::NEG_INFINITY);
        assert_eq!(t.log_probability(&row(&["c", "x"])).unwrap(), f64::NEG_INFINITY);
        assert!(matches!(t.log_probability(&row(&["a"])), Err(Error::Shape { .. })));
    }

    #[test]
    fn unseen_configurations_keep_their_rows() {
        let mut t = ConditionalTable::new(1, vec![
            (vec!["a"], "x", 0.5), (vec!["a"], "y", 0.5), (vec!["b"], "x", 0.2), (vec!["b"], "y", 0.8)
        ]).unwrap();
        t.fit(&[row(&["a", "x"]), row(&["a", "x"])], None, 0.0).unwrap();
        assert_eq!(t.prob_of(&["a"], "x"), 1.0);
        assert_eq!(t.prob_of(&["a"], "y"), 0.0);
        assert_eq!(t.prob_of(&["b"], "y"), 0.8);
        assert_eq!(t.summary_weight(), 0.0);
    }

    #[test]
    fn invalid_rows_are_rejected() {
        let bad = ConditionalTable::new(1, vec![(vec!["a"], "x", 0.4), (vec!["a"], "y", 0.4)]);
        assert!(bad.is_err());
    }

    #[test]
    fn record_keeps_entries() {
        let t = ConditionalTable::new(1, vec![(vec!["a"], "x", 0.3), (vec!["a"], "y", 0.7)]).unwrap();
        let back = ConditionalTable::from_record(&t.to_record()).unwrap();
        assert_eq!(back.prob_of(&["a"], "y"), 0.7);
    }

}
