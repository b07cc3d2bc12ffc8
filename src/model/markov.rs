use rand::RngCore;
use crate::prob::*;
use crate::calc;
use crate::error::{Error, Result};
use crate::model::{self, Record};

/// Markov chain of order n - 1 over a sequence of discrete values, given as n
/// distributions: the first is the marginal of the first position, and the i-th
/// (i > 0) is a distribution of dimension i + 1 over the window (x[t-i], ..., x[t]),
/// usually a ConditionalTable with i parents. Positions t >= n - 1 all use the last
/// distribution over the preceding n - 1 values.
#[derive(Debug, Clone)]
pub struct MarkovChain {
    distributions : Vec<Box<dyn Distribution>>
}

impl MarkovChain {

    pub fn new(distributions : Vec<Box<dyn Distribution>>) -> Result<Self> {
        if distributions.is_empty() {
            return Err(Error::ModelConfiguration("Markov chain requires at least one distribution".to_string()));
        }
        for (i, d) in distributions.iter().enumerate() {
            if d.dim() != i + 1 {
                return Err(Error::ModelConfiguration(format!(
                    "Distribution {} of a Markov chain must have dimension {} (found {})", i, i + 1, d.dim()
                )));
            }
        }
        Ok(Self { distributions })
    }

    /// Estimates a chain of the informed order (0 for independent positions) from
    /// sequences: a Discrete marginal followed by conditional tables with
    /// 1..=order parents.
    pub fn from_samples(sequences : &[Vec<Datum>], order : usize, weights : Option<&[f64]>) -> Result<Self> {
        let mut dists : Vec<Box<dyn Distribution>> = vec![Box::new(Discrete::blank())];
        for k in 1..=order {
            dists.push(Box::new(ConditionalTable::blank(k)));
        }
        let mut mc = Self::new(dists)?;
        mc.fit(sequences, weights, 0.0)?;
        Ok(mc)
    }

    pub fn order(&self) -> usize {
        self.distributions.len() - 1
    }

    pub fn distributions(&self) -> &[Box<dyn Distribution>] {
        &self.distributions
    }

    // Distribution and window start used at position t.
    fn position(&self, t : usize) -> (usize, usize) {
        let j = t.min(self.distributions.len() - 1);
        (j, t - j)
    }

    pub fn log_probability(&self, sequence : &[Datum]) -> Result<f64> {
        if sequence.is_empty() {
            return Err(Error::Input("Empty sequence".to_string()));
        }
        let mut lp = 0.0;
        for t in 0..sequence.len() {
            let (j, start) = self.position(t);
            lp += self.distributions[j].log_probability(&sequence[start..=t])?;
            if lp == f64::NEG_INFINITY {
                break;
            }
        }
        Ok(lp)
    }

    pub fn probability(&self, sequence : &[Datum]) -> Result<f64> {
        Ok(self.log_probability(sequence)?.exp())
    }

    /// Adds the windows of each sequence to the statistics of the distribution
    /// responsible for them. Distribution j < n - 1 only sees position j, so it
    /// only learns from sequences longer than j.
    pub fn summarize(&mut self, sequences : &[Vec<Datum>], weights : Option<&[f64]>) -> Result<()> {
        let w = calc::resolve_weights(sequences.len(), weights)?;
        let n = self.distributions.len();
        let mut rows : Vec<Vec<Row>> = vec![Vec::new(); n];
        let mut row_weights : Vec<Vec<f64>> = vec![Vec::new(); n];
        for (seq, w) in sequences.iter().zip(w.iter()) {
            if seq.is_empty() {
                return Err(Error::Input("Empty sequence".to_string()));
            }
            for t in 0..seq.len() {
                let (j, start) = self.position(t);
                rows[j].push(seq[start..=t].to_vec());
                row_weights[j].push(*w);
            }
        }
        for (j, dist) in self.distributions.iter_mut().enumerate() {
            if !rows[j].is_empty() {
                dist.summarize(&rows[j], Some(&row_weights[j][..]))?;
            }
        }
        Ok(())
    }

    /// Updates every distribution that received data; the others keep their
    /// parameters. When one update fails, none is applied.
    pub fn from_summaries(&mut self, inertia : f64) -> Result<()> {
        calc::check_inertia(inertia)?;
        if self.distributions.iter().all(|d| d.summary_weight() <= 0.0 ) {
            return Err(Error::InsufficientData("Markov chain accumulators hold zero weight".to_string()));
        }
        let mut dists : Vec<&mut Box<dyn Distribution>> = self.distributions.iter_mut().collect();
        update_jointly(&mut dists, inertia, false)?;
        Ok(())
    }

    pub fn clear_summaries(&mut self) {
        self.distributions.iter_mut().for_each(|d| d.clear_summaries() );
    }

    pub fn fit(&mut self, sequences : &[Vec<Datum>], weights : Option<&[f64]>, inertia : f64) -> Result<()> {
        self.clear_summaries();
        self.summarize(sequences, weights)?;
        self.from_summaries(inertia)
    }

    /// Generates a sequence of the informed length. Positions after the first are
    /// drawn from the conditional tables given the preceding window; the sequence
    /// ends early when a window was never observed.
    pub fn sample(&self, length : usize, rng : &mut dyn RngCore) -> Result<Vec<Datum>> {
        let mut seq = Vec::with_capacity(length);
        for t in 0..length {
            let (j, start) = self.position(t);
            let next = if j == 0 {
                self.distributions[0].sample(rng).pop()
            } else {
                let table = self.distributions[j].as_any()
                    .downcast_ref::<ConditionalTable>()
                    .ok_or_else(|| Error::ModelConfiguration(format!(
                        "Cannot sample Markov chain position from {}", self.distributions[j].kind()
                    )))?;
                table.sample_child(&seq[start..t], rng)
            };
            match next {
                Some(Datum::Missing) | None => break,
                Some(v) => seq.push(v)
            }
        }
        Ok(seq)
    }

    pub fn to_record(&self) -> Record {
        Record::new("MarkovChain", 1, Vec::new())
            .with_components(self.distributions.iter().map(|d| d.to_record() ).collect())
    }

    pub(crate) fn from_record(rec : &Record) -> Result<Self> {
        rec.expect_kind("MarkovChain")?;
        let dists = rec.components.iter()
            .map(model::from_record)
            .collect::<Result<Vec<_>>>()?;
        Self::new(dists).map_err(|e| Error::Schema(e.to_string()) )
    }

}

#[cfg(test)]
mod tests {

    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn seq(s : &str) -> Vec<Datum> {
        s.chars().map(|c| Datum::Symbol(c.to_string()) ).collect()
    }

    #[test]
    fn first_order_chain_counts_transitions() {
        let seqs = vec![seq("aab"), seq("ab"), seq("ba")];
        let mc = MarkovChain::from_samples(&seqs, 1, None).unwrap();
        // P(a) = 2/3 at the first position; transitions a->a 1, a->b 2, b->a 1.
        let lp = mc.log_probability(&seq("aab")).unwrap();
        let expected = (2f64 / 3.).ln() + (1f64 / 3.).ln() + (2f64 / 3.).ln();
        assert!((lp - expected).abs() < 1E-12);
        assert_eq!(mc.log_probability(&seq("bb")).unwrap(), f64::NEG_INFINITY);
        assert!(matches!(mc.log_probability(&[]), Err(Error::Input(_))));
    }

    #[test]
    fn samples_follow_deterministic_transitions() {
        let seqs = vec![seq("abab"), seq("abab")];
        let mc = MarkovChain::from_samples(&seqs, 1, None).unwrap();
        let s = mc.sample(6, &mut StdRng::seed_from_u64(2)).unwrap();
        assert_eq!(s, seq("ababab"));
    }

    #[test]
    fn dimensions_are_validated() {
        let r = MarkovChain::new(vec![Box::new(Discrete::blank()), Box::new(ConditionalTable::blank(2))]);
        assert!(matches!(r, Err(Error::ModelConfiguration(_))));
    }

}
