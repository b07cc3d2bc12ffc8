use std::fmt::{self, Display};
use nalgebra::DMatrix;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use rand::{Rng, RngCore};
use serde_json::json;
use tracing::{debug, warn};
use crate::prob::*;
use crate::calc;
use crate::fit::{self, Algorithm, FitSettings, History, Init, Iteration, Trainable};
use crate::fit::cluster::{self, KMeans, KMeansSettings, Seeding};
use crate::error::{Error, Result};
use crate::model::{self, Record};

/// Hidden state: a name and the distribution of the rows it emits.
#[derive(Debug, Clone)]
pub struct State {

    pub name : String,

    pub emission : Box<dyn Distribution>

}

/// Describes an HMM as a directed graph with states at the nodes and transition
/// probabilities at the edges. Self-loops and cycles are allowed. Absent edges are
/// structural zeros that training never revives.
///
/// ```
/// use pomelo::prob::{Normal, Datum};
/// use pomelo::model::HmmBuilder;
///
/// let mut builder = HmmBuilder::new();
/// let low = builder.add_state("low", Box::new(Normal::new(0.0, 1.0)));
/// let high = builder.add_state("high", Box::new(Normal::new(5.0, 1.0)));
/// builder.add_transition(low, low, 0.9).unwrap();
/// builder.add_transition(low, high, 0.1).unwrap();
/// builder.add_transition(high, high, 1.0).unwrap();
/// builder.set_start(low, 1.0).unwrap();
/// let hmm = builder.bake().unwrap();
/// let seq = vec![vec![Datum::Real(0.1)], vec![Datum::Real(4.8)]];
/// assert_eq!(hmm.predict(&seq).unwrap(), vec![0, 1]);
/// ```
#[derive(Debug)]
pub struct HmmBuilder {
    graph : DiGraph<State, f64>,
    starts : Vec<(NodeIndex, f64)>
}

impl HmmBuilder {

    pub fn new() -> Self {
        Self { graph : DiGraph::new(), starts : Vec::new() }
    }

    /// Adds a state, returning the node that identifies it in later calls. States
    /// are indexed by insertion order in the baked model.
    pub fn add_state(&mut self, name : &str, emission : Box<dyn Distribution>) -> NodeIndex {
        self.graph.add_node(State { name : name.to_string(), emission })
    }

    /// Sets the (unnormalized) weight of the from -> to transition, replacing any
    /// previous weight of the same edge.
    pub fn add_transition(&mut self, from : NodeIndex, to : NodeIndex, weight : f64) -> Result<()> {
        self.check_node(from)?;
        self.check_node(to)?;
        check_weight(weight)?;
        self.graph.update_edge(from, to, weight);
        Ok(())
    }

    /// Sets the (unnormalized) initial weight of a state. When no state has an
    /// initial weight, the chain starts uniformly.
    pub fn set_start(&mut self, state : NodeIndex, weight : f64) -> Result<()> {
        self.check_node(state)?;
        check_weight(weight)?;
        match self.starts.iter_mut().find(|(s, _)| *s == state ) {
            Some(entry) => entry.1 = weight,
            None => self.starts.push((state, weight))
        }
        Ok(())
    }

    fn check_node(&self, node : NodeIndex) -> Result<()> {
        if node.index() < self.graph.node_count() {
            Ok(())
        } else {
            Err(Error::ModelConfiguration(format!("Unknown state {}", node.index())))
        }
    }

    /// Normalizes the outgoing weights of every state and the initial weights into
    /// the matrices of the model. A state without outgoing weight fails with
    /// ModelConfiguration.
    pub fn bake(self) -> Result<HiddenMarkovModel> {
        let m = self.graph.node_count();
        let mut trans = DMatrix::zeros(m, m);
        for e in self.graph.edge_references() {
            trans[(e.source().index(), e.target().index())] = *e.weight();
        }
        let start = if self.starts.is_empty() {
            vec![1.0; m]
        } else {
            let mut start = vec![0.0; m];
            for (s, w) in self.starts.iter() {
                start[s.index()] = *w;
            }
            start
        };
        let (nodes, _) = self.graph.into_nodes_edges();
        let states = nodes.into_iter().map(|n| n.weight ).collect();
        HiddenMarkovModel::build(states, trans, start)
    }

}

impl Default for HmmBuilder {

    fn default() -> Self {
        Self::new()
    }

}

fn check_weight(w : f64) -> Result<()> {
    if w.is_finite() && w >= 0.0 {
        Ok(())
    } else {
        Err(Error::ModelConfiguration(format!("Invalid transition weight {}", w)))
    }
}

/// Forward-backward output for one sequence.
#[derive(Debug, Clone)]
pub struct Posterior {

    /// log p(sequence).
    pub log_probability : f64,

    /// Posterior log-probability of each state (columns) at each position (rows).
    pub log_gamma : DMatrix<f64>,

    /// Expected number of times each transition (row state to column state) was taken.
    pub transitions : DMatrix<f64>

}

/// Hidden Markov model over sequences of rows, with arbitrary emission
/// distributions of a common dimension. All recursions run in log-space, so
/// impossible transitions and emissions propagate as NEG_INFINITY.
#[derive(Debug, Clone)]
pub struct HiddenMarkovModel {

    states : Vec<State>,

    trans : DMatrix<f64>,

    log_trans : DMatrix<f64>,

    start : Vec<f64>,

    log_start : Vec<f64>,

    // Expected transition and initial-state counts.
    trans_counts : DMatrix<f64>,

    start_counts : Vec<f64>,

    algorithm : Algorithm

}

impl HiddenMarkovModel {

    /// Builds the model from emission distributions (states named s0, s1, ...), a
    /// square matrix of transition weights and the initial weights. Each row and the
    /// initial weights are normalized; rows that cannot be normalized fail with
    /// ModelConfiguration.
    pub fn from_matrix(
        emissions : Vec<Box<dyn Distribution>>,
        transitions : &[Vec<f64>],
        start : &[f64]
    ) -> Result<Self> {
        let m = emissions.len();
        if transitions.len() != m || transitions.iter().any(|row| row.len() != m ) {
            return Err(Error::ModelConfiguration(format!("Transition matrix must be {} x {}", m, m)));
        }
        let trans = DMatrix::from_fn(m, m, |i, j| transitions[i][j] );
        let states = emissions.into_iter()
            .enumerate()
            .map(|(i, emission)| State { name : format!("s{}", i), emission } )
            .collect();
        Self::build(states, trans, start.to_vec())
    }

    fn build(states : Vec<State>, mut trans : DMatrix<f64>, start : Vec<f64>) -> Result<Self> {
        let m = states.len();
        if m == 0 {
            return Err(Error::ModelConfiguration("HMM requires at least one state".to_string()));
        }
        let d = states[0].emission.dim();
        if let Some(s) = states.iter().find(|s| s.emission.dim() != d ) {
            return Err(Error::ModelConfiguration(format!(
                "Emission of state '{}' has dimension {} (expected {})", s.name, s.emission.dim(), d
            )));
        }
        if trans.shape() != (m, m) || start.len() != m {
            return Err(Error::ModelConfiguration(format!("HMM with {} states requires {} x {} transitions", m, m, m)));
        }
        for i in 0..m {
            let row : Vec<f64> = trans.row(i).iter().cloned().collect();
            let row = model::normalize(&row).map_err(|e| Error::ModelConfiguration(
                format!("Transitions out of state '{}': {}", states[i].name, e)
            ))?;
            for (j, p) in row.into_iter().enumerate() {
                trans[(i, j)] = p;
            }
        }
        let start = model::normalize(&start)
            .map_err(|e| Error::ModelConfiguration(format!("Initial state weights: {}", e)) )?;
        let log_trans = trans.map(|p| p.ln() );
        let log_start = start.iter().map(|p| p.ln() ).collect();
        Ok(Self {
            states,
            trans,
            log_trans,
            start,
            log_start,
            trans_counts : DMatrix::zeros(m, m),
            start_counts : vec![0.0; m],
            algorithm : Algorithm::BaumWelch
        })
    }

    /// Initializes n_states emissions as blank copies of template fitted to a
    /// clustering of every row of every sequence (as set by settings.init), with
    /// uniform transitions, then trains the model.
    pub fn from_samples(
        template : &dyn Distribution,
        n_states : usize,
        sequences : &[Vec<Row>],
        weights : Option<&[f64]>,
        settings : &FitSettings
    ) -> Result<(Self, History)> {
        settings.validate()?;
        if n_states == 0 {
            return Err(Error::ModelConfiguration("HMM requires at least one state".to_string()));
        }
        let w = calc::resolve_weights(sequences.len(), weights)?;
        let mut rows : Vec<Row> = Vec::new();
        let mut row_weights = Vec::new();
        for (seq, w) in sequences.iter().zip(w.iter()) {
            rows.extend(seq.iter().cloned());
            row_weights.extend(std::iter::repeat(*w).take(seq.len()));
        }
        let mut rng = settings.rng();
        let allocations : Vec<usize> = match settings.init {
            Init::Random => rows.iter().map(|_| rng.gen_range(0..n_states) ).collect(),
            Init::FirstK | Init::KMeans => {
                let seeding = if settings.init == Init::FirstK { Seeding::FirstK } else { Seeding::PlusPlus };
                let sample = cluster::real_rows(&rows)?;
                let km = KMeans::estimate(
                    &sample,
                    &row_weights,
                    &KMeansSettings { n_cluster : n_states, max_iter : 100, seeding },
                    &mut rng
                )?;
                debug!(iterations = km.iterations(), "k-means initialization of emissions");
                km.allocations().to_vec()
            }
        };
        let mut emissions = Vec::with_capacity(n_states);
        for s in 0..n_states {
            let resp : Vec<f64> = allocations.iter()
                .zip(row_weights.iter())
                .map(|(a, w)| if *a == s { *w } else { 0.0 } )
                .collect();
            emissions.push(model::seed_component(template, &rows, &resp, &row_weights, s)?);
        }
        let uniform = vec![vec![1.0; n_states]; n_states];
        let mut hmm = Self::from_matrix(emissions, &uniform, &vec![1.0; n_states])?;
        let hist = hmm.fit(sequences, weights, settings)?;
        Ok((hmm, hist))
    }

    /// Trains the model by Baum-Welch, or by Viterbi training when
    /// settings.algorithm says so.
    pub fn fit(&mut self, sequences : &[Vec<Row>], weights : Option<&[f64]>, settings : &FitSettings) -> Result<History> {
        self.algorithm = settings.algorithm;
        fit::train(self, sequences, weights, settings, None)
    }

    pub fn fit_observed(
        &mut self,
        sequences : &[Vec<Row>],
        weights : Option<&[f64]>,
        settings : &FitSettings,
        observer : &mut dyn FnMut(&Iteration)
    ) -> Result<History> {
        self.algorithm = settings.algorithm;
        fit::train(self, sequences, weights, settings, Some(observer))
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn n_states(&self) -> usize {
        self.states.len()
    }

    pub fn state_index(&self, name : &str) -> Option<usize> {
        self.states.iter().position(|s| s.name == name )
    }

    /// Transition probabilities, from row state to column state.
    pub fn transitions(&self) -> &DMatrix<f64> {
        &self.trans
    }

    pub fn start(&self) -> &[f64] {
        &self.start
    }

    pub fn dim(&self) -> usize {
        self.states[0].emission.dim()
    }

    // Log-density of each row (rows) under each emission (columns).
    fn log_emissions(&self, sequence : &[Row]) -> Result<DMatrix<f64>> {
        if sequence.is_empty() {
            return Err(Error::Input("Empty sequence".to_string()));
        }
        let mut e = DMatrix::zeros(sequence.len(), self.states.len());
        for (t, x) in sequence.iter().enumerate() {
            check_dim(x, self.dim())?;
            for (s, state) in self.states.iter().enumerate() {
                e[(t, s)] = state.emission.log_probability(x)?;
            }
        }
        Ok(e)
    }

    fn forward_from(&self, e : &DMatrix<f64>) -> DMatrix<f64> {
        let (n, m) = e.shape();
        let mut alpha = DMatrix::from_element(n, m, f64::NEG_INFINITY);
        for s in 0..m {
            alpha[(0, s)] = self.log_start[s] + e[(0, s)];
        }
        let mut terms = vec![0.0; m];
        for t in 1..n {
            for s in 0..m {
                for r in 0..m {
                    terms[r] = alpha[(t - 1, r)] + self.log_trans[(r, s)];
                }
                alpha[(t, s)] = calc::log_sum_exp(&terms) + e[(t, s)];
            }
        }
        alpha
    }

    fn backward_from(&self, e : &DMatrix<f64>) -> DMatrix<f64> {
        let (n, m) = e.shape();
        let mut beta = DMatrix::zeros(n, m);
        let mut terms = vec![0.0; m];
        for t in (0..n - 1).rev() {
            for s in 0..m {
                for r in 0..m {
                    terms[r] = self.log_trans[(s, r)] + e[(t + 1, r)] + beta[(t + 1, r)];
                }
                beta[(t, s)] = calc::log_sum_exp(&terms);
            }
        }
        beta
    }

    // None when the sequence is impossible under the model.
    fn posterior_from(&self, e : &DMatrix<f64>) -> Option<Posterior> {
        let (n, m) = e.shape();
        let alpha = self.forward_from(e);
        let beta = self.backward_from(e);
        let last : Vec<f64> = alpha.row(n - 1).iter().cloned().collect();
        let log_z = calc::log_sum_exp(&last);
        if log_z == f64::NEG_INFINITY {
            return None;
        }
        let log_gamma = DMatrix::from_fn(n, m, |t, s| alpha[(t, s)] + beta[(t, s)] - log_z );
        let mut transitions = DMatrix::zeros(m, m);
        for t in 0..n - 1 {
            for i in 0..m {
                if alpha[(t, i)] == f64::NEG_INFINITY {
                    continue;
                }
                for j in 0..m {
                    let xi = alpha[(t, i)] + self.log_trans[(i, j)] + e[(t + 1, j)] + beta[(t + 1, j)] - log_z;
                    if xi > f64::NEG_INFINITY {
                        transitions[(i, j)] += xi.exp();
                    }
                }
            }
        }
        Some(Posterior { log_probability : log_z, log_gamma, transitions })
    }

    // Best path log-probability and the path; NEG_INFINITY when no path is possible.
    fn viterbi_from(&self, e : &DMatrix<f64>) -> (f64, Vec<usize>) {
        let (n, m) = e.shape();
        let mut delta = DMatrix::from_element(n, m, f64::NEG_INFINITY);
        let mut back = vec![vec![0; m]; n];
        for s in 0..m {
            delta[(0, s)] = self.log_start[s] + e[(0, s)];
        }
        for t in 1..n {
            for s in 0..m {
                let mut best = f64::NEG_INFINITY;
                let mut best_r = 0;
                for r in 0..m {
                    let v = delta[(t - 1, r)] + self.log_trans[(r, s)];
                    if v > best {
                        best = v;
                        best_r = r;
                    }
                }
                delta[(t, s)] = best + e[(t, s)];
                back[t][s] = best_r;
            }
        }
        let last : Vec<f64> = delta.row(n - 1).iter().cloned().collect();
        let mut s = model::argmax(&last);
        let best = last[s];
        let mut path = vec![0; n];
        for t in (0..n).rev() {
            path[t] = s;
            s = back[t][s];
        }
        (best, path)
    }

    /// Log forward variables: entry (t, s) is log p(x_0..x_t, state_t = s).
    pub fn forward(&self, sequence : &[Row]) -> Result<DMatrix<f64>> {
        let e = self.log_emissions(sequence)?;
        Ok(self.forward_from(&e))
    }

    /// Log backward variables: entry (t, s) is log p(x_t+1..x_T-1 | state_t = s).
    pub fn backward(&self, sequence : &[Row]) -> Result<DMatrix<f64>> {
        let e = self.log_emissions(sequence)?;
        Ok(self.backward_from(&e))
    }

    /// Posterior state probabilities and expected transition counts. Fails with Input
    /// when the sequence has zero probability under the model.
    pub fn forward_backward(&self, sequence : &[Row]) -> Result<Posterior> {
        let e = self.log_emissions(sequence)?;
        self.posterior_from(&e).ok_or_else(impossible)
    }

    pub fn log_probability(&self, sequence : &[Row]) -> Result<f64> {
        let alpha = self.forward(sequence)?;
        let last : Vec<f64> = alpha.row(alpha.nrows() - 1).iter().cloned().collect();
        Ok(calc::log_sum_exp(&last))
    }

    pub fn probability(&self, sequence : &[Row]) -> Result<f64> {
        Ok(self.log_probability(sequence)?.exp())
    }

    /// Most likely state path and its joint log-probability with the sequence.
    pub fn viterbi(&self, sequence : &[Row]) -> Result<(f64, Vec<usize>)> {
        let e = self.log_emissions(sequence)?;
        let (lp, path) = self.viterbi_from(&e);
        if lp == f64::NEG_INFINITY {
            return Err(impossible());
        }
        Ok((lp, path))
    }

    pub fn predict(&self, sequence : &[Row]) -> Result<Vec<usize>> {
        Ok(self.viterbi(sequence)?.1)
    }

    /// Posterior log-probability of each state at each position.
    pub fn predict_log_proba(&self, sequence : &[Row]) -> Result<Vec<Vec<f64>>> {
        let post = self.forward_backward(sequence)?;
        Ok(post.log_gamma.row_iter().map(|r| r.iter().cloned().collect() ).collect())
    }

    pub fn predict_proba(&self, sequence : &[Row]) -> Result<Vec<Vec<f64>>> {
        Ok(self.predict_log_proba(sequence)?
            .into_iter()
            .map(|r| r.iter().map(|l| l.exp() ).collect() )
            .collect())
    }

    /// Draws a sequence of the informed length with its hidden state path.
    pub fn sample(&self, length : usize, rng : &mut dyn RngCore) -> (Vec<Row>, Vec<usize>) {
        let mut rows = Vec::with_capacity(length);
        let mut path = Vec::with_capacity(length);
        if length == 0 {
            return (rows, path);
        }
        let mut s = model::draw_index(&self.start, rng);
        for t in 0..length {
            if t > 0 {
                let row : Vec<f64> = self.trans.row(s).iter().cloned().collect();
                s = model::draw_index(&row, rng);
            }
            path.push(s);
            rows.push(self.states[s].emission.sample(rng));
        }
        (rows, path)
    }

    // Expectation step over a batch of sequences. Emissions accumulate the rows of
    // every usable sequence weighted by the state posteriors (or the hard Viterbi
    // assignments); sequences impossible under the model are skipped.
    fn accumulate(&mut self, sequences : &[Vec<Row>], weights : &[f64]) -> Result<f64> {
        let m = self.states.len();
        let mut rows : Vec<Row> = Vec::new();
        let mut resp : Vec<Vec<f64>> = vec![Vec::new(); m];
        let mut ll = 0.0;
        let mut skipped = 0;
        for (seq, w) in sequences.iter().zip(weights.iter()) {
            if *w <= 0.0 {
                continue;
            }
            let e = self.log_emissions(seq)?;
            match self.algorithm {
                Algorithm::BaumWelch => {
                    let post = match self.posterior_from(&e) {
                        Some(post) => post,
                        None => {
                            skipped += 1;
                            continue;
                        }
                    };
                    ll += w * post.log_probability;
                    for t in 0..seq.len() {
                        for s in 0..m {
                            resp[s].push(w * post.log_gamma[(t, s)].exp());
                        }
                    }
                    for s in 0..m {
                        self.start_counts[s] += w * post.log_gamma[(0, s)].exp();
                    }
                    self.trans_counts += post.transitions * *w;
                },
                Algorithm::Viterbi => {
                    let (lp, path) = self.viterbi_from(&e);
                    if lp == f64::NEG_INFINITY {
                        skipped += 1;
                        continue;
                    }
                    ll += w * lp;
                    for s in path.iter() {
                        for r in 0..m {
                            resp[r].push(if r == *s { *w } else { 0.0 });
                        }
                    }
                    self.start_counts[path[0]] += w;
                    for pair in path.windows(2) {
                        self.trans_counts[(pair[0], pair[1])] += w;
                    }
                }
            }
            rows.extend(seq.iter().cloned());
        }
        if skipped > 0 {
            warn!(skipped, "Sequences with zero probability under the model were skipped");
        }
        if !rows.is_empty() {
            for (state, r) in self.states.iter_mut().zip(resp.iter()) {
                state.emission.summarize(&rows, Some(&r[..]))?;
            }
        }
        Ok(ll)
    }

    // Maximization step. Emissions without weight and transition rows without
    // expected counts keep their parameters.
    fn update(&mut self, inertia : f64) -> Result<()> {
        calc::check_inertia(inertia)?;
        let total_start : f64 = self.start_counts.iter().sum();
        if !(total_start > 0.0) {
            self.reset();
            return Err(Error::InsufficientData("No sequence with positive probability under the HMM".to_string()));
        }
        let mut emissions : Vec<&mut Box<dyn Distribution>> = self.states.iter_mut().map(|s| &mut s.emission ).collect();
        let kept = match update_jointly(&mut emissions, inertia, true) {
            Ok(kept) => kept,
            Err(e) => {
                self.clear_counts();
                return Err(e);
            }
        };
        for (ix, reason) in kept {
            let name = &self.states[ix].name;
            match reason {
                Kept::Empty => warn!(state = %name, "HMM state received no weight; keeping its emission"),
                Kept::Insufficient(msg) => warn!(state = %name, "HMM emission kept its parameters: {}", msg)
            }
        }
        let m = self.states.len();
        for i in 0..m {
            let row_total : f64 = self.trans_counts.row(i).sum();
            if row_total <= 0.0 {
                continue;
            }
            for j in 0..m {
                let p = calc::blend(inertia, self.trans[(i, j)], self.trans_counts[(i, j)] / row_total);
                self.trans[(i, j)] = p;
                self.log_trans[(i, j)] = p.ln();
            }
        }
        for s in 0..m {
            self.start[s] = calc::blend(inertia, self.start[s], self.start_counts[s] / total_start);
            self.log_start[s] = self.start[s].ln();
        }
        self.clear_counts();
        Ok(())
    }

    fn clear_counts(&mut self) {
        self.trans_counts.fill(0.0);
        self.start_counts.iter_mut().for_each(|c| *c = 0.0 );
    }

    /// Record with the state names, the transition matrix (by rows) and the
    /// initial probabilities as parameters, and the emissions as components.
    pub fn to_record(&self) -> Record {
        let m = self.states.len();
        let names : Vec<&str> = self.states.iter().map(|s| &s.name[..] ).collect();
        let rows : Vec<Vec<f64>> = (0..m)
            .map(|i| self.trans.row(i).iter().cloned().collect() )
            .collect();
        Record::new("HiddenMarkovModel", self.dim(), vec![json!(names), json!(rows), json!(self.start)])
            .with_components(self.states.iter().map(|s| s.emission.to_record() ).collect())
    }

    pub(crate) fn from_record(rec : &Record) -> Result<Self> {
        rec.expect_kind("HiddenMarkovModel")?;
        let names : Vec<String> = serde_json::from_value(rec.param(0)?.clone())
            .map_err(|e| Error::Schema(format!("HMM state names: {}", e)) )?;
        let rows : Vec<Vec<f64>> = serde_json::from_value(rec.param(1)?.clone())
            .map_err(|e| Error::Schema(format!("HMM transitions: {}", e)) )?;
        let start = record_vec(rec, 2)?;
        if names.len() != rec.components.len() || rows.len() != names.len() || rows.iter().any(|r| r.len() != names.len() ) {
            return Err(Error::Schema(format!("HMM record with {} states has inconsistent parameters", names.len())));
        }
        let mut states = Vec::with_capacity(names.len());
        for (name, c) in names.into_iter().zip(rec.components.iter()) {
            states.push(State { name, emission : model::from_record(c)? });
        }
        let m = states.len();
        let trans = DMatrix::from_fn(m, m, |i, j| rows[i][j] );
        let hmm = Self::build(states, trans, start).map_err(|e| Error::Schema(e.to_string()) )?;
        if hmm.dim() != rec.d {
            return Err(Error::Schema(format!("HMM record declares d = {} but holds d = {}", rec.d, hmm.dim())));
        }
        Ok(hmm)
    }

}

fn impossible() -> Error {
    Error::Input("Sequence has zero probability under the HMM".to_string())
}

impl Trainable for HiddenMarkovModel {

    type Item = Vec<Row>;

    fn accumulator(&self) -> Self {
        let mut acc = self.clone();
        acc.reset();
        acc
    }

    fn expectation(&mut self, items : &[Vec<Row>], weights : &[f64]) -> Result<f64> {
        self.accumulate(items, weights)
    }

    fn absorb(&mut self, other : Self) -> Result<()> {
        if other.states.len() != self.states.len() {
            return Err(Error::ModelConfiguration("Cannot merge HMMs with different numbers of states".to_string()));
        }
        for (dst, src) in self.states.iter_mut().zip(other.states.iter()) {
            dst.emission.merge_summaries(src.emission.as_ref())?;
        }
        self.trans_counts += &other.trans_counts;
        for (dst, src) in self.start_counts.iter_mut().zip(other.start_counts.iter()) {
            *dst += src;
        }
        Ok(())
    }

    fn maximization(&mut self, inertia : f64) -> Result<()> {
        self.update(inertia)
    }

    fn reset(&mut self) {
        self.states.iter_mut().for_each(|s| s.emission.clear_summaries() );
        self.clear_counts();
    }

}

impl Display for HiddenMarkovModel {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "HiddenMarkovModel(m = {})", self.states.len())?;
        for (i, s) in self.states.iter().enumerate() {
            let row : Vec<String> = self.trans.row(i).iter().map(|p| format!("{:.4}", p) ).collect();
            writeln!(f, "  {} start = {:.4} -> [{}] {:?}", s.name, self.start[i], row.join(", "), s.emission)?;
        }
        Ok(())
    }

}
