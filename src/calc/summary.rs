/// Fixed-size additive sufficient statistic: a vector of weighted sums. Summing
/// the statistics of disjoint batches reproduces the statistic of their
/// concatenation, which is what allows shards to be accumulated independently
/// and merged before a single parameter update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments<const N : usize>(pub [f64; N]);

impl<const N : usize> Default for Moments<N> {

    fn default() -> Self {
        Moments([0.0; N])
    }

}

impl<const N : usize> Moments<N> {

    /// Adds the terms (already multiplied by their weight) into the statistic.
    pub fn add(&mut self, terms : [f64; N]) {
        for (acc, t) in self.0.iter_mut().zip(terms.iter()) {
            *acc += t;
        }
    }

    pub fn merge(&mut self, other : &Self) {
        self.add(other.0);
    }

    pub fn clear(&mut self) {
        self.0 = [0.0; N];
    }

    /// The total weight, which every statistic keeps at index 0.
    pub fn weight(&self) -> f64 {
        self.0[0]
    }

}

/// Running weighted extremes; the merge is a min/max instead of a sum but
/// remains associative and order-independent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extremes {
    pub min : f64,
    pub max : f64,
    pub weight : f64
}

impl Default for Extremes {

    fn default() -> Self {
        Extremes { min : f64::INFINITY, max : f64::NEG_INFINITY, weight : 0.0 }
    }

}

impl Extremes {

    pub fn add(&mut self, x : f64, w : f64) {
        if w > 0.0 {
            self.min = self.min.min(x);
            self.max = self.max.max(x);
            self.weight += w;
        }
    }

    pub fn merge(&mut self, other : &Self) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.weight += other.weight;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

}

#[test]
fn moments_merge_is_additive() {
    let mut a = Moments::<3>::default();
    let mut b = Moments::<3>::default();
    let mut whole = Moments::<3>::default();
    for (i, x) in [1.0, 2.0, 3.5, -1.0].iter().enumerate() {
        let terms = [1.0, *x, x * x];
        if i % 2 == 0 { a.add(terms) } else { b.add(terms) }
        whole.add(terms);
    }
    a.merge(&b);
    assert_eq!(a, whole);
    a.clear();
    assert_eq!(a.weight(), 0.0);
}
