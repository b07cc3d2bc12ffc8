//! Property-based tests for the statistics accumulators and the EM trainer.

use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use nalgebra::{DMatrix, DVector};
use pomelo::prob::*;
use pomelo::model::*;
use pomelo::fit::FitSettings;

const TOL : f64 = 1E-9;

fn close(a : f64, b : f64) -> bool {
    (a - b).abs() <= TOL * a.abs().max(b.abs()).max(1.0)
}

fn split_fit(dist : &mut dyn Distribution, xs : &[Row], at : usize) {
    dist.summarize(&xs[..at], None).unwrap();
    dist.summarize(&xs[at..], None).unwrap();
    dist.from_summaries(0.0).unwrap();
}

fn merged_fit(dist : &mut dyn Distribution, xs : &[Row], at : usize) {
    let mut other = dist.boxed_clone();
    dist.summarize(&xs[..at], None).unwrap();
    other.summarize(&xs[at..], None).unwrap();
    dist.merge_summaries(other.as_ref()).unwrap();
    dist.from_summaries(0.0).unwrap();
}

// Both fits score every training row alike.
fn same_scores(a : &dyn Distribution, b : &dyn Distribution, xs : &[Row]) -> bool {
    xs.iter().all(|x| {
        let (la, lb) = (a.log_probability(x).unwrap(), b.log_probability(x).unwrap());
        la == lb || close(la, lb)
    })
}

fn is_monotone(lls : &[f64], rel : f64) -> bool {
    lls.windows(2).all(|pair| pair[1] >= pair[0] - rel * pair[0].abs().max(1.0) )
}

fn symbol_pairs(idx : &[(usize, usize)]) -> Vec<Row> {
    let parents = ["a", "b"];
    let children = ["x", "y", "z"];
    idx.iter().map(|(p, c)| vec![Datum::from(parents[*p]), Datum::from(children[*c])] ).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Summarizing two batches in turn gives the same normal as the concatenation.
    #[test]
    fn normal_statistics_are_additive(
        values in prop::collection::vec(-100.0..100.0f64, 2..60),
        frac in 0.0..1.0f64
    ) {
        let xs = column(&values);
        let at = (frac * values.len() as f64) as usize;
        let whole = Normal::from_samples(&xs, None).unwrap();

        let mut batched = Normal::blank();
        split_fit(&mut batched, &xs, at);
        prop_assert!(close(whole.mean(), batched.mean()));
        prop_assert!(close(whole.std(), batched.std()));

        let mut merged = Normal::blank();
        merged_fit(&mut merged, &xs, at);
        prop_assert!(close(whole.mean(), merged.mean()));
        prop_assert!(close(whole.std(), merged.std()));
    }

    #[test]
    fn gamma_statistics_are_additive(
        values in prop::collection::vec(0.01..50.0f64, 3..40),
        frac in 0.0..1.0f64
    ) {
        let xs = column(&values);
        let at = (frac * values.len() as f64) as usize;
        let whole = Gamma::from_samples(&xs, None).unwrap();
        let mut merged = Gamma::blank();
        merged_fit(&mut merged, &xs, at);
        prop_assert!((whole.shape() - merged.shape()).abs() <= 1E-6 * whole.shape().max(1.0));
        prop_assert!((whole.rate() - merged.rate()).abs() <= 1E-6 * whole.rate().max(1.0));
    }

    #[test]
    fn discrete_counts_are_additive(
        idx in prop::collection::vec(0..4usize, 1..80),
        frac in 0.0..1.0f64
    ) {
        let alphabet = ["A", "C", "G", "T"];
        let names : Vec<&str> = idx.iter().map(|i| alphabet[*i] ).collect();
        let xs = symbols(&names);
        let at = (frac * names.len() as f64) as usize;
        let whole = Discrete::from_samples(&xs, None).unwrap();
        let mut merged = Discrete::blank();
        merged_fit(&mut merged, &xs, at);
        for s in alphabet.iter() {
            prop_assert!(close(whole.prob_of(s), merged.prob_of(s)));
        }
    }

    #[test]
    fn exponential_statistics_are_additive(
        values in prop::collection::vec(0.01..50.0f64, 1..40),
        frac in 0.0..1.0f64
    ) {
        let xs = column(&values);
        let at = (frac * values.len() as f64) as usize;
        let whole = Exponential::from_samples(&xs, None).unwrap();
        let mut batched = Exponential::blank();
        split_fit(&mut batched, &xs, at);
        prop_assert!(close(whole.rate(), batched.rate()));
        let mut merged = Exponential::blank();
        merged_fit(&mut merged, &xs, at);
        prop_assert!(close(whole.rate(), merged.rate()));
    }

    #[test]
    fn lognormal_statistics_are_additive(
        values in prop::collection::vec(0.01..50.0f64, 2..40),
        frac in 0.0..1.0f64
    ) {
        let xs = column(&values);
        let at = (frac * values.len() as f64) as usize;
        let whole = LogNormal::from_samples(&xs, None).unwrap();
        let mut merged = LogNormal::blank();
        merged_fit(&mut merged, &xs, at);
        prop_assert!(close(whole.mu(), merged.mu()));
        prop_assert!(close(whole.sigma(), merged.sigma()));
    }

    #[test]
    fn poisson_statistics_are_additive(
        counts in prop::collection::vec(0..30u32, 1..50),
        frac in 0.0..1.0f64
    ) {
        let values : Vec<f64> = counts.iter().map(|c| *c as f64 ).collect();
        let xs = column(&values);
        let at = (frac * values.len() as f64) as usize;
        let whole = Poisson::from_samples(&xs, None).unwrap();
        let mut merged = Poisson::blank();
        merged_fit(&mut merged, &xs, at);
        prop_assert!(close(whole.lambda(), merged.lambda()));
    }

    #[test]
    fn uniform_bounds_are_additive(
        values in prop::collection::vec(-100.0..100.0f64, 1..40),
        frac in 0.0..1.0f64
    ) {
        let xs = column(&values);
        let at = (frac * values.len() as f64) as usize;
        let whole = Uniform::from_samples(&xs, None).unwrap();
        let mut merged = Uniform::blank();
        merged_fit(&mut merged, &xs, at);
        prop_assert_eq!(whole.low(), merged.low());
        prop_assert_eq!(whole.high(), merged.high());
    }

    #[test]
    fn beta_statistics_are_additive(
        values in prop::collection::vec(0.01..0.99f64, 3..40),
        frac in 0.0..1.0f64
    ) {
        let xs = column(&values);
        let at = (frac * values.len() as f64) as usize;
        let whole = Beta::from_samples(&xs, None).unwrap();
        let mut merged = Beta::blank();
        merged_fit(&mut merged, &xs, at);
        prop_assert!((whole.alpha() - merged.alpha()).abs() <= 1E-6 * whole.alpha().max(1.0));
        prop_assert!((whole.beta() - merged.beta()).abs() <= 1E-6 * whole.beta().max(1.0));
    }

    #[test]
    fn gaussian_moments_are_additive(
        points in prop::collection::vec((-10.0..10.0f64, -10.0..10.0f64), 5..40),
        frac in 0.0..1.0f64
    ) {
        let rows : Vec<Vec<f64>> = points.iter().map(|(a, b)| vec![*a, *b] ).collect();
        let xs = matrix(&rows);
        let at = (frac * rows.len() as f64) as usize;
        let whole = MultivariateGaussian::from_samples(&xs, None).unwrap();
        let mut merged = MultivariateGaussian::blank(2);
        merged_fit(&mut merged, &xs, at);
        for (a, b) in whole.mean().iter().zip(merged.mean().iter()) {
            prop_assert!(close(*a, *b));
        }
        for (a, b) in whole.cov().iter().zip(merged.cov().iter()) {
            prop_assert!(close(*a, *b));
        }
    }

    #[test]
    fn conditional_counts_are_additive(
        idx in prop::collection::vec((0..2usize, 0..3usize), 1..60),
        frac in 0.0..1.0f64
    ) {
        let xs = symbol_pairs(&idx);
        let at = (frac * xs.len() as f64) as usize;
        let whole = ConditionalTable::from_samples(1, &xs, None).unwrap();
        let mut merged = ConditionalTable::blank(1);
        merged_fit(&mut merged, &xs, at);
        for p in ["a", "b"].iter() {
            for c in ["x", "y", "z"].iter() {
                prop_assert!(close(whole.prob_of(&[*p], c), merged.prob_of(&[*p], c)));
            }
        }
    }

    #[test]
    fn independent_statistics_are_additive(
        values in prop::collection::vec((-50.0..50.0f64, 0..3usize), 2..40),
        frac in 0.0..1.0f64
    ) {
        let names = ["u", "v", "w"];
        let xs : Vec<Row> = values.iter().map(|(x, s)| vec![Datum::Real(*x), Datum::from(names[*s])] ).collect();
        let at = (frac * xs.len() as f64) as usize;
        let template = || Independent::univariate(vec![Box::new(Normal::blank()), Box::new(Discrete::blank())]).unwrap();
        let mut whole = template();
        whole.fit(&xs, None, 0.0).unwrap();
        let mut batched = template();
        split_fit(&mut batched, &xs, at);
        prop_assert!(same_scores(&whole, &batched, &xs));
        let mut merged = template();
        merged_fit(&mut merged, &xs, at);
        prop_assert!(same_scores(&whole, &merged, &xs));
    }

    /// Frozen distributions keep their parameters whatever they are fit on.
    #[test]
    fn frozen_normal_is_invariant(
        mean in -10.0..10.0f64,
        std in 0.1..10.0f64,
        values in prop::collection::vec(-100.0..100.0f64, 1..30)
    ) {
        let mut n = Normal::new(mean, std);
        n.freeze();
        n.fit(&column(&values), None, 0.0).unwrap();
        n.summarize(&column(&values), None).unwrap();
        n.from_summaries(0.5).unwrap();
        prop_assert_eq!(n.mean().to_bits(), mean.to_bits());
        prop_assert_eq!(n.std().to_bits(), std.to_bits());
    }

    #[test]
    fn frozen_mixture_component_is_invariant(
        values in prop::collection::vec(-10.0..10.0f64, 5..50),
        mean in -5.0..5.0f64,
        std in 0.5..5.0f64
    ) {
        let mut fixed = Normal::new(mean, std);
        fixed.freeze();
        let mut gmm = GeneralMixtureModel::new(
            vec![Box::new(fixed), Box::new(Normal::new(0.0, 2.0).with_min_std(0.5))],
            None
        ).unwrap();
        let settings = FitSettings::default().max_iterations(10);
        gmm.fit(&column(&values), None, &settings).unwrap();
        let n = gmm.components()[0].as_any().downcast_ref::<Normal>().unwrap();
        prop_assert!(n.is_frozen());
        prop_assert_eq!(n.mean().to_bits(), mean.to_bits());
        prop_assert_eq!(n.std().to_bits(), std.to_bits());
        prop_assert_eq!(gmm.summary_weight(), 0.0);
    }

    #[test]
    fn frozen_independent_part_is_invariant(
        values in prop::collection::vec((-10.0..10.0f64, 0.1..10.0f64), 2..30),
        shape in 0.5..5.0f64,
        rate in 0.5..5.0f64
    ) {
        let mut fixed = Gamma::new(shape, rate);
        fixed.freeze();
        let mut ind = Independent::univariate(vec![Box::new(Normal::new(0.0, 1.0)), Box::new(fixed)]).unwrap();
        let rows : Vec<Vec<f64>> = values.iter().map(|(a, b)| vec![*a, *b] ).collect();
        ind.fit(&matrix(&rows), None, 0.0).unwrap();
        let g = ind.part(1).unwrap().as_any().downcast_ref::<Gamma>().unwrap();
        prop_assert_eq!(g.shape().to_bits(), shape.to_bits());
        prop_assert_eq!(g.rate().to_bits(), rate.to_bits());
        prop_assert!(ind.parts().iter().all(|(d, _)| d.summary_weight() == 0.0 ));
    }

    /// Serialized distributions score every value exactly as the original.
    #[test]
    fn records_reproduce_log_probability(
        mean in -100.0..100.0f64,
        std in 0.01..100.0f64,
        shape in 0.1..20.0f64,
        rate in 0.1..20.0f64,
        x in 0.001..100.0f64
    ) {
        let dists : Vec<Box<dyn Distribution>> = vec![
            Box::new(Normal::new(mean, std)),
            Box::new(Gamma::new(shape, rate)),
            Box::new(LogNormal::new(mean / 10.0, std / 10.0))
        ];
        for d in dists.iter() {
            let json = d.to_record().to_json().unwrap();
            let back = from_record(&Record::from_json(&json).unwrap()).unwrap();
            let row = [Datum::Real(x)];
            prop_assert_eq!(back.log_probability(&row).unwrap(), d.log_probability(&row).unwrap());
        }
    }

    #[test]
    fn composite_records_reproduce_log_probability(
        probs in prop::collection::vec(0.01..1.0f64, 3),
        mean in prop::collection::vec(-10.0..10.0f64, 2),
        a in prop::collection::vec(-2.0..2.0f64, 4),
        points in prop::collection::vec(-10.0..10.0f64, 1..20),
        bandwidth in 0.1..3.0f64,
        x in -10.0..10.0f64,
        y in -10.0..10.0f64
    ) {
        let total : f64 = probs.iter().sum();
        let discrete = Discrete::new(vec![("p", probs[0] / total), ("q", probs[1] / total), ("r", probs[2] / total)]).unwrap();
        let a = DMatrix::from_vec(2, 2, a);
        let cov = &a * a.transpose() + DMatrix::identity(2, 2);
        let mvn = MultivariateGaussian::new(DVector::from_vec(mean.clone()), cov).unwrap();
        let kde = KernelDensity::gaussian(points, bandwidth).unwrap();
        let ind = Independent::univariate(vec![Box::new(Normal::new(mean[0], 1.5)), Box::new(discrete.clone())]).unwrap();
        let cases : Vec<(Box<dyn Distribution>, Row)> = vec![
            (Box::new(discrete), vec![Datum::from("q")]),
            (Box::new(mvn), vec![Datum::Real(x), Datum::Real(y)]),
            (Box::new(kde), vec![Datum::Real(x)]),
            (Box::new(ind), vec![Datum::Real(x), Datum::from("r")])
        ];
        for (d, row) in cases.iter() {
            let back = from_record(&Record::from_json(&d.to_record().to_json().unwrap()).unwrap()).unwrap();
            prop_assert_eq!(back.log_probability(row).unwrap(), d.log_probability(row).unwrap());
        }
    }

    #[test]
    fn sequence_and_classifier_records_reproduce_scores(
        idx in prop::collection::vec(0..3usize, 4..40),
        prior in 0.05..0.95f64,
        x in 0.01..20.0f64
    ) {
        let alphabet = ["A", "C", "G"];
        let seq : Vec<Datum> = idx.iter().map(|i| Datum::from(alphabet[*i]) ).collect();
        let mc = MarkovChain::from_samples(&[seq.clone()], 1, None).unwrap();
        match Model::from_json(&Model::from(mc.clone()).to_json().unwrap()).unwrap() {
            Model::Markov(back) => {
                prop_assert_eq!(back.log_probability(&seq).unwrap(), mc.log_probability(&seq).unwrap());
            },
            other => {
                prop_assert!(false, "Unexpected model {:?}", other);
            }
        }

        let bc = BayesClassifier::new(
            vec![Box::new(Normal::new(2.0, 1.5)), Box::new(Gamma::new(3.0, 0.5))],
            Some(vec![prior, 1.0 - prior])
        ).unwrap();
        let row = [vec![Datum::Real(x)]];
        match Model::from_json(&Model::from(bc.clone()).to_json().unwrap()).unwrap() {
            Model::Bayes(back) => {
                prop_assert_eq!(back.predict_log_proba(&row).unwrap(), bc.predict_log_proba(&row).unwrap());
            },
            other => {
                prop_assert!(false, "Unexpected model {:?}", other);
            }
        }
    }

    #[test]
    fn exponential_mixture_em_is_monotone(
        values in prop::collection::vec(0.05..20.0f64, 10..60),
        r0 in 0.05..1.0f64,
        r1 in 1.0..5.0f64
    ) {
        let mut gmm = GeneralMixtureModel::new(
            vec![Box::new(Exponential::new(r0)), Box::new(Exponential::new(r1))],
            None
        ).unwrap();
        let settings = FitSettings::default().max_iterations(30).stop_threshold(0.0);
        let hist = gmm.fit(&column(&values), None, &settings).unwrap();
        prop_assert!(is_monotone(&hist.log_likelihoods, 1E-8), "{:?}", hist.log_likelihoods);
    }

    #[test]
    fn gamma_mixture_em_is_monotone(
        values in prop::collection::vec(0.5..20.0f64, 10..60)
    ) {
        let mut gmm = GeneralMixtureModel::new(
            vec![Box::new(Gamma::new(2.0, 1.0)), Box::new(Gamma::new(5.0, 0.5))],
            None
        ).unwrap();
        let settings = FitSettings::default().max_iterations(30).stop_threshold(0.0);
        let hist = gmm.fit(&column(&values), None, &settings).unwrap();
        prop_assert!(is_monotone(&hist.log_likelihoods, 1E-6), "{:?}", hist.log_likelihoods);
    }

    /// EM never decreases the total log-likelihood of a mixture.
    #[test]
    fn mixture_em_is_monotone(
        values in prop::collection::vec(-10.0..10.0f64, 10..60),
        m0 in -5.0..0.0f64,
        m1 in 0.0..5.0f64
    ) {
        let mut gmm = GeneralMixtureModel::new(
            vec![
                Box::new(Normal::new(m0, 1.0).with_min_std(0.5)),
                Box::new(Normal::new(m1, 1.0).with_min_std(0.5))
            ],
            None
        ).unwrap();
        let settings = FitSettings::default().max_iterations(30).stop_threshold(0.0);
        let hist = gmm.fit(&column(&values), None, &settings).unwrap();
        for pair in hist.log_likelihoods.windows(2) {
            prop_assert!(pair[1] >= pair[0] - 1E-8 * pair[0].abs().max(1.0), "{} -> {}", pair[0], pair[1]);
        }
    }

}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Baum-Welch never decreases the likelihood of the training sequences.
    #[test]
    fn baum_welch_is_monotone(seed in 0..10_000u64) {
        let truth = HiddenMarkovModel::from_matrix(
            vec![Box::new(Normal::new(-2.0, 1.0)), Box::new(Normal::new(2.0, 1.0))],
            &[vec![0.8, 0.2], vec![0.3, 0.7]],
            &[0.6, 0.4]
        ).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        let seqs : Vec<Vec<Row>> = (0..3).map(|_| truth.sample(30, &mut rng).0 ).collect();
        let mut hmm = HiddenMarkovModel::from_matrix(
            vec![
                Box::new(Normal::new(-1.0, 1.0).with_min_std(0.5)),
                Box::new(Normal::new(1.0, 1.0).with_min_std(0.5))
            ],
            &[vec![0.5, 0.5], vec![0.5, 0.5]],
            &[0.5, 0.5]
        ).unwrap();
        let settings = FitSettings::default().max_iterations(15).stop_threshold(0.0);
        let hist = hmm.fit(&seqs, None, &settings).unwrap();
        prop_assert!(is_monotone(&hist.log_likelihoods, 1E-8), "{:?}", hist.log_likelihoods);
    }

}
