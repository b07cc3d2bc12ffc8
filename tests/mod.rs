use std::f64::consts::PI;
use approx::assert_abs_diff_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;
use pomelo::prob::*;
use pomelo::model::*;
use pomelo::fit::{FitSettings, Init};
use pomelo::Error;

fn two_clusters(seed : u64) -> Vec<Row> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut xs = Normal::new(-2.0, 1.0).sample_n(500, &mut rng);
    xs.extend(Normal::new(4.0, 1.0).sample_n(500, &mut rng));
    xs
}

fn component_means(gmm : &GeneralMixtureModel) -> Vec<f64> {
    let mut means : Vec<f64> = gmm.components().iter()
        .map(|c| c.as_any().downcast_ref::<Normal>().unwrap().mean() )
        .collect();
    means.sort_by(|a, b| a.partial_cmp(b).unwrap() );
    means
}

#[test]
fn unseen_symbol_has_zero_probability() {
    let d = Discrete::new(vec![("A", 0.1), ("C", 0.25), ("G", 0.5), ("T", 0.15)]).unwrap();
    assert_eq!(d.probability(&[Datum::from("?")]).unwrap(), 0.0);
    assert_abs_diff_eq!(d.probability(&[Datum::from("G")]).unwrap(), 0.5, epsilon = 1E-12);
}

#[test]
fn normal_density_at_mean() {
    let lp = Normal::new(0.0, 1.0).log_probability(&[Datum::Real(0.0)]).unwrap();
    assert_abs_diff_eq!(lp, -0.5 * (2. * PI).ln(), epsilon = 1E-12);
}

#[test]
fn hmm_recovers_change_points() {
    let hmm = HiddenMarkovModel::from_matrix(
        vec![Box::new(Normal::new(0.0, 1.0)), Box::new(Normal::new(5.0, 1.0))],
        &[vec![0.9, 0.1], vec![0.1, 0.9]],
        &[0.5, 0.5]
    ).unwrap();
    let (_, path) = hmm.viterbi(&column(&[0.0, 0.0, 5.0, 5.0, 5.0, 0.0])).unwrap();
    assert_eq!(path, vec![0, 0, 1, 1, 1, 0]);
}

#[test]
fn mixture_recovers_cluster_means() {
    let xs = two_clusters(42);
    let settings = FitSettings::default().init(Init::FirstK);
    let (gmm, hist) = GeneralMixtureModel::from_samples(&Normal::blank(), 2, &xs, None, &settings).unwrap();
    let means = component_means(&gmm);
    assert!((means[0] + 2.0).abs() < 0.3, "{:?}", means);
    assert!((means[1] - 4.0).abs() < 0.3, "{:?}", means);
    assert!(hist.converged);
    assert_abs_diff_eq!(gmm.weights().iter().sum::<f64>(), 1.0, epsilon = 1E-12);
}

#[test]
fn sharded_training_is_reproducible() {
    let xs = two_clusters(5);
    let init = || GeneralMixtureModel::new(
        vec![Box::new(Normal::new(-1.0, 2.0)), Box::new(Normal::new(1.0, 2.0))],
        None
    ).unwrap();
    let settings = FitSettings::default().max_iterations(20).stop_threshold(0.0);

    let mut a = init();
    let ha = a.fit(&xs, None, &settings.clone().n_jobs(4)).unwrap();
    let mut b = init();
    let hb = b.fit(&xs, None, &settings.clone().n_jobs(4)).unwrap();
    assert_eq!(ha.log_likelihoods, hb.log_likelihoods);
    assert_eq!(a.weights(), b.weights());

    let mut serial = init();
    let hs = serial.fit(&xs, None, &settings.clone().n_jobs(1)).unwrap();
    for (p, s) in ha.log_likelihoods.iter().zip(hs.log_likelihoods.iter()) {
        assert!((p - s).abs() <= 1E-9 * s.abs());
    }
    for (p, s) in component_means(&a).iter().zip(component_means(&serial).iter()) {
        assert_abs_diff_eq!(*p, *s, epsilon = 1E-8);
    }
}

#[test]
fn sharded_hmm_training_matches_serial() {
    let truth = HiddenMarkovModel::from_matrix(
        vec![Box::new(Normal::new(0.0, 1.0)), Box::new(Normal::new(5.0, 1.0))],
        &[vec![0.8, 0.2], vec![0.3, 0.7]],
        &[0.5, 0.5]
    ).unwrap();
    let mut rng = StdRng::seed_from_u64(9);
    let seqs : Vec<Vec<Row>> = (0..12).map(|_| truth.sample(30, &mut rng).0 ).collect();
    let init = || HiddenMarkovModel::from_matrix(
        vec![Box::new(Normal::new(1.0, 2.0)), Box::new(Normal::new(4.0, 2.0))],
        &[vec![0.5, 0.5], vec![0.5, 0.5]],
        &[0.5, 0.5]
    ).unwrap();
    let settings = FitSettings::default().max_iterations(10).stop_threshold(0.0);
    let mut serial = init();
    serial.fit(&seqs, None, &settings).unwrap();
    let mut sharded = init();
    sharded.fit(&seqs, None, &settings.clone().n_jobs(3)).unwrap();
    for i in 0..2 {
        for j in 0..2 {
            assert_abs_diff_eq!(serial.transitions()[(i, j)], sharded.transitions()[(i, j)], epsilon = 1E-9);
        }
    }
}

#[test]
fn hmm_from_samples_finds_states() {
    let truth = HiddenMarkovModel::from_matrix(
        vec![Box::new(Normal::new(-3.0, 1.0)), Box::new(Normal::new(3.0, 1.0))],
        &[vec![0.95, 0.05], vec![0.05, 0.95]],
        &[0.5, 0.5]
    ).unwrap();
    let mut rng = StdRng::seed_from_u64(21);
    let seqs : Vec<Vec<Row>> = (0..10).map(|_| truth.sample(60, &mut rng).0 ).collect();
    let settings = FitSettings::default().seed(3);
    let (hmm, _) = HiddenMarkovModel::from_samples(&Normal::blank(), 2, &seqs, None, &settings).unwrap();
    let mut means : Vec<f64> = hmm.states().iter()
        .map(|s| s.emission.as_any().downcast_ref::<Normal>().unwrap().mean() )
        .collect();
    means.sort_by(|a, b| a.partial_cmp(b).unwrap() );
    assert!((means[0] + 3.0).abs() < 0.5);
    assert!((means[1] - 3.0).abs() < 0.5);
}

#[test]
fn models_survive_json() {
    let gmm = GeneralMixtureModel::new(
        vec![
            Box::new(Normal::new(-1.5, 0.7)),
            Box::new(Independent::univariate(vec![Box::new(Gamma::new(2.0, 3.0))]).unwrap())
        ],
        Some(vec![0.25, 0.75])
    ).unwrap();
    let x = [Datum::Real(0.9)];
    match Model::from_json(&Model::from(gmm.clone()).to_json().unwrap()).unwrap() {
        Model::Mixture(back) => assert_eq!(back.log_probability(&x).unwrap(), gmm.log_probability(&x).unwrap()),
        other => panic!("Unexpected model {:?}", other)
    }

    let mc = MarkovChain::from_samples(
        &[vec![Datum::from("a"), Datum::from("b")], vec![Datum::from("b"), Datum::from("b")]],
        1,
        None
    ).unwrap();
    let seq = [Datum::from("b"), Datum::from("b")];
    match Model::from_json(&Model::from(mc.clone()).to_json().unwrap()).unwrap() {
        Model::Markov(back) => assert_eq!(back.log_probability(&seq).unwrap(), mc.log_probability(&seq).unwrap()),
        other => panic!("Unexpected model {:?}", other)
    }
}

#[test]
fn malformed_records_are_schema_errors() {
    assert!(matches!(Model::from_json(r#"{ "kind" : "Wishart", "d" : 2 }"#), Err(Error::Schema(_))));
    assert!(matches!(Model::from_json(r#"{ "kind" : "Normal", "d" : 1, "parameters" : [0.0] }"#), Err(Error::Schema(_))));
    let nested = r#"{
        "kind" : "GeneralMixtureModel",
        "d" : 1,
        "parameters" : [[1.0]],
        "distributions" : [{ "kind" : "Normal", "d" : 1, "parameters" : [0.0, 1.0] }]
    }"#;
    assert!(matches!(Model::from_json(nested), Ok(Model::Mixture(_))));
}

#[test]
fn naive_bayes_classifies_mixed_features() {
    let xs = vec![
        vec![Datum::Real(1.0), Datum::from("x")],
        vec![Datum::Real(1.2), Datum::from("x")],
        vec![Datum::Real(0.8), Datum::from("y")],
        vec![Datum::Real(6.0), Datum::from("y")],
        vec![Datum::Real(6.3), Datum::from("y")],
        vec![Datum::Real(5.9), Datum::from("y")]
    ];
    let y = [0, 0, 0, 1, 1, 1];
    let features : Vec<Box<dyn Distribution>> = vec![Box::new(Normal::blank()), Box::new(Discrete::blank())];
    let nb = NaiveBayes::from_samples(&features, 2, &xs, &y, None).unwrap();
    assert_eq!(nb.predict(&[vec![Datum::Real(1.1), Datum::from("y")]]).unwrap(), vec![0]);
    let mut buf = Vec::new();
    Model::from(nb.clone()).save(&mut buf).unwrap();
    match Model::load(&buf[..]).unwrap() {
        Model::NaiveBayes(back) => assert_eq!(back.predict(&xs).unwrap(), nb.predict(&xs).unwrap()),
        other => panic!("Unexpected model {:?}", other)
    }
}
