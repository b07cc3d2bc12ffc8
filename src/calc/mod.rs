use std::borrow::Cow;
use crate::error::{Error, Result};

/// Summaries over weighted samples and accumulator helpers shared by the distributions.
pub mod summary;

pub use summary::*;

/// Numerically stable log(sum(exp(values))). Returns NEG_INFINITY for an empty
/// slice or when every entry is NEG_INFINITY, so impossible events propagate
/// through the recursions without producing NaN.
pub fn log_sum_exp(values : &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    if max == f64::INFINITY {
        return f64::INFINITY;
    }
    let sum : f64 = values.iter().map(|v| (v - max).exp() ).sum();
    max + sum.ln()
}

/// Stable log(exp(a) + exp(b)).
pub fn log_add_exp(a : f64, b : f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let m = a.max(b);
    m + (-(a - b).abs()).exp().ln_1p()
}

/// Natural log of the gamma function.
pub fn ln_gamma(x : f64) -> f64 {
    statrs::function::gamma::ln_gamma(x)
}

pub fn digamma(x : f64) -> f64 {
    statrs::function::gamma::digamma(x)
}

/// First derivative of the digamma function, for x > 0. Shifts the argument
/// above 6 with the recurrence psi1(x) = psi1(x+1) + 1/x^2 and evaluates the
/// asymptotic series there.
pub fn trigamma(mut x : f64) -> f64 {
    if x <= 0.0 || !x.is_finite() {
        return f64::NAN;
    }
    let mut acc = 0.0;
    while x < 6.0 {
        acc += 1. / (x * x);
        x += 1.0;
    }
    let x2 = 1. / (x * x);
    acc + 1. / x + x2 / 2. + (x2 / x) * (1. / 6. - x2 * (1. / 30. - x2 * (1. / 42. - x2 / 30.)))
}

/// Natural log of the factorial of a non-negative integer-valued real.
pub fn ln_factorial(k : f64) -> f64 {
    ln_gamma(k + 1.0)
}

/// Resolves the optional weight vector received by summarize(.) calls: a missing
/// vector means unit weights; a present one must match the number of samples and
/// hold only finite non-negative entries.
pub fn resolve_weights<'a>(n : usize, weights : Option<&'a [f64]>) -> Result<Cow<'a, [f64]>> {
    match weights {
        Some(w) => {
            if w.len() != n {
                return Err(Error::shape(n, w.len()));
            }
            if let Some(bad) = w.iter().find(|w| !w.is_finite() || **w < 0.0 ) {
                return Err(Error::Input(format!("Weights must be finite and non-negative (found {})", bad)));
            }
            Ok(Cow::Borrowed(w))
        },
        None => Ok(Cow::Owned(vec![1.0; n]))
    }
}

/// Validates the inertia argument of from_summaries(.), which must lie in [0, 1).
pub fn check_inertia(inertia : f64) -> Result<()> {
    if (0.0..1.0).contains(&inertia) {
        Ok(())
    } else {
        Err(Error::ModelConfiguration(format!("Inertia must lie in [0, 1) (found {})", inertia)))
    }
}

/// Blends a previous parameter with its fresh maximum-likelihood estimate.
pub fn blend(inertia : f64, old : f64, mle : f64) -> f64 {
    if inertia == 0.0 {
        mle
    } else {
        inertia * old + (1. - inertia) * mle
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn log_sum_exp_handles_impossible_events() {
        assert_eq!(log_sum_exp(&[]), f64::NEG_INFINITY);
        assert_eq!(log_sum_exp(&[f64::NEG_INFINITY, f64::NEG_INFINITY]), f64::NEG_INFINITY);
        let v = log_sum_exp(&[f64::NEG_INFINITY, 0.0]);
        assert!(v.abs() < 1E-15);
        let big = log_sum_exp(&[1000.0, 1000.0]);
        assert!((big - (1000.0 + 2f64.ln())).abs() < 1E-10);
    }

    #[test]
    fn log_add_exp_matches_slice_version() {
        for (a, b) in [(-3.0, 2.0), (0.5, 0.5), (f64::NEG_INFINITY, -1.0)].iter() {
            assert!((log_add_exp(*a, *b) - log_sum_exp(&[*a, *b])).abs() < 1E-12);
        }
    }

    #[test]
    fn trigamma_known_values() {
        // psi1(1) = pi^2 / 6
        let pi2_6 = std::f64::consts::PI.powi(2) / 6.;
        assert!((trigamma(1.0) - pi2_6).abs() < 1E-9);
        // psi1(1/2) = pi^2 / 2
        assert!((trigamma(0.5) - 3. * pi2_6).abs() < 1E-9);
    }

    #[test]
    fn weights_are_validated() {
        assert_eq!(resolve_weights(3, None).unwrap().as_ref(), &[1.0, 1.0, 1.0]);
        assert!(matches!(resolve_weights(2, Some(&[1.0])), Err(Error::Shape { .. })));
        assert!(matches!(resolve_weights(1, Some(&[-1.0])), Err(Error::Input(_))));
        assert!(check_inertia(1.0).is_err());
        assert!(check_inertia(0.3).is_ok());
    }

}
