use std::fmt;
use nalgebra::DVector;
use rand::Rng;
use tracing::trace;
use crate::prob::{Datum, Row};
use crate::error::{Error, Result};

/// How the initial centers are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seeding {

    /// The first n_cluster distinct observations.
    FirstK,

    /// k-means++: the first center uniformly at random, each next center with
    /// probability proportional to its squared distance to the closest center.
    PlusPlus

}

#[derive(Debug, Clone)]
pub struct KMeansSettings {
    pub n_cluster : usize,
    pub max_iter : usize,
    pub seeding : Seeding
}

/// K-means is a special case of the EM algorithm for GMMs where
/// the probabilities of class allocation are assumed constant and equal;
/// and the covariances within clusters are assumed constant and equal as well.
/// Used here to produce hard allocations that seed the components of mixtures and
/// the emissions of hidden Markov models.
#[derive(Debug, Clone)]
pub struct KMeans {
    allocations : Vec<usize>,
    means : Vec<DVector<f64>>,
    n_iter : usize
}

impl KMeans {

    /// Runs Lloyd iterations from the seeded centers until no observation changes
    /// cluster or max_iter is reached. Observation weights scale their contribution
    /// to the cluster means. A cluster left without observations keeps its center.
    pub fn estimate<R>(
        sample : &[DVector<f64>],
        weights : &[f64],
        settings : &KMeansSettings,
        rng : &mut R
    ) -> Result<Self>
    where
        R : Rng + ?Sized
    {
        let k = settings.n_cluster;
        if k == 0 {
            return Err(Error::ModelConfiguration("K-means requires at least one cluster".to_string()));
        }
        if sample.len() != weights.len() {
            return Err(Error::shape(sample.len(), weights.len()));
        }
        let mut means = match settings.seeding {
            Seeding::FirstK => first_distinct(sample, k)?,
            Seeding::PlusPlus => plus_plus(sample, k, rng)?
        };
        let mut allocations = vec![0; sample.len()];
        update_allocations(&mut allocations, &means, sample);
        let mut n_iter = 0;
        while n_iter < settings.max_iter {
            update_means(&mut means, sample, weights, &allocations);
            let n_reallocated = update_allocations(&mut allocations, &means, sample);
            n_iter += 1;
            trace!(iteration = n_iter, n_reallocated, "k-means iteration");
            if n_reallocated == 0 {
                break;
            }
        }
        Ok(Self { allocations, means, n_iter })
    }

    /// Returns mean of each cluster, with order matching the indices returned by Self::allocations
    pub fn means(&self) -> impl Iterator<Item=&[f64]> {
        self.means.iter().map(|m| m.as_slice() )
    }

    /// Return cluster of each observation, in the order they were supplied
    pub fn allocations(&self) -> &[usize] {
        &self.allocations[..]
    }

    pub fn iterations(&self) -> usize {
        self.n_iter
    }

    pub fn count_allocations(&self, cluster_ix : usize) -> usize {
        self.allocations().iter().filter(|alloc| **alloc == cluster_ix ).count()
    }

}

impl fmt::Display for KMeans {

    fn fmt(&self, f : &mut fmt::Formatter) -> fmt::Result {
        for (c, m) in self.means.iter().enumerate() {
            writeln!(f, "Cluster {}: Mean = {:?}; Observations = {}", c, m.as_slice(), self.count_allocations(c))?;
        }
        Ok(())
    }

}

/// Reads rows made only of real values as vectors, as required for clustering.
pub fn real_rows(xs : &[Row]) -> Result<Vec<DVector<f64>>> {
    xs.iter().map(|row| {
        let vals = row.iter().map(|d| match d {
            Datum::Real(x) => Ok(*x),
            other => Err(Error::Input(format!("Clustering requires real values (found '{}')", other)))
        }).collect::<Result<Vec<f64>>>()?;
        Ok(DVector::from_vec(vals))
    }).collect()
}

fn squared_dist(a : &DVector<f64>, b : &DVector<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(ai, bi)| (ai - bi).powi(2) ).sum::<f64>()
}

fn closest(candidates : &[DVector<f64>], el : &DVector<f64>) -> (usize, f64) {
    let mut min_dist = f64::INFINITY;
    let mut min_ix = 0;
    for (cand_ix, cand) in candidates.iter().enumerate() {
        let dist_to_cand = squared_dist(el, cand);
        if dist_to_cand < min_dist {
            min_ix = cand_ix;
            min_dist = dist_to_cand;
        }
    }
    (min_ix, min_dist)
}

fn first_distinct(sample : &[DVector<f64>], k : usize) -> Result<Vec<DVector<f64>>> {
    let mut seeds : Vec<DVector<f64>> = Vec::with_capacity(k);
    for obs in sample.iter() {
        if !seeds.iter().any(|s| s == obs ) {
            seeds.push(obs.clone());
            if seeds.len() == k {
                return Ok(seeds);
            }
        }
    }
    Err(Error::InsufficientData(format!("Found {} distinct observations for {} clusters", seeds.len(), k)))
}

fn plus_plus<R>(sample : &[DVector<f64>], k : usize, rng : &mut R) -> Result<Vec<DVector<f64>>>
where
    R : Rng + ?Sized
{
    if sample.len() < k {
        return Err(Error::InsufficientData(format!("Found {} observations for {} clusters", sample.len(), k)));
    }
    let mut seeds = vec![sample[rng.gen_range(0..sample.len())].clone()];
    while seeds.len() < k {
        let dists : Vec<f64> = sample.iter().map(|obs| closest(&seeds, obs).1 ).collect();
        let total : f64 = dists.iter().sum();
        if total <= 0.0 {
            // Every observation coincides with a center.
            return first_distinct(sample, k);
        }
        let u = rng.gen::<f64>() * total;
        let mut acc = 0.0;
        let mut chosen = sample.len() - 1;
        for (ix, d) in dists.iter().enumerate() {
            acc += d;
            if u < acc {
                chosen = ix;
                break;
            }
        }
        seeds.push(sample[chosen].clone());
    }
    Ok(seeds)
}

fn update_means(
    means : &mut [DVector<f64>],
    sample : &[DVector<f64>],
    weights : &[f64],
    allocations : &[usize]
) {
    let dim = means[0].nrows();
    let mut sums = vec![DVector::zeros(dim); means.len()];
    let mut mass = vec![0.0; means.len()];

    // Accumulate each observation into sum and weight
    for ((obs, w), alloc) in sample.iter().zip(weights.iter()).zip(allocations.iter()) {
        sums[*alloc].axpy(*w, obs, 1.0);
        mass[*alloc] += w;
    }

    for (c, mean) in means.iter_mut().enumerate() {
        if mass[c] > 0.0 {
            *mean = &sums[c] / mass[c];
        }
    }
}

/// Update allocation vector, returning how many observations were re-allocated.
fn update_allocations(
    allocations : &mut [usize],
    means : &[DVector<f64>],
    sample : &[DVector<f64>]
) -> usize {
    let mut n_reallocated = 0;
    for (alloc, obs) in allocations.iter_mut().zip(sample.iter()) {
        let (best_alloc, _) = closest(means, obs);
        if *alloc != best_alloc {
            *alloc = best_alloc;
            n_reallocated += 1;
        }
    }
    n_reallocated
}

#[cfg(test)]
mod tests {

    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn points() -> Vec<DVector<f64>> {
        [0.0, 0.2, 0.1, 10.0, 10.3, 9.9].iter().map(|x| DVector::from_vec(vec![*x]) ).collect()
    }

    #[test]
    fn first_k_separates_groups() {
        let sample = points();
        let settings = KMeansSettings { n_cluster : 2, max_iter : 100, seeding : Seeding::FirstK };
        let km = KMeans::estimate(&sample, &[1.0; 6], &settings, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(km.allocations(), &[0, 0, 0, 1, 1, 1]);
        let means : Vec<f64> = km.means().map(|m| m[0] ).collect();
        assert!((means[0] - 0.1).abs() < 1E-12);
        assert!((means[1] - 10.066666666666666).abs() < 1E-9);
    }

    #[test]
    fn plus_plus_finds_both_groups() {
        let sample = points();
        let settings = KMeansSettings { n_cluster : 2, max_iter : 100, seeding : Seeding::PlusPlus };
        let km = KMeans::estimate(&sample, &[1.0; 6], &settings, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(km.count_allocations(0), 3);
        assert_eq!(km.count_allocations(1), 3);
    }

    #[test]
    fn too_few_distinct_values() {
        let sample = vec![DVector::from_vec(vec![1.0]); 4];
        let settings = KMeansSettings { n_cluster : 2, max_iter : 10, seeding : Seeding::FirstK };
        let r = KMeans::estimate(&sample, &[1.0; 4], &settings, &mut StdRng::seed_from_u64(0));
        assert!(matches!(r, Err(Error::InsufficientData(_))));
        assert!(real_rows(&[vec![Datum::from("a")]]).is_err());
    }

}
