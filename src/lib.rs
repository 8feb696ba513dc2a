//! # kmeans-pinned - API documentation
//!
//! kmeans-pinned is a small rust library for k-means clustering, where some of the centroids can be pinned
//! to fixed positions.
//!
//! ## Design target
//! The API-surface is kept rather plain: samples are given as a raw row-major vector (or a small
//! [`Matrix`] wrapper around one), instead of any high-level arithmetics / matrix crate such as nalgebra
//! or ndarray. The per-sample loops (distance calculation, assignment) are parallelized with rayon.
//!
//! ## Pinned centroids
//! A pinned centroid takes part in the assignment of samples like any other centroid, but it is never
//! moved by recentering. When fewer than k pinned centroids are given, the remaining ones are drawn
//! randomly from the samples. See [`KMeans::init_pinned`].
//!
//! ## Supported variants
//! - Lloyd's algorithm with mean (k-means) or median (k-medians) recentering: [`KMeans::kmeans_lloyd`]
//! - Multi-trial search, running many independent Lloyd runs on an [`Executor`] and ranking their results: [`KMeans::search_best`]
//!
//! ## Supported primitive types
//! - [`f32`]
//! - [`f64`]
//!
//! ## Example
//! ```rust
//! use kmeans_pinned::*;
//!
//! fn main() {
//!     let (sample_cnt, sample_dims, k) = (2000, 2, 4);
//!
//!     // Generate some random data
//!     let mut samples = vec![0.0f64;sample_cnt * sample_dims];
//!     samples.iter_mut().for_each(|v| *v = rand::random());
//!
//!     // One centroid is pinned to the origin, three more are searched for
//!     let kmean = KMeans::new(samples, sample_cnt, sample_dims).unwrap();
//!     let pinned = Matrix::new(vec![0.0, 0.0], 1, 2).unwrap();
//!     let result = kmean.kmeans_lloyd(k, KMeans::init_pinned(pinned), &KMeansConfig::default()).unwrap();
//!
//!     println!("Centroids: {:?}", result.centroids.centroids());
//!     println!("Cluster-Assignments: {:?}", result.assignments);
//!     println!("Error: {}", result.distsum);
//! }
//! ```
//!
//! ## Example (multi-trial search)
//! ```rust
//! use kmeans_pinned::*;
//!
//! fn main() {
//!     let (sample_cnt, sample_dims, k) = (2000, 2, 4);
//!
//!     let mut samples = vec![0.0f64;sample_cnt * sample_dims];
//!     samples.iter_mut().for_each(|v| *v = rand::random());
//!
//!     let kmean = KMeans::new(samples, sample_cnt, sample_dims).unwrap();
//!     let conf = SearchConfig::build().trials(20).seed(42).build();
//!     let result = kmean.search_best(k, None, &conf, &ThreadPool::new(4)).unwrap();
//!
//!     let best = result.best().unwrap();
//!     println!("Best trial {} - Error: {}", best.trial, best.error());
//! }
//! ```
//!
//! ## Short API-Overview / Description
//! Entry-point of the library is the [`KMeans`] struct. This struct is generic over the underlying primitive
//! type, that should be used for the calculations. To use KMeans, an instance of this struct is created, taking
//! over the sample data into its ownership.
//!
//! Calling one of its instance-methods (e.g. [`KMeans::kmeans_lloyd`]) does not mutate it, so multiple runs can
//! be done in parallel. Internally, a new instance of [`KMeansState`] is used to store the state (and finally
//! the result) of a calculation.
//!
//! All invalid input (mismatching dimensions, too many centroids, k = 0, ...) is reported as [`KMeansError`].
//! The library logs through the `log` facade and never installs a logger itself.

#[macro_use] mod helpers;
mod memory;
mod error;
mod api;
mod variants;
mod recenter;
mod score;
pub mod convergence;
pub mod distances;
pub mod inits;
pub mod trials;

pub use api::{CentroidSet, EmptyClusterPolicy, KMeans, KMeansConfig, KMeansConfigBuilder, KMeansState, Phase, Recentering};
pub use error::{KMeansError, Result};
pub use memory::{Matrix, Primitive};
pub use trials::{Executor, FailedTrial, InlineExecutor, RayonExecutor, SearchConfig, SearchConfigBuilder, Solution, ThreadPool, TrialResult};


#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::testing;
    use rand::prelude::*;

    #[test]
    fn labels_on_demand() {
        let data = testing::four_blobs::<f32>();
        let kmean = KMeans::from_matrix(data.clone());
        let conf = KMeansConfig::build().random_generator(StdRng::seed_from_u64(5)).build();
        let res = kmean.kmeans_lloyd(4, KMeans::init_random_sample, &conf).unwrap();

        assert_eq!(kmean.assign(res.centroids.centroids()).unwrap(), res.assignments);
        assert_eq!(res.centroid_frequency.iter().sum::<usize>(), data.rows());
        assert_eq!(kmean.score(res.centroids.centroids()).unwrap(), res.distsum);
    }

    #[test]
    fn reproducible_with_seed() {
        let kmean = KMeans::from_matrix(testing::four_blobs::<f64>());
        let run = |seed| {
            let conf = KMeansConfig::build().random_generator(StdRng::seed_from_u64(seed)).build();
            kmean.kmeans_lloyd(4, KMeans::init_random_sample, &conf).unwrap()
        };
        assert_eq!(run(11).centroids, run(11).centroids);
    }

    #[test]
    fn search_solution_can_be_replayed() {
        let kmean = KMeans::from_matrix(testing::four_blobs::<f64>());
        let result = kmean.search_best(4, None, &SearchConfig::build().trials(4).seed(8).build(), &InlineExecutor).unwrap();
        let best = result.best().unwrap();

        let conf = KMeansConfig::build()
            .random_generator(StdRng::seed_from_u64(best.seed))
            .max_iter(1000)
            .build();
        let replay = kmean.kmeans_lloyd(4, KMeans::init_random_sample, &conf).unwrap();
        assert_eq!(&replay.centroids, best.centroids());
        assert_eq!(replay.distsum, best.error());
    }

    #[test]
    fn distance_and_convergence_helpers_are_public() {
        let a = Matrix::new(vec![0.0f64, 0.0, 3.0, 4.0], 2, 2).unwrap();
        let d = distances::pairwise_distances(&a, &a, true).unwrap();
        assert_eq!(d.as_slice(), &[0.0, 5.0, 5.0, 0.0]);
        assert!(convergence::converged(&a, &convergence::round_matrix(&a, 2), 2).unwrap());
    }
}
