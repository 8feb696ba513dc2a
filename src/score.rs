use crate::{distances, KMeans, Matrix, Primitive, Result};
use rayon::prelude::*;

pub(crate) fn score<T: Primitive>(kmean: &KMeans<T>, centroids: &Matrix<T>) -> Result<T> {
    let assignments = kmean.assign(centroids)?;
    Ok(distsum(kmean.samples(), centroids, &assignments))
}

/// Sum of squared distances between all samples and their assigned centroid.
/// Infinite as soon as one of the centroids has no samples assigned.
pub(crate) fn distsum<T: Primitive>(samples: &Matrix<T>, centroids: &Matrix<T>, assignments: &[usize]) -> T {
    let mut centroid_frequency = vec![0usize; centroids.rows()];
    if KMeans::<T>::update_cluster_frequencies(assignments, &mut centroid_frequency) != centroids.rows() {
        return T::infinity();
    }
    let centroid_distances: Vec<T> = samples.as_slice().par_chunks_exact(samples.cols())
        .zip(assignments.par_iter())
        .map(|(s, &c)| distances::squared(s, centroids.row(c)))
        .collect();
    // Summed in sample order, so equal solutions always get the exact same error
    centroid_distances.iter().cloned().sum()
}
