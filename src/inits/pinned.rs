use crate::{inits::randomsample, CentroidSet, KMeansError, Matrix, Primitive, Result};
use log::{debug, warn};
use rand::RngCore;
use std::cmp::Ordering;

/// Build the working centroid set of a run from caller supplied centroids.
///
/// - fewer than **k** supplied: the supplied ones are pinned, the rest is drawn from **data**
/// - exactly **k** supplied: all of them are pinned
/// - more than **k** supplied: the first **k** are kept and *none* of them is pinned
pub fn reconcile<T: Primitive>(data: &Matrix<T>, k: usize, supplied: &Matrix<T>, rnd: &mut dyn RngCore) -> Result<CentroidSet<T>> {
    if supplied.cols() != data.cols() {
        return Err(KMeansError::Shape(format!(
            "supplied centroids have {} dimensions, samples have {}", supplied.cols(), data.cols())));
    }
    if supplied.rows() > data.rows() {
        return Err(KMeansError::Range(format!(
            "{} centroids supplied for only {} samples", supplied.rows(), data.rows())));
    }

    match supplied.rows().cmp(&k) {
        Ordering::Less => {
            let missing = k - supplied.rows();
            debug!("pinning {} supplied centroids, drawing {} more", supplied.rows(), missing);
            let drawn = randomsample::sample_rows(data, missing, rnd)?;
            let mut pinned = vec![true; supplied.rows()];
            pinned.resize(k, false);
            CentroidSet::new(supplied.vstack(&drawn)?, pinned)
        },
        Ordering::Equal => CentroidSet::new(supplied.clone(), vec![true; k]),
        Ordering::Greater => {
            warn!("{} centroids supplied for k = {}: keeping the first {} and unpinning all of them",
                supplied.rows(), k, k);
            Ok(CentroidSet::unpinned(supplied.truncated(k)))
        }
    }
}
