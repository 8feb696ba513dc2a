use crate::{distances, CentroidSet, EmptyClusterPolicy, KMeansError, Matrix, Primitive, Recentering, Result};
use log::{debug, warn};
use rayon::prelude::*;
use std::cmp::Ordering;

pub(crate) fn recenter<T: Primitive>(samples: &Matrix<T>, centroids: &CentroidSet<T>, assignments: &[usize],
                                     recentering: Recentering, empty_cluster: EmptyClusterPolicy) -> Result<Matrix<T>> {
    let k = centroids.len();
    if centroids.dims() != samples.cols() {
        return Err(KMeansError::Shape(format!(
            "centroids have {} dimensions, samples have {}", centroids.dims(), samples.cols())));
    }
    if assignments.len() != samples.rows() {
        return Err(KMeansError::Shape(format!(
            "{} labels given for {} samples", assignments.len(), samples.rows())));
    }
    if let Some(&bad) = assignments.iter().find(|&&a| a >= k) {
        return Err(KMeansError::Range(format!("label {} does not refer to one of {} centroids", bad, k)));
    }

    // Member sample-ids per cluster
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); k];
    assignments.iter().enumerate().for_each(|(sample_id, &centroid_id)| members[centroid_id].push(sample_id));

    let is_empty = |members: &Vec<Vec<usize>>, i: usize| !centroids.pinned()[i] && members[i].is_empty();
    if (0..k).any(|i| is_empty(&members, i)) {
        match empty_cluster {
            EmptyClusterPolicy::Fail => {
                let cluster = (0..k).find(|&i| is_empty(&members, i)).unwrap_or_default();
                return Err(KMeansError::DegenerateCluster { cluster });
            },
            EmptyClusterPolicy::Reseed => reseed(samples, centroids, &mut members),
            EmptyClusterPolicy::KeepPrevious => {},
        }
        let still_empty = (0..k).filter(|&i| is_empty(&members, i)).count();
        if still_empty > 0 {
            warn!("{} cluster(s) without samples keep their previous centroid", still_empty);
        }
    }

    let mut new_centroids = centroids.centroids().clone().into_vec();
    new_centroids.par_chunks_exact_mut(samples.cols())
        .zip(members.par_iter())
        .zip(centroids.pinned().par_iter())
        .for_each(|((c, members), &pinned)| {
            if pinned || members.is_empty() {
                return;
            }
            match recentering {
                Recentering::Mean => column_mean(samples, members, c),
                Recentering::Median => column_median(samples, members, c),
            }
        });
    Matrix::new(new_centroids, k, samples.cols())
}

/// Move the samples that are farthest from their centroid into empty (non-pinned) clusters.
/// Only samples from clusters with more than one member are considered.
fn reseed<T: Primitive>(samples: &Matrix<T>, centroids: &CentroidSet<T>, members: &mut [Vec<usize>]) {
    let mut assignments = vec![0usize; samples.rows()];
    members.iter().enumerate()
        .for_each(|(centroid_id, m)| m.iter().for_each(|&s| assignments[s] = centroid_id));
    let centroid_distances: Vec<T> = samples.iter_rows().zip(assignments.iter())
        .map(|(s, &c)| distances::squared(s, centroids.centroids().row(c)))
        .collect();
    let mut distance_sorted_samples: Vec<usize> = (0..samples.rows()).collect();
    distance_sorted_samples.sort_by(|&i1, &i2|
        centroid_distances[i1].partial_cmp(&centroid_distances[i2]).unwrap_or(Ordering::Equal));

    for i in 0..members.len() {
        if centroids.pinned()[i] || !members[i].is_empty() {
            continue;
        }
        // Find the sample with the highest distance to its centroid, that is not alone in its cluster
        let candidate = distance_sorted_samples.iter().rev().cloned()
            .find(|&s| assignments[s] != i && members[assignments[s]].len() > 1);
        let Some(sample_id) = candidate else {
            debug!("no sample left to move into empty cluster {}", i);
            continue;
        };
        let prev_centroid_id = assignments[sample_id];
        members[prev_centroid_id].retain(|&s| s != sample_id);
        members[i].push(sample_id);
        assignments[sample_id] = i;
        debug!("moved sample {} from cluster {} into empty cluster {}", sample_id, prev_centroid_id, i);
    }
}

fn column_mean<T: Primitive>(samples: &Matrix<T>, members: &[usize], dst: &mut [T]) {
    dst.iter_mut().for_each(|v| *v = T::zero());
    members.iter().for_each(|&s| {
        dst.iter_mut().zip(samples.row(s).iter()).for_each(|(c, sv)| *c += sv);
    });
    let cnt = T::from(members.len()).unwrap_or_else(T::one);
    dst.iter_mut().for_each(|v| *v = *v / cnt);
}

fn column_median<T: Primitive>(samples: &Matrix<T>, members: &[usize], dst: &mut [T]) {
    let mut column = Vec::with_capacity(members.len());
    let two = T::one() + T::one();
    for (d, c) in dst.iter_mut().enumerate() {
        column.clear();
        column.extend(members.iter().map(|&s| samples.row(s)[d]));
        column.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let mid = column.len() / 2;
        *c = if column.len() % 2 == 1 {
            column[mid]
        } else {
            (column[mid - 1] + column[mid]) / two
        };
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::testing;

    fn line() -> Matrix<f64> {
        Matrix::new(vec![1.0, 0.0, 2.0, 0.0, 3.0, 0.0, 10.0, 0.0], 4, 2).unwrap()
    }

    #[test]
    fn mean_and_median() {
        let samples = line();
        let centroids = CentroidSet::unpinned(Matrix::new(vec![0.0, 0.0, 100.0, 0.0], 2, 2).unwrap());
        let labels = [0, 0, 0, 1];

        let mean = recenter(&samples, &centroids, &labels, Recentering::Mean, EmptyClusterPolicy::Fail).unwrap();
        assert_eq!(mean.as_slice(), &[2.0, 0.0, 10.0, 0.0]);

        let labels = [0, 0, 0, 0];
        let centroids = CentroidSet::unpinned(Matrix::new(vec![0.0, 0.0], 1, 2).unwrap());
        let mean = recenter(&samples, &centroids, &labels, Recentering::Mean, EmptyClusterPolicy::Fail).unwrap();
        assert_eq!(mean.as_slice(), &[4.0, 0.0]);
        let median = recenter(&samples, &centroids, &labels, Recentering::Median, EmptyClusterPolicy::Fail).unwrap();
        assert_eq!(median.as_slice(), &[2.5, 0.0]);
    }

    #[test]
    fn pinned_rows_never_move() {
        let samples = testing::four_blobs::<f64>();
        let initial = Matrix::new(vec![3.0, 3.0, -50.0, 7.0, 18.0, 1.0], 3, 2).unwrap();
        let mut set = CentroidSet::new(initial.clone(), vec![false, true, false]).unwrap();
        let kmean = crate::KMeans::from_matrix(samples.clone());
        for _ in 0..25 {
            let labels = kmean.assign(set.centroids()).unwrap();
            let next = recenter(&samples, &set, &labels, Recentering::Mean, EmptyClusterPolicy::KeepPrevious).unwrap();
            set = set.with_centroids(next);
            assert_eq!(set.centroids().row(1), initial.row(1));
        }
        assert_ne!(set.centroids().row(0), initial.row(0));
    }

    #[test]
    fn empty_cluster_policies() {
        let samples = line();
        let centroids = CentroidSet::unpinned(Matrix::new(vec![2.0, 0.0, 1337.0, 0.0], 2, 2).unwrap());
        let labels = [0, 0, 0, 0];

        let kept = recenter(&samples, &centroids, &labels, Recentering::Mean, EmptyClusterPolicy::KeepPrevious).unwrap();
        assert_eq!(kept.as_slice(), &[4.0, 0.0, 1337.0, 0.0]);

        let failed = recenter(&samples, &centroids, &labels, Recentering::Mean, EmptyClusterPolicy::Fail);
        assert_eq!(failed, Err(KMeansError::DegenerateCluster { cluster: 1 }));

        // (10, 0) is farthest from (2, 0) and moves into the empty cluster
        let reseeded = recenter(&samples, &centroids, &labels, Recentering::Mean, EmptyClusterPolicy::Reseed).unwrap();
        assert_eq!(reseeded.as_slice(), &[2.0, 0.0, 10.0, 0.0]);
        assert!(reseeded.as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn empty_pinned_cluster_is_fine() {
        let samples = line();
        let centroids = CentroidSet::new(Matrix::new(vec![2.0, 0.0, -99.0, 0.0], 2, 2).unwrap(), vec![false, true]).unwrap();
        let res = recenter(&samples, &centroids, &[0, 0, 0, 0], Recentering::Mean, EmptyClusterPolicy::Fail).unwrap();
        assert_eq!(res.as_slice(), &[4.0, 0.0, -99.0, 0.0]);
    }

    #[test]
    fn invalid_labels() {
        let samples = line();
        let centroids = CentroidSet::unpinned(Matrix::new(vec![0.0, 0.0], 1, 2).unwrap());
        assert!(matches!(recenter(&samples, &centroids, &[0, 0], Recentering::Mean, EmptyClusterPolicy::Fail),
            Err(KMeansError::Shape(_))));
        assert!(matches!(recenter(&samples, &centroids, &[0, 0, 1, 0], Recentering::Mean, EmptyClusterPolicy::Fail),
            Err(KMeansError::Range(_))));
    }
}
