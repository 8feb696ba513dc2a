use crate::{convergence, recenter, score, KMeans, KMeansConfig, KMeansError, KMeansState, CentroidSet, Phase, Primitive, Result};
use log::debug;

pub(crate) struct Lloyd<T: Primitive> {
    _p: std::marker::PhantomData<T>
}
impl<T: Primitive> Lloyd<T> {
    fn validate_init(data: &KMeans<T>, k: usize, centroids: &CentroidSet<T>) -> Result<()> {
        if centroids.len() != k {
            return Err(KMeansError::Shape(format!(
                "initialization produced {} centroids, {} were requested", centroids.len(), k)));
        }
        data.check_dims(centroids.centroids())
    }

    pub fn calculate<'a, F>(data: &KMeans<T>, k: usize, init: F, config: &KMeansConfig<'a, T>) -> Result<KMeansState<T>>
                where for<'c> F: FnOnce(&KMeans<T>, usize, &KMeansConfig<'c, T>) -> Result<CentroidSet<T>> {
        if k == 0 || k > data.sample_cnt() {
            return Err(KMeansError::Range(format!(
                "k = {} is invalid for {} samples", k, data.sample_cnt())));
        }

        // Initialize clusters and notify subscriber
        let centroids = init(data, k, config)?;
        Self::validate_init(data, k, &centroids)?;
        let mut state = KMeansState::new(data.sample_cnt(), centroids);
        debug!("initialized {} centroids ({} pinned)", k, state.centroids.pinned().iter().filter(|&&p| p).count());
        (config.init_done)(&state);

        state.phase = Phase::Iterating;
        for i in 1..=config.max_iter {
            data.update_cluster_assignments(state.centroids.centroids(), &mut state.assignments);
            let new_centroids = recenter::recenter(data.samples(), &state.centroids, &state.assignments,
                config.recentering, config.empty_cluster)?;
            let done = convergence::converged(state.centroids.centroids(), &new_centroids, config.decimal_places)?;

            state.centroids = state.centroids.with_centroids(new_centroids);
            state.iterations = i;
            KMeans::<T>::update_cluster_frequencies(&state.assignments, &mut state.centroid_frequency);

            // Notify subscriber about finished iteration
            (config.iteration_done)(&state, i);
            if done {
                state.phase = Phase::Converged;
                break;
            }
        }
        if state.phase != Phase::Converged {
            state.phase = Phase::MaxIterationsReached;
        }

        data.update_cluster_assignments(state.centroids.centroids(), &mut state.assignments);
        KMeans::<T>::update_cluster_frequencies(&state.assignments, &mut state.centroid_frequency);
        state.distsum = score::distsum(data.samples(), state.centroids.centroids(), &state.assignments);
        debug!("{:?} after {} iterations, error: {:e}", state.phase, state.iterations, state.distsum);
        Ok(state)
    }
}
