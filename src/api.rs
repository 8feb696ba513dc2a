use crate::{inits, trials, Executor, KMeansError, Matrix, Primitive, Result, SearchConfig, TrialResult};
use rand::prelude::*;
use rayon::prelude::*;
use std::{cell::RefCell, ops::DerefMut, sync::Arc};

pub type InitDoneCallbackFn<'a, T> = &'a dyn Fn(&KMeansState<T>);
pub type IterationDoneCallbackFn<'a, T> = &'a dyn Fn(&KMeansState<T>, usize);

/// How a (non-pinned) centroid is recomputed from the samples assigned to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Recentering {
    /// Column-wise mean (k-means)
    #[default]
    Mean,
    /// Column-wise median (k-medians); the mean of both middle values for even member counts
    Median,
}

/// What to do with a non-pinned centroid that has no samples assigned to it during recentering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EmptyClusterPolicy {
    /// Keep the centroid where it was. If it stays empty, the run's error is infinite.
    #[default]
    KeepPrevious,
    /// Abort the run with [`KMeansError::DegenerateCluster`].
    Fail,
    /// Move the sample that is farthest away from its centroid (taken from a cluster with more than
    /// one member) into the empty cluster.
    Reseed,
}

/// Phase of a running (or finished) clustering run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Iterating,
    /// Two consecutive centroid sets were equal after rounding.
    Converged,
    /// The iteration limit was hit first. The result is still usable.
    MaxIterationsReached,
}

/// This is a structure holding various configuration options for a single clustering run, such as
/// the random number generator to use, the iteration limit, or a couple of callbacks, that can be set
/// to get status information from a running calculation.
///
/// For a more detailed information about all possible options, have a look at [`KMeansConfigBuilder`].
pub struct KMeansConfig<'a, T: Primitive> {
    /// Callback that is called, when the initialization phase finished
    /// ## Arguments
    /// - **state**: Current [`KMeansState`] after the initialization
    pub(crate) init_done: InitDoneCallbackFn<'a, T>,
    /// Callback that is called after each completed iteration
    /// ## Arguments
    /// - **state**: Current [`KMeansState`] after the iteration
    /// - **iteration_id**: Number of the current iteration (starting at 1)
    pub(crate) iteration_done: IterationDoneCallbackFn<'a, T>,
    /// Random number generator to use
    pub(crate) rnd: Box<RefCell<dyn RngCore>>,
    pub(crate) max_iter: usize,
    pub(crate) decimal_places: u32,
    pub(crate) recentering: Recentering,
    pub(crate) empty_cluster: EmptyClusterPolicy,
}
impl<'a, T: Primitive> Default for KMeansConfig<'a, T> {
    fn default() -> Self {
        Self {
            init_done: &|_| {},
            iteration_done: &|_, _| {},
            rnd: Box::new(RefCell::new(rand::thread_rng())),
            max_iter: 200,
            decimal_places: 4,
            recentering: Recentering::default(),
            empty_cluster: EmptyClusterPolicy::default(),
        }
    }
}
impl<'a, T: Primitive> KMeansConfig<'a, T> {
    /// Use the [`KMeansConfigBuilder`] to build a [`KMeansConfig`] instance.
    pub fn build() -> KMeansConfigBuilder<'a, T> {
        KMeansConfigBuilder { config: KMeansConfig::default() }
    }
    pub fn max_iter(&self) -> usize { self.max_iter }
    pub fn decimal_places(&self) -> u32 { self.decimal_places }
    pub fn recentering(&self) -> Recentering { self.recentering }
    pub fn empty_cluster(&self) -> EmptyClusterPolicy { self.empty_cluster }
}
impl<'a, T: Primitive> std::fmt::Debug for KMeansConfig<'a, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KMeansConfig")
            .field("max_iter", &self.max_iter)
            .field("decimal_places", &self.decimal_places)
            .field("recentering", &self.recentering)
            .field("empty_cluster", &self.empty_cluster)
            .finish_non_exhaustive()
    }
}

pub struct KMeansConfigBuilder<'a, T: Primitive> {
    config: KMeansConfig<'a, T>
}
impl<'a, T: Primitive> KMeansConfigBuilder<'a, T> {
    /// Set the callback that should be called after the centroid initialization, before the iteration starts.
    pub fn init_done(mut self, init_done: InitDoneCallbackFn<'a, T>) -> Self {
        self.config.init_done = init_done; self
    }
    /// Set the callback that should be called after each iteration during a running calculation.
    pub fn iteration_done(mut self, iteration_done: IterationDoneCallbackFn<'a, T>) -> Self {
        self.config.iteration_done = iteration_done; self
    }
    /// Set the random number generator that should be used in the calculation.
    /// Use a seeded generator for deterministically repeatable results.
    pub fn random_generator<R: RngCore + 'static>(mut self, rnd: R) -> Self {
        self.config.rnd = Box::new(RefCell::new(rnd)); self
    }
    /// Limit the amount of iterations.
    /// ## Default
    /// `200`
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.config.max_iter = max_iter; self
    }
    /// Amount of decimal places both centroid sets are rounded to, before they are compared for convergence.
    /// ## Default
    /// `4`
    pub fn decimal_places(mut self, decimal_places: u32) -> Self {
        self.config.decimal_places = decimal_places; self
    }
    /// ## Default
    /// [`Recentering::Mean`]
    pub fn recentering(mut self, recentering: Recentering) -> Self {
        self.config.recentering = recentering; self
    }
    /// ## Default
    /// [`EmptyClusterPolicy::KeepPrevious`]
    pub fn empty_cluster(mut self, empty_cluster: EmptyClusterPolicy) -> Self {
        self.config.empty_cluster = empty_cluster; self
    }
    /// Return the internally built configuration structure.
    pub fn build(self) -> KMeansConfig<'a, T> { self.config }
}


/// A set of centroids, together with the mask of which of them are pinned.
/// Pinned centroids are never moved by recentering.
///
/// The pin mask always has exactly one entry per centroid.
#[derive(Clone, Debug, PartialEq)]
pub struct CentroidSet<T: Primitive> {
    centroids: Matrix<T>,
    pinned: Vec<bool>,
}
impl<T: Primitive> CentroidSet<T> {
    pub fn new(centroids: Matrix<T>, pinned: Vec<bool>) -> Result<Self> {
        if pinned.len() != centroids.rows() {
            return Err(KMeansError::Shape(format!(
                "pin mask has {} entries for {} centroids", pinned.len(), centroids.rows())));
        }
        Ok(Self { centroids, pinned })
    }
    pub fn unpinned(centroids: Matrix<T>) -> Self {
        let pinned = vec![false; centroids.rows()];
        Self { centroids, pinned }
    }
    /// Build a set of **k** centroids from caller supplied ones, drawing missing centroids from **samples**.
    /// See [`KMeans::init_pinned`] for the pinning rules.
    pub fn reconcile(samples: &Matrix<T>, k: usize, supplied: &Matrix<T>, rnd: &mut dyn RngCore) -> Result<Self> {
        inits::pinned::reconcile(samples, k, supplied, rnd)
    }

    pub fn centroids(&self) -> &Matrix<T> { &self.centroids }
    pub fn pinned(&self) -> &[bool] { &self.pinned }
    pub fn len(&self) -> usize { self.centroids.rows() }
    pub fn is_empty(&self) -> bool { self.centroids.is_empty() }
    pub fn dims(&self) -> usize { self.centroids.cols() }
    pub fn contains_row(&self, row: &[T]) -> bool { self.centroids.contains_row(row) }
    pub fn into_centroids(self) -> Matrix<T> { self.centroids }

    /// Same pins, new coordinates. Only used with the output of recentering, which keeps the shape.
    pub(crate) fn with_centroids(&self, centroids: Matrix<T>) -> Self {
        Self { centroids, pinned: self.pinned.clone() }
    }
}


/// This is the internally used data-structure, storing the current state during calculation, as
/// well as the final result, as returned by the API.
/// All mutations are done in this structure, making [`KMeans`] immutable, and therefore allowing
/// it to be used in parallel, without having to duplicate the input-data.
///
/// ## Fields
/// - **k**: The amount of clusters that were requested
/// - **distsum**: Total sum of squared distances from all samples to their centroids (infinite if a cluster is empty)
/// - **centroids**: Calculated cluster centers, including the pin mask
/// - **centroid_frequency**: Amount of samples in each cluster
/// - **assignments**: Vector mapping each sample to its nearest centroid
/// - **iterations**: Amount of completed iterations
/// - **phase**: Where the run currently is, or how it ended
#[derive(Clone, Debug)]
pub struct KMeansState<T: Primitive> {
    pub k: usize,
    pub distsum: T,
    pub centroids: CentroidSet<T>,
    pub centroid_frequency: Vec<usize>,
    pub assignments: Vec<usize>,
    pub iterations: usize,
    pub phase: Phase,
}
impl<T: Primitive> KMeansState<T> {
    pub(crate) fn new(sample_cnt: usize, centroids: CentroidSet<T>) -> Self {
        Self {
            k: centroids.len(),
            distsum: T::infinity(),
            centroid_frequency: vec![0usize; centroids.len()],
            centroids,
            assignments: vec![0usize; sample_cnt],
            iterations: 0,
            phase: Phase::Initializing,
        }
    }
    pub fn converged(&self) -> bool { self.phase == Phase::Converged }
}



/// Entrypoint of this crate's API-Surface.
///
/// Create an instance of this struct, giving the samples you want to operate on. The primitive type
/// of the passed samples will be the type used internaly for all calculations, as well as the result
/// as stored in the returned [`KMeansState`] structure.
///
/// The samples are kept behind an [`Arc`], so cloning a [`KMeans`] instance is cheap and clones can
/// be handed to other threads without copying the data.
///
/// ## Supported variants
/// - k-Means / k-Medians clustering (Lloyd) [`KMeans::kmeans_lloyd`]
/// - Concurrent multi-trial search [`KMeans::search_best`]
///
/// ## Supported initialization methods
/// - Random-Sample [`KMeans::init_random_sample`]
/// - Pinned centroids, topped up with random samples [`KMeans::init_pinned`]
/// - Explicit centroid set + pin mask [`KMeans::init_explicit`]
#[derive(Clone, Debug)]
pub struct KMeans<T: Primitive> {
    pub(crate) samples: Arc<Matrix<T>>,
}
impl<T: Primitive> KMeans<T> {
    /// Create a new instance of the [`KMeans`] structure.
    ///
    /// ## Arguments
    /// - **samples**: Vector of samples [row-major] = [<sample0>,<sample1>,<sample2>,...]
    /// - **sample_cnt**: Amount of samples, contained in the passed **samples** vector
    /// - **sample_dims**: Amount of dimensions each sample from the **sample** vector has
    pub fn new(samples: Vec<T>, sample_cnt: usize, sample_dims: usize) -> Result<Self> {
        Ok(Self::from_matrix(Matrix::new(samples, sample_cnt, sample_dims)?))
    }

    pub fn from_matrix(samples: Matrix<T>) -> Self {
        Self { samples: Arc::new(samples) }
    }

    pub fn samples(&self) -> &Matrix<T> { &self.samples }
    pub fn sample_cnt(&self) -> usize { self.samples.rows() }
    pub fn sample_dims(&self) -> usize { self.samples.cols() }


    pub(crate) fn check_dims(&self, centroids: &Matrix<T>) -> Result<()> {
        if centroids.cols() != self.samples.cols() {
            return Err(KMeansError::Shape(format!(
                "centroids have {} dimensions, samples have {}", centroids.cols(), self.samples.cols())));
        }
        Ok(())
    }

    /// Label every sample with the index of its nearest centroid.
    /// On exact ties, the centroid with the lower index wins.
    pub fn assign(&self, centroids: &Matrix<T>) -> Result<Vec<usize>> {
        self.check_dims(centroids)?;
        if centroids.is_empty() {
            return Err(KMeansError::Shape("cannot assign samples to an empty centroid set".into()));
        }
        let mut assignments = vec![0usize; self.samples.rows()];
        self.update_cluster_assignments(centroids, &mut assignments);
        Ok(assignments)
    }

    pub(crate) fn update_cluster_assignments(&self, centroids: &Matrix<T>, assignments: &mut [usize]) {
        // manually calculate work-packet size, because rayon does not do static scheduling (which is more apropriate here)
        let work_packet_size = self.samples.rows() / rayon::current_num_threads();
        self.samples.as_slice().par_chunks_exact(self.samples.cols())
            .with_min_len(work_packet_size.max(1))
            .zip(assignments.par_iter_mut())
            .for_each(|(s, assignment)| {
                let (best_idx, _) = centroids.iter_rows()
                    .map(|c| crate::distances::squared(s, c))
                    .enumerate()
                    .fold((0, T::infinity()), |(best_idx, best_dist), (idx, dist)| {
                        if dist < best_dist { (idx, dist) } else { (best_idx, best_dist) }
                    });
                *assignment = best_idx;
            });
    }

    pub(crate) fn update_cluster_frequencies(assignments: &[usize], centroid_frequency: &mut [usize]) -> usize {
        centroid_frequency.iter_mut().for_each(|v| *v = 0);
        let mut used_centroids_cnt = 0;
        assignments.iter().cloned()
            .for_each(|centroid_id| {
                if centroid_frequency[centroid_id] == 0 {
                    used_centroids_cnt += 1; // Count the amount of centroids with more than 0 samples
                }
                centroid_frequency[centroid_id] += 1;
            });
        used_centroids_cnt
    }

    /// Recompute all non-pinned centroids from the samples assigned to them (see [`Recentering`]).
    /// Pinned centroids are copied over unchanged.
    ///
    /// ## Arguments
    /// - **centroids**: Current centroids and their pin mask
    /// - **assignments**: Cluster index of each sample, as returned by [`KMeans::assign`]
    /// - **recentering**: Mean or median
    /// - **empty_cluster**: What to do with non-pinned centroids without any samples
    pub fn recenter(&self, centroids: &CentroidSet<T>, assignments: &[usize],
                    recentering: Recentering, empty_cluster: EmptyClusterPolicy) -> Result<Matrix<T>> {
        crate::recenter::recenter(&self.samples, centroids, assignments, recentering, empty_cluster)
    }

    /// Total squared distance of all samples to their nearest centroid.
    /// Returns [`Primitive::infinity`] if any centroid ends up without samples.
    pub fn score(&self, centroids: &Matrix<T>) -> Result<T> {
        crate::score::score(self, centroids)
    }


    /// Lloyd's k-Means algorithm with support for pinned centroids.
    ///
    /// Each iteration assigns all samples to their nearest centroid and then recenters all
    /// non-pinned centroids. The calculation stops as soon as two consecutive centroid sets are
    /// equal after rounding them to [`KMeansConfigBuilder::decimal_places`] decimals, or when
    /// [`KMeansConfigBuilder::max_iter`] iterations are done.
    ///
    /// ## Arguments
    /// - **k**: Amount of clusters to search for
    /// - **init**: Initialization-Method to use for the initialization of the **k** centroids
    /// - **config**: [`KMeansConfig`] instance, containing several configuration options for the calculation.
    ///
    /// ## Returns
    /// Instance of [`KMeansState`], containing the final state (result).
    ///
    /// ## Example
    /// ```rust
    /// use kmeans_pinned::*;
    ///
    /// let (sample_cnt, sample_dims, k) = (2000, 8, 4);
    /// let mut samples = vec![0.0f64; sample_cnt * sample_dims];
    /// samples.iter_mut().for_each(|v| *v = rand::random());
    ///
    /// let kmean = KMeans::new(samples, sample_cnt, sample_dims).unwrap();
    /// let result = kmean.kmeans_lloyd(k, KMeans::init_random_sample, &KMeansConfig::default()).unwrap();
    ///
    /// println!("Centroids: {:?}", result.centroids.centroids());
    /// println!("Cluster-Assignments: {:?}", result.assignments);
    /// println!("Error: {}", result.distsum);
    /// ```
    pub fn kmeans_lloyd<'a, F>(&self, k: usize, init: F, config: &KMeansConfig<'a, T>) -> Result<KMeansState<T>>
                where for<'c> F: FnOnce(&KMeans<T>, usize, &KMeansConfig<'c, T>) -> Result<CentroidSet<T>> {
        crate::variants::Lloyd::calculate(self, k, init, config)
    }

    /// Run **search_config.trials** independent Lloyd runs on **executor** and rank their results.
    ///
    /// Every trial uses the same **pinned** centroids (see [`KMeans::init_pinned`]), topped up with its own
    /// randomly drawn centroids. Input errors are reported before any trial is started; failing trials are
    /// recorded in the returned [`TrialResult`] instead of aborting the search.
    pub fn search_best<E: Executor + ?Sized>(&self, k: usize, pinned: Option<&Matrix<T>>,
                        search_config: &SearchConfig<T>, executor: &E) -> Result<TrialResult<T>> {
        trials::search(self, k, pinned, search_config, executor)
    }


    /// Random sample initialization method (a.k.a. Forgy)
    ///
    /// ## Description
    /// This initialization method randomly selects k distinct samples as initial centroids. None of them is pinned.
    ///
    /// ## Note
    /// This method is not meant for direct invocation. Pass a reference to it, to an instance-method of [`KMeans`].
    pub fn init_random_sample<'a>(kmean: &KMeans<T>, k: usize, config: &KMeansConfig<'a, T>) -> Result<CentroidSet<T>> {
        let centroids = inits::randomsample::sample_rows(&kmean.samples, k, config.rnd.borrow_mut().deref_mut())?;
        Ok(CentroidSet::unpinned(centroids))
    }

    /// Pinned centroid initialization method
    ///
    /// ## Description
    /// The given centroids are pinned and never recentered. If there are fewer than k of them, the
    /// remaining centroids are drawn randomly from the samples (not pinned). If there are more than k,
    /// only the first k are used, and none of them is pinned.
    pub fn init_pinned(pinned: Matrix<T>) -> impl FnOnce(&KMeans<T>, usize, &KMeansConfig<'_, T>) -> Result<CentroidSet<T>> {
        move |kmean, k, config| inits::pinned::reconcile(&kmean.samples, k, &pinned, config.rnd.borrow_mut().deref_mut())
    }

    /// Use the given centroid set (and its pin mask) as it is.
    pub fn init_explicit(centroids: CentroidSet<T>) -> impl FnOnce(&KMeans<T>, usize, &KMeansConfig<'_, T>) -> Result<CentroidSet<T>> {
        move |_, _, _| Ok(centroids)
    }
}
