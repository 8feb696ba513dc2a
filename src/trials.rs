//! Concurrent multi-trial search.
//!
//! A search runs a number of independent Lloyd runs (trials) on the same samples and the same pinned
//! centroids. Trials only differ in the random generator they use for drawing their non-pinned
//! centroids. Every trial gets its own seed, drawn up-front from one master generator, so the ranked
//! result only depends on the master seed, never on the order in which trials complete.

use crate::{CentroidSet, EmptyClusterPolicy, KMeans, KMeansConfig, KMeansError, KMeansState, Matrix, Primitive, Recentering, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, error, info, warn};
use rand::prelude::*;
use std::{
    any::Any,
    cmp::Ordering as CmpOrdering,
    panic::{self, AssertUnwindSafe},
    sync::{atomic::{AtomicBool, Ordering}, Arc},
    thread::{self, JoinHandle},
    time::Duration,
};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run jobs, possibly concurrently.
///
/// Implementations may run a job at any time after it was submitted (or right away, on the calling thread).
/// A job that is dropped without being run is reported as a failed trial by the search.
pub trait Executor {
    fn execute(&self, job: Job);
}

/// Fixed amount of worker threads, fed through a channel.
/// Dropping the pool waits for all submitted jobs to finish.
pub struct ThreadPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}
impl ThreadPool {
    pub fn new(threads: usize) -> Self {
        let (sender, receiver): (Sender<Job>, Receiver<Job>) = unbounded();
        debug!("spawning {} worker threads", threads.max(1));
        let workers = (0..threads.max(1))
            .map(|_| {
                let m_receiver = receiver.clone();
                thread::spawn(move || {
                    for job in m_receiver.iter() {
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            error!("worker job panicked");
                        }
                    }
                })
            })
            .collect();
        Self { sender: Some(sender), workers }
    }

    pub fn threads(&self) -> usize { self.workers.len() }
}
impl Executor for ThreadPool {
    fn execute(&self, job: Job) {
        if let Some(sender) = &self.sender {
            if sender.send(job).is_err() {
                warn!("all workers are gone, dropping job");
            }
        }
    }
}
impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Closing the channel ends the workers' receive loops
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("worker thread panicked");
            }
        }
    }
}

/// Runs jobs with `rayon::spawn`, i.e. on the rayon pool of the calling thread
/// (the global pool when called from outside of rayon).
#[derive(Clone, Copy, Debug, Default)]
pub struct RayonExecutor;
impl Executor for RayonExecutor {
    fn execute(&self, job: Job) {
        rayon::spawn(job);
    }
}

/// Runs every job right away, on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineExecutor;
impl Executor for InlineExecutor {
    fn execute(&self, job: Job) {
        job();
    }
}


/// Options of a multi-trial search. Use [`SearchConfig::build`] to create one.
#[derive(Clone, Debug)]
pub struct SearchConfig<T: Primitive> {
    pub(crate) trials: usize,
    pub(crate) max_iter: usize,
    pub(crate) decimal_places: u32,
    pub(crate) recentering: Recentering,
    pub(crate) empty_cluster: EmptyClusterPolicy,
    pub(crate) seed: Option<u64>,
    pub(crate) stop_below: Option<T>,
}
impl<T: Primitive> Default for SearchConfig<T> {
    fn default() -> Self {
        Self {
            trials: 1000,
            max_iter: 1000,
            decimal_places: 4,
            recentering: Recentering::default(),
            empty_cluster: EmptyClusterPolicy::default(),
            seed: None,
            stop_below: None,
        }
    }
}
impl<T: Primitive> SearchConfig<T> {
    pub fn build() -> SearchConfigBuilder<T> {
        SearchConfigBuilder { config: SearchConfig::default() }
    }
    pub fn trials(&self) -> usize { self.trials }
    pub fn max_iter(&self) -> usize { self.max_iter }
    pub fn decimal_places(&self) -> u32 { self.decimal_places }
    pub fn seed(&self) -> Option<u64> { self.seed }
    pub fn stop_below(&self) -> Option<T> { self.stop_below }

    fn run_config<'a>(&self, seed: u64) -> KMeansConfig<'a, T> {
        KMeansConfig::build()
            .random_generator(StdRng::seed_from_u64(seed))
            .max_iter(self.max_iter)
            .decimal_places(self.decimal_places)
            .recentering(self.recentering)
            .empty_cluster(self.empty_cluster)
            .build()
    }
}

pub struct SearchConfigBuilder<T: Primitive> {
    config: SearchConfig<T>
}
impl<T: Primitive> SearchConfigBuilder<T> {
    /// Amount of independent runs.
    /// ## Default
    /// `1000`
    pub fn trials(mut self, trials: usize) -> Self {
        self.config.trials = trials; self
    }
    /// Iteration limit of each run.
    /// ## Default
    /// `1000`
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.config.max_iter = max_iter; self
    }
    /// ## Default
    /// `4`
    pub fn decimal_places(mut self, decimal_places: u32) -> Self {
        self.config.decimal_places = decimal_places; self
    }
    pub fn recentering(mut self, recentering: Recentering) -> Self {
        self.config.recentering = recentering; self
    }
    pub fn empty_cluster(mut self, empty_cluster: EmptyClusterPolicy) -> Self {
        self.config.empty_cluster = empty_cluster; self
    }
    /// Seed of the master generator the per-trial seeds are drawn from.
    /// Without a seed, the master generator is seeded from the operating system.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed); self
    }
    /// As soon as one trial ends with an error of at most **threshold**, trials that did not start yet are cancelled.
    /// Trials that are already running finish normally.
    pub fn stop_below(mut self, threshold: T) -> Self {
        self.config.stop_below = Some(threshold); self
    }
    pub fn build(self) -> SearchConfig<T> { self.config }
}


/// Outcome of one completed trial.
#[derive(Clone, Debug)]
pub struct Solution<T: Primitive> {
    /// Submission index of the trial
    pub trial: usize,
    /// Seed of the trial's random generator. Feeding it to [`KMeansConfigBuilder::random_generator`](crate::KMeansConfigBuilder::random_generator)
    /// as `StdRng::seed_from_u64(seed)` reproduces this solution.
    pub seed: u64,
    pub state: KMeansState<T>,
}
impl<T: Primitive> Solution<T> {
    pub fn error(&self) -> T { self.state.distsum }
    pub fn centroids(&self) -> &CentroidSet<T> { &self.state.centroids }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedTrial {
    pub trial: usize,
    pub message: String,
}

enum TrialOutcome<T: Primitive> {
    Completed(Solution<T>),
    Failed(String),
    Cancelled,
}

/// Result of [`KMeans::search_best`]: all completed trials, ranked by ascending error.
/// Equal errors are ordered by submission index, NaN errors come last.
#[derive(Clone, Debug)]
pub struct TrialResult<T: Primitive> {
    solutions: Vec<Solution<T>>,
    failed: Vec<FailedTrial>,
    cancelled: Vec<usize>,
}
impl<T: Primitive> TrialResult<T> {
    pub fn best(&self) -> Option<&Solution<T>> { self.solutions.first() }
    pub fn worst(&self) -> Option<&Solution<T>> { self.solutions.last() }
    pub fn len(&self) -> usize { self.solutions.len() }
    pub fn is_empty(&self) -> bool { self.solutions.is_empty() }
    pub fn iter(&self) -> std::slice::Iter<'_, Solution<T>> { self.solutions.iter() }
    pub fn failed(&self) -> &[FailedTrial] { &self.failed }
    pub fn cancelled(&self) -> &[usize] { &self.cancelled }
    pub fn into_solutions(self) -> Vec<Solution<T>> { self.solutions }

    fn rank(a: &Solution<T>, b: &Solution<T>) -> CmpOrdering {
        let by_error = match (a.error().is_nan(), b.error().is_nan()) {
            (false, false) => a.error().partial_cmp(&b.error()).unwrap_or(CmpOrdering::Equal),
            (true, false) => CmpOrdering::Greater,
            (false, true) => CmpOrdering::Less,
            (true, true) => CmpOrdering::Equal,
        };
        by_error.then(a.trial.cmp(&b.trial))
    }
}
impl<'a, T: Primitive> IntoIterator for &'a TrialResult<T> {
    type Item = &'a Solution<T>;
    type IntoIter = std::slice::Iter<'a, Solution<T>>;
    fn into_iter(self) -> Self::IntoIter { self.solutions.iter() }
}


fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("trial panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("trial panicked: {}", msg)
    } else {
        "trial panicked".to_string()
    }
}

/// Run one trial, turning errors and panics into [`TrialOutcome::Failed`].
fn guarded<T: Primitive>(run: impl FnOnce() -> Result<Solution<T>>) -> TrialOutcome<T> {
    match panic::catch_unwind(AssertUnwindSafe(run)) {
        Ok(Ok(solution)) => TrialOutcome::Completed(solution),
        Ok(Err(e)) => TrialOutcome::Failed(e.to_string()),
        Err(payload) => TrialOutcome::Failed(panic_message(payload)),
    }
}

fn run_trial<T: Primitive>(kmean: &KMeans<T>, k: usize, pinned: Option<Matrix<T>>, config: &SearchConfig<T>, trial: usize, seed: u64) -> Result<Solution<T>> {
    let conf = config.run_config(seed);
    let state = match pinned {
        Some(pinned) => kmean.kmeans_lloyd(k, KMeans::init_pinned(pinned), &conf)?,
        None => kmean.kmeans_lloyd(k, KMeans::init_random_sample, &conf)?,
    };
    Ok(Solution { trial, seed, state })
}

pub(crate) fn search<T: Primitive, E: Executor + ?Sized>(kmean: &KMeans<T>, k: usize, pinned: Option<&Matrix<T>>,
                                                          config: &SearchConfig<T>, executor: &E) -> Result<TrialResult<T>> {
    if k == 0 || k > kmean.sample_cnt() {
        return Err(KMeansError::Range(format!("k = {} is invalid for {} samples", k, kmean.sample_cnt())));
    }
    if let Some(pinned) = pinned {
        kmean.check_dims(pinned)?;
        if pinned.rows() > kmean.sample_cnt() {
            return Err(KMeansError::Range(format!(
                "{} centroids supplied for only {} samples", pinned.rows(), kmean.sample_cnt())));
        }
    }

    let mut master = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let seeds: Vec<u64> = (0..config.trials).map(|_| master.next_u64()).collect();
    let stop = Arc::new(AtomicBool::new(false));
    let (result_sender, result_receiver): (Sender<(usize, TrialOutcome<T>)>, Receiver<(usize, TrialOutcome<T>)>) = unbounded();

    info!("running {} trials with k = {} ({} pinned)", config.trials, k, pinned.map_or(0, |p| p.rows()));
    for (trial, seed) in seeds.into_iter().enumerate() {
        let m_kmean = kmean.clone();
        let m_pinned = pinned.cloned();
        let m_config = config.clone();
        let m_stop = stop.clone();
        let m_result_sender = result_sender.clone();
        executor.execute(Box::new(move || {
            let outcome = if m_stop.load(Ordering::SeqCst) {
                TrialOutcome::Cancelled
            } else {
                let outcome = guarded(|| run_trial(&m_kmean, k, m_pinned, &m_config, trial, seed));
                if let TrialOutcome::Completed(solution) = &outcome {
                    if m_config.stop_below.map_or(false, |threshold| solution.error() <= threshold) {
                        m_stop.store(true, Ordering::SeqCst);
                    }
                }
                outcome
            };
            // The receiving side outlives all jobs unless the search itself panicked
            let _ = m_result_sender.send((trial, outcome));
        }));
    }
    drop(result_sender);

    // Completion order -> submission order
    let mut slots: Vec<Option<TrialOutcome<T>>> = (0..config.trials).map(|_| None).collect();
    if rayon::current_thread_index().is_some() {
        // We are occupying a rayon worker. Blocking it could starve the pool the trials were spawned onto,
        // so keep running pending rayon jobs while waiting.
        loop {
            match result_receiver.try_recv() {
                Ok((trial, outcome)) => slots[trial] = Some(outcome),
                Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {
                    if !matches!(rayon::yield_now(), Some(rayon::Yield::Executed)) {
                        match result_receiver.recv_timeout(Duration::from_millis(1)) {
                            Ok((trial, outcome)) => slots[trial] = Some(outcome),
                            Err(RecvTimeoutError::Disconnected) => break,
                            Err(RecvTimeoutError::Timeout) => {},
                        }
                    }
                },
            }
        }
    } else {
        for (trial, outcome) in result_receiver.iter() {
            slots[trial] = Some(outcome);
        }
    }

    let mut result = TrialResult { solutions: Vec::new(), failed: Vec::new(), cancelled: Vec::new() };
    for (trial, slot) in slots.into_iter().enumerate() {
        match slot {
            Some(TrialOutcome::Completed(solution)) => result.solutions.push(solution),
            Some(TrialOutcome::Cancelled) => result.cancelled.push(trial),
            Some(TrialOutcome::Failed(message)) => {
                warn!("trial {} failed: {}", trial, message);
                result.failed.push(FailedTrial { trial, message });
            },
            None => {
                warn!("trial {} was never executed", trial);
                result.failed.push(FailedTrial { trial, message: "never executed".to_string() });
            },
        }
    }
    result.solutions.sort_by(TrialResult::rank);

    info!("search finished: {} solutions, {} failed, {} cancelled, best error: {}",
        result.solutions.len(), result.failed.len(), result.cancelled.len(),
        result.best().map_or(T::infinity(), |s| s.error()));
    Ok(result)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::testing;
    use std::sync::Mutex;

    /// Collects jobs and runs all of them in reverse submission order, once **batch** jobs were submitted.
    struct ReversingExecutor {
        batch: usize,
        jobs: Mutex<Vec<Job>>,
    }
    impl Executor for ReversingExecutor {
        fn execute(&self, job: Job) {
            let mut jobs = self.jobs.lock().unwrap();
            jobs.push(job);
            if jobs.len() == self.batch {
                jobs.drain(..).rev().for_each(|job| job());
            }
        }
    }

    struct DroppingExecutor;
    impl Executor for DroppingExecutor {
        fn execute(&self, _job: Job) {}
    }

    fn assert_ranked(result: &TrialResult<f64>) {
        let best = result.best().unwrap().error();
        assert!(result.iter().all(|s| best <= s.error()));
        assert!(result.iter().zip(result.iter().skip(1)).all(|(a, b)| a.error() <= b.error()));
    }

    #[test]
    fn four_blobs_on_a_thread_pool() {
        let data = testing::four_blobs::<f64>();
        let kmean = KMeans::from_matrix(data.clone());
        let conf = SearchConfig::build().trials(50).seed(42).build();
        let pool = ThreadPool::new(4);
        let result = kmean.search_best(4, None, &conf, &pool).unwrap();

        assert_eq!(result.len(), 50);
        assert!(result.failed().is_empty());
        assert_ranked(&result);

        // every blob holds exactly one of the best centroids
        let best = result.best().unwrap().centroids().centroids();
        for b in 0..4 {
            let blob = testing::blob(&data, b);
            let inside = best.iter_rows()
                .filter(|c| testing::inside_convex_hull(blob.clone(), (c[0], c[1])))
                .count();
            assert_eq!(inside, 1);
        }
        assert_approx_eq!(result.best().unwrap().error(), 48.0, 1e-9);
    }

    #[test]
    fn pinned_point_in_every_solution() {
        let kmean = KMeans::from_matrix(testing::four_blobs::<f64>());
        let pinned = Matrix::new(vec![-20.0, -20.0], 1, 2).unwrap();
        let conf = SearchConfig::build().trials(20).seed(3).build();
        let result = kmean.search_best(4, Some(&pinned), &conf, &RayonExecutor).unwrap();

        assert_eq!(result.len(), 20);
        for solution in &result {
            assert!(solution.centroids().contains_row(&[-20.0, -20.0]));
            assert!(solution.centroids().pinned()[0]);
        }
    }

    #[test]
    fn ranking_does_not_depend_on_completion_order() {
        let kmean = KMeans::from_matrix(testing::four_blobs::<f64>());
        let conf = SearchConfig::build().trials(12).seed(9).build();
        let inline = kmean.search_best(3, None, &conf, &InlineExecutor).unwrap();
        let reversed = kmean.search_best(3, None, &conf, &ReversingExecutor { batch: 12, jobs: Mutex::new(Vec::new()) }).unwrap();

        let order = |r: &TrialResult<f64>| r.iter().map(|s| (s.trial, s.seed, s.error())).collect::<Vec<_>>();
        assert_eq!(order(&inline), order(&reversed));
        assert_ranked(&inline);
    }

    #[test]
    fn stop_below_cancels_pending_trials() {
        let kmean = KMeans::from_matrix(testing::four_blobs::<f64>());
        let conf = SearchConfig::build().trials(8).seed(1).stop_below(f64::INFINITY).build();
        let result = kmean.search_best(2, None, &conf, &InlineExecutor).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.best().unwrap().trial, 0);
        assert_eq!(result.cancelled(), &[1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn failed_trials_are_recorded() {
        // identical samples: the second centroid never gets a sample
        let kmean = KMeans::new(vec![1.0f64; 6], 6, 1).unwrap();
        let conf = SearchConfig::build().trials(5).seed(1).empty_cluster(EmptyClusterPolicy::Fail).build();
        let result = kmean.search_best(2, None, &conf, &ThreadPool::new(2)).unwrap();
        assert!(result.is_empty());
        assert!(result.best().is_none());
        assert_eq!(result.failed().len(), 5);
        assert!(result.failed().iter().all(|f| f.message.contains("no members")));

        let result = kmean.search_best(2, None, &conf, &DroppingExecutor).unwrap();
        assert_eq!(result.failed().len(), 5);
        assert!(result.failed().iter().all(|f| f.message == "never executed"));
    }

    #[test]
    fn crashing_trials_become_failures() {
        let failure = |outcome: TrialOutcome<f64>| match outcome {
            TrialOutcome::Failed(message) => message,
            _ => panic!("expected a failed trial"),
        };
        assert_eq!(failure(guarded(|| panic!("worker lost"))), "trial panicked: worker lost");
        let code = 7;
        assert_eq!(failure(guarded(|| panic!("exit code {}", code))), "trial panicked: exit code 7");
        assert_eq!(failure(guarded(|| Err(KMeansError::DegenerateCluster { cluster: 2 }))),
            "cluster 2 has no members left");

        let kmean = KMeans::from_matrix(testing::four_blobs::<f64>());
        let conf = SearchConfig::build().seed(2).build();
        let completed = guarded(|| run_trial(&kmean, 4, None, &conf, 0, 99));
        assert!(matches!(completed, TrialOutcome::Completed(Solution { trial: 0, seed: 99, .. })));
    }

    #[test]
    fn search_from_inside_a_single_threaded_rayon_pool() {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        let kmean = KMeans::from_matrix(testing::four_blobs::<f64>());
        let conf = SearchConfig::build().trials(6).seed(4).build();
        let result = pool.install(|| kmean.search_best(4, None, &conf, &RayonExecutor)).unwrap();
        assert_eq!(result.len(), 6);
        assert!(result.failed().is_empty());

        let inline = kmean.search_best(4, None, &conf, &InlineExecutor).unwrap();
        let order = |r: &TrialResult<f64>| r.iter().map(|s| s.trial).collect::<Vec<_>>();
        assert_eq!(order(&result), order(&inline));
    }

    #[test]
    fn input_errors_come_first() {
        let kmean = KMeans::from_matrix(testing::four_blobs::<f64>());
        let conf = SearchConfig::build().trials(3).build();
        assert!(matches!(kmean.search_best(0, None, &conf, &InlineExecutor), Err(KMeansError::Range(_))));
        assert!(matches!(kmean.search_best(37, None, &conf, &InlineExecutor), Err(KMeansError::Range(_))));
        let wrong = Matrix::new(vec![0.0; 3], 1, 3).unwrap();
        assert!(matches!(kmean.search_best(2, Some(&wrong), &conf, &InlineExecutor), Err(KMeansError::Shape(_))));
    }

    #[test]
    fn nan_errors_rank_last() {
        let state = |distsum: f64| {
            let set = CentroidSet::unpinned(Matrix::new(vec![0.0], 1, 1).unwrap());
            let mut state = KMeansState::new(1, set);
            state.distsum = distsum;
            state
        };
        let mut solutions = vec![
            Solution { trial: 0, seed: 0, state: state(f64::NAN) },
            Solution { trial: 1, seed: 0, state: state(2.0) },
            Solution { trial: 2, seed: 0, state: state(f64::INFINITY) },
            Solution { trial: 3, seed: 0, state: state(2.0) },
        ];
        solutions.sort_by(TrialResult::rank);
        assert_eq!(solutions.iter().map(|s| s.trial).collect::<Vec<_>>(), vec![1, 3, 2, 0]);
    }

    #[test]
    fn defaults() {
        let conf = SearchConfig::<f32>::default();
        assert_eq!((conf.trials(), conf.max_iter(), conf.decimal_places()), (1000, 1000, 4));
        assert_eq!((conf.seed(), conf.stop_below()), (None, None));
    }
}
