#[macro_use]
extern crate log;

use kmeans_pinned::*;
use rand::prelude::*;

fn main() {
    pretty_env_logger::formatted_timed_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    // Four gaussian-ish blobs around the corners of a square
    let mut rnd = StdRng::seed_from_u64(1337);
    let centers = [(0.0, 0.0), (20.0, 0.0), (0.0, 20.0), (20.0, 20.0)];
    let rows: Vec<Vec<f64>> = (0..4000)
        .map(|i| {
            let (cx, cy) = centers[i % centers.len()];
            vec![cx + rnd.gen_range(-2.0..2.0), cy + rnd.gen_range(-2.0..2.0)]
        })
        .collect();
    let kmean = KMeans::from_matrix(Matrix::from_rows(rows).expect("rows of equal length"));

    // One known center is pinned, the remaining three are searched for
    let pinned = Matrix::new(vec![20.0, 20.0], 1, 2).expect("valid pinned shape");
    let conf = SearchConfig::build().trials(64).seed(7).build();
    let threads = std::thread::available_parallelism().map_or(4, |n| n.get());
    let pool = ThreadPool::new(threads);

    let result = match kmean.search_best(4, Some(&pinned), &conf, &pool) {
        Ok(result) => result,
        Err(e) => {
            error!("search failed: {}", e);
            std::process::exit(1);
        }
    };

    if let (Some(best), Some(worst)) = (result.best(), result.worst()) {
        info!("best trial {} - error {:.2} in {} iterations", best.trial, best.error(), best.state.iterations);
        info!("worst trial {} - error {:.2}", worst.trial, worst.error());
        for (i, c) in best.centroids().centroids().iter_rows().enumerate() {
            info!("centroid {}: {:?} (pinned: {})", i, c, best.centroids().pinned()[i]);
        }
    }
    if !result.failed().is_empty() {
        warn!("{} trials failed", result.failed().len());
    }
}
