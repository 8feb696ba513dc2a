use kmeans_pinned::*;

fn main() {
    let (sample_cnt, sample_dims, k) = (20000, 8, 4);

    // Generate some random data
    let mut samples = vec![0.0f64;sample_cnt * sample_dims];
    samples.iter_mut().for_each(|v| *v = rand::random());

    let kmean = KMeans::new(samples, sample_cnt, sample_dims).expect("valid sample shape");
    let conf = KMeansConfig::build().max_iter(100).build();
    let result = kmean.kmeans_lloyd(k, KMeans::init_random_sample, &conf).expect("clustering failed");

    println!("Centroids: {:?}", result.centroids.centroids());
    println!("Cluster-Frequencies: {:?}", result.centroid_frequency);
    println!("{:?} after {} iterations - Error: {}", result.phase, result.iterations, result.distsum);
}
