use kmeans_pinned::*;

fn main() {
    let (sample_cnt, sample_dims, k) = (20000, 16, 8);

    // Generate some random data
    let mut samples = vec![0.0f64;sample_cnt * sample_dims];
    samples.iter_mut().for_each(|v| *v = rand::random());

    let conf = KMeansConfig::<f64>::build()
        .init_done(&|s| println!("Initialization completed, {} centroids pinned.",
            s.centroids.pinned().iter().filter(|&&p| p).count()))
        .iteration_done(&|s, nr| println!("Iteration {} - Cluster sizes: {:?}", nr, s.centroid_frequency))
        .recentering(Recentering::Median)
        .empty_cluster(EmptyClusterPolicy::Reseed)
        .build();

    // Pin the first centroid into the center of the unit cube
    let kmean = KMeans::new(samples, sample_cnt, sample_dims).expect("valid sample shape");
    let pinned = Matrix::new(vec![0.5; sample_dims], 1, sample_dims).expect("valid pinned shape");
    let result = kmean.kmeans_lloyd(k, KMeans::init_pinned(pinned), &conf).expect("clustering failed");

    println!("Centroids: {:?}", result.centroids.centroids());
    println!("Error: {}", result.distsum);
}
