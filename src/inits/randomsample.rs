use crate::{KMeansError, Matrix, Primitive, Result};
use rand::prelude::*;

/// Draw **count** distinct samples (uniformly, without replacement) from **data**.
/// The returned rows are copies, so the result can be mutated freely.
pub fn sample_rows<T: Primitive>(data: &Matrix<T>, count: usize, rnd: &mut dyn RngCore) -> Result<Matrix<T>> {
    if count > data.rows() {
        return Err(KMeansError::Range(format!(
            "cannot draw {} distinct centroids from {} samples", count, data.rows())));
    }
    let indices = rand::seq::index::sample(rnd, data.rows(), count).into_vec();
    Ok(data.select_rows(&indices))
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn draws_distinct_dataset_rows() {
        let mut rnd = StdRng::seed_from_u64(1337);
        let data = Matrix::new((0..200).map(|v| v as f64).collect(), 100, 2).unwrap();
        for count in [0usize, 1, 7, 50, 100] {
            let picked = sample_rows(&data, count, &mut rnd).unwrap();
            assert_eq!(picked.rows(), count);
            let distinct: HashSet<u64> = picked.iter_rows().map(|r| r[0].to_bits()).collect();
            assert_eq!(distinct.len(), count);
            assert!(picked.iter_rows().all(|r| data.contains_row(r)));
        }
    }

    #[test]
    fn rejects_too_many() {
        let mut rnd = StdRng::seed_from_u64(1);
        let data = Matrix::new(vec![1.0f32, 2.0, 3.0], 3, 1).unwrap();
        assert!(matches!(sample_rows(&data, 4, &mut rnd), Err(KMeansError::Range(_))));
    }

    #[test]
    fn copies_are_independent() {
        let mut rnd = StdRng::seed_from_u64(3);
        let data = Matrix::new(vec![1.0f64, 2.0], 2, 1).unwrap();
        let mut picked = sample_rows(&data, 2, &mut rnd).unwrap();
        picked.row_mut(0)[0] = 1337.0;
        assert_eq!(data.as_slice(), &[1.0, 2.0]);
    }
}
