//! Distance primitives between single vectors and between groups of vectors.

mod euclideandistance;

pub(crate) use euclideandistance::{euclidean, squared};

use crate::{KMeansError, Matrix, Primitive, Result};
use rayon::prelude::*;

/// Distance matrix between two groups of vectors.
///
/// Entry `(i, j)` of the `m x n` result holds the distance between row `i` of **group_a** and
/// row `j` of **group_b**. With **take_sqrt** unset, the squared euclidean distance is returned,
/// which is enough wherever only the ordering of distances matters.
///
/// Fails with [`KMeansError::Shape`] if the column counts differ, or if **group_b** has no rows:
/// a [`Matrix`] always has at least one column, so an `m x 0` result can't be represented.
/// An empty **group_a** is fine and yields a `0 x n` matrix.
pub fn pairwise_distances<T: Primitive>(group_a: &Matrix<T>, group_b: &Matrix<T>, take_sqrt: bool) -> Result<Matrix<T>> {
    if group_a.cols() != group_b.cols() {
        return Err(KMeansError::Shape(format!(
            "cannot compare vectors with {} dimensions against vectors with {}", group_a.cols(), group_b.cols())));
    }
    let n = group_b.rows();
    if n == 0 {
        return Err(KMeansError::Shape("cannot compute distances against an empty group".into()));
    }
    let mut out = vec![T::zero(); group_a.rows() * n];
    out.par_chunks_mut(n)
        .zip(group_a.as_slice().par_chunks_exact(group_a.cols()))
        .for_each(|(dst, a)| {
            dst.iter_mut().zip(group_b.iter_rows())
                .for_each(|(d, b)| *d = if take_sqrt { euclidean(a, b) } else { squared(a, b) });
        });
    Matrix::new(out, group_a.rows(), n)
}

/// Euclidean distance between two vectors of equal length.
pub fn vector_distance<T: Primitive>(u: &[T], v: &[T]) -> Result<T> {
    check_lengths(u, v)?;
    Ok(euclidean(u, v))
}

/// Squared euclidean distance between two vectors of equal length.
pub fn squared_distance<T: Primitive>(u: &[T], v: &[T]) -> Result<T> {
    check_lengths(u, v)?;
    Ok(squared(u, v))
}

fn check_lengths<T>(u: &[T], v: &[T]) -> Result<()> {
    if u.len() != v.len() {
        return Err(KMeansError::Shape(format!("vector lengths differ: {} vs {}", u.len(), v.len())));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_distances() {
        assert_approx_eq!(vector_distance(&[0.0f64, 0.0], &[3.0, 4.0]).unwrap(), 5.0, 1e-12);
        assert_approx_eq!(squared_distance(&[0.0f32, 0.0], &[3.0, 4.0]).unwrap(), 25.0, 1e-6);
        assert_eq!(vector_distance(&[1.0f64], &[1.0]).unwrap(), 0.0);
        assert!(matches!(vector_distance(&[1.0f64, 2.0], &[1.0]), Err(KMeansError::Shape(_))));
    }

    #[test]
    fn pairwise_matches_vector_distance() {
        let a = Matrix::from_rows(vec![vec![0.0f64, 0.0], vec![1.0, 1.0], vec![-2.0, 5.0]]).unwrap();
        let b = Matrix::from_rows(vec![vec![3.0f64, 4.0], vec![1.0, 1.0]]).unwrap();

        let d = pairwise_distances(&a, &b, true).unwrap();
        let d2 = pairwise_distances(&a, &b, false).unwrap();
        assert_eq!((d.rows(), d.cols()), (3, 2));
        for i in 0..a.rows() {
            for j in 0..b.rows() {
                let should = vector_distance(a.row(i), b.row(j)).unwrap();
                assert_approx_eq!(d.row(i)[j], should, 1e-12);
                assert_approx_eq!(d2.row(i)[j], should * should, 1e-9);
            }
        }
        assert_eq!(d.row(1)[1], 0.0);
    }

    #[test]
    fn pairwise_shape_mismatch() {
        let a = Matrix::new(vec![0.0f32, 0.0], 1, 2).unwrap();
        let b = Matrix::new(vec![0.0f32, 0.0, 0.0], 1, 3).unwrap();
        assert!(matches!(pairwise_distances(&a, &b, true), Err(KMeansError::Shape(_))));

        let none = Matrix::<f32>::empty(2).unwrap();
        assert!(matches!(pairwise_distances(&a, &none, true), Err(KMeansError::Shape(_))));
        let d = pairwise_distances(&none, &a, false).unwrap();
        assert_eq!((d.rows(), d.cols()), (0, 1));
    }
}
