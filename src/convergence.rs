use crate::{helpers, KMeansError, Matrix, Primitive, Result};

/// Round every element of **matrix** to **decimal_places** decimals (ties to even).
pub fn round_matrix<T: Primitive>(matrix: &Matrix<T>, decimal_places: u32) -> Matrix<T> {
	let data = matrix.as_slice().iter().map(|&v| helpers::round_half_even(v, decimal_places)).collect();
	// Same shape as the input, can't fail
	Matrix::new(data, matrix.rows(), matrix.cols()).unwrap_or_else(|_| matrix.clone())
}

/// Check whether two centroid sets are equal after rounding both to **decimal_places** decimals.
///
/// This is an exact comparison of the rounded values, not a distance threshold: two values
/// closer than one rounding unit can still end up on different sides of a rounding boundary.
/// The iteration limit of a run is what guarantees termination in that case.
pub fn converged<T: Primitive>(old: &Matrix<T>, new: &Matrix<T>, decimal_places: u32) -> Result<bool> {
	if old.rows() != new.rows() || old.cols() != new.cols() {
		return Err(KMeansError::Shape(format!(
			"cannot compare a {}x{} centroid set with a {}x{} one", old.rows(), old.cols(), new.rows(), new.cols())));
	}
	Ok(old.as_slice().iter().zip(new.as_slice().iter())
		.all(|(&o, &n)| helpers::round_half_even(o, decimal_places) == helpers::round_half_even(n, decimal_places)))
}
