use crate::Primitive;

/// Round to **decimal_places** decimals, resolving ties to the even neighbour.
pub(crate) fn round_half_even<T: Primitive>(val: T, decimal_places: u32) -> T {
    // Saturate, 10^i32::MAX is infinite anyway
    let exponent = decimal_places.min(i32::MAX as u32) as i32;
    let scale = T::from(10.0f64.powi(exponent)).unwrap_or_else(T::infinity);
    let scaled = val * scale;
    if !scale.is_finite() || scale == T::zero() || !scaled.is_finite() {
        return val;
    }
    let floor = scaled.floor();
    let diff = scaled - floor;
    let half = T::from(0.5).unwrap_or_else(T::zero);
    let two = T::one() + T::one();
    let rounded = if diff < half {
        floor
    } else if diff > half {
        floor + T::one()
    } else if (floor / two).floor() * two == floor { // Tie -> pick the even neighbour
        floor
    } else {
        floor + T::one()
    };
    rounded / scale
}

#[cfg(test)]
macro_rules! assert_approx_eq {
	($left: expr, $right: expr, $tol: expr) => ({
		match ($left, $right, $tol) {
			(left_val , right_val, tol_val) => {
				let delta = (left_val - right_val).abs();
				if !(delta < tol_val) {
					panic!(
						"assertion failed: `(left ≈ right)` \
						(left: `{}`, right: `{}`) \
						with ∆={:1.1e} (allowed ∆={:e})",
						left_val , right_val, delta, tol_val
					)
				}
			}
		}
	});
	($left: expr, $right: expr) => (assert_approx_eq!(($left), ($right), 1e-15))
}
