use crate::Primitive;

/// Squared euclidean distance between two equally long slices.
/// Callers are responsible for the length check.
#[inline(always)]
pub(crate) fn squared<T: Primitive>(a: &[T], b: &[T]) -> T {
    a.iter().zip(b.iter())
        .map(|(&av, &bv)| av - bv)   // <a> - <b>
        .map(|v| v * v)              // <vec_components> ^2
        .sum()
}

#[inline(always)]
pub(crate) fn euclidean<T: Primitive>(a: &[T], b: &[T]) -> T {
    squared(a, b).sqrt()
}
