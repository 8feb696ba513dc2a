use crate::{KMeansError, Result};
use num::{Float, NumCast, Zero};
use rand::distributions::uniform::SampleUniform;
use std::{
    fmt::{Debug, Display, LowerExp},
    iter::Sum,
    ops::{AddAssign, SubAssign},
};

pub trait Primitive: AddAssign + Sum + SubAssign + Zero + Float + NumCast + SampleUniform
                + PartialOrd + Copy + Default + Display + Debug + Sync + Send + LowerExp + 'static
                + for<'a> AddAssign<&'a Self> {}
impl Primitive for f32 {}
impl Primitive for f64 {}


/// Dense row-major matrix, used for datasets as well as centroid sets.
///
/// ## Fields
/// - **data**: Row-major values [<row0>,<row1>,<row2>,...]
/// - **rows**: Amount of rows (samples / centroids)
/// - **cols**: Amount of columns (dimensions); always > 0
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix<T: Primitive> {
    data: Vec<T>,
    rows: usize,
    cols: usize,
}
impl<T: Primitive> Matrix<T> {
    /// Create a matrix from a row-major buffer.
    /// Fails with [`KMeansError::Shape`] if `data.len() != rows * cols` or `cols == 0`.
    pub fn new(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if cols == 0 {
            return Err(KMeansError::Shape("matrix needs at least one column".into()));
        }
        if data.len() != rows * cols {
            return Err(KMeansError::Shape(format!(
                "buffer of length {} does not describe a {}x{} matrix", data.len(), rows, cols)));
        }
        Ok(Self { data, rows, cols })
    }

    /// Create a matrix from a list of rows. All rows need the same (non-zero) length.
    pub fn from_rows(rows: Vec<Vec<T>>) -> Result<Self> {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != cols) {
            return Err(KMeansError::Shape(format!(
                "row {} has {} columns, expected {}", idx, row.len(), cols)));
        }
        let row_cnt = rows.len();
        Self::new(rows.into_iter().flatten().collect(), row_cnt, cols)
    }

    /// A matrix with zero rows.
    pub fn empty(cols: usize) -> Result<Self> {
        Self::new(Vec::new(), 0, cols)
    }

    pub fn rows(&self) -> usize { self.rows }
    pub fn cols(&self) -> usize { self.cols }
    pub fn is_empty(&self) -> bool { self.rows == 0 }
    pub fn as_slice(&self) -> &[T] { &self.data }
    pub fn into_vec(self) -> Vec<T> { self.data }

    pub fn row(&self, idx: usize) -> &[T] {
        &self.data[idx * self.cols..(idx + 1) * self.cols]
    }
    pub(crate) fn row_mut(&mut self, idx: usize) -> &mut [T] {
        &mut self.data[idx * self.cols..(idx + 1) * self.cols]
    }

    pub fn iter_rows(&self) -> std::slice::ChunksExact<'_, T> {
        self.data.chunks_exact(self.cols)
    }

    /// Copy the given rows (in the given order) into a new matrix.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        indices.iter().for_each(|&i| data.extend_from_slice(self.row(i)));
        Self { data, rows: indices.len(), cols: self.cols }
    }

    /// Stack `other` below `self`.
    pub fn vstack(&self, other: &Matrix<T>) -> Result<Self> {
        if self.cols != other.cols {
            return Err(KMeansError::Shape(format!(
                "cannot stack a matrix with {} columns onto one with {}", other.cols, self.cols)));
        }
        let mut data = self.data.clone();
        data.extend_from_slice(&other.data);
        Ok(Self { data, rows: self.rows + other.rows, cols: self.cols })
    }

    /// Copy of the first `rows` rows.
    pub fn truncated(&self, rows: usize) -> Self {
        let rows = rows.min(self.rows);
        Self { data: self.data[..rows * self.cols].to_vec(), rows, cols: self.cols }
    }

    pub fn contains_row(&self, row: &[T]) -> bool {
        self.iter_rows().any(|r| r == row)
    }
}
