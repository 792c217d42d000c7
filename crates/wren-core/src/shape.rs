use std::fmt;

// Shape: extents of a Value along each axis
//
// wren works with two categories of data:
//   - Matrix:       Shape([rows, cols])
//   - Batch matrix: Shape([batch, rows, cols]), `batch` independent matrices
//
// A Shape is also the descriptor the layer shape checker records on every
// forward call, so equality here is the equality the backward pass checks:
// same rank, same extent on every axis (batch count included).

/// N-dimensional shape of a Value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Create a new shape from a vector of dimension sizes.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// The dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements (product of all dimensions).
    /// A scalar shape [] has 1 element.
    pub fn elem_count(&self) -> usize {
        self.0.iter().product::<usize>()
    }

    /// Contiguous row-major strides: for [2, 3, 4] this is [12, 4, 1].
    pub fn stride_contiguous(&self) -> Vec<usize> {
        let mut strides = vec![0usize; self.rank()];
        if self.rank() > 0 {
            strides[self.rank() - 1] = 1;
            for i in (0..self.rank() - 1).rev() {
                strides[i] = strides[i + 1] * self.0[i + 1];
            }
        }
        strides
    }

    /// Size of a specific dimension.
    pub fn dim(&self, d: usize) -> crate::Result<usize> {
        self.0.get(d).copied().ok_or(crate::Error::DimOutOfRange {
            dim: d,
            rank: self.rank(),
        })
    }

    /// Whether this is a batch-of-matrices shape (rank 3).
    pub fn is_batch(&self) -> bool {
        self.rank() == 3
    }

    /// Batch count: the leading extent of a rank-3 shape, `None` for a matrix.
    pub fn batch(&self) -> Option<usize> {
        if self.is_batch() {
            Some(self.0[0])
        } else {
            None
        }
    }

    /// Row count of a matrix or batch-matrix shape.
    pub fn rows(&self) -> crate::Result<usize> {
        self.matrix_axis(2)
    }

    /// Column count of a matrix or batch-matrix shape.
    pub fn cols(&self) -> crate::Result<usize> {
        self.matrix_axis(1)
    }

    // `from_end` counts axes from the right: 1 = cols, 2 = rows.
    fn matrix_axis(&self, from_end: usize) -> crate::Result<usize> {
        match self.rank() {
            2 | 3 => Ok(self.0[self.rank() - from_end]),
            got => Err(crate::Error::RankMismatch { expected: 2, got }),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

impl From<usize> for Shape {
    fn from(d: usize) -> Self {
        Shape(vec![d])
    }
}

impl From<(usize, usize)> for Shape {
    fn from((rows, cols): (usize, usize)) -> Self {
        Shape(vec![rows, cols])
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((batch, rows, cols): (usize, usize, usize)) -> Self {
        Shape(vec![batch, rows, cols])
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_shape() {
        let s = Shape::from((4, 5));
        assert_eq!(s.rank(), 2);
        assert_eq!(s.elem_count(), 20);
        assert_eq!(s.stride_contiguous(), vec![5, 1]);
        assert_eq!(s.rows().unwrap(), 4);
        assert_eq!(s.cols().unwrap(), 5);
        assert_eq!(s.batch(), None);
    }

    #[test]
    fn test_batch_shape() {
        let s = Shape::from((7, 4, 5));
        assert!(s.is_batch());
        assert_eq!(s.batch(), Some(7));
        assert_eq!(s.rows().unwrap(), 4);
        assert_eq!(s.cols().unwrap(), 5);
        assert_eq!(s.stride_contiguous(), vec![20, 5, 1]);
    }

    #[test]
    fn test_rows_of_vector_fails() {
        assert!(matches!(
            Shape::from(3).rows(),
            Err(crate::Error::RankMismatch {
                expected: 2,
                got: 1
            })
        ));
    }

    #[test]
    fn test_batch_count_is_part_of_equality() {
        assert_ne!(Shape::from((7, 4, 5)), Shape::from((6, 4, 5)));
        assert_ne!(Shape::from((1, 4, 5)), Shape::from((4, 5)));
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Shape::from((3, 4))), "[3, 4]");
    }
}
