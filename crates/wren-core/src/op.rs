// OpKind: the operation tag of an expression node
//
// The tag is half of a node's structural identity (the operands are the
// other half), so it derives Eq and Hash and carries only integer
// parameters. It also knows how many operands it takes and what shape and
// dtype the result has, which lets `Expr::new` reject malformed nodes up
// front without computing anything.
//
//   Unary(op)                    one operand, same shape
//   Binary(op)                   two operands of identical shape and dtype
//   SubMatrix { rows, cols }     one matrix or batch operand; result keeps the
//                                batch count and takes rows.len() x cols.len()

use std::fmt;
use std::ops::Range;

use crate::backend::{BinaryOp, UnaryOp};
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::shape::Shape;

/// Operation applied by an expression node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OpKind {
    Unary(UnaryOp),
    Binary(BinaryOp),
    /// Half-open row and column ranges.
    SubMatrix {
        rows: Range<usize>,
        cols: Range<usize>,
    },
}

impl OpKind {
    /// Number of operands this operation takes.
    pub fn arity(&self) -> usize {
        match self {
            OpKind::Unary(_) | OpKind::SubMatrix { .. } => 1,
            OpKind::Binary(_) => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Unary(op) => op.name(),
            OpKind::Binary(op) => op.name(),
            OpKind::SubMatrix { .. } => "sub_matrix",
        }
    }

    /// Result shape and dtype for the given operand metadata.
    pub(crate) fn infer(&self, operands: &[(&Shape, DType)]) -> Result<(Shape, DType)> {
        if operands.len() != self.arity() {
            return Err(Error::msg(format!(
                "{} takes {} operand(s), got {}",
                self.name(),
                self.arity(),
                operands.len()
            )));
        }
        match self {
            OpKind::Unary(_) => {
                let (shape, dtype) = operands[0];
                Ok((shape.clone(), dtype))
            }
            OpKind::Binary(_) => {
                let (lhs, lhs_dtype) = operands[0];
                let (rhs, rhs_dtype) = operands[1];
                if lhs != rhs {
                    return Err(Error::ShapeMismatch {
                        expected: lhs.clone(),
                        got: rhs.clone(),
                    });
                }
                if lhs_dtype != rhs_dtype {
                    return Err(Error::DTypeMismatch {
                        expected: lhs_dtype,
                        got: rhs_dtype,
                    });
                }
                Ok((lhs.clone(), lhs_dtype))
            }
            OpKind::SubMatrix { rows, cols } => {
                let (shape, dtype) = operands[0];
                let layout = crate::layout::Layout::contiguous(shape.clone());
                let region = crate::value::sub_region(&layout, rows, cols)?;
                Ok((region.shape().clone(), dtype))
            }
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::SubMatrix { rows, cols } => {
                write!(f, "sub_matrix[{:?}, {:?}]", rows, cols)
            }
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_binary_mismatch() {
        let a = Shape::from((4, 5));
        let b = Shape::from((5, 4));
        let op = OpKind::Binary(BinaryOp::Add);
        assert!(matches!(
            op.infer(&[(&a, DType::F32), (&b, DType::F32)]),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(matches!(
            op.infer(&[(&a, DType::F32), (&a, DType::F64)]),
            Err(Error::DTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_infer_sub_matrix_keeps_batch() {
        let s = Shape::from((7, 10, 10));
        let op = OpKind::SubMatrix {
            rows: 2..6,
            cols: 3..8,
        };
        let (out, dtype) = op.infer(&[(&s, DType::F16)]).unwrap();
        assert_eq!(out, Shape::from((7, 4, 5)));
        assert_eq!(dtype, DType::F16);
    }

    #[test]
    fn test_infer_arity() {
        let s = Shape::from((2, 2));
        assert!(OpKind::Unary(UnaryOp::Sign).infer(&[]).is_err());
        assert!(OpKind::Unary(UnaryOp::Sign)
            .infer(&[(&s, DType::F32), (&s, DType::F32)])
            .is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(OpKind::Unary(UnaryOp::Tanh).to_string(), "tanh");
        let op = OpKind::SubMatrix {
            rows: 31..35,
            cols: 17..22,
        };
        assert_eq!(op.to_string(), "sub_matrix[31..35, 17..22]");
    }
}
