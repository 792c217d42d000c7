// Functional constructors for expression nodes
//
// Each function builds one node over its operands and returns it without
// computing anything. Operands are anything convertible to `Operand`: a
// `Value`, an `Expr`, or a reference to either.
//
//   let x = Value::sequence((4, 5), -3.3, 0.1, DType::F32)?;
//   let y = ops::sign(&x)?;
//   let z = ops::mul(&y, &x)?;       // y is a node operand, x a leaf
//   let v = y.eval_register()?.data()?;

use std::ops::Range;

use crate::backend::{BinaryOp, UnaryOp};
use crate::error::Result;
use crate::expr::{Expr, Operand};
use crate::op::OpKind;

fn unary(op: UnaryOp, x: impl Into<Operand>) -> Result<Expr> {
    Expr::new(OpKind::Unary(op), vec![x.into()])
}

fn binary(op: BinaryOp, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> Result<Expr> {
    Expr::new(OpKind::Binary(op), vec![lhs.into(), rhs.into()])
}

/// Elementwise -1, 0 or +1.
pub fn sign(x: impl Into<Operand>) -> Result<Expr> {
    unary(UnaryOp::Sign, x)
}

/// Elementwise `1 / (1 + e^-x)`.
pub fn sigmoid(x: impl Into<Operand>) -> Result<Expr> {
    unary(UnaryOp::Sigmoid, x)
}

pub fn tanh(x: impl Into<Operand>) -> Result<Expr> {
    unary(UnaryOp::Tanh, x)
}

pub fn neg(x: impl Into<Operand>) -> Result<Expr> {
    unary(UnaryOp::Neg, x)
}

pub fn abs(x: impl Into<Operand>) -> Result<Expr> {
    unary(UnaryOp::Abs, x)
}

pub fn add(lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> Result<Expr> {
    binary(BinaryOp::Add, lhs, rhs)
}

pub fn sub(lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> Result<Expr> {
    binary(BinaryOp::Sub, lhs, rhs)
}

pub fn mul(lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> Result<Expr> {
    binary(BinaryOp::Mul, lhs, rhs)
}

/// `grad * y * (1 - y)` where `y` is the sigmoid forward output.
pub fn sigmoid_grad(grad: impl Into<Operand>, y: impl Into<Operand>) -> Result<Expr> {
    binary(BinaryOp::SigmoidGrad, grad, y)
}

/// `grad * (1 - y^2)` where `y` is the tanh forward output.
pub fn tanh_grad(grad: impl Into<Operand>, y: impl Into<Operand>) -> Result<Expr> {
    binary(BinaryOp::TanhGrad, grad, y)
}

/// Rows `rows` and columns `cols` (half-open) of a matrix, or of every matrix
/// in a batch. The result is packed when evaluated.
pub fn sub_matrix(x: impl Into<Operand>, rows: Range<usize>, cols: Range<usize>) -> Result<Expr> {
    Expr::new(OpKind::SubMatrix { rows, cols }, vec![x.into()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use crate::error::Error;
    use crate::plan::evaluate;
    use crate::value::Value;

    #[test]
    fn test_chain_mixes_nodes_and_values() {
        let x = Value::sequence((2, 3), -1.0, 0.5, DType::F64).unwrap();
        let s = sign(&x).unwrap();
        let z = mul(&s, &x).unwrap();
        assert_eq!(z.operands()[0].as_node(), Some(&s));
        assert_eq!(z.operands()[1].as_value().map(Value::id), Some(x.id()));
        // sign(x) * x == |x|
        let a = evaluate(&z).unwrap();
        let b = evaluate(&abs(&x).unwrap()).unwrap();
        assert_eq!(a.to_f64_vec(), b.to_f64_vec());
    }

    #[test]
    fn test_sub_is_add_of_neg() {
        let a = Value::sequence((3, 2), 0.0, 1.0, DType::F64).unwrap();
        let b = Value::sequence((3, 2), 5.0, -2.0, DType::F64).unwrap();
        let lhs = evaluate(&sub(&a, &b).unwrap()).unwrap();
        let rhs = evaluate(&add(&a, neg(&b).unwrap()).unwrap()).unwrap();
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn test_grad_ops() {
        let y = Value::from_vec(vec![0.5f64, 0.0], (1, 2)).unwrap();
        let g = Value::from_vec(vec![4.0f64, 3.0], (1, 2)).unwrap();
        let sg = evaluate(&sigmoid_grad(&g, &y).unwrap()).unwrap();
        assert_eq!(sg.to_f64_vec(), vec![1.0, 0.0]);
        let tg = evaluate(&tanh_grad(&g, &y).unwrap()).unwrap();
        assert_eq!(tg.to_f64_vec(), vec![3.0, 3.0]);
    }

    #[test]
    fn test_sub_matrix_out_of_bounds() {
        let x = Value::sequence((4, 4), 0.0, 1.0, DType::F32).unwrap();
        assert!(matches!(
            sub_matrix(&x, 2..6, 0..1),
            Err(Error::NarrowOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_unary_on_node() {
        let x = Value::sequence((2, 2), -1.0, 1.0, DType::F64).unwrap();
        let t = tanh(sigmoid(&x).unwrap()).unwrap();
        let v = evaluate(&t).unwrap();
        let expected = (1.0 / (1.0 + 1.0f64.exp())).tanh();
        assert!((v.at(0, 0).unwrap() - expected).abs() < 1e-12);
    }
}
