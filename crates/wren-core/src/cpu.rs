// CpuBackend: synchronous host kernels
//
// Every kernel walks its inputs through their layouts, computes in f64 and
// narrows back to the input dtype. Nothing here is parallel: a plan's `eval`
// runs on the calling thread from start to finish.

use crate::backend::{Backend, BinaryOp, UnaryOp};
use crate::device::DeviceTag;
use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::storage::CpuStorage;
use crate::value::Value;

/// The reference backend for [`DeviceTag::Cpu`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

/// -1, 0 or +1. NaN stays NaN.
fn sign(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        v * 0.0
    }
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

fn unary_fn(op: UnaryOp) -> fn(f64) -> f64 {
    match op {
        UnaryOp::Sign => sign,
        UnaryOp::Sigmoid => sigmoid,
        UnaryOp::Tanh => f64::tanh,
        UnaryOp::Neg => |v| -v,
        UnaryOp::Abs => f64::abs,
    }
}

fn binary_fn(op: BinaryOp) -> fn(f64, f64) -> f64 {
    match op {
        BinaryOp::Add => |a, b| a + b,
        BinaryOp::Sub => |a, b| a - b,
        BinaryOp::Mul => |a, b| a * b,
        BinaryOp::SigmoidGrad => |grad, y| grad * y * (1.0 - y),
        BinaryOp::TanhGrad => |grad, y| grad * (1.0 - y * y),
    }
}

impl Backend for CpuBackend {
    fn device(&self) -> DeviceTag {
        DeviceTag::Cpu
    }

    fn unary_op(&self, op: UnaryOp, input: &Value) -> Result<Value> {
        let storage = input.storage().map_f64(input.layout(), unary_fn(op));
        Value::from_storage(storage, Layout::contiguous(input.shape().clone()))
    }

    fn binary_op(&self, op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value> {
        if lhs.shape() != rhs.shape() {
            return Err(Error::ShapeMismatch {
                expected: lhs.shape().clone(),
                got: rhs.shape().clone(),
            });
        }
        if lhs.dtype() != rhs.dtype() {
            return Err(Error::DTypeMismatch {
                expected: lhs.dtype(),
                got: rhs.dtype(),
            });
        }
        let f = binary_fn(op);
        let a = lhs.to_f64_vec();
        let b = rhs.to_f64_vec();
        let data = a.into_iter().zip(b).map(|(x, y)| f(x, y));
        let storage = CpuStorage::from_f64_iter(data, lhs.dtype());
        Value::from_storage(storage, Layout::contiguous(lhs.shape().clone()))
    }
}
