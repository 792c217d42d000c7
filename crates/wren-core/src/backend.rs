use std::fmt;
use std::ops::Range;

use crate::device::DeviceTag;
use crate::error::Result;
use crate::value::Value;

// Backend: the kernels an evaluation plan dispatches to
//
// A plan never computes anything itself. When it reaches a node whose
// operands are ready, it hands the operand Values and the node's op tag to
// the backend of its device and caches whatever comes back.
//
// Kernels must be pure: same inputs, same bits out. Plans rely on that to
// share one result between structurally equal nodes.
//
// Methods take `&self` so that plans can hold `Arc<dyn Backend>` and the
// per-device registry can mix backends.

/// Element-wise unary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// -1, 0 or +1 by the sign of each element.
    Sign,
    Sigmoid,
    Tanh,
    Neg,
    Abs,
}

/// Element-wise binary operations over same-shaped operands.
///
/// The `*Grad` variants are the derivative rules the elementwise layers use:
/// `lhs` is the incoming gradient, `rhs` the buffered forward output `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// `grad * y * (1 - y)`
    SigmoidGrad,
    /// `grad * (1 - y^2)`
    TanhGrad,
}

impl UnaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            UnaryOp::Sign => "sign",
            UnaryOp::Sigmoid => "sigmoid",
            UnaryOp::Tanh => "tanh",
            UnaryOp::Neg => "neg",
            UnaryOp::Abs => "abs",
        }
    }
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::SigmoidGrad => "sigmoid_grad",
            BinaryOp::TanhGrad => "tanh_grad",
        }
    }
}

/// A compute backend servicing one [`DeviceTag`].
///
/// All operations read their inputs through the inputs' layouts (so views
/// work) and return new contiguous Values. Shapes and dtypes have already
/// been validated when the expression node was built.
pub trait Backend: Send + Sync + fmt::Debug + 'static {
    /// The device this backend executes on.
    fn device(&self) -> DeviceTag;

    /// Apply a unary op element-wise.
    fn unary_op(&self, op: UnaryOp, input: &Value) -> Result<Value>;

    /// Apply a binary op element-wise over two same-shaped values.
    fn binary_op(&self, op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value>;

    /// Copy out rows `rows` and columns `cols` of a matrix or of every item
    /// of a batch.
    ///
    /// The default takes a view and packs it, which is what a host backend
    /// wants anyway.
    fn sub_matrix(&self, input: &Value, rows: Range<usize>, cols: Range<usize>) -> Result<Value> {
        Ok(input.submatrix(rows, cols)?.to_contiguous())
    }
}
