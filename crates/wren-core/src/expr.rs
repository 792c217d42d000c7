// Expr: a deferred application of one operation
//
// Building an Expr records *what* to compute and nothing else: the op tag,
// the operands, and the result shape/dtype inferred from operand metadata.
// No kernel runs until a plan evaluates the node.
//
// STRUCTURAL IDENTITY
//
//   Two nodes are equal iff they have the same op tag and pairwise-equal
//   operands, where a leaf operand is compared by storage buffer and layout
//   (`Value::same_view`) and a node operand by this same rule, recursively.
//   Each node also stores a 64-bit fingerprint folded from its tag and its
//   operands' identities; it is the node's Hash and a cheap first check in
//   `eq`.
//
//   Plans key their memo tables on Expr, so `sign(&v)` built twice, a clone
//   of either, or `sign` of two equal views of `v` lands on one cache slot.
//
// Operands are snapshots. A Value never changes after construction, so a
// captured operand cannot be mutated behind the node's back.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::dtype::DType;
use crate::error::Result;
use crate::op::OpKind;
use crate::plan::{self, EvalHandle};
use crate::shape::Shape;
use crate::value::Value;

/// An input to an expression node: a concrete Value or another node.
#[derive(Clone)]
pub enum Operand {
    Value(Value),
    Node(Expr),
}

impl Operand {
    pub fn shape(&self) -> &Shape {
        match self {
            Operand::Value(v) => v.shape(),
            Operand::Node(e) => e.shape(),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            Operand::Value(v) => v.dtype(),
            Operand::Node(e) => e.dtype(),
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Operand::Value(v) => Some(v),
            Operand::Node(_) => None,
        }
    }

    pub fn as_node(&self) -> Option<&Expr> {
        match self {
            Operand::Value(_) => None,
            Operand::Node(e) => Some(e),
        }
    }

    fn hash_identity<H: Hasher>(&self, state: &mut H) {
        match self {
            Operand::Value(v) => {
                0u8.hash(state);
                v.hash_view(state);
            }
            Operand::Node(e) => {
                1u8.hash(state);
                e.fingerprint().hash(state);
            }
        }
    }
}

impl PartialEq for Operand {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Operand::Value(a), Operand::Value(b)) => a.same_view(b),
            (Operand::Node(a), Operand::Node(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Operand {}

impl fmt::Debug for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Value(v) => write!(f, "{}", v.id()),
            Operand::Node(e) => write!(f, "{:?}", e),
        }
    }
}

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        Operand::Value(v)
    }
}

impl From<&Value> for Operand {
    fn from(v: &Value) -> Self {
        Operand::Value(v.clone())
    }
}

impl From<Expr> for Operand {
    fn from(e: Expr) -> Self {
        Operand::Node(e)
    }
}

impl From<&Expr> for Operand {
    fn from(e: &Expr) -> Self {
        Operand::Node(e.clone())
    }
}

struct ExprInner {
    op: OpKind,
    operands: Vec<Operand>,
    shape: Shape,
    dtype: DType,
    fingerprint: u64,
}

/// Immutable expression node. Cloning is an `Arc` bump.
#[derive(Clone)]
pub struct Expr {
    inner: Arc<ExprInner>,
}

impl Expr {
    /// Build a node. Validates arity, shapes and dtypes; computes nothing.
    pub fn new(op: OpKind, operands: Vec<Operand>) -> Result<Expr> {
        let meta: Vec<(&Shape, DType)> = operands.iter().map(|o| (o.shape(), o.dtype())).collect();
        let (shape, dtype) = op.infer(&meta)?;

        let mut hasher = DefaultHasher::new();
        op.hash(&mut hasher);
        for operand in &operands {
            operand.hash_identity(&mut hasher);
        }
        let fingerprint = hasher.finish();

        Ok(Expr {
            inner: Arc::new(ExprInner {
                op,
                operands,
                shape,
                dtype,
                fingerprint,
            }),
        })
    }

    pub fn op(&self) -> &OpKind {
        &self.inner.op
    }

    pub fn operands(&self) -> &[Operand] {
        &self.inner.operands
    }

    /// Shape of the value this node will produce.
    pub fn shape(&self) -> &Shape {
        &self.inner.shape
    }

    pub fn dtype(&self) -> DType {
        self.inner.dtype
    }

    /// Structural fingerprint; equal nodes have equal fingerprints.
    pub fn fingerprint(&self) -> u64 {
        self.inner.fingerprint
    }

    /// Same allocation, not merely structurally equal.
    pub fn ptr_eq(&self, other: &Expr) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Register this node with the plan of the configured default device.
    pub fn eval_register(&self) -> Result<EvalHandle> {
        let device = crate::config::RuntimeConfig::global()?.default_device;
        plan::eval_register(self, device)
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.inner.fingerprint == other.inner.fingerprint
                && self.inner.op == other.inner.op
                && self.inner.operands == other.inner.operands)
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.inner.fingerprint);
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.inner.op)?;
        for (i, operand) in self.inner.operands.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?}", operand)?;
        }
        write!(f, ") -> {}", self.inner.shape)
    }
}
