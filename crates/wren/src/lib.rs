//! # Wren
//!
//! Lazy matrix expressions with memoized per-device evaluation, and layers
//! with a LIFO forward/backward protocol on top.
//!
//! This is the top-level facade crate that re-exports everything you need.
//!
//! ## Usage
//!
//! ```rust
//! use wren::prelude::*;
//!
//! # fn main() -> wren::Result<()> {
//! let x = Value::sequence((4, 5), -3.3, 0.1, DType::F32)?;
//! let handle = ops::sign(&x)?.eval_register()?;
//! wren::eval(DeviceTag::Cpu)?;
//! assert_eq!(handle.data()?.at(0, 0)?, -1.0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|----------|
//! | `wren-core` | Value, Shape, Layout, DType, Expr, EvalPlan, Backend trait, CPU backend |
//! | `wren-nn` | Ports, layer policies, shape checker, Sigmoid/Tanh layers, Sequential |

/// Re-export core types.
pub use wren_core::{
    backend::{Backend, BinaryOp, UnaryOp},
    eval, eval_register, evaluate, ops, reset, CpuBackend, CpuStorage, DType, DeviceTag, Error,
    EvalHandle, EvalPlan, Expr, Layout, OpKind, Operand, PlanStats, Result, RuntimeConfig, Shape,
    Value, ValueId, WithDType,
};

/// Re-export layers.
pub mod nn {
    pub use wren_nn::*;
}

/// Convenient imports for typical use.
pub mod prelude {
    pub use crate::nn::{
        Layer, LayerPolicy, Port, PortMap, Sequential, ShapeChecker, SigmoidLayer, TanhLayer,
    };
    pub use crate::{
        ops, Backend, CpuBackend, DType, DeviceTag, EvalHandle, EvalPlan, Expr, Operand, Shape,
        Value,
    };
}
