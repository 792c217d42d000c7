//! # wren-core
//!
//! Values, deferred expressions and evaluation plans for Wren.
//!
//! This crate provides:
//! - [`Value`]: immutable matrix or batch of matrices, with zero-copy views
//! - [`Expr`]: deferred operation node with structural equality
//! - [`EvalPlan`] / [`EvalHandle`]: per-device memoized evaluation
//! - [`Backend`] trait and the [`CpuBackend`] reference implementation
//! - [`Shape`] / [`Layout`] / [`DType`]: element metadata
// - Value/Storage: concrete data, shared behind Arc
// - Expr/Op: what to compute, nothing computed at construction
// - Plan: register, eval, fetch; one plan per device for the whole process
// - Config: WREN_DEVICE / WREN_EAGER

pub mod backend;
pub mod config;
pub mod cpu;
pub mod device;
pub mod dtype;
pub mod error;
pub mod expr;
pub mod layout;
pub mod op;
pub mod ops;
pub mod plan;
pub mod shape;
pub mod storage;
pub mod value;

pub use backend::{Backend, BinaryOp, UnaryOp};
pub use config::RuntimeConfig;
pub use cpu::CpuBackend;
pub use device::DeviceTag;
pub use dtype::{DType, WithDType};
pub use error::{Error, Result};
pub use expr::{Expr, Operand};
pub use layout::Layout;
pub use op::OpKind;
pub use plan::{eval, eval_register, evaluate, reset, EvalHandle, EvalPlan, PlanStats};
pub use shape::Shape;
pub use storage::CpuStorage;
pub use value::{Value, ValueId};
