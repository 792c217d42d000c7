//! # wren-nn
//!
//! Stateful layers over wren expression nodes.
//!
//! A layer turns port maps into port maps. `feed_forward` builds output
//! nodes; with gradient buffering enabled it also keeps what the matching
//! `feed_backward` will need, and backward calls consume forward calls in
//! LIFO order:
//!
//! 1. **Ports**: [`Port`] roles and the [`PortMap`] container
//! 2. **Policy**: [`LayerPolicy`], fixed at construction
//! 3. **Shape checker**: forward shapes waiting for their gradient
//! 4. **Layers**: [`SigmoidLayer`], [`TanhLayer`] and [`Sequential`]

pub mod elementwise;
pub mod layer;
pub mod policy;
pub mod port;
pub mod sequential;
pub mod shape_checker;

pub use elementwise::{Activation, ElementwiseLayer, Sigmoid, SigmoidLayer, Tanh, TanhLayer};
pub use layer::Layer;
pub use policy::LayerPolicy;
pub use port::{Port, PortMap};
pub use sequential::Sequential;
pub use shape_checker::ShapeChecker;
