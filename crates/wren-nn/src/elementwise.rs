// Elementwise activation layers
//
// ElementwiseLayer<A> applies one activation per element. The activation
// supplies three things: how to build the forward node, which value the
// derivative needs, and how to build the derivative node from the incoming
// gradient and that saved value.
//
//   Sigmoid   y = 1 / (1 + e^-x)    dx = dy * y * (1 - y)
//   Tanh      y = tanh(x)           dx = dy * (1 - y^2)
//
// Both derivatives are expressed in terms of the forward output, so that is
// what gets buffered.
//
// The policy is fixed at construction. With gradient buffering off,
// `feedback` is None and forward calls leave no trace.

use std::fmt;
use std::marker::PhantomData;

use wren_core::error::{Error, Result};
use wren_core::expr::{Expr, Operand};
use wren_core::ops;

use crate::layer::Layer;
use crate::policy::LayerPolicy;
use crate::port::{Port, PortMap};
use crate::shape_checker::ShapeChecker;

/// An elementwise function with a derivative.
pub trait Activation {
    const NAME: &'static str;

    fn forward(x: Operand) -> Result<Expr>;

    /// The value `backward` will need, given the forward input and output.
    fn saved(_input: &Operand, output: &Expr) -> Operand {
        output.into()
    }

    fn backward(grad: Operand, saved: Operand) -> Result<Expr>;
}

/// Logistic sigmoid.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sigmoid;

impl Activation for Sigmoid {
    const NAME: &'static str = "sigmoid";

    fn forward(x: Operand) -> Result<Expr> {
        ops::sigmoid(x)
    }

    fn backward(grad: Operand, y: Operand) -> Result<Expr> {
        ops::sigmoid_grad(grad, y)
    }
}

/// Hyperbolic tangent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tanh;

impl Activation for Tanh {
    const NAME: &'static str = "tanh";

    fn forward(x: Operand) -> Result<Expr> {
        ops::tanh(x)
    }

    fn backward(grad: Operand, y: Operand) -> Result<Expr> {
        ops::tanh_grad(grad, y)
    }
}

struct FeedbackState {
    data: Vec<Operand>,
    shapes: ShapeChecker,
}

pub struct ElementwiseLayer<A: Activation> {
    name: String,
    feedback: Option<FeedbackState>,
    _activation: PhantomData<A>,
}

pub type SigmoidLayer = ElementwiseLayer<Sigmoid>;
pub type TanhLayer = ElementwiseLayer<Tanh>;

impl<A: Activation> ElementwiseLayer<A> {
    /// Fails with `InvalidPolicy` if `policy.update` is set: elementwise
    /// layers have no parameters.
    pub fn new(name: impl Into<String>, policy: LayerPolicy) -> Result<Self> {
        if policy.update {
            return Err(Error::InvalidPolicy {
                option: "update".to_string(),
                value: "enabled".to_string(),
            });
        }
        let name = name.into();
        let feedback = policy.feedback_output.then(|| FeedbackState {
            data: Vec::new(),
            shapes: ShapeChecker::new(name.clone()),
        });
        Ok(ElementwiseLayer {
            name,
            feedback,
            _activation: PhantomData,
        })
    }

    /// Build from named options, see [`LayerPolicy::from_options`].
    pub fn with_options(name: impl Into<String>, options: &[(&str, &str)]) -> Result<Self> {
        Self::new(name, LayerPolicy::from_options(options)?)
    }

    pub fn policy(&self) -> LayerPolicy {
        LayerPolicy::new().with_feedback_output(self.feedback.is_some())
    }
}

impl<A: Activation> Layer for ElementwiseLayer<A> {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_feedback_output(&self) -> bool {
        self.feedback.is_some()
    }

    fn feed_forward(&mut self, mut inputs: PortMap) -> Result<PortMap> {
        inputs.validate(self.input_ports())?;
        let x = inputs.take(Port::Input)?;
        let y = A::forward(x.clone())?;
        if let Some(state) = self.feedback.as_mut() {
            state.shapes.push_data_shape(&x);
            state.data.push(A::saved(&x, &y));
        }
        Ok(PortMap::single(Port::Output, y))
    }

    fn feed_backward(&mut self, mut grads: PortMap) -> Result<PortMap> {
        let declared = self.output_ports();
        let Some(state) = self.feedback.as_mut() else {
            return Ok(PortMap::new());
        };
        grads.validate(declared)?;

        let saved = state
            .data
            .last()
            .cloned()
            .ok_or_else(|| Error::BackwardWithoutForward {
                layer: self.name.clone(),
            })?;
        let grad = grads.take(Port::Output)?;
        let dx = A::backward(grad, saved)?;
        // On a shape mismatch neither stack is popped.
        state.shapes.check_data_shape_and_pop(&Operand::from(&dx))?;
        state.data.pop();
        Ok(PortMap::single(Port::Input, dx))
    }

    fn neutral_invariant(&self) -> Result<()> {
        match &self.feedback {
            Some(state) if !state.data.is_empty() || !state.shapes.is_empty() => {
                Err(Error::InvariantViolation {
                    layer: self.name.clone(),
                    buffered: state.data.len(),
                    shapes: state.shapes.len(),
                })
            }
            _ => Ok(()),
        }
    }

    fn pending(&self) -> usize {
        self.feedback.as_ref().map_or(0, |state| state.data.len())
    }
}

impl<A: Activation> fmt::Debug for ElementwiseLayer<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementwiseLayer")
            .field("activation", &A::NAME)
            .field("name", &self.name)
            .field("policy", &self.policy())
            .field("pending", &self.pending())
            .finish()
    }
}
