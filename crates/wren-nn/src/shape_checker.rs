// ShapeChecker: forward shapes waiting for their backward gradient
//
// Every forward call on a buffering layer pushes the shape of its input; the
// matching backward call checks its gradient against the top record and pops
// it. Records pair 1:1 with the layer's buffered values, so both stacks grow
// and shrink together.
//
// An empty stack on backward is BackwardWithoutForward, a shape disagreement
// is ShapeMismatch. The two are kept distinct.

use wren_core::error::{Error, Result};
use wren_core::expr::Operand;
use wren_core::shape::Shape;

#[derive(Debug, Clone, Default)]
pub struct ShapeChecker {
    layer: String,
    stack: Vec<Shape>,
}

impl ShapeChecker {
    /// A checker whose errors name `layer`.
    pub fn new(layer: impl Into<String>) -> Self {
        ShapeChecker {
            layer: layer.into(),
            stack: Vec::new(),
        }
    }

    pub fn push_data_shape(&mut self, data: &Operand) {
        self.stack.push(data.shape().clone());
    }

    fn check_top(&self, shape: &Shape) -> Result<()> {
        match self.stack.last() {
            None => Err(Error::BackwardWithoutForward {
                layer: self.layer.clone(),
            }),
            Some(expected) if expected != shape => Err(Error::ShapeMismatch {
                expected: expected.clone(),
                got: shape.clone(),
            }),
            Some(_) => Ok(()),
        }
    }

    /// Check `grad` against the most recent record and pop it. On error the
    /// record stays.
    pub fn check_data_shape_and_pop(&mut self, grad: &Operand) -> Result<()> {
        self.check_top(grad.shape())?;
        self.stack.pop();
        Ok(())
    }

    pub fn assert_empty(&self) -> Result<()> {
        if self.stack.is_empty() {
            Ok(())
        } else {
            Err(Error::InvariantViolation {
                layer: self.layer.clone(),
                buffered: 0,
                shapes: self.stack.len(),
            })
        }
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}
