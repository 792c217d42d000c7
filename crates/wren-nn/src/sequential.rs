// Sequential: a chain of layers applied one after another
//
//   let mut net = Sequential::new("net")
//       .add(TanhLayer::new("t1", policy)?)
//       .add(SigmoidLayer::new("s1", policy)?);
//
//   let out = net.feed_forward(PortMap::single(Port::Input, &x))?;
//   let grad = net.feed_backward(PortMap::single(Port::Output, &dy))?;
//
// Forward feeds each layer's Output into the next layer's Input. Backward
// walks the chain in reverse, feeding each Input gradient into the previous
// layer's Output. If any layer answers backward with an empty map, the chain
// stops there and returns an empty map.

use wren_core::error::Result;

use crate::layer::Layer;
use crate::port::{Port, PortMap};

pub struct Sequential {
    name: String,
    layers: Vec<Box<dyn Layer>>,
}

impl Sequential {
    pub fn new(name: impl Into<String>) -> Self {
        Sequential {
            name: name.into(),
            layers: Vec::new(),
        }
    }

    /// Append a layer. Returns self for chaining.
    #[allow(clippy::should_implement_trait)]
    pub fn add<L: Layer + 'static>(mut self, layer: L) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }
}

impl Layer for Sequential {
    fn name(&self) -> &str {
        &self.name
    }

    /// True only when every layer buffers for backward.
    fn is_feedback_output(&self) -> bool {
        self.layers.iter().all(|l| l.is_feedback_output())
    }

    fn is_update(&self) -> bool {
        self.layers.iter().any(|l| l.is_update())
    }

    fn feed_forward(&mut self, inputs: PortMap) -> Result<PortMap> {
        inputs.validate(self.input_ports())?;
        let mut current = inputs;
        for layer in &mut self.layers {
            let mut out = layer.feed_forward(current)?;
            current = PortMap::single(Port::Input, out.take(Port::Output)?);
        }
        let mut last = current;
        Ok(PortMap::single(Port::Output, last.take(Port::Input)?))
    }

    fn feed_backward(&mut self, grads: PortMap) -> Result<PortMap> {
        grads.validate(self.output_ports())?;
        let mut current = grads;
        for layer in self.layers.iter_mut().rev() {
            let mut grad = layer.feed_backward(current)?;
            if grad.is_empty() {
                return Ok(PortMap::new());
            }
            current = PortMap::single(Port::Output, grad.take(Port::Input)?);
        }
        let mut first = current;
        Ok(PortMap::single(Port::Input, first.take(Port::Output)?))
    }

    fn neutral_invariant(&self) -> Result<()> {
        self.layers.iter().try_for_each(|l| l.neutral_invariant())
    }

    /// The largest pending count among the layers.
    fn pending(&self) -> usize {
        self.layers.iter().map(|l| l.pending()).max().unwrap_or(0)
    }
}

impl std::fmt::Debug for Sequential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.layers.iter().map(|l| l.name()).collect();
        f.debug_struct("Sequential")
            .field("name", &self.name)
            .field("layers", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elementwise::{SigmoidLayer, TanhLayer};
    use crate::policy::LayerPolicy;
    use wren_core::{evaluate, DType, Error, Value};

    fn net(policy: LayerPolicy) -> Sequential {
        Sequential::new("net")
            .add(TanhLayer::new("t", policy).unwrap())
            .add(SigmoidLayer::new("s", policy).unwrap())
    }

    #[test]
    fn test_forward_composes() {
        let mut n = net(LayerPolicy::default());
        assert_eq!(n.len(), 2);
        let x = Value::sequence((2, 2), -1.0, 0.5, DType::F64).unwrap();
        let out = n.feed_forward(PortMap::single(Port::Input, &x)).unwrap();
        let y = evaluate(out.get(Port::Output).unwrap().as_node().unwrap()).unwrap();
        let expected: Vec<f64> = x
            .to_f64_vec()
            .iter()
            .map(|v| 1.0 / (1.0 + (-v.tanh()).exp()))
            .collect();
        for (a, b) in y.to_f64_vec().iter().zip(&expected) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_backward_round_trip() {
        let mut n = net(LayerPolicy::new().with_feedback_output(true));
        assert!(n.is_feedback_output());
        let x = Value::sequence((3, 2), -1.0, 0.5, DType::F64).unwrap();
        n.feed_forward(PortMap::single(Port::Input, &x)).unwrap();
        assert_eq!(n.pending(), 1);
        assert!(n.neutral_invariant().is_err());
        let dy = Value::sequence((3, 2), 1.0, 0.0, DType::F64).unwrap();
        let dx = n.feed_backward(PortMap::single(Port::Output, dy)).unwrap();
        assert_eq!(dx.get(Port::Input).unwrap().shape().dims(), &[3, 2]);
        n.neutral_invariant().unwrap();
    }

    #[test]
    fn test_backward_without_forward_names_last_layer() {
        let mut n = net(LayerPolicy::new().with_feedback_output(true));
        let dy = Value::sequence((1, 1), 1.0, 0.0, DType::F64).unwrap();
        assert_eq!(
            n.feed_backward(PortMap::single(Port::Output, dy)),
            Err(Error::BackwardWithoutForward { layer: "s".into() })
        );
    }

    #[test]
    fn test_disabled_chain_returns_empty() {
        let mut n = net(LayerPolicy::default());
        let dy = Value::sequence((1, 1), 1.0, 0.0, DType::F64).unwrap();
        assert!(n
            .feed_backward(PortMap::single(Port::Output, dy))
            .unwrap()
            .is_empty());
    }
}
