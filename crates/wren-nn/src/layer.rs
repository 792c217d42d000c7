// Layer trait: paired forward/backward transforms over ports
//
// A layer with gradient buffering enabled moves between two states:
//
//   Balanced    nothing buffered; `neutral_invariant` passes
//   Pending(n)  n forward calls not yet matched by a backward call
//
// feed_forward:   Balanced -> Pending(1), Pending(n) -> Pending(n+1)
// feed_backward:  Pending(n) -> Pending(n-1); on Balanced it fails with
//                 BackwardWithoutForward and the state is unchanged
//
// Backward calls consume forward calls in LIFO order. With buffering
// disabled the layer keeps no state, `feed_backward` returns an empty map
// and `pending` is always 0.
//
// Layers take `&mut self` for both directions: one owner drives a layer at
// a time.

use wren_core::error::Result;

use crate::port::{Port, PortMap};

pub trait Layer {
    /// Name used in error messages.
    fn name(&self) -> &str;

    /// Roles `feed_forward` reads and `feed_backward` writes.
    fn input_ports(&self) -> &'static [Port] {
        &[Port::Input]
    }

    /// Roles `feed_forward` writes and `feed_backward` reads.
    fn output_ports(&self) -> &'static [Port] {
        &[Port::Output]
    }

    /// Whether forward calls buffer state for a backward pass.
    fn is_feedback_output(&self) -> bool;

    /// Whether the layer owns trainable parameters.
    fn is_update(&self) -> bool {
        false
    }

    /// Build the output nodes for `inputs`. Nothing is computed here; the
    /// returned nodes are evaluated through a plan.
    fn feed_forward(&mut self, inputs: PortMap) -> Result<PortMap>;

    /// Build input gradients from output gradients, consuming the most recent
    /// unmatched forward call.
    fn feed_backward(&mut self, grads: PortMap) -> Result<PortMap>;

    /// Succeeds only when no forward call is waiting for its backward call.
    fn neutral_invariant(&self) -> Result<()>;

    /// Number of forward calls not yet matched by a backward call.
    fn pending(&self) -> usize;
}

impl<L: Layer + ?Sized> Layer for Box<L> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn input_ports(&self) -> &'static [Port] {
        (**self).input_ports()
    }

    fn output_ports(&self) -> &'static [Port] {
        (**self).output_ports()
    }

    fn is_feedback_output(&self) -> bool {
        (**self).is_feedback_output()
    }

    fn is_update(&self) -> bool {
        (**self).is_update()
    }

    fn feed_forward(&mut self, inputs: PortMap) -> Result<PortMap> {
        (**self).feed_forward(inputs)
    }

    fn feed_backward(&mut self, grads: PortMap) -> Result<PortMap> {
        (**self).feed_backward(grads)
    }

    fn neutral_invariant(&self) -> Result<()> {
        (**self).neutral_invariant()
    }

    fn pending(&self) -> usize {
        (**self).pending()
    }
}
