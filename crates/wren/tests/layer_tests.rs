// Integration tests for the layer forward/backward protocol
//
// Each forward call on a buffering layer must be matched by exactly one
// backward call, newest first. These tests interleave calls with different
// shapes so that any pairing other than LIFO shows up as a ShapeMismatch
// or as wrong gradient values.

use wren::nn::{Layer, LayerPolicy, Port, PortMap, Sequential, SigmoidLayer, TanhLayer};
use wren::prelude::*;
use wren::Error;

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() < tol
}

fn assert_vec_approx(got: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(got.len(), expected.len(), "length mismatch");
    for (i, (g, e)) in got.iter().zip(expected.iter()).enumerate() {
        assert!(
            approx_eq(*g, *e, tol),
            "index {}: got {} expected {} (tol {})",
            i,
            g,
            e,
            tol
        );
    }
}

fn buffering() -> LayerPolicy {
    LayerPolicy::new().with_feedback_output(true)
}

fn forward(layer: &mut dyn Layer, x: &Value) -> wren::Result<Value> {
    let out = layer.feed_forward(PortMap::single(Port::Input, x))?;
    eval_operand(out.get(Port::Output)?)
}

fn backward(layer: &mut dyn Layer, grad: &Value) -> wren::Result<Value> {
    let out = layer.feed_backward(PortMap::single(Port::Output, grad))?;
    eval_operand(out.get(Port::Input)?)
}

fn eval_operand(operand: &Operand) -> wren::Result<Value> {
    match operand {
        Operand::Value(v) => Ok(v.clone()),
        Operand::Node(e) => wren::evaluate(e),
    }
}

fn ones(shape: impl Into<Shape>) -> Value {
    Value::sequence(shape, 1.0, 0.0, DType::F64).unwrap()
}

#[test]
fn test_sigmoid_lifo_discipline() -> wren::Result<()> {
    let mut layer = SigmoidLayer::new("sig", buffering())?;
    let a = Value::sequence((2, 3), -1.0, 0.4, DType::F64)?;
    let b = Value::sequence((4, 5), 0.5, -0.1, DType::F64)?;

    let ya = forward(&mut layer, &a)?;
    let yb = forward(&mut layer, &b)?;
    assert_eq!(layer.pending(), 2);

    // Newest first: the (4, 5) call is answered before the (2, 3) call.
    let gb = backward(&mut layer, &ones((4, 5)))?;
    let expected_b: Vec<f64> = yb.to_f64_vec().iter().map(|y| y * (1.0 - y)).collect();
    assert_vec_approx(&gb.to_f64_vec(), &expected_b, 1e-12);

    let ga = backward(&mut layer, &ones((2, 3)))?;
    let expected_a: Vec<f64> = ya.to_f64_vec().iter().map(|y| y * (1.0 - y)).collect();
    assert_vec_approx(&ga.to_f64_vec(), &expected_a, 1e-12);

    layer.neutral_invariant()?;
    Ok(())
}

#[test]
fn test_tanh_interleaved_calls() -> wren::Result<()> {
    let mut layer = TanhLayer::new("tanh", buffering())?;
    let shapes: [(usize, usize); 3] = [(1, 2), (3, 1), (2, 2)];
    let inputs: Vec<Value> = shapes
        .iter()
        .map(|&s| Value::sequence(s, -0.7, 0.3, DType::F64))
        .collect::<wren::Result<_>>()?;

    // f f b f b b
    let y0 = forward(&mut layer, &inputs[0])?;
    forward(&mut layer, &inputs[1])?;
    assert_eq!(backward(&mut layer, &ones((3, 1)))?.dims(), &[3, 1]);
    forward(&mut layer, &inputs[2])?;
    assert_eq!(backward(&mut layer, &ones((2, 2)))?.dims(), &[2, 2]);
    assert_eq!(layer.pending(), 1);

    let g0 = backward(&mut layer, &ones((1, 2)))?;
    let expected: Vec<f64> = y0.to_f64_vec().iter().map(|y| 1.0 - y * y).collect();
    assert_vec_approx(&g0.to_f64_vec(), &expected, 1e-12);
    layer.neutral_invariant()?;
    Ok(())
}

#[test]
fn test_gradient_shape_must_match_matching_forward() -> wren::Result<()> {
    let mut layer = SigmoidLayer::new("sig", buffering())?;
    forward(&mut layer, &Value::sequence((2, 3), 0.0, 0.1, DType::F64)?)?;
    forward(&mut layer, &Value::sequence((3, 2), 0.0, 0.1, DType::F64)?)?;

    // The newest record is (3, 2); a (2, 3) gradient belongs to the older call.
    let err = backward(&mut layer, &ones((2, 3))).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));
    assert_eq!(layer.pending(), 2);

    backward(&mut layer, &ones((3, 2)))?;
    backward(&mut layer, &ones((2, 3)))?;
    layer.neutral_invariant()?;
    Ok(())
}

#[test]
fn test_invariant_boundary() -> wren::Result<()> {
    let mut layer = TanhLayer::new("tanh", buffering())?;
    layer.neutral_invariant()?;

    let err = backward(&mut layer, &ones((2, 2))).unwrap_err();
    assert_eq!(
        err,
        Error::BackwardWithoutForward {
            layer: "tanh".into()
        }
    );
    assert_eq!(layer.pending(), 0);

    let x = Value::sequence((2, 2), -1.0, 0.5, DType::F64)?;
    for _ in 0..3 {
        forward(&mut layer, &x)?;
    }
    for _ in 0..2 {
        backward(&mut layer, &ones((2, 2)))?;
    }
    assert_eq!(
        layer.neutral_invariant(),
        Err(Error::InvariantViolation {
            layer: "tanh".into(),
            buffered: 1,
            shapes: 1,
        })
    );
    backward(&mut layer, &ones((2, 2)))?;
    layer.neutral_invariant()?;
    Ok(())
}

#[test]
fn test_disabled_policy_keeps_no_state() -> wren::Result<()> {
    let mut layer = SigmoidLayer::with_options("sig", &[("gradient-buffering", "disabled")])?;
    let x = Value::sequence((4, 5), -3.3, 0.1, DType::F32)?;
    for _ in 0..5 {
        forward(&mut layer, &x)?;
    }
    assert_eq!(layer.pending(), 0);
    layer.neutral_invariant()?;

    let grads = layer.feed_backward(PortMap::single(Port::Output, ones((4, 5))))?;
    assert!(grads.is_empty());
    Ok(())
}

#[test]
fn test_missing_port_is_configuration_error() -> wren::Result<()> {
    let mut layer = TanhLayer::new("tanh", buffering())?;
    let err = layer.feed_forward(PortMap::new()).unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(
        err,
        Error::MissingPort {
            port: "input".into()
        }
    );
    Ok(())
}

#[test]
fn test_batch_forward_backward() -> wren::Result<()> {
    let mut layer = SigmoidLayer::new("sig", buffering())?;
    let x = Value::sequence((7, 4, 5), -3.3, 0.1, DType::F64)?;
    let y = forward(&mut layer, &x)?;
    assert_eq!(y.dims(), &[7, 4, 5]);

    let g = backward(&mut layer, &ones((7, 4, 5)))?;
    for b in 0..7 {
        let yb = y.batch_item(b)?.to_f64_vec();
        let expected: Vec<f64> = yb.iter().map(|y| y * (1.0 - y)).collect();
        assert_vec_approx(&g.batch_item(b)?.to_f64_vec(), &expected, 1e-12);
    }
    layer.neutral_invariant()?;
    Ok(())
}

#[test]
fn test_sequential_chain() -> wren::Result<()> {
    let mut net = Sequential::new("net")
        .add(TanhLayer::new("t", buffering())?)
        .add(SigmoidLayer::new("s", buffering())?);
    let x = Value::sequence((2, 2), -1.0, 0.5, DType::F64)?;

    let y = forward(&mut net, &x)?;
    let g = backward(&mut net, &ones((2, 2)))?;
    net.neutral_invariant()?;

    // d/dx sigmoid(tanh(x)) = s * (1 - s) * (1 - tanh(x)^2)
    let expected: Vec<f64> = x
        .to_f64_vec()
        .iter()
        .zip(y.to_f64_vec())
        .map(|(x, s)| s * (1.0 - s) * (1.0 - x.tanh().powi(2)))
        .collect();
    assert_vec_approx(&g.to_f64_vec(), &expected, 1e-12);
    Ok(())
}
