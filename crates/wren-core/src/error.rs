use crate::device::DeviceTag;
use crate::shape::Shape;

/// All errors that can occur within wren.
///
/// Every variant is a usage error: it is raised at the call site that detects
/// it and surfaces unchanged to the caller. Numeric anomalies (NaN, overflow)
/// are not errors; they flow through as ordinary element values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// `feed_backward` on a backward-enabled layer with nothing buffered.
    #[error("backward without forward: layer `{layer}` has no buffered forward state")]
    BackwardWithoutForward { layer: String },

    /// Shape mismatch between two operands, or between a gradient and the
    /// shape recorded at the matching forward call.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// `neutral_invariant` found residual state.
    #[error(
        "neutral invariant violated in layer `{layer}`: {buffered} buffered value(s), {shapes} shape record(s)"
    )]
    InvariantViolation {
        layer: String,
        buffered: usize,
        shapes: usize,
    },

    /// Evaluation requested for a device that has no backend.
    #[error("no evaluation backend registered for device {device}")]
    UnknownDevice { device: String },

    /// A required port role is absent from a port map.
    #[error("port map has no value for required port `{port}`")]
    MissingPort { port: String },

    /// A port map carries a role the layer does not declare.
    #[error("port `{port}` is not declared by this layer")]
    UnexpectedPort { port: String },

    /// A layer policy option name or value is not recognized.
    #[error("invalid layer policy option `{option}` = `{value}`")]
    InvalidPolicy { option: String, value: String },

    /// A handle whose plan was reset before its node was computed.
    #[error("evaluation handle is stale: its plan was reset before the node on {device} was computed")]
    StaleHandle { device: DeviceTag },

    /// Operation requires a specific rank.
    #[error("rank mismatch: expected rank {expected}, got {got}")]
    RankMismatch { expected: usize, got: usize },

    /// DType mismatch between the operands of a binary operation.
    #[error("dtype mismatch: expected {expected:?}, got {got:?}")]
    DTypeMismatch {
        expected: crate::DType,
        got: crate::DType,
    },

    /// Dimension index out of range for the value's rank.
    #[error("dimension out of range: dim {dim} for a value with {rank} dimensions")]
    DimOutOfRange { dim: usize, rank: usize },

    /// Sub-region or slice out of bounds.
    #[error("narrow out of bounds: dim {dim}, start {start}, len {len}, dim_size {dim_size}")]
    NarrowOutOfBounds {
        dim: usize,
        start: usize,
        len: usize,
        dim_size: usize,
    },

    /// Element count mismatch when creating a value from a vec.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }

    /// Whether this error belongs to the configuration group (unknown device,
    /// missing or unexpected port, bad policy option).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::UnknownDevice { .. }
                | Error::MissingPort { .. }
                | Error::UnexpectedPort { .. }
                | Error::InvalidPolicy { .. }
        )
    }
}

/// Convenience Result type used throughout wren.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_group() {
        assert!(Error::UnknownDevice {
            device: "cuda".into()
        }
        .is_configuration());
        assert!(Error::MissingPort {
            port: "input".into()
        }
        .is_configuration());
        assert!(!Error::BackwardWithoutForward {
            layer: "sig".into()
        }
        .is_configuration());
    }

    #[test]
    fn test_display_shape_mismatch() {
        let e = Error::ShapeMismatch {
            expected: Shape::from((4, 5)),
            got: Shape::from((5, 4)),
        };
        assert_eq!(e.to_string(), "shape mismatch: expected [4, 5], got [5, 4]");
    }
}
