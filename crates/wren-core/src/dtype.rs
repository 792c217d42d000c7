use std::fmt;

// DType: element types a Value can hold
//
// Every Value carries a DType. The evaluation engine only deals with
// floating-point data, so the set is limited to the float formats:
//
//   F16   IEEE half float
//   BF16  brain float
//   F32   the default
//   F64   double precision, handy for exact comparisons in tests

/// Enum of all supported element data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F16,
    BF16,
    F32,
    F64,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::F32 => "f32",
            DType::F64 => "f64",
        };
        write!(f, "{}", s)
    }
}

/// Trait implemented by Rust types that can be stored in a Value.
///
/// Kernels convert through f64, so each element type only needs the two
/// conversions below.
pub trait WithDType: Copy + Send + Sync + 'static + num_traits::NumCast + fmt::Debug {
    /// The corresponding DType enum variant.
    const DTYPE: DType;

    /// Convert this value to f64.
    fn to_f64(self) -> f64;

    /// Create a value of this type from f64.
    fn from_f64(v: f64) -> Self;
}

impl WithDType for f32 {
    const DTYPE: DType = DType::F32;
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        v as f32
    }
}

impl WithDType for f64 {
    const DTYPE: DType = DType::F64;
    fn to_f64(self) -> f64 {
        self
    }
    fn from_f64(v: f64) -> Self {
        v
    }
}

impl WithDType for half::f16 {
    const DTYPE: DType = DType::F16;
    fn to_f64(self) -> f64 {
        self.to_f32() as f64
    }
    fn from_f64(v: f64) -> Self {
        half::f16::from_f64(v)
    }
}

impl WithDType for half::bf16 {
    const DTYPE: DType = DType::BF16;
    fn to_f64(self) -> f64 {
        self.to_f32() as f64
    }
    fn from_f64(v: f64) -> Self {
        half::bf16::from_f64(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_conversion() {
        assert_eq!(half::f16::DTYPE, DType::F16);
        assert_eq!(half::f16::from_f64(-1.5).to_f64(), -1.5);
        assert_eq!(half::bf16::from_f64(2.0).to_f64(), 2.0);
    }

    #[test]
    fn test_f32_precision() {
        assert_eq!(f32::DTYPE, DType::F32);
        assert_eq!(f32::from_f64(3.14).to_f64(), 3.140000104904175);
    }
}
