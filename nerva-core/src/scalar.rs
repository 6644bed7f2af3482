use crate::dtype::DType;

/// Scalar is implemented for the numeric element types that can populate
/// a [Value](crate::value::Value). Backends use it to write kernels once
/// and dispatch on the runtime dtype tag.
pub trait Scalar: Clone + Copy + PartialEq + Send + Sync + 'static {
    /// Get dtype of Self
    fn dtype() -> DType;
    /// Get zero of Self
    fn zero() -> Self;
    /// Get one of Self
    fn one() -> Self;
    /// Convert self into f32
    fn into_f32(self) -> f32;
    /// Convert self into f64
    fn into_f64(self) -> f64;
    /// Convert self into i32
    fn into_i32(self) -> i32;
    /// Create self from f64
    fn from_f64(x: f64) -> Self;
}

impl Scalar for f32 {
    fn dtype() -> DType {
        DType::F32
    }

    fn zero() -> Self {
        0.
    }

    fn one() -> Self {
        1.
    }

    fn into_f32(self) -> f32 {
        self
    }

    fn into_f64(self) -> f64 {
        self as f64
    }

    fn into_i32(self) -> i32 {
        self as i32
    }

    fn from_f64(x: f64) -> Self {
        x as f32
    }
}

impl Scalar for f64 {
    fn dtype() -> DType {
        DType::F64
    }

    fn zero() -> Self {
        0.
    }

    fn one() -> Self {
        1.
    }

    fn into_f32(self) -> f32 {
        self as f32
    }

    fn into_f64(self) -> f64 {
        self
    }

    fn into_i32(self) -> i32 {
        self as i32
    }

    fn from_f64(x: f64) -> Self {
        x
    }
}

impl Scalar for i32 {
    fn dtype() -> DType {
        DType::I32
    }

    fn zero() -> Self {
        0
    }

    fn one() -> Self {
        1
    }

    fn into_f32(self) -> f32 {
        self as f32
    }

    fn into_f64(self) -> f64 {
        self as f64
    }

    fn into_i32(self) -> i32 {
        self
    }

    fn from_f64(x: f64) -> Self {
        x as i32
    }
}
