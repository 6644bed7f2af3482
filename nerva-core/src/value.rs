use crate::dtype::DType;
use crate::error::NervaError;
use crate::scalar::Scalar;
use crate::shape::Shape;

/// Runtime-tagged storage for one tensor value.
#[derive(Clone, Debug, PartialEq)]
pub enum Data {
    /// 32 bit floating point storage
    F32(Vec<f32>),
    /// 64 bit floating point storage
    F64(Vec<f64>),
    /// 32 bit integer storage
    I32(Vec<i32>),
}

impl Data {
    /// Get dtype of this data
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Data::F32(..) => DType::F32,
            Data::F64(..) => DType::F64,
            Data::I32(..) => DType::I32,
        }
    }

    /// Get number of stored elements
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Data::F32(data) => data.len(),
            Data::F64(data) => data.len(),
            Data::I32(data) => data.len(),
        }
    }

    /// Check if no elements are stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A concrete tensor value: a shape plus runtime-tagged storage.
/// Values populate free inputs and parameters and carry outputs
/// and gradients back to the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct Value {
    shape: Shape,
    data: Data,
}

impl Value {
    /// Create a new value, verifying that storage length matches the shape.
    pub fn new(shape: impl Into<Shape>, data: Data) -> Result<Self, NervaError> {
        let shape = shape.into();
        if shape.numel() != data.len() {
            return Err(NervaError::ShapeMismatch {
                expected: shape,
                found: Shape::from(data.len()),
            });
        }
        Ok(Self { shape, data })
    }

    /// Create a value from a slice of scalars.
    pub fn from_slice<T: Scalar>(shape: impl Into<Shape>, data: &[T]) -> Result<Self, NervaError> {
        let data = match T::dtype() {
            DType::F32 => Data::F32(data.iter().map(|x| x.into_f32()).collect()),
            DType::F64 => Data::F64(data.iter().map(|x| x.into_f64()).collect()),
            DType::I32 => Data::I32(data.iter().map(|x| x.into_i32()).collect()),
        };
        Self::new(shape, data)
    }

    /// Create a scalar value.
    #[must_use]
    pub fn scalar<T: Scalar>(x: T) -> Self {
        let data = match T::dtype() {
            DType::F32 => Data::F32(vec![x.into_f32()]),
            DType::F64 => Data::F64(vec![x.into_f64()]),
            DType::I32 => Data::I32(vec![x.into_i32()]),
        };
        Self {
            shape: Shape::scalar(),
            data,
        }
    }

    /// Create a zero-filled value.
    #[must_use]
    pub fn zeros(shape: impl Into<Shape>, dtype: DType) -> Self {
        let shape = shape.into();
        let n = shape.numel();
        let data = match dtype {
            DType::F32 => Data::F32(vec![0.; n]),
            DType::F64 => Data::F64(vec![0.; n]),
            DType::I32 => Data::I32(vec![0; n]),
        };
        Self { shape, data }
    }

    /// Get shape of this value
    #[must_use]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Get dtype of this value
    #[must_use]
    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// Get number of elements
    #[must_use]
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Get storage of this value
    #[must_use]
    pub fn data(&self) -> &Data {
        &self.data
    }

    /// Get f32 storage, if this value holds f32 elements
    #[must_use]
    pub fn as_f32(&self) -> Option<&[f32]> {
        if let Data::F32(data) = &self.data {
            Some(data)
        } else {
            None
        }
    }

    /// Get f64 storage, if this value holds f64 elements
    #[must_use]
    pub fn as_f64(&self) -> Option<&[f64]> {
        if let Data::F64(data) = &self.data {
            Some(data)
        } else {
            None
        }
    }

    /// Get i32 storage, if this value holds i32 elements
    #[must_use]
    pub fn as_i32(&self) -> Option<&[i32]> {
        if let Data::I32(data) = &self.data {
            Some(data)
        } else {
            None
        }
    }
}
