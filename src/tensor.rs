//! Runtime tensors: named blob values materialized by execution.
//!
//! Storage is dtype-tagged rather than generic so the workspace can hold a
//! heterogeneous blob map and the harness can classify runtime types the
//! same way inference reports them.

use crate::error::GraphError;
use crate::graph::DataType;

/// Typed element storage for a runtime tensor.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::F64(v) => v.len(),
            TensorData::I32(v) => v.len(),
            TensorData::I64(v) => v.len(),
            TensorData::U8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DataType {
        match self {
            TensorData::F32(_) => DataType::Float32,
            TensorData::F64(_) => DataType::Float64,
            TensorData::I32(_) => DataType::Int32,
            TensorData::I64(_) => DataType::Int64,
            TensorData::U8(_) => DataType::Uint8,
        }
    }
}

/// A concrete multi-dimensional array identified by name within a
/// workspace. Invariant: `data.len() == shape.iter().product()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: TensorData,
    shape: Vec<usize>,
}

impl Tensor {
    pub fn new(data: TensorData, shape: Vec<usize>) -> Result<Self, GraphError> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(GraphError::ShapeInferenceFailed {
                reason: format!(
                    "tensor data has {} elements but shape {:?} implies {}",
                    data.len(),
                    shape,
                    expected
                ),
            });
        }
        Ok(Self { data, shape })
    }

    pub fn from_f32(data: Vec<f32>, shape: Vec<usize>) -> Result<Self, GraphError> {
        Self::new(TensorData::F32(data), shape)
    }

    pub fn from_f64(data: Vec<f64>, shape: Vec<usize>) -> Result<Self, GraphError> {
        Self::new(TensorData::F64(data), shape)
    }

    pub fn from_i32(data: Vec<i32>, shape: Vec<usize>) -> Result<Self, GraphError> {
        Self::new(TensorData::I32(data), shape)
    }

    pub fn from_i64(data: Vec<i64>, shape: Vec<usize>) -> Result<Self, GraphError> {
        Self::new(TensorData::I64(data), shape)
    }

    pub fn from_u8(data: Vec<u8>, shape: Vec<usize>) -> Result<Self, GraphError> {
        Self::new(TensorData::U8(data), shape)
    }

    /// Zero-filled tensor of the given dtype and shape.
    pub fn zeros(dtype: DataType, shape: Vec<usize>) -> Self {
        let count: usize = shape.iter().product();
        let data = match dtype {
            DataType::Float32 => TensorData::F32(vec![0.0; count]),
            DataType::Float64 => TensorData::F64(vec![0.0; count]),
            DataType::Int32 => TensorData::I32(vec![0; count]),
            DataType::Int64 => TensorData::I64(vec![0; count]),
            DataType::Uint8 => TensorData::U8(vec![0; count]),
        };
        Self { data, shape }
    }

    pub fn dtype(&self) -> DataType {
        self.data.dtype()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn element_count(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn as_f32(&self) -> Result<&[f32], GraphError> {
        match &self.data {
            TensorData::F32(v) => Ok(v),
            other => Err(GraphError::TypeMismatch {
                expected: DataType::Float32,
                actual: other.dtype(),
            }),
        }
    }

    pub fn as_f64(&self) -> Result<&[f64], GraphError> {
        match &self.data {
            TensorData::F64(v) => Ok(v),
            other => Err(GraphError::TypeMismatch {
                expected: DataType::Float64,
                actual: other.dtype(),
            }),
        }
    }

    pub fn as_i32(&self) -> Result<&[i32], GraphError> {
        match &self.data {
            TensorData::I32(v) => Ok(v),
            other => Err(GraphError::TypeMismatch {
                expected: DataType::Int32,
                actual: other.dtype(),
            }),
        }
    }

    pub fn as_i64(&self) -> Result<&[i64], GraphError> {
        match &self.data {
            TensorData::I64(v) => Ok(v),
            other => Err(GraphError::TypeMismatch {
                expected: DataType::Int64,
                actual: other.dtype(),
            }),
        }
    }

    /// Same storage reinterpreted under a new shape with the same element
    /// count.
    pub fn reshaped(&self, shape: Vec<usize>) -> Result<Self, GraphError> {
        Self::new(self.data.clone(), shape)
    }

    /// Every element widened to f64, regardless of dtype.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match &self.data {
            TensorData::F32(v) => v.iter().map(|&x| x as f64).collect(),
            TensorData::F64(v) => v.clone(),
            TensorData::I32(v) => v.iter().map(|&x| x as f64).collect(),
            TensorData::I64(v) => v.iter().map(|&x| x as f64).collect(),
            TensorData::U8(v) => v.iter().map(|&x| x as f64).collect(),
        }
    }

    /// Element-type conversion through f64, shape preserved.
    pub fn cast(&self, target: DataType) -> Self {
        let values = self.to_f64_vec();
        let data = match target {
            DataType::Float32 => TensorData::F32(values.iter().map(|&x| x as f32).collect()),
            DataType::Float64 => TensorData::F64(values),
            DataType::Int32 => TensorData::I32(values.iter().map(|&x| x as i32).collect()),
            DataType::Int64 => TensorData::I64(values.iter().map(|&x| x as i64).collect()),
            DataType::Uint8 => TensorData::U8(values.iter().map(|&x| x as u8).collect()),
        };
        Self {
            data,
            shape: self.shape.clone(),
        }
    }
}
