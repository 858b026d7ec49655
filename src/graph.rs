use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

use crate::error::GraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Float32,
    Float64,
    Int32,
    Int64,
    Uint8,
}

impl DataType {
    pub fn bytes_per_element(self) -> usize {
        match self {
            DataType::Float32 => 4,
            DataType::Float64 => 8,
            DataType::Int32 => 4,
            DataType::Int64 => 8,
            DataType::Uint8 => 1,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Uint8 => "uint8",
        }
    }

    pub fn parse(name: &str) -> Result<Self, GraphError> {
        match name {
            "float32" => Ok(DataType::Float32),
            "float64" => Ok(DataType::Float64),
            "int32" => Ok(DataType::Int32),
            "int64" => Ok(DataType::Int64),
            "uint8" => Ok(DataType::Uint8),
            other => Err(GraphError::UnknownDataType(other.to_string())),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of a named tensor: element type plus shape.
///
/// Produced by shape inference; runtime tensors carry the same information
/// observed concretely. An empty shape describes a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorDescriptor {
    pub data_type: DataType,
    #[serde(default)]
    pub shape: Vec<u32>,
}

impl TensorDescriptor {
    pub fn new(data_type: DataType, shape: Vec<u32>) -> Self {
        Self { data_type, shape }
    }

    pub fn element_count(&self) -> Option<usize> {
        let mut count = 1usize;
        for dim in &self.shape {
            count = count.checked_mul(*dim as usize)?;
        }
        Some(count)
    }

    pub fn byte_length(&self) -> Option<usize> {
        let elements = self.element_count()?;
        elements.checked_mul(self.data_type.bytes_per_element())
    }
}

/// Typed operator attribute value.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValue {
    Int(i64),
    Ints(Vec<i64>),
    Float(f32),
    Floats(Vec<f32>),
    Str(String),
    /// Raw little-endian element bytes, Base64 in the serialized form.
    Bytes(#[serde_as(as = "Base64")] Vec<u8>),
}

impl AttrValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            AttrValue::Ints(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            AttrValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_floats(&self) -> Option<&[f32]> {
        match self {
            AttrValue::Floats(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            AttrValue::Bytes(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(v: Vec<i64>) -> Self {
        AttrValue::Ints(v)
    }
}

impl From<f32> for AttrValue {
    fn from(v: f32) -> Self {
        AttrValue::Float(v)
    }
}

impl From<Vec<f32>> for AttrValue {
    fn from(v: Vec<f32>) -> Self {
        AttrValue::Floats(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<Vec<u8>> for AttrValue {
    fn from(v: Vec<u8>) -> Self {
        AttrValue::Bytes(v)
    }
}

/// A single computation step over named blobs.
///
/// Inputs and outputs reference blobs by name; the per-type arity contract
/// and shape/type propagation rule live in `shape_inference`, the concrete
/// semantics in `executors::cpu`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorDef {
    #[serde(rename = "type")]
    pub op_type: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, AttrValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl OperatorDef {
    pub fn new(op_type: &str, inputs: &[&str], outputs: &[&str]) -> Self {
        Self {
            op_type: op_type.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            attrs: BTreeMap::new(),
            label: None,
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    pub fn int_attr(&self, name: &str) -> Option<i64> {
        self.attr(name).and_then(AttrValue::as_int)
    }

    pub fn int_attr_or(&self, name: &str, default: i64) -> i64 {
        self.int_attr(name).unwrap_or(default)
    }

    pub fn float_attr(&self, name: &str) -> Option<f32> {
        self.attr(name).and_then(AttrValue::as_float)
    }

    pub fn float_attr_or(&self, name: &str, default: f32) -> f32 {
        self.float_attr(name).unwrap_or(default)
    }

    pub fn require_int(&self, name: &str) -> Result<i64, GraphError> {
        self.int_attr(name)
            .ok_or_else(|| GraphError::MissingAttribute {
                op: self.display_name(),
                attr: name.to_string(),
            })
    }

    pub fn require_ints(&self, name: &str) -> Result<&[i64], GraphError> {
        self.attr(name)
            .and_then(AttrValue::as_ints)
            .ok_or_else(|| GraphError::MissingAttribute {
                op: self.display_name(),
                attr: name.to_string(),
            })
    }

    pub fn require_str(&self, name: &str) -> Result<&str, GraphError> {
        self.attr(name)
            .and_then(AttrValue::as_str)
            .ok_or_else(|| GraphError::MissingAttribute {
                op: self.display_name(),
                attr: name.to_string(),
            })
    }

    /// The element type named by a `dtype`-style string attribute, or the
    /// given default when the attribute is absent.
    pub fn dtype_attr_or(&self, name: &str, default: DataType) -> Result<DataType, GraphError> {
        match self.attr(name).and_then(AttrValue::as_str) {
            Some(s) => DataType::parse(s),
            None => Ok(default),
        }
    }

    pub fn display_name(&self) -> String {
        self.label.clone().unwrap_or_else(|| self.op_type.clone())
    }
}

/// An executable, ordered collection of operators over named blobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_inputs: Vec<String>,
    #[serde(default)]
    pub ops: Vec<OperatorDef>,
}

impl NetDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            external_inputs: Vec::new(),
            ops: Vec::new(),
        }
    }

    pub fn add_op(&mut self, op: OperatorDef) {
        self.ops.push(op);
    }

    pub fn add_external_input(&mut self, name: &str) {
        if !self.external_inputs.iter().any(|n| n == name) {
            self.external_inputs.push(name.to_string());
        }
    }

    /// Check the DAG invariant: every operator input must already exist
    /// (`preexisting`, typically the workspace contents) or be produced by
    /// an earlier operator in this net. Declared external inputs must all
    /// be preexisting.
    pub fn validate(&self, preexisting: &HashSet<String>) -> Result<(), GraphError> {
        for name in &self.external_inputs {
            if !preexisting.contains(name) {
                return Err(GraphError::BlobMissing { name: name.clone() });
            }
        }
        let mut available: HashSet<String> = preexisting.clone();
        for op in &self.ops {
            for input in &op.inputs {
                if !available.contains(input) {
                    return Err(GraphError::DanglingInput {
                        name: input.clone(),
                        op: op.display_name(),
                    });
                }
            }
            for output in &op.outputs {
                available.insert(output.clone());
            }
        }
        Ok(())
    }
}
