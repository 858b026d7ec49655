use thiserror::Error;

use crate::graph::DataType;

/// Errors produced while building, inferring, or executing operator nets.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("operator `{op_type}` is not supported")]
    UnsupportedOperator { op_type: String },

    #[error("operator `{op}` expects {expected} input(s), got {actual}")]
    ArityMismatch {
        op: String,
        expected: String,
        actual: usize,
    },

    #[error("operator `{op}` is missing required attribute `{attr}`")]
    MissingAttribute { op: String, attr: String },

    #[error("attribute `{attr}` of operator `{op}` is invalid: {reason}")]
    InvalidAttribute {
        op: String,
        attr: String,
        reason: String,
    },

    #[error("blob `{name}` is not present in the workspace")]
    BlobMissing { name: String },

    #[error("net `{name}` has not been created")]
    NetMissing { name: String },

    #[error("blob `{name}` consumed by operator `{op}` is neither an external input nor produced by an earlier operator")]
    DanglingInput { name: String, op: String },

    #[error("no shape is known for blob `{name}` required by operator `{op}`")]
    MissingShape { name: String, op: String },

    #[error("no type is known for blob `{name}` required by operator `{op}`")]
    MissingType { name: String, op: String },

    #[error("shape inference failed: {reason}")]
    ShapeInferenceFailed { reason: String },

    #[error("invalid transpose permutation {axes:?} for rank {rank}")]
    InvalidPermutation { axes: Vec<i64>, rank: usize },

    #[error("expected {expected} tensor data, got {actual}")]
    TypeMismatch {
        expected: DataType,
        actual: DataType,
    },

    #[error("execution of operator `{op}` failed: {reason}")]
    ExecutionFailed { op: String, reason: String },

    #[error("unknown data type string `{0}`")]
    UnknownDataType(String),
}
