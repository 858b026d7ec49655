//! Static shape and type inference for operator nets.
//!
//! Given a list of nets (typically a parameter-initialization net followed
//! by the main computation net) and a seed environment of known blob
//! shapes/types, propagates forward through every operator using
//! per-operator-type rules and returns the full blob-name → shape and
//! blob-name → type mappings.

use std::collections::HashMap;

use tracing::debug;

use crate::error::GraphError;
use crate::graph::{DataType, NetDef, OperatorDef, TensorDescriptor};

/// The outcome of inference: one mapping per blob name for shapes, one for
/// element types. Every blob with a recorded shape also has a recorded type.
#[derive(Debug, Clone, Default)]
pub struct InferenceResult {
    pub shapes: HashMap<String, Vec<u32>>,
    pub types: HashMap<String, DataType>,
}

impl InferenceResult {
    pub fn descriptor(&self, name: &str) -> Option<TensorDescriptor> {
        let shape = self.shapes.get(name)?;
        let data_type = *self.types.get(name)?;
        Some(TensorDescriptor::new(data_type, shape.clone()))
    }
}

/// Compute the broadcasted shape for two operands following NumPy
/// broadcasting rules: ranks are right-aligned, dimensions are compatible
/// when equal or when one of them is 1, and the output takes the maximum.
pub fn broadcast_shapes(shape_a: &[u32], shape_b: &[u32]) -> Result<Vec<u32>, GraphError> {
    let max_rank = shape_a.len().max(shape_b.len());
    let mut result = Vec::with_capacity(max_rank);

    // Iterate from right to left (least significant dimension first)
    for i in 0..max_rank {
        let dim_a = if i < shape_a.len() {
            shape_a[shape_a.len() - 1 - i]
        } else {
            1
        };
        let dim_b = if i < shape_b.len() {
            shape_b[shape_b.len() - 1 - i]
        } else {
            1
        };

        if dim_a == dim_b || dim_a == 1 || dim_b == 1 {
            result.push(dim_a.max(dim_b));
        } else {
            return Err(GraphError::ShapeInferenceFailed {
                reason: format!(
                    "incompatible shapes for broadcasting: {:?} and {:?} (dimension {} incompatible: {} vs {})",
                    shape_a, shape_b, i, dim_a, dim_b
                ),
            });
        }
    }

    result.reverse();
    Ok(result)
}

/// Infer the output shape of a matrix multiplication.
///
/// For 2-D operands: `[M, K] x [K, N] -> [M, N]`. Higher-rank operands are
/// treated as batched matmuls with broadcasting over the batch dimensions.
pub fn infer_matmul_shape(shape_a: &[u32], shape_b: &[u32]) -> Result<Vec<u32>, GraphError> {
    if shape_a.len() < 2 || shape_b.len() < 2 {
        return Err(GraphError::ShapeInferenceFailed {
            reason: format!(
                "matmul requires at least 2-D tensors, got shapes {:?} and {:?}",
                shape_a, shape_b
            ),
        });
    }

    let a_rows = shape_a[shape_a.len() - 2];
    let a_cols = shape_a[shape_a.len() - 1];
    let b_rows = shape_b[shape_b.len() - 2];
    let b_cols = shape_b[shape_b.len() - 1];

    if a_cols != b_rows {
        return Err(GraphError::ShapeInferenceFailed {
            reason: format!(
                "incompatible shapes for matmul: {:?} and {:?} (inner dimensions {} != {})",
                shape_a, shape_b, a_cols, b_rows
            ),
        });
    }

    if shape_a.len() == 2 && shape_b.len() == 2 {
        return Ok(vec![a_rows, b_cols]);
    }

    let batch_a = &shape_a[..shape_a.len() - 2];
    let batch_b = &shape_b[..shape_b.len() - 2];
    let mut batch_dims = broadcast_shapes(batch_a, batch_b)?;
    batch_dims.push(a_rows);
    batch_dims.push(b_cols);

    Ok(batch_dims)
}

/// Validate that a reshape preserves the number of elements.
pub fn validate_reshape(input_shape: &[u32], output_shape: &[u32]) -> Result<(), GraphError> {
    let input_size: u64 = input_shape.iter().map(|&d| d as u64).product();
    let output_size: u64 = output_shape.iter().map(|&d| d as u64).product();

    if input_size != output_size {
        return Err(GraphError::ShapeInferenceFailed {
            reason: format!(
                "reshape requires same number of elements: input {:?} ({} elements) != output {:?} ({} elements)",
                input_shape, input_size, output_shape, output_size
            ),
        });
    }

    Ok(())
}

/// One spatial output extent of a convolution or pooling window:
/// `(input + 2*pad - kernel) / stride + 1`, floored.
pub fn conv_output_dim(
    input: u32,
    kernel: u32,
    stride: u32,
    pad: u32,
    op: &str,
) -> Result<u32, GraphError> {
    if kernel == 0 || stride == 0 {
        return Err(GraphError::ShapeInferenceFailed {
            reason: format!("operator `{}` requires kernel > 0 and stride > 0", op),
        });
    }
    let padded = input + 2 * pad;
    if padded < kernel {
        return Err(GraphError::ShapeInferenceFailed {
            reason: format!(
                "operator `{}`: kernel {} exceeds padded input extent {}",
                op, kernel, padded
            ),
        });
    }
    Ok((padded - kernel) / stride + 1)
}

/// Resolve the axis permutation of a `Transpose` operator.
///
/// With no `axes` attribute the rule is "reverse all dimensions". An
/// explicit `axes` list must be a bijection on `0..rank`.
pub fn transpose_axes(op: &OperatorDef, rank: usize) -> Result<Vec<usize>, GraphError> {
    let Some(axes) = op.attr("axes").and_then(|a| a.as_ints()) else {
        return Ok((0..rank).rev().collect());
    };

    let invalid = || GraphError::InvalidPermutation {
        axes: axes.to_vec(),
        rank,
    };

    if axes.len() != rank {
        return Err(invalid());
    }
    let mut seen = vec![false; rank];
    for &axis in axes {
        if axis < 0 || axis as usize >= rank || seen[axis as usize] {
            return Err(invalid());
        }
        seen[axis as usize] = true;
    }
    Ok(axes.iter().map(|&a| a as usize).collect())
}

/// Run inference over `nets` in order, starting from the given seed
/// environment. Returns the complete shape and type maps, including the
/// seeds themselves.
pub fn infer_shapes_and_types(
    nets: &[&NetDef],
    seed_shapes: &HashMap<String, Vec<u32>>,
    seed_types: &HashMap<String, DataType>,
) -> Result<InferenceResult, GraphError> {
    let mut result = InferenceResult {
        shapes: seed_shapes.clone(),
        types: seed_types.clone(),
    };

    for net in nets {
        debug!(net = %net.name, ops = net.ops.len(), "inferring shapes and types");
        for op in &net.ops {
            infer_operator(op, &mut result)?;
        }
    }

    Ok(result)
}

fn infer_operator(op: &OperatorDef, env: &mut InferenceResult) -> Result<(), GraphError> {
    match op.op_type.as_str() {
        "ConstantFill" | "XavierFill" | "UniformFill" | "GaussianFill" | "MsraFill"
        | "GivenTensorFill" => infer_fill(op, env),
        "FC" => infer_fc(op, env),
        "Conv" => infer_conv(op, env),
        "MaxPool" | "AveragePool" => infer_pool(op, env),
        "SpatialBN" => infer_spatial_bn(op, env),
        "Relu" | "Sigmoid" | "Tanh" | "Softmax" => infer_identity(op, env),
        "Transpose" => infer_transpose(op, env),
        "SquaredL2Distance" | "CosineSimilarity" | "DotProduct" => infer_pairwise(op, env),
        "Cast" => infer_cast(op, env),
        "Add" | "Sub" | "Mul" | "Div" => infer_broadcast_binary(op, env),
        "MatMul" => infer_matmul(op, env),
        "Reshape" => infer_reshape(op, env),
        _ => Err(GraphError::UnsupportedOperator {
            op_type: op.op_type.clone(),
        }),
    }
}

fn expect_inputs(op: &OperatorDef, expected: usize) -> Result<(), GraphError> {
    if op.inputs.len() != expected {
        return Err(GraphError::ArityMismatch {
            op: op.display_name(),
            expected: expected.to_string(),
            actual: op.inputs.len(),
        });
    }
    Ok(())
}

fn input_shape<'a>(
    op: &OperatorDef,
    index: usize,
    env: &'a InferenceResult,
) -> Result<&'a [u32], GraphError> {
    let name = &op.inputs[index];
    env.shapes
        .get(name)
        .map(|s| s.as_slice())
        .ok_or_else(|| GraphError::MissingShape {
            name: name.clone(),
            op: op.display_name(),
        })
}

fn input_type(op: &OperatorDef, index: usize, env: &InferenceResult) -> Result<DataType, GraphError> {
    let name = &op.inputs[index];
    env.types
        .get(name)
        .copied()
        .ok_or_else(|| GraphError::MissingType {
            name: name.clone(),
            op: op.display_name(),
        })
}

fn record(op: &OperatorDef, env: &mut InferenceResult, shape: Vec<u32>, data_type: DataType) {
    for output in &op.outputs {
        env.shapes.insert(output.clone(), shape.clone());
        env.types.insert(output.clone(), data_type);
    }
}

fn shape_attr(op: &OperatorDef) -> Result<Vec<u32>, GraphError> {
    let dims = op.require_ints("shape")?;
    dims.iter()
        .map(|&d| {
            u32::try_from(d).map_err(|_| GraphError::InvalidAttribute {
                op: op.display_name(),
                attr: "shape".to_string(),
                reason: format!("dimension {} is negative", d),
            })
        })
        .collect()
}

fn infer_fill(op: &OperatorDef, env: &mut InferenceResult) -> Result<(), GraphError> {
    expect_inputs(op, 0)?;
    let shape = shape_attr(op)?;
    let data_type = op.dtype_attr_or("dtype", DataType::Float32)?;

    if op.op_type == "GivenTensorFill" {
        let values = op
            .attr("values")
            .and_then(|a| a.as_bytes())
            .ok_or_else(|| GraphError::MissingAttribute {
                op: op.display_name(),
                attr: "values".to_string(),
            })?;
        let expected = TensorDescriptor::new(data_type, shape.clone())
            .byte_length()
            .ok_or_else(|| GraphError::ShapeInferenceFailed {
                reason: format!("fill shape {:?} overflows", shape),
            })?;
        if values.len() != expected {
            return Err(GraphError::InvalidAttribute {
                op: op.display_name(),
                attr: "values".to_string(),
                reason: format!("expected {} bytes for {:?}, got {}", expected, shape, values.len()),
            });
        }
    }

    record(op, env, shape, data_type);
    Ok(())
}

/// FC flattens trailing input dimensions: `[N, d1, .., dk]` with weight
/// `[dim_out, d1*..*dk]` and bias `[dim_out]` yields `[N, dim_out]`.
fn infer_fc(op: &OperatorDef, env: &mut InferenceResult) -> Result<(), GraphError> {
    expect_inputs(op, 3)?;
    let x = input_shape(op, 0, env)?;
    let w = input_shape(op, 1, env)?;
    let b = input_shape(op, 2, env)?;

    if x.len() < 2 {
        return Err(GraphError::ShapeInferenceFailed {
            reason: format!("FC input must be at least 2-D, got {:?}", x),
        });
    }
    if w.len() != 2 {
        return Err(GraphError::ShapeInferenceFailed {
            reason: format!("FC weight must be 2-D [dim_out, dim_in], got {:?}", w),
        });
    }
    let dim_in: u64 = x[1..].iter().map(|&d| d as u64).product();
    if w[1] as u64 != dim_in {
        return Err(GraphError::ShapeInferenceFailed {
            reason: format!(
                "FC weight {:?} does not match flattened input {:?} (dim_in {})",
                w, x, dim_in
            ),
        });
    }
    if b.len() != 1 || b[0] != w[0] {
        return Err(GraphError::ShapeInferenceFailed {
            reason: format!("FC bias {:?} does not match weight {:?}", b, w),
        });
    }

    let data_type = input_type(op, 0, env)?;
    record(op, env, vec![x[0], w[0]], data_type);
    Ok(())
}

fn infer_conv(op: &OperatorDef, env: &mut InferenceResult) -> Result<(), GraphError> {
    if op.inputs.len() != 2 && op.inputs.len() != 3 {
        return Err(GraphError::ArityMismatch {
            op: op.display_name(),
            expected: "2 or 3".to_string(),
            actual: op.inputs.len(),
        });
    }
    let x = input_shape(op, 0, env)?;
    let w = input_shape(op, 1, env)?;
    if x.len() != 4 || w.len() != 4 {
        return Err(GraphError::ShapeInferenceFailed {
            reason: format!("Conv expects NCHW input and [M, C, kH, kW] weight, got {:?} and {:?}", x, w),
        });
    }
    if w[1] != x[1] {
        return Err(GraphError::ShapeInferenceFailed {
            reason: format!(
                "Conv weight channels {} do not match input channels {}",
                w[1], x[1]
            ),
        });
    }
    if op.inputs.len() == 3 {
        let b = input_shape(op, 2, env)?;
        if b.len() != 1 || b[0] != w[0] {
            return Err(GraphError::ShapeInferenceFailed {
                reason: format!("Conv bias {:?} does not match {} filters", b, w[0]),
            });
        }
    }

    let kernel = op.require_int("kernel")? as u32;
    let stride = op.int_attr_or("stride", 1) as u32;
    let pad = op.int_attr_or("pad", 0) as u32;
    if w[2] != kernel || w[3] != kernel {
        return Err(GraphError::ShapeInferenceFailed {
            reason: format!("Conv weight {:?} does not match kernel attribute {}", w, kernel),
        });
    }

    let out_h = conv_output_dim(x[2], kernel, stride, pad, "Conv")?;
    let out_w = conv_output_dim(x[3], kernel, stride, pad, "Conv")?;
    let data_type = input_type(op, 0, env)?;
    record(op, env, vec![x[0], w[0], out_h, out_w], data_type);
    Ok(())
}

fn infer_pool(op: &OperatorDef, env: &mut InferenceResult) -> Result<(), GraphError> {
    expect_inputs(op, 1)?;
    let x = input_shape(op, 0, env)?;
    if x.len() != 4 {
        return Err(GraphError::ShapeInferenceFailed {
            reason: format!("{} expects NCHW input, got {:?}", op.op_type, x),
        });
    }
    let kernel = op.require_int("kernel")? as u32;
    let stride = op.int_attr_or("stride", 1) as u32;
    let pad = op.int_attr_or("pad", 0) as u32;

    let out_h = conv_output_dim(x[2], kernel, stride, pad, &op.op_type)?;
    let out_w = conv_output_dim(x[3], kernel, stride, pad, &op.op_type)?;
    let data_type = input_type(op, 0, env)?;
    record(op, env, vec![x[0], x[1], out_h, out_w], data_type);
    Ok(())
}

fn infer_spatial_bn(op: &OperatorDef, env: &mut InferenceResult) -> Result<(), GraphError> {
    expect_inputs(op, 5)?;
    let x = input_shape(op, 0, env)?.to_vec();
    if x.len() != 4 {
        return Err(GraphError::ShapeInferenceFailed {
            reason: format!("SpatialBN expects NCHW input, got {:?}", x),
        });
    }
    let channels = x[1];
    for index in 1..5 {
        let param = input_shape(op, index, env)?;
        if param.len() != 1 || param[0] != channels {
            return Err(GraphError::ShapeInferenceFailed {
                reason: format!(
                    "SpatialBN parameter `{}` has shape {:?}, expected [{}]",
                    op.inputs[index], param, channels
                ),
            });
        }
    }
    let data_type = input_type(op, 0, env)?;
    record(op, env, x, data_type);
    Ok(())
}

fn infer_identity(op: &OperatorDef, env: &mut InferenceResult) -> Result<(), GraphError> {
    expect_inputs(op, 1)?;
    let shape = input_shape(op, 0, env)?.to_vec();
    let data_type = input_type(op, 0, env)?;
    record(op, env, shape, data_type);
    Ok(())
}

fn infer_transpose(op: &OperatorDef, env: &mut InferenceResult) -> Result<(), GraphError> {
    expect_inputs(op, 1)?;
    let shape = input_shape(op, 0, env)?.to_vec();
    let axes = transpose_axes(op, shape.len())?;
    let permuted: Vec<u32> = axes.iter().map(|&a| shape[a]).collect();
    let data_type = input_type(op, 0, env)?;
    record(op, env, permuted, data_type);
    Ok(())
}

/// Pairwise metrics reduce each row of two same-shape inputs to one value:
/// `[N, d1, .., dk] -> [N]`.
fn infer_pairwise(op: &OperatorDef, env: &mut InferenceResult) -> Result<(), GraphError> {
    expect_inputs(op, 2)?;
    let x = input_shape(op, 0, env)?;
    let y = input_shape(op, 1, env)?;
    if x != y {
        return Err(GraphError::ShapeInferenceFailed {
            reason: format!(
                "{} inputs must have identical shapes, got {:?} and {:?}",
                op.op_type, x, y
            ),
        });
    }
    if x.is_empty() {
        return Err(GraphError::ShapeInferenceFailed {
            reason: format!("{} requires rank >= 1 inputs", op.op_type),
        });
    }
    let data_type = input_type(op, 0, env)?;
    let rows = x[0];
    record(op, env, vec![rows], data_type);
    Ok(())
}

fn infer_cast(op: &OperatorDef, env: &mut InferenceResult) -> Result<(), GraphError> {
    expect_inputs(op, 1)?;
    let shape = input_shape(op, 0, env)?.to_vec();
    let target = DataType::parse(op.require_str("to")?)?;
    record(op, env, shape, target);
    Ok(())
}

fn infer_broadcast_binary(op: &OperatorDef, env: &mut InferenceResult) -> Result<(), GraphError> {
    expect_inputs(op, 2)?;
    let a = input_shape(op, 0, env)?;
    let b = input_shape(op, 1, env)?;
    let shape = broadcast_shapes(a, b)?;
    let data_type = input_type(op, 0, env)?;
    record(op, env, shape, data_type);
    Ok(())
}

fn infer_matmul(op: &OperatorDef, env: &mut InferenceResult) -> Result<(), GraphError> {
    expect_inputs(op, 2)?;
    let a = input_shape(op, 0, env)?;
    let b = input_shape(op, 1, env)?;
    let shape = infer_matmul_shape(a, b)?;
    let data_type = input_type(op, 0, env)?;
    record(op, env, shape, data_type);
    Ok(())
}

fn infer_reshape(op: &OperatorDef, env: &mut InferenceResult) -> Result<(), GraphError> {
    expect_inputs(op, 1)?;
    let input = input_shape(op, 0, env)?.to_vec();
    let target = shape_attr(op)?;
    validate_reshape(&input, &target)?;
    let data_type = input_type(op, 0, env)?;
    record(op, env, target, data_type);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::OperatorDef;

    #[test]
    fn test_broadcast_same_shape() {
        assert_eq!(broadcast_shapes(&[2, 3], &[2, 3]).unwrap(), vec![2, 3]);
    }

    #[test]
    fn test_broadcast_with_ones() {
        assert_eq!(broadcast_shapes(&[2, 3], &[1, 3]).unwrap(), vec![2, 3]);
        assert_eq!(broadcast_shapes(&[1, 3], &[2, 3]).unwrap(), vec![2, 3]);
    }

    #[test]
    fn test_broadcast_different_ranks() {
        assert_eq!(broadcast_shapes(&[2, 3, 4], &[3, 4]).unwrap(), vec![2, 3, 4]);
        assert_eq!(broadcast_shapes(&[3, 4], &[2, 3, 4]).unwrap(), vec![2, 3, 4]);
    }

    #[test]
    fn test_broadcast_incompatible() {
        assert!(broadcast_shapes(&[2, 3], &[2, 4]).is_err());
        assert!(broadcast_shapes(&[2, 3, 4], &[2, 5, 4]).is_err());
    }

    #[test]
    fn test_matmul_2d() {
        assert_eq!(infer_matmul_shape(&[2, 3], &[3, 4]).unwrap(), vec![2, 4]);
    }

    #[test]
    fn test_matmul_batched() {
        assert_eq!(
            infer_matmul_shape(&[5, 2, 3], &[5, 3, 4]).unwrap(),
            vec![5, 2, 4]
        );
    }

    #[test]
    fn test_matmul_incompatible() {
        assert!(infer_matmul_shape(&[2, 3], &[4, 5]).is_err());
        assert!(infer_matmul_shape(&[2], &[3, 4]).is_err());
    }

    #[test]
    fn test_validate_reshape() {
        assert!(validate_reshape(&[2, 3], &[6]).is_ok());
        assert!(validate_reshape(&[2, 3, 4], &[6, 4]).is_ok());
        assert!(validate_reshape(&[2, 3], &[5]).is_err());
    }

    #[test]
    fn test_conv_output_dim() {
        // 227x227 input, 7x7 kernel, stride 2, pad 3 -> 114
        assert_eq!(conv_output_dim(227, 7, 2, 3, "Conv").unwrap(), 114);
        // pooling 114, kernel 3, stride 2 -> 56
        assert_eq!(conv_output_dim(114, 3, 2, 0, "MaxPool").unwrap(), 56);
        assert!(conv_output_dim(4, 7, 1, 0, "Conv").is_err());
    }

    #[test]
    fn test_transpose_axes_default_reverses() {
        let op = OperatorDef::new("Transpose", &["t"], &["out"]);
        assert_eq!(transpose_axes(&op, 5).unwrap(), vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_transpose_axes_explicit() {
        let op = OperatorDef::new("Transpose", &["t"], &["out"])
            .with_attr("axes", vec![2i64, 0, 1]);
        assert_eq!(transpose_axes(&op, 3).unwrap(), vec![2, 0, 1]);
    }

    #[test]
    fn test_transpose_axes_rejects_non_bijection() {
        let duplicated = OperatorDef::new("Transpose", &["t"], &["out"])
            .with_attr("axes", vec![0i64, 0, 1]);
        assert!(matches!(
            transpose_axes(&duplicated, 3),
            Err(GraphError::InvalidPermutation { .. })
        ));

        let out_of_range = OperatorDef::new("Transpose", &["t"], &["out"])
            .with_attr("axes", vec![0i64, 1, 3]);
        assert!(transpose_axes(&out_of_range, 3).is_err());

        let wrong_len = OperatorDef::new("Transpose", &["t"], &["out"])
            .with_attr("axes", vec![0i64, 1]);
        assert!(transpose_axes(&wrong_len, 3).is_err());
    }

    fn env_with(entries: &[(&str, &[u32])]) -> InferenceResult {
        let mut env = InferenceResult::default();
        for (name, shape) in entries {
            env.shapes.insert(name.to_string(), shape.to_vec());
            env.types.insert(name.to_string(), DataType::Float32);
        }
        env
    }

    #[test]
    fn test_infer_fc_flattens_trailing_dims() {
        let mut env = env_with(&[
            ("x", &[16, 64, 56, 56]),
            ("w", &[100, 64 * 56 * 56]),
            ("b", &[100]),
        ]);
        let op = OperatorDef::new("FC", &["x", "w", "b"], &["y"]);
        infer_operator(&op, &mut env).unwrap();
        assert_eq!(env.shapes["y"], vec![16, 100]);
        assert_eq!(env.types["y"], DataType::Float32);
    }

    #[test]
    fn test_infer_fc_weight_mismatch() {
        let mut env = env_with(&[("x", &[64, 96]), ("w", &[32, 95]), ("b", &[32])]);
        let op = OperatorDef::new("FC", &["x", "w", "b"], &["y"]);
        assert!(infer_operator(&op, &mut env).is_err());
    }

    #[test]
    fn test_infer_conv_shape() {
        let mut env = env_with(&[("x", &[16, 3, 227, 227]), ("w", &[64, 3, 7, 7]), ("b", &[64])]);
        let op = OperatorDef::new("Conv", &["x", "w", "b"], &["y"])
            .with_attr("kernel", 7i64)
            .with_attr("stride", 2i64)
            .with_attr("pad", 3i64);
        infer_operator(&op, &mut env).unwrap();
        assert_eq!(env.shapes["y"], vec![16, 64, 114, 114]);
    }

    #[test]
    fn test_infer_pool_preserves_channels() {
        let mut env = env_with(&[("x", &[16, 64, 114, 114])]);
        let op = OperatorDef::new("MaxPool", &["x"], &["y"])
            .with_attr("kernel", 3i64)
            .with_attr("stride", 2i64);
        infer_operator(&op, &mut env).unwrap();
        assert_eq!(env.shapes["y"], vec![16, 64, 56, 56]);
    }

    #[test]
    fn test_infer_pairwise_rows() {
        let mut env = env_with(&[("x", &[10]), ("y", &[10])]);
        let op = OperatorDef::new("SquaredL2Distance", &["x", "y"], &["z"]);
        infer_operator(&op, &mut env).unwrap();
        assert_eq!(env.shapes["z"], vec![10]);

        let mut env = env_with(&[("x", &[4, 8]), ("y", &[4, 8])]);
        let op = OperatorDef::new("CosineSimilarity", &["x", "y"], &["z"]);
        infer_operator(&op, &mut env).unwrap();
        assert_eq!(env.shapes["z"], vec![4]);
    }

    #[test]
    fn test_infer_fill_with_dtype() {
        let mut env = InferenceResult::default();
        let op = OperatorDef::new("ConstantFill", &[], &["c"])
            .with_attr("shape", vec![3i64, 2])
            .with_attr("dtype", "int64");
        infer_operator(&op, &mut env).unwrap();
        assert_eq!(env.shapes["c"], vec![3, 2]);
        assert_eq!(env.types["c"], DataType::Int64);
    }

    #[test]
    fn test_infer_cast_changes_type_only() {
        let mut env = env_with(&[("x", &[2, 3])]);
        let op = OperatorDef::new("Cast", &["x"], &["y"]).with_attr("to", "int32");
        infer_operator(&op, &mut env).unwrap();
        assert_eq!(env.shapes["y"], vec![2, 3]);
        assert_eq!(env.types["y"], DataType::Int32);
    }

    #[test]
    fn test_infer_unsupported_operator() {
        let mut env = env_with(&[("x", &[2])]);
        let op = OperatorDef::new("FancyNewOp", &["x"], &["y"]);
        assert!(matches!(
            infer_operator(&op, &mut env),
            Err(GraphError::UnsupportedOperator { .. })
        ));
    }

    #[test]
    fn test_infer_missing_shape() {
        let mut env = InferenceResult::default();
        let op = OperatorDef::new("Relu", &["x"], &["y"]);
        assert!(matches!(
            infer_operator(&op, &mut env),
            Err(GraphError::MissingShape { .. })
        ));
    }
}
