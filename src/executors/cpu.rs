//! CPU reference kernels for every supported operator.
//!
//! Each kernel implements exactly the semantics the shape/type inference
//! rules in `shape_inference` describe, so that inferred and executed
//! shapes can be compared blob-for-blob. Numeric kernels operate on f32;
//! `Cast` and the fill operators materialize the remaining dtypes.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::GraphError;
use crate::graph::{DataType, OperatorDef};
use crate::shape_inference::{broadcast_shapes, conv_output_dim, transpose_axes, validate_reshape};
use crate::tensor::{Tensor, TensorData};

/// Execute a single operator over already-resolved input tensors,
/// returning one output tensor per declared output name.
pub fn run_operator(op: &OperatorDef, inputs: &[&Tensor]) -> Result<Vec<Tensor>, GraphError> {
    let output = match op.op_type.as_str() {
        "ConstantFill" | "XavierFill" | "UniformFill" | "GaussianFill" | "MsraFill"
        | "GivenTensorFill" => {
            expect_inputs(op, inputs, 0)?;
            run_fill(op)?
        }
        "FC" => {
            expect_inputs(op, inputs, 3)?;
            fc(inputs[0], inputs[1], inputs[2])?
        }
        "Conv" => conv(op, inputs)?,
        "MaxPool" | "AveragePool" => {
            expect_inputs(op, inputs, 1)?;
            pool(op, inputs[0])?
        }
        "SpatialBN" => {
            expect_inputs(op, inputs, 5)?;
            spatial_bn(op, inputs)?
        }
        "Relu" => {
            expect_inputs(op, inputs, 1)?;
            unary(inputs[0], |x| x.max(0.0))?
        }
        "Sigmoid" => {
            expect_inputs(op, inputs, 1)?;
            unary(inputs[0], |x| 1.0 / (1.0 + (-x).exp()))?
        }
        "Tanh" => {
            expect_inputs(op, inputs, 1)?;
            unary(inputs[0], f32::tanh)?
        }
        "Softmax" => {
            expect_inputs(op, inputs, 1)?;
            softmax(inputs[0])?
        }
        "Transpose" => {
            expect_inputs(op, inputs, 1)?;
            transpose(op, inputs[0])?
        }
        "SquaredL2Distance" | "CosineSimilarity" | "DotProduct" => {
            expect_inputs(op, inputs, 2)?;
            pairwise(op, inputs[0], inputs[1])?
        }
        "Cast" => {
            expect_inputs(op, inputs, 1)?;
            let target = DataType::parse(op.require_str("to")?)?;
            inputs[0].cast(target)
        }
        "Add" | "Sub" | "Mul" | "Div" => {
            expect_inputs(op, inputs, 2)?;
            broadcast_binary(op, inputs[0], inputs[1])?
        }
        "MatMul" => {
            expect_inputs(op, inputs, 2)?;
            matmul(inputs[0], inputs[1])?
        }
        "Reshape" => {
            expect_inputs(op, inputs, 1)?;
            reshape(op, inputs[0])?
        }
        _ => {
            return Err(GraphError::UnsupportedOperator {
                op_type: op.op_type.clone(),
            })
        }
    };

    Ok(vec![output])
}

fn expect_inputs(op: &OperatorDef, inputs: &[&Tensor], expected: usize) -> Result<(), GraphError> {
    if inputs.len() != expected {
        return Err(GraphError::ArityMismatch {
            op: op.display_name(),
            expected: expected.to_string(),
            actual: inputs.len(),
        });
    }
    Ok(())
}

fn exec_error(op: &OperatorDef, reason: String) -> GraphError {
    GraphError::ExecutionFailed {
        op: op.display_name(),
        reason,
    }
}

// Fill operators

fn fill_shape(op: &OperatorDef) -> Result<Vec<usize>, GraphError> {
    let dims = op.require_ints("shape")?;
    dims.iter()
        .map(|&d| {
            usize::try_from(d).map_err(|_| GraphError::InvalidAttribute {
                op: op.display_name(),
                attr: "shape".to_string(),
                reason: format!("dimension {} is negative", d),
            })
        })
        .collect()
}

fn run_fill(op: &OperatorDef) -> Result<Tensor, GraphError> {
    let shape = fill_shape(op)?;
    let dtype = op.dtype_attr_or("dtype", DataType::Float32)?;
    let count: usize = shape.iter().product();

    match op.op_type.as_str() {
        "ConstantFill" => {
            let value = op
                .float_attr("value")
                .map(|v| v as f64)
                .or_else(|| op.int_attr("value").map(|v| v as f64))
                .unwrap_or(0.0);
            let data = match dtype {
                DataType::Float32 => TensorData::F32(vec![value as f32; count]),
                DataType::Float64 => TensorData::F64(vec![value; count]),
                DataType::Int32 => TensorData::I32(vec![value as i32; count]),
                DataType::Int64 => TensorData::I64(vec![value as i64; count]),
                DataType::Uint8 => TensorData::U8(vec![value as u8; count]),
            };
            Tensor::new(data, shape)
        }
        "GivenTensorFill" => {
            let bytes = op
                .attr("values")
                .and_then(|a| a.as_bytes())
                .ok_or_else(|| GraphError::MissingAttribute {
                    op: op.display_name(),
                    attr: "values".to_string(),
                })?;
            if bytes.len() != count * dtype.bytes_per_element() {
                return Err(GraphError::InvalidAttribute {
                    op: op.display_name(),
                    attr: "values".to_string(),
                    reason: format!(
                        "expected {} bytes for shape {:?} of {}, got {}",
                        count * dtype.bytes_per_element(),
                        shape,
                        dtype,
                        bytes.len()
                    ),
                });
            }
            Tensor::new(decode_le(bytes, dtype), shape)
        }
        "XavierFill" => {
            let fan_in = fan(count, &shape, 0);
            let scale = (3.0 / fan_in as f32).sqrt();
            random_uniform(op, shape, count, dtype, -scale, scale)
        }
        "MsraFill" => {
            let fan_in = fan(count, &shape, 0);
            let std = (2.0 / fan_in as f32).sqrt();
            random_normal(op, shape, count, dtype, 0.0, std)
        }
        "UniformFill" => {
            let min = op.float_attr_or("min", 0.0);
            let max = op.float_attr_or("max", 1.0);
            random_uniform(op, shape, count, dtype, min, max)
        }
        "GaussianFill" => {
            let mean = op.float_attr_or("mean", 0.0);
            let std = op.float_attr_or("std", 1.0);
            random_normal(op, shape, count, dtype, mean, std)
        }
        other => Err(GraphError::UnsupportedOperator {
            op_type: other.to_string(),
        }),
    }
}

/// Fan of a fill: elements per slice along `axis`, treating a scalar or
/// zero-extent shape as fan 1.
fn fan(count: usize, shape: &[usize], axis: usize) -> usize {
    match shape.get(axis) {
        Some(&leading) if leading > 0 => (count / leading).max(1),
        _ => count.max(1),
    }
}

fn require_float_fill(op: &OperatorDef, dtype: DataType) -> Result<(), GraphError> {
    if dtype != DataType::Float32 {
        return Err(exec_error(
            op,
            format!("random fills support float32 only, got {}", dtype),
        ));
    }
    Ok(())
}

fn random_uniform(
    op: &OperatorDef,
    shape: Vec<usize>,
    count: usize,
    dtype: DataType,
    min: f32,
    max: f32,
) -> Result<Tensor, GraphError> {
    require_float_fill(op, dtype)?;
    let mut rng = rand::thread_rng();
    let data = if max > min {
        (0..count).map(|_| rng.gen_range(min..max)).collect()
    } else {
        vec![min; count]
    };
    Tensor::from_f32(data, shape)
}

fn random_normal(
    op: &OperatorDef,
    shape: Vec<usize>,
    count: usize,
    dtype: DataType,
    mean: f32,
    std: f32,
) -> Result<Tensor, GraphError> {
    require_float_fill(op, dtype)?;
    let normal = Normal::new(mean, std)
        .map_err(|e| exec_error(op, format!("invalid normal distribution: {}", e)))?;
    let mut rng = rand::thread_rng();
    let data = (0..count).map(|_| normal.sample(&mut rng)).collect();
    Tensor::from_f32(data, shape)
}

fn decode_le(bytes: &[u8], dtype: DataType) -> TensorData {
    match dtype {
        DataType::Float32 => TensorData::F32(
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        DataType::Float64 => TensorData::F64(
            bytes
                .chunks_exact(8)
                .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .collect(),
        ),
        DataType::Int32 => TensorData::I32(
            bytes
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        DataType::Int64 => TensorData::I64(
            bytes
                .chunks_exact(8)
                .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .collect(),
        ),
        DataType::Uint8 => TensorData::U8(bytes.to_vec()),
    }
}

// Dense and convolutional layers

fn fc(x: &Tensor, w: &Tensor, b: &Tensor) -> Result<Tensor, GraphError> {
    let xs = x.as_f32()?;
    let ws = w.as_f32()?;
    let bs = b.as_f32()?;

    let shape = x.shape();
    if shape.len() < 2 || w.shape().len() != 2 {
        return Err(GraphError::ShapeInferenceFailed {
            reason: format!(
                "FC expects >= 2-D input and 2-D weight, got {:?} and {:?}",
                shape,
                w.shape()
            ),
        });
    }
    let batch = shape[0];
    let dim_in: usize = shape[1..].iter().product();
    let dim_out = w.shape()[0];
    if w.shape()[1] != dim_in || bs.len() != dim_out {
        return Err(GraphError::ShapeInferenceFailed {
            reason: format!(
                "FC weight {:?} / bias {:?} do not match input {:?}",
                w.shape(),
                b.shape(),
                shape
            ),
        });
    }

    let mut out = vec![0.0f32; batch * dim_out];
    for n in 0..batch {
        let row = &xs[n * dim_in..(n + 1) * dim_in];
        for o in 0..dim_out {
            let weights = &ws[o * dim_in..(o + 1) * dim_in];
            let mut acc = bs[o];
            for k in 0..dim_in {
                acc += row[k] * weights[k];
            }
            out[n * dim_out + o] = acc;
        }
    }
    Tensor::from_f32(out, vec![batch, dim_out])
}

fn conv(op: &OperatorDef, inputs: &[&Tensor]) -> Result<Tensor, GraphError> {
    if inputs.len() != 2 && inputs.len() != 3 {
        return Err(GraphError::ArityMismatch {
            op: op.display_name(),
            expected: "2 or 3".to_string(),
            actual: inputs.len(),
        });
    }
    let x = inputs[0];
    let w = inputs[1];
    let xs = x.as_f32()?;
    let ws = w.as_f32()?;
    let bias = match inputs.get(2) {
        Some(b) => Some(b.as_f32()?),
        None => None,
    };

    let (xd, wd) = (x.shape(), w.shape());
    if xd.len() != 4 || wd.len() != 4 || xd[1] != wd[1] {
        return Err(exec_error(
            op,
            format!("bad conv shapes: input {:?}, weight {:?}", xd, wd),
        ));
    }
    let (n, c, h, win) = (xd[0], xd[1], xd[2], xd[3]);
    let m = wd[0];
    let kernel = op.require_int("kernel")? as usize;
    let stride = op.int_attr_or("stride", 1) as usize;
    let pad = op.int_attr_or("pad", 0) as usize;

    let out_h = conv_output_dim(h as u32, kernel as u32, stride as u32, pad as u32, "Conv")? as usize;
    let out_w =
        conv_output_dim(win as u32, kernel as u32, stride as u32, pad as u32, "Conv")? as usize;

    let mut out = vec![0.0f32; n * m * out_h * out_w];
    for ni in 0..n {
        for mi in 0..m {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let mut acc = bias.map(|b| b[mi]).unwrap_or(0.0);
                    for ci in 0..c {
                        for kh in 0..kernel {
                            let ih = (oh * stride + kh) as isize - pad as isize;
                            if ih < 0 || ih >= h as isize {
                                continue;
                            }
                            for kw in 0..kernel {
                                let iw = (ow * stride + kw) as isize - pad as isize;
                                if iw < 0 || iw >= win as isize {
                                    continue;
                                }
                                let x_idx = ((ni * c + ci) * h + ih as usize) * win + iw as usize;
                                let w_idx = ((mi * c + ci) * kernel + kh) * kernel + kw;
                                acc += xs[x_idx] * ws[w_idx];
                            }
                        }
                    }
                    out[((ni * m + mi) * out_h + oh) * out_w + ow] = acc;
                }
            }
        }
    }
    Tensor::from_f32(out, vec![n, m, out_h, out_w])
}

fn pool(op: &OperatorDef, x: &Tensor) -> Result<Tensor, GraphError> {
    let xs = x.as_f32()?;
    let xd = x.shape();
    if xd.len() != 4 {
        return Err(exec_error(op, format!("pooling expects NCHW input, got {:?}", xd)));
    }
    let (n, c, h, w) = (xd[0], xd[1], xd[2], xd[3]);
    let kernel = op.require_int("kernel")? as usize;
    let stride = op.int_attr_or("stride", 1) as usize;
    let pad = op.int_attr_or("pad", 0) as usize;
    let average = op.op_type == "AveragePool";

    let out_h =
        conv_output_dim(h as u32, kernel as u32, stride as u32, pad as u32, &op.op_type)? as usize;
    let out_w =
        conv_output_dim(w as u32, kernel as u32, stride as u32, pad as u32, &op.op_type)? as usize;

    let mut out = vec![0.0f32; n * c * out_h * out_w];
    for ni in 0..n {
        for ci in 0..c {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let mut acc = if average { 0.0 } else { f32::NEG_INFINITY };
                    let mut seen = 0usize;
                    for kh in 0..kernel {
                        let ih = (oh * stride + kh) as isize - pad as isize;
                        if ih < 0 || ih >= h as isize {
                            continue;
                        }
                        for kw in 0..kernel {
                            let iw = (ow * stride + kw) as isize - pad as isize;
                            if iw < 0 || iw >= w as isize {
                                continue;
                            }
                            let v = xs[((ni * c + ci) * h + ih as usize) * w + iw as usize];
                            if average {
                                acc += v;
                            } else {
                                acc = acc.max(v);
                            }
                            seen += 1;
                        }
                    }
                    // padding regions are excluded from the average
                    let value = if average { acc / seen.max(1) as f32 } else { acc };
                    out[((ni * c + ci) * out_h + oh) * out_w + ow] = value;
                }
            }
        }
    }
    Tensor::from_f32(out, vec![n, c, out_h, out_w])
}

/// Inference-mode batch normalization: inputs are data, scale, bias,
/// estimated mean, and estimated variance, each parameter of shape [C].
fn spatial_bn(op: &OperatorDef, inputs: &[&Tensor]) -> Result<Tensor, GraphError> {
    let x = inputs[0];
    let xs = x.as_f32()?;
    let scale = inputs[1].as_f32()?;
    let bias = inputs[2].as_f32()?;
    let mean = inputs[3].as_f32()?;
    let var = inputs[4].as_f32()?;
    let eps = op.float_attr_or("epsilon", 1e-5);

    let xd = x.shape();
    if xd.len() != 4 {
        return Err(exec_error(op, format!("SpatialBN expects NCHW input, got {:?}", xd)));
    }
    let (n, c, h, w) = (xd[0], xd[1], xd[2], xd[3]);
    for (name, param) in [("scale", scale), ("bias", bias), ("mean", mean), ("var", var)] {
        if param.len() != c {
            return Err(exec_error(
                op,
                format!("SpatialBN {} has {} elements, expected {}", name, param.len(), c),
            ));
        }
    }

    let mut out = vec![0.0f32; xs.len()];
    let plane = h * w;
    for ni in 0..n {
        for ci in 0..c {
            let inv_std = 1.0 / (var[ci] + eps).sqrt();
            let base = (ni * c + ci) * plane;
            for i in 0..plane {
                out[base + i] = scale[ci] * (xs[base + i] - mean[ci]) * inv_std + bias[ci];
            }
        }
    }
    Tensor::from_f32(out, xd.to_vec())
}

// Elementwise and reduction kernels

fn unary(x: &Tensor, f: impl Fn(f32) -> f32) -> Result<Tensor, GraphError> {
    let xs = x.as_f32()?;
    Tensor::from_f32(xs.iter().map(|&v| f(v)).collect(), x.shape().to_vec())
}

/// Row-wise softmax with the leading axis as rows; a rank-1 input is a
/// single row.
fn softmax(x: &Tensor) -> Result<Tensor, GraphError> {
    let xs = x.as_f32()?;
    let shape = x.shape();
    let (rows, cols) = if shape.len() <= 1 {
        (1, xs.len())
    } else {
        (shape[0], shape[1..].iter().product())
    };

    let mut out = vec![0.0f32; xs.len()];
    for r in 0..rows {
        let row = &xs[r * cols..(r + 1) * cols];
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0f32;
        for (i, &v) in row.iter().enumerate() {
            let e = (v - max).exp();
            out[r * cols + i] = e;
            sum += e;
        }
        for v in &mut out[r * cols..(r + 1) * cols] {
            *v /= sum;
        }
    }
    Tensor::from_f32(out, shape.to_vec())
}

fn pairwise(op: &OperatorDef, x: &Tensor, y: &Tensor) -> Result<Tensor, GraphError> {
    let xs = x.as_f32()?;
    let ys = y.as_f32()?;
    if x.shape() != y.shape() {
        return Err(exec_error(
            op,
            format!("inputs must have identical shapes, got {:?} and {:?}", x.shape(), y.shape()),
        ));
    }
    if x.shape().is_empty() {
        return Err(exec_error(op, "rank >= 1 inputs required".to_string()));
    }

    let rows = x.shape()[0];
    let cols = if rows == 0 { 0 } else { xs.len() / rows };
    let mut out = vec![0.0f32; rows];
    for r in 0..rows {
        let a = &xs[r * cols..(r + 1) * cols];
        let b = &ys[r * cols..(r + 1) * cols];
        out[r] = match op.op_type.as_str() {
            "SquaredL2Distance" => {
                0.5 * a.iter().zip(b).map(|(&p, &q)| (p - q) * (p - q)).sum::<f32>()
            }
            "DotProduct" => a.iter().zip(b).map(|(&p, &q)| p * q).sum(),
            "CosineSimilarity" => {
                let dot: f32 = a.iter().zip(b).map(|(&p, &q)| p * q).sum();
                let norm_a = a.iter().map(|&p| p * p).sum::<f32>().sqrt();
                let norm_b = b.iter().map(|&q| q * q).sum::<f32>().sqrt();
                dot / (norm_a * norm_b).max(1e-12)
            }
            other => {
                return Err(GraphError::UnsupportedOperator {
                    op_type: other.to_string(),
                })
            }
        };
    }
    Tensor::from_f32(out, vec![rows])
}

// Layout kernels

fn transpose(op: &OperatorDef, x: &Tensor) -> Result<Tensor, GraphError> {
    let axes = transpose_axes(op, x.shape().len())?;
    let shape = x.shape();
    let (data, out_shape) = match x.data() {
        TensorData::F32(v) => {
            let (d, s) = permute(v, shape, &axes);
            (TensorData::F32(d), s)
        }
        TensorData::F64(v) => {
            let (d, s) = permute(v, shape, &axes);
            (TensorData::F64(d), s)
        }
        TensorData::I32(v) => {
            let (d, s) = permute(v, shape, &axes);
            (TensorData::I32(d), s)
        }
        TensorData::I64(v) => {
            let (d, s) = permute(v, shape, &axes);
            (TensorData::I64(d), s)
        }
        TensorData::U8(v) => {
            let (d, s) = permute(v, shape, &axes);
            (TensorData::U8(d), s)
        }
    };
    Tensor::new(data, out_shape)
}

/// Copy `data` into the layout produced by permuting `shape` with `axes`.
fn permute<T: Copy>(data: &[T], shape: &[usize], axes: &[usize]) -> (Vec<T>, Vec<usize>) {
    let rank = shape.len();
    let out_shape: Vec<usize> = axes.iter().map(|&a| shape[a]).collect();

    let mut in_strides = vec![1usize; rank];
    for i in (0..rank.saturating_sub(1)).rev() {
        in_strides[i] = in_strides[i + 1] * shape[i + 1];
    }

    let mut out = Vec::with_capacity(data.len());
    let mut index = vec![0usize; rank];
    for _ in 0..data.len() {
        let mut offset = 0;
        for k in 0..rank {
            offset += index[k] * in_strides[axes[k]];
        }
        out.push(data[offset]);
        for k in (0..rank).rev() {
            index[k] += 1;
            if index[k] < out_shape[k] {
                break;
            }
            index[k] = 0;
        }
    }
    (out, out_shape)
}

fn reshape(op: &OperatorDef, x: &Tensor) -> Result<Tensor, GraphError> {
    let target = fill_shape(op)?;
    let input_u32: Vec<u32> = x.shape().iter().map(|&d| d as u32).collect();
    let target_u32: Vec<u32> = target.iter().map(|&d| d as u32).collect();
    validate_reshape(&input_u32, &target_u32)?;
    x.reshaped(target)
}

// Arithmetic kernels

fn broadcast_binary(op: &OperatorDef, a: &Tensor, b: &Tensor) -> Result<Tensor, GraphError> {
    let f: fn(f32, f32) -> f32 = match op.op_type.as_str() {
        "Add" => |x, y| x + y,
        "Sub" => |x, y| x - y,
        "Mul" => |x, y| x * y,
        "Div" => |x, y| x / y,
        other => {
            return Err(GraphError::UnsupportedOperator {
                op_type: other.to_string(),
            })
        }
    };

    let av = a.as_f32()?;
    let bv = b.as_f32()?;
    let a_u32: Vec<u32> = a.shape().iter().map(|&d| d as u32).collect();
    let b_u32: Vec<u32> = b.shape().iter().map(|&d| d as u32).collect();
    let out_shape: Vec<usize> = broadcast_shapes(&a_u32, &b_u32)?
        .iter()
        .map(|&d| d as usize)
        .collect();

    let rank = out_shape.len();
    let a_strides = broadcast_strides(a.shape(), rank);
    let b_strides = broadcast_strides(b.shape(), rank);

    let count: usize = out_shape.iter().product();
    let mut out = Vec::with_capacity(count);
    let mut index = vec![0usize; rank];
    for _ in 0..count {
        let mut a_off = 0;
        let mut b_off = 0;
        for k in 0..rank {
            a_off += index[k] * a_strides[k];
            b_off += index[k] * b_strides[k];
        }
        out.push(f(av[a_off], bv[b_off]));
        for k in (0..rank).rev() {
            index[k] += 1;
            if index[k] < out_shape[k] {
                break;
            }
            index[k] = 0;
        }
    }
    Tensor::from_f32(out, out_shape)
}

/// Right-aligned strides for an operand broadcast to `out_rank`; size-1
/// and missing dimensions get stride 0.
fn broadcast_strides(shape: &[usize], out_rank: usize) -> Vec<usize> {
    let mut strides = vec![0usize; out_rank];
    let mut stride = 1usize;
    for (i, &dim) in shape.iter().enumerate().rev() {
        let out_i = out_rank - (shape.len() - i);
        strides[out_i] = if dim == 1 { 0 } else { stride };
        stride *= dim;
    }
    strides
}

fn matmul(a: &Tensor, b: &Tensor) -> Result<Tensor, GraphError> {
    let av = a.as_f32()?;
    let bv = b.as_f32()?;
    let (ad, bd) = (a.shape(), b.shape());
    if ad.len() != 2 || bd.len() != 2 || ad[1] != bd[0] {
        return Err(GraphError::ShapeInferenceFailed {
            reason: format!(
                "MatMul reference kernel requires 2-D operands [M, K] x [K, N], got {:?} and {:?}",
                ad, bd
            ),
        });
    }
    let (m, k, n) = (ad[0], ad[1], bd[1]);
    let mut out = vec![0.0f32; m * n];
    for i in 0..m {
        for j in 0..n {
            let mut acc = 0.0f32;
            for p in 0..k {
                acc += av[i * k + p] * bv[p * n + j];
            }
            out[i * n + j] = acc;
        }
    }
    Tensor::from_f32(out, vec![m, n])
}
