//! High-level model construction helpers.
//!
//! A `ModelBuilder` owns two nets: a parameter-initialization net that
//! fills weights and statistics, and the main computation net. Layer
//! helpers append to both at once, so the pair can be handed straight to
//! inference and to the workspace.

use std::collections::HashSet;

use crate::graph::{DataType, NetDef, OperatorDef};

pub struct ModelBuilder {
    param_init_net: NetDef,
    net: NetDef,
    net_produced: HashSet<String>,
}

impl ModelBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            param_init_net: NetDef::new(&format!("{}_init", name)),
            net: NetDef::new(name),
            net_produced: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.net.name
    }

    pub fn param_init_net(&self) -> &NetDef {
        &self.param_init_net
    }

    pub fn net(&self) -> &NetDef {
        &self.net
    }

    fn add_init_op(&mut self, op: OperatorDef) {
        self.param_init_net.add_op(op);
    }

    /// Append an operator to the main net, registering any input the net
    /// has not produced itself as an external input (fed data or an
    /// init-net parameter).
    fn add_op(&mut self, op: OperatorDef) {
        for input in &op.inputs {
            if !self.net_produced.contains(input) {
                self.net.add_external_input(input);
            }
        }
        for output in &op.outputs {
            self.net_produced.insert(output.clone());
        }
        self.net.add_op(op);
    }

    // Layers with parameters

    /// Fully-connected layer: weight `[dim_out, dim_in]` (Xavier) and bias
    /// `[dim_out]` (zeros), named `{output}_w` / `{output}_b`.
    pub fn fc(&mut self, input: &str, output: &str, dim_in: usize, dim_out: usize) -> &mut Self {
        let w = format!("{}_w", output);
        let b = format!("{}_b", output);
        self.add_init_op(
            OperatorDef::new("XavierFill", &[], &[w.as_str()])
                .with_attr("shape", vec![dim_out as i64, dim_in as i64]),
        );
        self.add_init_op(
            OperatorDef::new("ConstantFill", &[], &[b.as_str()]).with_attr("shape", vec![dim_out as i64]),
        );
        self.add_op(OperatorDef::new("FC", &[input, w.as_str(), b.as_str()], &[output]));
        self
    }

    /// NCHW convolution with square kernel; weight `[out, in, k, k]`
    /// (Kaiming-normal) and bias `[out]`.
    #[allow(clippy::too_many_arguments)]
    pub fn conv(
        &mut self,
        input: &str,
        output: &str,
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        pad: usize,
    ) -> &mut Self {
        let w = format!("{}_w", output);
        let b = format!("{}_b", output);
        self.add_init_op(OperatorDef::new("MsraFill", &[], &[w.as_str()]).with_attr(
            "shape",
            vec![
                out_channels as i64,
                in_channels as i64,
                kernel as i64,
                kernel as i64,
            ],
        ));
        self.add_init_op(
            OperatorDef::new("ConstantFill", &[], &[b.as_str()])
                .with_attr("shape", vec![out_channels as i64]),
        );
        self.add_op(
            OperatorDef::new("Conv", &[input, w.as_str(), b.as_str()], &[output])
                .with_attr("kernel", kernel as i64)
                .with_attr("stride", stride as i64)
                .with_attr("pad", pad as i64),
        );
        self
    }

    /// Inference-mode spatial batch normalization over `channels`.
    /// Parameters are `{output}_s`, `{output}_b`, `{output}_rm`,
    /// `{output}_rv`, initialized to the identity transform.
    pub fn spatial_bn(
        &mut self,
        input: &str,
        output: &str,
        channels: usize,
        epsilon: f32,
    ) -> &mut Self {
        let scale = format!("{}_s", output);
        let bias = format!("{}_b", output);
        let mean = format!("{}_rm", output);
        let var = format!("{}_rv", output);
        let shape = vec![channels as i64];
        self.add_init_op(
            OperatorDef::new("ConstantFill", &[], &[scale.as_str()])
                .with_attr("shape", shape.clone())
                .with_attr("value", 1.0f32),
        );
        self.add_init_op(
            OperatorDef::new("ConstantFill", &[], &[bias.as_str()]).with_attr("shape", shape.clone()),
        );
        self.add_init_op(
            OperatorDef::new("ConstantFill", &[], &[mean.as_str()]).with_attr("shape", shape.clone()),
        );
        self.add_init_op(
            OperatorDef::new("ConstantFill", &[], &[var.as_str()])
                .with_attr("shape", shape)
                .with_attr("value", 1.0f32),
        );
        self.add_op(
            OperatorDef::new("SpatialBN", &[input, scale.as_str(), bias.as_str(), mean.as_str(), var.as_str()], &[output])
                .with_attr("epsilon", epsilon),
        );
        self
    }

    // Activations and pooling

    pub fn relu(&mut self, input: &str, output: &str) -> &mut Self {
        self.add_op(OperatorDef::new("Relu", &[input], &[output]));
        self
    }

    pub fn sigmoid(&mut self, input: &str, output: &str) -> &mut Self {
        self.add_op(OperatorDef::new("Sigmoid", &[input], &[output]));
        self
    }

    pub fn tanh(&mut self, input: &str, output: &str) -> &mut Self {
        self.add_op(OperatorDef::new("Tanh", &[input], &[output]));
        self
    }

    pub fn softmax(&mut self, input: &str, output: &str) -> &mut Self {
        self.add_op(OperatorDef::new("Softmax", &[input], &[output]));
        self
    }

    pub fn max_pool(&mut self, input: &str, output: &str, kernel: usize, stride: usize) -> &mut Self {
        self.add_op(
            OperatorDef::new("MaxPool", &[input], &[output])
                .with_attr("kernel", kernel as i64)
                .with_attr("stride", stride as i64),
        );
        self
    }

    pub fn average_pool(
        &mut self,
        input: &str,
        output: &str,
        kernel: usize,
        stride: usize,
    ) -> &mut Self {
        self.add_op(
            OperatorDef::new("AveragePool", &[input], &[output])
                .with_attr("kernel", kernel as i64)
                .with_attr("stride", stride as i64),
        );
        self
    }

    // Layout and type operators

    /// Transpose; `None` axes reverses all dimensions.
    pub fn transpose(&mut self, input: &str, output: &str, axes: Option<&[usize]>) -> &mut Self {
        let mut op = OperatorDef::new("Transpose", &[input], &[output]);
        if let Some(axes) = axes {
            op = op.with_attr("axes", axes.iter().map(|&a| a as i64).collect::<Vec<i64>>());
        }
        self.add_op(op);
        self
    }

    pub fn cast(&mut self, input: &str, output: &str, to: DataType) -> &mut Self {
        self.add_op(OperatorDef::new("Cast", &[input], &[output]).with_attr("to", to.as_str()));
        self
    }

    pub fn reshape(&mut self, input: &str, output: &str, shape: &[usize]) -> &mut Self {
        self.add_op(
            OperatorDef::new("Reshape", &[input], &[output])
                .with_attr("shape", shape.iter().map(|&d| d as i64).collect::<Vec<i64>>()),
        );
        self
    }

    // Pairwise metrics

    pub fn squared_l2_distance(&mut self, x: &str, y: &str, output: &str) -> &mut Self {
        self.add_op(OperatorDef::new("SquaredL2Distance", &[x, y], &[output]));
        self
    }

    pub fn cosine_similarity(&mut self, x: &str, y: &str, output: &str) -> &mut Self {
        self.add_op(OperatorDef::new("CosineSimilarity", &[x, y], &[output]));
        self
    }

    pub fn dot_product(&mut self, x: &str, y: &str, output: &str) -> &mut Self {
        self.add_op(OperatorDef::new("DotProduct", &[x, y], &[output]));
        self
    }

    // Elementwise arithmetic

    pub fn add(&mut self, a: &str, b: &str, output: &str) -> &mut Self {
        self.add_op(OperatorDef::new("Add", &[a, b], &[output]));
        self
    }

    pub fn sub(&mut self, a: &str, b: &str, output: &str) -> &mut Self {
        self.add_op(OperatorDef::new("Sub", &[a, b], &[output]));
        self
    }

    pub fn mul(&mut self, a: &str, b: &str, output: &str) -> &mut Self {
        self.add_op(OperatorDef::new("Mul", &[a, b], &[output]));
        self
    }

    pub fn div(&mut self, a: &str, b: &str, output: &str) -> &mut Self {
        self.add_op(OperatorDef::new("Div", &[a, b], &[output]));
        self
    }

    pub fn matmul(&mut self, a: &str, b: &str, output: &str) -> &mut Self {
        self.add_op(OperatorDef::new("MatMul", &[a, b], &[output]));
        self
    }

    // Standalone fills (parameter-initialization net)

    pub fn constant_fill(
        &mut self,
        output: &str,
        shape: &[usize],
        value: f32,
        dtype: DataType,
    ) -> &mut Self {
        self.add_init_op(
            OperatorDef::new("ConstantFill", &[], &[output])
                .with_attr("shape", shape.iter().map(|&d| d as i64).collect::<Vec<i64>>())
                .with_attr("value", value)
                .with_attr("dtype", dtype.as_str()),
        );
        self
    }

    pub fn given_tensor_fill(&mut self, output: &str, shape: &[usize], values: &[f32]) -> &mut Self {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.add_init_op(
            OperatorDef::new("GivenTensorFill", &[], &[output])
                .with_attr("shape", shape.iter().map(|&d| d as i64).collect::<Vec<i64>>())
                .with_attr("values", bytes),
        );
        self
    }

    pub fn uniform_fill(&mut self, output: &str, shape: &[usize], min: f32, max: f32) -> &mut Self {
        self.add_init_op(
            OperatorDef::new("UniformFill", &[], &[output])
                .with_attr("shape", shape.iter().map(|&d| d as i64).collect::<Vec<i64>>())
                .with_attr("min", min)
                .with_attr("max", max),
        );
        self
    }

    pub fn gaussian_fill(&mut self, output: &str, shape: &[usize], mean: f32, std: f32) -> &mut Self {
        self.add_init_op(
            OperatorDef::new("GaussianFill", &[], &[output])
                .with_attr("shape", shape.iter().map(|&d| d as i64).collect::<Vec<i64>>())
                .with_attr("mean", mean)
                .with_attr("std", std),
        );
        self
    }
}
