//! Python bindings for the workspace and model builder.
//!
//! PyO3 macros generate unsafe code that triggers unsafe_op_in_unsafe_fn
//! warnings. This is expected behavior from the macro-generated code.
#![allow(unsafe_op_in_unsafe_fn)]

use std::collections::HashMap;

use pyo3::exceptions::{PyKeyError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::error::GraphError;
use crate::graph::DataType;
use crate::model::ModelBuilder;
use crate::tensor::Tensor;
use crate::workspace::Workspace;

fn runtime_err(err: GraphError) -> PyErr {
    PyRuntimeError::new_err(err.to_string())
}

/// Builder for two-net models (parameter initialization + computation)
#[pyclass(name = "ModelBuilder")]
pub struct PyModelBuilder {
    inner: ModelBuilder,
}

#[pymethods]
impl PyModelBuilder {
    #[new]
    fn new(name: &str) -> Self {
        Self {
            inner: ModelBuilder::new(name),
        }
    }

    /// Fully-connected layer
    ///
    /// Args:
    ///     input: Name of the input blob
    ///     output: Name of the output blob
    ///     dim_in: Flattened input dimension
    ///     dim_out: Output dimension
    fn fc(&mut self, input: &str, output: &str, dim_in: usize, dim_out: usize) {
        self.inner.fc(input, output, dim_in, dim_out);
    }

    /// NCHW convolution with a square kernel
    #[pyo3(signature = (input, output, in_channels, out_channels, kernel, stride=1, pad=0))]
    #[allow(clippy::too_many_arguments)]
    fn conv(
        &mut self,
        input: &str,
        output: &str,
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        pad: usize,
    ) {
        self.inner
            .conv(input, output, in_channels, out_channels, kernel, stride, pad);
    }

    /// Inference-mode spatial batch normalization
    #[pyo3(signature = (input, output, channels, epsilon=1e-5))]
    fn spatial_bn(&mut self, input: &str, output: &str, channels: usize, epsilon: f32) {
        self.inner.spatial_bn(input, output, channels, epsilon);
    }

    fn relu(&mut self, input: &str, output: &str) {
        self.inner.relu(input, output);
    }

    fn sigmoid(&mut self, input: &str, output: &str) {
        self.inner.sigmoid(input, output);
    }

    fn softmax(&mut self, input: &str, output: &str) {
        self.inner.softmax(input, output);
    }

    fn max_pool(&mut self, input: &str, output: &str, kernel: usize, stride: usize) {
        self.inner.max_pool(input, output, kernel, stride);
    }

    /// Transpose; omitting axes reverses all dimensions
    #[pyo3(signature = (input, output, axes=None))]
    fn transpose(&mut self, input: &str, output: &str, axes: Option<Vec<usize>>) {
        self.inner.transpose(input, output, axes.as_deref());
    }

    fn squared_l2_distance(&mut self, x: &str, y: &str, output: &str) {
        self.inner.squared_l2_distance(x, y, output);
    }

    fn cosine_similarity(&mut self, x: &str, y: &str, output: &str) {
        self.inner.cosine_similarity(x, y, output);
    }

    fn dot_product(&mut self, x: &str, y: &str, output: &str) {
        self.inner.dot_product(x, y, output);
    }

    /// Serialized JSON of both nets, for inspection
    fn to_json(&self) -> PyResult<(String, String)> {
        let init = serde_json::to_string(self.inner.param_init_net())
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        let net = serde_json::to_string(self.inner.net())
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        Ok((init, net))
    }
}

/// Container for runtime blobs and created nets
#[pyclass(name = "Workspace")]
pub struct PyWorkspace {
    inner: Workspace,
}

#[pymethods]
impl PyWorkspace {
    #[new]
    fn new() -> Self {
        Self {
            inner: Workspace::new(),
        }
    }

    /// Feed a float32 tensor given as flat data plus shape
    fn feed_blob(&mut self, name: &str, data: Vec<f32>, shape: Vec<usize>) -> PyResult<()> {
        let tensor = Tensor::from_f32(data, shape).map_err(runtime_err)?;
        self.inner.feed_blob(name, tensor);
        Ok(())
    }

    /// Run a model's parameter-initialization net, create its main net,
    /// and run it once
    fn run_model(&mut self, model: &PyModelBuilder) -> PyResult<()> {
        self.inner
            .run_net_once(model.inner.param_init_net())
            .map_err(runtime_err)?;
        self.inner.create_net(model.inner.net().clone());
        self.inner.run_net(model.inner.name()).map_err(runtime_err)
    }

    /// All blob names currently present
    fn blobs(&self) -> Vec<String> {
        self.inner.blobs()
    }

    /// Fetch a blob as (flat float data, shape, dtype string)
    fn fetch_blob(&self, name: &str) -> PyResult<(Vec<f64>, Vec<usize>, String)> {
        let tensor = self
            .inner
            .fetch_blob(name)
            .map_err(|e| PyKeyError::new_err(e.to_string()))?;
        Ok((
            tensor.to_f64_vec(),
            tensor.shape().to_vec(),
            tensor.dtype().to_string(),
        ))
    }

    /// Infer shapes and types for a model's nets
    ///
    /// Returns:
    ///     Tuple of two dicts: blob name -> shape list, blob name -> dtype string
    #[pyo3(signature = (model, known=None))]
    fn infer_shapes_and_types<'py>(
        &self,
        py: Python<'py>,
        model: &PyModelBuilder,
        known: Option<HashMap<String, Vec<u32>>>,
    ) -> PyResult<(Bound<'py, PyDict>, Bound<'py, PyDict>)> {
        let result = self
            .inner
            .infer_shapes_and_types(
                &[model.inner.param_init_net(), model.inner.net()],
                known.as_ref(),
            )
            .map_err(runtime_err)?;

        let shapes = PyDict::new_bound(py);
        for (name, shape) in &result.shapes {
            shapes.set_item(name, shape.clone())?;
        }
        let types = PyDict::new_bound(py);
        for (name, dtype) in &result.types {
            types.set_item(name, dtype.to_string())?;
        }
        Ok((shapes, types))
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

/// Parse a dtype string such as "float32"
#[pyfunction]
fn parse_data_type(name: &str) -> PyResult<String> {
    DataType::parse(name)
        .map(|d| d.to_string())
        .map_err(|e| PyValueError::new_err(e.to_string()))
}

#[pymodule]
fn _shapeflow(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyModelBuilder>()?;
    m.add_class::<PyWorkspace>()?;
    m.add_function(wrap_pyfunction!(parse_data_type, m)?)?;
    Ok(())
}
