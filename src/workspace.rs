//! The workspace: an owned container for runtime blobs and created nets.
//!
//! The workspace is the single mutable execution context a caller drives:
//! feed named tensors, run nets over them, and fetch the results back out.
//! It also seeds shape/type inference with the shapes of whatever blobs it
//! currently holds.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::GraphError;
use crate::executors::cpu;
use crate::graph::{DataType, NetDef};
use crate::shape_inference::{self, InferenceResult};
use crate::tensor::Tensor;

#[derive(Debug, Default)]
pub struct Workspace {
    blobs: HashMap<String, Tensor>,
    nets: HashMap<String, NetDef>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a named tensor.
    pub fn feed_blob(&mut self, name: &str, tensor: Tensor) {
        debug!(blob = name, shape = ?tensor.shape(), dtype = %tensor.dtype(), "feeding blob");
        self.blobs.insert(name.to_string(), tensor);
    }

    pub fn fetch_blob(&self, name: &str) -> Result<&Tensor, GraphError> {
        self.blobs.get(name).ok_or_else(|| GraphError::BlobMissing {
            name: name.to_string(),
        })
    }

    pub fn has_blob(&self, name: &str) -> bool {
        self.blobs.contains_key(name)
    }

    /// All blob names currently present, sorted for deterministic iteration.
    pub fn blobs(&self) -> Vec<String> {
        let mut names: Vec<String> = self.blobs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Register a net under its own name for repeated runs.
    pub fn create_net(&mut self, net: NetDef) {
        debug!(net = %net.name, ops = net.ops.len(), "creating net");
        self.nets.insert(net.name.clone(), net);
    }

    /// Run a previously created net by name.
    pub fn run_net(&mut self, name: &str) -> Result<(), GraphError> {
        let net = self
            .nets
            .get(name)
            .cloned()
            .ok_or_else(|| GraphError::NetMissing {
                name: name.to_string(),
            })?;
        self.run_net_once(&net)
    }

    /// Validate and execute every operator of `net` in order, materializing
    /// each output blob into the workspace.
    pub fn run_net_once(&mut self, net: &NetDef) -> Result<(), GraphError> {
        let preexisting: HashSet<String> = self.blobs.keys().cloned().collect();
        net.validate(&preexisting)?;

        for op in &net.ops {
            debug!(net = %net.name, op = %op.display_name(), "running operator");
            let inputs = op
                .inputs
                .iter()
                .map(|name| self.fetch_blob(name))
                .collect::<Result<Vec<_>, _>>()?;
            let outputs = cpu::run_operator(op, &inputs)?;
            if outputs.len() != op.outputs.len() {
                return Err(GraphError::ExecutionFailed {
                    op: op.display_name(),
                    reason: format!(
                        "operator produced {} output(s) for {} declared name(s)",
                        outputs.len(),
                        op.outputs.len()
                    ),
                });
            }
            for (name, tensor) in op.outputs.iter().zip(outputs) {
                self.blobs.insert(name.clone(), tensor);
            }
        }
        Ok(())
    }

    /// Drop all blobs and created nets.
    pub fn reset(&mut self) {
        self.blobs.clear();
        self.nets.clear();
    }

    /// Statically infer the shape and type of every blob the given nets
    /// produce, seeded with the shapes/types of the blobs currently in the
    /// workspace plus the optional caller-supplied input shapes (hinted
    /// inputs default to float32).
    pub fn infer_shapes_and_types(
        &self,
        nets: &[&NetDef],
        known: Option<&HashMap<String, Vec<u32>>>,
    ) -> Result<InferenceResult, GraphError> {
        let mut seed_shapes: HashMap<String, Vec<u32>> = HashMap::new();
        let mut seed_types: HashMap<String, DataType> = HashMap::new();

        for (name, tensor) in &self.blobs {
            let shape: Vec<u32> = tensor.shape().iter().map(|&d| d as u32).collect();
            seed_shapes.insert(name.clone(), shape);
            seed_types.insert(name.clone(), tensor.dtype());
        }
        if let Some(known) = known {
            for (name, shape) in known {
                seed_shapes.insert(name.clone(), shape.clone());
                seed_types.entry(name.clone()).or_insert(DataType::Float32);
            }
        }

        shape_inference::infer_shapes_and_types(nets, &seed_shapes, &seed_types)
    }
}
