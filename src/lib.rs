pub mod error;
pub mod executors;
pub mod graph;
pub mod model;
pub mod shape_inference;
pub mod tensor;
pub mod workspace;
#[cfg(feature = "python")]
pub mod python;

pub use error::GraphError;
pub use graph::{AttrValue, DataType, NetDef, OperatorDef, TensorDescriptor};
pub use model::ModelBuilder;
pub use shape_inference::{broadcast_shapes, infer_matmul_shape, infer_shapes_and_types, InferenceResult};
pub use tensor::{Tensor, TensorData};
pub use workspace::Workspace;
