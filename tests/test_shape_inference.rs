//! Shape/type inference comparison tests
//!
//! Each scenario builds a small model, statically infers the shape and
//! type of every intermediate blob, executes the same nets inside a
//! workspace, and then checks the inferred values against the observed
//! runtime values blob-for-blob.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;

use shapeflow::graph::DataType;
use shapeflow::model::ModelBuilder;
use shapeflow::tensor::Tensor;
use shapeflow::workspace::Workspace;
use shapeflow::GraphError;

/// Float32 tensor of the given shape filled with uniform random values.
fn random_tensor(shape: &[usize]) -> Tensor {
    let count: usize = shape.iter().product();
    let mut rng = rand::thread_rng();
    let data = (0..count).map(|_| rng.gen::<f32>()).collect();
    Tensor::from_f32(data, shape.to_vec()).expect("random tensor shape mismatch")
}

/// Runs shape inference, then the model itself, and checks that the
/// inferred shapes and types agree with the observed ones.
fn infer_run_and_compare(model: &ModelBuilder, ws: &mut Workspace) {
    let inferred = ws
        .infer_shapes_and_types(&[model.param_init_net(), model.net()], None)
        .expect("shape inference failed");

    ws.run_net_once(model.param_init_net())
        .expect("param init net failed");
    ws.create_net(model.net().clone());
    ws.run_net(model.name()).expect("net execution failed");

    for name in ws.blobs() {
        let tensor = ws.fetch_blob(&name).expect("blob vanished after run");
        let observed: Vec<i64> = tensor.shape().iter().map(|&d| d as i64).collect();

        let shape = inferred
            .shapes
            .get(&name)
            .unwrap_or_else(|| panic!("Shape for {} not defined", name));
        let coerced: Vec<i64> = shape.iter().map(|&d| d as i64).collect();
        assert_eq!(
            coerced,
            observed,
            "Shape {} mismatch: {:?} vs. {:?}",
            name,
            shape,
            tensor.shape()
        );

        let dtype = inferred
            .types
            .get(&name)
            .unwrap_or_else(|| panic!("Type for {} not defined", name));
        assert_eq!(
            *dtype,
            tensor.dtype(),
            "Type {} mismatch: {} vs. {}",
            name,
            dtype,
            tensor.dtype()
        );
    }
}

// ============================================================================
// Scenario: two fully-connected layers, shapes checked against known values
// ============================================================================

#[test]
fn test_shape_inference_simple_fc() {
    let mut model = ModelBuilder::new("fc_test");
    model.fc("data", "fc1", 96, 32).fc("fc1", "fc2", 32, 55);

    let ws = Workspace::new();
    let mut known = HashMap::new();
    known.insert("data".to_string(), vec![64u32, 96]);
    let inferred = ws
        .infer_shapes_and_types(&[model.param_init_net(), model.net()], Some(&known))
        .expect("shape inference failed");

    assert_eq!(inferred.shapes["data"], vec![64, 96]);
    assert_eq!(inferred.shapes["fc1_w"], vec![32, 96]);
    assert_eq!(inferred.shapes["fc1_b"], vec![32]);
    assert_eq!(inferred.shapes["fc1"], vec![64, 32]);
    assert_eq!(inferred.shapes["fc2_w"], vec![55, 32]);
    assert_eq!(inferred.shapes["fc2_b"], vec![55]);
    assert_eq!(inferred.shapes["fc2"], vec![64, 55]);

    for blob in ["data", "fc1_w", "fc1_b", "fc1", "fc2_w", "fc2_b", "fc2"] {
        assert_eq!(inferred.types[blob], DataType::Float32, "type of {}", blob);
    }
}

#[test]
fn test_shape_inference_simple_fc_executes() {
    let mut model = ModelBuilder::new("fc_exec_test");
    model.fc("data", "fc1", 96, 32).fc("fc1", "fc2", 32, 55);

    let mut ws = Workspace::new();
    ws.feed_blob("data", random_tensor(&[64, 96]));
    infer_run_and_compare(&model, &mut ws);
}

// ============================================================================
// Scenario: pairwise distance metrics over fed vectors
// ============================================================================

#[test]
fn test_shape_inference_distances() {
    let mut model = ModelBuilder::new("distance_test");
    model
        .squared_l2_distance("x", "y", "zsq")
        .cosine_similarity("x", "y", "zcos")
        .dot_product("x", "y", "zdot");

    let mut ws = Workspace::new();
    ws.feed_blob("x", random_tensor(&[10]));
    ws.feed_blob("y", random_tensor(&[10]));
    infer_run_and_compare(&model, &mut ws);
}

#[test]
fn test_shape_inference_distances_batched() {
    let mut model = ModelBuilder::new("distance_batched_test");
    model
        .squared_l2_distance("x", "y", "zsq")
        .cosine_similarity("x", "y", "zcos")
        .dot_product("x", "y", "zdot");

    let mut ws = Workspace::new();
    ws.feed_blob("x", random_tensor(&[6, 8]));
    ws.feed_blob("y", random_tensor(&[6, 8]));
    infer_run_and_compare(&model, &mut ws);

    let inferred = ws
        .infer_shapes_and_types(&[model.param_init_net(), model.net()], None)
        .expect("shape inference failed");
    assert_eq!(inferred.shapes["zsq"], vec![6]);
}

// ============================================================================
// Scenario: convolutional stack
// ============================================================================

#[test]
fn test_shape_inference_conv_net() {
    let mut model = ModelBuilder::new("convtest");
    model
        .conv("data", "conv1", 3, 8, 7, 2, 3)
        .spatial_bn("conv1", "conv1_spatbn_relu", 8, 1e-3)
        .relu("conv1_spatbn_relu", "conv1_spatbn_relu")
        .max_pool("conv1_spatbn_relu", "pool1", 3, 2)
        .fc("pool1", "fc", 8 * 7 * 7, 100)
        .sigmoid("fc", "fc_sigm")
        .softmax("fc_sigm", "softmax");

    let mut ws = Workspace::new();
    ws.feed_blob("data", random_tensor(&[2, 3, 32, 32]));
    infer_run_and_compare(&model, &mut ws);

    // spot-check the spatial arithmetic: 32 -> 16 after the strided conv,
    // 16 -> 7 after the 3x3/2 pool
    let inferred = ws
        .infer_shapes_and_types(&[model.param_init_net(), model.net()], None)
        .expect("shape inference failed");
    assert_eq!(inferred.shapes["conv1"], vec![2, 8, 16, 16]);
    assert_eq!(inferred.shapes["pool1"], vec![2, 8, 7, 7]);
    assert_eq!(inferred.shapes["softmax"], vec![2, 100]);
}

// ============================================================================
// Scenario: transpose with and without explicit axes
// ============================================================================

#[test]
fn test_shape_inference_transpose_reversed() {
    let mut model = ModelBuilder::new("transpose_test");
    model.transpose("tensor", "transpose", None);

    let mut ws = Workspace::new();
    ws.feed_blob("tensor", random_tensor(&[4, 2, 3, 3, 5]));
    infer_run_and_compare(&model, &mut ws);

    let inferred = ws
        .infer_shapes_and_types(&[model.param_init_net(), model.net()], None)
        .expect("shape inference failed");
    assert_eq!(inferred.shapes["transpose"], vec![5, 3, 3, 2, 4]);
}

#[test]
fn test_shape_inference_transpose_random_permutation() {
    let mut axes: Vec<usize> = (0..5).collect();
    axes.shuffle(&mut rand::thread_rng());

    let mut model = ModelBuilder::new("transpose_perm_test");
    model.transpose("tensor", "transpose", Some(&axes));

    let shape = [4usize, 2, 3, 3, 5];
    let mut ws = Workspace::new();
    ws.feed_blob("tensor", random_tensor(&shape));
    infer_run_and_compare(&model, &mut ws);

    let inferred = ws
        .infer_shapes_and_types(&[model.param_init_net(), model.net()], None)
        .expect("shape inference failed");
    let expected: Vec<u32> = axes.iter().map(|&a| shape[a] as u32).collect();
    assert_eq!(inferred.shapes["transpose"], expected, "axes {:?}", axes);
}

// ============================================================================
// Scenario: non-float32 blob types
// ============================================================================

#[test]
fn test_shape_inference_mixed_types() {
    let mut model = ModelBuilder::new("types_test");
    model
        .constant_fill("longs", &[3, 2], 7.0, DataType::Int64)
        .constant_fill("doubles", &[4], 0.5, DataType::Float64)
        .cast("longs", "ints", DataType::Int32)
        .cast("doubles", "floats", DataType::Float32);

    let mut ws = Workspace::new();
    infer_run_and_compare(&model, &mut ws);

    assert_eq!(ws.fetch_blob("longs").unwrap().dtype(), DataType::Int64);
    assert_eq!(ws.fetch_blob("doubles").unwrap().dtype(), DataType::Float64);
    assert_eq!(ws.fetch_blob("ints").unwrap().dtype(), DataType::Int32);
    assert_eq!(ws.fetch_blob("floats").unwrap().dtype(), DataType::Float32);
}

// ============================================================================
// Scenario: elementwise arithmetic, matmul, and reshape
// ============================================================================

#[test]
fn test_shape_inference_arithmetic_graph() {
    let mut model = ModelBuilder::new("arith_test");
    model
        .add("a", "bias_row", "shifted")
        .matmul("shifted", "proj", "projected")
        .reshape("projected", "flat", &[12])
        .tanh("flat", "flat_act");

    let mut ws = Workspace::new();
    ws.feed_blob("a", random_tensor(&[4, 5]));
    ws.feed_blob("bias_row", random_tensor(&[5]));
    ws.feed_blob("proj", random_tensor(&[5, 3]));
    infer_run_and_compare(&model, &mut ws);

    let inferred = ws
        .infer_shapes_and_types(&[model.param_init_net(), model.net()], None)
        .expect("shape inference failed");
    assert_eq!(inferred.shapes["shifted"], vec![4, 5]);
    assert_eq!(inferred.shapes["projected"], vec![4, 3]);
    assert_eq!(inferred.shapes["flat"], vec![12]);
}

// ============================================================================
// Error conditions
// ============================================================================

#[test]
fn test_invalid_permutation_is_rejected() {
    let mut model = ModelBuilder::new("bad_transpose");
    model.transpose("tensor", "transpose", Some(&[0, 0, 1]));

    let mut ws = Workspace::new();
    ws.feed_blob("tensor", random_tensor(&[2, 3, 4]));

    let err = ws
        .infer_shapes_and_types(&[model.param_init_net(), model.net()], None)
        .unwrap_err();
    assert!(matches!(err, GraphError::InvalidPermutation { .. }));

    let err = ws.run_net_once(model.net()).unwrap_err();
    assert!(matches!(err, GraphError::InvalidPermutation { .. }));
}

#[test]
fn test_fc_dimension_mismatch_is_rejected() {
    let mut model = ModelBuilder::new("bad_fc");
    model.fc("data", "fc1", 95, 32);

    let ws = Workspace::new();
    let mut known = HashMap::new();
    known.insert("data".to_string(), vec![64u32, 96]);
    let err = ws
        .infer_shapes_and_types(&[model.param_init_net(), model.net()], Some(&known))
        .unwrap_err();
    assert!(matches!(err, GraphError::ShapeInferenceFailed { .. }));
}

#[test]
fn test_missing_parameter_blob_is_rejected() {
    let mut model = ModelBuilder::new("no_init");
    model.fc("data", "fc1", 96, 32);

    let mut ws = Workspace::new();
    ws.feed_blob("data", random_tensor(&[64, 96]));
    // param init net was never run, so fc1_w / fc1_b do not exist
    let err = ws.run_net_once(model.net()).unwrap_err();
    assert!(matches!(err, GraphError::BlobMissing { .. }));
}
