use ndarray::ArrayD;
use crate::activations::Activation;
use crate::config::{LayerKind, NeuralNetConfiguration, PoolingType};
use crate::error::LayerError;
use crate::layers::{Layer, SubsamplingLayer};

#[test]
fn test_builder_validation() {
    let invalid = [
        NeuralNetConfiguration::builder().kernel_size((0, 2)).build(),
        NeuralNetConfiguration::builder().stride((1, 0)).build(),
        NeuralNetConfiguration::builder().dropout(1.0).build(),
        NeuralNetConfiguration::builder().dropout(-0.1).build(),
        NeuralNetConfiguration::builder().learning_rate(f32::NAN).build(),
    ];
    for result in invalid {
        assert!(matches!(result, Err(LayerError::InvalidParameter { .. })));
    }
}

#[test]
fn test_configuration_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("layer.json");

    let mut conf = NeuralNetConfiguration::builder()
        .layer(LayerKind::batch_normalization(8))
        .kernel_size((3, 3))
        .stride((1, 1))
        .padding((1, 1))
        .pooling_type(PoolingType::Sum)
        .activation(Activation::Tanh)
        .seed(17)
        .build()
        .unwrap();
    conf.add_variable("gamma");
    conf.save_json(&path).unwrap();

    let loaded = NeuralNetConfiguration::from_json_file(&path).unwrap();
    assert_eq!(loaded, conf);
    assert_eq!(loaded.variables(), &["gamma".to_string()]);
}

#[test]
fn test_json_with_invalid_values_rejected() {
    let conf = NeuralNetConfiguration::builder().build().unwrap();
    let json = conf.to_json().unwrap().replace("\"dropout\": 0.0", "\"dropout\": 1.5");
    assert!(matches!(
        NeuralNetConfiguration::from_json(&json),
        Err(LayerError::InvalidParameter { .. })
    ));
    assert!(matches!(
        NeuralNetConfiguration::from_json("{ not json"),
        Err(LayerError::SerializationError(_))
    ));
}

#[test]
fn test_pooling_extreme_values() {
    let input = ArrayD::from_shape_vec(
        vec![1, 1, 2, 2],
        vec![f32::MAX / 2.0, -f32::MAX / 2.0, 1e-30, 0.0],
    )
    .unwrap();

    let mut max_layer = SubsamplingLayer::new(
        NeuralNetConfiguration::builder().pooling_type(PoolingType::Max).build().unwrap(),
    );
    let output = max_layer.activate(input.view(), false).unwrap();
    assert_eq!(output[[0, 0, 0, 0]], f32::MAX / 2.0);

    let mut avg_layer = SubsamplingLayer::new(
        NeuralNetConfiguration::builder().pooling_type(PoolingType::Avg).build().unwrap(),
    );
    let output = avg_layer.activate(input.view(), false).unwrap();
    assert!(output[[0, 0, 0, 0]].is_finite());
}

#[test]
fn test_empty_batch() {
    let mut layer = SubsamplingLayer::new(
        NeuralNetConfiguration::builder().pooling_type(PoolingType::Avg).build().unwrap(),
    );
    let input = ArrayD::zeros(vec![0, 3, 4, 4]);
    let output = layer.activate(input.view(), false).unwrap();
    assert_eq!(output.shape(), &[0, 3, 2, 2]);

    let (_, input_epsilon) = layer.backprop_gradient(output.view()).unwrap();
    assert_eq!(input_epsilon.shape(), &[0, 3, 4, 4]);
}

#[test]
fn test_variable_registry() {
    let mut conf = NeuralNetConfiguration::builder().build().unwrap();
    conf.add_variable("W");
    conf.add_variable("b");
    conf.add_variable("W");
    assert_eq!(conf.variables(), &["W".to_string(), "b".to_string()]);

    conf.clear_variables();
    assert!(conf.variables().is_empty());
}
