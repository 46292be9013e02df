use netlayers::{
    config::{LayerKind, NeuralNetConfiguration, PoolingType},
    debug::{check_gradient, check_params, NumericalIssue},
    error::LayerError,
    gradient::Gradient,
    layers::{BatchNormalizationLayer, Layer, SubsamplingLayer},
    params::{ConvolutionParamInitializer, ParamTable, WeightInit},
};
use ndarray::{Array4, ArrayD, Axis};

fn feature_maps(batch: usize, channels: usize, size: usize) -> ArrayD<f32> {
    let mut input = Array4::<f32>::zeros((batch, channels, size, size));
    for ((b, c, h, w), v) in input.indexed_iter_mut() {
        *v = ((b * 31 + c * 17 + h * 7 + w * 3) % 11) as f32 * 0.25 - 1.0;
    }
    input.into_dyn()
}

#[test]
fn test_pooling_then_batch_norm_training_step() {
    let pool_conf = NeuralNetConfiguration::builder()
        .kernel_size((2, 2))
        .pooling_type(PoolingType::Max)
        .dropout(0.25)
        .seed(7)
        .build()
        .unwrap();
    let norm_conf = NeuralNetConfiguration::builder()
        .layer(LayerKind::batch_normalization(3))
        .learning_rate(0.05)
        .build()
        .unwrap();

    let mut pool = SubsamplingLayer::new(pool_conf);
    let mut norm = BatchNormalizationLayer::new(norm_conf).unwrap();
    pool.set_index(0);
    norm.set_index(1);
    norm.init_params().unwrap();

    let input = feature_maps(4, 3, 6);
    let pooled = pool.activate(input.view(), true).unwrap();
    assert_eq!(pooled.shape(), &[4, 3, 3, 3]);
    assert!(pool.dropout_mask().is_some());

    let output = norm.activate(pooled.view(), true).unwrap();
    assert_eq!(output.shape(), pooled.shape());

    // Loss 0.5 * ||output||^2
    let (norm_gradient, norm_epsilon) = norm.backprop_gradient(output.view()).unwrap();
    let (pool_gradient, input_epsilon) = pool.backprop_gradient(norm_epsilon.view()).unwrap();

    assert_eq!(input_epsilon.shape(), input.shape());
    assert_eq!(pool_gradient.get("W"), None);
    assert!(pool_gradient.contains("W"));
    assert!(!check_gradient(&norm_gradient)
        .iter()
        .any(|issue| matches!(issue, NumericalIssue::NaN { .. } | NumericalIssue::Infinity { .. })));

    // Dropped input positions receive no epsilon
    let mask = pool.dropout_mask().unwrap();
    for (g, m) in input_epsilon.iter().zip(mask.iter()) {
        if *m == 0.0 {
            assert_eq!(*g, 0.0);
        }
    }

    let gamma_before = norm.get_param("gamma").unwrap().clone();
    norm.update(&norm_gradient).unwrap();
    let gamma_after = norm.get_param("gamma").unwrap();
    let expected = &gamma_before - &(norm_gradient.get("gamma").unwrap() * 0.05);
    assert!(gamma_after.iter().zip(expected.iter()).all(|(a, e)| (a - e).abs() < 1e-6));
    assert!(check_params(norm.param_table()).is_empty());
}

#[test]
fn test_pooling_types_agree_on_constant_input() {
    let input = ArrayD::from_elem(vec![2, 2, 4, 4], 3.0f32);

    for (pooling_type, expected) in [
        (PoolingType::Avg, 3.0),
        (PoolingType::Max, 3.0),
        (PoolingType::Sum, 12.0),
    ] {
        let conf = NeuralNetConfiguration::builder()
            .pooling_type(pooling_type)
            .build()
            .unwrap();
        let mut layer = SubsamplingLayer::new(conf);
        let output = layer.activate(input.view(), false).unwrap();

        assert_eq!(output.shape(), &[2, 2, 2, 2]);
        assert!(output.iter().all(|&v| v == expected), "{} pooling", pooling_type);
    }
}

#[test]
fn test_parameters_survive_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("norm.bin");

    let conf = NeuralNetConfiguration::builder()
        .layer(LayerKind::batch_normalization(4))
        .build()
        .unwrap();
    let mut layer = BatchNormalizationLayer::new(conf.clone()).unwrap();
    layer.init_params().unwrap();

    let mut gradient = Gradient::new();
    gradient.set("gamma", Some(ArrayD::from_elem(vec![4], 0.5)));
    gradient.set("beta", Some(ArrayD::from_elem(vec![4], -1.0)));
    layer.update(&gradient).unwrap();
    layer.param_table().save(&path).unwrap();

    let mut restored = BatchNormalizationLayer::new(conf).unwrap();
    restored.set_param_table(ParamTable::load(&path).unwrap());
    assert_eq!(restored.params(), layer.params());

    let input = feature_maps(3, 4, 2).index_axis(Axis(3), 0).index_axis(Axis(2), 0).to_owned();
    assert_eq!(
        restored.activate(input.view(), false).unwrap(),
        layer.activate(input.view(), false).unwrap()
    );
}

#[test]
fn test_convolution_initializer_on_subsampling_layer() {
    let conf = NeuralNetConfiguration::builder()
        .layer(LayerKind::Convolution { n_in: 2, n_out: 5 })
        .kernel_size((3, 3))
        .stride((1, 1))
        .pooling_type(PoolingType::Avg)
        .seed(11)
        .build()
        .unwrap();

    let initializer = ConvolutionParamInitializer::with_weight_init(WeightInit::XavierUniform);
    let mut layer = SubsamplingLayer::new(conf).with_param_initializer(Box::new(initializer));
    layer.init_params().unwrap();

    assert_eq!(layer.get_param("W").unwrap().shape(), &[5, 2, 3, 3]);
    assert_eq!(layer.get_param("b").unwrap().shape(), &[5]);
    assert_eq!(layer.num_params(), 5 * 2 * 9 + 5);
    assert_eq!(layer.conf().variables(), &["W".to_string(), "b".to_string()]);

    // Pooling ignores the parameters entirely
    let output = layer.activate(feature_maps(1, 2, 5).view(), false).unwrap();
    assert_eq!(output.shape(), &[1, 2, 3, 3]);
}

#[test]
fn test_unsupported_operations_report_errors() {
    let conf = NeuralNetConfiguration::builder().build().unwrap();
    let mut layer = SubsamplingLayer::new(conf);

    let input = feature_maps(1, 1, 4);
    assert!(matches!(layer.error(input.view()), Err(LayerError::Unsupported { .. })));
    assert!(matches!(layer.transpose(), Err(LayerError::Unsupported { .. })));
    assert!(matches!(layer.try_clone_box(), Err(LayerError::Unsupported { .. })));
    assert!(matches!(layer.init_params(), Err(LayerError::IllegalState(_))));
}
