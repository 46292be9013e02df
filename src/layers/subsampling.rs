//! Subsampling (pooling) layer
//!
//! Downsamples NCHW feature maps by reducing every kernel-sized spatial
//! block to one value: its average, maximum or sum. The `None` pooling
//! type passes the input through untouched. The layer has no weights of its
//! own; its backward pass only routes epsilon back to the input positions
//! that produced each output.

use ndarray::{Array4, Array6, ArrayD, ArrayView4, ArrayViewD, Axis, Ix4, Zip};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::traits::{Layer, LayerType};
use crate::config::{NeuralNetConfiguration, PoolingType};
use crate::convolution::{col2im, im2col, im2col_with_pad_value, output_size};
use crate::dropout;
use crate::error::{LayerError, Result};
use crate::gradient::Gradient;
use crate::params::{ConvolutionParamInitializer, ParamInitializer, ParamTable};

/// State the forward pass leaves for the backward pass
#[derive(Clone, Debug)]
struct PoolCache {
    input_shape: (usize, usize, usize, usize),

    /// Position of each window's maximum, in padded input coordinates
    argmax: Option<Array4<(usize, usize)>>,
}

/// Subsampling layer used for downsampling the output of a convolution
pub struct SubsamplingLayer {
    conf: NeuralNetConfiguration,
    index: usize,
    input: Option<ArrayD<f32>>,
    params: ParamTable,
    param_initializer: Option<Box<dyn ParamInitializer>>,
    dropout_mask: Option<ArrayD<f32>>,
    cache: Option<PoolCache>,
    rng: StdRng,
}

impl SubsamplingLayer {
    pub fn new(conf: NeuralNetConfiguration) -> Self {
        let rng = match conf.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        SubsamplingLayer {
            conf,
            index: 0,
            input: None,
            params: ParamTable::new(),
            param_initializer: None,
            dropout_mask: None,
            cache: None,
            rng,
        }
    }

    /// Install the initializer [`init_params`](Layer::init_params) delegates to.
    pub fn with_param_initializer(mut self, initializer: Box<dyn ParamInitializer>) -> Self {
        self.param_initializer = Some(initializer);
        self
    }

    /// Mask applied by the last training-mode activation, if any
    pub fn dropout_mask(&self) -> Option<&ArrayD<f32>> {
        self.dropout_mask.as_ref()
    }

    fn pooling_type(&self) -> Result<PoolingType> {
        self.conf
            .pooling_type
            .ok_or_else(|| LayerError::illegal_state("Pooling type not supported!"))
    }

    fn output_dims(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        let (kh, kw) = self.conf.kernel_size;
        Ok((
            output_size(height, kh, self.conf.stride.0, self.conf.padding.0)?,
            output_size(width, kw, self.conf.stride.1, self.conf.padding.1)?,
        ))
    }

    /// Sum of every window, `[batch, channels, out_h, out_w]`
    fn window_sums(&self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        let col = im2col(input, self.conf.kernel_size, self.conf.stride, self.conf.padding)?;
        Ok(col.sum_axis(Axis(3)).sum_axis(Axis(2)))
    }

    /// Maximum of every window plus where it was found
    fn window_max(&self, input: ArrayView4<f32>) -> Result<(Array4<f32>, Array4<(usize, usize)>)> {
        let stride = self.conf.stride;
        let col = im2col_with_pad_value(
            input,
            self.conf.kernel_size,
            stride,
            self.conf.padding,
            f32::NEG_INFINITY,
        )?;
        let (batch_size, channels, kernel_h, kernel_w, out_height, out_width) = col.dim();

        let mut output = Array4::zeros((batch_size, channels, out_height, out_width));
        let mut argmax = Array4::from_elem((batch_size, channels, out_height, out_width), (0, 0));

        Zip::indexed(&mut output)
            .and(&mut argmax)
            .for_each(|(b, c, oh, ow), out, arg| {
                let mut max_val = f32::NEG_INFINITY;
                let mut max_pos = (0, 0);
                // NaN wins the window so it reaches the output
                'window: for kh in 0..kernel_h {
                    for kw in 0..kernel_w {
                        let val = col[[b, c, kh, kw, oh, ow]];
                        if val.is_nan() {
                            max_val = val;
                            max_pos = (kh, kw);
                            break 'window;
                        }
                        if val > max_val {
                            max_val = val;
                            max_pos = (kh, kw);
                        }
                    }
                }
                *out = max_val;
                *arg = (oh * stride.0 + max_pos.0, ow * stride.1 + max_pos.1);
            });

        Ok((output, argmax))
    }

    fn expect_epsilon_shape(&self, epsilon: &ArrayViewD<f32>, expected: &[usize]) -> Result<()> {
        if epsilon.shape() != expected {
            return Err(LayerError::dimension_mismatch(
                format!("epsilon of shape {:?}", expected),
                format!("{:?}", epsilon.shape()),
            ));
        }
        Ok(())
    }

    /// Spread each output epsilon evenly (scaled) over its window
    fn spread_windows(&self, epsilon: ArrayView4<f32>, cache: &PoolCache, scale: f32) -> Result<ArrayD<f32>> {
        let (batch_size, channels, height, width) = cache.input_shape;
        let (kernel_h, kernel_w) = self.conf.kernel_size;
        let (_, _, out_height, out_width) = epsilon.dim();

        let col = Array6::from_shape_fn(
            (batch_size, channels, kernel_h, kernel_w, out_height, out_width),
            |(b, c, _, _, oh, ow)| epsilon[[b, c, oh, ow]] * scale,
        );

        Ok(col2im(col.view(), self.conf.stride, self.conf.padding, height, width)?.into_dyn())
    }

    /// Route each output epsilon to the position its maximum came from
    fn route_to_max(&self, epsilon: ArrayView4<f32>, cache: &PoolCache) -> Result<ArrayD<f32>> {
        let argmax = cache
            .argmax
            .as_ref()
            .ok_or_else(|| LayerError::illegal_state("max pooling backward without cached argmax"))?;
        let (batch_size, channels, height, width) = cache.input_shape;
        let (pad_h, pad_w) = self.conf.padding;

        let mut input_epsilon = Array4::zeros((batch_size, channels, height, width));
        for ((b, c, oh, ow), &(h, w)) in argmax.indexed_iter() {
            // Windows lying entirely in the padding have nowhere to send epsilon
            if h < pad_h || w < pad_w || h - pad_h >= height || w - pad_w >= width {
                continue;
            }
            input_epsilon[[b, c, h - pad_h, w - pad_w]] += epsilon[[b, c, oh, ow]];
        }

        Ok(input_epsilon.into_dyn())
    }
}

impl Layer for SubsamplingLayer {
    fn layer_type(&self) -> LayerType {
        LayerType::Convolutional
    }

    fn index(&self) -> usize {
        self.index
    }

    fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    fn conf(&self) -> &NeuralNetConfiguration {
        &self.conf
    }

    /// Caches from the previous configuration are dropped; the input is kept
    fn set_conf(&mut self, conf: NeuralNetConfiguration) {
        self.conf = conf;
        self.dropout_mask = None;
        self.cache = None;
    }

    fn input(&self) -> Option<&ArrayD<f32>> {
        self.input.as_ref()
    }

    fn set_input(&mut self, input: ArrayD<f32>) {
        self.input = Some(input);
    }

    fn activate(&mut self, input: ArrayViewD<f32>, training: bool) -> Result<ArrayD<f32>> {
        let pooling_type = self.pooling_type()?;
        if input.ndim() != 4 {
            return Err(LayerError::dimension_mismatch(
                "[batch, channels, height, width]".to_string(),
                format!("{:?}", input.shape()),
            ));
        }

        let mut x = input.to_owned();
        self.input = Some(input.to_owned());
        self.dropout_mask = None;
        self.cache = None;

        if training && self.conf.dropout > 0.0 {
            self.dropout_mask = Some(dropout::apply_dropout(&mut x, self.conf.dropout, &mut self.rng)?);
        }

        let x = x.into_dimensionality::<Ix4>()?;
        let input_shape = x.dim();

        let (output, argmax) = match pooling_type {
            PoolingType::Avg => {
                let (kh, kw) = self.conf.kernel_size;
                let area = (kh * kw) as f32;
                (self.window_sums(x.view())?.mapv(|v| v / area), None)
            }
            PoolingType::Max => {
                let (output, argmax) = self.window_max(x.view())?;
                (output, Some(argmax))
            }
            PoolingType::Sum => (self.window_sums(x.view())?, None),
            PoolingType::None => (x, None),
        };

        self.cache = Some(PoolCache { input_shape, argmax });
        Ok(output.into_dyn())
    }

    fn backprop_gradient(&mut self, epsilon: ArrayViewD<f32>) -> Result<(Gradient, ArrayD<f32>)> {
        let pooling_type = self.pooling_type()?;
        let cache = self
            .cache
            .as_ref()
            .ok_or_else(|| LayerError::illegal_state("backprop_gradient called before activate"))?;

        let mut gradient = Gradient::new();
        gradient.set(ConvolutionParamInitializer::WEIGHTS, None);

        let (batch_size, channels, height, width) = cache.input_shape;
        let mut input_epsilon = match pooling_type {
            PoolingType::None => {
                self.expect_epsilon_shape(&epsilon, &[batch_size, channels, height, width])?;
                epsilon.to_owned()
            }
            PoolingType::Avg | PoolingType::Sum | PoolingType::Max => {
                let (out_height, out_width) = self.output_dims(height, width)?;
                self.expect_epsilon_shape(&epsilon, &[batch_size, channels, out_height, out_width])?;
                let epsilon = epsilon.into_dimensionality::<Ix4>()?;

                match pooling_type {
                    PoolingType::Avg => {
                        let (kh, kw) = self.conf.kernel_size;
                        self.spread_windows(epsilon, cache, 1.0 / (kh * kw) as f32)?
                    }
                    PoolingType::Sum => self.spread_windows(epsilon, cache, 1.0)?,
                    _ => self.route_to_max(epsilon, cache)?,
                }
            }
        };

        if let Some(mask) = &self.dropout_mask {
            dropout::apply_mask(&mut input_epsilon, mask)?;
        }

        Ok((gradient, input_epsilon))
    }

    fn update(&mut self, _gradient: &Gradient) -> Result<()> {
        Ok(())
    }

    fn update_param(&mut self, _gradient: ArrayViewD<f32>, _param: &str) -> Result<()> {
        Ok(())
    }

    fn param_table(&self) -> &ParamTable {
        &self.params
    }

    fn set_param_table(&mut self, params: ParamTable) {
        self.params = params;
    }

    fn set_param(&mut self, name: &str, value: ArrayD<f32>) {
        self.params.insert(name, value);
    }

    fn init_params(&mut self) -> Result<()> {
        let initializer = self
            .param_initializer
            .as_ref()
            .ok_or_else(|| LayerError::illegal_state("no parameter initializer installed"))?;
        initializer.init(&mut self.params, &mut self.conf)
    }

    fn l1_magnitude(&self) -> f32 {
        0.0
    }

    fn l2_magnitude(&self) -> f32 {
        0.0
    }

    fn score(&self) -> f32 {
        0.0
    }

    fn fit(&mut self) -> Result<()> {
        Ok(())
    }

    fn compute_gradient_and_score(&mut self) -> Result<()> {
        Ok(())
    }

    fn accumulate_score(&mut self, _accum: f32) {}

    fn validate_input(&self) -> Result<()> {
        Ok(())
    }

    fn clear(&mut self) {
        self.input = None;
        self.dropout_mask = None;
        self.cache = None;
    }
}
