use tch::{nn, nn::ModuleT, Tensor};
use crate::config::ModelConfig;

/// Two 3x3 convolutions, each followed by batch norm and ReLU.
#[derive(Debug)]
pub struct ConvBlock {
    conv_1: nn::Conv2D,
    bn_1: nn::BatchNorm,
    conv_2: nn::Conv2D,
    bn_2: nn::BatchNorm,
}

fn conv3x3(vs: nn::Path, in_channels: i64, out_channels: i64) -> nn::Conv2D {
    let config = nn::ConvConfig {
        padding: 1,
        bias: false,
        ..Default::default()
    };
    nn::conv2d(vs, in_channels, out_channels, 3, config)
}

impl ConvBlock {
    pub fn new(vs: &nn::Path, in_channels: i64, out_channels: i64) -> Self {
        Self {
            conv_1: conv3x3(vs / "conv_1", in_channels, out_channels),
            bn_1: nn::batch_norm2d(vs / "bn_1", out_channels, Default::default()),
            conv_2: conv3x3(vs / "conv_2", out_channels, out_channels),
            bn_2: nn::batch_norm2d(vs / "bn_2", out_channels, Default::default()),
        }
    }
}

impl ModuleT for ConvBlock {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        xs.apply(&self.conv_1)
            .apply_t(&self.bn_1, train)
            .relu()
            .apply(&self.conv_2)
            .apply_t(&self.bn_2, train)
            .relu()
    }
}

/// Decoder stage: 2x transposed-conv upsampling, skip concatenation, then a conv block.
#[derive(Debug)]
pub struct UpBlock {
    up: nn::ConvTranspose2D,
    block: ConvBlock,
}

impl UpBlock {
    pub fn new(vs: &nn::Path, in_channels: i64, out_channels: i64) -> Self {
        let up_config = nn::ConvTransposeConfig {
            stride: 2,
            ..Default::default()
        };

        Self {
            up: nn::conv_transpose2d(vs / "up", in_channels, out_channels, 2, up_config),
            block: ConvBlock::new(&(vs / "block"), 2 * out_channels, out_channels),
        }
    }

    pub fn forward_t(&self, xs: &Tensor, skip: &Tensor, train: bool) -> Tensor {
        let up = xs.apply(&self.up);
        Tensor::cat(&[&up, skip], 1).apply_t(&self.block, train)
    }
}

/// Small U-shaped fully-convolutional network.
///
/// Input: `[batch, in_channels, height, width]`, height and width divisible by `2^depth`.
/// Output: per-pixel class scores `[batch, num_classes, height, width]`.
#[derive(Debug)]
pub struct SegNet {
    encoder: Vec<ConvBlock>,
    bottleneck: ConvBlock,
    decoder: Vec<UpBlock>,
    head: nn::Conv2D,
    dropout: f64,
    pub config: ModelConfig,
}

impl SegNet {
    pub fn new(vs: &nn::Path, config: &ModelConfig) -> Self {
        let mut encoder = Vec::new();
        let mut in_channels = config.in_channels;
        for stage in 0..config.depth {
            let out_channels = config.stage_channels(stage);
            encoder.push(ConvBlock::new(&(vs / "enc" / stage), in_channels, out_channels));
            in_channels = out_channels;
        }

        let bottleneck_channels = config.stage_channels(config.depth);
        let bottleneck = ConvBlock::new(&(vs / "bottleneck"), in_channels, bottleneck_channels);

        let mut decoder = Vec::new();
        let mut in_channels = bottleneck_channels;
        for stage in (0..config.depth).rev() {
            let out_channels = config.stage_channels(stage);
            decoder.push(UpBlock::new(&(vs / "dec" / stage), in_channels, out_channels));
            in_channels = out_channels;
        }

        let head = nn::conv2d(vs / "head", in_channels, config.num_classes, 1, Default::default());

        Self {
            encoder,
            bottleneck,
            decoder,
            head,
            dropout: config.dropout,
            config: config.clone(),
        }
    }
}

impl ModuleT for SegNet {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let mut skips = Vec::with_capacity(self.encoder.len());
        let mut x = xs.shallow_clone();

        for block in &self.encoder {
            let features = x.apply_t(block, train);
            x = features.max_pool2d_default(2);
            skips.push(features);
        }

        x = x.apply_t(&self.bottleneck, train).dropout(self.dropout, train);

        for (block, skip) in self.decoder.iter().zip(skips.iter().rev()) {
            x = block.forward_t(&x, skip, train);
        }

        x.apply(&self.head)
    }
}
