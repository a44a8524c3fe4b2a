//! Parameter layout of a GPT-2 checkpoint.
//!
//! All parameters live in a single flat f32 buffer. The position of every tensor
//! is derived from [`GPT2Config`] alone by walking the tensors in a fixed order:
//!
//! 1. `wte` - token embeddings, `padded_vocab_size * channels`
//! 2. `wpe` - position embeddings, `max_seq_len * channels`
//! 3. for each layer `i`, the twelve [`LayerTensor`]s named `h.{i}.{suffix}`
//! 4. `ln_f.weight`, `ln_f.bias` - final layer norm, `channels` each
//!
//! The same order is the on-disk order of the parameter section.

#[cfg(test)]
#[path = "../tests/unit/layout_test.rs"]
mod layout_test;

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

use crate::configuration::GPT2Config;
use crate::error::ConfigError;

/// Tensors repeated in every transformer block, in traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerTensor {
    Ln1Weight,
    Ln1Bias,
    AttnQkvWeight,
    AttnQkvBias,
    AttnProjWeight,
    AttnProjBias,
    Ln2Weight,
    Ln2Bias,
    MlpFcWeight,
    MlpFcBias,
    MlpProjWeight,
    MlpProjBias,
}

impl LayerTensor {
    pub const ALL: [LayerTensor; 12] = [
        LayerTensor::Ln1Weight,
        LayerTensor::Ln1Bias,
        LayerTensor::AttnQkvWeight,
        LayerTensor::AttnQkvBias,
        LayerTensor::AttnProjWeight,
        LayerTensor::AttnProjBias,
        LayerTensor::Ln2Weight,
        LayerTensor::Ln2Bias,
        LayerTensor::MlpFcWeight,
        LayerTensor::MlpFcBias,
        LayerTensor::MlpProjWeight,
        LayerTensor::MlpProjBias,
    ];

    pub const fn suffix(self) -> &'static str {
        match self {
            LayerTensor::Ln1Weight => "ln1.weight",
            LayerTensor::Ln1Bias => "ln1.bias",
            LayerTensor::AttnQkvWeight => "attn.qkv.weight",
            LayerTensor::AttnQkvBias => "attn.qkv.bias",
            LayerTensor::AttnProjWeight => "attn.proj.weight",
            LayerTensor::AttnProjBias => "attn.proj.bias",
            LayerTensor::Ln2Weight => "ln2.weight",
            LayerTensor::Ln2Bias => "ln2.bias",
            LayerTensor::MlpFcWeight => "mlp.fc.weight",
            LayerTensor::MlpFcBias => "mlp.fc.bias",
            LayerTensor::MlpProjWeight => "mlp.proj.weight",
            LayerTensor::MlpProjBias => "mlp.proj.bias",
        }
    }

    /// Position of this tensor inside a block.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Number of elements, `None` on overflow.
    pub fn size(self, channels: usize) -> Option<usize> {
        // (multiplier, is a channels x channels matrix)
        let (factor, square) = match self {
            LayerTensor::Ln1Weight | LayerTensor::Ln1Bias => (1, false),
            LayerTensor::AttnQkvWeight => (3, true),
            LayerTensor::AttnQkvBias => (3, false),
            LayerTensor::AttnProjWeight => (1, true),
            LayerTensor::AttnProjBias => (1, false),
            LayerTensor::Ln2Weight | LayerTensor::Ln2Bias => (1, false),
            LayerTensor::MlpFcWeight => (4, true),
            LayerTensor::MlpFcBias => (4, false),
            LayerTensor::MlpProjWeight => (4, true),
            LayerTensor::MlpProjBias => (1, false),
        };

        let base = if square { channels.checked_mul(channels)? } else { channels };
        base.checked_mul(factor)
    }
}

/// Identifies one tensor of the layout without allocating its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TensorId {
    TokenEmbedding,
    PositionEmbedding,
    Layer(usize, LayerTensor),
    FinalNormWeight,
    FinalNormBias,
}

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorId::TokenEmbedding => f.write_str("wte"),
            TensorId::PositionEmbedding => f.write_str("wpe"),
            TensorId::Layer(layer, tensor) => write!(f, "h.{layer}.{}", tensor.suffix()),
            TensorId::FinalNormWeight => f.write_str("ln_f.weight"),
            TensorId::FinalNormBias => f.write_str("ln_f.bias"),
        }
    }
}

/// Walks all tensors in layout order, calling `emit` with each id, offset and size.
///
/// Returns the total element count. Overflow at any step is reported instead of wrapping.
fn traverse<F>(config: &GPT2Config, mut emit: F) -> Result<usize, ConfigError>
where
    F: FnMut(TensorId, usize, usize),
{
    let channels = config.channels;
    let mut offset = 0usize;

    let mut push = |id: TensorId, size: Option<usize>| -> Result<(), ConfigError> {
        let size = size.ok_or(ConfigError::ParameterCountOverflow)?;
        emit(id, offset, size);
        offset = offset.checked_add(size).ok_or(ConfigError::ParameterCountOverflow)?;
        Ok(())
    };

    push(TensorId::TokenEmbedding, config.padded_vocab_size.checked_mul(channels))?;
    push(TensorId::PositionEmbedding, config.max_seq_len.checked_mul(channels))?;

    for layer in 0..config.num_layers {
        for tensor in LayerTensor::ALL {
            push(TensorId::Layer(layer, tensor), tensor.size(channels))?;
        }
    }

    push(TensorId::FinalNormWeight, Some(channels))?;
    push(TensorId::FinalNormBias, Some(channels))?;

    Ok(offset)
}

/// Computes the total number of parameters without building a layout.
///
/// Every block has the same size, so this runs in constant time regardless of `num_layers`.
pub(crate) fn count_parameters(config: &GPT2Config) -> Result<usize, ConfigError> {
    let channels = config.channels;

    let per_layer = LayerTensor::ALL.iter().try_fold(0usize, |acc, tensor| acc.checked_add(tensor.size(channels)?));

    let total = config
        .padded_vocab_size
        .checked_mul(channels)
        .zip(config.max_seq_len.checked_mul(channels))
        .and_then(|(wte, wpe)| wte.checked_add(wpe))
        .zip(per_layer.and_then(|size| size.checked_mul(config.num_layers)))
        .and_then(|(embeddings, blocks)| embeddings.checked_add(blocks))
        .zip(channels.checked_mul(2))
        .and_then(|(head, ln_f)| head.checked_add(ln_f));

    total.ok_or(ConfigError::ParameterCountOverflow)
}

/// A named, contiguous run of values inside the parameter buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterRegion {
    pub id: TensorId,
    pub name: String,
    pub offset: usize,
    pub size: usize,
}

impl ParameterRegion {
    pub fn end(&self) -> usize {
        self.offset + self.size
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.end()
    }
}

/// Name to `(offset, size)` index over the flat parameter buffer.
///
/// Built once from a validated configuration and never mutated afterwards.
#[derive(Clone)]
pub struct ParameterLayout {
    regions: Vec<ParameterRegion>,
    by_name: HashMap<String, usize>,
    num_layers: usize,
    total_elements: usize,
}

impl ParameterLayout {
    /// Number of regions emitted before the first transformer block.
    const LEADING_REGIONS: usize = 2;

    pub fn new(config: &GPT2Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let capacity = Self::LEADING_REGIONS + config.num_layers * LayerTensor::ALL.len() + 2;
        let mut regions = Vec::with_capacity(capacity);

        let total_elements = traverse(config, |id, offset, size| {
            regions.push(ParameterRegion { id, name: id.to_string(), offset, size });
        })?;

        let by_name = regions.iter().enumerate().map(|(idx, region)| (region.name.clone(), idx)).collect();

        Ok(Self { regions, by_name, num_layers: config.num_layers, total_elements })
    }

    pub fn get(&self, name: &str) -> Option<&ParameterRegion> {
        self.by_name.get(name).map(|&idx| &self.regions[idx])
    }

    /// Resolves a per-layer tensor by position, without hashing its name.
    pub fn layer_region(&self, layer: usize, tensor: LayerTensor) -> Option<&ParameterRegion> {
        if layer >= self.num_layers {
            return None;
        }
        self.regions.get(Self::LEADING_REGIONS + layer * LayerTensor::ALL.len() + tensor.index())
    }

    /// Regions in construction (and on-disk) order.
    pub fn iter(&self) -> impl Iterator<Item = &ParameterRegion> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn num_layers(&self) -> usize {
        self.num_layers
    }

    /// Sum of all region sizes, i.e. the required buffer length.
    pub fn total_elements(&self) -> usize {
        self.total_elements
    }
}

impl fmt::Debug for ParameterLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterLayout")
            .field("regions", &self.regions.len())
            .field("num_layers", &self.num_layers)
            .field("total_elements", &self.total_elements)
            .finish()
    }
}
