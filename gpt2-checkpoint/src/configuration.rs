#[cfg(test)]
#[path = "../tests/unit/configuration_test.rs"]
mod configuration_test;

use std::io::Read;
use std::{fs::File, path::Path};

use anyhow::Context;
use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};

use crate::error::{CheckpointError, ConfigError};
use crate::layout;

/// Magic number for validating checkpoint files
pub const CHECKPOINT_MAGIC: i32 = 20240326;
/// Expected checkpoint version
pub const CHECKPOINT_VERSION: i32 = 3;
/// Number of i32 words in the checkpoint header
pub const HEADER_WORDS: usize = 256;
/// Size of the checkpoint header in bytes
pub const HEADER_SIZE: usize = HEADER_WORDS * std::mem::size_of::<i32>();

/// Hyperparameters of a GPT-2 style model.
///
/// These six values fully determine the size and position of every parameter
/// tensor in a checkpoint, see [`ParameterLayout`](crate::ParameterLayout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GPT2Config {
    pub max_seq_len: usize,
    pub vocab_size: usize,
    pub padded_vocab_size: usize,
    pub num_layers: usize,
    pub num_heads: usize,
    pub channels: usize,
}

impl Default for GPT2Config {
    /// GPT-2 small (124M).
    fn default() -> Self {
        Self {
            max_seq_len: 1024,
            vocab_size: 50257,
            padded_vocab_size: 50304,
            num_layers: 12,
            num_heads: 12,
            channels: 768,
        }
    }
}

impl GPT2Config {
    /// Checks that every field is strictly positive and that the parameter count is representable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.num_parameters().map(|_| ())
    }

    /// Total number of f32 parameters, computed without building the name index.
    pub fn num_parameters(&self) -> Result<usize, ConfigError> {
        for (name, value) in self.fields() {
            if value == 0 {
                return Err(ConfigError::InvalidField { name, value: 0 });
            }
        }

        layout::count_parameters(self)
    }

    /// Size of the parameter section of a checkpoint in bytes.
    pub fn parameter_bytes(&self) -> Result<u64, ConfigError> {
        let count = self.num_parameters()? as u64;
        count.checked_mul(std::mem::size_of::<f32>() as u64).ok_or(ConfigError::ParameterCountOverflow)
    }

    /// Per-head width. Not part of [`validate`](Self::validate): attention is not computed here.
    pub fn head_dim(&self) -> Result<usize, ConfigError> {
        if self.num_heads == 0 || self.channels % self.num_heads != 0 {
            return Err(ConfigError::IndivisibleHeads { channels: self.channels, num_heads: self.num_heads });
        }
        Ok(self.channels / self.num_heads)
    }

    /// Builds a configuration from header words `[2..8]`.
    ///
    /// Non-positive values are rejected with the raw signed value so a corrupt
    /// header is reported as it was read.
    pub fn from_header(header: &[i32; HEADER_WORDS]) -> Result<Self, ConfigError> {
        macro_rules! field {
            ($idx:literal, $name:literal) => {{
                let value = header[$idx];
                if value <= 0 {
                    return Err(ConfigError::InvalidField { name: $name, value: i64::from(value) });
                }
                value as usize
            }};
        }

        let config = Self {
            max_seq_len: field!(2, "max_seq_len"),
            vocab_size: field!(3, "vocab_size"),
            num_layers: field!(4, "num_layers"),
            num_heads: field!(5, "num_heads"),
            channels: field!(6, "channels"),
            padded_vocab_size: field!(7, "padded_vocab_size"),
        };

        config.validate()?;

        Ok(config)
    }

    /// Loads and validates a configuration stored as JSON.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open config: {}", path.display()))?;

        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;

        config.validate().with_context(|| "Invalid model configuration")?;

        Ok(config)
    }

    fn fields(&self) -> [(&'static str, usize); 6] {
        [
            ("max_seq_len", self.max_seq_len),
            ("vocab_size", self.vocab_size),
            ("padded_vocab_size", self.padded_vocab_size),
            ("num_layers", self.num_layers),
            ("num_heads", self.num_heads),
            ("channels", self.channels),
        ]
    }
}

/// Reads the fixed-size header and validates magic, version and hyperparameters.
///
/// The header is 256 little-endian i32 values. Only the first eight are
/// defined; the rest are reserved and ignored.
pub fn read_config<R: Read>(reader: &mut R) -> Result<GPT2Config, CheckpointError> {
    let mut header = [0i32; HEADER_WORDS];
    reader.read_i32_into::<LittleEndian>(&mut header)?;

    match header[0] {
        CHECKPOINT_MAGIC => {}
        actual => return Err(CheckpointError::BadMagic(actual)),
    }

    match header[1] {
        CHECKPOINT_VERSION => {}
        actual => return Err(CheckpointError::UnsupportedVersion(actual)),
    }

    Ok(GPT2Config::from_header(&header)?)
}
