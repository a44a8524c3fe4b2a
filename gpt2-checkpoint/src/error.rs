use thiserror::Error;

/// Errors produced while validating a [`GPT2Config`](crate::GPT2Config).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid {name}: must be positive, got {value}")]
    InvalidField { name: &'static str, value: i64 },

    #[error("Parameter count does not fit into usize for this configuration")]
    ParameterCountOverflow,

    #[error("num_heads ({num_heads}) does not evenly divide channels ({channels})")]
    IndivisibleHeads { channels: usize, num_heads: usize },
}

/// Errors produced while loading a checkpoint or addressing its parameters.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid checkpoint magic number: expected {expected}, got {0}", expected = crate::configuration::CHECKPOINT_MAGIC)]
    BadMagic(i32),

    #[error("Unsupported checkpoint version: expected {expected}, got {0}", expected = crate::configuration::CHECKPOINT_VERSION)]
    UnsupportedVersion(i32),

    #[error("Invalid model configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Truncated checkpoint: need {expected} parameters, only {available} available")]
    TruncatedFile { expected: usize, available: usize },

    #[error("Checkpoint has trailing data: expected {expected} bytes of parameters, found {available}")]
    TrailingData { expected: u64, available: u64 },

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Layer index {layer} is out of range for a model with {num_layers} layers")]
    UnknownLayerParameter { layer: usize, num_layers: usize },
}
