//! # gpt2-checkpoint
//!
//! Loads GPT-2 checkpoints into a single flat parameter buffer and provides
//! named, zero-copy access to every weight tensor.
//!
//! The checkpoint starts with a 256 x i32 header (magic, version and six
//! hyperparameters) followed by all parameters as little-endian f32 values in
//! the order defined by [`ParameterLayout`].
//!
//! ## Examples
//!
//! ### Loading a checkpoint
//!
//! ```rust,no_run
//! use gpt2_checkpoint::CheckpointModel;
//!
//! # fn main() -> anyhow::Result<()> {
//! let model = CheckpointModel::from_path("gpt2_124M.bin")?;
//! let wte = model.get_parameter("wte")?;
//! assert_eq!(wte.len(), model.config().padded_vocab_size * model.config().channels);
//! # Ok(())
//! # }
//! ```
//!
//! ### Capacity planning without a file
//!
//! ```rust
//! use gpt2_checkpoint::GPT2Config;
//!
//! let config = GPT2Config::default();
//! assert_eq!(config.num_parameters().unwrap(), 124_475_904);
//! ```

mod checkpoint;
mod configuration;
mod error;
mod layout;

pub use checkpoint::{CheckpointLoader, CheckpointModel};
pub use configuration::{CHECKPOINT_MAGIC, CHECKPOINT_VERSION, GPT2Config, HEADER_SIZE, HEADER_WORDS, read_config};
pub use error::{CheckpointError, ConfigError};
pub use layout::{LayerTensor, ParameterLayout, ParameterRegion, TensorId};
