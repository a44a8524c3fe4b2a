#[cfg(test)]
#[path = "../tests/unit/checkpoint_test.rs"]
mod checkpoint_test;

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, info, warn};

use crate::configuration::{GPT2Config, read_config};
use crate::error::CheckpointError;
use crate::layout::{LayerTensor, ParameterLayout};

const F32_SIZE: u64 = std::mem::size_of::<f32>() as u64;

/// A loaded GPT-2 checkpoint: configuration, layout and the flat parameter buffer.
///
/// The buffer is owned by the model and never modified after loading; all
/// accessors hand out borrowed slices into it.
pub struct CheckpointModel {
    config: GPT2Config,
    layout: ParameterLayout,
    parameters: Vec<f32>,
}

impl CheckpointModel {
    /// Loads a checkpoint from a file using default options.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, CheckpointError> {
        CheckpointLoader::new(path).load()
    }

    /// Loads a checkpoint from an arbitrary seekable stream using default options.
    pub fn from_reader<R: Read + Seek>(reader: &mut R) -> Result<Self, CheckpointError> {
        load_from_reader(reader, false)
    }

    pub fn config(&self) -> &GPT2Config {
        &self.config
    }

    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    /// The whole parameter buffer in layout order.
    pub fn parameters(&self) -> &[f32] {
        &self.parameters
    }

    pub fn num_parameters(&self) -> usize {
        self.parameters.len()
    }

    /// Returns the values of a named tensor as a view into the parameter buffer.
    pub fn get_parameter(&self, name: &str) -> Result<&[f32], CheckpointError> {
        let region = self.layout.get(name).ok_or_else(|| CheckpointError::UnknownParameter(name.to_string()))?;
        Ok(&self.parameters[region.range()])
    }

    /// Returns a per-layer tensor, resolved by index rather than by name.
    pub fn layer_parameter(&self, layer: usize, tensor: LayerTensor) -> Result<&[f32], CheckpointError> {
        let region = self
            .layout
            .layer_region(layer, tensor)
            .ok_or(CheckpointError::UnknownLayerParameter { layer, num_layers: self.layout.num_layers() })?;
        Ok(&self.parameters[region.range()])
    }
}

impl std::fmt::Debug for CheckpointModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointModel")
            .field("config", &self.config)
            .field("layout", &self.layout)
            .field("parameters", &format_args!("[f32; {}]", self.parameters.len()))
            .finish()
    }
}

/// Builder pattern for loading checkpoints from disk.
pub struct CheckpointLoader {
    checkpoint_path: PathBuf,
    strict_size: bool,
}

impl CheckpointLoader {
    pub fn new<P: AsRef<Path>>(checkpoint_path: P) -> Self {
        Self { checkpoint_path: checkpoint_path.as_ref().to_path_buf(), strict_size: false }
    }

    /// Rejects files with bytes left over after the parameter section.
    ///
    /// By default trailing bytes are only reported with a warning.
    pub fn with_strict_size(mut self, strict_size: bool) -> Self {
        self.strict_size = strict_size;
        self
    }

    pub fn load(self) -> Result<CheckpointModel, CheckpointError> {
        let file = File::open(&self.checkpoint_path)?;
        let mut reader = BufReader::new(file);

        let model = load_from_reader(&mut reader, self.strict_size)?;

        info!(
            "Loaded checkpoint {} with {} parameters",
            self.checkpoint_path.display(),
            model.num_parameters()
        );

        Ok(model)
    }
}

fn load_from_reader<R: Read + Seek>(reader: &mut R, strict_size: bool) -> Result<CheckpointModel, CheckpointError> {
    let config = read_config(reader)?;
    debug!("{config:#?}");

    if let Err(err) = config.head_dim() {
        warn!("{err}");
    }

    // byte accounting happens before the named layout is built, so a corrupt
    // header cannot trigger a huge allocation
    let expected = config.num_parameters()?;
    let expected_bytes = config.parameter_bytes()?;
    let available_bytes = remaining_bytes(reader)?;
    let available = usize::try_from(available_bytes / F32_SIZE).unwrap_or(usize::MAX);

    debug!("Remaining bytes in file: {available_bytes}, expected: {expected_bytes}");

    if available_bytes < expected_bytes {
        return Err(CheckpointError::TruncatedFile { expected, available });
    }

    if available_bytes > expected_bytes {
        if strict_size {
            return Err(CheckpointError::TrailingData { expected: expected_bytes, available: available_bytes });
        }
        warn!(
            "Checkpoint has {} bytes after the parameter section, ignoring",
            available_bytes - expected_bytes
        );
    }

    let layout = ParameterLayout::new(&config)?;
    debug!("{layout:#?}");

    let mut parameters = vec![0f32; expected];
    reader.read_f32_into::<LittleEndian>(&mut parameters).map_err(|err| match err.kind() {
        ErrorKind::UnexpectedEof => CheckpointError::TruncatedFile { expected, available },
        _ => CheckpointError::Io(err),
    })?;

    Ok(CheckpointModel { config, layout, parameters })
}

/// Number of bytes between the current position and the end of the stream.
fn remaining_bytes<R: Seek>(reader: &mut R) -> Result<u64, CheckpointError> {
    let position = reader.stream_position()?;
    let end = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(position))?;

    Ok(end.saturating_sub(position))
}
