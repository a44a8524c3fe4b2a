use super::*;
use crate::configuration::{CHECKPOINT_MAGIC, CHECKPOINT_VERSION, HEADER_WORDS};
use crate::error::ConfigError;
use byteorder::WriteBytesExt;
use std::io::Cursor;

// max_seq_len=4, vocab_size=10, num_layers=2, num_heads=2, channels=4, padded_vocab_size=12
const TINY_HEADER: [i32; 8] = [CHECKPOINT_MAGIC, CHECKPOINT_VERSION, 4, 10, 2, 2, 4, 12];
const TINY_PARAMETERS: usize = 560;

fn checkpoint_bytes(header: [i32; 8], parameters: &[f32]) -> Vec<u8> {
    let mut words = [0i32; HEADER_WORDS];
    words[..8].copy_from_slice(&header);

    let mut bytes = Vec::new();
    for word in words {
        bytes.write_i32::<LittleEndian>(word).unwrap();
    }
    for &value in parameters {
        bytes.write_f32::<LittleEndian>(value).unwrap();
    }
    bytes
}

fn ramp(count: usize) -> Vec<f32> {
    (0..count).map(|i| i as f32 * 0.5).collect()
}

fn load(bytes: Vec<u8>) -> Result<CheckpointModel, CheckpointError> {
    CheckpointModel::from_reader(&mut Cursor::new(bytes))
}

#[test]
fn test_round_trip_tiny_checkpoint() {
    let values = ramp(TINY_PARAMETERS);

    let model = load(checkpoint_bytes(TINY_HEADER, &values)).unwrap();

    let config = model.config();
    assert_eq!(config.max_seq_len, 4);
    assert_eq!(config.vocab_size, 10);
    assert_eq!(config.num_layers, 2);
    assert_eq!(config.num_heads, 2);
    assert_eq!(config.channels, 4);
    assert_eq!(config.padded_vocab_size, 12);
    assert_eq!(model.num_parameters(), TINY_PARAMETERS);
    assert_eq!(model.parameters(), values.as_slice());
}

#[test]
fn test_get_parameter_returns_views() {
    let values = ramp(TINY_PARAMETERS);
    let model = load(checkpoint_bytes(TINY_HEADER, &values)).unwrap();

    let wte = model.get_parameter("wte").unwrap();
    assert_eq!(wte.len(), 12 * 4);
    assert_eq!(wte, &values[..48]);
    assert!(std::ptr::eq(wte.as_ptr(), model.parameters().as_ptr()));

    let ln_f_bias = model.get_parameter("ln_f.bias").unwrap();
    assert_eq!(ln_f_bias.len(), 4);
    assert_eq!(ln_f_bias, &values[TINY_PARAMETERS - 4..]);

    let qkv = model.get_parameter("h.1.attn.qkv.weight").unwrap();
    assert_eq!(qkv.len(), 3 * 4 * 4);
    assert_eq!(qkv[0], values[308 + 8]);
}

#[test]
fn test_layer_parameter_matches_name() {
    let model = load(checkpoint_bytes(TINY_HEADER, &ramp(TINY_PARAMETERS))).unwrap();

    for layer in 0..2 {
        for tensor in LayerTensor::ALL {
            let by_index = model.layer_parameter(layer, tensor).unwrap();
            let by_name = model.get_parameter(&format!("h.{layer}.{}", tensor.suffix())).unwrap();
            assert!(std::ptr::eq(by_index, by_name));
        }
    }

    let result = model.layer_parameter(2, LayerTensor::Ln1Weight);
    assert!(matches!(result, Err(CheckpointError::UnknownLayerParameter { layer: 2, num_layers: 2 })));
}

#[test]
fn test_unknown_parameter() {
    let model = load(checkpoint_bytes(TINY_HEADER, &ramp(TINY_PARAMETERS))).unwrap();

    let err = model.get_parameter("nonexistent").unwrap_err();

    assert!(matches!(&err, CheckpointError::UnknownParameter(name) if name == "nonexistent"));
    assert_eq!(err.to_string(), "Unknown parameter: nonexistent");
}

#[test]
fn test_bad_magic() {
    let mut header = TINY_HEADER;
    header[0] = 20240325;

    let result = load(checkpoint_bytes(header, &ramp(TINY_PARAMETERS)));

    assert!(matches!(result, Err(CheckpointError::BadMagic(20240325))));
}

#[test]
fn test_unsupported_version() {
    let mut header = TINY_HEADER;
    header[1] = 4;

    let result = load(checkpoint_bytes(header, &ramp(TINY_PARAMETERS)));

    assert!(matches!(result, Err(CheckpointError::UnsupportedVersion(4))));
}

#[test]
fn test_invalid_config_never_falls_back_to_default() {
    let mut header = TINY_HEADER;
    header[6] = -768;

    let result = load(checkpoint_bytes(header, &ramp(TINY_PARAMETERS)));

    assert!(matches!(
        result,
        Err(CheckpointError::InvalidConfig(ConfigError::InvalidField { name: "channels", value: -768 }))
    ));
}

#[test]
fn test_truncated_file() {
    let result = load(checkpoint_bytes(TINY_HEADER, &ramp(TINY_PARAMETERS - 1)));

    assert!(matches!(
        result,
        Err(CheckpointError::TruncatedFile { expected: TINY_PARAMETERS, available })
            if available == TINY_PARAMETERS - 1
    ));
}

#[test]
fn test_header_only_file_is_truncated() {
    let result = load(checkpoint_bytes(TINY_HEADER, &[]));

    assert!(matches!(result, Err(CheckpointError::TruncatedFile { available: 0, .. })));
}

#[test]
fn test_oversized_header_fails_before_building_layout() {
    for num_layers in [2_000_000, i32::MAX] {
        let header = [CHECKPOINT_MAGIC, CHECKPOINT_VERSION, 1, 1, num_layers, 1, 1, 1];
        let started = std::time::Instant::now();

        let result = load(checkpoint_bytes(header, &[]));

        // wte + wpe + 25 elements per block + ln_f
        let expected_count = 1 + 1 + 25 * num_layers as usize + 2;
        assert!(matches!(
            result,
            Err(CheckpointError::TruncatedFile { expected, available: 0 }) if expected == expected_count
        ));
        assert!(started.elapsed() < std::time::Duration::from_secs(1), "num_layers = {num_layers}");
    }
}

#[test]
fn test_short_header_is_io_error() {
    let mut bytes = checkpoint_bytes(TINY_HEADER, &[]);
    bytes.truncate(100);

    let result = load(bytes);

    assert!(matches!(result, Err(CheckpointError::Io(_))));
}

#[test]
fn test_trailing_data_is_tolerated_by_default() {
    let mut bytes = checkpoint_bytes(TINY_HEADER, &ramp(TINY_PARAMETERS + 3));
    bytes.push(0xff);

    let model = load(bytes).unwrap();

    assert_eq!(model.num_parameters(), TINY_PARAMETERS);
    assert_eq!(model.parameters(), &ramp(TINY_PARAMETERS)[..]);
}

#[test]
fn test_trailing_data_rejected_when_strict() {
    let bytes = checkpoint_bytes(TINY_HEADER, &ramp(TINY_PARAMETERS + 1));

    let result = load_from_reader(&mut Cursor::new(bytes), true);

    assert!(matches!(
        result,
        Err(CheckpointError::TrailingData { expected, available }) if available == expected + 4
    ));
}

#[test]
fn test_exact_size_accepted_when_strict() {
    let bytes = checkpoint_bytes(TINY_HEADER, &ramp(TINY_PARAMETERS));

    let model = load_from_reader(&mut Cursor::new(bytes), true).unwrap();

    assert_eq!(model.num_parameters(), TINY_PARAMETERS);
}

#[test]
fn test_indivisible_heads_still_loads() {
    let mut header = TINY_HEADER;
    header[5] = 3;

    let model = load(checkpoint_bytes(header, &ramp(TINY_PARAMETERS))).unwrap();

    assert_eq!(model.config().num_heads, 3);
    assert!(model.config().head_dim().is_err());
}

#[test]
fn test_debug_does_not_dump_parameters() {
    let model = load(checkpoint_bytes(TINY_HEADER, &ramp(TINY_PARAMETERS))).unwrap();

    let debug = format!("{model:?}");

    assert!(debug.contains("[f32; 560]"));
    assert!(debug.contains("total_elements: 560"));
}

#[test]
fn test_model_is_shareable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<CheckpointModel>();
}
