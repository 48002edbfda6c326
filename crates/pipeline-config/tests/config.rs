use std::fs;

use pipeline_config::{ConfigError, PipelineConfig, RunMode};

const SAMPLE: &str = r#"
[training]
image_dim = 4096
word_dim = 50
extraction_batch = 32
negatives_per_batch = 10
sampling_seed = 123

[stores]
training = "stores/train.fst"
validation = "stores/valid.fst"
embeddings = "stores/words.fst"

[model]
weights_path = "models/vgg16_fc2.onnx"

[data]
training_images = "images/train"
validation_images = "images/valid"
training_class_ranges = "stores/train_ranges.json"
validation_class_ranges = "stores/valid_ranges.json"
"#;

#[test]
fn sample_config_parses_with_defaults() {
    let config = PipelineConfig::from_toml_str(SAMPLE).expect("valid config");
    assert_eq!(config.training.image_dim, 4096);
    assert_eq!(config.training.sampling_seed, Some(123));
    assert_eq!(config.model.input_name, "input");
    assert_eq!(config.model.output_name, "output");
}

#[test]
fn run_mode_selects_paths() {
    let config = PipelineConfig::from_toml_str(SAMPLE).unwrap();
    let train = config.run_settings(RunMode::Train);
    assert_eq!(train.images_root, std::path::Path::new("images/train"));
    assert_eq!(train.feature_store, std::path::Path::new("stores/train.fst"));

    let valid = config.run_settings(RunMode::Valid);
    assert_eq!(valid.class_ranges, std::path::Path::new("stores/valid_ranges.json"));
}

#[test]
fn run_mode_parsing_is_strict() {
    assert_eq!("TRAIN".parse::<RunMode>().unwrap(), RunMode::Train);
    assert_eq!("VALID".parse::<RunMode>().unwrap(), RunMode::Valid);
    assert!(matches!(
        "TEST".parse::<RunMode>().unwrap_err(),
        ConfigError::UnknownRunMode(ref mode) if mode == "TEST"
    ));
}

#[test]
fn zero_sized_settings_are_rejected() {
    let broken = SAMPLE.replace("extraction_batch = 32", "extraction_batch = 0");
    assert!(matches!(
        PipelineConfig::from_toml_str(&broken).unwrap_err(),
        ConfigError::Invalid(_)
    ));
}

#[test]
fn path_checks_catch_missing_root_and_store() {
    let tmpdir = tempfile::tempdir().unwrap();
    let images = tmpdir.path().join("images");
    let store = tmpdir.path().join("train.fst");
    let raw = SAMPLE
        .replace("images/train", images.to_str().unwrap())
        .replace("stores/train.fst", store.to_str().unwrap());
    let config = PipelineConfig::from_toml_str(&raw).unwrap();
    let settings = config.run_settings(RunMode::Train);

    assert!(matches!(settings.check_paths(), Err(ConfigError::NotADirectory(_))));
    fs::create_dir_all(&images).unwrap();
    assert!(matches!(settings.check_paths(), Err(ConfigError::MissingStore(_))));
    fs::write(&store, b"").unwrap();
    settings.check_paths().expect("both present");
}
