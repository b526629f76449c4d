use figment::providers::Serialized;
use imgdupes::actions::SortCriterion;
use imgdupes::config::{AnnConfig, Config, ConfigError};
use imgdupes::scanner::HashMethod;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Use figment directly without Env to avoid interference from other tests
    let figment = figment::Figment::from(Serialized::defaults(Config::default()));
    let config: Config = figment.extract().unwrap();
    assert_eq!(config.hash_method, HashMethod::Phash);
    assert_eq!(config.backend, "exact");
    assert_eq!(config.ann, AnnConfig::default());
    assert!(config.cache);
    assert!(!config.run);
}

#[test]
fn test_config_load_from_env() {
    // Only index settings, so concurrent end-to-end runs on the exact backend are unaffected
    std::env::set_var("IMGDUPES_ANN__K", "50");
    std::env::set_var("IMGDUPES_ANN__QUERY_THREADS", "6");

    use figment::{providers::Env, Figment};
    let figment = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed("IMGDUPES_").split("__"));

    let config: Config = figment.extract().unwrap();

    assert_eq!(config.ann.k, 50);
    assert_eq!(config.ann.query_threads, 6);
    assert_eq!(config.ann.search_radius, 1);

    std::env::remove_var("IMGDUPES_ANN__K");
    std::env::remove_var("IMGDUPES_ANN__QUERY_THREADS");
}

#[test]
fn test_config_load_from_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let toml_content = r#"
hash_method = "dhash"
hamming_distance = 3
backend = "mih"
sort = "width"
reverse = true
cache_dir = "/var/cache/imgdupes"

[ann]
k = 8
search_radius = 2
"#;
    fs::write(&config_path, toml_content).unwrap();

    let config = Config::load(Some(&config_path)).unwrap();

    assert_eq!(config.hash_method, HashMethod::Dhash);
    assert_eq!(config.threshold(), 3);
    assert_eq!(config.backend, "mih");
    assert_eq!(config.sort, SortCriterion::Width);
    assert!(config.reverse);
    assert_eq!(
        config.resolved_cache_dir(),
        std::path::PathBuf::from("/var/cache/imgdupes")
    );
    assert_eq!(config.ann.search_radius, 2);
    assert_eq!(config.ann.build_threads, 1);
}

#[test]
fn test_config_missing_file_uses_defaults() {
    let temp_dir = tempdir().unwrap();
    let config = Config::load(Some(&temp_dir.path().join("absent.toml"))).unwrap();
    assert_eq!(config.hash_size, Config::default().hash_size);
}

#[test]
fn test_config_invalid_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "hash_size = \"big\"").unwrap();

    let result = Config::load(Some(&config_path));
    assert!(matches!(result, Err(ConfigError::Figment(_))));
}

#[test]
fn test_config_out_of_range_value() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[ann]\nk = 0\n").unwrap();

    let result = Config::load(Some(&config_path));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_config_save_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let config = Config {
        hash_method: HashMethod::Ahash,
        trash: true,
        ..Config::default()
    };
    config.save(&config_path).unwrap();

    let saved_content = fs::read_to_string(&config_path).unwrap();
    assert!(saved_content.contains("hash_method = \"ahash\""));
    assert!(saved_content.contains("trash = true"));
    assert!(saved_content.contains("[ann]"));
}

#[test]
fn test_config_rejects_oversized_hash_size() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "hash_size = 70000\n").unwrap();

    let result = Config::load(Some(&config_path));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}
