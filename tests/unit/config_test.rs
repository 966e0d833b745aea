//! Unit tests for configuration loading

use image_gen_orchestrator::config::{Settings, StorageBackend};

#[test]
fn test_shipped_default_config_is_valid() {
    let settings = Settings::load_from_path("config/default.toml").unwrap();
    assert!(settings.validate().is_ok());
    assert_eq!(settings.storage.backend, StorageBackend::Local);
    assert_eq!(settings.storage.read_url_ttl_secs, 3600);

    let configs = settings.provider_configs();
    let kinds: Vec<_> = configs.iter().map(|c| c.provider_kind.as_str()).collect();
    assert_eq!(kinds, vec!["openai", "stability", "gemini"]);
    assert_eq!(configs[0].extra.cost_per_image(), Some(0.04));
    assert!(!configs[2].enabled);
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let settings = Settings::load_from_path("config/does-not-exist.toml").unwrap();
    assert_eq!(settings.server.port, 8080);
    assert!(settings.providers.is_empty());
}
