//! Tests for configuration

#[cfg(test)]
mod tests {
    use super::super::config::*;
    use std::path::PathBuf;

    #[test]
    fn test_valuation_config_default() {
        let config = ValuationConfig::default();
        assert_eq!(config.reference_year, 2026);
        assert_eq!(config.band_pct, 0.07);
        assert_eq!(config.mae_factor, 0.8);
        assert_eq!(config.min_known_features, 3);
    }

    #[test]
    fn test_training_config_default() {
        let config = TrainingConfig::default();
        assert_eq!(config.n_trees, 300);
        assert_eq!(config.max_depth, 20);
        assert_eq!(config.min_samples_split, 5);
        assert_eq!(config.min_samples_leaf, 1);
        assert_eq!(config.max_features, None);
        assert!(config.bootstrap);
        assert_eq!(config.test_fraction, 0.2);
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.data.path, "data/cars.csv");
        assert_eq!(config.model.path, "models/price_model.json");
        assert_eq!(config.database.path, "logs/predictions.db");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let toml_str = r#"
[valuation]
reference_year = 2030

[training]
n_trees = 50
max_features = 4
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.valuation.reference_year, 2030);
        assert_eq!(config.valuation.band_pct, 0.07);
        assert_eq!(config.training.n_trees, 50);
        assert_eq!(config.training.max_features, Some(4));
        assert_eq!(config.training.seed, 42);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("valuator.toml");
        std::fs::write(
            &path,
            r#"
[model]
path = "/tmp/bundles/model.json"

[valuation]
mae_factor = 1.0
"#,
        )
        .unwrap();

        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.model_path(), PathBuf::from("/tmp/bundles/model.json"));
        assert_eq!(config.valuation.mae_factor, 1.0);
        assert_eq!(config.training.n_trees, 300);
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let config = Config::load("/nonexistent/car-valuator").unwrap();
        assert_eq!(config.valuation.min_known_features, 3);
    }

    #[test]
    fn test_env_overrides_file() {
        std::env::set_var("CAR_VALUATOR__SERVER__PORT", "9100");
        let config = Config::load("/nonexistent/car-valuator");
        std::env::remove_var("CAR_VALUATOR__SERVER__PORT");
        assert_eq!(config.unwrap().server.port, 9100);
    }

    #[test]
    fn test_expand_path() {
        assert_eq!(expand_path("models/a.json"), PathBuf::from("models/a.json"));
        std::env::set_var("CAR_VALUATOR_TEST_ROOT", "/srv/valuator");
        assert_eq!(
            expand_path("$CAR_VALUATOR_TEST_ROOT/model.json"),
            PathBuf::from("/srv/valuator/model.json")
        );
    }

    #[test]
    fn test_init_dirs_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.model.path = dir.path().join("m/model.json").display().to_string();
        config.database.path = dir.path().join("l/predictions.db").display().to_string();

        config.init_dirs().unwrap();
        assert!(dir.path().join("m").is_dir());
        assert!(dir.path().join("l").is_dir());
        assert!(!dir.path().join("m/model.json").exists());
    }
}
