#[cfg(test)]
mod tests {
    use ddc_core::config::{CollectionConfig, Config, TransportMode};
    use ddc_core::CollectorError;
    use std::io::Write;

    fn valid_ssh() -> Config {
        let mut config = Config {
            coordinator: "10.0.0.19".into(),
            executors: "10.0.0.20,10.0.0.21".into(),
            ..Config::default()
        };
        config.ssh.key_path = "/home/me/.ssh/id_rsa".into();
        config.ssh.user = "ubuntu".into();
        config
    }

    fn validation_message(config: &Config) -> String {
        match config.validate() {
            Err(CollectorError::ConfigValidation(msg)) => msg,
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_mode_aliases() {
        assert_eq!(TransportMode::parse("ssh"), Some(TransportMode::Ssh));
        assert_eq!(TransportMode::parse("S"), Some(TransportMode::Ssh));
        assert_eq!(TransportMode::parse("kubernetes"), Some(TransportMode::Kubernetes));
        assert_eq!(TransportMode::parse("k"), Some(TransportMode::Kubernetes));
        assert_eq!(TransportMode::parse("Docker"), Some(TransportMode::Docker));
        assert_eq!(TransportMode::parse("d"), Some(TransportMode::Docker));
        assert_eq!(TransportMode::parse("podman"), None);
    }

    #[test]
    fn test_valid_ssh_config() {
        assert_eq!(valid_ssh().validate().unwrap(), TransportMode::Ssh);
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let mut config = valid_ssh();
        config.mode = None;
        assert!(validation_message(&config).contains("mode is not correctly set"));
    }

    #[test]
    fn test_missing_coordinator_names_the_flag() {
        let mut config = valid_ssh();
        config.coordinator = String::new();
        assert!(validation_message(&config).contains("--coordinator"));

        config.mode = Some(TransportMode::Kubernetes);
        assert!(validation_message(&config).contains("mylabel=coordinator"));
    }

    #[test]
    fn test_missing_executors_names_the_flag() {
        let mut config = valid_ssh();
        config.executors = " ".into();
        assert!(validation_message(&config).contains("--executors"));
    }

    #[test]
    fn test_ssh_requires_key_and_user() {
        let mut config = valid_ssh();
        config.ssh.key_path = String::new();
        assert!(validation_message(&config).contains("--ssh-key"));

        let mut config = valid_ssh();
        config.ssh.user = String::new();
        assert!(validation_message(&config).contains("--ssh-user"));
    }

    #[test]
    fn test_key_and_user_not_needed_outside_ssh() {
        let mut config = valid_ssh();
        config.ssh.key_path = String::new();
        config.ssh.user = String::new();
        config.mode = Some(TransportMode::Docker);
        assert_eq!(config.validate().unwrap(), TransportMode::Docker);
    }

    #[test]
    fn test_collection_defaults() {
        let c = CollectionConfig::default();
        assert_eq!(c.row_limit, 100_000);
        assert_eq!(c.poll_interval_ms, 100);
        assert!(c.system_tables.contains(&"jobs".to_string()));
        let settings = c.export_settings();
        assert_eq!(settings.poll_interval.as_millis(), 100);
    }

    #[test]
    fn test_yaml_overrides_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ddc.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "row_limit: 500").unwrap();
        writeln!(f, "system_tables: [jobs, nodes]").unwrap();
        writeln!(f, "dremio_pat_token: secret-pat").unwrap();

        let c = CollectionConfig::load_or_default(&path).unwrap();
        assert_eq!(c.row_limit, 500);
        assert_eq!(c.system_tables, vec!["jobs", "nodes"]);
        assert_eq!(c.log_dir, "/var/log/dremio");
        assert_eq!(c.dremio_pat_token.as_ref().unwrap().expose(), "secret-pat");

        let missing = CollectionConfig::load_or_default(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(missing.row_limit, 100_000);
    }

    #[test]
    fn test_prompted_pat_wins_over_yaml() {
        let mut config = valid_ssh();
        config.collection.dremio_pat_token = Some(ddc_core::Secret::new("from-yaml"));
        assert_eq!(config.pat().unwrap().expose(), "from-yaml");
        config.dremio_pat = Some(ddc_core::Secret::new("from-prompt"));
        assert_eq!(config.pat().unwrap().expose(), "from-prompt");
    }
}
