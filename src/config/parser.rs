use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use skeleton_discovery::config::load_config;
///
/// let config = load_config(Path::new("discovery.toml")).unwrap();
/// println!("Retry attempts: {}", config.retry.max_attempts);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;

    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at worker start-up so operators can tell which configuration a
/// worker process is running with.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok((Config, String))` - Successfully loaded configuration and its hash
/// * `Err(ConfigError)` - Failed to load or parse the configuration
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const MINIMAL_CONFIG: &str = r#"
[user-agent]
crawler-name = "SkeletonBot"
crawler-version = "1.0"
contact-url = "https://example.com/bot"
contact-email = "bot@example.com"

[output]
database-path = "./discovery.db"
"#;

    #[test]
    fn test_load_minimal_config_applies_defaults() {
        let file = create_temp_config(MINIMAL_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.user_agent.crawler_name, "SkeletonBot");
        assert_eq!(config.discovery.default_max_pages, 10);
        assert_eq!(config.discovery.default_max_depth, 1);
        assert_eq!(config.discovery.sitemap_max_depth, 2);
        assert_eq!(config.fetch.robots_timeout_ms, 3_000);
        assert_eq!(config.fetch.sitemap_timeout_ms, 10_000);
        assert_eq!(config.fetch.homepage_timeout_ms, 5_000);
        assert_eq!(config.fetch.max_redirects, 5);
        assert_eq!(config.fetch.max_body_bytes, 5 * 1024 * 1024);
        assert!(!config.fetch.allow_private_hosts);
        assert_eq!(config.rate_limit.max_concurrent_requests, 10);
        assert_eq!(config.rate_limit.request_delay_ms, 100);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_backoff_ms, 1_000);
        assert_eq!(config.cache.ttl_hours, 24);
    }

    #[test]
    fn test_load_config_with_overrides() {
        let config_content = format!(
            "{}\n{}",
            r#"
[discovery]
default-max-pages = 25

[fetch]
sitemap-timeout-ms = 2000
allow-private-hosts = true

[rate-limit]
max-concurrent-requests = 4
"#,
            MINIMAL_CONFIG
        );

        let file = create_temp_config(&config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.discovery.default_max_pages, 25);
        assert_eq!(config.fetch.sitemap_timeout_ms, 2000);
        assert!(config.fetch.allow_private_hosts);
        assert_eq!(config.rate_limit.max_concurrent_requests, 4);
        assert_eq!(config.rate_limit.request_delay_ms, 100);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let config_content = "this is not valid TOML {{{";
        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_missing_user_agent() {
        let config_content = r#"
[output]
database-path = "./discovery.db"
"#;
        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = format!(
            "{}\n{}",
            r#"
[rate-limit]
max-concurrent-requests = 0
"#,
            MINIMAL_CONFIG
        );

        let file = create_temp_config(&config_content);
        let result = load_config(file.path());
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_load_with_hash_tracks_file_content() {
        let file = create_temp_config(MINIMAL_CONFIG);
        let (config, hash) = load_config_with_hash(file.path()).unwrap();
        assert_eq!(config.output.database_path, "./discovery.db");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, compute_config_hash(file.path()).unwrap());

        let tuned = create_temp_config(&format!("{}\n[retry]\nmax-attempts = 5\n", MINIMAL_CONFIG));
        let (_, tuned_hash) = load_config_with_hash(tuned.path()).unwrap();
        assert_ne!(hash, tuned_hash);
    }

    #[test]
    fn test_hash_requires_readable_file() {
        assert!(matches!(
            compute_config_hash(Path::new("/nonexistent/discovery.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
