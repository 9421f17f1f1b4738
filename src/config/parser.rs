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
/// use madara_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("Sites: {}", config.sites.len());
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so operators can tell which configuration a run used.
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
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PostStatus, Schedule};
    use crate::site::ListMethod;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const VALID_CONFIG: &str = r#"
[harvest]
max-retries = 2
request-delay = 0
parallel-threads = 4
chapter-threshold = 3
post-status = "draft"

[http]
user-agent = "TestHarvester/1.0"

[notifications]
enabled = true
email = "admin@example.com"

[schedule]
manga = "hourly"
chapters = "minute"

[output]
database-path = "./test.db"

[[proxy]]
url = "http://proxy.example.com"
port = 8080
username = "user"
password = "secret"

[[site]]
site-name = "Example"
base-url = "https://example.com"
manga-list-method = "POST"
manga-list-ajax = "/wp-admin/admin-ajax.php"
manga-list-ajax-params = "action=madara_load_more&page={page}"
manga-item = ".page-item-detail"
chapter-list = "li.wp-manga-chapter"
chapter-images = ".reading-content img"

[site.metadata]
description = ".summary__content"
genre = ".genres-content a"
type = ".post-content_item .summary-content"
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.harvest.max_retries, 2);
        assert_eq!(config.harvest.parallel_threads, 4);
        assert_eq!(config.harvest.chapter_threshold, 3);
        assert_eq!(config.harvest.post_status, PostStatus::Draft);
        assert_eq!(config.harvest.cache_duration, 300);
        assert_eq!(config.http.user_agent, "TestHarvester/1.0");
        assert_eq!(config.http.timeout, 15);
        assert!(config.notifications.enabled);
        assert_eq!(config.schedule.manga, Schedule::Hourly);
        assert_eq!(config.proxies.len(), 1);
        assert_eq!(config.proxies[0].port, 8080);
        assert_eq!(config.sites.len(), 1);

        let site = &config.sites[0];
        assert_eq!(site.manga_list_method, ListMethod::Post);
        assert_eq!(site.metadata.description, ".summary__content");
        assert_eq!(site.metadata.manga_type, ".post-content_item .summary-content");
        assert!(site.metadata.author.is_empty());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.harvest.max_retries, 3);
        assert_eq!(config.harvest.request_delay, 1);
        assert_eq!(config.harvest.parallel_threads, 1);
        assert_eq!(config.harvest.chapter_threshold, 1);
        assert_eq!(config.harvest.log_retention_days, 7);
        assert_eq!(config.http.max_redirects, 5);
        assert!(config.sites.is_empty());
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/harvest.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_list_method_is_rejected() {
        let content = VALID_CONFIG.replace("\"POST\"", "\"PUT\"");
        assert!(matches!(parse_config(&content), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let content = VALID_CONFIG.replace("parallel-threads = 4", "parallel-threads = 0");
        let result = parse_config(&content);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config(VALID_CONFIG);

        let (_, hash1) = load_config_with_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }
}
