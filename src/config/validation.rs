use crate::config::types::{Config, HarvestConfig, HttpConfig, NotificationConfig, OutputConfig};
use crate::fetcher::ProxyConfig;
use crate::site::SiteRegistry;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_harvest_config(&config.harvest)?;
    validate_http_config(&config.http)?;
    validate_notification_config(&config.notifications)?;
    validate_output_config(&config.output)?;
    validate_proxies(&config.proxies)?;
    SiteRegistry::new(config.sites.clone())?;
    Ok(())
}

/// Validates pipeline tunables
fn validate_harvest_config(config: &HarvestConfig) -> Result<(), ConfigError> {
    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be between 0 and 10, got {}",
            config.max_retries
        )));
    }

    if config.parallel_threads < 1 || config.parallel_threads > 10 {
        return Err(ConfigError::Validation(format!(
            "parallel-threads must be between 1 and 10, got {}",
            config.parallel_threads
        )));
    }

    if config.chapter_threshold < 1 {
        return Err(ConfigError::Validation(format!(
            "chapter-threshold must be >= 1, got {}",
            config.chapter_threshold
        )));
    }

    if config.log_retention_days < 1 {
        return Err(ConfigError::Validation(format!(
            "log-retention-days must be >= 1, got {}",
            config.log_retention_days
        )));
    }

    Ok(())
}

/// Validates HTTP client configuration
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.timeout < 1 {
        return Err(ConfigError::Validation(format!(
            "timeout must be >= 1 second, got {}",
            config.timeout
        )));
    }

    Ok(())
}

/// Validates notification configuration
fn validate_notification_config(config: &NotificationConfig) -> Result<(), ConfigError> {
    if config.enabled {
        validate_email(&config.email)?;
    }
    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates proxy entries
fn validate_proxies(proxies: &[ProxyConfig]) -> Result<(), ConfigError> {
    for proxy in proxies {
        let url = Url::parse(&proxy.url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid proxy url '{}': {}", proxy.url, e))
        })?;

        if url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl(format!(
                "Proxy url '{}' has no host",
                proxy.url
            )));
        }

        if proxy.port == 0 {
            return Err(ConfigError::Validation(format!(
                "Proxy '{}' must have a non-zero port",
                proxy.url
            )));
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "notification email cannot be empty".to_string(),
        ));
    }

    // Basic email format check: must contain @ and have text on both sides
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_harvest_bounds() {
        let mut config = HarvestConfig::default();
        assert!(validate_harvest_config(&config).is_ok());

        config.max_retries = 11;
        assert!(validate_harvest_config(&config).is_err());
        config.max_retries = 10;
        assert!(validate_harvest_config(&config).is_ok());

        config.parallel_threads = 11;
        assert!(validate_harvest_config(&config).is_err());
        config.parallel_threads = 1;

        config.chapter_threshold = 0;
        assert!(validate_harvest_config(&config).is_err());
        config.chapter_threshold = 1;

        config.log_retention_days = 0;
        assert!(validate_harvest_config(&config).is_err());
    }

    #[test]
    fn test_validate_proxies() {
        let proxy = |url: &str, port: u16| ProxyConfig {
            url: url.to_string(),
            port,
            username: String::new(),
            password: String::new(),
        };

        assert!(validate_proxies(&[proxy("http://proxy.example.com", 8080)]).is_ok());
        assert!(validate_proxies(&[proxy("not a url", 8080)]).is_err());
        assert!(validate_proxies(&[proxy("http://proxy.example.com", 0)]).is_err());
    }

    #[test]
    fn test_notifications_require_email_only_when_enabled() {
        let mut config = NotificationConfig::default();
        assert!(validate_notification_config(&config).is_ok());

        config.enabled = true;
        assert!(validate_notification_config(&config).is_err());

        config.email = "ops@example.com".to_string();
        assert!(validate_notification_config(&config).is_ok());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("admin@sub.example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());
    }
}
