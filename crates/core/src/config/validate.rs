use super::{types::Config, ConfigError, TopicSourceKind};

/// Validate configuration
/// Currently validates:
/// - Pipeline section exists (enforced by serde)
/// - Server port is not 0
/// - Database path and runs directory are set
/// - Retry and scheduling values are usable
/// - Distribution has at least one uniquely named platform
/// - External topic source has a URL
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.database.path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "database.path cannot be empty".to_string(),
        ));
    }

    if config.storage.runs_dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "storage.runs_dir cannot be empty".to_string(),
        ));
    }

    validate_pipeline_config(config)
}

/// The subset of checks the orchestrator repeats before every run.
pub fn validate_pipeline_config(config: &Config) -> Result<(), ConfigError> {
    if config.retry.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "retry.max_attempts must be at least 1".to_string(),
        ));
    }

    if config.scheduler.interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.interval_secs cannot be 0".to_string(),
        ));
    }

    if config.dlq.interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "dlq.interval_secs cannot be 0".to_string(),
        ));
    }

    if config.dlq.max_retries == 0 {
        return Err(ConfigError::ValidationError(
            "dlq.max_retries must be at least 1".to_string(),
        ));
    }

    if config.topic.source == TopicSourceKind::External
        && config
            .topic
            .external_url
            .as_deref()
            .is_none_or(|u| u.trim().is_empty())
    {
        return Err(ConfigError::ValidationError(
            "topic.external_url is required when topic.source = \"external\"".to_string(),
        ));
    }

    let platforms = &config.distribution.platforms;
    if platforms.is_empty() {
        return Err(ConfigError::ValidationError(
            "distribution.platforms must list at least one platform".to_string(),
        ));
    }
    for (i, platform) in platforms.iter().enumerate() {
        if platform.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "distribution.platforms[{}].name cannot be empty",
                i
            )));
        }
        if platforms[..i].iter().any(|p| p.name == platform.name) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate distribution platform: {}",
                platform.name
            )));
        }
    }

    Ok(())
}

/// Provider credentials that are absent. Those stages run on placeholders.
pub fn missing_credentials(config: &Config) -> Vec<&'static str> {
    let mut missing = Vec::new();
    let unset = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());

    if unset(&config.providers.text.api_key) {
        missing.push("providers.text.api_key");
    }
    if unset(&config.providers.voice.api_key) {
        missing.push("providers.voice.api_key");
    }
    if unset(&config.providers.video.api_key) {
        missing.push("providers.video.api_key");
    }
    missing
}
