use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub dlq: DlqConfig,
    #[serde(default)]
    pub topic: TopicConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub distribution: DistributionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("aurora.db")
}

/// Where run artifacts (text, audio, video files) are written.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_runs_dir")]
    pub runs_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            runs_dir: default_runs_dir(),
        }
    }
}

fn default_runs_dir() -> PathBuf {
    PathBuf::from("runs")
}

/// Pipeline switches. This section is required.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Master switch for scheduled runs. Manual triggers work regardless.
    pub enabled: bool,
    /// Allow a new run to start while another one is still active.
    #[serde(default)]
    pub allow_concurrent_runs: bool,
}

/// Scheduler cadence.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduled runs.
    #[serde(default = "default_schedule_interval")]
    pub interval_secs: u64,
    /// Fire one run immediately when the scheduler starts.
    #[serde(default)]
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_schedule_interval(),
            run_on_start: false,
        }
    }
}

fn default_schedule_interval() -> u64 {
    12 * 60 * 60
}

/// Retry policy applied around every stage call.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Total attempts per stage call (including the first one).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for generic errors.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
    /// Base delay for rate-limit errors.
    #[serde(default = "default_rate_limit_backoff_base")]
    pub rate_limit_backoff_base_ms: u64,
    /// Upper bound for a single delay.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    /// Add up to 25% random jitter to each delay.
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base(),
            rate_limit_backoff_base_ms: default_rate_limit_backoff_base(),
            max_backoff_ms: default_max_backoff(),
            jitter: false,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    1000
}

fn default_rate_limit_backoff_base() -> u64 {
    2000
}

fn default_max_backoff() -> u64 {
    60_000
}

/// Dead-letter queue processing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DlqConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between processor passes.
    #[serde(default = "default_dlq_interval")]
    pub interval_secs: u64,
    /// Replay budget assigned to new entries.
    #[serde(default = "default_dlq_max_retries")]
    pub max_retries: u32,
    /// Entries stuck in `retrying` longer than this are requeued at startup.
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

impl Default for DlqConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_dlq_interval(),
            max_retries: default_dlq_max_retries(),
            stale_after_secs: default_stale_after(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_dlq_interval() -> u64 {
    5 * 60
}

fn default_dlq_max_retries() -> u32 {
    3
}

fn default_stale_after() -> u64 {
    15 * 60
}

/// Topic selection.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TopicConfig {
    #[serde(default)]
    pub source: TopicSourceKind,
    /// Endpoint returning `{id, label, weight?, metadata?}` (required when source = "external")
    #[serde(default)]
    pub external_url: Option<String>,
    #[serde(default = "default_topic_timeout")]
    pub timeout_secs: u64,
}

fn default_topic_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TopicSourceKind {
    #[default]
    Internal,
    External,
}

/// External provider credentials and endpoints.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub text: TextProviderConfig,
    #[serde(default)]
    pub voice: VoiceProviderConfig,
    #[serde(default)]
    pub video: VideoProviderConfig,
}

/// LLM chat-completion provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TextProviderConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_text_api_base")]
    pub api_base: String,
    #[serde(default = "default_text_model")]
    pub model: String,
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

impl Default for TextProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_text_api_base(),
            model: default_text_model(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

fn default_text_api_base() -> String {
    "https://api.openai.com".to_string()
}

fn default_text_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_provider_timeout() -> u64 {
    60
}

/// Text-to-speech provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VoiceProviderConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_voice_api_base")]
    pub api_base: String,
    #[serde(default = "default_voice_id")]
    pub voice_id: String,
    #[serde(default = "default_voice_model")]
    pub model_id: String,
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

impl Default for VoiceProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_voice_api_base(),
            voice_id: default_voice_id(),
            model_id: default_voice_model(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

fn default_voice_api_base() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_voice_id() -> String {
    "SAz9YHcvj6GT2YYXdXww".to_string()
}

fn default_voice_model() -> String {
    "eleven_multilingual_v2".to_string()
}

/// Avatar video provider (submit + poll).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VideoProviderConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_video_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub avatar_id: Option<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Wall-clock budget for a single render before falling back to a placeholder.
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,
}

impl Default for VideoProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_video_api_base(),
            avatar_id: None,
            poll_interval_secs: default_poll_interval(),
            max_wait_secs: default_max_wait(),
        }
    }
}

fn default_video_api_base() -> String {
    "https://api.heygen.com".to_string()
}

fn default_poll_interval() -> u64 {
    10
}

fn default_max_wait() -> u64 {
    600
}

/// Distribution targets.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DistributionConfig {
    #[serde(default = "default_platforms")]
    pub platforms: Vec<PlatformConfig>,
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            platforms: default_platforms(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

fn default_platforms() -> Vec<PlatformConfig> {
    vec![PlatformConfig::named("twitter"), PlatformConfig::named("youtube")]
}

/// A single publishing target. Without a webhook the receipt is simulated.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlatformConfig {
    pub name: String,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

impl PlatformConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            webhook_url: None,
            token: None,
        }
    }
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    pub scheduler: SchedulerConfig,
    pub retry: RetryConfig,
    pub dlq: DlqConfig,
    pub topic: SanitizedTopicConfig,
    pub providers: SanitizedProvidersConfig,
    pub distribution: Vec<SanitizedPlatformConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedTopicConfig {
    pub source: TopicSourceKind,
    pub external_url_configured: bool,
}

/// Provider credentials are reported only as booleans.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedProvidersConfig {
    pub text_configured: bool,
    pub text_model: String,
    pub voice_configured: bool,
    pub video_configured: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedPlatformConfig {
    pub name: String,
    pub webhook_configured: bool,
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            storage: config.storage.clone(),
            pipeline: config.pipeline.clone(),
            scheduler: config.scheduler.clone(),
            retry: config.retry.clone(),
            dlq: config.dlq.clone(),
            topic: SanitizedTopicConfig {
                source: config.topic.source,
                external_url_configured: is_set(&config.topic.external_url),
            },
            providers: SanitizedProvidersConfig {
                text_configured: is_set(&config.providers.text.api_key),
                text_model: config.providers.text.model.clone(),
                voice_configured: is_set(&config.providers.voice.api_key),
                video_configured: is_set(&config.providers.video.api_key),
            },
            distribution: config
                .distribution
                .platforms
                .iter()
                .map(|p| SanitizedPlatformConfig {
                    name: p.name.clone(),
                    webhook_configured: is_set(&p.webhook_url),
                })
                .collect(),
        }
    }
}

impl Config {
    /// Minimal config with every optional section defaulted.
    pub fn with_pipeline(pipeline: PipelineConfig) -> Self {
        Self {
            pipeline,
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            scheduler: SchedulerConfig::default(),
            retry: RetryConfig::default(),
            dlq: DlqConfig::default(),
            topic: TopicConfig::default(),
            providers: ProvidersConfig::default(),
            distribution: DistributionConfig::default(),
        }
    }
}
