use serde::Deserialize;

/// Main configuration structure for Label-Sieve
///
/// Every section falls back to its defaults, so an empty file (or no file at
/// all) yields a working configuration against the public DailyMed site.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search: SearchConfig,
    pub fetcher: FetcherConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub analysis: AnalysisConfig,
    pub output: OutputConfig,
}

/// Search endpoint and pagination configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Search endpoint URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Label-type filter sent with every search request
    #[serde(rename = "label-type")]
    pub label_type: String,

    /// Results per page (the site's maximum)
    #[serde(rename = "page-size")]
    pub page_size: u32,

    /// Safety bound on the number of result pages fetched
    #[serde(rename = "max-pages")]
    pub max_pages: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://dailymed.nlm.nih.gov/dailymed/search.cfm".to_string(),
            label_type: "all".to_string(),
            page_size: 200,
            max_pages: 50,
        }
    }
}

/// Rate limiting and retry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Minimum time between search-page requests (milliseconds)
    #[serde(rename = "pagination-delay-ms")]
    pub pagination_delay_ms: u64,

    /// Minimum time between label-page requests (milliseconds)
    #[serde(rename = "label-delay-ms")]
    pub label_delay_ms: u64,

    /// Total attempts per URL, including the first
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt (milliseconds)
    #[serde(rename = "backoff-base-ms")]
    pub backoff_base_ms: u64,

    /// Factor applied to the backoff after each further failure
    #[serde(rename = "backoff-multiplier")]
    pub backoff_multiplier: u32,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            pagination_delay_ms: 1000,
            label_delay_ms: 500,
            max_attempts: 3,
            backoff_base_ms: 2000,
            backoff_multiplier: 2,
            timeout_secs: 30,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "LabelSieve".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.org/label-sieve".to_string(),
            contact_email: "label-sieve@example.org".to_string(),
        }
    }
}

/// Probabilistic analysis backend configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Base URL of an OpenAI-compatible API
    pub endpoint: String,

    /// Model used for classification and extraction prompts
    pub model: String,

    /// Environment variable holding the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// Per-call timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Sampling temperature
    pub temperature: f32,

    /// Backend faults tolerated before falling back for the rest of the run
    #[serde(rename = "max-failures")]
    pub max_failures: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
            temperature: 0.1,
            max_failures: 3,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for reports written under their default name
    pub directory: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: ".".to_string(),
        }
    }
}
