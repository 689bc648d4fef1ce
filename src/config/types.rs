use crate::output::WriteMode;
use serde::Deserialize;

/// Main configuration structure for Listing-Harvester
///
/// Every section falls back to its defaults, so an empty file (or no file at all)
/// yields a usable configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub crawler: CrawlerConfig,
    pub fetch: FetchConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Target site and its search parameter names
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SiteConfig {
    /// Origin that relative listing and page references are joined against
    pub base_url: String,

    /// Path of the search endpoint below the origin
    pub search_path: String,

    /// Query parameter carrying the search term
    pub query_param: String,

    /// Query parameter carrying the numeric result offset
    pub offset_param: String,

    /// Query parameter carrying the shard key (postal code)
    pub shard_param: String,

    /// Parameters appended to every search URL verbatim
    pub fixed_params: Vec<(String, String)>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.dasoertliche.de".to_string(),
            search_path: "/".to_string(),
            query_param: "kw".to_string(),
            offset_param: "recFrom".to_string(),
            shard_param: "ci".to_string(),
            fixed_params: vec![("form_name".to_string(), "search_nat".to_string())],
        }
    }
}

/// How workers share the courtesy delay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pacing {
    /// Each worker paces its own requests
    #[default]
    PerWorker,
    /// All workers of a page share one limiter
    Shared,
}

/// Crawl behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum number of concurrent detail enrichments per page
    pub workers: u32,

    /// Maximum number of start URLs crawled concurrently in URL-list mode
    pub url_workers: u32,

    /// Minimum time between the starts of two requests on one limiter (milliseconds)
    pub min_interval_ms: u64,

    /// Limiter sharing policy
    pub pacing: Pacing,

    /// Maximum pages per shard, 0 for unbounded
    pub max_pages: u32,

    /// Maximum records written per shard, 0 for unbounded
    pub max_records: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            url_workers: 3,
            min_interval_ms: 1000,
            pacing: Pacing::PerWorker,
            max_pages: 0,
            max_records: 0,
        }
    }
}

/// HTTP fetch and retry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FetchConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Total attempts per fetch, including the first one
    pub max_attempts: u32,

    /// Lower bound of the delay between attempts (milliseconds)
    pub retry_delay_min_ms: u64,

    /// Upper bound of the delay between attempts (milliseconds)
    pub retry_delay_max_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_attempts: 3,
            retry_delay_min_ms: 5_000,
            retry_delay_max_ms: 15_000,
        }
    }
}

/// Request identity configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Pool of user agents; one is picked at random per run
    pub agents: Vec<String>,

    /// Cookie header sent with every request
    pub consent_cookie: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15".to_string(),
                "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0".to_string(),
            ],
            consent_cookie: "CONSENT=YES+".to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Directory the sinks are created in
    pub directory: String,

    /// What to do with an existing sink for the same (query, shard) pair
    pub mode: WriteMode,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "data".to_string(),
            mode: WriteMode::Append,
        }
    }
}

/// Command-line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub workers: Option<u32>,
    pub url_workers: Option<u32>,
    pub max_pages: Option<u32>,
    pub max_records: Option<u64>,
    pub mode: Option<WriteMode>,
    pub output_directory: Option<String>,
}

impl Config {
    /// Applies command-line overrides on top of the loaded values
    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Self {
        if let Some(workers) = overrides.workers {
            self.crawler.workers = workers;
        }
        if let Some(url_workers) = overrides.url_workers {
            self.crawler.url_workers = url_workers;
        }
        if let Some(max_pages) = overrides.max_pages {
            self.crawler.max_pages = max_pages;
        }
        if let Some(max_records) = overrides.max_records {
            self.crawler.max_records = max_records;
        }
        if let Some(mode) = overrides.mode {
            self.output.mode = mode;
        }
        if let Some(directory) = &overrides.output_directory {
            self.output.directory = directory.clone();
        }
        self
    }
}
