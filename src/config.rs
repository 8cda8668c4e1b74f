//! TOML configuration parsing and validation.
//!
//! ```toml
//! [db]
//! path = "./data/malmail.sqlite"
//!
//! [crawl]
//! depth = 1
//! timeout_secs = 2
//! url_concurrency = 4
//! identity_concurrency = 1
//! # user_agents = ["..."]   # defaults to the built-in roster
//!
//! [mailbox]
//! root = "./mail"
//! include_globs = ["**/*.eml"]
//! trusted_senders = ["alerts@bank.example"]
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub mailbox: MailboxConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlConfig {
    #[serde(default = "default_depth")]
    pub depth: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_url_concurrency")]
    pub url_concurrency: usize,
    #[serde(default = "default_identity_concurrency")]
    pub identity_concurrency: usize,
    /// Identity roster presented as `User-Agent`, in request order.
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            depth: default_depth(),
            timeout_secs: default_timeout_secs(),
            url_concurrency: default_url_concurrency(),
            identity_concurrency: default_identity_concurrency(),
            user_agents: default_user_agents(),
        }
    }
}

impl CrawlConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_depth() -> usize {
    1
}
fn default_timeout_secs() -> u64 {
    2
}
fn default_url_concurrency() -> usize {
    4
}
fn default_identity_concurrency() -> usize {
    1
}

/// Built-in identity roster: desktop browsers spanning engines and eras.
pub const DEFAULT_USER_AGENTS: [&str; 9] = [
    // Chrome - OS X
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_6_7) AppleWebKit/535.1 (KHTML, like Gecko) Chrome/14.0.790.0 Safari/535.1",
    // Chrome - Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/535.1 (KHTML, like Gecko) Ubuntu/11.04 Chromium/13.0.782.41 Chrome/13.0.782.41 Safari/535.1",
    // Chrome - Windows XP
    "Mozilla/5.0 (Windows NT 5.1) AppleWebKit/535.1 (KHTML, like Gecko) Chrome/14.0.792.0 Safari/535.1",
    // Firefox - Windows XP
    "Mozilla/5.0 (Windows NT 5.1; rv:11.0) Gecko Firefox/11.0",
    // Firefox - Linux
    "Mozilla/5.0 (X11; Ubuntu; Linux i686; rv:15.0) Gecko/20100101 Firefox/15.0.1",
    // Firefox - OS X
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.6; rv:9.0a2) Gecko/20111101 Firefox/9.0a2",
    // Internet Explorer 8 - Windows XP
    "Mozilla/5.0 (compatible; MSIE 8.0; Windows NT 5.1; Trident/4.0; InfoPath.2; SLCC1; .NET CLR 3.0.4506.2152; .NET CLR 3.5.30729; .NET CLR 2.0.50727)",
    // Internet Explorer 9 - Windows 7
    "Mozilla/5.0 (compatible; MSIE 9.0; Windows NT 6.1; Win64; x64; Trident/5.0; .NET CLR 3.5.30729; .NET CLR 3.0.30729; .NET CLR 2.0.50727; Media Center PC 6.0)",
    // Internet Explorer 5.5 - Windows 98
    "Mozilla/4.0 (compatible;MSIE 5.5; Windows 98)",
];

fn default_user_agents() -> Vec<String> {
    DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailboxConfig {
    #[serde(default = "default_mailbox_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Sender addresses whose mail is flagged as trusted.
    #[serde(default)]
    pub trusted_senders: Vec<String>,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            root: default_mailbox_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            trusted_senders: Vec::new(),
        }
    }
}

fn default_mailbox_root() -> PathBuf {
    PathBuf::from("./mail")
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.eml".to_string()]
}

impl Config {
    /// Defaults for commands that can run without a config file.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/malmail.sqlite"),
            },
            crawl: CrawlConfig::default(),
            mailbox: MailboxConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    let crawl = &config.crawl;
    if crawl.depth == 0 {
        anyhow::bail!("crawl.depth must be >= 1");
    }
    if crawl.timeout_secs == 0 {
        anyhow::bail!("crawl.timeout_secs must be >= 1");
    }
    if crawl.url_concurrency == 0 {
        anyhow::bail!("crawl.url_concurrency must be >= 1");
    }
    if crawl.identity_concurrency == 0 {
        anyhow::bail!("crawl.identity_concurrency must be >= 1");
    }
    if crawl.user_agents.is_empty() {
        anyhow::bail!("crawl.user_agents must list at least one identity");
    }
    if crawl.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        anyhow::bail!("crawl.user_agents must not contain empty identities");
    }
    Ok(())
}
