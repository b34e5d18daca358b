use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    cache::CacheStore,
    catalog::{CatalogConfig, Catalogs},
    fetcher::CatalogFetcher,
    http::{HttpClient, INITIAL_DELAY_MS, MAX_ATTEMPTS, RetryPolicy},
    prompt::PromptSelector,
    resolver::{FirstCandidate, Resolver, Selector},
};

/// Runtime knobs shared by every command.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub max_attempts: usize,
    pub retry_delay: Duration,
    pub timeout: Option<Duration>,
    pub use_cache: bool,
    pub pick_first: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            retry_delay: Duration::from_millis(INITIAL_DELAY_MS),
            timeout: None,
            use_cache: true,
            pick_first: false,
        }
    }
}

pub struct Config {
    pub catalogs: Catalogs,
    pub fetcher: CatalogFetcher,
    pub selector: Arc<dyn Selector>,
    pub options: Options,
}

impl Config {
    pub fn new(catalogs: Catalogs, options: Options) -> Result<Self> {
        let client = Client::builder()
            .user_agent("catres-cli")
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let policy = RetryPolicy::new(options.max_attempts, options.retry_delay);
        let http = HttpClient::with_policy(client, policy);
        let fetcher = CatalogFetcher::new(http, CacheStore::new()).use_cache(options.use_cache);

        let selector: Arc<dyn Selector> = if options.pick_first {
            Arc::new(FirstCandidate)
        } else {
            Arc::new(PromptSelector)
        };

        debug!(
            "Using {} catalog(s): {}",
            catalogs.len(),
            catalogs.names().join(", ")
        );

        Ok(Self {
            catalogs,
            fetcher,
            selector,
            options,
        })
    }

    pub fn resolver(&self) -> Resolver {
        Resolver::new(Arc::new(self.fetcher.clone()), self.selector.clone())
    }
}

/// Builds the catalog set from the command line.
///
/// `json` (a JSON object of name to url or `{url, headers}`) is read first,
/// then each `NAME=URL` in `catalogs` adds or replaces an entry, then each
/// `NAME:KEY=VALUE` in `headers` attaches a header. With nothing configured
/// the default catalog is used.
pub fn parse_catalogs(catalogs: &[String], headers: &[String], json: Option<&str>) -> Result<Catalogs> {
    let mut parsed = match json.map(str::trim).filter(|j| !j.is_empty()) {
        Some(json) => serde_json::from_str::<Catalogs>(json).context("Invalid catalogs JSON")?,
        None => Catalogs::new(),
    };

    for arg in catalogs {
        let (name, url) = arg
            .split_once('=')
            .filter(|(n, u)| !n.trim().is_empty() && !u.trim().is_empty())
            .ok_or_else(|| anyhow!("Invalid catalog '{}', expected NAME=URL", arg))?;
        parsed.insert(name.trim(), CatalogConfig::simple(url.trim()));
    }

    for arg in headers {
        let (name, key, value) = arg
            .split_once(':')
            .and_then(|(name, rest)| rest.split_once('=').map(|(k, v)| (name, k, v)))
            .filter(|(n, k, _)| !n.trim().is_empty() && !k.trim().is_empty())
            .ok_or_else(|| anyhow!("Invalid header '{}', expected NAME:KEY=VALUE", arg))?;

        let Some(existing) = parsed.get(name.trim()) else {
            bail!("Header given for unknown catalog '{}'", name.trim());
        };
        let url = existing.url().to_string();
        let mut merged = existing.headers().clone();
        merged.insert(key.trim().to_string(), value.to_string());
        parsed.insert(name.trim(), CatalogConfig::authenticated(url, merged));
    }

    if parsed.is_empty() {
        return Ok(Catalogs::default_catalogs());
    }
    Ok(parsed)
}
