use anyhow::{Result, bail};
use log::debug;
use std::io::Write;

use crate::{catalog::Headers, reference::is_url};

use super::config::Config;

/// Prints the content served at `url`, through the raw cache partition.
///
/// Requests for a URL under a configured catalog carry that catalog's
/// headers.
#[tracing::instrument(skip(config, output))]
pub async fn raw<W: Write>(config: &Config, url: &str, output: &mut W) -> Result<()> {
    if !is_url(url) {
        bail!("'{}' is not an http(s) URL", url);
    }

    let headers = headers_for(config, url);
    let fetched = config
        .fetcher
        .fetch_raw(url, &headers, config.options.use_cache)
        .await?;
    debug!("Fetched {} bytes from {} (cached: {})", fetched.data.len(), url, fetched.cached);

    output.write_all(fetched.data.as_bytes())?;
    if !fetched.data.ends_with('\n') {
        writeln!(output)?;
    }
    Ok(())
}

fn headers_for(config: &Config, url: &str) -> Headers {
    config
        .catalogs
        .iter()
        .map(|(_, catalog)| catalog)
        .filter(|catalog| !catalog.is_template())
        .find(|catalog| {
            let base = catalog.url().trim_end_matches("registry.json").trim_end_matches('/');
            url.starts_with(base)
        })
        .map(|catalog| catalog.headers().clone())
        .unwrap_or_default()
}
