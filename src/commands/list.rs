use anyhow::Result;
use log::{debug, warn};
use std::io::Write;

use crate::reference::index_url;

use super::config::Config;

/// Lists the items of every configured catalog that has an index.
///
/// Template catalogs only serve single items, so they are named but not
/// enumerated. An unreachable catalog is reported and skipped.
#[tracing::instrument(skip(config, output))]
pub async fn list<W: Write>(config: &Config, output: &mut W) -> Result<()> {
    for (name, catalog) in config.catalogs.iter() {
        if catalog.is_template() {
            writeln!(output, "{} ({}): items are fetched by name", name, catalog.url())?;
            continue;
        }

        let url = index_url(catalog.url());
        debug!("Listing catalog '{}' from {}", name, url);
        let fetched = match config
            .fetcher
            .fetch_index(&url, catalog.headers(), config.options.use_cache)
            .await
        {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("Cannot list catalog '{}': {}", name, e);
                writeln!(output, "{} ({}): unavailable", name, url)?;
                continue;
            }
        };

        let index = fetched.data;
        writeln!(output, "{} ({}): {} item(s)", name, url, index.items.len())?;
        for item in &index.items {
            match &item.description {
                Some(description) => {
                    writeln!(output, "  {} [{}] {}", item.name, item.kind, description)?
                }
                None => writeln!(output, "  {} [{}]", item.name, item.kind)?,
            }
        }
    }
    Ok(())
}
