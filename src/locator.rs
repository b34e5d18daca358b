//! Finds which configured catalogs contain a named item.

use log::{debug, warn};
use std::sync::Arc;

use crate::catalog::{CatalogConfig, Catalogs, DistributableItem};
use crate::error::{ResolveError, Result};
use crate::fetcher::CatalogSource;
use crate::reference::{ItemRef, build_conventional_item_url, index_url};

/// An item found in a specific catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogMatch {
    pub catalog_name: String,
    pub catalog_url: String,
    /// URL the item is served at.
    pub item_url: String,
    pub item: Arc<DistributableItem>,
}

/// Searches catalogs for items through a [`CatalogSource`].
#[derive(Clone)]
pub struct Locator {
    source: Arc<dyn CatalogSource>,
}

impl Locator {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self { source }
    }

    /// All catalogs containing the referenced item, in declaration order.
    ///
    /// `@catalog/name` only searches `catalog`. A plain name searches every
    /// catalog and never stops at the first hit. A catalog that cannot be
    /// reached counts as not containing the item.
    #[tracing::instrument(skip(self, catalogs))]
    pub async fn locate(&self, item_ref: &ItemRef, catalogs: &Catalogs) -> Result<Vec<CatalogMatch>> {
        let (name, targets): (&str, Vec<(&str, &CatalogConfig)>) = match item_ref {
            ItemRef::PlainName(name) => (name.as_str(), catalogs.iter().collect()),
            ItemRef::Namespaced { catalog, name } => {
                let target = catalogs.iter().find(|(n, _)| {
                    n.trim_start_matches('@') == catalog.trim_start_matches('@')
                });
                if target.is_none() {
                    debug!("Catalog '{}' is not configured", catalog);
                }
                (name.as_str(), target.into_iter().collect())
            }
            other => {
                return Err(ResolveError::parse(
                    &other.to_string(),
                    "direct references are fetched, not located",
                ));
            }
        };

        let mut matches = Vec::new();
        let mut rate_limited = None;

        for (catalog_name, config) in targets {
            match self.search_catalog(catalog_name, config, name).await {
                Ok(Some(found)) => {
                    debug!("Found '{}' in catalog '{}'", name, catalog_name);
                    matches.push(found);
                }
                Ok(None) => debug!("'{}' not in catalog '{}'", name, catalog_name),
                Err(e) => {
                    warn!("Skipping catalog '{}': {}", catalog_name, e);
                    if matches!(e, ResolveError::RateLimit { .. }) && rate_limited.is_none() {
                        rate_limited = Some(e);
                    }
                }
            }
        }

        match rate_limited {
            Some(e) if matches.is_empty() => Err(e),
            _ => Ok(matches),
        }
    }

    /// Looks for `name` in one catalog.
    ///
    /// Template catalogs are queried at the substituted URL. Others are
    /// searched through their index first, then at the conventional item URL.
    async fn search_catalog(
        &self,
        catalog_name: &str,
        config: &CatalogConfig,
        name: &str,
    ) -> Result<Option<CatalogMatch>> {
        let found = |item_url: String, item: Arc<DistributableItem>| CatalogMatch {
            catalog_name: catalog_name.to_string(),
            catalog_url: config.url().to_string(),
            item_url,
            item,
        };

        if let Some(item_url) = config.item_url(name) {
            return match self.source.fetch_item(&item_url, config.headers()).await {
                Ok(item) => Ok(Some(found(item_url, item))),
                Err(e) => not_found_or(e),
            };
        }

        let item_url = build_conventional_item_url(config.url(), name);

        match self
            .source
            .fetch_index(&index_url(config.url()), config.headers())
            .await
        {
            Ok(index) => {
                if let Some(item) = index.find(name) {
                    return Ok(Some(found(item_url, Arc::new(item.clone()))));
                }
            }
            Err(e @ ResolveError::RateLimit { .. }) => return Err(e),
            Err(e) => debug!("Index of '{}' unavailable: {}", catalog_name, e),
        }

        match self.source.fetch_item(&item_url, config.headers()).await {
            Ok(item) => Ok(Some(found(item_url, item))),
            Err(e) => not_found_or(e),
        }
    }

    /// Item names listed by every reachable catalog index, deduplicated.
    pub async fn candidate_names(&self, catalogs: &Catalogs) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for (catalog_name, config) in catalogs.iter() {
            if config.is_template() {
                continue;
            }
            match self
                .source
                .fetch_index(&index_url(config.url()), config.headers())
                .await
            {
                Ok(index) => {
                    for name in index.item_names() {
                        if !names.iter().any(|n| n == name) {
                            names.push(name.to_string());
                        }
                    }
                }
                Err(e) => debug!("No index for '{}': {}", catalog_name, e),
            }
        }
        names
    }
}

/// A 404 just means the catalog lacks the item; anything else is reported.
fn not_found_or(e: ResolveError) -> Result<Option<CatalogMatch>> {
    match e {
        ResolveError::CatalogFetch {
            status: Some(404), ..
        } => Ok(None),
        other => Err(other),
    }
}
