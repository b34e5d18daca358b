pub mod cache;
pub mod catalog;
pub mod commands;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod locator;
pub mod prompt;
pub mod reference;
pub mod resolver;
pub mod similarity;

pub use cache::{CacheEntry, CacheStore};
pub use catalog::{CatalogConfig, CatalogIndex, Catalogs, DistributableItem, ItemFile, ItemType};
pub use error::{ResolveError, Result};
pub use fetcher::{CatalogFetcher, CatalogSource, Fetched};
pub use locator::{CatalogMatch, Locator};
pub use prompt::PromptSelector;
pub use reference::ItemRef;
pub use resolver::{
    Candidate, DependencyTree, FirstCandidate, ResolvedItem, Resolver, Selector,
    collect_dev_dependencies, collect_external_dependencies, collect_files_in_order,
};
