//! Catalog configuration normalized into a single internal shape.

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::reference::{is_template, substitute_template};

pub const DEFAULT_CATALOG_NAME: &str = "default";
pub const DEFAULT_CATALOG_URL: &str = "https://ui.shadcn.com/r/{name}.json";

/// Extra request headers for an authenticated catalog.
pub type Headers = BTreeMap<String, String>;

/// Headers used for catalogs that need none.
pub static NO_HEADERS: Headers = BTreeMap::new();

/// Shapes accepted from caller configuration.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawCatalogConfig {
    Url(String),
    WithHeaders {
        url: String,
        #[serde(default)]
        headers: Headers,
    },
}

/// Where a catalog lives and how to authenticate against it.
///
/// Either variant's URL may be a template containing `{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CatalogConfig {
    Simple(String),
    Authenticated {
        url: String,
        headers: Headers,
    },
}

impl CatalogConfig {
    pub fn simple(url: impl Into<String>) -> Self {
        CatalogConfig::Simple(url.into())
    }

    /// Header values may reference environment variables as `${VAR}`.
    pub fn authenticated(url: impl Into<String>, headers: Headers) -> Self {
        Self::authenticated_with(url, headers, |key| std::env::var(key).ok())
    }

    fn authenticated_with<F>(url: impl Into<String>, headers: Headers, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = url.into();
        if headers.is_empty() {
            return CatalogConfig::Simple(url);
        }
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k, expand_env(&v, &lookup)))
            .collect();
        CatalogConfig::Authenticated { url, headers }
    }

    pub fn url(&self) -> &str {
        match self {
            CatalogConfig::Simple(url) => url,
            CatalogConfig::Authenticated { url, .. } => url,
        }
    }

    pub fn headers(&self) -> &Headers {
        match self {
            CatalogConfig::Simple(_) => &NO_HEADERS,
            CatalogConfig::Authenticated { headers, .. } => headers,
        }
    }

    pub fn is_template(&self) -> bool {
        is_template(self.url())
    }

    /// URL for `name` when this catalog is a template.
    pub fn item_url(&self, name: &str) -> Option<String> {
        self.is_template()
            .then(|| substitute_template(self.url(), name))
    }
}

impl From<RawCatalogConfig> for CatalogConfig {
    fn from(raw: RawCatalogConfig) -> Self {
        match raw {
            RawCatalogConfig::Url(url) => CatalogConfig::Simple(url),
            RawCatalogConfig::WithHeaders { url, headers } => {
                CatalogConfig::authenticated(url, headers)
            }
        }
    }
}

impl<'de> Deserialize<'de> for CatalogConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawCatalogConfig::deserialize(deserializer).map(Into::into)
    }
}

/// Expand `${VAR}` occurrences; unknown variables expand to nothing.
fn expand_env<F>(value: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                out.push_str(&lookup(&after[..end]).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Catalogs keyed by name, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalogs {
    entries: Vec<(String, CatalogConfig)>,
}

impl Catalogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a catalog. A replaced catalog keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, config: CatalogConfig) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = config,
            None => self.entries.push((name, config)),
        }
    }

    /// Builder-style [`Catalogs::insert`].
    pub fn with(mut self, name: impl Into<String>, config: CatalogConfig) -> Self {
        self.insert(name, config);
        self
    }

    /// Looks up `name`, also accepting it with or without a leading `@`.
    pub fn get(&self, name: &str) -> Option<&CatalogConfig> {
        let bare = name.trim_start_matches('@');
        self.entries
            .iter()
            .find(|(n, _)| n == name || n.trim_start_matches('@') == bare)
            .map(|(_, c)| c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CatalogConfig)> {
        self.entries.iter().map(|(n, c)| (n.as_str(), c))
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The catalog used when the caller configures none.
    pub fn default_catalogs() -> Self {
        Self::new().with(DEFAULT_CATALOG_NAME, CatalogConfig::simple(DEFAULT_CATALOG_URL))
    }
}

impl<'de> Deserialize<'de> for Catalogs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CatalogsVisitor;

        impl<'de> Visitor<'de> for CatalogsVisitor {
            type Value = Catalogs;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of catalog name to url or {url, headers}")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Catalogs, A::Error> {
                let mut catalogs = Catalogs::new();
                while let Some((name, config)) = map.next_entry::<String, CatalogConfig>()? {
                    if config.url().trim().is_empty() {
                        return Err(de::Error::custom(format!(
                            "catalog '{}' has an empty url",
                            name
                        )));
                    }
                    catalogs.insert(name, config);
                }
                Ok(catalogs)
            }
        }

        deserializer.deserialize_map(CatalogsVisitor)
    }
}
