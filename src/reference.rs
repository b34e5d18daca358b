//! Item reference parsing and catalog URL helpers.

use std::fmt;
use std::str::FromStr;

use crate::error::{ResolveError, Result};

/// Placeholder substituted with the item name in catalog URL templates.
pub const NAME_PLACEHOLDER: &str = "{name}";

/// Conventional catalog index filename.
pub const INDEX_FILENAME: &str = "registry.json";

/// Path segment under which catalogs conventionally serve single items.
pub const ITEMS_SUBPATH: &str = "r";

const SHORT_REPO_PREFIX: &str = "github:";

/// A classified item reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemRef {
    /// `https://example.com/r/button.json`
    DirectUrl(String),
    /// `@acme/button`
    Namespaced { catalog: String, name: String },
    /// `github:owner/repo[/path]`
    ShortRepo {
        owner: String,
        repo: String,
        path: Option<String>,
    },
    /// `button`
    PlainName(String),
}

impl ItemRef {
    /// Classify a reference purely by its shape.
    pub fn classify(reference: &str) -> Result<Self> {
        reference.parse()
    }

    /// Name used for deduplication and cycle detection.
    pub fn key(&self) -> String {
        match self {
            ItemRef::DirectUrl(url) => name_from_url(url),
            ItemRef::Namespaced { name, .. } => name.clone(),
            ItemRef::ShortRepo { repo, path, .. } => match path {
                Some(p) => name_from_url(p),
                None => repo.clone(),
            },
            ItemRef::PlainName(name) => name.clone(),
        }
    }

    /// URL to fetch directly, for references that bypass catalog lookup.
    pub fn direct_url(&self) -> Option<String> {
        match self {
            ItemRef::DirectUrl(url) => Some(url.clone()),
            ItemRef::ShortRepo { owner, repo, path } => {
                let file = match path {
                    Some(p) if p.ends_with(".json") => p.clone(),
                    Some(p) => format!("{}.json", p),
                    None => "registry-item.json".to_string(),
                };
                Some(format!(
                    "https://raw.githubusercontent.com/{}/{}/HEAD/{}",
                    owner, repo, file
                ))
            }
            _ => None,
        }
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemRef::DirectUrl(url) => write!(f, "{}", url),
            ItemRef::Namespaced { catalog, name } => write!(f, "@{}/{}", catalog, name),
            ItemRef::ShortRepo { owner, repo, path } => match path {
                Some(p) => write!(f, "{}{}/{}/{}", SHORT_REPO_PREFIX, owner, repo, p),
                None => write!(f, "{}{}/{}", SHORT_REPO_PREFIX, owner, repo),
            },
            ItemRef::PlainName(name) => write!(f, "{}", name),
        }
    }
}

impl FromStr for ItemRef {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ResolveError::parse(s, "reference cannot be empty"));
        }

        if is_url(s) {
            return Ok(ItemRef::DirectUrl(s.to_string()));
        }

        if let Some(rest) = s.strip_prefix('@') {
            return match rest.split_once('/') {
                Some((catalog, name))
                    if !catalog.is_empty() && !name.is_empty() && !name.contains('/') =>
                {
                    Ok(ItemRef::Namespaced {
                        catalog: catalog.to_string(),
                        name: name.to_string(),
                    })
                }
                _ => Err(ResolveError::parse(
                    s,
                    "expected '@catalog/name' with non-empty parts",
                )),
            };
        }

        if let Some(rest) = s.strip_prefix(SHORT_REPO_PREFIX) {
            let mut parts = rest.splitn(3, '/');
            let owner = parts.next().unwrap_or_default();
            let repo = parts.next().unwrap_or_default();
            let path = parts.next().map(|p| p.trim_matches('/'));
            if owner.is_empty() || repo.is_empty() {
                return Err(ResolveError::parse(
                    s,
                    "expected 'github:owner/repo[/path]'",
                ));
            }
            return Ok(ItemRef::ShortRepo {
                owner: owner.to_string(),
                repo: repo.to_string(),
                path: path.filter(|p| !p.is_empty()).map(str::to_string),
            });
        }

        Ok(ItemRef::PlainName(s.to_string()))
    }
}

pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

pub fn is_template(url: &str) -> bool {
    url.contains(NAME_PLACEHOLDER)
}

/// Replace every `{name}` placeholder in `url`.
pub fn substitute_template(url: &str, name: &str) -> String {
    if !is_template(url) {
        return url.to_string();
    }
    url.replace(NAME_PLACEHOLDER, name)
}

/// URL of a catalog's index document.
///
/// A catalog URL that already names a JSON document is used as is;
/// otherwise the conventional index filename is appended.
pub fn index_url(catalog_url: &str) -> String {
    if catalog_url.ends_with(".json") {
        catalog_url.to_string()
    } else {
        format!("{}/{}", catalog_url.trim_end_matches('/'), INDEX_FILENAME)
    }
}

/// Derive the per-item URL a catalog conventionally serves `name` at.
///
/// A trailing index document is stripped first, so
/// `https://x.com/registry.json` and `https://x.com/` both yield
/// `https://x.com/r/<name>.json`.
pub fn build_conventional_item_url(catalog_url: &str, name: &str) -> String {
    let base = match catalog_url.rsplit_once('/') {
        Some((dir, file)) if file.ends_with(".json") => dir,
        _ => catalog_url,
    }
    .trim_end_matches('/');
    format!("{}/{}/{}.json", base, ITEMS_SUBPATH, name)
}

/// Last path segment of a URL without query, fragment or `.json` suffix.
fn name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path);
    segment
        .strip_suffix(".json")
        .unwrap_or(segment)
        .to_string()
}
