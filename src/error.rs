//! Error taxonomy shared by the fetcher, locator and resolver.

use thiserror::Error;

pub type Result<T, E = ResolveError> = std::result::Result<T, E>;

/// Everything that can go wrong while resolving an item.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    /// Malformed namespaced, short or template reference. Never retried.
    #[error("Invalid reference '{reference}': {reason}")]
    ReferenceParse { reference: String, reason: String },

    /// Network or HTTP failure, surfaced after the retry policy gave up.
    #[error("Failed to fetch {url}: {message}")]
    CatalogFetch {
        url: String,
        status: Option<u16>,
        message: String,
    },

    /// Remote quota exhausted. `reset_time` is epoch seconds.
    #[error(
        "Rate limit exceeded for {url}. Try again after {reset_time} (epoch seconds) or configure an auth header."
    )]
    RateLimit { url: String, reset_time: u64 },

    /// Payload parsed but does not have the expected shape.
    #[error("Invalid payload from {url}: {message}")]
    SchemaValidation { url: String, message: String },

    #[error("{}", not_found_message(.name, .searched, .suggestions))]
    ComponentNotFound {
        name: String,
        searched: Vec<String>,
        suggestions: Vec<String>,
    },

    /// `cycle` starts and ends with the same name.
    #[error("Circular dependency detected: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    #[error("Selection {index} is out of range ({count} candidates)")]
    InvalidSelection { index: usize, count: usize },

    /// The selection prompt itself could not run.
    #[error("Cannot select a catalog for '{name}': {message}")]
    SelectionFailed { name: String, message: String },

    /// One root of a batch exceeded its time limit.
    #[error("Resolution of '{reference}' timed out after {seconds}s")]
    Timeout { reference: String, seconds: u64 },
}

impl ResolveError {
    pub(crate) fn fetch(url: &str, status: Option<u16>, message: impl Into<String>) -> Self {
        ResolveError::CatalogFetch {
            url: url.to_string(),
            status,
            message: message.into(),
        }
    }

    pub(crate) fn schema(url: &str, message: impl Into<String>) -> Self {
        ResolveError::SchemaValidation {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn parse(reference: &str, reason: impl Into<String>) -> Self {
        ResolveError::ReferenceParse {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }

    /// Transport failures and 5xx responses may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ResolveError::CatalogFetch { status: None, .. } => true,
            ResolveError::CatalogFetch {
                status: Some(code), ..
            } => *code >= 500,
            _ => false,
        }
    }

    /// Errors that must propagate even when a stale cache entry is available.
    ///
    /// Only transport failures and 5xx responses fall back to the cache; a
    /// 4xx means the server answered and the cached copy is no longer valid.
    pub(crate) fn bypasses_stale_cache(&self) -> bool {
        match self {
            ResolveError::SchemaValidation { .. } | ResolveError::RateLimit { .. } => true,
            ResolveError::CatalogFetch {
                status: Some(code), ..
            } => (400..500).contains(code),
            _ => false,
        }
    }
}

fn not_found_message(name: &str, searched: &[String], suggestions: &[String]) -> String {
    let mut msg = format!("Component '{}' not found", name);
    if !searched.is_empty() {
        msg.push_str(&format!(" in catalogs: {}", searched.join(", ")));
    }
    msg.push('.');
    if !suggestions.is_empty() {
        msg.push_str(&format!(" Did you mean: {}?", suggestions.join(", ")));
    }
    msg
}
