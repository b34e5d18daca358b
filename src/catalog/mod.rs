//! Catalog wire types and configuration.
//!
//! A catalog is a remote collection of distributable items. It exposes an
//! index (`registry.json`) listing its items and, conventionally, one JSON
//! document per item under `r/<name>.json`.

mod config;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{ResolveError, Result};

pub use config::{
    CatalogConfig, Catalogs, DEFAULT_CATALOG_NAME, DEFAULT_CATALOG_URL, Headers, NO_HEADERS,
};

/// Kind of a distributable item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ItemType {
    Ui,
    Hook,
    Block,
    Lib,
    Component,
    Page,
    File,
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemType::Ui => "ui",
            ItemType::Hook => "hook",
            ItemType::Block => "block",
            ItemType::Lib => "lib",
            ItemType::Component => "component",
            ItemType::Page => "page",
            ItemType::File => "file",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Catalogs commonly prefix the kind, e.g. "registry:ui".
        let kind = s.strip_prefix("registry:").unwrap_or(s);
        match kind {
            "ui" => Ok(ItemType::Ui),
            "hook" => Ok(ItemType::Hook),
            "block" => Ok(ItemType::Block),
            "lib" => Ok(ItemType::Lib),
            "component" => Ok(ItemType::Component),
            "page" => Ok(ItemType::Page),
            "file" => Ok(ItemType::File),
            _ => Err(format!(
                "unknown item type '{}', expected one of ui, hook, block, lib, component, page, file",
                s
            )),
        }
    }
}

impl TryFrom<String> for ItemType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ItemType> for String {
    fn from(value: ItemType) -> Self {
        value.to_string()
    }
}

/// A file carried by an item. Contents are opaque here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFile {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// Theme variables an item contributes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CssVars {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dark: Option<BTreeMap<String, String>>,
}

/// A named package of files plus metadata and dependency declarations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributableItem {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ItemType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Third-party package ids, not resolved here.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dev_dependencies: Vec<String>,
    /// Names or direct URLs of other items.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub registry_dependencies: Vec<String>,
    #[serde(default)]
    pub files: Vec<ItemFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css_vars: Option<CssVars>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docs: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Map<String, serde_json::Value>>,
}

impl DistributableItem {
    /// Checks invariants serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("item name cannot be empty".to_string());
        }
        if let Some(pos) = self.files.iter().position(|f| f.path.trim().is_empty()) {
            return Err(format!("file #{} of '{}' has an empty path", pos, self.name));
        }
        if self
            .registry_dependencies
            .iter()
            .any(|d| d.trim().is_empty())
        {
            return Err(format!(
                "'{}' declares an empty registry dependency",
                self.name
            ));
        }
        Ok(())
    }
}

/// A catalog's index document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogIndex {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    pub items: Vec<DistributableItem>,
}

impl CatalogIndex {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("catalog name cannot be empty".to_string());
        }
        self.items.iter().try_for_each(DistributableItem::validate)
    }

    /// Linear search by item name.
    pub fn find(&self, name: &str) -> Option<&DistributableItem> {
        self.items.iter().find(|item| item.name == name)
    }

    pub fn item_names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.name.as_str())
    }
}

/// Payloads the fetcher knows how to validate.
pub trait Payload: DeserializeOwned {
    fn validate(&self) -> Result<(), String>;
}

impl Payload for CatalogIndex {
    fn validate(&self) -> Result<(), String> {
        CatalogIndex::validate(self)
    }
}

impl Payload for DistributableItem {
    fn validate(&self) -> Result<(), String> {
        DistributableItem::validate(self)
    }
}

/// Parse and validate a payload fetched from `url`.
pub fn parse_payload<T: Payload>(url: &str, body: &str) -> Result<T> {
    let parsed: T = serde_json::from_str(body)
        .map_err(|e| ResolveError::schema(url, format!("unexpected shape: {}", e)))?;
    parsed
        .validate()
        .map_err(|message| ResolveError::schema(url, message))?;
    Ok(parsed)
}
