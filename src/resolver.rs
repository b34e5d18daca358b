//! Dependency resolution over catalog items.
//!
//! A root reference is resolved into a [`DependencyTree`] by a depth-first
//! walk over `registryDependencies`. The walk keeps:
//! - `resolved`: finished items in post-order, so dependencies precede
//!   dependents;
//! - `visiting` and `path`: the current DFS stack, for cycle detection and
//!   diagnostics.
//!
//! The first resolution of a name wins; later references reuse it without
//! walking its subtree again.

use async_trait::async_trait;
use futures_util::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::{Catalogs, DistributableItem, ItemFile, NO_HEADERS};
use crate::error::{ResolveError, Result};
use crate::fetcher::CatalogSource;
use crate::locator::{CatalogMatch, Locator};
use crate::reference::ItemRef;
use crate::similarity::{MAX_SUGGESTIONS, suggest};

/// A reference that has been located and fetched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedItem {
    pub name: String,
    pub item: Arc<DistributableItem>,
    /// URL the item was fetched from.
    pub source: String,
}

/// A root item plus every item it transitively depends on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependencyTree {
    pub root: ResolvedItem,
    /// Unique by name, never containing the root, dependencies before
    /// dependents.
    pub dependencies: Vec<ResolvedItem>,
}

impl DependencyTree {
    pub fn dependency(&self, name: &str) -> Option<&ResolvedItem> {
        self.dependencies.iter().find(|d| d.name == name)
    }

    pub fn dependency_names(&self) -> Vec<&str> {
        self.dependencies.iter().map(|d| d.name.as_str()).collect()
    }

    /// Dependencies in resolution order, then the root.
    pub fn install_order(&self) -> impl Iterator<Item = &ResolvedItem> {
        self.dependencies.iter().chain(std::iter::once(&self.root))
    }
}

/// A catalog offering an item whose name is ambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub catalog_name: String,
    pub url: String,
}

impl From<&CatalogMatch> for Candidate {
    fn from(m: &CatalogMatch) -> Self {
        Self {
            catalog_name: m.catalog_name.clone(),
            url: m.item_url.clone(),
        }
    }
}

/// Picks one of several catalogs offering the same item name.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Selector: Send + Sync {
    /// Returns the index of the chosen candidate.
    async fn select(&self, name: &str, candidates: &[Candidate]) -> Result<usize>;
}

/// Always picks the first configured catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstCandidate;

#[async_trait]
impl Selector for FirstCandidate {
    async fn select(&self, name: &str, candidates: &[Candidate]) -> Result<usize> {
        debug!(
            "Picking '{}' from {:?}",
            name,
            candidates.first().map(|c| &c.catalog_name)
        );
        Ok(0)
    }
}

/// Per-root walk state.
#[derive(Default)]
struct Walk {
    resolved: Vec<ResolvedItem>,
    positions: HashMap<String, usize>,
    visiting: HashSet<String>,
    path: Vec<String>,
}

impl Walk {
    fn is_resolved(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    fn enter(&mut self, name: &str) -> Result<()> {
        if self.visiting.contains(name) {
            let start = self.path.iter().position(|p| p == name).unwrap_or(0);
            let mut cycle = self.path[start..].to_vec();
            cycle.push(name.to_string());
            return Err(ResolveError::CircularDependency { cycle });
        }
        self.visiting.insert(name.to_string());
        self.path.push(name.to_string());
        Ok(())
    }

    fn leave(&mut self, resolved: ResolvedItem) {
        self.visiting.remove(&resolved.name);
        self.path.pop();
        self.positions
            .insert(resolved.name.clone(), self.resolved.len());
        self.resolved.push(resolved);
    }

    fn into_tree(mut self, root: &str) -> Result<DependencyTree> {
        let position = self.positions.get(root).copied().ok_or_else(|| {
            ResolveError::parse(root, "root was not resolved")
        })?;
        let root = self.resolved.remove(position);
        Ok(DependencyTree {
            root,
            dependencies: self.resolved,
        })
    }
}

/// A resolved item with the index of its next dependency to visit.
struct Frame {
    resolved: ResolvedItem,
    next_dependency: usize,
}

/// Resolves references into dependency trees.
#[derive(Clone)]
pub struct Resolver {
    source: Arc<dyn CatalogSource>,
    locator: Locator,
    selector: Arc<dyn Selector>,
}

impl Resolver {
    pub fn new(source: Arc<dyn CatalogSource>, selector: Arc<dyn Selector>) -> Self {
        Self {
            locator: Locator::new(source.clone()),
            source,
            selector,
        }
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Resolves `root` and everything it depends on.
    ///
    /// Nothing is returned for a root whose walk hits an error.
    #[tracing::instrument(skip(self, catalogs))]
    pub async fn resolve_tree(&self, root: &str, catalogs: &Catalogs) -> Result<DependencyTree> {
        let root_ref = ItemRef::classify(root)?;
        let root_name = root_ref.key();
        let mut walk = Walk::default();

        walk.enter(&root_name)?;
        let resolved = self.resolve_reference(&root_ref, &root_name, catalogs).await?;
        let mut stack = vec![Frame {
            resolved,
            next_dependency: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            let dependency = frame
                .resolved
                .item
                .registry_dependencies
                .get(frame.next_dependency)
                .cloned();

            let Some(dependency) = dependency else {
                if let Some(done) = stack.pop() {
                    debug!("Resolved '{}' from {}", done.resolved.name, done.resolved.source);
                    walk.leave(done.resolved);
                }
                continue;
            };
            frame.next_dependency += 1;

            let dep_ref = ItemRef::classify(&dependency)?;
            let name = dep_ref.key();
            if walk.is_resolved(&name) {
                debug!("'{}' already resolved, reusing it", name);
                continue;
            }

            walk.enter(&name)?;
            let resolved = self.resolve_reference(&dep_ref, &name, catalogs).await?;
            stack.push(Frame {
                resolved,
                next_dependency: 0,
            });
        }

        let tree = walk.into_tree(&root_name)?;
        info!(
            "Resolved '{}' with {} dependencies",
            root_name,
            tree.dependencies.len()
        );
        Ok(tree)
    }

    /// Resolves several roots concurrently. Each root has its own walk and
    /// reports its own outcome, in input order.
    pub async fn resolve_all(
        &self,
        roots: &[String],
        catalogs: &Catalogs,
    ) -> Vec<(String, Result<DependencyTree>)> {
        self.resolve_all_within(roots, catalogs, None).await
    }

    /// Like [`Resolver::resolve_all`], with `limit` applied to each root on
    /// its own. A root that runs out of time fails with
    /// [`ResolveError::Timeout`]; the others keep their results.
    pub async fn resolve_all_within(
        &self,
        roots: &[String],
        catalogs: &Catalogs,
        limit: Option<Duration>,
    ) -> Vec<(String, Result<DependencyTree>)> {
        let results = join_all(roots.iter().map(|root| async move {
            let Some(limit) = limit else {
                return self.resolve_tree(root, catalogs).await;
            };
            match tokio::time::timeout(limit, self.resolve_tree(root, catalogs)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("Resolution of '{}' timed out after {:?}", root, limit);
                    Err(ResolveError::Timeout {
                        reference: root.clone(),
                        seconds: limit.as_secs(),
                    })
                }
            }
        }))
        .await;
        roots.iter().cloned().zip(results).collect()
    }

    /// Locates and fetches a single reference.
    async fn resolve_reference(
        &self,
        item_ref: &ItemRef,
        name: &str,
        catalogs: &Catalogs,
    ) -> Result<ResolvedItem> {
        if let Some(url) = item_ref.direct_url() {
            let item = self.source.fetch_item(&url, &NO_HEADERS).await?;
            return Ok(ResolvedItem {
                name: name.to_string(),
                item,
                source: url,
            });
        }

        let mut matches = self.locator.locate(item_ref, catalogs).await?;

        let chosen = match matches.len() {
            0 => return Err(self.not_found(item_ref, name, catalogs).await),
            1 => matches.remove(0),
            count => {
                let candidates: Vec<Candidate> = matches.iter().map(Candidate::from).collect();
                let index = self.selector.select(name, &candidates).await?;
                if index >= count {
                    return Err(ResolveError::InvalidSelection { index, count });
                }
                matches.swap_remove(index)
            }
        };

        debug!("Using '{}' from catalog '{}'", name, chosen.catalog_name);
        Ok(ResolvedItem {
            name: name.to_string(),
            item: chosen.item,
            source: chosen.item_url,
        })
    }

    async fn not_found(&self, item_ref: &ItemRef, name: &str, catalogs: &Catalogs) -> ResolveError {
        let searched_catalogs = match item_ref {
            ItemRef::Namespaced { catalog, .. } => match catalogs.get(catalog) {
                Some(config) => Catalogs::new().with(catalog.clone(), config.clone()),
                None => Catalogs::new(),
            },
            _ => catalogs.clone(),
        };

        let searched = match item_ref {
            ItemRef::Namespaced { catalog, .. } => vec![catalog.clone()],
            _ => catalogs.names(),
        };

        let candidates = self.locator.candidate_names(&searched_catalogs).await;
        ResolveError::ComponentNotFound {
            name: name.to_string(),
            searched,
            suggestions: suggest(name, &candidates, MAX_SUGGESTIONS),
        }
    }
}

/// Every external package id declared in the tree, deduplicated, in
/// install order.
pub fn collect_external_dependencies(tree: &DependencyTree) -> Vec<String> {
    collect_unique(tree, |item| &item.dependencies)
}

/// Every external dev package id declared in the tree, deduplicated.
pub fn collect_dev_dependencies(tree: &DependencyTree) -> Vec<String> {
    collect_unique(tree, |item| &item.dev_dependencies)
}

fn collect_unique<F>(tree: &DependencyTree, field: F) -> Vec<String>
where
    F: Fn(&DistributableItem) -> &Vec<String>,
{
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for resolved in tree.install_order() {
        for dep in field(&resolved.item) {
            if seen.insert(dep.clone()) {
                unique.push(dep.clone());
            }
        }
    }
    unique
}

/// `(name, files)` for every dependency in resolution order, then the root.
pub fn collect_files_in_order(tree: &DependencyTree) -> Vec<(String, Vec<ItemFile>)> {
    tree.install_order()
        .map(|r| (r.name.clone(), r.item.files.clone()))
        .collect()
}
