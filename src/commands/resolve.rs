use anyhow::Result;
use log::info;
use serde::Serialize;
use std::io::Write;

use crate::{
    error::ResolveError,
    resolver::{
        DependencyTree, collect_dev_dependencies, collect_external_dependencies,
        collect_files_in_order,
    },
};

use super::config::Config;

/// Outcome for one requested reference.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report<'a> {
    reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tree: Option<&'a DependencyTree>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    dev_dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Resolves every reference and prints the install plans.
///
/// Returns the references that failed with their errors. Roots are
/// independent, so one failure or timeout never hides another root's plan.
#[tracing::instrument(skip(config, output))]
pub async fn resolve<W: Write>(
    config: &Config,
    references: &[String],
    json: bool,
    output: &mut W,
) -> Result<Vec<(String, ResolveError)>> {
    let resolver = config.resolver();
    let results = resolver
        .resolve_all_within(references, &config.catalogs, config.options.timeout)
        .await;

    if json {
        let reports: Vec<Report> = results
            .iter()
            .map(|(reference, result)| match result {
                Ok(tree) => Report {
                    reference,
                    tree: Some(tree),
                    dependencies: collect_external_dependencies(tree),
                    dev_dependencies: collect_dev_dependencies(tree),
                    error: None,
                },
                Err(e) => Report {
                    reference,
                    tree: None,
                    dependencies: vec![],
                    dev_dependencies: vec![],
                    error: Some(e.to_string()),
                },
            })
            .collect();
        writeln!(output, "{}", serde_json::to_string_pretty(&reports)?)?;
    } else {
        for (reference, result) in &results {
            if let Ok(tree) = result {
                print_plan(reference, tree, output)?;
            }
        }
    }

    let failures: Vec<(String, ResolveError)> = results
        .into_iter()
        .filter_map(|(reference, result)| result.err().map(|e| (reference, e)))
        .collect();

    info!(
        "Resolved {} of {} reference(s)",
        references.len() - failures.len(),
        references.len()
    );
    Ok(failures)
}

fn print_plan<W: Write>(reference: &str, tree: &DependencyTree, output: &mut W) -> Result<()> {
    writeln!(output, "{} ({})", reference, tree.root.source)?;

    writeln!(output, "  files:")?;
    for (name, files) in collect_files_in_order(tree) {
        for file in files {
            match &file.target {
                Some(target) => writeln!(output, "    {}: {} -> {}", name, file.path, target)?,
                None => writeln!(output, "    {}: {}", name, file.path)?,
            }
        }
    }

    let dependencies = collect_external_dependencies(tree);
    if !dependencies.is_empty() {
        writeln!(output, "  dependencies: {}", dependencies.join(" "))?;
    }
    let dev_dependencies = collect_dev_dependencies(tree);
    if !dev_dependencies.is_empty() {
        writeln!(output, "  devDependencies: {}", dev_dependencies.join(" "))?;
    }
    Ok(())
}
