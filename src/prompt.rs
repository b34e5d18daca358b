//! Interactive catalog selection on the terminal.

use async_trait::async_trait;
use std::io::{self, BufRead, Write};

use crate::error::{ResolveError, Result};
use crate::resolver::{Candidate, Selector};

/// Asks which candidate to use, reading a 1-based number from `input`.
///
/// An empty answer picks the first candidate. Anything that is not a number
/// in range is rejected with [`ResolveError::InvalidSelection`].
pub fn select_with_io<R: BufRead, W: Write>(
    name: &str,
    candidates: &[Candidate],
    input: &mut R,
    output: &mut W,
) -> Result<usize> {
    let count = candidates.len();
    let line = ask(name, candidates, input, output).map_err(|e| ResolveError::SelectionFailed {
        name: name.to_string(),
        message: e.to_string(),
    })?;
    let answer = line.trim();
    if answer.is_empty() {
        return Ok(0);
    }

    match answer.parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Ok(n - 1),
        Ok(n) => Err(ResolveError::InvalidSelection {
            index: n.saturating_sub(1),
            count,
        }),
        Err(_) => Err(ResolveError::InvalidSelection {
            index: usize::MAX,
            count,
        }),
    }
}

fn ask<R: BufRead, W: Write>(
    name: &str,
    candidates: &[Candidate],
    input: &mut R,
    output: &mut W,
) -> io::Result<String> {
    writeln!(output, "'{}' is available from {} catalogs:", name, candidates.len())?;
    for (i, c) in candidates.iter().enumerate() {
        writeln!(output, "  {}) {} ({})", i + 1, c.catalog_name, c.url)?;
    }
    write!(output, "Select [1-{}] (default 1): ", candidates.len())?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line)
}

/// Prompts on stdin/stderr, keeping stdout free for the resolution output.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptSelector;

#[async_trait]
impl Selector for PromptSelector {
    async fn select(&self, name: &str, candidates: &[Candidate]) -> Result<usize> {
        let owned_name = name.to_string();
        let candidates = candidates.to_vec();
        tokio::task::spawn_blocking(move || {
            let stdin = io::stdin();
            let mut stdin_lock = stdin.lock();
            let mut stderr = io::stderr();
            select_with_io(&owned_name, &candidates, &mut stdin_lock, &mut stderr)
        })
        .await
        .map_err(|e| ResolveError::SelectionFailed {
            name: name.to_string(),
            message: e.to_string(),
        })?
    }
}
