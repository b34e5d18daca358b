use anyhow::{Result, bail};
use catres::commands::{self, Config, Options, parse_catalogs};
use catres::http::{INITIAL_DELAY_MS, MAX_ATTEMPTS};
use clap::Parser;
use std::time::Duration;

/// catres - catalog item resolver
///
/// Locate distributable UI items across catalogs and resolve their
/// dependency trees into an install plan.
///
/// Catalogs are given as NAME=URL. A URL containing {name} is a template
/// queried per item; any other URL is treated as a catalog base with a
/// registry.json index and items under r/<name>.json.
///
/// Examples:
///   catres resolve dialog                      # Resolve from the default catalog
///   catres --catalog acme=https://acme.dev resolve @acme/button
#[derive(Parser, Debug)]
#[command(author, version = env!("CATRES_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Catalog as NAME=URL (repeatable, order is search order; before the subcommand)
    #[arg(long = "catalog", short = 'c', value_name = "NAME=URL", action = clap::ArgAction::Append)]
    catalogs: Vec<String>,

    /// Header for a catalog as NAME:KEY=VALUE; values may use ${ENV_VAR}
    #[arg(long = "header", short = 'H', value_name = "NAME:KEY=VALUE", action = clap::ArgAction::Append)]
    headers: Vec<String>,

    /// Catalogs as a JSON object of name to url or {url, headers}
    #[arg(long = "catalogs-json", env = "CATRES_CATALOGS", value_name = "JSON", global = true)]
    catalogs_json: Option<String>,

    /// Always revalidate instead of reading cached documents
    #[arg(long, global = true)]
    no_cache: bool,

    /// Maximum attempts per request
    #[arg(long, value_name = "N", default_value_t = MAX_ATTEMPTS, global = true)]
    retries: usize,

    /// Initial retry backoff in milliseconds, doubled per attempt
    #[arg(long, value_name = "MS", default_value_t = INITIAL_DELAY_MS, global = true)]
    retry_delay_ms: u64,

    /// Abort resolution after this many seconds
    #[arg(long, value_name = "SECS", global = true)]
    timeout: Option<u64>,

    /// Use the first catalog when an item exists in several, without asking
    #[arg(long, short = 'y', global = true)]
    pick_first: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Resolve items and print their install plan
    Resolve(ResolveArgs),

    /// List the items of every configured catalog
    List,

    /// Print the content served at a URL
    Raw(RawArgs),
}

#[derive(clap::Args, Debug)]
pub struct ResolveArgs {
    /// Item names, @catalog/name references, github:owner/repo[/path] or URLs
    #[arg(value_name = "REF", required = true)]
    pub references: Vec<String>,

    /// Print the dependency trees as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug)]
pub struct RawArgs {
    #[arg(value_name = "URL")]
    pub url: String,
}

impl Cli {
    fn options(&self) -> Options {
        Options {
            max_attempts: self.retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            timeout: self.timeout.map(Duration::from_secs),
            use_cache: !self.no_cache,
            pick_first: self.pick_first,
        }
    }

    fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_filter()))
        .init();

    let catalogs = parse_catalogs(&cli.catalogs, &cli.headers, cli.catalogs_json.as_deref())?;
    let config = Config::new(catalogs, cli.options())?;
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Commands::Resolve(args) => {
            let failures =
                commands::resolve(&config, &args.references, args.json, &mut stdout).await?;
            for (reference, error) in &failures {
                eprintln!("{}: {}", reference, error);
            }
            if !failures.is_empty() {
                bail!(
                    "{} of {} reference(s) could not be resolved",
                    failures.len(),
                    args.references.len()
                );
            }
        }
        Commands::List => commands::list(&config, &mut stdout).await?,
        Commands::Raw(args) => commands::raw(&config, &args.url, &mut stdout).await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_resolve_parsing() {
        let cli = Cli::try_parse_from(["catres", "resolve", "dialog", "@acme/card"]).unwrap();
        match cli.command {
            Commands::Resolve(ref args) => {
                assert_eq!(args.references, vec!["dialog", "@acme/card"]);
                assert!(!args.json);
            }
            _ => panic!("Expected Resolve command"),
        }
        assert_eq!(cli.retries, MAX_ATTEMPTS);
        assert_eq!(cli.log_filter(), "warn");
    }

    #[test]
    fn test_cli_resolve_requires_reference() {
        assert!(Cli::try_parse_from(["catres", "resolve"]).is_err());
    }

    #[test]
    fn test_cli_catalogs_parsing() {
        let cli = Cli::try_parse_from([
            "catres",
            "--catalog",
            "a=https://a.dev",
            "-c",
            "b=https://b.dev",
            "-H",
            "b:X-Key=k",
            "resolve",
            "x",
        ])
        .unwrap();
        assert_eq!(cli.catalogs, vec!["a=https://a.dev", "b=https://b.dev"]);
        assert_eq!(cli.headers, vec!["b:X-Key=k"]);
    }

    #[test]
    fn test_cli_catalogs_after_subcommand_rejected() {
        let result = Cli::try_parse_from([
            "catres",
            "-c",
            "a=https://a.dev",
            "resolve",
            "x",
            "-c",
            "b=https://b.dev",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_options() {
        let cli = Cli::try_parse_from([
            "catres",
            "list",
            "--no-cache",
            "--retries",
            "5",
            "--retry-delay-ms",
            "10",
            "--timeout",
            "30",
            "-y",
            "-vv",
        ])
        .unwrap();
        let options = cli.options();
        assert_eq!(options.max_attempts, 5);
        assert_eq!(options.retry_delay, Duration::from_millis(10));
        assert_eq!(options.timeout, Some(Duration::from_secs(30)));
        assert!(!options.use_cache);
        assert!(options.pick_first);
        assert_eq!(cli.log_filter(), "debug");
    }

    #[test]
    fn test_cli_raw_parsing() {
        let cli = Cli::try_parse_from(["catres", "raw", "https://x.dev/a.css"]).unwrap();
        match cli.command {
            Commands::Raw(args) => assert_eq!(args.url, "https://x.dev/a.css"),
            _ => panic!("Expected Raw command"),
        }
    }

    #[test]
    fn test_cli_no_subcommand_fails() {
        assert!(Cli::try_parse_from(["catres", "dialog"]).is_err());
    }
}
