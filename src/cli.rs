// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// Two subcommands:
// - crawl: walk the site and report every page's status (no auditing)
// - scan:  crawl, then run the accessibility rule engine on every page
//
// Flags left unset here fall back to the config file, then to
// A11Y_GUARDIAN_* environment variables, then to built-in defaults.
// That's why most of them are Options instead of having default values.
// =============================================================================

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "a11y-guardian",
    version = "0.1.0",
    about = "Crawl a website and audit every page for accessibility problems",
    long_about = "a11y-guardian crawls a website (same origin only), then hands every page it \
                  found to an accessibility rule engine and reports the violations. \
                  It's meant for CI/CD pipelines: the exit code tells you whether anything was found."
)]
pub struct Cli {
    /// TOML config file
    #[arg(long, global = true, env = "A11Y_GUARDIAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level or filter directive (e.g. "debug", "a11y_guardian=trace")
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format: pretty, compact or json
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl a website and report the status of every page found
    ///
    /// Example: a11y-guardian crawl https://example.com --max-pages 20
    Crawl(CrawlArgs),

    /// Crawl a website and run an accessibility audit on every page
    ///
    /// Example: a11y-guardian scan https://example.com --auditor-url http://localhost:4000/scan
    Scan {
        #[command(flatten)]
        crawl: CrawlArgs,

        /// Endpoint of the accessibility rule engine
        #[arg(long)]
        auditor_url: Option<String>,

        /// WCAG conformance level to audit against: A, AA or AAA
        #[arg(long)]
        wcag_level: Option<String>,
    },
}

/// Arguments shared by both subcommands
#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// Where to start (e.g., https://example.com)
    ///
    /// Only pages on the same origin (scheme + host + port) are crawled
    pub url: String,

    /// Maximum crawl depth, counted in path segments
    ///
    /// Depth 0 = just the starting page
    /// Depth 1 = also /about, /blog
    /// Depth 2 = also /blog/post-1
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Stop after this many pages
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Only crawl paths matching this regex (repeatable)
    #[arg(long = "include", value_name = "REGEX")]
    pub include: Vec<String>,

    /// Never crawl paths matching this regex (repeatable)
    #[arg(long = "exclude", value_name = "REGEX")]
    pub exclude: Vec<String>,

    /// Output results in JSON format instead of a table
    #[arg(long)]
    pub json: bool,
}
