// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Parse command-line arguments using clap
// 2. Build the settings: config file -> environment -> command-line flags
// 3. Set up logging (stderr)
// 4. Dispatch to the subcommand handler, streaming progress to stderr
// 5. Print the results to stdout (table or JSON)
// 6. Exit with proper code (0 = clean, 1 = problems found, 2 = error)
// =============================================================================

// Module declarations - tells Rust about our other source files
mod audit;         // src/audit/ - rule engine driver, aggregation, report
mod cli;           // src/cli.rs - command-line parsing
mod config;        // src/config.rs - settings and config file
mod crawl;         // src/crawl/ - frontier, executor, session recycling
mod engine;        // src/engine.rs - crawl + scan pipeline, one run at a time
mod error;         // src/error.rs - typed errors
mod logging;       // src/logging.rs - tracing subscriber setup
mod progress;      // src/progress.rs - progress event stream
mod render;        // src/render/ - rendering sessions (HTTP)
#[cfg(test)]
mod testing;       // in-memory fakes for the unit tests

use audit::{CrawlReport, RemoteAuditor};
use clap::Parser;
use cli::{Cli, Commands, CrawlArgs};
use config::Settings;
use crawl::{CrawlFailure, CrawlOutcome, Crawler, ProcMemoryProbe};
use engine::CrawlEngine;
use logging::{init_logging, LogConfig, LogFormat};
use progress::{CrawlEvent, EventStream, Phase, ProgressEmitter};
use render::HttpSessionFactory;

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Used when the config file doesn't say how long the rule engine may take
const DEFAULT_AUDITOR_TIMEOUT_SECS: u64 = 60;

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            // {:#} prints the whole context chain on one line
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

// Returns:
//   Ok(0) = nothing found
//   Ok(1) = broken pages (crawl) or accessibility violations (scan)
//   Err   = the run itself failed
async fn run() -> Result<i32> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Settings::default(),
    }
    .merge_env()?;

    if let Some(level) = &cli.log_level {
        settings.logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        settings.logging.format = format.clone();
    }
    let log_format: LogFormat = settings.logging.format.parse()?;
    init_logging(&LogConfig::new(settings.logging.level.clone(), log_format));

    match cli.command {
        Commands::Crawl(args) => {
            apply_crawl_args(&mut settings, &args);
            settings.validate()?;
            handle_crawl(&settings, &args.url, args.json).await
        }
        Commands::Scan {
            crawl,
            auditor_url,
            wcag_level,
        } => {
            apply_crawl_args(&mut settings, &crawl);
            if let Some(url) = auditor_url {
                settings.auditor.url = Some(url);
            }
            if let Some(level) = wcag_level {
                settings.crawl.wcag_level = level.parse()?;
            }
            settings.validate()?;
            handle_scan(&settings, &crawl.url, crawl.json).await
        }
    }
}

// Command-line flags win over everything else
fn apply_crawl_args(settings: &mut Settings, args: &CrawlArgs) {
    if let Some(depth) = args.max_depth {
        settings.crawl.max_depth = depth;
    }
    if let Some(pages) = args.max_pages {
        settings.crawl.max_pages = pages;
    }
    if !args.include.is_empty() {
        settings.crawl.include_patterns = args.include.clone();
    }
    if !args.exclude.is_empty() {
        settings.crawl.exclude_patterns = args.exclude.clone();
    }
}

fn session_factory(settings: &Settings) -> Arc<HttpSessionFactory> {
    Arc::new(HttpSessionFactory::new(
        settings.engine.user_agent.clone(),
        settings.engine.navigation_timeout(),
    ))
}

// Handles the 'crawl' subcommand: crawl only, report page statuses
async fn handle_crawl(settings: &Settings, seed: &str, json: bool) -> Result<i32> {
    eprintln!("🔍 Crawling: {}", seed);
    eprintln!(
        "📊 Max depth: {}, max pages: {}",
        settings.crawl.max_depth, settings.crawl.max_pages
    );

    let crawler = Crawler::new(
        settings.engine.clone(),
        session_factory(settings),
        Arc::new(ProcMemoryProbe),
    );

    let (emitter, events) = ProgressEmitter::channel();
    let printer = tokio::spawn(print_progress(events));
    let result = crawler.run(seed, &settings.crawl, &emitter).await;
    drop(emitter);
    // The printer only ends once the stream does; it can't fail
    let _ = printer.await;

    let outcomes = match result {
        Ok(outcomes) => outcomes,
        Err(CrawlFailure { error, partial }) => {
            if !partial.is_empty() {
                eprintln!("\n⚠️  Crawl stopped early, partial results:\n");
                print_outcomes(&partial, json)?;
            }
            return Err(error).context("crawl failed");
        }
    };

    print_outcomes(&outcomes, json)?;

    let broken = outcomes.iter().filter(|o| o.is_broken()).count();
    if broken > 0 {
        Ok(1)
    } else {
        Ok(0)
    }
}

// Handles the 'scan' subcommand: full crawl + accessibility audit
async fn handle_scan(settings: &Settings, seed: &str, json: bool) -> Result<i32> {
    let auditor_url = settings
        .auditor
        .url
        .as_deref()
        .context("no rule engine configured: pass --auditor-url or set [auditor] url")?;
    let auditor = RemoteAuditor::new(
        auditor_url,
        Duration::from_secs(
            settings
                .auditor
                .timeout_secs
                .unwrap_or(DEFAULT_AUDITOR_TIMEOUT_SECS),
        ),
    )?;

    eprintln!("🔍 Scanning: {}", seed);
    eprintln!(
        "📊 Max depth: {}, max pages: {}, WCAG level: {:?}",
        settings.crawl.max_depth, settings.crawl.max_pages, settings.crawl.wcag_level
    );

    let engine = CrawlEngine::new(
        settings.engine.clone(),
        session_factory(settings),
        Arc::new(auditor),
        Arc::new(ProcMemoryProbe),
    );
    let mut events = engine.start_crawl(seed, settings.crawl.clone())?;

    let mut report: Option<CrawlReport> = None;
    while let Some(event) = events.next().await {
        match event {
            CrawlEvent::Completed { report: done } => report = Some(*done),
            CrawlEvent::Failed {
                code,
                message,
                partial_results,
            } => {
                if !partial_results.is_empty() {
                    eprintln!("\n⚠️  Run stopped early, partial crawl results:\n");
                    print_outcomes(&partial_results, json)?;
                }
                bail!("{} ({})", message, code);
            }
            other => print_event(&other),
        }
    }

    let Some(report) = report else {
        bail!("crawl ended without a report");
    };
    info!(
        pages = report.crawl_results.len(),
        violations = report.summary.total_violations,
        "scan complete"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.has_violations() {
        Ok(1)
    } else {
        Ok(0)
    }
}

async fn print_progress(mut events: EventStream) {
    while let Some(event) = events.next().await {
        print_event(&event);
    }
}

// Progress goes to stderr so stdout stays clean for --json
fn print_event(event: &CrawlEvent) {
    match event {
        CrawlEvent::Progress(p) if !p.current_url.is_empty() => {
            let phase = match p.phase {
                Phase::Crawl => "crawl",
                Phase::Scan => "scan",
            };
            eprintln!(
                "   [{}] {}/{} {}",
                phase, p.processed_count, p.total_discovered_count, p.current_url
            );
        }
        CrawlEvent::Recycled {
            reason,
            pages_visited,
        } => {
            eprintln!("   ♻️  Session recycled ({:?}) after {} pages", reason, pages_visited);
        }
        CrawlEvent::MemoryStatus(status) => {
            debug!(
                used_mb = status.used_mb,
                total_mb = status.total_mb,
                ratio = status.ratio,
                "memory"
            );
        }
        _ => {}
    }
}

fn print_outcomes(outcomes: &[CrawlOutcome], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcomes)?);
    } else {
        print_outcome_table(outcomes);
    }
    Ok(())
}

fn print_outcome_table(outcomes: &[CrawlOutcome]) {
    println!("{:<60} {:<12} {:<30}", "URL", "STATUS", "MESSAGE");
    println!("{}", "=".repeat(102));

    for outcome in outcomes {
        let status = if outcome.http_status == 0 {
            "❌ FAILED".to_string()
        } else if outcome.is_broken() {
            format!("❌ {}", outcome.http_status)
        } else {
            format!("✅ {}", outcome.http_status)
        };
        let message = outcome.error_message.as_deref().unwrap_or("");
        println!("{:<60} {:<12} {:<30}", truncate(&outcome.url, 57), status, message);
    }

    println!();

    let broken = outcomes.iter().filter(|o| o.is_broken()).count();
    println!("📊 Summary:");
    println!("   ✅ OK: {}", outcomes.len() - broken);
    println!("   ❌ Broken: {}", broken);
    println!("   📋 Total: {}", outcomes.len());
}

fn print_report(report: &CrawlReport) {
    print_outcome_table(&report.crawl_results);
    println!();

    let summary = &report.summary;
    println!("♿ Accessibility ({} page(s) audited):", summary.total_pages);
    println!("   Violations: {}", summary.total_violations);
    for (impact, count) in summary.violations_by_impact.iter().rev() {
        println!("     {:<10} {}", impact.to_string(), count);
    }
    println!(
        "   Passes: {}, incomplete: {}, inapplicable: {}",
        report.passes, report.incomplete, report.inapplicable
    );

    if !summary.top_violations.is_empty() {
        println!();
        println!("🔝 Most frequent violations:");
        for top in &summary.top_violations {
            let help = report
                .violations
                .iter()
                .find(|v| v.id == top.id)
                .map(|v| v.help_url.as_str())
                .unwrap_or("");
            println!("   {:>4}x {:<30} {}", top.count, top.id, help);
        }
    }

    let broken: Vec<&CrawlOutcome> = report.broken_pages().collect();
    if !broken.is_empty() {
        println!();
        println!("🔗 Broken pages (not audited):");
        for outcome in broken {
            let reason = match &outcome.error_message {
                Some(message) => message.clone(),
                None => format!("HTTP {}", outcome.http_status),
            };
            println!("   {} ({})", truncate(&outcome.url, 57), reason);
        }
    }

    if !report.failed_scans.is_empty() {
        println!();
        println!("⚠️  Pages that could not be audited:");
        for failure in &report.failed_scans {
            println!("   {} ({})", truncate(&failure.url, 57), failure.message);
        }
    }
}

// Char-based so multi-byte URLs don't get cut mid-character
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("https://ex.com/", 57), "https://ex.com/");
        let long = format!("https://ex.com/{}", "é".repeat(60));
        let cut = truncate(&long, 20);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), 23);
    }

    #[test]
    fn test_flags_override_config() {
        let mut settings = Settings::default();
        let cli = Cli::try_parse_from([
            "a11y-guardian",
            "crawl",
            "https://ex.com/",
            "--max-depth",
            "4",
            "--exclude",
            "^/admin",
        ])
        .unwrap();
        let Commands::Crawl(args) = cli.command else {
            panic!("expected crawl");
        };

        apply_crawl_args(&mut settings, &args);
        assert_eq!(settings.crawl.max_depth, 4);
        assert_eq!(settings.crawl.max_pages, 50);
        assert_eq!(settings.crawl.exclude_patterns, vec!["^/admin".to_string()]);
    }
}
