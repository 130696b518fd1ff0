//! Command-line interface for kbase.
//!
//! Provides commands for ingesting URLs, retrieving and searching stored
//! records, re-ingesting a record as a new version, summarizing what the
//! store holds, and showing the resolved configuration.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};

use crate::config;
use crate::domain::{parse_keywords, ContentRecord, ContentType, RecordId};
use crate::manager::IngestOptions;
use crate::storage::{ContentStats, SearchFilter, TimeRange};
use crate::summarizer::SummaryType;

/// kbase - personal knowledge base of summarized web content
#[derive(Parser, Debug)]
#[command(name = "kbase")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest content from a URL
    Ingest {
        /// URL to ingest (http(s) or file://)
        url: String,

        /// Tags to apply (comma-separated)
        #[arg(short, long)]
        tags: Option<String>,

        /// Summary style (defaults to one chosen by content type)
        #[arg(short = 's', long)]
        summary_type: Option<SummaryType>,

        /// Store without summarizing
        #[arg(long)]
        skip_summary: bool,

        /// Return the stored record if this URL was already ingested
        #[arg(long)]
        dedupe: bool,
    },

    /// Show a stored record
    Get {
        /// Record ID
        id: RecordId,

        /// Print the extracted text as well
        #[arg(long)]
        full: bool,

        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search stored records, newest first
    Search {
        /// Content type (video, webpage, document, paper, repository, notebook, model)
        #[arg(short = 't', long = "type")]
        content_type: Option<ContentType>,

        /// Match any of these keywords (comma-separated)
        #[arg(short, long)]
        keywords: Option<String>,

        /// Case-insensitive text in summary or content
        #[arg(short, long)]
        query: Option<String>,

        /// Only records ingested at or after this time (RFC 3339 or YYYY-MM-DD)
        #[arg(long, value_parser = parse_time)]
        since: Option<DateTime<Utc>>,

        /// Only records ingested before this time (RFC 3339 or YYYY-MM-DD)
        #[arg(long, value_parser = parse_time)]
        until: Option<DateTime<Utc>>,

        /// Maximum number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Number of matching records to skip
        #[arg(long, default_value = "0")]
        offset: usize,
    },

    /// Re-ingest a stored record's URL as a new version
    Reprocess {
        /// Record ID
        id: RecordId,

        /// Summary style (defaults to one chosen by content type)
        #[arg(short = 's', long)]
        summary_type: Option<SummaryType>,

        /// Store without summarizing
        #[arg(long)]
        skip_summary: bool,
    },

    /// Show content type, recency and keyword statistics
    Stats {
        /// Number of top keywords and keyword pairs to list
        #[arg(long, default_value = "10")]
        top: usize,

        /// Print the statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the resolved configuration
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Ingest {
                url,
                tags,
                summary_type,
                skip_summary,
                dedupe,
            } => {
                let options = ingest_options(summary_type, skip_summary)
                    .with_tags(tags.as_deref().map(parse_keywords).unwrap_or_default());
                let options = if dedupe { options.dedupe() } else { options };
                ingest_content(&url, options).await
            }
            Commands::Get { id, full, json } => show_record(id, full, json).await,
            Commands::Search {
                content_type,
                keywords,
                query,
                since,
                until,
                limit,
                offset,
            } => {
                let mut filter = SearchFilter::new();
                if let Some(content_type) = content_type {
                    filter = filter.with_content_type(content_type);
                }
                if let Some(keywords) = keywords {
                    filter = filter.with_keywords(parse_keywords(&keywords));
                }
                if let Some(query) = query {
                    filter = filter.with_text_query(query);
                }
                if since.is_some() || until.is_some() {
                    filter = filter.with_time_range(TimeRange::new(since, until));
                }
                search_records(&filter, limit, offset).await
            }
            Commands::Reprocess {
                id,
                summary_type,
                skip_summary,
            } => reprocess_record(id, ingest_options(summary_type, skip_summary)).await,
            Commands::Stats { top, json } => show_stats(top, json).await,
            Commands::Config => show_config(),
        }
    }
}

fn ingest_options(summary_type: Option<SummaryType>, skip_summary: bool) -> IngestOptions {
    let mut options = IngestOptions::new();
    if let Some(summary_type) = summary_type {
        options = options.with_summary_type(summary_type);
    }
    if skip_summary {
        options = options.skip_summary();
    }
    options
}

/// Parse an RFC 3339 timestamp or a bare date (midnight UTC)
fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("invalid time '{}': expected RFC 3339 or YYYY-MM-DD", value))
}

async fn ingest_content(url: &str, options: IngestOptions) -> Result<()> {
    let manager = config::config()?.build_manager()?;

    eprintln!("Ingesting: {}", url);

    let record = manager
        .ingest(url, options)
        .await
        .with_context(|| format!("Failed to ingest {}", url))?;

    eprintln!("\nContent ingested.");
    print_summary_block(&record);
    Ok(())
}

async fn reprocess_record(id: RecordId, options: IngestOptions) -> Result<()> {
    let manager = config::config()?.build_manager()?;

    let record = manager
        .reprocess(id, options)
        .await
        .with_context(|| format!("Failed to reprocess record {}", id))?;

    eprintln!("\nRecord {} reprocessed.", id);
    print_summary_block(&record);
    Ok(())
}

async fn show_record(id: RecordId, full: bool, json: bool) -> Result<()> {
    let manager = config::config()?.build_manager()?;
    let record = manager.get(id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!("{}", "=".repeat(80));
    println!("  ID: {}", display_id(&record));
    println!("  Title: {}", record.title);
    println!("  URL: {}", record.url);
    println!("  Type: {}", record.content_type);
    println!("  Ingested: {}", record.timestamp.to_rfc3339());
    println!("  Hash: {}", record.content_hash);
    if let Some(previous) = record.supersedes {
        println!("  Supersedes: {}", previous);
    }
    if !record.keywords.is_empty() {
        println!("  Keywords: {}", keyword_list(&record));
    }
    for (key, value) in &record.metadata {
        println!("  {}: {}", key, value);
    }
    println!("{}", "=".repeat(80));

    if record.summary.is_empty() {
        println!("\n(no summary)");
    } else {
        println!("\n{}", record.summary);
    }

    if full {
        println!("\n=== CONTENT ===\n");
        println!("{}", record.raw_content);
    } else {
        println!("\nUse --full to show the extracted content");
    }

    Ok(())
}

async fn search_records(filter: &SearchFilter, limit: usize, offset: usize) -> Result<()> {
    let manager = config::config()?.build_manager()?;
    let results = manager.search(filter, limit, offset).await?;

    if results.is_empty() {
        println!("No records found");
        return Ok(());
    }

    println!("{:<8} {:<11} {:<17} {:<42}", "ID", "TYPE", "INGESTED", "TITLE");
    println!("{}", "-".repeat(80));

    for record in &results {
        println!(
            "{:<8} {:<11} {:<17} {:<42}",
            display_id(record),
            record.content_type,
            record.timestamp.format("%Y-%m-%d %H:%M"),
            truncate(display_title(record), 42)
        );
    }

    println!("\nShowing {} record(s) from offset {}", results.len(), offset);
    Ok(())
}

async fn show_stats(top: usize, json: bool) -> Result<()> {
    let manager = config::config()?.build_manager()?;
    let stats = manager.stats(top).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print!("{}", render_stats(&stats));
    }
    Ok(())
}

fn render_stats(stats: &ContentStats) -> String {
    let mut out = String::new();
    let mut line = |text: String| {
        out.push_str(&text);
        out.push('\n');
    };

    line(format!("Records: {}", stats.total));
    line(String::new());
    line("By type:".to_string());
    for (content_type, count) in &stats.by_type {
        line(format!("  {:<11} {}", content_type, count));
    }
    line(String::new());
    line("Ingested:".to_string());
    line(format!("  Last 24h:  {}", stats.recent.last_24h));
    line(format!("  Last 7d:   {}", stats.recent.last_7d));
    line(format!("  Last 30d:  {}", stats.recent.last_30d));
    line(format!("  Last 365d: {}", stats.recent.last_365d));
    line(String::new());
    line(format!(
        "Keywords: {} distinct, {:.1} per record",
        stats.distinct_keywords, stats.average_keywords
    ));
    if !stats.top_keywords.is_empty() {
        line("Top keywords:".to_string());
        for kc in &stats.top_keywords {
            line(format!("  {:<30} {}", kc.keyword, kc.count));
        }
    }
    if !stats.keyword_pairs.is_empty() {
        line("Seen together:".to_string());
        for pair in &stats.keyword_pairs {
            line(format!("  {:<30} {}", format!("{} + {}", pair.first, pair.second), pair.count));
        }
    }
    out
}

/// Show the resolved configuration (for debugging)
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("{}", "=".repeat(60));
    println!("  kbase configuration");
    println!("{}", "=".repeat(60));
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:     {}", cfg.home.display());
    println!("  Database: {}", cfg.database.display());
    println!();
    println!("Summarizer:");
    println!("  Provider: {}", cfg.summarizer.provider);
    println!("  Model:    {}", cfg.summarizer.model.as_deref().unwrap_or("(default)"));
    println!("  Key var:  {}", cfg.summarizer.api_key_env.as_deref().unwrap_or("(default)"));
    if let Some(base_url) = &cfg.summarizer.base_url {
        println!("  Base URL: {}", base_url);
    }
    println!();
    println!("Timeouts:");
    println!("  Extract:   {}s", cfg.timeouts.extract.as_secs());
    println!("  Summarize: {}s", cfg.timeouts.summarize.as_secs());
    println!("  HTTP:      {}s", cfg.http.timeout.as_secs());
    println!();
    println!("HTTP:");
    println!("  Max redirects: {}", cfg.http.max_redirects);
    println!("  Max body:      {} bytes", cfg.http.max_bytes);
    println!("  User agent:    {}", cfg.http.user_agent);

    Ok(())
}

fn print_summary_block(record: &ContentRecord) {
    eprintln!("   ID: {}", display_id(record));
    eprintln!("   Title: {}", display_title(record));
    eprintln!("   Type: {}", record.content_type);
    if !record.keywords.is_empty() {
        eprintln!("   Keywords: {}", keyword_list(record));
    }

    if record.summary.is_empty() {
        eprintln!("   (stored without summary)");
    } else {
        println!("\n{}", record.summary);
    }
}

fn display_id(record: &ContentRecord) -> String {
    record
        .id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn display_title(record: &ContentRecord) -> &str {
    if record.title.is_empty() {
        &record.url
    } else {
        &record.title
    }
}

fn keyword_list(record: &ContentRecord) -> String {
    record
        .keywords
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
