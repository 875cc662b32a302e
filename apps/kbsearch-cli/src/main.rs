mod cli;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kbsearch_core::config::Config;
use kbsearch_core::filter::{FilterOp, FilterValue, MetadataField, MetadataFilter};
use kbsearch_core::types::{SearchResponse, SearchResult};
use kbsearch_hybrid::{RebuildOutcome, SearchContext, SearchRequest};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "kbsearch=info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = Config::load()?.search_settings()?;
    let base = match cli.base {
        Some(base) => base,
        None => std::env::current_dir()?,
    };
    let ctx = SearchContext::init(settings, &base)?;

    let result = run(&ctx, cli.command).await;
    if let Err(e) = &result {
        error!(error = %e, "command failed");
    }
    ctx.shutdown().await?;
    result
}

async fn run(ctx: &std::sync::Arc<SearchContext>, command: Commands) -> Result<()> {
    match command {
        Commands::Ingest { quiet } => {
            ctx.show_progress(!quiet);
            let report = ctx.index_corpus().await?;
            println!(
                "Indexed {} changed file(s), {} unchanged, {} removed: {} chunk(s) added, {} tombstoned",
                report.changed_files, report.unchanged_files, report.removed_files, report.chunks_added, report.chunks_tombstoned
            );
            if report.degraded_chunks > 0 {
                println!("{} chunk(s) carry fallback vectors; run `kbsearch rebuild` once the primary provider is back", report.degraded_chunks);
            }
            for path in &report.failed_files {
                println!("  skipped unreadable file {path}");
            }
        }
        Commands::Query { query, mode, k, path, section, json } => {
            let mut filter = MetadataFilter::new();
            if let Some(prefix) = path {
                filter = filter.with(MetadataField::SourcePath, FilterOp::StartsWith, FilterValue::Text(prefix));
            }
            if let Some(title) = section {
                filter = filter.with(MetadataField::SectionTitle, FilterOp::Eq, FilterValue::Text(title));
            }
            let request = SearchRequest { query, mode, k, filter };
            let response = ctx.search(&request).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_response(&response);
            }
        }
        Commands::File { path } => {
            let results = ctx.engine().search_by_file(&path);
            if results.is_empty() {
                println!("No indexed chunks for {path}");
            }
            for result in &results {
                print_result(result.metadata.position_index + 1, result);
            }
        }
        Commands::Related { query, n } => {
            for title in ctx.engine().suggest_related_queries(&query, n) {
                println!("{title}");
            }
        }
        Commands::Status => {
            println!("{}", serde_json::to_string_pretty(&ctx.status())?);
        }
        Commands::Rebuild { force } => {
            ctx.show_progress(true);
            match ctx.rebuild_index(force).await?? {
                RebuildOutcome::Rebuilt { vectors, degraded } => {
                    info!(vectors, degraded, "rebuild finished");
                    println!("Rebuilt index with {vectors} vector(s), {degraded} degraded");
                }
                RebuildOutcome::Cancelled => println!("Rebuild was superseded"),
            }
        }
    }
    Ok(())
}

fn print_response(response: &SearchResponse) {
    if let Some(err) = &response.error {
        println!("Search failed: {err}");
        return;
    }
    let cached = if response.from_cache { ", cached" } else { "" };
    println!("{} result(s) for \"{}\" [{}] in {} ms{cached}", response.total, response.query, response.mode, response.elapsed_ms);
    for (i, result) in response.results.iter().enumerate() {
        print_result(i + 1, result);
    }
}

fn print_result(rank: usize, result: &SearchResult) {
    let meta = &result.metadata;
    println!("\n{rank}. {} > {} (score {:.3})", meta.source_path, meta.section_title, result.similarity_score);
    if !result.provenance.matched_terms.is_empty() {
        println!("   terms: {}", result.provenance.matched_terms.join(", "));
    }
    let preview: String = result.content.chars().take(240).collect();
    for line in preview.lines().filter(|l| !l.trim().is_empty()) {
        println!("   {line}");
    }
}
