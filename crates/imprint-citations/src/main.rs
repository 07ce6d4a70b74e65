//! imprint-cite
//!
//! Search a Markdown document's bibliography from the command line.

use std::path::PathBuf;

use clap::Parser;
use imprint_citations::{BibliographyManager, CitationsConfig, MarkdownDocument, StaticUiContext};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "imprint-cite", version, about = "Search the sources a document can cite")]
struct Cli {
    /// Markdown document whose bibliography is searched
    document: PathBuf,

    /// Search text; lists every source when omitted
    query: Option<String>,

    /// Restrict to one provider (`local`, `zotero`)
    #[arg(long)]
    provider: Option<String>,

    /// Restrict to a collection of the provider
    #[arg(long, requires = "provider")]
    collection: Option<String>,

    /// Configuration file (defaults to ~/.imprint/citations.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CitationsConfig::load_from(path)?,
        None => CitationsConfig::load_standard()?,
    };

    let text = tokio::fs::read_to_string(&cli.document).await?;
    let doc = MarkdownDocument::new(text);
    let ui = StaticUiContext::for_document(&cli.document);

    let manager = BibliographyManager::with_default_providers(&config);
    manager.load(&ui, &doc).await;

    let sources = manager.search(
        cli.query.as_deref(),
        cli.provider.as_deref(),
        cli.collection.as_deref(),
    );
    for source in &sources {
        println!(
            "{}\t{}\t{}",
            source.id(),
            source.provider_key,
            source.title().unwrap_or_default()
        );
    }

    if let Some(warning) = manager.warning() {
        eprintln!("warning: {}", warning);
    }

    Ok(())
}
