//! readwise-engine
//!
//! Command-line front end for the document engine: detect formats, inspect
//! metadata and tables of contents, read chapters, search, render PDF pages
//! and extract covers.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use readwise_engine::{BookFormat, EngineConfig, Session, UnifiedEngine};

#[derive(Parser)]
#[command(name = "readwise-engine")]
#[command(version, about = "Multi-format document engine", long_about = None)]
#[command(after_help = "EXAMPLES:
    readwise-engine detect book.epub
    readwise-engine toc book.epub
    readwise-engine search novel.txt \"white whale\" --limit 5
    readwise-engine render paper.pdf 0 page.png --width 800 --height 1200")]
struct Cli {
    /// Open as this format instead of detecting it (pdf, epub, txt, ...)
    #[arg(long, global = true, value_parser = parse_format)]
    format: Option<BookFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the detected format
    Detect { input: String },
    /// Print document information
    Info { input: String },
    /// Print the table of contents
    Toc { input: String },
    /// Print one chapter (one page for PDF)
    Chapter {
        input: String,
        index: usize,
        /// Print plain text instead of JSON
        #[arg(long)]
        text: bool,
    },
    /// Search the document
    Search {
        input: String,
        query: String,
        /// Stop after this many results
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Render a PDF page to an image file
    Render {
        input: String,
        page: usize,
        output: PathBuf,
        #[arg(long, default_value_t = 1080)]
        width: u32,
        #[arg(long, default_value_t = 1920)]
        height: u32,
    },
    /// Write the cover image to a file
    Cover { input: String, output: PathBuf },
}

fn parse_format(value: &str) -> Result<BookFormat, String> {
    match BookFormat::from_extension(value) {
        BookFormat::Unknown => Err(format!("unknown format: {value}")),
        format => Ok(format),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Detection<'a> {
    input: &'a str,
    format: BookFormat,
    display_name: &'static str,
    mime_type: &'static str,
    supported: bool,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "readwise_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let engine = UnifiedEngine::new(EngineConfig::from_env());

    let result = run(&engine, cli).await;
    engine.close();
    result
}

async fn open(
    engine: &UnifiedEngine,
    input: &str,
    format: Option<BookFormat>,
) -> anyhow::Result<Session> {
    engine
        .open_document(input, format)
        .await
        .with_context(|| format!("failed to open {input}"))
}

async fn run(engine: &UnifiedEngine, cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Detect { input } => {
            let format = cli.format.unwrap_or_else(|| engine.detect_format(&input));
            print_json(&Detection {
                input: &input,
                format,
                display_name: format.display_name(),
                mime_type: format.mime_type(),
                supported: format.engine().is_some(),
            })
        }
        Command::Info { input } => {
            let session = open(engine, &input, cli.format).await?;
            print_json(&session.document_info()?)
        }
        Command::Toc { input } => {
            let session = open(engine, &input, cli.format).await?;
            print_json(&session.outline().await?)
        }
        Command::Chapter { input, index, text } => {
            let session = open(engine, &input, cli.format).await?;
            let chapter = session.chapter(index).await?;
            if text {
                println!("{}", chapter.plain_text);
                Ok(())
            } else {
                print_json(&chapter)
            }
        }
        Command::Search {
            input,
            query,
            limit,
        } => {
            let session = open(engine, &input, cli.format).await?;
            let mut stream = session.search(&query)?;
            let mut results = Vec::new();
            while let Some(hit) = stream.next().await {
                results.push(hit?);
                if limit.is_some_and(|limit| results.len() >= limit) {
                    break;
                }
            }
            print_json(&results)
        }
        Command::Render {
            input,
            page,
            output,
            width,
            height,
        } => {
            let session = open(engine, &input, cli.format).await?;
            let Some(rendered) = session.render_page(page, width, height).await? else {
                bail!("page {page} could not be rendered");
            };
            rendered
                .image
                .save(&output)
                .with_context(|| format!("failed to write {}", output.display()))?;
            tracing::info!(page, width, height, output = %output.display(), "Rendered page");
            Ok(())
        }
        Command::Cover { input, output } => {
            let session = open(engine, &input, cli.format).await?;
            let Some(cover) = session.cover().await? else {
                bail!("{input} has no cover image");
            };
            cover
                .save(&output)
                .with_context(|| format!("failed to write {}", output.display()))?;
            Ok(())
        }
    }
}
