use clap::{Args, Parser, Subcommand};

use crate::options::DEFAULT_BASE_URL;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download a story and write it as an EPUB.
    Convert(ConvertArgs),
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Story id or story URL.
    #[arg(long)]
    pub story: String,

    /// Output file, or an existing directory to name the file after the title.
    #[arg(long)]
    pub out: String,

    /// Override the story title.
    #[arg(long)]
    pub title: Option<String>,

    /// Override the author name.
    #[arg(long)]
    pub author: Option<String>,

    /// Cover image (local path or http/https URL).
    #[arg(long)]
    pub cover: Option<String>,

    /// Leave externally hosted images remote instead of embedding them.
    #[arg(long)]
    pub no_external_resources: bool,

    /// Put author's notes on their own pages.
    #[arg(long)]
    pub separate_notes: bool,

    /// Add a readability score to the title page.
    #[arg(long)]
    pub reading_ease: bool,

    /// Omit estimated reading times.
    #[arg(long)]
    pub no_reading_time: bool,

    /// Omit the chapter progress indicator.
    #[arg(long)]
    pub no_chapter_progress: bool,

    /// Site base URL.
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Maximum concurrent HTTP requests.
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Overwrite an existing output file.
    #[arg(long)]
    pub force: bool,

    /// Icon font (TTF/OTF/WOFF) to bundle for page icons.
    #[arg(long)]
    pub icon_font: Option<String>,

    /// Book language (BCP 47).
    #[arg(long, default_value = "en")]
    pub lang: String,
}
