use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use url::Url;

use crate::cli::ConvertArgs;
use crate::options::{ConvertOptions, CoverSource, Services};
use crate::pipeline::Conversion;
use crate::progress::LogProgress;
use crate::story;

pub async fn run(args: ConvertArgs) -> anyhow::Result<()> {
    let story_id = story::parse_story_id(&args.story)?;
    let options = options_from_args(&args)?;
    let services = Services::http().context("init http client")?;

    tracing::info!(story = story_id, base = %options.base_url, "convert: start");
    let conversion = Conversion::new(story_id, options, services, Arc::new(LogProgress));
    conversion.fetch_all().await?;

    let out = PathBuf::from(&args.out);
    let path = if out.is_dir() {
        let title = conversion
            .story()
            .await
            .map(|story| story.title)
            .unwrap_or_default();
        out.join(output_file_name(&title, story_id))
    } else {
        out
    };
    if path.exists() && !args.force {
        anyhow::bail!(
            "output file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }

    conversion.write_epub(&path).await?;
    println!("{}", path.display());
    Ok(())
}

fn options_from_args(args: &ConvertArgs) -> anyhow::Result<ConvertOptions> {
    let base_url =
        Url::parse(&args.base_url).with_context(|| format!("parse base url: {}", args.base_url))?;

    let cover = match args.cover.as_deref() {
        None => None,
        Some(src) if src.starts_with("http://") || src.starts_with("https://") => {
            Some(CoverSource::Url(src.to_owned()))
        }
        Some(src) => Some(CoverSource::Bytes(
            read_file(Path::new(src)).context("read cover")?,
        )),
    };
    let icon_font = args
        .icon_font
        .as_deref()
        .map(|path| read_file(Path::new(path)).context("read icon font"))
        .transpose()?;

    Ok(ConvertOptions {
        base_url,
        include_external_resources: !args.no_external_resources,
        separate_notes: args.separate_notes,
        reading_ease: args.reading_ease,
        reading_time: !args.no_reading_time,
        chapter_progress: !args.no_chapter_progress,
        resource_concurrency: args.concurrency,
        chapter_concurrency: args.concurrency,
        lang: args.lang.clone(),
        title: args.title.clone(),
        author: args.author.clone(),
        cover,
        icon_font,
        ..ConvertOptions::default()
    })
}

fn read_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("read file: {}", path.display()))
}

/// `<title>.epub` with characters that are unsafe in file names replaced.
pub fn output_file_name(title: &str, story_id: u64) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_matches('.');
    if cleaned.is_empty() {
        format!("story-{story_id}.epub")
    } else {
        format!("{cleaned}.epub")
    }
}
