use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::embeds::{VideoMetadataSource, YoutubeApi};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::icons::{FontSubsetter, PassthroughSubsetter};
use crate::markup::{BasicTidy, HtmlTidy};
use crate::media::{ImageInspector, MediaInspector};

pub const DEFAULT_BASE_URL: &str = "https://www.fimfiction.net";

/// Where a cover override comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverSource {
    Bytes(Vec<u8>),
    Url(String),
}

/// Library-level configuration for one conversion.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub base_url: Url,
    /// Download and embed externally hosted images. When off, documents that
    /// reference them are flagged as holding remote content.
    pub include_external_resources: bool,
    /// Author's notes go to their own non-linear documents instead of inline.
    pub separate_notes: bool,
    pub reading_ease: bool,
    pub reading_time: bool,
    pub chapter_progress: bool,
    pub words_per_minute: u64,
    /// Number of neighbouring chapters shown in the chapter-progress bar.
    pub progress_window: usize,
    pub resource_concurrency: usize,
    pub chapter_concurrency: usize,
    pub readability_wakeup: Duration,
    pub lang: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub cover: Option<CoverSource>,
    pub icon_font: Option<Vec<u8>>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base url"),
            include_external_resources: true,
            separate_notes: false,
            reading_ease: false,
            reading_time: true,
            chapter_progress: true,
            words_per_minute: 200,
            progress_window: 15,
            resource_concurrency: 4,
            chapter_concurrency: 4,
            readability_wakeup: Duration::from_millis(50),
            lang: "en".to_owned(),
            title: None,
            author: None,
            cover: None,
            icon_font: None,
        }
    }
}

/// Injected collaborators.
#[derive(Clone)]
pub struct Services {
    pub fetcher: Arc<dyn Fetcher>,
    pub tidy: Arc<dyn HtmlTidy>,
    pub media: Arc<dyn MediaInspector>,
    pub fonts: Arc<dyn FontSubsetter>,
    pub videos: Arc<dyn VideoMetadataSource>,
}

impl Services {
    /// Default collaborators around `fetcher`. Video lookups go through the
    /// same fetcher and pick up the API key from the environment.
    pub fn with_fetcher(fetcher: Arc<dyn Fetcher>) -> Self {
        let videos: Arc<dyn VideoMetadataSource> = Arc::new(YoutubeApi::from_env(fetcher.clone()));
        Self {
            fetcher,
            tidy: Arc::new(BasicTidy),
            media: Arc::new(ImageInspector),
            fonts: Arc::new(PassthroughSubsetter),
            videos,
        }
    }

    pub fn http() -> anyhow::Result<Self> {
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::from_env()?);
        Ok(Self::with_fetcher(fetcher))
    }
}
