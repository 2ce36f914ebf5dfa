//! Conversion orchestrator. Each stage is memoized: a call while the stage is
//! in flight joins the pending run, a call after its state is populated returns
//! at once, and a failure clears the slot so the stage can be retried.

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context as _;
use futures::FutureExt as _;

use crate::cache::{ResourceCache, StageSlot};
use crate::error::{StageContext as _, StageError};
use crate::formats::{Chapter, CoverImage, Story};
use crate::icons::{self, IconFont};
use crate::markup::strip_tags;
use crate::media;
use crate::normalize::Normalizer;
use crate::options::{ConvertOptions, CoverSource, Services};
use crate::package::{self, PackageInput};
use crate::pages::{PageContext, Pages};
use crate::pool::map_bounded;
use crate::progress::{Phase, ProgressObserver, ProgressTracker};
use crate::readability::{self, ReadingEase};
use crate::resources::{self, RemoteResources, ResolveContext};
use crate::story;

/// Everything one conversion has produced so far. `None` means "not yet".
#[derive(Default)]
struct ConversionState {
    story: Option<Story>,
    raw_chapters: Option<Vec<Chapter>>,
    /// `Some(None)`: the cover stage ran and there is no usable cover.
    cover: Option<Option<CoverImage>>,
    chapters: Option<Vec<Chapter>>,
    description: Option<String>,
    readability: Option<Option<ReadingEase>>,
    pages: Option<Pages>,
    icon_font: Option<Option<IconFont>>,
    resources: Option<RemoteResources>,
    title_override: Option<String>,
    author_override: Option<String>,
    cover_override: Option<CoverSource>,
}

impl ConversionState {
    fn invalidate_pages(&mut self) {
        self.pages = None;
        self.icon_font = None;
        self.resources = None;
    }

    fn apply_overrides(&mut self) {
        let Some(story) = self.story.as_mut() else {
            return;
        };
        if let Some(title) = &self.title_override {
            story.title = title.clone();
        }
        if let Some(author) = &self.author_override {
            story.author.name = author.clone();
        }
    }
}

#[derive(Default)]
struct Slots {
    metadata: StageSlot<()>,
    chapters: StageSlot<()>,
    cover: StageSlot<()>,
    build_chapters: StageSlot<()>,
    pages: StageSlot<()>,
    icons: StageSlot<()>,
    remote: StageSlot<()>,
    all: StageSlot<()>,
}

struct Inner {
    story_id: u64,
    options: ConvertOptions,
    services: Services,
    normalizer: Normalizer,
    cache: Arc<ResourceCache>,
    progress: ProgressTracker,
    phase: Mutex<Phase>,
    state: tokio::sync::Mutex<ConversionState>,
    slots: Slots,
}

/// One story's conversion. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Conversion {
    inner: Arc<Inner>,
}

fn missing(what: &str) -> anyhow::Error {
    anyhow::anyhow!("{what} not available")
}

impl Conversion {
    pub fn new(
        story_id: u64,
        options: ConvertOptions,
        services: Services,
        observer: Arc<dyn ProgressObserver>,
    ) -> Self {
        let normalizer = Normalizer::new(options.base_url.clone(), services.videos.clone());
        let state = ConversionState {
            title_override: options.title.clone(),
            author_override: options.author.clone(),
            cover_override: options.cover.clone(),
            ..ConversionState::default()
        };
        Self {
            inner: Arc::new(Inner {
                story_id,
                options,
                services,
                normalizer,
                cache: Arc::new(ResourceCache::new()),
                progress: ProgressTracker::new(observer),
                phase: Mutex::new(Phase::Idle),
                state: tokio::sync::Mutex::new(state),
                slots: Slots::default(),
            }),
        }
    }

    pub fn story_id(&self) -> u64 {
        self.inner.story_id
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.inner.options
    }

    pub fn phase(&self) -> Phase {
        *self.inner.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, phase: Phase, message: &str) {
        *self.inner.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
        tracing::info!(stage = %phase, "{message}");
        self.inner.progress.report(phase, 0.0, message);
    }

    fn report(&self, phase: Phase, fraction: f64, message: impl Into<String>) {
        self.inner.progress.report(phase, fraction, message);
    }

    pub async fn story(&self) -> Option<Story> {
        self.inner.state.lock().await.story.clone()
    }

    /// Normalized chapters, once the chapter build has run.
    pub async fn chapters(&self) -> Option<Vec<Chapter>> {
        self.inner.state.lock().await.chapters.clone()
    }

    pub async fn pages(&self) -> Option<Pages> {
        self.inner.state.lock().await.pages.clone()
    }

    pub async fn resources(&self) -> Option<RemoteResources> {
        self.inner.state.lock().await.resources.clone()
    }

    pub async fn readability(&self) -> Option<ReadingEase> {
        self.inner.state.lock().await.readability.flatten()
    }

    pub async fn cover_image(&self) -> Option<CoverImage> {
        self.inner.state.lock().await.cover.clone().flatten()
    }

    pub async fn icon_font(&self) -> Option<IconFont> {
        self.inner.state.lock().await.icon_font.clone().flatten()
    }

    pub async fn set_title(&self, title: impl Into<String>) {
        let mut state = self.inner.state.lock().await;
        state.title_override = Some(title.into());
        state.apply_overrides();
        state.invalidate_pages();
    }

    pub async fn set_author(&self, author: impl Into<String>) {
        let mut state = self.inner.state.lock().await;
        state.author_override = Some(author.into());
        state.apply_overrides();
        state.invalidate_pages();
    }

    pub async fn set_cover_image(&self, cover: CoverSource) {
        let mut state = self.inner.state.lock().await;
        state.cover_override = Some(cover);
        state.cover = None;
        state.invalidate_pages();
    }

    async fn memoized<F, Fut>(&self, slot: &StageSlot<()>, body: F) -> Result<(), StageError>
    where
        F: FnOnce(Conversion) -> Fut,
        Fut: Future<Output = Result<(), StageError>> + Send + 'static,
    {
        let this = self.clone();
        slot.run(move || body(this).boxed()).await
    }

    pub async fn fetch_metadata(&self) -> Result<(), StageError> {
        let slot = &self.inner.slots.metadata;
        self.memoized(slot, |this| async move { this.run_fetch_metadata().await })
            .await
    }

    async fn run_fetch_metadata(&self) -> Result<(), StageError> {
        const PHASE: Phase = Phase::FetchingMetadata;
        if self.inner.state.lock().await.story.is_some() {
            return Ok(());
        }
        self.enter(PHASE, "fetching story metadata");

        let story = story::fetch_story(
            self.inner.services.fetcher.as_ref(),
            &self.inner.options.base_url,
            self.inner.story_id,
        )
        .await
        .in_stage(PHASE)?;
        tracing::info!(
            title = %story.title,
            chapters = story.chapters.len(),
            "story metadata loaded"
        );

        let mut state = self.inner.state.lock().await;
        state.story = Some(story);
        state.apply_overrides();
        drop(state);

        self.report(PHASE, 1.0, "story metadata loaded");
        Ok(())
    }

    pub async fn fetch_chapters(&self) -> Result<(), StageError> {
        let slot = &self.inner.slots.chapters;
        self.memoized(slot, |this| async move { this.run_fetch_chapters().await })
            .await
    }

    async fn run_fetch_chapters(&self) -> Result<(), StageError> {
        const PHASE: Phase = Phase::FetchingChapters;
        self.fetch_metadata().await?;

        let infos = {
            let state = self.inner.state.lock().await;
            if state.raw_chapters.is_some() {
                return Ok(());
            }
            state
                .story
                .as_ref()
                .map(|story| story.chapters.clone())
                .ok_or_else(|| missing("story metadata"))
                .in_stage(PHASE)?
        };
        self.enter(PHASE, "fetching chapters");

        let fetcher = Arc::clone(&self.inner.services.fetcher);
        let base = self.inner.options.base_url.clone();
        let results = map_bounded(
            infos,
            self.inner.options.chapter_concurrency,
            |info| {
                let fetcher = Arc::clone(&fetcher);
                let base = base.clone();
                async move {
                    tracing::debug!(chapter = info.id, title = %info.title, "fetching chapter");
                    story::fetch_chapter(fetcher.as_ref(), &base, &info).await
                }
            },
            |done, total| {
                self.report(
                    PHASE,
                    done as f64 / total as f64,
                    format!("fetched chapter {done} of {total}"),
                );
            },
        )
        .await
        .in_stage(PHASE)?;
        let chapters = results
            .into_iter()
            .collect::<anyhow::Result<Vec<_>>>()
            .in_stage(PHASE)?;

        self.inner.state.lock().await.raw_chapters = Some(chapters);
        Ok(())
    }

    /// Cover failures are not fatal: the book is built without a cover.
    pub async fn fetch_cover_image(&self) -> Result<(), StageError> {
        let slot = &self.inner.slots.cover;
        self.memoized(slot, |this| async move { this.run_fetch_cover_image().await })
            .await
    }

    async fn run_fetch_cover_image(&self) -> Result<(), StageError> {
        const PHASE: Phase = Phase::FetchingCover;
        self.fetch_metadata().await?;

        let source = {
            let state = self.inner.state.lock().await;
            if state.cover.is_some() {
                return Ok(());
            }
            state.cover_override.clone().or_else(|| {
                state
                    .story
                    .as_ref()
                    .and_then(|story| story.cover_url.clone())
                    .map(CoverSource::Url)
            })
        };
        self.enter(PHASE, "fetching cover image");

        let cover = match source {
            None => None,
            Some(source) => match self.load_cover(source).await {
                Ok(cover) => Some(cover),
                Err(err) => {
                    tracing::warn!(?err, "cover image unavailable; continuing without it");
                    None
                }
            },
        };

        self.inner.state.lock().await.cover = Some(cover);
        self.report(PHASE, 1.0, "cover image ready");
        Ok(())
    }

    async fn load_cover(&self, source: CoverSource) -> anyhow::Result<CoverImage> {
        let cache = &self.inner.cache;
        let data = match source {
            CoverSource::Bytes(bytes) => {
                let key = cache.insert_fingerprinted(bytes);
                cache.get(&key).ok_or_else(|| missing("cover bytes"))?
            }
            CoverSource::Url(url) => cache
                .get_or_fetch(&url, Arc::clone(&self.inner.services.fetcher))
                .await
                .with_context(|| format!("fetch cover: {url}"))?,
        };

        let inspector = self.inner.services.media.as_ref();
        let (media_type, data) =
            media::classify(inspector, data.to_vec()).context("cover type not recognized")?;
        if !media_type.is_image() {
            anyhow::bail!("cover is not an image ({})", media_type.mime);
        }
        let dimensions = inspector.dimensions(&data);
        Ok(CoverImage {
            data,
            media_type,
            dimensions,
        })
    }

    /// Normalizes and tidies every chapter and the description, then scores
    /// readability when enabled.
    pub async fn build_chapters(&self) -> Result<(), StageError> {
        let slot = &self.inner.slots.build_chapters;
        self.memoized(slot, |this| async move { this.run_build_chapters().await })
            .await
    }

    async fn run_build_chapters(&self) -> Result<(), StageError> {
        const PHASE: Phase = Phase::BuildingChapters;
        self.fetch_chapters().await?;

        let (raw, description) = {
            let state = self.inner.state.lock().await;
            if state.chapters.is_some() {
                return Ok(());
            }
            let raw = state
                .raw_chapters
                .clone()
                .ok_or_else(|| missing("chapters"))
                .in_stage(PHASE)?;
            let description = state
                .story
                .as_ref()
                .map(|story| story.description.clone())
                .unwrap_or_default();
            (raw, description)
        };
        self.enter(PHASE, "building chapters");

        let normalizer = &self.inner.normalizer;
        let tidy = self.inner.services.tidy.as_ref();
        let count = raw.len();
        let total = count.max(1) as f64;

        let mut chapters = Vec::with_capacity(count);
        for (idx, chapter) in raw.into_iter().enumerate() {
            let content = normalizer.normalize(&chapter.content).await;
            let notes = if chapter.has_notes() {
                normalizer.normalize(&chapter.notes).await
            } else {
                String::new()
            };
            let content = tidy
                .tidy(&content)
                .with_context(|| format!("tidy chapter {}", idx + 1))
                .in_stage(PHASE)?;
            let notes = tidy
                .tidy(&notes)
                .with_context(|| format!("tidy notes of chapter {}", idx + 1))
                .in_stage(PHASE)?;
            chapters.push(Chapter {
                content,
                notes,
                ..chapter
            });
            self.report(
                PHASE,
                0.5 * (idx + 1) as f64 / total,
                format!("built chapter {} of {count}", idx + 1),
            );
        }

        let description = normalizer.normalize(&description).await;
        let description = tidy
            .tidy(&description)
            .context("tidy description")
            .in_stage(PHASE)?;

        let readability = if self.inner.options.reading_ease {
            let text = chapters
                .iter()
                .map(|chapter| strip_tags(&chapter.content))
                .collect::<Vec<_>>()
                .join("\n");
            let ease = readability::estimate(&text, self.inner.options.readability_wakeup, |f| {
                self.report(PHASE, 0.5 + 0.5 * f, "estimating readability");
            })
            .await;
            if ease.is_none() {
                tracing::info!("no readable text; skipping readability block");
            }
            ease
        } else {
            None
        };

        let mut state = self.inner.state.lock().await;
        state.chapters = Some(chapters);
        state.description = Some(description);
        state.readability = Some(readability);
        drop(state);

        self.report(PHASE, 1.0, "chapters built");
        Ok(())
    }

    pub async fn build_pages(&self) -> Result<(), StageError> {
        let slot = &self.inner.slots.pages;
        self.memoized(slot, |this| async move { this.run_build_pages().await })
            .await
    }

    async fn run_build_pages(&self) -> Result<(), StageError> {
        const PHASE: Phase = Phase::BuildingPages;
        self.build_chapters().await?;
        self.fetch_cover_image().await?;

        let mut state = self.inner.state.lock().await;
        if state.pages.is_some() {
            return Ok(());
        }
        self.enter(PHASE, "building pages");

        let pages = {
            let (Some(story), Some(chapters)) = (state.story.as_ref(), state.chapters.as_ref())
            else {
                return Err(missing("normalized chapters")).in_stage(PHASE);
            };
            Pages::render(&PageContext {
                story,
                description: state.description.as_deref().unwrap_or_default(),
                chapters,
                cover: state.cover.as_ref().and_then(Option::as_ref),
                readability: state.readability.as_ref().and_then(Option::as_ref),
                options: &self.inner.options,
            })
        };
        state.pages = Some(pages);
        drop(state);

        self.report(PHASE, 1.0, "pages built");
        Ok(())
    }

    /// Recomputes icon usage from the rendered pages and subsets the font.
    pub async fn scan_icons(&self) -> Result<(), StageError> {
        let slot = &self.inner.slots.icons;
        self.memoized(slot, |this| async move { this.run_scan_icons().await })
            .await
    }

    async fn run_scan_icons(&self) -> Result<(), StageError> {
        const PHASE: Phase = Phase::ScanningIcons;
        self.build_pages().await?;

        let mut state = self.inner.state.lock().await;
        if state.icon_font.is_some() {
            return Ok(());
        }
        self.enter(PHASE, "scanning icons");

        let pages = state
            .pages
            .as_ref()
            .ok_or_else(|| missing("pages"))
            .in_stage(PHASE)?;
        let used = icons::icon_usage(pages.documents());
        let font = match self.inner.options.icon_font.as_deref() {
            Some(font) => {
                icons::build_icon_font(self.inner.services.fonts.as_ref(), font, &used)
                    .context("subset icon font")
                    .in_stage(PHASE)?
            }
            None => None,
        };
        tracing::debug!(icons = used.len(), bundled = font.is_some(), "icon usage");
        state.icon_font = Some(font);
        drop(state);

        self.report(PHASE, 1.0, "icons scanned");
        Ok(())
    }

    pub async fn fetch_remote_files(&self) -> Result<(), StageError> {
        let slot = &self.inner.slots.remote;
        self.memoized(slot, |this| async move { this.run_fetch_remote_files().await })
            .await
    }

    async fn run_fetch_remote_files(&self) -> Result<(), StageError> {
        const PHASE: Phase = Phase::FetchingRemoteResources;
        self.build_pages().await?;

        let mut resources = {
            let state = self.inner.state.lock().await;
            if state.resources.is_some() {
                return Ok(());
            }
            let pages = state
                .pages
                .as_ref()
                .ok_or_else(|| missing("pages"))
                .in_stage(PHASE)?;
            let mut resources = RemoteResources::new();
            for (site, doc) in pages.reference_documents() {
                resources.discover(site, doc);
            }
            resources
        };
        self.enter(PHASE, "fetching remote resources");

        if !self.inner.options.include_external_resources {
            tracing::info!(
                resources = resources.len(),
                "external resources disabled; leaving references remote"
            );
            resources.flag_all();
        } else {
            let ctx = ResolveContext {
                cache: Arc::clone(&self.inner.cache),
                fetcher: Arc::clone(&self.inner.services.fetcher),
                media: Arc::clone(&self.inner.services.media),
                concurrency: self.inner.options.resource_concurrency,
            };
            resources::resolve(&mut resources, &ctx, |done, total| {
                self.report(
                    PHASE,
                    done as f64 / total as f64,
                    format!("fetched resource {done} of {total}"),
                );
            })
            .await
            .in_stage(PHASE)?;
        }

        let mut state = self.inner.state.lock().await;
        let pages = state
            .pages
            .as_mut()
            .ok_or_else(|| missing("pages"))
            .in_stage(PHASE)?;
        for site in resources.sites() {
            if let Some(doc) = pages.document_mut(site) {
                *doc = resources.rewrite(site, doc);
            }
        }
        state.resources = Some(resources);
        drop(state);

        self.report(PHASE, 1.0, "remote resources settled");
        Ok(())
    }

    /// Runs every stage in order and leaves the conversion ready to assemble.
    pub async fn fetch_all(&self) -> Result<(), StageError> {
        let slot = &self.inner.slots.all;
        self.memoized(slot, |this| async move { this.run_fetch_all().await })
            .await
    }

    async fn run_fetch_all(&self) -> Result<(), StageError> {
        self.fetch_metadata().await?;
        self.fetch_chapters().await?;
        self.fetch_cover_image().await?;
        self.build_chapters().await?;
        self.build_pages().await?;
        self.scan_icons().await?;
        self.fetch_remote_files().await?;

        *self.inner.phase.lock().unwrap_or_else(PoisonError::into_inner) = Phase::ReadyToAssemble;
        self.report(Phase::ReadyToAssemble, 1.0, "ready to assemble");
        Ok(())
    }

    /// Builds the archive bytes.
    pub async fn assemble(&self) -> Result<Vec<u8>, StageError> {
        const PHASE: Phase = Phase::Assembling;
        self.fetch_all().await?;
        self.enter(PHASE, "assembling epub");

        let bytes = {
            let state = self.inner.state.lock().await;
            let (Some(story), Some(chapters), Some(pages), Some(resources)) = (
                state.story.as_ref(),
                state.chapters.as_ref(),
                state.pages.as_ref(),
                state.resources.as_ref(),
            ) else {
                return Err(missing("conversion state")).in_stage(PHASE);
            };
            let input = PackageInput {
                story,
                chapters,
                pages,
                cover: state.cover.as_ref().and_then(Option::as_ref),
                resources,
                icon_font: state.icon_font.as_ref().and_then(Option::as_ref),
                lang: &self.inner.options.lang,
            };
            let files = package::build_files(&input);
            tracing::debug!(files = files.len(), "packaging");
            crate::archive::package_to_zip(&files).in_stage(PHASE)?
        };

        *self.inner.phase.lock().unwrap_or_else(PoisonError::into_inner) = Phase::Done;
        self.report(Phase::Done, 1.0, "done");
        Ok(bytes)
    }

    pub async fn write_epub(&self, path: &Path) -> anyhow::Result<()> {
        let bytes = self.assemble().await?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create output dir: {}", parent.display()))?;
        }
        tokio::fs::write(path, &bytes)
            .await
            .with_context(|| format!("write epub: {}", path.display()))?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "epub written");
        Ok(())
    }
}
