//! Story metadata and chapter bodies as the site serves them.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use url::Url;

use crate::fetch::Fetcher;
use crate::formats::{Author, Chapter, ChapterInfo, Prequel, Story, Tag};
use crate::markup::{self, decode_entities};

/// Selectors for the story page and the chapter download page.
struct PageSelectors {
    description: Selector,
    tag: Selector,
    prequel: Selector,
    approved: Selector,
    body: Selector,
    authors_note: Selector,
}

impl PageSelectors {
    fn new() -> Self {
        let parse = |css: &str| Selector::parse(css).expect("static selector");
        Self {
            description: parse(".description-text"),
            tag: parse(".story-tags a[href]"),
            prequel: parse(".story-prequel a[href]"),
            approved: parse(".approved-date [data-time]"),
            body: parse("body"),
            authors_note: parse(".authors-note"),
        }
    }
}

static STORY_PATH_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/story/(\d+)(?:/|$)").expect("static regex"));
static SELECTORS: LazyLock<PageSelectors> = LazyLock::new(PageSelectors::new);
static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\S+").expect("static regex"));

/// Accepts a bare numeric id or any URL with a `/story/<id>` path segment.
pub fn parse_story_id(input: &str) -> anyhow::Result<u64> {
    let input = input.trim();
    if let Ok(id) = input.parse::<u64>() {
        return Ok(id);
    }

    let url = Url::parse(input).with_context(|| format!("not a story id or url: {input}"))?;
    let caps = STORY_PATH_ID
        .captures(url.path())
        .with_context(|| format!("no /story/<id> in url: {input}"))?;
    caps[1]
        .parse::<u64>()
        .with_context(|| format!("story id out of range: {input}"))
}

pub fn story_api_url(base: &Url, id: u64) -> anyhow::Result<Url> {
    let mut url = base.join("/api/story.php").context("build story api url")?;
    url.query_pairs_mut().append_pair("story", &id.to_string());
    Ok(url)
}

pub fn story_page_url(base: &Url, id: u64) -> anyhow::Result<Url> {
    base.join(&format!("/story/{id}"))
        .context("build story page url")
}

pub fn chapter_download_url(base: &Url, chapter_id: u64) -> anyhow::Result<Url> {
    base.join(&format!("/chapters/download/{chapter_id}/html"))
        .context("build chapter download url")
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    story: Option<ApiStory>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiStory {
    id: u64,
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    short_description: String,
    #[serde(default)]
    full_image: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    words: u64,
    author: ApiAuthor,
    #[serde(default)]
    date_modified: Option<i64>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    content_rating_text: String,
    #[serde(default)]
    categories: BTreeMap<String, bool>,
    #[serde(default)]
    chapters: Vec<ApiChapter>,
}

#[derive(Debug, Deserialize)]
struct ApiAuthor {
    id: LooseId,
    name: String,
}

/// The API serves ids both as numbers and as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LooseId {
    Number(u64),
    Text(String),
}

impl LooseId {
    fn into_string(self) -> String {
        match self {
            LooseId::Number(n) => n.to_string(),
            LooseId::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiChapter {
    id: u64,
    title: String,
    #[serde(default)]
    words: u64,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    date_modified: Option<i64>,
}

fn timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.filter(|s| *s > 0)
        .and_then(|s| DateTime::from_timestamp(s, 0))
}

/// Parses the story API payload. An `error` payload is an error.
pub fn parse_story_api(raw: &str, base: &Url) -> anyhow::Result<Story> {
    let envelope: ApiEnvelope = serde_json::from_str(raw).context("parse story api response")?;
    if let Some(error) = envelope.error {
        anyhow::bail!("story api error: {error}");
    }
    let api = envelope.story.context("story api response has no story")?;

    let url = match api.url {
        Some(url) if !url.is_empty() => url,
        _ => story_page_url(base, api.id)?.to_string(),
    };

    let author_id = api.author.id.into_string();
    let author_url = base
        .join(&format!("/user/{author_id}"))
        .context("build author url")?
        .to_string();

    let chapters = api
        .chapters
        .into_iter()
        .map(|chapter| {
            let link = match chapter.link {
                Some(link) if !link.is_empty() => link,
                _ => base
                    .join(&format!("/chapter/{}", chapter.id))
                    .context("build chapter url")?
                    .to_string(),
            };
            Ok::<_, anyhow::Error>(ChapterInfo {
                id: chapter.id,
                title: decode_entities(&chapter.title).into_owned(),
                link,
                word_count: chapter.words,
                modified: timestamp(chapter.date_modified),
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let tags = api
        .categories
        .into_iter()
        .filter(|(_, on)| *on)
        .map(|(name, _)| {
            let url = base
                .join(&format!("/stories?genre={name}"))
                .map(|u| u.to_string())
                .unwrap_or_default();
            Tag {
                name,
                kind: "genre".to_owned(),
                url,
            }
        })
        .collect();

    let cover_url = api
        .full_image
        .or(api.image)
        .filter(|u| !u.trim().is_empty());

    Ok(Story {
        id: api.id,
        title: decode_entities(&api.title).into_owned(),
        url,
        author: Author {
            id: author_id,
            name: decode_entities(&api.author.name).into_owned(),
            url: author_url,
        },
        status: api.status,
        content_rating: api.content_rating_text,
        published: None,
        modified: timestamp(api.date_modified),
        words: api.words,
        tags,
        description: String::new(),
        short_description: api.short_description,
        prequel: None,
        cover_url,
        chapters,
    })
}

/// Fills in what only the story page shows: the rendered description, the
/// full tag list, the prequel link and the approval date.
pub fn apply_story_page(story: &mut Story, html: &str, base: &Url) {
    let doc = Html::parse_document(html);
    let s = &*SELECTORS;

    if let Some(description) = doc.select(&s.description).next() {
        story.description = description.inner_html().trim().to_owned();
    }

    let tags: Vec<Tag> = doc
        .select(&s.tag)
        .filter_map(|link| {
            let kind = link
                .value()
                .classes()
                .find_map(|class| class.strip_prefix("tag-"))?;
            let name = element_text(&link);
            if name.is_empty() {
                return None;
            }
            Some(Tag {
                name,
                kind: kind.to_owned(),
                url: absolute(base, link.value().attr("href")?),
            })
        })
        .collect();
    if !tags.is_empty() {
        story.tags = tags;
    }

    if let Some(link) = doc.select(&s.prequel).next()
        && let Some(href) = link.value().attr("href")
    {
        story.prequel = Some(Prequel {
            title: element_text(&link),
            url: absolute(base, href),
        });
    }

    if let Some(time) = doc
        .select(&s.approved)
        .next()
        .and_then(|el| el.value().attr("data-time"))
    {
        story.published = time.parse::<i64>().ok().and_then(|secs| timestamp(Some(secs)));
    }
}

/// Text content with whitespace runs collapsed.
fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn absolute(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_owned())
}

pub async fn fetch_story(fetcher: &dyn Fetcher, base: &Url, id: u64) -> anyhow::Result<Story> {
    let api_url = story_api_url(base, id)?;
    let raw = fetcher
        .fetch_text(api_url.as_str())
        .await
        .with_context(|| format!("fetch story {id} metadata"))?;
    let mut story = parse_story_api(&raw, base)?;

    let page_url = story_page_url(base, id)?;
    match fetcher.fetch_text(page_url.as_str()).await {
        Ok(page) => apply_story_page(&mut story, &page, base),
        Err(err) => {
            tracing::warn!(?err, story = id, "story page unavailable; using api metadata only");
        }
    }
    if story.description.is_empty() && !story.short_description.is_empty() {
        story.description = format!("<p>{}</p>", markup::xml_escape(&story.short_description));
    }
    Ok(story)
}

/// Splits a chapter download page into body and author's note. The page
/// is the chapter heading followed by the content, with the note as a
/// top-level `.authors-note` block before or after it.
pub fn parse_chapter_download(html: &str, info: &ChapterInfo) -> Chapter {
    let doc = Html::parse_document(html);
    let s = &*SELECTORS;

    let mut content = String::new();
    let mut notes: Option<(String, bool)> = None;
    let mut heading_seen = false;
    if let Some(body) = doc.select(&s.body).next() {
        for node in body.children() {
            if let Some(el) = ElementRef::wrap(node) {
                if !heading_seen && el.value().name() == "h1" {
                    heading_seen = true;
                } else if notes.is_none() && s.authors_note.matches(&el) {
                    let notes_first = content.trim().is_empty();
                    notes = Some((el.inner_html().trim().to_owned(), notes_first));
                } else {
                    content.push_str(&el.html());
                }
            } else if let Some(text) = node.value().as_text() {
                content.push_str(&markup::escape_text(text));
            }
        }
    }
    let content = content.trim().to_owned();
    let (notes, notes_first) = notes.unwrap_or_default();

    let word_count = if info.word_count > 0 {
        info.word_count
    } else {
        count_words(&markup::strip_tags(&content))
    };

    Chapter {
        title: info.title.clone(),
        link: info.link.clone(),
        content,
        notes,
        notes_first,
        word_count,
    }
}

pub fn count_words(text: &str) -> u64 {
    WORD.find_iter(text).count() as u64
}

pub async fn fetch_chapter(
    fetcher: &dyn Fetcher,
    base: &Url,
    info: &ChapterInfo,
) -> anyhow::Result<Chapter> {
    let url = chapter_download_url(base, info.id)?;
    let html = fetcher
        .fetch_text(url.as_str())
        .await
        .with_context(|| format!("fetch chapter {} ({})", info.id, info.title))?;
    Ok(parse_chapter_download(&html, info))
}
