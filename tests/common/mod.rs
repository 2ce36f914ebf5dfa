#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Read as _};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ficbinder::fetch::Fetcher;

pub static PIXEL_PNG: &[u8] = &[
    137, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13, 73, 72, 68, 82, 0, 0, 0, 1, 0, 0, 0, 1, 8, 4, 0,
    0, 0, 181, 28, 12, 2, 0, 0, 0, 11, 73, 68, 65, 84, 120, 218, 99, 252, 255, 23, 0, 2, 3, 1, 128,
    110, 220, 25, 0, 0, 0, 0, 73, 69, 78, 68, 174, 66, 96, 130,
];

/// A 2x3 lossless WebP image.
pub fn webp_pixel() -> Vec<u8> {
    let img = image::DynamicImage::new_rgba8(2, 3);
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::WebP)
        .expect("encode webp");
    out
}

pub const BASE: &str = "http://stub.test";
pub const STORY_ID: u64 = 123;

/// In-memory site: URL -> body. Unknown URLs fail like a 404.
#[derive(Default)]
pub struct StubFetcher {
    responses: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Option<Duration>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn serve(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.into(), body.into());
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    async fn respond(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        *self.calls.lock().unwrap().entry(url.to_owned()).or_default() += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let body = self.responses.lock().unwrap().get(url).cloned();
        body.ok_or_else(|| anyhow::anyhow!("404 Not Found: {url}"))
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch_text(&self, url: &str) -> anyhow::Result<String> {
        let body = self.respond(url).await?;
        Ok(String::from_utf8(body)?)
    }

    async fn fetch_binary(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        self.respond(url).await
    }
}

pub fn api_url(base: &str) -> String {
    format!("{base}/api/story.php?story={STORY_ID}")
}

pub fn chapter_url(base: &str, chapter_id: u64) -> String {
    format!("{base}/chapters/download/{chapter_id}/html")
}

pub fn cover_url(base: &str) -> String {
    format!("{base}/images/cover-full.png")
}

/// Story API payload with one chapter per `(id, title)`.
pub fn story_json(base: &str, chapters: &[(u64, &str)]) -> String {
    let chapters: Vec<serde_json::Value> = chapters
        .iter()
        .map(|(id, title)| {
            serde_json::json!({
                "id": id,
                "title": title,
                "words": 0,
                "link": format!("{base}/story/{STORY_ID}/{id}/chapter"),
                "date_modified": 1_600_000_000,
            })
        })
        .collect();
    serde_json::json!({
        "story": {
            "id": STORY_ID,
            "title": "Tea With Friends",
            "url": format!("{base}/story/{STORY_ID}/tea-with-friends"),
            "short_description": "A quiet afternoon.",
            "full_image": cover_url(base),
            "words": 1200,
            "author": { "id": "77", "name": "Quill" },
            "date_modified": 1_600_000_000,
            "status": "Complete",
            "content_rating_text": "Everyone",
            "categories": { "Slice of Life": true, "Sad": false },
            "chapters": chapters,
        }
    })
    .to_string()
}

pub fn chapter_html(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><title>{title}</title></head><body>\n<h1>{title}</h1>\n{body}\n</body></html>\n"
    )
}

/// Serves a story whose chapters have the given `(id, title, body)`.
pub fn serve_story(stub: &StubFetcher, base: &str, chapters: &[(u64, &str, &str)]) {
    let listing: Vec<(u64, &str)> = chapters.iter().map(|(id, title, _)| (*id, *title)).collect();
    stub.serve(api_url(base), story_json(base, &listing));
    for (id, title, body) in chapters {
        stub.serve(chapter_url(base, *id), chapter_html(title, body));
    }
    stub.serve(cover_url(base), PIXEL_PNG.to_vec());
}

/// Entry names and a reader for an EPUB held in memory.
pub struct Epub {
    archive: zip::ZipArchive<Cursor<Vec<u8>>>,
}

impl Epub {
    pub fn open(bytes: Vec<u8>) -> Self {
        Self {
            archive: zip::ZipArchive::new(Cursor::new(bytes)).expect("open epub"),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_owned).collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.archive.file_names().any(|n| n == name)
    }

    pub fn bytes(&mut self, name: &str) -> Vec<u8> {
        let mut file = self.archive.by_name(name).expect("epub entry");
        let mut out = Vec::new();
        file.read_to_end(&mut out).expect("read epub entry");
        out
    }

    pub fn text(&mut self, name: &str) -> String {
        let mut file = self.archive.by_name(name).expect("epub entry");
        let mut out = String::new();
        file.read_to_string(&mut out).expect("read epub entry");
        out
    }
}
