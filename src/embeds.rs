//! Video and audio embed placeholders found in chapter markup.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use anyhow::Context as _;
use async_trait::async_trait;
use regex::{Captures, Regex};
use serde::Deserialize;

use crate::fetch::Fetcher;
use crate::markup::{decode_entities, xml_escape};

pub const YOUTUBE_API_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/videos";
/// The videos endpoint rejects requests listing more ids than this.
pub const MAX_IDS_PER_REQUEST: usize = 50;

static YOUTUBE_EMBED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<div class="youtube_container">\s*<iframe[^>]*?src="[^"]*?youtube(?:-nocookie)?\.com/embed/([A-Za-z0-9_-]+)[^"]*"[^>]*>\s*</iframe>\s*</div>"#,
    )
    .expect("static regex")
});

static SOUNDCLOUD_EMBED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<div class="soundcloud_container">\s*<iframe[^>]*?src="([^"]*?soundcloud\.com/player/[^"]*)"[^>]*>\s*</iframe>\s*</div>"#,
    )
    .expect("static regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoInfo {
    pub title: String,
    pub thumbnail: String,
}

/// Capability: batched video metadata lookup. Ids absent from the returned map
/// are treated as unresolved.
#[async_trait]
pub trait VideoMetadataSource: Send + Sync {
    async fn lookup(&self, ids: &[String]) -> anyhow::Result<HashMap<String, VideoInfo>>;
}

/// YouTube Data API v3 client. Without an API key every lookup comes back empty.
pub struct YoutubeApi {
    fetcher: Arc<dyn Fetcher>,
    api_key: Option<String>,
    endpoint: String,
}

impl YoutubeApi {
    pub fn new(fetcher: Arc<dyn Fetcher>, api_key: Option<String>) -> Self {
        Self {
            fetcher,
            api_key,
            endpoint: YOUTUBE_API_ENDPOINT.to_owned(),
        }
    }

    /// Reads the key from `FICBINDER_YOUTUBE_API_KEY`.
    pub fn from_env(fetcher: Arc<dyn Fetcher>) -> Self {
        let key = std::env::var("FICBINDER_YOUTUBE_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::new(fetcher, key)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    id: String,
    snippet: VideoSnippet,
}

#[derive(Debug, Deserialize)]
struct VideoSnippet {
    title: String,
    #[serde(default)]
    thumbnails: HashMap<String, Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[async_trait]
impl VideoMetadataSource for YoutubeApi {
    async fn lookup(&self, ids: &[String]) -> anyhow::Result<HashMap<String, VideoInfo>> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::debug!(videos = ids.len(), "no youtube api key; leaving embeds as-is");
            return Ok(HashMap::new());
        };
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut found = HashMap::new();
        for batch in ids.chunks(MAX_IDS_PER_REQUEST) {
            found.extend(self.lookup_batch(api_key, batch).await?);
        }
        Ok(found)
    }
}

impl YoutubeApi {
    async fn lookup_batch(
        &self,
        api_key: &str,
        ids: &[String],
    ) -> anyhow::Result<HashMap<String, VideoInfo>> {
        let mut url = url::Url::parse(&self.endpoint).context("parse youtube endpoint")?;
        url.query_pairs_mut()
            .append_pair("id", &ids.join(","))
            .append_pair("part", "snippet")
            .append_pair("maxResults", &MAX_IDS_PER_REQUEST.to_string())
            .append_pair("key", api_key);

        let raw = self.fetcher.fetch_text(url.as_str()).await?;
        let response: VideoListResponse =
            serde_json::from_str(&raw).context("parse youtube response")?;

        Ok(response
            .items
            .into_iter()
            .filter_map(|item| {
                let thumbnails = &item.snippet.thumbnails;
                let thumbnail = ["high", "medium", "default"]
                    .iter()
                    .find_map(|size| thumbnails.get(*size))?
                    .url
                    .clone();
                Some((
                    item.id,
                    VideoInfo {
                        title: item.snippet.title,
                        thumbnail,
                    },
                ))
            })
            .collect())
    }
}

/// Distinct video ids in first-seen order.
pub fn video_ids(html: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for caps in YOUTUBE_EMBED.captures_iter(html) {
        let id = &caps[1];
        if !ids.iter().any(|seen| seen == id) {
            ids.push(id.to_owned());
        }
    }
    ids
}

/// Swaps every placeholder whose id has metadata for a thumbnail card.
pub fn replace_video_embeds(html: &str, videos: &HashMap<String, VideoInfo>) -> String {
    YOUTUBE_EMBED
        .replace_all(html, |caps: &Captures<'_>| match videos.get(&caps[1]) {
            Some(info) => render_video_card(&caps[1], info),
            None => caps[0].to_owned(),
        })
        .into_owned()
}

fn render_video_card(id: &str, info: &VideoInfo) -> String {
    let link = format!("https://www.youtube.com/watch?v={id}");
    format!(
        "<figure class=\"youtube\"><a href=\"{link}\"><img src=\"{thumb}\" alt=\"{title}\" /></a><figcaption><a href=\"{link}\">{title}</a></figcaption></figure>",
        link = xml_escape(&link),
        thumb = xml_escape(&info.thumbnail),
        title = xml_escape(&info.title),
    )
}

/// SoundCloud players become plain links to the track; no lookup needed.
pub fn replace_audio_embeds(html: &str) -> String {
    SOUNDCLOUD_EMBED
        .replace_all(html, |caps: &Captures<'_>| {
            let player = decode_entities(&caps[1]).into_owned();
            let player = if player.starts_with("//") {
                format!("https:{player}")
            } else {
                player
            };
            let track = url::Url::parse(&player).ok().and_then(|u| {
                u.query_pairs()
                    .find(|(k, _)| k == "url")
                    .map(|(_, v)| v.into_owned())
            });
            match track {
                Some(track) => format!(
                    "<p class=\"soundcloud\"><a href=\"{href}\">SoundCloud: {href}</a></p>",
                    href = xml_escape(&track)
                ),
                None => caps[0].to_owned(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingFetcher {
        urls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Fetcher for RecordingFetcher {
        async fn fetch_text(&self, url: &str) -> anyhow::Result<String> {
            self.urls.lock().unwrap().push(url.to_owned());
            Ok(r#"{"items":[{"id":"v0","snippet":{"title":"Zero","thumbnails":{"high":{"url":"https://i.ytimg.com/vi/v0/hq.jpg"}}}}]}"#.to_owned())
        }

        async fn fetch_binary(&self, url: &str) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("unexpected binary fetch: {url}")
        }
    }

    #[tokio::test]
    async fn lookups_are_split_into_batches_of_fifty() {
        let fetcher = Arc::new(RecordingFetcher::default());
        let api = YoutubeApi::new(fetcher.clone(), Some("key".to_owned()));
        let ids: Vec<String> = (0..120).map(|n| format!("v{n}")).collect();

        let found = api.lookup(&ids).await.unwrap();

        let urls = fetcher.urls.lock().unwrap().clone();
        let batch_sizes: Vec<usize> = urls
            .iter()
            .map(|u| {
                let url = url::Url::parse(u).unwrap();
                let (_, list) = url.query_pairs().find(|(k, _)| k == "id").unwrap();
                list.split(',').count()
            })
            .collect();
        assert_eq!(batch_sizes, vec![50, 50, 20]);
        assert_eq!(found.len(), 1);
        assert_eq!(found["v0"].title, "Zero");
    }

    #[tokio::test]
    async fn no_api_key_means_no_requests() {
        let fetcher = Arc::new(RecordingFetcher::default());
        let api = YoutubeApi::new(fetcher.clone(), None);
        assert!(api.lookup(&["a".to_owned()]).await.unwrap().is_empty());
        assert!(fetcher.urls.lock().unwrap().is_empty());
    }

    const EMBED_A: &str = r#"<div class="youtube_container"><iframe width="560" src="https://www.youtube.com/embed/abc123XYZ_-?rel=0" frameborder="0"></iframe></div>"#;
    const EMBED_B: &str = r#"<div class="youtube_container"><iframe src="//www.youtube.com/embed/zzz"></iframe></div>"#;

    #[test]
    fn ids_are_distinct_and_ordered() {
        let html = format!("{EMBED_B}<p>x</p>{EMBED_A}{EMBED_B}");
        assert_eq!(video_ids(&html), vec!["zzz", "abc123XYZ_-"]);
    }

    #[test]
    fn unresolved_ids_keep_their_placeholder() {
        let mut videos = HashMap::new();
        videos.insert(
            "abc123XYZ_-".to_owned(),
            VideoInfo {
                title: "Tom & Jerry".to_owned(),
                thumbnail: "https://i.ytimg.com/vi/abc/hqdefault.jpg".to_owned(),
            },
        );
        let html = format!("{EMBED_A}{EMBED_B}{EMBED_A}");
        let out = replace_video_embeds(&html, &videos);

        assert_eq!(out.matches("<figure class=\"youtube\">").count(), 2);
        assert!(out.contains("Tom &amp; Jerry"));
        assert!(out.contains(EMBED_B));
    }

    #[test]
    fn soundcloud_player_becomes_link() {
        let html = r#"<div class="soundcloud_container"><iframe src="https://w.soundcloud.com/player/?url=https%3A%2F%2Fapi.soundcloud.com%2Ftracks%2F42&amp;auto_play=false"></iframe></div>"#;
        let out = replace_audio_embeds(html);
        assert_eq!(
            out,
            "<p class=\"soundcloud\"><a href=\"https://api.soundcloud.com/tracks/42\">SoundCloud: https://api.soundcloud.com/tracks/42</a></p>"
        );
    }
}
