//! Turns scraped chapter and author's-note HTML into fragments that embed
//! cleanly in XHTML documents. The steps run in a fixed order; later steps
//! rely on the earlier ones having normalized the text.

use std::sync::{Arc, LazyLock};

use quick_xml::escape::resolve_html5_entity;
use regex::{Captures, Regex};
use unicode_normalization::UnicodeNormalization as _;
use url::Url;

use crate::embeds::{self, VideoMetadataSource};

pub const EMOTICON_BASE: &str = "https://static.fimfiction.net/images/emoticons/";

/// Shortcodes the site renders as emoticon images.
const EMOTICONS: &[&str] = &[
    "ajbemused",
    "ajsleepy",
    "ajsmug",
    "applejackconfused",
    "applejackunsure",
    "coolphoto",
    "derpyderp1",
    "derpyderp2",
    "derpytongue2",
    "facehoof",
    "fluttercry",
    "flutterrage",
    "fluttershbad",
    "fluttershyouch",
    "fluttershysad",
    "heart",
    "pinkiecrazy",
    "pinkiegasp",
    "pinkiehappy",
    "pinkiesad2",
    "pinkiesick",
    "pinkiesmile",
    "rainbowderp",
    "rainbowdetermined2",
    "rainbowhuh",
    "rainbowkiss",
    "rainbowlaugh",
    "rainbowwild",
    "raritycry",
    "raritydespair",
    "raritystarry",
    "raritywink",
    "scootangel",
    "twilightangry2",
    "twilightblush",
    "twilightoops",
    "twilightsheepish",
    "twilightsmile",
    "unsuresweetie",
    "yay",
    "trixieshiftleft",
    "trixieshiftright",
    "moustache",
];

static EMOTICON_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":([a-z0-9]+):").expect("static regex"));
static MARKUP_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(?:[^>"']|"[^"]*"|'[^']*')*>"#).expect("static regex")
});
static NAMED_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&([a-zA-Z][a-zA-Z0-9]*);").expect("static regex"));
static CONTROL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("static regex"));
static UNDERLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<u>(.*?)</u>").expect("static regex"));
static STRIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(s|strike)>(.*?)</(?:s|strike)>").expect("static regex")
});
static SMALL_CAPS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<span style="font-variant-caps:\s*small-caps;?">"#).expect("static regex")
});
static PARAGRAPH_OPEN_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(<p(?:\s[^>]*)?>)\s+").expect("static regex"));
static PARAGRAPH_CLOSE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+</p>").expect("static regex"));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));
static INLINE_OPEN_SPACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(<(?:a|b|i|em|strong|span|sup|sub|small|big)(?:\s[^>]*)?>) ")
        .expect("static regex")
});
static INLINE_CLOSE_SPACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r" (</(?:a|b|i|em|strong|span|sup|sub|small|big)>)").expect("static regex")
});
static FLOATED_BLOCKQUOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<blockquote style="[^"]*float:\s*(left|right)[^"]*">"#).expect("static regex")
});
static IMG_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<img\b[^>]*>").expect("static regex"));
static HAS_ALT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\salt\s*=").expect("static regex"));
static ROOT_RELATIVE_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href="(/[^"]*)""#).expect("static regex"));

pub struct Normalizer {
    base_url: Url,
    videos: Arc<dyn VideoMetadataSource>,
}

impl Normalizer {
    pub fn new(base_url: Url, videos: Arc<dyn VideoMetadataSource>) -> Self {
        Self { base_url, videos }
    }

    pub async fn normalize(&self, html: &str) -> String {
        let mut out: String = html.nfc().collect();
        out = replace_emoticons(&out);
        out = normalize_entities(&out);
        out = rewrite_deprecated_tags(&out);
        out = normalize_whitespace(&out);
        out = normalize_blockquotes(&out);
        out = ensure_img_alt(&out);
        out = absolutize_links(&out, &self.base_url);
        out = self.resolve_video_embeds(out).await;
        embeds::replace_audio_embeds(&out)
    }

    async fn resolve_video_embeds(&self, html: String) -> String {
        let ids = embeds::video_ids(&html);
        if ids.is_empty() {
            return html;
        }

        match self.videos.lookup(&ids).await {
            Ok(videos) => {
                for id in ids.iter().filter(|id| !videos.contains_key(*id)) {
                    tracing::debug!(video = %id, "no metadata for video; keeping embed");
                }
                embeds::replace_video_embeds(&html, &videos)
            }
            Err(err) => {
                tracing::warn!(?err, videos = ids.len(), "video metadata lookup failed");
                html
            }
        }
    }
}

/// Replaces `:code:` shortcodes in text; tags and their attributes are left alone.
pub fn replace_emoticons(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;
    for tag in MARKUP_TAG.find_iter(html) {
        out.push_str(&emoticons_in_text(&html[cursor..tag.start()]));
        out.push_str(tag.as_str());
        cursor = tag.end();
    }
    out.push_str(&emoticons_in_text(&html[cursor..]));
    out
}

fn emoticons_in_text(text: &str) -> std::borrow::Cow<'_, str> {
    EMOTICON_CODE.replace_all(text, |caps: &Captures<'_>| {
        let name = &caps[1];
        if EMOTICONS.contains(&name) {
            format!("<img class=\"emoticon\" src=\"{EMOTICON_BASE}{name}.png\" alt=\":{name}:\" />")
        } else {
            caps[0].to_owned()
        }
    })
}

/// Named references become numeric ones so the fragment stays valid XML.
/// Names outside the HTML5 table are escaped as text.
pub fn normalize_entities(html: &str) -> String {
    let stripped = CONTROL_CHARS.replace_all(html, "");
    let stripped = stripped.replace('\u{a0}', "&#160;");
    NAMED_ENTITY
        .replace_all(&stripped, |caps: &Captures<'_>| {
            let name = &caps[1];
            if matches!(name, "amp" | "lt" | "gt" | "quot" | "apos") {
                return caps[0].to_owned();
            }
            match resolve_html5_entity(name) {
                Some(chars) => chars.chars().map(|c| format!("&#{};", u32::from(c))).collect(),
                None => format!("&amp;{name};"),
            }
        })
        .into_owned()
}

pub fn rewrite_deprecated_tags(html: &str) -> String {
    let out = UNDERLINE.replace_all(
        html,
        "<span style=\"text-decoration: underline\">$1</span>",
    );
    let out = STRIKE.replace_all(
        &out,
        "<span style=\"text-decoration: line-through\">$2</span>",
    );
    SMALL_CAPS
        .replace_all(&out, "<span class=\"smallcaps\">")
        .into_owned()
}

pub fn normalize_whitespace(html: &str) -> String {
    let out = WHITESPACE_RUN.replace_all(html, " ");
    let out = PARAGRAPH_OPEN_SPACE.replace_all(&out, "$1");
    let out = PARAGRAPH_CLOSE_SPACE.replace_all(&out, "</p>");
    let out = INLINE_OPEN_SPACE.replace_all(&out, " $1");
    let out = INLINE_CLOSE_SPACE.replace_all(&out, "$1 ");
    let out = WHITESPACE_RUN.replace_all(&out, " ");
    // Spacing pushed out of an inline tag can land right inside a paragraph again.
    let out = PARAGRAPH_OPEN_SPACE.replace_all(&out, "$1");
    PARAGRAPH_CLOSE_SPACE
        .replace_all(&out, "</p>")
        .trim()
        .to_owned()
}

pub fn normalize_blockquotes(html: &str) -> String {
    FLOATED_BLOCKQUOTE
        .replace_all(html, "<blockquote class=\"${1}_insert\">")
        .into_owned()
}

pub fn ensure_img_alt(html: &str) -> String {
    IMG_TAG
        .replace_all(html, |caps: &Captures<'_>| {
            let tag = &caps[0];
            if HAS_ALT.is_match(tag) {
                tag.to_owned()
            } else {
                format!("<img alt=\"\"{}", &tag[4..])
            }
        })
        .into_owned()
}

pub fn absolutize_links(html: &str, base: &Url) -> String {
    ROOT_RELATIVE_HREF
        .replace_all(html, |caps: &Captures<'_>| {
            let path = &caps[1];
            if path.starts_with("//") {
                return caps[0].to_owned();
            }
            match base.join(path) {
                Ok(url) => format!("href=\"{url}\""),
                Err(_) => caps[0].to_owned(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::embeds::VideoInfo;

    #[derive(Default)]
    struct RecordingVideos {
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl VideoMetadataSource for RecordingVideos {
        async fn lookup(&self, ids: &[String]) -> anyhow::Result<HashMap<String, VideoInfo>> {
            self.calls.lock().unwrap().push(ids.to_vec());
            Ok(ids
                .iter()
                .filter(|id| id.as_str() != "missing")
                .map(|id| {
                    (
                        id.clone(),
                        VideoInfo {
                            title: format!("Video {id}"),
                            thumbnail: format!("https://i.ytimg.com/vi/{id}/hqdefault.jpg"),
                        },
                    )
                })
                .collect())
        }
    }

    struct UnreachableVideos;

    #[async_trait]
    impl VideoMetadataSource for UnreachableVideos {
        async fn lookup(&self, _ids: &[String]) -> anyhow::Result<HashMap<String, VideoInfo>> {
            anyhow::bail!("quota exceeded")
        }
    }

    fn normalizer(videos: Arc<RecordingVideos>) -> Normalizer {
        Normalizer::new(Url::parse("https://www.fimfiction.net").unwrap(), videos)
    }

    #[test]
    fn emoticons_become_images_and_unknown_codes_stay() {
        let out = replace_emoticons("hi :twilightsmile: and :notathing:");
        assert_eq!(
            out,
            "hi <img class=\"emoticon\" src=\"https://static.fimfiction.net/images/emoticons/twilightsmile.png\" alt=\":twilightsmile:\" /> and :notathing:"
        );
    }

    #[test]
    fn emoticon_codes_inside_attributes_are_left_alone() {
        let html = "<img class=\"emoticon\" src=\"https://static.fimfiction.net/images/emoticons/heart.png\" alt=\":heart:\" /> :yay:";
        let out = replace_emoticons(html);
        assert_eq!(out.matches("<img").count(), 2);
        assert!(out.starts_with(html.trim_end_matches(" :yay:")));
        assert!(out.ends_with("yay.png\" alt=\":yay:\" />"));
        assert_eq!(replace_emoticons("<a title=':heart:'>x</a>"), "<a title=':heart:'>x</a>");
    }

    #[test]
    fn any_html5_named_entity_becomes_numeric() {
        assert_eq!(
            normalize_entities("&spades; &Aring; &thinsp; &oelig;"),
            "&#9824; &#197; &#8201; &#339;"
        );
    }

    #[test]
    fn entities_become_numeric_and_controls_vanish() {
        let out = normalize_entities("a\u{a0}b&mdash;c &amp; &bogus; \u{1}d");
        assert_eq!(out, "a&#160;b&#8212;c &amp; &amp;bogus; d");
    }

    #[test]
    fn deprecated_tags_become_spans() {
        let out = rewrite_deprecated_tags(
            "<u>under</u> <s>gone</s> <strike>old</strike> <span style=\"font-variant-caps:small-caps\">Caps</span>",
        );
        assert_eq!(
            out,
            "<span style=\"text-decoration: underline\">under</span> <span style=\"text-decoration: line-through\">gone</span> <span style=\"text-decoration: line-through\">old</span> <span class=\"smallcaps\">Caps</span>"
        );
    }

    #[test]
    fn whitespace_is_trimmed_and_pushed_outside_inline_tags() {
        let out = normalize_whitespace("<p>\n   Hello<i> there </i>\n\n friend.  </p>\n<p class=\"x\"> <b> Bold</b></p>");
        assert_eq!(
            out,
            "<p>Hello <i>there</i> friend.</p> <p class=\"x\"><b>Bold</b></p>"
        );
    }

    #[test]
    fn floated_blockquotes_get_classes() {
        let out = normalize_blockquotes(
            "<blockquote style=\"margin: 10px; float:left; width: 40%\">a</blockquote><blockquote style=\"float: right\">b</blockquote>",
        );
        assert_eq!(
            out,
            "<blockquote class=\"left_insert\">a</blockquote><blockquote class=\"right_insert\">b</blockquote>"
        );
    }

    #[test]
    fn images_gain_alt() {
        let out = ensure_img_alt("<img src=\"a.png\"><img alt=\"x\" src=\"b.png\">");
        assert_eq!(out, "<img alt=\"\" src=\"a.png\"><img alt=\"x\" src=\"b.png\">");
    }

    #[test]
    fn root_relative_links_become_absolute() {
        let base = Url::parse("https://www.fimfiction.net").unwrap();
        let out = absolutize_links(
            "<a href=\"/story/1/x\">s</a><a href=\"//cdn.example/y\">c</a><a href=\"https://e.x/\">e</a>",
            &base,
        );
        assert_eq!(
            out,
            "<a href=\"https://www.fimfiction.net/story/1/x\">s</a><a href=\"//cdn.example/y\">c</a><a href=\"https://e.x/\">e</a>"
        );
    }

    #[tokio::test]
    async fn video_lookup_is_batched_once_per_fragment() {
        let videos = Arc::new(RecordingVideos::default());
        let embed = |id: &str| {
            format!(
                "<div class=\"youtube_container\"><iframe src=\"https://www.youtube.com/embed/{id}\"></iframe></div>"
            )
        };
        let html = format!(
            "<p>a</p>{}{}{}{}",
            embed("one"),
            embed("missing"),
            embed("one"),
            embed("two")
        );

        let out = normalizer(videos.clone()).normalize(&html).await;

        let calls = videos.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![vec!["one", "missing", "two"]]);
        assert_eq!(out.matches("Video one").count(), 4);
        assert!(out.contains("embed/missing"));
        assert!(out.contains("Video two"));
    }

    #[tokio::test]
    async fn failed_video_lookup_keeps_every_embed() {
        let embed = "<div class=\"youtube_container\"><iframe src=\"https://www.youtube.com/embed/abc\"></iframe></div>";
        let normalizer = Normalizer::new(
            Url::parse("https://www.fimfiction.net").unwrap(),
            Arc::new(UnreachableVideos),
        );

        let out = normalizer.normalize(&format!("<p>a</p>{embed}")).await;

        assert_eq!(out, format!("<p>a</p>{embed}"));
        assert!(!out.contains("<figure"));
    }

    #[tokio::test]
    async fn fragments_without_embeds_skip_the_lookup() {
        let videos = Arc::new(RecordingVideos::default());
        let out = normalizer(videos.clone())
            .normalize("<p> Caf\u{65}\u{301} </p>")
            .await;
        assert_eq!(out, "<p>Caf\u{e9}</p>");
        assert!(videos.calls.lock().unwrap().is_empty());
    }
}
