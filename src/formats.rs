use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub id: u64,
    pub title: String,
    pub url: String,
    pub author: Author,
    pub status: String,
    pub content_rating: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    pub words: u64,
    pub tags: Vec<Tag>,
    /// Description as an HTML fragment.
    pub description: String,
    pub short_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prequel: Option<Prequel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    pub chapters: Vec<ChapterInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    /// Site tag category, e.g. `character`, `genre`, `series`.
    pub kind: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prequel {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterInfo {
    pub id: u64,
    pub title: String,
    pub link: String,
    pub word_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

/// One chapter body. `content` and `notes` are HTML fragments; raw after fetch,
/// sanitized after the chapter build stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub title: String,
    pub link: String,
    pub content: String,
    pub notes: String,
    pub notes_first: bool,
    pub word_count: u64,
}

impl Chapter {
    pub fn has_notes(&self) -> bool {
        !self.notes.trim().is_empty()
    }
}

/// Where in the book a remote resource URL was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReferenceSite {
    TitlePage,
    Chapter(usize),
    ChapterNotes(usize),
}

impl ReferenceSite {
    /// Manifest id of the document holding this site.
    pub fn manifest_id(self) -> String {
        match self {
            ReferenceSite::TitlePage => "titlepage".to_owned(),
            ReferenceSite::Chapter(idx) => format!("chapter_{}", idx + 1),
            ReferenceSite::ChapterNotes(idx) => format!("chapter_{}_notes", idx + 1),
        }
    }

    /// File name of the document under `Text/`.
    pub fn file_name(self) -> String {
        match self {
            ReferenceSite::TitlePage => "title.xhtml".to_owned(),
            other => format!("{}.xhtml", other.manifest_id()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    pub mime: String,
    pub extension: String,
}

impl MediaType {
    pub fn new(mime: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            mime: mime.into(),
            extension: extension.into(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }
}

/// An externally hosted file referenced from the book, keyed by canonical URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResource {
    pub url: String,
    pub stem: String,
    pub sites: Vec<ReferenceSite>,
    /// Every spelling of the URL as it appeared in markup (entity-encoded or not).
    pub aliases: Vec<String>,
    pub data: Option<Vec<u8>>,
    pub media_type: Option<MediaType>,
    /// Path relative to `OEBPS/`, e.g. `Images/ext_1.png`.
    pub dest: Option<String>,
}

impl RemoteResource {
    pub fn new(url: impl Into<String>, stem: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stem: stem.into(),
            sites: Vec::new(),
            aliases: Vec::new(),
            data: None,
            media_type: None,
            dest: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    pub data: Vec<u8>,
    pub media_type: MediaType,
    pub dimensions: Option<(u32, u32)>,
}

impl CoverImage {
    /// Path relative to `OEBPS/`.
    pub fn href(&self) -> String {
        format!("Images/cover.{}", self.media_type.extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_sites_map_to_stable_documents() {
        assert_eq!(ReferenceSite::TitlePage.file_name(), "title.xhtml");
        assert_eq!(ReferenceSite::Chapter(0).manifest_id(), "chapter_1");
        assert_eq!(
            ReferenceSite::ChapterNotes(2).file_name(),
            "chapter_3_notes.xhtml"
        );
    }
}
