//! Package document, NCX and container descriptor, plus the full file list of
//! the archive.

use chrono::{DateTime, Utc};

use crate::formats::{Chapter, CoverImage, Story};
use crate::icons::{ICONLESS_CSS, IconFont};
use crate::markup::xml_escape;
use crate::pages::{NOTES_INDEX_HREF, PageEntry, Pages};
use crate::resources::RemoteResources;

/// One file inside the archive, path relative to the archive root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    pub path: String,
    pub data: Vec<u8>,
}

impl ArchiveFile {
    fn new(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
        }
    }
}

pub struct PackageInput<'a> {
    pub story: &'a Story,
    pub chapters: &'a [Chapter],
    pub pages: &'a Pages,
    pub cover: Option<&'a CoverImage>,
    pub resources: &'a RemoteResources,
    pub icon_font: Option<&'a IconFont>,
    pub lang: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    pub href: String,
    pub media_type: String,
    pub properties: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineItem {
    pub idref: String,
    pub linear: bool,
}

/// Stable identifier derived from the story URL.
pub fn book_id(story: &Story) -> uuid::Uuid {
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, story.url.as_bytes())
}

fn entry_id(entry: &PageEntry<'_>) -> String {
    match entry.site {
        Some(site) => site.manifest_id(),
        None => entry.id.to_owned(),
    }
}

pub fn manifest(input: &PackageInput<'_>) -> Vec<ManifestItem> {
    let mut items = vec![ManifestItem {
        id: "ncx".to_owned(),
        href: "toc.ncx".to_owned(),
        media_type: "application/x-dtbncx+xml".to_owned(),
        properties: Vec::new(),
    }];

    let hrefs = input.pages.hrefs();
    for entry in input.pages.entries(&hrefs) {
        let mut properties = Vec::new();
        if entry.id == "nav" {
            properties.push("nav");
        }
        if entry.svg {
            properties.push("svg");
        }
        if entry
            .site
            .is_some_and(|site| input.resources.is_flagged(site))
        {
            properties.push("remote-resources");
        }
        items.push(ManifestItem {
            id: entry_id(&entry),
            href: entry.href.to_owned(),
            media_type: "application/xhtml+xml".to_owned(),
            properties,
        });
    }

    if let Some(cover) = input.cover {
        items.push(ManifestItem {
            id: "cover-image".to_owned(),
            href: cover.href(),
            media_type: cover.media_type.mime.clone(),
            properties: vec!["cover-image"],
        });
    }

    items.push(ManifestItem {
        id: "style".to_owned(),
        href: "Styles/style.css".to_owned(),
        media_type: "text/css".to_owned(),
        properties: Vec::new(),
    });
    items.push(ManifestItem {
        id: "icons-css".to_owned(),
        href: "Styles/icons.css".to_owned(),
        media_type: "text/css".to_owned(),
        properties: Vec::new(),
    });
    if let Some(font) = input.icon_font {
        items.push(ManifestItem {
            id: "icon-font".to_owned(),
            href: font.href(),
            media_type: font.media_type.mime.clone(),
            properties: Vec::new(),
        });
    }

    for resource in input.resources.embedded() {
        let (Some(dest), Some(media_type)) = (&resource.dest, &resource.media_type) else {
            continue;
        };
        items.push(ManifestItem {
            id: format!("res_{}", resource.stem),
            href: dest.clone(),
            media_type: media_type.mime.clone(),
            properties: Vec::new(),
        });
    }
    items
}

/// Reading order with every `linear="no"` item moved to the end.
pub fn spine(pages: &Pages) -> Vec<SpineItem> {
    let hrefs = pages.hrefs();
    let (linear, auxiliary): (Vec<_>, Vec<_>) = pages
        .entries(&hrefs)
        .into_iter()
        .map(|entry| SpineItem {
            idref: entry_id(&entry),
            linear: entry.linear,
        })
        .partition(|item| item.linear);
    linear.into_iter().chain(auxiliary).collect()
}

fn modified_stamp(story: &Story) -> DateTime<Utc> {
    story
        .modified
        .or(story.published)
        .unwrap_or_default()
}

pub fn render_content_opf(input: &PackageInput<'_>) -> String {
    let story = input.story;
    let uuid = book_id(story);

    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str(&format!(
        "<package xmlns=\"http://www.idpf.org/2007/opf\" unique-identifier=\"bookid\" version=\"3.0\" xml:lang=\"{}\">\n",
        xml_escape(input.lang)
    ));
    out.push_str(
        "  <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\" xmlns:opf=\"http://www.idpf.org/2007/opf\">\n",
    );
    out.push_str(&format!(
        "    <dc:identifier id=\"bookid\">urn:uuid:{uuid}</dc:identifier>\n"
    ));
    out.push_str(&format!(
        "    <dc:title>{}</dc:title>\n",
        xml_escape(&story.title)
    ));
    out.push_str(&format!(
        "    <dc:creator id=\"author\">{}</dc:creator>\n",
        xml_escape(&story.author.name)
    ));
    out.push_str(&format!(
        "    <dc:language>{}</dc:language>\n",
        xml_escape(input.lang)
    ));
    out.push_str(&format!(
        "    <dc:source>{}</dc:source>\n",
        xml_escape(&story.url)
    ));
    if let Some(published) = story.published {
        out.push_str(&format!(
            "    <dc:date>{}</dc:date>\n",
            published.format("%Y-%m-%d")
        ));
    }
    if !story.short_description.is_empty() {
        out.push_str(&format!(
            "    <dc:description>{}</dc:description>\n",
            xml_escape(&story.short_description)
        ));
    }
    for tag in &story.tags {
        out.push_str(&format!(
            "    <dc:subject>{}</dc:subject>\n",
            xml_escape(&tag.name)
        ));
    }
    out.push_str(&format!(
        "    <meta property=\"dcterms:modified\">{}</meta>\n",
        modified_stamp(story).format("%Y-%m-%dT%H:%M:%SZ")
    ));
    if input.cover.is_some() {
        out.push_str("    <meta name=\"cover\" content=\"cover-image\" />\n");
    }
    out.push_str("  </metadata>\n");

    out.push_str("  <manifest>\n");
    for item in manifest(input) {
        let properties = if item.properties.is_empty() {
            String::new()
        } else {
            format!(" properties=\"{}\"", item.properties.join(" "))
        };
        out.push_str(&format!(
            "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"{properties} />\n",
            xml_escape(&item.id),
            xml_escape(&item.href),
            xml_escape(&item.media_type)
        ));
    }
    out.push_str("  </manifest>\n");

    out.push_str("  <spine toc=\"ncx\">\n");
    for item in spine(input.pages) {
        let linear = if item.linear { "" } else { " linear=\"no\"" };
        out.push_str(&format!(
            "    <itemref idref=\"{}\"{linear} />\n",
            xml_escape(&item.idref)
        ));
    }
    out.push_str("  </spine>\n");

    out.push_str("  <guide>\n");
    let hrefs = input.pages.hrefs();
    if input.pages.cover.is_some() {
        out.push_str(&format!(
            "    <reference type=\"cover\" title=\"Cover\" href=\"{}\" />\n",
            crate::pages::COVER_PAGE_HREF
        ));
    }
    out.push_str(&format!(
        "    <reference type=\"title-page\" title=\"Title Page\" href=\"{}\" />\n",
        xml_escape(&hrefs.title)
    ));
    if let Some(first) = hrefs.chapters.first() {
        out.push_str(&format!(
            "    <reference type=\"text\" title=\"Start\" href=\"{}\" />\n",
            xml_escape(first)
        ));
    }
    out.push_str("  </guide>\n");
    out.push_str("</package>\n");
    out
}

pub fn render_toc_ncx(input: &PackageInput<'_>) -> String {
    let story = input.story;
    let hrefs = input.pages.hrefs();
    let mut points = vec![("Title Page", hrefs.title.as_str())];
    for (chapter, href) in input.chapters.iter().zip(&hrefs.chapters) {
        points.push((chapter.title.as_str(), href.as_str()));
    }
    if input.pages.notesnav.is_some() {
        points.push(("Author's notes", NOTES_INDEX_HREF));
    }

    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str(
        "<!DOCTYPE ncx PUBLIC \"-//NISO//DTD ncx 2005-1//EN\" \"http://www.daisy.org/z3986/2005/ncx-2005-1.dtd\">\n",
    );
    out.push_str("<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\" version=\"2005-1\">\n");
    out.push_str("  <head>\n");
    out.push_str(&format!(
        "    <meta name=\"dtb:uid\" content=\"urn:uuid:{}\" />\n",
        book_id(story)
    ));
    out.push_str("    <meta name=\"dtb:depth\" content=\"1\" />\n");
    out.push_str("    <meta name=\"dtb:totalPageCount\" content=\"0\" />\n");
    out.push_str("    <meta name=\"dtb:maxPageNumber\" content=\"0\" />\n");
    out.push_str("  </head>\n");
    out.push_str("  <docTitle><text>");
    out.push_str(&xml_escape(&story.title));
    out.push_str("</text></docTitle>\n");
    out.push_str("  <docAuthor><text>");
    out.push_str(&xml_escape(&story.author.name));
    out.push_str("</text></docAuthor>\n");
    out.push_str("  <navMap>\n");
    for (idx, (label, href)) in points.iter().enumerate() {
        let play = idx + 1;
        out.push_str(&format!(
            "    <navPoint id=\"navPoint-{play}\" playOrder=\"{play}\">\n"
        ));
        out.push_str("      <navLabel><text>");
        out.push_str(&xml_escape(label));
        out.push_str("</text></navLabel>\n");
        out.push_str(&format!(
            "      <content src=\"{}\" />\n",
            xml_escape(href)
        ));
        out.push_str("    </navPoint>\n");
    }
    out.push_str("  </navMap>\n");
    out.push_str("</ncx>\n");
    out
}

pub fn render_container_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#
    .to_string()
}

pub fn default_style_css() -> String {
    r#"@charset "utf-8";

html { font-family: serif; }
body { margin: 0; padding: 0 1.2em; line-height: 1.6; }
img { max-width: 100%; height: auto; }
h1.title, h1.chapter-title { text-align: center; }
p.author, p.story-info, p.tags, p.source { text-align: center; }
a.tag { white-space: nowrap; margin: 0 0.25em; }
div.cover { margin: 0; padding: 0; text-align: center; height: 100%; }
div.description { margin: 1.5em 0; }
div.authors-note { margin: 1.5em 0; padding: 0.5em 1em; border: 1px solid #ccc; border-radius: 6px; }
div.chapter-progress { text-align: center; }
div.chapter-progress ol { list-style: none; padding: 0; margin: 0; white-space: nowrap; overflow: hidden; }
div.chapter-progress li { display: inline-block; margin: 0; box-sizing: border-box; border-right: 1px solid #fff; background: #ddd; overflow: hidden; font-size: 0.7em; }
div.chapter-progress li.read { background: #bbb; }
div.chapter-progress li.current { background: #888; font-weight: bold; }
div.chapter-progress li a { color: inherit; text-decoration: none; }
p.reading-time { text-align: center; font-size: 0.9em; color: #555; }
blockquote { margin: 1em 0; padding: 0 1em; border-left: 4px solid #ddd; color: #333; }
blockquote.left_insert { float: left; width: 40%; margin: 0 1em 1em 0; border: 1px solid #ddd; }
blockquote.right_insert { float: right; width: 40%; margin: 0 0 1em 1em; border: 1px solid #ddd; }
span.smallcaps { font-variant: small-caps; }
img.emoticon { height: 1.2em; width: auto; vertical-align: middle; }
figure.youtube { margin: 1em 0; text-align: center; }
p.soundcloud { text-align: center; }
"#
    .to_string()
}

/// Every file of the book except `mimetype`, which the archiver writes first.
pub fn build_files(input: &PackageInput<'_>) -> Vec<ArchiveFile> {
    let mut files = vec![
        ArchiveFile::new("META-INF/container.xml", render_container_xml()),
        ArchiveFile::new("OEBPS/content.opf", render_content_opf(input)),
        ArchiveFile::new("OEBPS/toc.ncx", render_toc_ncx(input)),
    ];

    let hrefs = input.pages.hrefs();
    for entry in input.pages.entries(&hrefs) {
        files.push(ArchiveFile::new(
            format!("OEBPS/{}", entry.href),
            entry.content,
        ));
    }

    files.push(ArchiveFile::new("OEBPS/Styles/style.css", default_style_css()));
    let icons_css = match input.icon_font {
        Some(font) => font.css.clone(),
        None => ICONLESS_CSS.to_owned(),
    };
    files.push(ArchiveFile::new("OEBPS/Styles/icons.css", icons_css));
    if let Some(font) = input.icon_font {
        files.push(ArchiveFile::new(
            format!("OEBPS/{}", font.href()),
            font.data.clone(),
        ));
    }

    if let Some(cover) = input.cover {
        files.push(ArchiveFile::new(
            format!("OEBPS/{}", cover.href()),
            cover.data.clone(),
        ));
    }

    for resource in input.resources.embedded() {
        if let (Some(dest), Some(data)) = (&resource.dest, &resource.data) {
            files.push(ArchiveFile::new(format!("OEBPS/{dest}"), data.clone()));
        }
    }
    files
}
