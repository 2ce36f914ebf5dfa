//! XHTML documents of the book: cover, title page, chapters, author's notes,
//! navigation and the notes index.

use std::ops::Range;

use crate::formats::{Chapter, CoverImage, ReferenceSite, Story};
use crate::markup::xml_escape;
use crate::options::ConvertOptions;
use crate::readability::ReadingEase;

pub const NAV_HREF: &str = "nav.xhtml";
pub const COVER_PAGE_HREF: &str = "Text/cover.xhtml";
pub const NOTES_INDEX_HREF: &str = "Text/notesnav.xhtml";

/// Inputs for one render of every page.
pub struct PageContext<'a> {
    pub story: &'a Story,
    /// Sanitized description fragment.
    pub description: &'a str,
    pub chapters: &'a [Chapter],
    pub cover: Option<&'a CoverImage>,
    pub readability: Option<&'a ReadingEase>,
    pub options: &'a ConvertOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pages {
    pub cover: Option<String>,
    /// The cover page wraps the image in SVG (needs the `svg` manifest property).
    pub cover_svg: bool,
    pub title: String,
    pub nav: String,
    pub notesnav: Option<String>,
    pub chapters: Vec<String>,
    /// Separate author's-note documents, by chapter index.
    pub notes: Vec<Option<String>>,
}

/// One document as the package sees it, in reading order.
#[derive(Debug, Clone, Copy)]
pub struct PageEntry<'a> {
    pub id: &'static str,
    pub index: Option<usize>,
    pub href: &'a str,
    pub content: &'a str,
    pub linear: bool,
    pub svg: bool,
    pub site: Option<ReferenceSite>,
}

impl Pages {
    pub fn render(ctx: &PageContext<'_>) -> Self {
        let lang = ctx.options.lang.as_str();
        let (cover, cover_svg) = match ctx.cover {
            Some(cover) => {
                let (doc, svg) = render_cover_page(&ctx.story.title, lang, cover);
                (Some(doc), svg)
            }
            None => (None, false),
        };

        let notes: Vec<Option<String>> = ctx
            .chapters
            .iter()
            .enumerate()
            .map(|(idx, chapter)| {
                (ctx.options.separate_notes && chapter.has_notes())
                    .then(|| render_notes_page(lang, idx, chapter))
            })
            .collect();

        let chapters = ctx
            .chapters
            .iter()
            .enumerate()
            .map(|(idx, _)| render_chapter_page(ctx, idx))
            .collect();

        let notesnav = notes
            .iter()
            .any(Option::is_some)
            .then(|| render_notes_index(lang, ctx.chapters, &notes));

        Self {
            cover,
            cover_svg,
            title: render_title_page(ctx),
            nav: render_nav(&ctx.story.title, lang, ctx.chapters, &notes, ctx.cover.is_some()),
            notesnav,
            chapters,
            notes,
        }
    }

    /// Documents that can reference remote resources.
    pub fn reference_documents(&self) -> Vec<(ReferenceSite, &str)> {
        let mut docs = vec![(ReferenceSite::TitlePage, self.title.as_str())];
        for (idx, doc) in self.chapters.iter().enumerate() {
            docs.push((ReferenceSite::Chapter(idx), doc.as_str()));
            if let Some(Some(notes)) = self.notes.get(idx) {
                docs.push((ReferenceSite::ChapterNotes(idx), notes.as_str()));
            }
        }
        docs
    }

    pub fn document_mut(&mut self, site: ReferenceSite) -> Option<&mut String> {
        match site {
            ReferenceSite::TitlePage => Some(&mut self.title),
            ReferenceSite::Chapter(idx) => self.chapters.get_mut(idx),
            ReferenceSite::ChapterNotes(idx) => self.notes.get_mut(idx)?.as_mut(),
        }
    }

    /// Every rendered document, for scans that look at the whole book.
    pub fn documents(&self) -> impl Iterator<Item = &str> {
        self.cover
            .iter()
            .chain(std::iter::once(&self.title))
            .chain(self.chapters.iter())
            .chain(self.notes.iter().flatten())
            .chain(std::iter::once(&self.nav))
            .chain(self.notesnav.iter())
            .map(String::as_str)
    }

    /// Package entries in reading order; `hrefs` are computed by [`Pages::hrefs`].
    pub fn entries<'a>(&'a self, hrefs: &'a PageHrefs) -> Vec<PageEntry<'a>> {
        let mut out = Vec::new();
        if let Some(cover) = &self.cover {
            out.push(PageEntry {
                id: "cover",
                index: None,
                href: COVER_PAGE_HREF,
                content: cover,
                linear: true,
                svg: self.cover_svg,
                site: None,
            });
        }
        out.push(PageEntry {
            id: "titlepage",
            index: None,
            href: &hrefs.title,
            content: &self.title,
            linear: true,
            svg: false,
            site: Some(ReferenceSite::TitlePage),
        });
        for (idx, chapter) in self.chapters.iter().enumerate() {
            out.push(PageEntry {
                id: "chapter",
                index: Some(idx),
                href: &hrefs.chapters[idx],
                content: chapter,
                linear: true,
                svg: false,
                site: Some(ReferenceSite::Chapter(idx)),
            });
            if let Some(Some(notes)) = self.notes.get(idx) {
                out.push(PageEntry {
                    id: "chapter_notes",
                    index: Some(idx),
                    href: &hrefs.notes[idx],
                    content: notes,
                    linear: false,
                    svg: false,
                    site: Some(ReferenceSite::ChapterNotes(idx)),
                });
            }
        }
        out.push(PageEntry {
            id: "nav",
            index: None,
            href: NAV_HREF,
            content: &self.nav,
            linear: true,
            svg: false,
            site: None,
        });
        if let Some(notesnav) = &self.notesnav {
            out.push(PageEntry {
                id: "notesnav",
                index: None,
                href: NOTES_INDEX_HREF,
                content: notesnav,
                linear: false,
                svg: false,
                site: None,
            });
        }
        out
    }

    pub fn hrefs(&self) -> PageHrefs {
        PageHrefs {
            title: format!("Text/{}", ReferenceSite::TitlePage.file_name()),
            chapters: (0..self.chapters.len())
                .map(|idx| format!("Text/{}", ReferenceSite::Chapter(idx).file_name()))
                .collect(),
            notes: (0..self.notes.len())
                .map(|idx| format!("Text/{}", ReferenceSite::ChapterNotes(idx).file_name()))
                .collect(),
        }
    }
}

/// Archive paths (relative to `OEBPS/`) of the per-site documents.
#[derive(Debug, Clone)]
pub struct PageHrefs {
    pub title: String,
    pub chapters: Vec<String>,
    pub notes: Vec<String>,
}

/// Minutes to read `words` at `wpm`, rounded up; never zero.
pub fn reading_minutes(words: u64, wpm: u64) -> u64 {
    words.div_ceil(wpm.max(1)).max(1)
}

/// Chapters shown around `current` in the progress bar. When there are more
/// chapters than `window`, the window is centered on `current` and clamped.
pub fn progress_window(total: usize, current: usize, window: usize) -> Range<usize> {
    let window = window.max(1);
    if total <= window {
        return 0..total;
    }
    let start = current.saturating_sub(window / 2).min(total - window);
    start..start + window
}

fn status_icon(status: &str) -> &'static str {
    match status.to_ascii_lowercase().as_str() {
        "complete" => "check",
        "on hiatus" | "hiatus" => "pause",
        "cancelled" | "canceled" => "times",
        _ => "pencil",
    }
}

fn render_cover_page(title: &str, lang: &str, cover: &CoverImage) -> (String, bool) {
    let src = format!("../{}", cover.href());
    let (body, svg) = match cover.dimensions {
        Some((width, height)) => (
            format!(
                "<div class=\"cover\">\n<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" version=\"1.1\" width=\"100%\" height=\"100%\" viewBox=\"0 0 {width} {height}\" preserveAspectRatio=\"xMidYMid meet\"><image width=\"{width}\" height=\"{height}\" xlink:href=\"{src}\" /></svg>\n</div>\n",
                src = xml_escape(&src)
            ),
            true,
        ),
        None => (
            format!(
                "<div class=\"cover\"><img src=\"{}\" alt=\"Cover\" /></div>\n",
                xml_escape(&src)
            ),
            false,
        ),
    };
    (wrap_xhtml_document(title, lang, &body, "../"), svg)
}

fn render_title_page(ctx: &PageContext<'_>) -> String {
    let story = ctx.story;
    let mut body = String::new();
    body.push_str("<div class=\"title-page\">\n");
    body.push_str(&format!(
        "<h1 class=\"title\">{}</h1>\n",
        xml_escape(&story.title)
    ));
    body.push_str(&format!(
        "<p class=\"author\">by <a href=\"{}\">{}</a></p>\n",
        xml_escape(&story.author.url),
        xml_escape(&story.author.name)
    ));

    body.push_str("<p class=\"story-info\">");
    let mut info = Vec::new();
    if !story.status.is_empty() {
        info.push(format!(
            "<i class=\"fa fa-fw fa-{}\"></i> {}",
            status_icon(&story.status),
            xml_escape(&story.status)
        ));
    }
    if !story.content_rating.is_empty() {
        info.push(format!(
            "<span class=\"rating\">{}</span>",
            xml_escape(&story.content_rating)
        ));
    }
    info.push(format!(
        "<i class=\"fa fa-fw fa-book\"></i> {} words",
        story.words
    ));
    if let Some(published) = story.published {
        info.push(format!(
            "<i class=\"fa fa-fw fa-calendar\"></i> {}",
            published.format("%B %-d, %Y")
        ));
    }
    body.push_str(&info.join(" &#183; "));
    body.push_str("</p>\n");

    if !story.tags.is_empty() {
        body.push_str("<p class=\"tags\">");
        let tags: Vec<String> = story
            .tags
            .iter()
            .map(|tag| {
                format!(
                    "<a class=\"tag tag-{}\" href=\"{}\"><i class=\"fa fa-tag\"></i> {}</a>",
                    xml_escape(&tag.kind),
                    xml_escape(&tag.url),
                    xml_escape(&tag.name)
                )
            })
            .collect();
        body.push_str(&tags.join(" "));
        body.push_str("</p>\n");
    }

    if !ctx.description.trim().is_empty() {
        body.push_str("<div class=\"description\">\n");
        body.push_str(ctx.description);
        body.push_str("\n</div>\n");
    }

    if let Some(prequel) = &story.prequel {
        body.push_str(&format!(
            "<p class=\"prequel\">Sequel to <a href=\"{}\">{}</a></p>\n",
            xml_escape(&prequel.url),
            xml_escape(&prequel.title)
        ));
    }

    if ctx.options.reading_ease
        && let Some(ease) = ctx.readability
    {
        body.push_str(&render_readability(ease));
    }

    body.push_str(&format!(
        "<p class=\"source\"><i class=\"fa fa-fw fa-link\"></i> <a href=\"{url}\">{url}</a></p>\n",
        url = xml_escape(&story.url)
    ));
    body.push_str("</div>\n");

    wrap_xhtml_document(&story.title, &ctx.options.lang, &body, "../")
}

fn render_readability(ease: &ReadingEase) -> String {
    let mut out = String::new();
    out.push_str("<div class=\"readability\">\n");
    out.push_str("<h2>Readability</h2>\n");
    out.push_str(&format!(
        "<p>Flesch reading ease: {:.1} ({})</p>\n",
        ease.ease,
        ease.difficulty()
    ));
    out.push_str(&format!("<p>Grade level: {:.1}</p>\n", ease.grade));
    out.push_str(&format!(
        "<p>{} sentences, {} words, {} syllables</p>\n",
        ease.sentence_count, ease.word_count, ease.syllable_count
    ));
    out.push_str("</div>\n");
    out
}

fn render_chapter_page(ctx: &PageContext<'_>, idx: usize) -> String {
    let chapter = &ctx.chapters[idx];
    let options = ctx.options;
    let inline_notes = chapter.has_notes() && !options.separate_notes;

    let mut body = String::new();
    body.push_str(&format!(
        "<h1 class=\"chapter-title\">{}</h1>\n",
        xml_escape(&chapter.title)
    ));

    if options.reading_time {
        let minutes = reading_minutes(chapter.word_count, options.words_per_minute);
        let unit = if minutes == 1 { "minute" } else { "minutes" };
        body.push_str(&format!(
            "<p class=\"reading-time\"><i class=\"fa fa-fw fa-clock-o\"></i> {} words, about {minutes} {unit}</p>\n",
            chapter.word_count
        ));
    }

    if options.chapter_progress && ctx.chapters.len() > 1 {
        body.push_str(&render_progress(ctx.chapters, idx, options.progress_window));
    }

    if inline_notes && chapter.notes_first {
        body.push_str(&render_inline_notes(chapter));
    }

    body.push_str("<div class=\"chapter-content\">\n");
    body.push_str(&chapter.content);
    body.push_str("\n</div>\n");

    if inline_notes && !chapter.notes_first {
        body.push_str(&render_inline_notes(chapter));
    }
    if chapter.has_notes() && options.separate_notes {
        body.push_str(&format!(
            "<p class=\"notes-link\"><a href=\"{}\">Author's note</a></p>\n",
            ReferenceSite::ChapterNotes(idx).file_name()
        ));
    }

    wrap_xhtml_document(&chapter.title, &options.lang, &body, "../")
}

fn render_inline_notes(chapter: &Chapter) -> String {
    format!(
        "<div class=\"authors-note\">\n<h2>Author's note</h2>\n{}\n</div>\n",
        chapter.notes
    )
}

/// Share of the window's words each windowed chapter holds, in percent.
/// A window without any counted words is split evenly.
pub fn progress_shares(chapters: &[Chapter], range: Range<usize>) -> Vec<f64> {
    let window = &chapters[range];
    let total: u64 = window.iter().map(|c| c.word_count).sum();
    if total == 0 {
        let even = 100.0 / window.len().max(1) as f64;
        return vec![even; window.len()];
    }
    window
        .iter()
        .map(|c| c.word_count as f64 * 100.0 / total as f64)
        .collect()
}

fn render_progress(chapters: &[Chapter], current: usize, window: usize) -> String {
    let total = chapters.len();
    let range = progress_window(total, current, window);
    let shares = progress_shares(chapters, range.clone());
    let mut out = String::new();
    out.push_str(&format!(
        "<div class=\"chapter-progress\">\n<p>Chapter {} of {total}</p>\n<ol>\n",
        current + 1
    ));
    for (idx, share) in range.zip(shares) {
        let class = match idx.cmp(&current) {
            std::cmp::Ordering::Less => "read",
            std::cmp::Ordering::Equal => "current",
            std::cmp::Ordering::Greater => "unread",
        };
        out.push_str(&format!(
            "<li class=\"{class}\" style=\"width: {share:.1}%\"><a href=\"{}\" title=\"{}\">{}</a></li>\n",
            ReferenceSite::Chapter(idx).file_name(),
            xml_escape(&chapters[idx].title),
            idx + 1
        ));
    }
    out.push_str("</ol>\n</div>\n");
    out
}

fn render_notes_page(lang: &str, idx: usize, chapter: &Chapter) -> String {
    let title = format!("Author's note: {}", chapter.title);
    let mut body = String::new();
    body.push_str(&format!("<h1>{}</h1>\n", xml_escape(&title)));
    body.push_str("<div class=\"authors-note\">\n");
    body.push_str(&chapter.notes);
    body.push_str("\n</div>\n");
    body.push_str(&format!(
        "<p class=\"back\"><a href=\"{}\">Back to {}</a></p>\n",
        ReferenceSite::Chapter(idx).file_name(),
        xml_escape(&chapter.title)
    ));
    wrap_xhtml_document(&title, lang, &body, "../")
}

fn render_notes_index(lang: &str, chapters: &[Chapter], notes: &[Option<String>]) -> String {
    let mut body = String::new();
    body.push_str("<h1>Author's notes</h1>\n<ol>\n");
    for (idx, chapter) in chapters.iter().enumerate() {
        if notes.get(idx).is_some_and(Option::is_some) {
            body.push_str(&format!(
                "<li><a href=\"{}\">{}</a></li>\n",
                ReferenceSite::ChapterNotes(idx).file_name(),
                xml_escape(&chapter.title)
            ));
        }
    }
    body.push_str("</ol>\n");
    wrap_xhtml_document("Author's notes", lang, &body, "../")
}

fn render_nav(
    title: &str,
    lang: &str,
    chapters: &[Chapter],
    notes: &[Option<String>],
    has_cover: bool,
) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<!DOCTYPE html>\n");
    out.push_str(&format!(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\" lang=\"{}\" xml:lang=\"{}\">\n",
        xml_escape(lang),
        xml_escape(lang)
    ));
    out.push_str("<head>\n");
    out.push_str(&format!("  <title>{}</title>\n", xml_escape(title)));
    out.push_str("  <meta charset=\"utf-8\" />\n");
    out.push_str(&stylesheet_links(""));
    out.push_str("</head>\n");
    out.push_str("<body>\n");
    out.push_str("  <nav epub:type=\"toc\" id=\"toc\">\n");
    out.push_str("    <h1>Contents</h1>\n");
    out.push_str("    <ol>\n");
    out.push_str(&format!(
        "      <li><a href=\"Text/{}\">Title Page</a></li>\n",
        ReferenceSite::TitlePage.file_name()
    ));
    for (idx, chapter) in chapters.iter().enumerate() {
        out.push_str(&format!(
            "      <li><a href=\"Text/{}\">{}</a></li>\n",
            ReferenceSite::Chapter(idx).file_name(),
            xml_escape(&chapter.title)
        ));
    }
    if notes.iter().any(Option::is_some) {
        out.push_str(&format!(
            "      <li><a href=\"{NOTES_INDEX_HREF}\">Author's notes</a>\n        <ol>\n"
        ));
        for (idx, chapter) in chapters.iter().enumerate() {
            if notes.get(idx).is_some_and(Option::is_some) {
                out.push_str(&format!(
                    "          <li><a href=\"Text/{}\">{}</a></li>\n",
                    ReferenceSite::ChapterNotes(idx).file_name(),
                    xml_escape(&chapter.title)
                ));
            }
        }
        out.push_str("        </ol>\n      </li>\n");
    }
    out.push_str("    </ol>\n");
    out.push_str("  </nav>\n");

    out.push_str("  <nav epub:type=\"landmarks\" id=\"landmarks\" hidden=\"hidden\">\n");
    out.push_str("    <ol>\n");
    if has_cover {
        out.push_str(&format!(
            "      <li><a epub:type=\"cover\" href=\"{COVER_PAGE_HREF}\">Cover</a></li>\n"
        ));
    }
    out.push_str(&format!(
        "      <li><a epub:type=\"titlepage\" href=\"Text/{}\">Title Page</a></li>\n",
        ReferenceSite::TitlePage.file_name()
    ));
    if !chapters.is_empty() {
        out.push_str(&format!(
            "      <li><a epub:type=\"bodymatter\" href=\"Text/{}\">Start</a></li>\n",
            ReferenceSite::Chapter(0).file_name()
        ));
    }
    out.push_str("    </ol>\n");
    out.push_str("  </nav>\n");
    out.push_str("</body>\n");
    out.push_str("</html>\n");
    out
}

fn stylesheet_links(prefix: &str) -> String {
    format!(
        "  <link rel=\"stylesheet\" type=\"text/css\" href=\"{prefix}Styles/style.css\" />\n  <link rel=\"stylesheet\" type=\"text/css\" href=\"{prefix}Styles/icons.css\" />\n"
    )
}

fn wrap_xhtml_document(title: &str, lang: &str, body_html: &str, prefix: &str) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<!DOCTYPE html>\n");
    out.push_str(&format!(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\" lang=\"{}\" xml:lang=\"{}\">\n",
        xml_escape(lang),
        xml_escape(lang)
    ));
    out.push_str("<head>\n");
    out.push_str(&format!("  <title>{}</title>\n", xml_escape(title)));
    out.push_str("  <meta charset=\"utf-8\" />\n");
    out.push_str(&stylesheet_links(prefix));
    out.push_str("</head>\n");
    out.push_str("<body>\n");
    out.push_str(body_html);
    if !body_html.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("</body>\n");
    out.push_str("</html>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{Author, MediaType, Prequel, Tag};

    fn story() -> Story {
        Story {
            id: 1,
            title: "Tea & Cake".to_owned(),
            url: "https://www.fimfiction.net/story/1".to_owned(),
            author: Author {
                id: "42".to_owned(),
                name: "Quill".to_owned(),
                url: "https://www.fimfiction.net/user/42".to_owned(),
            },
            status: "Complete".to_owned(),
            content_rating: "Everyone".to_owned(),
            published: None,
            modified: None,
            words: 900,
            tags: vec![Tag {
                name: "Comedy".to_owned(),
                kind: "genre".to_owned(),
                url: "https://www.fimfiction.net/tag/comedy".to_owned(),
            }],
            description: String::new(),
            short_description: String::new(),
            prequel: Some(Prequel {
                title: "Before".to_owned(),
                url: "https://www.fimfiction.net/story/5".to_owned(),
            }),
            cover_url: None,
            chapters: Vec::new(),
        }
    }

    fn chapter(title: &str, notes: &str, notes_first: bool) -> Chapter {
        Chapter {
            title: title.to_owned(),
            link: String::new(),
            content: format!("<p>{title} body</p>"),
            notes: notes.to_owned(),
            notes_first,
            word_count: 450,
        }
    }

    #[test]
    fn progress_window_recenters_and_clamps() {
        assert_eq!(progress_window(5, 2, 15), 0..5);
        assert_eq!(progress_window(40, 0, 15), 0..15);
        assert_eq!(progress_window(40, 20, 15), 13..28);
        assert_eq!(progress_window(40, 39, 15), 25..40);
    }

    #[test]
    fn progress_widths_follow_word_counts() {
        let story = story();
        let options = ConvertOptions::default();
        let render_first = |counts: [u64; 2]| {
            let chapters: Vec<Chapter> = ["One", "Two"]
                .iter()
                .zip(counts)
                .map(|(title, words)| Chapter {
                    word_count: words,
                    ..chapter(title, "", false)
                })
                .collect();
            let pages = Pages::render(&PageContext {
                story: &story,
                description: "",
                chapters: &chapters,
                cover: None,
                readability: None,
                options: &options,
            });
            pages.chapters[0].clone()
        };

        let short_first = render_first([100, 300]);
        assert!(short_first.contains("<li class=\"current\" style=\"width: 25.0%\">"));
        assert!(short_first.contains("<li class=\"unread\" style=\"width: 75.0%\">"));
        assert_ne!(render_first([10, 90000]), render_first([90000, 10]));
    }

    #[test]
    fn progress_shares_split_evenly_without_counts() {
        let chapters = vec![
            Chapter {
                word_count: 0,
                ..chapter("One", "", false)
            },
            Chapter {
                word_count: 0,
                ..chapter("Two", "", false)
            },
        ];
        assert_eq!(progress_shares(&chapters, 0..2), vec![50.0, 50.0]);
        assert_eq!(progress_shares(&chapters, 1..2), vec![100.0]);
    }

    #[test]
    fn reading_time_rounds_up() {
        assert_eq!(reading_minutes(450, 200), 3);
        assert_eq!(reading_minutes(0, 200), 1);
        assert_eq!(reading_minutes(400, 200), 2);
    }

    #[test]
    fn inline_notes_follow_notes_first() {
        let story = story();
        let chapters = vec![
            chapter("One", "<p>Before!</p>", true),
            chapter("Two", "<p>After!</p>", false),
        ];
        let options = ConvertOptions::default();
        let pages = Pages::render(&PageContext {
            story: &story,
            description: "<p>Desc</p>",
            chapters: &chapters,
            cover: None,
            readability: None,
            options: &options,
        });

        assert!(pages.cover.is_none());
        assert!(pages.notesnav.is_none());
        assert!(pages.notes.iter().all(Option::is_none));

        let one = &pages.chapters[0];
        assert!(one.find("Before!").unwrap() < one.find("One body").unwrap());
        let two = &pages.chapters[1];
        assert!(two.find("After!").unwrap() > two.find("Two body").unwrap());
        assert!(one.contains("about 3 minutes"));
        assert!(one.contains("Chapter 1 of 2"));

        assert!(pages.title.contains("Tea &amp; Cake"));
        assert!(pages.title.contains("<p>Desc</p>"));
        assert!(pages.title.contains("Sequel to"));
        assert!(pages.title.contains("fa-check"));
        assert!(!pages.title.contains("Readability"));
    }

    #[test]
    fn separate_notes_get_their_own_documents_and_index() {
        let story = story();
        let chapters = vec![chapter("One", "<p>Hi</p>", true), chapter("Two", "", false)];
        let options = ConvertOptions {
            separate_notes: true,
            ..ConvertOptions::default()
        };
        let pages = Pages::render(&PageContext {
            story: &story,
            description: "",
            chapters: &chapters,
            cover: None,
            readability: None,
            options: &options,
        });

        assert!(pages.notes[0].as_deref().unwrap().contains("<p>Hi</p>"));
        assert!(pages.notes[1].is_none());
        assert!(!pages.chapters[0].contains("<p>Hi</p>"));
        assert!(pages.chapters[0].contains("href=\"chapter_1_notes.xhtml\""));
        assert!(pages.notesnav.as_deref().unwrap().contains("chapter_1_notes.xhtml"));
        assert!(pages.nav.contains("href=\"Text/notesnav.xhtml\">Author's notes</a>"));
        assert!(pages.nav.contains("href=\"Text/chapter_1_notes.xhtml\">One</a>"));
        assert!(!pages.nav.contains("chapter_2_notes.xhtml"));

        let hrefs = pages.hrefs();
        let entries = pages.entries(&hrefs);
        let ids: Vec<_> = entries.iter().map(|e| (e.id, e.index, e.linear)).collect();
        assert_eq!(
            ids,
            vec![
                ("titlepage", None, true),
                ("chapter", Some(0), true),
                ("chapter_notes", Some(0), false),
                ("chapter", Some(1), true),
                ("nav", None, true),
                ("notesnav", None, false),
            ]
        );
    }

    #[test]
    fn cover_with_dimensions_is_svg_wrapped() {
        let story = story();
        let cover = CoverImage {
            data: vec![0],
            media_type: MediaType::new("image/jpeg", "jpg"),
            dimensions: Some((600, 900)),
        };
        let options = ConvertOptions::default();
        let ease = ReadingEase::from_counts(2, 12, 12).unwrap();
        let pages = Pages::render(&PageContext {
            story: &story,
            description: "",
            chapters: &[],
            cover: Some(&cover),
            readability: Some(&ease),
            options: &ConvertOptions {
                reading_ease: true,
                ..options
            },
        });

        assert!(pages.cover_svg);
        let doc = pages.cover.unwrap();
        assert!(doc.contains("viewBox=\"0 0 600 900\""));
        assert!(doc.contains("xlink:href=\"../Images/cover.jpg\""));
        assert!(pages.title.contains("Readability"));
    }
}
