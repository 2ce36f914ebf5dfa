//! Icon-font glyphs used by the rendered pages.
//!
//! Pages reference icons as `<i class="fa fa-NAME"></i>`. The usage set is
//! always recomputed from the finished documents; the font (when configured)
//! is subset to exactly those glyphs and shipped with a generated stylesheet.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::formats::MediaType;

static START_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<[a-zA-Z](?:[^>"']|"[^"]*"|'[^']*')*>"#).expect("static regex")
});
static CLASS_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\sclass\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("static regex")
});

/// Glyph code points for the icons this tool renders.
const CODEPOINTS: &[(&str, u32)] = &[
    ("book", 0xf02d),
    ("calendar", 0xf073),
    ("check", 0xf00c),
    ("clock-o", 0xf017),
    ("eye", 0xf06e),
    ("link", 0xf0c1),
    ("pause", 0xf04c),
    ("pencil", 0xf040),
    ("star", 0xf005),
    ("tag", 0xf02b),
    ("times", 0xf00d),
    ("user", 0xf007),
];

/// Shipped as `icons.css` when no font is bundled: icons are hidden instead of
/// showing as missing-glyph boxes.
pub const ICONLESS_CSS: &str = ".fa { display: none; }\n";

/// Modifier classes that are not glyphs.
const MODIFIERS: &[&str] = &["fw", "lg", "spin"];

pub fn codepoint(icon: &str) -> Option<char> {
    CODEPOINTS
        .iter()
        .find(|(name, _)| *name == icon)
        .and_then(|(_, code)| char::from_u32(*code))
}

/// Distinct icon names referenced by `documents`.
pub fn icon_usage<'a>(documents: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    let mut used = BTreeSet::new();
    for doc in documents {
        for caps in START_TAG
            .find_iter(doc)
            .filter_map(|tag| CLASS_ATTR.captures(tag.as_str()))
        {
            let Some(classes) = caps.get(1).or_else(|| caps.get(2)) else {
                continue;
            };
            for name in classes
                .as_str()
                .split_whitespace()
                .filter_map(|class| class.strip_prefix("fa-"))
            {
                if !name.is_empty() && !MODIFIERS.contains(&name) {
                    used.insert(name.to_owned());
                }
            }
        }
    }
    used
}

/// Capability: reduce a font to the given glyphs.
pub trait FontSubsetter: Send + Sync {
    fn subset(&self, font: &[u8], glyphs: &BTreeSet<char>) -> anyhow::Result<Vec<u8>>;
}

/// Ships the configured font unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughSubsetter;

impl FontSubsetter for PassthroughSubsetter {
    fn subset(&self, font: &[u8], _glyphs: &BTreeSet<char>) -> anyhow::Result<Vec<u8>> {
        Ok(font.to_vec())
    }
}

pub fn font_media_type(font: &[u8]) -> MediaType {
    if font.starts_with(b"OTTO") {
        MediaType::new("font/otf", "otf")
    } else if font.starts_with(b"wOFF") {
        MediaType::new("font/woff", "woff")
    } else if font.starts_with(b"wOF2") {
        MediaType::new("font/woff2", "woff2")
    } else {
        MediaType::new("font/ttf", "ttf")
    }
}

/// Glyphs needed for `used`; unknown icon names are skipped.
pub fn glyphs_for(used: &BTreeSet<String>) -> BTreeSet<char> {
    used.iter().filter_map(|name| codepoint(name)).collect()
}

/// Stylesheet binding the `fa` classes to the bundled font at `font_href`
/// (relative to `Styles/`).
pub fn render_icon_css(used: &BTreeSet<String>, font_href: &str) -> String {
    let mut css = String::new();
    css.push_str("@font-face {\n");
    css.push_str("  font-family: \"IconFont\";\n");
    css.push_str(&format!("  src: url(\"{font_href}\");\n"));
    css.push_str("  font-weight: normal;\n");
    css.push_str("  font-style: normal;\n");
    css.push_str("}\n");
    css.push_str(".fa {\n");
    css.push_str("  display: inline-block;\n");
    css.push_str("  font-family: \"IconFont\";\n");
    css.push_str("  font-style: normal;\n");
    css.push_str("  font-weight: normal;\n");
    css.push_str("  line-height: 1;\n");
    css.push_str("}\n");
    css.push_str(".fa-fw {\n  width: 1.3em;\n  text-align: center;\n}\n");
    for name in used {
        if let Some(ch) = codepoint(name) {
            css.push_str(&format!(
                ".fa-{name}:before {{\n  content: \"\\{:x}\";\n}}\n",
                ch as u32
            ));
        }
    }
    css
}

/// Font and stylesheet to ship, when the pages use any icons at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconFont {
    pub data: Vec<u8>,
    pub media_type: MediaType,
    pub css: String,
}

impl IconFont {
    /// Path relative to `OEBPS/`.
    pub fn href(&self) -> String {
        format!("Fonts/icons.{}", self.media_type.extension)
    }
}

pub fn build_icon_font(
    subsetter: &dyn FontSubsetter,
    font: &[u8],
    used: &BTreeSet<String>,
) -> anyhow::Result<Option<IconFont>> {
    let glyphs = glyphs_for(used);
    if glyphs.is_empty() {
        return Ok(None);
    }

    let media_type = font_media_type(font);
    let data = subsetter.subset(font, &glyphs)?;
    let css = render_icon_css(
        used,
        &format!("../Fonts/icons.{}", media_type.extension),
    );
    Ok(Some(IconFont {
        data,
        media_type,
        css,
    }))
}
