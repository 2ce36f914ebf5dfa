//! Externally hosted files referenced from the rendered documents.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use regex::Regex;
use url::Url;

use crate::cache::ResourceCache;
use crate::fetch::Fetcher;
use crate::formats::{MediaType, ReferenceSite, RemoteResource};
use crate::markup::decode_entities;
use crate::media::{self, MediaInspector};
use crate::pool::map_bounded;

static IMG_SRC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<img\b[^>]*?\bsrc="([^"]+)""#).expect("static regex"));
static EMOTICON_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/images/emoticons/([A-Za-z0-9_-]+)\.[A-Za-z0-9]+$").expect("static regex")
});

/// Entity-decoded, scheme-normalized form of a `src` value. Only absolute
/// http(s) URLs are remote resources.
pub fn canonical_url(raw: &str) -> Option<String> {
    let decoded = decode_entities(raw.trim());
    let absolute = match decoded.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => decoded.into_owned(),
    };
    let url = Url::parse(&absolute).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

/// Every remote resource of one book, in discovery order, plus the documents
/// that must be marked as still referencing remote content.
#[derive(Debug, Clone, Default)]
pub struct RemoteResources {
    entries: IndexMap<String, RemoteResource>,
    stems: HashSet<String>,
    next_ext: usize,
    flagged: BTreeSet<ReferenceSite>,
}

impl RemoteResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every `<img src>` in `html` as found at `site`.
    pub fn discover(&mut self, site: ReferenceSite, html: &str) {
        for caps in IMG_SRC.captures_iter(html) {
            let raw = &caps[1];
            let Some(url) = canonical_url(raw) else {
                continue;
            };

            if !self.entries.contains_key(&url) {
                let stem = self.assign_stem(&url);
                tracing::debug!(%url, %stem, "new remote resource");
                self.entries
                    .insert(url.clone(), RemoteResource::new(url.clone(), stem));
            }
            if let Some(resource) = self.entries.get_mut(&url) {
                resource.sites.push(site);
                if !resource.aliases.iter().any(|alias| alias == raw) {
                    resource.aliases.push(raw.to_owned());
                }
            }
        }
    }

    fn assign_stem(&mut self, url: &str) -> String {
        let emoticon = Url::parse(url).ok().and_then(|parsed| {
            EMOTICON_PATH
                .captures(parsed.path())
                .map(|caps| format!("emoticon_{}", &caps[1]))
        });
        let stem = match emoticon {
            Some(stem) if !self.stems.contains(&stem) => stem,
            _ => {
                self.next_ext += 1;
                format!("ext_{}", self.next_ext)
            }
        };
        self.stems.insert(stem.clone());
        stem
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, url: &str) -> Option<&RemoteResource> {
        self.entries.get(url)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteResource> {
        self.entries.values()
    }

    /// Resources that made it into the archive.
    pub fn embedded(&self) -> impl Iterator<Item = &RemoteResource> {
        self.entries.values().filter(|r| r.dest.is_some())
    }

    pub fn flag_sites_of(&mut self, url: &str) {
        if let Some(resource) = self.entries.get(url) {
            self.flagged.extend(resource.sites.iter().copied());
        }
    }

    pub fn flag_all(&mut self) {
        for resource in self.entries.values() {
            self.flagged.extend(resource.sites.iter().copied());
        }
    }

    pub fn is_flagged(&self, site: ReferenceSite) -> bool {
        self.flagged.contains(&site)
    }

    pub fn flagged(&self) -> &BTreeSet<ReferenceSite> {
        &self.flagged
    }

    /// Every site that holds at least one resource.
    pub fn sites(&self) -> BTreeSet<ReferenceSite> {
        self.entries
            .values()
            .flat_map(|r| r.sites.iter().copied())
            .collect()
    }

    fn settle(&mut self, url: &str, outcome: Option<(MediaType, Vec<u8>)>) {
        let Some(resource) = self.entries.get_mut(url) else {
            return;
        };
        match outcome {
            Some((media_type, data)) => {
                let dir = if media_type.is_image() { "Images" } else { "Misc" };
                resource.dest = Some(format!("{dir}/{}.{}", resource.stem, media_type.extension));
                resource.media_type = Some(media_type);
                resource.data = Some(data);
            }
            None => {
                resource.dest = None;
                self.flag_sites_of(url);
            }
        }
    }

    /// Replaces every spelling of every embedded resource referenced at `site`
    /// with its path relative to `Text/`.
    pub fn rewrite(&self, site: ReferenceSite, html: &str) -> String {
        let mut out = html.to_owned();
        for resource in self.embedded() {
            if !resource.sites.contains(&site) {
                continue;
            }
            let Some(dest) = resource.dest.as_deref() else {
                continue;
            };
            let target = format!("\"../{dest}\"");
            for alias in &resource.aliases {
                out = out.replace(&format!("\"{alias}\""), &target);
            }
        }
        out
    }
}

/// Shared collaborators for [`resolve`].
pub struct ResolveContext {
    pub cache: Arc<ResourceCache>,
    pub fetcher: Arc<dyn Fetcher>,
    pub media: Arc<dyn MediaInspector>,
    pub concurrency: usize,
}

/// Downloads and classifies every pending resource with a bounded pool.
/// Returns once every resource is terminal; failures flag their sites.
pub async fn resolve(
    resources: &mut RemoteResources,
    ctx: &ResolveContext,
    on_done: impl FnMut(usize, usize),
) -> anyhow::Result<()> {
    let pending: Vec<String> = resources
        .iter()
        .filter(|r| r.dest.is_none())
        .map(|r| r.url.clone())
        .collect();
    if pending.is_empty() {
        return Ok(());
    }
    tracing::info!(
        resources = pending.len(),
        concurrency = ctx.concurrency,
        "fetching remote resources"
    );

    let outcomes = map_bounded(
        pending.clone(),
        ctx.concurrency,
        |url| {
            let cache = Arc::clone(&ctx.cache);
            let fetcher = Arc::clone(&ctx.fetcher);
            let media = Arc::clone(&ctx.media);
            async move {
                let data = match cache.get_or_fetch(&url, fetcher).await {
                    Ok(data) => data,
                    Err(err) => {
                        tracing::warn!(?err, %url, "remote resource fetch failed");
                        return None;
                    }
                };
                let classified = media::classify(media.as_ref(), data.to_vec());
                if classified.is_none() {
                    tracing::warn!(%url, "remote resource type not recognized; leaving it remote");
                }
                classified
            }
        },
        on_done,
    )
    .await?;

    for (url, outcome) in pending.iter().zip(outcomes) {
        resources.settle(url, outcome);
    }
    Ok(())
}
