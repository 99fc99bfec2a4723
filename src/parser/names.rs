use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};

use super::links::{hrefs, CanonicalKey, ProfileClassifier};
use super::normalize_ws;
use crate::config::NameConfig;

static CAPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(joined|added by)\b").unwrap());
static PROMO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^try\s+\S").unwrap());
static IMG_ALT_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img[alt]").unwrap());
static SPAN_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span").unwrap());

const MIN_LEN: usize = 2;
const MIN_LETTERS: usize = 2;

/// Rejects strings that are not plausible human names: captions, promos,
/// link text, UI chrome.
#[derive(Debug, Clone)]
pub struct GarbageFilter {
    max_len: usize,
    phrases: Vec<String>,
}

impl GarbageFilter {
    pub fn new(config: &NameConfig) -> Self {
        Self {
            max_len: config.max_length,
            phrases: config.garbage_phrases.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    pub fn is_garbage(&self, text: &str) -> bool {
        let t = text.trim();
        if t.is_empty() {
            return true;
        }
        let len = t.chars().count();
        if len < MIN_LEN || len > self.max_len {
            return true;
        }

        let lower = t.to_lowercase();
        if lower.contains(".com") || lower.contains("www.") || lower.contains("http") {
            return true;
        }
        if self.phrases.iter().any(|p| lower.contains(p.as_str())) {
            return true;
        }
        if CAPTION_RE.is_match(t) || PROMO_RE.is_match(t) {
            return true;
        }

        t.chars().filter(|c| c.is_alphabetic()).count() < MIN_LETTERS
    }
}

/// Picks a member name out of a row, strongest signal first.
#[derive(Debug, Clone)]
pub struct NameResolver {
    filter: GarbageFilter,
    no_photo_alt: String,
}

impl NameResolver {
    pub fn new(config: &NameConfig) -> Self {
        Self {
            filter: GarbageFilter::new(config),
            no_photo_alt: config.no_photo_alt.trim().to_lowercase(),
        }
    }

    /// None means the row has no usable name and should be dropped.
    ///
    /// Order: avatar alt, then label/text of links to `profile` (or of every
    /// link when the profile is not known yet), then spans carrying their own text.
    pub fn resolve(
        &self,
        row: ElementRef<'_>,
        profile: Option<&CanonicalKey>,
        classifier: &ProfileClassifier,
    ) -> Option<String> {
        self.from_avatar(row)
            .or_else(|| self.from_links(row, profile, classifier))
            .or_else(|| self.from_spans(row))
    }

    fn accept(&self, text: &str) -> Option<String> {
        let text = normalize_ws(text);
        (!self.filter.is_garbage(&text)).then_some(text)
    }

    fn from_avatar(&self, row: ElementRef<'_>) -> Option<String> {
        let alt = row.select(&IMG_ALT_SEL).next()?.value().attr("alt")?.trim();
        if alt.to_lowercase() == self.no_photo_alt {
            return None;
        }
        self.accept(alt)
    }

    fn from_links(
        &self,
        row: ElementRef<'_>,
        profile: Option<&CanonicalKey>,
        classifier: &ProfileClassifier,
    ) -> Option<String> {
        hrefs(row)
            .filter(|(_, href)| profile.map_or(true, |key| classifier.canonical_key(href) == *key))
            .find_map(|(a, _)| {
                a.value()
                    .attr("aria-label")
                    .and_then(|label| self.accept(label))
                    .or_else(|| self.accept(&a.text().collect::<String>()))
            })
    }

    fn from_spans(&self, row: ElementRef<'_>) -> Option<String> {
        row.select(&SPAN_SEL)
            .filter(|span| {
                span.children()
                    .filter_map(|node| node.value().as_text())
                    .any(|text| !text.trim().is_empty())
            })
            .find_map(|span| self.accept(&span.text().collect::<String>()))
    }
}
