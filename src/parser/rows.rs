use std::collections::HashSet;
use std::sync::LazyLock;

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::links::{first_profile_link, CanonicalKey, ProfileClassifier};
use super::text_len;
use crate::config::{RowConfig, Strategy};

static BODY_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());

/// Finds regions of the document that each hold one member entry.
pub trait RowLocator: Send + Sync {
    fn name(&self) -> &'static str;

    fn locate<'a>(&self, doc: &'a Html, classifier: &ProfileClassifier) -> Vec<ElementRef<'a>>;
}

pub fn build_locators(config: &RowConfig) -> Result<Vec<Box<dyn RowLocator>>> {
    let mut locators: Vec<Box<dyn RowLocator>> = Vec::new();
    for strategy in &config.strategies {
        match strategy {
            Strategy::JoinedAnchor => locators.push(Box::new(JoinedAnchor::new(config)?)),
            Strategy::StructuralRole => locators.push(Box::new(StructuralRole::new(config)?)),
        }
    }
    Ok(locators)
}

fn parse_selector(raw: &str) -> Result<Selector> {
    Selector::parse(raw).map_err(|e| anyhow!("Invalid CSS selector {raw:?}: {e:?}"))
}

// ── Lexical anchor ──

/// Join-date captions only appear on member rows, so each one is climbed
/// until an ancestor holds a profile link without being a page-sized container.
pub struct JoinedAnchor {
    anchor: Selector,
    pattern: Regex,
    max_anchor_len: usize,
    budget: usize,
    max_row_text: usize,
}

impl JoinedAnchor {
    pub fn new(config: &RowConfig) -> Result<Self> {
        Ok(Self {
            anchor: parse_selector(&config.anchor_selector)?,
            pattern: Regex::new(&config.anchor_pattern)
                .with_context(|| format!("Invalid rows.anchor_pattern {:?}", config.anchor_pattern))?,
            max_anchor_len: config.max_anchor_length,
            budget: config.climb_budget,
            max_row_text: config.max_row_text,
        })
    }

    fn caption_matches(&self, el: ElementRef<'_>) -> bool {
        let text = super::normalize_ws(&el.text().collect::<String>());
        !text.is_empty() && text.chars().count() <= self.max_anchor_len && self.pattern.is_match(&text)
    }

    /// Innermost match only: a wrapper around the caption repeats its text.
    fn is_anchor(&self, el: ElementRef<'_>) -> bool {
        self.caption_matches(el)
            && !el
                .descendants()
                .skip(1)
                .filter_map(ElementRef::wrap)
                .any(|inner| self.anchor.matches(&inner) && self.caption_matches(inner))
    }

    fn climb<'a>(
        &self,
        anchor: ElementRef<'a>,
        classifier: &ProfileClassifier,
    ) -> Option<(ElementRef<'a>, CanonicalKey)> {
        anchor
            .ancestors()
            .filter_map(ElementRef::wrap)
            .take(self.budget)
            .find_map(|el| {
                let len = text_len(el);
                if len == 0 || len > self.max_row_text {
                    return None;
                }
                first_profile_link(el, classifier).map(|link| (el, link.key))
            })
    }
}

impl RowLocator for JoinedAnchor {
    fn name(&self) -> &'static str {
        "joined-anchor"
    }

    fn locate<'a>(&self, doc: &'a Html, classifier: &ProfileClassifier) -> Vec<ElementRef<'a>> {
        let mut rows = Vec::new();
        let mut seen = HashSet::new();
        let mut anchors = 0usize;

        for el in doc.select(&self.anchor).filter(|el| self.is_anchor(*el)) {
            anchors += 1;
            let Some((row, key)) = self.climb(el, classifier) else {
                continue;
            };
            // Two captions in one row climb to the same member.
            if seen.insert(key) {
                rows.push(row);
            }
        }

        debug!(anchors, rows = rows.len(), "joined-anchor located rows");
        rows
    }
}

// ── Structural role ──

/// Every list item (or, failing that, article) inside the main region is a row.
pub struct StructuralRole {
    main: Selector,
    fallback_to_body: bool,
    rows: Vec<Selector>,
}

impl StructuralRole {
    pub fn new(config: &RowConfig) -> Result<Self> {
        Ok(Self {
            main: parse_selector(&config.main_selector)?,
            fallback_to_body: config.fallback_to_body,
            rows: config
                .row_selectors
                .iter()
                .map(|s| parse_selector(s))
                .collect::<Result<_>>()?,
        })
    }

    fn root<'a>(&self, doc: &'a Html) -> Option<ElementRef<'a>> {
        doc.select(&self.main).next().or_else(|| {
            if self.fallback_to_body {
                doc.select(&BODY_SEL).next()
            } else {
                None
            }
        })
    }
}

impl RowLocator for StructuralRole {
    fn name(&self) -> &'static str {
        "structural-role"
    }

    fn locate<'a>(&self, doc: &'a Html, _classifier: &ProfileClassifier) -> Vec<ElementRef<'a>> {
        let Some(root) = self.root(doc) else {
            debug!("no main content region; nothing to scan");
            return Vec::new();
        };

        for selector in &self.rows {
            let rows: Vec<ElementRef<'a>> = root.select(selector).collect();
            if !rows.is_empty() {
                debug!(rows = rows.len(), "structural-role located rows");
                return rows;
            }
        }
        Vec::new()
    }
}
