use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use scraper::{ElementRef, Selector};
use url::Url;

use crate::config::{ProfileConfig, SiteConfig};

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").unwrap());
static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Reserved top-level paths that look like usernames but are site sections.
const RESERVED_SEGMENTS: &[&str] = &[
    "groups", "help", "settings", "policies", "policy", "privacy", "terms",
    "marketplace", "watch", "events", "messages", "notifications", "login",
    "recover", "professional_dashboard", "friends", "adsmanager", "business",
    "asana", "jobs", "commerce", "gaming", "photo", "photos", "posts", "reel",
    "reels", "pages", "profile.php", "home.php", "search", "stories",
    "bookmarks", "saved", "memories",
];

/// Stable identity of a member profile. `id:<digits>` for numeric profiles,
/// `u:<username>` for vanity URLs, a lowercased origin+path otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    fn id(id: &str) -> Self {
        Self(format!("id:{id}"))
    }

    fn username(name: &str) -> Self {
        Self(format!("u:{}", name.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An accepted profile link: cleaned absolute URL plus its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileLink {
    pub url: Url,
    pub key: CanonicalKey,
}

/// Decides which hrefs point at member profiles and what member they name.
#[derive(Debug, Clone)]
pub struct ProfileClassifier {
    domain: String,
    base: Url,
    redirect_path: String,
    tracking_params: Vec<String>,
    denylist: HashSet<String>,
    min_username: usize,
    max_username: usize,
    min_id_digits: usize,
}

impl ProfileClassifier {
    pub fn new(site: &SiteConfig, profile: &ProfileConfig) -> Result<Self> {
        let base = Url::parse(&site.base_url)
            .with_context(|| format!("Invalid site.base_url {:?}", site.base_url))?;
        let denylist = RESERVED_SEGMENTS
            .iter()
            .map(|s| s.to_string())
            .chain(profile.extra_denylist_segments.iter().map(|s| s.to_lowercase()))
            .collect();

        Ok(Self {
            domain: site.domain.to_lowercase(),
            base,
            redirect_path: site.redirect_path.clone(),
            tracking_params: site.tracking_params.clone(),
            denylist,
            min_username: profile.min_username_length,
            max_username: profile.max_username_length,
            min_id_digits: profile.min_id_digits,
        })
    }

    pub fn classify(&self, href: &str) -> bool {
        self.profile_link(href).is_some()
    }

    pub fn profile_link(&self, href: &str) -> Option<ProfileLink> {
        let url = self.resolve(href)?;
        let key = self.identify(&url)?;
        Some(ProfileLink { url, key })
    }

    /// Total: every href gets a key, so links can be compared by identity
    /// whether or not they are profile links.
    pub fn canonical_key(&self, href: &str) -> CanonicalKey {
        match self.resolve(href) {
            Some(url) => self.identify(&url).unwrap_or_else(|| fallback_key(&url)),
            None => CanonicalKey(href.trim().to_lowercase()),
        }
    }

    /// Absolutize, unwrap one level of link-shim redirect, strip tracking noise.
    /// A shim that does not unwrap to a usable target resolves to nothing.
    pub fn resolve(&self, href: &str) -> Option<Url> {
        let mut url = self.absolutize(href)?;
        if self.is_redirect(&url) {
            url = self
                .unwrap_redirect(&url)
                .filter(|target| !self.is_redirect(target))?;
        }
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        self.clean(&mut url);
        Some(url)
    }

    fn absolutize(&self, href: &str) -> Option<Url> {
        let href = href.trim();
        let lower = href.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Url::parse(href).ok()
        } else if href.starts_with('/') {
            self.base.join(href).ok()
        } else {
            None
        }
    }

    fn is_redirect(&self, url: &Url) -> bool {
        self.on_site(url) && url.path().trim_end_matches('/') == self.redirect_path
    }

    fn unwrap_redirect(&self, url: &Url) -> Option<Url> {
        let (_, target) = url.query_pairs().find(|(k, v)| k == "u" && !v.is_empty())?;
        self.absolutize(&target)
    }

    fn on_site(&self, url: &Url) -> bool {
        url.host_str()
            .is_some_and(|host| host.to_ascii_lowercase().contains(&self.domain))
    }

    fn is_tracking(&self, key: &str) -> bool {
        self.tracking_params.iter().any(|p| {
            key == p.as_str() || key.strip_prefix(p.as_str()).is_some_and(|rest| rest.starts_with('['))
        })
    }

    fn clean(&self, url: &mut Url) {
        url.set_fragment(None);

        let path = url.path();
        if path.len() > 1 && path.ends_with('/') {
            let trimmed = path.trim_end_matches('/').to_string();
            url.set_path(if trimmed.is_empty() { "/" } else { &trimmed });
        }

        if url.path() == "/profile.php" {
            let kept: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| !self.is_tracking(k))
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            if kept.is_empty() {
                url.set_query(None);
            } else {
                url.query_pairs_mut().clear().extend_pairs(kept.iter());
            }
        } else {
            url.set_query(None);
        }
    }

    fn is_numeric_id(&self, s: &str) -> bool {
        s.len() >= self.min_id_digits && DIGITS_RE.is_match(s)
    }

    /// Profile identity for an already-resolved URL, or None when the URL is
    /// not a member profile.
    fn identify(&self, url: &Url) -> Option<CanonicalKey> {
        if !self.on_site(url) {
            return None;
        }

        if url.path() == "/profile.php" {
            return url
                .query_pairs()
                .find(|(k, v)| k == "id" && !v.is_empty())
                .map(|(_, id)| CanonicalKey::id(&id));
        }

        let seg: Vec<&str> = url.path().split('/').filter(|s| !s.is_empty()).collect();
        match seg.as_slice() {
            ["user", id, ..] if self.is_numeric_id(id) => Some(CanonicalKey::id(id)),
            ["people", _, .., id] if self.is_numeric_id(id) => Some(CanonicalKey::id(id)),
            ["groups", _, "user", id, ..] if self.is_numeric_id(id) => Some(CanonicalKey::id(id)),
            [name] => {
                let lower = name.to_lowercase();
                let len = lower.chars().count();
                if self.denylist.contains(&lower) || len < self.min_username || len > self.max_username {
                    None
                } else {
                    Some(CanonicalKey::username(&lower))
                }
            }
            _ => None,
        }
    }
}

fn fallback_key(url: &Url) -> CanonicalKey {
    let joined = format!("{}{}", url.origin().ascii_serialization(), url.path());
    let trimmed = joined.trim_end_matches('/');
    CanonicalKey(trimmed.to_lowercase())
}

/// Hrefs of every link inside `row`, in document order.
pub fn hrefs<'a>(row: ElementRef<'a>) -> impl Iterator<Item = (ElementRef<'a>, &'a str)> {
    row.select(&ANCHOR_SEL)
        .filter_map(|a| a.value().attr("href").map(|href| (a, href)))
}

/// First accepted profile link in document order. Not the best match, the first.
pub fn first_profile_link(row: ElementRef<'_>, classifier: &ProfileClassifier) -> Option<ProfileLink> {
    hrefs(row).find_map(|(_, href)| classifier.profile_link(href))
}
