use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Row location strategy. Order in [`RowConfig::strategies`] is scan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Climb from "Joined …" captions to the enclosing member row.
    JoinedAnchor,
    /// List items (or articles) inside the main content region.
    StructuralRole,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub site: SiteConfig,
    pub profile: ProfileConfig,
    pub names: NameConfig,
    pub rows: RowConfig,
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Hosts must contain this to be considered on-site.
    pub domain: String,
    /// Root-relative hrefs are resolved against this.
    pub base_url: String,
    /// Link-shim endpoint carrying the real target in `u`.
    pub redirect_path: String,
    pub tracking_params: Vec<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            domain: "facebook.com".into(),
            base_url: "https://www.facebook.com".into(),
            redirect_path: "/l.php".into(),
            tracking_params: [
                "fbclid", "ref", "refid", "refsrc", "hc_ref", "__cft__", "__tn__", "__xts__",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub min_username_length: usize,
    pub max_username_length: usize,
    pub min_id_digits: usize,
    /// Appended to the built-in reserved top-level paths.
    pub extra_denylist_segments: Vec<String>,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            min_username_length: 3,
            max_username_length: 60,
            min_id_digits: 6,
            extra_denylist_segments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NameConfig {
    pub max_length: usize,
    /// Case-insensitive substrings that mark UI captions, not names.
    pub garbage_phrases: Vec<String>,
    /// Avatar alt text used when the member has no photo.
    pub no_photo_alt: String,
}

impl Default for NameConfig {
    fn default() -> Self {
        Self {
            max_length: 80,
            garbage_phrases: [
                "professional dashboard",
                "try asana",
                "help center",
                "group settings",
                "unread",
                "notifications",
                "learn more",
                "see more",
                "loading",
                "profile picture",
                "add friend",
            ]
            .map(String::from)
            .to_vec(),
            no_photo_alt: "profile picture".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RowConfig {
    pub strategies: Vec<Strategy>,
    pub anchor_pattern: String,
    pub anchor_selector: String,
    pub max_anchor_length: usize,
    /// How many ancestors an anchor may climb before giving up.
    pub climb_budget: usize,
    /// Ancestors with more visible text than this are page containers, not rows.
    pub max_row_text: usize,
    pub main_selector: String,
    pub fallback_to_body: bool,
    /// Tried in order; the first selector with any match wins.
    pub row_selectors: Vec<String>,
}

impl Default for RowConfig {
    fn default() -> Self {
        Self {
            strategies: vec![Strategy::JoinedAnchor, Strategy::StructuralRole],
            anchor_pattern: r"(?i)^joined\b".into(),
            anchor_selector: "span".into(),
            max_anchor_length: 120,
            climb_budget: 8,
            max_row_text: 800,
            main_selector: r#"[role="main"]"#.into(),
            fallback_to_body: false,
            row_selectors: vec![r#"[role="listitem"]"#.into(), r#"[role="article"]"#.into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 120 }
    }
}

impl ExtractConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the value ranges that serde cannot. Selectors and the anchor
    /// pattern are checked when the engine compiles them.
    pub fn validate(&self) -> Result<()> {
        let p = &self.profile;
        if p.min_username_length > p.max_username_length {
            bail!(
                "profile.min_username_length ({}) exceeds max_username_length ({})",
                p.min_username_length,
                p.max_username_length
            );
        }
        if self.site.domain.trim().is_empty() {
            bail!("site.domain must not be empty");
        }
        if self.rows.strategies.is_empty() {
            bail!("rows.strategies must name at least one strategy");
        }
        if self.rows.climb_budget == 0 {
            bail!("rows.climb_budget must be at least 1");
        }
        Ok(())
    }
}
