use std::collections::hash_map::Entry;
use std::collections::HashMap;

use anyhow::Result;
use scraper::Html;
use tracing::{debug, trace};

use crate::config::ExtractConfig;
use crate::parser::links::{first_profile_link, CanonicalKey, ProfileClassifier};
use crate::parser::names::NameResolver;
use crate::parser::rows::{build_locators, RowLocator};
use crate::record::LeadRecord;

/// First-seen-wins store of members, in capture order.
#[derive(Debug, Default)]
struct MemberCache {
    index: HashMap<CanonicalKey, usize>,
    records: Vec<LeadRecord>,
}

impl MemberCache {
    fn contains(&self, key: &CanonicalKey) -> bool {
        self.index.contains_key(key)
    }

    fn insert_with(&mut self, key: CanonicalKey, make: impl FnOnce() -> LeadRecord) -> bool {
        match self.index.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(self.records.len());
                self.records.push(make());
                true
            }
        }
    }
}

/// Members captured from a page across any number of scans. Rows the page has
/// since torn down stay captured.
///
/// One per page session; the caller owns it and passes each new view of the
/// document to [`MemberAccumulator::collect_visible`].
pub struct MemberAccumulator {
    classifier: ProfileClassifier,
    names: NameResolver,
    locators: Vec<Box<dyn RowLocator>>,
    cache: MemberCache,
}

impl MemberAccumulator {
    pub fn new(config: &ExtractConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            classifier: ProfileClassifier::new(&config.site, &config.profile)?,
            names: NameResolver::new(&config.names),
            locators: build_locators(&config.rows)?,
            cache: MemberCache::default(),
        })
    }

    /// Scan the rows currently in `doc` and capture members not seen before.
    /// Returns how many were added.
    pub fn collect_visible(&mut self, doc: &Html) -> usize {
        let mut added = 0;

        for locator in &self.locators {
            let rows = locator.locate(doc, &self.classifier);
            let candidates = rows.len();
            let mut known = 0usize;

            for row in rows {
                let Some(link) = first_profile_link(row, &self.classifier) else {
                    trace!(strategy = locator.name(), "row has no profile link");
                    continue;
                };
                if self.cache.contains(&link.key) {
                    known += 1;
                    continue;
                }
                let Some(name) = self.names.resolve(row, Some(&link.key), &self.classifier) else {
                    trace!(strategy = locator.name(), key = %link.key, "row has no usable name");
                    continue;
                };

                let profile_url = link.url.to_string();
                if self.cache.insert_with(link.key, || LeadRecord::new(name, profile_url)) {
                    added += 1;
                }
            }

            debug!(strategy = locator.name(), candidates, known, "scan pass");
        }

        if added > 0 {
            debug!(added, total = self.cache.records.len(), "captured new members");
        }
        added
    }

    /// Parse `markup` and scan it. The parsed tree is dropped before returning.
    pub fn collect_markup(&mut self, markup: &str) -> usize {
        let doc = Html::parse_document(markup);
        self.collect_visible(&doc)
    }

    pub fn records(&self) -> &[LeadRecord] {
        &self.cache.records
    }

    pub fn snapshot(&self) -> Vec<LeadRecord> {
        self.cache.records.clone()
    }

    pub fn len(&self) -> usize {
        self.cache.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RowConfig, Strategy};
    use crate::record::LeadStatus;

    fn accumulator() -> MemberAccumulator {
        MemberAccumulator::new(&ExtractConfig::default()).unwrap()
    }

    fn fixture(name: &str) -> Html {
        let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap();
        Html::parse_document(&html)
    }

    fn names(acc: &MemberAccumulator) -> Vec<&str> {
        acc.records().iter().map(|r| r.name.as_str()).collect()
    }

    const MARIA_ROW: &str = r#"
        <html><body><div role="main">
          <div class="row">
            <img alt="Maria Santos" src="https://scontent.example/maria.jpg">
            <a href="https://www.facebook.com/people/Maria-Santos/100099999">Maria Santos</a>
            <span>Joined 3 days ago</span>
          </div>
        </div></body></html>"#;

    #[test]
    fn single_row_end_to_end() {
        let mut acc = accumulator();
        let doc = Html::parse_document(MARIA_ROW);

        assert_eq!(acc.collect_visible(&doc), 1);
        let first = acc.snapshot();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].name, "Maria Santos");
        assert_eq!(first[0].profile_url, "https://www.facebook.com/people/Maria-Santos/100099999");
        assert_eq!(first[0].status, LeadStatus::New);
        assert!(first[0].phone.is_none() && first[0].email.is_none() && first[0].notes.is_none());

        assert_eq!(acc.collect_visible(&doc), 0);
        assert_eq!(acc.snapshot(), first);
    }

    #[test]
    fn repeated_scans_are_idempotent() {
        let mut acc = accumulator();
        let doc = fixture("members_page");
        acc.collect_visible(&doc);
        let once = acc.snapshot();
        for _ in 0..4 {
            acc.collect_visible(&doc);
        }
        assert_eq!(acc.snapshot(), once);
    }

    #[test]
    fn members_page_skips_chrome_and_ads() {
        let mut acc = accumulator();
        acc.collect_visible(&fixture("members_page"));

        assert_eq!(
            names(&acc),
            vec!["Juan Dela Cruz", "Maria Santos", "Ana Reyes", "Jose Rizal", "Liza Soberano"]
        );
        let urls: Vec<&str> = acc.records().iter().map(|r| r.profile_url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.facebook.com/groups/551234/user/100012345678",
                "https://www.facebook.com/people/Maria-Santos/100099999",
                "https://www.facebook.com/profile.php?id=100044455566",
                "https://www.facebook.com/jose.rizal.official",
                "https://www.facebook.com/user/100077788899",
            ]
        );
    }

    #[test]
    fn either_strategy_alone_finds_the_members() {
        for strategy in [Strategy::JoinedAnchor, Strategy::StructuralRole] {
            let config = ExtractConfig {
                rows: RowConfig { strategies: vec![strategy], ..RowConfig::default() },
                ..ExtractConfig::default()
            };
            let mut acc = MemberAccumulator::new(&config).unwrap();
            acc.collect_visible(&fixture("members_page"));
            assert_eq!(acc.len(), 5, "strategy {:?}", strategy);
        }
    }

    #[test]
    fn duplicate_rows_collapse_to_one_record() {
        let doc = Html::parse_document(
            r#"<html><body><div role="main">
                 <div role="listitem">
                   <a href="/people/Maria-Santos/100099999/?ref=group_browse"><img alt="Maria Santos"></a>
                   <span>Joined 3 days ago</span>
                 </div>
                 <div role="listitem">
                   <a href="https://www.facebook.com/user/100099999">Maria Santos</a>
                 </div>
               </div></body></html>"#,
        );
        let mut acc = accumulator();
        acc.collect_visible(&doc);
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.records()[0].profile_url, "https://www.facebook.com/people/Maria-Santos/100099999");
    }

    #[test]
    fn torn_down_rows_stay_captured() {
        let mut acc = accumulator();

        acc.collect_visible(&fixture("scroll_frame_1"));
        assert_eq!(names(&acc), vec!["Carlo Bautista", "Bea Alonzo", "Rico Yan"]);
        let carlo_seen_at = acc.records()[0].created_at;

        acc.collect_visible(&fixture("scroll_frame_2"));
        assert_eq!(
            names(&acc),
            vec!["Carlo Bautista", "Bea Alonzo", "Rico Yan", "Dingdong Dantes", "Marian Rivera"]
        );
        assert_eq!(acc.records()[0].created_at, carlo_seen_at);

        acc.collect_visible(&fixture("scroll_frame_1"));
        assert_eq!(acc.len(), 5);
    }

    #[test]
    fn first_seen_name_is_kept() {
        let mut acc = accumulator();
        acc.collect_markup(
            r#"<div role="main"><div role="listitem"><a href="/rico.yan">Rico Yan</a></div></div>"#,
        );
        acc.collect_markup(
            r#"<div role="main"><div role="listitem"><a href="/Rico.Yan">Rico Carlos Yan</a></div></div>"#,
        );
        assert_eq!(names(&acc), vec!["Rico Yan"]);
    }

    #[test]
    fn rows_without_name_or_profile_are_dropped() {
        let mut acc = accumulator();
        acc.collect_markup(
            r#"<div role="main">
                 <div role="listitem"><a href="/groups/551234/">Manila Home Bakers</a></div>
                 <div role="listitem"><a href="/user/100077788899"><img alt="Profile picture"></a><span>Joined yesterday</span></div>
                 <div role="listitem"><a href="https://l.facebook.com/l.php?u=https%3A%2F%2Fasana.com">Try Asana</a></div>
               </div>"#,
        );
        assert!(acc.is_empty());
    }

    #[test]
    fn outbound_shim_links_are_not_members() {
        let mut acc = accumulator();
        acc.collect_markup(
            r#"<div role="main">
                 <div role="listitem">
                   <a href="https://l.facebook.com/l.php?u=www.shop.example">Ana Reyes Bakery</a>
                   <a href="/user/100044455566">Ana Reyes</a>
                   <span>Joined 2 weeks ago</span>
                 </div>
                 <div role="listitem"><a href="https://l.facebook.com/l.php">Shop now</a></div>
                 <div role="listitem"><a href="/l.php?u=mailto%3Asales%40shop.example">Email us</a></div>
               </div>"#,
        );
        assert_eq!(names(&acc), vec!["Ana Reyes"]);
        assert_eq!(acc.records()[0].profile_url, "https://www.facebook.com/user/100044455566");
    }

    #[test]
    fn missing_main_region_yields_nothing() {
        let config = ExtractConfig {
            rows: RowConfig { strategies: vec![Strategy::StructuralRole], ..RowConfig::default() },
            ..ExtractConfig::default()
        };
        let mut acc = MemberAccumulator::new(&config).unwrap();
        assert_eq!(acc.collect_visible(&fixture("no_main")), 0);

        let config = ExtractConfig {
            rows: RowConfig {
                strategies: vec![Strategy::StructuralRole],
                fallback_to_body: true,
                ..RowConfig::default()
            },
            ..ExtractConfig::default()
        };
        let mut acc = MemberAccumulator::new(&config).unwrap();
        assert_eq!(acc.collect_visible(&fixture("no_main")), 2);
    }

    #[test]
    fn independent_sessions_do_not_share_state() {
        let mut a = accumulator();
        let b = accumulator();
        a.collect_markup(MARIA_ROW);
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
    }
}
