use crate::error::ConfigError;
use crate::extract::{ListingRules, Strategy};

pub const DEFAULT_KEYWORDS: &[&str] = &["job", "career", "position", "hiring", "apply"];
pub const DEFAULT_STOPLIST: &[&str] = &["careers", "apply"];

/// Everything site-specific about watching one careers page.
#[derive(Debug)]
pub struct SiteProfile {
    /// History file stem and CLI name.
    pub key: &'static str,
    /// Used in notification headers.
    pub label: &'static str,
    pub default_url: Option<&'static str>,
    pub strategy: Strategy,
    pub keywords: &'static [&'static str],
    pub stoplist: &'static [&'static str],
    /// Selectors reported by `inspect`; not used for extraction.
    pub diagnostic_selectors: &'static [&'static str],
}

pub static SITES: &[SiteProfile] = &[
    SiteProfile {
        key: "botpress",
        label: "Botpress",
        default_url: None,
        strategy: Strategy::Listing(ListingRules {
            item: "li.whr-item",
            title: "h3.whr-title a",
            location: Some("li.whr-location"),
            group: Some("h2.whr-group"),
        }),
        keywords: DEFAULT_KEYWORDS,
        stoplist: DEFAULT_STOPLIST,
        diagnostic_selectors: &["li.whr-item", "h2.whr-group"],
    },
    SiteProfile {
        key: "flare",
        label: "Flare",
        default_url: Some("https://flare.io/company/careers/"),
        strategy: Strategy::Links,
        keywords: DEFAULT_KEYWORDS,
        stoplist: DEFAULT_STOPLIST,
        diagnostic_selectors: &[
            ".BambooHR-ATS-Jobs-Item",
            ".job-listing",
            ".career-item",
            ".position-item",
            "[class*=\"job\"]",
            "[class*=\"career\"]",
        ],
    },
];

pub fn lookup(key: &str) -> Result<&'static SiteProfile, ConfigError> {
    let key = key.trim().to_lowercase();
    SITES
        .iter()
        .find(|s| s.key == key)
        .ok_or(ConfigError::UnknownSite(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(lookup("Flare").unwrap().key, "flare");
        assert!(matches!(lookup("acme"), Err(ConfigError::UnknownSite(_))));
    }

    #[test]
    fn built_in_selectors_parse() {
        for site in SITES {
            let mut selectors: Vec<&str> = site.diagnostic_selectors.to_vec();
            if let Strategy::Listing(rules) = &site.strategy {
                selectors.extend([rules.item, rules.title]);
                selectors.extend(rules.location);
                selectors.extend(rules.group);
            }
            for css in selectors {
                assert!(
                    scraper::Selector::parse(css).is_ok(),
                    "{}: bad selector {}",
                    site.key,
                    css
                );
            }
        }
    }
}
