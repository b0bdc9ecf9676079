pub mod links;
pub mod listing;

use scraper::{ElementRef, Html, Selector};
use tracing::warn;

use crate::sites::SiteProfile;

/// A raw (display text, href) pair before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub text: String,
    pub url: String,
}

impl Candidate {
    pub fn new(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: url.into(),
        }
    }
}

/// Selectors for sites that render a proper job list.
#[derive(Debug, Clone)]
pub struct ListingRules {
    /// One element per posting.
    pub item: &'static str,
    /// Anchor inside the item; its text is the title, its href the link.
    pub title: &'static str,
    pub location: Option<&'static str>,
    /// Department heading, matched against the item's preceding siblings.
    pub group: Option<&'static str>,
}

#[derive(Debug, Clone)]
pub enum Strategy {
    Listing(ListingRules),
    /// Keyword scan over every `a[href]`.
    Links,
}

/// Candidates in document order. Never fails; no matches means an empty vec.
pub fn extract(markup: &str, profile: &SiteProfile) -> Vec<Candidate> {
    let doc = Html::parse_document(markup);
    match &profile.strategy {
        Strategy::Listing(rules) => listing::extract(&doc, rules),
        Strategy::Links => links::extract(&doc, profile.keywords),
    }
}

/// Hit counts for the profile's diagnostic selectors.
pub fn selector_hits(markup: &str, selectors: &[&'static str]) -> Vec<(&'static str, usize)> {
    let doc = Html::parse_document(markup);
    selectors
        .iter()
        .filter_map(|css| selector(css).map(|sel| (*css, doc.select(&sel).count())))
        .collect()
}

pub(crate) fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(sel) => Some(sel),
        Err(e) => {
            warn!("Skipping invalid selector {:?}: {}", css, e);
            None
        }
    }
}

/// Element text with runs of whitespace collapsed to one space.
pub(crate) fn text_of(el: &ElementRef) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tests ──
