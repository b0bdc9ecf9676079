use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::{selector, text_of, Candidate, ListingRules};

pub fn extract(doc: &Html, rules: &ListingRules) -> Vec<Candidate> {
    let (Some(item_sel), Some(title_sel)) = (selector(rules.item), selector(rules.title)) else {
        return Vec::new();
    };
    let location_sel = rules.location.and_then(selector);
    let group_sel = rules.group.and_then(selector);
    let label_re = Regex::new(r"(?i)^location\s*:\s*").unwrap();

    let mut items = Vec::new();

    for item in doc.select(&item_sel) {
        let Some(title_el) = item.select(&title_sel).next() else {
            continue;
        };
        let Some(href) = title_el.value().attr("href") else {
            continue;
        };
        let title = text_of(&title_el);

        let location = location_sel
            .as_ref()
            .and_then(|sel| item.select(sel).next())
            .map(|el| label_re.replace(&text_of(&el), "").trim().to_string())
            .filter(|l| !l.is_empty());

        let group = group_sel
            .as_ref()
            .and_then(|sel| preceding_heading(&item, sel))
            .filter(|g| !g.is_empty());

        let mut parts = Vec::with_capacity(3);
        if let Some(g) = group {
            parts.push(format!("[{}]", g));
        }
        parts.push(title);
        if let Some(l) = location {
            parts.push(format!("- {}", l));
        }

        items.push(Candidate::new(parts.join(" "), href));
    }

    items
}

/// Nearest earlier sibling of `item` matching `heading`.
fn preceding_heading(item: &ElementRef, heading: &Selector) -> Option<String> {
    item.prev_siblings()
        .filter_map(ElementRef::wrap)
        .find(|el| heading.matches(el))
        .map(|el| text_of(&el))
}
