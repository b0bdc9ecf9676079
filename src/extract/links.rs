use scraper::Html;

use super::{selector, text_of, Candidate};

/// Every anchor whose href or text mentions a keyword. Noisy on purpose;
/// boilerplate is dropped later by the stoplist.
pub fn extract(doc: &Html, keywords: &[&str]) -> Vec<Candidate> {
    let Some(anchor) = selector("a[href]") else {
        return Vec::new();
    };
    let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();

    doc.select(&anchor)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            let text = text_of(&el);
            let (h, t) = (href.to_lowercase(), text.to_lowercase());
            keywords
                .iter()
                .any(|k| h.contains(k.as_str()) || t.contains(k.as_str()))
                .then(|| Candidate::new(text, href))
        })
        .collect()
}
