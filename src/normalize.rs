use std::collections::BTreeMap;

use url::Url;

use crate::extract::Candidate;

/// Posting identity (trimmed display text) → absolute URL.
pub type Postings = BTreeMap<String, String>;

/// Filter and key the run's candidates.
///
/// Empty and stoplisted texts are dropped; on duplicate identities the later
/// candidate wins. Relative links are resolved against `base` when given.
pub fn normalize<I>(candidates: I, stoplist: &[&str], base: Option<&Url>) -> Postings
where
    I: IntoIterator<Item = Candidate>,
{
    let mut postings = Postings::new();

    for Candidate { text, url } in candidates {
        let text = text.trim();
        if text.is_empty() || is_stopped(text, stoplist) {
            continue;
        }
        postings.insert(text.to_string(), absolute_url(url.trim(), base));
    }

    postings
}

fn is_stopped(text: &str, stoplist: &[&str]) -> bool {
    let lower = text.to_lowercase();
    stoplist.iter().any(|s| s.to_lowercase() == lower)
}

/// `//host/path` always becomes `https://host/path`; other relative forms are
/// joined onto `base`. Anything unresolvable is kept as-is.
pub fn absolute_url(href: &str, base: Option<&Url>) -> String {
    if let Some(rest) = href.strip_prefix("//") {
        return format!("https://{}", rest);
    }
    if Url::parse(href).is_ok() {
        return href.to_string();
    }
    base.and_then(|b| b.join(href).ok())
        .map(String::from)
        .unwrap_or_else(|| href.to_string())
}
