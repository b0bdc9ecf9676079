use crate::normalize::Postings;

/// Postings in `current` whose identity is not a key of `previous`.
///
/// With no previous snapshot everything is new. URL changes on a known
/// identity are not reported.
pub fn new_postings(previous: Option<&Postings>, current: &Postings) -> Postings {
    let Some(previous) = previous else {
        return current.clone();
    };
    current
        .iter()
        .filter(|(identity, _)| !previous.contains_key(*identity))
        .map(|(identity, url)| (identity.clone(), url.clone()))
        .collect()
}
