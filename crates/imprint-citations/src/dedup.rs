//! Aggregate list deduplication and write policy
//!
//! Providers may return the same citation id; the first occurrence in
//! registration order (local before remote) wins.

use std::collections::HashSet;

use crate::source::SharedSource;

/// Keep the first source for each id, preserving order
pub fn unique_by_id(sources: impl IntoIterator<Item = SharedSource>) -> Vec<SharedSource> {
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter(|source| seen.insert(source.id().to_string()))
        .collect()
}

/// When the document's bibliography is not writable only sources from the
/// providers keyed in `local_keys` can be cited, since remote entries could
/// not be added to it.
pub fn apply_write_policy(
    sources: Vec<SharedSource>,
    writable: bool,
    local_keys: &[&str],
) -> Vec<SharedSource> {
    if writable {
        sources
    } else {
        sources
            .into_iter()
            .filter(|source| local_keys.contains(&source.provider_key.as_str()))
            .collect()
    }
}
