//! Recent confirmed queries, most recent first

use std::collections::VecDeque;

/// Default number of queries kept.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Shortest query (after trimming) worth remembering.
pub const MIN_HISTORY_QUERY_LEN: usize = 2;

#[derive(Debug, Clone)]
pub struct SearchHistory {
    limit: usize,
    entries: VecDeque<String>,
}

impl SearchHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            entries: VecDeque::with_capacity(limit),
        }
    }

    /// Record a query at the front.
    ///
    /// Returns false when the query is too short to keep. A query already
    /// present moves to the front instead of appearing twice.
    pub fn add(&mut self, query: &str) -> bool {
        let query = query.trim();
        if query.chars().count() < MIN_HISTORY_QUERY_LEN || self.limit == 0 {
            return false;
        }

        if let Some(pos) = self.entries.iter().position(|q| q == query) {
            self.entries.remove(pos);
        }
        self.entries.push_front(query.to_string());
        self.entries.truncate(self.limit);
        true
    }

    /// Entries containing `text`, ignoring case, most recent first.
    pub fn matching(&self, text: &str, limit: usize) -> Vec<&str> {
        let needle = text.trim().to_lowercase();
        self.entries
            .iter()
            .filter(|q| q.to_lowercase().contains(&needle))
            .take(limit)
            .map(String::as_str)
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for SearchHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

/// Blend remote suggestions with matching history entries.
///
/// Remote suggestions keep their order and come first; history entries follow.
/// Exact duplicates are dropped (first occurrence wins) and the result is
/// capped at `limit`.
pub fn merge_suggestions<'a>(
    remote: impl IntoIterator<Item = &'a str>,
    history: impl IntoIterator<Item = &'a str>,
    limit: usize,
) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(limit);
    for candidate in remote.into_iter().chain(history) {
        if merged.len() >= limit {
            break;
        }
        if !merged.iter().any(|existing| existing == candidate) {
            merged.push(candidate.to_string());
        }
    }
    merged
}
