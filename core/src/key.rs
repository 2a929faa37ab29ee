//! Canonical cache keys
//!
//! [`CacheKey::new`] is the only way to build a key (`from_params` is a
//! shorthand over it), so every session and every cache agrees on the format.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::types::{ResultType, SearchFilters, SearchParams};

/// Deterministic serialization of normalized search parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build the key for a query text and filter set.
    ///
    /// Normalization: strings are trimmed and blank strings count as absent,
    /// result types are sorted and deduplicated, fields appear in a fixed order.
    pub fn new(query: &str, filters: &SearchFilters) -> Self {
        let types: BTreeSet<ResultType> = filters.types.iter().copied().collect();
        let types: Vec<&str> = types.iter().map(ResultType::as_str).collect();
        let (date_from, date_to) = match filters.date_range {
            Some(range) => (range.from, range.to),
            None => (None, None),
        };

        let canonical = json!({
            "q": query.trim(),
            "types": types,
            "from": date_from.map(|d| d.to_string()),
            "to": date_to.map(|d| d.to_string()),
            "status": normalized(&filters.status),
            "city": normalized(&filters.city),
            "doctor": normalized(&filters.doctor_id),
            "medication": normalized(&filters.medication),
            "limit": filters.limit,
            "offset": filters.offset,
            "sort": filters.sort.map(|s| s.as_str()),
        });

        CacheKey(canonical.to_string())
    }

    pub fn from_params(params: &SearchParams) -> Self {
        Self::new(&params.query, &params.filters)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trim an optional filter string, mapping blank to absent.
fn normalized(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Normalized copy of `filters`: trimmed strings, sorted unique types.
///
/// Applied before a request goes out so the backend sees exactly what the
/// key describes.
pub fn normalize_filters(filters: &SearchFilters) -> SearchFilters {
    let types: BTreeSet<ResultType> = filters.types.iter().copied().collect();
    let own = |value: &Option<String>| normalized(value).map(str::to_string);

    SearchFilters {
        types: types.into_iter().collect(),
        date_range: filters.date_range.filter(|r| !r.is_open()),
        status: own(&filters.status),
        city: own(&filters.city),
        doctor_id: own(&filters.doctor_id),
        medication: own(&filters.medication),
        limit: filters.limit,
        offset: filters.offset,
        sort: filters.sort,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DateRange, SortOrder};
    use chrono::NaiveDate;

    fn filters(types: Vec<ResultType>) -> SearchFilters {
        SearchFilters {
            types,
            city: Some("Lyon".to_string()),
            sort: Some(SortOrder::DateDesc),
            ..Default::default()
        }
    }

    #[test]
    fn test_type_order_does_not_change_key() {
        let a = CacheKey::new(
            "test",
            &filters(vec![ResultType::Patient, ResultType::Appointment]),
        );
        let b = CacheKey::new(
            "test",
            &filters(vec![ResultType::Appointment, ResultType::Patient]),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicate_types_collapse() {
        let a = CacheKey::new("test", &filters(vec![ResultType::Patient]));
        let b = CacheKey::new(
            "test",
            &filters(vec![ResultType::Patient, ResultType::Patient]),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_whitespace_and_blank_strings_normalized() {
        let plain = SearchFilters {
            status: Some("active".to_string()),
            ..Default::default()
        };
        let padded = SearchFilters {
            status: Some("  active ".to_string()),
            city: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(CacheKey::new("test", &plain), CacheKey::new(" test ", &padded));
    }

    #[test]
    fn test_different_filters_produce_different_keys() {
        let base = SearchFilters::default();
        let paged = SearchFilters {
            offset: Some(20),
            ..Default::default()
        };
        let dated = SearchFilters {
            date_range: Some(DateRange {
                from: NaiveDate::from_ymd_opt(2024, 1, 1),
                to: None,
            }),
            ..Default::default()
        };

        let k1 = CacheKey::new("test", &base);
        let k2 = CacheKey::new("test", &paged);
        let k3 = CacheKey::new("test", &dated);
        let k4 = CacheKey::new("Test", &base);

        assert_ne!(k1, k2);
        assert_ne!(k1, k3);
        assert_ne!(k1, k4);
    }

    #[test]
    fn test_separator_characters_cannot_collide() {
        let a = SearchFilters {
            status: Some("a\",\"city\":\"b".to_string()),
            ..Default::default()
        };
        let b = SearchFilters {
            status: Some("a".to_string()),
            city: Some("b".to_string()),
            ..Default::default()
        };
        assert_ne!(CacheKey::new("q", &a), CacheKey::new("q", &b));
    }

    #[test]
    fn test_from_params_matches_new() {
        let wanted = SearchFilters {
            types: vec![ResultType::Doctor, ResultType::Patient],
            city: Some(" Lyon ".to_string()),
            ..Default::default()
        };
        let params = SearchParams::new("  martin", wanted.clone());

        assert_eq!(CacheKey::from_params(&params), CacheKey::new("martin", &wanted));
    }

    #[test]
    fn test_normalize_filters() {
        let normalized = normalize_filters(&SearchFilters {
            types: vec![ResultType::Doctor, ResultType::Patient, ResultType::Doctor],
            date_range: Some(DateRange::default()),
            medication: Some(" ".to_string()),
            doctor_id: Some(" d-12 ".to_string()),
            ..Default::default()
        });

        assert_eq!(normalized.types, vec![ResultType::Patient, ResultType::Doctor]);
        assert!(normalized.date_range.is_none());
        assert!(normalized.medication.is_none());
        assert_eq!(normalized.doctor_id.as_deref(), Some("d-12"));
    }
}
