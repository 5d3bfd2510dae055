//! The static filter registry.
//!
//! Every filter kind registers a build function keyed by its kind tag;
//! dispatch is a table lookup. The table is assembled once behind a
//! published pointer and read-only afterwards.
use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use crate::error::{Error, Result};
use crate::filter::FilterRef;
use crate::ops;

/// One registry entry.
pub(crate) struct Registration {
    /// The kind tag, unique across the table.
    pub kind: &'static str,
    /// Parameter names in declaration order, for positional DSL binding.
    pub positional: &'static [&'static str],
    /// Strict constructor from a parameter document.
    pub build: fn(&serde_json::Value) -> Result<FilterRef>,
}

static REGISTRY: Lazy<BTreeMap<&'static str, Registration>> = Lazy::new(|| {
    let mut entries = Vec::new();
    entries.extend(ops::point::registrations());
    entries.extend(ops::convert::registrations());
    entries.extend(ops::blur::registrations());
    entries.extend(ops::edge::registrations());
    entries.extend(ops::morph::registrations());
    entries.extend(ops::geometric::registrations());
    entries.extend(ops::histogram::registrations());
    entries.extend(ops::alpha::registrations());
    entries.extend(ops::blend::registrations());
    entries.extend(ops::effects::registrations());
    entries.extend(ops::regions::registrations());

    let mut table = BTreeMap::new();
    for entry in entries {
        let kind = entry.kind;
        if table.insert(kind, entry).is_some() {
            // Registration is compile-time data; a duplicate tag is a
            // programming error worth failing loudly for.
            panic!("duplicate filter kind registered: {}", kind);
        }
    }
    table
});

pub(crate) fn lookup(kind: &str) -> Option<&'static Registration> {
    REGISTRY.get(kind)
}

/// Construct a filter by kind tag from a parameter document.
pub fn build_filter(kind: &str, params: &serde_json::Value) -> Result<FilterRef> {
    let entry = lookup(kind)
        .ok_or_else(|| Error::invalid_argument("type", format!("unknown filter kind `{}`", kind)))?;
    (entry.build)(params)
}

/// Every registered kind tag, sorted.
pub fn known_kinds() -> Vec<&'static str> {
    REGISTRY.keys().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn table_is_populated() {
        let kinds = known_kinds();
        assert!(kinds.len() > 40, "got {} kinds", kinds.len());
        for expected in [
            "threshold",
            "gaussian_blur",
            "canny",
            "erode",
            "resize",
            "clahe",
            "blend",
            "drop_shadow",
            "merge_regions",
        ]
        .iter()
        {
            assert!(kinds.contains(expected), "missing `{}`", expected);
        }
    }

    #[test]
    fn build_round_trip() {
        let filter = build_filter("threshold", &json!({"value": 128})).unwrap();
        assert_eq!(filter.kind(), "threshold");
        assert!(build_filter("no_such_filter", &json!({})).is_err());
        assert!(build_filter("threshold", &json!({"value": 128, "junk": 1})).is_err());
    }
}
