//! Merging accepted translations back into target catalogs
//!
//! Merge reads memory records but never mutates them. The conflict
//! policy is non-destructive: an existing non-empty value is never
//! clobbered unless `force` is set. Existing keys keep their position in
//! the catalog, new keys append, so merges are stable and incremental.

use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::catalog::{self, FlatCatalog};
use crate::error::Result;
use crate::memory::{MemoryRecord, is_missing};

/// Statistics of one merge pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeStats {
    pub updated: u64,
    pub skipped: u64,
    pub errors: Vec<String>,
}

/// Apply memory values for `target_lang` onto an existing flat catalog
///
/// For each record holding a non-missing value: the value is written
/// when the key is absent, its existing value is missing, or `force` is
/// set; otherwise the key is counted as skipped.
pub fn merge(
    records: &[MemoryRecord],
    target_lang: &str,
    existing: &FlatCatalog,
    force: bool,
) -> (FlatCatalog, MergeStats) {
    let mut merged = existing.clone();
    let mut stats = MergeStats::default();

    for record in records {
        let Some(new_value) = record.targets.get(target_lang) else {
            continue;
        };
        if is_missing(new_value) {
            continue;
        }

        if let Some(existing_value) = merged.get(&record.key) {
            if !force && !is_missing(existing_value) {
                stats.skipped += 1;
                continue;
            }
        }

        merged.insert(record.key.clone(), new_value.clone());
        stats.updated += 1;
    }

    (merged, stats)
}

/// Merge memory values into the catalog file for one language
///
/// Reads the target catalog (absent file → empty catalog), merges, and
/// writes the re-nested result back.
pub fn merge_into_catalog(
    records: &[MemoryRecord],
    target_lang: &str,
    catalog_path: &Path,
    force: bool,
) -> Result<MergeStats> {
    let existing = if catalog_path.exists() {
        catalog::read_catalog(catalog_path)?
    } else {
        FlatCatalog::new()
    };

    let (merged, stats) = merge(records, target_lang, &existing, force);
    catalog::write_catalog(catalog_path, &merged)?;

    debug!(
        target_lang,
        updated = stats.updated,
        skipped = stats.skipped,
        "merged translations into catalog"
    );

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogSet;
    use crate::memory::build_memory;
    use serde_json::json;

    fn records_with_value(key: &str, lang: &str, value: Value) -> Vec<MemoryRecord> {
        let mut catalogs = CatalogSet::new();
        catalogs.insert("sv".to_string(), {
            let mut m = FlatCatalog::new();
            m.insert(key.to_string(), json!("källa"));
            m
        });
        catalogs.insert(lang.to_string(), {
            let mut m = FlatCatalog::new();
            m.insert(key.to_string(), value);
            m
        });
        build_memory(&catalogs, "sv").unwrap()
    }

    fn flat(pairs: &[(&str, Value)]) -> FlatCatalog {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    // ========== Conflict Policy Tests ==========

    #[test]
    fn test_merge_fills_absent_key() {
        let records = records_with_value("a", "en", json!("hello"));
        let (merged, stats) = merge(&records, "en", &FlatCatalog::new(), false);
        assert_eq!(merged.get("a"), Some(&json!("hello")));
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.skipped, 0);
    }

    #[test]
    fn test_merge_fills_missing_existing_value() {
        let records = records_with_value("a", "en", json!("hello"));
        let existing = flat(&[("a", Value::Null)]);
        let (merged, stats) = merge(&records, "en", &existing, false);
        assert_eq!(merged.get("a"), Some(&json!("hello")));
        assert_eq!(stats.updated, 1);
    }

    #[test]
    fn test_merge_never_clobbers_without_force() {
        let records = records_with_value("a", "en", json!("from memory"));
        let existing = flat(&[("a", json!("already here"))]);
        let (merged, stats) = merge(&records, "en", &existing, false);
        assert_eq!(merged.get("a"), Some(&json!("already here")));
        assert_eq!(stats.updated, 0);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_merge_force_overwrites() {
        let records = records_with_value("a", "en", json!("from memory"));
        let existing = flat(&[("a", json!("already here"))]);
        let (merged, stats) = merge(&records, "en", &existing, true);
        assert_eq!(merged.get("a"), Some(&json!("from memory")));
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.skipped, 0);
    }

    #[test]
    fn test_merge_skips_missing_memory_values() {
        let records = records_with_value("a", "en", Value::Null);
        let (merged, stats) = merge(&records, "en", &FlatCatalog::new(), false);
        assert!(merged.is_empty());
        assert_eq!(stats.updated, 0);
    }

    #[test]
    fn test_merge_ignores_unrelated_language() {
        let records = records_with_value("a", "en", json!("hello"));
        let (merged, stats) = merge(&records, "de", &FlatCatalog::new(), false);
        assert!(merged.is_empty());
        assert_eq!(stats.updated, 0);
    }

    #[test]
    fn test_merge_preserves_existing_order_and_appends_new() {
        let mut catalogs = CatalogSet::new();
        catalogs.insert("sv".to_string(), {
            let mut m = FlatCatalog::new();
            m.insert("zz.new".to_string(), json!("ny"));
            m
        });
        catalogs.insert("en".to_string(), {
            let mut m = FlatCatalog::new();
            m.insert("zz.new".to_string(), json!("fresh"));
            m
        });
        let records = build_memory(&catalogs, "sv").unwrap();

        let existing = flat(&[("zz.old", json!("kept")), ("aa.other", json!("kept too"))]);
        let (merged, _) = merge(&records, "en", &existing, false);

        let order: Vec<&str> = merged.keys().map(String::as_str).collect();
        assert_eq!(order, vec!["zz.old", "aa.other", "zz.new"]);
    }

    // ========== File-Level Tests ==========

    #[test]
    fn test_merge_into_catalog_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("en.json");
        std::fs::write(&path, r#"{"a": {"kept": "yes", "filled": null}}"#).unwrap();

        let mut catalogs = CatalogSet::new();
        catalogs.insert("sv".to_string(), {
            let mut m = FlatCatalog::new();
            m.insert("a.kept".to_string(), json!("behållen"));
            m.insert("a.filled".to_string(), json!("fylld"));
            m
        });
        catalogs.insert("en".to_string(), {
            let mut m = FlatCatalog::new();
            m.insert("a.kept".to_string(), json!("memory kept"));
            m.insert("a.filled".to_string(), json!("filled in"));
            m
        });
        let records = build_memory(&catalogs, "sv").unwrap();

        let stats = merge_into_catalog(&records, "en", &path, false).unwrap();
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.skipped, 1);

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, json!({"a": {"kept": "yes", "filled": "filled in"}}));
    }

    #[test]
    fn test_merge_into_absent_catalog_creates_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/de.json");

        let records = records_with_value("x.y", "de", json!("wert"));
        let stats = merge_into_catalog(&records, "de", &path, false).unwrap();
        assert_eq!(stats.updated, 1);

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, json!({"x": {"y": "wert"}}));
    }
}
