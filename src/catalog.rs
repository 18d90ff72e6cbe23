//! Reading and writing key/value translation catalogs
//!
//! Catalogs are nested JSON objects on disk, one file per language
//! (`en.json`, `de.json`, ...). For processing they are flattened to
//! dot-separated keys and unflattened again on write; the round trip
//! preserves nesting depth exactly.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{Result, TransmemError};

/// A flattened catalog: dot-joined keys mapped to leaf values.
///
/// `serde_json::Map` preserves insertion order (the `preserve_order`
/// feature), which is what keeps merges stable: existing keys keep their
/// position, new keys append.
pub type FlatCatalog = Map<String, Value>;

/// All catalogs of a directory, keyed by language code.
pub type CatalogSet = BTreeMap<String, FlatCatalog>;

/// Separator joining nesting levels in flattened keys.
pub const KEY_SEPARATOR: char = '.';

/// Flatten a nested JSON object into dot-joined keys
///
/// Leaves are any non-object values plus empty objects (an empty mapping
/// is a meaningful "missing" marker and must round-trip).
///
/// # Example
///
/// ```ignore
/// let nested = serde_json::json!({"a": {"b": "x"}});
/// let flat = flatten(&nested);
/// assert_eq!(flat.get("a.b"), Some(&serde_json::json!("x")));
/// ```
pub fn flatten(nested: &Value) -> FlatCatalog {
    let mut flat = FlatCatalog::new();
    match nested {
        Value::Object(map) => {
            for (key, value) in map {
                flatten_into(&mut flat, key, value);
            }
        }
        // A non-object root flattens to nothing; catalogs are objects.
        _ => {}
    }
    flat
}

fn flatten_into(flat: &mut FlatCatalog, prefix: &str, value: &Value) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                let joined = format!("{}{}{}", prefix, KEY_SEPARATOR, key);
                flatten_into(flat, &joined, child);
            }
        }
        _ => {
            flat.insert(prefix.to_string(), value.clone());
        }
    }
}

/// Rebuild a nested JSON object from dot-joined keys
///
/// Inverse of [`flatten`] for any catalog whose leaf keys contain no
/// separator character. Intermediate levels are created as objects; if a
/// key path runs through an existing leaf, the leaf is replaced by an
/// object (last write wins).
pub fn unflatten(flat: &FlatCatalog) -> Value {
    let mut root = Map::new();

    for (key, value) in flat {
        let mut segments = key.split(KEY_SEPARATOR).collect::<Vec<_>>();
        let leaf = segments.pop().unwrap_or(key.as_str());

        let mut cursor = &mut root;
        for segment in segments {
            let entry = cursor
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            cursor = entry
                .as_object_mut()
                .expect("entry was just coerced to an object");
        }
        cursor.insert(leaf.to_string(), value.clone());
    }

    Value::Object(root)
}

/// Read a single catalog file into its flattened form
///
/// # Errors
///
/// Missing file, unreadable file, invalid JSON, or a non-object root.
pub fn read_catalog(path: &Path) -> Result<FlatCatalog> {
    let content = fs::read_to_string(path).map_err(|e| {
        TransmemError::Config(format!("cannot read catalog '{}': {}", path.display(), e))
    })?;

    let value: Value = serde_json::from_str(&content).map_err(|e| {
        TransmemError::Config(format!("invalid JSON in '{}': {}", path.display(), e))
    })?;

    if !value.is_object() {
        return Err(TransmemError::Config(format!(
            "catalog '{}' must be a JSON object",
            path.display()
        )));
    }

    Ok(flatten(&value))
}

/// Read every `*.json` catalog in a directory
///
/// The file stem is taken as the language code (`de.json` → `de`).
/// Unreadable or malformed files are skipped with a warning; a missing
/// directory yields an empty set.
pub fn read_catalog_dir(dir: &Path) -> Result<CatalogSet> {
    let mut catalogs = CatalogSet::new();

    if !dir.exists() {
        return Ok(catalogs);
    }

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }

        let Some(lang) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };

        match read_catalog(&path) {
            Ok(flat) => {
                catalogs.insert(lang.to_string(), flat);
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "skipping unreadable catalog");
            }
        }
    }

    Ok(catalogs)
}

/// Write a flattened catalog back to disk as nested, pretty JSON
///
/// UTF-8, non-ASCII characters unescaped, trailing newline. Parent
/// directories are created as needed.
pub fn write_catalog(path: &Path, flat: &FlatCatalog) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let nested = unflatten(flat);
    let mut serialized = serde_json::to_string_pretty(&nested)?;
    serialized.push('\n');
    fs::write(path, serialized)?;
    Ok(())
}
