//! Per-category reliability coefficients.

use super::overrides::{OverrideError, ReliabilityOverrideFile};
use crate::watch::FileWatch;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use sw_observability::EngineMetrics;
use tracing::{debug, error, info, instrument, warn};

/// Coefficient returned for categories with no exact or fuzzy match.
pub const DEFAULT_COEFFICIENT: f64 = 0.75;
/// Lowest coefficient the catalog will hold.
pub const MIN_COEFFICIENT: f64 = 0.5;
/// Highest coefficient the catalog will hold.
pub const MAX_COEFFICIENT: f64 = 1.0;

/// Built-in coefficients for known rule categories.
const BUILT_IN: &[(&str, f64)] = &[
    ("spelling", 0.95),
    ("grammar", 0.90),
    ("punctuation", 0.88),
    ("capitalization", 0.88),
    ("claims", 0.85),
    ("terminology", 0.85),
    ("commands", 0.85),
    ("abbreviations", 0.84),
    ("inclusive_language", 0.84),
    ("numbers", 0.82),
    ("second_person", 0.82),
    ("passive_voice", 0.80),
    ("verbs", 0.80),
    ("word_usage", 0.78),
    ("contractions", 0.78),
    ("sentence_length", 0.75),
    ("ambiguity", 0.72),
    ("tone", 0.70),
    ("conversational_style", 0.70),
    ("readability", 0.68),
];

/// Reporting band derived from a coefficient.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ReliabilityBand {
    High,
    MediumHigh,
    Medium,
    MediumLow,
}

impl ReliabilityBand {
    /// Classifies a coefficient.
    pub fn for_coefficient(coefficient: f64) -> Self {
        if coefficient >= 0.85 {
            ReliabilityBand::High
        } else if coefficient >= 0.80 {
            ReliabilityBand::MediumHigh
        } else if coefficient >= 0.70 {
            ReliabilityBand::Medium
        } else {
            ReliabilityBand::MediumLow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReliabilityBand::High => "high",
            ReliabilityBand::MediumHigh => "medium_high",
            ReliabilityBand::Medium => "medium",
            ReliabilityBand::MediumLow => "medium_low",
        }
    }
}

impl std::fmt::Display for ReliabilityBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category and coefficient pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReliabilityEntry {
    pub category: String,
    pub coefficient: f64,
}

/// Result of applying an override file to the catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideLoadSummary {
    /// Categories whose coefficient was taken from the file.
    pub applied: Vec<String>,
    /// Categories whose value was out of range and ignored.
    pub rejected: Vec<String>,
    /// False if the file was missing or malformed and nothing changed.
    pub loaded: bool,
}

/// Table of trust coefficients per rule category.
///
/// Lookups read an `Arc` snapshot of the table; loading overrides builds a
/// new table and swaps the reference, so readers are never blocked for
/// longer than the swap.
pub struct ReliabilityCatalog {
    /// Coefficients the catalog was built with; overrides apply on top.
    base: Arc<HashMap<String, f64>>,
    table: RwLock<TableSnapshot>,
    cache: RwLock<LookupCache>,
    watch: Mutex<Option<FileWatch>>,
    metrics: EngineMetrics,
}

#[derive(Clone, Default)]
struct TableSnapshot {
    generation: u64,
    values: Arc<HashMap<String, f64>>,
}

/// Resolved lookups, valid only for the table generation they were computed on.
#[derive(Default)]
struct LookupCache {
    generation: u64,
    values: HashMap<String, f64>,
}

impl ReliabilityCatalog {
    /// Creates a catalog holding the built-in coefficients.
    pub fn new() -> Self {
        let table = BUILT_IN
            .iter()
            .map(|(category, coefficient)| (category.to_string(), *coefficient))
            .collect();
        Self::with_table(table)
    }

    /// Creates a catalog from an explicit table, clamping values into range.
    pub fn with_table(table: HashMap<String, f64>) -> Self {
        let table: HashMap<String, f64> = table
            .into_iter()
            .map(|(k, v)| (normalize(&k), v.clamp(MIN_COEFFICIENT, MAX_COEFFICIENT)))
            .collect();
        let base = Arc::new(table);
        Self {
            table: RwLock::new(TableSnapshot {
                generation: 0,
                values: Arc::clone(&base),
            }),
            base,
            cache: RwLock::new(LookupCache::default()),
            watch: Mutex::new(None),
            metrics: EngineMetrics::new(),
        }
    }

    /// Creates a built-in catalog and applies the override file at `path`,
    /// watching it for later changes.
    pub fn with_overrides(path: impl AsRef<Path>) -> Self {
        let catalog = Self::new();
        catalog.watch_overrides(path);
        catalog
    }

    /// Starts watching `path`, loading it immediately.
    pub fn watch_overrides(&self, path: impl AsRef<Path>) {
        let mut watch = FileWatch::new(path.as_ref());
        let observed = watch.current_modified();
        self.load_overrides(watch.path());
        watch.mark_loaded(observed);
        *self.watch.lock().unwrap_or_else(PoisonError::into_inner) = Some(watch);
    }

    /// Returns the coefficient for a category.
    ///
    /// Exact match first, then the longest known key that contains or is
    /// contained by the category, then [`DEFAULT_COEFFICIENT`]. Never fails.
    pub fn coefficient_for(&self, category: &str) -> f64 {
        if let Some(cached) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values
            .get(category)
        {
            return *cached;
        }

        let snapshot = self.snapshot();
        let table = &snapshot.values;
        let key = normalize(category);
        let coefficient = match table.get(&key) {
            Some(value) => *value,
            None => fuzzy_match(table, &key)
                .map(|(matched, value)| {
                    debug!(category = %category, matched = %matched, "Fuzzy reliability match");
                    value
                })
                .unwrap_or(DEFAULT_COEFFICIENT),
        };
        let coefficient = coefficient.clamp(MIN_COEFFICIENT, MAX_COEFFICIENT);

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if cache.generation == snapshot.generation {
            cache.values.insert(category.to_string(), coefficient);
        }
        coefficient
    }

    /// Returns the reporting band for a category.
    pub fn category_band(&self, category: &str) -> ReliabilityBand {
        ReliabilityBand::for_coefficient(self.coefficient_for(category))
    }

    /// Returns all known entries sorted by category.
    pub fn entries(&self) -> Vec<ReliabilityEntry> {
        let snapshot = self.snapshot();
        let sorted: BTreeMap<_, _> = snapshot.values.iter().collect();
        sorted
            .into_iter()
            .map(|(category, coefficient)| ReliabilityEntry {
                category: category.clone(),
                coefficient: *coefficient,
            })
            .collect()
    }

    /// Returns true if the category has an exact entry.
    pub fn contains(&self, category: &str) -> bool {
        self.snapshot().values.contains_key(&normalize(category))
    }

    /// Applies coefficients from an override file.
    ///
    /// The file replaces any earlier overrides: categories it does not list
    /// return to their built-in value. Values outside [0.5, 1.0] are rejected
    /// and the built-in value kept.
    /// A missing or malformed file leaves the table untouched.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load_overrides(&self, path: impl AsRef<Path>) -> OverrideLoadSummary {
        let path = path.as_ref();
        let file = match ReliabilityOverrideFile::read(path) {
            Ok(file) => file,
            Err(OverrideError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                info!(path = %path.display(), "No reliability override file, keeping current table");
                return OverrideLoadSummary::default();
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to load reliability overrides");
                self.metrics.record_config_reload("reliability_catalog", false);
                return OverrideLoadSummary::default();
            }
        };

        let summary = self.apply_overrides(&file.reliability_overrides);
        self.metrics.record_config_reload("reliability_catalog", true);
        info!(
            path = %path.display(),
            applied = summary.applied.len(),
            rejected = summary.rejected.len(),
            "Reliability overrides loaded"
        );
        summary
    }

    /// Applies an in-memory override map on top of the built-in table, with
    /// the same validation as a file.
    pub fn apply_overrides(&self, overrides: &BTreeMap<String, f64>) -> OverrideLoadSummary {
        let mut summary = OverrideLoadSummary {
            loaded: true,
            ..Default::default()
        };

        let mut next = (*self.base).clone();
        for (category, value) in overrides {
            if !value.is_finite() || !(MIN_COEFFICIENT..=MAX_COEFFICIENT).contains(value) {
                warn!(
                    category = %category,
                    value = *value,
                    "Rejected out-of-range reliability override, keeping built-in value"
                );
                summary.rejected.push(category.clone());
                continue;
            }
            next.insert(normalize(category), *value);
            summary.applied.push(category.clone());
        }

        let generation = {
            let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
            table.generation += 1;
            table.values = Arc::new(next);
            table.generation
        };
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.generation = generation;
        cache.values.clear();
        summary
    }

    /// Reloads the watched override file if it changed since the last load.
    ///
    /// Returns true if a reload was attempted.
    pub fn reload_if_changed(&self) -> bool {
        let mut guard = self.watch.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(watch) = guard.as_mut() else {
            return false;
        };
        let Some(observed) = watch.poll() else {
            return false;
        };

        debug!(path = %watch.path().display(), "Reliability override file changed");
        self.load_overrides(watch.path());
        watch.mark_loaded(observed);
        true
    }

    /// Number of cached lookups.
    pub fn cache_len(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values
            .len()
    }

    fn snapshot(&self) -> TableSnapshot {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for ReliabilityCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReliabilityCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReliabilityCatalog")
            .field("entries", &self.snapshot().values.len())
            .field("cached", &self.cache_len())
            .finish()
    }
}

/// Normalizes a category id: lowercase, `-` and spaces to `_`.
pub fn normalize(category: &str) -> String {
    category.trim().to_lowercase().replace(['-', ' '], "_")
}

/// Longest key containing or contained by `key`; ties break lexicographically.
fn fuzzy_match<'a>(table: &'a HashMap<String, f64>, key: &str) -> Option<(&'a str, f64)> {
    if key.is_empty() {
        return None;
    }
    table
        .iter()
        .filter(|(known, _)| key.contains(known.as_str()) || known.contains(key))
        .min_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)))
        .map(|(known, value)| (known.as_str(), *value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reliability::overrides::OverrideMetadata;
    use tempfile::tempdir;

    #[test]
    fn test_exact_lookup() {
        let catalog = ReliabilityCatalog::new();
        assert_eq!(catalog.coefficient_for("spelling"), 0.95);
        assert_eq!(catalog.coefficient_for("Passive-Voice"), 0.80);
    }

    #[test]
    fn test_fuzzy_lookup_prefers_longest_key() {
        let catalog = ReliabilityCatalog::new();
        // contains "verbs" and "passive_voice"; the longer key wins
        assert_eq!(catalog.coefficient_for("passive_voice_verbs"), 0.80);
        assert_eq!(catalog.coefficient_for("legal_claims"), 0.85);
        // contained by a known key
        assert_eq!(catalog.coefficient_for("spell"), 0.95);
    }

    #[test]
    fn test_unknown_category_uses_default() {
        let catalog = ReliabilityCatalog::new();
        assert_eq!(catalog.coefficient_for("xyzzy"), DEFAULT_COEFFICIENT);
        assert_eq!(catalog.coefficient_for(""), DEFAULT_COEFFICIENT);
    }

    #[test]
    fn test_coefficients_always_in_range() {
        let mut table = HashMap::new();
        table.insert("low".to_string(), 0.1);
        table.insert("high".to_string(), 3.0);
        let catalog = ReliabilityCatalog::with_table(table);

        for category in ["low", "high", "unknown", "lower", "highlight", ""] {
            let c = catalog.coefficient_for(category);
            assert!((MIN_COEFFICIENT..=MAX_COEFFICIENT).contains(&c), "{category}: {c}");
        }
    }

    #[test]
    fn test_bands() {
        assert_eq!(ReliabilityBand::for_coefficient(0.85), ReliabilityBand::High);
        assert_eq!(ReliabilityBand::for_coefficient(0.80), ReliabilityBand::MediumHigh);
        assert_eq!(ReliabilityBand::for_coefficient(0.70), ReliabilityBand::Medium);
        assert_eq!(ReliabilityBand::for_coefficient(0.69), ReliabilityBand::MediumLow);

        let catalog = ReliabilityCatalog::new();
        assert_eq!(catalog.category_band("spelling"), ReliabilityBand::High);
        assert_eq!(catalog.category_band("ambiguity"), ReliabilityBand::Medium);
    }

    #[test]
    fn test_load_overrides_rejects_out_of_range() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("overrides.yaml");
        std::fs::write(
            &path,
            "reliability_overrides:\n  drop: 1.5\n  commands: 0.88\n",
        )
        .unwrap();

        let mut table = HashMap::new();
        table.insert("drop".to_string(), 0.77);
        table.insert("commands".to_string(), 0.85);
        let catalog = ReliabilityCatalog::with_table(table);
        assert_eq!(catalog.coefficient_for("commands"), 0.85);

        let summary = catalog.load_overrides(&path);
        assert!(summary.loaded);
        assert_eq!(summary.rejected, vec!["drop".to_string()]);
        assert_eq!(catalog.coefficient_for("drop"), 0.77);
        assert_eq!(catalog.coefficient_for("commands"), 0.88);
    }

    #[test]
    fn test_overrides_keep_unlisted_defaults() {
        let catalog = ReliabilityCatalog::new();
        let mut overrides = BTreeMap::new();
        overrides.insert("claims".to_string(), 0.83);
        catalog.apply_overrides(&overrides);

        assert_eq!(catalog.coefficient_for("claims"), 0.83);
        assert_eq!(catalog.coefficient_for("spelling"), 0.95);
    }

    #[test]
    fn test_reload_drops_categories_missing_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("overrides.yaml");
        std::fs::write(&path, "reliability_overrides:\n  claims: 0.83\n").unwrap();
        let catalog = ReliabilityCatalog::new();
        catalog.load_overrides(&path);
        assert_eq!(catalog.coefficient_for("claims"), 0.83);

        std::fs::write(&path, "reliability_overrides:\n  commands: 0.88\n").unwrap();
        catalog.load_overrides(&path);
        assert_eq!(catalog.coefficient_for("commands"), 0.88);
        assert_eq!(catalog.coefficient_for("claims"), 0.85);

        // an out-of-range value falls back to the built-in value, not the last override
        std::fs::write(&path, "reliability_overrides:\n  commands: 1.5\n").unwrap();
        let summary = catalog.load_overrides(&path);
        assert_eq!(summary.rejected, vec!["commands".to_string()]);
        assert_eq!(catalog.coefficient_for("commands"), 0.85);
    }

    #[test]
    fn test_missing_and_malformed_files_keep_table() {
        let dir = tempdir().unwrap();
        let catalog = ReliabilityCatalog::new();

        let summary = catalog.load_overrides(dir.path().join("absent.yaml"));
        assert!(!summary.loaded);
        assert_eq!(catalog.coefficient_for("claims"), 0.85);

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "reliability_overrides: [1, 2").unwrap();
        let summary = catalog.load_overrides(&bad);
        assert!(!summary.loaded);
        assert_eq!(catalog.coefficient_for("claims"), 0.85);
    }

    #[test]
    fn test_written_file_round_trips_into_fresh_catalog() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("overrides.yaml");
        let mut overrides = BTreeMap::new();
        overrides.insert("claims".to_string(), 0.8312345678901234);
        overrides.insert("tone".to_string(), 0.7123);
        overrides.insert("broken".to_string(), 0.2);
        ReliabilityOverrideFile::new(OverrideMetadata::now(), overrides)
            .write_atomic(&path)
            .unwrap();

        let catalog = ReliabilityCatalog::with_overrides(&path);
        assert_eq!(catalog.coefficient_for("claims"), 0.8312345678901234);
        assert_eq!(catalog.coefficient_for("tone"), 0.7123);
        assert!(!catalog.contains("broken"));
    }

    #[test]
    fn test_reload_clears_cache() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("overrides.yaml");
        let catalog = ReliabilityCatalog::with_overrides(&path);
        assert_eq!(catalog.coefficient_for("claims"), 0.85);
        assert!(catalog.cache_len() > 0);
        assert!(!catalog.reload_if_changed());

        std::fs::write(&path, "reliability_overrides:\n  claims: 0.9\n").unwrap();
        assert!(catalog.reload_if_changed());
        assert_eq!(catalog.coefficient_for("claims"), 0.9);
    }

    #[test]
    fn test_concurrent_lookups_during_reload() {
        let catalog = ReliabilityCatalog::new();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..200 {
                        let c = catalog.coefficient_for("claims");
                        assert!(c == 0.85 || c == 0.83);
                    }
                });
            }
            s.spawn(|| {
                let mut overrides = BTreeMap::new();
                overrides.insert("claims".to_string(), 0.83);
                for _ in 0..50 {
                    catalog.apply_overrides(&overrides);
                }
            });
        });
        assert_eq!(catalog.coefficient_for("claims"), 0.83);
    }
}
