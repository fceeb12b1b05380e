//! File-conflict detection between tasks.
//!
//! Two tasks conflict when their text references the same file. The
//! scheduler recomputes the conflict graph on every pass (membership of
//! the running set changes each time), so path extraction caches per
//! input text to keep repeated scans cheap.

use armada_core::Task;
use lru::LruCache;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Path tokens start at a recognizable top-level directory and end in a
/// known source or config extension.
const PATH_PATTERN: &str = concat!(
    r"(?:src|lib|app|apps|test|tests|spec|packages|pkg|components|pages|api|",
    r"server|client|config|scripts|docs|crates|styles|utils|public|migrations)",
    r"(?:/[A-Za-z0-9_.\-]+)+",
    r"\.(?:rs|ts|tsx|js|jsx|mjs|py|go|rb|java|kt|c|h|cpp|css|scss|html|json|",
    r"yaml|yml|toml|md|sql|sh)",
);

const CACHE_CAPACITY: usize = 256;
const CACHE_TTL: Duration = Duration::from_secs(60);

struct CacheEntry {
    paths: HashSet<String>,
    cached_at: Instant,
}

/// Extracts file references from task text and derives the symmetric
/// conflict graph over a task set.
pub struct ConflictDetector {
    bare: Regex,
    backticked: Regex,
    quoted: Regex,
    cache: Mutex<LruCache<String, CacheEntry>>,
}

impl ConflictDetector {
    /// Create a detector with a fresh extraction cache.
    pub fn new() -> Self {
        // The pattern is a compile-time constant; construction cannot fail.
        let bare = Regex::new(&format!(r"(^|[\s(,:>])({PATH_PATTERN})"))
            .expect("bare path pattern");
        let backticked =
            Regex::new(&format!(r"`({PATH_PATTERN})`")).expect("backticked path pattern");
        let quoted = Regex::new(&format!("\"({PATH_PATTERN})\"")).expect("quoted path pattern");
        Self {
            bare,
            backticked,
            quoted,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("nonzero capacity"),
            )),
        }
    }

    /// Extract the set of file paths referenced by `text`.
    ///
    /// Results are cached keyed by the exact input text, bounded by an LRU
    /// and a TTL - the same task text is re-scanned on every scheduling
    /// pass.
    pub fn extract_file_paths(&self, text: &str) -> HashSet<String> {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(entry) = cache.get(text) {
                if entry.cached_at.elapsed() < CACHE_TTL {
                    return entry.paths.clone();
                }
                cache.pop(text);
            }
        }

        let mut paths = HashSet::new();
        for caps in self.bare.captures_iter(text) {
            if let Some(m) = caps.get(2) {
                paths.insert(m.as_str().to_string());
            }
        }
        for re in [&self.backticked, &self.quoted] {
            for caps in re.captures_iter(text) {
                if let Some(m) = caps.get(1) {
                    paths.insert(m.as_str().to_string());
                }
            }
        }

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(
                text.to_string(),
                CacheEntry {
                    paths: paths.clone(),
                    cached_at: Instant::now(),
                },
            );
        }

        paths
    }

    /// Build the symmetric conflict map over `tasks`.
    ///
    /// Returns task id -> ids of tasks referencing at least one common
    /// file; empty when nothing is shared.
    pub fn detect_conflicts<'a, I>(&self, tasks: I) -> HashMap<u64, HashSet<u64>>
    where
        I: IntoIterator<Item = &'a Task>,
    {
        let mut owners_by_file: HashMap<String, Vec<u64>> = HashMap::new();
        for task in tasks {
            for path in self.extract_file_paths(&task.combined_text()) {
                owners_by_file.entry(path).or_default().push(task.id);
            }
        }

        let mut conflicts: HashMap<u64, HashSet<u64>> = HashMap::new();
        for owners in owners_by_file.values() {
            if owners.len() < 2 {
                continue;
            }
            for (i, &a) in owners.iter().enumerate() {
                for &b in &owners[i + 1..] {
                    if a == b {
                        continue;
                    }
                    conflicts.entry(a).or_default().insert(b);
                    conflicts.entry(b).or_default().insert(a);
                }
            }
        }

        conflicts
    }

    /// Whether two tasks reference at least one common file.
    pub fn has_conflict(&self, a: &Task, b: &Task) -> bool {
        let paths_a = self.extract_file_paths(&a.combined_text());
        if paths_a.is_empty() {
            return false;
        }
        let paths_b = self.extract_file_paths(&b.combined_text());
        paths_a.intersection(&paths_b).next().is_some()
    }
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::new()
    }
}
