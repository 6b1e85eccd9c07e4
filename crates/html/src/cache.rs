//! Value-keyed cache of [`HtmlString`] wrappers for frequently emitted markup.

use std::collections::HashSet;
use std::sync::Arc;

use crate::HtmlString;

/// Cache statistics. Hits and misses only affect cost, never output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Misses that could not be stored because the cache was full.
    pub overflow: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

/// Append-only interning of safe markup fragments.
///
/// Invariant: an entry, once stored, is never replaced or mutated, so a
/// cached wrapper is always byte-identical to a freshly wrapped one.
#[derive(Debug)]
pub struct HtmlStringCache {
    entries: HashSet<HtmlString>,
    capacity: usize,
    stats: CacheStats,
}

pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

impl HtmlStringCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// `capacity` bounds the number of stored fragments; zero disables storage.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashSet::new(),
            capacity,
            stats: CacheStats::default(),
        }
    }

    /// Return the shared wrapper for `raw`, creating and storing it on a miss.
    pub fn wrap(&mut self, raw: &str) -> HtmlString {
        if let Some(hit) = self.entries.get(raw) {
            self.stats.hits += 1;
            return hit.clone();
        }
        self.stats.misses += 1;
        let wrapped = HtmlString::from(Arc::<str>::from(raw));
        if self.entries.len() < self.capacity {
            self.entries.insert(wrapped.clone());
        } else {
            self.stats.overflow += 1;
            log::trace!(target: "html.cache", "cache full, not storing {} bytes", raw.len());
        }
        wrapped
    }

    /// Pre-populate the cache without touching hit/miss counters.
    pub fn warm<'a>(&mut self, patterns: impl IntoIterator<Item = &'a str>) {
        for raw in patterns {
            if self.entries.len() >= self.capacity {
                break;
            }
            if !self.entries.contains(raw) {
                self.entries.insert(HtmlString::from(raw));
            }
        }
    }

    pub fn contains(&self, raw: &str) -> bool {
        self.entries.contains(raw)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for HtmlStringCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Markup fragments that show up in almost every page shell.
pub const COMMON_HTML_PATTERNS: &[&str] = &[
    "<div>", "</div>", "<span>", "</span>", "<p>", "</p>", "<section>", "</section>",
    "<article>", "</article>", "<header>", "</header>", "<footer>", "</footer>", "<nav>",
    "</nav>", "<main>", "</main>", "<aside>", "</aside>", "<ul>", "</ul>", "<ol>", "</ol>",
    "<li>", "</li>", "<br>", "<hr>", "<br/>", "<hr/>", "<h1>", "</h1>", "<h2>", "</h2>",
    "<h3>", "</h3>", "<h4>", "</h4>", "<a>", "</a>", "<strong>", "</strong>", "<em>",
    "</em>", "<code>", "</code>", " ", "\n",
];
