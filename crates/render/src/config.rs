use serde::Deserialize;

/// Engine configuration. Every field has a default, so a host can load a
/// partial table (e.g. from TOML) and leave the rest alone.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RenderConfig {
    /// Encoded bytes coalesced into one chunk before it is yielded. A pending
    /// branch flushes whatever is buffered regardless of this size.
    pub chunk_size: usize,
    pub pool: PoolConfig,
    pub html_cache: HtmlCacheConfig,
    /// Path prefix the server-island fetch script requests content from.
    pub server_island_path: String,
    /// Page renders whose server islands a host keeps for later fetches.
    /// Older pages are forgotten first.
    pub retained_island_pages: usize,
    /// Path prefix for hydration runtime and directive scripts.
    pub hydration_path: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            chunk_size: 8 * 1024,
            pool: PoolConfig::default(),
            html_cache: HtmlCacheConfig::default(),
            server_island_path: "/_server-islands".to_string(),
            retained_island_pages: 256,
            hydration_path: "/_hydration".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PoolConfig {
    /// Free nodes retained for reuse; zero disables pooling.
    pub max_size: usize,
    pub track_stats: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            track_stats: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HtmlCacheConfig {
    /// Stored fragments; zero disables the cache.
    pub capacity: usize,
    /// Pre-populate with common structural markup.
    pub warm: bool,
}

impl Default for HtmlCacheConfig {
    fn default() -> Self {
        Self {
            capacity: html::cache::DEFAULT_CACHE_CAPACITY,
            warm: true,
        }
    }
}
