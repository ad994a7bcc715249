//! Database configuration.

/// How commits reach durable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Durability {
    /// Every commit is synced to disk before it becomes visible.
    #[default]
    Full,
    /// Nothing touches the file system. Data lives while a handle on the path is open.
    MemOnly,
    /// Commits are flushed to the OS; syncing is deferred to close, compaction
    /// and explicit `sync` calls.
    Async,
}

impl Durability {
    /// Whether the file system is used at all.
    #[must_use]
    pub const fn is_persistent(self) -> bool {
        !matches!(self, Self::MemOnly)
    }
}

/// Configuration for opening a database file.
///
/// The first handle to open a path fixes its configuration; later handles on
/// the same path must agree on durability.
#[derive(Debug, Clone)]
pub struct Config {
    /// Durability policy.
    pub durability: Durability,

    /// Whether to create the file if it doesn't exist.
    pub create_if_missing: bool,

    /// Log size that triggers compaction after a commit (0 = never).
    pub max_log_size: u64,

    /// Number of change events kept for late subscribers and listeners.
    pub history_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            durability: Durability::Full,
            create_if_missing: true,
            max_log_size: 16 * 1024 * 1024, // 16 MB
            history_limit: 1024,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the durability policy.
    #[must_use]
    pub const fn durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    /// Sets whether to create the file if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the auto-compaction threshold.
    #[must_use]
    pub const fn max_log_size(mut self, size: u64) -> Self {
        self.max_log_size = size;
        self
    }

    /// Sets how many change events are retained.
    #[must_use]
    pub const fn history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }
}
