//! The session "always allow" cache (spec §4.3 step 2): canonical
//! patterns the user has approved with `allow_always` for the lifetime
//! of the session.
//!
//! Grounded in the teacher's `AllowanceStore`, narrowed to exact-string
//! membership rather than pattern objects — the spec's canonicalization
//! already folds arguments into a stable string, so equality is a plain
//! set lookup (spec §6.5: "equality is exact string match").

use std::collections::HashSet;
use std::sync::RwLock;

/// Per-session cache of canonical patterns approved via `allow_always`.
pub struct ApprovalCache {
    patterns: RwLock<HashSet<String>>,
}

impl ApprovalCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            patterns: RwLock::new(HashSet::new()),
        }
    }

    /// Check whether a canonical pattern has already been approved.
    #[must_use]
    pub fn contains(&self, canonical_pattern: &str) -> bool {
        self.patterns
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(canonical_pattern)
    }

    /// Remember a canonical pattern as always-allowed for this session.
    pub fn insert(&self, canonical_pattern: impl Into<String>) {
        self.patterns
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(canonical_pattern.into());
    }

    /// Number of approved patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the cache holds no approvals.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ApprovalCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ApprovalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalCache")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cache_contains_nothing() {
        let cache = ApprovalCache::new();
        assert!(!cache.contains("Bash(command:git status*)"));
        assert!(cache.is_empty());
    }

    #[test]
    fn inserted_pattern_is_found() {
        let cache = ApprovalCache::new();
        cache.insert("Bash(command:git status*)");
        assert!(cache.contains("Bash(command:git status*)"));
        assert!(!cache.contains("Bash(command:git push*)"));
        assert_eq!(cache.len(), 1);
    }
}
