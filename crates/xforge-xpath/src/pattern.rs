use lru::LruCache;
use regex::Regex;
use std::num::NonZeroUsize;

const DEFAULT_CAPACITY: usize = 256;

/// Translate a `*` wildcard into an anchored regular expression.
pub fn wildcard_to_regex(pattern: &str) -> String {
    let body: Vec<String> = pattern.split('*').map(regex::escape).collect();
    format!("^{}$", body.join(".*"))
}

/// Compiled wildcard patterns, reused across one pass.
pub struct PatternCache {
    compiled: LruCache<String, Regex>,
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PatternCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            compiled: LruCache::new(cap),
        }
    }

    /// Match `text` against a wildcard pattern. Patterns without `*` compare literally.
    pub fn is_match(&mut self, pattern: &str, text: &str) -> bool {
        if !pattern.contains('*') {
            return pattern == text;
        }
        if let Some(re) = self.compiled.get(pattern) {
            return re.is_match(text);
        }
        match Regex::new(&wildcard_to_regex(pattern)) {
            Ok(re) => {
                let hit = re.is_match(text);
                self.compiled.put(pattern.to_string(), re);
                hit
            }
            Err(e) => {
                tracing::warn!(event = "pattern_compile_failed", pattern, error = %e);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards_are_anchored() {
        let mut cache = PatternCache::default();
        assert!(cache.is_match("*ID", "OrderID"));
        assert!(cache.is_match("*ID", "ID"));
        assert!(!cache.is_match("*ID", "IDs"));
        assert!(cache.is_match("Order*", "OrderDate"));
        assert!(!cache.is_match("Order*", "PreOrder"));
        assert!(cache.is_match("*", "anything"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let mut cache = PatternCache::default();
        assert!(cache.is_match("a.b*", "a.bc"));
        assert!(!cache.is_match("a.b*", "axbc"));
    }

    #[test]
    fn compiled_patterns_are_reused() {
        let mut cache = PatternCache::new(2);
        cache.is_match("*A", "xA");
        cache.is_match("*A", "yA");
        cache.is_match("B*", "Bx");
        assert_eq!(cache.len(), 2);
        cache.is_match("C*", "Cx");
        assert_eq!(cache.len(), 2);
        assert!(!cache.is_match("literal", "other"));
    }
}
