//! Addressing grammars for XML elements and attributes.
//!
//! Five grammars are understood (absolute `/a/b[2]`, dot-notation `a.b`,
//! bare names, attribute suffixes `name@attr`, namespace-qualified
//! `{ns}name`) plus `*` wildcard variants of each. [`precedence`] ranks them
//! so that a more specific address always beats a more general one.

mod expr;
mod index;
mod pattern;

use std::collections::HashMap;

use xforge_core::CoreResult;
use xforge_parsers_xml::{Document, NodeId};

pub use expr::{normalize, parse, precedence, PathExpression, PathKind, Precedence, Shape, Step};
pub use index::{ElementIndex, IndexEntry, Link};
pub use pattern::{wildcard_to_regex, PatternCache};

/// Parses and resolves addresses, keeping compiled wildcards between calls.
#[derive(Default)]
pub struct PathResolver {
    prefixes: HashMap<String, String>,
    cache: PatternCache,
}

impl PathResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver that also accepts configured prefix aliases in `{ns}` qualifiers.
    pub fn with_prefixes(prefixes: HashMap<String, String>) -> Self {
        Self {
            prefixes,
            cache: PatternCache::default(),
        }
    }

    pub fn prefixes(&self) -> &HashMap<String, String> {
        &self.prefixes
    }

    pub fn parse(&self, text: &str) -> CoreResult<PathExpression> {
        parse(text)
    }

    /// One-off resolution against a tree. Zero matches is not an error.
    pub fn resolve(&mut self, doc: &Document, expr: &PathExpression) -> Vec<NodeId> {
        let index = ElementIndex::build(doc);
        self.resolve_in(&index, expr)
    }

    /// Resolution against a prebuilt index.
    pub fn resolve_in(&mut self, index: &ElementIndex, expr: &PathExpression) -> Vec<NodeId> {
        let hits = index.resolve(expr, &self.prefixes, &mut self.cache);
        tracing::trace!(event = "path_resolved", path = %expr, matches = hits.len());
        hits
    }

    /// Wildcard-aware name comparison sharing this resolver's cache.
    pub fn name_matches(&mut self, pattern: &str, name: &str) -> bool {
        self.cache.is_match(pattern, name)
    }
}
