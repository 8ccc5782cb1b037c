use std::collections::HashMap;

use xforge_config::{
    AttributeEntry, AttributeSelector, ConfigDocument, NamespaceRules, Row, TemplateRef, ValueEntry, ValueSpec,
};
use xforge_core::{CoreResult, Issue, IssueKind};
use xforge_parsers_xml::{Document, NodeId, QName};
use xforge_templates::TemplateEngine;
use xforge_xpath::{precedence, ElementIndex, PathExpression, PathResolver, Precedence};

use crate::generators::ValueGenerator;
use crate::values::{try_resolve, RowSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Values,
    Patterns,
    Templates,
    Attributes,
    Namespaces,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Values => "values",
            Phase::Patterns => "patterns",
            Phase::Templates => "templates",
            Phase::Attributes => "attributes",
            Phase::Namespaces => "namespaces",
        }
    }
}

/// What one override pass did.
#[derive(Debug, Clone, Default)]
pub struct ActionLog {
    /// `values: Amount = 42 (3 targets)`
    pub applied: Vec<String>,
    /// Misses and shadowed writes.
    pub skipped: Vec<String>,
    pub errors: Vec<Issue>,
}

impl ActionLog {
    pub fn error_strings(&self) -> Vec<String> {
        self.errors.iter().map(Issue::to_string).collect()
    }
}

/// Applies a configuration's overrides to baseline documents.
///
/// Owns the template cursors and the generator RNG; [`OverrideEngine::reset`]
/// rewinds both so a seeded pass can be replayed.
pub struct OverrideEngine {
    config: ConfigDocument,
    resolver: PathResolver,
    templates: TemplateEngine,
    generator: ValueGenerator,
}

impl OverrideEngine {
    /// Fails when template inheritance is circular.
    pub fn new(config: ConfigDocument) -> CoreResult<Self> {
        let templates = TemplateEngine::new(&config.templates, config.seed)?;
        let resolver = PathResolver::with_prefixes(config.namespaces.prefix_map());
        let generator = ValueGenerator::new(config.seed);
        Ok(Self {
            config,
            resolver,
            templates,
            generator,
        })
    }

    pub fn config(&self) -> &ConfigDocument {
        &self.config
    }

    pub fn templates(&self) -> &TemplateEngine {
        &self.templates
    }

    pub fn reset(&mut self) {
        self.templates.reset(None);
        self.generator.reset();
    }

    /// One pass over `doc`: values, patterns, templates, attributes, namespaces.
    ///
    /// Failures are logged per override and never abort the pass.
    pub fn apply(&mut self, doc: &mut Document) -> ActionLog {
        let index = ElementIndex::build(doc);
        let config = &self.config;
        let mut pass = Pass {
            doc,
            index: &index,
            resolver: &mut self.resolver,
            templates: &mut self.templates,
            generator: &mut self.generator,
            claims: HashMap::new(),
            streams: HashMap::new(),
            log: ActionLog::default(),
        };

        let (templated, plain_values): (Vec<&ValueEntry>, Vec<&ValueEntry>) =
            config.values.iter().partition(|e| e.value.is_template());
        let (templated_patterns, plain_patterns): (Vec<&ValueEntry>, Vec<&ValueEntry>) =
            config.patterns.iter().partition(|e| e.value.is_template());

        pass.entries(Phase::Values, by_precedence(plain_values));
        pass.entries(Phase::Patterns, by_precedence(plain_patterns));
        pass.entries(
            Phase::Templates,
            by_precedence(templated.into_iter().chain(templated_patterns).collect()),
        );
        for entry in &config.attributes {
            pass.attribute(entry);
        }
        pass.namespaces(&config.namespaces);

        let computation = pass.templates.take_issues();
        let mut log = pass.log;
        log.errors.extend(computation);
        tracing::info!(
            event = "overrides_applied",
            applied = log.applied.len(),
            skipped = log.skipped.len(),
            errors = log.errors.len()
        );
        log
    }
}

/// Stable ascending sort so later, more specific entries overwrite earlier ones.
fn by_precedence(mut entries: Vec<&ValueEntry>) -> Vec<&ValueEntry> {
    entries.sort_by_key(|e| precedence(&e.path));
    entries
}

type Slot = (NodeId, Option<String>);

/// Rows drawn so far per template; the k-th match of any reference reads row k.
struct Streams<'a> {
    templates: &'a mut TemplateEngine,
    drawn: &'a mut HashMap<String, Vec<Row>>,
}

impl RowSource for Streams<'_> {
    fn row(&mut self, r: &TemplateRef, k: usize) -> Option<Row> {
        if let Some(n) = r.row {
            return self.templates.row_at(&r.template, n);
        }
        let stream = self.drawn.entry(r.template.clone()).or_default();
        while stream.len() <= k {
            stream.push(self.templates.next(&r.template)?);
        }
        stream.get(k).cloned()
    }
}

struct Pass<'a> {
    doc: &'a mut Document,
    index: &'a ElementIndex,
    resolver: &'a mut PathResolver,
    templates: &'a mut TemplateEngine,
    generator: &'a mut ValueGenerator,
    /// Precedence and key of the override that last wrote each slot.
    claims: HashMap<Slot, (Precedence, String)>,
    streams: HashMap<String, Vec<Row>>,
    log: ActionLog,
}

impl Pass<'_> {
    fn entries(&mut self, phase: Phase, entries: Vec<&ValueEntry>) {
        tracing::debug!(event = "phase_start", phase = phase.as_str(), entries = entries.len());
        for e in entries {
            self.apply_entry(phase, &e.key, &e.path, &e.value, !e.path.is_pattern());
        }
    }

    fn attribute(&mut self, entry: &AttributeEntry) {
        let (expr, create) = match &entry.selector {
            AttributeSelector::Existing { element, attribute } => (xforge_xpath::parse(&format!("{element}@{attribute}")), false),
            AttributeSelector::Every { element, attribute } => (xforge_xpath::parse(&format!("{element}@{attribute}")), true),
            AttributeSelector::Path(expr) => (Ok(expr.clone()), true),
        };
        match expr {
            Ok(expr) => self.apply_entry(Phase::Attributes, &entry.key, &expr, &entry.value, create),
            Err(e) => self.fail(&entry.key, e.to_string()),
        }
    }

    fn apply_entry(&mut self, phase: Phase, key: &str, expr: &PathExpression, value: &ValueSpec, create: bool) {
        let prec = precedence(expr);
        let nodes = self.resolver.resolve_in(self.index, expr);
        if nodes.is_empty() {
            self.miss(key, "matched no element");
            return;
        }
        let mut targets = 0usize;
        let mut written = 0usize;
        for (k, node) in nodes.into_iter().enumerate() {
            if let ValueSpec::Template(r @ TemplateRef { field: None, .. }) = value {
                if expr.attribute().is_none() {
                    targets += 1;
                    match self.row_for(r, k) {
                        Some(row) => written += self.fill_row(key, node, &row, prec),
                        None => self.unresolved(key, &r.raw),
                    }
                    continue;
                }
            }
            let slots: Vec<Option<String>> = match expr.attribute() {
                None => vec![None],
                Some(a) => self.attribute_targets(node, a, create).into_iter().map(Some).collect(),
            };
            for attr in slots {
                targets += 1;
                let Some(text) = self.value_for(value, k) else {
                    self.unresolved(key, value.raw());
                    continue;
                };
                if self.write(key, node, attr.as_deref(), prec, &text) {
                    written += 1;
                }
            }
        }
        if targets == 0 {
            self.miss(key, "matched no attribute");
        }
        if written > 0 {
            let plural = if written == 1 { "" } else { "s" };
            self.log
                .applied
                .push(format!("{}: {key} = {} ({written} target{plural})", phase.as_str(), value.raw()));
        }
    }

    /// Attribute names to write on `node` for an address's attribute part.
    fn attribute_targets(&mut self, node: NodeId, pattern: &str, create: bool) -> Vec<String> {
        if pattern.contains('*') {
            let names: Vec<String> = self
                .doc
                .attributes(node)
                .iter()
                .filter(|a| !a.is_namespace_decl())
                .map(|a| a.name.qualified())
                .collect();
            return names
                .into_iter()
                .filter(|n| self.resolver.name_matches(pattern, n))
                .collect();
        }
        if create || self.doc.has_attribute(node, pattern) {
            vec![pattern.to_string()]
        } else {
            Vec::new()
        }
    }

    fn value_for(&mut self, value: &ValueSpec, k: usize) -> Option<String> {
        let mut rows = Streams {
            templates: &mut *self.templates,
            drawn: &mut self.streams,
        };
        try_resolve(value, &mut rows, &mut *self.generator, k)
    }

    fn row_for(&mut self, r: &TemplateRef, k: usize) -> Option<Row> {
        Streams {
            templates: &mut *self.templates,
            drawn: &mut self.streams,
        }
        .row(r, k)
    }

    /// Write row fields into same-named children; `a.b` fields descend.
    fn fill_row(&mut self, key: &str, node: NodeId, row: &Row, prec: Precedence) -> usize {
        let mut written = 0;
        for (field, value) in row {
            let target = field.split('.').try_fold(node, |cur, name| {
                self.doc.element_children(cur).find(|c| self.doc.local_name(*c) == name)
            });
            if let Some(target) = target {
                if self.write(key, target, None, prec, value) {
                    written += 1;
                }
            }
        }
        written
    }

    fn write(&mut self, key: &str, node: NodeId, attr: Option<&str>, prec: Precedence, value: &str) -> bool {
        let slot = (node, attr.map(str::to_string));
        let target = match attr {
            Some(a) => format!("{}@{a}", self.doc.path_of(node)),
            None => self.doc.path_of(node),
        };
        if let Some((held, holder)) = self.claims.get(&slot) {
            if *held > prec {
                self.log
                    .skipped
                    .push(format!("{key}: {target} shadowed by '{holder}' (precedence {held} > {prec})"));
                return false;
            }
        }
        let result = match attr {
            Some(a) => self.doc.set_attribute(node, a, value),
            None => self.doc.set_text(node, value),
        };
        match result {
            Ok(()) => {
                tracing::trace!(event = "override_written", key, target = %target);
                self.claims.insert(slot, (prec, key.to_string()));
                true
            }
            Err(e) => {
                self.fail(key, format!("{target}: {e}"));
                false
            }
        }
    }

    fn namespaces(&mut self, rules: &NamespaceRules) {
        if rules.is_empty() {
            return;
        }
        let root = self.doc.root();
        if let Some(uri) = &rules.default {
            self.declare(root, "xmlns", uri);
        }
        for (prefix, uri) in &rules.prefixes {
            self.declare(root, &format!("xmlns:{prefix}"), uri);
        }
        for rule in &rules.elements {
            let nodes = self.resolver.resolve_in(self.index, &rule.path);
            if nodes.is_empty() {
                self.miss(&rule.key, "matched no element");
                continue;
            }
            let mut renamed = 0;
            for node in nodes {
                let local = self.doc.local_name(node).to_string();
                match self.doc.rename(node, QName::new(Some(&rule.prefix), &local)) {
                    Ok(()) => renamed += 1,
                    Err(e) => {
                        let target = self.doc.path_of(node);
                        self.fail(&rule.key, format!("{target}: {e}"));
                    }
                }
            }
            if renamed > 0 {
                self.log
                    .applied
                    .push(format!("namespaces: {} -> prefix '{}' ({renamed} elements)", rule.key, rule.prefix));
            }
        }
    }

    fn declare(&mut self, root: NodeId, name: &str, uri: &str) {
        match self.doc.set_attribute(root, name, uri) {
            Ok(()) => self.log.applied.push(format!("namespaces: {name}=\"{uri}\"")),
            Err(e) => self.fail(name, e.to_string()),
        }
    }

    fn miss(&mut self, key: &str, message: &str) {
        tracing::debug!(event = "override_missed", key, message);
        self.log
            .skipped
            .push(Issue::new(IssueKind::ResolutionMiss, key, message).to_string());
    }

    fn unresolved(&mut self, key: &str, raw: &str) {
        self.miss(key, &format!("'{raw}' produced no value"));
    }

    fn fail(&mut self, key: &str, message: String) {
        tracing::warn!(event = "override_failed", key, error = %message);
        self.log
            .errors
            .push(Issue::new(IssueKind::ApplicationFailure, key, message));
    }
}
