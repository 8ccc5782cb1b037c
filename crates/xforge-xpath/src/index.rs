use std::collections::HashMap;

use xforge_parsers_xml::{Document, NodeId};

use crate::expr::{PathExpression, Shape, Step};
use crate::pattern::PatternCache;

/// One ancestor-or-self link of an indexed element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub qualified: String,
    pub local: String,
    /// 1-based position among siblings sharing the local name.
    pub position: usize,
}

#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub node: NodeId,
    /// Root first, the element itself last.
    pub chain: Vec<Link>,
    pub namespace: Option<String>,
    pub prefix: Option<String>,
    /// `/Root/Items/Item[2]`: positions only where same-named siblings exist.
    pub positional_path: String,
}

impl IndexEntry {
    pub fn local(&self) -> &str {
        self.chain.last().map(|l| l.local.as_str()).unwrap_or("")
    }

    /// `/Root/Items/Item`
    pub fn path(&self) -> String {
        let mut out = String::new();
        for link in &self.chain {
            out.push('/');
            out.push_str(&link.local);
        }
        out
    }
}

/// Path-keyed view of every attached element, built once per pass.
#[derive(Debug, Default)]
pub struct ElementIndex {
    entries: Vec<IndexEntry>,
    by_path: HashMap<String, Vec<NodeId>>,
    by_local: HashMap<String, Vec<usize>>,
    by_node: HashMap<NodeId, usize>,
    by_position: HashMap<String, NodeId>,
}

impl ElementIndex {
    pub fn build(doc: &Document) -> Self {
        let mut index = ElementIndex::default();
        let root = doc.root();
        let root_link = Link {
            qualified: doc.name(root).map(|q| q.qualified()).unwrap_or_default(),
            local: doc.local_name(root).to_string(),
            position: 1,
        };
        let root_path = format!("/{}", root_link.local);
        index.insert(doc, root, vec![root_link], root_path);
        index.walk(doc, root);
        tracing::debug!(event = "index_built", elements = index.entries.len());
        index
    }

    fn walk(&mut self, doc: &Document, parent: NodeId) {
        let Some(&parent_slot) = self.by_node.get(&parent) else {
            return;
        };
        let parent_chain = self.entries[parent_slot].chain.clone();
        let parent_positional = self.entries[parent_slot].positional_path.clone();

        let kids: Vec<NodeId> = doc.element_children(parent).collect();
        let mut totals: HashMap<&str, usize> = HashMap::new();
        for k in &kids {
            *totals.entry(doc.local_name(*k)).or_default() += 1;
        }
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for k in &kids {
            let local = doc.local_name(*k);
            let pos = seen.entry(local).or_default();
            *pos += 1;
            let mut chain = parent_chain.clone();
            chain.push(Link {
                qualified: doc.name(*k).map(|q| q.qualified()).unwrap_or_default(),
                local: local.to_string(),
                position: *pos,
            });
            let positional = if totals.get(local).copied().unwrap_or(0) > 1 {
                format!("{parent_positional}/{local}[{pos}]")
            } else {
                format!("{parent_positional}/{local}")
            };
            self.insert(doc, *k, chain, positional);
        }
        for k in kids {
            self.walk(doc, k);
        }
    }

    fn insert(&mut self, doc: &Document, node: NodeId, chain: Vec<Link>, positional_path: String) {
        let slot = self.entries.len();
        let entry = IndexEntry {
            node,
            namespace: doc.namespace(node).map(str::to_string),
            prefix: doc.name(node).and_then(|q| q.prefix.clone()),
            chain,
            positional_path,
        };
        self.by_path.entry(entry.path()).or_default().push(node);
        self.by_local.entry(entry.local().to_string()).or_default().push(slot);
        self.by_position.insert(entry.positional_path.clone(), node);
        self.by_node.insert(node, slot);
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn entry(&self, node: NodeId) -> Option<&IndexEntry> {
        self.by_node.get(&node).map(|slot| &self.entries[*slot])
    }

    /// Elements at an unpositioned local-name path such as `/Root/Items/Item`.
    pub fn nodes_at(&self, path: &str) -> &[NodeId] {
        self.by_path.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Element at a positional path such as `/Root/Items/Item[2]`.
    pub fn node_at_position(&self, positional_path: &str) -> Option<NodeId> {
        self.by_position.get(positional_path).copied()
    }

    /// All elements an expression addresses, in document order.
    pub fn resolve(
        &self,
        expr: &PathExpression,
        prefixes: &HashMap<String, String>,
        cache: &mut PatternCache,
    ) -> Vec<NodeId> {
        if let Some(fast) = self.resolve_plain_rooted(expr) {
            return fast;
        }
        let target = expr.target();
        let candidates: Vec<usize> = if target.is_wildcard() {
            (0..self.entries.len()).collect()
        } else {
            self.by_local.get(target.local()).cloned().unwrap_or_default()
        };
        candidates
            .into_iter()
            .map(|slot| &self.entries[slot])
            .filter(|e| chain_matches(expr, &e.chain, cache))
            .filter(|e| namespace_matches(expr, e, prefixes))
            .map(|e| e.node)
            .collect()
    }

    /// `/a/b/c` without positions, prefixes or wildcards: straight map lookup.
    fn resolve_plain_rooted(&self, expr: &PathExpression) -> Option<Vec<NodeId>> {
        let plain = expr.shape() == Shape::Rooted
            && !expr.is_pattern()
            && expr.namespace().is_none()
            && expr
                .steps()
                .iter()
                .all(|s| s.position.is_none() && !s.name.contains(':'));
        if !plain {
            return None;
        }
        let names: Vec<&str> = expr.steps().iter().map(|s| s.name.as_str()).collect();
        let root = self.entries.first()?;
        let key = if names.first() == Some(&root.local()) {
            format!("/{}", names.join("/"))
        } else {
            format!("/{}/{}", root.local(), names.join("/"))
        };
        Some(self.nodes_at(&key).to_vec())
    }
}

fn step_matches(step: &Step, link: &Link, cache: &mut PatternCache) -> bool {
    let subject = if step.name.contains(':') {
        link.qualified.as_str()
    } else {
        link.local.as_str()
    };
    let name_ok = if step.is_wildcard() {
        cache.is_match(&step.name, subject)
    } else {
        step.name == subject
    };
    name_ok && step.position.map_or(true, |p| p == link.position)
}

fn steps_match(steps: &[Step], links: &[Link], cache: &mut PatternCache) -> bool {
    steps.len() == links.len() && steps.iter().zip(links).all(|(s, l)| step_matches(s, l, cache))
}

fn chain_matches(expr: &PathExpression, chain: &[Link], cache: &mut PatternCache) -> bool {
    let steps = expr.steps();
    match expr.shape() {
        Shape::Rooted => {
            if steps_match(steps, chain, cache) {
                return true;
            }
            // A rooted path that does not name the root is taken relative to it.
            match (steps.first(), chain.first()) {
                (Some(first), Some(root)) if !step_matches(first, root, cache) => {
                    chain.len() == steps.len() + 1 && steps_match(steps, &chain[1..], cache)
                }
                _ => false,
            }
        }
        Shape::Dotted | Shape::Bare => {
            steps.len() <= chain.len()
                && steps_match(steps, &chain[chain.len() - steps.len()..], cache)
        }
    }
}

fn namespace_matches(
    expr: &PathExpression,
    entry: &IndexEntry,
    prefixes: &HashMap<String, String>,
) -> bool {
    let Some(ns) = expr.namespace() else {
        return true;
    };
    entry.namespace.as_deref() == Some(ns)
        || entry.prefix.as_deref() == Some(ns)
        || prefixes
            .get(ns)
            .is_some_and(|uri| entry.namespace.as_deref() == Some(uri.as_str()))
}
