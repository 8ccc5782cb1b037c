use std::collections::HashMap;

use xforge_parsers_xml::{Document, NodeId};

/// Flattened element text and attribute values, captured before pruning.
///
/// Keys: `/Root/A`, `/Root/A@x` and the bare `A`, `A@x`. When a bare
/// name repeats, the first occurrence in document order wins.
#[derive(Debug, Clone, Default)]
pub struct ValueSnapshot {
    by_path: HashMap<String, String>,
    by_name: HashMap<String, String>,
    ordered: Vec<(String, String)>,
}

impl ValueSnapshot {
    pub fn capture(doc: &Document) -> Self {
        let mut snap = ValueSnapshot::default();
        snap.visit(doc, doc.root(), "");
        tracing::debug!(event = "snapshot_captured", values = snap.ordered.len());
        snap
    }

    fn visit(&mut self, doc: &Document, node: NodeId, parent_path: &str) {
        let local = doc.local_name(node);
        let path = format!("{parent_path}/{local}");
        if let Some(text) = doc.text(node) {
            self.record(path.clone(), local.to_string(), text.trim().to_string());
        }
        for a in doc.attributes(node) {
            if a.is_namespace_decl() {
                continue;
            }
            let attr = a.name.qualified();
            self.record(format!("{path}@{attr}"), format!("{local}@{attr}"), a.value.clone());
        }
        let kids: Vec<NodeId> = doc.element_children(node).collect();
        for k in kids {
            self.visit(doc, k, &path);
        }
    }

    fn record(&mut self, path: String, name: String, value: String) {
        self.by_name.entry(name).or_insert_with(|| value.clone());
        self.ordered.push((path.clone(), value.clone()));
        self.by_path.entry(path).or_insert(value);
    }

    /// Insert or replace a value by full path (tests and callers composing snapshots).
    pub fn insert(&mut self, path: &str, value: &str) {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        self.by_name.insert(name, value.to_string());
        self.ordered.push((path.clone(), value.to_string()));
        self.by_path.insert(path, value.to_string());
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Look a field up as `/a/b`, `a/b`, `a.b` or a bare name, with an optional `@attr`.
    pub fn get(&self, field: &str) -> Option<&str> {
        let field = field.trim();
        let (element, attr) = match field.split_once('@') {
            Some((e, a)) => (e, Some(a)),
            None => (field, None),
        };
        let segments: Vec<&str> = element
            .trim_start_matches('/')
            .split(['/', '.'])
            .filter(|s| !s.is_empty())
            .collect();
        let last = *segments.last()?;
        let suffix = attr.map(|a| format!("@{a}")).unwrap_or_default();

        let full = format!("/{}{suffix}", segments.join("/"));
        if let Some(v) = self.by_path.get(&full) {
            return Some(v);
        }
        if segments.len() > 1 {
            // relative path: first element whose full path ends with it
            if let Some((_, v)) = self.ordered.iter().find(|(p, _)| p.ends_with(&full)) {
                return Some(v);
            }
        }
        self.by_name.get(&format!("{last}{suffix}")).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<Root><Order status="open"><Amount>1500</Amount></Order><Order><Amount>20</Amount></Order><Customer><Type>VIP</Type></Customer></Root>"#;

    #[test]
    fn looks_up_every_spelling() {
        let snap = ValueSnapshot::capture(&Document::parse(DOC).unwrap());
        assert_eq!(snap.get("/Root/Order/Amount"), Some("1500"));
        assert_eq!(snap.get("Root/Customer/Type"), Some("VIP"));
        assert_eq!(snap.get("Customer.Type"), Some("VIP"));
        assert_eq!(snap.get("Type"), Some("VIP"));
        assert_eq!(snap.get("Amount"), Some("1500"), "first occurrence wins");
        assert_eq!(snap.get("Order@status"), Some("open"));
        assert_eq!(snap.get("/Root/Order@status"), Some("open"));
        assert_eq!(snap.get("Missing"), None);
        assert_eq!(snap.get(""), None);
    }

    #[test]
    fn insert_overrides_lookups() {
        let mut snap = ValueSnapshot::default();
        snap.insert("Root/Total", "10");
        assert_eq!(snap.get("Total"), Some("10"));
        assert_eq!(snap.get("/Root/Total"), Some("10"));
        assert_eq!(snap.len(), 1);
    }
}
