use roxmltree::{NodeType, ParsingOptions};
use xforge_core::{CoreResult, XForgeError};

use crate::document::{Attribute, Document, Element, NodeId, NodeKind, QName};
use crate::XML_NAMESPACE;

impl Document {
    /// Parse XML text into an arena document. Whitespace-only text nodes are dropped.
    pub fn parse(xml: &str) -> CoreResult<Self> {
        let opts = ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        };
        let src = roxmltree::Document::parse_with_options(xml, opts)
            .map_err(|e| XForgeError::Xml(e.to_string()))?;
        let root_el = src.root_element();

        let mut doc = Document {
            nodes: Vec::new(),
            root: NodeId(0),
            prolog: Vec::new(),
            epilog: Vec::new(),
        };

        let mut before_root = true;
        for top in src.root().children() {
            if top == root_el {
                doc.root = copy_element(&mut doc, top, None);
                before_root = false;
                continue;
            }
            if let Some(kind) = leaf_kind(top) {
                let id = doc.push(kind, None);
                if before_root {
                    doc.prolog.push(id);
                } else {
                    doc.epilog.push(id);
                }
            }
        }
        tracing::trace!(event = "xml_parsed", nodes = doc.nodes.len());
        Ok(doc)
    }
}

fn copy_element(doc: &mut Document, node: roxmltree::Node, parent: Option<NodeId>) -> NodeId {
    let tag = node.tag_name();
    let prefix = tag.namespace().and_then(|uri| node.lookup_prefix(uri));
    let name = QName::new(prefix, tag.name());

    let mut attributes = declared_namespaces(node);
    for a in node.attributes() {
        let prefix = match a.namespace() {
            Some(XML_NAMESPACE) => Some("xml"),
            Some(uri) => node.lookup_prefix(uri),
            None => None,
        };
        attributes.push(Attribute {
            name: QName::new(prefix, a.name()),
            value: a.value().to_string(),
        });
    }

    let id = doc.push(
        NodeKind::Element(Element {
            name,
            namespace: tag.namespace().map(str::to_string),
            attributes,
        }),
        parent,
    );

    for child in node.children() {
        if child.is_element() {
            copy_element(doc, child, Some(id));
        } else if let Some(kind) = leaf_kind(child) {
            doc.push(kind, Some(id));
        }
    }
    id
}

fn leaf_kind(node: roxmltree::Node) -> Option<NodeKind> {
    match node.node_type() {
        NodeType::Text => {
            let t = node.text()?;
            (!t.trim().is_empty()).then(|| NodeKind::Text(t.to_string()))
        }
        NodeType::Comment => node.text().map(|t| NodeKind::Comment(t.to_string())),
        NodeType::PI => node.pi().map(|pi| NodeKind::ProcessingInstruction {
            target: pi.target.to_string(),
            value: pi.value.map(str::to_string),
        }),
        _ => None,
    }
}

/// Declarations introduced on this element (in scope here, not on the parent).
fn declared_namespaces(node: roxmltree::Node) -> Vec<Attribute> {
    let inherited: Vec<(Option<&str>, &str)> = node
        .parent_element()
        .map(|p| p.namespaces().map(|ns| (ns.name(), ns.uri())).collect())
        .unwrap_or_default();
    node.namespaces()
        .filter(|ns| ns.name() != Some("xml"))
        .filter(|ns| !inherited.contains(&(ns.name(), ns.uri())))
        .map(|ns| Attribute {
            name: match ns.name() {
                Some(p) => QName::new(Some("xmlns"), p),
                None => QName::new(None, "xmlns"),
            },
            value: ns.uri().to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_structure_and_text() {
        let doc = Document::parse(
            "<?xml version=\"1.0\"?>\n<!-- head -->\n<Root>\n  <A>1</A>\n  <B k=\"v\"/>\n</Root>",
        )
        .unwrap();
        let root = doc.root();
        assert_eq!(doc.local_name(root), "Root");
        let kids: Vec<_> = doc.element_children(root).collect();
        assert_eq!(kids.len(), 2);
        assert_eq!(doc.children(root).len(), 2, "indentation whitespace dropped");
        assert_eq!(doc.text(kids[0]).as_deref(), Some("1"));
        assert_eq!(doc.attribute(kids[1], "k"), Some("v"));
        assert_eq!(doc.prolog.len(), 1);
    }

    #[test]
    fn resolves_prefixes_and_declarations() {
        let doc = Document::parse(
            "<r:Root xmlns:r=\"urn:r\" xmlns=\"urn:d\"><Item r:id=\"1\"/><r:Item/></r:Root>",
        )
        .unwrap();
        let root = doc.root();
        assert_eq!(doc.name(root).unwrap().qualified(), "r:Root");
        assert_eq!(doc.namespace(root), Some("urn:r"));
        let decls: Vec<_> = doc
            .attributes(root)
            .iter()
            .filter(|a| a.is_namespace_decl())
            .map(|a| a.name.qualified())
            .collect();
        assert_eq!(decls.len(), 2);
        let kids: Vec<_> = doc.element_children(root).collect();
        assert_eq!(doc.namespace(kids[0]), Some("urn:d"));
        assert_eq!(doc.attribute(kids[0], "r:id"), Some("1"));
        assert!(doc.attributes(kids[0]).iter().all(|a| !a.is_namespace_decl()));
        assert_eq!(doc.name(kids[1]).unwrap().qualified(), "r:Item");
    }

    #[test]
    fn root_handle_follows_the_prolog() {
        let plain = Document::parse("<Root><A/></Root>").unwrap();
        assert_eq!(plain.root(), NodeId(0));

        let doc = Document::parse("<!-- a --><?pi x?><Root><A/></Root><!-- z -->").unwrap();
        assert_eq!(doc.root(), NodeId(2));
        assert_eq!(doc.local_name(doc.root()), "Root");
        assert_eq!(doc.epilog.len(), 1);
        let a = doc.element_children(doc.root()).next().unwrap();
        assert_eq!(doc.parent(a), Some(doc.root()));
    }

    #[test]
    fn malformed_input_is_an_xml_error() {
        let err = Document::parse("<Root><A></Root>").unwrap_err();
        assert!(matches!(err, XForgeError::Xml(_)));
    }
}
