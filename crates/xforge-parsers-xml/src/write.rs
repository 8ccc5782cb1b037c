use quick_xml::events::{BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::Writer;
use xforge_core::{CoreResult, XForgeError};

use crate::document::{Document, NodeId, NodeKind};

/// Serialization knobs.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Emit `<?xml version="1.0" encoding="UTF-8"?>`.
    pub declaration: bool,
    /// Spaces per nesting level; `None` writes everything on one line.
    pub indent: Option<usize>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            declaration: true,
            indent: Some(2),
        }
    }
}

fn emit<'a>(w: &mut Writer<Vec<u8>>, ev: Event<'a>) -> CoreResult<()> {
    w.write_event(ev).map_err(|e| XForgeError::Xml(e.to_string()))
}

impl Document {
    /// Serialize the attached tree.
    pub fn to_xml_string(&self, opts: &WriteOptions) -> CoreResult<String> {
        let mut w = match opts.indent {
            Some(n) if n > 0 => Writer::new_with_indent(Vec::new(), b' ', n),
            _ => Writer::new(Vec::new()),
        };
        if opts.declaration {
            emit(&mut w, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        }
        for id in &self.prolog {
            self.write_node(&mut w, *id)?;
        }
        self.write_node(&mut w, self.root)?;
        for id in &self.epilog {
            self.write_node(&mut w, *id)?;
        }
        String::from_utf8(w.into_inner()).map_err(|e| XForgeError::Xml(e.to_string()))
    }

    fn write_node(&self, w: &mut Writer<Vec<u8>>, id: NodeId) -> CoreResult<()> {
        match self.kind(id) {
            NodeKind::Element(el) => {
                let qname = el.name.qualified();
                let mut start = BytesStart::new(qname.as_str());
                for a in &el.attributes {
                    let name = a.name.qualified();
                    start.push_attribute((name.as_str(), a.value.as_str()));
                }
                let children = self.children(id);
                if children.is_empty() {
                    return emit(w, Event::Empty(start));
                }
                emit(w, Event::Start(start))?;
                for c in children {
                    self.write_node(w, *c)?;
                }
                emit(w, Event::End(BytesEnd::new(qname.as_str())))
            }
            NodeKind::Text(t) => emit(w, Event::Text(BytesText::new(t))),
            NodeKind::Comment(c) => emit(w, Event::Comment(BytesText::from_escaped(c.as_str()))),
            NodeKind::ProcessingInstruction { target, value } => {
                let content = match value {
                    Some(v) => format!("{target} {v}"),
                    None => target.clone(),
                };
                emit(w, Event::PI(BytesPI::new(content)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_parse() {
        let src = "<Root a=\"1\"><!--note--><A>x &amp; y</A><B/></Root>";
        let doc = Document::parse(src).unwrap();
        let out = doc.to_xml_string(&WriteOptions::default()).unwrap();
        assert!(out.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        let again = Document::parse(&out).unwrap();
        let a = again.element_children(again.root()).next().unwrap();
        assert_eq!(again.text(a).as_deref(), Some("x & y"));
        assert_eq!(again.attribute(again.root(), "a"), Some("1"));
    }

    #[test]
    fn compact_output_without_declaration() {
        let doc = Document::parse("<Root><A>1</A></Root>").unwrap();
        let out = doc
            .to_xml_string(&WriteOptions {
                declaration: false,
                indent: None,
            })
            .unwrap();
        assert_eq!(out, "<Root><A>1</A></Root>");
    }

    #[test]
    fn detached_subtrees_are_not_written() {
        let mut doc = Document::parse("<Root><Keep/><Drop><X/></Drop></Root>").unwrap();
        let drop = doc.element_children(doc.root()).nth(1).unwrap();
        doc.detach(drop).unwrap();
        let out = doc
            .to_xml_string(&WriteOptions {
                declaration: false,
                indent: None,
            })
            .unwrap();
        assert_eq!(out, "<Root><Keep/></Root>");
    }

    #[test]
    fn namespaces_survive_serialization() {
        let doc = Document::parse("<p:Root xmlns:p=\"urn:p\"><p:A/></p:Root>").unwrap();
        let out = doc
            .to_xml_string(&WriteOptions {
                declaration: false,
                indent: None,
            })
            .unwrap();
        assert_eq!(out, "<p:Root xmlns:p=\"urn:p\"><p:A/></p:Root>");
    }
}
