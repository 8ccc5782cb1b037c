use xforge_core::{CoreResult, XForgeError};

/// Handle to a node in a [`Document`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Qualified name as written in the source (`prefix:local` or `local`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
}

impl QName {
    pub fn new(prefix: Option<&str>, local: &str) -> Self {
        Self {
            prefix: prefix.map(str::to_string),
            local: local.to_string(),
        }
    }

    /// Split `p:local` at the first colon.
    pub fn parse(name: &str) -> Self {
        match name.split_once(':') {
            Some((p, l)) if !p.is_empty() && !l.is_empty() => Self::new(Some(p), l),
            _ => Self::new(None, name),
        }
    }

    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{p}:{}", self.local),
            None => self.local.clone(),
        }
    }
}

impl std::fmt::Display for QName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(p) = &self.prefix {
            write!(f, "{p}:")?;
        }
        f.write_str(&self.local)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

impl Attribute {
    /// `xmlns` or `xmlns:p`.
    pub fn is_namespace_decl(&self) -> bool {
        match &self.name.prefix {
            Some(p) => p == "xmlns",
            None => self.name.local == "xmlns",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: QName,
    /// Resolved namespace URI, if any.
    pub namespace: Option<String>,
    /// Source-order attributes, namespace declarations included.
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element(Element),
    Text(String),
    Comment(String),
    ProcessingInstruction { target: String, value: Option<String> },
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Document {
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: NodeId,
    /// Comments and PIs before the root element.
    pub(crate) prolog: Vec<NodeId>,
    /// Comments and PIs after the root element.
    pub(crate) epilog: Vec<NodeId>,
}

impl Document {
    /// Document holding a single empty root element.
    pub fn new(root: QName) -> CoreResult<Self> {
        check_name(&root.qualified())?;
        let node = Node {
            kind: NodeKind::Element(Element {
                name: root,
                namespace: None,
                attributes: Vec::new(),
            }),
            parent: None,
            children: Vec::new(),
        };
        Ok(Self {
            nodes: vec![node],
            root: NodeId(0),
            prolog: Vec::new(),
            epilog: Vec::new(),
        })
    }

    pub(crate) fn push(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent,
            children: Vec::new(),
        });
        if let Some(p) = parent {
            self.nodes[p.0].children.push(id);
        }
        id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(e) => Some(e),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> CoreResult<&mut Element> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Element(e) => Ok(e),
            _ => Err(XForgeError::Xml(format!("node {} is not an element", id.0))),
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn name(&self, id: NodeId) -> Option<&QName> {
        self.element(id).map(|e| &e.name)
    }

    /// Namespace-stripped element name; empty for non-elements.
    pub fn local_name(&self, id: NodeId) -> &str {
        self.element(id).map(|e| e.name.local.as_str()).unwrap_or("")
    }

    pub fn namespace(&self, id: NodeId) -> Option<&str> {
        self.element(id).and_then(|e| e.namespace.as_deref())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(move |c| self.is_element(*c))
    }

    /// Element descendants of `id` in document order, `id` excluded.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.element_children(id).collect();
        stack.reverse();
        while let Some(n) = stack.pop() {
            out.push(n);
            let mut kids: Vec<NodeId> = self.element_children(n).collect();
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    /// Every attached element, root first, in document order.
    pub fn elements(&self) -> Vec<NodeId> {
        let mut out = vec![self.root];
        out.extend(self.descendants(self.root));
        out
    }

    /// `/Root/Order/Amount` built from local names.
    pub fn path_of(&self, id: NodeId) -> String {
        let mut names = Vec::new();
        let mut cur = Some(id);
        while let Some(n) = cur {
            names.push(self.local_name(n));
            cur = self.nodes[n.0].parent;
        }
        names.reverse();
        format!("/{}", names.join("/"))
    }

    /// True while the node is still reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut cur = id;
        loop {
            if cur == self.root {
                return true;
            }
            match self.nodes[cur.0].parent {
                Some(p) => cur = p,
                None => return false,
            }
        }
    }

    /// Concatenated direct text content, `None` when the element has none.
    pub fn text(&self, id: NodeId) -> Option<String> {
        let mut out = String::new();
        let mut seen = false;
        for c in &self.nodes[id.0].children {
            if let NodeKind::Text(t) = &self.nodes[c.0].kind {
                out.push_str(t);
                seen = true;
            }
        }
        seen.then_some(out)
    }

    /// Replace the direct text of an element. Child elements are kept.
    pub fn set_text(&mut self, id: NodeId, value: &str) -> CoreResult<()> {
        check_chars(value)?;
        self.element_mut(id)?;
        let nodes = &self.nodes;
        let kept: Vec<NodeId> = nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(|c| !matches!(nodes[c.0].kind, NodeKind::Text(_)))
            .collect();
        let removed: Vec<NodeId> = nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(|c| matches!(nodes[c.0].kind, NodeKind::Text(_)))
            .collect();
        for r in removed {
            self.nodes[r.0].parent = None;
        }
        self.nodes[id.0].children = kept;
        if !value.is_empty() {
            let text = NodeId(self.nodes.len());
            self.nodes.push(Node {
                kind: NodeKind::Text(value.to_string()),
                parent: Some(id),
                children: Vec::new(),
            });
            self.nodes[id.0].children.insert(0, text);
        }
        Ok(())
    }

    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        self.element(id).map(|e| e.attributes.as_slice()).unwrap_or(&[])
    }

    /// Attribute value by qualified name.
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|a| a.name.qualified() == name)
            .map(|a| a.value.as_str())
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.attribute(id, name).is_some()
    }

    /// Create or overwrite an attribute by qualified name.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> CoreResult<()> {
        check_name(name)?;
        check_chars(value)?;
        let el = self.element_mut(id)?;
        match el.attributes.iter_mut().find(|a| a.name.qualified() == name) {
            Some(attr) => attr.value = value.to_string(),
            None => el.attributes.push(Attribute {
                name: QName::parse(name),
                value: value.to_string(),
            }),
        }
        Ok(())
    }

    /// Change an element's qualified name; the namespace URI is re-resolved
    /// from the in-scope declarations.
    pub fn rename(&mut self, id: NodeId, name: QName) -> CoreResult<()> {
        check_name(&name.qualified())?;
        let namespace = self.lookup_namespace(id, name.prefix.as_deref());
        if name.prefix.is_some() && namespace.is_none() {
            return Err(XForgeError::Xml(format!(
                "prefix '{}' is not declared in scope",
                name.prefix.as_deref().unwrap_or_default()
            )));
        }
        let el = self.element_mut(id)?;
        el.name = name;
        el.namespace = namespace;
        Ok(())
    }

    /// Resolve a prefix (or the default namespace for `None`) against the
    /// declarations on `id` and its ancestors.
    pub fn lookup_namespace(&self, id: NodeId, prefix: Option<&str>) -> Option<String> {
        if prefix == Some("xml") {
            return Some(crate::XML_NAMESPACE.to_string());
        }
        let mut cur = Some(id);
        while let Some(n) = cur {
            for a in self.attributes(n) {
                let hit = match prefix {
                    Some(p) => a.name.prefix.as_deref() == Some("xmlns") && a.name.local == p,
                    None => a.name.prefix.is_none() && a.name.local == "xmlns",
                };
                if hit {
                    return (!a.value.is_empty()).then(|| a.value.clone());
                }
            }
            cur = self.nodes[n.0].parent;
        }
        None
    }

    /// Detach a node (and its subtree) from its parent. The handle stays valid.
    pub fn detach(&mut self, id: NodeId) -> CoreResult<()> {
        if id == self.root {
            return Err(XForgeError::Xml("cannot detach the root element".into()));
        }
        if let Some(p) = self.nodes[id.0].parent.take() {
            self.nodes[p.0].children.retain(|c| *c != id);
        }
        Ok(())
    }
}

/// XML 1.0 `Char` production.
pub fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Conservative XML `Name` check (ASCII start rules, any non-ASCII accepted).
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let start_ok = first.is_alphabetic() || first == '_' || first == ':';
    start_ok
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | ':' | '-' | '.') || !c.is_ascii())
}

fn check_chars(value: &str) -> CoreResult<()> {
    match value.chars().find(|c| !is_xml_char(*c)) {
        Some(bad) => Err(XForgeError::Xml(format!(
            "character U+{:04X} is not allowed in XML content",
            bad as u32
        ))),
        None => Ok(()),
    }
}

fn check_name(name: &str) -> CoreResult<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(XForgeError::Xml(format!("'{name}' is not a valid XML name")))
    }
}
