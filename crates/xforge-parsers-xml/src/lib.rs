//! Mutable XML document backed by a node arena.
//!
//! Nodes are addressed by [`NodeId`] handles that stay valid for the
//! lifetime of the [`Document`], including after a node has been detached.
//! Parsing goes through `roxmltree` (namespace resolution for free) and
//! serialization through `quick-xml`'s writer.

mod document;
mod parse;
mod write;

pub use document::{is_valid_name, is_xml_char, Attribute, Document, Element, NodeId, NodeKind, QName};
pub use write::WriteOptions;

/// Namespace bound to the reserved `xml` prefix.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
