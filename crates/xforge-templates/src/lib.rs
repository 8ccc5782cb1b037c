//! Cyclic template data for override values.
//!
//! Each configured template is a list of rows handed out one at a time
//! according to its cycling strategy, with optional single-parent
//! inheritance and computed fields evaluated against the row being served.

mod engine;
pub mod formula;

pub use engine::TemplateEngine;
pub use formula::{format_number, Formula};
