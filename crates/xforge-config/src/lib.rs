//! Override configuration documents and the `xforge.toml` tool settings.
//!
//! A configuration is parsed once into [`ConfigDocument`]: path keys become
//! [`xforge_xpath::PathExpression`]s and values become tagged variants, so
//! nothing downstream re-interprets raw strings. Validation collects every
//! violation into a single [`xforge_core::XForgeError::Validation`].

mod attribute;
mod choice;
mod document;
mod settings;
mod template;
mod value;

pub use attribute::{AttributeEntry, AttributeSelector};
pub use choice::{ChoiceEntry, ChoiceSpec, ConditionRule};
pub use document::{ConfigDocument, Mode, NamespaceRules, PrefixRule, ValueEntry};
pub use settings::{
    load_config, load_settings_from, merge, BaselineCfg, ConfigError, LogCfg, OutputCfg, SchemaCfg,
    XForgeSettings, SETTINGS_FILE,
};
pub use template::{ComputedSpec, CyclingStrategy, Row, TemplateSpec};
pub use value::{GeneratorSpec, TemplateRef, ValueSpec};
