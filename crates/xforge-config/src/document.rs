use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde_json::{Map, Value};
use xforge_core::{CoreResult, XForgeError};
use xforge_xpath::PathExpression;

use crate::attribute::{AttributeEntry, AttributeSelector};
use crate::choice::{parse_choice, ChoiceEntry};
use crate::template::{parse_template, scalar_text, TemplateSpec};
use crate::value::ValueSpec;

const KNOWN_KEYS: [&str; 10] = [
    "schema", "mode", "seed", "values", "patterns", "choices", "templates", "repeats", "attributes",
    "namespaces",
];

/// Generation mode handed to the baseline generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Mode {
    #[default]
    Complete,
    Minimal,
    Custom,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Complete => "complete",
            Mode::Minimal => "minimal",
            Mode::Custom => "custom",
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "complete" => Ok(Mode::Complete),
            "minimal" => Ok(Mode::Minimal),
            "custom" => Ok(Mode::Custom),
            other => Err(format!("unknown mode '{other}' (expected complete, minimal or custom)")),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `values` or `patterns` entry.
#[derive(Debug, Clone)]
pub struct ValueEntry {
    pub key: String,
    pub path: PathExpression,
    pub value: ValueSpec,
}

/// Element prefix rule from `namespaces.elements`.
#[derive(Debug, Clone)]
pub struct PrefixRule {
    pub key: String,
    pub path: PathExpression,
    pub prefix: String,
}

#[derive(Debug, Clone, Default)]
pub struct NamespaceRules {
    pub default: Option<String>,
    pub prefixes: BTreeMap<String, String>,
    pub elements: Vec<PrefixRule>,
}

impl NamespaceRules {
    pub fn is_empty(&self) -> bool {
        self.default.is_none() && self.prefixes.is_empty() && self.elements.is_empty()
    }

    pub fn prefix_map(&self) -> HashMap<String, String> {
        self.prefixes.clone().into_iter().collect()
    }
}

/// Validated override configuration. Immutable once built.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    pub schema: String,
    pub mode: Mode,
    pub seed: Option<u64>,
    pub values: Vec<ValueEntry>,
    pub patterns: Vec<ValueEntry>,
    pub choices: Vec<ChoiceEntry>,
    pub templates: Vec<TemplateSpec>,
    pub repeats: BTreeMap<String, u32>,
    pub attributes: Vec<AttributeEntry>,
    pub namespaces: NamespaceRules,
}

impl ConfigDocument {
    pub fn from_json_str(text: &str) -> CoreResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| XForgeError::Validation(vec![format!("invalid JSON: {e}")]))?;
        Self::from_value(&value)
    }

    /// TOML documents use the same keys as JSON ones.
    pub fn from_toml_str(text: &str) -> CoreResult<Self> {
        let value: Value = toml::from_str(text)
            .map_err(|e| XForgeError::Validation(vec![format!("invalid TOML: {e}")]))?;
        Self::from_value(&value)
    }

    /// Read a `.json` or `.toml` file, picking the format by extension.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        tracing::debug!(event = "config_load", path = %path.display(), toml = is_toml);
        if is_toml {
            Self::from_toml_str(&text)
        } else {
            Self::from_json_str(&text)
        }
    }

    /// Validate a parsed value, collecting every violation before failing.
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        let Some(root) = value.as_object() else {
            return Err(XForgeError::Validation(vec![
                "configuration must be an object".to_string(),
            ]));
        };
        let mut errors = Vec::new();

        for key in root.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                tracing::warn!(event = "config_unknown_key", key = %key);
            }
        }

        let schema = match root.get("schema") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(other) => {
                errors.push(format!("schema must be a non-empty string (got {other})"));
                String::new()
            }
            None => {
                errors.push("schema is required".to_string());
                String::new()
            }
        };

        let mode = match root.get("mode") {
            Some(Value::String(s)) => s.parse::<Mode>().unwrap_or_else(|e| {
                errors.push(format!("mode: {e}"));
                Mode::default()
            }),
            Some(other) => {
                errors.push(format!("mode must be a string (got {other})"));
                Mode::default()
            }
            None => {
                errors.push("mode is required".to_string());
                Mode::default()
            }
        };

        let seed = match root.get("seed") {
            None | Some(Value::Null) => None,
            Some(v) => match v.as_u64() {
                Some(n) => Some(n),
                None => {
                    errors.push(format!("seed must be a non-negative integer (got {v})"));
                    None
                }
            },
        };

        let templates: Vec<TemplateSpec> = section(root, "templates", &mut errors)
            .map(|m| {
                m.iter()
                    .filter_map(|(name, raw)| parse_template(name, raw, &mut errors))
                    .collect()
            })
            .unwrap_or_default();
        let template_names: HashSet<&str> = templates.iter().map(|t| t.name.as_str()).collect();

        let values = value_entries(root, "values", &template_names, &mut errors);
        let patterns = value_entries(root, "patterns", &template_names, &mut errors);

        let mut choices = Vec::new();
        if let Some(m) = section(root, "choices", &mut errors) {
            for (key, raw) in m {
                let target = path_key("choices", key, &mut errors);
                let spec = parse_choice(key, raw, &mut errors);
                if let (Some(target), Some(spec)) = (target, spec) {
                    choices.push(ChoiceEntry {
                        key: key.clone(),
                        target,
                        spec,
                    });
                }
            }
        }

        let mut repeats = BTreeMap::new();
        if let Some(m) = section(root, "repeats", &mut errors) {
            for (key, raw) in m {
                match raw.as_u64().and_then(|n| u32::try_from(n).ok()) {
                    Some(n) => {
                        repeats.insert(key.clone(), n);
                    }
                    None => errors.push(format!("repeats.{key}: must be a non-negative integer (got {raw})")),
                }
            }
        }

        let mut attributes = Vec::new();
        if let Some(m) = section(root, "attributes", &mut errors) {
            for (key, raw) in m {
                let selector = match AttributeSelector::parse(key) {
                    Ok(s) => Some(s),
                    Err(e) => {
                        errors.push(format!("attributes.{key}: {e}"));
                        None
                    }
                };
                let value = scalar_value("attributes", key, raw, &template_names, &mut errors);
                if let (Some(selector), Some(value)) = (selector, value) {
                    attributes.push(AttributeEntry {
                        key: key.clone(),
                        selector,
                        value,
                    });
                }
            }
        }

        let namespaces = namespace_rules(root, &mut errors);

        if !errors.is_empty() {
            tracing::debug!(event = "config_invalid", problems = errors.len());
            return Err(XForgeError::Validation(errors));
        }
        Ok(ConfigDocument {
            schema,
            mode,
            seed,
            values,
            patterns,
            choices,
            templates,
            repeats,
            attributes,
            namespaces,
        })
    }

    pub fn template(&self, name: &str) -> Option<&TemplateSpec> {
        self.templates.iter().find(|t| t.name == name)
    }
}

fn section<'a>(root: &'a Map<String, Value>, name: &str, errors: &mut Vec<String>) -> Option<&'a Map<String, Value>> {
    match root.get(name) {
        None | Some(Value::Null) => None,
        Some(Value::Object(m)) => Some(m),
        Some(other) => {
            errors.push(format!("{name} must be an object (got {other})"));
            None
        }
    }
}

fn path_key(section: &str, key: &str, errors: &mut Vec<String>) -> Option<PathExpression> {
    match xforge_xpath::parse(key) {
        Ok(p) => Some(p),
        Err(e) => {
            errors.push(format!("{section}: {e}"));
            None
        }
    }
}

fn scalar_value(
    section: &str,
    key: &str,
    raw: &Value,
    templates: &HashSet<&str>,
    errors: &mut Vec<String>,
) -> Option<ValueSpec> {
    let spec = match raw {
        Value::String(s) => ValueSpec::parse(s),
        Value::Number(_) | Value::Bool(_) => ValueSpec::Literal(scalar_text(raw)),
        other => {
            errors.push(format!("{section}.{key}: value must be a string, number or boolean (got {other})"));
            return None;
        }
    };
    if let ValueSpec::Template(t) = &spec {
        if !templates.contains(t.template.as_str()) {
            errors.push(format!("{section}.{key}: references unknown template '{}'", t.template));
            return None;
        }
    }
    Some(spec)
}

fn value_entries(
    root: &Map<String, Value>,
    name: &str,
    templates: &HashSet<&str>,
    errors: &mut Vec<String>,
) -> Vec<ValueEntry> {
    let mut out = Vec::new();
    let Some(m) = section(root, name, errors) else {
        return out;
    };
    for (key, raw) in m {
        let path = path_key(name, key, errors);
        let value = scalar_value(name, key, raw, templates, errors);
        if let (Some(path), Some(value)) = (path, value) {
            out.push(ValueEntry {
                key: key.clone(),
                path,
                value,
            });
        }
    }
    out
}

fn namespace_rules(root: &Map<String, Value>, errors: &mut Vec<String>) -> NamespaceRules {
    let mut rules = NamespaceRules::default();
    let Some(m) = section(root, "namespaces", errors) else {
        return rules;
    };
    match m.get("default") {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) => rules.default = Some(s.clone()),
        Some(other) => errors.push(format!("namespaces.default must be a string (got {other})")),
    }
    if let Some(p) = section(m, "prefixes", errors) {
        for (prefix, uri) in p {
            match uri {
                Value::String(u) => {
                    rules.prefixes.insert(prefix.clone(), u.clone());
                }
                other => errors.push(format!("namespaces.prefixes.{prefix} must be a string (got {other})")),
            }
        }
    }
    if let Some(e) = section(m, "elements", errors) {
        for (key, prefix) in e {
            let path = path_key("namespaces.elements", key, errors);
            let prefix = match prefix.as_str() {
                Some(p) if rules.prefixes.contains_key(p) => Some(p.to_string()),
                Some(p) => {
                    errors.push(format!("namespaces.elements.{key}: prefix '{p}' is not declared in namespaces.prefixes"));
                    None
                }
                None => {
                    errors.push(format!("namespaces.elements.{key}: prefix must be a string (got {prefix})"));
                    None
                }
            };
            if let (Some(path), Some(prefix)) = (path, prefix) {
                rules.elements.push(PrefixRule {
                    key: key.clone(),
                    path,
                    prefix,
                });
            }
        }
    }
    rules
}
