use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// One data row: field name to text.
pub type Row = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum CyclingStrategy {
    /// Rows in order, wrapping at the end.
    #[default]
    Sequential,
    /// Uniform sampling with replacement.
    Random,
    /// Each row at most once, then nothing.
    Once,
    /// Same as sequential.
    Infinite,
}

impl CyclingStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Some(Self::Sequential),
            "random" => Some(Self::Random),
            "once" => Some(Self::Once),
            "infinite" => Some(Self::Infinite),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Random => "random",
            Self::Once => "once",
            Self::Infinite => "infinite",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedSpec {
    pub name: String,
    pub formula: String,
    /// Fields the formula must find in the row; empty means "infer from the formula".
    pub inputs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TemplateSpec {
    pub name: String,
    pub fields: Vec<String>,
    pub rows: Vec<Row>,
    pub cycle: CyclingStrategy,
    pub computed: Vec<ComputedSpec>,
    pub inheritance: Option<String>,
}

pub(crate) fn parse_template(name: &str, raw: &Value, errors: &mut Vec<String>) -> Option<TemplateSpec> {
    let ctx = format!("templates.{name}");
    let mut spec = TemplateSpec {
        name: name.to_string(),
        ..TemplateSpec::default()
    };
    let data = match raw {
        Value::Array(_) => Some(raw),
        Value::Object(obj) => {
            if let Some(c) = obj.get("cycle") {
                match c.as_str().and_then(CyclingStrategy::parse) {
                    Some(s) => spec.cycle = s,
                    None => errors.push(format!(
                        "{ctx}: cycle must be one of sequential, random, once, infinite (got {c})"
                    )),
                }
            }
            if let Some(f) = obj.get("fields") {
                match f.as_array() {
                    Some(list) if list.iter().all(Value::is_string) => {
                        spec.fields = list.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
                    }
                    _ => errors.push(format!("{ctx}: fields must be a list of strings")),
                }
            }
            if let Some(c) = obj.get("computed") {
                parse_computed(&ctx, c, &mut spec.computed, errors);
            }
            match obj.get("inheritance").or_else(|| obj.get("extends")) {
                Some(Value::String(p)) if !p.trim().is_empty() => spec.inheritance = Some(p.trim().to_string()),
                Some(other) => errors.push(format!("{ctx}: inheritance must name a template (got {other})")),
                None => {}
            }
            obj.get("data").or_else(|| obj.get("rows"))
        }
        other => {
            errors.push(format!("{ctx}: must be a list of rows or an object (got {other})"));
            return None;
        }
    };

    match data {
        Some(Value::Array(rows)) => {
            for (i, row) in rows.iter().enumerate() {
                match row {
                    Value::Object(map) => {
                        let mut flat = Row::new();
                        flatten_into(&mut flat, "", map);
                        if spec.fields.is_empty() && i == 0 {
                            spec.fields = field_order("", map);
                        }
                        spec.rows.push(flat);
                    }
                    other => errors.push(format!("{ctx}: row {} must be an object (got {other})", i + 1)),
                }
            }
        }
        Some(other) => errors.push(format!("{ctx}: data must be a list of rows (got {other})")),
        None => {}
    }

    if spec.rows.is_empty() && spec.inheritance.is_none() {
        errors.push(format!("{ctx}: needs at least one data row"));
    }
    Some(spec)
}

fn parse_computed(ctx: &str, raw: &Value, out: &mut Vec<ComputedSpec>, errors: &mut Vec<String>) {
    let Some(map) = raw.as_object() else {
        errors.push(format!("{ctx}: computed must be an object of name -> formula"));
        return;
    };
    for (name, v) in map {
        match v {
            Value::String(f) => out.push(ComputedSpec {
                name: name.clone(),
                formula: f.clone(),
                inputs: Vec::new(),
            }),
            Value::Object(o) => {
                let Some(formula) = o.get("formula").and_then(Value::as_str) else {
                    errors.push(format!("{ctx}.computed.{name}: formula must be a string"));
                    continue;
                };
                let inputs = o
                    .get("inputs")
                    .and_then(Value::as_array)
                    .map(|l| l.iter().filter_map(|s| s.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                out.push(ComputedSpec {
                    name: name.clone(),
                    formula: formula.to_string(),
                    inputs,
                });
            }
            other => errors.push(format!("{ctx}.computed.{name}: formula must be a string (got {other})")),
        }
    }
}

/// Nested objects become dotted field names.
fn flatten_into(out: &mut Row, prefix: &str, map: &Map<String, Value>) {
    for (k, v) in map {
        let key = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        match v {
            Value::Object(inner) => flatten_into(out, &key, inner),
            other => {
                out.insert(key, scalar_text(other));
            }
        }
    }
}

fn field_order(prefix: &str, map: &Map<String, Value>) -> Vec<String> {
    let mut out = Vec::new();
    for (k, v) in map {
        let key = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        match v {
            Value::Object(inner) => out.extend(field_order(&key, inner)),
            _ => out.push(key),
        }
    }
    out
}

pub(crate) fn scalar_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
