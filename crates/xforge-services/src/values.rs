use xforge_config::{Row, TemplateRef, ValueSpec};
use xforge_templates::TemplateEngine;

use crate::generators::ValueGenerator;

/// Supplies the rows template references read.
pub trait RowSource {
    /// Row for `r` at its `ordinal`-th use; pinned references (`@t[n]`) ignore the ordinal.
    fn row(&mut self, r: &TemplateRef, ordinal: usize) -> Option<Row>;
}

/// Straight from the engine: pinned row or the next one by cycling strategy.
impl RowSource for TemplateEngine {
    fn row(&mut self, r: &TemplateRef, _ordinal: usize) -> Option<Row> {
        match r.row {
            Some(n) => self.row_at(&r.template, n),
            None => self.next(&r.template),
        }
    }
}

/// Turn configured value text into the text to write.
///
/// Literals come back as-is. Generators and template references that
/// cannot be resolved also come back unchanged.
pub fn resolve_value(raw: &str, templates: &mut TemplateEngine, generator: &mut ValueGenerator) -> String {
    resolve_spec(&ValueSpec::parse(raw), templates, generator)
}

pub fn resolve_spec(spec: &ValueSpec, templates: &mut TemplateEngine, generator: &mut ValueGenerator) -> String {
    try_resolve(spec, templates, generator, 0).unwrap_or_else(|| spec.raw().to_string())
}

/// `None` when a generator spec is unusable or a reference yields no row or field.
pub fn try_resolve(
    spec: &ValueSpec,
    rows: &mut impl RowSource,
    generator: &mut ValueGenerator,
    ordinal: usize,
) -> Option<String> {
    let resolved = match spec {
        ValueSpec::Literal(text) => return Some(text.clone()),
        ValueSpec::Generator(g) => generator.generate(g),
        ValueSpec::Template(r) => rows.row(r, ordinal).and_then(|row| render(r, row)),
    };
    if resolved.is_none() {
        tracing::debug!(event = "value_unresolved", raw = spec.raw());
    }
    resolved
}

/// One field, or the whole row as a JSON object.
fn render(r: &TemplateRef, mut row: Row) -> Option<String> {
    match &r.field {
        Some(f) => row.remove(f),
        None => serde_json::to_string(&row).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xforge_config::{CyclingStrategy, TemplateSpec};

    fn engine() -> TemplateEngine {
        let rows = ["Jane", "Ola"]
            .iter()
            .map(|n| Row::from([("Name".to_string(), n.to_string()), ("Tier".to_string(), "gold".to_string())]))
            .collect();
        let spec = TemplateSpec {
            name: "people".into(),
            fields: vec!["Name".into(), "Tier".into()],
            rows,
            cycle: CyclingStrategy::Sequential,
            computed: Vec::new(),
            inheritance: None,
        };
        TemplateEngine::new(&[spec], Some(1)).unwrap()
    }

    #[test]
    fn dispatches_on_value_kind() {
        let mut t = engine();
        let mut g = ValueGenerator::new(Some(1));
        assert_eq!(resolve_value("plain", &mut t, &mut g), "plain");
        assert_eq!(resolve_value("@people.Name", &mut t, &mut g), "Jane");
        assert_eq!(resolve_value("@people.Name", &mut t, &mut g), "Ola");
        assert_eq!(resolve_value("@people[1].Name", &mut t, &mut g), "Jane");
        assert_eq!(resolve_value("generate:alpha:3", &mut t, &mut g).len(), 3);
        assert_eq!(
            resolve_value("@people[2]", &mut t, &mut g),
            r#"{"Name":"Ola","Tier":"gold"}"#
        );
    }

    #[test]
    fn try_resolve_reports_what_resolve_value_papers_over() {
        let mut t = engine();
        let mut g = ValueGenerator::new(Some(1));
        for raw in ["@people.Missing", "generate:number:9:1", "generate:alpha:100000000"] {
            assert_eq!(try_resolve(&ValueSpec::parse(raw), &mut t, &mut g, 0), None, "{raw}");
        }
        let name = try_resolve(&ValueSpec::parse("@people[2].Name"), &mut t, &mut g, 7);
        assert_eq!(name.as_deref(), Some("Ola"));
    }

    #[test]
    fn unresolvable_text_is_returned_unchanged() {
        let mut t = engine();
        let mut g = ValueGenerator::new(None);
        for raw in ["@nobody.Name", "@people.Missing", "@people[9].Name", "generate:teleport"] {
            assert_eq!(resolve_value(raw, &mut t, &mut g), raw);
        }
    }
}
