use std::collections::{BTreeMap, HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use xforge_config::{CyclingStrategy, Row, TemplateSpec};
use xforge_core::{CoreResult, Issue, IssueKind, XForgeError};
use xforge_domain::TemplateSummary;

use crate::formula::Formula;

#[derive(Debug, Clone)]
struct Computed {
    name: String,
    formula: Formula,
    inputs: Vec<String>,
}

#[derive(Debug, Clone)]
struct Template {
    fields: Vec<String>,
    rows: Vec<Row>,
    cycle: CyclingStrategy,
    computed: Vec<Computed>,
    parent: Option<String>,
    cursor: usize,
    used: HashSet<usize>,
    served: usize,
}

impl Template {
    fn rewind(&mut self) {
        self.cursor = 0;
        self.used.clear();
        self.served = 0;
    }
}

/// Stateful row source for every configured template.
///
/// Cursor state lives in the engine instance; create one engine per
/// generation request.
pub struct TemplateEngine {
    templates: BTreeMap<String, Template>,
    seed: Option<u64>,
    rng: StdRng,
    issues: Vec<Issue>,
}

fn rng_for(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

impl TemplateEngine {
    /// Build every template, resolving inheritance. Fails on an inheritance cycle.
    pub fn new(specs: &[TemplateSpec], seed: Option<u64>) -> CoreResult<Self> {
        let by_name: HashMap<&str, &TemplateSpec> = specs.iter().map(|s| (s.name.as_str(), s)).collect();
        let mut resolved: HashMap<String, TemplateSpec> = HashMap::new();
        for spec in specs {
            let mut visiting = Vec::new();
            resolve(&spec.name, &by_name, &mut resolved, &mut visiting)?;
        }

        let mut templates = BTreeMap::new();
        for spec in specs {
            let Some(flat) = resolved.remove(&spec.name) else {
                continue;
            };
            let computed = flat
                .computed
                .iter()
                .map(|c| Computed {
                    name: c.name.clone(),
                    formula: Formula::parse(&c.formula),
                    inputs: c.inputs.clone(),
                })
                .collect();
            templates.insert(
                spec.name.clone(),
                Template {
                    fields: flat.fields,
                    rows: flat.rows,
                    cycle: flat.cycle,
                    computed,
                    parent: spec.inheritance.clone(),
                    cursor: 0,
                    used: HashSet::new(),
                    served: 0,
                },
            );
        }
        tracing::debug!(event = "templates_loaded", count = templates.len());
        Ok(Self {
            templates,
            seed,
            rng: rng_for(seed),
            issues: Vec::new(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Next row according to the template's cycling strategy.
    pub fn next(&mut self, name: &str) -> Option<Row> {
        let t = self.templates.get_mut(name)?;
        if t.rows.is_empty() {
            return None;
        }
        let len = t.rows.len();
        let idx = match t.cycle {
            CyclingStrategy::Sequential | CyclingStrategy::Infinite => {
                let i = t.cursor % len;
                t.cursor = t.cursor.wrapping_add(1);
                i
            }
            CyclingStrategy::Random => self.rng.gen_range(0..len),
            CyclingStrategy::Once => {
                if t.cursor >= len {
                    tracing::debug!(event = "template_exhausted", template = name);
                    return None;
                }
                let i = t.cursor;
                t.cursor += 1;
                i
            }
        };
        t.used.insert(idx);
        t.served += 1;
        let row = t.rows[idx].clone();
        Some(apply_computed(name, &t.computed, row, &mut self.issues))
    }

    /// Row `index` (1-based) without moving the cursor.
    pub fn row_at(&mut self, name: &str, index: usize) -> Option<Row> {
        let t = self.templates.get(name)?;
        let row = t.rows.get(index.checked_sub(1)?)?.clone();
        Some(apply_computed(name, &t.computed, row, &mut self.issues))
    }

    /// One field of the next row.
    pub fn field(&mut self, name: &str, field: &str) -> Option<String> {
        self.next(name)?.remove(field)
    }

    /// Clear cursors for one template, or all of them (re-seeding the RNG).
    pub fn reset(&mut self, name: Option<&str>) {
        match name {
            Some(n) => {
                if let Some(t) = self.templates.get_mut(n) {
                    t.rewind();
                }
            }
            None => {
                for t in self.templates.values_mut() {
                    t.rewind();
                }
                self.rng = rng_for(self.seed);
                self.issues.clear();
            }
        }
    }

    /// Computation failures recorded since the last call.
    pub fn take_issues(&mut self) -> Vec<Issue> {
        std::mem::take(&mut self.issues)
    }

    pub fn summary(&self) -> Vec<TemplateSummary> {
        self.templates
            .iter()
            .map(|(name, t)| TemplateSummary {
                name: name.clone(),
                fields: t.fields.clone(),
                rows: t.rows.len(),
                cycle: t.cycle.as_str().to_string(),
                computed: t.computed.iter().map(|c| c.name.clone()).collect(),
                parent: t.parent.clone(),
                served: t.served,
                distinct_rows_used: t.used.len(),
            })
            .collect()
    }

    /// Consistency notes: rows lacking declared fields, computed inputs that
    /// no field or earlier computed field provides.
    pub fn validate(&self) -> Vec<String> {
        let mut notes = Vec::new();
        for (name, t) in &self.templates {
            for (i, row) in t.rows.iter().enumerate() {
                for f in &t.fields {
                    if !row.contains_key(f) {
                        notes.push(format!("template '{name}' row {} lacks field '{f}'", i + 1));
                    }
                }
            }
            let mut known: HashSet<&str> = t.fields.iter().map(String::as_str).collect();
            for row in &t.rows {
                known.extend(row.keys().map(String::as_str));
            }
            for c in &t.computed {
                let inputs = if c.inputs.is_empty() {
                    c.formula.inputs()
                } else {
                    c.inputs.clone()
                };
                if matches!(c.formula, Formula::Lookup(_)) && c.inputs.is_empty() {
                    known.insert(c.name.as_str());
                    continue;
                }
                for input in inputs {
                    if !known.contains(input.as_str()) {
                        notes.push(format!(
                            "template '{name}' computed field '{}' reads unknown field '{input}'",
                            c.name
                        ));
                    }
                }
                known.insert(c.name.as_str());
            }
        }
        notes
    }
}

fn apply_computed(template: &str, computed: &[Computed], mut row: Row, issues: &mut Vec<Issue>) -> Row {
    for c in computed {
        if let Some(missing) = c.inputs.iter().find(|i| !row.contains_key(*i)) {
            let msg = format!("declared input '{missing}' is missing");
            record_failure(template, &c.name, msg, issues);
            continue;
        }
        match c.formula.eval(&row) {
            Ok(Some(v)) => {
                row.insert(c.name.clone(), v);
            }
            Ok(None) => {}
            Err(msg) => record_failure(template, &c.name, msg, issues),
        }
    }
    row
}

fn record_failure(template: &str, field: &str, msg: String, issues: &mut Vec<Issue>) {
    tracing::warn!(event = "computed_field_failed", template, field, error = %msg);
    issues.push(Issue::new(
        IssueKind::ComputationFailure,
        format!("{template}.{field}"),
        msg,
    ));
}

/// Depth-first flattening of the inheritance chain ending at `name`.
fn resolve(
    name: &str,
    specs: &HashMap<&str, &TemplateSpec>,
    resolved: &mut HashMap<String, TemplateSpec>,
    visiting: &mut Vec<String>,
) -> CoreResult<()> {
    if resolved.contains_key(name) {
        return Ok(());
    }
    if let Some(pos) = visiting.iter().position(|v| v == name) {
        let mut cycle = visiting[pos..].to_vec();
        cycle.push(name.to_string());
        return Err(XForgeError::CircularReference(cycle));
    }
    let Some(spec) = specs.get(name) else {
        return Ok(());
    };
    visiting.push(name.to_string());
    let flat = match spec.inheritance.as_deref() {
        Some(parent) if specs.contains_key(parent) => {
            resolve(parent, specs, resolved, visiting)?;
            match resolved.get(parent) {
                Some(p) => inherit(p, spec),
                None => (*spec).clone(),
            }
        }
        Some(parent) => {
            tracing::warn!(event = "template_parent_missing", template = name, parent);
            (*spec).clone()
        }
        None => (*spec).clone(),
    };
    visiting.pop();
    resolved.insert(name.to_string(), flat);
    Ok(())
}

/// Child fields and computed fields merge over the parent's; rows only
/// come from the parent when the child has none.
fn inherit(parent: &TemplateSpec, child: &TemplateSpec) -> TemplateSpec {
    let mut fields = parent.fields.clone();
    for f in &child.fields {
        if !fields.contains(f) {
            fields.push(f.clone());
        }
    }
    let mut computed = parent.computed.clone();
    for c in &child.computed {
        match computed.iter_mut().find(|p| p.name == c.name) {
            Some(slot) => *slot = c.clone(),
            None => computed.push(c.clone()),
        }
    }
    TemplateSpec {
        name: child.name.clone(),
        fields,
        rows: if child.rows.is_empty() {
            parent.rows.clone()
        } else {
            child.rows.clone()
        },
        cycle: child.cycle,
        computed,
        inheritance: child.inheritance.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xforge_config::ComputedSpec;

    fn rows(values: &[&str]) -> Vec<Row> {
        values
            .iter()
            .map(|v| Row::from([("Name".to_string(), v.to_string())]))
            .collect()
    }

    fn spec(name: &str, names: &[&str], cycle: CyclingStrategy) -> TemplateSpec {
        TemplateSpec {
            name: name.into(),
            fields: vec!["Name".into()],
            rows: rows(names),
            cycle,
            ..TemplateSpec::default()
        }
    }

    fn names(engine: &mut TemplateEngine, t: &str, n: usize) -> Vec<Option<String>> {
        (0..n).map(|_| engine.field(t, "Name")).collect()
    }

    #[test]
    fn sequential_wraps_around() {
        let mut e = TemplateEngine::new(&[spec("t", &["a", "b", "c"], CyclingStrategy::Sequential)], None).unwrap();
        let got = names(&mut e, "t", 7);
        let expect: Vec<_> = ["a", "b", "c", "a", "b", "c", "a"].iter().map(|s| Some(s.to_string())).collect();
        assert_eq!(got, expect);
    }

    #[test]
    fn infinite_behaves_like_sequential() {
        let mut e = TemplateEngine::new(&[spec("t", &["a", "b"], CyclingStrategy::Infinite)], None).unwrap();
        assert_eq!(names(&mut e, "t", 3), [Some("a".to_string()), Some("b".to_string()), Some("a".to_string())]);
    }

    #[test]
    fn once_stops_after_each_row() {
        let mut e = TemplateEngine::new(&[spec("t", &["a", "b", "c"], CyclingStrategy::Once)], None).unwrap();
        let got = names(&mut e, "t", 5);
        assert_eq!(got[..3], [Some("a".to_string()), Some("b".to_string()), Some("c".to_string())]);
        assert_eq!(got[3..], [None, None]);
        e.reset(Some("t"));
        assert_eq!(e.field("t", "Name").as_deref(), Some("a"));
    }

    #[test]
    fn random_is_replayable_with_a_seed() {
        let specs = [spec("t", &["a", "b", "c", "d"], CyclingStrategy::Random)];
        let mut first = TemplateEngine::new(&specs, Some(42)).unwrap();
        let mut second = TemplateEngine::new(&specs, Some(42)).unwrap();
        let a = names(&mut first, "t", 20);
        assert_eq!(a, names(&mut second, "t", 20));
        assert!(a.iter().all(|n| n.is_some()));
        first.reset(None);
        assert_eq!(names(&mut first, "t", 20), a);
    }

    #[test]
    fn row_at_is_one_based_and_does_not_move_the_cursor() {
        let mut e = TemplateEngine::new(&[spec("t", &["a", "b"], CyclingStrategy::Sequential)], None).unwrap();
        assert_eq!(e.row_at("t", 2).unwrap()["Name"], "b");
        assert!(e.row_at("t", 0).is_none());
        assert!(e.row_at("t", 3).is_none());
        assert_eq!(e.field("t", "Name").as_deref(), Some("a"));
        assert!(e.next("missing").is_none());
    }

    #[test]
    fn computed_fields_see_the_current_row() {
        let mut s = TemplateSpec {
            name: "people".into(),
            fields: vec!["First".into(), "Last".into()],
            rows: vec![Row::from([
                ("First".to_string(), "Jane".to_string()),
                ("Last".to_string(), "Doe".to_string()),
            ])],
            ..TemplateSpec::default()
        };
        s.computed = vec![
            ComputedSpec {
                name: "Full".into(),
                formula: "concat(First,' ',Last)".into(),
                inputs: vec![],
            },
            ComputedSpec {
                name: "Greeting".into(),
                formula: "concat('Hi ', Full)".into(),
                inputs: vec![],
            },
            ComputedSpec {
                name: "Broken".into(),
                formula: "First + Last".into(),
                inputs: vec![],
            },
        ];
        let mut e = TemplateEngine::new(&[s], None).unwrap();
        let row = e.next("people").unwrap();
        assert_eq!(row["Full"], "Jane Doe");
        assert_eq!(row["Greeting"], "Hi Jane Doe");
        assert!(!row.contains_key("Broken"));
        let issues = e.take_issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::ComputationFailure);
        assert_eq!(issues[0].subject, "people.Broken");
    }

    #[test]
    fn children_inherit_rows_and_computed_fields() {
        let mut base = spec("base", &["a", "b"], CyclingStrategy::Sequential);
        base.computed = vec![ComputedSpec {
            name: "Label".into(),
            formula: "concat('#', Name)".into(),
            inputs: vec![],
        }];
        let child = TemplateSpec {
            name: "child".into(),
            fields: vec!["Extra".into()],
            cycle: CyclingStrategy::Once,
            inheritance: Some("base".into()),
            ..TemplateSpec::default()
        };
        let mut e = TemplateEngine::new(&[child, base], None).unwrap();
        let row = e.next("child").unwrap();
        assert_eq!(row["Label"], "#a");
        let summary = e.summary();
        let c = summary.iter().find(|s| s.name == "child").unwrap();
        assert_eq!(c.fields, ["Name", "Extra"]);
        assert_eq!(c.rows, 2);
        assert_eq!(c.cycle, "once");
        assert_eq!(c.served, 1);
    }

    #[test]
    fn inheritance_cycles_are_named() {
        let mut a = spec("a", &["x"], CyclingStrategy::Sequential);
        a.inheritance = Some("b".to_string());
        let mut b = spec("b", &["y"], CyclingStrategy::Sequential);
        b.inheritance = Some("a".to_string());
        match TemplateEngine::new(&[a, b], None) {
            Err(XForgeError::CircularReference(cycle)) => assert_eq!(cycle, ["a", "b", "a"]),
            other => panic!("expected a cycle, got {:?}", other.err()),
        }
    }

    #[test]
    fn missing_parent_is_ignored() {
        let mut orphan = spec("orphan", &["x"], CyclingStrategy::Sequential);
        orphan.inheritance = Some("ghost".into());
        let mut e = TemplateEngine::new(&[orphan], None).unwrap();
        assert_eq!(e.field("orphan", "Name").as_deref(), Some("x"));
    }

    #[test]
    fn validate_flags_inconsistent_rows() {
        let mut s = spec("t", &["a"], CyclingStrategy::Sequential);
        s.fields.push("Age".into());
        s.computed = vec![ComputedSpec {
            name: "Older".into(),
            formula: "Years + 1".into(),
            inputs: vec![],
        }];
        let e = TemplateEngine::new(&[s], None).unwrap();
        let notes = e.validate();
        assert_eq!(notes.len(), 2, "{notes:?}");
    }
}
