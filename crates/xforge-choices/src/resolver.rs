use std::collections::{BTreeMap, HashMap};

use xforge_config::{ChoiceEntry, ChoiceSpec};
use xforge_core::{Issue, IssueKind};
use xforge_parsers_xml::{Document, NodeId};
use xforge_xpath::{PathExpression, PathResolver, Shape};

use crate::condition::Condition;
use crate::snapshot::ValueSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceKind {
    /// Element name to option.
    Simple,
    /// Absolute path to option.
    PathSpecific,
    /// Ordered tests with an optional default.
    Conditional,
}

impl ChoiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChoiceKind::Simple => "simple",
            ChoiceKind::PathSpecific => "path-specific",
            ChoiceKind::Conditional => "conditional",
        }
    }
}

/// Outcome of evaluating one configured choice.
#[derive(Debug, Clone)]
pub struct ChoiceSelection {
    pub key: String,
    pub target: PathExpression,
    pub kind: ChoiceKind,
    /// `None` leaves the container untouched.
    pub selected: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PruneReport {
    pub selections: Vec<ChoiceSelection>,
    /// `PaymentInfo: removed /Root/PaymentInfo/Cash`
    pub removed: Vec<String>,
    pub notes: Vec<String>,
}

impl PruneReport {
    /// Selected options keyed by choice key.
    pub fn choices_used(&self) -> BTreeMap<String, String> {
        self.selections
            .iter()
            .filter_map(|s| s.selected.clone().map(|o| (s.key.clone(), o)))
            .collect()
    }
}

#[derive(Debug, Clone)]
struct Rule {
    condition: Condition,
    choose: String,
}

#[derive(Debug, Clone)]
enum Decision {
    Fixed(String),
    Conditional { rules: Vec<Rule>, default: Option<String> },
}

#[derive(Debug, Clone)]
struct Choice {
    key: String,
    target: PathExpression,
    kind: ChoiceKind,
    decision: Decision,
}

/// Picks one option per configured choice and prunes the rest.
pub struct ChoiceResolver {
    choices: Vec<Choice>,
    resolver: PathResolver,
    issues: Vec<Issue>,
}

impl ChoiceResolver {
    /// Malformed conditions are logged, recorded and skipped.
    pub fn new(entries: &[ChoiceEntry], prefixes: HashMap<String, String>) -> Self {
        let mut issues = Vec::new();
        let mut choices = Vec::with_capacity(entries.len());
        for entry in entries {
            let (kind, decision) = match &entry.spec {
                ChoiceSpec::Fixed(option) => {
                    // `{ns}/Root/X` is as anchored as `/Root/X`
                    let anchored = entry.target.shape() == Shape::Rooted && !entry.target.is_pattern();
                    let kind = if anchored {
                        ChoiceKind::PathSpecific
                    } else {
                        ChoiceKind::Simple
                    };
                    (kind, Decision::Fixed(option.clone()))
                }
                ChoiceSpec::Conditional { rules, default } => {
                    let mut parsed = Vec::with_capacity(rules.len());
                    for (i, r) in rules.iter().enumerate() {
                        match Condition::parse(&r.test) {
                            Ok(condition) => parsed.push(Rule {
                                condition,
                                choose: r.choose.clone(),
                            }),
                            Err(e) => {
                                tracing::warn!(event = "condition_skipped", choice = %entry.key, index = i + 1, error = %e);
                                issues.push(Issue::new(
                                    IssueKind::ConditionSkipped,
                                    entry.key.clone(),
                                    format!("condition #{} skipped: {e}", i + 1),
                                ));
                            }
                        }
                    }
                    (
                        ChoiceKind::Conditional,
                        Decision::Conditional {
                            rules: parsed,
                            default: default.clone(),
                        },
                    )
                }
            };
            choices.push(Choice {
                key: entry.key.clone(),
                target: entry.target.clone(),
                kind,
                decision,
            });
        }
        Self {
            choices,
            resolver: PathResolver::with_prefixes(prefixes),
            issues,
        }
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    /// Unconditional selections keyed by element name, for the baseline generator.
    pub fn base_generator_choices(&self) -> BTreeMap<String, String> {
        self.choices
            .iter()
            .filter_map(|c| match &c.decision {
                Decision::Fixed(option) => Some((c.target.target().local().to_string(), option.clone())),
                Decision::Conditional { .. } => None,
            })
            .collect()
    }

    /// Evaluate every choice against the snapshot, in declared order.
    pub fn resolve(&self, snapshot: &ValueSnapshot) -> Vec<ChoiceSelection> {
        self.choices
            .iter()
            .map(|c| {
                let selected = match &c.decision {
                    Decision::Fixed(o) => Some(o.clone()),
                    Decision::Conditional { rules, default } => rules
                        .iter()
                        .find(|r| r.condition.eval(snapshot))
                        .map(|r| r.choose.clone())
                        .or_else(|| default.clone()),
                };
                tracing::debug!(event = "choice_resolved", choice = %c.key, kind = c.kind.as_str(), selected = ?selected);
                ChoiceSelection {
                    key: c.key.clone(),
                    target: c.target.clone(),
                    kind: c.kind,
                    selected,
                }
            })
            .collect()
    }

    /// Remove element children of each matched container whose local name
    /// differs from the selected option.
    pub fn prune(&mut self, doc: &mut Document, selections: &[ChoiceSelection]) -> PruneReport {
        let mut report = PruneReport {
            selections: selections.to_vec(),
            ..PruneReport::default()
        };
        for sel in selections {
            let Some(option) = sel.selected.as_deref() else {
                report.notes.push(format!("{}: no condition matched and no default; left as is", sel.key));
                continue;
            };
            let containers: Vec<NodeId> = self
                .resolver
                .resolve(doc, &sel.target)
                .into_iter()
                .filter(|n| doc.is_attached(*n))
                .collect();
            if containers.is_empty() {
                report.notes.push(format!("{}: no element matches '{}'", sel.key, sel.target));
                continue;
            }
            for container in containers {
                let kids: Vec<NodeId> = doc.element_children(container).collect();
                let keep = |n: &NodeId| {
                    doc.local_name(*n) == option || doc.name(*n).is_some_and(|q| q.qualified() == option)
                };
                if !kids.iter().any(keep) {
                    let msg = format!("{} has no '{option}' child; left untouched", doc.path_of(container));
                    report.notes.push(format!("{}: {msg}", sel.key));
                    self.issues.push(Issue::new(IssueKind::ChoiceFailure, sel.key.clone(), msg));
                    continue;
                }
                let doomed: Vec<NodeId> = kids.iter().copied().filter(|n| !keep(n)).collect();
                for n in doomed {
                    let path = doc.path_of(n);
                    match doc.detach(n) {
                        Ok(()) => report.removed.push(format!("{}: removed {path}", sel.key)),
                        Err(e) => self.issues.push(Issue::new(IssueKind::ChoiceFailure, sel.key.clone(), e.to_string())),
                    }
                }
            }
        }
        report
    }

    /// Snapshot, evaluate and prune in one go.
    pub fn apply(&mut self, doc: &mut Document) -> PruneReport {
        let snapshot = ValueSnapshot::capture(doc);
        let selections = self.resolve(&snapshot);
        self.prune(doc, &selections)
    }

    pub fn take_issues(&mut self) -> Vec<Issue> {
        std::mem::take(&mut self.issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xforge_config::ConditionRule;
    use xforge_parsers_xml::WriteOptions;

    fn entry(key: &str, spec: ChoiceSpec) -> ChoiceEntry {
        ChoiceEntry {
            key: key.into(),
            target: xforge_xpath::parse(key).unwrap(),
            spec,
        }
    }

    fn rule(test: &str, choose: &str) -> ConditionRule {
        ConditionRule {
            test: test.into(),
            choose: choose.into(),
        }
    }

    fn compact(doc: &Document) -> String {
        doc.to_xml_string(&WriteOptions {
            declaration: false,
            indent: None,
        })
        .unwrap()
    }

    const ORDER: &str = "<Root><Amount>1500</Amount><PaymentInfo><CreditCard/><Cash/></PaymentInfo><Shipping><Express/><Standard/></Shipping></Root>";

    #[test]
    fn classifies_entries() {
        let r = ChoiceResolver::new(
            &[
                entry("PaymentInfo", ChoiceSpec::Fixed("CreditCard".into())),
                entry("/Root/Shipping", ChoiceSpec::Fixed("Express".into())),
                entry("{urn:pay}/Root/Method", ChoiceSpec::Fixed("Card".into())),
                entry("Order.Gift", ChoiceSpec::Fixed("Wrap".into())),
                entry(
                    "Gift",
                    ChoiceSpec::Conditional {
                        rules: vec![rule("Amount > 1", "Wrap")],
                        default: None,
                    },
                ),
            ],
            HashMap::new(),
        );
        let kinds: Vec<_> = r.choices.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            [
                ChoiceKind::Simple,
                ChoiceKind::PathSpecific,
                ChoiceKind::PathSpecific,
                ChoiceKind::Simple,
                ChoiceKind::Conditional
            ]
        );
        let base = r.base_generator_choices();
        assert_eq!(base.len(), 4);
        assert_eq!(base["Method"], "Card");
        assert_eq!(base["Shipping"], "Express");
    }

    #[test]
    fn prunes_unselected_siblings() {
        let mut doc = Document::parse(ORDER).unwrap();
        let mut r = ChoiceResolver::new(&[entry("PaymentInfo", ChoiceSpec::Fixed("CreditCard".into()))], HashMap::new());
        let report = r.apply(&mut doc);
        assert_eq!(
            compact(&doc),
            "<Root><Amount>1500</Amount><PaymentInfo><CreditCard/></PaymentInfo><Shipping><Express/><Standard/></Shipping></Root>"
        );
        assert_eq!(report.removed, ["PaymentInfo: removed /Root/PaymentInfo/Cash"]);
        assert_eq!(report.choices_used()["PaymentInfo"], "CreditCard");
    }

    #[test]
    fn first_matching_condition_wins() {
        let mut doc = Document::parse(ORDER).unwrap();
        let mut r = ChoiceResolver::new(
            &[entry(
                "Shipping",
                ChoiceSpec::Conditional {
                    rules: vec![rule("Amount > 1000", "Express"), rule("Amount > 0", "Standard")],
                    default: Some("Standard".into()),
                },
            )],
            HashMap::new(),
        );
        let report = r.apply(&mut doc);
        assert_eq!(report.selections[0].selected.as_deref(), Some("Express"));
        assert!(compact(&doc).contains("<Shipping><Express/></Shipping>"));
    }

    #[test]
    fn default_applies_when_nothing_matches() {
        let snap = ValueSnapshot::capture(&Document::parse(ORDER).unwrap());
        let r = ChoiceResolver::new(
            &[entry(
                "Shipping",
                ChoiceSpec::Conditional {
                    rules: vec![rule("Amount > 5000", "Express")],
                    default: Some("Standard".into()),
                },
            )],
            HashMap::new(),
        );
        assert_eq!(r.resolve(&snap)[0].selected.as_deref(), Some("Standard"));
        assert_eq!(r.resolve(&snap)[0].selected, r.resolve(&snap)[0].selected);
    }

    #[test]
    fn no_selection_leaves_the_tree_alone() {
        let mut doc = Document::parse(ORDER).unwrap();
        let before = compact(&doc);
        let mut r = ChoiceResolver::new(
            &[entry(
                "Shipping",
                ChoiceSpec::Conditional {
                    rules: vec![rule("Amount > 5000", "Express"), rule("Amount >>> 3", "Standard")],
                    default: None,
                },
            )],
            HashMap::new(),
        );
        let issues = r.take_issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::ConditionSkipped);
        let report = r.apply(&mut doc);
        assert_eq!(compact(&doc), before);
        assert!(report.removed.is_empty());
        assert_eq!(report.notes.len(), 1);
    }

    #[test]
    fn missing_option_keeps_the_container() {
        let mut doc = Document::parse(ORDER).unwrap();
        let before = compact(&doc);
        let mut r = ChoiceResolver::new(&[entry("PaymentInfo", ChoiceSpec::Fixed("Voucher".into()))], HashMap::new());
        r.apply(&mut doc);
        assert_eq!(compact(&doc), before);
        assert_eq!(r.take_issues()[0].kind, IssueKind::ChoiceFailure);
    }

    #[test]
    fn conditions_see_values_before_pruning() {
        let mut doc = Document::parse(
            "<Root><Kind><Business><VAT>NO123</VAT></Business><Private/></Kind><Billing><Invoice/><Card/></Billing></Root>",
        )
        .unwrap();
        let mut r = ChoiceResolver::new(
            &[
                entry("Kind", ChoiceSpec::Fixed("Private".into())),
                entry(
                    "Billing",
                    ChoiceSpec::Conditional {
                        rules: vec![rule("VAT matches '^NO'", "Invoice")],
                        default: Some("Card".into()),
                    },
                ),
            ],
            HashMap::new(),
        );
        r.apply(&mut doc);
        assert_eq!(
            compact(&doc),
            "<Root><Kind><Private/></Kind><Billing><Invoice/></Billing></Root>"
        );
    }
}
