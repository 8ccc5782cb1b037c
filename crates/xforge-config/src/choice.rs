use serde_json::Value;
use xforge_xpath::PathExpression;

/// One `{"if": ..., "choose": ...}` pair, test text kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionRule {
    pub test: String,
    pub choose: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChoiceSpec {
    /// Always pick this option.
    Fixed(String),
    /// First matching rule wins, then the default.
    Conditional {
        rules: Vec<ConditionRule>,
        default: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct ChoiceEntry {
    pub key: String,
    pub target: PathExpression,
    pub spec: ChoiceSpec,
}

pub(crate) fn parse_choice(key: &str, raw: &Value, errors: &mut Vec<String>) -> Option<ChoiceSpec> {
    let ctx = format!("choices.{key}");
    match raw {
        Value::String(s) if !s.trim().is_empty() => Some(ChoiceSpec::Fixed(s.trim().to_string())),
        Value::Object(obj) => {
            let mut ok = true;
            let mut rules = Vec::new();
            match obj.get("conditions") {
                Some(Value::Array(list)) => {
                    for (i, c) in list.iter().enumerate() {
                        let test = c.get("if").and_then(Value::as_str).map(str::trim);
                        let choose = c.get("choose").and_then(Value::as_str).map(str::trim);
                        match (test, choose) {
                            (Some(t), Some(ch)) if !t.is_empty() && !ch.is_empty() => rules.push(ConditionRule {
                                test: t.to_string(),
                                choose: ch.to_string(),
                            }),
                            _ => {
                                ok = false;
                                errors.push(format!(
                                    "{ctx}: condition #{} needs both a non-empty 'if' and 'choose'",
                                    i + 1
                                ));
                            }
                        }
                    }
                }
                Some(other) => {
                    ok = false;
                    errors.push(format!("{ctx}: conditions must be a list (got {other})"));
                }
                None => {}
            }
            let default = match obj.get("default") {
                Some(Value::String(d)) if !d.trim().is_empty() => Some(d.trim().to_string()),
                Some(other) => {
                    ok = false;
                    errors.push(format!("{ctx}: default must be a non-empty string (got {other})"));
                    None
                }
                None => None,
            };
            if rules.is_empty() && default.is_none() && ok {
                errors.push(format!("{ctx}: needs at least one condition or a default"));
                return None;
            }
            ok.then_some(ChoiceSpec::Conditional { rules, default })
        }
        other => {
            errors.push(format!("{ctx}: must be an option name or a conditional object (got {other})"));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fixed_and_conditional_forms() {
        let mut errors = Vec::new();
        assert_eq!(
            parse_choice("PaymentInfo", &json!("CreditCard"), &mut errors),
            Some(ChoiceSpec::Fixed("CreditCard".into()))
        );
        let spec = parse_choice(
            "Shipping",
            &json!({"conditions": [{"if": "Amount > 100", "choose": "Express"}], "default": "Standard"}),
            &mut errors,
        );
        assert!(errors.is_empty());
        match spec {
            Some(ChoiceSpec::Conditional { rules, default }) => {
                assert_eq!(rules[0].choose, "Express");
                assert_eq!(default.as_deref(), Some("Standard"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn incomplete_rules_are_violations() {
        let mut errors = Vec::new();
        let spec = parse_choice(
            "Shipping",
            &json!({"conditions": [{"if": "Amount > 100"}, {"choose": "X"}]}),
            &mut errors,
        );
        assert!(spec.is_none());
        assert_eq!(errors.len(), 2);
        parse_choice("Empty", &json!(""), &mut errors);
        assert_eq!(errors.len(), 3);
    }
}
