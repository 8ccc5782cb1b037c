use once_cell::sync::Lazy;
use regex::Regex;

use crate::snapshot::ValueSnapshot;

static IN_LIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^\s<>=!]+)\s+in\s+\[(.*)\]$").expect("valid in regex"));
static MATCHES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^\s<>=!]+)\s+matches\s+(.+)$").expect("valid matches regex"));
static COMPARE: Lazy<Regex> = Lazy::new(|| {
    // an unquoted literal may not start with an operator character (`a >>> 3`)
    Regex::new(r"^([^\s<>=!]+)\s*(>=|<=|==|!=|>|<)\s*([^\s<>=!].*)$").expect("valid comparison regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl Operator {
    fn parse(op: &str) -> Option<Self> {
        Some(match op {
            ">" => Operator::Gt,
            "<" => Operator::Lt,
            ">=" => Operator::Ge,
            "<=" => Operator::Le,
            "==" => Operator::Eq,
            "!=" => Operator::Ne,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub enum Test {
    Compare { op: Operator, literal: String },
    In(Vec<String>),
    Matches(Regex),
}

#[derive(Debug, Clone)]
pub struct Comparison {
    pub field: String,
    pub test: Test,
}

/// `a && b || c`: disjunction of conjunctions (`&&` binds tighter).
#[derive(Debug, Clone)]
pub struct Condition {
    any: Vec<Vec<Comparison>>,
}

impl Condition {
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut any = Vec::new();
        for group in split_top(text, "||") {
            let mut all = Vec::new();
            for part in split_top(&group, "&&") {
                all.push(parse_comparison(part.trim())?);
            }
            any.push(all);
        }
        Ok(Self { any })
    }

    /// Pure function of the snapshot.
    pub fn eval(&self, snapshot: &ValueSnapshot) -> bool {
        self.any
            .iter()
            .any(|all| all.iter().all(|c| c.eval(snapshot)))
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.any.iter().flatten().map(|c| c.field.as_str())
    }
}

impl Comparison {
    fn eval(&self, snapshot: &ValueSnapshot) -> bool {
        // absent fields never satisfy a test
        let Some(value) = snapshot.get(&self.field) else {
            return false;
        };
        match &self.test {
            Test::Compare { op, literal } => compare(value, *op, literal),
            Test::In(list) => list.iter().any(|item| equal(value, item)),
            Test::Matches(re) => re.is_match(value),
        }
    }
}

fn numbers(a: &str, b: &str) -> Option<(f64, f64)> {
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

fn equal(a: &str, b: &str) -> bool {
    match numbers(a, b) {
        Some((x, y)) => x == y,
        None => a == b,
    }
}

fn compare(value: &str, op: Operator, literal: &str) -> bool {
    let ordered = |f: fn(f64, f64) -> bool| numbers(value, literal).is_some_and(|(x, y)| f(x, y));
    match op {
        Operator::Eq => equal(value, literal),
        Operator::Ne => !equal(value, literal),
        Operator::Gt => ordered(|x, y| x > y),
        Operator::Lt => ordered(|x, y| x < y),
        Operator::Ge => ordered(|x, y| x >= y),
        Operator::Le => ordered(|x, y| x <= y),
    }
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    for q in ['\'', '"'] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return s[1..s.len() - 1].to_string();
        }
    }
    s.to_string()
}

fn parse_comparison(text: &str) -> Result<Comparison, String> {
    if text.is_empty() {
        return Err("empty condition".to_string());
    }
    if let Some(c) = IN_LIST.captures(text) {
        let items = split_top(&c[2], ",")
            .into_iter()
            .map(|s| unquote(&s))
            .filter(|s| !s.is_empty())
            .collect();
        return Ok(Comparison {
            field: c[1].to_string(),
            test: Test::In(items),
        });
    }
    if let Some(c) = MATCHES.captures(text) {
        let pattern = unquote(&c[2]);
        let re = Regex::new(&pattern).map_err(|e| format!("invalid regex '{pattern}': {e}"))?;
        return Ok(Comparison {
            field: c[1].to_string(),
            test: Test::Matches(re),
        });
    }
    if let Some(c) = COMPARE.captures(text) {
        let op = Operator::parse(&c[2]).ok_or_else(|| format!("unknown operator '{}'", &c[2]))?;
        return Ok(Comparison {
            field: c[1].to_string(),
            test: Test::Compare {
                op,
                literal: unquote(&c[3]),
            },
        });
    }
    Err(format!("cannot parse condition '{text}'"))
}

/// Split on `sep` outside quotes and brackets.
fn split_top(text: &str, sep: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0i32;
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        if quote.is_none() && depth == 0 && rest.starts_with(sep) {
            parts.push(std::mem::take(&mut current));
            rest = &rest[sep.len()..];
            continue;
        }
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth -= 1,
            _ => {}
        }
        current.push(c);
        rest = &rest[c.len_utf8()..];
    }
    parts.push(current);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap() -> ValueSnapshot {
        let mut s = ValueSnapshot::default();
        s.insert("Root/Amount", "1500");
        s.insert("Root/Customer/Type", "VIP");
        s.insert("Root/Country", "NO");
        s.insert("Root/Email", "jane@example.com");
        s
    }

    fn holds(text: &str) -> bool {
        Condition::parse(text).unwrap().eval(&snap())
    }

    #[test]
    fn numeric_comparisons_coerce() {
        assert!(holds("Amount > 1000"));
        assert!(holds("Amount >= 1500"));
        assert!(!holds("Amount < 1500"));
        assert!(holds("Amount <= 1500.0"));
        assert!(holds("Amount == 1500.00"));
        assert!(!holds("Type > 3"), "non-numeric coercion is false");
    }

    #[test]
    fn string_equality_strips_quotes() {
        assert!(holds("Customer.Type == 'VIP'"));
        assert!(holds("/Root/Customer/Type == \"VIP\""));
        assert!(holds("Type != 'Regular'"));
    }

    #[test]
    fn membership_and_regex() {
        assert!(holds("Country in ['NO', 'SE', 'DK']"));
        assert!(!holds("Country in [US, CA]"));
        assert!(holds("Email matches '.*@example\\.com$'"));
        assert!(!holds("Email matches '^admin@'"));
    }

    #[test]
    fn absent_fields_are_false() {
        assert!(!holds("Missing == 'x'"));
        assert!(!holds("Missing != 'x'"));
        assert!(!holds("Missing in [x]"));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        assert!(holds("Amount > 2000 || Type == 'VIP' && Country == 'NO'"));
        assert!(!holds("Amount > 2000 && Type == 'VIP' || Country == 'SE'"));
        assert!(holds("Country in ['A||B', 'NO']"), "separators inside lists are literal");
    }

    #[test]
    fn malformed_conditions_fail_to_parse() {
        for bad in [
            "",
            "Amount",
            "Amount >",
            "Email matches '('",
            "&& Amount > 1",
            "Amount >>> 3",
            "Amount => 3",
            "Amount == = 3",
            "Amount <> 3",
        ] {
            assert!(Condition::parse(bad).is_err(), "{bad:?}");
        }
    }
}
