use once_cell::sync::Lazy;
use regex::Regex;
use xforge_core::{CoreResult, XForgeError};

/// Component names inside `/`-separated paths (dots allowed).
static SLASH_STEP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{L}_*][\w\-.:*]*$").expect("valid step regex"));
/// Component names inside dot-notation paths.
static DOT_STEP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{L}_*][\w\-:*]*$").expect("valid step regex"));
static ATTR_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{L}_*][\w\-.:*]*$").expect("valid attribute regex"));

/// Which addressing grammar an expression was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    Absolute,
    DotNotation,
    Simple,
    Pattern,
    Attribute,
    NamespaceQualified,
}

impl PathKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathKind::Absolute => "absolute",
            PathKind::DotNotation => "dot-notation",
            PathKind::Simple => "simple",
            PathKind::Pattern => "pattern",
            PathKind::Attribute => "attribute",
            PathKind::NamespaceQualified => "namespace-qualified",
        }
    }

    /// Type component of the precedence score; higher wins.
    fn rank(&self) -> u32 {
        match self {
            PathKind::Absolute => 6,
            PathKind::NamespaceQualified => 5,
            PathKind::DotNotation => 4,
            PathKind::Simple => 3,
            PathKind::Attribute => 2,
            PathKind::Pattern => 1,
        }
    }
}

impl std::fmt::Display for PathKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the steps are laid out, independent of the pattern/namespace tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// `/a/b`: anchored at the document root.
    Rooted,
    /// `a.b`: suffix of the ancestor chain.
    Dotted,
    /// `a`: a single step anywhere.
    Bare,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Step {
    pub name: String,
    /// Explicit 1-based position among same-named siblings.
    pub position: Option<usize>,
}

impl Step {
    pub fn is_wildcard(&self) -> bool {
        self.name.contains('*')
    }

    /// Position used when none was written.
    pub fn position_or_first(&self) -> usize {
        self.position.unwrap_or(1)
    }

    /// Name with any `prefix:` removed.
    pub fn local(&self) -> &str {
        self.name.rsplit_once(':').map(|(_, l)| l).unwrap_or(&self.name)
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)?;
        if let Some(p) = self.position {
            write!(f, "[{p}]")?;
        }
        Ok(())
    }
}

/// Parsed address. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathExpression {
    original: String,
    kind: PathKind,
    shape: Shape,
    steps: Vec<Step>,
    attribute: Option<String>,
    namespace: Option<String>,
    is_pattern: bool,
}

/// Ordering key derived from [`PathKind`] plus specificity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Precedence(pub u32);

impl std::fmt::Display for Precedence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PathExpression {
    pub fn original(&self) -> &str {
        &self.original
    }
    pub fn kind(&self) -> PathKind {
        self.kind
    }
    pub fn shape(&self) -> Shape {
        self.shape
    }
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
    pub fn is_pattern(&self) -> bool {
        self.is_pattern
    }
    /// Last step, i.e. the element being addressed.
    pub fn target(&self) -> &Step {
        // parse() never produces an empty step list
        &self.steps[self.steps.len() - 1]
    }
    pub fn has_explicit_position(&self) -> bool {
        self.steps.iter().any(|s| s.position.is_some())
    }
}

impl std::fmt::Display for PathExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&normalize(self))
    }
}

impl std::str::FromStr for PathExpression {
    type Err = XForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// Parse any of the supported grammars.
pub fn parse(text: &str) -> CoreResult<PathExpression> {
    let original = text.to_string();
    let mut rest = text.trim();
    if rest.is_empty() {
        return Err(XForgeError::syntax(text, "empty path"));
    }

    let mut namespace = None;
    if let Some(after) = rest.strip_prefix('{') {
        let Some((ns, tail)) = after.split_once('}') else {
            return Err(XForgeError::syntax(text, "unterminated '{' namespace qualifier"));
        };
        if ns.trim().is_empty() {
            return Err(XForgeError::syntax(text, "empty namespace qualifier"));
        }
        namespace = Some(ns.trim().to_string());
        rest = tail.trim();
        if rest.is_empty() {
            return Err(XForgeError::syntax(text, "namespace qualifier without a name"));
        }
    }

    let mut attribute = None;
    if let Some((element, attr)) = rest.rsplit_once('@') {
        if element.is_empty() {
            return Err(XForgeError::syntax(text, "attribute without an element"));
        }
        if !ATTR_NAME.is_match(attr) {
            return Err(XForgeError::syntax(text, format!("invalid attribute name '{attr}'")));
        }
        attribute = Some(attr.to_string());
        rest = element;
    }

    let (shape, raw_steps): (Shape, Vec<&str>) = if let Some(abs) = rest.strip_prefix('/') {
        if abs.starts_with('/') {
            return Err(XForgeError::syntax(text, "descendant axis '//' is not supported here"));
        }
        (Shape::Rooted, abs.split('/').collect())
    } else if rest.contains('/') {
        return Err(XForgeError::syntax(text, "relative '/' paths are not supported; use dot-notation"));
    } else if rest.contains('.') {
        (Shape::Dotted, rest.split('.').collect())
    } else {
        (Shape::Bare, vec![rest])
    };

    let step_re: &Regex = match shape {
        Shape::Dotted => &DOT_STEP,
        _ => &SLASH_STEP,
    };
    let mut steps = Vec::with_capacity(raw_steps.len());
    for raw in raw_steps {
        steps.push(parse_step(text, raw, step_re)?);
    }

    let is_pattern = steps.iter().any(Step::is_wildcard)
        || attribute.as_deref().is_some_and(|a| a.contains('*'));
    // A qualifier outranks wildcards: `{ns}*ID` ranks as namespace-qualified
    // (above dot and simple paths) and still matches as a pattern.
    let kind = if namespace.is_some() {
        PathKind::NamespaceQualified
    } else if is_pattern {
        PathKind::Pattern
    } else {
        match shape {
            Shape::Rooted => PathKind::Absolute,
            Shape::Dotted => PathKind::DotNotation,
            Shape::Bare if attribute.is_some() => PathKind::Attribute,
            Shape::Bare => PathKind::Simple,
        }
    };

    Ok(PathExpression {
        original,
        kind,
        shape,
        steps,
        attribute,
        namespace,
        is_pattern,
    })
}

fn parse_step(text: &str, raw: &str, re: &Regex) -> CoreResult<Step> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(XForgeError::syntax(text, "empty path component"));
    }
    let (name, position) = match raw.strip_suffix(']') {
        Some(head) => {
            let Some((name, idx)) = head.split_once('[') else {
                return Err(XForgeError::syntax(text, format!("unbalanced ']' in '{raw}'")));
            };
            let idx: usize = idx
                .trim()
                .parse()
                .map_err(|_| XForgeError::syntax(text, format!("index '{idx}' is not a number")))?;
            if idx == 0 {
                return Err(XForgeError::syntax(text, "indices are 1-based"));
            }
            (name, Some(idx))
        }
        None => (raw, None),
    };
    if !re.is_match(name) {
        return Err(XForgeError::syntax(text, format!("invalid name '{name}'")));
    }
    Ok(Step {
        name: name.to_string(),
        position,
    })
}

/// Canonical text for an expression; `parse(normalize(e))` yields `e` again.
pub fn normalize(expr: &PathExpression) -> String {
    let mut out = String::new();
    if let Some(ns) = &expr.namespace {
        out.push('{');
        out.push_str(ns);
        out.push('}');
    }
    let steps: Vec<String> = expr.steps.iter().map(Step::to_string).collect();
    match expr.shape {
        Shape::Rooted => {
            out.push('/');
            out.push_str(&steps.join("/"));
        }
        Shape::Dotted => out.push_str(&steps.join(".")),
        Shape::Bare => out.push_str(&steps.join("")),
    }
    if let Some(a) = &expr.attribute {
        out.push('@');
        out.push_str(a);
    }
    out
}

/// Precedence score: the grammar decides the thousands, specificity the rest.
pub fn precedence(expr: &PathExpression) -> Precedence {
    let mut specificity = 50 * expr.steps.len() as u32;
    if expr.has_explicit_position() {
        specificity += 100;
    }
    if expr.attribute.is_some() {
        specificity += 150;
    }
    Precedence(expr.kind.rank() * 1000 + specificity.min(999))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_every_grammar() {
        let cases = [
            ("/Root/Order/Amount", PathKind::Absolute),
            ("Order.Amount", PathKind::DotNotation),
            ("Amount", PathKind::Simple),
            ("Item@currency", PathKind::Attribute),
            ("{urn:x}Amount", PathKind::NamespaceQualified),
            ("*ID", PathKind::Pattern),
            ("/Root/*/Amount", PathKind::Pattern),
            ("Item@*Code", PathKind::Pattern),
            ("/Root/Item@id", PathKind::Absolute),
        ];
        for (text, kind) in cases {
            assert_eq!(parse(text).unwrap().kind(), kind, "{text}");
        }
    }

    #[test]
    fn rejects_malformed_paths() {
        for bad in ["", "  ", "/Root//A", "/Root/", "{urn:x", "{}A", "A[0]", "A[x]", "@id", "a/b", "1abc", "A@"] {
            assert!(
                matches!(parse(bad), Err(XForgeError::Syntax { .. })),
                "expected syntax error for {bad:?}"
            );
        }
    }

    #[test]
    fn normalization_is_idempotent() {
        for text in [
            "/Root/Items/Item[2]",
            " /Root/Item[1]@id ",
            "Order.Line.Amount",
            "Amount",
            "Item@currency",
            "{http://example.com/ns}Amount",
            "{p}/Root/Amount",
            "*ID",
            "*@Currency",
            "Order.*Total",
        ] {
            let once = normalize(&parse(text).unwrap());
            let twice = normalize(&parse(&once).unwrap());
            assert_eq!(once, twice, "{text}");
            assert_eq!(parse(&once).unwrap().steps(), parse(text).unwrap().steps());
        }
    }

    #[test]
    fn explicit_first_index_is_kept() {
        let e = parse("/Root/Item[1]").unwrap();
        assert_eq!(normalize(&e), "/Root/Item[1]");
        assert_eq!(e.target().position, Some(1));
        assert_eq!(parse("/Root/Item").unwrap().target().position_or_first(), 1);
    }

    #[test]
    fn precedence_follows_grammar_rank() {
        let ordered = [
            "/A",
            "{urn:x}A.B.C.D.E.F.G.H",
            "A.B",
            "A",
            "A@x",
            "/A/B/C/*",
        ];
        let scores: Vec<_> = ordered.iter().map(|p| precedence(&parse(p).unwrap())).collect();
        for pair in scores.windows(2) {
            assert!(pair[0] > pair[1], "{scores:?}");
        }
    }

    #[test]
    fn qualified_wildcards_rank_as_qualified() {
        let e = parse("{urn:pay}*ID").unwrap();
        assert_eq!(e.kind(), PathKind::NamespaceQualified);
        assert!(e.is_pattern());
        assert!(precedence(&e) > precedence(&parse("Order.OrderID").unwrap()));
        assert!(precedence(&e) < precedence(&parse("/Root/OrderID").unwrap()));
    }

    #[test]
    fn specificity_breaks_ties_within_a_grammar() {
        let short = precedence(&parse("/Root/A").unwrap());
        let long = precedence(&parse("/Root/A/B").unwrap());
        let indexed = precedence(&parse("/Root/A[2]").unwrap());
        assert!(long > short);
        assert!(indexed > short);
    }
}
