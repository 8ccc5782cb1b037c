use once_cell::sync::Lazy;
use regex::Regex;

static TEMPLATE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@([\w\-]+)(?:\[(\d+)\])?(?:\.([\w\-.]+))?$").expect("valid template ref regex")
});

/// `generate:<kind>[:param...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorSpec {
    pub raw: String,
    pub kind: String,
    pub params: Vec<String>,
}

impl GeneratorSpec {
    pub fn param(&self, i: usize) -> Option<&str> {
        self.params.get(i).map(String::as_str).filter(|p| !p.is_empty())
    }
}

/// `@template`, `@template[2]`, `@template.field`, `@template[2].field`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRef {
    pub raw: String,
    pub template: String,
    /// 1-based row pin; `None` draws the next row.
    pub row: Option<usize>,
    /// Single field; `None` means the whole row.
    pub field: Option<String>,
}

/// A configured value, classified once at load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSpec {
    Literal(String),
    Generator(GeneratorSpec),
    Template(TemplateRef),
}

impl ValueSpec {
    pub fn parse(raw: &str) -> Self {
        if let Some(rest) = raw.strip_prefix("generate:") {
            let mut parts = rest.split(':').map(|p| p.trim().to_string());
            let kind = parts.next().unwrap_or_default().to_ascii_lowercase();
            if !kind.is_empty() {
                return ValueSpec::Generator(GeneratorSpec {
                    raw: raw.to_string(),
                    kind,
                    params: parts.collect(),
                });
            }
        }
        if let Some(c) = TEMPLATE_REF.captures(raw) {
            return ValueSpec::Template(TemplateRef {
                raw: raw.to_string(),
                template: c[1].to_string(),
                row: c.get(2).and_then(|m| m.as_str().parse().ok()).filter(|n: &usize| *n > 0),
                field: c.get(3).map(|m| m.as_str().to_string()),
            });
        }
        ValueSpec::Literal(raw.to_string())
    }

    /// Text as it appeared in the configuration.
    pub fn raw(&self) -> &str {
        match self {
            ValueSpec::Literal(s) => s,
            ValueSpec::Generator(g) => &g.raw,
            ValueSpec::Template(t) => &t.raw,
        }
    }

    pub fn is_template(&self) -> bool {
        matches!(self, ValueSpec::Template(_))
    }
}
