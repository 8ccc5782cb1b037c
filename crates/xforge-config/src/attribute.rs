use once_cell::sync::Lazy;
use regex::Regex;
use xforge_core::{CoreResult, XForgeError};
use xforge_xpath::PathExpression;

use crate::value::ValueSpec;

static HAS_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^//([\p{L}_*][\w\-.:*]*)\[@([\p{L}_*][\w\-.:*]*)\]$").expect("valid selector regex")
});
static ATTR_STEP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^//([\p{L}_*][\w\-.:*]*)/@([\p{L}_*][\w\-.:*]*)$").expect("valid selector regex")
});

/// Address of the attributes an `attributes` entry writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeSelector {
    /// `//E[@a]`: only elements that already carry `a`.
    Existing { element: String, attribute: String },
    /// `//E/@a`: every `E`, creating `a` where missing.
    Every { element: String, attribute: String },
    /// `E@a`, `/R/E@a`, ...: path grammar with an attribute suffix.
    Path(PathExpression),
}

impl AttributeSelector {
    pub fn parse(text: &str) -> CoreResult<Self> {
        let t = text.trim();
        if let Some(c) = HAS_ATTR.captures(t) {
            return Ok(Self::Existing {
                element: c[1].to_string(),
                attribute: c[2].to_string(),
            });
        }
        if let Some(c) = ATTR_STEP.captures(t) {
            return Ok(Self::Every {
                element: c[1].to_string(),
                attribute: c[2].to_string(),
            });
        }
        let expr = xforge_xpath::parse(t)?;
        if expr.attribute().is_none() {
            return Err(XForgeError::syntax(text, "attribute selector must name an attribute"));
        }
        Ok(Self::Path(expr))
    }
}

#[derive(Debug, Clone)]
pub struct AttributeEntry {
    pub key: String,
    pub selector: AttributeSelector,
    pub value: ValueSpec,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_three_selector_forms() {
        assert_eq!(
            AttributeSelector::parse("//*[@currency]").unwrap(),
            AttributeSelector::Existing {
                element: "*".into(),
                attribute: "currency".into()
            }
        );
        assert_eq!(
            AttributeSelector::parse("//Amount/@currency").unwrap(),
            AttributeSelector::Every {
                element: "Amount".into(),
                attribute: "currency".into()
            }
        );
        assert!(matches!(
            AttributeSelector::parse("/Root/Amount@currency").unwrap(),
            AttributeSelector::Path(_)
        ));
    }

    #[test]
    fn selectors_without_attributes_are_rejected() {
        assert!(AttributeSelector::parse("/Root/Amount").is_err());
        assert!(AttributeSelector::parse("//Amount").is_err());
    }
}
