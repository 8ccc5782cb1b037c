use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum GenerationType {
    /// Baseline plus overrides.
    Enhanced,
    /// Baseline only.
    Base,
}

/// Everything a caller needs to judge one generation run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerationMetadata {
    pub schema_version: u32,
    pub generation_type: GenerationType,
    pub mode: String,
    pub elapsed_ms: u64,
    pub fallback_used: bool,
    /// Applied override descriptions, in application order.
    pub applied: Vec<String>,
    /// Overrides that matched nothing or were shadowed.
    pub skipped: Vec<String>,
    /// Non-fatal errors, in the order they happened.
    pub errors: Vec<String>,
    pub choices_used: BTreeMap<String, String>,
    pub repeats_used: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SectionCounts {
    pub values: usize,
    pub patterns: usize,
    pub choices: usize,
    pub templates: usize,
    pub repeats: usize,
    pub attributes: usize,
    pub namespace_rules: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConfigCheckFile {
    pub path: String,
    pub valid: bool,
    pub schema: Option<String>,
    pub mode: Option<String>,
    pub counts: Option<SectionCounts>,
    pub errors: Vec<String>,
    /// Template consistency notes; never fatal.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConfigCheckReport {
    pub schema_version: u32,
    pub checked: usize,
    pub files: Vec<ConfigCheckFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PathReport {
    pub input: String,
    pub valid: bool,
    pub kind: Option<String>,
    pub normalized: Option<String>,
    pub precedence: Option<u32>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TemplateSummary {
    pub name: String,
    pub fields: Vec<String>,
    pub rows: usize,
    pub cycle: String,
    pub computed: Vec<String>,
    pub parent: Option<String>,
    /// Rows handed out since the last reset.
    pub served: usize,
    pub distinct_rows_used: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TemplatePreview {
    pub schema_version: u32,
    pub template: String,
    pub rows: Vec<BTreeMap<String, String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_type_serializes_lowercase() {
        let s = serde_json::to_string(&GenerationType::Enhanced).unwrap();
        assert_eq!(s, "\"enhanced\"");
    }

    #[test]
    fn metadata_schema_lists_required_fields() {
        let schema = schemars::schema_for!(GenerationMetadata);
        let json = serde_json::to_value(&schema).unwrap();
        let required = json["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "fallback_used"));
        assert!(required.iter().any(|v| v == "applied"));
    }
}
