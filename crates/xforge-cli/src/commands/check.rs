use std::path::{Path, PathBuf};

use color_eyre::eyre::eyre;
use owo_colors::OwoColorize;
use walkdir::WalkDir;
use xforge_config::{ConfigDocument, SETTINGS_FILE};
use xforge_domain::{ConfigCheckFile, ConfigCheckReport, SectionCounts, SCHEMA_VERSION};
use xforge_templates::TemplateEngine;

fn is_config_file(p: &Path) -> bool {
    let ext_ok = p
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json") || ext.eq_ignore_ascii_case("toml"));
    ext_ok && p.file_name().and_then(|n| n.to_str()) != Some(SETTINGS_FILE)
}

fn collect(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for root in paths {
        if root.is_dir() {
            for entry in WalkDir::new(root).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
                let p = entry.path();
                if p.is_file() && is_config_file(p) {
                    files.push(p.to_path_buf());
                }
            }
        } else {
            // explicit files are checked whatever their extension
            files.push(root.clone());
        }
    }
    files
}

pub fn check_file(path: &Path) -> ConfigCheckFile {
    let mut report = ConfigCheckFile {
        path: path.display().to_string(),
        valid: false,
        schema: None,
        mode: None,
        counts: None,
        errors: Vec::new(),
        warnings: Vec::new(),
    };
    let doc = match ConfigDocument::load(path) {
        Ok(doc) => doc,
        Err(e) => {
            report.errors = e.problems();
            return report;
        }
    };
    report.schema = Some(doc.schema.clone());
    report.mode = Some(doc.mode.as_str().to_string());
    report.counts = Some(SectionCounts {
        values: doc.values.len(),
        patterns: doc.patterns.len(),
        choices: doc.choices.len(),
        templates: doc.templates.len(),
        repeats: doc.repeats.len(),
        attributes: doc.attributes.len(),
        namespace_rules: doc.namespaces.elements.len(),
    });
    match TemplateEngine::new(&doc.templates, doc.seed) {
        Ok(engine) => {
            report.warnings = engine.validate();
            report.valid = true;
        }
        Err(e) => report.errors = e.problems(),
    }
    report
}

pub fn run_check(paths: Vec<PathBuf>, format: &str, use_color: bool) -> color_eyre::Result<()> {
    tracing::debug!(event = "check_args", paths = ?paths, format = %format);
    let files: Vec<ConfigCheckFile> = collect(&paths).iter().map(|p| check_file(p)).collect();
    let invalid = files.iter().filter(|f| !f.valid).count();
    let report = ConfigCheckReport {
        schema_version: SCHEMA_VERSION,
        checked: files.len(),
        files,
    };

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for f in &report.files {
            if f.valid {
                let counts = f.counts.clone().unwrap_or_default();
                let summary = format!(
                    "{} values, {} patterns, {} choices, {} templates",
                    counts.values, counts.patterns, counts.choices, counts.templates
                );
                if use_color {
                    crate::ui_ok!("{} ({})", f.path.green(), summary.dimmed());
                } else {
                    crate::ui_ok!("{} ({})", f.path, summary);
                }
            } else if use_color {
                crate::ui_err!("{}", f.path.red());
            } else {
                crate::ui_err!("{}", f.path);
            }
            for e in &f.errors {
                crate::ui_out!("  - {e}");
            }
            for w in &f.warnings {
                if use_color {
                    crate::ui_out!("  ~ {}", w.yellow());
                } else {
                    crate::ui_out!("  ~ {w}");
                }
            }
        }
    }

    if report.checked == 0 {
        return Err(eyre!("no configuration files found"));
    }
    if invalid > 0 {
        return Err(eyre!("{invalid} of {} configuration file(s) invalid", report.checked));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_and_foreign_files_are_skipped_in_directories() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.json", "b.toml", "notes.txt", SETTINGS_FILE] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let found: Vec<String> = collect(&[dir.path().to_path_buf()])
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(found, ["a.json", "b.toml"]);
    }

    #[test]
    fn reports_problems_and_template_notes() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, r#"{"mode": "loud"}"#).unwrap();
        let report = check_file(&bad);
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 2, "{:?}", report.errors);

        let good = dir.path().join("good.json");
        std::fs::write(
            &good,
            r#"{"schema": "s.xsd", "mode": "complete",
                "templates": {"t": {"fields": ["a", "b"], "data": [{"a": "1"}]}}}"#,
        )
        .unwrap();
        let report = check_file(&good);
        assert!(report.valid);
        assert_eq!(report.counts.unwrap().templates, 1);
        assert_eq!(report.warnings.len(), 1);
    }
}
