use std::path::{Path, PathBuf};

use color_eyre::eyre::WrapErr;
use schemars::schema::RootSchema;
use schemars::schema_for;
use xforge_config::XForgeSettings;
use xforge_domain::{ConfigCheckReport, GenerationMetadata, PathReport, TemplatePreview, TemplateSummary};

const DEFAULT_DIR: &str = "./docs/schemas";

/// Published report types, by file stem.
const REPORTS: &[(&str, fn() -> RootSchema)] = &[
    ("generation_metadata", || schema_for!(GenerationMetadata)),
    ("config_check_report", || schema_for!(ConfigCheckReport)),
    ("path_report", || schema_for!(PathReport)),
    ("template_preview", || schema_for!(TemplatePreview)),
    ("template_summary", || schema_for!(TemplateSummary)),
];

/// `--out-dir`, then `schema.out_dir` from xforge.toml, then `./docs/schemas`.
fn target_dir(out_dir: Option<PathBuf>, settings: &XForgeSettings) -> PathBuf {
    out_dir
        .or_else(|| settings.schema.as_ref().and_then(|s| s.out_dir.clone()).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DIR))
}

/// Write `<stem>.schema.json` for every report type; returns the paths in table order.
pub fn write_schemas(dir: &Path) -> color_eyre::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).wrap_err_with(|| format!("creating {}", dir.display()))?;
    let mut written = Vec::with_capacity(REPORTS.len());
    for (stem, schema) in REPORTS {
        let path = dir.join(format!("{stem}.schema.json"));
        let text = serde_json::to_string_pretty(&schema())?;
        std::fs::write(&path, text + "\n").wrap_err_with(|| format!("writing {}", path.display()))?;
        tracing::debug!(event = "schema_written", path = %path.display());
        written.push(path);
    }
    Ok(written)
}

pub fn run_schema(out_dir: Option<PathBuf>, settings: &XForgeSettings) -> color_eyre::Result<()> {
    let dir = target_dir(out_dir, settings);
    let written = write_schemas(&dir)?;
    for path in &written {
        crate::ui_out!("{}", path.display());
    }
    crate::ui_ok!("{} schema(s) written to {}", written.len(), dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use xforge_config::SchemaCfg;

    #[test]
    fn flag_beats_settings_beats_default() {
        let mut settings = XForgeSettings::default();
        assert_eq!(target_dir(None, &settings), PathBuf::from(DEFAULT_DIR));
        settings.schema = Some(SchemaCfg {
            out_dir: Some("from-settings".into()),
        });
        assert_eq!(target_dir(None, &settings), PathBuf::from("from-settings"));
        assert_eq!(target_dir(Some("flag".into()), &settings), PathBuf::from("flag"));
    }

    #[test]
    fn one_titled_schema_per_report() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_schemas(dir.path()).unwrap();
        assert_eq!(written.len(), REPORTS.len());
        let meta: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&written[0]).unwrap()).unwrap();
        assert_eq!(meta["title"], "GenerationMetadata");
        assert!(meta["properties"]["fallback_used"].is_object());
    }
}
