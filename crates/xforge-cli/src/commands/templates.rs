use std::path::Path;

use color_eyre::eyre::{eyre, WrapErr};
use xforge_config::ConfigDocument;
use xforge_domain::{TemplatePreview, SCHEMA_VERSION};
use xforge_templates::TemplateEngine;

/// Draw `count` rows from each selected template, honouring its cycling strategy.
pub fn preview(engine: &mut TemplateEngine, names: &[String], count: usize) -> Vec<TemplatePreview> {
    names
        .iter()
        .map(|name| TemplatePreview {
            schema_version: SCHEMA_VERSION,
            template: name.clone(),
            rows: (0..count).map_while(|_| engine.next(name)).collect(),
        })
        .collect()
}

pub fn run_templates(
    config: &Path,
    template: Option<String>,
    count: usize,
    seed: Option<u64>,
    format: &str,
) -> color_eyre::Result<()> {
    let doc = ConfigDocument::load(config).wrap_err_with(|| format!("loading {}", config.display()))?;
    let mut engine = TemplateEngine::new(&doc.templates, seed.or(doc.seed))?;
    let names: Vec<String> = match template {
        Some(t) if engine.contains(&t) => vec![t],
        Some(t) => return Err(eyre!("template '{t}' is not defined in {}", config.display())),
        None => engine.names().map(str::to_string).collect(),
    };

    let previews = preview(&mut engine, &names, count);
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&previews)?);
    } else {
        let summary = engine.summary();
        for p in &previews {
            let info = summary.iter().find(|s| s.name == p.template);
            match info {
                Some(s) => crate::ui_out!(
                    "{} ({} rows, {}{})",
                    p.template,
                    s.rows,
                    s.cycle,
                    s.parent.as_deref().map(|x| format!(", extends {x}")).unwrap_or_default()
                ),
                None => crate::ui_out!("{}", p.template),
            }
            for (i, row) in p.rows.iter().enumerate() {
                let fields: Vec<String> = row.iter().map(|(k, v)| format!("{k}={v}")).collect();
                crate::ui_out!("  {:>3}  {}", i + 1, fields.join(", "));
            }
        }
    }
    for note in engine.validate() {
        crate::ui_warn!("{note}");
    }
    for issue in engine.take_issues() {
        crate::ui_warn!("{issue}");
    }
    Ok(())
}
