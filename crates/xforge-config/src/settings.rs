use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const SETTINGS_FILE: &str = "xforge.toml";

/// Tool defaults read from `xforge.toml`. Every field is optional; command
/// line flags win over whatever is found here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct XForgeSettings {
    pub mode: Option<String>,
    pub seed: Option<u64>,
    pub strict: Option<bool>,
    pub output: Option<OutputCfg>,
    pub baseline: Option<BaselineCfg>,
    pub log: Option<LogCfg>,
    pub schema: Option<SchemaCfg>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputCfg {
    pub indent: Option<usize>,
    pub declaration: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BaselineCfg {
    /// External generator invoked as `<command> [args...] --xsd .. --mode ..`.
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogCfg {
    pub dir: Option<String>,
    pub level: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaCfg {
    pub out_dir: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Search order: CWD/xforge.toml, then `$CONFIG_DIR/xforge/xforge.toml`.
/// Unreadable or malformed files are skipped.
pub fn load_config() -> Result<XForgeSettings, ConfigError> {
    let mut candidates = Vec::new();
    if let Ok(p) = std::env::current_dir() {
        candidates.push(p.join(SETTINGS_FILE));
    }
    if let Some(base) = dirs::config_dir() {
        candidates.push(base.join("xforge").join(SETTINGS_FILE));
    }
    let mut merged = XForgeSettings::default();
    for path in candidates {
        match load_settings_from(&path) {
            Ok(cfg) => merged = merge(merged, cfg),
            Err(ConfigError::Read { .. }) => {}
            Err(e) => tracing::warn!(event = "settings_skipped", error = %e),
        }
    }
    Ok(merged)
}

/// Strict single-file load.
pub fn load_settings_from(path: &Path) -> Result<XForgeSettings, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str::<XForgeSettings>(&s).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// First value wins per key.
pub fn merge(mut a: XForgeSettings, b: XForgeSettings) -> XForgeSettings {
    if a.mode.is_none() {
        a.mode = b.mode;
    }
    if a.seed.is_none() {
        a.seed = b.seed;
    }
    if a.strict.is_none() {
        a.strict = b.strict;
    }
    a.output = merge_opt(a.output, b.output, merge_output);
    a.baseline = merge_opt(a.baseline, b.baseline, merge_baseline);
    a.log = merge_opt(a.log, b.log, merge_log);
    a.schema = merge_opt(a.schema, b.schema, merge_schema);
    a
}

fn merge_opt<T: Default>(a: Option<T>, b: Option<T>, f: fn(T, T) -> T) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(f(a, b)),
        (None, Some(b)) => Some(b),
        (Some(a), None) => Some(a),
        (None, None) => None,
    }
}

fn merge_output(mut a: OutputCfg, b: OutputCfg) -> OutputCfg {
    if a.indent.is_none() {
        a.indent = b.indent;
    }
    if a.declaration.is_none() {
        a.declaration = b.declaration;
    }
    a
}

fn merge_baseline(mut a: BaselineCfg, b: BaselineCfg) -> BaselineCfg {
    if a.command.is_none() {
        a.command = b.command;
        if a.args.is_none() {
            a.args = b.args;
        }
    }
    a
}

fn merge_log(mut a: LogCfg, b: LogCfg) -> LogCfg {
    if a.dir.is_none() {
        a.dir = b.dir;
    }
    if a.level.is_none() {
        a.level = b.level;
    }
    a
}

fn merge_schema(mut a: SchemaCfg, b: SchemaCfg) -> SchemaCfg {
    if a.out_dir.is_none() {
        a.out_dir = b.out_dir;
    }
    a
}
