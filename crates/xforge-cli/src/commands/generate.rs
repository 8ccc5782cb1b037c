use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use color_eyre::eyre::{eyre, WrapErr};
use xforge_config::{ConfigDocument, Mode, XForgeSettings};
use xforge_core::{CoreResult, XForgeError};
use xforge_parsers_xml::WriteOptions;
use xforge_services::{BaselineGenerator, BaselineRequest, Orchestrator};

/// Options shared by `apply` and `generate`.
#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Override configuration (.json or .toml)
    #[arg(short, long)]
    pub config: PathBuf,
    /// Write the XML here instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,
    /// Write the generation metadata as JSON here
    #[arg(long)]
    pub metadata: Option<PathBuf>,
    #[arg(long)]
    pub mode: Option<Mode>,
    #[arg(long)]
    pub seed: Option<u64>,
    /// Fail on configuration problems instead of emitting the baseline
    #[arg(long)]
    pub strict: bool,
    /// Extra choice for the baseline, `Element=Option` (repeatable)
    #[arg(long = "choice", value_parser = parse_choice)]
    pub choices: Vec<(String, String)>,
    /// Extra repeat count for the baseline, `Element=N` (repeatable)
    #[arg(long = "repeat", value_parser = parse_repeat)]
    pub repeats: Vec<(String, u32)>,
    /// Single-line output
    #[arg(long)]
    pub compact: bool,
    #[arg(long)]
    pub no_declaration: bool,
}

pub enum Source {
    File(PathBuf),
    Command {
        xsd: PathBuf,
        program: Option<String>,
        args: Vec<String>,
    },
}

fn parse_choice(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() && !v.trim().is_empty() => {
            Ok((k.trim().to_string(), v.trim().to_string()))
        }
        _ => Err(format!("expected ELEMENT=OPTION, got '{s}'")),
    }
}

fn parse_repeat(s: &str) -> Result<(String, u32), String> {
    let (k, v) = parse_choice(s)?;
    let n = v.parse().map_err(|_| format!("repeat count '{v}' is not a non-negative integer"))?;
    Ok((k, n))
}

/// Reads the baseline from a file; the request is ignored.
pub struct FileBaseline {
    path: PathBuf,
}

impl BaselineGenerator for FileBaseline {
    fn generate(&self, _request: &BaselineRequest) -> CoreResult<String> {
        std::fs::read_to_string(&self.path)
            .map_err(|e| XForgeError::Baseline(format!("{}: {e}", self.path.display())))
    }
}

/// Runs `<program> [args...] --xsd <path> --mode <mode> --choices <json> --repeats <json>`
/// and takes the XML from its stdout.
pub struct CommandBaseline {
    program: String,
    args: Vec<String>,
}

impl BaselineGenerator for CommandBaseline {
    fn generate(&self, request: &BaselineRequest) -> CoreResult<String> {
        let choices = serde_json::to_string(&request.choices).map_err(|e| XForgeError::Baseline(e.to_string()))?;
        let repeats = serde_json::to_string(&request.repeats).map_err(|e| XForgeError::Baseline(e.to_string()))?;
        tracing::debug!(event = "baseline_spawn", program = %self.program, args = ?self.args);
        let out = Command::new(&self.program)
            .args(&self.args)
            .arg("--xsd")
            .arg(&request.xsd)
            .args(["--mode", request.mode.as_str()])
            .args(["--choices", choices.as_str()])
            .args(["--repeats", repeats.as_str()])
            .output()
            .map_err(|e| XForgeError::Baseline(format!("cannot run '{}': {e}", self.program)))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(XForgeError::Baseline(format!(
                "'{}' exited with {}: {}",
                self.program,
                out.status,
                stderr.trim()
            )));
        }
        String::from_utf8(out.stdout).map_err(|e| XForgeError::Baseline(format!("output is not UTF-8: {e}")))
    }
}

pub fn run_generate(source: Source, run: RunArgs, settings: &XForgeSettings) -> color_eyre::Result<()> {
    match source {
        Source::File(path) => {
            let xsd = path.clone();
            pipeline(FileBaseline { path }, xsd, run, settings)
        }
        Source::Command { xsd, program, args } => {
            let cfg = settings.baseline.clone().unwrap_or_default();
            let program = program
                .or(cfg.command)
                .ok_or_else(|| eyre!("no baseline generator: pass --baseline-cmd or set baseline.command in xforge.toml"))?;
            let args = if args.is_empty() { cfg.args.unwrap_or_default() } else { args };
            pipeline(CommandBaseline { program, args }, xsd, run, settings)
        }
    }
}

fn pipeline<B: BaselineGenerator>(
    baseline: B,
    xsd: PathBuf,
    run: RunArgs,
    settings: &XForgeSettings,
) -> color_eyre::Result<()> {
    let strict = run.strict || settings.strict.unwrap_or(false);
    let seed = run.seed;
    let fallback_seed = settings.seed;
    let loaded = ConfigDocument::load(&run.config).map(|mut c| {
        c.seed = seed.or(c.seed).or(fallback_seed);
        c
    });

    let mode = match (run.mode, settings.mode.as_deref()) {
        (Some(m), _) => Some(m),
        (None, Some(s)) => Some(s.parse::<Mode>().map_err(|e| eyre!("xforge.toml: {e}"))?),
        (None, None) => None,
    };
    let out_cfg = settings.output.clone().unwrap_or_default();
    let output = WriteOptions {
        declaration: !run.no_declaration && out_cfg.declaration.unwrap_or(true),
        indent: if run.compact { None } else { Some(out_cfg.indent.unwrap_or(2)) },
    };

    let orchestrator = if strict {
        let config = loaded.wrap_err_with(|| format!("loading {}", run.config.display()))?;
        Orchestrator::strict(baseline, xsd, config)?
    } else {
        Orchestrator::new(baseline, xsd, loaded)
    };
    let mut orchestrator = orchestrator.with_output(output);

    let choices: BTreeMap<String, String> = run.choices.into_iter().collect();
    let repeats: BTreeMap<String, u32> = run.repeats.into_iter().collect();
    let result = orchestrator.generate(mode, &choices, &repeats)?;
    let meta = &result.metadata;

    match &run.out {
        Some(path) => write_file(path, &result.xml)?,
        None => println!("{}", result.xml.trim_end()),
    }
    if let Some(path) = &run.metadata {
        write_file(path, &serde_json::to_string_pretty(meta)?)?;
    }

    for e in &meta.errors {
        crate::ui_warn!("{e}");
    }
    if meta.fallback_used {
        crate::ui_warn!("configuration not applied; emitted the baseline document");
    }
    crate::ui_info!(
        "{} document ({} mode): {} applied, {} skipped, {} error(s) in {} ms",
        if meta.fallback_used { "baseline" } else { "enhanced" },
        meta.mode,
        meta.applied.len(),
        meta.skipped.len(),
        meta.errors.len(),
        meta.elapsed_ms
    );
    Ok(())
}

fn write_file(path: &Path, content: &str) -> color_eyre::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, content).wrap_err_with(|| format!("writing {}", path.display()))?;
    Ok(())
}
