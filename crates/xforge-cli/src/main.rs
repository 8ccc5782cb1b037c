mod commands;
mod ui;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::{debug, error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use xforge_config::XForgeSettings;

use commands::generate::{RunArgs, Source};

#[derive(Parser)]
#[command(name = "xforge", version, about = "Declarative overrides for schema-generated XML")]
struct Cli {
    /// Disable coloured output
    #[arg(long, global = true)]
    no_color: bool,

    /// Only log errors to the console
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Also write daily-rotated debug logs into this directory
    #[arg(long, global = true, env = "XFORGE_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply a configuration to an existing XML document
    Apply {
        /// Baseline XML document
        #[arg(short, long)]
        input: PathBuf,
        #[command(flatten)]
        run: RunArgs,
    },

    /// Run the baseline generator for a schema, then apply the configuration
    Generate {
        #[arg(long)]
        xsd: PathBuf,
        /// External baseline generator; falls back to `baseline.command` in xforge.toml
        #[arg(long)]
        baseline_cmd: Option<String>,
        /// Extra argument for the baseline generator (repeatable)
        #[arg(long = "baseline-arg", allow_hyphen_values = true)]
        baseline_args: Vec<String>,
        #[command(flatten)]
        run: RunArgs,
    },

    /// Validate configuration files or directories of them
    Check {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Parse path expressions and show kind, normal form and precedence
    Path {
        #[arg(required = true)]
        exprs: Vec<String>,
        #[arg(long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Preview the rows a configuration's templates hand out
    Templates {
        #[arg(short, long)]
        config: PathBuf,
        /// Only this template
        #[arg(short, long)]
        template: Option<String>,
        #[arg(long, default_value_t = 5)]
        count: usize,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Write JSON Schemas for the report types
    Schema {
        /// Defaults to `schema.out_dir` from xforge.toml, then ./docs/schemas
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

trait Runnable {
    fn run(self, settings: &XForgeSettings, use_color: bool) -> Result<()>;
}

impl Runnable for Commands {
    fn run(self, settings: &XForgeSettings, use_color: bool) -> Result<()> {
        let cmd_name = format!("{self:?}");
        info!(event = "command_start", command = %cmd_name);

        let result = match self {
            Commands::Apply { input, run } => {
                debug!(event = "apply_args", input = ?input, config = ?run.config);
                commands::generate::run_generate(Source::File(input), run, settings)
            }
            Commands::Generate {
                xsd,
                baseline_cmd,
                baseline_args,
                run,
            } => {
                debug!(event = "generate_args", xsd = ?xsd, baseline_cmd = ?baseline_cmd);
                commands::generate::run_generate(
                    Source::Command {
                        xsd,
                        program: baseline_cmd,
                        args: baseline_args,
                    },
                    run,
                    settings,
                )
            }
            Commands::Check { paths, format } => commands::check::run_check(paths, &format, use_color),
            Commands::Path { exprs, format } => commands::path::run_path(exprs, &format),
            Commands::Templates {
                config,
                template,
                count,
                seed,
                format,
            } => commands::templates::run_templates(&config, template, count, seed.or(settings.seed), &format),
            Commands::Schema { out_dir } => commands::schema::run_schema(out_dir, settings),
        };

        match &result {
            Ok(_) => info!(event = "command_done", command = %cmd_name),
            Err(e) => error!(event = "command_failed", command = %cmd_name, error = ?e),
        }

        result
    }
}

/// Console logs go to stderr so stdout stays clean for XML and JSON.
fn init_tracing(quiet: bool, log_dir: Option<PathBuf>, level: Option<&str>) -> Option<WorkerGuard> {
    let default_level = if quiet { "error" } else { level.unwrap_or("warn") };
    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)));

    let mut guard = None;
    let file_layer = log_dir.map(|dir| {
        let (file_writer, g) = tracing_appender::non_blocking(rolling::daily(dir, "xforge.log"));
        guard = Some(g);
        fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_writer(file_writer)
            .with_filter(EnvFilter::new("debug"))
    });

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();
    guard
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let settings = xforge_config::load_config().unwrap_or_default();
    let log_cfg = settings.log.clone().unwrap_or_default();
    let log_dir = cli.log_dir.clone().or_else(|| log_cfg.dir.map(PathBuf::from));
    let _guard = init_tracing(cli.quiet, log_dir, log_cfg.level.as_deref());

    let use_color = !cli.no_color
        && std::io::stdout().is_terminal()
        && std::env::var_os("NO_COLOR").is_none();

    cli.cmd.run(&settings, use_color)
}
