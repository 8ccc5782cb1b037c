use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use xforge_choices::ChoiceResolver;
use xforge_config::{ConfigDocument, Mode};
use xforge_core::{CoreResult, Issue, IssueKind, XForgeError};
use xforge_domain::{GenerationMetadata, GenerationType, SCHEMA_VERSION};
use xforge_parsers_xml::{Document, WriteOptions};

use crate::overrides::OverrideEngine;

/// Input handed to the baseline generator.
#[derive(Debug, Clone)]
pub struct BaselineRequest {
    pub xsd: PathBuf,
    pub mode: Mode,
    /// Element name to the option to emit.
    pub choices: BTreeMap<String, String>,
    pub repeats: BTreeMap<String, u32>,
}

/// Produces the schema-valid starting document.
pub trait BaselineGenerator {
    fn generate(&self, request: &BaselineRequest) -> CoreResult<String>;
}

impl<F> BaselineGenerator for F
where
    F: Fn(&BaselineRequest) -> CoreResult<String>,
{
    fn generate(&self, request: &BaselineRequest) -> CoreResult<String> {
        self(request)
    }
}

#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub xml: String,
    pub metadata: GenerationMetadata,
}

enum Enhancement {
    Ready {
        overrides: OverrideEngine,
        choices: ChoiceResolver,
        /// Problems found while building the resolver, repeated on every run.
        notes: Vec<Issue>,
    },
    Unavailable(Vec<String>),
}

/// Baseline generation followed by overrides and choice pruning.
pub struct Orchestrator<B> {
    baseline: B,
    xsd: PathBuf,
    mode: Mode,
    output: WriteOptions,
    enhancement: Enhancement,
}

impl<B: BaselineGenerator> Orchestrator<B> {
    /// Never fails: an unusable configuration degrades every run to
    /// baseline-only output with the problems listed in the metadata.
    pub fn new(baseline: B, xsd: impl Into<PathBuf>, config: CoreResult<ConfigDocument>) -> Self {
        let (mode, enhancement) = match config.and_then(build) {
            Ok((mode, enhancement)) => (mode, enhancement),
            Err(e) => {
                tracing::warn!(event = "enhancement_unavailable", error = %e);
                (Mode::default(), Enhancement::Unavailable(e.problems()))
            }
        };
        Self {
            baseline,
            xsd: xsd.into(),
            mode,
            output: WriteOptions::default(),
            enhancement,
        }
    }

    /// Like [`Orchestrator::new`] but configuration problems are returned.
    pub fn strict(baseline: B, xsd: impl Into<PathBuf>, config: ConfigDocument) -> CoreResult<Self> {
        let (mode, enhancement) = build(config)?;
        Ok(Self {
            baseline,
            xsd: xsd.into(),
            mode,
            output: WriteOptions::default(),
            enhancement,
        })
    }

    /// Lenient construction from a configuration file.
    pub fn from_path(baseline: B, xsd: impl Into<PathBuf>, config: &Path) -> Self {
        Self::new(baseline, xsd, ConfigDocument::load(config))
    }

    pub fn with_output(mut self, output: WriteOptions) -> Self {
        self.output = output;
        self
    }

    pub fn is_enhanced(&self) -> bool {
        matches!(self.enhancement, Enhancement::Ready { .. })
    }

    /// Run one generation. Only a baseline failure is an error; everything
    /// after it degrades to the best document available.
    pub fn generate(
        &mut self,
        mode: Option<Mode>,
        extra_choices: &BTreeMap<String, String>,
        extra_repeats: &BTreeMap<String, u32>,
    ) -> CoreResult<GenerationResult> {
        let started = Instant::now();
        let mode = mode.unwrap_or(self.mode);

        let mut choices = BTreeMap::new();
        let mut repeats = BTreeMap::new();
        if let Enhancement::Ready { overrides, choices: resolver, .. } = &self.enhancement {
            choices = resolver.base_generator_choices();
            repeats = overrides.config().repeats.clone();
        }
        choices.extend(extra_choices.iter().map(|(k, v)| (k.clone(), v.clone())));
        repeats.extend(extra_repeats.iter().map(|(k, v)| (k.clone(), *v)));

        let request = BaselineRequest {
            xsd: self.xsd.clone(),
            mode,
            choices,
            repeats,
        };
        tracing::debug!(event = "baseline_request", xsd = %request.xsd.display(), mode = %mode);
        let baseline = self.baseline.generate(&request).map_err(|e| match e {
            XForgeError::Baseline(_) => e,
            other => XForgeError::Baseline(other.to_string()),
        })?;

        let mut meta = GenerationMetadata {
            schema_version: SCHEMA_VERSION,
            generation_type: GenerationType::Base,
            mode: mode.as_str().to_string(),
            elapsed_ms: 0,
            fallback_used: true,
            applied: Vec::new(),
            skipped: Vec::new(),
            errors: Vec::new(),
            choices_used: request.choices.clone(),
            repeats_used: request.repeats.clone(),
        };

        let xml = match &mut self.enhancement {
            Enhancement::Unavailable(problems) => {
                meta.errors = problems.clone();
                baseline
            }
            Enhancement::Ready {
                overrides,
                choices,
                notes,
            } => {
                meta.errors.extend(notes.iter().map(Issue::to_string));
                match enhance(&baseline, overrides, choices, &self.output, &mut meta) {
                    Ok(xml) => {
                        meta.generation_type = GenerationType::Enhanced;
                        meta.fallback_used = false;
                        xml
                    }
                    Err(e) => {
                        tracing::warn!(event = "enhancement_failed", error = %e);
                        meta.errors
                            .push(Issue::new(IssueKind::ApplicationFailure, "document", e.to_string()).to_string());
                        baseline
                    }
                }
            }
        };

        meta.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            event = "generation_done",
            kind = ?meta.generation_type,
            fallback = meta.fallback_used,
            applied = meta.applied.len(),
            errors = meta.errors.len(),
            elapsed_ms = meta.elapsed_ms
        );
        Ok(GenerationResult { xml, metadata: meta })
    }
}

fn build(config: ConfigDocument) -> CoreResult<(Mode, Enhancement)> {
    let mode = config.mode;
    let mut choices = ChoiceResolver::new(&config.choices, config.namespaces.prefix_map());
    let notes = choices.take_issues();
    let overrides = OverrideEngine::new(config)?;
    Ok((
        mode,
        Enhancement::Ready {
            overrides,
            choices,
            notes,
        },
    ))
}

/// Parse, override, prune, serialize. Errors here mean the baseline is returned instead.
fn enhance(
    baseline: &str,
    overrides: &mut OverrideEngine,
    choices: &mut ChoiceResolver,
    output: &WriteOptions,
    meta: &mut GenerationMetadata,
) -> CoreResult<String> {
    let mut doc = Document::parse(baseline)?;
    overrides.reset();
    let log = overrides.apply(&mut doc);
    meta.errors.extend(log.error_strings());
    meta.applied.extend(log.applied);
    meta.skipped.extend(log.skipped);

    let report = choices.apply(&mut doc);
    for (key, option) in report.choices_used() {
        meta.choices_used.insert(key, option);
    }
    meta.applied.extend(report.removed);
    meta.skipped.extend(report.notes);
    meta.errors.extend(choices.take_issues().iter().map(Issue::to_string));

    doc.to_xml_string(output)
}
