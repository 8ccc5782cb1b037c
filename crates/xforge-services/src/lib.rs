//! Generation pipeline over the lower-level crates.
//!
//! [`OverrideEngine`] rewrites a parsed baseline from a configuration;
//! [`Orchestrator`] wraps it with baseline generation, choice pruning and
//! serialization so CLI callers only deal with one entry point.

mod generators;
mod orchestrator;
mod overrides;
mod values;

pub use generators::ValueGenerator;
pub use orchestrator::{BaselineGenerator, BaselineRequest, GenerationResult, Orchestrator};
pub use overrides::{ActionLog, OverrideEngine, Phase};
pub use values::{resolve_spec, resolve_value, try_resolve, RowSource};
pub use xforge_core::{CoreResult, Result};
