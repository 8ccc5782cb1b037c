//! Mutually exclusive XML alternatives.
//!
//! A choice names a container element and the one child to keep. Choices
//! are either fixed or conditional; conditions are evaluated against a
//! [`ValueSnapshot`] of the tree taken before anything is pruned, so one
//! choice's removals never change another choice's outcome.

mod condition;
mod resolver;
mod snapshot;

pub use condition::{Comparison, Condition, Operator, Test};
pub use resolver::{ChoiceKind, ChoiceResolver, ChoiceSelection, PruneReport};
pub use snapshot::ValueSnapshot;
