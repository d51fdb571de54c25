//! Detector selection and extraction orchestration.
//!
//! - [`detectable`] — the capability every ecosystem strategy implements.
//! - [`definition`] — named, accuracy-tagged factories for detectables.
//! - [`rule`] — entry points, detector rules, and the validated rule set.
//! - [`search`] — yield-to suppression, depth limits and nesting.
//! - [`exclusion`] — user-configured definition exclusions.
//! - [`evaluator`] — runs rules against directories and records every outcome.

pub mod definition;
pub mod detectable;
pub mod evaluator;
pub mod exclusion;
pub mod rule;
pub mod search;

pub use definition::{DetectableAccuracy, DetectableDefinition};
pub use detectable::{Detectable, DetectableEnvironment, DetectableError, DetectableResult};
pub use evaluator::{
    DetectorRuleEvaluator, DirectoryEvaluation, EntryPointEvaluation, EntryPointNotFound,
    ExtractionAttempt, FoundEntryPoint, RuleEvaluation, RuleStatus,
};
pub use exclusion::{ExclusionPolicy, NameExclusionPolicy};
pub use rule::{DetectorRule, DetectorRuleSet, DetectorType, EntryPoint, RuleSetError, SearchRules};
pub use search::{RuleSearcher, SearchEnvironment, SearchResult, SearchStage};
