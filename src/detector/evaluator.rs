//! Rule evaluation: which entry point runs in a directory, and which of its
//! definitions produces the extraction.

use std::any::Any;
use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use tracing::{debug, error, info, warn};

use super::definition::{DetectableAccuracy, DetectableDefinition};
use super::detectable::{DetectableEnvironment, DetectableResult};
use super::exclusion::ExclusionPolicy;
use super::rule::{DetectorRule, DetectorRuleSet, DetectorType, EntryPoint};
use super::search::{SearchEnvironment, SearchResult, SearchStage};
use crate::models::{Extraction, Forge};

/// An entry point that did not get as far as extraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum EntryPointNotFound {
    /// The search stage rejected it; no detectable was created.
    NotSearchable { entry_point: String, reason: String },
    /// Searchable, but the selected definition was not applicable.
    NotApplicable {
        entry_point: String,
        definition: String,
        result: DetectableResult,
    },
}

impl EntryPointNotFound {
    pub fn entry_point(&self) -> &str {
        match self {
            EntryPointNotFound::NotSearchable { entry_point, .. }
            | EntryPointNotFound::NotApplicable { entry_point, .. } => entry_point,
        }
    }

    pub fn description(&self) -> String {
        match self {
            EntryPointNotFound::NotSearchable { reason, .. } => format!("Not searchable: {}", reason),
            EntryPointNotFound::NotApplicable {
                definition, result, ..
            } => format!("{} not applicable: {}", definition, result),
        }
    }
}

/// One definition's pass through the extractable and extract stages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionAttempt {
    pub definition: String,
    pub accuracy: DetectableAccuracy,
    /// Forge the definition reports its packages in, when it declares one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<Forge>,
    pub extractable: DetectableResult,
    /// `None` when the extractable stage did not pass.
    pub extraction: Option<Extraction>,
}

impl ExtractionAttempt {
    pub fn succeeded(&self) -> bool {
        self.extraction.as_ref().map_or(false, Extraction::is_success)
    }

    pub fn description(&self) -> String {
        match &self.extraction {
            Some(extraction) => format!("{}: {}", self.definition, extraction.description()),
            None => format!("{} not extractable: {}", self.definition, self.extractable),
        }
    }
}

/// Result of the extraction cascade over one entry point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryPointEvaluation {
    pub entry_point: String,
    pub attempts: Vec<ExtractionAttempt>,
}

impl EntryPointEvaluation {
    pub fn successful_attempt(&self) -> Option<&ExtractionAttempt> {
        self.attempts.iter().find(|a| a.succeeded())
    }
}

/// An entry point that passed the applicable stage, with its cascade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoundEntryPoint {
    pub applicable_definition: String,
    pub applicable: DetectableResult,
    pub evaluation: EntryPointEvaluation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    /// No entry point passed the applicable stage.
    NotPresent,
    Extracted,
    /// The ecosystem is present but every strategy failed.
    Failed,
}

impl std::fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleStatus::NotPresent => write!(f, "not present"),
            RuleStatus::Extracted => write!(f, "extracted"),
            RuleStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Everything that happened while evaluating one rule in one directory.
///
/// Serializes with its derived [`RuleStatus`] alongside the recorded stages.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEvaluation {
    pub detector_type: DetectorType,
    pub not_found: Vec<EntryPointNotFound>,
    /// Entry points that passed the applicable stage, in order. At most one
    /// succeeded, and if so it is the last.
    pub found: Vec<FoundEntryPoint>,
}

impl RuleEvaluation {
    fn new(detector_type: DetectorType) -> Self {
        Self {
            detector_type,
            not_found: Vec::new(),
            found: Vec::new(),
        }
    }

    pub fn was_applicable(&self) -> bool {
        !self.found.is_empty()
    }

    pub fn successful_attempt(&self) -> Option<&ExtractionAttempt> {
        self.found
            .iter()
            .find_map(|found| found.evaluation.successful_attempt())
    }

    pub fn extraction(&self) -> Option<&Extraction> {
        self.successful_attempt()
            .and_then(|attempt| attempt.extraction.as_ref())
    }

    pub fn status(&self) -> RuleStatus {
        if self.successful_attempt().is_some() {
            RuleStatus::Extracted
        } else if self.was_applicable() {
            RuleStatus::Failed
        } else {
            RuleStatus::NotPresent
        }
    }

    /// Human-readable account of every stage outcome, in evaluation order.
    pub fn explain(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .not_found
            .iter()
            .map(|nf| format!("[{}] {}", nf.entry_point(), nf.description()))
            .collect();
        for found in &self.found {
            lines.push(format!(
                "[{}] {} applicable: {}",
                found.evaluation.entry_point, found.applicable_definition, found.applicable
            ));
            for attempt in &found.evaluation.attempts {
                lines.push(format!("[{}] {}", found.evaluation.entry_point, attempt.description()));
            }
        }
        lines
    }
}

impl Serialize for RuleEvaluation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RuleEvaluation", 4)?;
        state.serialize_field("detector_type", &self.detector_type)?;
        state.serialize_field("status", &self.status())?;
        state.serialize_field("not_found", &self.not_found)?;
        state.serialize_field("found", &self.found)?;
        state.end()
    }
}

/// Run one detectable stage, turning a panic into an error message so a single
/// detectable cannot take down the scan.
fn guarded<T>(definition: &DetectableDefinition, stage: &str, run: impl FnOnce() -> T) -> Result<T, String> {
    catch_unwind(AssertUnwindSafe(run)).map_err(|payload| {
        let message = panic_message(payload.as_ref());
        error!(definition = definition.name(), stage, %message, "detectable panicked");
        format!("{} panicked during {}: {}", definition.name(), stage, message)
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

/// All rule evaluations for one directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectoryEvaluation {
    pub directory: PathBuf,
    pub depth: usize,
    pub evaluations: Vec<RuleEvaluation>,
}

impl DirectoryEvaluation {
    /// Detector types whose applicable stage passed here.
    pub fn applied_types(&self) -> BTreeSet<DetectorType> {
        self.evaluations
            .iter()
            .filter(|e| e.was_applicable())
            .map(|e| e.detector_type.clone())
            .collect()
    }

    pub fn with_status(&self, status: RuleStatus) -> impl Iterator<Item = &RuleEvaluation> {
        self.evaluations.iter().filter(move |e| e.status() == status)
    }
}

/// Runs rules against directories.
///
/// Holds only shared, read-only collaborators; one evaluator serves every
/// directory of a scan.
#[derive(Clone)]
pub struct DetectorRuleEvaluator {
    search: Arc<dyn SearchStage>,
    exclusions: Arc<dyn ExclusionPolicy>,
}

impl DetectorRuleEvaluator {
    pub fn new(search: impl SearchStage + 'static, exclusions: impl ExclusionPolicy + 'static) -> Self {
        Self {
            search: Arc::new(search),
            exclusions: Arc::new(exclusions),
        }
    }

    /// Evaluate one rule: try entry points in order until one extracts.
    pub fn evaluate(
        &self,
        environment: &DetectableEnvironment,
        search_environment: &SearchEnvironment,
        rule: &DetectorRule,
    ) -> RuleEvaluation {
        let mut evaluation = RuleEvaluation::new(rule.detector_type().clone());

        for entry_point in rule.entry_points() {
            if let SearchResult::NotSearchable { reason } =
                self.search.is_searchable(rule, entry_point, search_environment)
            {
                debug!(
                    detector = %rule.detector_type(),
                    entry_point = entry_point.name(),
                    %reason,
                    "entry point not searchable"
                );
                evaluation.not_found.push(EntryPointNotFound::NotSearchable {
                    entry_point: entry_point.name().to_string(),
                    reason,
                });
                continue;
            }

            let Some(definition) = self.select_definition(entry_point) else {
                debug!(
                    detector = %rule.detector_type(),
                    entry_point = entry_point.name(),
                    "every definition of the entry point is excluded"
                );
                continue;
            };

            let applicable = guarded(definition, "applicable", || {
                definition.create(environment).check_applicable()
            })
            .unwrap_or_else(DetectableResult::failed);
            if !applicable.is_passed() {
                debug!(
                    detector = %rule.detector_type(),
                    definition = definition.name(),
                    result = %applicable,
                    "not applicable"
                );
                evaluation.not_found.push(EntryPointNotFound::NotApplicable {
                    entry_point: entry_point.name().to_string(),
                    definition: definition.name().to_string(),
                    result: applicable,
                });
                continue;
            }

            let entry_point_evaluation = self.extract(entry_point, environment);
            let succeeded = entry_point_evaluation.successful_attempt().is_some();
            evaluation.found.push(FoundEntryPoint {
                applicable_definition: definition.name().to_string(),
                applicable,
                evaluation: entry_point_evaluation,
            });

            if succeeded {
                break;
            }
        }

        evaluation
    }

    /// Extraction cascade: the first definition that extracts successfully wins.
    pub fn extract(
        &self,
        entry_point: &EntryPoint,
        environment: &DetectableEnvironment,
    ) -> EntryPointEvaluation {
        let mut attempts = Vec::new();

        for definition in entry_point
            .definitions()
            .filter(|d| !self.exclusions.is_excluded(d))
        {
            let mut detectable = definition.create(environment);

            let extractable = guarded(definition, "extractable", || detectable.check_extractable())
                .unwrap_or_else(DetectableResult::failed);
            if !extractable.is_passed() {
                debug!(definition = definition.name(), result = %extractable, "not extractable");
                attempts.push(ExtractionAttempt {
                    definition: definition.name().to_string(),
                    accuracy: definition.accuracy(),
                    group: definition.group(),
                    extractable,
                    extraction: None,
                });
                continue;
            }

            let extraction = match guarded(definition, "extract", || detectable.extract()) {
                Ok(Ok(extraction)) => extraction,
                Err(error) => Extraction::Exception { error },
                Ok(Err(err)) => {
                    warn!(
                        definition = definition.name(),
                        directory = %environment.directory().display(),
                        error = %err,
                        "extraction raised an error"
                    );
                    Extraction::Exception {
                        error: err.to_string(),
                    }
                }
            };
            let succeeded = extraction.is_success();
            if succeeded {
                info!(
                    definition = definition.name(),
                    directory = %environment.directory().display(),
                    code_locations = extraction.code_locations().len(),
                    "extracted"
                );
            }

            attempts.push(ExtractionAttempt {
                definition: definition.name().to_string(),
                accuracy: definition.accuracy(),
                group: definition.group(),
                extractable,
                extraction: Some(extraction),
            });

            if succeeded {
                break;
            }
        }

        EntryPointEvaluation {
            entry_point: entry_point.name().to_string(),
            attempts,
        }
    }

    /// Evaluate every rule of `rule_set`, in order, against one directory.
    ///
    /// `ancestors` holds the detector types applied in parent directories.
    pub fn evaluate_directory(
        &self,
        rule_set: &DetectorRuleSet,
        environment: &DetectableEnvironment,
        depth: usize,
        ancestors: BTreeSet<DetectorType>,
    ) -> DirectoryEvaluation {
        let mut search_environment = SearchEnvironment::new(depth, ancestors);
        let mut evaluations = Vec::with_capacity(rule_set.len());

        for rule in rule_set.rules() {
            let evaluation = self.evaluate(environment, &search_environment, rule);
            if evaluation.was_applicable() {
                search_environment.mark_applied(rule.detector_type().clone());
            }
            if evaluation.status() == RuleStatus::Failed {
                warn!(
                    detector = %rule.detector_type(),
                    directory = %environment.directory().display(),
                    "ecosystem present but every detection strategy failed"
                );
            }
            evaluations.push(evaluation);
        }

        DirectoryEvaluation {
            directory: environment.directory().to_path_buf(),
            depth,
            evaluations,
        }
    }

    fn select_definition<'a>(&self, entry_point: &'a EntryPoint) -> Option<&'a DetectableDefinition> {
        entry_point
            .definitions()
            .find(|d| !self.exclusions.is_excluded(d))
    }
}
