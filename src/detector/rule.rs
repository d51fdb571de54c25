use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::definition::DetectableDefinition;

/// Identifier of an ecosystem facet, e.g. `CARGO` or `NPM_PACKAGE_LOCK`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectorType(String);

impl DetectorType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DetectorType {
    fn from(name: &str) -> Self {
        DetectorType::new(name)
    }
}

impl std::fmt::Display for DetectorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Directory-level conditions an entry point must meet before it is tried.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRules {
    /// Deepest directory (0 = scan root) the entry point may run in.
    pub max_depth: Option<usize>,
    /// May run beneath a directory where the same detector type applied.
    pub nestable: bool,
    /// Detector types that, once applied in an ancestor, suppress this entry point.
    pub not_nestable_beneath: Vec<DetectorType>,
}

impl Default for SearchRules {
    fn default() -> Self {
        Self {
            max_depth: None,
            nestable: true,
            not_nestable_beneath: Vec::new(),
        }
    }
}

/// A primary definition plus ordered, equivalent fallbacks.
#[derive(Debug, Clone)]
pub struct EntryPoint {
    primary: DetectableDefinition,
    fallbacks: Vec<DetectableDefinition>,
    search: SearchRules,
}

impl EntryPoint {
    pub fn new(primary: DetectableDefinition) -> Self {
        Self {
            primary,
            fallbacks: Vec::new(),
            search: SearchRules::default(),
        }
    }

    pub fn fallback(mut self, definition: DetectableDefinition) -> Self {
        self.fallbacks.push(definition);
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.search.max_depth = Some(depth);
        self
    }

    pub fn not_nestable(mut self) -> Self {
        self.search.nestable = false;
        self
    }

    pub fn not_nestable_beneath(mut self, detector_type: impl Into<DetectorType>) -> Self {
        self.search.not_nestable_beneath.push(detector_type.into());
        self
    }

    pub fn primary(&self) -> &DetectableDefinition {
        &self.primary
    }

    /// Primary first, then fallbacks in declared order.
    pub fn definitions(&self) -> impl Iterator<Item = &DetectableDefinition> {
        std::iter::once(&self.primary).chain(self.fallbacks.iter())
    }

    pub fn search(&self) -> &SearchRules {
        &self.search
    }

    /// Entry points are named after their primary definition.
    pub fn name(&self) -> &str {
        self.primary.name()
    }
}

/// A detector type, its entry points, and the types it yields to.
#[derive(Debug, Clone)]
pub struct DetectorRule {
    detector_type: DetectorType,
    entry_points: Vec<EntryPoint>,
    yields_to: Vec<DetectorType>,
}

impl DetectorRule {
    pub fn new(detector_type: impl Into<DetectorType>) -> Self {
        Self {
            detector_type: detector_type.into(),
            entry_points: Vec::new(),
            yields_to: Vec::new(),
        }
    }

    pub fn entry_point(mut self, entry_point: EntryPoint) -> Self {
        self.entry_points.push(entry_point);
        self
    }

    /// Suppress this rule in directories where `stronger` applied.
    pub fn yields_to(mut self, stronger: impl Into<DetectorType>) -> Self {
        self.yields_to.push(stronger.into());
        self
    }

    pub fn detector_type(&self) -> &DetectorType {
        &self.detector_type
    }

    pub fn entry_points(&self) -> &[EntryPoint] {
        &self.entry_points
    }

    pub fn yielded_types(&self) -> &[DetectorType] {
        &self.yields_to
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleSetError {
    #[error("detector type {0} is registered more than once")]
    DuplicateDetectorType(DetectorType),

    #[error("detector type {detector_type} yields to unknown detector type {target}")]
    UnknownYieldTarget {
        detector_type: DetectorType,
        target: DetectorType,
    },

    #[error("yield ordering contains a cycle through {0}")]
    YieldCycle(DetectorType),
}

/// Immutable registry of rules, stored in evaluation order: every rule comes
/// after the rules it yields to.
#[derive(Debug, Clone)]
pub struct DetectorRuleSet {
    rules: Vec<DetectorRule>,
}

impl DetectorRuleSet {
    pub fn builder() -> DetectorRuleSetBuilder {
        DetectorRuleSetBuilder::default()
    }

    pub fn rules(&self) -> &[DetectorRule] {
        &self.rules
    }

    pub fn get(&self, detector_type: &DetectorType) -> Option<&DetectorRule> {
        self.rules.iter().find(|r| r.detector_type() == detector_type)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct DetectorRuleSetBuilder {
    rules: Vec<DetectorRule>,
}

impl DetectorRuleSetBuilder {
    pub fn add(mut self, rule: DetectorRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Validate and order the rules.
    pub fn build(self) -> Result<DetectorRuleSet, RuleSetError> {
        let mut index: HashMap<DetectorType, usize> = HashMap::new();
        for (i, rule) in self.rules.iter().enumerate() {
            if index.insert(rule.detector_type.clone(), i).is_some() {
                return Err(RuleSetError::DuplicateDetectorType(rule.detector_type.clone()));
            }
        }

        let mut ordering = DiGraph::<usize, ()>::new();
        let nodes: Vec<_> = (0..self.rules.len()).map(|i| ordering.add_node(i)).collect();
        for (i, rule) in self.rules.iter().enumerate() {
            for target in &rule.yields_to {
                let Some(&j) = index.get(target) else {
                    return Err(RuleSetError::UnknownYieldTarget {
                        detector_type: rule.detector_type.clone(),
                        target: target.clone(),
                    });
                };
                ordering.add_edge(nodes[j], nodes[i], ());
            }
        }

        let order = toposort(&ordering, None).map_err(|cycle| {
            RuleSetError::YieldCycle(self.rules[ordering[cycle.node_id()]].detector_type.clone())
        })?;

        let mut slots: Vec<Option<DetectorRule>> = self.rules.into_iter().map(Some).collect();
        let rules = order
            .into_iter()
            .filter_map(|node| slots[ordering[node]].take())
            .collect();

        Ok(DetectorRuleSet { rules })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::definition::DetectableAccuracy;
    use crate::detector::detectable::{Detectable, DetectableError, DetectableResult};
    use crate::models::Extraction;

    struct Inert;

    impl Detectable for Inert {
        fn check_applicable(&mut self) -> DetectableResult {
            DetectableResult::failed("inert")
        }
        fn check_extractable(&mut self) -> DetectableResult {
            DetectableResult::failed("inert")
        }
        fn extract(self: Box<Self>) -> Result<Extraction, DetectableError> {
            Ok(Extraction::failure("inert"))
        }
    }

    fn definition(name: &str) -> DetectableDefinition {
        DetectableDefinition::new(name, DetectableAccuracy::High, |_| Box::new(Inert))
    }

    fn rule(detector_type: &str) -> DetectorRule {
        DetectorRule::new(detector_type).entry_point(EntryPoint::new(definition(detector_type)))
    }

    fn position(set: &DetectorRuleSet, detector_type: &str) -> usize {
        set.rules()
            .iter()
            .position(|r| r.detector_type().as_str() == detector_type)
            .unwrap()
    }

    #[test]
    fn test_yield_targets_are_ordered_first() {
        let set = DetectorRuleSet::builder()
            .add(rule("NPM_PACKAGE_JSON").yields_to("NPM_PACKAGE_LOCK").yields_to("YARN"))
            .add(rule("NPM_PACKAGE_LOCK"))
            .add(rule("YARN"))
            .build()
            .unwrap();

        assert_eq!(set.len(), 3);
        assert!(position(&set, "NPM_PACKAGE_LOCK") < position(&set, "NPM_PACKAGE_JSON"));
        assert!(position(&set, "YARN") < position(&set, "NPM_PACKAGE_JSON"));
    }

    #[test]
    fn test_duplicate_detector_type_rejected() {
        let err = DetectorRuleSet::builder()
            .add(rule("CARGO"))
            .add(rule("cargo"))
            .build()
            .unwrap_err();
        assert_eq!(err, RuleSetError::DuplicateDetectorType("CARGO".into()));
    }

    #[test]
    fn test_unknown_yield_target_rejected() {
        let err = DetectorRuleSet::builder()
            .add(rule("PIP").yields_to("POETRY"))
            .build()
            .unwrap_err();
        assert!(matches!(err, RuleSetError::UnknownYieldTarget { .. }));
    }

    #[test]
    fn test_yield_cycle_rejected() {
        let err = DetectorRuleSet::builder()
            .add(rule("A").yields_to("B"))
            .add(rule("B").yields_to("C"))
            .add(rule("C").yields_to("A"))
            .build()
            .unwrap_err();
        assert!(matches!(err, RuleSetError::YieldCycle(_)));
    }

    #[test]
    fn test_entry_point_definitions_in_order() {
        let entry_point = EntryPoint::new(definition("Cargo CLI"))
            .fallback(definition("Cargo Lockfile"))
            .not_nestable();
        let names: Vec<_> = entry_point.definitions().map(|d| d.name()).collect();
        assert_eq!(names, vec!["Cargo CLI", "Cargo Lockfile"]);
        assert_eq!(entry_point.name(), "Cargo CLI");
        assert!(!entry_point.search().nestable);
    }
}
