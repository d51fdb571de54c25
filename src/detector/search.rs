use std::collections::BTreeSet;

use serde::Serialize;

use super::rule::{DetectorRule, DetectorType, EntryPoint};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SearchResult {
    Searchable,
    NotSearchable { reason: String },
}

impl SearchResult {
    pub fn not_searchable(reason: impl Into<String>) -> Self {
        SearchResult::NotSearchable {
            reason: reason.into(),
        }
    }

    pub fn is_searchable(&self) -> bool {
        matches!(self, SearchResult::Searchable)
    }
}

/// What is known about a directory while its rules are evaluated.
#[derive(Debug, Clone, Default)]
pub struct SearchEnvironment {
    depth: usize,
    applied: BTreeSet<DetectorType>,
    applied_in_ancestors: BTreeSet<DetectorType>,
}

impl SearchEnvironment {
    pub fn new(depth: usize, applied_in_ancestors: BTreeSet<DetectorType>) -> Self {
        Self {
            depth,
            applied: BTreeSet::new(),
            applied_in_ancestors,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Record that `detector_type` passed the applicable stage in this directory.
    pub fn mark_applied(&mut self, detector_type: DetectorType) {
        self.applied.insert(detector_type);
    }

    pub fn is_applied(&self, detector_type: &DetectorType) -> bool {
        self.applied.contains(detector_type)
    }

    pub fn applied_in_ancestors(&self) -> &BTreeSet<DetectorType> {
        &self.applied_in_ancestors
    }
}

/// Decides whether an entry point may be tried in a directory.
pub trait SearchStage: Send + Sync {
    fn is_searchable(
        &self,
        rule: &DetectorRule,
        entry_point: &EntryPoint,
        environment: &SearchEnvironment,
    ) -> SearchResult;
}

/// Default search stage: depth limits, nesting, and yield-to suppression.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleSearcher;

impl SearchStage for RuleSearcher {
    fn is_searchable(
        &self,
        rule: &DetectorRule,
        entry_point: &EntryPoint,
        environment: &SearchEnvironment,
    ) -> SearchResult {
        let search = entry_point.search();

        if let Some(max_depth) = search.max_depth {
            if environment.depth() > max_depth {
                return SearchResult::not_searchable(format!(
                    "Maximum search depth {} exceeded (directory depth {})",
                    max_depth,
                    environment.depth()
                ));
            }
        }

        let ancestors = environment.applied_in_ancestors();
        if !search.nestable && ancestors.contains(rule.detector_type()) {
            return SearchResult::not_searchable(format!(
                "{} already applied in a parent directory and is not nestable",
                rule.detector_type()
            ));
        }
        if let Some(blocker) = search
            .not_nestable_beneath
            .iter()
            .find(|t| ancestors.contains(*t))
        {
            return SearchResult::not_searchable(format!(
                "Not nestable beneath {}, which applied in a parent directory",
                blocker
            ));
        }

        if let Some(stronger) = rule
            .yielded_types()
            .iter()
            .find(|t| environment.is_applied(t))
        {
            return SearchResult::not_searchable(format!("Yielded to {}", stronger));
        }

        SearchResult::Searchable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::definition::{DetectableAccuracy, DetectableDefinition};
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

    fn entry_point() -> EntryPoint {
        EntryPoint::new(DetectableDefinition::new(
            "Inert",
            DetectableAccuracy::Low,
            |_| Box::new(Inert),
        ))
    }

    #[test]
    fn test_yield_to_applied_type() {
        let ep = entry_point();
        let rule = DetectorRule::new("NPM_PACKAGE_JSON").yields_to("NPM_PACKAGE_LOCK");
        let mut env = SearchEnvironment::new(0, BTreeSet::new());
        assert!(RuleSearcher.is_searchable(&rule, &ep, &env).is_searchable());

        env.mark_applied("NPM_PACKAGE_LOCK".into());
        assert_eq!(
            RuleSearcher.is_searchable(&rule, &ep, &env),
            SearchResult::not_searchable("Yielded to NPM_PACKAGE_LOCK")
        );
    }

    #[test]
    fn test_max_depth() {
        let ep = entry_point().max_depth(1);
        let rule = DetectorRule::new("MAVEN");
        assert!(RuleSearcher
            .is_searchable(&rule, &ep, &SearchEnvironment::new(1, BTreeSet::new()))
            .is_searchable());
        assert!(!RuleSearcher
            .is_searchable(&rule, &ep, &SearchEnvironment::new(2, BTreeSet::new()))
            .is_searchable());
    }

    #[test]
    fn test_nesting() {
        let rule = DetectorRule::new("CARGO");
        let ancestors: BTreeSet<DetectorType> = ["CARGO".into()].into_iter().collect();
        let env = SearchEnvironment::new(1, ancestors);

        assert!(RuleSearcher.is_searchable(&rule, &entry_point(), &env).is_searchable());
        assert!(!RuleSearcher
            .is_searchable(&rule, &entry_point().not_nestable(), &env)
            .is_searchable());

        let npm = DetectorRule::new("NPM_PACKAGE_JSON");
        assert!(!RuleSearcher
            .is_searchable(&npm, &entry_point().not_nestable_beneath("CARGO"), &env)
            .is_searchable());
    }
}
