use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::detectable::{Detectable, DetectableEnvironment};
use crate::models::Forge;

/// How much of the real dependency graph a strategy can see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectableAccuracy {
    /// Resolved graph (lockfile or build tool output).
    High,
    /// Declarations only (manifest without resolution).
    Low,
}

impl std::fmt::Display for DetectableAccuracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectableAccuracy::High => write!(f, "high"),
            DetectableAccuracy::Low => write!(f, "low"),
        }
    }
}

pub type DetectableFactory =
    Arc<dyn Fn(&DetectableEnvironment) -> Box<dyn Detectable> + Send + Sync>;

/// Metadata plus a factory for one detectable strategy.
///
/// The name doubles as the exclusion key.
#[derive(Clone)]
pub struct DetectableDefinition {
    name: String,
    accuracy: DetectableAccuracy,
    /// Forge family the strategy reports packages for.
    group: Option<Forge>,
    factory: DetectableFactory,
}

impl DetectableDefinition {
    pub fn new<F>(name: impl Into<String>, accuracy: DetectableAccuracy, factory: F) -> Self
    where
        F: Fn(&DetectableEnvironment) -> Box<dyn Detectable> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            accuracy,
            group: None,
            factory: Arc::new(factory),
        }
    }

    pub fn with_group(mut self, group: Forge) -> Self {
        self.group = Some(group);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn accuracy(&self) -> DetectableAccuracy {
        self.accuracy
    }

    pub fn group(&self) -> Option<Forge> {
        self.group
    }

    /// Create a fresh detectable bound to `environment`'s directory.
    pub fn create(&self, environment: &DetectableEnvironment) -> Box<dyn Detectable> {
        (self.factory)(environment)
    }
}

impl std::fmt::Debug for DetectableDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectableDefinition")
            .field("name", &self.name)
            .field("accuracy", &self.accuracy)
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}
