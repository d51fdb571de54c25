use std::collections::HashSet;

use super::definition::DetectableDefinition;

/// Decides, before instantiation, whether a definition may run at all.
pub trait ExclusionPolicy: Send + Sync {
    fn is_excluded(&self, definition: &DetectableDefinition) -> bool;
}

/// Excludes definitions by name, case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct NameExclusionPolicy {
    excluded: HashSet<String>,
}

impl NameExclusionPolicy {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            excluded: names
                .into_iter()
                .map(|name| name.as_ref().trim().to_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }
}

impl ExclusionPolicy for NameExclusionPolicy {
    fn is_excluded(&self, definition: &DetectableDefinition) -> bool {
        self.excluded.contains(&definition.name().to_lowercase())
    }
}
