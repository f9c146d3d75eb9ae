use indexmap::IndexMap;
use toolenv_core::{Dependency, DependencySummary, ToolRequirement, ToolRequirements};

/// Requirement to dependency, in requirement order.
#[derive(Debug, Default)]
pub struct ResolvedDependencies {
    entries: IndexMap<ToolRequirement, Dependency>,
}

impl ResolvedDependencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `dependency` for `requirement`, replacing an earlier answer in
    /// place.
    pub fn insert(&mut self, requirement: ToolRequirement, dependency: Dependency) {
        self.entries.insert(requirement, dependency);
    }

    pub fn get(&self, requirement: &ToolRequirement) -> Option<&Dependency> {
        self.entries.get(requirement)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `requirement` has a concrete (non-null) answer.
    pub fn is_met(&self, requirement: &ToolRequirement) -> bool {
        self.entries
            .get(requirement)
            .is_some_and(|dependency| !dependency.is_null())
    }

    pub fn met_count(&self) -> usize {
        self.entries
            .values()
            .filter(|dependency| !dependency.is_null())
            .count()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, ToolRequirement, Dependency> {
        self.entries.iter()
    }

    pub fn values(&self) -> indexmap::map::Values<'_, ToolRequirement, Dependency> {
        self.entries.values()
    }

    pub fn values_mut(&mut self) -> indexmap::map::ValuesMut<'_, ToolRequirement, Dependency> {
        self.entries.values_mut()
    }

    pub fn summaries(&self) -> Vec<DependencySummary> {
        self.entries.values().map(Dependency::summary).collect()
    }

    /// Reorders entries to follow `order`. Requirements missing from `order`
    /// keep their relative position at the end.
    pub(crate) fn into_ordered(mut self, order: &ToolRequirements) -> Self {
        let mut entries = IndexMap::with_capacity(self.entries.len());
        for requirement in order {
            if let Some(dependency) = self.entries.shift_remove(requirement) {
                entries.insert(requirement.clone(), dependency);
            }
        }
        entries.extend(self.entries);
        Self { entries }
    }
}

impl IntoIterator for ResolvedDependencies {
    type Item = (ToolRequirement, Dependency);
    type IntoIter = indexmap::map::IntoIter<ToolRequirement, Dependency>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResolvedDependencies {
    type Item = (&'a ToolRequirement, &'a Dependency);
    type IntoIter = indexmap::map::Iter<'a, ToolRequirement, Dependency>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
