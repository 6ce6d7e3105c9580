//! Per-provider tool filter

use std::collections::HashSet;

use crate::config::ProviderSettings;
use crate::types::ToolSpec;

/// Decides which of a provider's tools are registered
#[derive(Debug, Clone, Default)]
pub struct ToolFilter {
    /// If set, only include tools with these remote names
    pub include: Option<HashSet<String>>,
    /// Exclude tools with these remote names
    pub exclude: HashSet<String>,
}

impl ToolFilter {
    /// Filter that keeps everything
    pub fn all() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &ProviderSettings) -> Self {
        let filter = Self::all().with_exclude(settings.exclude.iter().cloned());
        if settings.include.is_empty() {
            filter
        } else {
            filter.with_include(settings.include.iter().cloned())
        }
    }

    /// Include only specific tools
    pub fn with_include(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.include = Some(names.into_iter().collect());
        self
    }

    /// Exclude specific tools
    pub fn with_exclude(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.exclude = names.into_iter().collect();
        self
    }

    pub fn matches(&self, tool: &ToolSpec) -> bool {
        if self.exclude.contains(&tool.remote_name) {
            return false;
        }
        match &self.include {
            Some(include) => include.contains(&tool.remote_name),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportSettings;

    fn spec(name: &str) -> ToolSpec {
        ToolSpec::new("tasks", name, "")
    }

    #[test]
    fn test_filter_all() {
        assert!(ToolFilter::all().matches(&spec("addItem")));
    }

    #[test]
    fn test_filter_exclude() {
        let filter = ToolFilter::all().with_exclude(["purgeAll".to_string()]);

        assert!(filter.matches(&spec("addItem")));
        assert!(!filter.matches(&spec("purgeAll")));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let settings = ProviderSettings::new("tasks", TransportSettings::InProcess)
            .with_include(["addItem", "purgeAll"])
            .with_exclude(["purgeAll"]);
        let filter = ToolFilter::from_settings(&settings);

        assert!(filter.matches(&spec("addItem")));
        assert!(!filter.matches(&spec("purgeAll")));
        assert!(!filter.matches(&spec("listItems")));
    }
}
