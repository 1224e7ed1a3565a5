//! Partition naming for one deployed agent build.

use majic_core::AgentConfig;

/// Identity of a deployed agent build.
///
/// The static and dynamic partition tags embed the build so a new deployment
/// starts from empty partitions. The offline tag deliberately does not: it is
/// the only continuity across deployments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentVersion {
    app_name: String,
    build: String,
}

impl AgentVersion {
    pub fn new(app_name: impl Into<String>, build: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            build: build.into(),
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(&config.app_name, &config.build)
    }

    pub fn build(&self) -> &str {
        &self.build
    }

    pub fn static_tag(&self) -> String {
        format!("{}-static-{}", self.app_name, self.build)
    }

    pub fn dynamic_tag(&self) -> String {
        format!("{}-dynamic-{}", self.app_name, self.build)
    }

    pub fn offline_tag(&self) -> String {
        format!("{}-offline", self.app_name)
    }

    pub fn tags(&self) -> [String; 3] {
        [self.static_tag(), self.dynamic_tag(), self.offline_tag()]
    }

    /// Any offline partition of this app, including ones written under an
    /// older tag scheme (`<app>-offline-<something>`).
    pub fn is_offline_partition(&self, name: &str) -> bool {
        let offline = self.offline_tag();
        name == offline || name.starts_with(&format!("{}-", offline))
    }

    /// Whether activation keeps the partition `name`.
    pub fn retains(&self, name: &str) -> bool {
        self.is_offline_partition(name) || self.tags().iter().any(|tag| tag == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags() {
        let v = AgentVersion::new("majic", "v3");
        assert_eq!(v.static_tag(), "majic-static-v3");
        assert_eq!(v.dynamic_tag(), "majic-dynamic-v3");
        assert_eq!(v.offline_tag(), "majic-offline");
    }

    #[test]
    fn test_offline_tag_is_stable_across_builds() {
        let v3 = AgentVersion::new("majic", "v3");
        let v4 = AgentVersion::new("majic", "v4");
        assert_eq!(v3.offline_tag(), v4.offline_tag());
        assert_ne!(v3.static_tag(), v4.static_tag());
    }

    #[test]
    fn test_retains() {
        let v4 = AgentVersion::new("majic", "v4");
        assert!(v4.retains("majic-static-v4"));
        assert!(v4.retains("majic-dynamic-v4"));
        assert!(v4.retains("majic-offline"));
        assert!(v4.retains("majic-offline-v1"));
        assert!(!v4.retains("majic-static-v3"));
        assert!(!v4.retains("majic-dynamic-v3"));
        assert!(!v4.retains("other-offline"));
        assert!(!v4.retains("majic-offlineish"));
    }

    #[test]
    fn test_from_config() {
        let v = AgentVersion::from_config(&AgentConfig::default());
        assert_eq!(v.build(), "v3");
        assert_eq!(v.static_tag(), "majic-static-v3");
    }
}
