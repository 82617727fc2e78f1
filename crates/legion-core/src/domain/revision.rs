//! Revision handle reported by the serving resource.

use serde::{Deserialize, Serialize};

/// Identifier of the latest ready revision of a serving configuration.
///
/// The empty handle means "not converged yet"; it is a normal state, not an
/// error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionHandle(String);

impl RevisionHandle {
    pub fn new(name: impl Into<String>) -> Self {
        RevisionHandle(name.into())
    }

    /// The "not yet converged" sentinel.
    pub fn empty() -> Self {
        RevisionHandle(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the workload instance backing this revision.
    pub fn workload_name(&self) -> String {
        format!("{}-deployment", self.0)
    }

    /// In-cluster address of this revision.
    pub fn service_url(&self, namespace: &str, cluster_domain: &str) -> String {
        format!("{}.{}.svc.{}", self.0, namespace, cluster_domain)
    }
}

impl std::fmt::Display for RevisionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_sentinel() {
        assert!(RevisionHandle::empty().is_empty());
        assert!(RevisionHandle::default().is_empty());
        assert!(!RevisionHandle::new("rev-7").is_empty());
    }

    #[test]
    fn derived_names() {
        let rev = RevisionHandle::new("wine-00007");
        assert_eq!(rev.workload_name(), "wine-00007-deployment");
        assert_eq!(
            rev.service_url("team-a", "cluster.local"),
            "wine-00007.team-a.svc.cluster.local"
        );
    }
}
