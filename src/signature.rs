//! The build signature (§3, §10): a stable hash identifying "this exact
//! combination of tasks, task configuration, project identity, and engine
//! component versions", used as the cache key directory name (§6).

use serde::Serialize;

use crate::error::{BuildEngineError, Result};
use crate::utils::hash_json;

/// Inputs hashed into a [`BuildSignature`]. Kept as owned, sorted data so
/// hashing is deterministic regardless of call-site iteration order.
#[derive(Debug, Clone, Serialize)]
pub struct BuildSignatureInputs {
    pub project_name: String,
    pub project_version: String,
    pub task_ids: Vec<String>,
    pub task_config_hashes: Vec<String>,
    pub component_versions: Vec<(String, String)>,
}

/// A deterministic digest over [`BuildSignatureInputs`]. Two builds with the
/// same signature are expected to produce identical outputs given identical
/// file contents (§3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
pub struct BuildSignature(pub String);

impl BuildSignature {
    pub fn compute(inputs: &BuildSignatureInputs) -> Result<Self> {
        semver::Version::parse(&inputs.project_version).map_err(|source| {
            BuildEngineError::invalid_configuration(format!(
                "project version `{}` is not valid semver: {source}",
                inputs.project_version
            ))
        })?;
        for (component, version) in &inputs.component_versions {
            semver::Version::parse(version).map_err(|source| {
                BuildEngineError::invalid_configuration(format!(
                    "component `{component}` version `{version}` is not valid semver: {source}"
                ))
            })?;
        }

        let mut inputs = inputs.clone();
        inputs.component_versions.sort();
        Ok(Self(hash_json(&inputs)?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BuildSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hashes a single task's configuration payload; used to populate
/// [`BuildSignatureInputs::task_config_hashes`].
pub fn hash_task_config<T: Serialize>(config: &T) -> Result<String> {
    hash_json(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> BuildSignatureInputs {
        BuildSignatureInputs {
            project_name: "application.a".into(),
            project_version: "1.0.0".into(),
            task_ids: vec!["replaceCopyright".into(), "minify".into()],
            task_config_hashes: vec!["abc".into(), "def".into()],
            component_versions: vec![("engine".into(), "0.1.0".into())],
        }
    }

    #[test]
    fn identical_inputs_hash_identically() {
        let a = BuildSignature::compute(&inputs()).unwrap();
        let b = BuildSignature::compute(&inputs()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn component_version_order_does_not_affect_signature() {
        let mut swapped = inputs();
        swapped.component_versions =
            vec![("engine".into(), "0.1.0".into()), ("aaa".into(), "1".into())];
        let mut base = inputs();
        base.component_versions = vec![("aaa".into(), "1".into()), ("engine".into(), "0.1.0".into())];

        assert_eq!(BuildSignature::compute(&swapped).unwrap(), BuildSignature::compute(&base).unwrap());
    }

    #[test]
    fn different_task_list_changes_signature() {
        let mut other = inputs();
        other.task_ids.push("extra".into());
        assert_ne!(BuildSignature::compute(&inputs()).unwrap(), BuildSignature::compute(&other).unwrap());
    }

    #[test]
    fn non_semver_project_version_is_rejected() {
        let mut bad = inputs();
        bad.project_version = "not-a-version".into();
        assert!(BuildSignature::compute(&bad).is_err());
    }

    #[test]
    fn non_semver_component_version_is_rejected() {
        let mut bad = inputs();
        bad.component_versions = vec![("engine".into(), "latest".into())];
        assert!(BuildSignature::compute(&bad).is_err());
    }
}
