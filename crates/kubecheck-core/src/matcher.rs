//! Selects the changed files that must be validated.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::changeset::ChangedFile;
use crate::config::{Configuration, Schema};

/// A changed file and the schemas that apply to it.
///
/// An empty schema list means generic well-formedness validation only.
#[derive(Debug, Clone)]
pub struct ValidationCandidate {
    pub file: ChangedFile,
    pub schemas: Vec<Arc<Schema>>,
}

impl ValidationCandidate {
    pub fn schema_names(&self) -> Vec<&str> {
        self.schemas.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Candidates keyed by path; iteration is in path order.
pub type Candidates = BTreeMap<String, ValidationCandidate>;

/// Keep the files matched by at least one configured glob.
///
/// Schemas from every matching rule are attached in declaration order, each
/// distinct schema (by content digest) once. Files without content at the
/// head ref (removed) are skipped.
pub fn match_candidates(config: &Configuration, files: &[ChangedFile]) -> Candidates {
    let mut candidates = Candidates::new();

    for file in files {
        let matching: Vec<_> = config
            .rules
            .iter()
            .filter(|rule| rule.matches(&file.path))
            .collect();
        if matching.is_empty() {
            continue;
        }
        if !file.status.has_content() {
            debug!(path = %file.path, "Skipping removed file");
            continue;
        }

        let mut seen = HashSet::new();
        let schemas = matching
            .iter()
            .flat_map(|rule| rule.schemas.iter())
            .filter(|schema| seen.insert(schema.digest.clone()))
            .cloned()
            .collect();

        candidates.insert(
            file.path.clone(),
            ValidationCandidate {
                file: file.clone(),
                schemas,
            },
        );
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::FileStatus;
    use crate::config::ManifestRule;
    use serde_json::json;

    fn schema(name: &str, doc: serde_json::Value) -> Arc<Schema> {
        Arc::new(Schema::compile(name, doc).expect("compile"))
    }

    fn config(rules: Vec<ManifestRule>) -> Configuration {
        Configuration {
            source_path: ".github/kubevalidator.yaml".to_string(),
            rules,
        }
    }

    fn file(path: &str) -> ChangedFile {
        ChangedFile::new(path, format!("https://example/{}", path), FileStatus::Modified)
    }

    #[test]
    fn test_unmatched_files_dropped() {
        let config = config(vec![ManifestRule::new("k8s/*.yaml", vec![]).expect("rule")]);
        let candidates = match_candidates(&config, &[file("k8s/deploy.yaml"), file("README.md")]);
        assert_eq!(candidates.len(), 1);
        let candidate = &candidates["k8s/deploy.yaml"];
        assert!(candidate.schemas.is_empty());
    }

    #[test]
    fn test_schemas_from_all_matching_rules_in_declaration_order() {
        let a = schema("a", json!({"required": ["kind"]}));
        let b = schema("b", json!({"required": ["metadata"]}));
        let config = config(vec![
            ManifestRule::new("k8s/*.yaml", vec![a.clone()]).expect("rule"),
            ManifestRule::new("**/*.yaml", vec![b.clone()]).expect("rule"),
        ]);
        let candidates = match_candidates(&config, &[file("k8s/deploy.yaml")]);
        assert_eq!(candidates["k8s/deploy.yaml"].schema_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_identical_schemas_deduplicated() {
        let a = schema("a", json!({"required": ["kind"]}));
        let same = schema("a-again", json!({"required": ["kind"]}));
        let config = config(vec![
            ManifestRule::new("k8s/*.yaml", vec![a]).expect("rule"),
            ManifestRule::new("k8s/deploy.yaml", vec![same]).expect("rule"),
        ]);
        let candidates = match_candidates(&config, &[file("k8s/deploy.yaml")]);
        assert_eq!(candidates["k8s/deploy.yaml"].schema_names(), vec!["a"]);
    }

    #[test]
    fn test_removed_files_skipped() {
        let config = config(vec![ManifestRule::new("k8s/*.yaml", vec![]).expect("rule")]);
        let removed = ChangedFile::new("k8s/old.yaml", "", FileStatus::Removed);
        let candidates = match_candidates(&config, &[removed, file("k8s/new.yaml")]);
        assert_eq!(candidates.keys().collect::<Vec<_>>(), vec!["k8s/new.yaml"]);
    }
}
