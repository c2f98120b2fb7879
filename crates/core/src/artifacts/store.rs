//! Filesystem artifact store
//!
//! Artifacts live at `<artifacts_dir>/<sourceName>/<ContractName>.json`, next to
//! `.dbg.json` debug files and a `build-info` directory that are ignored here.

use super::{Artifact, ArtifactError};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

const BUILD_INFO_DIR: &str = "build-info";
const DEBUG_SUFFIX: &str = ".dbg.json";

/// Read-only view over a directory of compiled artifacts
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    artifacts_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifacts_dir: artifacts_dir.into(),
        }
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    /// Reads an artifact by bare contract name or by `source:Contract`
    pub fn read_artifact(&self, name: &str) -> Result<Artifact, ArtifactError> {
        let fully_qualified = match name.rsplit_once(':') {
            Some((source, contract)) => (source.to_string(), contract.to_string()),
            None => self.resolve_bare_name(name)?,
        };
        let (source_name, contract_name) = fully_qualified;

        let path = self.artifact_path(&source_name, &contract_name)?;
        if !path.is_file() {
            return Err(ArtifactError::NotFound {
                name: name.to_string(),
                suggestions: self.suggestions_for(&contract_name),
            });
        }

        debug!("Reading artifact {}:{} from {}", source_name, contract_name, path.display());
        let json = std::fs::read_to_string(&path).map_err(|source| ArtifactError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let artifact = Artifact::from_json(&json).map_err(|e| match e {
            ArtifactError::Invalid { reason, .. } => ArtifactError::Invalid {
                path: Some(path.display().to_string()),
                reason,
            },
            other => other,
        })?;

        if artifact.contract_name != contract_name || artifact.source_name != source_name {
            return Err(ArtifactError::Invalid {
                path: Some(path.display().to_string()),
                reason: format!(
                    "file declares {} but is stored as {}:{}",
                    artifact.fully_qualified_name(),
                    source_name,
                    contract_name
                ),
            });
        }

        Ok(artifact)
    }

    /// Every fully-qualified contract name in the store, sorted
    pub fn fully_qualified_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .artifact_files()
            .map(|(source, contract)| format!("{source}:{contract}"))
            .collect();
        names.sort();
        names
    }

    /// Path of an artifact file for a given source and contract.
    ///
    /// Names that would leave the artifacts directory (`..`, absolute or empty
    /// components) are rejected.
    pub fn artifact_path(
        &self,
        source_name: &str,
        contract_name: &str,
    ) -> Result<PathBuf, ArtifactError> {
        let mut path = self.artifacts_dir.clone();
        for component in source_name.split('/') {
            if !is_plain_component(component) {
                return Err(escaping_name(source_name, contract_name));
            }
            path.push(component);
        }
        if !is_plain_component(contract_name) || contract_name.contains('/') {
            return Err(escaping_name(source_name, contract_name));
        }
        Ok(path.join(format!("{contract_name}.json")))
    }

    fn resolve_bare_name(&self, contract_name: &str) -> Result<(String, String), ArtifactError> {
        let mut matches: Vec<(String, String)> = self
            .artifact_files()
            .filter(|(_, contract)| contract == contract_name)
            .collect();
        matches.sort();

        match matches.len() {
            0 => Err(ArtifactError::NotFound {
                name: contract_name.to_string(),
                suggestions: self.suggestions_for(contract_name),
            }),
            1 => Ok(matches.remove(0)),
            _ => Err(ArtifactError::Ambiguous {
                name: contract_name.to_string(),
                candidates: matches
                    .into_iter()
                    .map(|(source, contract)| format!("{source}:{contract}"))
                    .collect(),
            }),
        }
    }

    /// Names differing only in letter case are offered as suggestions
    fn suggestions_for(&self, contract_name: &str) -> Vec<String> {
        let mut suggestions: Vec<String> = self
            .artifact_files()
            .filter(|(_, contract)| {
                contract != contract_name && contract.eq_ignore_ascii_case(contract_name)
            })
            .map(|(source, contract)| format!("{source}:{contract}"))
            .collect();
        suggestions.sort();
        suggestions
    }

    /// Yields `(source_name, contract_name)` for every artifact file
    fn artifact_files(&self) -> impl Iterator<Item = (String, String)> + '_ {
        WalkDir::new(&self.artifacts_dir)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| entry.file_name() != BUILD_INFO_DIR)
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(move |entry| {
                let file_name = entry.file_name().to_str()?;
                if file_name.ends_with(DEBUG_SUFFIX) {
                    return None;
                }
                let contract = file_name.strip_suffix(".json")?.to_string();
                let parent = entry.path().parent()?.strip_prefix(&self.artifacts_dir).ok()?;
                let source: Vec<&str> = parent
                    .components()
                    .map(|c| c.as_os_str().to_str())
                    .collect::<Option<_>>()?;
                if source.is_empty() {
                    return None;
                }
                Some((source.join("/"), contract))
            })
    }
}

fn is_plain_component(component: &str) -> bool {
    !component.is_empty()
        && component != "."
        && component != ".."
        && !component.contains('\\')
        && !Path::new(component).has_root()
}

fn escaping_name(source_name: &str, contract_name: &str) -> ArtifactError {
    ArtifactError::Invalid {
        path: None,
        reason: format!(
            "{source_name}:{contract_name} does not name a file inside the artifacts directory"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn write_artifact(root: &Path, source_name: &str, contract_name: &str) {
        let dir = root.join(source_name);
        fs::create_dir_all(&dir).unwrap();
        let artifact = json!({
            "contractName": contract_name,
            "sourceName": source_name,
            "abi": [],
            "bytecode": "0x6080",
            "deployedBytecode": "0x6080",
            "linkReferences": {},
            "deployedLinkReferences": {}
        });
        fs::write(
            dir.join(format!("{contract_name}.json")),
            serde_json::to_string_pretty(&artifact).unwrap(),
        )
        .unwrap();
        fs::write(
            dir.join(format!("{contract_name}.dbg.json")),
            r#"{"buildInfo": "../../build-info/abc.json"}"#,
        )
        .unwrap();
    }

    fn create_store() -> (TempDir, ArtifactStore) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write_artifact(root, "contracts/Greeter.sol", "Greeter");
        write_artifact(root, "contracts/Token.sol", "Token");
        write_artifact(root, "contracts/legacy/Token.sol", "Token");
        fs::create_dir_all(root.join("build-info")).unwrap();
        fs::write(root.join("build-info/abc.json"), "{}").unwrap();

        let store = ArtifactStore::new(root);
        (temp_dir, store)
    }

    #[test]
    fn test_read_by_bare_name() {
        let (_dir, store) = create_store();
        let artifact = store.read_artifact("Greeter").unwrap();
        assert_eq!(artifact.source_name, "contracts/Greeter.sol");
    }

    #[test]
    fn test_read_by_fully_qualified_name() {
        let (_dir, store) = create_store();
        let artifact = store.read_artifact("contracts/legacy/Token.sol:Token").unwrap();
        assert_eq!(artifact.source_name, "contracts/legacy/Token.sol");
    }

    #[test]
    fn test_ambiguous_bare_name() {
        let (_dir, store) = create_store();
        match store.read_artifact("Token") {
            Err(ArtifactError::Ambiguous { candidates, .. }) => assert_eq!(
                candidates,
                vec![
                    "contracts/Token.sol:Token".to_string(),
                    "contracts/legacy/Token.sol:Token".to_string()
                ]
            ),
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn test_not_found_with_suggestion() {
        let (_dir, store) = create_store();
        match store.read_artifact("greeter") {
            Err(ArtifactError::NotFound { suggestions, .. }) => {
                assert_eq!(suggestions, vec!["contracts/Greeter.sol:Greeter".to_string()])
            }
            other => panic!("expected not found, got {other:?}"),
        }

        assert!(matches!(
            store.read_artifact("contracts/Missing.sol:Missing"),
            Err(ArtifactError::NotFound { .. })
        ));
    }

    #[test]
    fn test_fully_qualified_names_skip_debug_and_build_info() {
        let (_dir, store) = create_store();
        assert_eq!(
            store.fully_qualified_names(),
            vec![
                "contracts/Greeter.sol:Greeter".to_string(),
                "contracts/Token.sol:Token".to_string(),
                "contracts/legacy/Token.sol:Token".to_string(),
            ]
        );
    }

    #[test]
    fn test_names_escaping_the_store_are_rejected() {
        let (dir, store) = create_store();
        let outside = dir.path().join("outside");
        write_artifact(&outside, "Secret.sol", "Secret");
        let nested = ArtifactStore::new(dir.path().join("contracts"));

        for name in [
            "../outside/Secret.sol:Secret",
            "/etc/Secret.sol:Secret",
            "contracts/./Greeter.sol:Greeter",
            "contracts/Greeter.sol:../Greeter",
        ] {
            let err = nested.read_artifact(name).unwrap_err();
            assert_eq!(err.kind(), "InvalidArtifact", "{name}");
        }

        assert!(store.artifact_path("contracts//Greeter.sol", "Greeter").is_err());
        assert_eq!(
            store.artifact_path("contracts/Greeter.sol", "Greeter").unwrap(),
            dir.path().join("contracts").join("Greeter.sol").join("Greeter.json")
        );
    }

    #[test]
    fn test_malformed_artifact_reports_path() {
        let (dir, store) = create_store();
        let broken = dir.path().join("contracts/Broken.sol");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join("Broken.json"), r#"{"contractName": "Broken"}"#).unwrap();

        let err = store.read_artifact("Broken").unwrap_err();
        assert_eq!(err.kind(), "InvalidArtifact");
        assert!(err.to_string().contains("Broken.json"));
    }
}
