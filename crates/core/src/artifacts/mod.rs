//! Compiled contract artifacts and their link references

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod store;

pub use store::ArtifactStore;

/// Solidity ABI represented as JSON values
pub type Abi = Vec<Value>;

/// Bytecode value of a contract without deployable code
pub const EMPTY_BYTECODE: &str = "0x";

/// Source file -> library name -> placeholder spans, in artifact order
pub type LinkReferences = IndexMap<String, IndexMap<String, Vec<LinkReference>>>;

/// A span of the unlinked bytecode that holds a library placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReference {
    /// Byte offset into the bytecode payload
    pub start: usize,
    /// Number of bytes covered by the placeholder
    pub length: usize,
}

/// Errors produced while loading artifacts
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("invalid artifact{}: {reason}", source_hint(.path))]
    Invalid {
        path: Option<String>,
        reason: String,
    },

    #[error("artifact for contract \"{name}\" not found.{}", list_hint("Did you mean", .suggestions))]
    NotFound {
        name: String,
        suggestions: Vec<String>,
    },

    #[error("there are multiple artifacts for contract \"{name}\", please use a fully qualified name instead.{}", list_hint("Candidates", .candidates))]
    Ambiguous {
        name: String,
        candidates: Vec<String>,
    },

    #[error("failed to read artifact {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ArtifactError {
    /// Stable tag used in machine readable output
    pub fn kind(&self) -> &'static str {
        match self {
            ArtifactError::Invalid { .. } => "InvalidArtifact",
            ArtifactError::NotFound { .. } => "ArtifactNotFound",
            ArtifactError::Ambiguous { .. } => "AmbiguousArtifactName",
            ArtifactError::Io { .. } => "ArtifactIo",
        }
    }

    fn invalid(reason: impl Into<String>) -> Self {
        ArtifactError::Invalid {
            path: None,
            reason: reason.into(),
        }
    }
}

fn source_hint(path: &Option<String>) -> String {
    path.as_ref()
        .map(|p| format!(" at {p}"))
        .unwrap_or_default()
}

fn list_hint(title: &str, items: &[String]) -> String {
    if items.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = items.iter().map(|item| format!("  * {item}")).collect();
    format!("\n{title}:\n{}", lines.join("\n"))
}

/// A compiled contract as written by the build framework
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub contract_name: String,
    pub source_name: String,
    pub abi: Abi,
    /// Creation bytecode, `0x`-prefixed, possibly containing link placeholders
    pub bytecode: String,
    pub deployed_bytecode: String,
    pub link_references: LinkReferences,
    pub deployed_link_references: LinkReferences,
}

impl Artifact {
    /// Parses and validates an artifact from its JSON text
    pub fn from_json(json: &str) -> Result<Self, ArtifactError> {
        let artifact: Artifact =
            serde_json::from_str(json).map_err(|e| ArtifactError::invalid(e.to_string()))?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// Parses and validates an artifact from an already decoded JSON value
    pub fn from_value(value: Value) -> Result<Self, ArtifactError> {
        let artifact: Artifact =
            serde_json::from_value(value).map_err(|e| ArtifactError::invalid(e.to_string()))?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// Returns `sourceName:contractName`
    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.contract_name)
    }

    /// Abstract contracts and interfaces carry no creation code
    pub fn is_abstract(&self) -> bool {
        self.bytecode == EMPTY_BYTECODE
    }

    /// Whether the creation bytecode contains library placeholders
    pub fn needs_linking(&self) -> bool {
        self.link_references.values().any(|libs| !libs.is_empty())
    }

    fn validate(&self) -> Result<(), ArtifactError> {
        if self.contract_name.is_empty() {
            return Err(ArtifactError::invalid("empty contractName"));
        }
        if self.source_name.is_empty() {
            return Err(ArtifactError::invalid("empty sourceName"));
        }
        check_bytecode_shape("bytecode", &self.bytecode)?;
        check_bytecode_shape("deployedBytecode", &self.deployed_bytecode)?;
        check_spans("linkReferences", &self.link_references, &self.bytecode)?;
        check_spans(
            "deployedLinkReferences",
            &self.deployed_link_references,
            &self.deployed_bytecode,
        )?;
        Ok(())
    }
}

/// Every placeholder span must lie inside the bytecode payload
fn check_spans(
    field: &str,
    link_references: &LinkReferences,
    bytecode: &str,
) -> Result<(), ArtifactError> {
    let size = bytecode.len().saturating_sub(2) / 2;
    for (source, libraries) in link_references {
        for (library, spans) in libraries {
            for span in spans {
                let end = span.start.checked_add(span.length);
                if end.map_or(true, |end| end > size) {
                    return Err(ArtifactError::invalid(format!(
                        "{field} span of {source}:{library} at offset {} exceeds the {size}-byte bytecode",
                        span.start
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Placeholders are not hex, so only the prefix and the byte alignment are checked
fn check_bytecode_shape(field: &str, bytecode: &str) -> Result<(), ArtifactError> {
    let Some(payload) = bytecode.strip_prefix("0x") else {
        return Err(ArtifactError::invalid(format!(
            "{field} must start with 0x"
        )));
    };
    if payload.len() % 2 != 0 {
        return Err(ArtifactError::invalid(format!(
            "{field} has an odd number of hex characters"
        )));
    }
    if !payload.is_ascii() {
        return Err(ArtifactError::invalid(format!(
            "{field} contains non-ASCII characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn artifact_json(link_references: Value) -> Value {
        json!({
            "_format": "hh-sol-artifact-1",
            "contractName": "Greeter",
            "sourceName": "contracts/Greeter.sol",
            "abi": [{"type": "constructor", "inputs": [{"name": "_greeting", "type": "string"}]}],
            "bytecode": format!("0x{}", "00".repeat(64)),
            "deployedBytecode": "0x6080",
            "linkReferences": link_references,
            "deployedLinkReferences": {}
        })
    }

    #[test]
    fn test_parse_artifact() {
        let artifact = Artifact::from_value(artifact_json(json!({
            "contracts/A.sol": {"Lib": [{"start": 10, "length": 20}]}
        })))
        .unwrap();

        assert_eq!(artifact.contract_name, "Greeter");
        assert_eq!(artifact.fully_qualified_name(), "contracts/Greeter.sol:Greeter");
        assert_eq!(
            artifact.link_references["contracts/A.sol"]["Lib"],
            vec![LinkReference {
                start: 10,
                length: 20
            }]
        );
        assert!(artifact.needs_linking());
        assert!(!artifact.is_abstract());
    }

    #[test]
    fn test_link_reference_order_is_preserved() {
        let json = r#"{
            "contractName": "C", "sourceName": "c.sol", "abi": [],
            "bytecode": "0x", "deployedBytecode": "0x",
            "linkReferences": {
                "z.sol": {"Zed": [], "Alpha": []},
                "a.sol": {"Beta": []}
            },
            "deployedLinkReferences": {}
        }"#;
        let artifact = Artifact::from_json(json).unwrap();
        let sources: Vec<&String> = artifact.link_references.keys().collect();
        assert_eq!(sources, ["z.sol", "a.sol"]);
        let libs: Vec<&String> = artifact.link_references["z.sol"].keys().collect();
        assert_eq!(libs, ["Zed", "Alpha"]);
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let mut value = artifact_json(json!({}));
        value.as_object_mut().unwrap().remove("deployedLinkReferences");

        let err = Artifact::from_value(value).unwrap_err();
        assert_eq!(err.kind(), "InvalidArtifact");
        assert!(err.to_string().contains("deployedLinkReferences"));
    }

    #[test]
    fn test_wrong_shapes_are_rejected() {
        let mut value = artifact_json(json!({}));
        value["abi"] = json!({"not": "an array"});
        assert!(Artifact::from_value(value).is_err());

        let mut value = artifact_json(json!({}));
        value["bytecode"] = json!(42);
        assert!(Artifact::from_value(value).is_err());

        let mut value = artifact_json(json!({}));
        value["bytecode"] = json!("6080");
        let err = Artifact::from_value(value).unwrap_err();
        assert!(err.to_string().contains("must start with 0x"));

        let mut value = artifact_json(json!({}));
        value["deployedBytecode"] = json!("0x608");
        let err = Artifact::from_value(value).unwrap_err();
        assert!(err.to_string().contains("odd number"));
    }

    #[test]
    fn test_span_outside_bytecode_is_rejected() {
        let value = artifact_json(json!({
            "contracts/A.sol": {"Lib": [{"start": 60, "length": 20}]}
        }));
        let err = Artifact::from_value(value).unwrap_err();
        assert_eq!(err.kind(), "InvalidArtifact");
        assert!(err.to_string().contains("contracts/A.sol:Lib"));

        let value = artifact_json(json!({
            "contracts/A.sol": {"Lib": [{"start": u64::MAX, "length": 20}]}
        }));
        assert!(Artifact::from_value(value).is_err());
    }

    #[test]
    fn test_abstract_artifact() {
        let mut value = artifact_json(json!({}));
        value["bytecode"] = json!("0x");
        let artifact = Artifact::from_value(value).unwrap();
        assert!(artifact.is_abstract());
        assert!(!artifact.needs_linking());
    }

    #[test]
    fn test_error_messages_list_names() {
        let err = ArtifactError::Ambiguous {
            name: "Greeter".to_string(),
            candidates: vec!["a.sol:Greeter".to_string(), "b.sol:Greeter".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("fully qualified name"));
        assert!(message.contains("  * a.sol:Greeter\n  * b.sol:Greeter"));
    }
}
