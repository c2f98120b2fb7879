//! Contract factories and instances built from artifacts

use crate::{
    address::{Address, AddressError},
    artifacts::{Abi, Artifact, ArtifactError, ArtifactStore, LinkReferences},
    linking::{self, Libraries, LibraryLink, LinkingError},
    utils,
};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Options applied when building a factory from a named artifact
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactoryOptions {
    /// Library identifier -> address used to link the bytecode
    pub libraries: Libraries,
}

impl FactoryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a library link
    pub fn library(mut self, identifier: impl Into<String>, address: impl Into<String>) -> Self {
        self.libraries.insert(identifier.into(), address.into());
        self
    }

    /// Fills in project-wide default libraries the contract needs and that were not
    /// given explicitly. Defaults that match nothing, match ambiguously or name a
    /// library already supplied are skipped.
    pub fn with_default_libraries(
        mut self,
        defaults: &Libraries,
        link_references: &LinkReferences,
    ) -> Self {
        let needed = linking::needed_libraries(link_references);
        let matches = |identifier: &str| -> Vec<String> {
            needed
                .iter()
                .filter(|lib| {
                    lib.library_name == identifier || lib.fully_qualified_name() == identifier
                })
                .map(|lib| lib.fully_qualified_name())
                .collect()
        };

        let explicit: Vec<String> = self
            .libraries
            .keys()
            .flat_map(|identifier| matches(identifier.as_str()))
            .collect();

        for (identifier, address) in defaults {
            if self.libraries.contains_key(identifier) {
                continue;
            }
            match matches(identifier.as_str()).as_slice() {
                [fqn] if !explicit.contains(fqn) => {
                    debug!("Using default address {} for library {}", address, fqn);
                    self.libraries.insert(identifier.clone(), address.clone());
                }
                [] | [_] => debug!("Skipping default library {}", identifier),
                candidates => warn!(
                    "Default library {} is ambiguous ({}), use a fully qualified name",
                    identifier,
                    candidates.join(", ")
                ),
            }
        }
        self
    }
}

/// What a contract factory is built from
#[derive(Debug, Clone)]
pub enum FactorySource {
    /// A named artifact, linked with the given options
    ByName {
        contract_name: String,
        options: FactoryOptions,
    },
    /// Raw ABI and already linked bytecode
    ByAbiAndBytecode { abi: Abi, bytecode: String },
}

/// What a contract instance is built from
#[derive(Debug, Clone)]
pub enum ContractAtSource {
    ByName { contract_name: String },
    ByAbi { abi: Abi },
}

/// Linked ABI/bytecode pair ready to be handed to the chain SDK for deployment
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractFactory {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_name: Option<String>,
    pub abi: Abi,
    pub bytecode: String,
    /// SHA-256 of the decoded bytecode
    pub bytecode_hash: String,
    pub bytecode_size: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub libraries: Vec<LibraryLink>,
}

impl ContractFactory {
    fn new(
        contract_name: Option<String>,
        abi: Abi,
        bytecode: String,
        libraries: Vec<LibraryLink>,
    ) -> Result<Self, FactoryError> {
        let payload = bytecode
            .strip_prefix("0x")
            .ok_or_else(|| FactoryError::invalid_bytecode("bytecode must start with 0x"))?;
        let code = hex::decode(payload).map_err(|e| {
            FactoryError::invalid_bytecode(format!("bytecode is not valid hex ({e})"))
        })?;

        Ok(Self {
            contract_name,
            abi,
            bytecode_hash: format!("0x{}", utils::hash_bytes(&code)),
            bytecode_size: code.len(),
            bytecode,
            libraries,
        })
    }
}

/// An ABI bound to a deployed contract address
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractInstance {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_name: Option<String>,
    pub abi: Abi,
    pub address: Address,
}

/// Errors produced while creating factories and instances
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Linking(#[from] LinkingError),

    #[error("You are trying to create a contract factory for the contract {contract_name}, which is abstract and can't be deployed.\nIf you want to call a contract using {contract_name} as its interface use contract_at instead.")]
    AbstractContract { contract_name: String },

    #[error("invalid contract address {address}: {reason}")]
    InvalidAddress {
        address: String,
        reason: AddressError,
    },

    #[error("invalid bytecode: {reason}")]
    InvalidBytecode { reason: String },
}

impl FactoryError {
    /// Stable tag identifying the failure
    pub fn kind(&self) -> &'static str {
        match self {
            FactoryError::Artifact(e) => e.kind(),
            FactoryError::Linking(e) => e.kind(),
            FactoryError::AbstractContract { .. } => "AbstractContract",
            FactoryError::InvalidAddress { .. } => "InvalidAddress",
            FactoryError::InvalidBytecode { .. } => "InvalidBytecode",
        }
    }

    /// Candidate or missing names a caller can act on
    pub fn remediation(&self) -> Vec<String> {
        match self {
            FactoryError::Linking(e) => e.remediation(),
            FactoryError::Artifact(ArtifactError::Ambiguous { candidates, .. }) => {
                candidates.clone()
            }
            FactoryError::Artifact(ArtifactError::NotFound { suggestions, .. }) => {
                suggestions.clone()
            }
            _ => Vec::new(),
        }
    }

    fn invalid_bytecode(reason: impl Into<String>) -> Self {
        FactoryError::InvalidBytecode {
            reason: reason.into(),
        }
    }
}

/// Builds a contract factory from either a named artifact or a raw ABI/bytecode pair
pub fn contract_factory(
    store: &ArtifactStore,
    source: FactorySource,
) -> Result<ContractFactory, FactoryError> {
    match source {
        FactorySource::ByName {
            contract_name,
            options,
        } => {
            let artifact = store.read_artifact(&contract_name)?;
            contract_factory_from_artifact(&artifact, &options)
        }
        FactorySource::ByAbiAndBytecode { abi, bytecode } => {
            ContractFactory::new(None, abi, bytecode, Vec::new())
        }
    }
}

/// Builds a contract factory from a loaded artifact, linking its libraries
pub fn contract_factory_from_artifact(
    artifact: &Artifact,
    options: &FactoryOptions,
) -> Result<ContractFactory, FactoryError> {
    if artifact.is_abstract() {
        return Err(FactoryError::AbstractContract {
            contract_name: artifact.contract_name.clone(),
        });
    }

    let links = linking::resolve_libraries(
        &artifact.contract_name,
        &artifact.link_references,
        &options.libraries,
    )?;
    let bytecode = linking::link_bytecode(&artifact.bytecode, &artifact.link_references, &links)?;

    let factory = ContractFactory::new(
        Some(artifact.contract_name.clone()),
        artifact.abi.clone(),
        bytecode,
        links,
    )?;
    info!(
        "Created factory for {} ({} bytes, {} libraries linked)",
        artifact.fully_qualified_name(),
        factory.bytecode_size,
        factory.libraries.len()
    );
    Ok(factory)
}

/// Binds an ABI to an existing contract address
pub fn contract_at(
    store: &ArtifactStore,
    source: ContractAtSource,
    address: &str,
) -> Result<ContractInstance, FactoryError> {
    match source {
        ContractAtSource::ByName { contract_name } => {
            let artifact = store.read_artifact(&contract_name)?;
            contract_at_from_artifact(&artifact, address)
        }
        ContractAtSource::ByAbi { abi } => Ok(ContractInstance {
            contract_name: None,
            abi,
            address: parse_address(address)?,
        }),
    }
}

/// Binds an artifact's ABI to an existing contract address
pub fn contract_at_from_artifact(
    artifact: &Artifact,
    address: &str,
) -> Result<ContractInstance, FactoryError> {
    Ok(ContractInstance {
        contract_name: Some(artifact.contract_name.clone()),
        abi: artifact.abi.clone(),
        address: parse_address(address)?,
    })
}

fn parse_address(address: &str) -> Result<Address, FactoryError> {
    address.parse().map_err(|reason| FactoryError::InvalidAddress {
        address: address.to_string(),
        reason,
    })
}
