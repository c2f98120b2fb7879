//! Library linking for compiled contracts
//!
//! Linking happens in two steps. [`resolve_libraries`] matches the user supplied
//! library identifiers against the libraries an artifact needs, and
//! [`link_bytecode`] writes the resolved addresses into the placeholder spans.

use crate::{
    address::{Address, AddressError},
    artifacts::Artifact,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

mod linker;
mod resolver;

pub use linker::link_bytecode;
pub use resolver::{needed_libraries, resolve_libraries};

/// Library identifier (bare or `source:Name`) -> address, in input order
pub type Libraries = IndexMap<String, String>;

/// A library referenced by the link references of an artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NeededLibrary {
    pub source_name: String,
    pub library_name: String,
}

impl NeededLibrary {
    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.library_name)
    }
}

/// A library resolved to the address it must be linked against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryLink {
    pub source_name: String,
    pub library_name: String,
    pub address: Address,
}

impl LibraryLink {
    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.library_name)
    }
}

/// Everything that can go wrong while linking a contract
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkingError {
    #[error("You tried to link the contract {contract_name} with the library {library}, but provided this invalid address: {address} ({reason})")]
    InvalidAddress {
        contract_name: String,
        library: String,
        address: String,
        reason: AddressError,
    },

    #[error("You tried to link the contract {contract_name} with {library}, which isn't one of its libraries.\n{}", unknown_detail(.needed))]
    UnknownLibrary {
        contract_name: String,
        library: String,
        /// Fully-qualified names of every library the contract needs
        needed: Vec<String>,
    },

    #[error("The library name {library} is ambiguous for the contract {contract_name}. It may resolve to one of the following libraries:\n{}\n\nTo fix this, choose one of these fully qualified library names and replace where appropriate.", bullet_list(.candidates))]
    AmbiguousLibraryName {
        contract_name: String,
        library: String,
        candidates: Vec<String>,
    },

    #[error("The library names {library_name} and {fully_qualified_name} refer to the same library and were given as two separate library links to the contract {contract_name}. Remove one of them and review your library links before proceeding.")]
    DuplicateLibraryLink {
        contract_name: String,
        library_name: String,
        fully_qualified_name: String,
    },

    #[error("The contract {contract_name} is missing links for the following libraries:\n{}", bullet_list(.missing))]
    MissingLibraryLinks {
        contract_name: String,
        missing: Vec<String>,
    },

    #[error("internal linking fault: {reason}")]
    InternalLinkingFault { reason: String },
}

impl LinkingError {
    /// Stable tag identifying the failure
    pub fn kind(&self) -> &'static str {
        match self {
            LinkingError::InvalidAddress { .. } => "InvalidAddress",
            LinkingError::UnknownLibrary { .. } => "UnknownLibrary",
            LinkingError::AmbiguousLibraryName { .. } => "AmbiguousLibraryName",
            LinkingError::DuplicateLibraryLink { .. } => "DuplicateLibraryLink",
            LinkingError::MissingLibraryLinks { .. } => "MissingLibraryLinks",
            LinkingError::InternalLinkingFault { .. } => "InternalLinkingFault",
        }
    }

    /// The names a caller can act on to fix the failure
    pub fn remediation(&self) -> Vec<String> {
        match self {
            LinkingError::UnknownLibrary { needed, .. } => needed.clone(),
            LinkingError::AmbiguousLibraryName { candidates, .. } => candidates.clone(),
            LinkingError::DuplicateLibraryLink {
                library_name,
                fully_qualified_name,
                ..
            } => vec![library_name.clone(), fully_qualified_name.clone()],
            LinkingError::MissingLibraryLinks { missing, .. } => missing.clone(),
            LinkingError::InvalidAddress { .. } | LinkingError::InternalLinkingFault { .. } => {
                Vec::new()
            }
        }
    }

    /// Whether the error points at a bug rather than at bad input
    pub fn is_internal(&self) -> bool {
        matches!(self, LinkingError::InternalLinkingFault { .. })
    }

    pub(crate) fn fault(reason: impl Into<String>) -> Self {
        LinkingError::InternalLinkingFault {
            reason: reason.into(),
        }
    }
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("* {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn unknown_detail(needed: &[String]) -> String {
    if needed.is_empty() {
        "This contract doesn't need linking any libraries.".to_string()
    } else {
        format!("The libraries needed are:\n{}", bullet_list(needed))
    }
}

/// Resolves `libraries` against the artifact and returns its linked creation bytecode
pub fn link_artifact(artifact: &Artifact, libraries: &Libraries) -> Result<String, LinkingError> {
    let links = resolve_libraries(&artifact.contract_name, &artifact.link_references, libraries)?;
    link_bytecode(&artifact.bytecode, &artifact.link_references, &links)
}
