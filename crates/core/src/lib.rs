//! Library linking and contract factories for Conflux hardhat projects
pub mod address;
pub mod artifacts;
pub mod blockchain;
pub mod config;
pub mod factory;
pub mod linking;
mod utils;
pub mod verify;

pub use address::{Address, AddressError};
pub use artifacts::{Abi, Artifact, ArtifactError, ArtifactStore, LinkReference, LinkReferences};
pub use blockchain::NetworkConfig;
pub use config::{PluginConfig, PluginConfigBuilder, CONFIG_FILE_NAME};
pub use factory::{
    contract_at, contract_factory, ContractAtSource, ContractFactory, ContractInstance,
    FactoryError, FactoryOptions, FactorySource,
};
pub use linking::{
    link_artifact, link_bytecode, needed_libraries, resolve_libraries, Libraries, LibraryLink,
    LinkingError, NeededLibrary,
};
pub use verify::{LicenseType, ScanResponse, VerifyError, VerifyRequest, VerifyRequestBuilder};

#[cfg(feature = "scan")]
pub use verify::ScanClient;
