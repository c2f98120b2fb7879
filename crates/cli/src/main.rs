//! CLI for the conflux-builder library
//!
//! Links library addresses into hardhat artifacts and submits sources to ConfluxScan.

use clap::{Parser, Subcommand};
use conflux_builder::{
    contract_at, factory::contract_factory_from_artifact, ArtifactStore, ContractAtSource,
    ContractFactory, ContractInstance, FactoryError, FactoryOptions, LicenseType, PluginConfig,
    ScanClient, ScanResponse, VerifyError, VerifyRequest, CONFIG_FILE_NAME,
};
use eyre::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Conflux contract linker and verifier
#[derive(Parser, Debug)]
#[command(name = "conflux-builder")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all logging except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Project configuration file
    #[arg(long, global = true, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,
}

/// Where artifacts are read from
#[derive(Parser, Debug, Clone)]
struct ArtifactSettings {
    /// Artifacts directory, overriding the configured one
    #[arg(long)]
    artifacts: Option<PathBuf>,

    /// Output JSON to stdout
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Link libraries into a contract's bytecode
    Link {
        /// Contract name or fully qualified name (source:Contract)
        contract: String,

        /// Library link as NAME=ADDRESS, repeatable
        #[arg(short = 'l', long = "library", value_parser = parse_library)]
        libraries: Vec<(String, String)>,

        #[command(flatten)]
        artifacts: ArtifactSettings,
    },

    /// Bind a contract's ABI to a deployed address
    At {
        /// Contract name or fully qualified name (source:Contract)
        contract: String,

        /// Deployed contract address, hex or base32 (cfx:...)
        address: String,

        #[command(flatten)]
        artifacts: ArtifactSettings,
    },

    /// Submit flattened source code to ConfluxScan
    Verify {
        /// Deployed contract address, hex or base32 (cfx:...)
        #[arg(long)]
        address: String,

        /// Contract name as declared in the source
        #[arg(long)]
        contract: String,

        /// Flattened single-file source
        #[arg(long)]
        source: PathBuf,

        /// Solidity version, short (0.8.15) or full build string
        #[arg(long)]
        compiler_version: String,

        /// Enable the optimizer with this many runs
        #[arg(long)]
        optimization_runs: Option<u32>,

        /// ABI encoded constructor arguments
        #[arg(long)]
        constructor_args: Option<String>,

        /// EVM version used for compilation
        #[arg(long)]
        evm_version: Option<String>,

        /// License identifier (SPDX name or numeric code)
        #[arg(long, default_value = "None")]
        license: LicenseType,

        /// Network name, defaults to the configured default network
        #[arg(long)]
        network: Option<String>,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Check the status of a verification submission
    Status {
        /// Submission id returned by verify
        guid: String,

        /// Network name, defaults to the configured default network
        #[arg(long)]
        network: Option<String>,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "status")]
enum Output {
    #[serde(rename = "success")]
    Success {
        #[serde(flatten)]
        data: SuccessData,
    },

    #[serde(rename = "error")]
    Error {
        error_type: String,
        message: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        remediation: Vec<String>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "command")]
enum SuccessData {
    #[serde(rename = "link")]
    Link {
        #[serde(flatten)]
        factory: ContractFactory,
    },

    #[serde(rename = "at")]
    At {
        #[serde(flatten)]
        instance: ContractInstance,
    },

    #[serde(rename = "verify")]
    Verify {
        explorer: String,
        #[serde(flatten)]
        response: ScanResponse,
    },

    #[serde(rename = "verify_status")]
    Status {
        explorer: String,
        #[serde(flatten)]
        response: ScanResponse,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = PluginConfig::load_or_default(&cli.config)
        .and_then(|config| run(cli.command, config));

    if let Err(e) = result {
        output_error(e);
        std::process::exit(1);
    }
}

fn run(command: Commands, config: PluginConfig) -> Result<()> {
    match command {
        Commands::Link {
            contract,
            libraries,
            artifacts,
        } => run_link(&config, contract, libraries, artifacts),
        Commands::At {
            contract,
            address,
            artifacts,
        } => run_at(&config, contract, address, artifacts),
        Commands::Verify {
            address,
            contract,
            source,
            compiler_version,
            optimization_runs,
            constructor_args,
            evm_version,
            license,
            network,
            json,
        } => {
            let source_code = std::fs::read_to_string(&source)
                .with_context(|| format!("Could not read source file {}", source.display()))?;

            let chain_id = config.network(network.as_deref())?.chain_id;
            let mut builder = VerifyRequest::builder()
                .chain_id(chain_id)
                .contract_address(address)
                .contract_name(contract)
                .source_code(source_code)
                .compiler_version(compiler_version)
                .license(license);
            if let Some(runs) = optimization_runs {
                builder = builder.optimizer_runs(runs);
            }
            if let Some(args) = constructor_args {
                builder = builder.constructor_arguments(args);
            }
            if let Some(version) = evm_version {
                builder = builder.evm_version(version);
            }
            let request = builder.build()?;

            let runtime =
                tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
            runtime.block_on(run_verify(chain_id, request, json))
        }
        Commands::Status {
            guid,
            network,
            json,
        } => {
            let chain_id = config.network(network.as_deref())?.chain_id;
            let runtime =
                tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
            runtime.block_on(run_status(chain_id, guid, json))
        }
    }
}

fn artifact_store(config: &PluginConfig, settings: &ArtifactSettings) -> ArtifactStore {
    let dir = settings
        .artifacts
        .clone()
        .unwrap_or_else(|| config.artifacts_dir());
    tracing::debug!("Using artifacts from {}", dir.display());
    ArtifactStore::new(dir)
}

fn run_link(
    config: &PluginConfig,
    contract: String,
    libraries: Vec<(String, String)>,
    settings: ArtifactSettings,
) -> Result<()> {
    let store = artifact_store(config, &settings);
    let factory = link_contract(&store, config, &contract, libraries)?;

    if settings.json {
        let output = Output::Success {
            data: SuccessData::Link { factory },
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        for link in &factory.libraries {
            tracing::info!("{} => {}", link.fully_qualified_name(), link.address);
        }
        tracing::info!(
            "Bytecode hash {} ({} bytes)",
            factory.bytecode_hash,
            factory.bytecode_size
        );
        println!("{}", factory.bytecode);
    }

    Ok(())
}

/// Links a named contract, filling gaps from the configured default libraries
fn link_contract(
    store: &ArtifactStore,
    config: &PluginConfig,
    contract: &str,
    libraries: Vec<(String, String)>,
) -> Result<ContractFactory, FactoryError> {
    let artifact = store.read_artifact(contract)?;

    let mut options = FactoryOptions::new();
    for (name, address) in libraries {
        options = options.library(name, address);
    }
    if !config.libraries.is_empty() {
        options = options.with_default_libraries(&config.libraries, &artifact.link_references);
    }

    contract_factory_from_artifact(&artifact, &options)
}

fn run_at(
    config: &PluginConfig,
    contract: String,
    address: String,
    settings: ArtifactSettings,
) -> Result<()> {
    let store = artifact_store(config, &settings);
    let instance = contract_at(
        &store,
        ContractAtSource::ByName {
            contract_name: contract,
        },
        &address,
    )?;

    if settings.json {
        let output = Output::Success {
            data: SuccessData::At { instance },
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!(
            "{} at {} ({} ABI entries)",
            instance.contract_name.as_deref().unwrap_or("contract"),
            instance.address,
            instance.abi.len()
        );
    }

    Ok(())
}

async fn run_verify(chain_id: u64, request: VerifyRequest, json: bool) -> Result<()> {
    let client = ScanClient::new(chain_id);
    let contract_name = request.contract_name.clone();
    let response = client.verify_source_code(request).await?;

    if json {
        let output = Output::Success {
            data: SuccessData::Verify {
                explorer: client.api_url().to_string(),
                response,
            },
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Submitted {} for verification", contract_name);
        if let Some(guid) = response.guid() {
            println!("guid: {}", guid);
            println!("Check progress with: conflux-builder status {}", guid);
        }
    }

    Ok(())
}

async fn run_status(chain_id: u64, guid: String, json: bool) -> Result<()> {
    let client = ScanClient::new(chain_id);
    let response = client.check_verify_status(&guid).await?;

    if json {
        let output = Output::Success {
            data: SuccessData::Status {
                explorer: client.api_url().to_string(),
                response,
            },
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        let detail = response
            .data
            .as_ref()
            .and_then(|data| data.as_str())
            .unwrap_or(&response.message);
        println!("[{}] {}", response.code, detail);
    }

    Ok(())
}

/// Parses a `NAME=ADDRESS` library link
fn parse_library(value: &str) -> Result<(String, String), String> {
    let (name, address) = value
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=ADDRESS, got {value:?}"))?;
    let (name, address) = (name.trim(), address.trim());
    if name.is_empty() || address.is_empty() {
        return Err(format!("expected NAME=ADDRESS, got {value:?}"));
    }
    Ok((name.to_string(), address.to_string()))
}

fn output_error(error: eyre::Report) {
    let (error_type, remediation) = if let Some(e) = error.downcast_ref::<FactoryError>() {
        (e.kind(), e.remediation())
    } else if let Some(e) = error.downcast_ref::<VerifyError>() {
        (e.kind(), Vec::new())
    } else if error.to_string().contains("Unknown network") {
        ("unknown_network", Vec::new())
    } else if error.to_string().contains("Failed to read")
        || error.to_string().contains("Failed to parse")
    {
        ("config_error", Vec::new())
    } else {
        ("unknown_error", Vec::new())
    };

    let output = Output::Error {
        error_type: error_type.to_string(),
        message: format!("{error:#}"),
        remediation,
    };

    match serde_json::to_string(&output) {
        Ok(json) => eprintln!("{}", json),
        Err(_) => eprintln!("{error:#}"),
    }
}
