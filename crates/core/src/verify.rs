//! Source verification requests for the ConfluxScan block explorer

use crate::address::{Address, AddressError};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::{collections::BTreeMap, fmt, str::FromStr};

/// Verification API of the mainnet explorer
pub const MAINNET_SCAN_URL: &str = "https://api.confluxscan.net";

/// Verification API of the testnet explorer
pub const TESTNET_SCAN_URL: &str = "https://api-testnet.confluxscan.net";

/// Short compiler version -> full build string published by the explorer
pub const COMPILER_LIST_URL: &str = "https://confluxscan.net/v1/contract/compiler";

/// Code format for flattened sources
pub const SINGLE_FILE_FORMAT: &str = "solidity-single-file";

/// Optimizer runs sent when the caller does not choose any
pub const DEFAULT_RUNS: u32 = 200;

/// Returns the verification API for a chain id
pub fn scan_api_url(chain_id: u64) -> &'static str {
    if chain_id == crate::blockchain::TESTNET_CHAIN_ID {
        TESTNET_SCAN_URL
    } else {
        MAINNET_SCAN_URL
    }
}

/// License codes understood by the explorer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LicenseType {
    #[default]
    None = 1,
    Unlicense,
    Mit,
    GplV2,
    GplV3,
    LgplV2_1,
    LgplV3,
    Bsd2Clause,
    Bsd3Clause,
    Mpl2,
    Osl3,
    Apache2,
    AgplV3,
    Bsl1_1,
}

impl LicenseType {
    const ALL: [LicenseType; 14] = [
        LicenseType::None,
        LicenseType::Unlicense,
        LicenseType::Mit,
        LicenseType::GplV2,
        LicenseType::GplV3,
        LicenseType::LgplV2_1,
        LicenseType::LgplV3,
        LicenseType::Bsd2Clause,
        LicenseType::Bsd3Clause,
        LicenseType::Mpl2,
        LicenseType::Osl3,
        LicenseType::Apache2,
        LicenseType::AgplV3,
        LicenseType::Bsl1_1,
    ];

    /// Numeric code used by the API (1..=14)
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|license| license.code() == code)
    }

    /// SPDX style identifier
    pub fn spdx(self) -> &'static str {
        match self {
            LicenseType::None => "None",
            LicenseType::Unlicense => "Unlicense",
            LicenseType::Mit => "MIT",
            LicenseType::GplV2 => "GPL-2.0",
            LicenseType::GplV3 => "GPL-3.0",
            LicenseType::LgplV2_1 => "LGPL-2.1",
            LicenseType::LgplV3 => "LGPL-3.0",
            LicenseType::Bsd2Clause => "BSD-2-Clause",
            LicenseType::Bsd3Clause => "BSD-3-Clause",
            LicenseType::Mpl2 => "MPL-2.0",
            LicenseType::Osl3 => "OSL-3.0",
            LicenseType::Apache2 => "Apache-2.0",
            LicenseType::AgplV3 => "AGPL-3.0",
            LicenseType::Bsl1_1 => "BSL-1.1",
        }
    }
}

impl fmt::Display for LicenseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.spdx())
    }
}

impl FromStr for LicenseType {
    type Err = VerifyError;

    /// Accepts the numeric code or the SPDX identifier, case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<u8>() {
            return Self::from_code(code).ok_or_else(|| VerifyError::UnknownLicense(s.to_string()));
        }
        let normalized = s.trim_end_matches("-only").to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|license| license.spdx().to_ascii_lowercase() == normalized)
            .ok_or_else(|| VerifyError::UnknownLicense(s.to_string()))
    }
}

impl Serialize for LicenseType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Error type for verification failures
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid contract address {address}: {reason}")]
    InvalidAddress {
        address: String,
        reason: AddressError,
    },

    #[error("unknown license type: {0}")]
    UnknownLicense(String),

    #[error("compiler version {version} not exits")]
    UnknownCompilerVersion { version: String },

    #[error("explorer rejected the request (code {code}): {message}")]
    Api { code: i64, message: String },

    #[cfg(feature = "scan")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl VerifyError {
    /// Stable tag used in machine readable output
    pub fn kind(&self) -> &'static str {
        match self {
            VerifyError::MissingField(_) => "MissingField",
            VerifyError::InvalidAddress { .. } => "InvalidAddress",
            VerifyError::UnknownLicense(_) => "UnknownLicense",
            VerifyError::UnknownCompilerVersion { .. } => "UnknownCompilerVersion",
            VerifyError::Api { .. } => "ScanApiError",
            #[cfg(feature = "scan")]
            VerifyError::Http(_) => "NetworkError",
        }
    }
}

/// Body of a `contract/verifysourcecode` request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifyRequest {
    /// CIP-37 base32 when the builder knew the chain, checksummed hex otherwise
    #[serde(rename = "contractaddress")]
    pub contract_address: String,
    #[serde(rename = "sourceCode")]
    pub source_code: String,
    #[serde(rename = "codeformat")]
    pub code_format: String,
    #[serde(rename = "contractname")]
    pub contract_name: String,
    #[serde(rename = "compilerversion")]
    pub compiler_version: String,
    #[serde(rename = "optimizationUsed")]
    pub optimization_used: u8,
    pub runs: u32,
    /// The misspelling is the explorer's field name
    #[serde(rename = "constructorArguements", skip_serializing_if = "Option::is_none")]
    pub constructor_arguments: Option<String>,
    #[serde(rename = "evmversion", skip_serializing_if = "Option::is_none")]
    pub evm_version: Option<String>,
    #[serde(rename = "licenseType")]
    pub license_type: LicenseType,
}

impl VerifyRequest {
    pub fn builder() -> VerifyRequestBuilder {
        VerifyRequestBuilder::default()
    }
}

/// Builder for creating VerifyRequest
#[derive(Debug, Default)]
pub struct VerifyRequestBuilder {
    contract_address: Option<String>,
    source_code: Option<String>,
    contract_name: Option<String>,
    compiler_version: Option<String>,
    optimizer_runs: Option<u32>,
    constructor_arguments: Option<String>,
    evm_version: Option<String>,
    license_type: LicenseType,
    chain_id: Option<u64>,
}

impl VerifyRequestBuilder {
    pub fn contract_address(mut self, address: impl Into<String>) -> Self {
        self.contract_address = Some(address.into());
        self
    }

    /// Flattened single-file source
    pub fn source_code(mut self, source: impl Into<String>) -> Self {
        self.source_code = Some(source.into());
        self
    }

    pub fn contract_name(mut self, name: impl Into<String>) -> Self {
        self.contract_name = Some(name.into());
        self
    }

    pub fn compiler_version(mut self, version: impl Into<String>) -> Self {
        self.compiler_version = Some(version.into());
        self
    }

    /// Marks the optimizer as enabled with the given number of runs
    pub fn optimizer_runs(mut self, runs: u32) -> Self {
        self.optimizer_runs = Some(runs);
        self
    }

    /// ABI encoded constructor arguments, with or without `0x`
    pub fn constructor_arguments(mut self, args: impl Into<String>) -> Self {
        self.constructor_arguments = Some(args.into());
        self
    }

    pub fn evm_version(mut self, version: impl Into<String>) -> Self {
        self.evm_version = Some(version.into());
        self
    }

    pub fn license(mut self, license: LicenseType) -> Self {
        self.license_type = license;
        self
    }

    /// Chain the contract lives on, used to render its base32 address
    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn build(self) -> Result<VerifyRequest, VerifyError> {
        let address = self
            .contract_address
            .ok_or(VerifyError::MissingField("contract_address"))?;
        let invalid = |reason| VerifyError::InvalidAddress {
            address: address.clone(),
            reason,
        };
        let parsed: Address = address.parse().map_err(invalid)?;
        let contract_address = match self.chain_id {
            Some(chain_id) => parsed.to_base32(chain_id).map_err(invalid)?,
            None => parsed.to_checksum(),
        };

        Ok(VerifyRequest {
            contract_address,
            source_code: self
                .source_code
                .filter(|source| !source.trim().is_empty())
                .ok_or(VerifyError::MissingField("source_code"))?,
            code_format: SINGLE_FILE_FORMAT.to_string(),
            contract_name: self
                .contract_name
                .ok_or(VerifyError::MissingField("contract_name"))?,
            compiler_version: self
                .compiler_version
                .ok_or(VerifyError::MissingField("compiler_version"))?,
            optimization_used: u8::from(self.optimizer_runs.is_some()),
            runs: self.optimizer_runs.unwrap_or(DEFAULT_RUNS),
            constructor_arguments: self
                .constructor_arguments
                .map(|args| args.trim_start_matches("0x").to_string())
                .filter(|args| !args.is_empty()),
            evm_version: self.evm_version,
            license_type: self.license_type,
        })
    }
}

/// Maps a short compiler version to the explorer's full build string.
/// Versions that already are a published build string are returned unchanged.
pub fn resolve_compiler_version(
    versions: &BTreeMap<String, String>,
    version: &str,
) -> Result<String, VerifyError> {
    let short = version.trim().trim_start_matches('v');
    if let Some(full) = versions.get(short) {
        return Ok(full.clone());
    }
    if versions.values().any(|full| full == version) {
        return Ok(version.to_string());
    }
    Err(VerifyError::UnknownCompilerVersion {
        version: version.to_string(),
    })
}

/// Envelope of every explorer API response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResponse {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl ScanResponse {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }

    /// Submission id returned by a successful verification request
    pub fn guid(&self) -> Option<&str> {
        self.data.as_ref().and_then(Value::as_str)
    }

    /// Turns a non-zero code into an error
    pub fn into_result(self) -> Result<Self, VerifyError> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(VerifyError::Api {
                code: self.code,
                message: self.message,
            })
        }
    }
}

#[cfg(feature = "scan")]
pub use client::ScanClient;

#[cfg(feature = "scan")]
mod client {
    use super::*;
    use tracing::{debug, info};

    /// HTTP client for the explorer verification API
    #[derive(Debug, Clone)]
    pub struct ScanClient {
        http: reqwest::Client,
        api_url: String,
        compiler_list_url: String,
    }

    impl ScanClient {
        /// Client for the explorer serving `chain_id`
        pub fn new(chain_id: u64) -> Self {
            Self::with_urls(scan_api_url(chain_id), COMPILER_LIST_URL)
        }

        pub fn with_urls(api_url: impl Into<String>, compiler_list_url: impl Into<String>) -> Self {
            Self {
                http: reqwest::Client::new(),
                api_url: api_url.into().trim_end_matches('/').to_string(),
                compiler_list_url: compiler_list_url.into(),
            }
        }

        pub fn api_url(&self) -> &str {
            &self.api_url
        }

        /// Fetches the published compiler builds
        pub async fn compiler_versions(&self) -> Result<BTreeMap<String, String>, VerifyError> {
            let versions = self
                .http
                .get(&self.compiler_list_url)
                .send()
                .await?
                .error_for_status()?
                .json::<BTreeMap<String, String>>()
                .await?;
            debug!("Explorer publishes {} compiler versions", versions.len());
            Ok(versions)
        }

        /// Submits flattened source code for verification
        pub async fn verify_source_code(
            &self,
            mut request: VerifyRequest,
        ) -> Result<ScanResponse, VerifyError> {
            let versions = self.compiler_versions().await?;
            request.compiler_version = resolve_compiler_version(&versions, &request.compiler_version)?;

            info!(
                "Submitting {} at {} for verification to {}",
                request.contract_name, request.contract_address, self.api_url
            );
            let response = self
                .http
                .post(format!("{}/contract/verifysourcecode", self.api_url))
                .json(&request)
                .send()
                .await?
                .json::<ScanResponse>()
                .await?;
            response.into_result()
        }

        /// Queries the status of a previous submission once
        pub async fn check_verify_status(&self, guid: &str) -> Result<ScanResponse, VerifyError> {
            let response = self
                .http
                .get(format!("{}/contract/checkverifystatus", self.api_url))
                .query(&[("guid", guid)])
                .send()
                .await?
                .json::<ScanResponse>()
                .await?;
            Ok(response)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ADDRESS: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    fn builder() -> VerifyRequestBuilder {
        VerifyRequest::builder()
            .contract_address(ADDRESS.to_lowercase())
            .source_code("pragma solidity ^0.8.0; contract Greeter {}")
            .contract_name("Greeter")
            .compiler_version("0.8.15")
    }

    #[test]
    fn test_scan_api_url() {
        assert_eq!(scan_api_url(1), TESTNET_SCAN_URL);
        assert_eq!(scan_api_url(1029), MAINNET_SCAN_URL);
        assert_eq!(scan_api_url(2029), MAINNET_SCAN_URL);
    }

    #[test]
    fn test_license_codes() {
        assert_eq!(LicenseType::default().code(), 1);
        assert_eq!(LicenseType::Mit.code(), 3);
        assert_eq!(LicenseType::Apache2.code(), 12);
        assert_eq!(LicenseType::Bsl1_1.code(), 14);
        assert_eq!(LicenseType::from_code(0), None);
        assert_eq!(LicenseType::from_code(15), None);

        assert_eq!("mit".parse::<LicenseType>().unwrap(), LicenseType::Mit);
        assert_eq!("GPL-3.0-only".parse::<LicenseType>().unwrap(), LicenseType::GplV3);
        assert_eq!("12".parse::<LicenseType>().unwrap(), LicenseType::Apache2);
        assert!("WTFPL".parse::<LicenseType>().is_err());
    }

    #[test]
    fn test_request_serialization() {
        let request = builder()
            .optimizer_runs(1000)
            .constructor_arguments("0x00ff")
            .license(LicenseType::Mit)
            .build()
            .unwrap();

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "contractaddress": ADDRESS,
                "sourceCode": "pragma solidity ^0.8.0; contract Greeter {}",
                "codeformat": "solidity-single-file",
                "contractname": "Greeter",
                "compilerversion": "0.8.15",
                "optimizationUsed": 1,
                "runs": 1000,
                "constructorArguements": "00ff",
                "licenseType": 3
            })
        );
    }

    #[test]
    fn test_request_uses_base32_for_known_chain() {
        let request = builder()
            .contract_address("0x85d80245dc02f5a89589e1f19c5c718e405b56cd")
            .chain_id(1029)
            .build()
            .unwrap();
        assert_eq!(
            request.contract_address,
            "cfx:acc7uawf5ubtnmezvhu9dhc6sghea0403y2dgpyfjp"
        );

        let request = builder()
            .contract_address("cfx:acc7uawf5ubtnmezvhu9dhc6sghea0403y2dgpyfjp")
            .chain_id(1)
            .build()
            .unwrap();
        assert_eq!(
            request.contract_address,
            "cfxtest:acc7uawf5ubtnmezvhu9dhc6sghea0403ywjz6wtpg"
        );
    }

    #[test]
    fn test_request_defaults() {
        let request = builder().build().unwrap();
        assert_eq!(request.optimization_used, 0);
        assert_eq!(request.runs, DEFAULT_RUNS);
        assert_eq!(request.license_type, LicenseType::None);
        assert_eq!(request.constructor_arguments, None);
    }

    #[test]
    fn test_request_requires_fields() {
        let err = VerifyRequest::builder()
            .contract_address(ADDRESS)
            .build()
            .unwrap_err();
        assert!(matches!(err, VerifyError::MissingField("source_code")));

        let err = builder().contract_address("0x12").build().unwrap_err();
        assert_eq!(err.kind(), "InvalidAddress");

        let err = builder().source_code("   ").build().unwrap_err();
        assert!(matches!(err, VerifyError::MissingField("source_code")));
    }

    #[test]
    fn test_resolve_compiler_version() {
        let versions: BTreeMap<String, String> = [(
            "0.8.15".to_string(),
            "v0.8.15+commit.e14f2714".to_string(),
        )]
        .into_iter()
        .collect();

        assert_eq!(
            resolve_compiler_version(&versions, "0.8.15").unwrap(),
            "v0.8.15+commit.e14f2714"
        );
        assert_eq!(
            resolve_compiler_version(&versions, "v0.8.15+commit.e14f2714").unwrap(),
            "v0.8.15+commit.e14f2714"
        );

        let err = resolve_compiler_version(&versions, "0.7.3").unwrap_err();
        assert_eq!(err.to_string(), "compiler version 0.7.3 not exits");
    }

    #[test]
    fn test_scan_response() {
        let ok: ScanResponse = serde_json::from_value(json!({
            "code": 0,
            "message": "OK",
            "data": "00d290cca9978af20a24994a2e0c4ca415266216ee4e2b3c21"
        }))
        .unwrap();
        assert!(ok.is_ok());
        assert_eq!(
            ok.guid(),
            Some("00d290cca9978af20a24994a2e0c4ca415266216ee4e2b3c21")
        );

        let failed: ScanResponse = serde_json::from_value(json!({
            "code": 1,
            "message": "compiler version 0.8.15 not exits"
        }))
        .unwrap();
        assert!(!failed.is_ok());
        assert_eq!(failed.guid(), None);
        match failed.into_result() {
            Err(VerifyError::Api { code, message }) => {
                assert_eq!(code, 1);
                assert!(message.contains("0.8.15"));
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }
}
