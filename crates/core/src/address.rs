//! Chain address parsing and normalization
//!
//! Addresses are accepted as hex (EIP-55 checksummed when mixed case) or in the
//! CIP-37 base32 form (`cfx:...`, `cfxtest:...`, `net<id>:...`). Both normalize to
//! the same 20 bytes.

use cfx_addr::{cfx_addr_decode, cfx_addr_encode, EncodingOptions, Network};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::{fmt, str::FromStr};

/// Width of a chain address in bytes
pub const ADDRESS_LENGTH: usize = 20;

/// Error returned when an address string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("expected {expected} hex digits, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid hex digit in address: {0}")]
    InvalidHex(String),

    #[error("bad checksum, expected {expected}")]
    InvalidChecksum { expected: String },

    #[error("invalid base32 address: {0}")]
    InvalidBase32(String),
}

/// A 20-byte chain address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Returns the canonical `0x`-prefixed EIP-55 representation
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = Keccak256::digest(lower.as_bytes());

        let mut out = String::with_capacity(2 + lower.len());
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let nibble = if i % 2 == 0 {
                hash[i / 2] >> 4
            } else {
                hash[i / 2] & 0x0f
            };
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }

    /// Hex digits without prefix, in checksummed case
    pub fn checksum_digits(&self) -> String {
        self.to_checksum()[2..].to_string()
    }

    /// Returns the CIP-37 base32 form for the network with the given chain id
    pub fn to_base32(&self, chain_id: u64) -> Result<String, AddressError> {
        cfx_addr_encode(&self.0, network_for(chain_id), EncodingOptions::Simple)
            .map_err(|e| AddressError::InvalidBase32(format!("{e:?}")))
    }

    fn from_base32(address: &str) -> Result<Self, AddressError> {
        let decoded = cfx_addr_decode(address)
            .map_err(|e| AddressError::InvalidBase32(format!("{address} ({e:?})")))?;
        let body: [u8; ADDRESS_LENGTH] =
            decoded.parsed_address_bytes.as_slice().try_into().map_err(|_| {
                AddressError::InvalidBase32(format!(
                    "{address} holds {} bytes",
                    decoded.parsed_address_bytes.len()
                ))
            })?;
        Ok(Address(body))
    }
}

fn network_for(chain_id: u64) -> Network {
    match chain_id {
        crate::blockchain::MAINNET_CHAIN_ID => Network::Main,
        crate::blockchain::TESTNET_CHAIN_ID => Network::Test,
        id => Network::Id(id),
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.contains(':') {
            return Self::from_base32(trimmed);
        }
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.len() != ADDRESS_LENGTH * 2 {
            return Err(AddressError::InvalidLength {
                expected: ADDRESS_LENGTH * 2,
                actual: digits.len(),
            });
        }

        let mut bytes = [0u8; ADDRESS_LENGTH];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|_| AddressError::InvalidHex(trimmed.to_string()))?;
        let address = Address(bytes);

        let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
        if has_lower && has_upper {
            let expected = address.to_checksum();
            if expected[2..] != *digits {
                return Err(AddressError::InvalidChecksum { expected });
            }
        }

        Ok(address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl From<[u8; ADDRESS_LENGTH]> for Address {
    fn from(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_checksum())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECKSUMMED: [&str; 4] = [
        "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
        "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
        "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
        "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
    ];

    #[test]
    fn test_checksum_vectors() {
        for expected in CHECKSUMMED {
            let address: Address = expected.to_lowercase().parse().unwrap();
            assert_eq!(address.to_checksum(), expected);
            assert_eq!(address.to_string(), expected);
        }
    }

    #[test]
    fn test_accepts_checksummed_and_single_case() {
        let mixed: Address = CHECKSUMMED[0].parse().unwrap();
        let lower: Address = CHECKSUMMED[0].to_lowercase().parse().unwrap();
        let upper: Address = format!("0x{}", CHECKSUMMED[0][2..].to_uppercase())
            .parse()
            .unwrap();
        assert_eq!(mixed, lower);
        assert_eq!(mixed, upper);
    }

    #[test]
    fn test_prefix_and_whitespace_are_optional() {
        let bare: Address = "  5aaeb6053f3e94c9b9a09f33669435e7ef1beaed ".parse().unwrap();
        assert_eq!(bare.to_checksum(), CHECKSUMMED[0]);
    }

    #[test]
    fn test_rejects_bad_checksum() {
        // flip the case of a single letter
        let broken = CHECKSUMMED[0].replacen('a', "A", 1);
        assert!(matches!(
            broken.parse::<Address>(),
            Err(AddressError::InvalidChecksum { .. })
        ));
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(
            "0x1234".parse::<Address>(),
            Err(AddressError::InvalidLength {
                expected: 40,
                actual: 4
            })
        );
        assert!(matches!(
            "0xzz74ac42c5db7e9b3fe9befd7f46cbd01c673a45".parse::<Address>(),
            Err(AddressError::InvalidHex(_))
        ));
        assert!("".parse::<Address>().is_err());
    }

    // CIP-37 test vector
    const HEX_CONTRACT: &str = "0x85d80245dc02f5a89589e1f19c5c718e405b56cd";
    const MAINNET_CONTRACT: &str = "cfx:acc7uawf5ubtnmezvhu9dhc6sghea0403y2dgpyfjp";
    const TESTNET_CONTRACT: &str = "cfxtest:acc7uawf5ubtnmezvhu9dhc6sghea0403ywjz6wtpg";

    #[test]
    fn test_base32_input() {
        let hex: Address = HEX_CONTRACT.parse().unwrap();

        let mainnet: Address = MAINNET_CONTRACT.parse().unwrap();
        let testnet: Address = TESTNET_CONTRACT.parse().unwrap();
        let verbose: Address = "CFX:TYPE.CONTRACT:ACC7UAWF5UBTNMEZVHU9DHC6SGHEA0403Y2DGPYFJP"
            .parse()
            .unwrap();

        assert_eq!(mainnet, hex);
        assert_eq!(testnet, hex);
        assert_eq!(verbose, hex);
    }

    #[test]
    fn test_base32_output() {
        let address: Address = HEX_CONTRACT.parse().unwrap();
        assert_eq!(address.to_base32(1029).unwrap(), MAINNET_CONTRACT);
        assert_eq!(address.to_base32(1).unwrap(), TESTNET_CONTRACT);

        let local = address.to_base32(2029).unwrap();
        assert!(local.starts_with("net2029:"));
        assert_eq!(local.parse::<Address>().unwrap(), address);
    }

    #[test]
    fn test_base32_rejects_bad_checksum() {
        let mut broken = MAINNET_CONTRACT.to_string();
        broken.pop();
        broken.push('a');
        assert!(matches!(
            broken.parse::<Address>(),
            Err(AddressError::InvalidBase32(_))
        ));
        assert!(matches!(
            "cfx:".parse::<Address>(),
            Err(AddressError::InvalidBase32(_))
        ));
    }

    #[test]
    fn test_serde_uses_checksum() {
        let address: Address = CHECKSUMMED[1].to_lowercase().parse().unwrap();
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, format!("\"{}\"", CHECKSUMMED[1]));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
    }
}
