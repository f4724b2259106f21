//! Runtime ABI registry.
//!
//! Function specs are registered by name with their canonical signature and
//! parameter/output types; the selector is the first four bytes of the
//! keccak-256 of the signature. Decoding an input with an unregistered
//! selector yields [`DecodedCall::Unknown`] so callers can skip non-matching
//! transactions without treating them as failures.

use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::primitives::keccak256;
use std::collections::HashMap;

use crate::domain::{AbiError, AppError, DecodedCall};

/// A registered contract function.
#[derive(Debug, Clone)]
pub struct FunctionSpec {
    pub name: String,
    /// Canonical signature, e.g. `mint(address,uint256)`.
    pub signature: String,
    pub params: Vec<DynSolType>,
    pub outputs: Vec<DynSolType>,
    pub selector: [u8; 4],
}

/// Registry of the contract functions the relayer understands.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    by_name: HashMap<String, FunctionSpec>,
    by_selector: HashMap<[u8; 4], String>,
}

impl FunctionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard registry: ERC-20 and ERC-721 operations plus the custom
    /// `mint` used by the watched token contract. Later registrations win on
    /// name collisions (ERC-721 `balanceOf` shadows the ERC-20 one).
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();

        // ERC-20
        registry.register("totalSupply", "totalSupply()", &[], &[]);
        registry.register("balanceOf", "balanceOf(address)", &["address"], &[]);
        registry.register(
            "transfer",
            "transfer(address,uint256)",
            &["address", "uint256"],
            &[],
        );
        registry.register(
            "transferFrom",
            "transferFrom(address,address,uint256)",
            &["address", "address", "uint256"],
            &[],
        );
        registry.register(
            "approve",
            "approve(address,uint256)",
            &["address", "uint256"],
            &[],
        );
        registry.register(
            "allowance",
            "allowance(address,address)",
            &["address", "address"],
            &[],
        );
        registry.register("getFee", "getFee(uint256)", &["uint256"], &[]);

        // ERC-721
        registry.register("ownerOf", "ownerOf(uint256)", &["uint256"], &["address"]);
        registry.register("balanceOf", "balanceOf(address)", &["address"], &["uint256"]);
        registry.register(
            "tokenOfOwnerByIndex",
            "tokenOfOwnerByIndex(address,uint256)",
            &["address", "uint256"],
            &["uint256"],
        );

        // Watched token contract
        registry.register(
            "mint",
            "mint(address,uint256)",
            &["address", "uint256"],
            &["address", "address", "uint256", "uint256"],
        );

        registry
    }

    /// Register a function. Type strings must be valid Solidity types; the
    /// standard tables are static, so a bad entry is a programming error and
    /// panics at construction.
    pub fn register(&mut self, name: &str, signature: &str, params: &[&str], outputs: &[&str]) {
        let parse = |types: &[&str]| -> Vec<DynSolType> {
            types
                .iter()
                .map(|t| {
                    t.parse::<DynSolType>()
                        .unwrap_or_else(|e| panic!("invalid abi type {:?}: {}", t, e))
                })
                .collect()
        };

        let selector = selector(signature);
        let spec = FunctionSpec {
            name: name.to_string(),
            signature: signature.to_string(),
            params: parse(params),
            outputs: parse(outputs),
            selector,
        };
        self.by_selector.insert(selector, name.to_string());
        self.by_name.insert(name.to_string(), spec);
    }

    /// Look up a function by name.
    pub fn get(&self, name: &str) -> Result<&FunctionSpec, AppError> {
        self.by_name
            .get(name)
            .ok_or_else(|| AbiError::UnknownFunction(name.to_string()).into())
    }

    /// Encode a call: selector followed by ABI-encoded parameters.
    pub fn encode_call(&self, name: &str, values: &[DynSolValue]) -> Result<Vec<u8>, AppError> {
        let spec = self.get(name)?;
        if values.len() != spec.params.len() {
            return Err(AbiError::Encode(format!(
                "{} expects {} parameters, got {}",
                spec.signature,
                spec.params.len(),
                values.len()
            ))
            .into());
        }

        let mut data = spec.selector.to_vec();
        if !values.is_empty() {
            data.extend(DynSolValue::Tuple(values.to_vec()).abi_encode_params());
        }
        Ok(data)
    }

    /// Encode a call as a `0x`-prefixed hex string for the wire.
    pub fn encode_call_hex(&self, name: &str, values: &[DynSolValue]) -> Result<String, AppError> {
        Ok(format!("0x{}", alloy::hex::encode(self.encode_call(name, values)?)))
    }

    /// Decode a transaction input against the registry. Unregistered
    /// selectors and too-short inputs come back as [`DecodedCall::Unknown`].
    pub fn decode_input(&self, input: &str) -> Result<DecodedCall, AppError> {
        let trimmed = input.strip_prefix("0x").unwrap_or(input);
        if trimmed.len() < 8 {
            return Ok(DecodedCall::Unknown {
                selector: trimmed.to_string(),
            });
        }

        let selector_hex = &trimmed[..8];
        let selector_bytes: [u8; 4] = alloy::hex::decode(selector_hex)
            .map_err(|e| AbiError::Decode(e.to_string()))?
            .try_into()
            .map_err(|_| AbiError::Decode(format!("bad selector {:?}", selector_hex)))?;

        let Some(name) = self.by_selector.get(&selector_bytes) else {
            return Ok(DecodedCall::Unknown {
                selector: selector_hex.to_string(),
            });
        };
        let spec = &self.by_name[name];

        let param_bytes =
            alloy::hex::decode(&trimmed[8..]).map_err(|e| AbiError::Decode(e.to_string()))?;
        let params = decode_values(&spec.params, &param_bytes)?;

        Ok(DecodedCall::Function {
            name: spec.name.clone(),
            params,
        })
    }

    /// Decode contract output (or raw event data) against a function's
    /// declared output types.
    pub fn decode_output(&self, name: &str, data: &str) -> Result<Vec<DynSolValue>, AppError> {
        let spec = self.get(name)?;
        let trimmed = data.strip_prefix("0x").unwrap_or(data);
        let bytes = alloy::hex::decode(trimmed).map_err(|e| AbiError::Decode(e.to_string()))?;
        decode_values(&spec.outputs, &bytes)
    }
}

/// First four bytes of the keccak-256 of the canonical signature.
#[must_use]
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn decode_values(types: &[DynSolType], data: &[u8]) -> Result<Vec<DynSolValue>, AppError> {
    if types.is_empty() {
        return Ok(Vec::new());
    }

    let tuple = DynSolType::Tuple(types.to_vec());
    match tuple
        .abi_decode_params(data)
        .map_err(|e| AbiError::Decode(e.to_string()))?
    {
        DynSolValue::Tuple(values) => Ok(values),
        other => Ok(vec![other]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, U256};
    use std::str::FromStr;

    #[test]
    fn test_selector_matches_known_values() {
        // Well-known ERC-20 selectors.
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(selector("balanceOf(address)"), [0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(selector("mint(address,uint256)"), [0x40, 0xc1, 0x0f, 0x19]);
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let registry = FunctionRegistry::standard();
        let to = Address::from_str("0xac05d75850dfed2d94a940fcb60b038818ad9a7e").unwrap();
        let amount = U256::from(100_000_000_000_000_000_u64);

        let encoded = registry
            .encode_call_hex(
                "mint",
                &[DynSolValue::Address(to), DynSolValue::Uint(amount, 256)],
            )
            .unwrap();
        assert!(encoded.starts_with("0x40c10f19"));

        let decoded = registry.decode_input(&encoded).unwrap();
        match decoded {
            DecodedCall::Function { name, params } => {
                assert_eq!(name, "mint");
                assert_eq!(params[0].as_address().unwrap(), to);
                assert_eq!(params[1].as_uint().unwrap().0, amount);
            }
            other => panic!("expected decoded mint call, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_selector_is_a_sentinel_not_an_error() {
        let registry = FunctionRegistry::standard();
        let decoded = registry.decode_input("0xdeadbeef").unwrap();
        assert_eq!(
            decoded,
            DecodedCall::Unknown {
                selector: "deadbeef".to_string()
            }
        );
    }

    #[test]
    fn test_short_input_is_unknown() {
        let registry = FunctionRegistry::standard();
        let decoded = registry.decode_input("0x").unwrap();
        assert!(matches!(decoded, DecodedCall::Unknown { .. }));
    }

    #[test]
    fn test_zero_parameter_call_encodes_to_bare_selector() {
        let registry = FunctionRegistry::standard();
        let encoded = registry.encode_call("totalSupply", &[]).unwrap();
        assert_eq!(encoded.len(), 4);
        assert_eq!(encoded, selector("totalSupply()").to_vec());
    }

    #[test]
    fn test_parameter_count_mismatch_is_an_error() {
        let registry = FunctionRegistry::standard();
        let result = registry.encode_call("transfer", &[DynSolValue::Uint(U256::ZERO, 256)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_erc721_balance_of_shadows_erc20() {
        let registry = FunctionRegistry::standard();
        let spec = registry.get("balanceOf").unwrap();
        assert_eq!(spec.outputs.len(), 1);
    }

    #[test]
    fn test_decode_output() {
        let registry = FunctionRegistry::standard();
        // ownerOf returns one address word.
        let word = "0x000000000000000000000000ac05d75850dfed2d94a940fcb60b038818ad9a7e";
        let values = registry.decode_output("ownerOf", word).unwrap();
        assert_eq!(
            values[0].as_address().unwrap(),
            Address::from_str("0xac05d75850dfed2d94a940fcb60b038818ad9a7e").unwrap()
        );
    }
}
