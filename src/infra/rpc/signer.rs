//! Local legacy-transaction signing.
//!
//! The raw transaction is always constructed and signed in-process; the
//! private key never reaches the endpoint.

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::signers::local::PrivateKeySigner;
use secrecy::{ExposeSecret, SecretString};

use crate::domain::{AppError, SignerError};

/// Parameters of an unsigned legacy transaction.
#[derive(Debug, Clone)]
pub struct LegacyTxParams {
    pub chain_id: u64,
    pub nonce: u64,
    pub to: Address,
    pub value: U256,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub input: Bytes,
}

/// Sign a legacy transaction and return its RLP-encoded raw payload, ready
/// for `eth_sendRawTransaction`.
pub fn sign_legacy_transaction(
    params: LegacyTxParams,
    private_key: &SecretString,
) -> Result<Vec<u8>, AppError> {
    let signer = parse_private_key(private_key)?;

    let mut tx = TxLegacy {
        chain_id: Some(params.chain_id),
        nonce: params.nonce,
        gas_price: params.gas_price,
        gas_limit: params.gas_limit,
        to: TxKind::Call(params.to),
        value: params.value,
        input: params.input,
    };

    let signature = signer
        .sign_transaction_sync(&mut tx)
        .map_err(|e| SignerError::Signing(e.to_string()))?;
    let envelope = TxEnvelope::from(tx.into_signed(signature));

    Ok(envelope.encoded_2718())
}

/// Parse a hex private key (`0x` prefix optional) into a signer.
pub fn parse_private_key(private_key: &SecretString) -> Result<PrivateKeySigner, AppError> {
    let raw = private_key.expose_secret().trim();
    let normalized = raw.strip_prefix("0x").unwrap_or(raw);
    normalized
        .parse::<PrivateKeySigner>()
        .map_err(|e| SignerError::InvalidKey(e.to_string()).into())
}

/// Address derived from a signer private key.
pub fn signer_address(private_key: &SecretString) -> Result<Address, AppError> {
    Ok(parse_private_key(private_key)?.address())
}
