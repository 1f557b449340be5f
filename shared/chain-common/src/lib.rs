//! Chain-neutral record types shared across the ingestion pipeline.
//!
//! Every entity is scoped by a `chain_id` string so the same unified
//! schema serves arbitrarily many chains. Processors decode chain-family
//! RPC payloads into these shapes; the store writes them without knowing
//! which family produced them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error raised when an on-chain payload has a malformed shape.
///
/// Validation failures are never retried: the same payload will decode
/// the same way on every attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid address '{value}': {reason}")]
    InvalidAddress { value: String, reason: String },

    #[error("Invalid hash '{value}': {reason}")]
    InvalidHash { value: String, reason: String },

    #[error("Invalid hex quantity '{0}'")]
    InvalidQuantity(String),

    #[error("Missing required field '{0}'")]
    MissingField(String),

    #[error("Unexpected shape for field '{field}': {reason}")]
    UnexpectedShape { field: String, reason: String },
}

/// A class of blockchain with a shared RPC dialect
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    /// EVM-style chains (eth_* / debug_* methods)
    Evm,
    /// Starknet-style chains (starknet_* methods)
    Starknet,
}

impl ChainFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainFamily::Evm => "evm",
            ChainFamily::Starknet => "starknet",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "evm" | "ethereum" | "eth" => Some(ChainFamily::Evm),
            "starknet" | "strk" => Some(ChainFamily::Starknet),
            _ => None,
        }
    }
}

/// A block's confirmation state across chain families.
///
/// Starknet statuses map 1:1; EVM blocks start Pending at the tip and
/// are promoted by depth.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FinalityStatus {
    Pending,
    AcceptedOnL2,
    AcceptedOnL1,
    Rejected,
}

impl FinalityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalityStatus::Pending => "pending",
            FinalityStatus::AcceptedOnL2 => "accepted_on_l2",
            FinalityStatus::AcceptedOnL1 => "accepted_on_l1",
            FinalityStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FinalityStatus::Pending),
            "accepted_on_l2" => Some(FinalityStatus::AcceptedOnL2),
            "accepted_on_l1" => Some(FinalityStatus::AcceptedOnL1),
            "rejected" => Some(FinalityStatus::Rejected),
            _ => None,
        }
    }
}

/// Execution outcome of a transaction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TxStatus {
    Succeeded,
    Reverted,
    Pending,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Succeeded => "succeeded",
            TxStatus::Reverted => "reverted",
            TxStatus::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "succeeded" => Some(TxStatus::Succeeded),
            "reverted" => Some(TxStatus::Reverted),
            "pending" => Some(TxStatus::Pending),
            _ => None,
        }
    }
}

/// Externally-owned account vs deployed contract
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WalletType {
    ExternallyOwned,
    Contract,
}

impl WalletType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletType::ExternallyOwned => "eoa",
            WalletType::Contract => "contract",
        }
    }
}

/// Normalized block header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedBlock {
    pub chain_id: String,
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    /// Unix epoch seconds
    pub timestamp: u64,
    pub finality: FinalityStatus,
    pub gas_used: Option<u64>,
    pub gas_limit: Option<u64>,
    pub transaction_count: u32,
    /// Fields that exist in only some chain families (miner, sequencer
    /// address, base fee, state root, ...)
    #[serde(default)]
    pub chain_specific: Value,
}

/// Normalized transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedTransaction {
    pub chain_id: String,
    pub tx_hash: String,
    pub block_number: u64,
    pub block_hash: String,
    pub block_timestamp: u64,
    pub from_address: String,
    /// None for contract-creation transactions
    pub to_address: Option<String>,
    /// Decimal string in the chain's smallest unit (wei, fri)
    pub value: String,
    pub gas_limit: Option<u64>,
    pub gas_used: Option<u64>,
    /// Decimal string
    pub gas_price: Option<String>,
    /// Decimal string; total fee paid
    pub fee: Option<String>,
    pub status: TxStatus,
    pub input_data: Option<String>,
    /// Nonce, signature fields, L1/L2 fee splits, ... per family
    #[serde(default)]
    pub chain_specific: Value,
}

/// Normalized transaction receipt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedReceipt {
    pub tx_hash: String,
    pub status: TxStatus,
    pub gas_used: Option<u64>,
    /// Decimal string
    pub effective_gas_price: Option<String>,
    /// Decimal string; actual fee where the chain reports it directly
    pub fee: Option<String>,
    /// Deployment marker: the created contract address, when present
    pub contract_address: Option<String>,
    /// Deployment marker: declared/deployed class hash (Starknet)
    pub class_hash: Option<String>,
    /// Raw log/event payloads carried for the log processor
    pub logs: Vec<Value>,
}

/// Normalized contract deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedContract {
    pub chain_id: String,
    pub contract_address: String,
    pub deployer_address: String,
    pub deployment_tx_hash: String,
    pub deployment_block_number: u64,
    /// Class hash on Starknet, code hash on EVM
    pub class_hash: Option<String>,
    pub is_verified: bool,
}

/// One flattened call frame from an execution trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedTrace {
    pub tx_hash: String,
    pub depth: u32,
    pub call_type: String,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    /// Decimal string
    pub value: Option<String>,
    pub gas_used: Option<u64>,
    pub error: Option<String>,
}

/// Normalized event log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedLog {
    pub chain_id: String,
    pub block_number: u64,
    pub tx_hash: String,
    pub log_index: u64,
    pub address: String,
    pub topics: Vec<String>,
    pub data: Option<String>,
}

/// A wallet's activity within one block. `counted` marks a sender,
/// whose `total_transactions` the store recomputes from stored
/// transactions; recipient updates only refresh activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletUpdate {
    pub chain_id: String,
    pub wallet_address: String,
    pub wallet_type: WalletType,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub counted: bool,
}

/// Event row linking a wallet, a contract and a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletInteraction {
    pub chain_id: String,
    pub tx_hash: String,
    pub wallet_address: String,
    pub contract_address: String,
    pub interaction_type: String,
    /// Decimal string
    pub value: String,
    pub gas_used: Option<u64>,
    pub success: bool,
    pub timestamp: u64,
}

/// Check that a string looks like a 0x-prefixed hex identifier of the
/// given byte length (None allows any non-empty hex payload).
fn check_hex_id(value: &str, byte_len: Option<usize>) -> Result<(), String> {
    let body = value
        .strip_prefix("0x")
        .ok_or_else(|| "missing 0x prefix".to_string())?;
    if body.is_empty() {
        return Err("empty hex payload".to_string());
    }
    if !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err("non-hex characters".to_string());
    }
    if let Some(len) = byte_len {
        if body.len() != len * 2 {
            return Err(format!("expected {} hex chars, got {}", len * 2, body.len()));
        }
    }
    Ok(())
}

/// Validate an address for the given chain family.
///
/// EVM addresses are exactly 20 bytes; Starknet addresses are field
/// elements with no fixed width beyond the 32-byte cap.
pub fn validate_address(family: ChainFamily, value: &str) -> Result<(), ValidationError> {
    let result = match family {
        ChainFamily::Evm => check_hex_id(value, Some(20)),
        ChainFamily::Starknet => check_hex_id(value, None).and_then(|_| {
            if value.len() > 2 + 64 {
                Err("longer than 32 bytes".to_string())
            } else {
                Ok(())
            }
        }),
    };
    result.map_err(|reason| ValidationError::InvalidAddress {
        value: value.to_string(),
        reason,
    })
}

/// Validate a block or transaction hash for the given chain family.
pub fn validate_hash(family: ChainFamily, value: &str) -> Result<(), ValidationError> {
    let result = match family {
        ChainFamily::Evm => check_hex_id(value, Some(32)),
        ChainFamily::Starknet => check_hex_id(value, None).and_then(|_| {
            if value.len() > 2 + 64 {
                Err("longer than 32 bytes".to_string())
            } else {
                Ok(())
            }
        }),
    };
    result.map_err(|reason| ValidationError::InvalidHash {
        value: value.to_string(),
        reason,
    })
}

/// Parse a 0x-prefixed hex quantity into a u64 (JSON-RPC QUANTITY).
pub fn hex_to_u64(value: &str) -> Result<u64, ValidationError> {
    let body = value
        .strip_prefix("0x")
        .ok_or_else(|| ValidationError::InvalidQuantity(value.to_string()))?;
    u64::from_str_radix(body, 16).map_err(|_| ValidationError::InvalidQuantity(value.to_string()))
}

/// Parse a 0x-prefixed hex quantity into a u128 decimal string.
///
/// Wei-scale values overflow u64; they are carried as decimal strings
/// end to end.
pub fn hex_to_decimal_string(value: &str) -> Result<String, ValidationError> {
    let body = value
        .strip_prefix("0x")
        .ok_or_else(|| ValidationError::InvalidQuantity(value.to_string()))?;
    let parsed = u128::from_str_radix(body, 16)
        .map_err(|_| ValidationError::InvalidQuantity(value.to_string()))?;
    Ok(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_roundtrip() {
        assert_eq!(ChainFamily::parse("evm"), Some(ChainFamily::Evm));
        assert_eq!(ChainFamily::parse("ETH"), Some(ChainFamily::Evm));
        assert_eq!(ChainFamily::parse("starknet"), Some(ChainFamily::Starknet));
        assert_eq!(ChainFamily::parse("cosmos"), None);
        assert_eq!(ChainFamily::Evm.as_str(), "evm");
    }

    #[test]
    fn test_finality_roundtrip() {
        for status in [
            FinalityStatus::Pending,
            FinalityStatus::AcceptedOnL2,
            FinalityStatus::AcceptedOnL1,
            FinalityStatus::Rejected,
        ] {
            assert_eq!(FinalityStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(FinalityStatus::parse("finalized"), None);
    }

    #[test]
    fn test_validate_evm_address() {
        let ok = "0x52bc44d5378309ee2abf1539bf71de1b7d7be3b5";
        assert!(validate_address(ChainFamily::Evm, ok).is_ok());
        assert!(validate_address(ChainFamily::Evm, "0x1234").is_err());
        assert!(validate_address(ChainFamily::Evm, "52bc44d5378309ee2abf1539bf71de1b7d7be3b5").is_err());
        assert!(validate_address(ChainFamily::Evm, "0xzz bad").is_err());
    }

    #[test]
    fn test_validate_starknet_address_is_variable_width() {
        assert!(validate_address(ChainFamily::Starknet, "0x1").is_ok());
        assert!(validate_address(
            ChainFamily::Starknet,
            "0x049d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7"
        )
        .is_ok());
        // 33 bytes is past the field element cap
        let too_long = format!("0x{}", "ab".repeat(33));
        assert!(validate_address(ChainFamily::Starknet, &too_long).is_err());
    }

    #[test]
    fn test_validate_hash() {
        let ok = "0x88e96d4537bea4d9c05d12549907b32561d3bf31f45aae734cdc119f13406cb6";
        assert!(validate_hash(ChainFamily::Evm, ok).is_ok());
        assert!(validate_hash(ChainFamily::Evm, "0xdeadbeef").is_err());
    }

    #[test]
    fn test_hex_quantities() {
        assert_eq!(hex_to_u64("0x0").unwrap(), 0);
        assert_eq!(hex_to_u64("0x64").unwrap(), 100);
        assert_eq!(hex_to_u64("0xde0b6b3a7640000").unwrap(), 1_000_000_000_000_000_000);
        assert!(hex_to_u64("100").is_err());
        assert!(hex_to_u64("0xgg").is_err());

        assert_eq!(
            hex_to_decimal_string("0xde0b6b3a7640000").unwrap(),
            "1000000000000000000"
        );
    }

    #[test]
    fn test_normalized_transaction_serde() {
        let tx = NormalizedTransaction {
            chain_id: "ethereum".to_string(),
            tx_hash: "0xaaaa".to_string(),
            block_number: 100,
            block_hash: "0xbbbb".to_string(),
            block_timestamp: 1_700_000_000,
            from_address: "0xcccc".to_string(),
            to_address: None,
            value: "0".to_string(),
            gas_limit: Some(21_000),
            gas_used: Some(21_000),
            gas_price: Some("1000000000".to_string()),
            fee: Some("21000000000000".to_string()),
            status: TxStatus::Succeeded,
            input_data: None,
            chain_specific: serde_json::json!({ "nonce": 7 }),
        };

        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["status"], "Succeeded");
        let back: NormalizedTransaction = serde_json::from_value(json).unwrap();
        assert_eq!(back.tx_hash, tx.tx_hash);
        assert!(back.to_address.is_none());
    }
}
