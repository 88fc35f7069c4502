//! Receipt and log types as returned by Ethereum JSON-RPC

use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

/// An event log emitted during transaction execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    /// Emitting contract
    pub address: Address,

    /// Indexed topics, left to right; `topics[0]` is the event signature hash
    pub topics: Vec<B256>,

    /// Non-indexed, ABI-encoded event data
    #[serde(default)]
    pub data: Bytes,

    #[serde(default, with = "quantity::option", skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<B256>,

    #[serde(default, with = "quantity::option", skip_serializing_if = "Option::is_none")]
    pub log_index: Option<u64>,
}

/// A mined transaction's receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,

    #[serde(with = "quantity")]
    pub block_number: u64,

    #[serde(default)]
    pub block_hash: Option<B256>,

    pub from: Address,

    /// `None` for contract creations
    #[serde(default)]
    pub to: Option<Address>,

    /// `0x1` success, `0x0` revert
    #[serde(with = "quantity")]
    pub status: u64,

    #[serde(default)]
    pub logs: Vec<Log>,
}

impl TransactionReceipt {
    /// Whether execution succeeded
    pub fn succeeded(&self) -> bool {
        self.status == 1
    }
}

/// Transaction fields needed to replay a call for its revert reason
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: B256,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub input: Bytes,
    #[serde(default)]
    pub value: Option<alloy_primitives::U256>,
    #[serde(default, with = "quantity::option")]
    pub block_number: Option<u64>,
}

/// `eth_getLogs` filter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,

    /// Topic constraints by position; `None` matches anything
    pub topics: Vec<Option<B256>>,

    #[serde(with = "quantity::option", skip_serializing_if = "Option::is_none")]
    pub from_block: Option<u64>,

    #[serde(with = "quantity::option", skip_serializing_if = "Option::is_none")]
    pub to_block: Option<u64>,
}

impl LogFilter {
    /// Logs of one event from one contract within a single block
    pub fn at_block(address: Address, event_topic: B256, block_number: u64) -> Self {
        Self {
            address: Some(address),
            topics: vec![Some(event_topic)],
            from_block: Some(block_number),
            to_block: Some(block_number),
        }
    }

    /// Whether a log satisfies this filter
    pub fn matches(&self, log: &Log) -> bool {
        if let Some(address) = self.address {
            if log.address != address {
                return false;
            }
        }
        if let Some(block) = log.block_number {
            if self.from_block.is_some_and(|from| block < from)
                || self.to_block.is_some_and(|to| block > to)
            {
                return false;
            }
        }
        self.topics.iter().enumerate().all(|(i, wanted)| match wanted {
            Some(topic) => log.topics.get(i) == Some(topic),
            None => true,
        })
    }
}

/// Hex quantity encoding (`"0x1a"`) used by JSON-RPC for integers
pub mod quantity {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(s: &str) -> Result<u64, String> {
        let digits = s
            .strip_prefix("0x")
            .ok_or_else(|| format!("Quantity missing 0x prefix: {}", s))?;
        u64::from_str_radix(digits, 16).map_err(|e| format!("Invalid quantity {}: {}", s, e))
    }

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{:x}", value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<u64>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => serializer.serialize_some(&format!("0x{:x}", v)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<u64>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|s| parse(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
