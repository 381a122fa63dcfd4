//! JSON-RPC envelopes and node payload shapes.

use gatepass_core::ledger::{LedgerError, RawLog};
use gatepass_core::BlockNumber;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct RpcRequest<'a, P: Serialize> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub params: P,
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcError {
    pub code: i64,
    pub message: String,
}

impl<T> RpcResponse<T> {
    pub(crate) fn into_result(self, method: &str) -> Result<T, LedgerError> {
        if let Some(error) = self.error {
            return Err(LedgerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        self.result
            .ok_or_else(|| LedgerError::InvalidResponse(format!("{method}: missing result")))
    }
}

/// Filter object for `eth_getLogs`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LogFilter {
    pub address: String,
    pub topics: Vec<String>,
    pub from_block: String,
    pub to_block: String,
}

/// Call object for `eth_call`.
#[derive(Debug, Serialize)]
pub(crate) struct CallRequest {
    pub to: String,
    pub data: String,
}

/// A log as the node reports it; quantities are hex strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NodeLog {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
    pub block_number: Option<String>,
    pub log_index: Option<String>,
    pub transaction_hash: Option<String>,
    pub block_timestamp: Option<String>,
    #[serde(default)]
    pub removed: bool,
}

impl TryFrom<NodeLog> for RawLog {
    type Error = LedgerError;

    fn try_from(log: NodeLog) -> Result<Self, Self::Error> {
        // Pending logs have no position yet
        let block_number = required_quantity(log.block_number.as_deref(), "blockNumber")?;
        let log_index = required_quantity(log.log_index.as_deref(), "logIndex")?;
        let tx_hash = log
            .transaction_hash
            .ok_or_else(|| LedgerError::InvalidResponse("log without transactionHash".into()))?;
        // Optional extension field; an unreadable value is the same as absent
        let block_timestamp = log
            .block_timestamp
            .as_deref()
            .and_then(|raw| parse_quantity(raw).ok());

        Ok(Self {
            topics: log.topics,
            data: log.data,
            block_number,
            log_index,
            tx_hash,
            block_timestamp,
        })
    }
}

/// `0x`-prefixed hex quantity for a block number.
pub(crate) fn block_tag(block: BlockNumber) -> String {
    format!("0x{block:x}")
}

/// Parse a hex quantity such as `"0x1b4"`.
pub(crate) fn parse_quantity(raw: &str) -> Result<u64, LedgerError> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| LedgerError::InvalidResponse(format!("quantity without 0x prefix: {raw}")))?;
    if digits.is_empty() {
        return Err(LedgerError::InvalidResponse("empty quantity".into()));
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| LedgerError::InvalidResponse(format!("bad quantity {raw}: {e}")))
}

fn required_quantity(raw: Option<&str>, field: &str) -> Result<u64, LedgerError> {
    raw.map_or_else(
        || Err(LedgerError::InvalidResponse(format!("log without {field}"))),
        parse_quantity,
    )
}
