//! JSON-RPC ledger client.

use crate::wire::{block_tag, parse_quantity, CallRequest, LogFilter, NodeLog, RpcRequest, RpcResponse};
use gatepass_core::abi;
use gatepass_core::ledger::{BoxFuture, Ledger, LedgerError, RawLog};
use gatepass_core::{Address, BlockNumber, BlockRange, EventKind, LedgerTicket, TicketId};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Ledger client for an Ethereum-compatible JSON-RPC node.
///
/// Every request carries the configured timeout; a request that exceeds it
/// fails with [`LedgerError::Timeout`].
pub struct JsonRpcLedger {
    client: Client,
    rpc_url: String,
    contract: Address,
    timeout: Duration,
    request_id: AtomicU64,
}

impl JsonRpcLedger {
    /// Create a client for the ticket contract at `contract`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unavailable`] if the HTTP client cannot be built.
    pub fn new(
        rpc_url: impl Into<String>,
        contract: Address,
        timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            rpc_url: rpc_url.into(),
            contract,
            timeout,
            request_id: AtomicU64::new(1),
        })
    }

    async fn call<P, R>(&self, method: &str, params: P) -> Result<R, LedgerError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Unavailable(format!(
                "{method}: HTTP {}: {body}",
                status.as_u16()
            )));
        }

        let envelope: RpcResponse<R> = response.json().await.map_err(|e| {
            if e.is_timeout() {
                LedgerError::Timeout(self.timeout)
            } else {
                LedgerError::InvalidResponse(format!("{method}: {e}"))
            }
        })?;
        envelope.into_result(method)
    }

    fn transport_error(&self, error: &reqwest::Error) -> LedgerError {
        if error.is_timeout() {
            LedgerError::Timeout(self.timeout)
        } else {
            LedgerError::Unavailable(error.to_string())
        }
    }
}

/// Decode one `eth_getLogs` element; `None` for logs removed by a reorg.
fn node_log(value: serde_json::Value) -> Result<Option<RawLog>, LedgerError> {
    let log: NodeLog = serde_json::from_value(value)
        .map_err(|e| LedgerError::InvalidResponse(format!("log: {e}")))?;
    if log.removed {
        return Ok(None);
    }
    RawLog::try_from(log).map(Some)
}

impl Ledger for JsonRpcLedger {
    fn endpoint(&self) -> &str {
        &self.rpc_url
    }

    fn head_block(&self) -> BoxFuture<'_, Result<BlockNumber, LedgerError>> {
        Box::pin(async move {
            let head: String = self.call("eth_blockNumber", json!([])).await?;
            parse_quantity(&head)
        })
    }

    fn logs(
        &self,
        kind: EventKind,
        range: BlockRange,
    ) -> BoxFuture<'_, Result<Vec<RawLog>, LedgerError>> {
        let filter = LogFilter {
            address: self.contract.to_string(),
            topics: vec![abi::event_topic(kind)],
            from_block: block_tag(range.from),
            to_block: block_tag(range.to),
        };

        Box::pin(async move {
            // Elements are parsed one by one so a single bad log is dropped
            // instead of failing the whole range.
            let logs: Vec<serde_json::Value> = self.call("eth_getLogs", [filter]).await?;
            let total = logs.len();
            let raw: Vec<RawLog> = logs
                .into_iter()
                .filter_map(|value| match node_log(value) {
                    Ok(Some(log)) => Some(log),
                    Ok(None) => None,
                    Err(error) => {
                        warn!(kind = %kind, error = %error, "Skipping unreadable node log");
                        None
                    }
                })
                .collect();
            debug!(kind = %kind, from = range.from, to = range.to, total, kept = raw.len(), "Fetched logs");
            Ok(raw)
        })
    }

    fn ticket(
        &self,
        ticket_id: TicketId,
    ) -> BoxFuture<'_, Result<Option<LedgerTicket>, LedgerError>> {
        let call = CallRequest {
            to: self.contract.to_string(),
            data: abi::ticket_call_data(ticket_id),
        };

        Box::pin(async move {
            let data: String = self.call("eth_call", (call, "latest")).await?;
            abi::decode_ticket(ticket_id, &data)
                .map_err(|e| LedgerError::InvalidResponse(format!("getTicket({ticket_id}): {e}")))
        })
    }
}
