//! # GatePass Ledger
//!
//! Production [`Ledger`](gatepass_core::ledger::Ledger) implementation that
//! talks JSON-RPC to an Ethereum-compatible node.
//!
//! | Trait method | RPC |
//! |--------------|-----|
//! | `head_block` | `eth_blockNumber` |
//! | `logs` | `eth_getLogs` filtered by contract address and `topics[0]` |
//! | `ticket` | `eth_call` of `getTicket(uint256)` at `latest` |
//!
//! Logs are handed back undecoded; the indexer decodes them with
//! [`gatepass_core::abi`] so a single malformed log never fails a query.
//!
//! ## Example
//!
//! ```ignore
//! use gatepass_ledger::JsonRpcLedger;
//!
//! let ledger = JsonRpcLedger::new(rpc_url, contract, Duration::from_secs(10))?;
//! let head = ledger.head_block().await?;
//! ```

mod client;
mod wire;

pub use client::JsonRpcLedger;
