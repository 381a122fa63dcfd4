//! Indexer configuration.

use gatepass_core::{BlockNumber, ParseError};
use std::str::FromStr;
use std::time::Duration;

/// Where to begin when no cursor has been persisted yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StartBlock {
    /// Start at the chain head observed on the first poll
    #[default]
    Head,
    /// Start at this block (inclusive)
    Block(BlockNumber),
}

impl StartBlock {
    /// Cursor value that makes the first range begin at the start block.
    #[must_use]
    pub const fn initial_cursor(&self, head: BlockNumber) -> BlockNumber {
        match self {
            Self::Head => head.saturating_sub(1),
            Self::Block(block) => block.saturating_sub(1),
        }
    }
}

impl FromStr for StartBlock {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("head") || trimmed.eq_ignore_ascii_case("latest") {
            return Ok(Self::Head);
        }
        trimmed
            .parse::<BlockNumber>()
            .map(Self::Block)
            .map_err(|_| ParseError::NotANumber {
                kind: "start block",
                value: trimmed.to_string(),
            })
    }
}

/// Polling and batching parameters.
#[derive(Clone, Debug)]
pub struct IndexerConfig {
    /// Time between polls
    pub poll_interval: Duration,
    /// Maximum blocks per enumeration batch
    pub batch_size: u64,
    /// Bound on every ledger call
    pub rpc_timeout: Duration,
    /// Start position for a fresh cursor
    pub start_block: StartBlock,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            batch_size: 1000,
            rpc_timeout: Duration::from_secs(10),
            start_block: StartBlock::Head,
        }
    }
}

impl IndexerConfig {
    /// Set the poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the batch size (zero is treated as one)
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the ledger call timeout
    #[must_use]
    pub const fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    /// Set the start position used when no cursor exists
    #[must_use]
    pub const fn with_start_block(mut self, start: StartBlock) -> Self {
        self.start_block = start;
        self
    }
}
