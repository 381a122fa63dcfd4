//! HTTP API handlers.
//!
//! - [`scan`]: gatekeeper scan submission
//! - [`entries`]: entry history and guest lists
//! - [`purchases`]: purchase records for a buyer's profile
//! - [`indexer`]: indexer status and maintenance

pub mod entries;
pub mod indexer;
pub mod purchases;
pub mod scan;
