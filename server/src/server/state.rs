//! Application state shared by all handlers.

use gatepass_admission::AdmissionController;
use gatepass_core::store::PurchaseStore;
use gatepass_indexer::Indexer;
use std::sync::Arc;

/// Shared application state.
///
/// Cheap to clone; every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Entry admission
    pub admission: Arc<AdmissionController>,
    /// Ledger event indexer
    pub indexer: Arc<Indexer>,
    /// Purchase records for profile reads
    pub purchases: Arc<dyn PurchaseStore>,
}

impl AppState {
    /// Bundle the components.
    #[must_use]
    pub fn new(
        admission: Arc<AdmissionController>,
        indexer: Arc<Indexer>,
        purchases: Arc<dyn PurchaseStore>,
    ) -> Self {
        Self {
            admission,
            indexer,
            purchases,
        }
    }
}
