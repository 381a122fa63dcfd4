//! # GatePass Admission
//!
//! Decides, per scan attempt, whether a ticket holder may enter, and records
//! every attempt in the append-only entry log.
//!
//! Every scan gets exactly one verdict:
//!
//! | Decision       | Logged as      | Meaning                                  |
//! |----------------|----------------|------------------------------------------|
//! | `ADMIT`        | `SUCCESS`      | first valid scan                         |
//! | `DUPLICATE`    | `DUPLICATE`    | re-scan inside the duplicate window      |
//! | `ALREADY_USED` | `ALREADY_USED` | re-entry attempt after the window        |
//! | `EXPIRED`      | `EXPIRED`      | credential older than the freshness window |
//! | `INVALID`      | `INVALID`      | bad credential, holder or gatekeeper     |
//!
//! A ticket is "used" once it has a `SUCCESS` row; the store guarantees at
//! most one.
//!
//! # Example
//!
//! ```ignore
//! use gatepass_admission::{AdmissionController, AdmissionPolicy, ScanRequest, StaticGatekeepers};
//!
//! let gatekeepers = Arc::new("Concert:0x…e1".parse::<StaticGatekeepers>()?);
//! let controller = AdmissionController::new(store, gatekeepers, clock, AdmissionPolicy::default());
//!
//! let response = controller.admit_qr(qr_payload, gatekeeper, Some("Gate 3".into())).await;
//! println!("{}: {}", response.decision, response.reason);
//! ```

mod controller;
mod decision;
mod gatekeepers;
pub mod metrics;
mod policy;
mod request;
mod token;

pub use controller::AdmissionController;
pub use decision::{AdmissionResponse, Decision};
pub use gatekeepers::{GatekeeperDirectory, StaticGatekeepers};
pub use policy::{AdmissionPolicy, Freshness};
pub use request::{CredentialError, ScanRequest};
pub use token::{TokenError, TokenKey};
