//! Payout
//!
//! Payment methods, withdrawal requests and their execution against an
//! external payout rail, with reconciliation for unacknowledged payouts.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod methods;
pub mod processor;
pub mod rail;

pub use config::{SimulatedRailConfig, WithdrawalConfig};
pub use error::{Error, Result};
pub use methods::{validate_details, PaymentMethods};
pub use processor::{ReconcileReport, WithdrawalProcessor};
pub use rail::{PayoutRail, RailOutcome, SimulatedRail};
