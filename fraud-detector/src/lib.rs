//! Fraud Detector
//!
//! Scores conversions for click and purchase fraud and tracks review cases.
//! Scoring flags; it never blocks crediting by itself. Whether a pending case
//! holds confirmation is a configuration knob read by the caller.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cases;
pub mod config;
pub mod error;
pub mod scoring;
pub mod types;
pub mod velocity;

pub use cases::FraudCaseStore;
pub use config::{FraudConfig, IndicatorWeights};
pub use error::{Error, Result};
pub use scoring::FraudDetector;
pub use types::*;
pub use velocity::{VelocityConfig, VelocityController};
