//! Attribution
//!
//! Splits credit for a conversion across the marketing touchpoints that
//! preceded it. Records are for reporting and never change the credited
//! cashback.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod calculator;
pub mod config;
pub mod error;
pub mod model;
pub mod types;

pub use calculator::{allocate, AttributionCalculator};
pub use config::AttributionConfig;
pub use error::{Error, Result};
pub use model::{AttributionModel, FirstTouch, LastTouch, Linear, ModelKind, PositionBased, TimeDecay};
pub use types::{AttributedTouchpoint, AttributionRecord, Touchpoint, DIRECT_SOURCE};
