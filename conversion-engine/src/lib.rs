//! Conversion Engine
//!
//! The cashback service: partner conversions in, per-user cashback out.
//!
//! # Flow
//!
//! ```text
//! webhook / track ─▶ intake ─▶ rules ─▶ fraud ─▶ ledger (pending)
//!                                                   │
//!            confirm / refund / commission ◀────────┘
//!                                                   │
//!                         withdrawal ─▶ payout rail ┘
//! ```
//!
//! - **Intake** validates, normalizes and deduplicates conversions
//! - **Rules** pick the commission rate and the user's cashback
//! - **Fraud** scores each conversion and opens review cases
//! - **Scheduler** sweeps pending withdrawals, stale payouts and webhook retries

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

pub mod analytics;
pub mod clicks;
pub mod config;
pub mod error;
pub mod intake;
pub mod metrics;
pub mod scheduler;
pub mod service;

pub use analytics::{Analytics, DateRange};
pub use clicks::ClickRegistry;
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use intake::{IntakeConfig, IntakeOutcome, Rejection};
pub use metrics::EngineMetrics;
pub use scheduler::{Scheduler, SchedulerConfig};
pub use service::{BatchFailure, BatchResult, CashbackService};
