//! Zingy - Crew Zingy loyalty program
//!
//! A points ledger over SQLite: code scans with anti-replay, tiered referral
//! bonuses with caps, atomic transfers, reward redemptions, in-app
//! notifications and a signed webhook outbox.

pub mod config;
pub mod error;
pub mod ledger;
pub mod model;
pub mod services;
pub mod storage;
pub mod utils;
pub mod webhook;

pub use config::Config;
pub use error::{Result, ZingyError};
pub use services::Loyalty;
