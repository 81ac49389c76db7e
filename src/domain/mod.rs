//! Domain layer for the strategy selection engine
//!
//! This module contains the bandit math, domain models and the ports
//! infrastructure adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
