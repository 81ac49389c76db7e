//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the interfaces infrastructure adapters must implement:
//! - PatternRepository: durable storage for arms and decision rules
//! - Clock: time source driving decay and recency
//!
//! These traits keep the engine independent of a specific storage backend.

pub mod clock;
pub mod null_pattern;
pub mod pattern_repository;

pub use clock::{Clock, ManualClock, SystemClock};
pub use null_pattern::NullPatternRepository;
pub use pattern_repository::{PatternRepository, StoredPattern};
