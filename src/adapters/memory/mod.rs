//! In-process adapters, used by tests and by callers that want learning
//! without a database.

pub mod pattern_repository;

pub use pattern_repository::InMemoryPatternRepository;
