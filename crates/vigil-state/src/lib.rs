pub mod db;
pub mod engine;
pub mod query;

pub use db::{StagedWrites, StateDb};
pub use engine::StateEngine;
pub use query::{ProfilesBatch, ThreatQuery};
