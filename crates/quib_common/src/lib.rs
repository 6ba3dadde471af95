//! Shared types and logic for the Quib backend.
//!
//! The daemon crate (`quibd`) carries the HTTP surface; everything with
//! domain meaning lives here: the evolution stage tables, the SQLite store,
//! and the progression engine that decides when a creature evolves.

pub mod error;
pub mod personality;
pub mod progression;
pub mod stages;
pub mod store;
pub mod types;

pub use error::{QuibError, Result};
pub use progression::ProgressionEngine;
pub use stages::{EvolutionStage, StageRequirements, STAGE_ORDER};
pub use store::Store;
