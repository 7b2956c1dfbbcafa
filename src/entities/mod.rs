//! Named entities and the graph linking them to corpus chunks
//!
//! This module provides:
//! - EntityMention, the entity declaration carried by corpus records
//! - EntityGraph, the entity index behind the entity-graph retrieval strategy

mod graph;

pub use graph::{EntityGraph, EntityInfo, EntityMention};
