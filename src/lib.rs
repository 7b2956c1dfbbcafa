//! Knowledge Retriever - hybrid retrieval and ranking
//!
//! Answers a natural-language query by running semantic, lexical and
//! entity-graph searches concurrently, fusing them with Reciprocal Rank
//! Fusion, optionally reranking, diversifying with MMR and attaching
//! citations.

pub mod backend;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod entities;
pub mod error;
pub mod retrieval;
pub mod storage;

pub use error::{Result, RetrieverError};
pub use retrieval::{KnowledgeRetriever, RetrievalOptions, SearchResult};
