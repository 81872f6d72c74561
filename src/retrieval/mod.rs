//! Retrieval layer: passage types and the Index Store gateway.
//!
//! The Index Store (keyword/vector search over chunked document text) is
//! an external collaborator. This module defines the passage data model
//! shared across the loop and a thin, stateless gateway for querying it.

pub mod gateway;
pub mod passage;

pub use gateway::{HttpRetrieverGateway, RetrieverGateway};
pub use passage::{Citation, Passage, PassageKey, SearchScope};
