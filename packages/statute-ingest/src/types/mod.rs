//! Data types for the ingestion pipeline.

pub mod config;
pub mod domain;
pub mod slot;
pub mod source;
pub mod statute;
