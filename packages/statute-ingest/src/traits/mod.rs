//! Core trait abstractions for the ingestion pipeline.
//!
//! These traits define the interfaces that applications implement
//! to provide storage, model inference, and page rendering.

pub mod ai;
pub mod browser;
pub mod store;
