//! Storage implementations for the ingestion pipeline.
//!
//! Available backends:
//! - `MemoryStore` - In-memory storage (always available)
//! - `PostgresStore` - PostgreSQL storage (requires `postgres` feature)

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
