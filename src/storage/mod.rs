//! Storage engine for Cortex
//!
//! Handles SQLite database operations, WAL mode, and schema management.
//! The project and global stores share this one schema.

mod connection;
mod migrations;
pub mod queries;

pub use connection::Store;
pub use migrations::SCHEMA_VERSION;
