//! Command orchestrators
//!
//! Thin compositions over the storage, similarity, graph, decay, surface,
//! and cache layers. All I/O and provider calls happen here; the layers
//! underneath stay pure.

pub mod generate;
pub mod index_code;
pub mod maintenance;
pub mod recall;
pub mod remember;
pub mod session;
pub mod traverse;
