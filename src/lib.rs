//! Dialect-tolerant feed ingestion.
//!
//! Fetches RSS 2.0, Atom and RSS 1.0/RDF feeds, normalizes them into one
//! content shape and stores them idempotently in SQLite.

pub mod config;
pub mod feed;
pub mod storage;
pub mod util;
