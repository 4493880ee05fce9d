//! Paged Rowset
//!
//! Disconnected, paged views over SQL query results with buffered changes
//! and conflict-checked write-back, chunked CLOB transfer, and named data
//! source profiles loaded from XML properties files.

pub mod config;
pub mod datasource;
pub mod db;
pub mod error;
pub mod lob;
pub mod rowset;
pub mod workflow;

pub use error::{Error, Result};
